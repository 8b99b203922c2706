use crate::config::{SyncConfig, DEFAULT_SERVER};
use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "tabsync", version, about = "Live console for capture test tabs")]
pub struct Cli {
    /// Backend API base URL
    #[arg(short, long, default_value = DEFAULT_SERVER)]
    pub server: String,

    /// Seconds to wait before reconnecting the push channel
    #[arg(long, default_value_t = 3)]
    pub reconnect_delay: u64,

    /// Seconds between full resyncs while the push channel is down
    #[arg(short = 'i', long, default_value_t = 3)]
    pub poll_interval: u64,

    /// Seconds to keep polling a job after start/stop
    #[arg(long, default_value_t = 20)]
    pub settle_timeout: u64,

    /// Disable desktop notifications
    #[arg(long)]
    pub no_notify: bool,

    /// Write debug logs to $XDG_STATE_HOME/tabsync/debug.log
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            reconnect_delay: Duration::from_secs(self.reconnect_delay.max(1)),
            fallback_interval: Duration::from_secs(self.poll_interval.max(1)),
            settle_timeout: Duration::from_secs(self.settle_timeout),
            ..SyncConfig::default()
        }
    }
}
