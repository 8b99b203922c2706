//! Push connection to the backend and translation of its frames into reducer actions.
//!
//! [`ChannelManager::run`] is a supervised loop: connect, require a snapshot as
//! the first frame, forward frames until the connection ends, mark the channel
//! disconnected, wait `reconnect_delay`, repeat. It never gives up; it only
//! stops once the engine drops its receiver.
//!
//! There is no replay cursor across reconnects. Every new connection starts
//! from the server's fresh snapshot.

use crate::config::SyncConfig;
use crate::events::SyncEvent;
use crate::model::JobId;
use crate::protocol::{self, Frame};
use crate::reducer::{Action, JobStore};
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "live",
            Self::Disconnected => "offline",
        }
    }
}

/// Why one connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    ServerClosed,
    ServerShutdown,
    /// An incremental frame arrived before the snapshot; carries its kind.
    SnapshotMissing(&'static str),
    TransportError(String),
    /// The engine went away; stop for good.
    ReceiverGone,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerClosed => f.write_str("closed by server"),
            Self::ServerShutdown => f.write_str("server shutting down"),
            Self::SnapshotMissing(kind) => write!(f, "'{kind}' frame before snapshot"),
            Self::TransportError(e) => write!(f, "transport error: {e}"),
            Self::ReceiverGone => f.write_str("engine stopped"),
        }
    }
}

pub struct ChannelManager {
    url: Url,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    tx: mpsc::UnboundedSender<SyncEvent>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ChannelManager {
    pub fn new(
        url: Url,
        config: &SyncConfig,
        tx: mpsc::UnboundedSender<SyncEvent>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            url,
            reconnect_delay: config.reconnect_delay,
            connect_timeout: config.connect_timeout,
            tx,
            state_tx,
        }
    }

    pub async fn run(self) {
        // Reconnect attempts keep reporting `Disconnected` until a socket is
        // open, so the fallback poller stays active across slow connects.
        if !self.publish(ConnectionState::Connecting) {
            return;
        }
        loop {
            let end = match time::timeout(self.connect_timeout, connect_async(self.url.as_str())).await {
                Ok(Ok((stream, _response))) => {
                    tracing::info!(url = %self.url, "push channel connected");
                    if !self.publish(ConnectionState::Connected) {
                        return;
                    }
                    self.drive(stream).await
                }
                Ok(Err(e)) => SessionEnd::TransportError(e.to_string()),
                Err(_) => SessionEnd::TransportError(format!(
                    "connect timed out after {}s",
                    self.connect_timeout.as_secs()
                )),
            };

            if end == SessionEnd::ReceiverGone {
                return;
            }
            tracing::warn!(
                reason = %end,
                retry_in_ms = self.reconnect_delay.as_millis(),
                "push channel down"
            );
            if !self.publish(ConnectionState::Disconnected) {
                return;
            }
            time::sleep(self.reconnect_delay).await;
        }
    }

    /// Returns `false` once nobody is listening any more.
    fn publish(&self, state: ConnectionState) -> bool {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if !changed {
            return !self.tx.is_closed();
        }
        self.tx.send(SyncEvent::Connection(state)).is_ok()
    }

    async fn drive(&self, stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> SessionEnd {
        let (mut write, mut read) = stream.split();
        let mut has_snapshot = false;

        let end = loop {
            let message = match read.next().await {
                None => break SessionEnd::ServerClosed,
                Some(Err(e)) => break SessionEnd::TransportError(e.to_string()),
                Some(Ok(message)) => message,
            };
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break SessionEnd::ServerClosed,
                _ => continue,
            };
            let frame = match protocol::decode(text.as_str()) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(error = %e, "discarding malformed frame");
                    continue;
                }
            };
            if matches!(frame, Frame::ServerShutdown) {
                break SessionEnd::ServerShutdown;
            }
            if !has_snapshot && !frame.is_snapshot() {
                break SessionEnd::SnapshotMissing(frame.kind());
            }
            has_snapshot = true;
            if self.tx.send(SyncEvent::Frame(frame)).is_err() {
                break SessionEnd::ReceiverGone;
            }
        };

        // Best effort; the peer may already be gone.
        let _ = write.send(Message::Close(None)).await;
        end
    }
}

/// A detected hole in one job's log sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gap {
    pub job_id: JobId,
    /// Fetch entries strictly after this seq.
    pub after_seq: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Translation {
    pub action: Option<Action>,
    pub gap: Option<Gap>,
}

impl Translation {
    fn ignore() -> Self {
        Self::default()
    }

    fn action(action: Action) -> Self {
        Self {
            action: Some(action),
            gap: None,
        }
    }
}

/// Map one frame onto a reducer action, checking log frames for gaps against
/// the current store.
///
/// Frames naming a temporary id are dropped: placeholder replacement belongs to
/// the mutation coordinator alone.
pub fn translate(frame: Frame, store: &JobStore) -> Translation {
    match frame {
        Frame::Snapshot { jobs } => Translation::action(Action::Snapshot(
            jobs.into_iter().filter(|j| !j.id.is_temporary()).collect(),
        )),
        Frame::JobCreated { job } | Frame::JobUpdated { job } => {
            if job.id.is_temporary() {
                tracing::debug!(job_id = %job.id, "ignoring push for temporary job");
                Translation::ignore()
            } else {
                Translation::action(Action::Upsert(job))
            }
        }
        Frame::JobDeleted { job_id } => {
            if job_id.is_temporary() {
                Translation::ignore()
            } else {
                Translation::action(Action::Delete(job_id))
            }
        }
        Frame::LogEntry { job_id, entry } => {
            if job_id.is_temporary() {
                return Translation::ignore();
            }
            let gap = store
                .log_seq(&job_id)
                .filter(|&current| entry.seq > current.saturating_add(1))
                .map(|current| Gap {
                    job_id: job_id.clone(),
                    after_seq: current,
                });
            Translation {
                action: Some(Action::Log { job_id, entry }),
                gap,
            }
        }
        Frame::ServerShutdown => Translation::ignore(),
    }
}
