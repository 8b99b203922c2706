//! The engine's single inbound queue and the terminal input thread.
//!
//! Every background task (push channel, pollers, backfill, mutation requests)
//! reports through [`SyncEvent`] on one `mpsc::UnboundedSender`; the owner of
//! the receiving end is the only writer of job state.
//!
//! [`EventHandler`] spawns an OS thread (not a tokio task) because
//! `crossterm::event::poll()` blocks and would starve the async runtime. Drop
//! signals shutdown without joining to avoid deadlocking if `poll` blocks
//! during panic unwinding.

use crate::api::LogPage;
use crate::channel::ConnectionState;
use crate::coordinator::{OpId, Response};
use crate::model::{Job, JobId};
use crate::protocol::Frame;
use crossterm::event::{self, Event as CrosstermEvent, KeyEvent};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum SyncEvent {
    Connection(ConnectionState),
    /// A decoded push frame, in arrival order.
    Frame(Frame),
    /// The fallback poller wants a full resync.
    ResyncDue,
    /// A finished full resync, tagged with the engine's sync generation at the
    /// time it was requested.
    ResyncResult {
        generation: u64,
        result: Result<Vec<Job>, String>,
    },
    BackfillResult {
        job_id: JobId,
        after: u64,
        result: Result<LogPage, String>,
    },
    MutationResult {
        op_id: OpId,
        result: Result<Response, String>,
    },
    /// Best-effort update carrying fields edited on a temporary job.
    FollowUpResult {
        job_id: JobId,
        result: Result<Job, String>,
    },
    /// One settle-poll observation of a job after start/stop.
    SettleObserved(Job),
}

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Tick,
    /// Terminal-level failure; shown as a notice.
    Error(String),
}

pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<AppEvent>,
    tx: mpsc::UnboundedSender<AppEvent>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let event_tx = tx.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = shutdown.clone();

        let thread = std::thread::spawn(move || {
            while !shutdown_flag.load(Ordering::Relaxed) {
                match event::poll(tick_rate) {
                    Err(e) => {
                        let _ = event_tx.send(AppEvent::Error(format!("Terminal poll error: {e}")));
                        break;
                    }
                    Ok(false) => {
                        if event_tx.send(AppEvent::Tick).is_err() {
                            break;
                        }
                        continue;
                    }
                    Ok(true) => {}
                }
                match event::read() {
                    Ok(CrosstermEvent::Key(key)) => {
                        if event_tx.send(AppEvent::Key(key)).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        let _ = event_tx.send(AppEvent::Error(format!("Terminal read error: {e}")));
                        break;
                    }
                    _ => {} // mouse, resize, focus
                }
            }
        });

        Self {
            rx,
            tx,
            shutdown,
            thread: Some(thread),
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.tx.clone()
    }

    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            if let Err(panic_payload) = handle.join() {
                let msg = panic_payload.downcast::<String>().map_or_else(
                    |p| {
                        p.downcast::<&str>()
                            .map_or_else(|_| "unknown panic".to_string(), |s| s.to_string())
                    },
                    |s| *s,
                );
                tracing::error!("input thread panicked: {msg}");
            }
        }
    }
}

impl Drop for EventHandler {
    fn drop(&mut self) {
        // The thread exits on its next poll tick.
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

/// Run `fut` on the runtime and deliver the event it yields. If the task
/// panics, `on_crash` builds the event instead, so whatever guard the task
/// was holding still gets released by the engine.
pub fn spawn_monitored<F, C>(
    tx: mpsc::UnboundedSender<SyncEvent>,
    label: &'static str,
    fut: F,
    on_crash: C,
) where
    F: Future<Output = SyncEvent> + Send + 'static,
    C: FnOnce(String) -> SyncEvent + Send + 'static,
{
    tokio::spawn(async move {
        let event = match tokio::spawn(fut).await {
            Ok(event) => event,
            Err(join_err) => {
                let msg = if join_err.is_panic() {
                    match join_err.into_panic().downcast::<String>() {
                        Ok(s) => *s,
                        Err(payload) => match payload.downcast::<&str>() {
                            Ok(s) => s.to_string(),
                            Err(_) => "unknown panic".to_string(),
                        },
                    }
                } else {
                    "task cancelled".to_string()
                };
                tracing::error!("{label} panicked: {msg}");
                on_crash(format!("{label} crashed: {msg}"))
            }
        };
        if tx.send(event).is_err() {
            tracing::warn!("{label}: channel closed");
        }
    });
}
