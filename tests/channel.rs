use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tabsync::channel::{ChannelManager, ConnectionState};
use tabsync::config::SyncConfig;
use tabsync::events::SyncEvent;
use tabsync::model::{Job, JobId, LogEntry};
use tabsync::protocol::{self, Frame};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

const WAIT: Duration = Duration::from_secs(5);

fn text(frame: &Frame) -> Message {
    Message::Text(protocol::encode(frame).expect("encode").into())
}

fn snapshot() -> Frame {
    Frame::Snapshot {
        jobs: vec![Job::new(JobId::from("a"), "A")],
    }
}

fn log(seq: u64) -> Frame {
    Frame::LogEntry {
        job_id: JobId::from("a"),
        entry: LogEntry::new(seq, "x"),
    }
}

/// Accept one websocket per script, send its messages, then hold the socket
/// open until the client goes away.
async fn serve(scripts: Vec<Vec<Message>>) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        for script in scripts {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };
            tokio::spawn(async move {
                for message in script {
                    if ws.send(message).await.is_err() {
                        return;
                    }
                }
                // Park until the client closes.
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });
    Url::parse(&format!("ws://{addr}/api/test-tabs/ws")).expect("url")
}

fn start(url: Url) -> (mpsc::UnboundedReceiver<SyncEvent>, watch::Receiver<ConnectionState>) {
    let config = SyncConfig {
        reconnect_delay: Duration::from_millis(50),
        connect_timeout: Duration::from_secs(2),
        ..SyncConfig::default()
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
    tokio::spawn(ChannelManager::new(url, &config, tx, state_tx).run());
    (rx, state_rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> SyncEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("event within timeout")
        .expect("channel open")
}

fn describe(event: &SyncEvent) -> String {
    match event {
        SyncEvent::Connection(state) => format!("conn:{}", state.label()),
        SyncEvent::Frame(frame) => format!("frame:{}", frame.kind()),
        other => format!("{other:?}"),
    }
}

async fn collect(rx: &mut mpsc::UnboundedReceiver<SyncEvent>, n: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(describe(&next(rx).await));
    }
    out
}

#[tokio::test]
async fn snapshot_then_frames_are_forwarded_in_order() {
    let url = serve(vec![vec![text(&snapshot()), text(&log(1)), text(&log(2))]]).await;
    let (mut rx, state_rx) = start(url);

    assert_eq!(
        collect(&mut rx, 4).await,
        vec!["conn:live", "frame:snapshot", "frame:log_entry", "frame:log_entry"]
    );
    assert_eq!(*state_rx.borrow(), ConnectionState::Connected);
}

#[tokio::test]
async fn incremental_frame_before_snapshot_forces_reconnect() {
    let url = serve(vec![
        vec![text(&log(7)), text(&snapshot())],
        vec![text(&snapshot())],
    ])
    .await;
    let (mut rx, _state) = start(url);

    assert_eq!(
        collect(&mut rx, 4).await,
        vec!["conn:live", "conn:offline", "conn:live", "frame:snapshot"]
    );
}

#[tokio::test]
async fn server_shutdown_reconnects_and_starts_from_fresh_snapshot() {
    let url = serve(vec![
        vec![text(&snapshot()), text(&Frame::ServerShutdown)],
        vec![text(&snapshot())],
    ])
    .await;
    let (mut rx, _state) = start(url);

    assert_eq!(
        collect(&mut rx, 5).await,
        vec!["conn:live", "frame:snapshot", "conn:offline", "conn:live", "frame:snapshot"]
    );
}

#[tokio::test]
async fn malformed_frames_are_skipped() {
    let url = serve(vec![vec![
        text(&snapshot()),
        Message::Text("{not json".into()),
        Message::Text(r#"{"type":"mystery"}"#.into()),
        text(&log(1)),
    ]])
    .await;
    let (mut rx, _state) = start(url);

    assert_eq!(
        collect(&mut rx, 3).await,
        vec!["conn:live", "frame:snapshot", "frame:log_entry"]
    );
}

#[tokio::test]
async fn unreachable_server_reports_offline_and_keeps_trying() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let url = Url::parse(&format!("ws://127.0.0.1:{port}/api/test-tabs/ws")).expect("url");
    let (mut rx, state_rx) = start(url);

    assert_eq!(describe(&next(&mut rx).await), "conn:offline");
    // Later failed attempts do not flap the state.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(*state_rx.borrow(), ConnectionState::Disconnected);
}
