/// Delta stream session tests against a local WebSocket server

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::SinkExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use book_sync::{
    ClientConfig, ClientError, DecodeError, DeltaUpdate, FeedEvent, FeedSession, FixedPoint,
    ReconnectPolicy, Side, FRAME_SIZE,
};

fn session_config(addr: SocketAddr, max_retries: u32) -> ClientConfig {
    ClientConfig {
        ws_url: format!("ws://{}/delta", addr),
        idle_timeout: Duration::from_millis(300),
        reconnect: ReconnectPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            max_retries: Some(max_retries),
            jitter: 0.0,
        },
        ..ClientConfig::default()
    }
}

fn update(ordinal: i64) -> DeltaUpdate {
    DeltaUpdate::new(
        Side::Bid,
        ordinal,
        FixedPoint::from_raw(10_000),
        FixedPoint::from_raw(1_000),
    )
}

/// Accept a single WebSocket client and hand it to `serve`.
async fn serve_once<F, Fut>(serve: F) -> SocketAddr
where
    F: FnOnce(WebSocketStream<tokio::net::TcpStream>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        serve(ws).await;
    });
    addr
}

/// Accept every client and close it straight after the upgrade, without a frame.
async fn serve_and_hang_up() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(mut ws) = accept_async(stream).await {
                let _ = ws.close(None).await;
            }
        }
    });
    addr
}

async fn collect(mut rx: mpsc::Receiver<FeedEvent>) -> Vec<FeedEvent> {
    let mut events = Vec::new();
    while let Some(event) = timeout(Duration::from_secs(5), rx.recv()).await.unwrap() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_frames_forwarded_in_order() {
    let addr = serve_once(|mut ws| async move {
        ws.send(Message::Binary(update(1).to_frame().to_vec())).await.unwrap();
        ws.send(Message::Binary(vec![0u8; 25])).await.unwrap();

        let mut padded = update(2).to_frame().to_vec();
        padded.extend_from_slice(&[0, 0]);
        ws.send(Message::Binary(padded)).await.unwrap();

        let _ = ws.close(None).await;
    })
    .await;

    let (tx, rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(FeedSession::new(&session_config(addr, 0), tx, shutdown_rx).run());

    let events = collect(rx).await;
    assert_eq!(events.len(), 6, "{:?}", events);
    assert_eq!(events[0], FeedEvent::Connected);
    assert_eq!(
        events[1],
        FeedEvent::Frame {
            update: update(1),
            len: FRAME_SIZE
        }
    );
    assert_eq!(
        events[2],
        FeedEvent::Malformed {
            len: 25,
            error: DecodeError::BufferTooSmall { need: 26, have: 25 }
        }
    );
    assert_eq!(
        events[3],
        FeedEvent::Frame {
            update: update(2),
            len: 28
        }
    );
    assert!(matches!(events[4], FeedEvent::Disconnected { .. }));
    assert_eq!(
        events[5],
        FeedEvent::Failed(ClientError::RetriesExhausted { attempts: 1 })
    );
}

#[tokio::test]
async fn test_empty_connections_spend_the_budget() {
    let addr = serve_and_hang_up().await;

    let (tx, rx) = mpsc::channel(64);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(FeedSession::new(&session_config(addr, 2), tx, shutdown_rx).run());

    let events = collect(rx).await;
    let connects = events
        .iter()
        .filter(|e| matches!(e, FeedEvent::Connected))
        .count();
    assert_eq!(connects, 3, "{:?}", events);
    assert_eq!(
        events.last(),
        Some(&FeedEvent::Failed(ClientError::RetriesExhausted { attempts: 3 }))
    );
}

#[tokio::test]
async fn test_idle_stream_is_dropped() {
    let addr = serve_once(|ws| async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        drop(ws);
    })
    .await;

    let (tx, rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(FeedSession::new(&session_config(addr, 0), tx, shutdown_rx).run());

    let events = collect(rx).await;
    assert_eq!(events[0], FeedEvent::Connected);
    assert_eq!(
        events[1],
        FeedEvent::Disconnected {
            reason: "idle timeout".to_string()
        }
    );
    assert!(matches!(events[2], FeedEvent::Failed(_)));
}

#[tokio::test]
async fn test_unreachable_server_exhausts_retries() {
    // bind then drop to get a port nothing listens on
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let (tx, rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(FeedSession::new(&session_config(addr, 2), tx, shutdown_rx).run());

    let events = collect(rx).await;
    assert_eq!(
        events,
        vec![FeedEvent::Failed(ClientError::RetriesExhausted { attempts: 3 })]
    );
}

#[tokio::test]
async fn test_shutdown_stops_session() {
    let addr = serve_once(|mut ws| async move {
        ws.send(Message::Binary(update(1).to_frame().to_vec())).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
    })
    .await;

    let mut config = session_config(addr, 0);
    config.idle_timeout = Duration::from_secs(10);

    let (tx, mut rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let session = tokio::spawn(FeedSession::new(&config, tx, shutdown_rx).run());

    assert_eq!(rx.recv().await, Some(FeedEvent::Connected));
    assert!(matches!(rx.recv().await, Some(FeedEvent::Frame { .. })));

    shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(2), session).await.unwrap().unwrap();
    assert_eq!(rx.recv().await, None);
}
