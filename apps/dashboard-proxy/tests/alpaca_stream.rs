//! Stock Stream Client Integration Tests
//!
//! Runs the real [`AlpacaStreamClient`] against a local WebSocket server that
//! speaks the stock stream handshake, with short reconnect and heartbeat
//! timings.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

use common::FakeMarketData;
use dashboard_proxy::application::ports::{
    MarketDataPort, StreamConnection, StreamError, StreamEvent,
};
use dashboard_proxy::infrastructure::alpaca::{
    AlpacaStreamClient, AlpacaStreamConfig, AlpacaStreamConnector, Credentials, HeartbeatConfig,
    ReconnectConfig,
};
use dashboard_proxy::{ClientHandle, ServerMessage, StreamManager, StreamPhase};

// =============================================================================
// Local Upstream
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Upstream {
    /// Reject every auth request with code 402.
    RejectAuth,
    /// Authenticate and answer each subscribe with one bar per symbol.
    Serve,
    /// Like `Serve`, but the first connection closes after its first subscribe.
    DropFirstAfterSubscribe,
    /// Authenticate, then never read or write again.
    Silent,
}

struct FakeUpstream {
    url: String,
    accepted: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<(usize, Value)>>>,
}

impl FakeUpstream {
    async fn start(mode: Upstream) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let accepted = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));

        let counter = Arc::clone(&accepted);
        let log = Arc::clone(&received);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    if let Ok(ws) = accept_async(stream).await {
                        run_session(mode, index, ws, log).await;
                    }
                });
            }
        });

        Self {
            url,
            accepted,
            received,
        }
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Requests received on connection `index`, auth frame excluded.
    fn requests_on(&self, index: usize) -> Vec<Value> {
        self.received
            .lock()
            .iter()
            .filter(|(i, request)| *i == index && request["action"] != "auth")
            .map(|(_, request)| request.clone())
            .collect()
    }
}

async fn run_session(
    mode: Upstream,
    index: usize,
    mut ws: WebSocketStream<TcpStream>,
    log: Arc<Mutex<Vec<(usize, Value)>>>,
) {
    send(&mut ws, json!([{"T": "success", "msg": "connected"}])).await;

    let Some(auth) = next_json(&mut ws).await else {
        return;
    };
    log.lock().push((index, auth));

    if matches!(mode, Upstream::RejectAuth) {
        send(&mut ws, json!([{"T": "error", "code": 402, "msg": "auth failed"}])).await;
        let _ = ws.send(Message::Close(None)).await;
        return;
    }

    send(&mut ws, json!([{"T": "success", "msg": "authenticated"}])).await;

    if matches!(mode, Upstream::Silent) {
        tokio::time::sleep(Duration::from_secs(30)).await;
        return;
    }

    while let Some(request) = next_json(&mut ws).await {
        log.lock().push((index, request.clone()));
        if request["action"] != "subscribe" {
            continue;
        }

        if matches!(mode, Upstream::DropFirstAfterSubscribe) && index == 0 {
            let _ = ws.send(Message::Close(None)).await;
            return;
        }

        let bars: Vec<Value> = request["bars"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|symbol| {
                json!({
                    "T": "b", "S": symbol,
                    "o": 1.5, "h": 2.0, "l": 1.25, "c": 1.75, "v": 100,
                    "t": "2024-03-01T14:30:00Z"
                })
            })
            .collect();
        send(&mut ws, Value::Array(bars)).await;
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, frame: Value) {
    let _ = ws.send(Message::Text(frame.to_string().into())).await;
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Option<Value> {
    while let Some(frame) = ws.next().await {
        match frame.ok()? {
            Message::Text(text) => return serde_json::from_str(&text).ok(),
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

// =============================================================================
// Helpers
// =============================================================================

fn stream_config(url: &str) -> AlpacaStreamConfig {
    AlpacaStreamConfig {
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(50),
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        },
        heartbeat: HeartbeatConfig {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(30),
        },
        ..AlpacaStreamConfig::new(url, Credentials::new("key", "secret"))
    }
}

fn real_manager(config: AlpacaStreamConfig) -> Arc<StreamManager> {
    Arc::new(StreamManager::new(
        Arc::new(AlpacaStreamConnector::new(config)),
        Arc::new(FakeMarketData::default()) as Arc<dyn MarketDataPort>,
    ))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

async fn next_event_matching(
    rx: &mut mpsc::Receiver<StreamEvent>,
    mut predicate: impl FnMut(&StreamEvent) -> bool,
) -> StreamEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("no matching event")
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn three_auth_rejections_disable_streaming_and_stop_reconnecting() {
    let upstream = FakeUpstream::start(Upstream::RejectAuth).await;
    let manager = real_manager(stream_config(&upstream.url));

    manager.initialize().await;
    wait_until(|| manager.phase() == StreamPhase::Disabled).await;

    let status = manager.status();
    assert!(!status.enabled);
    assert!(!status.connected);

    // Several reconnect delays pass without another attempt
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(upstream.accepted(), 3);
}

#[tokio::test]
async fn upstream_bar_reaches_subscribed_client() {
    let upstream = FakeUpstream::start(Upstream::Serve).await;
    let manager = real_manager(stream_config(&upstream.url));

    manager.initialize().await;
    wait_until(|| manager.status().connected).await;

    let (client, mut rx) = ClientHandle::channel(16);
    manager.register_client(client.clone());
    manager.subscribe(&client, "AAPL", None).await;

    let bar = timeout(Duration::from_secs(5), async {
        loop {
            if let ServerMessage::StockBar { data } = rx.recv().await.expect("client queue closed")
            {
                return data;
            }
        }
    })
    .await
    .expect("no bar delivered");

    assert_eq!(bar.symbol, "AAPL");
    assert_eq!(bar.open, Decimal::new(15, 1));
    assert_eq!(bar.high, Decimal::new(2, 0));
    assert_eq!(bar.low, Decimal::new(125, 2));
    assert_eq!(bar.close, Decimal::new(175, 2));
    assert_eq!(bar.volume, 100);
    assert_eq!(
        upstream.requests_on(0),
        vec![json!({"action": "subscribe", "bars": ["AAPL"]})]
    );

    manager.shutdown();
}

#[tokio::test]
async fn subscriptions_are_restored_after_reconnect() {
    let upstream = FakeUpstream::start(Upstream::DropFirstAfterSubscribe).await;
    let (tx, mut rx) = mpsc::channel(64);
    let client = AlpacaStreamClient::new(stream_config(&upstream.url), tx);

    client.connect().await.unwrap();
    client
        .subscribe_for_bars(&["AAPL".to_string()])
        .await
        .unwrap();

    next_event_matching(&mut rx, |e| matches!(e, StreamEvent::Error(_))).await;
    wait_until(|| !upstream.requests_on(1).is_empty()).await;

    assert_eq!(upstream.accepted(), 2);
    assert_eq!(
        upstream.requests_on(1)[0],
        json!({"action": "subscribe", "bars": ["AAPL"]})
    );

    client.shutdown();
}

#[tokio::test]
async fn silent_upstream_trips_heartbeat_timeout() {
    let upstream = FakeUpstream::start(Upstream::Silent).await;
    let config = AlpacaStreamConfig {
        heartbeat: HeartbeatConfig {
            ping_interval: Duration::from_millis(50),
            pong_timeout: Duration::from_millis(100),
        },
        ..stream_config(&upstream.url)
    };
    let (tx, mut rx) = mpsc::channel(64);
    let client = AlpacaStreamClient::new(config, tx);

    client.connect().await.unwrap();

    let event = next_event_matching(&mut rx, |e| matches!(e, StreamEvent::Error(_))).await;
    let StreamEvent::Error(fault) = event else {
        unreachable!();
    };
    assert!(fault.message.contains("heartbeat timeout"));
    assert_eq!(fault.code, None);
    assert!(!fault.is_auth_failure());

    client.shutdown();
}

#[tokio::test]
async fn unresponsive_server_hits_connect_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let config = AlpacaStreamConfig {
        connect_timeout: Duration::from_millis(200),
        ..stream_config(&url)
    };
    let (tx, _rx) = mpsc::channel(64);
    let client = AlpacaStreamClient::new(config, tx);

    let result = timeout(Duration::from_secs(5), client.connect())
        .await
        .expect("connect did not give up");

    match result {
        Err(StreamError::ConnectionFailed(message)) => {
            assert!(message.contains("connect timed out"));
        }
        other => panic!("expected connection failure, got {other:?}"),
    }

    client.shutdown();
}
