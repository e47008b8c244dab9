//! Reconnecting socket against a real local WebSocket server, plus the
//! backoff law as a property.

use std::time::Duration;

use bci_presenter::config::SocketConfig;
use bci_presenter::socket::{reconnect_delay, ReadyState, ReconnectingSocket, SocketEvent, WsConnector};
use bci_presenter::PresenterError;
use futures_util::{SinkExt, StreamExt};
use proptest::prelude::*;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_test::{assert_err, assert_ok};
use tokio_tungstenite::tungstenite::Message;

fn fast_config() -> SocketConfig {
    SocketConfig {
        reconnect_interval_ms: 20,
        max_reconnect_interval_ms: 100,
        timeout_interval_ms: 1000,
        ..SocketConfig::default()
    }
}

async fn next_event(events: &mut UnboundedReceiver<SocketEvent>) -> SocketEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for socket event")
        .expect("event channel closed")
}

/// Skip events until one matches.
async fn wait_for(
    events: &mut UnboundedReceiver<SocketEvent>,
    pred: impl Fn(&SocketEvent) -> bool,
) -> SocketEvent {
    loop {
        let ev = next_event(events).await;
        if pred(&ev) {
            return ev;
        }
    }
}

/// Accepts connections; each one answers its first text frame with a
/// `users` message. When `drop_after_reply` is set the server then hangs up.
async fn spawn_server(drop_after_reply: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut count = 0u64;
        while let Ok((stream, _)) = listener.accept().await {
            count += 1;
            let n = count;
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() {
                        let reply = format!(r#"{{"type":"users","count":{n}}}"#);
                        if ws.send(Message::Text(reply)).await.is_err() {
                            return;
                        }
                        if drop_after_reply {
                            return;
                        }
                    }
                }
            });
        }
    });
    format!("ws://{addr}/")
}

// ---------------------------------------------------------------------------
// Live connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_connects_and_exchanges_frames() {
    let url = spawn_server(false).await;
    let (socket, mut events) = ReconnectingSocket::connect(WsConnector, url, fast_config());

    assert_eq!(next_event(&mut events).await, SocketEvent::Connecting { close: None });
    assert_eq!(next_event(&mut events).await, SocketEvent::Open { is_reconnect: false });
    assert!(socket.is_open());

    assert_ok!(socket.send(r#"{"action":"poll"}"#));
    assert_eq!(
        next_event(&mut events).await,
        SocketEvent::Message(r#"{"type":"users","count":1}"#.to_string())
    );

    assert_ok!(socket.close());
    wait_for(&mut events, |e| *e == SocketEvent::Close).await;
    socket.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_reconnects_after_server_hangs_up() {
    let url = spawn_server(true).await;
    let (socket, mut events) = ReconnectingSocket::connect(WsConnector, url, fast_config());

    wait_for(&mut events, |e| matches!(e, SocketEvent::Open { .. })).await;
    assert_ok!(socket.send("ping"));
    wait_for(&mut events, |e| matches!(e, SocketEvent::Message(_))).await;

    let lost = wait_for(&mut events, |e| matches!(e, SocketEvent::Connecting { .. })).await;
    assert!(matches!(lost, SocketEvent::Connecting { close: Some(_) }));
    assert_eq!(next_event(&mut events).await, SocketEvent::Close);

    assert_eq!(
        wait_for(&mut events, |e| matches!(e, SocketEvent::Open { .. })).await,
        SocketEvent::Open { is_reconnect: true }
    );
    assert_eq!(socket.reconnect_attempts(), 0);

    assert_ok!(socket.send("again"));
    assert_eq!(
        wait_for(&mut events, |e| matches!(e, SocketEvent::Message(_))).await,
        SocketEvent::Message(r#"{"type":"users","count":2}"#.to_string())
    );
    socket.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_unreachable_engine_keeps_retrying() {
    // Bind then drop to get a port nobody listens on.
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };
    let url = format!("ws://127.0.0.1:{port}/");
    let (socket, mut events) = ReconnectingSocket::connect(WsConnector, url, fast_config());

    for _ in 0..3 {
        wait_for(&mut events, |e| matches!(e, SocketEvent::Error(_))).await;
    }
    assert_eq!(socket.ready_state(), ReadyState::Connecting);
    assert!(socket.reconnect_attempts() >= 2);
    assert!(matches!(assert_err!(socket.send("x")), PresenterError::InvalidState));

    assert_ok!(socket.close());
    wait_for(&mut events, |e| *e == SocketEvent::Close).await;
    assert_eq!(socket.ready_state(), ReadyState::Closed);
}

#[tokio::test]
async fn test_deferred_open() {
    let url = spawn_server(false).await;
    let config = SocketConfig {
        automatic_open: false,
        ..fast_config()
    };
    let (socket, mut events) = ReconnectingSocket::connect(WsConnector, url, config);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err());

    assert_ok!(socket.open());
    wait_for(&mut events, |e| matches!(e, SocketEvent::Open { .. })).await;
    socket.shutdown(Duration::from_secs(1)).await;
}

// ---------------------------------------------------------------------------
// Backoff law
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_delay_grows_geometrically_up_to_cap(
        base in 1u64..5_000,
        cap_extra in 0u64..60_000,
        decay in 1.0f64..4.0,
        attempts in 0u32..64,
    ) {
        let config = SocketConfig {
            reconnect_interval_ms: base,
            max_reconnect_interval_ms: base + cap_extra,
            reconnect_decay: decay,
            ..SocketConfig::default()
        };
        let cap = Duration::from_millis(base + cap_extra);
        let d = reconnect_delay(&config, attempts);
        let next = reconnect_delay(&config, attempts + 1);

        prop_assert!(d <= cap + Duration::from_micros(1));
        prop_assert!(next + Duration::from_micros(1) >= d);

        let expected = (base as f64 * decay.powi(attempts as i32)).min((base + cap_extra) as f64);
        prop_assert!((d.as_secs_f64() * 1000.0 - expected).abs() < 1e-6 * expected.max(1.0));
    }

    #[test]
    fn prop_first_delay_is_base_interval(base in 0u64..10_000) {
        let config = SocketConfig {
            reconnect_interval_ms: base,
            max_reconnect_interval_ms: base,
            ..SocketConfig::default()
        };
        let ms = reconnect_delay(&config, 0).as_secs_f64() * 1000.0;
        prop_assert!((ms - base as f64).abs() < 1e-3);
    }
}
