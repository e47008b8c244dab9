//! Client loops against an engine that never answers.

use std::time::Duration;

use bci_presenter::app::{run_admin, run_stimulus};
use bci_presenter::config::Config;
use tokio::net::TcpListener;

/// Config pointing both clients at a port nobody listens on, with a
/// reconnect cap the socket exhausts within a few hundred milliseconds.
async fn capped_config() -> Config {
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };
    let url = format!("ws://127.0.0.1:{port}/");
    let mut config = Config::default();
    config.socket.reconnect_interval_ms = 10;
    config.socket.max_reconnect_interval_ms = 20;
    config.socket.max_reconnect_attempts = Some(1);
    config.stimulus.url = url.clone();
    config.admin.url = url;
    config
}

#[tokio::test]
async fn test_stimulus_client_outlives_exhausted_reconnects() {
    let config = capped_config().await;
    let run = tokio::time::timeout(Duration::from_secs(2), run_stimulus(config)).await;
    assert!(run.is_err(), "stimulus loop returned after the socket gave up: {run:?}");
}

#[tokio::test]
async fn test_dashboard_outlives_exhausted_reconnects() {
    let config = capped_config().await;
    let run = tokio::time::timeout(Duration::from_secs(2), run_admin(config)).await;
    assert!(run.is_err(), "dashboard loop returned after the socket gave up: {run:?}");
}
