//! Reconnecting WebSocket facade.
//!
//! [`ReconnectingSocket`] behaves like a plain message socket, except that a
//! failed or lost connection is retried in the background with exponential
//! backoff. Callers hold a cheap handle with `send`/`close`/`refresh` and
//! consume lifecycle events from a channel:
//!
//! ```text
//! Connecting
//! Open { is_reconnect: false }
//! Message(..)
//! Connecting { close: Some(..) }   // lost connection
//! Close
//! Open { is_reconnect: true }      // some time later
//! Message(..)
//! ```
//!
//! ## Design
//! - The connection is owned by a single background task; the handle talks to
//!   it over an unbounded command channel.
//! - Ready state and attempt counter are mirrored into atomics so `send` can
//!   fail synchronously with [`PresenterError::InvalidState`] while
//!   disconnected.
//! - The transport sits behind [`Connector`] / [`Connection`]; production uses
//!   [`WsConnector`] on top of `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::SocketConfig;
use crate::error::{PresenterError, Result};

/// Close code sent on a caller-initiated close when none is given.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the peer vanished without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// Why a connection ended, as reported by the peer or the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: Option<u16>,
    pub reason: String,
    pub was_clean: bool,
}

impl CloseInfo {
    /// The connection dropped without a close handshake.
    pub fn abnormal() -> Self {
        Self {
            code: Some(CLOSE_ABNORMAL),
            reason: String::new(),
            was_clean: false,
        }
    }
}

/// One item read from a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    Closed(CloseInfo),
}

/// A single established connection.
#[async_trait]
pub trait Connection: Send + 'static {
    async fn send(&mut self, text: String) -> Result<()>;
    /// Wait for the next text frame or the end of the connection.
    async fn recv(&mut self) -> Result<Incoming>;
    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;
}

/// Factory for connections; called once per attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: Connection;
    async fn connect(&self, url: &str) -> Result<Self::Conn>;
}

/// Production connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

/// A `tokio-tungstenite` client stream.
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connector for WsConnector {
    type Conn = WsConnection;

    async fn connect(&self, url: &str) -> Result<WsConnection> {
        let (stream, _response) = tokio_tungstenite::connect_async(url).await?;
        Ok(WsConnection { stream })
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream.send(WsMessage::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Incoming> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => return Ok(Incoming::Text(text)),
                Some(Ok(WsMessage::Binary(bytes))) => {
                    return Ok(Incoming::Text(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let info = match frame {
                        Some(f) => CloseInfo {
                            code: Some(u16::from(f.code)),
                            reason: f.reason.into_owned(),
                            was_clean: true,
                        },
                        None => CloseInfo {
                            code: None,
                            reason: String::new(),
                            was_clean: true,
                        },
                    };
                    return Ok(Incoming::Closed(info));
                }
                // Ping/pong are answered by tungstenite itself.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(Incoming::Closed(CloseInfo::abnormal())),
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        };
        self.stream.close(Some(frame)).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Lifecycle state, numbered like the browser WebSocket constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Lifecycle events, named after the wrapped socket's callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A connection attempt is starting, or a live connection was just lost
    /// (`close` carries what the transport reported).
    Connecting { close: Option<CloseInfo> },
    Open { is_reconnect: bool },
    Message(String),
    Error(String),
    /// Reported once per lost established connection, and once more as the
    /// terminal event after a caller-initiated close.
    Close,
}

/// Delay before the next reconnection attempt:
/// `min(reconnect_interval × decay^attempts, max_reconnect_interval)`.
pub fn reconnect_delay(config: &SocketConfig, attempts: u32) -> Duration {
    let exp = attempts.min(i32::MAX as u32) as i32;
    let raw = config.reconnect_interval_ms as f64 * config.reconnect_decay.powi(exp);
    let capped = raw.min(config.max_reconnect_interval_ms as f64).max(0.0);
    Duration::from_secs_f64(capped / 1000.0)
}

#[derive(Debug)]
enum Command {
    Open,
    Send(String),
    Close { code: u16, reason: String },
    Refresh,
}

struct Shared {
    ready_state: AtomicU8,
    reconnect_attempts: AtomicU32,
}

/// Handle to a reconnecting socket. Dropping it closes the socket.
pub struct ReconnectingSocket {
    url: String,
    debug: bool,
    shared: Arc<Shared>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl std::fmt::Debug for ReconnectingSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectingSocket")
            .field("url", &self.url)
            .field("ready_state", &self.ready_state())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish()
    }
}

impl ReconnectingSocket {
    /// Spawn the socket task and return the handle plus its event stream.
    ///
    /// Must be called from within a tokio runtime. With
    /// `config.automatic_open` the first attempt starts immediately;
    /// otherwise call [`open`](Self::open).
    pub fn connect<C: Connector>(
        connector: C,
        url: impl Into<String>,
        config: SocketConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SocketEvent>) {
        let url = url.into();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            ready_state: AtomicU8::new(ReadyState::Connecting as u8),
            reconnect_attempts: AtomicU32::new(0),
        });

        let ctx = Ctx {
            url: url.clone(),
            debug: config.debug,
            shared: Arc::clone(&shared),
            events: event_tx,
        };
        let debug = config.debug;
        let task = tokio::spawn(socket_task(connector, config, ctx, cmd_rx));

        let socket = Self {
            url,
            debug,
            shared,
            cmd_tx,
            task: Some(task),
        };
        (socket, event_rx)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.shared.ready_state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Attempts made since creation or since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.reconnect_attempts.load(Ordering::Acquire)
    }

    /// Start connecting when created with `automatic_open = false`.
    /// Has no effect once the socket is running.
    pub fn open(&self) -> Result<()> {
        self.cmd_tx
            .send(Command::Open)
            .map_err(|_| PresenterError::SocketClosed)
    }

    /// Queue a text frame on the live connection.
    ///
    /// # Errors
    /// [`PresenterError::InvalidState`] when not open. The frame is not queued;
    /// buffering across reconnects is up to the caller.
    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        if !self.is_open() {
            return Err(PresenterError::InvalidState);
        }
        let text = text.into();
        if self.debug {
            debug!(url = %self.url, data = %text, "send");
        }
        self.cmd_tx
            .send(Command::Send(text))
            .map_err(|_| PresenterError::SocketClosed)
    }

    /// Close with code 1000 and suppress any further reconnection.
    pub fn close(&self) -> Result<()> {
        self.close_with(CLOSE_NORMAL, "")
    }

    pub fn close_with(&self, code: u16, reason: &str) -> Result<()> {
        self.cmd_tx
            .send(Command::Close {
                code,
                reason: reason.to_string(),
            })
            .map_err(|_| PresenterError::SocketClosed)
    }

    /// Drop the live connection without suppressing reconnection, e.g. after
    /// missed heartbeats.
    pub fn refresh(&self) -> Result<()> {
        self.cmd_tx
            .send(Command::Refresh)
            .map_err(|_| PresenterError::SocketClosed)
    }

    /// Close and wait (bounded) for the socket task to finish.
    pub async fn shutdown(mut self, timeout: Duration) {
        let _ = self.close();
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(timeout, task).await.is_err() {
                warn!(url = %self.url, "socket task did not stop in time");
            }
        }
    }
}

impl Drop for ReconnectingSocket {
    fn drop(&mut self) {
        // The task observes the closed command channel and treats it as a
        // forced close; nothing else to do here.
        self.task.take();
    }
}

// ---------------------------------------------------------------------------
// Socket task
// ---------------------------------------------------------------------------

struct Ctx {
    url: String,
    debug: bool,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl Ctx {
    fn emit(&self, event: SocketEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: ReadyState) {
        self.shared.ready_state.store(state as u8, Ordering::Release);
    }

    fn attempts(&self) -> u32 {
        self.shared.reconnect_attempts.load(Ordering::Acquire)
    }

    fn set_attempts(&self, n: u32) {
        self.shared.reconnect_attempts.store(n, Ordering::Release);
    }

    fn step(&self, step: &str) {
        if self.debug {
            debug!(url = %self.url, step, "reconnecting socket");
        }
    }

    fn finish_closed(&self) {
        self.set_state(ReadyState::Closed);
        self.emit(SocketEvent::Close);
    }
}

enum Outcome {
    /// Caller asked for the socket to close (or dropped the handle).
    Forced,
    /// The attempt failed or the connection was lost.
    Lost {
        close: Option<CloseInfo>,
        timed_out: bool,
    },
}

async fn socket_task<C: Connector>(
    connector: C,
    config: SocketConfig,
    ctx: Ctx,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
) {
    if !config.automatic_open && !wait_for_open(&mut cmd_rx, &ctx).await {
        ctx.finish_closed();
        return;
    }

    let mut reconnect_attempt = false;
    let mut announced_loss = false;

    loop {
        if reconnect_attempt {
            if let Some(max) = config.max_reconnect_attempts.filter(|m| *m > 0) {
                if ctx.attempts() > max {
                    debug!(url = %ctx.url, max, "reconnect attempts exhausted, giving up");
                    ctx.set_state(ReadyState::Closed);
                    return;
                }
            }
        } else {
            ctx.emit(SocketEvent::Connecting { close: None });
            ctx.set_attempts(0);
        }

        ctx.set_state(ReadyState::Connecting);
        ctx.step("attempt-connect");

        let outcome = attempt(
            &connector,
            &config,
            &ctx,
            &mut cmd_rx,
            &mut reconnect_attempt,
            &mut announced_loss,
        )
        .await;

        let (close, timed_out) = match outcome {
            Outcome::Forced => {
                ctx.finish_closed();
                info!(url = %ctx.url, "engine socket closed");
                return;
            }
            Outcome::Lost { close, timed_out } => (close, timed_out),
        };

        ctx.set_state(ReadyState::Connecting);
        ctx.emit(SocketEvent::Connecting { close });
        if !reconnect_attempt && !timed_out {
            ctx.step("onclose");
            ctx.emit(SocketEvent::Close);
        }

        let delay = reconnect_delay(&config, ctx.attempts());
        if !backoff(delay, &mut cmd_rx, &ctx).await {
            ctx.finish_closed();
            return;
        }
        ctx.set_attempts(ctx.attempts().saturating_add(1));
        reconnect_attempt = true;
    }
}

/// Block until the caller opens the socket. Returns `false` if it was closed
/// first.
async fn wait_for_open(cmd_rx: &mut mpsc::UnboundedReceiver<Command>, ctx: &Ctx) -> bool {
    loop {
        match cmd_rx.recv().await {
            Some(Command::Open) => return true,
            Some(Command::Close { .. }) | None => return false,
            Some(Command::Send(_)) | Some(Command::Refresh) => {
                ctx.step("ignored before open");
            }
        }
    }
}

/// Sleep for `delay` unless a forced close arrives. Returns `false` on close.
async fn backoff(
    delay: Duration,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    ctx: &Ctx,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Close { .. }) | None => return false,
                Some(Command::Send(_)) => ctx.step("dropped send while reconnecting"),
                Some(Command::Open) | Some(Command::Refresh) => {}
            },
        }
    }
}

async fn attempt<C: Connector>(
    connector: &C,
    config: &SocketConfig,
    ctx: &Ctx,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    reconnect_attempt: &mut bool,
    announced_loss: &mut bool,
) -> Outcome {
    let connect = tokio::time::timeout(config.timeout(), connector.connect(&ctx.url));
    tokio::pin!(connect);

    let conn = loop {
        tokio::select! {
            res = &mut connect => match res {
                Ok(Ok(conn)) => break conn,
                Ok(Err(e)) => {
                    ctx.step("onerror");
                    if !*announced_loss {
                        warn!(url = %ctx.url, error = %e, "engine unreachable, will keep retrying");
                        *announced_loss = true;
                    }
                    ctx.emit(SocketEvent::Error(e.to_string()));
                    return Outcome::Lost { close: None, timed_out: false };
                }
                Err(_) => {
                    ctx.step("connection-timeout");
                    if !*announced_loss {
                        let e = PresenterError::ConnectTimeout {
                            url: ctx.url.clone(),
                            timeout_ms: config.timeout_interval_ms,
                        };
                        warn!(error = %e, "engine unreachable, will keep retrying");
                        *announced_loss = true;
                    }
                    return Outcome::Lost { close: None, timed_out: true };
                }
            },
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Close { .. }) | None => return Outcome::Forced,
                Some(Command::Send(_)) => ctx.step("dropped send while connecting"),
                Some(Command::Open) | Some(Command::Refresh) => {}
            },
        }
    };

    ctx.step("onopen");
    ctx.set_state(ReadyState::Open);
    ctx.set_attempts(0);
    info!(url = %ctx.url, reconnect = *reconnect_attempt, "connected to engine");
    ctx.emit(SocketEvent::Open {
        is_reconnect: *reconnect_attempt,
    });
    *reconnect_attempt = false;
    *announced_loss = false;

    session(conn, ctx, cmd_rx).await
}

/// Pump one established connection until it ends.
async fn session<T: Connection>(
    mut conn: T,
    ctx: &Ctx,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
) -> Outcome {
    loop {
        tokio::select! {
            incoming = conn.recv() => match incoming {
                Ok(Incoming::Text(text)) => {
                    ctx.step("onmessage");
                    ctx.emit(SocketEvent::Message(text));
                }
                Ok(Incoming::Closed(info)) => {
                    warn!(url = %ctx.url, code = ?info.code, "engine connection lost");
                    return Outcome::Lost { close: Some(info), timed_out: false };
                }
                Err(e) => {
                    ctx.step("onerror");
                    warn!(url = %ctx.url, error = %e, "engine connection failed");
                    ctx.emit(SocketEvent::Error(e.to_string()));
                    return Outcome::Lost { close: Some(CloseInfo::abnormal()), timed_out: false };
                }
            },
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Send(text)) => {
                    if let Err(e) = conn.send(text).await {
                        ctx.step("onerror");
                        ctx.emit(SocketEvent::Error(e.to_string()));
                        return Outcome::Lost { close: Some(CloseInfo::abnormal()), timed_out: false };
                    }
                }
                Some(Command::Close { code, reason }) => {
                    ctx.set_state(ReadyState::Closing);
                    if let Err(e) = conn.close(code, &reason).await {
                        debug!(url = %ctx.url, error = %e, "close handshake failed");
                    }
                    return Outcome::Forced;
                }
                None => {
                    ctx.set_state(ReadyState::Closing);
                    let _ = conn.close(CLOSE_NORMAL, "").await;
                    return Outcome::Forced;
                }
                Some(Command::Refresh) => {
                    let _ = conn.close(CLOSE_NORMAL, "refresh").await;
                    return Outcome::Lost {
                        close: Some(CloseInfo {
                            code: Some(CLOSE_NORMAL),
                            reason: "refresh".to_string(),
                            was_clean: true,
                        }),
                        timed_out: false,
                    };
                }
                Some(Command::Open) => {}
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
