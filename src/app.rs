//! Client run loops.
//!
//! Each client is a single task that owns all of its state and multiplexes the
//! frame interval, socket lifecycle events, stdin (dashboard only) and Ctrl-C.
//! Only Ctrl-C or `quit` ends a loop; a socket that stops reconnecting leaves
//! the client running with the engine-down indicator.

use std::time::Duration;

use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::admin::{self, AdminCommand, AdminSession, Outcome, HELP};
use crate::config::{frame_period, Config};
use crate::display::{admin_line, admin_panels, print_header, stimulus_line, StatusPrinter};
use crate::error::Result;
use crate::link::{EngineLink, EngineSink};
use crate::now_ms;
use crate::router::Routed;
use crate::socket::{ReconnectingSocket, SocketEvent, WsConnector};
use crate::stimulus::{self, StimulusMachine};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Whether a lifecycle event means the engine just became unreachable.
pub fn link_lost(event: &SocketEvent) -> bool {
    matches!(
        event,
        SocketEvent::Error(_) | SocketEvent::Close | SocketEvent::Connecting { close: Some(_) }
    )
}

/// Milliseconds since `start`, as the frame timestamp fed to `tick`.
fn frame_timestamp(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

// ---------------------------------------------------------------------------
// Stimulus client
// ---------------------------------------------------------------------------

/// Apply one socket event to the stimulus client.
pub fn on_stimulus_event<R: rand::Rng, S: EngineSink>(
    machine: &mut StimulusMachine<R>,
    link: &mut EngineLink<S>,
    event: SocketEvent,
) {
    match event {
        SocketEvent::Message(text) => {
            if stimulus::handle_message(machine, link, &text) == Routed::Malformed {
                debug!(len = text.len(), "dropped malformed frame");
            }
        }
        SocketEvent::Open { is_reconnect } => debug!(is_reconnect, "socket open"),
        other if link_lost(&other) => stimulus::handle_link_down(machine, link),
        _ => {}
    }
}

pub async fn run_stimulus(config: Config) -> Result<()> {
    let url = config.stimulus.url.clone();
    print_header("BCI stimulus display", &url);

    let (socket, mut events) = ReconnectingSocket::connect(WsConnector, url, config.socket.clone());
    let mut link = EngineLink::new(socket);
    let mut machine = StimulusMachine::new(config.stimulus.clone());
    let mut printer = StatusPrinter::new();
    let mut events_open = true;

    let mut frames = interval(frame_period(config.stimulus.frame_rate));
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let start = Instant::now();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = frames.tick() => {
                machine.tick(frame_timestamp(start), now_ms(), &mut link);
                printer.print_if_changed(stimulus_line(&machine, link.status()));
            }
            event = events.recv(), if events_open => match event {
                Some(event) => on_stimulus_event(&mut machine, &mut link, event),
                None => {
                    warn!("socket gave up reconnecting, engine stays down");
                    events_open = false;
                    stimulus::handle_link_down(&mut machine, &mut link);
                }
            },
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
        }
    }

    info!(sent = link.sent_count(), dropped = link.dropped_count(), "stimulus client stopping");
    link.into_sink().shutdown(SHUTDOWN_TIMEOUT).await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Admin dashboard
// ---------------------------------------------------------------------------

/// Apply one socket event to the dashboard.
pub fn on_admin_event<S: EngineSink>(
    session: &mut AdminSession,
    link: &mut EngineLink<S>,
    event: SocketEvent,
) {
    match event {
        SocketEvent::Message(text) => {
            admin::handle_message(session, link, &text);
        }
        SocketEvent::Open { is_reconnect } => debug!(is_reconnect, "socket open"),
        other if link_lost(&other) => admin::handle_link_down(session, link),
        _ => {}
    }
}

/// Parse and run one stdin line. Returns `false` when the operator quits.
pub fn on_admin_line<S: EngineSink>(
    session: &mut AdminSession,
    link: &mut EngineLink<S>,
    line: &str,
    now_ms: u64,
) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return true;
    }
    let cmd: AdminCommand = match line.parse() {
        Ok(cmd) => cmd,
        Err(e) => {
            println!("{} {}", "Error:".bright_red(), e);
            return true;
        }
    };
    match session.apply(cmd, now_ms, link) {
        Outcome::Quit => return false,
        Outcome::Help => {
            println!("{HELP}");
            print!("{}", admin_panels(session));
        }
        Outcome::NotSent => {
            println!("{} {:?} not sent, engine is {}", "Warning:".bright_yellow(), cmd, link.status());
        }
        Outcome::Sent => {
            if matches!(cmd, AdminCommand::Stop | AdminCommand::Cancel) {
                print!("{}", admin_panels(session));
            }
        }
    }
    true
}

pub async fn run_admin(config: Config) -> Result<()> {
    let url = config.admin.url.clone();
    print_header("BCI session dashboard", &url);
    println!("{HELP}");

    let session = AdminSession::new(config.admin.clone());
    let span = info_span!("admin", session = %session.id());
    admin_loop(config, session).instrument(span).await
}

async fn admin_loop(config: Config, mut session: AdminSession) -> Result<()> {
    let (socket, mut events) =
        ReconnectingSocket::connect(WsConnector, config.admin.url.clone(), config.socket.clone());
    let mut link = EngineLink::new(socket);
    let mut printer = StatusPrinter::new();

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let mut stdin_open = true;
    let mut events_open = true;

    let mut frames = interval(frame_period(config.admin.frame_rate));
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let start = Instant::now();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = frames.tick() => {
                session.tick(frame_timestamp(start), now_ms());
                printer.print_if_changed(admin_line(&session, link.status()));
            }
            event = events.recv(), if events_open => match event {
                Some(event) => on_admin_event(&mut session, &mut link, event),
                None => {
                    warn!("socket gave up reconnecting, engine stays down");
                    events_open = false;
                    admin::handle_link_down(&mut session, &mut link);
                }
            },
            line = lines.next(), if stdin_open => match line {
                Some(Ok(line)) => {
                    if !on_admin_line(&mut session, &mut link, &line, now_ms()) {
                        break;
                    }
                }
                Some(Err(e)) => {
                    debug!(error = %e, "stdin read failed");
                    stdin_open = false;
                }
                None => {
                    debug!("stdin closed, commands disabled");
                    stdin_open = false;
                }
            },
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
        }
    }

    info!(sent = link.sent_count(), dropped = link.dropped_count(), "dashboard stopping");
    link.into_sink().shutdown(SHUTDOWN_TIMEOUT).await;
    Ok(())
}
