//! Engine link: tri-state reachability plus fire-and-forget sends.
//!
//! Both clients treat the engine as `Unknown` until the first frame arrives,
//! `Up` while frames keep arriving and `Down` after a transport error or an
//! unexpected close. Marker events are only sent while `Up`; polls are always
//! attempted so a recovered engine is noticed again.

use tracing::{error, info, trace, warn};

use crate::error::{PresenterError, Result};
use crate::protocol::OutboundMessage;
use crate::socket::ReconnectingSocket;

/// Shown in place of the user count while the engine is unreachable.
pub const ENGINE_DOWN_TEXT: &str = "The engine isn't up and running";

/// Reachability of the engine as seen by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
    /// Nothing received yet.
    #[default]
    Unknown,
    Up,
    Down,
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkStatus::Unknown => write!(f, "unknown"),
            LinkStatus::Up => write!(f, "up"),
            LinkStatus::Down => write!(f, "down"),
        }
    }
}

/// Anything that can carry a serialized frame to the engine.
pub trait EngineSink {
    fn send_text(&mut self, text: String) -> Result<()>;
}

impl EngineSink for ReconnectingSocket {
    fn send_text(&mut self, text: String) -> Result<()> {
        self.send(text)
    }
}

/// Collects frames in memory; used by tests and dry runs.
impl EngineSink for Vec<String> {
    fn send_text(&mut self, text: String) -> Result<()> {
        self.push(text);
        Ok(())
    }
}

impl<S: EngineSink + ?Sized> EngineSink for &mut S {
    fn send_text(&mut self, text: String) -> Result<()> {
        (**self).send_text(text)
    }
}

/// A sink paired with the engine's reachability.
#[derive(Debug)]
pub struct EngineLink<S> {
    sink: S,
    status: LinkStatus,
    sent: u64,
    dropped: u64,
}

impl<S: EngineSink> EngineLink<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            status: LinkStatus::Unknown,
            sent: 0,
            dropped: 0,
        }
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    pub fn is_up(&self) -> bool {
        self.status == LinkStatus::Up
    }

    pub fn is_down(&self) -> bool {
        self.status == LinkStatus::Down
    }

    /// Record that a frame arrived. Returns `true` when this recovered the
    /// link from `Down`.
    pub fn mark_up(&mut self) -> bool {
        let recovered = self.status == LinkStatus::Down;
        if self.status != LinkStatus::Up {
            info!(previous = %self.status, "engine link up");
        }
        self.status = LinkStatus::Up;
        recovered
    }

    /// Record a transport failure. Returns `true` when the link was `Up`.
    pub fn mark_down(&mut self) -> bool {
        let was_up = self.status == LinkStatus::Up;
        if was_up {
            warn!("engine link down");
        }
        self.status = LinkStatus::Down;
        was_up
    }

    /// Try to send regardless of status. Failures are dropped; returns whether
    /// the frame was handed to the transport.
    pub fn post(&mut self, msg: &OutboundMessage) -> bool {
        let text = match msg.to_json() {
            Ok(t) => t,
            Err(e) => {
                error!(action = %msg.action, error = %e, "failed to encode outbound message");
                return false;
            }
        };
        match self.sink.send_text(text) {
            Ok(()) => {
                self.sent += 1;
                true
            }
            Err(PresenterError::InvalidState) => {
                self.dropped += 1;
                trace!(action = %msg.action, "engine not connected, message dropped");
                false
            }
            Err(e) => {
                self.dropped += 1;
                warn!(action = %msg.action, error = %e, "send failed, message dropped");
                false
            }
        }
    }

    /// Send only while the engine is known to be up.
    pub fn post_if_up(&mut self, msg: &OutboundMessage) -> bool {
        if !self.is_up() {
            self.dropped += 1;
            return false;
        }
        self.post(msg)
    }

    pub fn sent_count(&self) -> u64 {
        self.sent
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
