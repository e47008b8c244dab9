//! Presentation-side clients for a BCI experiment engine.
//!
//! Two programs share this crate: the stimulus display, which runs the
//! attract/trial/calibration state machine and timestamps every visual change
//! with a marker, and the session dashboard, which starts and stops sessions
//! and shows the engine's progress. Both talk JSON over a
//! [`socket::ReconnectingSocket`].

pub mod admin;
pub mod app;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod fade;
pub mod link;
pub mod marker;
pub mod protocol;
pub mod router;
pub mod socket;
pub mod stimulus;

use std::time::{SystemTime, UNIX_EPOCH};

pub use error::{PresenterError, Result};

/// Current Unix epoch in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
