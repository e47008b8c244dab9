//! Runtime configuration.
//!
//! Every field has a default matching the deployed rig, so an absent file or
//! an empty table is valid. A TOML file may override any subset:
//!
//! ```toml
//! [socket]
//! reconnect_interval_ms = 1000
//! max_reconnect_attempts = 20
//!
//! [stimulus]
//! url = "ws://10.0.0.5:8580/"
//! pause_interval = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{PresenterError, Result};

/// Default engine endpoint for the stimulus display.
pub const DEFAULT_STIMULUS_URL: &str = "ws://localhost:8580/";
/// Default engine endpoint for the session dashboard.
pub const DEFAULT_ADMIN_URL: &str = "ws://localhost:6581/";

/// Reconnection and timeout settings for [`crate::socket::ReconnectingSocket`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Connect as soon as the socket is created.
    pub automatic_open: bool,
    /// Delay before the first reconnection attempt.
    pub reconnect_interval_ms: u64,
    /// Upper bound on the reconnection delay.
    pub max_reconnect_interval_ms: u64,
    /// Growth factor applied per failed attempt.
    pub reconnect_decay: f64,
    /// Abort a connection attempt that has not opened within this time.
    pub timeout_interval_ms: u64,
    /// Stop retrying after this many attempts. Unlimited when absent.
    pub max_reconnect_attempts: Option<u32>,
    /// Log every lifecycle step at debug level.
    pub debug: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            automatic_open: true,
            reconnect_interval_ms: 500,
            max_reconnect_interval_ms: 3000,
            reconnect_decay: 1.5,
            timeout_interval_ms: 2000,
            max_reconnect_attempts: None,
            debug: false,
        }
    }
}

impl SocketConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_interval_ms)
    }
}

/// Settings for the stimulus presentation client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StimulusConfig {
    pub url: String,
    /// Display refresh rate driving the frame loop.
    pub frame_rate: f64,
    /// How long a stimulus stays on screen.
    pub visible_ms: f64,
    /// Minimum time between two stimulus onsets.
    pub trigger_ms: f64,
    /// Uniform random jitter added on top of `trigger_ms`.
    pub trigger_jitter_ms: f64,
    /// Number of stimuli between pauses.
    pub pause_interval: u32,
    /// Interval between calibration strobes.
    pub strobe_interval_ms: f64,
    /// EEG channels drawn as waveforms.
    pub eeg_channels: usize,
    /// Samples per waveform buffer.
    pub eeg_buffer_len: usize,
    /// Values per interleaved sample frame in `eeg_data` payloads.
    pub eeg_sample_stride: usize,
    /// Fixed RNG seed for reproducible sessions.
    pub seed: Option<u64>,
}

impl Default for StimulusConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STIMULUS_URL.to_string(),
            frame_rate: 60.0,
            visible_ms: 300.0,
            trigger_ms: 500.0,
            trigger_jitter_ms: 200.0,
            pause_interval: 20,
            strobe_interval_ms: 500.0,
            eeg_channels: 4,
            eeg_buffer_len: 256,
            eeg_sample_stride: 8,
            seed: None,
        }
    }
}

/// Settings for the session-control dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub url: String,
    pub frame_rate: f64,
    /// User number shown when the dashboard starts.
    pub initial_user_no: u32,
    /// Delay before the user number is bumped after stop/cancel.
    pub user_no_bump_delay_ms: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ADMIN_URL.to_string(),
            frame_rate: 60.0,
            initial_user_no: 1,
            user_no_bump_delay_ms: 1000,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub socket: SocketConfig,
    pub stimulus: StimulusConfig,
    pub admin: AdminConfig,
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PresenterError::Config {
            path: origin.to_string(),
            detail: e.to_string(),
        })
    }

    /// Load from `path`, or fall back to defaults when no path is given.
    ///
    /// # Errors
    /// A path that cannot be read or parsed is an error; the binary refuses to
    /// start with a config the operator did not intend.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(p) => {
                let text = std::fs::read_to_string(p)?;
                Self::from_toml_str(&text, &p.display().to_string())
            }
        }
    }
}

/// Frame period for a given refresh rate, falling back to 60 Hz for
/// non-positive or non-finite rates.
pub fn frame_period(frame_rate: f64) -> Duration {
    let rate = if frame_rate.is_finite() && frame_rate > 0.0 {
        frame_rate
    } else {
        60.0
    };
    Duration::from_secs_f64(1.0 / rate)
}
