//! Session-control dashboard state.
//!
//! Holds everything the operator sees: user number, running flag and elapsed
//! time, the stimulus sequence with its per-category histogram, EEG quality
//! and prediction panels and the recording indicator.

use std::collections::BTreeMap;

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AdminConfig;
use crate::link::{EngineLink, EngineSink};
use crate::protocol::{Action, CalibrationTarget, OutboundMessage};

use super::command::AdminCommand;

/// Motor-imagery stimulus categories, indexed by stimulus number.
pub const CATEGORIES: [&str; 4] = ["left", "right", "tongue", "feet"];
/// Prediction classes the engine still reports but the panel no longer shows.
pub const RETIRED_PREDICTIONS: [&str; 4] = ["hat", "tie", "briefcase", "skirt"];
/// Recording indicator opacity right after a `recording` ping.
pub const RECORDING_FLASH: f64 = 1.85;
/// Degrees the category pie turns per stimulus.
pub const PIE_STEP_DEG: f64 = 3.0;
const PIE_START_DEG: f64 = 90.0;
const USER_NO_MODULUS: u32 = 10_000;

/// Channels shown in the quality panel before the first report arrives.
const PLACEHOLDER_QUALITY: [(&str, f64); 8] = [
    ("CP3", 1430.321234),
    ("C3", 2430.321234),
    ("F5", 7430.321234),
    ("PO3", 7430.321234),
    ("PO4", 7430.321234),
    ("F6", 7430.321234),
    ("C4", 7430.321234),
    ("CP4", 7430.321234),
];

/// Whether a control action reached the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Sent,
    /// Engine down or disconnected; local state was still updated.
    NotSent,
    Quit,
    Help,
}

#[derive(Debug, Clone)]
pub struct AdminSession {
    id: Uuid,
    config: AdminConfig,
    user_no: u32,
    running: bool,
    started_at_ms: u64,
    elapsed_seconds: Option<u64>,
    sequence: Vec<u32>,
    histogram: [u32; 4],
    highlighted: Option<u32>,
    pie_rotation: f64,
    eeg_quality: BTreeMap<String, f64>,
    prediction: BTreeMap<String, f64>,
    recording_opacity: f64,
    eeg_samples: u64,
    bump_at: Vec<u64>,
    last_timestamp: Option<f64>,
    pub status_text: String,
    pub value_text: String,
    pub users_text: String,
    pub graph_url: Option<String>,
    pub engine_down_banner: bool,
}

impl AdminSession {
    pub fn new(config: AdminConfig) -> Self {
        let user_no = config.initial_user_no % USER_NO_MODULUS;
        let mut session = Self {
            id: Uuid::new_v4(),
            config,
            user_no,
            running: false,
            started_at_ms: 0,
            elapsed_seconds: None,
            sequence: Vec::new(),
            histogram: [0; 4],
            highlighted: None,
            pie_rotation: PIE_START_DEG,
            eeg_quality: PLACEHOLDER_QUALITY
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            prediction: BTreeMap::new(),
            recording_opacity: 0.0,
            eeg_samples: 0,
            bump_at: Vec::new(),
            last_timestamp: None,
            status_text: String::new(),
            value_text: String::new(),
            users_text: String::new(),
            graph_url: None,
            // The dashboard opens with the banner up until the engine speaks.
            engine_down_banner: true,
        };
        let placeholder: BTreeMap<String, f64> = [
            ("hat", 0.1),
            ("tie", 0.2),
            ("briefcase", 0.3),
            ("skirt", 0.4),
            ("yellow", 0.5),
            ("blue", 0.6),
            ("green", 0.7),
            ("red", 0.8),
            ("child", 0.9),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();
        session.update_prediction(placeholder);
        session
    }

    // -- Accessors -----------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_no(&self) -> u32 {
        self.user_no
    }

    /// Four-digit zero-padded user number as shown to the operator.
    pub fn user_no_label(&self) -> String {
        format!("{:04}", self.user_no)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn elapsed_seconds(&self) -> Option<u64> {
        self.elapsed_seconds
    }

    pub fn sequence(&self) -> &[u32] {
        &self.sequence
    }

    /// `" 00, 03, 01,"`, two digits per stimulus.
    pub fn sequence_label(&self) -> String {
        self.sequence.iter().map(|s| format!(" {s:02},")).collect()
    }

    pub fn histogram(&self) -> &[u32; 4] {
        &self.histogram
    }

    pub fn highlighted(&self) -> Option<u32> {
        self.highlighted
    }

    pub fn pie_rotation(&self) -> f64 {
        self.pie_rotation
    }

    pub fn eeg_quality(&self) -> &BTreeMap<String, f64> {
        &self.eeg_quality
    }

    pub fn prediction(&self) -> &BTreeMap<String, f64> {
        &self.prediction
    }

    pub fn recording_opacity(&self) -> f64 {
        self.recording_opacity
    }

    pub fn eeg_samples(&self) -> u64 {
        self.eeg_samples
    }

    // -- Operator actions ------------------------------------------------------

    /// Run one operator command at wall-clock `now_ms`.
    pub fn apply<S: EngineSink>(
        &mut self,
        cmd: AdminCommand,
        now_ms: u64,
        link: &mut EngineLink<S>,
    ) -> Outcome {
        match cmd {
            AdminCommand::Start => self.start(now_ms, link),
            AdminCommand::Stop => self.stop(now_ms, link),
            AdminCommand::Cancel => self.cancel(now_ms, link),
            AdminCommand::Accumulate => control(link, OutboundMessage::new(Action::Accumulate).with_timestamp(now_ms)),
            AdminCommand::StartFitting => {
                control(link, OutboundMessage::new(Action::StartFitting).with_timestamp(now_ms))
            }
            AdminCommand::SetUserNo(n) => self.set_user_no(n, now_ms, link),
            AdminCommand::Calibrate(what) => self.calibrate(what, now_ms, link),
            AdminCommand::Plus => plain(link, Action::Plus),
            AdminCommand::Minus => plain(link, Action::Minus),
            AdminCommand::Poll => plain(link, Action::Poll),
            AdminCommand::Help => Outcome::Help,
            AdminCommand::Quit => Outcome::Quit,
        }
    }

    pub fn start<S: EngineSink>(&mut self, now_ms: u64, link: &mut EngineLink<S>) -> Outcome {
        info!(session = %self.id, user_no = self.user_no, "session start");
        let outcome = control(
            link,
            OutboundMessage::new(Action::Start)
                .with_timestamp(now_ms)
                .with_user_no(self.user_no),
        );
        self.started_at_ms = now_ms;
        self.elapsed_seconds = None;
        self.sequence.clear();
        self.histogram = [0; 4];
        self.running = true;
        outcome
    }

    pub fn stop<S: EngineSink>(&mut self, now_ms: u64, link: &mut EngineLink<S>) -> Outcome {
        info!(session = %self.id, user_no = self.user_no, "session stop");
        let outcome = control(link, OutboundMessage::new(Action::Stop).with_timestamp(now_ms));
        self.end_session(now_ms);
        outcome
    }

    pub fn cancel<S: EngineSink>(&mut self, now_ms: u64, link: &mut EngineLink<S>) -> Outcome {
        info!(session = %self.id, user_no = self.user_no, "session cancel");
        let outcome = control(link, OutboundMessage::new(Action::Cancel).with_timestamp(now_ms));
        self.end_session(now_ms);
        outcome
    }

    pub fn set_user_no<S: EngineSink>(
        &mut self,
        user_no: Option<u32>,
        now_ms: u64,
        link: &mut EngineLink<S>,
    ) -> Outcome {
        if let Some(n) = user_no {
            self.user_no = n % USER_NO_MODULUS;
        }
        control(
            link,
            OutboundMessage::new(Action::SetUserNo)
                .with_timestamp(now_ms)
                .with_user_no(self.user_no),
        )
    }

    pub fn calibrate<S: EngineSink>(
        &mut self,
        what: CalibrationTarget,
        now_ms: u64,
        link: &mut EngineLink<S>,
    ) -> Outcome {
        info!(session = %self.id, %what, "latency calibration requested");
        control(
            link,
            OutboundMessage::new(Action::Calibrate)
                .with_timestamp(now_ms)
                .with_what(what),
        )
    }

    fn end_session(&mut self, now_ms: u64) {
        self.running = false;
        self.bump_at
            .push(now_ms.saturating_add(self.config.user_no_bump_delay_ms));
    }

    // -- Engine updates ----------------------------------------------------------

    /// Append a stimulus to the sequence and count it in its category.
    pub fn record_stimulus(&mut self, stimulus: u32) {
        self.sequence.push(stimulus);
        self.highlighted = Some(stimulus);
        if let Some(bin) = self.histogram.get_mut(stimulus as usize) {
            *bin += 1;
        } else {
            debug!(stimulus, "stimulus outside the category table");
        }
        self.pie_rotation += PIE_STEP_DEG;
    }

    pub fn update_eeg_quality(&mut self, data: BTreeMap<String, f64>) {
        self.eeg_quality = data;
    }

    /// Replace the prediction panel, dropping retired classes and pinning
    /// `child` to zero.
    pub fn update_prediction(&mut self, mut data: BTreeMap<String, f64>) {
        for retired in RETIRED_PREDICTIONS {
            data.remove(retired);
        }
        data.insert("child".to_string(), 0.0);
        self.prediction = data;
    }

    pub fn flash_recording(&mut self) {
        self.recording_opacity = RECORDING_FLASH;
    }

    pub fn set_eeg_samples(&mut self, count: u64) {
        self.eeg_samples = count;
    }

    // -- Frame tick ----------------------------------------------------------------

    /// Advance one frame: elapsed-time readout, recording fade and any due
    /// user-number bump.
    pub fn tick(&mut self, timestamp_ms: f64, now_ms: u64) {
        let elapsed = match self.last_timestamp {
            Some(last) => (timestamp_ms - last).max(0.0),
            None => 0.0,
        };
        self.last_timestamp = Some(timestamp_ms);

        if self.running {
            self.elapsed_seconds = Some(now_ms.saturating_sub(self.started_at_ms) / 1000);
        }

        self.recording_opacity = (self.recording_opacity - elapsed / 1000.0).max(0.0);

        let before = self.bump_at.len();
        self.bump_at.retain(|due| *due > now_ms);
        for _ in self.bump_at.len()..before {
            self.user_no = (self.user_no + 1) % USER_NO_MODULUS;
            debug!(user_no = self.user_no, "user number advanced");
        }
    }
}

/// Session-control messages go out only while the engine is up.
fn control<S: EngineSink>(link: &mut EngineLink<S>, msg: OutboundMessage) -> Outcome {
    if link.post_if_up(&msg) {
        Outcome::Sent
    } else {
        Outcome::NotSent
    }
}

/// `plus` / `minus` / `poll` are always attempted.
fn plain<S: EngineSink>(link: &mut EngineLink<S>, action: Action) -> Outcome {
    if link.post(&OutboundMessage::new(action)) {
        Outcome::Sent
    } else {
        Outcome::NotSent
    }
}
