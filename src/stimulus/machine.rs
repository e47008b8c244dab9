//! Frame-driven visual state machine for the stimulus display.
//!
//! Two tiers of state:
//!
//! * [`ClientMode`] is what the engine last asked for (`attract`, `trial`,
//!   `stop`). Router handlers flip it abruptly.
//! * [`VisualMode`] is what is on screen. Only [`StimulusMachine::tick`]
//!   changes it, and only at points where the current animation allows it, so
//!   a mode change from the engine never cuts a fade or a visible stimulus
//!   short.
//!
//! ```text
//!   init ──► attract ──(trial)──► leaving_attract ──► going_to_trial ──► trial
//!     ▲                                                    ▲              │
//!     │                                                    └──(pause)─────┤
//!     │         attract ◄──────────────(attract at erase time)────────────┘
//!     └── calibrate (entered on request from any mode, ends in init)
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::StimulusConfig;
use crate::fade::{clamp_unit, frame_step};
use crate::link::{EngineLink, EngineSink};
use crate::marker::MarkerId;
use crate::protocol::{Action, OutboundMessage};

use super::eeg::EegWaveform;
use super::scene::{calibration_label, stimulus_label, Backdrop, Placement, Scene, ShownStimulus};

/// Ceiling for the logo fade-in.
const LOGO_MAX: f64 = 0.3;
/// Suspect-ground opacity reached before a trial.
const GROUND_MAX: f64 = 0.35;
/// Stimulus indices are two decimal digits on screen and in marker ids.
const STIMULUS_SLOTS: u32 = 100;
/// Calibration cue words and their strobes.
const CALIBRATION_CUES: [(u32, &str); 4] = [(2, "Tap"), (4, "eight"), (6, "times"), (8, "now:")];
const FIRST_TAP_STROBE: u32 = 10;
const LAST_TAP_STROBE: u32 = 17;
const END_STROBE: u32 = 18;

/// What the screen is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualMode {
    Init,
    Attract,
    LeavingAttract,
    GoingToTrial,
    Trial,
    Calibrate,
}

impl std::fmt::Display for VisualMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VisualMode::Init => "init",
            VisualMode::Attract => "attract",
            VisualMode::LeavingAttract => "leaving_attract",
            VisualMode::GoingToTrial => "going_to_trial",
            VisualMode::Trial => "trial",
            VisualMode::Calibrate => "calibrate",
        };
        write!(f, "{s}")
    }
}

/// What the engine last asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientMode {
    #[default]
    Attract,
    Trial,
    Stop,
}

impl std::fmt::Display for ClientMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientMode::Attract => write!(f, "attract"),
            ClientMode::Trial => write!(f, "trial"),
            ClientMode::Stop => write!(f, "stop"),
        }
    }
}

/// Linear countdown timers (seconds) for the pre-trial sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Countdown {
    prepare: f64,
    countdown: f64,
    get_ready: f64,
}

impl Countdown {
    const INTRO: Countdown = Countdown {
        prepare: 3.0,
        countdown: 8.0,
        get_ready: 10.0,
    };
    const AFTER_PAUSE: Countdown = Countdown {
        prepare: 0.0,
        countdown: 4.0,
        get_ready: 6.0,
    };
    const IDLE: Countdown = Countdown {
        prepare: 0.0,
        countdown: 0.0,
        get_ready: 0.0,
    };
}

#[derive(Debug, Clone, PartialEq)]
struct Calibration {
    what: Option<String>,
    frame: u32,
    started_at: f64,
    text_opacity: f64,
}

pub struct StimulusMachine<R = StdRng> {
    config: StimulusConfig,
    rng: R,
    mode: VisualMode,
    client_mode: ClientMode,
    scene: Scene,
    eeg: EegWaveform,
    last_timestamp: Option<f64>,
    /// Queued by the engine, shown at the next trigger deadline.
    pending: Option<u32>,
    /// On screen and still owed an `unshow` marker.
    visible: Option<u32>,
    next_deadline: f64,
    erase_deadline: f64,
    pauses_left: u32,
    timers: Countdown,
    attract_level: f64,
    ground_level: f64,
    calibration: Calibration,
}

impl<R> std::fmt::Debug for StimulusMachine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StimulusMachine")
            .field("mode", &self.mode)
            .field("client_mode", &self.client_mode)
            .field("pending", &self.pending)
            .field("visible", &self.visible)
            .field("pauses_left", &self.pauses_left)
            .finish()
    }
}

impl StimulusMachine<StdRng> {
    /// Seeded from `config.seed` when set, otherwise from OS entropy.
    pub fn new(config: StimulusConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }
}

impl<R: Rng> StimulusMachine<R> {
    pub fn with_rng(config: StimulusConfig, rng: R) -> Self {
        let eeg = EegWaveform::new(
            config.eeg_channels,
            config.eeg_buffer_len,
            config.eeg_sample_stride,
        );
        let pause_interval = config.pause_interval.max(1);
        let mut machine = Self {
            config,
            rng,
            mode: VisualMode::Init,
            client_mode: ClientMode::Attract,
            scene: Scene::default(),
            eeg,
            last_timestamp: None,
            pending: None,
            visible: None,
            next_deadline: -1.0,
            erase_deadline: -1.0,
            pauses_left: pause_interval,
            timers: Countdown::IDLE,
            attract_level: 1.0,
            ground_level: 0.0,
            calibration: Calibration {
                what: None,
                frame: 0,
                started_at: 0.0,
                text_opacity: 0.0,
            },
        };
        machine.set_next_stimulus(0);
        machine
    }

    // -- Accessors -----------------------------------------------------------

    pub fn mode(&self) -> VisualMode {
        self.mode
    }

    pub fn client_mode(&self) -> ClientMode {
        self.client_mode
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn eeg(&self) -> &EegWaveform {
        &self.eeg
    }

    pub fn pending_stimulus(&self) -> Option<u32> {
        self.pending
    }

    pub fn visible_stimulus(&self) -> Option<u32> {
        self.visible
    }

    pub fn pauses_left(&self) -> u32 {
        self.pauses_left
    }

    /// The calibration currently requested, if any.
    pub fn calibration_target(&self) -> Option<&str> {
        self.calibration.what.as_deref()
    }

    // -- Engine-driven inputs ----------------------------------------------------

    pub fn set_client_mode(&mut self, mode: ClientMode) {
        if self.client_mode != mode {
            debug!(from = %self.client_mode, to = %mode, "client mode");
        }
        self.client_mode = mode;
    }

    /// Queue the next stimulus. The very first one is due immediately.
    ///
    /// Only the last two decimal digits of `index` are kept, so marker ids
    /// always stay inside their thousand-range.
    pub fn set_next_stimulus(&mut self, index: u32) {
        let index = index % STIMULUS_SLOTS;
        debug!(index, "next stimulus");
        self.pending = Some(index);
        if self.next_deadline < 0.0 {
            self.next_deadline = 0.0;
        }
    }

    /// Switch to the latency calibration sequence.
    pub fn start_calibration(&mut self, what: Option<String>) {
        info!(what = what.as_deref().unwrap_or("-"), "starting latency calibration");
        self.mode = VisualMode::Calibrate;
        self.calibration.what = what;
        self.calibration.frame = 0;
    }

    pub fn add_eeg_samples(&mut self, samples: &[f64]) {
        self.eeg.add_samples(samples);
    }

    // -- Frame tick --------------------------------------------------------------

    /// Advance one display frame.
    ///
    /// `timestamp_ms` is the monotonic animation clock; `wall_ms` is the
    /// epoch time stamped on markers.
    pub fn tick<S: EngineSink>(&mut self, timestamp_ms: f64, wall_ms: u64, link: &mut EngineLink<S>) {
        let elapsed = match self.last_timestamp {
            Some(last) => (timestamp_ms - last).max(0.0),
            None => 0.0,
        };
        self.last_timestamp = Some(timestamp_ms);

        self.tick_ambient(elapsed);

        if link.is_down() {
            self.scene.sunburst_visible = false;
            self.scene.timestamp_label.clear();
        } else {
            match self.mode {
                VisualMode::Calibrate => self.tick_calibrate(timestamp_ms, wall_ms, elapsed, link),
                VisualMode::Init => self.tick_init(),
                VisualMode::Trial => self.tick_trial(timestamp_ms, wall_ms, link),
                VisualMode::Attract => self.tick_attract(elapsed, link),
                VisualMode::LeavingAttract => self.tick_leaving_attract(elapsed),
                VisualMode::GoingToTrial => self.tick_going_to_trial(elapsed),
            }
        }

        if matches!(self.mode, VisualMode::Attract | VisualMode::Calibrate) {
            self.eeg.scroll(elapsed);
        }
    }

    fn tick_ambient(&mut self, elapsed: f64) {
        let s = &mut self.scene;
        if s.logo < LOGO_MAX {
            s.logo += frame_step(0.005, elapsed);
            s.header = s.logo * 0.25 / LOGO_MAX;
        }
        s.introduction.step();
        s.footer.step();
        s.sunburst.step();
    }

    fn tick_init(&mut self) {
        self.mode = VisualMode::Attract;
        self.scene.timestamp_label.clear();
        self.attract_level = 0.0;
        self.scene.attract = 0.0;
        for d in &mut self.scene.decor {
            d.randomize(&mut self.rng);
        }
    }

    fn tick_attract<S: EngineSink>(&mut self, elapsed: f64, link: &mut EngineLink<S>) {
        self.scene.introduction.set_target(1.0);
        self.scene.footer.set_target(0.6);
        self.scene.timestamp_label.clear();

        if self.ground_level > 0.0 {
            self.ground_level = (self.ground_level - frame_step(0.005, elapsed)).max(0.0);
        }
        self.scene.suspect_ground = self.ground_level;

        self.scene.sunburst.set_target(0.4);
        self.scene.sunburst_visible = true;

        if self.attract_level < 1.0 {
            self.attract_level = (self.attract_level + frame_step(0.004, elapsed)).min(1.0);
        }
        self.scene.attract = clamp_unit(self.attract_level);

        self.drift_decor();
        link.post(&OutboundMessage::poll());

        if self.client_mode == ClientMode::Trial {
            debug!("leaving attract");
            self.mode = VisualMode::LeavingAttract;
        }
    }

    fn tick_leaving_attract(&mut self, elapsed: f64) {
        self.scene.sunburst.set_target(0.0);
        self.scene.introduction.set_target(0.0);
        self.scene.footer.set_target(0.0);
        self.raise_ground(0.01, elapsed);

        self.attract_level -= frame_step(0.015, elapsed);
        self.scene.attract = clamp_unit(self.attract_level);
        if self.attract_level < 0.0 {
            self.enter_going_to_trial(Countdown::INTRO);
            self.scene.hide_decor();
        } else {
            self.drift_decor();
        }
    }

    fn tick_going_to_trial(&mut self, elapsed: f64) {
        self.scene.sunburst.set_target(0.0);
        let dt = elapsed / 1000.0;
        self.timers.prepare -= dt;
        self.timers.countdown -= dt;
        self.timers.get_ready -= dt;

        let t = self.timers;
        let (prepare, countdown, get_ready) = if t.prepare > 1.0 {
            (1.0, 0.0, 0.0)
        } else if t.prepare > 0.0 {
            (t.prepare, 0.0, 0.0)
        } else if t.countdown > 0.0 {
            (0.0, t.countdown.min(1.0), 0.0)
        } else if t.get_ready > 1.0 {
            (0.0, 0.0, 1.0)
        } else if t.get_ready > 0.0 {
            (0.0, 0.0, t.get_ready)
        } else {
            debug!("countdown finished, entering trial");
            self.mode = VisualMode::Trial;
            (0.0, 0.0, 0.0)
        };
        self.scene.prepare = prepare;
        self.scene.countdown = countdown;
        self.scene.get_ready = get_ready;

        self.raise_ground(0.02, elapsed);
    }

    fn tick_trial<S: EngineSink>(&mut self, timestamp: f64, wall_ms: u64, link: &mut EngineLink<S>) {
        self.scene.hide_countdown();
        self.scene.attract = 1.0;
        self.scene.sunburst.set_target(0.0);
        self.scene.sunburst_visible = self.scene.sunburst.value >= 0.01;

        if timestamp >= self.next_deadline && self.client_mode == ClientMode::Trial {
            if let Some(index) = self.pending {
                // An overlong visible time can leave the previous stimulus up.
                if self.visible.is_some() && self.erase_visible(wall_ms, link) {
                    return;
                }
                self.pending = None;
                self.show(index, timestamp, wall_ms, link);
            }
        }

        if timestamp >= self.erase_deadline {
            if self.visible.is_some() {
                self.erase_visible(wall_ms, link);
            }
            if self.client_mode == ClientMode::Attract {
                debug!("back to attract");
                self.mode = VisualMode::Attract;
                self.scene.shown = None;
            }
        }
    }

    fn tick_calibrate<S: EngineSink>(
        &mut self,
        timestamp: f64,
        wall_ms: u64,
        elapsed: f64,
        link: &mut EngineLink<S>,
    ) {
        // Keep EEG flowing so the traces stay live during calibration.
        link.post(&OutboundMessage::poll());

        // A stimulus interrupted by calibration leaves the screen now.
        if let Some(index) = self.visible.take() {
            link.post_if_up(&OutboundMessage::marker(Action::Unshow, MarkerId::unshow(index), wall_ms));
        }

        self.attract_level = 0.0;
        let s = &mut self.scene;
        s.attract = 0.0;
        s.sunburst_visible = false;
        s.shown = None;
        s.suspect_ground = 0.0;
        s.hide_countdown();
        s.introduction.set_target(0.0);

        let mut flash = Backdrop::Black;
        let mut strobe = None;
        let cal = &mut self.calibration;
        cal.text_opacity -= elapsed / 1000.0;
        if cal.frame == 0 {
            cal.started_at = timestamp;
            cal.frame = 1;
            flash = Backdrop::White;
            s.calibrate_text.clear();
        } else if (timestamp - cal.started_at).floor()
            >= f64::from(cal.frame) * self.config.strobe_interval_ms
        {
            cal.frame += 1;
            strobe = Some(cal.frame);
            flash = Backdrop::White;
        }

        if let Some(strobe) = strobe {
            if let Some((_, word)) = CALIBRATION_CUES.iter().find(|(n, _)| *n == strobe) {
                s.calibrate_text = (*word).to_string();
                cal.text_opacity = 1.2;
            } else if (FIRST_TAP_STROBE..=LAST_TAP_STROBE).contains(&strobe) {
                let offset = strobe - FIRST_TAP_STROBE;
                s.calibrate_text = (offset + 1).to_string();
                cal.text_opacity = 0.6;
                s.timestamp_label = calibration_label(wall_ms, offset + 1);
                let marker = MarkerId::calibrate(offset);
                link.post_if_up(&OutboundMessage::marker(Action::ShowCalibrate, marker, wall_ms));
            } else if strobe == END_STROBE {
                s.calibrate_text.clear();
                self.mode = VisualMode::Init;
                info!("latency calibration finished");
                link.post_if_up(&OutboundMessage::marker(
                    Action::EndCalibrate,
                    MarkerId::end_calibrate(),
                    wall_ms,
                ));
                self.client_mode = ClientMode::Attract;
                flash = Backdrop::Black;
            }
        }

        s.calibrate_opacity = clamp_unit(2.0 * cal.text_opacity);
        s.backdrop = flash;
    }

    // -- Helpers -----------------------------------------------------------------

    fn show<S: EngineSink>(&mut self, index: u32, timestamp: f64, wall_ms: u64, link: &mut EngineLink<S>) {
        self.scene.shown = Some(ShownStimulus {
            index,
            placement: Placement::STIMULUS,
        });
        self.erase_deadline = timestamp + self.config.visible_ms;
        self.next_deadline = timestamp
            + self.config.trigger_ms
            + self.rng.gen::<f64>() * self.config.trigger_jitter_ms;
        self.visible = Some(index);
        self.scene.timestamp_label = stimulus_label(wall_ms, index);
        debug!(index, "showing stimulus");
        link.post_if_up(&OutboundMessage::marker(Action::Show, MarkerId::show(index), wall_ms));
    }

    /// Take the visible stimulus down. Returns `true` if this started a pause.
    fn erase_visible<S: EngineSink>(&mut self, wall_ms: u64, link: &mut EngineLink<S>) -> bool {
        self.scene.shown = None;
        let Some(index) = self.visible.take() else {
            return false;
        };
        link.post_if_up(&OutboundMessage::marker(Action::Unshow, MarkerId::unshow(index), wall_ms));

        self.pauses_left = self.pauses_left.saturating_sub(1);
        if self.pauses_left > 0 {
            return false;
        }
        info!("pause");
        link.post_if_up(&OutboundMessage::marker(Action::Pause, MarkerId::pause(), wall_ms));
        self.pauses_left = self.config.pause_interval.max(1);
        self.enter_going_to_trial(Countdown::AFTER_PAUSE);
        true
    }

    fn enter_going_to_trial(&mut self, timers: Countdown) {
        self.mode = VisualMode::GoingToTrial;
        self.timers = timers;
    }

    fn raise_ground(&mut self, step: f64, elapsed: f64) {
        if self.ground_level < GROUND_MAX {
            self.ground_level += frame_step(step, elapsed);
        }
        self.scene.suspect_ground = clamp_unit(self.ground_level);
    }

    fn drift_decor(&mut self) {
        for d in &mut self.scene.decor {
            d.drift(&mut self.rng);
        }
    }
}
