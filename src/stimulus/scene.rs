//! Visual model of the stimulus screen.
//!
//! The machine writes opacities, placements and texts here; a renderer (the
//! terminal status display, or a test) reads them back. Nothing in this
//! module advances time.

use rand::Rng;

use crate::fade::EasedOpacity;
use crate::link::ENGINE_DOWN_TEXT;

pub const DECOR_ROWS: u32 = 4;
pub const DECOR_COLS: u32 = 5;

/// Position and size in percent of the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Placement {
    /// Where a trial stimulus is shown.
    pub const STIMULUS: Placement = Placement {
        left: 36.0,
        top: 0.0,
        width: 30.0,
        height: 100.0,
    };
}

/// One drifting decorative figure on the attract screen.
#[derive(Debug, Clone, PartialEq)]
pub struct DecorElement {
    /// `row * 10 + col`, matching the stimulus numbering.
    pub id: u32,
    pub row: u32,
    pub col: u32,
    pub x: f64,
    pub top: f64,
    pub x_spd: f64,
    pub placement: Placement,
    pub visible: bool,
}

impl DecorElement {
    fn new(row: u32, col: u32) -> Self {
        Self {
            id: row * 10 + col,
            row,
            col,
            x: 0.0,
            top: 0.0,
            x_spd: 0.0,
            placement: Placement {
                left: 0.0,
                top: 0.0,
                width: 60.0,
                height: 100.0,
            },
            visible: false,
        }
    }

    /// Fresh trajectory for a new attract cycle.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.x = -30.0 + 130.0 * rng.gen::<f64>();
        self.top = 20.0 * rng.gen::<f64>();
        self.x_spd = 0.02 + 0.04 * rng.gen::<f64>();
    }

    /// Move one frame to the left, wrapping to the right edge with a new speed.
    pub fn drift<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.x -= self.x_spd;
        if self.x < -40.0 {
            self.x = 100.0;
            self.x_spd = 0.025 + 0.06 * rng.gen::<f64>();
        }
        self.placement = Placement {
            left: self.x,
            top: f64::from(8 * self.row + self.col),
            width: 60.0,
            height: 100.0,
        };
        self.visible = true;
    }
}

/// The stimulus currently on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShownStimulus {
    pub index: u32,
    pub placement: Placement,
}

/// Page background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backdrop {
    #[default]
    Normal,
    /// Dark red banner while the engine is unreachable.
    EngineDown,
    White,
    Black,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub logo: f64,
    pub header: f64,
    pub introduction: EasedOpacity,
    pub footer: EasedOpacity,
    pub sunburst: EasedOpacity,
    pub sunburst_visible: bool,
    pub suspect_ground: f64,
    /// Opacity of the drifting decor layer.
    pub attract: f64,
    pub decor: Vec<DecorElement>,
    pub prepare: f64,
    pub countdown: f64,
    pub get_ready: f64,
    pub shown: Option<ShownStimulus>,
    pub calibrate_text: String,
    pub calibrate_opacity: f64,
    pub backdrop: Backdrop,
    pub timestamp_label: String,
    pub value_text: String,
    pub status_text: String,
    pub users_text: String,
    pub graph_url: Option<String>,
}

impl Default for Scene {
    fn default() -> Self {
        let mut decor = Vec::with_capacity((DECOR_ROWS * DECOR_COLS) as usize);
        for row in 0..DECOR_ROWS {
            for col in 0..DECOR_COLS {
                decor.push(DecorElement::new(row, col));
            }
        }
        Self {
            logo: 0.0,
            header: 0.0,
            introduction: EasedOpacity::new(0.0, 0.4),
            footer: EasedOpacity::new(0.0, 0.4),
            sunburst: EasedOpacity::new(0.0, 0.4),
            sunburst_visible: false,
            suspect_ground: 0.0,
            attract: 1.0,
            decor,
            prepare: 0.0,
            countdown: 0.0,
            get_ready: 0.0,
            shown: None,
            calibrate_text: String::new(),
            calibrate_opacity: 0.0,
            backdrop: Backdrop::Normal,
            timestamp_label: String::new(),
            value_text: String::new(),
            status_text: String::new(),
            users_text: String::new(),
            graph_url: None,
        }
    }
}

impl Scene {
    pub fn hide_countdown(&mut self) {
        self.prepare = 0.0;
        self.countdown = 0.0;
        self.get_ready = 0.0;
    }

    pub fn hide_decor(&mut self) {
        for d in &mut self.decor {
            d.visible = false;
        }
    }

    /// Engine became unreachable.
    pub fn show_engine_down(&mut self) {
        self.backdrop = Backdrop::EngineDown;
        self.users_text = ENGINE_DOWN_TEXT.to_string();
        self.timestamp_label.clear();
    }

    /// Engine came back after being down.
    pub fn clear_engine_down(&mut self) {
        self.backdrop = Backdrop::Normal;
        self.users_text.clear();
    }

    /// Number of countdown elements with non-zero opacity.
    pub fn visible_countdown_phases(&self) -> usize {
        [self.prepare, self.countdown, self.get_ready]
            .iter()
            .filter(|o| **o > 0.0)
            .count()
    }
}

/// Label shown under the stimulus: wall-clock ms from the 7th digit on,
/// followed by the two-digit stimulus id.
pub fn stimulus_label(wall_ms: u64, index: u32) -> String {
    let ms = wall_ms.to_string();
    format!("{}.{:02}", ms.get(6..).unwrap_or(""), index)
}

/// Label for calibration tap `n` (1..=8).
pub fn calibration_label(wall_ms: u64, n: u32) -> String {
    let ms = wall_ms.to_string();
    format!("{}.8{}", ms.get(6..).unwrap_or(""), n)
}
