//! Opacity pacing helpers.
//!
//! Two pacing models coexist and must not be mixed up: exponential easing
//! toward a target for ambient layers, and linear per-millisecond countdowns
//! for anything the subject is meant to time against.

/// Smoothing factor used for all eased layers.
pub const EASE_FACTOR: f64 = 0.025;

/// Move `value` a fixed fraction of the way toward `target`.
pub fn ease_toward(value: f64, target: f64, factor: f64) -> f64 {
    value + (target - value) * factor
}

/// Scale a per-frame step tuned for a 60 Hz display by the real elapsed time,
/// so the fade speed is the same on 60 Hz and 120 Hz screens.
pub fn frame_step(step_per_60hz_frame: f64, elapsed_ms: f64) -> f64 {
    step_per_60hz_frame * elapsed_ms * 60.0 / 1000.0
}

/// A layer whose opacity eases toward a moving target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EasedOpacity {
    pub value: f64,
    pub target: f64,
}

impl EasedOpacity {
    pub fn new(value: f64, target: f64) -> Self {
        Self { value, target }
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    /// Advance one frame. Returns the new value.
    pub fn step(&mut self) -> f64 {
        if self.value != self.target {
            self.value = ease_toward(self.value, self.target, EASE_FACTOR);
        }
        self.value
    }
}

/// Clamp to the displayable opacity range.
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
