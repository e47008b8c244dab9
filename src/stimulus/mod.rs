//! Stimulus presentation client: attract screen, trial sequencing and latency
//! calibration.

pub mod eeg;
pub mod machine;
pub mod router;
pub mod scene;

pub use eeg::EegWaveform;
pub use machine::{ClientMode, StimulusMachine, VisualMode};
pub use router::{handle_link_down, handle_message};
pub use scene::{Backdrop, Placement, Scene};
