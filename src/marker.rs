//! Marker identifiers sent to the engine for signal alignment.
//!
//! The engine matches on the thousands digit, so the namespace is flat and
//! partitioned by thousands:
//!
//! | range  | meaning                        |
//! |--------|--------------------------------|
//! | 0xxx   | attract / poll-adjacent        |
//! | 1xxx   | stimulus shown                 |
//! | 2xxx   | stimulus hidden                |
//! | 4xxx   | pause                          |
//! | 8xxx   | calibration                    |

use serde::{Deserialize, Serialize};

const SHOW_BASE: u32 = 1000;
const UNSHOW_BASE: u32 = 2000;
const PAUSE: u32 = 4000;
const CALIBRATE_BASE: u32 = 8001;
const END_CALIBRATE: u32 = 8998;

/// A numeric marker id as carried in `marker_id` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerId(pub u32);

/// Which thousand-range a marker id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerRange {
    Attract,
    Show,
    Unshow,
    Pause,
    Calibrate,
    /// Ranges the clients never emit (3xxx, 5xxx–7xxx, 9xxx+).
    Other,
}

impl MarkerId {
    /// Marker sent the moment stimulus `index` becomes visible.
    ///
    /// `index` wraps within the thousand-range.
    pub fn show(index: u32) -> Self {
        MarkerId(SHOW_BASE + index % 1000)
    }

    /// Marker sent the moment stimulus `index` is removed.
    pub fn unshow(index: u32) -> Self {
        MarkerId(UNSHOW_BASE + index % 1000)
    }

    pub fn pause() -> Self {
        MarkerId(PAUSE)
    }

    /// Calibration tap cue `offset` (0 for the first of the eight taps).
    pub fn calibrate(offset: u32) -> Self {
        MarkerId(CALIBRATE_BASE + offset)
    }

    pub fn end_calibrate() -> Self {
        MarkerId(END_CALIBRATE)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn range(self) -> MarkerRange {
        match self.0 / 1000 {
            0 => MarkerRange::Attract,
            1 => MarkerRange::Show,
            2 => MarkerRange::Unshow,
            4 => MarkerRange::Pause,
            8 => MarkerRange::Calibrate,
            _ => MarkerRange::Other,
        }
    }
}

impl std::fmt::Display for MarkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(MarkerId::show(0), 1000, MarkerRange::Show)]
    #[case(MarkerId::show(34), 1034, MarkerRange::Show)]
    #[case(MarkerId::unshow(0), 2000, MarkerRange::Unshow)]
    #[case(MarkerId::unshow(23), 2023, MarkerRange::Unshow)]
    #[case(MarkerId::show(1500), 1500, MarkerRange::Show)]
    #[case(MarkerId::show(u32::MAX), 1295, MarkerRange::Show)]
    #[case(MarkerId::unshow(u32::MAX), 2295, MarkerRange::Unshow)]
    #[case(MarkerId::pause(), 4000, MarkerRange::Pause)]
    #[case(MarkerId::calibrate(0), 8001, MarkerRange::Calibrate)]
    #[case(MarkerId::calibrate(7), 8008, MarkerRange::Calibrate)]
    #[case(MarkerId::end_calibrate(), 8998, MarkerRange::Calibrate)]
    fn marker_ids_are_bit_exact(
        #[case] marker: MarkerId,
        #[case] expected: u32,
        #[case] range: MarkerRange,
    ) {
        assert_eq!(marker.value(), expected);
        assert_eq!(marker.range(), range);
    }

    #[test]
    fn low_ids_are_attract_range() {
        assert_eq!(MarkerId(12).range(), MarkerRange::Attract);
    }

    #[test]
    fn engine_only_ranges_are_other() {
        assert_eq!(MarkerId(3000).range(), MarkerRange::Other);
        assert_eq!(MarkerId(9999).range(), MarkerRange::Other);
    }

    #[test]
    fn marker_serializes_as_plain_number() {
        let json = serde_json::to_string(&MarkerId::show(5)).unwrap();
        assert_eq!(json, "1005");
    }

    #[test]
    fn marker_display_is_number() {
        assert_eq!(MarkerId::pause().to_string(), "4000");
    }
}
