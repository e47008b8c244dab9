//! Engine wire protocol: one JSON object per WebSocket text frame.
//!
//! Outbound frames are tagged by `action`, inbound frames by `type`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::marker::MarkerId;

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// The `action` tag of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Poll,
    Plus,
    Minus,
    Start,
    Stop,
    Cancel,
    Accumulate,
    StartFitting,
    SetUserNo,
    Calibrate,
    Show,
    Unshow,
    Pause,
    ShowCalibrate,
    EndCalibrate,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Poll => "poll",
            Action::Plus => "plus",
            Action::Minus => "minus",
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Cancel => "cancel",
            Action::Accumulate => "accumulate",
            Action::StartFitting => "start_fitting",
            Action::SetUserNo => "set_user_no",
            Action::Calibrate => "calibrate",
            Action::Show => "show",
            Action::Unshow => "unshow",
            Action::Pause => "pause",
            Action::ShowCalibrate => "show_calibrate",
            Action::EndCalibrate => "end_calibrate",
        };
        write!(f, "{s}")
    }
}

/// Latency calibration the dashboard can ask the stimulus display to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationTarget {
    #[serde(rename = "Audio_vs_Display")]
    AudioVsDisplay,
    #[serde(rename = "EEG_vs_Audio")]
    EegVsAudio,
    #[serde(rename = "EEG_vs_Display")]
    EegVsDisplay,
}

impl std::fmt::Display for CalibrationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationTarget::AudioVsDisplay => write!(f, "Audio_vs_Display"),
            CalibrationTarget::EegVsAudio => write!(f, "EEG_vs_Audio"),
            CalibrationTarget::EegVsDisplay => write!(f, "EEG_vs_Display"),
        }
    }
}

/// A message sent to the engine.
///
/// Optional fields are omitted from the JSON body when absent, never sent as
/// `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub action: Action,
    /// Wall-clock epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_id: Option<MarkerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_no: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub what: Option<CalibrationTarget>,
}

impl OutboundMessage {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            timestamp: None,
            marker_id: None,
            user_no: None,
            what: None,
        }
    }

    /// `{"action":"poll"}`; asks the engine to flush pending EEG samples.
    pub fn poll() -> Self {
        Self::new(Action::Poll)
    }

    /// A timestamped marker event (`show`, `unshow`, `pause`, ...).
    pub fn marker(action: Action, marker: MarkerId, timestamp_ms: u64) -> Self {
        Self::new(action)
            .with_marker(marker)
            .with_timestamp(timestamp_ms)
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp = Some(timestamp_ms);
        self
    }

    #[must_use]
    pub fn with_marker(mut self, marker: MarkerId) -> Self {
        self.marker_id = Some(marker);
        self
    }

    #[must_use]
    pub fn with_user_no(mut self, user_no: u32) -> Self {
        self.user_no = Some(user_no);
        self
    }

    #[must_use]
    pub fn with_what(mut self, what: CalibrationTarget) -> Self {
        self.what = Some(what);
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A message pushed by the engine, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Value {
        value: serde_json::Value,
    },
    /// Interleaved EEG samples, eight values per sample frame.
    EegData {
        #[serde(default)]
        sample: Vec<f64>,
    },
    Status {
        value: serde_json::Value,
    },
    Calibrate {
        #[serde(default)]
        what: Option<String>,
    },
    TrialMode,
    StopMode,
    AttractMode,
    NextSuspect {
        value: u32,
    },
    NextStimuli {
        value: u32,
    },
    Graph {
        filename: String,
    },
    Users {
        count: u64,
    },
    EegQuality {
        #[serde(default)]
        data: BTreeMap<String, f64>,
    },
    Recording,
    Prediction {
        #[serde(default)]
        data: BTreeMap<String, f64>,
    },
    EegStatus {
        #[serde(default)]
        nof_eeg_samples: u64,
    },
    /// Any `type` this client does not handle.
    #[serde(other)]
    Unsupported,
}

impl EngineEvent {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Render a loosely typed `value` payload the way a text node would show it:
/// strings without quotes, everything else as JSON.
pub fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_serializes_without_optional_fields() {
        let json = OutboundMessage::poll().to_json().unwrap();
        assert_eq!(json, r#"{"action":"poll"}"#);
    }

    #[test]
    fn marker_message_carries_id_and_timestamp() {
        let msg = OutboundMessage::marker(Action::Show, MarkerId::show(12), 1_700_000_000_123);
        let v: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(v["action"], "show");
        assert_eq!(v["marker_id"], 1012);
        assert_eq!(v["timestamp"], 1_700_000_000_123u64);
        assert!(v.get("user_no").is_none());
        assert!(v.get("what").is_none());
    }

    #[test]
    fn start_fitting_action_is_snake_case() {
        let json = OutboundMessage::new(Action::StartFitting).to_json().unwrap();
        assert!(json.contains("\"start_fitting\""), "json: {json}");
    }

    #[test]
    fn calibrate_what_uses_engine_spelling() {
        let msg = OutboundMessage::new(Action::Calibrate)
            .with_timestamp(1)
            .with_what(CalibrationTarget::EegVsDisplay);
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"EEG_vs_Display\""), "json: {json}");
    }

    #[test]
    fn set_user_no_carries_user_no() {
        let msg = OutboundMessage::new(Action::SetUserNo).with_user_no(42);
        let v: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(v["user_no"], 42);
    }

    #[test]
    fn action_display_matches_wire_tag() {
        for action in [Action::ShowCalibrate, Action::EndCalibrate, Action::SetUserNo] {
            let wire = serde_json::to_string(&action).unwrap();
            assert_eq!(wire.trim_matches('"'), action.to_string());
        }
    }

    #[test]
    fn parse_next_suspect() {
        let ev = EngineEvent::parse(r#"{"type":"next_suspect","value":7}"#).unwrap();
        assert_eq!(ev, EngineEvent::NextSuspect { value: 7 });
    }

    #[test]
    fn parse_mode_changes() {
        assert_eq!(
            EngineEvent::parse(r#"{"type":"trial_mode"}"#).unwrap(),
            EngineEvent::TrialMode
        );
        assert_eq!(
            EngineEvent::parse(r#"{"type":"stop_mode"}"#).unwrap(),
            EngineEvent::StopMode
        );
        assert_eq!(
            EngineEvent::parse(r#"{"type":"attract_mode"}"#).unwrap(),
            EngineEvent::AttractMode
        );
    }

    #[test]
    fn parse_calibrate_with_what() {
        let ev = EngineEvent::parse(r#"{"type":"calibrate","what":"EEG_vs_Audio"}"#).unwrap();
        assert_eq!(
            ev,
            EngineEvent::Calibrate {
                what: Some("EEG_vs_Audio".to_string())
            }
        );
    }

    #[test]
    fn parse_eeg_quality_map() {
        let ev = EngineEvent::parse(
            r#"{"type":"eeg_quality","data":{"TP9":1.5,"AF7":2.0}}"#,
        )
        .unwrap();
        match ev {
            EngineEvent::EegQuality { data } => {
                assert_eq!(data.len(), 2);
                assert_eq!(data["TP9"], 1.5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_unsupported_not_error() {
        let ev = EngineEvent::parse(r#"{"type":"status_fitting","data":2}"#).unwrap();
        assert_eq!(ev, EngineEvent::Unsupported);
    }

    #[test]
    fn malformed_json_is_error() {
        assert!(EngineEvent::parse("{\"type\":").is_err());
    }

    #[test]
    fn known_type_missing_payload_is_error() {
        assert!(EngineEvent::parse(r#"{"type":"next_suspect"}"#).is_err());
    }

    #[test]
    fn display_value_strips_string_quotes() {
        assert_eq!(display_value(&serde_json::json!("ready")), "ready");
        assert_eq!(display_value(&serde_json::json!(3)), "3");
        assert_eq!(display_value(&serde_json::Value::Null), "");
    }
}
