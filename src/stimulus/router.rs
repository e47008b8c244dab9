//! Inbound message handling for the stimulus display.

use rand::Rng;
use tracing::debug;

use crate::link::{EngineLink, EngineSink};
use crate::protocol::{display_value, EngineEvent};
use crate::router::{cache_busted, count_label, decode, Routed};

use super::machine::{ClientMode, StimulusMachine};

/// Apply one engine frame to the machine. Never fails: anything that cannot
/// be applied is logged and reported through the return value.
pub fn handle_message<R: Rng, S: EngineSink>(
    machine: &mut StimulusMachine<R>,
    link: &mut EngineLink<S>,
    text: &str,
) -> Routed {
    if link.mark_up() {
        machine.scene_mut().clear_engine_down();
    }

    let event = match decode(text) {
        Ok(event) => event,
        Err(routed) => return routed,
    };

    match event {
        EngineEvent::Value { value } => machine.scene_mut().value_text = display_value(&value),
        EngineEvent::EegData { sample } => machine.add_eeg_samples(&sample),
        EngineEvent::Status { value } => machine.scene_mut().status_text = display_value(&value),
        EngineEvent::Calibrate { what } => machine.start_calibration(what),
        EngineEvent::TrialMode => machine.set_client_mode(ClientMode::Trial),
        EngineEvent::StopMode => machine.set_client_mode(ClientMode::Stop),
        EngineEvent::AttractMode => machine.set_client_mode(ClientMode::Attract),
        EngineEvent::NextSuspect { value } | EngineEvent::NextStimuli { value } => {
            machine.set_next_stimulus(value)
        }
        EngineEvent::Graph { filename } => {
            machine.scene_mut().graph_url = Some(cache_busted(&filename, rand::random::<f64>()))
        }
        EngineEvent::Users { count } => machine.scene_mut().users_text = count_label(count, "player"),
        other => {
            debug!(event = ?other, "event not used by the stimulus display");
            return Routed::Ignored;
        }
    }
    Routed::Handled
}

/// The transport failed or closed; show the engine-down banner.
pub fn handle_link_down<R: Rng, S: EngineSink>(machine: &mut StimulusMachine<R>, link: &mut EngineLink<S>) {
    if link.mark_down() {
        machine.scene_mut().show_engine_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StimulusConfig;
    use crate::link::LinkStatus;
    use crate::link::ENGINE_DOWN_TEXT;
    use crate::stimulus::scene::Backdrop;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup() -> (StimulusMachine, EngineLink<Vec<String>>) {
        (
            StimulusMachine::with_rng(StimulusConfig::default(), StdRng::seed_from_u64(3)),
            EngineLink::new(Vec::new()),
        )
    }

    #[test]
    fn any_message_marks_link_up() {
        let (mut m, mut link) = setup();
        assert_eq!(handle_message(&mut m, &mut link, "garbage"), Routed::Malformed);
        assert_eq!(link.status(), LinkStatus::Up);
    }

    #[test]
    fn mode_messages_set_client_mode() {
        let (mut m, mut link) = setup();
        handle_message(&mut m, &mut link, r#"{"type":"trial_mode"}"#);
        assert_eq!(m.client_mode(), ClientMode::Trial);
        handle_message(&mut m, &mut link, r#"{"type":"stop_mode"}"#);
        assert_eq!(m.client_mode(), ClientMode::Stop);
        handle_message(&mut m, &mut link, r#"{"type":"attract_mode"}"#);
        assert_eq!(m.client_mode(), ClientMode::Attract);
    }

    #[test]
    fn next_suspect_and_next_stimuli_queue_stimulus() {
        let (mut m, mut link) = setup();
        handle_message(&mut m, &mut link, r#"{"type":"next_suspect","value":23}"#);
        assert_eq!(m.pending_stimulus(), Some(23));
        handle_message(&mut m, &mut link, r#"{"type":"next_stimuli","value":4}"#);
        assert_eq!(m.pending_stimulus(), Some(4));
    }

    #[test]
    fn oversized_stimulus_index_keeps_two_digits() {
        let (mut m, mut link) = setup();
        handle_message(&mut m, &mut link, r#"{"type":"next_suspect","value":1523}"#);
        assert_eq!(m.pending_stimulus(), Some(23));
        handle_message(&mut m, &mut link, r#"{"type":"next_stimuli","value":4294967295}"#);
        assert_eq!(m.pending_stimulus(), Some(95));
    }

    #[test]
    fn users_text_is_pluralized() {
        let (mut m, mut link) = setup();
        handle_message(&mut m, &mut link, r#"{"type":"users","count":1}"#);
        assert_eq!(m.scene().users_text, "1 player");
        handle_message(&mut m, &mut link, r#"{"type":"users","count":2}"#);
        assert_eq!(m.scene().users_text, "2 players");
    }

    #[test]
    fn graph_gets_cache_buster() {
        let (mut m, mut link) = setup();
        handle_message(&mut m, &mut link, r#"{"type":"graph","filename":"/g/eeg.png"}"#);
        let url = m.scene().graph_url.clone().unwrap();
        assert!(url.starts_with("/g/eeg.png?cache_buster="), "url: {url}");
    }

    #[test]
    fn value_and_status_texts() {
        let (mut m, mut link) = setup();
        handle_message(&mut m, &mut link, r#"{"type":"value","value":0.75}"#);
        handle_message(&mut m, &mut link, r#"{"type":"status","value":"fitting"}"#);
        assert_eq!(m.scene().value_text, "0.75");
        assert_eq!(m.scene().status_text, "fitting");
    }

    #[test]
    fn calibrate_message_starts_calibration() {
        let (mut m, mut link) = setup();
        handle_message(&mut m, &mut link, r#"{"type":"calibrate","what":"Audio_vs_Display"}"#);
        assert_eq!(m.calibration_target(), Some("Audio_vs_Display"));
    }

    #[test]
    fn eeg_data_feeds_waveform() {
        let (mut m, mut link) = setup();
        let samples: Vec<String> = (0..16).map(|_| "0".to_string()).collect();
        let frame = format!(r#"{{"type":"eeg_data","sample":[{}]}}"#, samples.join(","));
        assert_eq!(handle_message(&mut m, &mut link, &frame), Routed::Handled);
        let ch = m.eeg().channel(0).unwrap();
        assert_eq!(&ch[ch.len() - 2..], &[130, 130]);
    }

    #[test]
    fn admin_only_events_are_ignored() {
        let (mut m, mut link) = setup();
        assert_eq!(
            handle_message(&mut m, &mut link, r#"{"type":"recording"}"#),
            Routed::Ignored
        );
    }

    #[test]
    fn link_down_then_message_toggles_banner() {
        let (mut m, mut link) = setup();
        handle_message(&mut m, &mut link, r#"{"type":"stop_mode"}"#);
        handle_link_down(&mut m, &mut link);
        assert_eq!(m.scene().backdrop, Backdrop::EngineDown);
        assert_eq!(m.scene().users_text, ENGINE_DOWN_TEXT);
        handle_message(&mut m, &mut link, r#"{"type":"stop_mode"}"#);
        assert_eq!(m.scene().backdrop, Backdrop::Normal);
        assert!(m.scene().users_text.is_empty());
    }

    #[test]
    fn first_failure_before_any_message_shows_no_banner() {
        let (mut m, mut link) = setup();
        handle_link_down(&mut m, &mut link);
        assert_eq!(link.status(), LinkStatus::Down);
        assert_eq!(m.scene().backdrop, Backdrop::Normal);
    }
}
