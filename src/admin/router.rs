//! Inbound message handling for the session dashboard.

use tracing::{debug, trace};

use crate::link::{EngineLink, EngineSink, LinkStatus, ENGINE_DOWN_TEXT};
use crate::protocol::{display_value, EngineEvent};
use crate::router::{cache_busted, count_label, decode, Routed};

use super::session::AdminSession;

pub fn handle_message<S: EngineSink>(
    session: &mut AdminSession,
    link: &mut EngineLink<S>,
    text: &str,
) -> Routed {
    if link.status() != LinkStatus::Up {
        session.engine_down_banner = false;
        if link.is_down() {
            session.users_text.clear();
        }
    }
    link.mark_up();

    let event = match decode(text) {
        Ok(event) => event,
        Err(routed) => return routed,
    };

    match event {
        EngineEvent::Value { value } => session.value_text = display_value(&value),
        EngineEvent::Status { value } => session.status_text = display_value(&value),
        EngineEvent::NextStimuli { value } => session.record_stimulus(value),
        EngineEvent::EegQuality { data } => session.update_eeg_quality(data),
        EngineEvent::Recording => session.flash_recording(),
        EngineEvent::Prediction { data } => session.update_prediction(data),
        EngineEvent::EegStatus { nof_eeg_samples } => session.set_eeg_samples(nof_eeg_samples),
        EngineEvent::Graph { filename } => {
            session.graph_url = Some(cache_busted(&filename, rand::random::<f64>()))
        }
        EngineEvent::Users { count } => session.users_text = count_label(count, "client"),
        EngineEvent::EegData { .. } => trace!("eeg_data not shown on the dashboard"),
        other => {
            debug!(event = ?other, "event not used by the dashboard");
            return Routed::Ignored;
        }
    }
    Routed::Handled
}

/// The transport failed or closed; raise the engine-down banner.
pub fn handle_link_down<S: EngineSink>(session: &mut AdminSession, link: &mut EngineLink<S>) {
    if link.mark_down() {
        session.engine_down_banner = true;
        session.users_text = ENGINE_DOWN_TEXT.to_string();
    }
}
