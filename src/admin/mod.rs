//! Session-control dashboard: operator commands, session state and the
//! engine's progress reports.

pub mod command;
pub mod router;
pub mod session;

pub use command::{AdminCommand, HELP};
pub use router::{handle_link_down, handle_message};
pub use session::{AdminSession, Outcome, CATEGORIES};
