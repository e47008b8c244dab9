//! Terminal rendering of both clients' visual state.
//!
//! The frame loops run at display rate, so output is line-oriented and only
//! printed when the summary actually changes.

use colored::*;

use crate::admin::{AdminSession, CATEGORIES};
use crate::link::LinkStatus;
use crate::stimulus::{Backdrop, StimulusMachine, VisualMode};

/// Prints a status line only when it differs from the previous one.
#[derive(Debug, Default)]
pub struct StatusPrinter {
    last: Option<String>,
}

impl StatusPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the line was printed.
    pub fn print_if_changed(&mut self, line: String) -> bool {
        if self.last.as_deref() == Some(line.as_str()) {
            return false;
        }
        println!("{line}");
        self.last = Some(line);
        true
    }
}

pub fn print_header(title: &str, url: &str) {
    println!("{}", title.bright_cyan().bold());
    println!("{}: {}", "Engine".bright_yellow(), url);
    println!("{}", "=".repeat(50).bright_blue());
}

fn link_badge(status: LinkStatus) -> ColoredString {
    match status {
        LinkStatus::Up => "engine up".bright_green(),
        LinkStatus::Down => "ENGINE DOWN".on_red().bright_white(),
        LinkStatus::Unknown => "engine ?".dimmed(),
    }
}

fn mode_label(mode: VisualMode) -> ColoredString {
    let s = mode.to_string();
    match mode {
        VisualMode::Trial => s.bright_magenta().bold(),
        VisualMode::Calibrate => s.bright_yellow().bold(),
        VisualMode::GoingToTrial | VisualMode::LeavingAttract => s.bright_cyan(),
        VisualMode::Init | VisualMode::Attract => s.bright_blue(),
    }
}

/// One-line summary of the stimulus screen. Opacities are rounded to a
/// tenth so fades do not reprint every frame.
pub fn stimulus_line<R>(machine: &StimulusMachine<R>, status: LinkStatus) -> String
where
    R: rand::Rng,
{
    let scene = machine.scene();
    let mut parts = vec![
        format!("[{}]", link_badge(status)),
        format!("{} ({})", mode_label(machine.mode()), machine.client_mode()),
    ];

    match machine.mode() {
        VisualMode::GoingToTrial => {
            let phase = if scene.prepare > 0.0 {
                "prepare"
            } else if scene.countdown > 0.0 {
                "+"
            } else if scene.get_ready > 0.0 {
                "get ready"
            } else {
                "-"
            };
            parts.push(phase.to_string());
        }
        VisualMode::Trial => match scene.shown {
            Some(shown) => parts.push(format!("{} p{:02}", "SHOW".on_white().black(), shown.index)),
            None => parts.push("  .".to_string()),
        },
        VisualMode::Calibrate => {
            let flash = match scene.backdrop {
                Backdrop::White => "*".on_white().black().to_string(),
                _ => " ".to_string(),
            };
            let text = if scene.calibrate_opacity > 0.05 {
                scene.calibrate_text.as_str()
            } else {
                ""
            };
            parts.push(format!("{flash} {text}"));
        }
        VisualMode::Attract | VisualMode::LeavingAttract | VisualMode::Init => {
            parts.push(format!("attract {:.1}", scene.attract));
        }
    }

    if !scene.timestamp_label.is_empty() {
        parts.push(scene.timestamp_label.dimmed().to_string());
    }
    if !scene.status_text.is_empty() {
        parts.push(format!("status: {}", scene.status_text));
    }
    if !scene.users_text.is_empty() {
        parts.push(scene.users_text.clone());
    }
    parts.join("  ")
}

/// One-line summary of the dashboard.
pub fn admin_line(session: &AdminSession, status: LinkStatus) -> String {
    let mut parts = vec![
        format!("[{}]", link_badge(status)),
        format!("user {}", session.user_no_label().bright_white().bold()),
    ];
    if session.is_running() {
        let secs = session.elapsed_seconds().unwrap_or(0);
        parts.push(format!("{} {secs}s", "RUNNING".bright_green().bold()));
    } else {
        parts.push("idle".dimmed().to_string());
    }
    let hist: Vec<String> = CATEGORIES
        .iter()
        .zip(session.histogram())
        .map(|(name, n)| format!("{name}:{n}"))
        .collect();
    parts.push(hist.join(" "));
    parts.push(format!("shown {}", session.sequence().len()));
    if session.recording_opacity() > 0.0 {
        parts.push("● REC".bright_red().to_string());
    }
    if !session.status_text.is_empty() {
        parts.push(format!("status: {}", session.status_text));
    }
    if !session.users_text.is_empty() {
        parts.push(session.users_text.clone());
    }
    parts.join("  ")
}

/// Multi-line panel with the quality and prediction maps, printed on demand.
pub fn admin_panels(session: &AdminSession) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", "EEG quality".bright_yellow()));
    for (channel, variance) in session.eeg_quality() {
        out.push_str(&format!("  {channel:<5} {variance:>12.2}\n"));
    }
    out.push_str(&format!("{}\n", "Prediction".bright_yellow()));
    for (class, p) in session.prediction() {
        out.push_str(&format!("  {class:<8} {p:>6.3}\n"));
    }
    out.push_str(&format!("{} {}\n", "Sequence:".bright_yellow(), session.sequence_label()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdminConfig, StimulusConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn printer_suppresses_repeats() {
        let mut p = StatusPrinter::new();
        assert!(p.print_if_changed("a".into()));
        assert!(!p.print_if_changed("a".into()));
        assert!(p.print_if_changed("b".into()));
    }

    #[test]
    fn stimulus_line_shows_mode_and_link() {
        plain();
        let m = StimulusMachine::with_rng(StimulusConfig::default(), StdRng::seed_from_u64(0));
        let line = stimulus_line(&m, LinkStatus::Down);
        assert!(line.contains("ENGINE DOWN"), "{line}");
        assert!(line.contains("init (attract)"), "{line}");
    }

    #[test]
    fn admin_line_lists_categories() {
        plain();
        let mut s = AdminSession::new(AdminConfig::default());
        s.record_stimulus(3);
        let line = admin_line(&s, LinkStatus::Up);
        assert!(line.contains("user 0001"), "{line}");
        assert!(line.contains("feet:1"), "{line}");
        assert!(line.contains("idle"), "{line}");
    }

    #[test]
    fn admin_panels_render_maps() {
        plain();
        let s = AdminSession::new(AdminConfig::default());
        let text = admin_panels(&s);
        assert!(text.contains("CP3"));
        assert!(text.contains("child"));
        assert!(!text.contains("briefcase"));
    }
}
