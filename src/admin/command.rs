//! Operator commands typed on the dashboard's stdin.

use std::str::FromStr;

use crate::error::PresenterError;
use crate::protocol::CalibrationTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    Start,
    Stop,
    Cancel,
    Accumulate,
    StartFitting,
    /// Send the user number, optionally replacing it first.
    SetUserNo(Option<u32>),
    Calibrate(CalibrationTarget),
    Plus,
    Minus,
    Poll,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  a, start          start a session
  s, stop           stop the session
  c, cancel         cancel the session
  acc, accumulate   start data accumulation
  fit, start_fitting
  user [n]          set (and send) the user number
  cal-ad            calibrate audio vs display
  cal-ea            calibrate EEG vs audio
  cal-ed            calibrate EEG vs display
  +, plus / -, minus
  p, poll
  h, help
  q, quit";

impl FromStr for AdminCommand {
    type Err = PresenterError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let head = words
            .next()
            .ok_or_else(|| PresenterError::UnknownCommand(String::new()))?
            .to_lowercase();
        let arg = words.next();

        let cmd = match head.as_str() {
            "a" | "start" => AdminCommand::Start,
            "s" | "stop" => AdminCommand::Stop,
            "c" | "cancel" => AdminCommand::Cancel,
            "acc" | "accumulate" => AdminCommand::Accumulate,
            "fit" | "start_fitting" => AdminCommand::StartFitting,
            "user" | "set_user_no" => {
                let n = match arg {
                    Some(raw) => Some(
                        raw.parse::<u32>()
                            .map_err(|_| PresenterError::UnknownCommand(line.trim().to_string()))?,
                    ),
                    None => None,
                };
                AdminCommand::SetUserNo(n)
            }
            "cal-ad" => AdminCommand::Calibrate(CalibrationTarget::AudioVsDisplay),
            "cal-ea" => AdminCommand::Calibrate(CalibrationTarget::EegVsAudio),
            "cal-ed" => AdminCommand::Calibrate(CalibrationTarget::EegVsDisplay),
            "+" | "plus" => AdminCommand::Plus,
            "-" | "minus" => AdminCommand::Minus,
            "p" | "poll" => AdminCommand::Poll,
            "h" | "help" | "?" => AdminCommand::Help,
            "q" | "quit" | "exit" => AdminCommand::Quit,
            _ => return Err(PresenterError::UnknownCommand(line.trim().to_string())),
        };
        Ok(cmd)
    }
}
