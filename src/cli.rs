use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "bci-presenter")]
#[command(version)]
#[command(about = "Stimulus display and session dashboard for a BCI engine")]
pub struct Args {
    /// TOML configuration file
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Engine WebSocket URL (overrides the configured one)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Frame rate of the render loop
    #[arg(long, global = true)]
    pub fps: Option<f64>,

    /// Log socket and routing detail (debug level)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the stimulus presentation client
    Stimulus {
        /// Seed for decor trajectories and strobe jitter
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run the session-control dashboard (commands on stdin)
    Admin {
        /// User number to start from
        #[arg(long)]
        user_no: Option<u32>,
    },

    /// Print shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Args {
    /// Fold command-line overrides into a loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        match &self.command {
            Command::Stimulus { seed } => {
                if let Some(url) = &self.url {
                    config.stimulus.url = url.clone();
                }
                if let Some(fps) = self.fps {
                    config.stimulus.frame_rate = fps;
                }
                if seed.is_some() {
                    config.stimulus.seed = *seed;
                }
            }
            Command::Admin { user_no } => {
                if let Some(url) = &self.url {
                    config.admin.url = url.clone();
                }
                if let Some(fps) = self.fps {
                    config.admin.frame_rate = fps;
                }
                if let Some(n) = user_no {
                    config.admin.initial_user_no = *n;
                }
            }
            Command::Completions { .. } => {}
        }
        if self.verbose {
            config.socket.debug = true;
        }
    }

    /// Default tracing directive for this invocation.
    pub fn log_directive(&self) -> &'static str {
        if self.verbose {
            "bci_presenter=debug"
        } else {
            "bci_presenter=info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_stimulus_minimal() {
        let args = Args::parse_from(["bci", "stimulus"]);
        assert_eq!(args.command, Command::Stimulus { seed: None });
        assert!(args.config.is_none());
        assert!(args.url.is_none());
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_parse_admin_full() {
        let args = Args::parse_from([
            "bci",
            "--config",
            "presenter.toml",
            "admin",
            "--url",
            "ws://engine:6581/",
            "--fps",
            "30",
            "--user-no",
            "42",
            "-v",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("presenter.toml")));
        assert_eq!(args.url.as_deref(), Some("ws://engine:6581/"));
        assert_eq!(args.fps, Some(30.0));
        assert!(args.verbose);
        assert_eq!(args.command, Command::Admin { user_no: Some(42) });
    }

    #[test]
    fn test_args_parse_completions() {
        let args = Args::parse_from(["bci", "completions", "bash"]);
        assert_eq!(args.command, Command::Completions { shell: Shell::Bash });
    }

    #[test]
    fn test_args_missing_subcommand_is_error() {
        assert!(Args::try_parse_from(["bci"]).is_err());
    }

    #[test]
    fn test_overrides_target_selected_client() {
        let args = Args::parse_from(["bci", "--url", "ws://x/", "stimulus", "--seed", "7"]);
        let mut config = Config::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.stimulus.url, "ws://x/");
        assert_eq!(config.stimulus.seed, Some(7));
        assert_eq!(config.admin.url, Config::default().admin.url);
    }

    #[test]
    fn test_overrides_admin_user_no_and_verbose() {
        let args = Args::parse_from(["bci", "admin", "--user-no", "12", "--verbose"]);
        let mut config = Config::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.admin.initial_user_no, 12);
        assert!(config.socket.debug);
        assert_eq!(args.log_directive(), "bci_presenter=debug");
    }
}
