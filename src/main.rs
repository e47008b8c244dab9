use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use bci_presenter::app;
use bci_presenter::cli::{Args, Command};
use bci_presenter::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Command::Completions { shell } = args.command {
        let mut cmd = Args::command();
        let name = cmd.get_name().to_string();
        clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
        return Ok(());
    }

    // RUST_LOG wins over -v when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(args.config.as_deref())?;
    args.apply_overrides(&mut config);

    match args.command {
        Command::Stimulus { .. } => app::run_stimulus(config).await?,
        Command::Admin { .. } => app::run_admin(config).await?,
        Command::Completions { .. } => {}
    }

    Ok(())
}
