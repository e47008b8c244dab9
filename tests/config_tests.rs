//! Configuration files on disk and their interplay with CLI overrides.

use std::io::Write;

use bci_presenter::cli::Args;
use bci_presenter::config::{Config, DEFAULT_ADMIN_URL};
use bci_presenter::PresenterError;
use clap::Parser;
use tempfile::NamedTempFile;

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_file_overrides_defaults() {
    let file = write_config(
        r#"
[socket]
reconnect_interval_ms = 250
reconnect_decay = 2.0

[stimulus]
url = "ws://10.0.0.5:8580/"
frame_rate = 144.0
seed = 99

[admin]
initial_user_no = 500
"#,
    );
    let c = Config::load(Some(file.path())).unwrap();
    assert_eq!(c.socket.reconnect_interval_ms, 250);
    assert_eq!(c.socket.reconnect_decay, 2.0);
    assert_eq!(c.socket.max_reconnect_interval_ms, 3000);
    assert_eq!(c.stimulus.url, "ws://10.0.0.5:8580/");
    assert_eq!(c.stimulus.frame_rate, 144.0);
    assert_eq!(c.stimulus.seed, Some(99));
    assert_eq!(c.admin.initial_user_no, 500);
    assert_eq!(c.admin.url, DEFAULT_ADMIN_URL);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, PresenterError::Io(_)));
}

#[test]
fn test_wrong_type_is_config_error_naming_file() {
    let file = write_config("[stimulus]\npause_interval = \"twenty\"\n");
    let err = Config::load(Some(file.path())).unwrap_err();
    match err {
        PresenterError::Config { path, .. } => {
            assert_eq!(path, file.path().display().to_string());
        }
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn test_cli_overrides_win_over_file() {
    let file = write_config("[admin]\nurl = \"ws://from-file:6581/\"\nframe_rate = 30.0\n");
    let path = file.path().display().to_string();
    let args = Args::parse_from(["bci", "--config", &path, "admin", "--url", "ws://from-cli:6581/"]);

    let mut c = Config::load(args.config.as_deref()).unwrap();
    args.apply_overrides(&mut c);
    assert_eq!(c.admin.url, "ws://from-cli:6581/");
    assert_eq!(c.admin.frame_rate, 30.0);
}

#[test]
fn test_config_roundtrips_through_toml() {
    let mut c = Config::default();
    c.socket.max_reconnect_attempts = Some(12);
    c.stimulus.pause_interval = 15;
    let text = toml::to_string(&c).unwrap();
    let back = Config::from_toml_str(&text, "roundtrip").unwrap();
    assert_eq!(back, c);
}
