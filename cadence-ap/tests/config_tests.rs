//! Engine configuration loading
//!
//! Note: Uses serial_test because the tests manipulate CADENCE_CONFIG.

mod helpers;

use cadence_ap::config::EngineConfig;
use cadence_ap::playback::PlaybackEngine;
use cadence_ap::Error;
use cadence_common::config::CONFIG_ENV_VAR;
use helpers::Mocks;
use serial_test::serial;
use std::env;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
#[serial]
async fn test_loaded_config_drives_new_session() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "config.toml",
        "[logging]\nlevel = \"debug\"\n\n[session]\ndefault_volume = 70\nautoplay = true\n",
    );
    env::set_var(CONFIG_ENV_VAR, &path);

    let (config, logging) = EngineConfig::load(None).unwrap();
    env::remove_var(CONFIG_ENV_VAR);
    assert_eq!(logging.level, "debug");

    let mocks = Mocks::new();
    let engine = Arc::new(PlaybackEngine::new(
        config.with_volume(Some(120)),
        mocks.sink.clone(),
        mocks.services(),
    ));
    engine.start().await.unwrap();

    let settings = engine.settings().await;
    assert_eq!(settings.volume, 120);
    assert!(settings.autoplay);
    assert!(settings.filters.is_empty());
}

#[test]
#[serial]
fn test_zero_ready_timeout_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.toml", "[transport]\nready_timeout_ms = 0\n");

    let err = EngineConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {:?}", err);
}

#[test]
#[serial]
fn test_missing_cli_file_surfaces_common_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml");

    let err = EngineConfig::load(Some(&missing)).unwrap_err();
    assert!(matches!(err, Error::Common(_)), "got {:?}", err);
}
