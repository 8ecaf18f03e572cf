// Settings Tests - Testing ClientSettings persistence and derived values

use crate::storage::ClientSettings;
use std::time::Duration;
use tempfile::{tempdir, NamedTempFile};
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_settings_default() {
    let settings = ClientSettings::default();

    assert_eq!(settings.api_base_url, "http://localhost:8000/api");
    assert_eq!(settings.history_page_size, 50);
    assert_eq!(settings.reconnect_base_delay_ms, 1000);
    assert_eq!(settings.max_reconnect_attempts, 5);
    assert_eq!(settings.request_timeout_secs, 30);
}

#[test]
fn test_settings_load_missing_file_returns_default() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("missing.json");

    let settings = ClientSettings::load(&path).expect("Failed to load");
    assert_eq!(settings, ClientSettings::default());
}

#[test]
fn test_settings_load_empty_file_returns_default() {
    let file = NamedTempFile::new().expect("Failed to create temp file");

    let settings = ClientSettings::load(file.path()).expect("Failed to load");
    assert_eq!(settings, ClientSettings::default());
}

#[test]
fn test_settings_save_and_load() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("nested").join("taskchat.json");

    let mut settings = ClientSettings::default();
    settings.api_base_url = "https://market.example.com/api".to_string();
    settings.history_page_size = 20;
    settings.max_reconnect_attempts = 3;

    settings.save(&path).expect("Failed to save");
    let loaded = ClientSettings::load(&path).expect("Failed to load");

    assert_eq!(loaded, settings);
}

#[test]
fn test_settings_partial_file_fills_defaults() {
    let file = NamedTempFile::new().expect("Failed to create temp file");
    std::fs::write(file.path(), r#"{"history_page_size": 10}"#).expect("Failed to write");

    let settings = ClientSettings::load(file.path()).expect("Failed to load");
    assert_eq!(settings.history_page_size, 10);
    assert_eq!(settings.max_reconnect_attempts, 5);
}

#[test]
fn test_settings_invalid_json() {
    let file = NamedTempFile::new().expect("Failed to create temp file");
    std::fs::write(file.path(), "{ not json").expect("Failed to write");

    assert_err!(ClientSettings::load(file.path()));
}

#[test]
fn test_settings_derived_values() {
    let mut settings = ClientSettings::default();
    settings.reconnect_base_delay_ms = 250;
    settings.max_reconnect_attempts = 2;
    settings.history_page_size = 25;

    let policy = settings.reconnect_policy();
    assert_eq!(policy.base_delay, Duration::from_millis(250));
    assert_eq!(policy.max_attempts, 2);
    assert_eq!(settings.request_timeout(), Duration::from_secs(30));
    assert_eq!(settings.session_settings().history_page_size, 25);

    let base = assert_ok!(settings.api_base());
    assert_eq!(base.as_str(), "http://localhost:8000/api");
}

#[test]
fn test_settings_invalid_base_url() {
    let mut settings = ClientSettings::default();
    settings.api_base_url = "not a url".to_string();

    assert_err!(settings.api_base());
}
