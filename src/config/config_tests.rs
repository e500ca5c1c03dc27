use super::*;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.polling_interval(), Duration::from_millis(500));
    assert_eq!(
        config.max_unpinned_history_count(),
        DEFAULT_MAX_UNPINNED_HISTORY_COUNT
    );
    assert_eq!(config.dedup_check_window(), DEFAULT_DEDUP_CHECK_WINDOW);
    assert_eq!(config.preview_char_limit(), DEFAULT_PREVIEW_CHAR_LIMIT);
    assert_eq!(config.max_text_bytes(), DEFAULT_MAX_TEXT_BYTES);
}

#[test]
fn test_polling_interval_is_clamped() {
    let fast = Config {
        polling_interval_seconds: Some(0.01),
        ..Default::default()
    };
    assert_eq!(
        fast.polling_interval(),
        Duration::from_secs_f64(MIN_POLLING_INTERVAL_SECONDS)
    );

    let slow = Config {
        polling_interval_seconds: Some(30.0),
        ..Default::default()
    };
    assert_eq!(
        slow.polling_interval(),
        Duration::from_secs_f64(MAX_POLLING_INTERVAL_SECONDS)
    );

    let nan = Config {
        polling_interval_seconds: Some(f64::NAN),
        ..Default::default()
    };
    assert_eq!(nan.polling_interval(), Duration::from_millis(500));
}

#[test]
fn test_max_unpinned_count_is_clamped() {
    let low = Config {
        max_unpinned_history_count: Some(1),
        ..Default::default()
    };
    assert_eq!(low.max_unpinned_history_count(), 5);

    let high = Config {
        max_unpinned_history_count: Some(500),
        ..Default::default()
    };
    assert_eq!(high.max_unpinned_history_count(), 30);
}

#[test]
fn test_zero_max_text_bytes_means_unlimited() {
    let config = Config {
        max_text_bytes: Some(0),
        ..Default::default()
    };
    assert_eq!(config.max_text_bytes(), usize::MAX);
}

#[test]
fn test_config_camel_case_keys() {
    let json = r#"{
        "pollingIntervalSeconds": 1.5,
        "maxUnpinnedHistoryCount": 10,
        "dedupCheckWindow": 12,
        "previewCharLimit": 40,
        "dataDir": "/tmp/clipkeep-test"
    }"#;
    let config: Config = serde_json::from_str(json).unwrap();
    assert_eq!(config.polling_interval(), Duration::from_millis(1500));
    assert_eq!(config.max_unpinned_history_count(), 10);
    assert_eq!(config.dedup_check_window(), 12);
    assert_eq!(config.preview_char_limit(), 40);
    assert_eq!(
        config.data_dir(),
        std::path::PathBuf::from("/tmp/clipkeep-test")
    );
}

#[test]
fn test_serialization_skips_unset_fields() {
    let config = Config {
        dedup_check_window: Some(20),
        ..Default::default()
    };
    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(json, r#"{"dedupCheckWindow":20}"#);
}

#[test]
fn test_load_missing_file_returns_defaults() {
    let dir = tempdir().unwrap();
    let config = load_config_from(&dir.path().join("missing.json"));
    assert_eq!(config, Config::default());
}

#[test]
fn test_load_invalid_file_returns_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"pollingIntervalSeconds": "fast"}"#).unwrap();
    assert_eq!(load_config_from(&path), Config::default());
}

#[test]
fn test_load_valid_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"maxUnpinnedHistoryCount": 7}"#).unwrap();
    let config = load_config_from(&path);
    assert_eq!(config.max_unpinned_history_count(), 7);
}

#[test]
fn test_settings_updates_are_shared_between_clones() {
    let settings = Settings::new(Config::default());
    let clone = settings.clone();
    settings.update(|c| c.max_unpinned_history_count = Some(8));
    assert_eq!(clone.max_unpinned_history_count(), 8);
    assert_eq!(clone.snapshot().max_unpinned_history_count, Some(8));
}
