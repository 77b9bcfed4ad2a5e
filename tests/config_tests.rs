// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the settings store

use camrec::config::{CameraSettings, JsonFileStore, SettingsCollection, SettingsPersistence};
use camrec::{ConfigError, SettingsStore, SourceId};
use std::path::PathBuf;

#[test]
fn test_defaults_created_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("camrec").join("config.json");
    let store = SettingsStore::open_json(&path);

    let settings = store.resolve(SourceId(3)).unwrap();
    assert_eq!(settings, CameraSettings::defaults_for(SourceId(3)));
    assert_eq!(settings.rec_folder, PathBuf::from("recordings/3"));

    let stored = JsonFileStore::new(&path).load().unwrap().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored["3"], settings);
}

#[test]
fn test_json_schema_field_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    SettingsStore::open_json(&path).resolve(SourceId(0)).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let entry = raw["0"].as_object().unwrap();
    let mut keys: Vec<&str> = entry.keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "extension",
            "fps",
            "motion_length",
            "rec_folder",
            "rec_length",
            "rec_pattern",
            "resolution_x",
            "resolution_y",
            "timer_length",
        ]
    );
}

#[test]
fn test_hand_written_settings_are_used() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
  "1": {
    "resolution_x": 640,
    "resolution_y": 480,
    "fps": 15.0,
    "extension": "mkv",
    "rec_folder": "/srv/cams/1",
    "rec_pattern": "cam1_%Y%m%d_%H%M%S",
    "rec_length": 60,
    "timer_length": 120,
    "motion_length": 10
  }
}"#,
    )
    .unwrap();

    let store = SettingsStore::open_json(&path);
    let settings = store.resolve(SourceId(1)).unwrap();
    assert_eq!(settings.resolution_x, 640);
    assert_eq!(settings.extension, "mkv");
    assert_eq!(settings.segment_length().as_secs(), 60);

    // Adding a second camera keeps the first one intact
    store.resolve(SourceId(2)).unwrap();
    let all = store.all().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all["1"], settings);
}

#[test]
fn test_unsupported_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let mut settings = CameraSettings::defaults_for(SourceId(0));
    settings.extension = "webm".to_string();
    let mut collection = SettingsCollection::new();
    collection.insert("0".to_string(), settings);
    JsonFileStore::new(&path).save(&collection).unwrap();

    let result = SettingsStore::open_json(&path).resolve(SourceId(0));
    assert!(matches!(result, Err(ConfigError::Invalid { .. })));
}

#[test]
fn test_default_path_ends_in_app_dir() {
    let path = JsonFileStore::default_path();
    assert!(path.ends_with("camrec/config.json"));
}
