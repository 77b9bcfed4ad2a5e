// SPDX-License-Identifier: GPL-3.0-only

//! Per-camera recording settings
//!
//! Settings are stored as one JSON document keyed by camera id:
//!
//! ```json
//! {
//!   "0": {
//!     "resolution_x": 1280,
//!     "resolution_y": 720,
//!     "fps": 30.0,
//!     "extension": "avi",
//!     "rec_folder": "recordings/0",
//!     "rec_pattern": "%Y-%m-%d %H-%M-%S",
//!     "rec_length": 180,
//!     "timer_length": 300,
//!     "motion_length": 30
//!   }
//! }
//! ```

use crate::backends::camera::{DeviceConfig, SourceId};
use crate::constants::{containers, defaults};
use crate::errors::ConfigError;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Recording configuration for one camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Capture width in pixels
    pub resolution_x: u32,
    /// Capture height in pixels
    pub resolution_y: u32,
    /// Requested capture rate (frames per second)
    pub fps: f64,
    /// Container extension (e.g., "avi", "mp4")
    pub extension: String,
    /// Folder receiving this camera's segments
    pub rec_folder: PathBuf,
    /// strftime pattern for segment file names
    pub rec_pattern: String,
    /// Loop mode segment length in seconds
    pub rec_length: u64,
    /// Timer mode session length in seconds
    pub timer_length: u64,
    /// Motion mode idle timeout in seconds
    pub motion_length: u64,
}

impl CameraSettings {
    /// Default settings for a camera that has never been configured
    pub fn defaults_for(source: SourceId) -> Self {
        Self {
            resolution_x: defaults::RESOLUTION_X,
            resolution_y: defaults::RESOLUTION_Y,
            fps: defaults::FPS,
            extension: defaults::EXTENSION.to_string(),
            rec_folder: Path::new(defaults::REC_FOLDER_ROOT).join(source.settings_key()),
            rec_pattern: defaults::REC_PATTERN.to_string(),
            rec_length: defaults::REC_LENGTH,
            timer_length: defaults::TIMER_LENGTH,
            motion_length: defaults::MOTION_LENGTH,
        }
    }

    /// Check the settings invariants
    pub fn validate(&self, camera: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            camera: camera.to_string(),
            reason,
        };

        if self.resolution_x == 0 || self.resolution_y == 0 {
            return Err(invalid(format!(
                "resolution must be positive, got {}x{}",
                self.resolution_x, self.resolution_y
            )));
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(invalid(format!("fps must be positive, got {}", self.fps)));
        }
        if self.rec_length == 0 || self.timer_length == 0 || self.motion_length == 0 {
            return Err(invalid(
                "rec_length, timer_length and motion_length must be positive".to_string(),
            ));
        }
        if !containers::is_supported(&self.extension) {
            return Err(invalid(format!(
                "unsupported extension {:?} (supported: {})",
                self.extension,
                containers::SUPPORTED_EXTENSIONS.join(", ")
            )));
        }
        if self.rec_pattern.is_empty()
            || StrftimeItems::new(&self.rec_pattern).any(|item| matches!(item, Item::Error))
        {
            return Err(invalid(format!(
                "invalid rec_pattern {:?}",
                self.rec_pattern
            )));
        }

        Ok(())
    }

    /// Capture format requested from the device
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            width: self.resolution_x,
            height: self.resolution_y,
            fps: self.fps,
        }
    }

    pub fn segment_length(&self) -> Duration {
        Duration::from_secs(self.rec_length)
    }

    pub fn timer_duration(&self) -> Duration {
        Duration::from_secs(self.timer_length)
    }

    pub fn motion_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.motion_length)
    }
}

/// All stored settings, keyed by camera id
pub type SettingsCollection = BTreeMap<String, CameraSettings>;

/// Backing storage for the settings collection
pub trait SettingsPersistence: Send + Sync {
    /// Load the stored collection; `None` when nothing was stored yet
    fn load(&self) -> Result<Option<SettingsCollection>, ConfigError>;

    /// Replace the stored collection
    fn save(&self, settings: &SettingsCollection) -> Result<(), ConfigError>;
}

/// Settings persisted as a pretty-printed JSON file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/camrec/config.json`, falling back to the working directory
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join(defaults::CONFIG_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(defaults::CONFIG_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, reason: impl ToString) -> ConfigError {
        ConfigError::Write {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

impl SettingsPersistence for JsonFileStore {
    fn load(&self) -> Result<Option<SettingsCollection>, ConfigError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No settings file yet");
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::Read {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let settings = serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        Ok(Some(settings))
    }

    fn save(&self, settings: &SettingsCollection) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;
        }

        let json = serde_json::to_string_pretty(settings).map_err(|e| self.write_error(e))?;

        // Write next to the target and rename so readers never see a partial file
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(|e| self.write_error(e))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| self.write_error(e))?;

        debug!(path = %self.path.display(), cameras = settings.len(), "Settings saved");
        Ok(())
    }
}

/// Resolves camera settings, creating and persisting defaults on first use
///
/// The collection is loaded once and cached. Every mutation goes through a
/// single mutex, so two cameras resolving at the same time cannot race on
/// the backing file.
pub struct SettingsStore {
    persistence: Box<dyn SettingsPersistence>,
    cache: Mutex<Option<SettingsCollection>>,
}

impl SettingsStore {
    pub fn new(persistence: impl SettingsPersistence + 'static) -> Self {
        Self {
            persistence: Box::new(persistence),
            cache: Mutex::new(None),
        }
    }

    /// Settings stored in a JSON file at `path`
    pub fn open_json(path: impl Into<PathBuf>) -> Self {
        Self::new(JsonFileStore::new(path))
    }

    /// Settings for `source`
    ///
    /// Unknown cameras get [`CameraSettings::defaults_for`], which are
    /// persisted before being returned. If persisting fails nothing is
    /// cached, so a later call retries instead of returning values that were
    /// never stored.
    pub fn resolve(&self, source: SourceId) -> Result<CameraSettings, ConfigError> {
        let mut guard = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(self.persistence.load()?.unwrap_or_default());
        }
        let collection = guard.get_or_insert_with(SettingsCollection::new);

        let key = source.settings_key();
        if let Some(existing) = collection.get(&key) {
            existing.validate(&key)?;
            return Ok(existing.clone());
        }

        let settings = CameraSettings::defaults_for(source);
        let mut updated = collection.clone();
        updated.insert(key, settings.clone());
        self.persistence.save(&updated)?;
        *collection = updated;

        info!(
            camera = %source,
            folder = %settings.rec_folder.display(),
            "Created default settings"
        );
        Ok(settings)
    }

    /// Snapshot of every stored entry
    pub fn all(&self) -> Result<SettingsCollection, ConfigError> {
        let mut guard = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(self.persistence.load()?.unwrap_or_default());
        }
        Ok(guard.clone().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory persistence that counts saves
    #[derive(Clone, Default)]
    struct CountingStore {
        stored: Arc<Mutex<Option<SettingsCollection>>>,
        saves: Arc<AtomicUsize>,
        fail_writes: bool,
    }

    impl SettingsPersistence for CountingStore {
        fn load(&self) -> Result<Option<SettingsCollection>, ConfigError> {
            Ok(self.stored.lock().unwrap().clone())
        }

        fn save(&self, settings: &SettingsCollection) -> Result<(), ConfigError> {
            if self.fail_writes {
                return Err(ConfigError::Write {
                    path: PathBuf::from("memory"),
                    reason: "read-only".to_string(),
                });
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.stored.lock().unwrap() = Some(settings.clone());
            Ok(())
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = CameraSettings::defaults_for(SourceId(0));
        assert!(settings.validate("0").is_ok());
        assert_eq!(settings.resolution_x, 1280);
        assert_eq!(settings.resolution_y, 720);
        assert_eq!(settings.fps, 30.0);
        assert_eq!(settings.extension, "avi");
        assert_eq!(settings.rec_folder, PathBuf::from("recordings/0"));
        assert_eq!(settings.rec_length, 180);
        assert_eq!(settings.timer_length, 300);
        assert_eq!(settings.motion_length, 30);
    }

    #[test]
    fn test_resolve_is_idempotent_and_persists_once() {
        let backend = CountingStore::default();
        let store = SettingsStore::new(backend.clone());

        let first = store.resolve(SourceId(4)).unwrap();
        let second = store.resolve(SourceId(4)).unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.saves.load(Ordering::SeqCst), 1);
        let stored = backend.stored.lock().unwrap().clone().unwrap();
        assert_eq!(stored.get("4"), Some(&first));
    }

    #[test]
    fn test_existing_entry_is_not_overwritten() {
        let backend = CountingStore::default();
        let mut custom = CameraSettings::defaults_for(SourceId(1));
        custom.fps = 15.0;
        custom.extension = "mkv".to_string();
        let mut collection = SettingsCollection::new();
        collection.insert("1".to_string(), custom.clone());
        *backend.stored.lock().unwrap() = Some(collection);

        let store = SettingsStore::new(backend.clone());
        assert_eq!(store.resolve(SourceId(1)).unwrap(), custom);
        assert_eq!(backend.saves.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_persist_is_an_error_and_not_cached() {
        let backend = CountingStore {
            fail_writes: true,
            ..Default::default()
        };
        let store = SettingsStore::new(backend);

        assert!(matches!(
            store.resolve(SourceId(0)),
            Err(ConfigError::Write { .. })
        ));
        assert!(store.all().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_resolve_keeps_every_camera() {
        let backend = CountingStore::default();
        let store = SettingsStore::new(backend.clone());

        std::thread::scope(|scope| {
            for id in 0..8 {
                let store = &store;
                scope.spawn(move || store.resolve(SourceId(id)).unwrap());
            }
        });

        assert_eq!(backend.saves.load(Ordering::SeqCst), 8);
        let stored = backend.stored.lock().unwrap().clone().unwrap();
        let keys: Vec<String> = stored.keys().cloned().collect();
        let mut expected: Vec<String> = (0..8).map(|id| id.to_string()).collect();
        expected.sort();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_concurrent_resolve_against_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = SettingsStore::open_json(&path);

        std::thread::scope(|scope| {
            for id in 0..6 {
                let store = &store;
                scope.spawn(move || store.resolve(SourceId(id)).unwrap());
            }
        });

        let on_disk = JsonFileStore::new(&path).load().unwrap().unwrap();
        assert_eq!(on_disk.len(), 6);
        for id in 0..6 {
            assert_eq!(
                on_disk.get(&id.to_string()),
                Some(&CameraSettings::defaults_for(SourceId(id)))
            );
        }
    }

    #[test]
    fn test_invalid_stored_entry_is_rejected() {
        let backend = CountingStore::default();
        let mut broken = CameraSettings::defaults_for(SourceId(2));
        broken.rec_length = 0;
        let mut collection = SettingsCollection::new();
        collection.insert("2".to_string(), broken);
        *backend.stored.lock().unwrap() = Some(collection);

        let store = SettingsStore::new(backend);
        assert!(matches!(
            store.resolve(SourceId(2)),
            Err(ConfigError::Invalid { ref camera, .. }) if camera == "2"
        ));
    }

    #[test]
    fn test_validation_rules() {
        let base = CameraSettings::defaults_for(SourceId(0));

        let mut fps = base.clone();
        fps.fps = 0.0;
        assert!(fps.validate("0").is_err());

        let mut ext = base.clone();
        ext.extension = "gif".to_string();
        assert!(ext.validate("0").is_err());

        let mut pattern = base.clone();
        pattern.rec_pattern = "%Q".to_string();
        assert!(pattern.validate("0").is_err());

        let mut res = base;
        res.resolution_y = 0;
        assert!(res.validate("0").is_err());
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let store = SettingsStore::open_json(&path);
        let created = store.resolve(SourceId(0)).unwrap();
        assert!(path.exists());

        // A fresh store reads the same values back from disk
        let reopened = SettingsStore::open_json(&path);
        assert_eq!(reopened.resolve(SourceId(0)).unwrap(), created);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["0"]["resolution_x"], 1280);
        assert_eq!(raw["0"]["rec_pattern"], "%Y-%m-%d %H-%M-%S");
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::open_json(&path);
        assert!(matches!(
            store.resolve(SourceId(0)),
            Err(ConfigError::Parse { .. })
        ));
    }
}
