//! User settings with XDG Base Directory compliance.
//!
//! Settings are a single JSON document. Missing fields take their default
//! value so older files keep loading after new options are added.

use std::{
    env::var,
    fs::{create_dir_all, read_to_string, write},
    io::Error as StdError,
    path::PathBuf,
};

use {
    parking_lot::{RwLock, RwLockReadGuard},
    regex::Regex,
    serde::{Deserialize, Serialize},
    serde_json::{Error as SerdeJsonError, from_str, to_string_pretty},
    thiserror::Error,
    tracing::debug,
};

/// Error type for settings operations.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Failed to read or write settings file.
    #[error("IO error: {0}")]
    IoError(#[from] StdError),
    /// Failed to serialize or deserialize settings.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] SerdeJsonError),
    /// Invalid settings value.
    #[error("Invalid settings value: {reason}")]
    InvalidValue { reason: String },
}

/// Serializable user settings structure with default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// Directories whose changes are prepared.
    pub watch_directories: Vec<PathBuf>,
    /// Quiet period closing a batch of events, in milliseconds.
    pub debounce_delay_ms: u64,
    /// Whether hidden files and directories produce events.
    pub include_hidden: bool,
    /// Regular expressions matched against paths relative to their watched
    /// directory. Matching entries are ignored.
    pub ignore_patterns: Vec<String>,
    /// How many times a busy file is retried before its checksum fails.
    pub checksum_max_retries: u32,
    /// Delay before the first checksum retry, in milliseconds.
    pub checksum_base_delay_ms: u64,
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            watch_directories: vec![],
            debounce_delay_ms: 500,
            include_hidden: false,
            ignore_patterns: vec![],
            checksum_max_retries: 5,
            checksum_base_delay_ms: 500,
            log_filter: "info".to_string(),
        }
    }
}

impl UserSettings {
    /// Checks that the settings can be used.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidValue` for a zero debounce delay or an
    /// ignore pattern that is not a valid regular expression.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.debounce_delay_ms == 0 {
            return Err(SettingsError::InvalidValue {
                reason: "debounce_delay_ms must be greater than zero".to_string(),
            });
        }

        for pattern in &self.ignore_patterns {
            if let Err(e) = Regex::new(pattern) {
                return Err(SettingsError::InvalidValue {
                    reason: format!("ignore pattern {pattern:?} is invalid: {e}"),
                });
            }
        }

        Ok(())
    }
}

/// Handles loading, saving, and validation of user settings.
#[derive(Debug)]
pub struct SettingsManager {
    /// Thread-safe user settings storage.
    settings: RwLock<UserSettings>,
    /// Path to the configuration file on disk.
    config_path: PathBuf,
}

impl SettingsManager {
    /// Creates a new settings manager with default config path.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `SettingsManager` or a `SettingsError`.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if settings cannot be loaded from disk or are
    /// invalid.
    pub fn new() -> Result<Self, SettingsError> {
        Self::with_config_path(get_config_path())
    }

    /// Creates a new settings manager with a custom config path.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Custom path for the settings file
    ///
    /// # Returns
    ///
    /// A `Result` containing the `SettingsManager` or a `SettingsError`.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if settings cannot be loaded from disk or are
    /// invalid.
    pub fn with_config_path(config_path: PathBuf) -> Result<Self, SettingsError> {
        let settings = if config_path.exists() {
            debug!("Loading settings from existing file: {:?}", config_path);
            let contents = read_to_string(&config_path)?;
            from_str(&contents)?
        } else {
            debug!("No settings file at {:?}, using defaults", config_path);
            UserSettings::default()
        };
        settings.validate()?;

        Ok(SettingsManager {
            settings: RwLock::new(settings),
            config_path,
        })
    }

    /// Gets the current settings.
    ///
    /// # Returns
    ///
    /// A read guard over the current `UserSettings`.
    pub fn get_settings(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.settings.read()
    }

    /// Gets the configuration file path.
    pub fn get_config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Validates new settings, applies them and saves them to disk.
    ///
    /// # Arguments
    ///
    /// * `new_settings` - New settings to apply.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the settings are invalid (nothing is
    /// applied then) or cannot be saved to disk.
    pub fn update_settings(&self, new_settings: UserSettings) -> Result<(), SettingsError> {
        new_settings.validate()?;
        *self.settings.write() = new_settings;
        self.save_settings()
    }

    fn save_settings(&self) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            create_dir_all(parent)?;
        }

        debug!("Saving settings to file: {:?}", self.config_path);
        let contents = to_string_pretty(&*self.settings.read())?;
        write(&self.config_path, contents)?;
        Ok(())
    }
}

/// Path of the settings file under the XDG config directory.
#[must_use]
pub fn get_config_path() -> PathBuf {
    let mut config_dir = get_xdg_config_home();
    config_dir.push("syncprep");
    config_dir.push("settings.json");
    config_dir
}

/// Gets the XDG config home directory following XDG Base Directory specification.
///
/// Uses `XDG_CONFIG_HOME` environment variable if set, otherwise defaults to $HOME/.config
fn get_xdg_config_home() -> PathBuf {
    if let Ok(config_home) = var("XDG_CONFIG_HOME")
        && !config_home.is_empty()
    {
        return PathBuf::from(config_home);
    }

    if let Ok(home) = var("HOME") {
        let mut path = PathBuf::from(home);
        path.push(".config");
        return path;
    }

    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use std::{fs::write, path::PathBuf};

    use {
        serde_json::{from_str, to_string},
        tempfile::TempDir,
    };

    use crate::config::settings::{SettingsError, SettingsManager, UserSettings};

    #[test]
    fn test_user_settings_default() {
        let settings = UserSettings::default();
        assert!(settings.watch_directories.is_empty());
        assert_eq!(settings.debounce_delay_ms, 500);
        assert!(!settings.include_hidden);
        assert_eq!(settings.checksum_max_retries, 5);
        assert_eq!(settings.checksum_base_delay_ms, 500);
        assert_eq!(settings.log_filter, "info");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_user_settings_serialization() {
        let settings = UserSettings {
            watch_directories: vec![PathBuf::from("/sync")],
            debounce_delay_ms: 200,
            include_hidden: true,
            ignore_patterns: vec![r"\.swp$".to_string()],
            checksum_max_retries: 2,
            checksum_base_delay_ms: 100,
            log_filter: "syncprep=debug".to_string(),
        };

        let serialized = to_string(&settings).unwrap();
        let deserialized: UserSettings = from_str(&serialized).unwrap();
        assert_eq!(settings, deserialized);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: UserSettings = from_str(r#"{"include_hidden": true}"#).unwrap();
        assert!(settings.include_hidden);
        assert_eq!(settings.debounce_delay_ms, 500);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let settings = UserSettings {
            debounce_delay_ms: 0,
            ..UserSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue { .. })
        ));

        let settings = UserSettings {
            ignore_patterns: vec!["(unclosed".to_string()],
            ..UserSettings::default()
        };
        let error = settings.validate().unwrap_err();
        assert!(error.to_string().contains("(unclosed"));
    }

    #[test]
    fn test_manager_round_trip_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("settings.json");

        let manager = SettingsManager::with_config_path(path.clone()).unwrap();
        assert_eq!(*manager.get_settings(), UserSettings::default());
        assert!(!path.exists());

        let updated = UserSettings {
            watch_directories: vec![PathBuf::from("/data")],
            ..UserSettings::default()
        };
        manager.update_settings(updated.clone()).unwrap();
        assert!(path.exists());

        let reloaded = SettingsManager::with_config_path(path).unwrap();
        assert_eq!(*reloaded.get_settings(), updated);
    }

    #[test]
    fn test_invalid_update_is_not_applied() {
        let temp_dir = TempDir::new().unwrap();
        let manager =
            SettingsManager::with_config_path(temp_dir.path().join("settings.json")).unwrap();

        let invalid = UserSettings {
            debounce_delay_ms: 0,
            ..UserSettings::default()
        };
        assert!(manager.update_settings(invalid).is_err());
        assert_eq!(manager.get_settings().debounce_delay_ms, 500);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        write(&path, r#"{"ignore_patterns": ["["]}"#).unwrap();

        assert!(matches!(
            SettingsManager::with_config_path(path),
            Err(SettingsError::InvalidValue { .. })
        ));
    }
}
