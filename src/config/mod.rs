//! User settings and their persistence.
//!
//! This module provides settings management with XDG Base Directory
//! compliance.

pub mod settings;

pub use settings::{SettingsError, SettingsManager, UserSettings, get_config_path};
