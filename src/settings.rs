//! Script settings
//!
//! Named settings readable and writable through the `SETTING` command,
//! persisted as YAML (`script-config.yml`).

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default settings file name, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "script-config.yml";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("`{0}` is not a valid setting.")]
    Unknown(String),

    #[error("You must specify a value for the `{0}` setting.")]
    MissingValue(String),

    #[error("`{value}` is not a valid value for `{setting}` (expected {expected}).")]
    InvalidValue {
        setting: String,
        value: String,
        expected: &'static str,
    },

    #[error("Failed to access settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Current value of one setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Bool(bool),
    Text(String),
    Number(u64),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(b) => write!(f, "{}", b),
            SettingValue::Text(s) => write!(f, "{}", s),
            SettingValue::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Result of a successful `Settings::set`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingChange {
    pub name: String,
    pub old: SettingValue,
    pub new: SettingValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Show full diagnostics instead of short error messages
    pub debug: bool,
    /// Warn when a newer release is available
    pub outdated_warnings: bool,
    /// Release branch or tag the installation tracks
    pub reference: String,
    /// Directory uploaded attachments are saved into
    pub media_path: String,
    /// Directory holding saved eval presets
    pub presets_dir: String,
    /// How long interactive prompts wait for an answer
    pub prompt_timeout_secs: u64,
    /// Maximum characters per page for long listings
    pub page_size: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            outdated_warnings: true,
            reference: "main".to_string(),
            media_path: "./static/uploads".to_string(),
            presets_dir: "eval_presets".to_string(),
            prompt_timeout_secs: 15,
            page_size: 750,
        }
    }
}

impl Settings {
    /// All setting names, in display order
    pub const NAMES: &'static [&'static str] = &[
        "debug",
        "outdated_warnings",
        "reference",
        "media_path",
        "presets_dir",
        "prompt_timeout_secs",
        "page_size",
    ];

    /// Load settings from a YAML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        tracing::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Write settings to a YAML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        tracing::debug!("Saved settings to {}", path.display());
        Ok(())
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }

    /// Read a setting by (case-insensitive) name
    pub fn get(&self, name: &str) -> Result<SettingValue, SettingsError> {
        let value = match name.to_lowercase().as_str() {
            "debug" => SettingValue::Bool(self.debug),
            "outdated_warnings" => SettingValue::Bool(self.outdated_warnings),
            "reference" => SettingValue::Text(self.reference.clone()),
            "media_path" => SettingValue::Text(self.media_path.clone()),
            "presets_dir" => SettingValue::Text(self.presets_dir.clone()),
            "prompt_timeout_secs" => SettingValue::Number(self.prompt_timeout_secs),
            "page_size" => SettingValue::Number(self.page_size),
            _ => return Err(SettingsError::Unknown(name.to_string())),
        };
        Ok(value)
    }

    /// All settings with their current values
    pub fn values(&self) -> Vec<(&'static str, SettingValue)> {
        Self::NAMES
            .iter()
            .filter_map(|name| self.get(name).ok().map(|value| (*name, value)))
            .collect()
    }

    /// Change a setting.
    ///
    /// Boolean settings toggle when no value is given. Every other setting
    /// requires a value.
    pub fn set(&mut self, name: &str, value: Option<&str>) -> Result<SettingChange, SettingsError> {
        let key = name.to_lowercase();
        let old = self.get(&key)?;

        let new = match (&old, value) {
            (SettingValue::Bool(current), None) => SettingValue::Bool(!current),
            (SettingValue::Bool(_), Some(raw)) => SettingValue::Bool(parse_bool(&key, raw)?),
            (SettingValue::Text(_), Some(raw)) => SettingValue::Text(raw.to_string()),
            (SettingValue::Number(_), Some(raw)) => {
                let number = raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| SettingsError::InvalidValue {
                        setting: key.clone(),
                        value: raw.to_string(),
                        expected: "a whole number",
                    })?;
                SettingValue::Number(number)
            }
            (_, None) => return Err(SettingsError::MissingValue(key)),
        };

        match (key.as_str(), &new) {
            ("debug", SettingValue::Bool(b)) => self.debug = *b,
            ("outdated_warnings", SettingValue::Bool(b)) => self.outdated_warnings = *b,
            ("reference", SettingValue::Text(s)) => self.reference = s.clone(),
            ("media_path", SettingValue::Text(s)) => self.media_path = s.clone(),
            ("presets_dir", SettingValue::Text(s)) => self.presets_dir = s.clone(),
            ("prompt_timeout_secs", SettingValue::Number(n)) => self.prompt_timeout_secs = *n,
            ("page_size", SettingValue::Number(n)) => self.page_size = *n,
            _ => return Err(SettingsError::Unknown(key)),
        }

        tracing::debug!("Setting `{}` changed from `{}` to `{}`", key, old, new);

        Ok(SettingChange {
            name: key,
            old,
            new,
        })
    }
}

fn parse_bool(setting: &str, raw: &str) -> Result<bool, SettingsError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(SettingsError::InvalidValue {
            setting: setting.to_string(),
            value: raw.to_string(),
            expected: "true or false",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_bool_without_value() {
        let mut settings = Settings::default();
        let change = settings.set("debug", None).unwrap();
        assert_eq!(change.old, SettingValue::Bool(false));
        assert_eq!(change.new, SettingValue::Bool(true));
        assert!(settings.debug);
    }

    #[test]
    fn test_set_bool_with_value() {
        let mut settings = Settings::default();
        settings.set("OUTDATED_WARNINGS", Some("false")).unwrap();
        assert!(!settings.outdated_warnings);

        let err = settings.set("debug", Some("maybe")).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { .. }));
    }

    #[test]
    fn test_text_setting_requires_value() {
        let mut settings = Settings::default();
        let err = settings.set("reference", None).unwrap_err();
        assert!(matches!(err, SettingsError::MissingValue(_)));

        settings.set("reference", Some("dev")).unwrap();
        assert_eq!(settings.reference, "dev");
    }

    #[test]
    fn test_unknown_setting() {
        let mut settings = Settings::default();
        let err = settings.set("colour", Some("red")).unwrap_err();
        assert_eq!(err.to_string(), "`colour` is not a valid setting.");
    }

    #[test]
    fn test_number_setting() {
        let mut settings = Settings::default();
        settings.set("prompt_timeout_secs", Some("30")).unwrap();
        assert_eq!(settings.prompt_timeout(), Duration::from_secs(30));
        assert!(settings.set("page_size", Some("lots")).is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path().join("absent.yml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        let mut settings = Settings::default();
        settings.set("debug", Some("true")).unwrap();
        settings.set("reference", Some("dev")).unwrap();
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "debug: true\n").unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert!(loaded.debug);
        assert_eq!(loaded.reference, "main");
    }
}
