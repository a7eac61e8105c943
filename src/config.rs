use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Folder holding everything this app persists for the user
pub const APP_DIR_NAME: &str = "CustomRPC";
const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

/// The last-saved presence configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub application_id: String,
    pub details: String,
    pub state: String,
    pub large_image_key: String,
    pub large_image_text: String,
    pub small_image_key: String,
    pub small_image_text: String,
    pub minimize_to_tray: bool,
    pub start_minimized: bool,
    pub button1: LinkButton,
    pub button2: LinkButton,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            application_id: String::new(),
            details: String::new(),
            state: String::new(),
            large_image_key: String::new(),
            large_image_text: String::new(),
            small_image_key: String::new(),
            small_image_text: String::new(),
            minimize_to_tray: true,
            start_minimized: false,
            button1: LinkButton::default(),
            button2: LinkButton::default(),
        }
    }
}

/// Field names accepted by `Settings::set_field`
pub const SETTING_FIELDS: &[&str] = &[
    "application_id",
    "details",
    "state",
    "large_image_key",
    "large_image_text",
    "small_image_key",
    "small_image_text",
    "button1_label",
    "button1_url",
    "button2_label",
    "button2_url",
    "minimize_to_tray",
    "start_minimized",
];

impl Settings {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Set one field by name, as typed at the console
    pub fn set_field(&mut self, field: &str, value: &str) -> anyhow::Result<()> {
        match field {
            "application_id" => self.application_id = value.trim().to_string(),
            "details" => self.details = value.to_string(),
            "state" => self.state = value.to_string(),
            "large_image_key" => self.large_image_key = value.to_string(),
            "large_image_text" => self.large_image_text = value.to_string(),
            "small_image_key" => self.small_image_key = value.to_string(),
            "small_image_text" => self.small_image_text = value.to_string(),
            "button1_label" => self.button1.label = value.to_string(),
            "button1_url" => self.button1.url = value.to_string(),
            "button2_label" => self.button2.label = value.to_string(),
            "button2_url" => self.button2.url = value.to_string(),
            "minimize_to_tray" => self.minimize_to_tray = parse_flag(value)?,
            "start_minimized" => self.start_minimized = parse_flag(value)?,
            other => bail!(
                "Unknown setting '{}'. Known settings: {}",
                other,
                SETTING_FIELDS.join(", ")
            ),
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        other => bail!("Expected on/off, got '{}'", other),
    }
}

/// Blocking load/save of the settings record at a fixed per-user path
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<config dir>/CustomRPC/settings.toml`
    pub fn user_default() -> Self {
        Self::new(default_settings_dir().join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to defaults on any error
    pub fn load(&self) -> Settings {
        if !self.path.exists() {
            tracing::debug!("No settings at {}, using defaults", self.path.display());
            return Settings::default();
        }
        match Settings::from_file(&self.path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to load settings from {}: {:#}", self.path.display(), e);
                Settings::default()
            }
        }
    }

    /// Save settings. Failures are logged and reported as `false`.
    pub fn save(&self, settings: &Settings) -> bool {
        match settings.save_to_file(&self.path) {
            Ok(()) => {
                tracing::debug!("Saved settings to {}", self.path.display());
                true
            }
            Err(e) => {
                tracing::warn!("Failed to save settings to {}: {:#}", self.path.display(), e);
                false
            }
        }
    }
}

/// `<config dir>/CustomRPC`, or `./CustomRPC` when the platform has none
pub fn default_settings_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Delete every persisted setting. Missing directories are not an error.
pub fn delete_settings_dir(dir: &Path) -> anyhow::Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }
    std::fs::remove_dir_all(dir)
        .with_context(|| format!("Failed to delete settings at '{}'", dir.display()))?;
    Ok(true)
}

/// Presence fields shared between users as a JSON file.
/// Absent fields leave the current setting alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preset {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_image_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_image_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_image_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_image_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button1: Option<LinkButton>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button2: Option<LinkButton>,
}

impl Preset {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read '{}'", path.display()))?;
        let preset: Preset = serde_json::from_str(&content)
            .with_context(|| format!("'{}' is not valid preset JSON", path.display()))?;
        Ok(preset)
    }

    pub fn apply_to(&self, settings: &mut Settings) {
        fn merge<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        merge(&mut settings.application_id, &self.application_id);
        merge(&mut settings.details, &self.details);
        merge(&mut settings.state, &self.state);
        merge(&mut settings.large_image_key, &self.large_image_key);
        merge(&mut settings.large_image_text, &self.large_image_text);
        merge(&mut settings.small_image_key, &self.small_image_key);
        merge(&mut settings.small_image_text, &self.small_image_text);
        merge(&mut settings.button1, &self.button1);
        merge(&mut settings.button2, &self.button2);
    }
}
