//! Configuration file support for Dockyard.
//!
//! Dockyard reads two configuration file locations:
//! - Global: `~/.dockyard/config.toml` - User-wide defaults
//! - Project: `.dockyard/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config. Files are re-read
//! every time they are loaded; nothing is cached.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Behaviour switches consumed by the build engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    /// Build automatically when a buffer inside a project is saved
    pub build_on_save: bool,

    /// Save modified buffers without asking before building
    pub save_on_build: bool,

    /// A matched error fails the build even if the command exited with 0
    pub matched_error_fails_build: bool,

    /// Jump to the first match when a build fails
    pub scroll_on_error: bool,

    /// Show a notice each time targets are refreshed
    pub notification_on_refresh: bool,

    /// Refresh targets before showing the target selector
    pub refresh_on_show_target_list: bool,

    /// Selecting a target triggers a build
    pub select_triggers: bool,

    /// Keep the output visible after a successful build
    pub keep_visible: bool,

    /// Delay before hiding the output after a successful build
    pub hide_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            build_on_save: false,
            save_on_build: false,
            matched_error_fails_build: true,
            scroll_on_error: false,
            notification_on_refresh: false,
            refresh_on_show_target_list: false,
            select_triggers: true,
            keep_visible: false,
            hide_delay_ms: 1000,
        }
    }
}

/// Partially specified settings, as read from one file.
///
/// Only keys present in the file override the layer below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SettingsFile {
    pub build_on_save: Option<bool>,
    pub save_on_build: Option<bool>,
    pub matched_error_fails_build: Option<bool>,
    pub scroll_on_error: Option<bool>,
    pub notification_on_refresh: Option<bool>,
    pub refresh_on_show_target_list: Option<bool>,
    pub select_triggers: Option<bool>,
    pub keep_visible: Option<bool>,
    pub hide_delay_ms: Option<u64>,
}

impl SettingsFile {
    /// Load a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load a settings file, falling back to an empty layer if it is missing
    /// or broken.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }
}

impl Settings {
    /// Apply a file layer on top of these settings (the layer takes precedence).
    pub fn merge(&mut self, layer: SettingsFile) {
        if let Some(v) = layer.build_on_save {
            self.build_on_save = v;
        }
        if let Some(v) = layer.save_on_build {
            self.save_on_build = v;
        }
        if let Some(v) = layer.matched_error_fails_build {
            self.matched_error_fails_build = v;
        }
        if let Some(v) = layer.scroll_on_error {
            self.scroll_on_error = v;
        }
        if let Some(v) = layer.notification_on_refresh {
            self.notification_on_refresh = v;
        }
        if let Some(v) = layer.refresh_on_show_target_list {
            self.refresh_on_show_target_list = v;
        }
        if let Some(v) = layer.select_triggers {
            self.select_triggers = v;
        }
        if let Some(v) = layer.keep_visible {
            self.keep_visible = v;
        }
        if let Some(v) = layer.hide_delay_ms {
            self.hide_delay_ms = v;
        }
    }

    /// Auto-hide delay as a duration.
    pub fn hide_delay(&self) -> Duration {
        Duration::from_millis(self.hide_delay_ms)
    }
}

/// Get the global dockyard config directory (~/.dockyard).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".dockyard"))
}

/// Get the global config path (~/.dockyard/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.dockyard/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".dockyard").join("config.toml")
}

/// Load merged settings from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.dockyard/config.toml)
/// 2. Global config (~/.dockyard/config.toml)
/// 3. Defaults
pub fn load_settings(global_path: Option<&Path>, project_path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Some(global_path) = global_path {
        settings.merge(SettingsFile::load_or_default(global_path));
    }

    settings.merge(SettingsFile::load_or_default(project_path));

    settings
}
