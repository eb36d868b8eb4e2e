//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/markr/config.toml)
//! 3. Environment variables (MARKR_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::BookmarkError;
use crate::grouping::{GroupView, SortOrder};
use crate::models::DEFAULT_COLOR;

/// Environment variable prefix
const ENV_PREFIX: &str = "MARKR";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for per-workspace bookmark documents
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log file (stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Palette: color key -> color value
    #[serde(default = "default_colors")]
    pub colors: BTreeMap<String, String>,

    /// Decoration style options
    #[serde(default)]
    pub decoration: DecorationConfig,

    /// Default grouping and sorting of views
    #[serde(default)]
    pub view: ViewConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_file: None,
            colors: default_colors(),
            decoration: DecorationConfig::default(),
            view: ViewConfig::default(),
        }
    }
}

/// Style options applied when building decoration styles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecorationConfig {
    pub show_gutter_icon: bool,
    pub show_gutter_in_overview_ruler: bool,
    pub show_text_decoration: bool,
    /// Ignore the bookmark color and always paint with `default`
    pub always_use_default_color: bool,
    pub whole_line: bool,
    pub font_weight: String,
    pub text_decoration_line: String,
    pub text_decoration_style: String,
    pub text_decoration_thickness: String,
    pub highlight_background: bool,
    pub show_border: bool,
    pub border: String,
    pub show_outline: bool,
    pub outline: String,
}

impl Default for DecorationConfig {
    fn default() -> Self {
        Self {
            show_gutter_icon: true,
            show_gutter_in_overview_ruler: true,
            show_text_decoration: true,
            always_use_default_color: false,
            whole_line: true,
            font_weight: "bold".to_string(),
            text_decoration_line: "underline".to_string(),
            text_decoration_style: "wavy".to_string(),
            text_decoration_thickness: "1px".to_string(),
            highlight_background: false,
            show_border: false,
            border: "1px solid".to_string(),
            show_outline: false,
            outline: "1px solid".to_string(),
        }
    }
}

impl DecorationConfig {
    /// Degrade an invisible configuration to a visible one
    ///
    /// When gutter icon, overview ruler and text decoration are all off,
    /// nothing would ever be drawn. Gutter icons are forced back on and the
    /// returned error carries the notice to show the user.
    pub fn validated(mut self) -> (Self, Option<BookmarkError>) {
        if self.show_gutter_icon || self.show_gutter_in_overview_ruler || self.show_text_decoration
        {
            return (self, None);
        }

        warn!("All decoration outputs disabled; forcing gutter icons on");
        self.show_gutter_icon = true;
        let notice = BookmarkError::ConfigurationInvalid(
            "'show_gutter_icon', 'show_gutter_in_overview_ruler' and 'show_text_decoration' \
             cannot all be false; gutter icons have been turned back on."
                .to_string(),
        );
        (self, Some(notice))
    }
}

/// Default presentation of grouped views
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub group_view: GroupView,
    pub sort: SortOrder,
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (MARKR_DATA_DIR, MARKR_LOG_FILE)
    /// 2. Config file (~/.config/markr/config.toml or MARKR_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring an explicit path over the default location
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_default_color();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        config.ensure_default_color();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // MARKR_DATA_DIR
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // MARKR_LOG_FILE
        if let Ok(val) = std::env::var(format!("{}_LOG_FILE", ENV_PREFIX)) {
            self.log_file = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }
    }

    /// The palette must always resolve `default`
    fn ensure_default_color(&mut self) {
        if !self.colors.contains_key(DEFAULT_COLOR) {
            let fallback = default_colors()
                .remove(DEFAULT_COLOR)
                .unwrap_or_else(|| "#0062ff".to_string());
            self.colors.insert(DEFAULT_COLOR.to_string(), fallback);
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with MARKR_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("markr")
            .join("config.toml")
    }

    /// Directory holding the bookmark document of one workspace
    pub fn workspace_dir(&self, workspace_hash: &str) -> PathBuf {
        self.data_dir.join("workspaces").join(workspace_hash)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("markr")
}

fn default_colors() -> BTreeMap<String, String> {
    [
        (DEFAULT_COLOR, "#0062ff"),
        ("red", "#ff2d55"),
        ("green", "#34c759"),
        ("blue", "#0a84ff"),
        ("yellow", "#ffcc00"),
        ("purple", "#af52de"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
