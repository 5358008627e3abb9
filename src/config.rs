//! Configuration file handling for m021-capture.
//!
//! Loads configuration from `<config dir>/m021-capture/config.toml` or a custom path.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::camera::{CaptureError, ColorGains, DriverKind, Resolution};

/// Configuration file structure for m021-capture.
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub color: ColorConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CameraConfig {
    #[serde(default)]
    pub device: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// "synthetic" or "camera"
    #[serde(default)]
    pub driver: Option<DriverKind>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: 0,
            width: default_width(),
            height: default_height(),
            driver: None,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ColorConfig {
    #[serde(default = "default_gain")]
    pub blue: f32,
    #[serde(default = "default_gain")]
    pub green: f32,
    #[serde(default = "default_gain")]
    pub red: f32,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            blue: default_gain(),
            green: default_gain(),
            red: default_gain(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    /// Milliseconds between stats lines while capturing (0 disables)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

fn default_width() -> u32 {
    Resolution::M021_800X460.width
}

fn default_height() -> u32 {
    Resolution::M021_800X460.height
}

fn default_gain() -> f32 {
    1.0
}

fn default_interval_ms() -> u64 {
    1000
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the default file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_explicit(path),
            None => {
                let path = default_path();
                if path.exists() {
                    Self::read(&path)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    /// Load from a path the user named; a missing file is an error.
    pub fn load_from_explicit(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::read(path)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn resolution(&self) -> Result<Resolution, ConfigError> {
        Resolution::new(self.camera.width, self.camera.height).map_err(ConfigError::Invalid)
    }

    pub fn gains(&self) -> Result<ColorGains, ConfigError> {
        ColorGains::new(self.color.blue, self.color.green, self.color.red)
            .map_err(ConfigError::Invalid)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file '{}' not found", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(#[source] CaptureError),
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("m021-capture").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/m021-capture/config.toml")
        })
}

/// Contents written by `config init`.
pub const DEFAULT_CONFIG: &str = r#"# m021-capture configuration

[camera]
# Video device index
device = 0
# Sensor mode; must be one the camera supports (1280x720, 800x460, 640x480)
width = 800
height = 460
# Frame source: "synthetic" (test pattern) or "camera" (needs the camera feature)
driver = "synthetic"

[color]
# Per-channel gains applied during each grab (0.0 - 8.0)
blue = 1.0
green = 1.0
red = 1.0

[report]
# Milliseconds between stats lines while capturing (0 disables)
interval_ms = 1000
"#;
