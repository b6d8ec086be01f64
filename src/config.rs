//! Configuration system
//!
//! TOML configuration for the surface, the stack layout and the global
//! shortcuts. Storage is immutable after load; anything that needs a
//! massaged value (like the normalized geometry string) derives it as a
//! copy.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Surface placement and appearance
    pub window: WindowConfig,

    /// Stack spacing used by hit-testing and sizing
    pub stack: StackConfig,

    /// Global keyboard shortcuts
    pub shortcuts: ShortcutConfig,

    /// General daemon behavior
    pub general: GeneralConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(Self::find_config_file);

        match config_path {
            Some(path) if path.exists() => {
                info!("Loading configuration from {:?}", path);
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file: {path:?}"))?;

                let config: Self = toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {path:?}"))?;

                Ok(config)
            }
            Some(path) => {
                warn!("Config file not found at {:?}, using defaults", path);
                Ok(Self::default())
            }
            None => {
                info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Find the configuration file
    fn find_config_file() -> Option<PathBuf> {
        // Check in order of preference
        let candidates = [
            dirs::config_dir().map(|p| p.join("toastd/toastd.toml")),
            dirs::home_dir().map(|p| p.join(".config/toastd/toastd.toml")),
            dirs::home_dir().map(|p| p.join(".toastd.toml")),
            Some(PathBuf::from("/etc/toastd/toastd.toml")),
        ];

        candidates.into_iter().flatten().find(|p| p.exists())
    }

    /// Generate default configuration as a string
    pub fn default_config_string() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}

/// Surface placement and appearance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Geometry specification, `[=][width][xheight][{+-}x{+-}y]` with a
    /// leading `-` anchoring the width to the right screen edge
    pub geometry: String,
    /// Window title
    pub title: String,
    /// Window class (WM_CLASS instance)
    pub class: String,
    /// Transparency in percent, 0 (opaque) to 100
    pub transparency: u8,
    /// Which output the surface follows
    pub follow: Follow,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            geometry: "0x0".to_string(),
            title: "toastd".to_string(),
            class: "toastd".to_string(),
            transparency: 0,
            follow: Follow::None,
        }
    }
}

/// Which output the surface follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Follow {
    #[default]
    None,
    Mouse,
    Keyboard,
}

/// Stack spacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Vertical gap between notifications
    pub separator_height: i32,
    /// Frame drawn around the whole stack
    pub frame_width: i32,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            separator_height: 2,
            frame_width: 0,
        }
    }
}

/// Global keyboard shortcuts; `"none"` or the empty string disables one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortcutConfig {
    /// Dismiss the top notification
    pub close: String,
    /// Dismiss the whole stack
    pub close_all: String,
    /// Bring back the most recently dismissed notification
    pub history: String,
    /// Open the context menu
    pub context: String,
}

impl Default for ShortcutConfig {
    fn default() -> Self {
        Self {
            close: "ctrl+space".to_string(),
            close_all: "ctrl+shift+space".to_string(),
            history: "ctrl+grave".to_string(),
            context: "ctrl+shift+period".to_string(),
        }
    }
}

/// General daemon behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Seconds of inactivity after which the user counts as away;
    /// 0 disables idle detection
    pub idle_threshold: u64,
    /// Command spawned for the context menu
    pub context_command: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            idle_threshold: 0,
            context_command: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.window.geometry, "0x0");
        assert_eq!(config.stack.separator_height, 2);
        assert_eq!(config.shortcuts.close, "ctrl+space");
        assert_eq!(config.general.idle_threshold, 0);
        assert_eq!(config.window.follow, Follow::None);
    }

    #[test]
    fn default_config_round_trips() {
        let rendered = Config::default_config_string();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.window.geometry, Config::default().window.geometry);
        assert_eq!(parsed.shortcuts.history, Config::default().shortcuts.history);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [window]
            geometry = "-300x20-30+20"
            transparency = 30

            [general]
            idle_threshold = 120
            "#,
        )
        .unwrap();
        assert_eq!(parsed.window.geometry, "-300x20-30+20");
        assert_eq!(parsed.window.transparency, 30);
        assert_eq!(parsed.general.idle_threshold, 120);
        // Untouched sections keep their defaults.
        assert_eq!(parsed.shortcuts.close_all, "ctrl+shift+space");
        assert_eq!(parsed.stack.separator_height, 2);
    }

    #[test]
    fn load_reads_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[window]\ntitle = \"popups\"").unwrap();

        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(config.window.title, "popups");
    }

    #[test]
    fn load_rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "window = 3").unwrap();

        assert!(Config::load(file.path().to_str()).is_err());
    }

    #[test]
    fn follow_modes_parse() {
        let parsed: Config = toml::from_str("[window]\nfollow = \"mouse\"").unwrap();
        assert_eq!(parsed.window.follow, Follow::Mouse);
    }
}
