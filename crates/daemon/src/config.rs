// User settings: `$XDG_CONFIG_HOME/kzrnote/settings.toml`.
//
// Every field has a default; a missing file means "all defaults".

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::paths::create_private_dir;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub editor: EditorConfig,
    pub preload: PreloadConfig,
    pub search: SearchConfig,
}

impl Settings {
    /// Load from `path`. A missing file yields defaults silently; an
    /// unreadable or unparsable one yields defaults with a warning.
    pub fn load(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(settings) => settings,
            Err(ConfigError::Io(error)) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                Self::default()
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "ignoring settings file");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to `path` (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            create_private_dir(parent)
                .map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// How editors are started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EditorConfig {
    /// Editor binary.
    pub program: String,
    /// Flag selecting the GUI flavour; empty to omit.
    pub gui_flag: String,
    /// Appended to every spawn.
    pub extra_args: Vec<String>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self { program: "vim".into(), gui_flag: "-g".into(), extra_args: Vec::new() }
    }
}

/// Warm editor pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PreloadConfig {
    /// Ready editors kept in reserve (0 disables preloading).
    pub slots: usize,
    /// Delay before a claimed slot is replaced.
    pub replenish_delay_ms: u64,
    /// Interval between readiness checks of a spawning editor.
    pub readiness_poll_ms: u64,
    /// Checks before a spawning editor is given up on.
    pub readiness_attempts: u32,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self { slots: 1, replenish_delay_ms: 1000, readiness_poll_ms: 100, readiness_attempts: 50 }
    }
}

impl PreloadConfig {
    pub fn replenish_delay(&self) -> Duration {
        Duration::from_millis(self.replenish_delay_ms)
    }

    pub fn readiness_poll(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms)
    }
}

/// Full-text search backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    pub program: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { program: "grep".into() }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
