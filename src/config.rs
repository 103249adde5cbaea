//! Configuration for termtab.
//!
//! Global defaults live in `~/.termtab/config.toml`. Every section is optional
//! and missing keys fall back to their defaults:
//!
//! ```toml
//! [shell]
//! # Default shell (optional; falls back to $SHELL / %COMSPEC%)
//! path = "/bin/zsh"
//! # Default argument string, split on whitespace (optional)
//! args = "--login"
//! # Variables removed from the environment handed to the shell
//! sanitize_environment = ["NODE_ENV"]
//! # Arguments used when no args are configured, the shell is the OS shell
//! # and its file name is one of login_shells
//! login_args = "--login"
//! login_shells = ["bash"]
//! term_name = "xterm-256color"
//!
//! [terminal]
//! match_theme = true
//! # default, solarized-dark, solarized-light, monokai,
//! # nord, dracula, gruvbox-dark, tokyo-night
//! color_scheme = "tokyo-night"
//! font_family = ""
//! font_size = 14.0
//! scrollback = 1000
//! # Keep rendering output of sessions no view is attached to
//! render_detached_output = false
//!
//! [log]
//! level = "info"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::emulator::DEFAULT_SCROLLBACK;

/// Name of the per-user directory holding config, state and log files
const APP_DIR: &str = ".termtab";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config: {0}")]
    Write(#[from] io::Error),
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub shell: ShellSettings,
    pub terminal: TerminalSettings,
    pub log: LogSettings,
}

/// Global shell defaults, the middle layer of configuration resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSettings {
    pub path: Option<String>,
    pub args: Option<String>,
    pub sanitize_environment: Vec<String>,
    /// Login-shell arguments, see [`crate::core::resolver::resolve_shell_arguments`]
    pub login_args: Option<String>,
    /// Shell file names `login_args` applies to
    pub login_shells: Vec<String>,
    pub term_name: String,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            path: None,
            args: None,
            sanitize_environment: vec!["NODE_ENV".to_string()],
            login_args: default_login_args(),
            login_shells: vec!["bash".to_string()],
            term_name: "xterm-256color".to_string(),
        }
    }
}

#[cfg(unix)]
fn default_login_args() -> Option<String> {
    Some("--login".to_string())
}

#[cfg(not(unix))]
fn default_login_args() -> Option<String> {
    None
}

/// Emulator and presentation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    /// Apply the color scheme and font to the emulator
    pub match_theme: bool,
    pub color_scheme: String,
    /// Empty means the host font
    pub font_family: String,
    pub font_size: f32,
    pub scrollback: usize,
    pub render_detached_output: bool,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            match_theme: true,
            color_scheme: "default".to_string(),
            font_family: String::new(),
            font_size: 14.0,
            scrollback: DEFAULT_SCROLLBACK,
            render_detached_output: false,
        }
    }
}

/// Log settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self, ConfigError> {
        match Self::get_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from `path`; a missing file gives defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Get config file path
    pub fn get_config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }
}

/// `~/.termtab`, created on first use
pub fn config_dir() -> Option<PathBuf> {
    let dir = home_dir()?.join(APP_DIR);
    if !dir.exists() {
        let _ = fs::create_dir_all(&dir);
    }
    Some(dir)
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}
