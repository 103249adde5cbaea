//! File logging
//!
//! The host owns the terminal, so log lines go to `~/.termtab/termtab.log`
//! instead of stderr. `RUST_LOG` overrides the configured level.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{config_dir, LogSettings};

/// Filter from `RUST_LOG`, else `level`, else `info`
pub fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Returns the log file, if one could be opened.
pub fn init(settings: &LogSettings) -> Option<PathBuf> {
    let path = config_dir()
        .map(|dir| dir.join("termtab.log"))
        .unwrap_or_else(|| PathBuf::from("termtab.log"));

    // Open log file (append mode)
    let file = OpenOptions::new().create(true).append(true).open(&path).ok()?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter(&settings.level))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok()?;
    Some(path)
}
