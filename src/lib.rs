//! termtab - shell sessions as terminal tabs
//!
//! A [`Session`](core::Session) runs a shell in a pseudoterminal and feeds
//! its output into an in-memory terminal buffer. Sessions are created from a
//! partial [`SessionConfig`](core::SessionConfig) that the
//! [`ConfigResolver`](core::ConfigResolver) completes from settings, the
//! environment and the host, and they serialize to a small record the
//! [`Workspace`](workspace::Workspace) persists between runs.
//!
//! - **core**: buffer, PTY, resolver and session lifecycle
//! - **ui**: views, themes, key mapping and the crossterm renderer
//! - **workspace**: the ordered set of open sessions and its saved state
//! - **config**: `~/.termtab/config.toml`
//! - **clipboard**: system and in-memory clipboards
//! - **logging**: file logging via `tracing`

pub mod clipboard;
pub mod config;
pub mod core;
pub mod logging;
pub mod ui;
pub mod workspace;
