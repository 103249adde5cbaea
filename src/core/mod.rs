//! Core session components.
//!
//! This module contains everything a terminal tab needs below the view layer:
//!
//! - **resolver**: per-session configuration resolution (shell, args, env, cwd)
//! - **pty**: pseudoterminal facility trait and its `portable-pty` implementation
//! - **emulator**: `vt100`-backed terminal buffer and grid geometry
//! - **session**: the session lifecycle tying a process to its buffer
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── ResolvedConfig (shell, args, sanitized env, cwd)
//! ├── PtyProcess (output/exit events, input, resize, kill)
//! └── TerminalBuffer
//!     ├── vt100::Parser (screen + scrollback)
//!     └── input queue, selection, attached view
//! ```

pub mod emulator;
pub mod pty;
pub mod resolver;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use emulator::{GridSize, TerminalBuffer};
pub use pty::{NativePty, PtyError, PtyFacility};
pub use resolver::{ConfigResolver, HostContext, ResolvedConfig, SessionConfig, StaticHost};
pub use session::{LaunchOptions, OutputPolicy, SerializedState, Session, SessionError, SessionId};
