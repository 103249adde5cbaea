//! User interface rendering and input handling.
//!
//! - **view**: `TerminalView`, binding a session's buffer to a visible surface
//! - **theme**: color schemes and the palette handed to buffers
//! - **renderer**: crossterm renderer with a tab bar, and the host surface
//! - **keymapper**: keyboard input to PTY byte sequence mapping

pub mod keymapper;
pub mod renderer;
pub mod theme;
pub mod view;

pub use keymapper::{InputModes, KeyMapper, PrefixAction};
pub use renderer::{Renderer, ScreenSurface, StatusLine, SurfaceHub, TabLabel};
pub use theme::{ColorScheme, SchemeMatcher, ThemeMatcher};
pub use view::{Surface, SurfaceEvent, TerminalView, ViewError};
