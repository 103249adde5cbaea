//! Workspace - the host side of terminal tabs.
//!
//! - **manager**: `Workspace`, owning every open session and the commands on them
//! - **state**: the persisted list of sessions restored on the next start

pub mod manager;
pub mod state;

pub use manager::{Command, Workspace};
pub use state::{StateError, WorkspaceState};
