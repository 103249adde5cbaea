//! Persisted workspace state
//!
//! The sessions open at shutdown are stored in `~/.termtab/sessions.toml` and
//! handed back verbatim on the next start:
//!
//! ```toml
//! [[sessions]]
//! environmentExclusionList = ["NODE_ENV"]
//! shellArguments = "--login"
//! shellPath = "/bin/bash"
//! workingDirectory = "/home/user/project"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::config_dir;
use crate::core::session::SerializedState;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse workspace state: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize workspace state: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Every session of a workspace, in tab order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceState {
    #[serde(default)]
    pub sessions: Vec<SerializedState>,
}

/// `~/.termtab/sessions.toml`
pub fn default_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("sessions.toml"))
}

/// Read the state at `path`; a missing file is an empty workspace
pub fn load(path: &Path) -> Result<WorkspaceState, StateError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(WorkspaceState::default()),
        Err(source) => {
            return Err(StateError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let state: WorkspaceState = toml::from_str(&content)?;
    debug!(path = %path.display(), sessions = state.sessions.len(), "loaded workspace state");
    Ok(state)
}

pub fn save(path: &Path, state: &WorkspaceState) -> Result<(), StateError> {
    let content = toml::to_string_pretty(state)?;
    let io_err = |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, content).map_err(io_err)?;
    debug!(path = %path.display(), sessions = state.sessions.len(), "saved workspace state");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkspaceState {
        WorkspaceState {
            sessions: vec![
                SerializedState {
                    environment_exclusion_list: vec!["NODE_ENV".to_string()],
                    shell_arguments: "--login".to_string(),
                    shell_path: "/bin/bash".to_string(),
                    working_directory: "/home/user/project".to_string(),
                },
                SerializedState {
                    environment_exclusion_list: Vec::new(),
                    shell_arguments: String::new(),
                    shell_path: "/bin/sh".to_string(),
                    working_directory: "/tmp".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = load(&dir.path().join("sessions.toml")).unwrap();
        assert!(state.sessions.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("sessions.toml");
        save(&path, &sample()).unwrap();
        assert_eq!(load(&path).unwrap(), sample());
    }

    #[test]
    fn test_reads_documented_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.toml");
        fs::write(
            &path,
            r#"
            [[sessions]]
            environmentExclusionList = ["NODE_ENV"]
            shellArguments = "--login"
            shellPath = "/bin/bash"
            workingDirectory = "/home/user/project"
            "#,
        )
        .unwrap();
        let state = load(&path).unwrap();
        assert_eq!(state.sessions, sample().sessions[..1].to_vec());
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.toml");
        fs::write(&path, "[[sessions]\nshellPath =").unwrap();
        assert!(matches!(load(&path), Err(StateError::Parse(_))));
    }
}
