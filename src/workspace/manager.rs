//! Workspace - the set of open terminal sessions, in tab order

use std::collections::HashMap;

use tracing::{error, info, warn};

use super::state::WorkspaceState;
use crate::clipboard::Clipboard;
use crate::config::{Config, ShellSettings};
use crate::core::emulator::GridSize;
use crate::core::pty::PtyFacility;
use crate::core::resolver::{ConfigResolver, EnvMap, HostContext, SessionConfig};
use crate::core::session::{LaunchOptions, Session, SessionError, SessionId};

/// Commands a host binds to keys or menus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Open,
    Copy,
    Paste,
    Clear,
    Close,
    Next,
    Previous,
}

/// Owns every open session
pub struct Workspace {
    sessions: HashMap<SessionId, Session>,
    /// Tab order
    order: Vec<SessionId>,
    active: Option<SessionId>,
    next_id: u64,
    settings: ShellSettings,
    environment: EnvMap,
    host: Box<dyn HostContext>,
    options: LaunchOptions,
    pty: Box<dyn PtyFacility>,
    /// Overrides used by [`Command::Open`]
    defaults: SessionConfig,
}

impl Workspace {
    /// `environment` is the snapshot every session's environment derives from
    pub fn new(
        config: &Config,
        environment: EnvMap,
        host: Box<dyn HostContext>,
        pty: Box<dyn PtyFacility>,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            order: Vec::new(),
            active: None,
            next_id: 1,
            settings: config.shell.clone(),
            environment,
            host,
            options: LaunchOptions::from_config(config),
            pty,
            defaults: SessionConfig::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: SessionConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Size given to sessions spawned from now on
    pub fn set_initial_size(&mut self, cols: u16, rows: u16) {
        self.options.initial_size = GridSize::new(cols, rows);
    }

    /// Open a session and make it active
    pub fn open(&mut self, overrides: &SessionConfig) -> Result<SessionId, SessionError> {
        let id = self.allocate_id();
        let resolver = ConfigResolver::new(&self.settings, &self.environment, self.host.as_ref());
        let session = Session::create(id, overrides, &resolver, &self.options, self.pty.as_ref())
            .map_err(|e| {
                error!(session = %id, error = %e, "failed to open session");
                e
            })?;
        Ok(self.insert(session))
    }

    /// Open a session with the workspace defaults
    pub fn open_default(&mut self) -> Result<SessionId, SessionError> {
        let defaults = self.defaults.clone();
        self.open(&defaults)
    }

    /// Recreate persisted sessions. Ones that fail to launch are skipped.
    pub fn restore(&mut self, state: WorkspaceState) -> Vec<SessionId> {
        let mut restored = Vec::new();
        for serialized in state.sessions {
            let id = self.allocate_id();
            let resolver = ConfigResolver::new(&self.settings, &self.environment, self.host.as_ref());
            let shell = serialized.shell_path.clone();
            match Session::restore(id, serialized, &resolver, &self.options, self.pty.as_ref()) {
                Ok(session) => restored.push(self.insert(session)),
                Err(e) => warn!(shell = %shell, error = %e, "skipping session that failed to restore"),
            }
        }
        info!(count = restored.len(), "restored sessions");
        restored
    }

    fn allocate_id(&mut self) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert(&mut self, session: Session) -> SessionId {
        let id = session.id();
        self.sessions.insert(id, session);
        self.order.push(id);
        self.active = Some(id);
        id
    }

    /// Drive every session and drop the ones that ended.
    ///
    /// Returns whether anything changed.
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        for session in self.sessions.values_mut() {
            changed |= session.pump();
        }
        let ended: Vec<SessionId> = self
            .order
            .iter()
            .copied()
            .filter(|id| self.sessions.get(id).map_or(true, |s| !s.is_running()))
            .collect();
        for id in ended {
            self.remove(id);
            changed = true;
        }
        changed
    }

    /// Destroy a session and remove it
    pub fn close(&mut self, id: SessionId) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                session.destroy();
                self.remove(id);
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, id: SessionId) {
        let Some(pos) = self.order.iter().position(|&s| s == id) else {
            return;
        };
        self.order.remove(pos);
        self.sessions.remove(&id);

        if self.active == Some(id) {
            // The tab that slid into its place, else the new last one
            self.active = self
                .order
                .get(pos)
                .or_else(|| self.order.last())
                .copied();
        }
    }

    /// Switch to next tab
    pub fn next(&mut self) {
        if let Some(pos) = self.active_position() {
            let next_pos = (pos + 1) % self.order.len();
            self.active = Some(self.order[next_pos]);
        }
    }

    /// Switch to previous tab
    pub fn previous(&mut self) {
        if let Some(pos) = self.active_position() {
            let prev_pos = if pos == 0 { self.order.len() - 1 } else { pos - 1 };
            self.active = Some(self.order[prev_pos]);
        }
    }

    fn active_position(&self) -> Option<usize> {
        self.active
            .and_then(|active| self.order.iter().position(|&id| id == active))
    }

    pub fn set_active(&mut self, id: SessionId) -> bool {
        if self.sessions.contains_key(&id) {
            self.active = Some(id);
            true
        } else {
            false
        }
    }

    /// Run `command` against the active session.
    ///
    /// Returns the session opened by [`Command::Open`].
    pub fn dispatch(
        &mut self,
        command: Command,
        clipboard: &mut dyn Clipboard,
    ) -> Result<Option<SessionId>, SessionError> {
        match command {
            Command::Open => return self.open_default().map(Some),
            Command::Next => self.next(),
            Command::Previous => self.previous(),
            Command::Close => {
                if let Some(id) = self.active {
                    self.close(id);
                }
            }
            Command::Clear => {
                if let Some(session) = self.active_mut() {
                    session.clear();
                }
            }
            Command::Copy => {
                if let Some(session) = self.active() {
                    session.copy_selection(clipboard)?;
                }
            }
            Command::Paste => {
                if let Some(session) = self.active_mut() {
                    session.paste_from_clipboard(clipboard)?;
                }
            }
        }
        Ok(None)
    }

    /// Persistable state of every running session, in tab order
    pub fn serialize(&self) -> WorkspaceState {
        WorkspaceState {
            sessions: self
                .iter()
                .filter(|s| s.is_running())
                .map(Session::serialize)
                .collect(),
        }
    }

    /// Destroy every session. Returns how many were torn down.
    pub fn shutdown(&mut self) -> usize {
        let count = self.order.len();
        for id in std::mem::take(&mut self.order) {
            if let Some(mut session) = self.sessions.remove(&id) {
                session.destroy();
            }
        }
        self.sessions.clear();
        self.active = None;
        if count > 0 {
            info!(count, "workspace shut down");
        }
        count
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active
    }

    pub fn active(&self) -> Option<&Session> {
        self.active.and_then(|id| self.sessions.get(&id))
    }

    pub fn active_mut(&mut self) -> Option<&mut Session> {
        self.active.and_then(|id| self.sessions.get_mut(&id))
    }

    /// Session ids in tab order
    pub fn ids(&self) -> &[SessionId] {
        &self.order
    }

    /// Sessions in tab order
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.order.iter().filter_map(|id| self.sessions.get(id))
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.shutdown();
    }
}
