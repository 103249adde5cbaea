//! Session management
//!
//! A [`Session`] owns one shell process on a pseudoterminal and the emulator
//! buffer that displays it. [`Session::pump`] moves bytes between the two and
//! is driven from the host event loop, so all session state is touched from a
//! single thread.
//!
//! ```text
//! Created ──create()──▶ Running ──destroy() / process exit──▶ Destroying ──▶ Destroyed
//! ```

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::emulator::{GridSize, TerminalBuffer};
use super::pty::{PtyError, PtyEvent, PtyFacility, PtyProcess, SpawnRequest};
use super::resolver::{ConfigResolutionError, ConfigResolver, ResolvedConfig, SessionConfig};
use crate::clipboard::{Clipboard, ClipboardError};
use crate::config::Config;

/// Upper bound on PTY events handled by one call to [`Session::pump`]
const MAX_EVENTS_PER_PUMP: usize = 1024;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigResolutionError),

    #[error("Failed to launch shell: {0}")]
    Launch(#[source] PtyError),

    #[error("Terminal I/O failed: {0}")]
    Io(#[source] PtyError),

    #[error(transparent)]
    Clipboard(#[from] ClipboardError),
}

/// A failure while tearing a session down. Logged, never retried.
#[derive(Error, Debug)]
#[error("Failed to release {resource}: {source}")]
pub struct ResourceCleanupError {
    pub resource: &'static str,
    #[source]
    pub source: PtyError,
}

/// Session identifier, unique within a workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Running,
    Destroying,
    Destroyed,
}

/// What to do with output while no view is attached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputPolicy {
    /// Drain and discard it
    #[default]
    RenderWhenAttached,
    /// Write it into the buffer anyway
    AlwaysRender,
}

/// Process-independent launch options shared by every session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub initial_size: GridSize,
    pub scrollback: usize,
    pub term_name: String,
    pub output_policy: OutputPolicy,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            initial_size: GridSize::default(),
            scrollback: super::emulator::DEFAULT_SCROLLBACK,
            term_name: "xterm-256color".to_string(),
            output_policy: OutputPolicy::default(),
        }
    }
}

impl LaunchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            initial_size: GridSize::default(),
            scrollback: config.terminal.scrollback,
            term_name: config.shell.term_name.clone(),
            output_policy: if config.terminal.render_detached_output {
                OutputPolicy::AlwaysRender
            } else {
                OutputPolicy::RenderWhenAttached
            },
        }
    }
}

/// The persisted form of a session: its resolved configuration and nothing else
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedState {
    pub environment_exclusion_list: Vec<String>,
    pub shell_arguments: String,
    pub shell_path: String,
    pub working_directory: String,
}

/// Restoring pins every field, so nothing is derived again
impl From<SerializedState> for SessionConfig {
    fn from(state: SerializedState) -> Self {
        Self {
            shell_path: Some(state.shell_path),
            shell_args: Some(state.shell_arguments),
            sanitize_environment: Some(state.environment_exclusion_list),
            working_directory: Some(PathBuf::from(state.working_directory)),
        }
    }
}

/// Handle returned by [`Session::on_did_destroy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

type DestroyObserver = Box<dyn FnOnce(&Session)>;

/// A shell session
pub struct Session {
    id: SessionId,
    config: ResolvedConfig,
    state: LifecycleState,
    policy: OutputPolicy,
    pty: Option<Box<dyn PtyProcess>>,
    buffer: Option<TerminalBuffer>,
    /// Size last sent to the process
    pty_size: GridSize,
    observers: Vec<(Subscription, DestroyObserver)>,
    next_subscription: u64,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("shell_path", &self.config.shell_path)
            .field("pty_size", &self.pty_size)
            .finish()
    }
}

impl Session {
    /// Resolve configuration, spawn the shell and construct its buffer.
    ///
    /// On failure nothing is left running and no buffer exists.
    pub fn create(
        id: SessionId,
        overrides: &SessionConfig,
        resolver: &ConfigResolver<'_>,
        options: &LaunchOptions,
        pty: &dyn PtyFacility,
    ) -> Result<Self, SessionError> {
        let config = resolver.resolve(overrides);
        config.validate()?;

        let mut session = Self {
            id,
            config,
            state: LifecycleState::Created,
            policy: options.output_policy,
            pty: None,
            buffer: None,
            pty_size: options.initial_size,
            observers: Vec::new(),
            next_subscription: 0,
        };

        let request = SpawnRequest {
            program: &session.config.shell_path,
            args: &session.config.args,
            env: &session.config.environment,
            cwd: &session.config.working_directory,
            size: options.initial_size,
            term_name: &options.term_name,
        };
        let process = pty.spawn(&request).map_err(SessionError::Launch)?;

        info!(
            session = %id,
            shell = %session.config.shell_path,
            args = ?session.config.args,
            cwd = %session.config.working_directory.display(),
            pid = ?process.process_id(),
            "session started"
        );
        session.pty = Some(process);
        session.buffer = Some(TerminalBuffer::new(options.initial_size, options.scrollback));
        session.state = LifecycleState::Running;
        Ok(session)
    }

    /// Create a session from persisted state, reproducing its configuration
    pub fn restore(
        id: SessionId,
        state: SerializedState,
        resolver: &ConfigResolver<'_>,
        options: &LaunchOptions,
        pty: &dyn PtyFacility,
    ) -> Result<Self, SessionError> {
        Self::create(id, &SessionConfig::from(state), resolver, options, pty)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Running
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn process_id(&self) -> Option<u32> {
        self.pty.as_ref().and_then(|pty| pty.process_id())
    }

    /// Window title set by the program, else the shell's file name
    pub fn title(&self) -> String {
        if let Some(title) = self
            .buffer
            .as_ref()
            .map(|b| b.screen().title())
            .filter(|t| !t.is_empty())
        {
            return title.to_string();
        }
        std::path::Path::new(&self.config.shell_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.config.shell_path.clone())
    }

    pub fn buffer(&self) -> Option<&TerminalBuffer> {
        self.buffer.as_ref()
    }

    pub fn buffer_mut(&mut self) -> Option<&mut TerminalBuffer> {
        self.buffer.as_mut()
    }

    /// Move typed input to the process and process output to the buffer.
    ///
    /// Returns whether anything happened. Destroys the session when the
    /// process has exited.
    pub fn pump(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        let mut activity = self.flush_input();

        for _ in 0..MAX_EVENTS_PER_PUMP {
            let Some(event) = self.pty.as_mut().and_then(|pty| pty.try_event()) else {
                break;
            };
            activity = true;
            match event {
                PtyEvent::Output(bytes) => self.deliver_output(&bytes),
                PtyEvent::Exited(code) => {
                    info!(session = %self.id, ?code, "shell exited");
                    self.destroy();
                    break;
                }
            }
        }
        activity
    }

    fn flush_input(&mut self) -> bool {
        let Some(buffer) = self.buffer.as_mut() else {
            return false;
        };
        let chunks = buffer.take_input();
        if chunks.is_empty() {
            return false;
        }
        for chunk in chunks {
            trace!(session = %self.id, len = chunk.len(), "input");
            if let Err(e) = self.write_to_process(&chunk) {
                warn!(session = %self.id, error = %e, "dropping input");
            }
        }
        true
    }

    fn deliver_output(&mut self, bytes: &[u8]) {
        let Some(buffer) = self.buffer.as_mut() else {
            return;
        };
        if buffer.is_attached() || self.policy == OutputPolicy::AlwaysRender {
            buffer.write(bytes);
        } else {
            trace!(session = %self.id, len = bytes.len(), "discarding detached output");
        }
    }

    fn write_to_process(&mut self, data: &[u8]) -> Result<(), SessionError> {
        match self.pty.as_mut() {
            Some(pty) => pty.write(data).map_err(SessionError::Io),
            None => Err(SessionError::Io(PtyError::Closed)),
        }
    }

    /// Tell the process about a new grid size.
    ///
    /// A no-op unless running, and when the size is unchanged.
    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<(), SessionError> {
        let size = GridSize::new(cols, rows);
        if !self.is_running() || size == self.pty_size {
            return Ok(());
        }
        if let Some(pty) = self.pty.as_mut() {
            pty.resize(size).map_err(SessionError::Io)?;
        }
        debug!(session = %self.id, cols, rows, "session resize");
        self.pty_size = size;
        Ok(())
    }

    pub fn size(&self) -> GridSize {
        self.pty_size
    }

    /// Clear the emulator screen. The process is not affected.
    pub fn clear(&mut self) {
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.clear();
        }
    }

    /// Put the current selection on the clipboard, verbatim
    pub fn copy_selection(&self, clipboard: &mut dyn Clipboard) -> Result<(), SessionError> {
        let Some(buffer) = self.buffer.as_ref() else {
            return Ok(());
        };
        clipboard.write_text(&buffer.selection_text())?;
        Ok(())
    }

    /// Write the clipboard contents straight to the process input
    pub fn paste_from_clipboard(&mut self, clipboard: &mut dyn Clipboard) -> Result<(), SessionError> {
        if !self.is_running() {
            return Ok(());
        }
        let text = clipboard.read_text()?;
        if text.is_empty() {
            return Ok(());
        }
        // Keystrokes typed before the paste go first
        self.flush_input();
        debug!(session = %self.id, len = text.len(), "paste");
        self.write_to_process(text.as_bytes())
    }

    pub fn serialize(&self) -> SerializedState {
        SerializedState {
            environment_exclusion_list: self.config.environment_exclusions.clone(),
            shell_arguments: self.config.shell_arguments.clone(),
            shell_path: self.config.shell_path.clone(),
            working_directory: self.config.working_directory.to_string_lossy().into_owned(),
        }
    }

    /// Register `callback` to run once when the session is destroyed.
    ///
    /// Registering on a session that is already destroyed does nothing.
    pub fn on_did_destroy(&mut self, callback: impl FnOnce(&Session) + 'static) -> Subscription {
        let subscription = Subscription(self.next_subscription);
        self.next_subscription += 1;
        if matches!(self.state, LifecycleState::Created | LifecycleState::Running) {
            self.observers.push((subscription, Box::new(callback)));
        }
        subscription
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) {
        self.observers.retain(|(s, _)| *s != subscription);
    }

    /// Kill the process, dispose the buffer and notify observers.
    ///
    /// Later calls do nothing.
    pub fn destroy(&mut self) {
        if matches!(self.state, LifecycleState::Destroying | LifecycleState::Destroyed) {
            return;
        }
        self.state = LifecycleState::Destroying;
        debug!(session = %self.id, "session destroying");

        if let Some(mut pty) = self.pty.take() {
            if let Err(source) = pty.kill() {
                let err = ResourceCleanupError {
                    resource: "shell process",
                    source,
                };
                warn!(session = %self.id, error = %err, "cleanup failed");
            }
        }
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.dispose();
        }

        for (_, observer) in std::mem::take(&mut self.observers) {
            observer(self);
        }

        self.buffer = None;
        self.state = LifecycleState::Destroyed;
        info!(session = %self.id, "session destroyed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_running() {
            self.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::config::ShellSettings;
    use crate::core::emulator::ViewId;
    use crate::core::resolver::{EnvMap, StaticHost};
    use crate::core::testing::FakePty;

    struct Fixture {
        settings: ShellSettings,
        env: EnvMap,
        host: StaticHost,
        pty: FakePty,
    }

    impl Fixture {
        fn new() -> Self {
            let env = [("SHELL", "/bin/bash"), ("HOME", "/"), ("PATH", "/bin"), ("NODE_ENV", "production")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            Self {
                settings: ShellSettings {
                    login_args: None,
                    ..ShellSettings::default()
                },
                env,
                host: StaticHost::default(),
                pty: FakePty::new(),
            }
        }

        fn create(&self, overrides: &SessionConfig) -> Result<Session, SessionError> {
            self.create_with(overrides, &LaunchOptions::default())
        }

        fn create_with(&self, overrides: &SessionConfig, options: &LaunchOptions) -> Result<Session, SessionError> {
            let resolver = ConfigResolver::new(&self.settings, &self.env, &self.host);
            Session::create(SessionId(1), overrides, &resolver, options, &self.pty)
        }

        fn running(&self) -> Session {
            let mut session = self.create(&SessionConfig::default()).unwrap();
            session.buffer_mut().unwrap().attach(ViewId(1));
            session
        }
    }

    fn count_destroys(session: &mut Session) -> Rc<Cell<usize>> {
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        session.on_did_destroy(move |_| counter.set(counter.get() + 1));
        count
    }

    #[test]
    fn test_create_spawns_resolved_command() {
        let fixture = Fixture::new();
        let session = fixture
            .create(&SessionConfig {
                shell_args: Some("  -l   --foo ".to_string()),
                working_directory: Some(PathBuf::from("/tmp")),
                ..SessionConfig::default()
            })
            .unwrap();

        assert_eq!(session.state(), LifecycleState::Running);
        let process = fixture.pty.last();
        let log = process.log();
        assert_eq!(log.request.program, "/bin/bash");
        assert_eq!(log.request.args, vec!["-l", "--foo"]);
        assert_eq!(log.request.cwd, PathBuf::from("/tmp"));
        assert_eq!(log.request.term_name, "xterm-256color");
        assert!(log.request.env.contains_key("PATH"));
        assert!(!log.request.env.contains_key("NODE_ENV"));
    }

    #[test]
    fn test_launch_failure_leaves_nothing() {
        let mut fixture = Fixture::new();
        fixture.pty = FakePty::failing();
        let err = fixture
            .create(&SessionConfig {
                shell_path: Some("/no/such/shell".to_string()),
                ..SessionConfig::default()
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::Launch(PtyError::Spawn { .. })));
        assert!(err.to_string().contains("/no/such/shell"));
        assert_eq!(fixture.pty.spawn_count(), 0);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let fixture = Fixture::new();
        let mut session = fixture.running();
        let destroyed = count_destroys(&mut session);

        session.destroy();
        session.destroy();
        session.destroy();

        assert_eq!(destroyed.get(), 1);
        assert_eq!(fixture.pty.last().log().kills, 1);
        assert_eq!(session.state(), LifecycleState::Destroyed);
        assert!(session.buffer().is_none());
    }

    #[test]
    fn test_process_exit_destroys_once() {
        let fixture = Fixture::new();
        let mut session = fixture.running();
        let destroyed = count_destroys(&mut session);

        fixture.pty.last().emit_exit(Some(0));
        assert!(session.pump());
        session.destroy();
        assert!(!session.pump());

        assert_eq!(destroyed.get(), 1);
        assert_eq!(session.state(), LifecycleState::Destroyed);
    }

    #[test]
    fn test_destroy_then_late_exit() {
        let fixture = Fixture::new();
        let mut session = fixture.running();
        let destroyed = count_destroys(&mut session);

        session.destroy();
        fixture.pty.last().emit_exit(Some(129));
        session.pump();

        assert_eq!(destroyed.get(), 1);
        assert_eq!(fixture.pty.last().log().kills, 1);
    }

    #[test]
    fn test_observers_see_destroying_session() {
        let fixture = Fixture::new();
        let mut session = fixture.running();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in ["a", "b"] {
            let seen = seen.clone();
            session.on_did_destroy(move |s| seen.borrow_mut().push((tag, s.id(), s.state())));
        }
        let dropped = session.on_did_destroy(|_| panic!("unsubscribed observer ran"));
        session.unsubscribe(dropped);

        session.destroy();
        assert_eq!(
            *seen.borrow(),
            vec![
                ("a", SessionId(1), LifecycleState::Destroying),
                ("b", SessionId(1), LifecycleState::Destroying),
            ]
        );
    }

    #[test]
    fn test_kill_failure_still_destroys() {
        let fixture = Fixture::new();
        let mut session = fixture.running();
        let destroyed = count_destroys(&mut session);
        fixture.pty.last().fail_kill();

        session.destroy();
        assert_eq!(destroyed.get(), 1);
        assert_eq!(session.state(), LifecycleState::Destroyed);
    }

    #[test]
    fn test_resize_is_idempotent() {
        let fixture = Fixture::new();
        let mut session = fixture.running();

        session.resize(100, 30).unwrap();
        session.resize(100, 30).unwrap();
        session.resize(80, 24).unwrap();
        session.resize(80, 24).unwrap();
        assert_eq!(
            fixture.pty.last().log().resizes,
            vec![GridSize::new(100, 30), GridSize::new(80, 24)]
        );

        // Dropped after destroy
        session.destroy();
        session.resize(120, 40).unwrap();
        assert_eq!(fixture.pty.last().log().resizes.len(), 2);
    }

    #[test]
    fn test_output_reaches_buffer_in_order() {
        let fixture = Fixture::new();
        let mut session = fixture.running();
        let process = fixture.pty.last();

        session.buffer_mut().unwrap().type_input(b"x");
        process.emit_output(b"A");
        process.emit_output(b"B");
        session.buffer_mut().unwrap().type_input(b"y");
        process.emit_output(b"C");
        session.pump();

        assert!(session.buffer().unwrap().screen().contents().starts_with("ABC"));
        assert_eq!(process.input(), b"xy");
    }

    #[test]
    fn test_detached_output_is_discarded() {
        let fixture = Fixture::new();
        let mut session = fixture.create(&SessionConfig::default()).unwrap();
        fixture.pty.last().emit_output(b"hidden");
        assert!(session.pump());
        assert!(!session.buffer().unwrap().screen().contents().contains("hidden"));

        let options = LaunchOptions {
            output_policy: OutputPolicy::AlwaysRender,
            ..LaunchOptions::default()
        };
        let mut session = fixture.create_with(&SessionConfig::default(), &options).unwrap();
        fixture.pty.last().emit_output(b"kept");
        session.pump();
        assert!(session.buffer().unwrap().screen().contents().contains("kept"));
    }

    #[test]
    fn test_clear_keeps_process() {
        let fixture = Fixture::new();
        let mut session = fixture.running();
        fixture.pty.last().emit_output(b"some output");
        session.pump();

        session.clear();
        assert_eq!(session.buffer().unwrap().screen().contents().trim(), "");
        assert!(session.is_running());
        assert_eq!(fixture.pty.last().log().kills, 0);
    }

    #[test]
    fn test_copy_and_paste() {
        let fixture = Fixture::new();
        let mut session = fixture.running();
        fixture.pty.last().emit_output(b"hello world");
        session.pump();

        let mut clipboard = MemoryClipboard::default();
        session.buffer_mut().unwrap().select(
            crate::core::emulator::CellPos::new(0, 0),
            crate::core::emulator::CellPos::new(0, 5),
        );
        session.copy_selection(&mut clipboard).unwrap();
        assert_eq!(clipboard.text(), "hello");

        session.buffer_mut().unwrap().type_input(b"echo ");
        let mut clipboard = MemoryClipboard::with_text("$HOME\n\x1b[A");
        session.paste_from_clipboard(&mut clipboard).unwrap();
        assert_eq!(fixture.pty.last().input(), b"echo $HOME\n\x1b[A");
    }

    #[test]
    fn test_serialize_round_trip() {
        let fixture = Fixture::new();
        let original = fixture
            .create(&SessionConfig {
                shell_path: Some("/bin/sh".to_string()),
                shell_args: Some("-l".to_string()),
                sanitize_environment: Some(vec!["FOO".to_string()]),
                working_directory: Some(PathBuf::from("/tmp")),
            })
            .unwrap();
        let state = original.serialize();
        assert_eq!(
            state,
            SerializedState {
                environment_exclusion_list: vec!["FOO".to_string()],
                shell_arguments: "-l".to_string(),
                shell_path: "/bin/sh".to_string(),
                working_directory: "/tmp".to_string(),
            }
        );

        let resolver = ConfigResolver::new(&fixture.settings, &fixture.env, &fixture.host);
        let restored = Session::restore(
            SessionId(2),
            state.clone(),
            &resolver,
            &LaunchOptions::default(),
            &fixture.pty,
        )
        .unwrap();
        assert_eq!(restored.serialize(), state);
        assert_eq!(restored.config().args, vec!["-l"]);
    }

    #[test]
    fn test_serialized_field_names() {
        let state = SerializedState {
            environment_exclusion_list: vec!["NODE_ENV".to_string()],
            shell_arguments: String::new(),
            shell_path: "/bin/zsh".to_string(),
            working_directory: "/home/user".to_string(),
        };
        let text = toml::to_string(&state).unwrap();
        assert!(text.contains("environmentExclusionList"));
        assert!(text.contains("shellArguments"));
        assert!(text.contains("shellPath"));
        assert!(text.contains("workingDirectory"));
    }

    #[test]
    fn test_drop_kills_process() {
        let fixture = Fixture::new();
        let session = fixture.running();
        drop(session);
        assert_eq!(fixture.pty.last().log().kills, 1);
    }
}
