//! termtab - shell sessions as terminal tabs
//!
//! Runs one shell per tab inside the current terminal. Open tabs are saved
//! on detach and restored on the next start.
//!
//! # Quick Start
//!
//! ```text
//! termtab                       # Default shell, tabs restored
//! termtab -s /bin/zsh -a -l     # zsh as a login shell
//! termtab -p ~/src/app          # Start new tabs in the project root
//! termtab --no-restore          # Ignore saved tabs
//! ```
//!
//! # Keybindings (Ctrl+B prefix)
//!
//! | Key | Action |
//! |-----|--------|
//! | c | New tab |
//! | n/p | Next/Previous tab |
//! | x | Close tab |
//! | k | Clear screen |
//! | y | Copy screen |
//! | ] | Paste |
//! | t | Next color scheme |
//! | d | Detach (save tabs and quit) |
//! | Ctrl+B | Send Ctrl+B |

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use tracing::{debug, info, warn};

use termtab::clipboard::SystemClipboard;
use termtab::config::Config;
use termtab::core::emulator::ViewId;
use termtab::core::resolver::os_environment;
use termtab::core::{NativePty, Session, SessionConfig, SessionId, StaticHost};
use termtab::logging;
use termtab::ui::renderer::STATUS_ROWS;
use termtab::ui::{
    ColorScheme, InputModes, KeyMapper, PrefixAction, Renderer, SchemeMatcher, StatusLine,
    SurfaceHub, TabLabel, TerminalView,
};
use termtab::workspace::{state, Command, Workspace, WorkspaceState};

/// Shell sessions as terminal tabs
#[derive(Parser, Debug)]
#[command(name = "termtab", version, about)]
struct Cli {
    /// Shell for new tabs (default: config, then $SHELL)
    #[arg(short, long, value_name = "PATH")]
    shell: Option<String>,

    /// Shell arguments, as one string
    #[arg(short, long, value_name = "ARGS", allow_hyphen_values = true)]
    args: Option<String>,

    /// Working directory for new tabs
    #[arg(short = 'C', long, value_name = "DIR")]
    cwd: Option<PathBuf>,

    /// Project root; new tabs start in the first one
    #[arg(short = 'p', long = "project", value_name = "DIR")]
    projects: Vec<PathBuf>,

    /// Start without restoring saved tabs
    #[arg(long)]
    no_restore: bool,

    /// Color scheme, overriding the config file
    #[arg(long, value_name = "NAME")]
    theme: Option<String>,

    /// Config file (default: ~/.termtab/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Cli {
    fn session_defaults(&self) -> SessionConfig {
        SessionConfig {
            shell_path: self.shell.clone(),
            shell_args: self.args.clone(),
            sanitize_environment: None,
            working_directory: self.cwd.clone(),
        }
    }
}

/// Why the event loop stopped
enum Exit {
    /// User detached; the open tabs are saved
    Detached,
    /// Every shell exited
    AllClosed,
}

struct App {
    workspace: Workspace,
    config: Config,
    theme: SchemeMatcher,
    hub: SurfaceHub,
    /// One view per session, with its surface key
    views: HashMap<SessionId, (TerminalView, u64)>,
    next_view: u64,
    clipboard: SystemClipboard,
    focused: Option<SessionId>,
    prefix: bool,
    message: Option<String>,
}

impl App {
    fn new(workspace: Workspace, config: Config, hub: SurfaceHub) -> Self {
        let theme = SchemeMatcher::by_name(&config.terminal.color_scheme);
        Self {
            workspace,
            config,
            theme,
            hub,
            views: HashMap::new(),
            next_view: 1,
            clipboard: SystemClipboard::new(),
            focused: None,
            prefix: false,
            message: None,
        }
    }

    fn run(&mut self, renderer: &mut Renderer) -> anyhow::Result<Exit> {
        let poll_timeout = Duration::from_millis(10);
        let mut needs_render = true;

        loop {
            needs_render |= self.workspace.pump();
            if self.workspace.is_empty() {
                info!("all sessions ended");
                return Ok(Exit::AllClosed);
            }
            needs_render |= self.sync_views();
            needs_render |= self.handle_view_events();
            if let Some(buffer) = self.workspace.active_mut().and_then(Session::buffer_mut) {
                needs_render |= buffer.take_dirty();
            }

            if needs_render {
                self.render(renderer)?;
                needs_render = false;
            }

            if !event::poll(poll_timeout)? {
                continue;
            }
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if let Some(exit) = self.handle_key(key) {
                        return Ok(exit);
                    }
                    needs_render = true;
                }
                Event::Paste(text) => {
                    let bytes = KeyMapper::paste(&text, self.input_modes());
                    self.type_input(&bytes);
                }
                Event::Resize(cols, rows) => {
                    self.hub.resize(SurfaceHub::content_size(cols, rows));
                    self.workspace.set_initial_size(cols, content_rows(rows));
                    needs_render = true;
                }
                Event::FocusGained => self.focused = None,
                Event::FocusLost => self.hub.blur_all(),
                _ => {}
            }
        }
    }

    /// Attach a view to every new session and drop views of ended ones
    fn sync_views(&mut self) -> bool {
        let mut changed = false;
        self.views.retain(|id, _| self.workspace.get(*id).is_some());

        let ids: Vec<SessionId> = self.workspace.ids().to_vec();
        for id in ids {
            if self.views.contains_key(&id) {
                continue;
            }
            let Some(session) = self.workspace.get_mut(id) else {
                continue;
            };
            let surface = self.hub.surface();
            let key = surface.key();
            let mut view = TerminalView::new(ViewId(self.next_view), Box::new(surface));
            self.next_view += 1;
            match view.attach(session, &self.theme, &self.config.terminal) {
                Ok(grid) => {
                    debug!(session = %id, cols = grid.cols, rows = grid.rows, "tab opened");
                    self.views.insert(id, (view, key));
                    changed = true;
                }
                Err(e) => warn!(session = %id, error = %e, "could not attach view"),
            }
        }

        if self.focused != self.workspace.active_id() {
            self.focused = self.workspace.active_id();
            if let Some((_, key)) = self.focused.and_then(|id| self.views.get(&id)) {
                self.hub.focus(*key);
            }
            changed = true;
        }
        changed
    }

    fn handle_view_events(&mut self) -> bool {
        let mut changed = false;
        for (id, (view, _)) in self.views.iter_mut() {
            if let Some(session) = self.workspace.get_mut(*id) {
                changed |= view.handle_events(session, &self.theme, &self.config.terminal);
            }
        }
        changed
    }

    fn input_modes(&self) -> InputModes {
        self.workspace
            .active()
            .and_then(Session::buffer)
            .map(|buffer| InputModes::from_screen(buffer.screen()))
            .unwrap_or_default()
    }

    fn type_input(&mut self, bytes: &[u8]) {
        if let Some(buffer) = self.workspace.active_mut().and_then(Session::buffer_mut) {
            buffer.type_input(bytes);
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Option<Exit> {
        if !self.prefix {
            if KeyMapper::is_prefix(&key) {
                self.prefix = true;
                self.message = None;
            } else if let Some(bytes) = KeyMapper::map(&key, self.input_modes()) {
                self.type_input(&bytes);
            }
            return None;
        }

        self.prefix = false;
        match KeyMapper::prefix_action(&key)? {
            PrefixAction::Workspace(command) => self.dispatch(command),
            PrefixAction::CopyScreen => {
                if let Some(buffer) = self.workspace.active_mut().and_then(Session::buffer_mut) {
                    buffer.select_all();
                }
                self.dispatch(Command::Copy);
                if let Some(buffer) = self.workspace.active_mut().and_then(Session::buffer_mut) {
                    buffer.clear_selection();
                }
                if self.message.is_none() {
                    self.message = Some("screen copied".to_string());
                }
            }
            PrefixAction::CycleTheme => {
                let name = ColorScheme::next_name(&self.config.terminal.color_scheme);
                self.config.terminal.color_scheme = name.to_string();
                self.theme = SchemeMatcher::by_name(name);
                self.hub.theme_changed();
                self.message = Some(format!("theme: {}", name));
            }
            PrefixAction::Detach => return Some(Exit::Detached),
            PrefixAction::SendPrefix => self.type_input(&[0x02]),
        }
        None
    }

    fn dispatch(&mut self, command: Command) {
        if let Err(e) = self.workspace.dispatch(command, &mut self.clipboard) {
            warn!(?command, error = %e, "command failed");
            self.message = Some(e.to_string());
        }
    }

    fn render(&mut self, renderer: &mut Renderer) -> anyhow::Result<()> {
        let active = self.workspace.active_id();
        let status = StatusLine {
            tabs: self
                .workspace
                .iter()
                .map(|session| TabLabel {
                    title: session.title(),
                    active: Some(session.id()) == active,
                })
                .collect(),
            prefix: self.prefix,
            message: self.message.clone(),
        };
        if let Some(buffer) = self.workspace.active().and_then(Session::buffer) {
            renderer.render(buffer, &status)?;
        }
        Ok(())
    }
}

fn content_rows(rows: u16) -> u16 {
    rows.saturating_sub(STATUS_ROWS).max(1)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let (mut config, load_error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    if let Some(theme) = &cli.theme {
        config.terminal.color_scheme = theme.clone();
    }

    let log_path = logging::init(&config.log);
    info!(version = env!("CARGO_PKG_VERSION"), log = ?log_path, "termtab starting");
    if let Some(e) = load_error {
        warn!(error = %e, "using default config");
        eprintln!("termtab: {}; using defaults", e);
    }

    let (cols, rows) = Renderer::size().unwrap_or((80, 24));
    info!("Terminal size: {}x{}", cols, rows);

    let mut workspace = Workspace::new(
        &config,
        os_environment(),
        Box::new(StaticHost::new(cli.projects.clone())),
        Box::new(NativePty::default()),
    )
    .with_defaults(cli.session_defaults());
    workspace.set_initial_size(cols, content_rows(rows));

    let state_path = state::default_path();
    if !cli.no_restore {
        if let Some(path) = &state_path {
            match state::load(path) {
                Ok(saved) => {
                    workspace.restore(saved);
                }
                Err(e) => warn!(error = %e, "ignoring saved tabs"),
            }
        }
    }
    if workspace.is_empty() {
        workspace.open_default().context("failed to start a shell")?;
    }

    let mut renderer = Renderer::new();
    renderer.init()?;
    let hub = SurfaceHub::new(SurfaceHub::content_size(cols, rows));
    let mut app = App::new(workspace, config, hub);
    let result = app.run(&mut renderer);
    let _ = renderer.cleanup();

    let saved = match result? {
        Exit::Detached => app.workspace.serialize(),
        Exit::AllClosed => WorkspaceState::default(),
    };
    if let Some(path) = &state_path {
        if let Err(e) = state::save(path, &saved) {
            warn!(error = %e, "could not save tabs");
            eprintln!("termtab: could not save tabs: {}", e);
        }
    }
    let closed = app.workspace.shutdown();
    info!(saved = saved.sessions.len(), closed, "termtab exiting");
    Ok(())
}
