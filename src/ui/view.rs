//! Terminal view
//!
//! A [`TerminalView`] binds a session's buffer to a visible [`Surface`]. It
//! fits the grid to the surface, forwards geometry changes to
//! [`Session::resize`], hands focus to the buffer and applies the theme
//! palette. It never owns the session: every call takes it by reference, and
//! detaching leaves the session running.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::mpsc::Receiver;

use thiserror::Error;
use tracing::{debug, warn};

use super::theme::ThemeMatcher;
use crate::config::TerminalSettings;
use crate::core::emulator::{CellSize, DisplayOptions, GridSize, SurfaceSize, TerminalBuffer, ViewId};
use crate::core::session::{Session, SessionId, Subscription};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViewError {
    #[error("Session {0} is not running")]
    SessionNotRunning(SessionId),

    #[error("View is still attached to session {0}")]
    StillAttached(SessionId),
}

/// Something a surface reports to its observer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceEvent {
    Resized(SurfaceSize),
    Focused,
    Blurred,
    ThemeChanged,
}

/// A visible area a terminal can be drawn into
pub trait Surface {
    fn size(&self) -> SurfaceSize;

    fn cell_size(&self) -> CellSize;

    /// Start observing; events arrive on the returned channel
    fn observe(&mut self) -> Receiver<SurfaceEvent>;
}

/// Presentation adapter for one session
pub struct TerminalView {
    id: ViewId,
    surface: Box<dyn Surface>,
    session: Option<SessionId>,
    events: Option<Receiver<SurfaceEvent>>,
    destroy_subscription: Option<Subscription>,
    /// Set by the session's destroy observer
    session_gone: Rc<Cell<bool>>,
}

impl TerminalView {
    pub fn new(id: ViewId, surface: Box<dyn Surface>) -> Self {
        Self {
            id,
            surface,
            session: None,
            events: None,
            destroy_subscription: None,
            session_gone: Rc::new(Cell::new(false)),
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session
    }

    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    /// Take over the session's buffer and start observing the surface.
    ///
    /// Returns the grid the buffer was fitted to. A view still bound to a
    /// live session must be detached from it first.
    pub fn attach(
        &mut self,
        session: &mut Session,
        theme: &dyn ThemeMatcher,
        settings: &TerminalSettings,
    ) -> Result<GridSize, ViewError> {
        match self.session {
            Some(id) if id == session.id() => self.detach(session),
            // Detach from the previous session first
            Some(id) if !self.session_gone.get() => return Err(ViewError::StillAttached(id)),
            _ => self.release(),
        }
        if !session.is_running() {
            return Err(ViewError::SessionNotRunning(session.id()));
        }

        let surface_size = self.surface.size();
        let cell_size = self.surface.cell_size();
        let grid = match session.buffer_mut() {
            Some(buffer) => {
                buffer.attach(self.id);
                apply_theme(buffer, theme, settings);
                buffer.fit(surface_size, cell_size)
            }
            None => return Err(ViewError::SessionNotRunning(session.id())),
        };
        if let Err(e) = session.resize(grid.cols, grid.rows) {
            warn!(session = %session.id(), error = %e, "initial resize failed");
        }

        let gone = Rc::new(Cell::new(false));
        let flag = gone.clone();
        self.destroy_subscription = Some(session.on_did_destroy(move |_| flag.set(true)));
        self.session_gone = gone;
        self.events = Some(self.surface.observe());
        self.session = Some(session.id());

        debug!(view = self.id.0, session = %session.id(), cols = grid.cols, rows = grid.rows, "view attached");
        Ok(grid)
    }

    /// Apply pending surface events. Returns whether anything changed.
    ///
    /// Resizes in one batch collapse into the last one. Once the session is
    /// gone the view detaches itself.
    pub fn handle_events(
        &mut self,
        session: &mut Session,
        theme: &dyn ThemeMatcher,
        settings: &TerminalSettings,
    ) -> bool {
        if self.session != Some(session.id()) {
            return false;
        }
        if self.session_gone.get() || !session.is_running() {
            debug!(view = self.id.0, session = %session.id(), "session gone, view detached");
            self.release();
            return false;
        }
        let pending: Vec<SurfaceEvent> = match &self.events {
            Some(events) => events.try_iter().collect(),
            None => return false,
        };
        if pending.is_empty() {
            return false;
        }
        if !session.buffer().is_some_and(|b| b.is_driven_by(self.id)) {
            // Another view took over the buffer
            return false;
        }

        let mut resize_to = None;
        let mut refit = false;
        for event in pending {
            match event {
                SurfaceEvent::Resized(size) => resize_to = Some(size),
                SurfaceEvent::Focused => {
                    if let Some(buffer) = session.buffer_mut() {
                        buffer.focus();
                    }
                }
                SurfaceEvent::Blurred => {
                    if let Some(buffer) = session.buffer_mut() {
                        buffer.blur();
                    }
                }
                SurfaceEvent::ThemeChanged => {
                    if let Some(buffer) = session.buffer_mut() {
                        apply_theme(buffer, theme, settings);
                    }
                    // Font changes alter cell metrics
                    refit = true;
                }
            }
        }
        if let Some(size) = resize_to.or_else(|| refit.then(|| self.surface.size())) {
            self.fit(session, size);
        }
        true
    }

    fn fit(&mut self, session: &mut Session, size: SurfaceSize) {
        let cell = self.surface.cell_size();
        let Some(buffer) = session.buffer_mut() else {
            return;
        };
        let grid = buffer.fit(size, cell);
        if let Err(e) = session.resize(grid.cols, grid.rows) {
            warn!(session = %session.id(), error = %e, "resize failed");
        }
    }

    /// Stop observing and give the buffer back. The session keeps running.
    pub fn detach(&mut self, session: &mut Session) {
        if self.session != Some(session.id()) {
            return;
        }
        if let Some(buffer) = session.buffer_mut() {
            buffer.detach(self.id);
        }
        if let Some(subscription) = self.destroy_subscription.take() {
            session.unsubscribe(subscription);
        }
        self.release();
        debug!(view = self.id.0, session = %session.id(), "view detached");
    }

    /// Detach and drop the view
    pub fn destroy(mut self, session: &mut Session) {
        self.detach(session);
    }

    fn release(&mut self) {
        self.events = None;
        self.session = None;
        self.destroy_subscription = None;
        self.session_gone = Rc::new(Cell::new(false));
    }
}

fn apply_theme(buffer: &mut TerminalBuffer, theme: &dyn ThemeMatcher, settings: &TerminalSettings) {
    let options = if settings.match_theme {
        DisplayOptions {
            palette: theme.compute_palette(),
            font_family: Some(settings.font_family.clone()).filter(|f| !f.is_empty()),
            font_size: Some(settings.font_size),
            themed: true,
        }
    } else {
        DisplayOptions::default()
    };
    buffer.set_display_options(options);
}
