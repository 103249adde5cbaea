//! Terminal emulator buffer
//!
//! Wraps a `vt100` parser and adds the pieces a session needs around it:
//! the queue of user keystrokes waiting for the PTY, selection, the attached
//! view, focus, and display options.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, trace};

/// Default scrollback length in lines
pub const DEFAULT_SCROLLBACK: usize = 1000;

/// Smallest grid a fit will produce
pub const MIN_COLS: u16 = 2;
pub const MIN_ROWS: u16 = 1;

/// Color name to `#rrggbb` value
pub type Palette = BTreeMap<String, String>;

/// Grid dimensions in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridSize {
    pub cols: u16,
    pub rows: u16,
}

impl GridSize {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for GridSize {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

/// Size of a visible surface, in whatever unit its cell size uses
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSize {
    pub width: f32,
    pub height: f32,
}

impl SurfaceSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Size of one character cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSize {
    pub width: f32,
    pub height: f32,
}

impl CellSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl Default for CellSize {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

/// Identifier of the view a buffer is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(pub u64);

/// A grid position (row, column), zero based
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CellPos {
    pub row: u16,
    pub col: u16,
}

impl CellPos {
    pub const fn new(row: u16, col: u16) -> Self {
        Self { row, col }
    }
}

/// Text selection, end exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: CellPos,
    pub end: CellPos,
}

/// Cosmetic options applied by the presentation layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayOptions {
    pub palette: Palette,
    pub font_family: Option<String>,
    pub font_size: Option<f32>,
    pub themed: bool,
}

/// Terminal emulator buffer
pub struct TerminalBuffer {
    parser: vt100::Parser,
    scrollback: usize,
    /// Keystrokes typed by the user, oldest first
    pending_input: VecDeque<Vec<u8>>,
    attached_view: Option<ViewId>,
    focused: bool,
    selection: Option<Selection>,
    display: DisplayOptions,
    disposed: bool,
    dirty: bool,
}

impl Default for TerminalBuffer {
    fn default() -> Self {
        Self::new(GridSize::default(), DEFAULT_SCROLLBACK)
    }
}

impl std::fmt::Debug for TerminalBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalBuffer")
            .field("size", &self.size())
            .field("attached_view", &self.attached_view)
            .field("focused", &self.focused)
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl TerminalBuffer {
    pub fn new(size: GridSize, scrollback: usize) -> Self {
        Self {
            parser: vt100::Parser::new(size.rows, size.cols, scrollback),
            scrollback,
            pending_input: VecDeque::new(),
            attached_view: None,
            focused: false,
            selection: None,
            display: DisplayOptions::default(),
            disposed: false,
            dirty: true,
        }
    }

    /// Write process output into the buffer
    pub fn write(&mut self, bytes: &[u8]) {
        if self.disposed {
            return;
        }
        trace!(len = bytes.len(), "buffer write");
        self.parser.process(bytes);
        self.dirty = true;
    }

    /// Record bytes typed by the user
    pub fn type_input(&mut self, bytes: &[u8]) {
        if self.disposed || bytes.is_empty() {
            return;
        }
        self.pending_input.push_back(bytes.to_vec());
    }

    /// Drain typed input in the order it was entered
    pub fn take_input(&mut self) -> Vec<Vec<u8>> {
        self.pending_input.drain(..).collect()
    }

    /// Discard the visible screen and scrollback
    pub fn clear(&mut self) {
        if self.disposed {
            return;
        }
        let size = self.size();
        self.parser = vt100::Parser::new(size.rows, size.cols, self.scrollback);
        self.selection = None;
        self.dirty = true;
    }

    pub fn size(&self) -> GridSize {
        let (rows, cols) = self.parser.screen().size();
        GridSize::new(cols, rows)
    }

    /// Resize the grid; returns whether the size changed
    pub fn resize(&mut self, size: GridSize) -> bool {
        if self.disposed || self.size() == size {
            return false;
        }
        debug!(cols = size.cols, rows = size.rows, "buffer resize");
        self.parser.set_size(size.rows, size.cols);
        self.selection = None;
        self.dirty = true;
        true
    }

    /// Compute the grid that fits `surface` and apply it
    pub fn fit(&mut self, surface: SurfaceSize, cell: CellSize) -> GridSize {
        let size = fit_grid(surface, cell);
        self.resize(size);
        size
    }

    pub fn select(&mut self, start: CellPos, end: CellPos) {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        self.selection = Some(Selection { start, end });
    }

    pub fn select_all(&mut self) {
        let size = self.size();
        self.select(CellPos::new(0, 0), CellPos::new(size.rows.saturating_sub(1), size.cols));
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    /// Selected text, empty when nothing is selected
    pub fn selection_text(&self) -> String {
        match self.selection {
            Some(sel) => self.parser.screen().contents_between(
                sel.start.row,
                sel.start.col,
                sel.end.row,
                sel.end.col,
            ),
            None => String::new(),
        }
    }

    /// Attach to a view, replacing any previous one
    pub fn attach(&mut self, view: ViewId) {
        if self.attached_view != Some(view) {
            debug!(view = view.0, previous = ?self.attached_view.map(|v| v.0), "buffer attached");
        }
        self.attached_view = Some(view);
        self.dirty = true;
    }

    /// Detach `view`; a no-op if another view has taken over since
    pub fn detach(&mut self, view: ViewId) {
        if self.attached_view == Some(view) {
            self.attached_view = None;
            self.focused = false;
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached_view.is_some()
    }

    pub fn is_driven_by(&self, view: ViewId) -> bool {
        self.attached_view == Some(view)
    }

    pub fn focus(&mut self) {
        self.focused = true;
    }

    pub fn blur(&mut self) {
        self.focused = false;
    }

    pub fn has_focus(&self) -> bool {
        self.focused
    }

    pub fn set_display_options(&mut self, options: DisplayOptions) {
        if self.display != options {
            self.display = options;
            self.dirty = true;
        }
    }

    pub fn display_options(&self) -> &DisplayOptions {
        &self.display
    }

    pub fn screen(&self) -> &vt100::Screen {
        self.parser.screen()
    }

    /// Whether the screen changed since the last call
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.pending_input.clear();
        self.attached_view = None;
        self.focused = false;
        self.selection = None;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// Best-fit grid for a surface, never smaller than `MIN_COLS` x `MIN_ROWS`
pub fn fit_grid(surface: SurfaceSize, cell: CellSize) -> GridSize {
    let cells = |extent: f32, cell: f32| -> u16 {
        if cell <= 0.0 || !extent.is_finite() || extent <= 0.0 {
            return 0;
        }
        (extent / cell).floor().min(u16::MAX as f32) as u16
    };
    GridSize::new(
        cells(surface.width, cell.width).max(MIN_COLS),
        cells(surface.height, cell.height).max(MIN_ROWS),
    )
}
