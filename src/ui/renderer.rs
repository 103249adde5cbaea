//! Terminal renderer using crossterm
//!
//! Draws the active session's screen plus a one-line tab bar at the bottom,
//! and provides [`ScreenSurface`], the [`Surface`] every view of the host
//! terminal observes.

use std::cell::RefCell;
use std::io::{self, BufWriter, Write};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{DisableBracketedPaste, DisableFocusChange, EnableBracketedPaste, EnableFocusChange},
    execute, queue,
    style::{Attribute, Color, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::theme::COLOR_KEYS;
use super::view::{Surface, SurfaceEvent};
use crate::core::emulator::{CellPos, CellSize, Palette, Selection, SurfaceSize, TerminalBuffer};

/// Rows taken by the tab bar
pub const STATUS_ROWS: u16 = 1;

/// One tab in the tab bar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabLabel {
    pub title: String,
    pub active: bool,
}

/// Contents of the tab bar
#[derive(Debug, Clone, Default)]
pub struct StatusLine {
    pub tabs: Vec<TabLabel>,
    /// Waiting for the key after the prefix
    pub prefix: bool,
    /// Transient message shown after the tabs
    pub message: Option<String>,
}

/// Colors resolved from a buffer's palette
struct PaletteColors {
    foreground: Option<Color>,
    background: Option<Color>,
    ansi: [Option<Color>; 16],
}

impl PaletteColors {
    fn from_palette(palette: &Palette) -> Self {
        let lookup = |key: &str| palette.get(key).and_then(|hex| parse_hex(hex));
        let mut ansi = [None; 16];
        for (slot, key) in ansi.iter_mut().zip(&COLOR_KEYS[4..]) {
            *slot = lookup(key);
        }
        Self {
            foreground: lookup("foreground"),
            background: lookup("background"),
            ansi,
        }
    }

    fn map(&self, color: vt100::Color, foreground: bool) -> Color {
        match color {
            vt100::Color::Default => {
                let themed = if foreground { self.foreground } else { self.background };
                themed.unwrap_or(Color::Reset)
            }
            vt100::Color::Idx(i) if i < 16 => self.ansi[i as usize].unwrap_or(Color::AnsiValue(i)),
            vt100::Color::Idx(i) => Color::AnsiValue(i),
            vt100::Color::Rgb(r, g, b) => Color::Rgb { r, g, b },
        }
    }
}

/// `#rrggbb` to a crossterm color
pub fn parse_hex(hex: &str) -> Option<Color> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some(Color::Rgb {
        r: channel(0)?,
        g: channel(2)?,
        b: channel(4)?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CellStyle {
    fg: Color,
    bg: Color,
    bold: bool,
    italic: bool,
    underline: bool,
    inverse: bool,
}

impl CellStyle {
    fn apply<W: Write>(&self, out: &mut W) -> io::Result<()> {
        queue!(out, SetAttribute(Attribute::Reset))?;
        if self.bold {
            queue!(out, SetAttribute(Attribute::Bold))?;
        }
        if self.italic {
            queue!(out, SetAttribute(Attribute::Italic))?;
        }
        if self.underline {
            queue!(out, SetAttribute(Attribute::Underlined))?;
        }
        if self.inverse {
            queue!(out, SetAttribute(Attribute::Reverse))?;
        }
        queue!(out, SetForegroundColor(self.fg), SetBackgroundColor(self.bg))
    }
}

fn is_selected(selection: Option<Selection>, row: u16, col: u16) -> bool {
    selection.is_some_and(|sel| {
        let pos = CellPos::new(row, col);
        sel.start <= pos && pos < sel.end
    })
}

/// Cut tab labels down to `width` columns
pub fn fit_labels(tabs: &[TabLabel], width: usize) -> Vec<(String, bool)> {
    let mut used = 0;
    let mut out = Vec::new();
    for (i, tab) in tabs.iter().enumerate() {
        let label = format!(" {}:{} ", i + 1, tab.title);
        let remaining = width.saturating_sub(used);
        if remaining == 0 {
            break;
        }
        let label = truncate_to_width(&label, remaining);
        used += label.width();
        out.push((label, tab.active));
    }
    out
}

fn truncate_to_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        // Leave room for the ellipsis
        if used + w + 1 > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    if width > 0 {
        out.push('…');
    }
    out
}

/// Terminal renderer
#[derive(Default)]
pub struct Renderer {
    /// Whether the terminal has been initialized
    initialized: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize the terminal for rendering
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            EnableFocusChange,
            EnableBracketedPaste,
            Clear(ClearType::All),
            Hide
        )?;
        self.initialized = true;
        Ok(())
    }

    /// Cleanup the terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        let _ = execute!(
            stdout,
            ResetColor,
            SetAttribute(Attribute::Reset),
            DisableBracketedPaste,
            DisableFocusChange,
            Show,
            LeaveAlternateScreen
        );
        let _ = stdout.flush();
        terminal::disable_raw_mode()
    }

    /// Draw `buffer` and the tab bar below it
    pub fn render(&mut self, buffer: &TerminalBuffer, status: &StatusLine) -> io::Result<()> {
        let screen = buffer.screen();
        let display = buffer.display_options();
        let colors = PaletteColors::from_palette(&display.palette);
        let selection = buffer.selection();
        let (rows, cols) = screen.size();

        let stdout = io::stdout();
        let mut out = BufWriter::with_capacity(65536, stdout.lock());

        // Begin synchronized update (reduces flicker)
        write!(out, "\x1b[?2026h")?;
        queue!(out, Hide)?;

        let mut line = String::with_capacity(256);
        for row in 0..rows {
            queue!(out, MoveTo(0, row))?;
            let mut current: Option<CellStyle> = None;
            for col in 0..cols {
                let Some(cell) = screen.cell(row, col) else {
                    continue;
                };
                if cell.is_wide_continuation() {
                    continue;
                }
                let style = CellStyle {
                    fg: colors.map(cell.fgcolor(), true),
                    bg: colors.map(cell.bgcolor(), false),
                    bold: cell.bold(),
                    italic: cell.italic(),
                    underline: cell.underline(),
                    inverse: cell.inverse() != is_selected(selection, row, col),
                };
                if current != Some(style) {
                    if let Some(previous) = current {
                        previous.apply(&mut out)?;
                        write!(out, "{}", line)?;
                        line.clear();
                    }
                    current = Some(style);
                }
                if cell.has_contents() {
                    line.push_str(&cell.contents());
                } else {
                    line.push(' ');
                }
            }
            if let Some(style) = current {
                style.apply(&mut out)?;
                write!(out, "{}", line)?;
                line.clear();
            }
            queue!(out, ResetColor, SetAttribute(Attribute::Reset), Clear(ClearType::UntilNewLine))?;
        }

        self.render_status(&mut out, status, rows, cols, &colors)?;

        if !screen.hide_cursor() {
            let (cursor_row, cursor_col) = screen.cursor_position();
            queue!(out, MoveTo(cursor_col, cursor_row), Show)?;
        }

        // End synchronized update
        write!(out, "\x1b[?2026l")?;
        out.flush()
    }

    fn render_status<W: Write>(
        &self,
        out: &mut W,
        status: &StatusLine,
        row: u16,
        cols: u16,
        colors: &PaletteColors,
    ) -> io::Result<()> {
        let bar_bg = colors.ansi[4].unwrap_or(Color::DarkBlue);
        let bar_fg = colors.background.unwrap_or(Color::White);
        queue!(
            out,
            MoveTo(0, row),
            SetAttribute(Attribute::Reset),
            SetBackgroundColor(bar_bg),
            SetForegroundColor(bar_fg),
            Clear(ClearType::UntilNewLine)
        )?;

        let mut width = cols as usize;
        if status.prefix {
            let marker = " ^B ";
            queue!(out, SetAttribute(Attribute::Bold))?;
            write!(out, "{}", marker)?;
            queue!(out, SetAttribute(Attribute::NormalIntensity))?;
            width = width.saturating_sub(marker.width());
        }
        for (label, active) in fit_labels(&status.tabs, width) {
            if active {
                queue!(out, SetAttribute(Attribute::Reverse))?;
            }
            write!(out, "{}", label)?;
            if active {
                queue!(out, SetAttribute(Attribute::NoReverse))?;
            }
            width = width.saturating_sub(label.width());
        }
        if let Some(message) = &status.message {
            if width > 1 {
                write!(out, " {}", truncate_to_width(message, width - 1))?;
            }
        }
        queue!(out, ResetColor, SetAttribute(Attribute::Reset))
    }

    /// Get terminal size
    pub fn size() -> io::Result<(u16, u16)> {
        terminal::size()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

struct HubState {
    size: SurfaceSize,
    observers: Vec<(u64, Sender<SurfaceEvent>)>,
    next_key: u64,
}

/// Fans host terminal events out to every [`ScreenSurface`]
#[derive(Clone)]
pub struct SurfaceHub {
    inner: Rc<RefCell<HubState>>,
}

impl SurfaceHub {
    /// `size` is the area available to terminals, in cells
    pub fn new(size: SurfaceSize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(HubState {
                size,
                observers: Vec::new(),
                next_key: 0,
            })),
        }
    }

    /// Host terminal size, minus the tab bar
    pub fn content_size(cols: u16, rows: u16) -> SurfaceSize {
        SurfaceSize::new(cols as f32, rows.saturating_sub(STATUS_ROWS) as f32)
    }

    pub fn surface(&self) -> ScreenSurface {
        let mut state = self.inner.borrow_mut();
        let key = state.next_key;
        state.next_key += 1;
        ScreenSurface {
            key,
            hub: self.clone(),
        }
    }

    pub fn resize(&self, size: SurfaceSize) {
        self.inner.borrow_mut().size = size;
        self.broadcast(SurfaceEvent::Resized(size));
    }

    pub fn theme_changed(&self) {
        self.broadcast(SurfaceEvent::ThemeChanged);
    }

    /// Focus the surface identified by `key` and blur every other one
    pub fn focus(&self, key: u64) {
        self.inner.borrow_mut().observers.retain(|(k, tx)| {
            let event = if *k == key {
                SurfaceEvent::Focused
            } else {
                SurfaceEvent::Blurred
            };
            tx.send(event).is_ok()
        });
    }

    /// The host terminal lost focus
    pub fn blur_all(&self) {
        self.broadcast(SurfaceEvent::Blurred);
    }

    fn broadcast(&self, event: SurfaceEvent) {
        self.inner
            .borrow_mut()
            .observers
            .retain(|(_, tx)| tx.send(event).is_ok());
    }
}

/// The host terminal as seen by one view. Cells are one unit wide and tall.
pub struct ScreenSurface {
    key: u64,
    hub: SurfaceHub,
}

impl ScreenSurface {
    pub fn key(&self) -> u64 {
        self.key
    }
}

impl Surface for ScreenSurface {
    fn size(&self) -> SurfaceSize {
        self.hub.inner.borrow().size
    }

    fn cell_size(&self) -> CellSize {
        CellSize::default()
    }

    fn observe(&mut self) -> Receiver<SurfaceEvent> {
        let (tx, rx) = mpsc::channel();
        let mut state = self.hub.inner.borrow_mut();
        // One observer per surface
        state.observers.retain(|(k, _)| *k != self.key);
        state.observers.push((self.key, tx));
        rx
    }
}
