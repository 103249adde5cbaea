//! Key mapping for terminal input
//!
//! Converts crossterm key events into the bytes a shell expects, and decodes
//! the host's prefix key bindings (`Ctrl+B` then a command key).

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::workspace::Command;

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// Input modes requested by the program running in the terminal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputModes {
    /// DECCKM: arrows send `ESC O x`
    pub application_cursor: bool,
    /// Wrap pasted text in `ESC [200~` / `ESC [201~`
    pub bracketed_paste: bool,
}

impl InputModes {
    pub fn from_screen(screen: &vt100::Screen) -> Self {
        Self {
            application_cursor: screen.application_cursor(),
            bracketed_paste: screen.bracketed_paste(),
        }
    }
}

/// What a key pressed after the prefix asks the host to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixAction {
    Workspace(Command),
    /// Copy the visible screen
    CopyScreen,
    CycleTheme,
    /// Save the workspace and quit, leaving nothing running
    Detach,
    /// Prefix pressed twice: send it to the shell
    SendPrefix,
}

/// Key mapper for converting key events to bytes
pub struct KeyMapper;

impl KeyMapper {
    /// Whether `event` is the prefix key (`Ctrl+B`)
    pub fn is_prefix(event: &KeyEvent) -> bool {
        event.code == KeyCode::Char('b') && event.modifiers == KeyModifiers::CONTROL
    }

    /// Decode the key pressed after the prefix
    pub fn prefix_action(event: &KeyEvent) -> Option<PrefixAction> {
        if Self::is_prefix(event) {
            return Some(PrefixAction::SendPrefix);
        }
        let KeyCode::Char(ch) = event.code else {
            return None;
        };
        let action = match ch {
            'c' => PrefixAction::Workspace(Command::Open),
            'n' => PrefixAction::Workspace(Command::Next),
            'p' => PrefixAction::Workspace(Command::Previous),
            'x' => PrefixAction::Workspace(Command::Close),
            'k' => PrefixAction::Workspace(Command::Clear),
            ']' => PrefixAction::Workspace(Command::Paste),
            'y' => PrefixAction::CopyScreen,
            't' => PrefixAction::CycleTheme,
            'd' => PrefixAction::Detach,
            _ => return None,
        };
        Some(action)
    }

    /// Map a crossterm KeyEvent to bytes for the PTY
    pub fn map(event: &KeyEvent, modes: InputModes) -> Option<Vec<u8>> {
        let mods = Modifiers::from(event.modifiers);

        match event.code {
            KeyCode::Char(ch) => Some(Self::map_char(ch, mods)),
            KeyCode::Enter => Some(vec![0x0D]),
            KeyCode::Backspace => {
                if mods.contains(Modifiers::ALT) {
                    Some(vec![0x1B, 0x7F])
                } else {
                    Some(vec![0x7F])
                }
            }
            KeyCode::Tab => Some(vec![0x09]),
            KeyCode::BackTab => Some(b"\x1b[Z".to_vec()),
            KeyCode::Esc => Some(vec![0x1B]),

            KeyCode::Up => Some(Self::cursor_key(b'A', mods, modes)),
            KeyCode::Down => Some(Self::cursor_key(b'B', mods, modes)),
            KeyCode::Right => Some(Self::cursor_key(b'C', mods, modes)),
            KeyCode::Left => Some(Self::cursor_key(b'D', mods, modes)),
            KeyCode::Home => Some(Self::cursor_key(b'H', mods, modes)),
            KeyCode::End => Some(Self::cursor_key(b'F', mods, modes)),

            KeyCode::PageUp => Some(Self::tilde_key(5, mods)),
            KeyCode::PageDown => Some(Self::tilde_key(6, mods)),
            KeyCode::Insert => Some(Self::tilde_key(2, mods)),
            KeyCode::Delete => Some(Self::tilde_key(3, mods)),

            KeyCode::F(n) => Self::function_key(n, mods),

            _ => None,
        }
    }

    /// Bytes for pasted text
    pub fn paste(text: &str, modes: InputModes) -> Vec<u8> {
        if !modes.bracketed_paste {
            return text.as_bytes().to_vec();
        }
        let mut bytes = Vec::with_capacity(text.len() + 12);
        bytes.extend_from_slice(b"\x1b[200~");
        bytes.extend_from_slice(text.as_bytes());
        bytes.extend_from_slice(b"\x1b[201~");
        bytes
    }

    fn map_char(ch: char, mods: Modifiers) -> Vec<u8> {
        let ctrl = mods.contains(Modifiers::CTRL);
        let alt = mods.contains(Modifiers::ALT);

        if ctrl {
            if let Some(code) = Self::control_code(ch) {
                return if alt { vec![0x1B, code] } else { vec![code] };
            }
        }

        let mut bytes = Vec::with_capacity(5);
        if alt {
            bytes.push(0x1B);
        }
        let mut utf8 = [0u8; 4];
        bytes.extend_from_slice(ch.encode_utf8(&mut utf8).as_bytes());
        bytes
    }

    /// C0 code for `Ctrl+ch`
    fn control_code(ch: char) -> Option<u8> {
        match ch {
            'a'..='z' => Some(ch as u8 - b'a' + 1),
            'A'..='Z' => Some(ch as u8 - b'A' + 1),
            '@' | '`' | ' ' | '2' => Some(0x00),
            '[' | '3' => Some(0x1B),
            '\\' | '4' => Some(0x1C),
            ']' | '5' => Some(0x1D),
            '^' | '~' | '6' => Some(0x1E),
            '_' | '?' | '7' => Some(0x1F),
            _ => None,
        }
    }

    /// Arrows, Home and End
    fn cursor_key(key: u8, mods: Modifiers, modes: InputModes) -> Vec<u8> {
        if !mods.is_empty() {
            format!("\x1b[1;{}{}", Self::modifier_code(mods), key as char).into_bytes()
        } else if modes.application_cursor {
            vec![0x1B, b'O', key]
        } else {
            vec![0x1B, b'[', key]
        }
    }

    /// PageUp, PageDown, Insert, Delete
    fn tilde_key(code: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            format!("\x1b[{}~", code).into_bytes()
        } else {
            format!("\x1b[{};{}~", code, Self::modifier_code(mods)).into_bytes()
        }
    }

    fn function_key(n: u8, mods: Modifiers) -> Option<Vec<u8>> {
        // F1-F4 use SS3 finals, the rest tilde codes
        let ss3 = match n {
            1 => Some(b'P'),
            2 => Some(b'Q'),
            3 => Some(b'R'),
            4 => Some(b'S'),
            _ => None,
        };
        if let Some(key) = ss3 {
            return Some(if mods.is_empty() {
                vec![0x1B, b'O', key]
            } else {
                format!("\x1b[1;{}{}", Self::modifier_code(mods), key as char).into_bytes()
            });
        }
        let code = match n {
            5 => 15,
            6 => 17,
            7 => 18,
            8 => 19,
            9 => 20,
            10 => 21,
            11 => 23,
            12 => 24,
            _ => return None,
        };
        Some(Self::tilde_key(code, mods))
    }

    /// xterm modifier parameter
    fn modifier_code(mods: Modifiers) -> u8 {
        1 + if mods.contains(Modifiers::SHIFT) { 1 } else { 0 }
            + if mods.contains(Modifiers::ALT) { 2 } else { 0 }
            + if mods.contains(Modifiers::CTRL) { 4 } else { 0 }
    }
}
