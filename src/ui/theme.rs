//! Color schemes and theme matching
//!
//! The view asks a [`ThemeMatcher`] for a palette whenever it attaches or the
//! theme changes. [`SchemeMatcher`] serves the built-in schemes:
//!
//! - `default` - Classic xterm colors
//! - `solarized-dark` / `solarized-light` - Ethan Schoonover's Solarized
//! - `monokai` - Sublime Text inspired
//! - `nord` - Arctic, bluish color palette
//! - `dracula` - Dark theme with vibrant colors
//! - `gruvbox-dark` - Retro groove colors
//! - `tokyo-night` - VS Code Tokyo Night theme

use crate::core::emulator::Palette;

/// Palette keys, in the order a scheme stores them
pub const COLOR_KEYS: [&str; 20] = [
    "foreground",
    "background",
    "cursor",
    "cursorAccent",
    "black",
    "red",
    "green",
    "yellow",
    "blue",
    "magenta",
    "cyan",
    "white",
    "brightBlack",
    "brightRed",
    "brightGreen",
    "brightYellow",
    "brightBlue",
    "brightMagenta",
    "brightCyan",
    "brightWhite",
];

/// Supplies the palette applied to terminal buffers
pub trait ThemeMatcher {
    fn compute_palette(&self) -> Palette;
}

/// Color definition (RGB)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Color scheme definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorScheme {
    pub name: &'static str,
    pub foreground: Color,
    pub background: Color,
    pub cursor: Color,
    pub cursor_accent: Color,
    /// black, red, green, yellow, blue, magenta, cyan, white, then the bright variants
    pub ansi: [Color; 16],
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self::default_scheme()
    }
}

const fn c(r: u8, g: u8, b: u8) -> Color {
    Color::new(r, g, b)
}

impl ColorScheme {
    /// Default color scheme
    pub fn default_scheme() -> Self {
        Self {
            name: "default",
            foreground: c(229, 229, 229),
            background: c(0, 0, 0),
            cursor: c(255, 255, 255),
            cursor_accent: c(0, 0, 0),
            ansi: [
                c(0, 0, 0),
                c(205, 0, 0),
                c(0, 205, 0),
                c(205, 205, 0),
                c(0, 0, 238),
                c(205, 0, 205),
                c(0, 205, 205),
                c(229, 229, 229),
                c(127, 127, 127),
                c(255, 0, 0),
                c(0, 255, 0),
                c(255, 255, 0),
                c(92, 92, 255),
                c(255, 0, 255),
                c(0, 255, 255),
                c(255, 255, 255),
            ],
        }
    }

    const SOLARIZED_ANSI: [Color; 16] = [
        c(7, 54, 66),
        c(220, 50, 47),
        c(133, 153, 0),
        c(181, 137, 0),
        c(38, 139, 210),
        c(211, 54, 130),
        c(42, 161, 152),
        c(238, 232, 213),
        c(0, 43, 54),
        c(203, 75, 22),
        c(88, 110, 117),
        c(101, 123, 131),
        c(131, 148, 150),
        c(108, 113, 196),
        c(147, 161, 161),
        c(253, 246, 227),
    ];

    /// Solarized Dark scheme
    pub fn solarized_dark() -> Self {
        Self {
            name: "solarized-dark",
            foreground: c(131, 148, 150),
            background: c(0, 43, 54),
            cursor: c(147, 161, 161),
            cursor_accent: c(0, 43, 54),
            ansi: Self::SOLARIZED_ANSI,
        }
    }

    /// Solarized Light scheme
    pub fn solarized_light() -> Self {
        Self {
            name: "solarized-light",
            foreground: c(101, 123, 131),
            background: c(253, 246, 227),
            cursor: c(88, 110, 117),
            cursor_accent: c(253, 246, 227),
            ansi: Self::SOLARIZED_ANSI,
        }
    }

    /// Monokai scheme
    pub fn monokai() -> Self {
        Self {
            name: "monokai",
            foreground: c(248, 248, 242),
            background: c(39, 40, 34),
            cursor: c(248, 248, 240),
            cursor_accent: c(39, 40, 34),
            ansi: [
                c(39, 40, 34),
                c(249, 38, 114),
                c(166, 226, 46),
                c(244, 191, 117),
                c(102, 217, 239),
                c(174, 129, 255),
                c(161, 239, 228),
                c(248, 248, 242),
                c(117, 113, 94),
                c(249, 38, 114),
                c(166, 226, 46),
                c(244, 191, 117),
                c(102, 217, 239),
                c(174, 129, 255),
                c(161, 239, 228),
                c(249, 248, 245),
            ],
        }
    }

    /// Nord scheme
    pub fn nord() -> Self {
        Self {
            name: "nord",
            foreground: c(216, 222, 233),
            background: c(46, 52, 64),
            cursor: c(216, 222, 233),
            cursor_accent: c(46, 52, 64),
            ansi: [
                c(59, 66, 82),
                c(191, 97, 106),
                c(163, 190, 140),
                c(235, 203, 139),
                c(129, 161, 193),
                c(180, 142, 173),
                c(136, 192, 208),
                c(229, 233, 240),
                c(76, 86, 106),
                c(191, 97, 106),
                c(163, 190, 140),
                c(235, 203, 139),
                c(129, 161, 193),
                c(180, 142, 173),
                c(143, 188, 187),
                c(236, 239, 244),
            ],
        }
    }

    /// Dracula scheme
    pub fn dracula() -> Self {
        Self {
            name: "dracula",
            foreground: c(248, 248, 242),
            background: c(40, 42, 54),
            cursor: c(248, 248, 242),
            cursor_accent: c(40, 42, 54),
            ansi: [
                c(33, 34, 44),
                c(255, 85, 85),
                c(80, 250, 123),
                c(241, 250, 140),
                c(189, 147, 249),
                c(255, 121, 198),
                c(139, 233, 253),
                c(248, 248, 242),
                c(98, 114, 164),
                c(255, 110, 110),
                c(105, 255, 148),
                c(255, 255, 165),
                c(214, 172, 255),
                c(255, 146, 223),
                c(164, 255, 255),
                c(255, 255, 255),
            ],
        }
    }

    /// Gruvbox Dark scheme
    pub fn gruvbox_dark() -> Self {
        Self {
            name: "gruvbox-dark",
            foreground: c(235, 219, 178),
            background: c(40, 40, 40),
            cursor: c(235, 219, 178),
            cursor_accent: c(40, 40, 40),
            ansi: [
                c(40, 40, 40),
                c(204, 36, 29),
                c(152, 151, 26),
                c(215, 153, 33),
                c(69, 133, 136),
                c(177, 98, 134),
                c(104, 157, 106),
                c(168, 153, 132),
                c(146, 131, 116),
                c(251, 73, 52),
                c(184, 187, 38),
                c(250, 189, 47),
                c(131, 165, 152),
                c(211, 134, 155),
                c(142, 192, 124),
                c(235, 219, 178),
            ],
        }
    }

    /// Tokyo Night scheme
    pub fn tokyo_night() -> Self {
        Self {
            name: "tokyo-night",
            foreground: c(192, 202, 245),
            background: c(26, 27, 38),
            cursor: c(192, 202, 245),
            cursor_accent: c(26, 27, 38),
            ansi: [
                c(21, 22, 30),
                c(247, 118, 142),
                c(158, 206, 106),
                c(224, 175, 104),
                c(122, 162, 247),
                c(187, 154, 247),
                c(125, 207, 255),
                c(169, 177, 214),
                c(65, 72, 104),
                c(247, 118, 142),
                c(158, 206, 106),
                c(224, 175, 104),
                c(122, 162, 247),
                c(187, 154, 247),
                c(125, 207, 255),
                c(192, 202, 245),
            ],
        }
    }

    /// Get scheme by name
    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "solarized-dark" | "solarized_dark" => Self::solarized_dark(),
            "solarized-light" | "solarized_light" => Self::solarized_light(),
            "monokai" => Self::monokai(),
            "nord" => Self::nord(),
            "dracula" => Self::dracula(),
            "gruvbox-dark" | "gruvbox_dark" | "gruvbox" => Self::gruvbox_dark(),
            "tokyo-night" | "tokyo_night" | "tokyonight" => Self::tokyo_night(),
            _ => Self::default_scheme(),
        }
    }

    /// List available schemes
    pub fn list() -> Vec<&'static str> {
        vec![
            "default",
            "solarized-dark",
            "solarized-light",
            "monokai",
            "nord",
            "dracula",
            "gruvbox-dark",
            "tokyo-night",
        ]
    }

    /// The scheme after `name` in [`ColorScheme::list`], wrapping around
    pub fn next_name(name: &str) -> &'static str {
        let list = Self::list();
        let current = Self::by_name(name).name;
        let index = list.iter().position(|n| *n == current).unwrap_or(0);
        list[(index + 1) % list.len()]
    }

    pub fn colors(&self) -> [Color; 20] {
        let mut colors = [self.foreground; 20];
        colors[1] = self.background;
        colors[2] = self.cursor;
        colors[3] = self.cursor_accent;
        colors[4..].copy_from_slice(&self.ansi);
        colors
    }

    pub fn to_palette(&self) -> Palette {
        COLOR_KEYS
            .iter()
            .zip(self.colors())
            .map(|(key, color)| (key.to_string(), color.to_hex()))
            .collect()
    }
}

/// Theme matcher backed by a built-in scheme
#[derive(Debug, Clone, Default)]
pub struct SchemeMatcher {
    scheme: ColorScheme,
}

impl SchemeMatcher {
    pub fn by_name(name: &str) -> Self {
        Self {
            scheme: ColorScheme::by_name(name),
        }
    }

    pub fn scheme(&self) -> &ColorScheme {
        &self.scheme
    }
}

impl ThemeMatcher for SchemeMatcher {
    fn compute_palette(&self) -> Palette {
        self.scheme.to_palette()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_has_every_key() {
        for name in ColorScheme::list() {
            let palette = SchemeMatcher::by_name(name).compute_palette();
            assert_eq!(palette.len(), COLOR_KEYS.len(), "{name}");
            for key in COLOR_KEYS {
                let value = &palette[key];
                assert!(value.starts_with('#') && value.len() == 7, "{name}.{key} = {value}");
            }
        }
    }

    #[test]
    fn test_palette_values() {
        let palette = SchemeMatcher::by_name("solarized-dark").compute_palette();
        assert_eq!(palette["background"], "#002b36");
        assert_eq!(palette["blue"], "#268bd2");
        assert_eq!(palette["brightWhite"], "#fdf6e3");
    }

    #[test]
    fn test_aliases_and_unknown_names() {
        assert_eq!(ColorScheme::by_name("Gruvbox").name, "gruvbox-dark");
        assert_eq!(ColorScheme::by_name("tokyo_night").name, "tokyo-night");
        assert_eq!(ColorScheme::by_name("no-such-scheme").name, "default");
    }

    #[test]
    fn test_next_name_wraps() {
        assert_eq!(ColorScheme::next_name("default"), "solarized-dark");
        assert_eq!(ColorScheme::next_name("tokyo-night"), "default");
        assert_eq!(ColorScheme::next_name("whatever"), "solarized-dark");
    }
}
