//! Color themes for the TUI.
//!
//! The Linkshelf theme uses RGB when the terminal advertises true color and
//! the 256-color palette otherwise. The terminal theme sticks to ANSI colors.

use ratatui::style::Color;
use std::env;

fn supports_true_color() -> bool {
    let advertises = |var: &str, needles: &[&str]| {
        env::var(var)
            .map(|v| {
                let v = v.to_lowercase();
                needles.iter().any(|n| v.contains(n))
            })
            .unwrap_or(false)
    };
    advertises("COLORTERM", &["truecolor", "24bit"])
        || advertises("TERM", &["truecolor", "24bit", "direct"])
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThemeMode {
    #[default]
    Shelf,
    /// Terminal-adaptive ANSI colors
    Terminal,
}

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub bg: Color,
    pub bg_panel: Color,
    pub bg_selection: Color,

    pub border: Color,
    pub border_active: Color,

    pub text: Color,
    pub text_secondary: Color,
    pub text_muted: Color,

    pub accent: Color,
    pub link: Color,

    pub success: Color,
    pub error: Color,
}

impl Theme {
    pub fn shelf() -> Self {
        if supports_true_color() {
            Self::shelf_rgb()
        } else {
            Self::shelf_256()
        }
    }

    fn shelf_rgb() -> Self {
        Self {
            bg: Color::Rgb(0x12, 0x10, 0x0E),
            bg_panel: Color::Rgb(0x1D, 0x1A, 0x17),
            bg_selection: Color::Rgb(0x3A, 0x33, 0x2B),

            border: Color::Rgb(0x57, 0x4E, 0x44),
            border_active: Color::Rgb(0xE0, 0x9F, 0x3E),

            text: Color::Rgb(0xF5, 0xF0, 0xE8),
            text_secondary: Color::Rgb(0xD6, 0xCE, 0xC3),
            text_muted: Color::Rgb(0x9C, 0x92, 0x86),

            accent: Color::Rgb(0xE0, 0x9F, 0x3E),
            link: Color::Rgb(0x8E, 0xB2, 0xEB),

            success: Color::Rgb(0x9F, 0xD8, 0x8A),
            error: Color::Rgb(0xE8, 0x8E, 0x8E),
        }
    }

    fn shelf_256() -> Self {
        Self {
            bg: Color::Indexed(233),
            bg_panel: Color::Indexed(235),
            bg_selection: Color::Indexed(238),

            border: Color::Indexed(241),
            border_active: Color::Indexed(214),

            text: Color::Indexed(255),
            text_secondary: Color::Indexed(252),
            text_muted: Color::Indexed(245),

            accent: Color::Indexed(214),
            link: Color::Indexed(111),

            success: Color::Indexed(150),
            error: Color::Indexed(210),
        }
    }

    pub fn terminal() -> Self {
        Self {
            bg: Color::Reset,
            bg_panel: Color::Reset,
            bg_selection: Color::DarkGray,

            border: Color::DarkGray,
            border_active: Color::Yellow,

            text: Color::Reset,
            text_secondary: Color::Gray,
            text_muted: Color::DarkGray,

            accent: Color::Yellow,
            link: Color::Blue,

            success: Color::Green,
            error: Color::Red,
        }
    }

    pub fn from_mode(mode: ThemeMode) -> Self {
        match mode {
            ThemeMode::Shelf => Self::shelf(),
            ThemeMode::Terminal => Self::terminal(),
        }
    }
}
