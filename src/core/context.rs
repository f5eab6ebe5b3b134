//! Rendering context for a session
//!
//! Geometry and color capability a program is initialized with. Built once
//! per session and never mutated afterwards.

use std::env;

use ratatui::style::Color;

/// Foreground used for remote sessions (ANSI white, palette index 7)
pub const REMOTE_FOREGROUND: Color = Color::Gray;

/// Color capability tier of the client terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorProfile {
    /// No color support
    Ascii,
    /// 16 base colors
    Ansi,
    /// xterm 256 color palette
    Ansi256,
    /// 24-bit color
    TrueColor,
}

impl ColorProfile {
    /// Detect the profile of the local terminal from the environment
    pub fn detect() -> Self {
        Self::from_env(
            env::var("NO_COLOR").ok().as_deref(),
            env::var("TERM").ok().as_deref(),
            env::var("COLORTERM").ok().as_deref(),
        )
    }

    fn from_env(no_color: Option<&str>, term: Option<&str>, colorterm: Option<&str>) -> Self {
        if no_color.is_some_and(|v| !v.is_empty()) {
            return ColorProfile::Ascii;
        }

        let term = match term {
            Some(t) if !t.is_empty() && t != "dumb" => t,
            _ => return ColorProfile::Ascii,
        };

        match colorterm.map(str::to_ascii_lowercase).as_deref() {
            Some("truecolor") | Some("24bit") => return ColorProfile::TrueColor,
            _ => {}
        }

        if term.contains("256color") {
            ColorProfile::Ansi256
        } else {
            ColorProfile::Ansi
        }
    }

    /// Downsample a color to what this profile can display
    pub fn adapt(self, color: Color) -> Color {
        match (self, color) {
            (_, Color::Reset) => Color::Reset,
            (ColorProfile::Ascii, _) => Color::Reset,
            (ColorProfile::TrueColor, c) => c,
            (ColorProfile::Ansi256, Color::Rgb(r, g, b)) => Color::Indexed(rgb_to_256(r, g, b)),
            (ColorProfile::Ansi256, c) => c,
            (ColorProfile::Ansi, Color::Rgb(r, g, b)) => ansi16(nearest_ansi16(r, g, b)),
            (ColorProfile::Ansi, Color::Indexed(i)) if i >= 16 => {
                let (r, g, b) = indexed_to_rgb(i);
                ansi16(nearest_ansi16(r, g, b))
            }
            (ColorProfile::Ansi, Color::Indexed(i)) => ansi16(i),
            (ColorProfile::Ansi, c) => c,
        }
    }
}

/// Immutable geometry/color parameters used to initialize a session program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderingContext {
    pub profile: ColorProfile,
    pub foreground: Color,
    pub width: u16,
    pub height: u16,
}

impl RenderingContext {
    pub fn new(profile: ColorProfile, foreground: Color, width: u16, height: u16) -> Self {
        Self {
            profile,
            foreground,
            width,
            height,
        }
    }

    /// Context for a remote session.
    ///
    /// Remote clients cannot be probed past their pty request, so the
    /// profile is pinned to 256 colors with a white foreground.
    pub fn remote(width: u16, height: u16) -> Self {
        Self::new(ColorProfile::Ansi256, REMOTE_FOREGROUND, width, height)
    }

    /// Context for the local terminal
    pub fn local(width: u16, height: u16) -> Self {
        Self::new(ColorProfile::detect(), Color::Reset, width, height)
    }

    /// Color adapted to this context's profile
    pub fn color(&self, color: Color) -> Color {
        self.profile.adapt(color)
    }

    /// Foreground adapted to this context's profile
    pub fn fg(&self) -> Color {
        self.profile.adapt(self.foreground)
    }
}

// xterm 256 color cube steps
const CUBE_STEPS: [u8; 6] = [0, 95, 135, 175, 215, 255];

// Standard VGA-ish values for the 16 base colors
const ANSI16: [(u8, u8, u8); 16] = [
    (0, 0, 0),
    (128, 0, 0),
    (0, 128, 0),
    (128, 128, 0),
    (0, 0, 128),
    (128, 0, 128),
    (0, 128, 128),
    (192, 192, 192),
    (128, 128, 128),
    (255, 0, 0),
    (0, 255, 0),
    (255, 255, 0),
    (0, 0, 255),
    (255, 0, 255),
    (0, 255, 255),
    (255, 255, 255),
];

fn cube_index(v: u8) -> u8 {
    if v < 48 {
        0
    } else if v < 115 {
        1
    } else {
        (v - 35) / 40
    }
}

fn distance(a: (u8, u8, u8), b: (u8, u8, u8)) -> u32 {
    let dr = a.0 as i32 - b.0 as i32;
    let dg = a.1 as i32 - b.1 as i32;
    let db = a.2 as i32 - b.2 as i32;
    (dr * dr + dg * dg + db * db) as u32
}

/// Map an RGB color to the closest xterm 256 palette entry (cube or gray ramp)
fn rgb_to_256(r: u8, g: u8, b: u8) -> u8 {
    let (ri, gi, bi) = (cube_index(r), cube_index(g), cube_index(b));
    let cube = (
        CUBE_STEPS[ri as usize],
        CUBE_STEPS[gi as usize],
        CUBE_STEPS[bi as usize],
    );
    let cube_idx = 16 + 36 * ri + 6 * gi + bi;

    let avg = ((r as u32 + g as u32 + b as u32) / 3) as u8;
    let gray_i = if avg > 238 { 23 } else { avg.saturating_sub(3) / 10 };
    let gray_v = 8 + 10 * gray_i;
    let gray_idx = 232 + gray_i;

    if distance((r, g, b), (gray_v, gray_v, gray_v)) < distance((r, g, b), cube) {
        gray_idx
    } else {
        cube_idx
    }
}

fn indexed_to_rgb(i: u8) -> (u8, u8, u8) {
    match i {
        0..=15 => ANSI16[i as usize],
        16..=231 => {
            let n = i - 16;
            (
                CUBE_STEPS[(n / 36) as usize],
                CUBE_STEPS[((n / 6) % 6) as usize],
                CUBE_STEPS[(n % 6) as usize],
            )
        }
        _ => {
            let v = 8 + 10 * (i - 232);
            (v, v, v)
        }
    }
}

fn nearest_ansi16(r: u8, g: u8, b: u8) -> u8 {
    let mut best = 0;
    let mut best_dist = u32::MAX;
    for (i, c) in ANSI16.iter().enumerate() {
        let d = distance((r, g, b), *c);
        if d < best_dist {
            best = i as u8;
            best_dist = d;
        }
    }
    best
}

fn ansi16(i: u8) -> Color {
    match i {
        0 => Color::Black,
        1 => Color::Red,
        2 => Color::Green,
        3 => Color::Yellow,
        4 => Color::Blue,
        5 => Color::Magenta,
        6 => Color::Cyan,
        7 => Color::Gray,
        8 => Color::DarkGray,
        9 => Color::LightRed,
        10 => Color::LightGreen,
        11 => Color::LightYellow,
        12 => Color::LightBlue,
        13 => Color::LightMagenta,
        14 => Color::LightCyan,
        _ => Color::White,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_context_is_pinned() {
        let ctx = RenderingContext::remote(80, 24);
        assert_eq!(ctx.width, 80);
        assert_eq!(ctx.height, 24);
        assert_eq!(ctx.profile, ColorProfile::Ansi256);
        assert_eq!(ctx.foreground, REMOTE_FOREGROUND);
    }

    #[test]
    fn test_profile_detection() {
        assert_eq!(ColorProfile::from_env(None, None, None), ColorProfile::Ascii);
        assert_eq!(ColorProfile::from_env(None, Some("dumb"), None), ColorProfile::Ascii);
        assert_eq!(
            ColorProfile::from_env(Some("1"), Some("xterm-256color"), None),
            ColorProfile::Ascii
        );
        assert_eq!(ColorProfile::from_env(None, Some("xterm"), None), ColorProfile::Ansi);
        assert_eq!(
            ColorProfile::from_env(None, Some("xterm-256color"), None),
            ColorProfile::Ansi256
        );
        assert_eq!(
            ColorProfile::from_env(None, Some("xterm"), Some("truecolor")),
            ColorProfile::TrueColor
        );
    }

    #[test]
    fn test_adapt_ascii_strips_color() {
        assert_eq!(ColorProfile::Ascii.adapt(Color::Red), Color::Reset);
        assert_eq!(ColorProfile::Ascii.adapt(Color::Rgb(1, 2, 3)), Color::Reset);
    }

    #[test]
    fn test_adapt_256() {
        assert_eq!(ColorProfile::Ansi256.adapt(Color::Rgb(255, 0, 0)), Color::Indexed(196));
        assert_eq!(ColorProfile::Ansi256.adapt(Color::Rgb(0, 0, 0)), Color::Indexed(16));
        // Mid gray lands on the gray ramp
        assert_eq!(ColorProfile::Ansi256.adapt(Color::Rgb(128, 128, 128)), Color::Indexed(244));
        assert_eq!(ColorProfile::Ansi256.adapt(Color::Cyan), Color::Cyan);
    }

    #[test]
    fn test_adapt_16() {
        assert_eq!(ColorProfile::Ansi.adapt(Color::Rgb(250, 10, 10)), Color::LightRed);
        assert_eq!(ColorProfile::Ansi.adapt(Color::Indexed(196)), Color::LightRed);
        assert_eq!(ColorProfile::Ansi.adapt(Color::Indexed(2)), Color::Green);
        assert_eq!(ColorProfile::TrueColor.adapt(Color::Rgb(1, 2, 3)), Color::Rgb(1, 2, 3));
    }
}
