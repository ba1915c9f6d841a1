mod interpreter;

pub use interpreter::interpret;

/// Resolved color as the host theme produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

/// Collaborator interface: maps the 16 base ANSI color slots to the
/// active theme. Provided by the host, never implemented here.
pub trait ThemeColors {
    fn color(&self, index: u8) -> Rgba;
}

/// Collaborator interface: turns file paths and URLs in span text into
/// renderable links. The view layer calls this per span; the engine
/// only carries the seam.
pub trait LinkDetector {
    fn linkify(&self, text: &str) -> String;
}

/// A span color is either one of the 16 theme slots (resolved late,
/// so theme switches re-color old output) or a literal RGB value
/// produced by an 8-bit or 24-bit SGR sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanColor {
    Theme(u8),
    Rgb(Rgba),
}

impl SpanColor {
    pub fn resolve(&self, theme: &dyn ThemeColors) -> Rgba {
        match *self {
            SpanColor::Theme(index) => theme.color(index),
            SpanColor::Rgb(rgba) => rgba,
        }
    }
}

/// Boolean style tags toggled by SGR codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StyleClasses {
    pub bold: bool,
    pub dim: bool,
    pub italic: bool,
    pub underline: bool,
    pub slow_blink: bool,
    pub fast_blink: bool,
    pub hidden: bool,
    pub strikethrough: bool,
    pub double_underline: bool,
    pub overline: bool,
}

impl StyleClasses {
    pub fn is_plain(&self) -> bool {
        *self == StyleClasses::default()
    }
}

/// One run of text with a stable style snapshot. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    pub text: String,
    pub classes: StyleClasses,
    pub foreground: Option<SpanColor>,
    pub background: Option<SpanColor>,
    pub underline_color: Option<SpanColor>,
}

impl StyledSpan {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            classes: StyleClasses::default(),
            foreground: None,
            background: None,
            underline_color: None,
        }
    }

    pub fn resolved_foreground(&self, theme: &dyn ThemeColors) -> Option<Rgba> {
        self.foreground.map(|c| c.resolve(theme))
    }

    pub fn resolved_background(&self, theme: &dyn ThemeColors) -> Option<Rgba> {
        self.background.map(|c| c.resolve(theme))
    }
}
