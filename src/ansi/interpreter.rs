use super::{Rgba, SpanColor, StyleClasses, StyledSpan};

/// Characters that legally terminate a CSI sequence for our purposes.
/// Only `m` (SGR) changes style state; the rest are cursor/erase
/// controls that we consume and drop so they never pollute the text.
const SEQUENCE_TERMINATORS: &[char] = &[
    'A', 'B', 'C', 'D', 'H', 'I', 'J', 'K', 'f', 'h', 'm', 'p', 's', 'u',
];

/// Mutable style state threaded through one `interpret` call.
/// Nothing survives between calls.
#[derive(Default)]
struct SgrState {
    classes: StyleClasses,
    foreground: Option<SpanColor>,
    background: Option<SpanColor>,
    underline_color: Option<SpanColor>,
    reversed: bool,
}

impl SgrState {
    fn reset(&mut self) {
        *self = SgrState::default();
    }

    fn snapshot(&self, text: String) -> StyledSpan {
        StyledSpan {
            text,
            classes: self.classes,
            foreground: self.foreground,
            background: self.background,
            underline_color: self.underline_color,
        }
    }
}

/// Interpret ANSI escape sequences in `text`, producing styled spans in
/// input order. Pure: repeated calls with the same input give the same
/// output. Unterminated sequences at end of input are re-emitted as
/// literal text rather than swallowed.
pub fn interpret(text: &str) -> Vec<StyledSpan> {
    let chars: Vec<char> = text.chars().collect();
    let mut spans = Vec::new();
    let mut state = SgrState::default();
    let mut buf = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '\u{1b}' && i + 1 < chars.len() && chars[i + 1] == '[' {
            // Scan forward for a terminator.
            let mut j = i + 2;
            let mut terminator = None;
            while j < chars.len() {
                if SEQUENCE_TERMINATORS.contains(&chars[j]) {
                    terminator = Some(chars[j]);
                    break;
                }
                j += 1;
            }

            match terminator {
                Some('m') => {
                    // Flush buffered text under the style that was in
                    // effect while it was written, then mutate state.
                    flush(&mut spans, &state, &mut buf);
                    let sequence: String = chars[i + 2..j].iter().collect();
                    apply_sgr(&mut state, &sequence);
                    i = j + 1;
                }
                Some(_) => {
                    // Recognized but non-SGR: consume without output.
                    i = j + 1;
                }
                None => {
                    // Truncated sequence: keep it as literal text.
                    buf.extend(&chars[i..]);
                    i = chars.len();
                }
            }
        } else {
            buf.push(chars[i]);
            i += 1;
        }
    }

    flush(&mut spans, &state, &mut buf);
    spans
}

fn flush(spans: &mut Vec<StyledSpan>, state: &SgrState, buf: &mut String) {
    if buf.is_empty() {
        return;
    }
    spans.push(state.snapshot(std::mem::take(buf)));
}

/// Apply one `;`-separated SGR parameter list. Unknown codes are
/// skipped without aborting the rest of the list.
fn apply_sgr(state: &mut SgrState, sequence: &str) {
    let codes: Vec<u16> = sequence
        .split(';')
        .map(|p| if p.is_empty() { 0 } else { p.parse().unwrap_or(u16::MAX) })
        .collect();

    let mut i = 0;
    while i < codes.len() {
        match codes[i] {
            0 => state.reset(),
            1 => state.classes.bold = true,
            2 => state.classes.dim = true,
            3 => state.classes.italic = true,
            4 => state.classes.underline = true,
            5 => state.classes.slow_blink = true,
            6 => state.classes.fast_blink = true,
            7 => {
                // Guarded: a second 7 without an intervening 27 is a no-op.
                if !state.reversed {
                    state.reversed = true;
                    std::mem::swap(&mut state.foreground, &mut state.background);
                }
            }
            8 => state.classes.hidden = true,
            9 => state.classes.strikethrough = true,
            21 => state.classes.double_underline = true,
            22 => {
                state.classes.bold = false;
                state.classes.dim = false;
            }
            23 => state.classes.italic = false,
            24 => {
                state.classes.underline = false;
                state.classes.double_underline = false;
            }
            25 => {
                state.classes.slow_blink = false;
                state.classes.fast_blink = false;
            }
            27 => {
                if state.reversed {
                    state.reversed = false;
                    std::mem::swap(&mut state.foreground, &mut state.background);
                }
            }
            28 => state.classes.hidden = false,
            29 => state.classes.strikethrough = false,
            n @ 30..=37 => state.foreground = Some(SpanColor::Theme((n - 30) as u8)),
            38 => i += apply_extended_color(state, &codes[i..], ColorSlot::Foreground),
            39 => state.foreground = None,
            n @ 40..=47 => state.background = Some(SpanColor::Theme((n - 40) as u8)),
            48 => i += apply_extended_color(state, &codes[i..], ColorSlot::Background),
            49 => state.background = None,
            53 => state.classes.overline = true,
            55 => state.classes.overline = false,
            58 => i += apply_extended_color(state, &codes[i..], ColorSlot::Underline),
            59 => state.underline_color = None,
            n @ 90..=97 => state.foreground = Some(SpanColor::Theme((n - 90 + 8) as u8)),
            n @ 100..=107 => state.background = Some(SpanColor::Theme((n - 100 + 8) as u8)),
            other => {
                tracing::trace!(code = other, "ignoring unrecognized SGR code");
            }
        }
        i += 1;
    }
}

enum ColorSlot {
    Foreground,
    Background,
    Underline,
}

/// Handle `38`/`48`/`58` extended color selection. `codes[0]` is the
/// introducer itself; returns how many parameters beyond it were
/// consumed. A malformed tail consumes the remaining parameters so
/// color arguments are never reinterpreted as style codes.
fn apply_extended_color(state: &mut SgrState, codes: &[u16], slot: ColorSlot) -> usize {
    let rest = codes.len() - 1;
    let (color, consumed) = match codes.get(1) {
        Some(&5) => match codes.get(2) {
            Some(&n) if n <= 255 => (Some(eight_bit_color(n as u8)), 2),
            _ => (None, rest),
        },
        Some(&2) => match (codes.get(2), codes.get(3), codes.get(4)) {
            (Some(&r), Some(&g), Some(&b)) if r <= 255 && g <= 255 && b <= 255 => (
                Some(SpanColor::Rgb(Rgba::opaque(r as u8, g as u8, b as u8))),
                4,
            ),
            _ => (None, rest),
        },
        _ => (None, rest),
    };

    if let Some(color) = color {
        match slot {
            ColorSlot::Foreground => state.foreground = Some(color),
            ColorSlot::Background => state.background = Some(color),
            ColorSlot::Underline => state.underline_color = Some(color),
        }
    }
    consumed
}

/// 8-bit palette: 0-15 theme slots, 16-231 a 6x6x6 RGB cube,
/// 232-255 a 24-step grayscale ramp.
fn eight_bit_color(n: u8) -> SpanColor {
    match n {
        0..=15 => SpanColor::Theme(n),
        16..=231 => {
            let idx = n - 16;
            let r = idx / 36;
            let g = (idx % 36) / 6;
            let b = idx % 6;
            SpanColor::Rgb(Rgba::opaque(cube_level(r), cube_level(g), cube_level(b)))
        }
        232..=255 => {
            let gray = 8 + 10 * (n - 232);
            SpanColor::Rgb(Rgba::opaque(gray, gray, gray))
        }
    }
}

fn cube_level(v: u8) -> u8 {
    if v == 0 {
        0
    } else {
        55 + 40 * v
    }
}
