use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::template::{TextLayout, TextPosition, TextSection};
use crate::types::{Canvas, Rgb};

/// One spoken word with its timing in seconds, relative to the voice track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordTimestamp {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// Read a word-timestamp artifact (a JSON array of `{word, start, end}`).
///
/// A zero-byte or unparsable file is an error; `[]` is a valid empty list.
pub fn load_words(path: &Path) -> Result<Vec<WordTimestamp>> {
    if !path.exists() {
        return Err(CoreError::FileNotFound(path.to_path_buf()));
    }
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

/// A single subtitle line on screen between `start` and `end`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionEvent {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Style
// ---------------------------------------------------------------------------

const ACTIVE_SCALE: u32 = 125;
const SIDE_MARGIN: u32 = 50;
const CENTER_MARGIN_V: u32 = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionStyle {
    pub font_name: String,
    pub font_size: u32,
    pub primary: Rgb,
    pub accent: Rgb,
    pub outline: Rgb,
    /// Border width; `0` when the outline is disabled.
    pub outline_width: u32,
    pub shadow: Rgb,
    pub shadow_depth: u32,
    /// Numpad-style alignment: 8 top, 5 middle, 2 bottom.
    pub alignment: u8,
    pub margin_v: u32,
    pub words_per_line: Option<usize>,
    pub max_lines: usize,
}

impl CaptionStyle {
    pub fn from_template(text: &TextSection, accent: Rgb) -> Result<Self> {
        let typo = &text.typography;
        let layout = &text.layout;

        let (alignment, margin_v) = match layout.position {
            TextPosition::Top => (8, layout.margin_top),
            TextPosition::Center => (5, CENTER_MARGIN_V),
            TextPosition::Bottom => (2, layout.margin_bottom),
        };
        let outline_width = if typo.outline.enabled {
            typo.outline.width
        } else {
            0
        };
        let shadow_depth = if typo.shadow.enabled {
            typo.shadow.x.unsigned_abs().max(typo.shadow.y.unsigned_abs())
        } else {
            0
        };

        Ok(Self {
            font_name: typo.font_name(),
            font_size: typo.size,
            primary: Rgb::parse(&typo.color)?,
            accent,
            outline: Rgb::parse(&typo.outline.color)?,
            outline_width,
            shadow: Rgb::parse(&typo.shadow.color)?,
            shadow_depth,
            alignment,
            margin_v,
            words_per_line: layout.max_words_per_line.filter(|n| *n > 0),
            max_lines: layout.max_lines.max(1),
        })
    }

    /// Words per on-screen group: `requested`, capped so a group never needs
    /// more than `max_lines` lines.
    pub fn chunk_size(&self, requested: usize) -> usize {
        let requested = requested.max(1);
        match self.words_per_line {
            Some(per_line) => requested.min(per_line * self.max_lines),
            None => requested,
        }
    }
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_name: "Inter-Bold".to_string(),
            font_size: 110,
            primary: Rgb::WHITE,
            accent: Rgb::new(0xFC, 0xC0, 0x1E),
            outline: Rgb::BLACK,
            outline_width: 4,
            shadow: Rgb::BLACK,
            shadow_depth: 0,
            alignment: 5,
            margin_v: CENTER_MARGIN_V,
            words_per_line: TextLayout::default().max_words_per_line,
            max_lines: TextLayout::default().max_lines,
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Group words into chunks and emit one event per word, each showing the
/// whole chunk with that word highlighted. Times are shifted by `offset`.
///
/// Every input word yields an event, including words that are empty once
/// override characters are stripped; those highlight nothing.
pub fn build_events(
    words: &[WordTimestamp],
    offset: f64,
    chunk_size: usize,
    style: &CaptionStyle,
) -> Vec<CaptionEvent> {
    let words: Vec<(String, &WordTimestamp)> = words
        .iter()
        .map(|w| (clean_word(&w.word), w))
        .collect();

    let mut events = Vec::with_capacity(words.len());
    for chunk in words.chunks(style.chunk_size(chunk_size)) {
        for (active, (_, word)) in chunk.iter().enumerate() {
            events.push(CaptionEvent {
                start: word.start + offset,
                end: word.end + offset,
                text: styled_chunk(chunk, active, style),
            });
        }
    }
    events
}

fn styled_chunk(chunk: &[(String, &WordTimestamp)], active: usize, style: &CaptionStyle) -> String {
    let outline = style.outline.to_ass_inline();
    let mut out = String::new();
    let mut shown = 0;
    for (i, (text, _)) in chunk.iter().enumerate() {
        if text.is_empty() {
            continue;
        }
        if shown > 0 {
            let line_break = style
                .words_per_line
                .is_some_and(|per_line| shown % per_line == 0);
            out.push_str(if line_break { "\\N" } else { " " });
        }
        shown += 1;
        if i == active {
            let _ = write!(
                out,
                "{{\\c{}}}{{\\3c{}}}{{\\fscx{s}\\fscy{s}}}{}{{\\fscx100\\fscy100}}",
                style.accent.to_ass_inline(),
                outline,
                text,
                s = ACTIVE_SCALE
            );
        } else {
            let _ = write!(
                out,
                "{{\\c{}}}{{\\3c{}}}{{\\fscx100\\fscy100}}{}",
                style.primary.to_ass_inline(),
                outline,
                text
            );
        }
    }
    out
}

/// Uppercase and drop characters that would open override blocks.
fn clean_word(word: &str) -> String {
    word.chars()
        .filter(|c| !matches!(c, '{' | '}' | '\\'))
        .collect::<String>()
        .trim()
        .to_uppercase()
}

/// `H:MM:SS.CC`, rounded to the nearest centisecond.
pub fn format_ass_time(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let hours = total_cs / 360_000;
    let minutes = (total_cs / 6_000) % 60;
    let secs = (total_cs / 100) % 60;
    let cs = total_cs % 100;
    format!("{hours}:{minutes:02}:{secs:02}.{cs:02}")
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Serialize events into a complete subtitle document for `canvas`.
pub fn render_document(events: &[CaptionEvent], style: &CaptionStyle, canvas: Canvas) -> String {
    let mut doc = String::new();
    let _ = writeln!(doc, "[Script Info]");
    let _ = writeln!(doc, "ScriptType: v4.00+");
    let _ = writeln!(doc, "PlayResX: {}", canvas.width);
    let _ = writeln!(doc, "PlayResY: {}", canvas.height);
    let _ = writeln!(doc);
    let _ = writeln!(doc, "[V4+ Styles]");
    let _ = writeln!(
        doc,
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, \
         Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, \
         Shadow, Alignment, MarginL, MarginR, MarginV, Encoding"
    );
    let _ = writeln!(
        doc,
        "Style: Default,{},{},{},&H000000FF,{},{},-1,0,0,0,100,100,0,0,1,{},{},{},{m},{m},{},1",
        style.font_name,
        style.font_size,
        style.primary.to_ass_style(),
        style.outline.to_ass_style(),
        style.shadow.to_ass_style(),
        style.outline_width,
        style.shadow_depth,
        style.alignment,
        style.margin_v,
        m = SIDE_MARGIN
    );
    let _ = writeln!(doc);
    let _ = writeln!(doc, "[Events]");
    let _ = writeln!(
        doc,
        "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text"
    );
    for event in events {
        let _ = writeln!(
            doc,
            "Dialogue: 0,{},{},Default,,0,0,0,,{}",
            format_ass_time(event.start),
            format_ass_time(event.end),
            event.text
        );
    }
    doc
}
