use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Canvas
// ---------------------------------------------------------------------------

/// Output frame size in pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    /// 1080x1920, the only output geometry the pipeline renders.
    pub const VERTICAL: Self = Self {
        width: 1080,
        height: 1920,
    };
}

impl Default for Canvas {
    fn default() -> Self {
        Self::VERTICAL
    }
}

impl fmt::Display for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Voice,
    Transcript,
    Source,
    Crop,
    Mix,
    Captions,
    Composite,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Voice,
        Stage::Transcript,
        Stage::Source,
        Stage::Crop,
        Stage::Mix,
        Stage::Captions,
        Stage::Composite,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Voice => "voice",
            Stage::Transcript => "transcript",
            Stage::Source => "source",
            Stage::Crop => "crop",
            Stage::Mix => "mix",
            Stage::Captions => "captions",
            Stage::Composite => "composite",
        }
    }

    /// Artifact file name for this stage, following `{slug}_{stage}.{ext}`.
    /// The voice track is the one exception and is stored as `{slug}.mp3`.
    pub fn artifact_name(&self, slug: &str) -> String {
        match self {
            Stage::Voice => format!("{slug}.mp3"),
            Stage::Transcript => format!("{slug}_words.json"),
            Stage::Source => format!("{slug}_source.mp4"),
            Stage::Crop => format!("{slug}_cropped.mp4"),
            Stage::Mix => format!("{slug}_mixed.mp4"),
            Stage::Captions => format!("{slug}_captions.ass"),
            Stage::Composite => format!("{slug}_final.mp4"),
        }
    }

    /// `(base, weight)` of this stage's band on the shared 0-100 progress scale.
    pub fn progress_band(&self) -> (f64, f64) {
        match self {
            Stage::Voice => (0.0, 20.0),
            Stage::Transcript => (20.0, 20.0),
            Stage::Source => (40.0, 20.0),
            Stage::Crop => (60.0, 10.0),
            Stage::Mix => (70.0, 5.0),
            Stage::Captions => (75.0, 0.0),
            Stage::Composite => (75.0, 25.0),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.name() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| CoreError::UnknownStage(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// StageState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    #[default]
    Pending,
    Running,
    Done,
    Failed,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageState::Pending => "pending",
            StageState::Running => "running",
            StageState::Done => "done",
            StageState::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Rgb
// ---------------------------------------------------------------------------

/// An opaque sRGB colour, written in templates as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Self = Self::new(0xFF, 0xFF, 0xFF);
    pub const BLACK: Self = Self::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB`, `RRGGBB`, `0xRRGGBB`, `white` or `black`.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "white" => return Ok(Self::WHITE),
            "black" => return Ok(Self::BLACK),
            _ => {}
        }
        let hex = trimmed
            .strip_prefix('#')
            .or_else(|| trimmed.strip_prefix("0x"))
            .unwrap_or(trimmed);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidColor(s.to_string()));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| CoreError::InvalidColor(s.to_string()))
        };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// ffmpeg colour syntax, e.g. `0xFCC01E`.
    pub fn to_ffmpeg(&self) -> String {
        format!("0x{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Inline subtitle override colour (blue-green-red order), e.g. `&H1EC0FC&`.
    pub fn to_ass_inline(&self) -> String {
        format!("&H{:02X}{:02X}{:02X}&", self.b, self.g, self.r)
    }

    /// Subtitle style colour with an opaque alpha byte, e.g. `&H001EC0FC`.
    pub fn to_ass_style(&self) -> String {
        format!("&H00{:02X}{:02X}{:02X}", self.b, self.g, self.r)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_follow_convention() {
        let slug = "the-life-of-a-snail";
        assert_eq!(Stage::Voice.artifact_name(slug), "the-life-of-a-snail.mp3");
        assert_eq!(
            Stage::Transcript.artifact_name(slug),
            "the-life-of-a-snail_words.json"
        );
        assert_eq!(
            Stage::Crop.artifact_name(slug),
            "the-life-of-a-snail_cropped.mp4"
        );
        assert_eq!(Stage::Mix.artifact_name(slug), "the-life-of-a-snail_mixed.mp4");
        assert_eq!(
            Stage::Captions.artifact_name(slug),
            "the-life-of-a-snail_captions.ass"
        );
        assert_eq!(
            Stage::Composite.artifact_name(slug),
            "the-life-of-a-snail_final.mp4"
        );
    }

    #[test]
    fn stage_parse_roundtrips_names() {
        for stage in Stage::ALL {
            assert_eq!(stage.name().parse::<Stage>().unwrap(), stage);
        }
        assert_eq!(" Crop ".parse::<Stage>().unwrap(), Stage::Crop);
        assert!("render".parse::<Stage>().is_err());
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::ALL.windows(2).all(|w| w[0] < w[1]));
        assert!(Stage::Crop < Stage::Mix);
    }

    #[test]
    fn progress_bands_are_contiguous() {
        let mut end = 0.0;
        for stage in Stage::ALL {
            let (base, weight) = stage.progress_band();
            assert!((base - end).abs() < f64::EPSILON, "gap before {stage}");
            end = base + weight;
        }
        assert!((end - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn vertical_canvas_is_nine_by_sixteen() {
        assert_eq!(Canvas::VERTICAL.to_string(), "1080x1920");
        assert_eq!(Canvas::default(), Canvas::VERTICAL);
    }

    #[test]
    fn rgb_parse_forms() {
        let gold = Rgb::new(0xFC, 0xC0, 0x1E);
        assert_eq!(Rgb::parse("#FCC01E").unwrap(), gold);
        assert_eq!(Rgb::parse("fcc01e").unwrap(), gold);
        assert_eq!(Rgb::parse("0xFCC01E").unwrap(), gold);
        assert_eq!(Rgb::parse("White").unwrap(), Rgb::WHITE);
        assert!(Rgb::parse("#FFF").is_err());
        assert!(Rgb::parse("#GG0000").is_err());
    }

    #[test]
    fn rgb_output_notations() {
        let gold = Rgb::new(0xFC, 0xC0, 0x1E);
        assert_eq!(gold.to_ffmpeg(), "0xFCC01E");
        assert_eq!(gold.to_ass_inline(), "&H1EC0FC&");
        assert_eq!(gold.to_ass_style(), "&H001EC0FC");
        assert_eq!(gold.to_string(), "#FCC01E");
    }
}
