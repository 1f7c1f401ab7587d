use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::types::Rgb;

/// Engine-wide settings, read once from `reelsmith.toml` and passed down
/// the pipeline by reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Root for per-job run directories (`{output_dir}/{slug}/`).
    pub output_dir: PathBuf,
    /// Root that template asset paths are resolved against.
    pub assets_dir: PathBuf,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub padding: Padding,
    /// Voice entry delay; defaults to the intro padding.
    pub voice_delay: Option<f64>,
    pub captions: CaptionSettings,
    pub brand: BrandSettings,
    pub music: MusicSettings,
    pub logo: LogoTiming,
    /// Length of the fade-to-black ending at the last frame. `0` disables it.
    pub end_fade: f64,
    pub encoder: EncoderSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            assets_dir: PathBuf::from("assets"),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            padding: Padding::default(),
            voice_delay: None,
            captions: CaptionSettings::default(),
            brand: BrandSettings::default(),
            music: MusicSettings::default(),
            logo: LogoTiming::default(),
            end_fade: 4.0,
            encoder: EncoderSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CoreError::FileNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&data)?;
        debug!(path = %path.display(), output_dir = %config.output_dir.display(), "config loaded");
        Ok(config)
    }

    pub fn from_toml_str(data: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(data)?;
        config.brand.color()?;
        Ok(config)
    }

    pub fn voice_delay(&self) -> f64 {
        self.voice_delay.unwrap_or(self.padding.intro).max(0.0)
    }

    pub fn run_dir(&self, slug: &str) -> PathBuf {
        self.output_dir.join(slug)
    }
}

/// Non-content time added around the voice track.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Padding {
    pub intro: f64,
    pub outro: f64,
}

impl Padding {
    pub fn total(&self) -> f64 {
        self.intro.max(0.0) + self.outro.max(0.0)
    }
}

impl Default for Padding {
    fn default() -> Self {
        Self {
            intro: 4.0,
            outro: 4.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptionSettings {
    /// Words shown together on screen.
    pub chunk_size: usize,
}

impl Default for CaptionSettings {
    fn default() -> Self {
        Self { chunk_size: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrandSettings {
    /// Accent colour for the tint wash and the active caption word.
    pub color: String,
    pub tint_opacity: f64,
}

impl BrandSettings {
    pub fn color(&self) -> Result<Rgb> {
        Rgb::parse(&self.color)
    }
}

impl Default for BrandSettings {
    fn default() -> Self {
        Self {
            color: "#FCC01E".to_string(),
            tint_opacity: 0.08,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MusicSettings {
    /// Background bed gain relative to the voice.
    pub volume: f64,
}

impl Default for MusicSettings {
    fn default() -> Self {
        Self { volume: 0.15 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogoTiming {
    /// Distance of the logo's fade-in/out from the start and end of the video.
    pub edge_margin: f64,
    pub fade: f64,
}

impl Default for LogoTiming {
    fn default() -> Self {
        Self {
            edge_margin: 5.0,
            fade: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EncoderSettings {
    pub preset: String,
    pub crf: u8,
    pub audio_bitrate: String,
    pub fps: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            preset: "ultrafast".to_string(),
            crf: 23,
            audio_bitrate: "192k".to_string(),
            fps: 30,
        }
    }
}
