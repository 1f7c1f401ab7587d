use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::types::Rgb;

/// Branding template: which overlay layers to draw and how captions look.
///
/// Every field has a default so a partial YAML document is a valid template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Template {
    pub logo: LogoSection,
    pub intro: ClipSection,
    pub outro: ClipSection,
    pub gradient: GradientSection,
    pub text: TextSection,
    pub music: MusicSection,
}

impl Template {
    /// Load and validate a YAML template.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CoreError::FileNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        let template = Self::from_yaml_str(&data)?;
        debug!(path = %path.display(), "template loaded");
        Ok(template)
    }

    pub fn from_yaml_str(data: &str) -> Result<Self> {
        let template: Template = serde_yaml::from_str(data)?;
        template.validate()?;
        Ok(template)
    }

    fn validate(&self) -> Result<()> {
        Rgb::parse(&self.text.typography.color)?;
        Rgb::parse(&self.text.typography.outline.color)?;
        Rgb::parse(&self.text.typography.shadow.color)?;
        Ok(())
    }
}

/// Resolve a template-relative asset file against the assets directory.
/// Absolute paths are returned unchanged.
pub fn asset_path(assets_dir: &Path, file: &str) -> PathBuf {
    let file = Path::new(file);
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        assets_dir.join(file)
    }
}

// ---------------------------------------------------------------------------
// Logo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogoSection {
    pub enabled: bool,
    pub file: Option<String>,
    pub position: Corner,
    pub width: LogoWidth,
    pub margin_top: u32,
    pub margin_right: u32,
}

impl Default for LogoSection {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
            position: Corner::TopRight,
            width: LogoWidth::Percent(30.0),
            margin_top: 60,
            margin_right: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Corner {
    #[default]
    TopRight,
    TopLeft,
    BottomRight,
    BottomLeft,
}

/// Logo width as either absolute pixels or a percentage of canvas width.
///
/// Accepts `324`, `"324"`, `"324px"` and `"30%"` in templates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLogoWidth", into = "RawLogoWidth")]
pub enum LogoWidth {
    Pixels(u32),
    Percent(f64),
}

impl LogoWidth {
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let invalid = || CoreError::InvalidLogoWidth(s.to_string());

        if let Some(pct) = trimmed.strip_suffix('%') {
            let pct: f64 = pct.trim().parse().map_err(|_| invalid())?;
            if !pct.is_finite() || pct <= 0.0 {
                return Err(invalid());
            }
            return Ok(LogoWidth::Percent(pct));
        }

        let px = trimmed.strip_suffix("px").unwrap_or(trimmed).trim();
        match px.parse::<u32>() {
            Ok(0) | Err(_) => Err(invalid()),
            Ok(px) => Ok(LogoWidth::Pixels(px)),
        }
    }

    /// Width in pixels on a canvas `canvas_width` pixels wide.
    pub fn resolve(&self, canvas_width: u32) -> u32 {
        match *self {
            LogoWidth::Pixels(px) => px,
            LogoWidth::Percent(pct) => (canvas_width as f64 * pct / 100.0).round() as u32,
        }
    }
}

impl fmt::Display for LogoWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogoWidth::Pixels(px) => write!(f, "{px}px"),
            LogoWidth::Percent(pct) => write!(f, "{pct}%"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawLogoWidth {
    Number(u32),
    Text(String),
}

impl TryFrom<RawLogoWidth> for LogoWidth {
    type Error = CoreError;

    fn try_from(raw: RawLogoWidth) -> Result<Self> {
        match raw {
            RawLogoWidth::Number(0) => Err(CoreError::InvalidLogoWidth("0".into())),
            RawLogoWidth::Number(px) => Ok(LogoWidth::Pixels(px)),
            RawLogoWidth::Text(s) => LogoWidth::parse(&s),
        }
    }
}

impl From<LogoWidth> for RawLogoWidth {
    fn from(width: LogoWidth) -> Self {
        match width {
            LogoWidth::Pixels(px) => RawLogoWidth::Number(px),
            LogoWidth::Percent(_) => RawLogoWidth::Text(width.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Intro / outro
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClipSection {
    pub enabled: bool,
    pub file: Option<String>,
    /// Fallback window length when the clip's own duration cannot be probed.
    pub duration: f64,
}

impl Default for ClipSection {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
            duration: 3.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Gradient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GradientSection {
    pub enabled: bool,
    pub file: Option<String>,
    pub position: Edge,
    /// Scale the primary gradient to this height, keeping canvas width.
    pub height: Option<u32>,
    /// Secondary gradient anchored to the top-right corner.
    pub top_file: Option<String>,
}

impl Default for GradientSection {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
            position: Edge::Bottom,
            height: None,
            top_file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Top,
    #[default]
    Bottom,
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextSection {
    pub enabled: bool,
    pub typography: Typography,
    pub layout: TextLayout,
}

impl Default for TextSection {
    fn default() -> Self {
        Self {
            enabled: true,
            typography: Typography::default(),
            layout: TextLayout::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Typography {
    /// Font file or family, e.g. `fonts/Inter-Bold.ttf`.
    pub font: String,
    pub size: u32,
    pub color: String,
    pub outline: Outline,
    pub shadow: Shadow,
}

impl Typography {
    /// Font family name as the subtitle renderer expects it: the file stem
    /// without directories or extension.
    pub fn font_name(&self) -> String {
        Path::new(&self.font)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Inter-Bold".to_string())
    }
}

impl Default for Typography {
    fn default() -> Self {
        Self {
            font: "fonts/Inter-Bold.ttf".to_string(),
            size: 110,
            color: "#FFFFFF".to_string(),
            outline: Outline::default(),
            shadow: Shadow::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Outline {
    pub enabled: bool,
    pub color: String,
    pub width: u32,
}

impl Default for Outline {
    fn default() -> Self {
        Self {
            enabled: true,
            color: "#000000".to_string(),
            width: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Shadow {
    pub enabled: bool,
    pub x: i32,
    pub y: i32,
    pub blur: u32,
    pub color: String,
}

impl Default for Shadow {
    fn default() -> Self {
        Self {
            enabled: false,
            x: 0,
            y: 4,
            blur: 8,
            color: "#000000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextLayout {
    pub position: TextPosition,
    /// Words per caption line; a chunk longer than this wraps.
    pub max_words_per_line: Option<usize>,
    pub max_lines: usize,
    pub margin_bottom: u32,
    pub margin_top: u32,
}

impl Default for TextLayout {
    fn default() -> Self {
        Self {
            position: TextPosition::Center,
            max_words_per_line: None,
            max_lines: 2,
            margin_bottom: 200,
            margin_top: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextPosition {
    Top,
    #[default]
    Center,
    Bottom,
}

// ---------------------------------------------------------------------------
// Music
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MusicSection {
    pub enabled: bool,
    pub file: Option<String>,
    /// Nominal length of the music bed; informational, the bed is looped.
    pub duration: Option<f64>,
    /// Seconds of fade-out ending at the end of the video.
    pub fade_out: f64,
}

impl Default for MusicSection {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
            duration: None,
            fade_out: 3.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FULL_TEMPLATE: &str = r##"
logo:
  enabled: true
  file: logo/logo-full-dark.png
  position: top-right
  width: "30%"
  margin_top: 60
  margin_right: 60
intro:
  enabled: true
  file: animations/intro_overlay.webm
  duration: 3
outro:
  enabled: true
  file: animations/outro_overlay.webm
  duration: 3
gradient:
  enabled: true
  file: overlays/gradient-bottom.png
  position: bottom
  height: 600
text:
  typography:
    font: fonts/Inter-Bold.ttf
    size: 64
    color: "#FFFFFF"
    outline: { enabled: true, color: "#000000", width: 3 }
    shadow: { enabled: true, x: 0, y: 4, blur: 8, color: "#000000" }
  layout:
    position: bottom
    max_words_per_line: 4
    max_lines: 2
    margin_bottom: 200
    margin_top: 0
music:
  enabled: true
  file: mp3/style1.mp3
  duration: 60
  fade_out: 3
"##;

    #[test]
    fn parse_full_template() {
        let t = Template::from_yaml_str(FULL_TEMPLATE).unwrap();
        assert_eq!(t.logo.width, LogoWidth::Percent(30.0));
        assert_eq!(t.logo.position, Corner::TopRight);
        assert_eq!(t.intro.file.as_deref(), Some("animations/intro_overlay.webm"));
        assert_eq!(t.gradient.height, Some(600));
        assert_eq!(t.text.typography.size, 64);
        assert_eq!(t.text.layout.position, TextPosition::Bottom);
        assert_eq!(t.text.layout.max_words_per_line, Some(4));
        assert_eq!(t.music.file.as_deref(), Some("mp3/style1.mp3"));
        assert!((t.music.fade_out - 3.0).abs() < f64::EPSILON);
        assert!(t.text.enabled);
    }

    #[test]
    fn partial_template_uses_defaults() {
        let t = Template::from_yaml_str("logo:\n  enabled: false\n").unwrap();
        assert!(!t.logo.enabled);
        assert!(t.intro.enabled);
        assert_eq!(t.text.typography.size, 110);
        assert_eq!(t.logo.width, LogoWidth::Percent(30.0));
    }

    #[test]
    fn percentage_logo_width_resolves_against_canvas() {
        assert_eq!(LogoWidth::parse("30%").unwrap().resolve(1080), 324);
        assert_eq!(LogoWidth::parse("33.3%").unwrap().resolve(1080), 360);
    }

    #[test]
    fn pixel_logo_width_forms() {
        assert_eq!(LogoWidth::parse("360").unwrap(), LogoWidth::Pixels(360));
        assert_eq!(LogoWidth::parse("360px").unwrap(), LogoWidth::Pixels(360));
        let t = Template::from_yaml_str("logo:\n  width: 360\n").unwrap();
        assert_eq!(t.logo.width.resolve(1080), 360);
    }

    #[test]
    fn invalid_logo_width_is_rejected() {
        assert!(LogoWidth::parse("wide").is_err());
        assert!(LogoWidth::parse("0").is_err());
        assert!(LogoWidth::parse("-5%").is_err());
        let result = Template::from_yaml_str("logo:\n  width: huge\n");
        assert!(result.is_err());
    }

    #[test]
    fn invalid_text_color_is_rejected() {
        let result = Template::from_yaml_str("text:\n  typography:\n    color: \"#12\"\n");
        assert!(matches!(result, Err(CoreError::InvalidColor(_))));
    }

    #[test]
    fn logo_width_survives_serialization() {
        let section = LogoSection {
            width: LogoWidth::Pixels(200),
            ..LogoSection::default()
        };
        for section in [LogoSection::default(), section] {
            let yaml = serde_yaml::to_string(&section).unwrap();
            let back: LogoSection = serde_yaml::from_str(&yaml).unwrap();
            assert_eq!(back.width, section.width);
        }
    }

    #[test]
    fn font_name_strips_path_and_extension() {
        let typo = Typography::default();
        assert_eq!(typo.font_name(), "Inter-Bold");
        let custom = Typography {
            font: "Roboto".to_string(),
            ..Typography::default()
        };
        assert_eq!(custom.font_name(), "Roboto");
    }

    #[test]
    fn asset_path_resolution() {
        let assets = Path::new("/srv/assets");
        assert_eq!(
            asset_path(assets, "logo/logo.png"),
            PathBuf::from("/srv/assets/logo/logo.png")
        );
        assert_eq!(asset_path(assets, "/abs/logo.png"), PathBuf::from("/abs/logo.png"));
    }

    #[test]
    fn load_from_file_and_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("default.yaml");
        std::fs::write(&path, FULL_TEMPLATE).unwrap();
        let t = Template::load_from_file(&path).unwrap();
        assert!(t.logo.enabled);

        let missing = Template::load_from_file(dir.path().join("nope.yaml"));
        assert!(matches!(missing, Err(CoreError::FileNotFound(_))));
    }
}
