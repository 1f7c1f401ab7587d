use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{RenderError, Result};

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Container-level facts about a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Seconds; `0.0` when the container does not report a duration.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub has_video: bool,
    pub has_audio: bool,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Queries playback duration of media files.
///
/// Implementations never fail: `0.0` means "unknown", not "zero-length".
pub trait DurationProber {
    fn duration(&self, path: &Path) -> f64;
}

/// [`DurationProber`] backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    binary: String,
}

impl FfprobeProber {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl DurationProber for FfprobeProber {
    fn duration(&self, path: &Path) -> f64 {
        match probe_media(&self.binary, path) {
            Ok(info) => info.duration,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "duration probe failed");
                0.0
            }
        }
    }
}

/// Run ffprobe on a media file and parse the result.
pub fn probe_media(ffprobe: &str, path: impl AsRef<Path>) -> Result<MediaInfo> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RenderError::FileNotFound(path.to_path_buf()));
    }

    let output = std::process::Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| RenderError::FfprobeExec(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RenderError::FfprobeFailed(stderr.into_owned()));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    let info = parse_probe_output(&probe);
    debug!(path = %path.display(), duration = info.duration, "probed");
    Ok(info)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn parse_probe_output(probe: &FfprobeOutput) -> MediaInfo {
    let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");
    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    // Still images and some webm clips only report duration per stream.
    let duration = parse_seconds(probe.format.duration.as_deref())
        .or_else(|| {
            probe
                .streams
                .iter()
                .filter_map(|s| parse_seconds(s.duration.as_deref()))
                .reduce(f64::max)
        })
        .unwrap_or(0.0);

    let fps = video_stream
        .and_then(|s| s.r_frame_rate.as_deref())
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);

    MediaInfo {
        duration,
        width: video_stream.and_then(|s| s.width).unwrap_or(0),
        height: video_stream.and_then(|s| s.height).unwrap_or(0),
        fps,
        has_video: video_stream.is_some(),
        has_audio,
    }
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Parse ffprobe frame rate string like "30000/1001" or "30/1" into f64.
fn parse_frame_rate(rate: &str) -> Option<f64> {
    if let Some((num, den)) = rate.split_once('/') {
        let n: f64 = num.parse().ok()?;
        let d: f64 = den.parse().ok()?;
        if d == 0.0 {
            return None;
        }
        Some(n / d)
    } else {
        rate.parse().ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_frame_rate_fraction() {
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < f64::EPSILON);
        assert!(parse_frame_rate("30/0").is_none());
    }

    #[test]
    fn parse_probe_output_video_and_audio() {
        let json = r#"{
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "r_frame_rate": "30/1"
                },
                {
                    "codec_type": "audio",
                    "codec_name": "aac",
                    "channels": 2,
                    "sample_rate": "48000"
                }
            ],
            "format": {
                "duration": "10.5"
            }
        }"#;
        let output: FfprobeOutput = serde_json::from_str(json).unwrap();
        let info = parse_probe_output(&output);

        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert!((info.fps - 30.0).abs() < f64::EPSILON);
        assert!(info.has_video && info.has_audio);
        assert!((info.duration - 10.5).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_probe_output_falls_back_to_stream_duration() {
        let json = r#"{
            "streams": [
                { "codec_type": "video", "duration": "2.96" },
                { "codec_type": "audio", "duration": "3.01" }
            ],
            "format": { "duration": "N/A" }
        }"#;
        let output: FfprobeOutput = serde_json::from_str(json).unwrap();
        let info = parse_probe_output(&output);
        assert!((info.duration - 3.01).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_probe_output_missing_streams() {
        let json = r#"{
            "streams": [],
            "format": {}
        }"#;
        let output: FfprobeOutput = serde_json::from_str(json).unwrap();
        let info = parse_probe_output(&output);

        assert_eq!(info.width, 0);
        assert!(!info.has_video);
        assert!(!info.has_audio);
        assert_eq!(info.duration, 0.0);
    }

    #[test]
    fn probe_nonexistent_file_returns_error() {
        let result = probe_media("ffprobe", "/tmp/does_not_exist_reelsmith_probe_test.mp4");
        assert!(matches!(result, Err(RenderError::FileNotFound(_))));
    }

    #[test]
    fn unreadable_file_probes_as_unknown() {
        let prober = FfprobeProber::new("ffprobe-binary-that-does-not-exist");
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("voice.mp3");
        std::fs::write(&path, b"not audio").unwrap();
        assert_eq!(prober.duration(&path), 0.0);
    }
}
