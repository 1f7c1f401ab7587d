use reelsmith_core::types::Stage;
use std::collections::VecDeque;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, trace};

use crate::error::{RenderError, Result};
use crate::graph::{FilterGraph, InputSet, MediaInput};

/// Diagnostic lines retained per encode; older lines are summarised.
const MAX_DIAGNOSTIC_LINES: usize = 400;

/// A stage's slice of the shared 0-100 progress scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressScale {
    pub base: f64,
    pub weight: f64,
}

impl ProgressScale {
    pub fn for_stage(stage: Stage) -> Self {
        let (base, weight) = stage.progress_band();
        Self { base, weight }
    }

    /// `base + min(1, fraction) * weight`.
    pub fn at(&self, fraction: f64) -> f64 {
        self.base + fraction.clamp(0.0, 1.0) * self.weight
    }
}

/// A fully constructed encoder invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeJob {
    pub inputs: Vec<MediaInput>,
    pub filter_graph: Option<String>,
    pub output_args: Vec<String>,
    pub output_path: PathBuf,
    /// Expected output length in seconds; progress is measured against it.
    pub duration: f64,
    pub progress: ProgressScale,
}

impl EncodeJob {
    pub fn new(
        inputs: InputSet,
        graph: &FilterGraph,
        output_args: Vec<String>,
        output_path: impl Into<PathBuf>,
        duration: f64,
        progress: ProgressScale,
    ) -> Self {
        Self {
            inputs: inputs.into_vec(),
            filter_graph: (!graph.is_empty()).then(|| graph.serialize()),
            output_args,
            output_path: output_path.into(),
            duration,
            progress,
        }
    }
}

/// Progress update parsed from one encoder status line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderProgress {
    pub elapsed: f64,
    /// `elapsed / total`, capped at 1.
    pub fraction: f64,
    pub frame: u64,
    pub speed: String,
    pub eta_seconds: Option<f64>,
}

/// Runs encode jobs. Implementations block until the output is complete.
pub trait Encoder {
    fn encode(&self, stage: Stage, job: &EncodeJob, on_progress: &dyn Fn(f64)) -> Result<()>;
}

/// [`Encoder`] that spawns the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: String,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Encoder for FfmpegEncoder {
    fn encode(&self, stage: Stage, job: &EncodeJob, on_progress: &dyn Fn(f64)) -> Result<()> {
        let args = build_ffmpeg_args(job);
        debug!(%stage, command = %format!("{} {}", self.binary, args.join(" ")), "spawning encoder");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RenderError::FfmpegNotFound
                } else {
                    RenderError::Io(e)
                }
            })?;

        let mut log = DiagnosticLog::default();
        let read = match child.stderr.take() {
            Some(stderr) => read_encoder_stderr(stderr, &mut log, |progress| {
                if let Some(p) = parse_progress(progress, job.duration) {
                    trace!(
                        %stage,
                        frame = p.frame,
                        elapsed = p.elapsed,
                        speed = %p.speed,
                        eta = ?p.eta_seconds,
                        "encode progress"
                    );
                    on_progress(job.progress.at(p.fraction));
                    true
                } else {
                    false
                }
            }),
            None => Ok(()),
        };

        let status = child.wait()?;
        read?;

        if !status.success() {
            return Err(RenderError::EncoderFailed {
                stage,
                status: status.to_string(),
                diagnostics: log.into_text(),
            });
        }

        on_progress(job.progress.at(1.0));
        Ok(())
    }
}

/// Build ffmpeg args from an encode job.
pub fn build_ffmpeg_args(job: &EncodeJob) -> Vec<String> {
    let mut args = vec!["-y".to_string(), "-hide_banner".to_string()];

    for input in &job.inputs {
        args.extend(input.options.iter().cloned());
        args.push("-i".to_string());
        args.push(input.path.to_string_lossy().to_string());
    }

    if let Some(graph) = &job.filter_graph {
        args.push("-filter_complex".to_string());
        args.push(graph.clone());
    }

    args.extend(job.output_args.iter().cloned());

    args.push(job.output_path.to_string_lossy().to_string());

    args
}

// ---------------------------------------------------------------------------
// stderr handling
// ---------------------------------------------------------------------------

/// Non-progress encoder output, kept for error reports.
#[derive(Debug, Default)]
struct DiagnosticLog {
    lines: VecDeque<String>,
    dropped: usize,
}

impl DiagnosticLog {
    fn push(&mut self, line: String) {
        if self.lines.len() == MAX_DIAGNOSTIC_LINES {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(line);
    }

    fn into_text(self) -> String {
        let mut out = Vec::with_capacity(self.lines.len() + 1);
        if self.dropped > 0 {
            out.push(format!("... {} earlier lines omitted", self.dropped));
        }
        out.extend(self.lines);
        out.join("\n")
    }
}

/// Split stderr on `\r` and `\n` (ffmpeg rewrites its status line with `\r`).
/// Lines the progress handler does not claim go to the diagnostic log.
fn read_encoder_stderr<R: Read>(
    mut stderr: R,
    log: &mut DiagnosticLog,
    mut on_line: impl FnMut(&str) -> bool,
) -> std::io::Result<()> {
    let mut buffer = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();

    let mut handle = |raw: &[u8], log: &mut DiagnosticLog| {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() || on_line(line) {
            return;
        }
        debug!(target: "reelsmith::ffmpeg", "{line}");
        log.push(line.to_string());
    };

    loop {
        let n = stderr.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&buffer[..n]);
        while let Some(pos) = pending.iter().position(|b| *b == b'\r' || *b == b'\n') {
            let rest = pending.split_off(pos + 1);
            handle(&pending[..pos], log);
            pending = rest;
        }
    }
    if !pending.is_empty() {
        handle(&pending, log);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress parsing
// ---------------------------------------------------------------------------

/// Parse an ffmpeg stderr progress line.
///
/// Example line: `frame=  123 fps= 60 ... time=00:01:02.05 speed=1.50x`
pub fn parse_progress(line: &str, total_secs: f64) -> Option<RenderProgress> {
    if !line.contains("time=") {
        return None;
    }

    let frame = extract_value(line, "frame=")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    let speed = extract_value(line, "speed=").unwrap_or_default();

    let elapsed = extract_value(line, "time=")
        .and_then(|v| parse_time_str(&v))
        .unwrap_or(0.0);

    let fraction = if total_secs > 0.0 {
        (elapsed / total_secs).min(1.0)
    } else {
        0.0
    };

    let speed_factor = speed.trim_end_matches('x').parse::<f64>().unwrap_or(0.0);

    let eta_seconds = if speed_factor > 0.0 && total_secs > elapsed {
        Some((total_secs - elapsed) / speed_factor)
    } else {
        None
    };

    Some(RenderProgress {
        elapsed,
        fraction,
        frame,
        speed,
        eta_seconds,
    })
}

/// Extract a value from an ffmpeg key=value progress line.
fn extract_value(line: &str, key: &str) -> Option<String> {
    let start = line.find(key)? + key.len();
    let rest = &line[start..];
    let trimmed = rest.trim_start();
    let end = trimmed
        .find(|c: char| c.is_whitespace())
        .unwrap_or(trimmed.len());
    let val = trimmed[..end].to_string();
    if val.is_empty() {
        None
    } else {
        Some(val)
    }
}

/// Parse an ffmpeg time string like "00:01:02.05" into seconds.
/// Before the first frame ffmpeg prints `N/A`, which does not parse.
fn parse_time_str(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: f64 = parts[0].parse().ok()?;
    let mins: f64 = parts[1].parse().ok()?;
    let secs: f64 = parts[2].parse().ok()?;
    Some(hours * 3600.0 + mins * 60.0 + secs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FilterChain, StreamRef};
    use std::cell::RefCell;

    fn sample_job() -> EncodeJob {
        let mut inputs = InputSet::new();
        inputs.add_looped("/tmp/source.mp4");
        let mut graph = FilterGraph::new(1);
        graph
            .push(
                FilterChain::from_stream(StreamRef::video(0))
                    .filter("scale=1080:1920")
                    .output("v"),
            )
            .unwrap();
        EncodeJob::new(
            inputs,
            &graph,
            vec!["-map".into(), "[v]".into(), "-t".into(), "28".into()],
            "/tmp/out.mp4",
            28.0,
            ProgressScale::for_stage(Stage::Crop),
        )
    }

    #[test]
    fn build_ffmpeg_args_places_input_options_before_input() {
        let args = build_ffmpeg_args(&sample_job());
        assert_eq!(
            args,
            vec![
                "-y",
                "-hide_banner",
                "-stream_loop",
                "-1",
                "-i",
                "/tmp/source.mp4",
                "-filter_complex",
                "[0:v]scale=1080:1920[v]",
                "-map",
                "[v]",
                "-t",
                "28",
                "/tmp/out.mp4",
            ]
        );
    }

    #[test]
    fn empty_graph_is_omitted() {
        let mut inputs = InputSet::new();
        inputs.add("/tmp/a.mp4");
        let job = EncodeJob::new(
            inputs,
            &FilterGraph::new(1),
            vec![],
            "/tmp/b.mp4",
            1.0,
            ProgressScale::for_stage(Stage::Mix),
        );
        assert!(!build_ffmpeg_args(&job).contains(&"-filter_complex".to_string()));
    }

    #[test]
    fn parse_progress_extracts_time_and_fraction() {
        let line = "frame=  150 fps= 60 q=28.0 size=    256kB time=00:00:05.00 bitrate= 419.4kbits/s speed=2.00x";
        let p = parse_progress(line, 10.0).unwrap();
        assert_eq!(p.frame, 150);
        assert!((p.elapsed - 5.0).abs() < 1e-9);
        assert!((p.fraction - 0.5).abs() < 1e-9);
        assert_eq!(p.speed, "2.00x");
        assert!((p.eta_seconds.unwrap() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn parse_progress_caps_fraction() {
        let p = parse_progress("time=00:00:12.00 speed=1x", 10.0).unwrap();
        assert_eq!(p.fraction, 1.0);
        let p = parse_progress("time=00:00:12.00", 0.0).unwrap();
        assert_eq!(p.fraction, 0.0);
    }

    #[test]
    fn parse_progress_returns_none_for_non_progress_lines() {
        assert!(parse_progress("Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'a.mp4':", 10.0).is_none());
    }

    #[test]
    fn parse_time_str_forms() {
        assert!((parse_time_str("01:02:03.50").unwrap() - 3723.5).abs() < 1e-9);
        assert!(parse_time_str("N/A").is_none());
        assert!(parse_time_str("12.5").is_none());
    }

    #[test]
    fn extract_value_works() {
        let line = "frame=  42 fps=30.0 speed=1.5x";
        assert_eq!(extract_value(line, "frame="), Some("42".to_string()));
        assert_eq!(extract_value(line, "speed="), Some("1.5x".to_string()));
        assert_eq!(extract_value(line, "bitrate="), None);
    }

    #[test]
    fn progress_scale_maps_into_band() {
        let scale = ProgressScale::for_stage(Stage::Composite);
        assert_eq!(scale.at(0.0), 75.0);
        assert_eq!(scale.at(0.5), 87.5);
        assert_eq!(scale.at(3.0), 100.0);
    }

    #[test]
    fn stderr_splits_on_carriage_returns_and_keeps_diagnostics() {
        let stderr: &[u8] = b"frame=1 time=00:00:01.00 speed=1x\rframe=2 time=00:00:02.00 speed=1x\r\
            [Parsed_overlay_3 @ 0x1] Invalid argument\nError initializing filters\n";
        let seen = RefCell::new(Vec::new());
        let mut log = DiagnosticLog::default();
        read_encoder_stderr(stderr, &mut log, |line| match parse_progress(line, 4.0) {
            Some(p) => {
                seen.borrow_mut().push(p.fraction);
                true
            }
            None => false,
        })
        .unwrap();
        assert_eq!(*seen.borrow(), vec![0.25, 0.5]);
        let text = log.into_text();
        assert!(text.contains("Invalid argument"));
        assert!(text.ends_with("Error initializing filters"));
        assert!(!text.contains("frame="));
    }

    #[test]
    fn diagnostic_log_summarises_overflow() {
        let mut log = DiagnosticLog::default();
        for i in 0..MAX_DIAGNOSTIC_LINES + 3 {
            log.push(format!("line {i}"));
        }
        let text = log.into_text();
        assert!(text.starts_with("... 3 earlier lines omitted"));
        assert!(text.ends_with(&format!("line {}", MAX_DIAGNOSTIC_LINES + 2)));
    }

    #[test]
    fn missing_binary_is_reported() {
        let encoder = FfmpegEncoder::new("ffmpeg-binary-that-does-not-exist");
        let result = encoder.encode(Stage::Crop, &sample_job(), &|_| {});
        assert!(matches!(result, Err(RenderError::FfmpegNotFound)));
    }
}
