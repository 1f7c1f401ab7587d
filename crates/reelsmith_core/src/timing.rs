use serde::{Deserialize, Serialize};

use crate::config::{LogoTiming, Padding};
use crate::types::Canvas;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Scale-to-cover then centre-crop, so the frame is always filled exactly.
pub fn cover_crop_filter(canvas: Canvas) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}",
        w = canvas.width,
        h = canvas.height
    )
}

/// Voice duration plus the intro and outro padding.
pub fn target_duration(voice: f64, padding: &Padding) -> f64 {
    voice.max(0.0) + padding.total()
}

/// How source footage is brought to the target duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FootageFit {
    /// Loop the source indefinitely and cut at the target.
    Loop,
    /// Cut the source at the target.
    Trim,
}

impl FootageFit {
    /// An unknown source duration (`<= 0`) is treated as short.
    pub fn decide(source: f64, target: f64) -> Self {
        if source <= 0.0 || source < target {
            FootageFit::Loop
        } else {
            FootageFit::Trim
        }
    }
}

// ---------------------------------------------------------------------------
// Time windows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    /// Build a window with both ends clamped to `[0, total]` and `end >= start`.
    pub fn clamped(start: f64, end: f64, total: f64) -> Self {
        let total = total.max(0.0);
        let start = start.clamp(0.0, total);
        let end = end.clamp(start, total);
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.duration() <= 0.0
    }

    /// Timeline expression for an `enable=` option.
    pub fn between_expr(&self) -> String {
        format!("between(t,{},{})", secs(self.start), secs(self.end))
    }
}

/// Logo fade timing on the output timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogoFade {
    pub fade_in_start: f64,
    pub fade_out_start: f64,
    pub fade: f64,
}

/// Every time window the composite graph gates a layer on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayWindows {
    pub total: f64,
    pub intro: TimeWindow,
    pub outro: TimeWindow,
    pub logo: LogoFade,
    pub end_fade: Option<TimeWindow>,
}

impl OverlayWindows {
    pub fn compute(
        total: f64,
        intro_duration: f64,
        outro_duration: f64,
        logo: &LogoTiming,
        end_fade: f64,
    ) -> Self {
        let total = total.max(0.0);
        let intro = TimeWindow::clamped(0.0, intro_duration, total);
        let outro = TimeWindow::clamped(total - outro_duration.max(0.0), total, total);

        // The logo stays out of the intro and outro windows.
        let fade = logo.fade.max(0.0);
        let fade_in_start = logo.edge_margin.max(intro.end).clamp(0.0, total);
        let fade_out_end = (total - logo.edge_margin + fade).min(outro.start);
        let fade_out_start = (fade_out_end - fade).clamp(fade_in_start, total);

        let end_fade = (end_fade > 0.0)
            .then(|| TimeWindow::clamped(total - end_fade, total, total))
            .filter(|w| !w.is_empty());

        Self {
            total,
            intro,
            outro,
            logo: LogoFade {
                fade_in_start,
                fade_out_start,
                fade,
            },
            end_fade,
        }
    }
}

/// Seconds formatted for filter expressions: up to millisecond precision,
/// trailing zeros dropped.
pub fn secs(value: f64) -> String {
    let s = format!("{:.3}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}
