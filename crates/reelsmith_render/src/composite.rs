use reelsmith_core::config::{EncoderSettings, EngineConfig};
use reelsmith_core::template::{asset_path, Corner, Edge, Template};
use reelsmith_core::timing::{secs, OverlayWindows, TimeWindow};
use reelsmith_core::types::{Canvas, Rgb};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;
use crate::graph::{escape_filter_path, FilterChain, FilterGraph, InputSet, StreamRef};

/// Label of the final composited video stream.
pub const VIDEO_OUT: &str = "vout";

/// Overlay layers in the order they are stacked onto the base footage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Normalize,
    Captions,
    Tint,
    EndFade,
    Intro,
    Outro,
    Gradient,
    TopGradient,
    Logo,
}

impl LayerKind {
    /// Stream label of the layer's output in the graph.
    pub fn label(&self) -> &'static str {
        match self {
            LayerKind::Normalize => "rgba",
            LayerKind::Captions => "captioned",
            LayerKind::Tint => "tinted",
            LayerKind::EndFade => "faded",
            LayerKind::Intro => "with_intro",
            LayerKind::Outro => "with_outro",
            LayerKind::Gradient => "with_gradient",
            LayerKind::TopGradient => "with_top_gradient",
            LayerKind::Logo => "with_logo",
        }
    }
}

// ---------------------------------------------------------------------------
// Layer assets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct GradientAsset {
    pub path: PathBuf,
    pub edge: Edge,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogoAsset {
    pub path: PathBuf,
    pub width: u32,
    pub corner: Corner,
    pub margin_x: u32,
    pub margin_y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tint {
    pub color: Rgb,
    pub opacity: f64,
}

/// The optional layers that are actually drawable: enabled in the template
/// and backed by a file that exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerAssets {
    pub captions: Option<PathBuf>,
    pub fonts_dir: Option<PathBuf>,
    pub tint: Option<Tint>,
    pub intro: Option<PathBuf>,
    pub outro: Option<PathBuf>,
    pub gradient: Option<GradientAsset>,
    pub top_gradient: Option<PathBuf>,
    pub logo: Option<LogoAsset>,
}

impl LayerAssets {
    /// Resolve template layers against the assets directory. Missing files
    /// are logged and skipped, never raised.
    pub fn resolve(template: &Template, config: &EngineConfig, captions: Option<&Path>) -> Result<Self> {
        let assets = &config.assets_dir;

        let captions = match captions {
            _ if !template.text.enabled => {
                debug!(layer = "captions", "disabled in template");
                None
            }
            Some(path) if path.is_file() => Some(path.to_path_buf()),
            Some(path) => {
                warn!(layer = "captions", path = %path.display(), "subtitle file missing, skipping layer");
                None
            }
            None => None,
        };
        let fonts_dir = captions
            .as_ref()
            .and_then(|_| asset_path(assets, &template.text.typography.font).parent().map(Path::to_path_buf))
            .filter(|dir| dir.is_dir());

        let brand = config.brand.color()?;
        let tint = (config.brand.tint_opacity > 0.0).then_some(Tint {
            color: brand,
            opacity: config.brand.tint_opacity.min(1.0),
        });

        let intro = optional_asset("intro", template.intro.enabled, template.intro.file.as_deref(), assets);
        let outro = optional_asset("outro", template.outro.enabled, template.outro.file.as_deref(), assets);

        let gradient = &template.gradient;
        let gradient_asset =
            optional_asset("gradient", gradient.enabled, gradient.file.as_deref(), assets).map(|path| {
                GradientAsset {
                    path,
                    edge: gradient.position,
                    height: gradient.height,
                }
            });
        let top_gradient = optional_asset(
            "top_gradient",
            gradient.enabled && gradient.top_file.is_some(),
            gradient.top_file.as_deref(),
            assets,
        );

        let logo = &template.logo;
        let logo_asset = optional_asset("logo", logo.enabled, logo.file.as_deref(), assets).map(|path| LogoAsset {
            path,
            width: logo.width.resolve(Canvas::VERTICAL.width),
            corner: logo.position,
            margin_x: logo.margin_right,
            margin_y: logo.margin_top,
        });

        Ok(Self {
            captions,
            fonts_dir,
            tint,
            intro,
            outro,
            gradient: gradient_asset,
            top_gradient,
            logo: logo_asset,
        })
    }
}

fn optional_asset(layer: &str, enabled: bool, file: Option<&str>, assets_dir: &Path) -> Option<PathBuf> {
    if !enabled {
        debug!(layer, "disabled in template");
        return None;
    }
    let Some(file) = file.filter(|f| !f.trim().is_empty()) else {
        debug!(layer, "no file configured");
        return None;
    };
    let path = asset_path(assets_dir, file);
    if path.is_file() {
        Some(path)
    } else {
        warn!(layer, path = %path.display(), "asset missing, skipping layer");
        None
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CompositePlan {
    pub inputs: InputSet,
    pub graph: FilterGraph,
    /// Layers present in the graph, in stacking order.
    pub layers: Vec<LayerKind>,
}

impl CompositePlan {
    pub fn has_layer(&self, kind: LayerKind) -> bool {
        self.layers.contains(&kind)
    }
}

enum Step {
    Filter(LayerKind, String),
    Overlay {
        kind: LayerKind,
        source: FilterChain,
        source_label: &'static str,
        overlay: String,
    },
}

/// Stack the layers onto `base` (input 0) and label the result [`VIDEO_OUT`].
pub fn build_composite(
    base: &Path,
    layers: &LayerAssets,
    windows: &OverlayWindows,
    canvas: Canvas,
) -> Result<CompositePlan> {
    let mut inputs = InputSet::new();
    inputs.add(base);

    let mut steps = vec![Step::Filter(LayerKind::Normalize, "format=rgba".to_string())];

    if let Some(captions) = &layers.captions {
        let mut filter = format!("ass={}", escape_filter_path(captions));
        if let Some(fonts) = &layers.fonts_dir {
            filter.push_str(&format!(":fontsdir={}", escape_filter_path(fonts)));
        }
        steps.push(Step::Filter(LayerKind::Captions, filter));
    }

    if let Some(tint) = layers.tint {
        steps.push(Step::Filter(
            LayerKind::Tint,
            format!(
                "drawbox=x=0:y=0:w=iw:h=ih:color={}@{}:t=fill",
                tint.color.to_ffmpeg(),
                secs(tint.opacity)
            ),
        ));
    }

    if let Some(fade) = windows.end_fade {
        steps.push(Step::Filter(
            LayerKind::EndFade,
            format!(
                "fade=t=out:st={}:d={}:color=black",
                secs(fade.start),
                secs(fade.duration())
            ),
        ));
    }

    if let Some(intro) = &layers.intro {
        steps.push(keyed_clip(&mut inputs, LayerKind::Intro, "intro_src", intro, windows.intro));
    }
    if let Some(outro) = &layers.outro {
        steps.push(keyed_clip(&mut inputs, LayerKind::Outro, "outro_src", outro, windows.outro));
    }

    if let Some(gradient) = &layers.gradient {
        let index = inputs.add(&gradient.path);
        let scale = match gradient.height {
            Some(h) => format!("scale={}:{h}", canvas.width),
            None => format!("scale={}:-1", canvas.width),
        };
        let y = match gradient.edge {
            Edge::Bottom => "H-h",
            Edge::Top => "0",
        };
        steps.push(Step::Overlay {
            kind: LayerKind::Gradient,
            source: FilterChain::from_stream(StreamRef::video(index))
                .filter(scale)
                .filter("format=rgba")
                .output("gradient_src"),
            source_label: "gradient_src",
            overlay: format!("overlay=0:{y}"),
        });
    }

    if let Some(top) = &layers.top_gradient {
        let index = inputs.add(top);
        steps.push(Step::Overlay {
            kind: LayerKind::TopGradient,
            source: FilterChain::from_stream(StreamRef::video(index))
                .filter("format=rgba")
                .output("top_gradient_src"),
            source_label: "top_gradient_src",
            overlay: "overlay=W-w:0".to_string(),
        });
    }

    if let Some(logo) = &layers.logo {
        let index = inputs.add(&logo.path);
        let fade = &windows.logo;
        let visible = TimeWindow::clamped(fade.fade_in_start, fade.fade_out_start + fade.fade, windows.total);
        let (x, y) = corner_position(logo);
        steps.push(Step::Overlay {
            kind: LayerKind::Logo,
            // A still image has to become a stream before it can fade.
            source: FilterChain::from_stream(StreamRef::video(index))
                .filter("loop=loop=-1:size=1:start=0")
                .filter(format!("scale={}:-1", logo.width))
                .filter("format=rgba")
                .filter(format!(
                    "fade=t=in:st={}:d={}:alpha=1",
                    secs(fade.fade_in_start),
                    secs(fade.fade)
                ))
                .filter(format!(
                    "fade=t=out:st={}:d={}:alpha=1",
                    secs(fade.fade_out_start),
                    secs(fade.fade)
                ))
                .output("logo_src"),
            source_label: "logo_src",
            overlay: format!("overlay={x}:{y}:shortest=1:enable='{}'", visible.between_expr()),
        });
    }

    let mut graph = FilterGraph::new(inputs.len());
    let mut applied = Vec::with_capacity(steps.len());
    let mut current = StreamRef::video(0);
    let last = steps.len() - 1;

    for (i, step) in steps.into_iter().enumerate() {
        let (kind, chain) = match step {
            Step::Filter(kind, filter) => (kind, FilterChain::from_stream(current).filter(filter)),
            Step::Overlay {
                kind,
                source,
                source_label,
                overlay,
            } => {
                graph.push(source)?;
                (
                    kind,
                    FilterChain::new([current, StreamRef::label(source_label)]).filter(overlay),
                )
            }
        };
        let label = if i == last { VIDEO_OUT } else { kind.label() };
        graph.push(chain.output(label))?;
        current = StreamRef::label(label);
        applied.push(kind);
    }

    debug!(layers = ?applied, graph = %graph.serialize(), "composite graph built");
    Ok(CompositePlan {
        inputs,
        graph,
        layers: applied,
    })
}

/// Intro/outro clip with its black matte keyed out, gated to `window`.
/// A window that does not start at zero also shifts the clip to its start.
fn keyed_clip(
    inputs: &mut InputSet,
    kind: LayerKind,
    source_label: &'static str,
    path: &Path,
    window: TimeWindow,
) -> Step {
    let index = inputs.add(path);
    let mut source = FilterChain::from_stream(StreamRef::video(index));
    if window.start > 0.0 {
        source = source.filter(format!("setpts=PTS-STARTPTS+{}/TB", secs(window.start)));
    }
    let source = source
        .filter("format=rgba")
        .filter("colorkey=0x000000:0.1:0.1")
        .output(source_label);
    Step::Overlay {
        kind,
        source,
        source_label,
        overlay: format!("overlay=0:0:eof_action=pass:enable='{}'", window.between_expr()),
    }
}

fn corner_position(logo: &LogoAsset) -> (String, String) {
    let (mx, my) = (logo.margin_x, logo.margin_y);
    match logo.corner {
        Corner::TopRight => (format!("W-w-{mx}"), my.to_string()),
        Corner::TopLeft => (mx.to_string(), my.to_string()),
        Corner::BottomRight => (format!("W-w-{mx}"), format!("H-h-{my}")),
        Corner::BottomLeft => (mx.to_string(), format!("H-h-{my}")),
    }
}

/// Output options for the final composite: full re-encode, audio kept at
/// its own length.
pub fn composite_output_args(encoder: &EncoderSettings) -> Vec<String> {
    vec![
        "-map".to_string(),
        format!("[{VIDEO_OUT}]"),
        "-map".to_string(),
        "0:a?".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        encoder.preset.clone(),
        "-crf".to_string(),
        encoder.crf.to_string(),
        "-r".to_string(),
        encoder.fps.to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        encoder.audio_bitrate.clone(),
        "-movflags".to_string(),
        "+faststart".to_string(),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use reelsmith_core::config::LogoTiming;
    use tempfile::TempDir;

    fn windows() -> OverlayWindows {
        OverlayWindows::compute(28.0, 3.0, 3.0, &LogoTiming::default(), 4.0)
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, b"x").unwrap();
        path
    }

    fn full_layers(dir: &Path) -> LayerAssets {
        LayerAssets {
            captions: Some(touch(dir, "snail_captions.ass")),
            fonts_dir: None,
            tint: Some(Tint {
                color: Rgb::new(0xFC, 0xC0, 0x1E),
                opacity: 0.08,
            }),
            intro: Some(touch(dir, "intro.webm")),
            outro: Some(touch(dir, "outro.webm")),
            gradient: Some(GradientAsset {
                path: touch(dir, "gradient-bottom.png"),
                edge: Edge::Bottom,
                height: Some(600),
            }),
            top_gradient: Some(touch(dir, "gradient-top.png")),
            logo: Some(LogoAsset {
                path: touch(dir, "logo.png"),
                width: 324,
                corner: Corner::TopRight,
                margin_x: 60,
                margin_y: 60,
            }),
        }
    }

    #[test]
    fn layers_stack_in_fixed_order() {
        let dir = TempDir::new().unwrap();
        let plan = build_composite(
            &dir.path().join("mixed.mp4"),
            &full_layers(dir.path()),
            &windows(),
            Canvas::VERTICAL,
        )
        .unwrap();
        assert_eq!(
            plan.layers,
            vec![
                LayerKind::Normalize,
                LayerKind::Captions,
                LayerKind::Tint,
                LayerKind::EndFade,
                LayerKind::Intro,
                LayerKind::Outro,
                LayerKind::Gradient,
                LayerKind::TopGradient,
                LayerKind::Logo,
            ]
        );
        assert_eq!(plan.inputs.len(), 6);
        assert!(plan.graph.serialize().ends_with("[vout]"));

        let text = plan.graph.serialize();
        assert!(text.starts_with("[0:v]format=rgba[rgba];[rgba]ass="));
        assert!(text.contains("drawbox=x=0:y=0:w=iw:h=ih:color=0xFCC01E@0.08:t=fill"));
        assert!(text.contains("fade=t=out:st=24:d=4:color=black"));
        assert!(text.contains("[1:v]format=rgba,colorkey=0x000000:0.1:0.1[intro_src]"));
        assert!(text.contains("overlay=0:0:eof_action=pass:enable='between(t,0,3)'"));
        assert!(text.contains("[2:v]setpts=PTS-STARTPTS+25/TB,format=rgba,colorkey"));
        assert!(text.contains("enable='between(t,25,28)'"));
        assert!(text.contains("[3:v]scale=1080:600,format=rgba[gradient_src]"));
        assert!(text.contains("overlay=0:H-h[with_gradient]"));
        assert!(text.contains("overlay=W-w:0[with_top_gradient]"));
        assert!(text.contains(
            "[5:v]loop=loop=-1:size=1:start=0,scale=324:-1,format=rgba,\
             fade=t=in:st=5:d=1:alpha=1,fade=t=out:st=23:d=1:alpha=1[logo_src]"
        ));
        assert!(text.ends_with("overlay=W-w-60:60:shortest=1:enable='between(t,5,24)'[vout]"));
    }

    #[test]
    fn absent_layers_are_not_referenced() {
        let dir = TempDir::new().unwrap();
        let layers = LayerAssets {
            logo: full_layers(dir.path()).logo,
            ..LayerAssets::default()
        };
        let plan = build_composite(Path::new("/tmp/mixed.mp4"), &layers, &windows(), Canvas::VERTICAL).unwrap();
        assert_eq!(
            plan.layers,
            vec![LayerKind::Normalize, LayerKind::EndFade, LayerKind::Logo]
        );
        let text = plan.graph.serialize();
        assert!(!text.contains("ass="));
        assert!(!text.contains("colorkey"));
        assert!(!text.contains("drawbox"));
        assert_eq!(plan.inputs.len(), 2);
    }

    #[test]
    fn bare_base_still_produces_output() {
        let no_fade = OverlayWindows::compute(28.0, 3.0, 3.0, &LogoTiming::default(), 0.0);
        let plan = build_composite(Path::new("/tmp/mixed.mp4"), &LayerAssets::default(), &no_fade, Canvas::VERTICAL)
            .unwrap();
        assert_eq!(plan.graph.serialize(), "[0:v]format=rgba[vout]");
    }

    #[test]
    fn logo_corners() {
        let mut logo = LogoAsset {
            path: PathBuf::from("logo.png"),
            width: 200,
            corner: Corner::BottomLeft,
            margin_x: 40,
            margin_y: 80,
        };
        assert_eq!(corner_position(&logo), ("40".to_string(), "H-h-80".to_string()));
        logo.corner = Corner::TopLeft;
        assert_eq!(corner_position(&logo), ("40".to_string(), "80".to_string()));
    }

    #[test]
    fn resolve_skips_missing_and_disabled_assets() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "logo/logo.png");
        touch(dir.path(), "overlays/gradient-bottom.png");
        let template = Template::from_yaml_str(
            r#"
logo: { file: logo/logo.png, width: "30%" }
intro: { enabled: false, file: animations/intro.webm }
outro: { file: animations/missing.webm }
gradient: { file: overlays/gradient-bottom.png, top_file: overlays/nope.png }
text: { enabled: false }
"#,
        )
        .unwrap();
        let config = EngineConfig {
            assets_dir: dir.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let captions = touch(dir.path(), "snail_captions.ass");
        let layers = LayerAssets::resolve(&template, &config, Some(&captions)).unwrap();

        assert!(layers.captions.is_none());
        assert!(layers.intro.is_none());
        assert!(layers.outro.is_none());
        assert!(layers.top_gradient.is_none());
        assert_eq!(layers.logo.as_ref().unwrap().width, 324);
        assert_eq!(layers.gradient.as_ref().unwrap().edge, Edge::Bottom);
        assert!(layers.tint.is_some());
    }

    #[test]
    fn output_args_keep_audio_and_encoder_settings() {
        let args = composite_output_args(&EncoderSettings::default());
        assert_eq!(&args[..4], &["-map", "[vout]", "-map", "0:a?"]);
        assert!(!args.contains(&"-shortest".to_string()));
        assert!(args.windows(2).any(|w| w == ["-crf", "23"]));
        assert!(args.windows(2).any(|w| w == ["-b:a", "192k"]));
    }
}
