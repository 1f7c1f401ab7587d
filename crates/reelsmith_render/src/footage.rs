use reelsmith_core::config::EncoderSettings;
use reelsmith_core::timing::{cover_crop_filter, secs, FootageFit};
use reelsmith_core::types::Canvas;
use std::path::Path;

use crate::error::Result;
use crate::graph::{FilterChain, FilterGraph, InputSet, StreamRef};

const CROPPED: &str = "vcrop";

#[derive(Debug, Clone)]
pub struct CropPlan {
    pub inputs: InputSet,
    pub graph: FilterGraph,
    pub output_args: Vec<String>,
    pub fit: FootageFit,
}

/// Fill the canvas with `source` for exactly `target` seconds, looping the
/// clip when it is shorter. Audio is dropped.
pub fn build_crop(
    source: &Path,
    fit: FootageFit,
    target: f64,
    canvas: Canvas,
    encoder: &EncoderSettings,
) -> Result<CropPlan> {
    let mut inputs = InputSet::new();
    match fit {
        FootageFit::Loop => inputs.add_looped(source),
        FootageFit::Trim => inputs.add(source),
    };

    let mut graph = FilterGraph::new(inputs.len());
    graph.push(
        FilterChain::from_stream(StreamRef::video(0))
            .filter(cover_crop_filter(canvas))
            .filter("setsar=1")
            .filter(format!("fps={}", encoder.fps))
            .output(CROPPED),
    )?;

    let output_args = vec![
        "-map".to_string(),
        format!("[{CROPPED}]"),
        "-t".to_string(),
        secs(target),
        "-an".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        encoder.preset.clone(),
        "-crf".to_string(),
        encoder.crf.to_string(),
    ];

    Ok(CropPlan {
        inputs,
        graph,
        output_args,
        fit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_source_is_looped_and_cut_at_target() {
        let plan = build_crop(
            Path::new("/run/snail_source.mp4"),
            FootageFit::Loop,
            28.0,
            Canvas::VERTICAL,
            &EncoderSettings::default(),
        )
        .unwrap();
        assert_eq!(
            plan.inputs.clone().into_vec()[0].options,
            vec!["-stream_loop".to_string(), "-1".to_string()]
        );
        assert!(plan.output_args.windows(2).any(|w| w == ["-t", "28"]));
        assert!(plan.output_args.contains(&"-an".to_string()));
        assert_eq!(
            plan.graph.serialize(),
            "[0:v]scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920,setsar=1,fps=30[vcrop]"
        );
    }

    #[test]
    fn long_source_is_trimmed_to_target() {
        let plan = build_crop(
            Path::new("/run/snail_source.mp4"),
            FootageFit::Trim,
            26.5,
            Canvas::VERTICAL,
            &EncoderSettings::default(),
        )
        .unwrap();
        assert!(plan.inputs.clone().into_vec()[0].options.is_empty());
        assert!(plan.output_args.windows(2).any(|w| w == ["-t", "26.5"]));
    }
}
