use reelsmith_core::config::EncoderSettings;
use reelsmith_core::timing::secs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::graph::{FilterChain, FilterGraph, InputSet, StreamRef};

/// Label of the mixed audio stream.
pub const AUDIO_OUT: &str = "aout";

/// Background music under the narration.
#[derive(Debug, Clone, PartialEq)]
pub struct MusicBed {
    pub path: PathBuf,
    /// Gain relative to the voice, e.g. `0.15`.
    pub volume: f64,
    /// Seconds of fade-out ending at the end of the timeline.
    pub fade_out: f64,
}

#[derive(Debug, Clone)]
pub struct AudioMixPlan {
    pub inputs: InputSet,
    pub graph: FilterGraph,
}

/// Mix the delayed voice with an optional looped music bed.
///
/// Input 0 is the video the audio is muxed onto, input 1 the voice, input 2
/// the music. The result is padded or cut to exactly `total` seconds.
pub fn build_audio_mix(
    video: &Path,
    voice: &Path,
    music: Option<&MusicBed>,
    voice_delay: f64,
    total: f64,
) -> Result<AudioMixPlan> {
    let mut inputs = InputSet::new();
    inputs.add(video);
    let voice_index = inputs.add(voice);
    let music_index = music.map(|bed| inputs.add_looped(&bed.path));

    let delay_ms = (voice_delay.max(0.0) * 1000.0).round() as u64;
    let delay = format!("adelay={delay_ms}|{delay_ms}");
    let fit = format!("atrim=end={}", secs(total));

    let mut graph = FilterGraph::new(inputs.len());
    match (music, music_index) {
        (Some(bed), Some(index)) => {
            graph.push(
                FilterChain::from_stream(StreamRef::audio(voice_index))
                    .filter(delay)
                    .output("voice"),
            )?;

            let fade = bed.fade_out.max(0.0).min(total);
            let mut music_chain = FilterChain::from_stream(StreamRef::audio(index))
                .filter(format!("volume={}", secs(bed.volume)))
                .filter(fit.clone());
            if fade > 0.0 {
                music_chain = music_chain.filter(format!(
                    "afade=t=out:st={}:d={}",
                    secs((total - fade).max(0.0)),
                    secs(fade)
                ));
            }
            graph.push(music_chain.output("music"))?;

            graph.push(
                FilterChain::new([StreamRef::label("voice"), StreamRef::label("music")])
                    .filter("amix=inputs=2:duration=longest:dropout_transition=0")
                    .filter("apad")
                    .filter(fit)
                    .output(AUDIO_OUT),
            )?;
        }
        _ => {
            graph.push(
                FilterChain::from_stream(StreamRef::audio(voice_index))
                    .filter(delay)
                    .filter("apad")
                    .filter(fit)
                    .output(AUDIO_OUT),
            )?;
        }
    }

    Ok(AudioMixPlan { inputs, graph })
}

/// Copy the video, encode the mix, stop at the video's end.
pub fn mix_output_args(encoder: &EncoderSettings) -> Vec<String> {
    vec![
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        format!("[{AUDIO_OUT}]"),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        encoder.audio_bitrate.clone(),
        "-shortest".to_string(),
    ]
}
