//! Seams for the external services that produce the pipeline's raw inputs:
//! narration audio, word timings and source footage. The implementations
//! here work from files already on disk.

use reelsmith_core::captions::{load_words, WordTimestamp};
use reelsmith_core::error::CoreError;
use reelsmith_core::types::Stage;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{RenderError, Result};
use crate::run::PipelineRun;

/// Produces the narration track for a run.
pub trait SpeechSynthesizer {
    /// Write the voice track to `dest`.
    fn synthesize(&self, run: &PipelineRun, dest: &Path) -> Result<()>;
}

/// Produces word-level timings for the narration.
pub trait Transcriber {
    fn transcribe(&self, run: &PipelineRun, audio: &Path) -> Result<Vec<WordTimestamp>>;
}

/// Produces the source clip for a run.
pub trait FootageProvider {
    /// Write the source clip to `dest`.
    fn fetch(&self, run: &PipelineRun, dest: &Path) -> Result<()>;
}

/// Collaborators a pipeline is built with.
pub struct Collaborators {
    pub voice: Box<dyn SpeechSynthesizer + Send>,
    pub transcriber: Box<dyn Transcriber + Send>,
    pub footage: Box<dyn FootageProvider + Send>,
}

impl Collaborators {
    /// File-backed collaborators: an existing voice file, a JSON word list
    /// and a local clip. Any of them may be absent; the stage that needs it
    /// fails with a missing-input error.
    pub fn from_files(voice: Option<PathBuf>, words: Option<PathBuf>, source: Option<PathBuf>) -> Self {
        Self {
            voice: Box::new(ImportedVoice(voice)),
            transcriber: Box::new(WordsFile(words)),
            footage: Box::new(LocalFootage(source)),
        }
    }
}

fn require<'a>(path: &'a Option<PathBuf>, what: &'static str) -> Result<&'a Path> {
    match path {
        Some(p) if p.is_file() => Ok(p.as_path()),
        Some(p) => Err(RenderError::MissingInput {
            what,
            path: p.clone(),
        }),
        None => Err(RenderError::MissingInput {
            what,
            path: PathBuf::new(),
        }),
    }
}

fn copy_into(stage: Stage, src: &Path, dest: &Path) -> Result<()> {
    let bytes = std::fs::copy(src, dest)?;
    if bytes == 0 {
        return Err(RenderError::Collaborator {
            stage,
            message: format!("{} is empty", src.display()),
        });
    }
    info!(%stage, from = %src.display(), bytes, "imported");
    Ok(())
}

/// Uses a pre-recorded voice file.
#[derive(Debug, Clone)]
pub struct ImportedVoice(pub Option<PathBuf>);

impl SpeechSynthesizer for ImportedVoice {
    fn synthesize(&self, _run: &PipelineRun, dest: &Path) -> Result<()> {
        copy_into(Stage::Voice, require(&self.0, "voice track")?, dest)
    }
}

/// Reads word timings from a JSON list of `{word, start, end}`.
#[derive(Debug, Clone)]
pub struct WordsFile(pub Option<PathBuf>);

impl Transcriber for WordsFile {
    fn transcribe(&self, _run: &PipelineRun, _audio: &Path) -> Result<Vec<WordTimestamp>> {
        let path = require(&self.0, "word timestamps")?;
        load_words(path).map_err(|e| match e {
            CoreError::Json(e) => RenderError::Collaborator {
                stage: Stage::Transcript,
                message: format!("{}: {e}", path.display()),
            },
            other => other.into(),
        })
    }
}

/// Uses a clip already on disk.
#[derive(Debug, Clone)]
pub struct LocalFootage(pub Option<PathBuf>);

impl FootageProvider for LocalFootage {
    fn fetch(&self, _run: &PipelineRun, dest: &Path) -> Result<()> {
        copy_into(Stage::Source, require(&self.0, "source footage")?, dest)
    }
}
