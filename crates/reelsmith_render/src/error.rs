use reelsmith_core::error::CoreError;
use reelsmith_core::types::Stage;
use std::path::PathBuf;
use thiserror::Error;

use crate::graph::GraphError;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to execute ffprobe: {0}")]
    FfprobeExec(String),

    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    #[error("ffmpeg not found")]
    FfmpegNotFound,

    #[error("missing {what}: {}", .path.display())]
    MissingInput { what: &'static str, path: PathBuf },

    #[error("{stage} encode failed ({status}):\n{diagnostics}")]
    EncoderFailed {
        stage: Stage,
        status: String,
        diagnostics: String,
    },

    #[error("could not determine duration of {}", .0.display())]
    UnknownDuration(PathBuf),

    #[error("invalid filter graph: {0}")]
    Graph(#[from] GraphError),

    #[error("{stage} collaborator failed: {message}")]
    Collaborator { stage: Stage, message: String },

    #[error("stage {stage} failed: {source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: Box<RenderError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl RenderError {
    /// Attach the failing stage, unless the error already names one.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            err @ RenderError::StageFailed { .. } => err,
            err => RenderError::StageFailed {
                stage,
                source: Box::new(err),
            },
        }
    }

    /// The stage this error was raised in, if known.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RenderError::StageFailed { stage, .. }
            | RenderError::EncoderFailed { stage, .. }
            | RenderError::Collaborator { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<tempfile::PersistError> for RenderError {
    fn from(err: tempfile::PersistError) -> Self {
        RenderError::Io(err.error)
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_stage_wraps_once() {
        let err = RenderError::FfmpegNotFound.in_stage(Stage::Crop);
        assert_eq!(err.stage(), Some(Stage::Crop));
        let err = err.in_stage(Stage::Mix);
        assert_eq!(err.stage(), Some(Stage::Crop));
        assert_eq!(err.to_string(), "stage crop failed: ffmpeg not found");
    }

    #[test]
    fn encoder_failure_carries_diagnostics() {
        let err = RenderError::EncoderFailed {
            stage: Stage::Composite,
            status: "exit status: 1".into(),
            diagnostics: "No such filter: 'overlayy'".into(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("composite encode failed"));
        assert!(msg.contains("No such filter"));
    }
}
