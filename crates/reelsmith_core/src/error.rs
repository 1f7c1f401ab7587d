use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("template error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("config error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("invalid logo width: {0:?}")]
    InvalidLogoWidth(String),

    #[error("invalid color: {0:?}")]
    InvalidColor(String),

    #[error("unknown stage: {0}")]
    UnknownStage(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
