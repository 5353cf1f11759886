use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Input PDF not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Output directory not empty: {}. Pass overwrite to continue", .0.display())]
    OutputDirNotEmpty(PathBuf),

    #[error("pdfinfo failed: {0}")]
    PdfInfoFailed(String),

    #[error("pdftotext failed: {0}")]
    PdfToTextFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
