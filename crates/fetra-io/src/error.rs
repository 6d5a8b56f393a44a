//! Error types for fetra-io.

use fetra_deck::{ParseError, ParseFailure};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IoError>;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("cannot write {entity} for {target}: {message}")]
    Writing {
        entity: String,
        target: String,
        message: String,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("model error: {0}")]
    Model(#[from] fetra_model::ModelError),

    #[error("mesh error: {0}")]
    Mesh(#[from] fetra_model::MeshError),

    #[error("refusing to overwrite {0}")]
    WouldOverwrite(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ParseFailure> for IoError {
    fn from(failure: ParseFailure) -> Self {
        match failure {
            ParseFailure::Fatal(err) => IoError::Parse(err),
            // Skips are consumed by the dispatchers; one reaching the top
            // means a command could not be recovered from.
            ParseFailure::Skip { .. } => {
                IoError::Unsupported("command skipped during parsing".to_string())
            }
        }
    }
}
