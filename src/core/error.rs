//! Error types for the fusion engine

use thiserror::Error;

/// Main error type for the engine
///
/// Capacity exhaustion, invalid depth samples and tracking loss are not
/// errors: they degrade the model and are reported through
/// [`FrameReport`](crate::engine::FrameReport). Everything here aborts the
/// operation that raised it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Block transfer failed: {0}")]
    Transfer(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Mesh error: {0}")]
    Mesh(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
