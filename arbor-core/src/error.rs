//! Error types for arbor operations

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ArborError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Observation not found: {0}")]
    ObservationNotFound(i64),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<notify::Error> for ArborError {
    fn from(err: notify::Error) -> Self {
        ArborError::Watch(err.to_string())
    }
}
