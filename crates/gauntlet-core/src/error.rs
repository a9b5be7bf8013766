//! Tournament error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TournamentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Opening book error: {0}")]
    OpeningLoad(String),

    #[error("Engine '{name}' failed to start: {reason}")]
    EngineStart { name: String, reason: String },

    #[error("Engine '{name}' I/O failure: {reason}")]
    EngineIo { name: String, reason: String },

    #[error("Engine '{name}' played illegal move '{mv}'")]
    IllegalMove { name: String, mv: String },

    #[error("Archive write failed: {0}")]
    ArchiveWrite(#[source] std::io::Error),

    #[error("Tournament interrupted")]
    Interrupted,
}

impl TournamentError {
    /// Engine name the error is attributable to, if any.
    pub fn engine_name(&self) -> Option<&str> {
        match self {
            TournamentError::EngineStart { name, .. }
            | TournamentError::EngineIo { name, .. }
            | TournamentError::IllegalMove { name, .. } => Some(name),
            _ => None,
        }
    }
}
