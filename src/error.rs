use thiserror::Error;

use crate::model::Id;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("ledger {0} not found (run `redash-migrate init` first)")]
    NotInitialized(String),

    #[error("ledger {0} already exists")]
    AlreadyInitialized(String),

    #[error("badly formed ledger: {0}")]
    CorruptLedger(String),

    #[error("{0} is not a valid phase (see --help for the list of phases)")]
    UnknownPhase(String),

    #[error("locked by another process: {0}")]
    Locked(String),

    #[error("origin user {0} not found in the ledger (was this user disabled?)")]
    UserNotMapped(Id),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{method} {url} returned {status}: {body}")]
    Http {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized(_) => "not_initialized",
            Self::AlreadyInitialized(_) => "already_initialized",
            Self::CorruptLedger(_) => "corrupt_ledger",
            Self::UnknownPhase(_) => "unknown_phase",
            Self::Locked(_) => "locked",
            Self::UserNotMapped(_) => "user_not_mapped",
            Self::InvalidInput(_) => "invalid_input",
            Self::Http { .. } => "http_error",
            Self::Transport(_) => "transport_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;
