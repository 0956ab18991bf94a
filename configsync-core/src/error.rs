use configsync_protocol::{AccountId, SigningError, StorageError, StoreError};
use thiserror::Error;

use crate::swarm::SwarmError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Coordinator already started")]
    AlreadyStarted,
    #[error("No tokio runtime available")]
    NoRuntime,
    #[error("No user is logged in")]
    NotLoggedIn,
    #[error("Unknown group: {0}")]
    UnknownGroup(AccountId),
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
    #[error("Config store error: {0}")]
    Store(#[from] StoreError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Swarm error: {0}")]
    Swarm(#[from] SwarmError),
    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
