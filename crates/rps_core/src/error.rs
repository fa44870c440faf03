use std::path::PathBuf;

use thiserror::Error;

/// Failures of the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode or decode vault data: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("no record for {0}")]
    Missing(String),
    #[error("corrupt value for {key}: {value:?}")]
    Corrupt { key: String, value: String },
}
