//! Blocking client for storage-zone object storage over HTTP.
//!
//! This crate provides upload (with optional SHA-256 checksum), full and
//! byte-range download, file and recursive directory delete, directory listing,
//! and best-effort metadata retrieval against a storage zone addressed as
//! `https://<region host>/<zone name>`. Transient overload (`429 Too Many
//! Requests`) is retried automatically with a bounded attempt budget.

pub mod checksum;
pub mod classify;
pub mod client;
pub mod config;
pub mod object;
pub mod path;
pub mod range;
pub mod retry;
pub mod transport;

pub use checksum::{checksum, checksum_reader, CHECKSUM_HEADER};
pub use classify::{classify, OperationKind, Outcome};
pub use client::{Client, ObjectReader};
pub use config::{AccessKey, ClientConfig, DEFAULT_MAX_ATTEMPTS};
pub use object::Object;
pub use range::ByteRange;
pub use retry::{Backoff, RetryCondition, RetryPolicy, RetryingTransport};
pub use transport::{HttpTransport, Request, Response, Transport, Verb};

use thiserror::Error;

/// Header carrying the zone credential on every request.
pub const ACCESS_KEY_HEADER: &str = "AccessKey";

/// Boxed error produced by a [`Transport`] implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
    #[error("{status} {reason}")]
    Backend { status: u16, reason: String },
    #[error("checksum computation failed: {0}")]
    Integrity(#[source] std::io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid byte range: {start}-{end}")]
    InvalidRange { start: u64, end: u64 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("client config error: {0}")]
    Config(String),
}

impl StorageError {
    /// HTTP status of a backend failure, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<ureq::Error> for StorageError {
    fn from(e: ureq::Error) -> Self {
        Self::Transport(Box::new(e))
    }
}
