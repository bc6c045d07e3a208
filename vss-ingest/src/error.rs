//! Error types for vss-ingest
//!
//! Feed and delivery problems are row- or message-scoped: the pipeline logs
//! them and carries on. Store problems use [`vss_common::Error`].

use thiserror::Error;

/// Problem reading the feed or one of its rows
#[derive(Debug, Error)]
pub enum FeedError {
    /// Feed file could not be opened or read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TSV (bad header, wrong field count, invalid UTF-8)
    #[error("Malformed feed at line {line}: {message}")]
    Malformed { line: u64, message: String },

    /// Required column empty
    #[error("Missing {field} at line {line}")]
    MissingField { line: u64, field: &'static str },

    /// Position is not a non-negative integer
    #[error("Invalid position {value:?} at line {line}")]
    InvalidPosition { line: u64, value: String },

    /// Star rating is not a small non-negative integer
    #[error("Invalid gold_stars {value:?} at line {line}")]
    InvalidStars { line: u64, value: String },
}

impl FeedError {
    pub(crate) fn from_csv(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        let message = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(e) => FeedError::Io(e),
            _ => FeedError::Malformed { line, message },
        }
    }
}

/// Failure of one outgoing notification on one channel
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Connection, TLS or timeout problem
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Remote end answered with a non-success status
    #[error("Rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Failure that aborts an ingestion run before its ledger entry is written
#[derive(Debug, Error)]
pub enum IngestError {
    /// Feed became unreadable part-way through
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    /// Store failure outside the per-record paths
    #[error(transparent)]
    Store(#[from] vss_common::Error),
}
