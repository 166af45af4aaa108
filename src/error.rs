//! Crate-wide error type.
//!
//! One variant per error kind in the design's error-handling table. Kept
//! separate from `anyhow` so the library stays usable by callers who don't
//! want to adopt it in their own public APIs.

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Configuration failed validation; fatal at startup.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The decoder subprocess could not reach the source (auth, routing, timeout).
    #[error("source '{source_name}' unreachable: {reason}")]
    DecoderUnreachable { source_name: String, reason: String },

    /// The decoder subprocess exited (cleanly or otherwise).
    #[error("decoder for '{0}' exited")]
    DecoderExited(String),

    /// Stream ended with a partial frame still in the accumulation buffer.
    #[error("truncated frame for '{0}': {1} bytes discarded")]
    FrameTruncated(String, usize),

    /// The inference engine rejected the input or failed internally.
    #[error("inference invalid: {0}")]
    InferenceInvalid(String),

    /// The publish sink could not be reached; the event is still committed locally.
    #[error("sink unavailable: {0}")]
    SinkUnavailable(String),

    /// The CSV audit writer failed; further writes for this process are disabled.
    #[error("csv write failed: {0}")]
    CsvWriteError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
