//! Error types for the fetch and cache stages.

use std::path::PathBuf;

/// Failure to complete a call to the asset service.
///
/// A server that answers with a readable error body is not a transport error;
/// that case is reported as [`crate::transport::CallOutcome::Failure`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to encode request data: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("failed to send request: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    ReadBody(String),

    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("server responded with status code {status} with no message")]
    NoMessage { status: u16 },
}

/// Failure to turn an asset response into a cached binary.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to decode asset payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("failed to decompress asset payload: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("failed to write binary to cache at {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to load the client certificate used for mutual TLS.
#[derive(Debug, thiserror::Error)]
pub enum ClientConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
}
