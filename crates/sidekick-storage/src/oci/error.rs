//! Errors of the OCI Object Storage output

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for OCI operations
pub type OciResult<T> = std::result::Result<T, OciError>;

/// Everything that can go wrong between an event and a stored object
#[derive(Debug, Error)]
pub enum OciError {
    /// Output configuration is incomplete or malformed
    #[error("configuration error: {0}")]
    Config(String),

    /// Event could not be encoded as JSON
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Private key file could not be read
    #[error("error while reading private key from {}: {source}", path.display())]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Private key material could not be decoded
    #[error("invalid private key: {0}")]
    KeyParse(String),

    /// Request could not be signed
    #[error("signing error: {0}")]
    Signing(String),

    /// HTTP client could not be built
    #[error("error while creating object storage client: {0}")]
    Client(String),

    /// Request never got a response
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Object Storage answered with an error status
    #[error("service error (status {status}, code {code}): {message} [opc-request-id: {opc_request_id}]")]
    Service {
        status: u16,
        code: String,
        message: String,
        opc_request_id: String,
    },
}

impl OciError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a key parsing error
    pub fn key_parse(msg: impl Into<String>) -> Self {
        Self::KeyParse(msg.into())
    }

    /// HTTP status of a service error
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Service { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
