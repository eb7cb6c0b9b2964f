//! Service-boundary error taxonomy.
//!
//! Every internal failure is translated into one of these variants
//! before it crosses the RPC boundary; the wire layer maps them onto
//! gRPC-style numeric codes. Misses and integrity mismatches are not
//! errors: a miss is a normal lookup outcome and a mismatched declared
//! digest is logged and overridden.

use thiserror::Error;

use crate::store::StoreError;

use dispensa_api_types::code;

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// Store capacity exhausted or the artifact exceeds its size
    /// ceiling; transient from the protocol's point of view.
    #[error("store capacity: {message}")]
    Capacity { message: String },
    /// Concurrency limit reached; the request was rejected rather than
    /// queued and starved.
    #[error("server is at its concurrency limit")]
    Backpressure,
    /// The per-request deadline elapsed before the operation finished.
    #[error("request deadline exceeded")]
    DeadlineExceeded,
    /// Anything internal that has no better classification.
    #[error("internal failure: {message}")]
    Internal { message: String },
}

impl ServiceError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Numeric status carried in the error envelope.
    pub fn grpc_code(&self) -> u32 {
        match self {
            Self::Capacity { .. } | Self::Backpressure | Self::DeadlineExceeded => {
                code::UNAVAILABLE
            }
            Self::Internal { .. } => code::UNKNOWN,
        }
    }

    /// True for conditions the client is expected to retry or silently
    /// fall back from.
    pub fn is_transient(&self) -> bool {
        self.grpc_code() == code::UNAVAILABLE
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ArtifactTooLarge { .. } => Self::Capacity {
                message: err.to_string(),
            },
        }
    }
}
