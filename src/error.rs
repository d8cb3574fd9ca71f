/// Error handling for the certificate engine
use crate::types::{AcmeProblem, AcmeSubproblem};
use std::time::Duration;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error kinds surfaced by the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Retry-eligible failure (network, timeout, exhausted badNonce retries)
    #[error("Transient error: {0}")]
    Transient(String),

    /// Server asked us to back off; stop immediately
    #[error("Rate limited, retry after: {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Account key/URI mismatch, or account revoked/deactivated/missing
    #[error("Account invalid: {0}")]
    AccountInvalid(String),

    /// Updated terms of service or other human action needed
    #[error("User action required: {0}")]
    UserActionRequired(String),

    /// One identifier failed its proof of control
    #[error("Authorization failed for {identifier}: {detail}")]
    AuthorizationFailed {
        identifier: String,
        detail: String,
        subproblems: Vec<AcmeSubproblem>,
    },

    /// Order never reached ready/valid within its allowance
    #[error("Finalization timeout: {0}")]
    FinalizationTimeout(String),

    /// CSR, key, or PKCS#12 packaging failure
    #[error("Assembly failure: {0}")]
    Assembly(String),

    /// Revocation request rejected
    #[error("Revocation failed: {0}")]
    Revocation(String),

    /// Problem document from the ACME server not covered by a kind above
    #[error("ACME problem: {0}")]
    Acme(AcmeProblem),

    /// Operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Cryptographic operation error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// PEM encoding/decoding error
    #[error("PEM error: {0}")]
    Pem(String),

    /// Settings store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Create a transient error
    pub fn transient<S: Into<String>>(msg: S) -> Self {
        EngineError::Transient(msg.into())
    }

    /// Create an account error
    pub fn account_invalid<S: Into<String>>(msg: S) -> Self {
        EngineError::AccountInvalid(msg.into())
    }

    /// Create an assembly error
    pub fn assembly<S: Into<String>>(msg: S) -> Self {
        EngineError::Assembly(msg.into())
    }

    /// Create a revocation error
    pub fn revocation<S: Into<String>>(msg: S) -> Self {
        EngineError::Revocation(msg.into())
    }

    /// Create a crypto error
    pub fn crypto<S: Into<String>>(msg: S) -> Self {
        EngineError::Crypto(msg.into())
    }

    /// Create a PEM error
    pub fn pem<S: Into<String>>(msg: S) -> Self {
        EngineError::Pem(msg.into())
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        EngineError::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        EngineError::Config(msg.into())
    }

    /// Whether a local retry within the caller's budget is worthwhile
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Transient(err.to_string())
    }
}

impl From<openssl::error::ErrorStack> for EngineError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        EngineError::Crypto(err.to_string())
    }
}
