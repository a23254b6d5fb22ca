//! Error taxonomy shared by every engine and the dispatcher boundary.

use serde::{Deserialize, Serialize};

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Malformed caller input. Raised before any I/O.
    #[error("invalid input: {0}")]
    Validation(String),
    /// Wrong password, missing session secret, or an undecryptable blob.
    #[error("authentication failed")]
    AuthFailure,
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("{0}")]
    RejectedByUser(String),
    #[error("indexer: {0}")]
    Network(String),
    /// Disallowed signature-hash flag.
    #[error("sighash type {0} is not allowed")]
    PolicyViolation(u32),
    #[error("storage: {0}")]
    Storage(String),
    #[error("crypto: {0}")]
    Crypto(String),
    #[error("serialization: {0}")]
    Serialization(String),
}

/// Stable error class carried in response envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Validation,
    AuthFailure,
    InsufficientFunds,
    RejectedByUser,
    Network,
    PolicyViolation,
    Internal,
}

impl VaultError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Validation(_) => ErrorKind::Validation,
            VaultError::AuthFailure => ErrorKind::AuthFailure,
            VaultError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            VaultError::RejectedByUser(_) => ErrorKind::RejectedByUser,
            VaultError::Network(_) => ErrorKind::Network,
            VaultError::PolicyViolation(_) => ErrorKind::PolicyViolation,
            VaultError::Storage(_) | VaultError::Crypto(_) | VaultError::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Message safe to hand to an untrusted page. Internal detail is dropped.
    pub fn public_message(&self) -> String {
        match self {
            VaultError::Validation(_)
            | VaultError::InsufficientFunds { .. }
            | VaultError::RejectedByUser(_)
            | VaultError::PolicyViolation(_) => self.to_string(),
            VaultError::AuthFailure => "Authentication failed".into(),
            VaultError::Network(_) => "Network request failed".into(),
            VaultError::Storage(_) | VaultError::Crypto(_) | VaultError::Serialization(_) => {
                "Internal error".into()
            }
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}
