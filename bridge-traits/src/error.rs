use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The platform refused the operation because of a user-agent policy
    /// (for example, autoplay restrictions on unattended playback).
    #[error("Rejected by platform policy: {0}")]
    PolicyRejected(String),

    #[error("Bridge resource is no longer live: {0}")]
    ResourceRevoked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns `true` if the platform rejected the call on policy grounds.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, BridgeError::PolicyRejected(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
