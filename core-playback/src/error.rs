//! # Playback Error Types
//!
//! Error types for synthesis requests, resource handling and playback control.
//!
//! Only a few kinds ever reach the user: network failures and engine failures
//! put the player in the `error` status with a generic message from
//! [`PlaybackError::user_message`]. Autoplay refusals and guard violations are
//! logged and otherwise swallowed.

use bridge_traits::BridgeError;
use thiserror::Error;

/// Generic message shown when synthesis fails.
pub const NETWORK_ERROR_MESSAGE: &str = "Unable to generate audio. Please try again.";

/// Generic message shown when the engine cannot play the audio.
pub const ENGINE_ERROR_MESSAGE: &str = "Audio playback failed.";

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Network Errors
    // ========================================================================
    /// Transport failure talking to the synthesis endpoint.
    #[error("Network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-2xx status.
    #[error("Synthesis endpoint returned HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// The endpoint answered 2xx but reported failure in its body.
    #[error("Synthesis rejected: {0}")]
    SynthesisRejected(String),

    /// The endpoint answered 2xx with no audio.
    #[error("Synthesis returned an empty payload")]
    EmptyPayload,

    // ========================================================================
    // Resource / Engine Errors
    // ========================================================================
    /// The platform could not create a playable reference for the payload.
    #[error("Failed to create playable resource: {0}")]
    Resource(String),

    /// The media engine failed to load, decode or play the audio.
    #[error("Playback engine error: {0}")]
    Engine(String),

    /// The platform refused playback that was not started by the user.
    #[error("Autoplay blocked: {0}")]
    AutoplayBlocked(String),

    // ========================================================================
    // Control Errors
    // ========================================================================
    /// A transport action was attempted while its guard did not hold.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Exporting the payload failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// The player task is no longer running.
    #[error("Player has shut down")]
    DriverClosed,

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if this error came from the synthesis request.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::Network(_)
                | PlaybackError::HttpStatus { .. }
                | PlaybackError::SynthesisRejected(_)
                | PlaybackError::EmptyPayload
        )
    }

    /// Returns `true` if this error came from the platform media stack.
    pub fn is_engine_error(&self) -> bool {
        matches!(self, PlaybackError::Engine(_) | PlaybackError::Resource(_))
    }

    /// Returns `true` if this error moves the player into the `error` status.
    pub fn is_user_visible(&self) -> bool {
        self.is_network_error() || self.is_engine_error()
    }

    /// Generic, presentable message for the error kind. Never includes the
    /// underlying detail.
    pub fn user_message(&self) -> &'static str {
        if self.is_network_error() {
            NETWORK_ERROR_MESSAGE
        } else if self.is_engine_error() {
            ENGINE_ERROR_MESSAGE
        } else {
            "Something went wrong."
        }
    }

    /// Classify a bridge failure reported by the media engine.
    pub fn from_engine(err: BridgeError) -> Self {
        match err {
            BridgeError::PolicyRejected(msg) => PlaybackError::AutoplayBlocked(msg),
            other => PlaybackError::Engine(other.to_string()),
        }
    }

    /// Classify a bridge failure reported by the HTTP client.
    pub fn from_transport(err: BridgeError) -> Self {
        PlaybackError::Network(err.to_string())
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_share_generic_message() {
        let errors = [
            PlaybackError::Network("connection refused".to_string()),
            PlaybackError::HttpStatus {
                status: 500,
                message: "Internal Server Error".to_string(),
            },
            PlaybackError::EmptyPayload,
        ];

        for err in errors {
            assert!(err.is_network_error());
            assert!(err.is_user_visible());
            assert_eq!(err.user_message(), NETWORK_ERROR_MESSAGE);
        }
    }

    #[test]
    fn policy_rejection_is_not_user_visible() {
        let err = PlaybackError::from_engine(BridgeError::PolicyRejected(
            "user gesture required".to_string(),
        ));
        assert!(matches!(err, PlaybackError::AutoplayBlocked(_)));
        assert!(!err.is_user_visible());
    }

    #[test]
    fn engine_failure_is_user_visible() {
        let err = PlaybackError::from_engine(BridgeError::OperationFailed("decode".to_string()));
        assert!(err.is_engine_error());
        assert_eq!(err.user_message(), ENGINE_ERROR_MESSAGE);
        assert!(!err.user_message().contains("decode"));
    }

    #[test]
    fn only_network_and_engine_failures_reach_the_user() {
        assert!(PlaybackError::Resource("object URL".to_string()).is_user_visible());
        assert!(PlaybackError::Engine("decode".to_string()).is_user_visible());
        assert!(!PlaybackError::Download("disk full".to_string()).is_user_visible());
        assert!(!PlaybackError::DriverClosed.is_user_visible());
        assert!(!PlaybackError::Internal("bug".to_string()).is_user_visible());
    }

    #[test]
    fn guard_violations_are_silent() {
        let err = PlaybackError::InvalidOperation("toggle_play while loading".to_string());
        assert!(!err.is_user_visible());
    }
}
