//! Cloud session error types.

use thiserror::Error;

/// Errors from cloud variable sessions.
#[derive(Debug, Error)]
pub enum CloudError {
    /// A read or write was attempted without an established connection.
    #[error("cloud variable connection is not established")]
    NotConnected,

    /// A read was attempted while no recorder is attached to the session.
    #[error("cloud recorder is not initialized")]
    RecorderUninitialized,

    /// The handshake message could not be sent after the socket opened.
    #[error("handshake failed: {reason}")]
    Handshake {
        /// Why the handshake send failed.
        reason: String,
    },

    /// The socket could not be opened.
    #[error("failed to connect to {endpoint}: {reason}")]
    Transport {
        /// The endpoint that was dialed.
        endpoint: String,
        /// What went wrong while opening.
        reason: String,
    },

    /// The upgrade request could not be built (bad URL, header, or cookie).
    #[error("invalid connection request: {reason}")]
    InvalidRequest {
        /// The offending part of the request.
        reason: String,
    },

    /// An outbound frame could not be written to the socket.
    #[error("send failed: {reason}")]
    Send {
        /// The transport error.
        reason: String,
    },

    /// An outbound frame could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    /// A wait did not complete in time.
    #[error("timed out after {timeout_ms}ms: {context}")]
    Timeout {
        /// How long we waited.
        timeout_ms: u64,
        /// What we were waiting for.
        context: String,
    },
}

/// Result type for cloud session operations.
pub type Result<T> = std::result::Result<T, CloudError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_connected_display() {
        let err = CloudError::NotConnected;
        assert_eq!(
            err.to_string(),
            "cloud variable connection is not established"
        );
    }

    #[test]
    fn recorder_uninitialized_display() {
        let err = CloudError::RecorderUninitialized;
        assert_eq!(err.to_string(), "cloud recorder is not initialized");
    }

    #[test]
    fn handshake_display() {
        let err = CloudError::Handshake {
            reason: "connection reset".into(),
        };
        assert_eq!(err.to_string(), "handshake failed: connection reset");
    }

    #[test]
    fn transport_display() {
        let err = CloudError::Transport {
            endpoint: "wss://example.invalid/".into(),
            reason: "dns error".into(),
        };
        assert!(err.to_string().contains("wss://example.invalid/"));
        assert!(err.to_string().contains("dns error"));
    }

    #[test]
    fn timeout_display() {
        let err = CloudError::Timeout {
            timeout_ms: 250,
            context: "waiting for ☁ Score".into(),
        };
        assert!(err.to_string().contains("250ms"));
        assert!(err.to_string().contains("☁ Score"));
    }

    #[test]
    fn encode_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: CloudError = json_err.into();
        assert!(matches!(err, CloudError::Encode(_)));
    }
}
