//! Error types for the tracking layer

/// Errors raised by displays, realities, sessions and the native bridge.
///
/// Lookups that can legitimately miss (anchors, hit tests) return `Option`
/// instead of one of these.
#[derive(Debug, thiserror::Error)]
pub enum XrError {
    #[error("No compatible tracking backend found for display: {0}")]
    NoCompatibleBackend(String),

    #[error("Session parameters not supported: {0}")]
    UnsupportedSession(String),

    #[error("Native bridge is not initialized")]
    BridgeNotInitialized,

    #[error("Native bridge transport failed: {0}")]
    BridgeTransport(String),

    #[error("Native bridge dropped the reply for {action}")]
    CallbackDropped { action: String },

    #[error("Malformed native bridge response for {action}: {source}")]
    MalformedResponse {
        action: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Screen coordinates must be within [0, 1], got ({x}, {y})")]
    InvalidScreenCoordinates { x: f32, y: f32 },

    #[error("Matrix is not invertible")]
    NonInvertibleMatrix,

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Detection image activation failed: {0}")]
    ImageActivationFailed(String),

    #[error("Session has ended")]
    SessionEnded,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Result type for tracking operations
pub type Result<T> = std::result::Result<T, XrError>;
