//! Error types for the LaneGuard environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Clone, Error)]
pub enum EnvError {
    /// Transform lookup did not complete within its bound
    #[error("Transform lookup timed out after {0}ms")]
    TransformTimeout(u64),

    /// No transform is known between the requested frames
    #[error("Frame not found: {0}")]
    FrameNotFound(String),

    /// Request could not be handed to the transport (channel closed, etc.)
    #[error("Publish error: {0}")]
    PublishError(String),

    /// Context operation failed
    #[error("Context error: {0}")]
    ContextError(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a publish error.
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::PublishError(msg.into())
    }

    /// Creates a frame-not-found error.
    pub fn frame_not_found(frame: impl std::fmt::Display) -> Self {
        Self::FrameNotFound(frame.to_string())
    }

    /// Returns true for errors caused by the lookup bound expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TransformTimeout(_) | Self::Timeout(_))
    }
}
