//! Realtime client error types.

use std::time::Duration;

/// Errors that can occur while driving a realtime speech task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealtimeError {
    /// The transport could not be established. The caller may retry.
    #[error("Failed to connect: {0}")]
    Connect(String),

    /// A frame could not be written (usually because the channel is closed).
    #[error("Failed to send frame: {0}")]
    Send(String),

    /// An operation was issued outside its legal task state.
    #[error("Operation `{operation}` is not allowed while the task is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// Label of the state the task (or pipeline) was in.
        state: String,
    },

    /// The peer reported `task-failed`, or the channel dropped mid-task.
    #[error("Task {task_id} failed: {message}")]
    ProtocolFailure {
        /// The failed task.
        task_id: String,
        /// The peer's error message.
        message: String,
    },

    /// The peer closed the channel or the network dropped.
    #[error("Channel closed")]
    ChannelClosed,

    /// The task was abandoned by `interrupt()`.
    #[error("Task {task_id} was interrupted")]
    Interrupted {
        /// The abandoned task.
        task_id: String,
    },

    /// A frame could not be encoded or decoded.
    #[error("Malformed frame: {0}")]
    Codec(String),

    /// A caller-supplied deadline elapsed.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An audio source or sink failed.
    #[error("Audio I/O error: {0}")]
    Audio(String),
}

impl RealtimeError {
    /// Build an [`InvalidState`](Self::InvalidState) error.
    pub fn invalid_state(operation: &'static str, state: impl Into<String>) -> Self {
        Self::InvalidState {
            operation,
            state: state.into(),
        }
    }

    /// Whether the caller may reasonably retry after reconnecting.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::ChannelClosed | Self::ProtocolFailure { .. } | Self::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<std::io::Error> for RealtimeError {
    fn from(err: std::io::Error) -> Self {
        Self::Audio(err.to_string())
    }
}

/// Result alias used throughout the realtime crates.
pub type Result<T> = std::result::Result<T, RealtimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_message_names_operation_and_state() {
        let err = RealtimeError::invalid_state("submit_audio", "finished");
        assert_eq!(
            err.to_string(),
            "Operation `submit_audio` is not allowed while the task is finished"
        );
    }

    #[test]
    fn codec_errors_convert_from_serde() {
        let err: RealtimeError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, RealtimeError::Codec(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn transport_errors_are_retryable() {
        assert!(RealtimeError::ChannelClosed.is_retryable());
        assert!(RealtimeError::Connect("refused".into()).is_retryable());
        assert!(!RealtimeError::invalid_state("x", "created").is_retryable());
    }
}
