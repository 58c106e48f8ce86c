//! SDK error types.

use portico_core::{ErrorKind, MessagingError};

/// Errors surfaced to plugin code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SdkError {
    /// `request_action` was called before `initialize`.
    #[error("SDK not initialized")]
    NotInitialized,

    /// No session arrived before the handshake deadline.
    #[error("Timed out waiting for session from host")]
    HandshakeTimeout,

    /// No response arrived before the per-call deadline.
    #[error("Action '{action}' timed out")]
    ActionTimeout { action: String },

    /// A session message from an allowed origin could not be used.
    #[error("Malformed session payload: {0}")]
    MalformedPayload(String),

    /// The host rejected the action. Carries the host's message verbatim.
    #[error("{0}")]
    Action(String),

    #[error("Host channel closed")]
    ChannelClosed,

    #[error("Failed to encode message: {0}")]
    Serialization(String),

    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

impl SdkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SdkError::HandshakeTimeout | SdkError::ActionTimeout { .. } => ErrorKind::Timeout,
            SdkError::MalformedPayload(_) => ErrorKind::InvalidArgument,
            SdkError::NotInitialized
            | SdkError::Action(_)
            | SdkError::ChannelClosed
            | SdkError::Serialization(_)
            | SdkError::Messaging(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_is_host_message() {
        assert_eq!(SdkError::Action("denied".into()).to_string(), "denied");
        assert_eq!(SdkError::HandshakeTimeout.kind(), ErrorKind::Timeout);
    }
}
