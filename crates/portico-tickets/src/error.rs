//! Ticket errors.

use portico_core::ErrorKind;

/// Errors from issuing or validating tickets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TicketError {
    #[error("Missing credential")]
    MissingCredential,

    #[error("Invalid credential")]
    InvalidCredential,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("User {uid} is not entitled to plugin {plugin_id}")]
    NotEntitled { uid: String, plugin_id: String },

    #[error("Missing ticket")]
    MissingTicket,

    #[error("Malformed ticket: {0}")]
    Malformed(String),

    #[error("Invalid ticket signature")]
    BadSignature,

    #[error("Ticket has expired")]
    Expired,

    #[error("Ticket is not yet valid")]
    NotYetValid,

    #[error("Ticket was issued for another plugin")]
    PluginMismatch,

    #[error("Ticket has already been used")]
    Replayed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TicketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TicketError::MissingCredential | TicketError::InvalidCredential => {
                ErrorKind::Unauthenticated
            }
            TicketError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            TicketError::NotEntitled { .. }
            | TicketError::MissingTicket
            | TicketError::Malformed(_)
            | TicketError::BadSignature
            | TicketError::Expired
            | TicketError::NotYetValid
            | TicketError::PluginMismatch
            | TicketError::Replayed => ErrorKind::PermissionDenied,
            TicketError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error is a validator denial (as opposed to an issuance failure).
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            TicketError::MissingTicket
                | TicketError::Malformed(_)
                | TicketError::BadSignature
                | TicketError::Expired
                | TicketError::NotYetValid
                | TicketError::PluginMismatch
                | TicketError::Replayed
        )
    }
}

pub type Result<T> = std::result::Result<T, TicketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(TicketError::MissingCredential.kind(), ErrorKind::Unauthenticated);
        assert_eq!(
            TicketError::InvalidArgument("pluginId".into()).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(TicketError::Replayed.kind(), ErrorKind::PermissionDenied);
        assert!(TicketError::Expired.is_denial());
        assert!(!TicketError::InvalidCredential.is_denial());
    }
}
