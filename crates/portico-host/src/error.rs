//! Host-side error types.

use portico_core::{ErrorKind, MessagingError, OriginError};
use portico_tickets::TicketError;

/// Errors from resolving, loading and bridging a plugin frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("Unknown plugin: {0}")]
    NotFound(String),

    /// In-process issuance refused the ticket.
    #[error("Ticket request failed: {0}")]
    Ticket(#[from] TicketError),

    /// A remote ticket service refused or failed the request.
    #[error("Ticket service returned {kind}: {message}")]
    TicketService { kind: ErrorKind, message: String },

    #[error("Invalid plugin URL: {0}")]
    InvalidUrl(String),

    #[error("Plugin failed to load: {0}")]
    LoadFailed(String),

    #[error("A plugin is already mounted")]
    AlreadyMounted,

    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

impl FrameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrameError::NotFound(_) => ErrorKind::NotFound,
            FrameError::Ticket(e) => e.kind(),
            FrameError::TicketService { kind, .. } => *kind,
            FrameError::InvalidUrl(_) => ErrorKind::InvalidArgument,
            FrameError::LoadFailed(_) | FrameError::AlreadyMounted | FrameError::Messaging(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<OriginError> for FrameError {
    fn from(e: OriginError) -> Self {
        FrameError::InvalidUrl(e.to_string())
    }
}

impl From<url::ParseError> for FrameError {
    fn from(e: url::ParseError) -> Self {
        FrameError::InvalidUrl(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
