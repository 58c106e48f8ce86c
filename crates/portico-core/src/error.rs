//! Error taxonomy shared by every Portico crate.
//!
//! Each crate keeps its own error enum; all of them classify into one of
//! these kinds so callers (and the HTTP layer) can react uniformly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a failure at the plugin trust boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The caller presented no credential, or an invalid one.
    Unauthenticated,
    /// The caller is known but not entitled to the resource.
    PermissionDenied,
    /// A required argument was missing or malformed.
    InvalidArgument,
    /// Unknown plugin or resource.
    NotFound,
    /// A handshake or call deadline elapsed.
    Timeout,
    /// Message from an origin outside the allow-list. Never surfaced to the sender.
    OriginRejected,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::OriginRejected => "ORIGIN_REJECTED",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_as_code() {
        let json = serde_json::to_string(&ErrorKind::PermissionDenied).unwrap();
        assert_eq!(json, "\"PERMISSION_DENIED\"");
        assert_eq!(ErrorKind::PermissionDenied.to_string(), "PERMISSION_DENIED");
    }
}
