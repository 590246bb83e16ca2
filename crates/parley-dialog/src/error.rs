//! Error types for the dialog layer.

use parley_core::ParleyError;
use uuid::Uuid;

/// Errors from session management.
///
/// Clarifications are ordinary `ResolvedCommand`s and never appear here.
#[derive(Debug, thiserror::Error)]
pub enum DialogError {
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),
    #[error("session table lock poisoned")]
    LockPoisoned,
    #[error("snapshot rejected: {0}")]
    Snapshot(String),
    #[error(transparent)]
    Core(#[from] ParleyError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialog_error_display() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            DialogError::SessionNotFound(id).to_string(),
            "session not found: 550e8400-e29b-41d4-a716-446655440000"
        );
        assert_eq!(
            DialogError::LockPoisoned.to_string(),
            "session table lock poisoned"
        );
        assert_eq!(
            DialogError::Snapshot("unsupported version 9".to_string()).to_string(),
            "snapshot rejected: unsupported version 9"
        );
    }

    #[test]
    fn test_dialog_error_from_core() {
        let err: DialogError = ParleyError::Serialization("bad json".to_string()).into();
        assert!(matches!(err, DialogError::Core(_)));
        assert_eq!(err.to_string(), "Serialization error: bad json");
    }
}
