//! Master, storage and transport error types.

use derive_more::{Display, Error};

/// Storage backend failure with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Storage error: {} at {}:{}", message, file, line)]
pub struct StorageError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl StorageError {
    /// Creates a new storage error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Transport failure with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Transport error: {} at {}:{}", message, file, line)]
pub struct TransportError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl TransportError {
    /// Creates a new transport error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// What went wrong while handling a request.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum MasterErrorKind {
    /// Credentials were missing or wrong.
    #[display("unauthorized action")]
    Unauthorized,
    /// No state is stored under the game ID.
    #[display("game not found")]
    GameNotFound,
    /// The storage backend failed.
    #[display("storage failure: {}", _0)]
    Storage(String),
    /// The transport failed.
    #[display("transport failure: {}", _0)]
    Transport(String),
}

/// Master error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Master error: {} at {}:{}", kind, file, line)]
pub struct MasterError {
    /// Error category.
    pub kind: MasterErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl MasterError {
    /// Creates a new master error with caller location tracking.
    #[track_caller]
    pub fn new(kind: MasterErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Credentials check failed.
    #[track_caller]
    pub fn unauthorized() -> Self {
        Self::new(MasterErrorKind::Unauthorized)
    }

    /// No stored state for the game.
    #[track_caller]
    pub fn game_not_found() -> Self {
        Self::new(MasterErrorKind::GameNotFound)
    }

    /// Error category.
    pub fn kind(&self) -> &MasterErrorKind {
        &self.kind
    }
}

impl From<StorageError> for MasterError {
    #[track_caller]
    fn from(err: StorageError) -> Self {
        Self::new(MasterErrorKind::Storage(err.to_string()))
    }
}

impl From<TransportError> for MasterError {
    #[track_caller]
    fn from(err: TransportError) -> Self {
        Self::new(MasterErrorKind::Transport(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(MasterErrorKind::Unauthorized.to_string(), "unauthorized action");
        assert_eq!(MasterErrorKind::GameNotFound.to_string(), "game not found");
        let err = MasterError::game_not_found();
        assert!(err.to_string().starts_with("Master error: game not found at "));
        assert_eq!(err.kind(), &MasterErrorKind::GameNotFound);
    }

    #[test]
    fn test_storage_error_converts() {
        let err: MasterError = StorageError::new("disk full").into();
        match err.kind() {
            MasterErrorKind::Storage(message) => assert!(message.contains("disk full")),
            other => panic!("unexpected kind {:?}", other),
        }
    }
}
