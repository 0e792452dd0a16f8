use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed error taxonomy of the engine. Every fault a caller can observe
/// carries exactly one of these kinds; `Conflict` is the only retriable one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    InvalidState,
    InsufficientFunds,
    NotEnoughParticipants,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Authentication => "AUTHENTICATION",
            ErrorKind::Authorization => "AUTHORIZATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorKind::NotEnoughParticipants => "NOT_ENOUGH_PARTICIPANTS",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    kind: ErrorKind,
    message: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    pub fn insufficient_funds(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InsufficientFunds, message)
    }

    pub fn not_enough_participants(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotEnoughParticipants, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Only optimistic-concurrency collisions and singleton violations are
    /// worth retrying with a fresh read.
    pub fn is_retriable(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for EngineError {}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(e, _) = &err {
            if e.code == rusqlite::ErrorCode::ConstraintViolation {
                return Self::conflict(format!("constraint violation: {}", err));
            }
        }
        Self::internal(format!("storage error: {}", err))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("serialization error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_kind_and_message() {
        let err = EngineError::conflict("round is full");
        assert_eq!(err.to_string(), "CONFLICT: round is full");
    }

    #[test]
    fn only_conflict_is_retriable() {
        assert!(EngineError::conflict("x").is_retriable());
        assert!(!EngineError::invalid_state("x").is_retriable());
        assert!(!EngineError::internal("x").is_retriable());
    }

    #[test]
    fn kind_serializes_to_taxonomy_name() {
        let json = serde_json::to_string(&ErrorKind::NotEnoughParticipants).unwrap();
        assert_eq!(json, "\"NOT_ENOUGH_PARTICIPANTS\"");
    }
}
