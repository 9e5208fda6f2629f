//! Error types for bookledger

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Malformed input at a boundary: missing transaction fields, an
    /// unparsable peer address, a malformed remote chain response.
    ValidationError(String),
    /// Peer unreachable, timed out, or answered with a non-success status.
    TransportError(String),
    /// A candidate chain failed hash-link validation.
    IntegrityError(String),
    ConfigError(String),
    IoError(String),
    SerializationError(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            ChainError::TransportError(msg) => write!(f, "Transport error: {}", msg),
            ChainError::IntegrityError(msg) => write!(f, "Integrity error: {}", msg),
            ChainError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            ChainError::IoError(msg) => write!(f, "IO error: {}", msg),
            ChainError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        let err = ChainError::ValidationError("Missing keys".to_string());
        assert_eq!(err.to_string(), "Validation error: Missing keys");

        let err = ChainError::TransportError("connection refused".to_string());
        assert_eq!(err.to_string(), "Transport error: connection refused");
    }

    #[test]
    fn test_from_serde_json_error() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: ChainError = parse.unwrap_err().into();
        assert!(matches!(err, ChainError::SerializationError(_)));
    }
}
