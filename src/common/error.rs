//! Error types for the test framework core
//!
//! Errors fall into three kinds (see [`ErrorKind`]): programming errors that
//! abort the current test unit, environment errors reported by sessions, and
//! decode misses on required fields. Messages name the offending field or
//! component so the failing test unit can be diagnosed from the log alone.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the framework core
#[derive(Error, Debug)]
pub enum Error {
    // === Context Errors ===
    #[error("Internal error: runtime context accessed before initialization")]
    ContextNotInitialized,

    // === Decode Errors ===
    #[error("Failed to parse {type_name}: required field '{field}' not found in output")]
    MissingField {
        type_name: &'static str,
        field: &'static str,
    },

    #[error("Failed to parse {type_name}: field '{field}': {reason}")]
    FieldConversion {
        type_name: &'static str,
        field: &'static str,
        reason: String,
    },

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Invalid extraction pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // === Session Errors ===
    #[error("Session '{name}' failed to start: {reason}")]
    SessionStartFailed { name: String, reason: String },

    #[error("Session '{name}' failed to close: {reason}")]
    SessionCloseFailed { name: String, reason: String },

    #[error("Session '{0}' is closed")]
    SessionClosed(String),

    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    // === Test Outcome Errors ===
    #[error("Verification failed: {0}")]
    VerifyFailed(String),

    #[error("Skipped: {0}")]
    Skipped(String),

    // === Timeout Errors ===
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    // === Testbed Errors ===
    #[error("Not enough logical cores on node '{node}': requested {requested}, {available} available")]
    NotEnoughCores {
        node: String,
        requested: String,
        available: usize,
    },

    #[error("Invalid logical core list '{0}'")]
    InvalidCoreList(String),

    #[error("Port '{port}' not found on node '{node}'")]
    PortNotFound { node: String, port: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error taxonomy used by the surrounding test driver
///
/// No component retries on its own; the driver decides from the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Programming error: abort the current test unit, never retry
    Internal,
    /// The environment misbehaved (a session failed to start, send or close)
    External,
    /// A required field's pattern did not match the output
    DecodeMiss,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ContextNotInitialized
            | Error::InvalidPattern { .. }
            | Error::Internal(_) => ErrorKind::Internal,
            Error::MissingField { .. }
            | Error::FieldConversion { .. }
            | Error::Conversion(_) => ErrorKind::DecodeMiss,
            _ => ErrorKind::External,
        }
    }

    /// Create a missing field error
    pub fn missing_field(type_name: &'static str, field: &'static str) -> Self {
        Self::MissingField { type_name, field }
    }

    /// Create a field conversion error
    pub fn field_conversion(type_name: &'static str, field: &'static str, reason: &str) -> Self {
        Self::FieldConversion {
            type_name,
            field,
            reason: reason.to_string(),
        }
    }

    /// Create a value conversion error, before the field is known
    pub fn conversion(reason: impl ToString) -> Self {
        Self::Conversion(reason.to_string())
    }

    /// Create an invalid pattern error
    pub fn invalid_pattern(pattern: &str, reason: impl ToString) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a session close error
    pub fn close_failed(name: &str, reason: &str) -> Self {
        Self::SessionCloseFailed {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a test case verification failure
    pub fn verify_failed(message: impl ToString) -> Self {
        Self::VerifyFailed(message.to_string())
    }

    /// Create a skip signal for a test suite or case
    pub fn skipped(reason: impl ToString) -> Self {
        Self::Skipped(reason.to_string())
    }

    /// Create a command failed error
    pub fn command_failed(command: &str, message: &str) -> Self {
        Self::CommandFailed {
            command: command.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::ContextNotInitialized.kind(), ErrorKind::Internal);
        assert_eq!(
            Error::missing_field("PortStats", "rx_packets").kind(),
            ErrorKind::DecodeMiss
        );
        assert_eq!(
            Error::close_failed("testpmd", "broken pipe").kind(),
            ErrorKind::External
        );
        assert_eq!(Error::Timeout(Duration::from_secs(1)).kind(), ErrorKind::External);
    }

    #[test]
    fn test_missing_field_names_type_and_field() {
        let msg = Error::missing_field("PortStats", "rx_packets").to_string();
        assert!(msg.contains("PortStats"));
        assert!(msg.contains("'rx_packets'"));
    }
}
