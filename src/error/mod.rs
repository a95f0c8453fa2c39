//! Error handling for the ledger
//!
//! This module provides the error taxonomy for all ledger operations.
//! Bad input from peers is rejected with a local, non-fatal error;
//! `InconsistentState` is the one variant that signals a broken ledger
//! invariant rather than bad input and must never be swallowed.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Error types for ledger operations
#[derive(Debug, Clone)]
pub enum LedgerError {
    /// A wire document is missing a field or has a mistyped field
    MalformedDocument(String),
    /// Signature, identifier, script, or puzzle verification failed
    Verification(String),
    /// An input or previous_block points to an entity that does not exist
    UnknownReference(String),
    /// A ledger invariant was already broken upstream (programming error)
    InconsistentState(String),
    /// Database-related errors
    Database(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Configuration errors
    Config(String),
    /// File I/O errors
    Io(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::MalformedDocument(msg) => write!(f, "Malformed document: {msg}"),
            LedgerError::Verification(msg) => write!(f, "Verification failure: {msg}"),
            LedgerError::UnknownReference(msg) => write!(f, "Unknown reference: {msg}"),
            LedgerError::InconsistentState(msg) => write!(f, "Inconsistent ledger state: {msg}"),
            LedgerError::Database(msg) => write!(f, "Database error: {msg}"),
            LedgerError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            LedgerError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            LedgerError::Config(msg) => write!(f, "Configuration error: {msg}"),
            LedgerError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<sled::Error> for LedgerError {
    fn from(err: sled::Error) -> Self {
        LedgerError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for LedgerError {
    fn from(err: bincode::error::EncodeError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for LedgerError {
    fn from(err: bincode::error::DecodeError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}
