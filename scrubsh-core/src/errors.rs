//! errors.rs - Custom error types for the scrubsh-core library.
//!
//! This module defines a structured error enum for the library, providing
//! specific, actionable error types that can be handled programmatically.
//! Configuration problems surface when a redactor is built; stream problems
//! surface to whoever reads the redacted output.
//!
//! License: MIT OR APACHE 2.0

use std::io;
use thiserror::Error;

/// This enum represents all possible error types in the `scrubsh-core` library.
///
/// Marked `#[non_exhaustive]` so new variants can be added without breaking
/// downstream matches.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ScrubError {
    #[error("Failed to compile redaction rule '{0}': {1}")]
    RuleCompilationError(String, regex::Error),

    #[error("Rule '{0}': pattern length ({1}) exceeds maximum allowed ({2})")]
    PatternLengthExceeded(String, usize, usize),

    #[error("Invalid YAML path '{0}': {1}")]
    InvalidYamlPath(String, String),

    #[error("Rule '{0}': literal redaction value must not be empty")]
    EmptyLiteral(String),

    #[error("A line exceeded the maximum supported length of {0} bytes")]
    LineTooLong(usize),

    #[error("An unexpected I/O error occurred: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to (de)serialize redaction map: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid encryption key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Encryption failed: {0}")]
    EncryptionError(String),

    #[error("Decryption failed for token '{0}': {1}")]
    DecryptionError(String, String),

    #[error("Invalid redaction map: {0}")]
    InvalidRedactionMap(String),

    #[error("A fatal error occurred: {0}")]
    Fatal(String),
}

impl From<ScrubError> for io::Error {
    fn from(err: ScrubError) -> Self {
        match err {
            ScrubError::IoError(inner) => inner,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
