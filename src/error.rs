//! Custom error types for certkit
//!
//! This module defines the closed error taxonomy for the conversion/inspection
//! engine using `thiserror`. Classification from raw openssl stderr happens
//! once, at the subprocess boundary (see `cert_ops::classify`); everything
//! above that boundary branches on these variants, never on stderr text.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("output file already exists: {path} (suggested: {suggestion})")]
    OutputExists { path: PathBuf, suggestion: PathBuf },

    #[error("incorrect password: {detail}")]
    IncorrectPassword { detail: String },

    #[error("not a valid PKCS#12 file: {detail}")]
    NotPkcs12 { detail: String },

    #[error("container uses a legacy cipher the installed openssl cannot read: {detail}")]
    LegacyUnsupported { detail: String },

    #[error("not an RSA certificate or key (modulus is RSA-only)")]
    NotRsa,

    #[error("private key does NOT match certificate")]
    KeyMismatch,

    #[error("operation canceled")]
    Canceled,

    #[error("unsupported input for this operation: {0}")]
    Unsupported(String),

    #[error("failed to parse certificate: {0}")]
    Parse(String),

    #[error("{0}")]
    Tool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Destination collision; the caller should surface the suggestion.
    pub fn is_output_exists(&self) -> bool {
        matches!(self, EngineError::OutputExists { .. })
    }

    /// PKCS#12 password rejected; recoverable by re-prompting.
    pub fn is_incorrect_password(&self) -> bool {
        matches!(self, EngineError::IncorrectPassword { .. })
    }

    pub fn is_not_pkcs12(&self) -> bool {
        matches!(self, EngineError::NotPkcs12 { .. })
    }

    pub fn is_legacy_unsupported(&self) -> bool {
        matches!(self, EngineError::LegacyUnsupported { .. })
    }

    pub fn is_not_rsa(&self) -> bool {
        matches!(self, EngineError::NotRsa)
    }

    pub fn is_key_mismatch(&self) -> bool {
        matches!(self, EngineError::KeyMismatch)
    }

    /// Caller-initiated cancellation; must propagate unchanged.
    pub fn is_canceled(&self) -> bool {
        matches!(self, EngineError::Canceled)
    }

    /// The suggested non-colliding sibling path, when the error carries one.
    pub fn suggestion(&self) -> Option<&Path> {
        match self {
            EngineError::OutputExists { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }
}

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;
