//! certkit library
//!
//! A certificate/key inspection and conversion toolkit providing:
//! - File type detection (PEM cert/key/public key, combined, PKCS#12, DER,
//!   Base64, OpenSSH public keys)
//! - Format conversion (PEM↔DER, PEM↔PFX, PEM↔Base64, combined PEM)
//! - Chain verification, key/cert matching, RSA modulus extraction, expiry
//!   checks
//! - Safe openssl driving: secrets via fd-passing, no-clobber atomic outputs,
//!   transparent legacy PKCS#12 retry, typed error classification
//!
//! # Usage
//!
//! ```rust,ignore
//! use certkit::cert_ops::Engine;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = Engine::with_defaults();
//!     let cancel = CancellationToken::new();
//!     let summary = engine.summary(&cancel, "server.pem".as_ref()).await;
//!     // Render the summary...
//! }
//! ```

pub mod cert_ops;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use cert_ops::{Engine, FileType, Invoker, KeyType, OpensslCli};
pub use cli::Cli;
pub use config::Settings;
pub use error::{EngineError, Result};
