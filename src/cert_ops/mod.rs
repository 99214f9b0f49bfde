//! Certificate conversion/inspection engine
//!
//! Classifies certificate/key files, drives the openssl command-line tool
//! safely (secrets never touch argv, outputs are never silently overwritten),
//! recovers from the legacy PKCS#12 cipher quirk, and maps raw tool failures
//! into a typed error taxonomy. The CLI layer consumes this engine's public
//! contract and never does its own PEM sniffing.

pub mod classify;
pub mod convert;
pub mod detect;
pub mod exec;
pub mod inspect;
pub mod outfile;
pub mod secret;
pub mod verify;

pub use convert::FromPfxResult;
pub use detect::{detect_key_type, detect_type, is_der_encoded, parse_ssh_public_key};
pub use detect::{FileType, KeyType, SshPublicKey};
pub use exec::{ExecOutput, Invoker, OpensslCli};
pub use inspect::{CertDetails, CertSummary, ExpiryResult};
pub use secret::{Secret, SecretChannel};
pub use verify::{MatchResult, VerifyOutcome};

use crate::error::Result;
use tokio_util::sync::CancellationToken;

/// The conversion/inspection engine.
///
/// Constructed with an explicit invoker (no global executor); all operations
/// are synchronous units of work that spawn at most a few short-lived child
/// processes and hold no state across calls.
pub struct Engine<E: Invoker = OpensslCli> {
    invoker: E,
}

impl Engine<OpensslCli> {
    /// Engine driving the `openssl` binary found on PATH.
    pub fn with_defaults() -> Self {
        Engine::new(OpensslCli::default())
    }

    /// Engine driving a specific openssl binary.
    pub fn with_openssl(program: impl Into<std::path::PathBuf>) -> Self {
        Engine::new(OpensslCli::new(program))
    }
}

impl<E: Invoker> Engine<E> {
    pub fn new(invoker: E) -> Self {
        Engine { invoker }
    }

    pub fn invoker(&self) -> &E {
        &self.invoker
    }

    /// Run openssl and classify any failure into the typed taxonomy.
    pub(crate) async fn run_classified(
        &self,
        cancel: &CancellationToken,
        args: &[String],
    ) -> Result<ExecOutput> {
        let output = self.invoker.run(cancel, args).await?;
        if output.success {
            Ok(output)
        } else {
            Err(classify::classify_failure(output.exit_code, &output.stderr))
        }
    }

    /// Run a pkcs12 invocation through the legacy-retry wrapper, classifying
    /// the (post-retry) failure.
    pub(crate) async fn run_pkcs12_classified(
        &self,
        cancel: &CancellationToken,
        secrets: &[Secret],
        args: &[String],
    ) -> Result<ExecOutput> {
        let output = exec::run_pkcs12(&self.invoker, cancel, secrets, args).await?;
        if output.success {
            Ok(output)
        } else {
            Err(classify::classify_failure(output.exit_code, &output.stderr))
        }
    }
}
