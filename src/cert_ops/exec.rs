//! openssl invocation
//!
//! `Invoker` abstracts "run openssl with these arguments and optional secret
//! payloads". The production implementation spawns real child processes under
//! tokio; tests substitute a scripted fake. Cancellation is explicit: every
//! call takes a token, and a cancelled child is killed and reported as
//! `Canceled`, never folded into the generic failure class.

use crate::cert_ops::classify::is_legacy_cipher_failure;
use crate::cert_ops::secret::{Secret, SecretChannel};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Captured output of one openssl invocation. A non-zero exit is not an error
/// at this layer; operations decide whether to classify the stderr (most do)
/// or to inspect the raw output (verify, checkend).
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    /// stdout and stderr concatenated, for operations that scan both.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Runs openssl. Implementations must kill the child (not merely abandon it)
/// when the cancellation token fires.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Run with secret payloads reachable through `fd:3`, `fd:4`, ... tokens
    /// in the argument list.
    async fn run_with_secrets(
        &self,
        cancel: &CancellationToken,
        secrets: &[Secret],
        args: &[String],
    ) -> Result<ExecOutput>;

    /// Run without secrets.
    async fn run(&self, cancel: &CancellationToken, args: &[String]) -> Result<ExecOutput> {
        self.run_with_secrets(cancel, &[], args).await
    }
}

/// Real-process invoker for the openssl binary.
pub struct OpensslCli {
    program: PathBuf,
    channel: SecretChannel,
}

impl OpensslCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        OpensslCli {
            program: program.into(),
            channel: SecretChannel::for_platform(),
        }
    }

    pub fn with_channel(program: impl Into<PathBuf>, channel: SecretChannel) -> Self {
        OpensslCli {
            program: program.into(),
            channel,
        }
    }
}

impl Default for OpensslCli {
    fn default() -> Self {
        OpensslCli::new("openssl")
    }
}

#[async_trait]
impl Invoker for OpensslCli {
    async fn run_with_secrets(
        &self,
        cancel: &CancellationToken,
        secrets: &[Secret],
        args: &[String],
    ) -> Result<ExecOutput> {
        if cancel.is_cancelled() {
            return Err(EngineError::Canceled);
        }

        // Argument lists never contain secret bytes, only fd:/file: references,
        // so logging them is safe.
        debug!("running {} {}", self.program.display(), args.join(" "));

        let staged = self.channel.stage(secrets, args)?;

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&staged.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        staged.attach(&mut cmd);

        let child = cmd.spawn().map_err(|e| {
            EngineError::Tool(format!(
                "failed to start {}: {}",
                self.program.display(),
                e
            ))
        })?;

        // On cancellation the wait future is dropped, and kill_on_drop reaps
        // the child rather than abandoning it.
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Canceled),
            output = child.wait_with_output() => output?,
        };

        // `staged` lives until here: pipe read ends stay open for the child,
        // and temp-file secrets are deleted on drop, success or failure.
        drop(staged);

        Ok(ExecOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Legacy-compatibility flag for PKCS#12 containers using old ciphers.
pub const LEGACY_FLAG: &str = "-legacy";

/// Run a pkcs12 argument list, transparently retrying once with `-legacy`
/// when a modern openssl refuses the container's cipher.
///
/// Any non-pkcs12 argument list, or one that already requested legacy mode,
/// passes through unmodified. Exactly one retry; no backoff, no loop.
pub async fn run_pkcs12<E: Invoker + ?Sized>(
    invoker: &E,
    cancel: &CancellationToken,
    secrets: &[Secret],
    args: &[String],
) -> Result<ExecOutput> {
    let output = invoker.run_with_secrets(cancel, secrets, args).await?;

    let is_pkcs12 = args.first().map(String::as_str) == Some("pkcs12");
    let already_legacy = args.iter().any(|a| a == LEGACY_FLAG);
    if output.success || !is_pkcs12 || already_legacy {
        return Ok(output);
    }

    if is_legacy_cipher_failure(&output.stderr.to_lowercase()) {
        debug!("pkcs12 call hit a legacy cipher, retrying with {}", LEGACY_FLAG);
        let mut retry_args = args.to_vec();
        retry_args.insert(1, LEGACY_FLAG.to_string());
        return invoker.run_with_secrets(cancel, secrets, &retry_args).await;
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted invoker: pops pre-recorded outputs and records argument lists.
    struct Scripted {
        responses: Mutex<Vec<ExecOutput>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl Scripted {
        fn new(mut responses: Vec<ExecOutput>) -> Self {
            responses.reverse();
            Scripted {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Invoker for Scripted {
        async fn run_with_secrets(
            &self,
            _cancel: &CancellationToken,
            _secrets: &[Secret],
            args: &[String],
        ) -> Result<ExecOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop()
                .expect("scripted invoker ran out of responses"))
        }
    }

    fn ok_output(stdout: &str) -> ExecOutput {
        ExecOutput {
            success: true,
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    fn failed_output(stderr: &str) -> ExecOutput {
        ExecOutput {
            success: false,
            exit_code: Some(1),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    const LEGACY_STDERR: &str =
        "error:0308010C:digital envelope routines::unsupported:crypto/evp/evp_fetch.c";

    #[tokio::test]
    async fn test_legacy_retry_inserts_flag_after_subcommand() {
        let invoker = Scripted::new(vec![failed_output(LEGACY_STDERR), ok_output("done")]);
        let cancel = CancellationToken::new();
        let call = args(&["pkcs12", "-in", "a.pfx", "-passin", "fd:3"]);

        let out = run_pkcs12(&invoker, &cancel, &[], &call).await.unwrap();
        assert!(out.success);

        let calls = invoker.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1][0], "pkcs12");
        assert_eq!(calls[1][1], "-legacy");
        assert_eq!(&calls[1][2..], &call[1..]);
    }

    #[tokio::test]
    async fn test_no_second_retry_when_legacy_already_requested() {
        let invoker = Scripted::new(vec![failed_output(LEGACY_STDERR)]);
        let cancel = CancellationToken::new();
        let call = args(&["pkcs12", "-legacy", "-in", "a.pfx"]);

        let out = run_pkcs12(&invoker, &cancel, &[], &call).await.unwrap();
        assert!(!out.success);
        assert_eq!(invoker.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_non_pkcs12_failures_pass_through() {
        let invoker = Scripted::new(vec![failed_output(LEGACY_STDERR)]);
        let cancel = CancellationToken::new();
        let call = args(&["x509", "-in", "a.pem"]);

        let out = run_pkcs12(&invoker, &cancel, &[], &call).await.unwrap();
        assert!(!out.success);
        assert_eq!(invoker.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let invoker = Scripted::new(vec![failed_output("Mac verify error: invalid password?")]);
        let cancel = CancellationToken::new();
        let call = args(&["pkcs12", "-in", "a.pfx"]);

        let out = run_pkcs12(&invoker, &cancel, &[], &call).await.unwrap();
        assert!(!out.success);
        assert_eq!(invoker.calls().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_secrets_reach_the_child_on_sequential_fds() {
        let cli = OpensslCli::new("/bin/sh");
        let cancel = CancellationToken::new();
        let secrets = vec![Secret::new("alpha"), Secret::new("beta")];

        let out = cli
            .run_with_secrets(&cancel, &secrets, &args(&["-c", "cat <&3; cat <&4"]))
            .await
            .unwrap();
        assert!(out.success, "stderr: {}", out.stderr);
        assert_eq!(out.stdout, "alpha\nbeta\n");
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_short_circuits() {
        let cli = OpensslCli::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = cli.run(&cancel, &args(&["version"])).await.unwrap_err();
        assert!(err.is_canceled());
    }
}
