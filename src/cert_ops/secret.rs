//! Secret-passing channels for openssl invocations
//!
//! Passwords must never appear in process argument lists and should avoid
//! touching unencrypted disk when possible. Callers reference secrets with
//! `fd:3`, `fd:4`, ... placeholder tokens; the channel decides how those
//! tokens are honored:
//!
//! - `InheritedFd` (POSIX): each secret becomes an anonymous pipe whose read
//!   end is passed to the child at descriptor 3, 4, ... in secret order.
//! - `TempFile`: each secret is written to a 0600 temp file and every `fd:N`
//!   token is rewritten to `file:<path>` before the child starts; the temp
//!   files are deleted unconditionally once the call returns.

use std::io::Write;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[cfg(unix)]
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

/// An in-memory secret payload, wiped on drop.
///
/// Exists only for the duration of one invoker call; never persisted beyond
/// the temp-file channel's lifetime.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Secret(bytes.into())
    }

    /// The secret bytes with a trailing newline appended if absent, matching
    /// the usual passphrase-file convention openssl expects.
    fn payload(&self) -> Vec<u8> {
        let mut bytes = self.0.clone();
        if bytes.last() != Some(&b'\n') {
            bytes.push(b'\n');
        }
        bytes
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// First child descriptor index used by the `fd:<n>` placeholder convention.
pub const FIRST_SECRET_FD: i32 = 3;

/// How secrets reach the child process. Selected once at invoker construction,
/// not per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretChannel {
    #[cfg(unix)]
    InheritedFd,
    TempFile,
}

impl SecretChannel {
    /// The preferred channel for the current platform.
    pub fn for_platform() -> Self {
        #[cfg(unix)]
        {
            SecretChannel::InheritedFd
        }
        #[cfg(not(unix))]
        {
            SecretChannel::TempFile
        }
    }

    /// Stage secrets for one child process. The returned value keeps the
    /// channel resources (pipe read ends or temp files) alive until the call
    /// completes; dropping it releases them.
    pub(crate) fn stage(&self, secrets: &[Secret], args: &[String]) -> std::io::Result<StagedSecrets> {
        match self {
            #[cfg(unix)]
            SecretChannel::InheritedFd => stage_pipes(secrets, args),
            SecretChannel::TempFile => stage_temp_files(secrets, args),
        }
    }
}

/// Staged channel state for a single invocation.
pub(crate) struct StagedSecrets {
    /// Argument vector, with `fd:N` tokens rewritten for the temp-file channel.
    pub(crate) args: Vec<String>,
    #[cfg(unix)]
    pipe_readers: Vec<OwnedFd>,
    #[allow(dead_code)]
    temp_files: Vec<tempfile::NamedTempFile>,
}

impl StagedSecrets {
    /// Wire the staged channel into the child command. For the pipe channel
    /// this dup2s each read end to descriptor 3, 4, ... after fork; the
    /// temp-file channel needs nothing here because the rewrite already
    /// happened in `stage`.
    pub(crate) fn attach(&self, cmd: &mut tokio::process::Command) {
        #[cfg(unix)]
        {
            if self.pipe_readers.is_empty() {
                return;
            }
            let fds: Vec<RawFd> = self.pipe_readers.iter().map(|fd| fd.as_raw_fd()).collect();
            let target_end = FIRST_SECRET_FD + fds.len() as RawFd;
            unsafe {
                cmd.pre_exec(move || {
                    // A source sitting inside the 3..3+N target range would be
                    // clobbered by an earlier dup2, so move those above the
                    // range first.
                    let mut sources = Vec::with_capacity(fds.len());
                    for fd in &fds {
                        if *fd < target_end {
                            let moved =
                                nix::fcntl::fcntl(*fd, nix::fcntl::FcntlArg::F_DUPFD(target_end))
                                    .map_err(std::io::Error::from)?;
                            sources.push(moved);
                        } else {
                            sources.push(*fd);
                        }
                    }
                    for (i, fd) in sources.iter().enumerate() {
                        nix::unistd::dup2(*fd, FIRST_SECRET_FD + i as RawFd)
                            .map_err(std::io::Error::from)?;
                    }
                    Ok(())
                });
            }
        }
        #[cfg(not(unix))]
        {
            let _ = cmd;
        }
    }
}

#[cfg(unix)]
fn stage_pipes(secrets: &[Secret], args: &[String]) -> std::io::Result<StagedSecrets> {
    let mut readers = Vec::with_capacity(secrets.len());
    for secret in secrets {
        let (read_end, write_end) = nix::unistd::pipe()?;
        // Write the payload and close the write end immediately so the child
        // sees EOF after the secret.
        let mut writer = std::fs::File::from(write_end);
        writer.write_all(&secret.payload())?;
        drop(writer);
        readers.push(read_end);
    }
    Ok(StagedSecrets {
        args: args.to_vec(),
        pipe_readers: readers,
        temp_files: Vec::new(),
    })
}

fn stage_temp_files(secrets: &[Secret], args: &[String]) -> std::io::Result<StagedSecrets> {
    let mut files = Vec::with_capacity(secrets.len());
    let mut rewritten = args.to_vec();

    for (i, secret) in secrets.iter().enumerate() {
        let mut file = tempfile::Builder::new().prefix(".certkit-secret-").tempfile()?;
        file.write_all(&secret.payload())?;
        file.flush()?;

        let placeholder = format!("fd:{}", FIRST_SECRET_FD + i as i32);
        let replacement = format!("file:{}", file.path().display());
        for arg in rewritten.iter_mut() {
            if *arg == placeholder {
                *arg = replacement.clone();
            }
        }
        files.push(file);
    }

    Ok(StagedSecrets {
        args: rewritten,
        #[cfg(unix)]
        pipe_readers: Vec::new(),
        temp_files: files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_payload_appends_newline() {
        assert_eq!(Secret::new("hunter2").payload(), b"hunter2\n");
        assert_eq!(Secret::new("hunter2\n").payload(), b"hunter2\n");
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        assert_eq!(format!("{:?}", Secret::new("hunter2")), "Secret(***)");
    }

    #[test]
    fn test_temp_file_channel_rewrites_placeholders() {
        let secrets = vec![Secret::new("first"), Secret::new("second")];
        let args: Vec<String> = ["pkcs12", "-passin", "fd:3", "-passout", "fd:4"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let staged = SecretChannel::TempFile.stage(&secrets, &args).unwrap();
        assert!(staged.args[2].starts_with("file:"));
        assert!(staged.args[4].starts_with("file:"));
        assert_ne!(staged.args[2], staged.args[4]);

        // The staged temp files hold the secrets with trailing newlines.
        let path = staged.args[2].strip_prefix("file:").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"first\n");
    }

    #[test]
    fn test_temp_files_removed_after_drop() {
        let secrets = vec![Secret::new("gone")];
        let args = vec!["-passin".to_string(), "fd:3".to_string()];
        let staged = SecretChannel::TempFile.stage(&secrets, &args).unwrap();
        let path = staged.args[1].strip_prefix("file:").unwrap().to_string();
        assert!(std::path::Path::new(&path).exists());
        drop(staged);
        assert!(!std::path::Path::new(&path).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_pipe_channel_leaves_args_untouched() {
        let secrets = vec![Secret::new("p")];
        let args = vec!["-passin".to_string(), "fd:3".to_string()];
        let staged = SecretChannel::InheritedFd.stage(&secrets, &args).unwrap();
        assert_eq!(staged.args, args);
    }

    #[cfg(unix)]
    #[test]
    fn test_pipe_read_end_carries_payload() {
        use std::io::Read;

        let secrets = vec![Secret::new("piped")];
        let args: Vec<String> = Vec::new();
        let staged = SecretChannel::InheritedFd.stage(&secrets, &args).unwrap();

        let mut reader = std::fs::File::from(
            staged.pipe_readers.into_iter().next().unwrap(),
        );
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "piped\n");
    }
}
