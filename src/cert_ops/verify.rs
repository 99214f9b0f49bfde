//! Chain verification, key/cert matching, and modulus extraction

use crate::cert_ops::classify::classify_failure;
use crate::cert_ops::detect::{self, FileType, KeyType};
use crate::cert_ops::{Engine, Invoker};
use crate::error::{EngineError, Result};
use serde::Serialize;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Whether a private key's derived public key matches a certificate's
/// embedded public key.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub matches: bool,
    /// Key flavor, when it could be determined from the key file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_type: Option<KeyType>,
}

/// Outcome of a chain verification. The raw tool output is always preserved;
/// hints are human-readable diagnostics appended to it, never replacements.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutcome {
    pub ok: bool,
    pub output: String,
    pub hints: Vec<String>,
}

impl<E: Invoker> Engine<E> {
    /// Compare a private key's derived public key against a certificate's
    /// embedded public key, byte-for-byte after stripping PEM armor and
    /// whitespace.
    pub async fn match_key_to_cert(
        &self,
        cancel: &CancellationToken,
        cert: &Path,
        key: &Path,
    ) -> Result<MatchResult> {
        let cert_type = detect::detect_type(cert)?;

        let mut cert_args = vec!["x509".to_string(), "-in".to_string(), path_arg(cert)];
        if cert_type == FileType::Der {
            cert_args.extend(string_args(&["-inform", "DER"]));
        }
        cert_args.extend(string_args(&["-noout", "-pubkey"]));
        let cert_out = self.run_classified(cancel, &cert_args).await?;

        let key_args = string_args(&["pkey", "-in", &path_arg(key), "-pubout"]);
        let key_out = self.run_classified(cancel, &key_args).await?;

        let matches =
            normalize_pem_body(&cert_out.stdout) == normalize_pem_body(&key_out.stdout);

        Ok(MatchResult {
            matches,
            key_type: detect::detect_key_type(key).ok(),
        })
    }

    /// Extract the RSA modulus from a certificate or private key. RSA-only by
    /// contract; everything else reports `NotRsa` rather than an empty string.
    pub async fn modulus(&self, cancel: &CancellationToken, path: &Path) -> Result<String> {
        let file_type = detect::detect_type(path)?;

        let args = match file_type {
            FileType::Cert | FileType::Combined => {
                string_args(&["x509", "-in", &path_arg(path), "-noout", "-modulus"])
            }
            FileType::Der => string_args(&[
                "x509", "-inform", "DER", "-in", &path_arg(path), "-noout", "-modulus",
            ]),
            FileType::Key => {
                if detect::detect_key_type(path)? == KeyType::Ec {
                    return Err(EngineError::NotRsa);
                }
                string_args(&["rsa", "-in", &path_arg(path), "-noout", "-modulus"])
            }
            other => {
                return Err(EngineError::Unsupported(format!(
                    "cannot extract a modulus from a {} file",
                    other
                )));
            }
        };

        let output = self.invoker().run(cancel, &args).await?;

        // openssl reports non-RSA material in several ways: "Modulus=Wrong
        // Algorithm type" on stdout, or a "not an RSA key" style stderr.
        let combined_lower = output.combined().to_lowercase();
        if combined_lower.contains("wrong algorithm type")
            || combined_lower.contains("not an rsa key")
            || combined_lower.contains("expecting an rsa key")
        {
            return Err(EngineError::NotRsa);
        }
        if !output.success {
            return Err(classify_failure(output.exit_code, &output.stderr));
        }

        match output.stdout.trim().strip_prefix("Modulus=") {
            Some(modulus) if !modulus.is_empty() => Ok(modulus.to_string()),
            _ => Err(EngineError::NotRsa),
        }
    }

    /// Verify a certificate chain. Success is the literal `: OK` in the
    /// combined output; a few well-known failure texts are translated into
    /// diagnostic hints appended for the user.
    pub async fn verify_chain(
        &self,
        cancel: &CancellationToken,
        cert: &Path,
        ca_file: Option<&Path>,
    ) -> Result<VerifyOutcome> {
        let mut args = vec!["verify".to_string()];
        if let Some(ca) = ca_file {
            args.push("-CAfile".to_string());
            args.push(path_arg(ca));
        }
        args.push(path_arg(cert));

        let output = self.invoker().run(cancel, &args).await?;
        let combined = output.combined();
        let ok = combined.contains(": OK");

        let mut hints = Vec::new();
        if !ok {
            let lower = combined.to_lowercase();
            if lower.contains("certificate has expired") || lower.contains("expired") {
                hints.push("A certificate in the chain has expired.".to_string());
            }
            if lower.contains("unable to get local issuer") {
                hints.push(
                    "The issuing CA certificate is missing; supply the full chain with --ca-file."
                        .to_string(),
                );
            }
            if lower.contains("self-signed certificate") || lower.contains("self signed") {
                hints.push(
                    "The chain ends in a self-signed certificate that is not in the trust store."
                        .to_string(),
                );
            }
        }

        Ok(VerifyOutcome {
            ok,
            output: combined,
            hints,
        })
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

fn string_args(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|s| s.to_string()).collect()
}

/// Strip PEM armor lines and all whitespace, leaving only the base64 body.
fn normalize_pem_body(pem_text: &str) -> String {
    pem_text
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .flat_map(|line| line.split_whitespace())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pem_body_strips_armor_and_whitespace() {
        let a = "-----BEGIN PUBLIC KEY-----\nMFkwEwYH\nKoZIzj0C\n-----END PUBLIC KEY-----\n";
        let b = "-----BEGIN PUBLIC KEY-----\r\nMFkwEwYHKoZIzj0C\r\n-----END PUBLIC KEY-----\r\n";
        assert_eq!(normalize_pem_body(a), "MFkwEwYHKoZIzj0C");
        assert_eq!(normalize_pem_body(a), normalize_pem_body(b));
    }

    #[test]
    fn test_normalize_pem_body_differs_for_different_keys() {
        let a = "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n";
        let b = "-----BEGIN PUBLIC KEY-----\nBBBB\n-----END PUBLIC KEY-----\n";
        assert_ne!(normalize_pem_body(a), normalize_pem_body(b));
    }
}
