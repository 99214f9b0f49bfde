//! Certificate format conversion
//!
//! Converts between PEM, DER, PKCS#12, Base64, and combined PEM. Every
//! file-producing operation goes through the output safety layer: the
//! destination is checked up front, openssl writes into a temp file in the
//! destination's directory, and the result is hard-linked into place only
//! after the tool reported success and the output is non-empty.

use crate::cert_ops::detect::{self, FileType};
use crate::cert_ops::exec;
use crate::cert_ops::outfile;
use crate::cert_ops::secret::Secret;
use crate::cert_ops::{Engine, Invoker};
use crate::error::{EngineError, Result};
use base64::Engine as _;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::warn;

const CERT_MARKER: &str = "-----BEGIN CERTIFICATE-----";

/// Paths produced by a PKCS#12 extraction. The CA bundle is present only when
/// the container actually carried CA certificates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FromPfxResult {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_path: Option<PathBuf>,
}

/// Generate a default output path by swapping the extension.
pub fn default_output_path(input: &Path, ext: &str) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    input.with_file_name(format!("{}.{}", stem.to_string_lossy(), ext))
}

fn resolve_output(input: &Path, explicit: Option<&Path>, ext: &str) -> PathBuf {
    explicit
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| default_output_path(input, ext))
}

/// A zero-byte "successful" output is treated as a failure.
fn ensure_non_empty(path: &Path) -> Result<()> {
    let len = std::fs::metadata(path)?.len();
    if len == 0 {
        return Err(EngineError::Tool(
            "openssl reported success but produced an empty output file".to_string(),
        ));
    }
    Ok(())
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

impl<E: Invoker> Engine<E> {
    /// Convert a PEM certificate or key to DER.
    pub async fn to_der(
        &self,
        cancel: &CancellationToken,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<PathBuf> {
        let file_type = detect::detect_type(input)?;
        let dest = resolve_output(input, output, "der");
        outfile::ensure_not_exists(&dest)?;
        let tmp = outfile::stage_in_dest_dir(&dest)?;

        let args: Vec<String> = match file_type {
            FileType::Cert | FileType::Combined => vec![
                "x509".into(),
                "-in".into(),
                path_arg(input),
                "-outform".into(),
                "DER".into(),
                "-out".into(),
                path_arg(&tmp),
            ],
            FileType::Key => vec![
                "pkey".into(),
                "-in".into(),
                path_arg(input),
                "-outform".into(),
                "DER".into(),
                "-out".into(),
                path_arg(&tmp),
            ],
            FileType::Der => {
                return Err(EngineError::Unsupported(
                    "input is already DER-encoded".to_string(),
                ));
            }
            other => {
                return Err(EngineError::Unsupported(format!(
                    "cannot convert a {} file to DER",
                    other
                )));
            }
        };

        self.run_classified(cancel, &args).await?;
        ensure_non_empty(&tmp)?;
        outfile::commit_temp_file(&tmp, &dest)?;
        Ok(dest)
    }

    /// Convert a DER certificate to PEM.
    pub async fn from_der(
        &self,
        cancel: &CancellationToken,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<PathBuf> {
        let file_type = detect::detect_type(input)?;
        if file_type != FileType::Der && !matches!(detect::is_der_encoded(input), Ok(true)) {
            return Err(EngineError::Unsupported(format!(
                "{} is not DER-encoded",
                input.display()
            )));
        }

        let dest = resolve_output(input, output, "pem");
        outfile::ensure_not_exists(&dest)?;
        let tmp = outfile::stage_in_dest_dir(&dest)?;

        let args: Vec<String> = vec![
            "x509".into(),
            "-inform".into(),
            "DER".into(),
            "-in".into(),
            path_arg(input),
            "-out".into(),
            path_arg(&tmp),
        ];

        self.run_classified(cancel, &args).await?;
        ensure_non_empty(&tmp)?;
        outfile::commit_temp_file(&tmp, &dest)?;
        Ok(dest)
    }

    /// Export a certificate and its private key into a PKCS#12 container.
    ///
    /// Refuses to proceed unless the key actually matches the certificate, so
    /// a PFX with a mismatched key is never silently produced.
    pub async fn to_pfx(
        &self,
        cancel: &CancellationToken,
        cert: &Path,
        key: &Path,
        output: Option<&Path>,
        password: &str,
    ) -> Result<PathBuf> {
        let cert_type = detect::detect_type(cert)?;
        if !matches!(cert_type, FileType::Cert | FileType::Combined) {
            return Err(EngineError::Unsupported(format!(
                "{} does not contain a certificate PEM block",
                cert.display()
            )));
        }
        let key_type = detect::detect_type(key)?;
        if !matches!(key_type, FileType::Key | FileType::Combined) {
            return Err(EngineError::Unsupported(format!(
                "{} does not contain a private key PEM block",
                key.display()
            )));
        }

        if !self.match_key_to_cert(cancel, cert, key).await?.matches {
            return Err(EngineError::KeyMismatch);
        }

        let dest = resolve_output(cert, output, "pfx");
        outfile::ensure_not_exists(&dest)?;
        let tmp = outfile::stage_in_dest_dir(&dest)?;

        let args: Vec<String> = vec![
            "pkcs12".into(),
            "-export".into(),
            "-out".into(),
            path_arg(&tmp),
            "-inkey".into(),
            path_arg(key),
            "-in".into(),
            path_arg(cert),
            "-passout".into(),
            "fd:3".into(),
        ];
        let secrets = vec![Secret::new(password)];

        self.run_pkcs12_classified(cancel, &secrets, &args).await?;
        ensure_non_empty(&tmp)?;
        outfile::commit_temp_file(&tmp, &dest)?;
        Ok(dest)
    }

    /// Extract certificate, key, and (when present) CA bundle from a PKCS#12
    /// container as three independent sub-invocations. The CA extraction is
    /// best-effort: its failure never fails the overall operation.
    pub async fn from_pfx(
        &self,
        cancel: &CancellationToken,
        input: &Path,
        password: &str,
    ) -> Result<FromPfxResult> {
        let file_type = detect::detect_type(input)?;
        if file_type != FileType::Pfx {
            return Err(EngineError::Unsupported(format!(
                "{} is not a PKCS#12 file",
                input.display()
            )));
        }

        let stem = input.file_stem().unwrap_or_default().to_string_lossy().into_owned();
        let cert_dest = input.with_file_name(format!("{}.crt", stem));
        let key_dest = input.with_file_name(format!("{}.key", stem));
        let ca_dest = input.with_file_name(format!("{}-ca.crt", stem));

        outfile::ensure_not_exists(&cert_dest)?;
        outfile::ensure_not_exists(&key_dest)?;

        let cert_tmp = outfile::stage_in_dest_dir(&cert_dest)?;
        let key_tmp = outfile::stage_in_dest_dir(&key_dest)?;
        let ca_tmp = outfile::stage_in_dest_dir(&ca_dest)?;

        let cert_args: Vec<String> = vec![
            "pkcs12".into(),
            "-in".into(),
            path_arg(input),
            "-clcerts".into(),
            "-nokeys".into(),
            "-passin".into(),
            "fd:3".into(),
            "-out".into(),
            path_arg(&cert_tmp),
        ];
        self.run_pkcs12_classified(cancel, &[Secret::new(password)], &cert_args)
            .await?;

        let key_args: Vec<String> = vec![
            "pkcs12".into(),
            "-in".into(),
            path_arg(input),
            "-nocerts".into(),
            "-nodes".into(),
            "-passin".into(),
            "fd:3".into(),
            "-out".into(),
            path_arg(&key_tmp),
        ];
        self.run_pkcs12_classified(cancel, &[Secret::new(password)], &key_args)
            .await?;

        let ca_args: Vec<String> = vec![
            "pkcs12".into(),
            "-in".into(),
            path_arg(input),
            "-cacerts".into(),
            "-nokeys".into(),
            "-passin".into(),
            "fd:3".into(),
            "-out".into(),
            path_arg(&ca_tmp),
        ];
        let ca_extracted = match exec::run_pkcs12(
            self.invoker(),
            cancel,
            &[Secret::new(password)],
            &ca_args,
        )
        .await
        {
            Ok(out) if out.success => {
                // Only count it when the tool actually emitted a certificate.
                std::fs::read_to_string(&ca_tmp)
                    .map(|text| text.contains(CERT_MARKER))
                    .unwrap_or(false)
            }
            Ok(out) => {
                warn!("CA bundle extraction failed: {}", out.stderr.trim());
                false
            }
            Err(e) if e.is_canceled() => return Err(e),
            Err(e) => {
                warn!("CA bundle extraction failed: {}", e);
                false
            }
        };

        ensure_non_empty(&cert_tmp)?;
        ensure_non_empty(&key_tmp)?;

        outfile::commit_temp_file(&cert_tmp, &cert_dest)?;
        if let Err(e) = outfile::commit_temp_file(&key_tmp, &key_dest) {
            // Keep the no-partial-output invariant: roll back the cert commit.
            let _ = std::fs::remove_file(&cert_dest);
            return Err(e);
        }

        let ca_path = if ca_extracted {
            match outfile::commit_temp_file(&ca_tmp, &ca_dest) {
                Ok(()) => Some(ca_dest),
                Err(e) => {
                    warn!("could not write CA bundle: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(FromPfxResult {
            cert_path: cert_dest,
            key_path: key_dest,
            ca_path,
        })
    }

    /// Encode a file's raw bytes as a single line of standard Base64.
    pub async fn to_base64(
        &self,
        _cancel: &CancellationToken,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<PathBuf> {
        let data = std::fs::read(input)?;
        let mut encoded = base64::engine::general_purpose::STANDARD.encode(&data);
        encoded.push('\n');

        let dest = resolve_output(input, output, "b64");
        outfile::write_exclusive(&dest, encoded.as_bytes())?;
        Ok(dest)
    }

    /// Decode a Base64 file (standard alphabet, padded or unpadded) back to
    /// its raw bytes.
    pub async fn from_base64(
        &self,
        _cancel: &CancellationToken,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<PathBuf> {
        let text = std::fs::read_to_string(input)?;
        let compact: String = text.split_whitespace().collect();

        let data = base64::engine::general_purpose::STANDARD
            .decode(&compact)
            .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(&compact))
            .map_err(|e| EngineError::Parse(format!("input is not valid Base64: {}", e)))?;

        let dest = match output {
            Some(p) => p.to_path_buf(),
            None => {
                let ext = input
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                if ext == "b64" || ext == "base64" {
                    input.with_file_name(input.file_stem().unwrap_or_default().to_os_string())
                } else {
                    default_output_path(input, "bin")
                }
            }
        };

        outfile::write_atomic(&dest, &data)?;
        Ok(dest)
    }

    /// Concatenate a certificate and its matching private key into a single
    /// combined PEM file. Same match gate as `to_pfx`.
    pub async fn combine_pem(
        &self,
        cancel: &CancellationToken,
        cert: &Path,
        key: &Path,
        output: Option<&Path>,
    ) -> Result<PathBuf> {
        let cert_type = detect::detect_type(cert)?;
        if cert_type != FileType::Cert {
            return Err(EngineError::Unsupported(format!(
                "{} does not contain a certificate PEM block",
                cert.display()
            )));
        }
        let key_type = detect::detect_type(key)?;
        if key_type != FileType::Key {
            return Err(EngineError::Unsupported(format!(
                "{} does not contain a private key PEM block",
                key.display()
            )));
        }

        if !self.match_key_to_cert(cancel, cert, key).await?.matches {
            return Err(EngineError::KeyMismatch);
        }

        let cert_text = std::fs::read_to_string(cert)?;
        let key_text = std::fs::read_to_string(key)?;
        let combined = format!("{}\n{}\n", cert_text.trim_end(), key_text.trim_end());

        let dest = match output {
            Some(p) => p.to_path_buf(),
            None => {
                let stem = cert.file_stem().unwrap_or_default().to_string_lossy().into_owned();
                cert.with_file_name(format!("{}-combined.pem", stem))
            }
        };

        outfile::write_exclusive(&dest, combined.as_bytes())?;
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path_swaps_extension() {
        assert_eq!(
            default_output_path(Path::new("/tmp/cert.pem"), "der"),
            Path::new("/tmp/cert.der")
        );
        assert_eq!(
            default_output_path(Path::new("cert.pem"), "b64"),
            Path::new("cert.b64")
        );
        assert_eq!(
            default_output_path(Path::new("/tmp/bundle"), "pfx"),
            Path::new("/tmp/bundle.pfx")
        );
    }

    #[test]
    fn test_resolve_output_prefers_explicit() {
        let explicit = Path::new("/out/x.der");
        assert_eq!(
            resolve_output(Path::new("a.pem"), Some(explicit), "der"),
            explicit
        );
    }
}
