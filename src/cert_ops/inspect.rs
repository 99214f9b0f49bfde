//! Certificate and key inspection
//!
//! Builds human-facing summaries from two sources: openssl's own formatted
//! output (subject/issuer/validity/serial, full `-text` dumps) and an X.509
//! decoding library used purely to enrich the view (SANs, key usage, CA and
//! self-signed flags, SHA-256 fingerprint). The decoding library never
//! produces conversions; that stays openssl's job.

use crate::cert_ops::detect::{self, FileType};
use crate::cert_ops::secret::Secret;
use crate::cert_ops::{Engine, Invoker};
use crate::error::{EngineError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use sha2::Digest;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

/// Summary of a certificate or key file. Built fresh per inspection; a new
/// request produces a new summary.
#[derive(Debug, Clone, Serialize)]
pub struct CertSummary {
    pub path: PathBuf,
    pub file_type: FileType,
    pub subject: String,
    pub issuer: String,
    pub not_before: String,
    pub not_after: String,
    pub serial: String,
    pub san: Vec<String>,
    pub signature_algorithm: String,
    pub public_key: String,
    pub key_usage: Vec<String>,
    pub extended_key_usage: Vec<String>,
    pub is_ca: bool,
    pub is_self_signed: bool,
    pub fingerprint_sha256: String,
    /// Algorithm name for public-key files (e.g. `ssh-ed25519`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_algorithm: Option<String>,
    /// Trailing comment of an OpenSSH public key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl CertSummary {
    fn empty(path: &Path, file_type: FileType) -> Self {
        CertSummary {
            path: path.to_path_buf(),
            file_type,
            subject: String::new(),
            issuer: String::new(),
            not_before: String::new(),
            not_after: String::new(),
            serial: String::new(),
            san: Vec::new(),
            signature_algorithm: String::new(),
            public_key: String::new(),
            key_usage: Vec::new(),
            extended_key_usage: Vec::new(),
            is_ca: false,
            is_self_signed: false,
            fingerprint_sha256: String::new(),
            key_algorithm: None,
            comment: None,
        }
    }
}

/// Full human-readable text dump of a file. Built fresh per inspection.
#[derive(Debug, Clone, Serialize)]
pub struct CertDetails {
    pub path: PathBuf,
    pub file_type: FileType,
    pub text: String,
}

/// Expiry check result. `days_left` may be negative (already expired); that is
/// intentional, not an error state.
#[derive(Debug, Clone, Serialize)]
pub struct ExpiryResult {
    pub expires_at: DateTime<Utc>,
    pub not_after: String,
    pub days_left: i64,
    pub valid: bool,
}

impl<E: Invoker> Engine<E> {
    /// Build a summary of a certificate, combined, DER, key, or public-key
    /// file.
    pub async fn summary(&self, cancel: &CancellationToken, path: &Path) -> Result<CertSummary> {
        let file_type = detect::detect_type(path)?;

        match file_type {
            FileType::Cert | FileType::Combined | FileType::Der => {
                self.cert_summary(cancel, path, file_type).await
            }
            FileType::PublicKey => self.public_key_summary(cancel, path).await,
            FileType::Key => {
                let mut summary = CertSummary::empty(path, file_type);
                summary.key_algorithm = detect::detect_key_type(path).ok().map(|k| k.to_string());
                Ok(summary)
            }
            FileType::Pfx => Err(EngineError::Unsupported(
                "PKCS#12 containers must be extracted before inspection (convert --to pem)"
                    .to_string(),
            )),
            FileType::Base64 | FileType::Unknown => Err(EngineError::Unsupported(format!(
                "cannot summarize a {} file",
                file_type
            ))),
        }
    }

    async fn cert_summary(
        &self,
        cancel: &CancellationToken,
        path: &Path,
        file_type: FileType,
    ) -> Result<CertSummary> {
        let mut args = vec!["x509".to_string(), "-in".to_string(), path_arg(path)];
        if file_type == FileType::Der {
            args.extend(["-inform".to_string(), "DER".to_string()]);
        }
        args.extend(
            ["-noout", "-subject", "-issuer", "-dates", "-serial"]
                .iter()
                .map(|s| s.to_string()),
        );

        let output = self.run_classified(cancel, &args).await?;

        let mut summary = CertSummary::empty(path, file_type);
        summary.subject = tool_field(&output.stdout, "subject=");
        summary.issuer = tool_field(&output.stdout, "issuer=");
        summary.not_before = tool_field(&output.stdout, "notBefore=");
        summary.not_after = tool_field(&output.stdout, "notAfter=");
        summary.serial = tool_field(&output.stdout, "serial=");

        let der = read_cert_der(path, file_type)?;
        enrich_from_der(&mut summary, &der)?;
        Ok(summary)
    }

    async fn public_key_summary(
        &self,
        cancel: &CancellationToken,
        path: &Path,
    ) -> Result<CertSummary> {
        let mut summary = CertSummary::empty(path, FileType::PublicKey);

        let data = std::fs::read(path)?;
        let text = String::from_utf8_lossy(&data);
        if let Some(ssh) = detect::parse_ssh_public_key(&text) {
            summary.key_algorithm = Some(ssh.algorithm);
            summary.comment = ssh.comment;
            return Ok(summary);
        }

        // PEM public key: let openssl describe it.
        let args: Vec<String> = vec![
            "pkey".to_string(),
            "-pubin".to_string(),
            "-in".to_string(),
            path_arg(path),
            "-noout".to_string(),
            "-text".to_string(),
        ];
        let output = self.run_classified(cancel, &args).await?;
        summary.public_key = output
            .stdout
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok(summary)
    }

    /// Full `-text`-style dump of a file. PKCS#12 containers need the
    /// password; other types ignore it unless the key itself is encrypted.
    pub async fn details(
        &self,
        cancel: &CancellationToken,
        path: &Path,
        password: Option<&str>,
    ) -> Result<CertDetails> {
        let file_type = detect::detect_type(path)?;

        let output = match file_type {
            FileType::Cert | FileType::Combined => {
                let args = string_args(&["x509", "-in", &path_arg(path), "-noout", "-text"]);
                self.run_classified(cancel, &args).await?
            }
            FileType::Der => {
                let args = string_args(&[
                    "x509", "-inform", "DER", "-in", &path_arg(path), "-noout", "-text",
                ]);
                self.run_classified(cancel, &args).await?
            }
            FileType::Key => {
                let mut args = string_args(&["pkey", "-in", &path_arg(path), "-noout", "-text"]);
                let mut secrets = Vec::new();
                if let Some(pwd) = password {
                    args.extend(string_args(&["-passin", "fd:3"]));
                    secrets.push(Secret::new(pwd));
                }
                let out = self.invoker().run_with_secrets(cancel, &secrets, &args).await?;
                if !out.success {
                    return Err(crate::cert_ops::classify::classify_failure(
                        out.exit_code,
                        &out.stderr,
                    ));
                }
                out
            }
            FileType::PublicKey => {
                let args = string_args(&[
                    "pkey", "-pubin", "-in", &path_arg(path), "-noout", "-text",
                ]);
                self.run_classified(cancel, &args).await?
            }
            FileType::Pfx => {
                let args = string_args(&[
                    "pkcs12", "-in", &path_arg(path), "-info", "-nokeys", "-passin", "fd:3",
                ]);
                let secrets = vec![Secret::new(password.unwrap_or(""))];
                self.run_pkcs12_classified(cancel, &secrets, &args).await?
            }
            FileType::Base64 | FileType::Unknown => {
                return Err(EngineError::Unsupported(format!(
                    "cannot dump a {} file",
                    file_type
                )));
            }
        };

        Ok(CertDetails {
            path: path.to_path_buf(),
            file_type,
            text: output.combined(),
        })
    }

    /// Check whether a certificate stays valid for the next `days` days.
    pub async fn expiry(
        &self,
        cancel: &CancellationToken,
        path: &Path,
        days: i64,
    ) -> Result<ExpiryResult> {
        let file_type = detect::detect_type(path)?;
        let mut args = vec!["x509".to_string(), "-in".to_string(), path_arg(path)];
        if file_type == FileType::Der {
            args.extend(string_args(&["-inform", "DER"]));
        }
        args.extend(string_args(&["-noout", "-enddate", "-checkend"]));
        args.push(days.max(0).saturating_mul(86_400).to_string());

        // -checkend signals "will expire" through the exit status, so a
        // failure here is only an error when openssl never printed the date.
        let output = self.invoker().run(cancel, &args).await?;
        let not_after = tool_field(&output.stdout, "notAfter=");
        if not_after.is_empty() {
            return Err(crate::cert_ops::classify::classify_failure(
                output.exit_code,
                &output.stderr,
            ));
        }

        let expires_at = parse_openssl_time(&not_after)?;
        let days_left = (expires_at - Utc::now()).num_days();

        Ok(ExpiryResult {
            expires_at,
            not_after,
            days_left,
            valid: output.success,
        })
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

fn string_args(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|s| s.to_string()).collect()
}

/// Extract a `prefix=value` field from openssl's line-oriented output.
fn tool_field(stdout: &str, prefix: &str) -> String {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix(prefix))
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Parse openssl's validity time format, e.g. `Jun  1 12:00:00 2027 GMT`.
fn parse_openssl_time(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), "%b %d %H:%M:%S %Y GMT")
        .map(|naive| naive.and_utc())
        .map_err(|e| EngineError::Parse(format!("unrecognized notAfter value {:?}: {}", value, e)))
}

/// Read the leaf certificate's DER bytes out of a PEM or DER file.
fn read_cert_der(path: &Path, file_type: FileType) -> Result<Vec<u8>> {
    let data = std::fs::read(path)?;
    if file_type == FileType::Der {
        return Ok(data);
    }

    let blocks = ::pem::parse_many(&data)
        .map_err(|e| EngineError::Parse(format!("failed to parse PEM: {}", e)))?;
    blocks
        .into_iter()
        .find(|b| b.tag() == "CERTIFICATE")
        .map(|b| b.into_contents())
        .ok_or_else(|| {
            EngineError::Parse(format!(
                "no CERTIFICATE block found in {}",
                path.display()
            ))
        })
}

/// Fill in the X.509-library-derived fields of a summary.
fn enrich_from_der(summary: &mut CertSummary, der: &[u8]) -> Result<()> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| EngineError::Parse(format!("failed to parse certificate: {:?}", e)))?;

    summary.fingerprint_sha256 = hex::encode(sha2::Sha256::digest(der));

    summary.san = extract_san(&cert);
    summary.signature_algorithm = sig_alg_name(&cert.signature_algorithm.algorithm.to_string());
    summary.public_key = describe_public_key(&cert);
    summary.key_usage = extract_key_usage(&cert);
    summary.extended_key_usage = extract_extended_key_usage(&cert);
    summary.is_self_signed = cert.subject() == cert.issuer();
    summary.is_ca = cert
        .basic_constraints()
        .map(|bc| bc.map(|ext| ext.value.ca).unwrap_or(false))
        .unwrap_or(false);

    Ok(())
}

fn extract_san(cert: &X509Certificate) -> Vec<String> {
    let mut sans = Vec::new();

    if let Ok(Some(san_ext)) = cert.subject_alternative_name() {
        for name in &san_ext.value.general_names {
            match name {
                GeneralName::DNSName(dns) => sans.push(dns.to_string()),
                GeneralName::IPAddress(ip) => {
                    if ip.len() == 4 {
                        sans.push(format!("{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3]));
                    } else if ip.len() == 16 {
                        let parts: Vec<String> = ip
                            .chunks(2)
                            .map(|c| format!("{:02x}{:02x}", c[0], c[1]))
                            .collect();
                        sans.push(parts.join(":"));
                    }
                }
                _ => {}
            }
        }
    }

    sans
}

fn describe_public_key(cert: &X509Certificate) -> String {
    let pk = cert.public_key();
    match pk.parsed() {
        Ok(PublicKey::RSA(rsa)) => format!("RSA ({} bit)", rsa.key_size() * 8),
        Ok(PublicKey::EC(ec)) => format!("EC ({} bit)", ec.key_size() * 8),
        _ => pk.algorithm.algorithm.to_string(),
    }
}

/// Map the handful of signature OIDs seen in practice to their short names;
/// anything else stays a dotted OID.
fn sig_alg_name(oid: &str) -> String {
    match oid {
        "1.2.840.113549.1.1.5" => "sha1WithRSAEncryption".to_string(),
        "1.2.840.113549.1.1.11" => "sha256WithRSAEncryption".to_string(),
        "1.2.840.113549.1.1.12" => "sha384WithRSAEncryption".to_string(),
        "1.2.840.113549.1.1.13" => "sha512WithRSAEncryption".to_string(),
        "1.2.840.10045.4.3.2" => "ecdsa-with-SHA256".to_string(),
        "1.2.840.10045.4.3.3" => "ecdsa-with-SHA384".to_string(),
        "1.2.840.10045.4.3.4" => "ecdsa-with-SHA512".to_string(),
        "1.3.101.112" => "ED25519".to_string(),
        other => other.to_string(),
    }
}

fn extract_key_usage(cert: &X509Certificate) -> Vec<String> {
    let mut usages = Vec::new();

    if let Ok(Some(ku)) = cert.key_usage() {
        let flags = ku.value;
        if flags.digital_signature() {
            usages.push("Digital Signature".to_string());
        }
        if flags.non_repudiation() {
            usages.push("Non-Repudiation".to_string());
        }
        if flags.key_encipherment() {
            usages.push("Key Encipherment".to_string());
        }
        if flags.data_encipherment() {
            usages.push("Data Encipherment".to_string());
        }
        if flags.key_agreement() {
            usages.push("Key Agreement".to_string());
        }
        if flags.key_cert_sign() {
            usages.push("Certificate Sign".to_string());
        }
        if flags.crl_sign() {
            usages.push("CRL Sign".to_string());
        }
    }

    usages
}

fn extract_extended_key_usage(cert: &X509Certificate) -> Vec<String> {
    let mut usages = Vec::new();

    if let Ok(Some(eku)) = cert.extended_key_usage() {
        if eku.value.server_auth {
            usages.push("Server Authentication".to_string());
        }
        if eku.value.client_auth {
            usages.push("Client Authentication".to_string());
        }
        if eku.value.code_signing {
            usages.push("Code Signing".to_string());
        }
        if eku.value.email_protection {
            usages.push("Email Protection".to_string());
        }
        if eku.value.time_stamping {
            usages.push("Time Stamping".to_string());
        }
        if eku.value.ocsp_signing {
            usages.push("OCSP Signing".to_string());
        }
    }

    usages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_field_extraction() {
        let stdout = "subject=CN = test.example.com\nissuer=CN = Example CA\nserial=0FAB\n";
        assert_eq!(tool_field(stdout, "subject="), "CN = test.example.com");
        assert_eq!(tool_field(stdout, "issuer="), "CN = Example CA");
        assert_eq!(tool_field(stdout, "serial="), "0FAB");
        assert_eq!(tool_field(stdout, "notAfter="), "");
    }

    #[test]
    fn test_parse_openssl_time() {
        let parsed = parse_openssl_time("Jun  1 12:00:00 2027 GMT").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d %H:%M:%S").to_string(), "2027-06-01 12:00:00");

        let padded = parse_openssl_time("Dec 31 23:59:59 2030 GMT").unwrap();
        assert_eq!(padded.format("%Y-%m-%d").to_string(), "2030-12-31");

        assert!(parse_openssl_time("not a date").is_err());
    }

    #[test]
    fn test_sig_alg_name_falls_back_to_oid() {
        assert_eq!(sig_alg_name("1.2.840.113549.1.1.11"), "sha256WithRSAEncryption");
        assert_eq!(sig_alg_name("1.2.3.4.5"), "1.2.3.4.5");
    }
}
