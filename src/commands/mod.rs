//! Command implementations for certkit
//!
//! Each subcommand gets one `run_*` function that consumes the engine and
//! formats results for the terminal. Commands whose outcome is a pass/fail
//! judgement (`expiry`, `verify`) return that judgement so `main` can map it
//! to the process exit code.

use crate::cert_ops::{detect, Engine, FileType, Invoker};
use crate::cli::{
    ConvertArgs, DetailsArgs, DetectArgs, ExpiryArgs, InfoArgs, ModulusArgs, TargetFormat,
    VerifyArgs,
};
use crate::config::Settings;
use anyhow::{anyhow, bail, Context, Result};
use console::{style, Term};
use std::future::Future;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Print a success message
fn print_success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message
fn print_error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

fn print_field(name: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    println!("  {} {}", style(format!("{}:", name)).bold(), value);
}

/// Run an operation that may need a container password.
///
/// An explicitly supplied password is used as-is, with no retries. Otherwise
/// the empty password is tried first (many PKCS#12 files are exported without
/// one), and on an incorrect-password failure the user is prompted, up to
/// `attempts` times. Non-interactive sessions never prompt.
async fn with_container_password<T, F, Fut>(
    explicit: Option<&str>,
    attempts: u32,
    label: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = crate::error::Result<T>>,
{
    if let Some(password) = explicit {
        return Ok(call(password.to_string()).await?);
    }

    let mut candidate = String::new();
    let mut prompts = 0;
    loop {
        match call(candidate).await {
            Ok(value) => return Ok(value),
            Err(err)
                if err.is_incorrect_password()
                    && prompts < attempts
                    && Term::stderr().is_term() =>
            {
                if prompts > 0 {
                    print_error("incorrect password, try again");
                }
                candidate = dialoguer::Password::new()
                    .with_prompt(format!("Password for {}", label))
                    .allow_empty_password(true)
                    .interact()?;
                prompts += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Run the detect command
pub async fn run_detect(args: &DetectArgs) -> Result<()> {
    let mut failures = 0;
    for file in &args.files {
        match detect::detect_type(file) {
            Ok(file_type) => {
                let flavor = match file_type {
                    FileType::Key => detect::detect_key_type(file)
                        .ok()
                        .map(|k| format!(" ({})", k))
                        .unwrap_or_default(),
                    _ => String::new(),
                };
                println!("{}: {}{}", style(file.display()).bold(), file_type, flavor);
            }
            Err(err) => {
                print_error(&format!("{}: {}", file.display(), err));
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{} file(s) could not be classified", failures);
    }
    Ok(())
}

/// Run the info command
pub async fn run_info<E: Invoker>(
    engine: &Engine<E>,
    cancel: &CancellationToken,
    args: &InfoArgs,
) -> Result<()> {
    let mut summaries = Vec::new();
    for file in &args.files {
        let summary = engine
            .summary(cancel, file)
            .await
            .with_context(|| format!("failed to inspect {}", file.display()))?;
        summaries.push(summary);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    for summary in &summaries {
        println!();
        println!(
            "{}",
            style(format!("━━━ {} ━━━", summary.path.display()))
                .cyan()
                .bold()
        );
        print_field("Type", &summary.file_type.to_string());
        print_field("Subject", &summary.subject);
        print_field("Issuer", &summary.issuer);
        print_field("Not Before", &summary.not_before);
        print_field("Not After", &summary.not_after);
        print_field("Serial", &summary.serial);
        print_field("Signature", &summary.signature_algorithm);
        print_field("Public Key", &summary.public_key);
        if let Some(algorithm) = &summary.key_algorithm {
            print_field("Key Algorithm", algorithm);
        }
        if let Some(comment) = &summary.comment {
            print_field("Comment", comment);
        }
        if !summary.key_usage.is_empty() {
            print_field("Key Usage", &summary.key_usage.join(", "));
        }
        if !summary.extended_key_usage.is_empty() {
            print_field("Extended Key Usage", &summary.extended_key_usage.join(", "));
        }
        if matches!(
            summary.file_type,
            FileType::Cert | FileType::Combined | FileType::Der
        ) {
            print_field("CA", if summary.is_ca { "yes" } else { "no" });
            print_field(
                "Self-signed",
                if summary.is_self_signed { "yes" } else { "no" },
            );
        }
        print_field("SHA-256", &summary.fingerprint_sha256);
        if !summary.san.is_empty() {
            println!("  {}", style("Subject Alternative Names:").bold());
            for san in &summary.san {
                println!("    {} {}", style("•").cyan(), san);
            }
        }
    }
    Ok(())
}

/// Run the details command
pub async fn run_details<E: Invoker>(
    engine: &Engine<E>,
    cancel: &CancellationToken,
    args: &DetailsArgs,
    settings: &Settings,
) -> Result<()> {
    let file_type = detect::detect_type(&args.file)?;

    let details = if file_type == FileType::Pfx {
        let label = args.file.display().to_string();
        with_container_password(
            args.password.as_deref(),
            settings.password_prompt_attempts,
            &label,
            |password| async move { engine.details(cancel, &args.file, Some(password.as_str())).await },
        )
        .await?
    } else {
        engine
            .details(cancel, &args.file, args.password.as_deref())
            .await?
    };

    println!("{}", details.text.trim_end());
    Ok(())
}

/// Run the expiry command. Returns whether the certificate is still valid for
/// the requested window.
pub async fn run_expiry<E: Invoker>(
    engine: &Engine<E>,
    cancel: &CancellationToken,
    args: &ExpiryArgs,
) -> Result<bool> {
    let result = engine.expiry(cancel, &args.file, args.days).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(result.valid);
    }

    if result.valid {
        print_success(&format!(
            "{} is valid for the next {} days (expires {}, {} days left)",
            args.file.display(),
            args.days,
            result.not_after,
            result.days_left
        ));
    } else if result.days_left < 0 {
        print_error(&format!(
            "{} expired {} days ago ({})",
            args.file.display(),
            -result.days_left,
            result.not_after
        ));
    } else {
        print_error(&format!(
            "{} expires within {} days ({}, {} days left)",
            args.file.display(),
            args.days,
            result.not_after,
            result.days_left
        ));
    }
    Ok(result.valid)
}

fn single_input(args: &ConvertArgs) -> Result<&Path> {
    args.input
        .as_deref()
        .ok_or_else(|| anyhow!("an input file is required"))
}

fn cert_and_key(args: &ConvertArgs) -> Result<(&Path, &Path)> {
    let cert = args
        .cert
        .as_deref()
        .or(args.input.as_deref())
        .ok_or_else(|| anyhow!("a certificate is required (positional or --cert)"))?;
    let key = args
        .key
        .as_deref()
        .ok_or_else(|| anyhow!("--key is required for this target format"))?;
    Ok((cert, key))
}

/// Run the convert command
pub async fn run_convert<E: Invoker>(
    engine: &Engine<E>,
    cancel: &CancellationToken,
    args: &ConvertArgs,
    settings: &Settings,
) -> Result<()> {
    match args.to {
        TargetFormat::Der => {
            let input = single_input(args)?;
            let output = engine.to_der(cancel, input, args.output.as_deref()).await?;
            print_success(&format!("Wrote DER to {}", output.display()));
        }
        TargetFormat::Pem => {
            let input = single_input(args)?;
            let file_type = detect::detect_type(input)?;
            match file_type {
                FileType::Der => {
                    let output = engine
                        .from_der(cancel, input, args.output.as_deref())
                        .await?;
                    print_success(&format!("Wrote PEM to {}", output.display()));
                }
                FileType::Base64 => {
                    let output = engine
                        .from_base64(cancel, input, args.output.as_deref())
                        .await?;
                    print_success(&format!("Decoded Base64 to {}", output.display()));
                }
                FileType::Pfx => {
                    let label = input.display().to_string();
                    let result = with_container_password(
                        args.password.as_deref(),
                        settings.password_prompt_attempts,
                        &label,
                        |password| async move { engine.from_pfx(cancel, input, &password).await },
                    )
                    .await?;
                    print_success(&format!(
                        "Extracted certificate to {}",
                        result.cert_path.display()
                    ));
                    print_success(&format!(
                        "Extracted private key to {}",
                        result.key_path.display()
                    ));
                    if let Some(ca_path) = &result.ca_path {
                        print_success(&format!("Extracted CA bundle to {}", ca_path.display()));
                    }
                }
                other => {
                    bail!(
                        "{} is a {} file and needs no PEM conversion",
                        input.display(),
                        other
                    );
                }
            }
        }
        TargetFormat::Pfx => {
            let (cert, key) = cert_and_key(args)?;
            let password = match &args.password {
                Some(password) => password.clone(),
                None if Term::stderr().is_term() => dialoguer::Password::new()
                    .with_prompt("Export password")
                    .with_confirmation("Confirm export password", "passwords do not match")
                    .allow_empty_password(true)
                    .interact()?,
                None => String::new(),
            };
            let output = engine
                .to_pfx(cancel, cert, key, args.output.as_deref(), &password)
                .await?;
            print_success(&format!(
                "Wrote PKCS#12 container to {}",
                output.display()
            ));
        }
        TargetFormat::Base64 => {
            let input = single_input(args)?;
            let output = engine
                .to_base64(cancel, input, args.output.as_deref())
                .await?;
            print_success(&format!("Encoded Base64 to {}", output.display()));
        }
        TargetFormat::Combined => {
            let (cert, key) = cert_and_key(args)?;
            let output = engine
                .combine_pem(cancel, cert, key, args.output.as_deref())
                .await?;
            print_success(&format!("Wrote combined PEM to {}", output.display()));
        }
    }
    Ok(())
}

/// Run the verify command. Returns whether the verification passed.
pub async fn run_verify<E: Invoker>(
    engine: &Engine<E>,
    cancel: &CancellationToken,
    args: &VerifyArgs,
) -> Result<bool> {
    match (&args.chain, &args.cert, &args.key) {
        (Some(chain), _, _) => {
            let outcome = engine
                .verify_chain(cancel, chain, args.ca_file.as_deref())
                .await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(outcome.ok);
            }
            println!("{}", outcome.output.trim_end());
            for hint in &outcome.hints {
                println!("  {} {}", style("ℹ").blue(), hint);
            }
            if outcome.ok {
                print_success("certificate chain verifies");
            } else {
                print_error("certificate chain does not verify");
            }
            Ok(outcome.ok)
        }
        (None, Some(cert), Some(key)) => {
            let result = engine.match_key_to_cert(cancel, cert, key).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(result.matches);
            }
            if result.matches {
                match result.key_type {
                    Some(key_type) => {
                        print_success(&format!("{} key matches certificate", key_type))
                    }
                    None => print_success("key matches certificate"),
                }
            } else {
                print_error("key does not match certificate");
            }
            Ok(result.matches)
        }
        _ => bail!(
            "pass --chain [--ca-file] for chain verification, or --cert and --key for key matching"
        ),
    }
}

/// Run the modulus command
pub async fn run_modulus<E: Invoker>(
    engine: &Engine<E>,
    cancel: &CancellationToken,
    args: &ModulusArgs,
) -> Result<()> {
    let modulus = engine.modulus(cancel, &args.file).await?;
    println!("{}", modulus);
    Ok(())
}
