//! certkit - certificate/key inspection and conversion without memorizing openssl
//!
//! This tool provides functionality for:
//! - Detecting certificate/key file types
//! - Summarizing and dumping certificates, keys, and PKCS#12 containers
//! - Converting between PEM, DER, PKCS#12, Base64, and combined PEM
//! - Verifying chains, matching keys to certificates, extracting RSA moduli
//! - Checking expiry against a day window

use certkit::cert_ops::Engine;
use certkit::cli::{Cli, Commands};
use certkit::commands;
use certkit::config::Settings;
use clap::Parser;
use console::style;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    match run().await {
        Ok(passed) => {
            if !passed {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Returns `false` when a pass/fail command (expiry, verify) failed its
/// judgement; that maps to exit code 1 without an error message.
async fn run() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    // Handle color preference
    if cli.no_color {
        console::set_colors_enabled(false);
    }

    let settings = match &cli.config {
        Some(path) => Settings::load_from_file(path)?,
        None => Settings::load_default()?,
    };

    let engine = Engine::with_openssl(&settings.openssl_path);

    // Ctrl-C cancels in-flight openssl children instead of orphaning them.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match &cli.command {
        Commands::Detect(args) => {
            commands::run_detect(args).await?;
            Ok(true)
        }
        Commands::Info(args) => {
            commands::run_info(&engine, &cancel, args).await?;
            Ok(true)
        }
        Commands::Details(args) => {
            commands::run_details(&engine, &cancel, args, &settings).await?;
            Ok(true)
        }
        Commands::Expiry(args) => commands::run_expiry(&engine, &cancel, args).await,
        Commands::Convert(args) => {
            commands::run_convert(&engine, &cancel, args, &settings).await?;
            Ok(true)
        }
        Commands::Verify(args) => commands::run_verify(&engine, &cancel, args).await,
        Commands::Modulus(args) => {
            commands::run_modulus(&engine, &cancel, args).await?;
            Ok(true)
        }
    }
}
