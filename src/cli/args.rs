//! CLI argument definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "certkit")]
#[command(version)]
#[command(about = "Inspect and convert certificate/key material without memorizing openssl", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML config file
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect the type of one or more certificate/key files
    Detect(DetectArgs),

    /// Show a certificate summary
    Info(InfoArgs),

    /// Show the full text dump of a certificate, key, or container
    Details(DetailsArgs),

    /// Check certificate expiry against a day window
    Expiry(ExpiryArgs),

    /// Convert between PEM, DER, PKCS#12, Base64, and combined PEM
    Convert(ConvertArgs),

    /// Verify a certificate chain or match a key to a certificate
    Verify(VerifyArgs),

    /// Extract the RSA modulus from a certificate or key
    Modulus(ModulusArgs),
}

#[derive(Args)]
pub struct DetectArgs {
    /// Files to classify
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Certificate files to summarize (PEM, DER, or combined)
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Output JSON instead of formatted text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct DetailsArgs {
    /// File to dump
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Password for PKCS#12 containers or encrypted keys
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args)]
pub struct ExpiryArgs {
    /// Certificate file to check
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Days the certificate must remain valid for
    #[arg(long, default_value = "30")]
    pub days: i64,

    /// Output JSON instead of formatted text
    #[arg(long)]
    pub json: bool,
}

/// Conversion target format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetFormat {
    Der,
    Pem,
    Pfx,
    Base64,
    Combined,
}

#[derive(Args)]
pub struct ConvertArgs {
    /// Input file (certificate for --to pfx/combined; use --cert/--key there)
    #[arg(value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Target format
    #[arg(long, value_enum)]
    pub to: TargetFormat,

    /// Output file (defaults to the input name with a swapped extension)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Certificate file (for --to pfx and --to combined)
    #[arg(long, value_name = "FILE")]
    pub cert: Option<PathBuf>,

    /// Private key file (for --to pfx and --to combined)
    #[arg(long, value_name = "FILE")]
    pub key: Option<PathBuf>,

    /// PKCS#12 password (prompted when omitted and needed)
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Certificate file to verify against a CA bundle
    #[arg(long, value_name = "FILE")]
    pub chain: Option<PathBuf>,

    /// CA bundle for chain verification
    #[arg(long, value_name = "FILE")]
    pub ca_file: Option<PathBuf>,

    /// Certificate file for key matching
    #[arg(long, value_name = "FILE")]
    pub cert: Option<PathBuf>,

    /// Private key file for key matching
    #[arg(long, value_name = "FILE")]
    pub key: Option<PathBuf>,

    /// Output JSON instead of formatted text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ModulusArgs {
    /// Certificate or RSA key file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}
