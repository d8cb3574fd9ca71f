/// CLI argument parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "certforge")]
#[command(about = "ACME certificate engine: obtain, package, and revoke TLS certificates", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(global = true, long, default_value = "info")]
    pub log_level: String,

    /// Config file path (TOML)
    #[arg(global = true, long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Obtain a certificate and package it as a PKCS#12
    Obtain(ObtainArgs),

    /// Revoke a certificate from a PKCS#12 file
    Revoke(RevokeArgs),

    /// Account management
    Account(AccountArgs),
}

#[derive(Parser)]
pub struct ObtainArgs {
    /// Primary domain (certificate common name)
    #[arg(short, long)]
    pub domain: String,

    /// Additional subject alternative names
    #[arg(long = "san")]
    pub subject_alternative_names: Vec<String>,

    /// Contact email for the ACME account
    #[arg(short, long)]
    pub email: Option<String>,

    /// Challenge kinds to try, in order (http-01, dns-01)
    #[arg(short, long = "challenge")]
    pub challenges: Vec<String>,

    /// Certificate key algorithm (RS256, ES256, ES384, ES512)
    #[arg(long, default_value = "RS256")]
    pub key_alg: String,

    /// Use a ready-made CSR (PEM file) instead of generating one
    #[arg(long)]
    pub csr_file: Option<PathBuf>,

    /// Use an existing certificate private key (PEM file)
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    /// Resume an existing order by URL
    #[arg(long)]
    pub resume_order: Option<String>,

    /// Webroot directory for HTTP-01 tokens
    #[arg(long)]
    pub webroot: Option<PathBuf>,

    /// Password for the resulting .pfx
    #[arg(long, default_value = "")]
    pub password: String,

    /// ACME directory URL
    #[arg(long)]
    pub directory: Option<String>,

    /// Use the Let's Encrypt staging directory
    #[arg(long, default_value_t = false)]
    pub staging: bool,

    /// Seconds to wait for DNS propagation before validation
    #[arg(long)]
    pub propagation_delay: Option<u64>,

    /// Accept invalid TLS certificates from the directory (test CAs only)
    #[arg(long, default_value_t = false)]
    pub allow_invalid_tls: bool,
}

#[derive(Parser)]
pub struct RevokeArgs {
    /// Path to the .pfx holding the certificate
    #[arg(long)]
    pub pfx: PathBuf,

    /// Password of the .pfx
    #[arg(long, default_value = "")]
    pub password: String,

    /// Revocation reason (unspecified, key-compromise, superseded, ...)
    #[arg(long)]
    pub reason: Option<String>,

    /// ACME directory URL
    #[arg(long)]
    pub directory: Option<String>,

    /// Use the Let's Encrypt staging directory
    #[arg(long, default_value_t = false)]
    pub staging: bool,
}

#[derive(Parser)]
pub struct AccountArgs {
    #[command(subcommand)]
    pub command: AccountCommands,

    /// ACME directory URL
    #[arg(global = true, long)]
    pub directory: Option<String>,

    /// Use the Let's Encrypt staging directory
    #[arg(global = true, long, default_value_t = false)]
    pub staging: bool,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Register a new account (agrees to the CA's terms of service)
    Register {
        /// Contact email
        #[arg(short, long)]
        email: String,
    },
    /// Show the normalized account status
    Status,
    /// Update the contact email
    Update {
        /// New contact email
        #[arg(short, long)]
        email: String,
    },
    /// Deactivate the account
    Deactivate,
    /// Roll the account over to a fresh key
    Rollover,
}
