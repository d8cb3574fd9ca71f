//! Engine configuration
//!
//! A TOML file supplies the long-lived settings; [`OrderSpec`] carries the
//! per-order request surface.

use crate::crypto::KeyAlgorithm;
use crate::error::{EngineError, Result};
use crate::types::ChallengeKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Let's Encrypt production directory
pub const LETS_ENCRYPT: &str = "https://acme-v02.api.letsencrypt.org/directory";
/// Let's Encrypt staging directory
pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Long-lived engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// ACME directory URL
    #[serde(default = "default_directory")]
    pub directory_url: String,

    /// Contact email used for registration
    #[serde(default)]
    pub contact_email: Option<String>,

    /// Root directory for issued artifacts
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,

    /// Path of the signing settings blob
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,

    /// Pre-blob plaintext key file to migrate, if one exists
    #[serde(default)]
    pub legacy_key_path: Option<PathBuf>,

    /// User-Agent for every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Disable TLS validation towards the directory (private test CAs)
    #[serde(default)]
    pub allow_invalid_tls: bool,

    /// Default challenge kinds to try, in order
    #[serde(default)]
    pub challenge_preferences: Vec<ChallengeKind>,

    /// Default DNS propagation wait before validation, seconds
    #[serde(default = "default_propagation_delay")]
    pub dns_propagation_delay_secs: u64,

    /// Also write the chain and key as PEM files next to the .pfx
    #[serde(default)]
    pub export_pem: bool,

    /// Extra PEM bundle merged into the issuer cache
    #[serde(default)]
    pub issuer_bundle: Option<PathBuf>,

    /// HTTP timeout, seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            directory_url: default_directory(),
            contact_email: None,
            assets_dir: default_assets_dir(),
            settings_path: default_settings_path(),
            legacy_key_path: None,
            user_agent: default_user_agent(),
            allow_invalid_tls: false,
            challenge_preferences: Vec::new(),
            dns_propagation_delay_secs: default_propagation_delay(),
            export_pem: false,
            issuer_bundle: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl EngineConfig {
    /// Defaults pointed at a directory URL
    pub fn new(directory_url: impl Into<String>) -> Self {
        Self {
            directory_url: directory_url.into(),
            ..Self::default()
        }
    }

    /// Defaults for Let's Encrypt staging
    pub fn lets_encrypt_staging() -> Self {
        Self::new(LETS_ENCRYPT_STAGING)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| EngineError::config(format!("{}: {}", path.display(), e)))
    }

    /// Set the contact email
    pub fn with_contact_email(mut self, email: impl Into<String>) -> Self {
        self.contact_email = Some(email.into());
        self
    }

    /// Set the assets directory
    pub fn with_assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = dir.into();
        self
    }

    /// Set the settings blob path
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = path.into();
        self
    }
}

/// One order request: the flag surface exposed to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Primary domain; becomes the CSR common name
    pub primary_domain: String,

    /// Additional names for the certificate
    #[serde(default)]
    pub subject_alternative_names: Vec<String>,

    /// Certificate key algorithm
    #[serde(default = "default_csr_key_alg")]
    pub csr_key_alg: KeyAlgorithm,

    /// Caller-supplied CSR (PEM); skips key generation entirely
    #[serde(default)]
    pub custom_csr_pem: Option<String>,

    /// Caller-supplied certificate key (PEM)
    #[serde(default)]
    pub custom_private_key_pem: Option<String>,

    /// Challenge kinds to try for this order; empty means engine default
    #[serde(default)]
    pub challenge_preferences: Vec<ChallengeKind>,

    /// Resume an existing order instead of creating one
    #[serde(default)]
    pub order_resume_uri: Option<String>,

    /// Per-order DNS propagation wait; overrides the engine default
    #[serde(default)]
    pub dns_propagation_delay_secs: Option<u64>,

    /// Password protecting the resulting PKCS#12
    #[serde(default)]
    pub pfx_password: String,
}

impl OrderSpec {
    /// Spec for a single domain with engine defaults
    pub fn new(primary_domain: impl Into<String>) -> Self {
        Self {
            primary_domain: primary_domain.into(),
            subject_alternative_names: Vec::new(),
            csr_key_alg: default_csr_key_alg(),
            custom_csr_pem: None,
            custom_private_key_pem: None,
            challenge_preferences: Vec::new(),
            order_resume_uri: None,
            dns_propagation_delay_secs: None,
            pfx_password: String::new(),
        }
    }

    /// Add a subject alternative name
    pub fn with_san(mut self, san: impl Into<String>) -> Self {
        self.subject_alternative_names.push(san.into());
        self
    }

    /// Set the certificate key algorithm
    pub fn with_key_alg(mut self, alg: KeyAlgorithm) -> Self {
        self.csr_key_alg = alg;
        self
    }

    /// Restrict the challenge kinds for this order
    pub fn with_challenge(mut self, kind: ChallengeKind) -> Self {
        self.challenge_preferences.push(kind);
        self
    }

    /// Set the PKCS#12 password
    pub fn with_pfx_password(mut self, password: impl Into<String>) -> Self {
        self.pfx_password = password.into();
        self
    }

    /// Resume the given order URL
    pub fn with_resume_uri(mut self, uri: impl Into<String>) -> Self {
        self.order_resume_uri = Some(uri.into());
        self
    }
}

fn default_directory() -> String {
    LETS_ENCRYPT.to_string()
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from(".certforge/assets")
}

fn default_settings_path() -> PathBuf {
    PathBuf::from(".certforge/signing.json")
}

fn default_user_agent() -> String {
    concat!("certforge/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_propagation_delay() -> u64 {
    30
}

fn default_timeout() -> u64 {
    30
}

fn default_csr_key_alg() -> KeyAlgorithm {
    KeyAlgorithm::Rs256
}
