//! ACME account management

pub mod manager;
pub mod settings;

pub use manager::AccountManager;
pub use settings::{FileSettingsStore, SettingsStore, SigningSettings};

use serde::{Deserialize, Serialize};

/// Account resource as returned by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Account URL; filled in from the Location header
    #[serde(default)]
    pub url: String,

    /// Wire status string; see [`crate::types::AccountStatus`] for the
    /// normalized form
    pub status: String,

    /// Contact URIs
    #[serde(default)]
    pub contact: Vec<String>,

    /// Terms of service agreed
    #[serde(rename = "termsOfServiceAgreed", default)]
    pub terms_of_service_agreed: bool,

    /// Orders list URL
    #[serde(default)]
    pub orders: Option<String>,
}
