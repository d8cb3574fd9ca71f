/// ACME directory resource and its cache
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// ACME directory response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Directory {
    /// New nonce endpoint
    #[serde(rename = "newNonce")]
    pub new_nonce: String,

    /// New account endpoint
    #[serde(rename = "newAccount")]
    pub new_account: String,

    /// New order endpoint
    #[serde(rename = "newOrder")]
    pub new_order: String,

    /// Revoke cert endpoint
    #[serde(rename = "revokeCert")]
    pub revoke_cert: String,

    /// Key change endpoint
    #[serde(rename = "keyChange")]
    pub key_change: String,

    /// Directory metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<DirectoryMeta>,
}

/// Directory metadata
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectoryMeta {
    /// Terms of Service URL
    #[serde(rename = "termsOfService")]
    pub terms_of_service: Option<String>,

    /// Website URL
    pub website: Option<String>,

    /// CAA identities
    #[serde(rename = "caaIdentities")]
    pub caa_identities: Option<Vec<String>>,

    /// External account required flag
    #[serde(rename = "externalAccountRequired")]
    pub external_account_required: Option<bool>,
}

/// Cached directory fetch
pub struct DirectoryCache {
    url: String,
    directory: RwLock<Option<Directory>>,
    http_client: reqwest::Client,
}

impl DirectoryCache {
    /// Create a cache for the given directory URL
    pub fn new(url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            directory: RwLock::new(None),
            http_client,
        }
    }

    /// Fetch a fresh directory from the server
    pub async fn fetch(&self) -> Result<Directory> {
        let response = self.http_client.get(&self.url).send().await.map_err(|e| {
            crate::error::EngineError::transient(format!("Failed to fetch directory: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(crate::error::EngineError::transient(format!(
                "Failed to fetch directory: HTTP {}",
                response.status()
            )));
        }

        let directory: Directory = response.json().await.map_err(|e| {
            crate::error::EngineError::transient(format!("Failed to parse directory: {}", e))
        })?;

        let mut cached = self.directory.write().await;
        *cached = Some(directory.clone());

        Ok(directory)
    }

    /// Cached directory, fetching if necessary
    pub async fn get(&self) -> Result<Directory> {
        {
            let cached = self.directory.read().await;
            if let Some(dir) = cached.clone() {
                return Ok(dir);
            }
        }

        self.fetch().await
    }

    /// Drop the cached copy
    pub async fn clear(&self) {
        let mut cached = self.directory.write().await;
        *cached = None;
    }

    /// The configured directory URL
    pub fn url(&self) -> &str {
        &self.url
    }
}
