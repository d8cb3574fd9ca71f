//! Signing facade over the shared account key

use crate::crypto::AccountKey;
use crate::error::Result;
use crate::protocol::jws;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared handle to the account key.
///
/// The account manager owns the authoritative handle; the signer and the
/// transport hold clones. Key rollover takes the write lock, so every
/// in-flight signing operation finishes under the old key before the swap.
pub type SharedAccountKey = Arc<RwLock<AccountKey>>;

/// Produces JWS envelopes and challenge digests for the account key
#[derive(Clone)]
pub struct AccountSigner {
    key: SharedAccountKey,
}

impl AccountSigner {
    /// Create a signer over a shared key handle
    pub fn new(key: SharedAccountKey) -> Self {
        Self { key }
    }

    /// The shared key handle
    pub fn key_handle(&self) -> &SharedAccountKey {
        &self.key
    }

    /// JWS `alg` value for the current key
    pub async fn jws_alg(&self) -> &'static str {
        self.key.read().await.algorithm().jws_alg()
    }

    /// Public JWK of the current key
    pub async fn jwk(&self) -> Result<Value> {
        Ok(self.key.read().await.jwk()?.to_value())
    }

    /// Sign a flattened JWS with the current key
    pub async fn sign_flattened(
        &self,
        protected: &Value,
        payload: Option<&Value>,
    ) -> Result<String> {
        let key = self.key.read().await;
        jws::sign_flattened(&key, protected, payload)
    }

    /// base64url(JWK thumbprint) of the current key
    pub async fn thumbprint(&self) -> Result<String> {
        self.key.read().await.thumbprint()
    }

    /// Key authorization for a challenge token: `token + "." + thumbprint`
    pub async fn key_authorization(&self, token: &str) -> Result<String> {
        let thumbprint = self.thumbprint().await?;
        Ok(format!("{}.{}", token, thumbprint))
    }

    /// DNS-01 TXT record value:
    /// `base64url(SHA-256(token + "." + thumbprint))`
    pub async fn dns_txt(&self, token: &str) -> Result<String> {
        let key_auth = self.key_authorization(token).await?;
        let mut hasher = Sha256::new();
        hasher.update(key_auth.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }
}
