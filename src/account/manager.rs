/// Account lifecycle operations over the transport
use crate::account::{Account, SettingsStore, SigningSettings};
use crate::crypto::{AccountKey, KeyAlgorithm, SharedAccountKey};
use crate::error::{EngineError, Result};
use crate::protocol::jws;
use crate::transport::{AcmeTransport, Auth};
use crate::types::AccountStatus;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Manages registration, mutation, and key rollover for one account.
///
/// The manager owns the authoritative key handle; the transport's signer
/// holds a non-owning clone of the same handle.
pub struct AccountManager {
    transport: Arc<AcmeTransport>,
    key: SharedAccountKey,
    store: Arc<dyn SettingsStore>,
    settings: RwLock<SigningSettings>,
}

impl AccountManager {
    /// Create a manager around the loaded settings
    pub fn new(
        transport: Arc<AcmeTransport>,
        key: SharedAccountKey,
        store: Arc<dyn SettingsStore>,
        settings: SigningSettings,
    ) -> Self {
        Self {
            transport,
            key,
            store,
            settings: RwLock::new(settings),
        }
    }

    /// The registered account URL
    pub async fn account_url(&self) -> Result<String> {
        self.settings
            .read()
            .await
            .account_uri
            .clone()
            .ok_or_else(|| EngineError::account_invalid("No account registered yet"))
    }

    /// Register a new account (or fetch the one bound to this key; the
    /// server treats repeated registration as a lookup).
    pub async fn register(&self, email: &str, terms_agreed: bool) -> Result<Account> {
        let directory = self.transport.directory().await?;

        let payload = json!({
            "termsOfServiceAgreed": terms_agreed,
            "contact": [format!("mailto:{}", email)],
        });

        let response = self
            .transport
            .post(&directory.new_account, Some(&payload), Auth::Jwk)
            .await?;

        let account_url = response.location_required()?.to_string();
        let mut account: Account = response.json()?;
        account.url = account_url.clone();

        {
            let mut settings = self.settings.write().await;
            settings.account_email = Some(email.to_string());
            settings.account_uri = Some(account_url.clone());
            self.store.save(&settings).await?;
        }

        tracing::info!("Account registered: {}", account_url);
        Ok(account)
    }

    /// Look up the account already bound to this key, without creating one
    pub async fn lookup_existing(&self) -> Result<Account> {
        let directory = self.transport.directory().await?;

        let payload = json!({ "onlyReturnExisting": true });
        let response = self
            .transport
            .post(&directory.new_account, Some(&payload), Auth::Jwk)
            .await?;

        let account_url = response.location_required()?.to_string();
        let mut account: Account = response.json()?;
        account.url = account_url.clone();

        {
            let mut settings = self.settings.write().await;
            settings.account_uri = Some(account_url);
            self.store.save(&settings).await?;
        }

        Ok(account)
    }

    /// Update contact email and terms agreement
    pub async fn update(&self, email: &str, terms_agreed: bool) -> Result<Account> {
        let url = self.account_url().await?;

        let payload = json!({
            "termsOfServiceAgreed": terms_agreed,
            "contact": [format!("mailto:{}", email)],
        });

        let response = self
            .transport
            .post(&url, Some(&payload), Auth::Kid(&url))
            .await?;

        let mut account: Account = response.json()?;
        account.url = url;

        let mut settings = self.settings.write().await;
        settings.account_email = Some(email.to_string());
        self.store.save(&settings).await?;

        Ok(account)
    }

    /// Deactivate the account; it cannot be used afterwards
    pub async fn deactivate(&self) -> Result<()> {
        let url = self.account_url().await?;

        let payload = json!({ "status": "deactivated" });
        self.transport
            .post(&url, Some(&payload), Auth::Kid(&url))
            .await?;

        tracing::info!("Account deactivated: {}", url);
        Ok(())
    }

    /// Normalized account status for callers
    pub async fn status(&self) -> Result<AccountStatus> {
        let url = match self.account_url().await {
            Ok(url) => url,
            Err(_) => return Ok(AccountStatus::DoesNotExist),
        };

        match self.transport.post_as_get(&url, &url).await {
            Ok(response) => {
                let account: Account = response.json()?;
                Ok(AccountStatus::from_wire(&account.status))
            }
            Err(EngineError::Acme(problem)) if problem.is_account_does_not_exist() => {
                Ok(AccountStatus::DoesNotExist)
            }
            Err(EngineError::Acme(problem)) if problem.is_unauthorized() => {
                Ok(AccountStatus::Unknown)
            }
            Err(other) => Err(other),
        }
    }

    /// Roll the account over to a freshly generated key (RFC 8555 §7.3.5).
    ///
    /// The inner JWS is signed by the new key and carries its JWK; the
    /// outer JWS is signed by the current key. The active key is swapped
    /// only after the server accepts the change, and the swap blocks all
    /// in-flight signing.
    pub async fn rollover(&self) -> Result<()> {
        let url = self.account_url().await?;
        let directory = self.transport.directory().await?;

        let new_key = AccountKey::generate(KeyAlgorithm::Es256)?;
        let new_key_pem = new_key.to_pem()?;

        let inner = {
            let old_key = self.key.read().await;
            let inner_protected = jws::jwk_header(
                new_key.algorithm().jws_alg(),
                new_key.jwk()?.to_value(),
                None,
                &directory.key_change,
            );
            let inner_payload = json!({
                "account": url,
                "oldKey": old_key.jwk()?.to_value(),
            });
            jws::sign_flattened(&new_key, &inner_protected, Some(&inner_payload))?
        };

        let inner_value: serde_json::Value = serde_json::from_str(&inner)?;
        self.transport
            .post(&directory.key_change, Some(&inner_value), Auth::Kid(&url))
            .await?;

        // Server accepted: swap the active key, then persist.
        {
            let mut key = self.key.write().await;
            *key = new_key;
        }
        {
            let mut settings = self.settings.write().await;
            settings.account_key_pem = new_key_pem;
            self.store.save(&settings).await?;
        }

        tracing::info!("Account key rolled over for {}", url);
        Ok(())
    }

    /// Snapshot of the current settings blob
    pub async fn settings(&self) -> SigningSettings {
        self.settings.read().await.clone()
    }
}
