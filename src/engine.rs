//! The engine façade
//!
//! An explicit handle wiring transport, account manager, orchestrator,
//! assembler, and revoker together. Callers hold an [`Engine`] instead of a
//! process-wide singleton; independent orders may run from clones of the
//! same handle, but a single order is only ever driven by one orchestrator.

use crate::account::{AccountManager, FileSettingsStore, SettingsStore, SigningSettings};
use crate::certificate::{CertificateArtifact, CertificateAssembler, IssuerCache};
use crate::challenge::ChallengeResponder;
use crate::config::{EngineConfig, OrderSpec};
use crate::crypto::{AccountKey, AccountSigner, KeyAlgorithm, SharedAccountKey};
use crate::error::Result;
use crate::order::{OrderOrchestrator, Revoker};
use crate::transport::{AcmeTransport, TransportConfig};
use crate::types::RevocationReason;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Transport caches are considered stale after this much inactivity
const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Entry point for issuance and revocation against one ACME directory
pub struct Engine {
    config: EngineConfig,
    transport: Arc<AcmeTransport>,
    accounts: AccountManager,
    responder: Arc<dyn ChallengeResponder>,
    issuer_cache: Arc<IssuerCache>,
    assembler: CertificateAssembler,
    last_activity: Mutex<Instant>,
}

impl Engine {
    /// Connect to the configured directory, loading (or creating) the
    /// account signing settings from the default file store.
    pub async fn connect(
        config: EngineConfig,
        responder: Arc<dyn ChallengeResponder>,
    ) -> Result<Self> {
        let store: Arc<dyn SettingsStore> = Arc::new(FileSettingsStore::new(
            config.settings_path.clone(),
            config.legacy_key_path.clone(),
        ));
        Self::connect_with_store(config, store, responder).await
    }

    /// Connect with a caller-supplied settings store
    pub async fn connect_with_store(
        config: EngineConfig,
        store: Arc<dyn SettingsStore>,
        responder: Arc<dyn ChallengeResponder>,
    ) -> Result<Self> {
        let settings = match store.load().await? {
            Some(settings) => settings,
            None => {
                // First run: newly created account keys are ECDSA P-256.
                let key = AccountKey::generate(KeyAlgorithm::Es256)?;
                let settings = SigningSettings {
                    account_email: config.contact_email.clone(),
                    account_uri: None,
                    account_key_pem: key.to_pem()?,
                };
                store.save(&settings).await?;
                tracing::info!("Generated a fresh account key");
                settings
            }
        };

        let key: SharedAccountKey = Arc::new(RwLock::new(AccountKey::from_pem(
            &settings.account_key_pem,
        )?));
        let signer = AccountSigner::new(Arc::clone(&key));

        let transport = Arc::new(
            AcmeTransport::connect(
                &config.directory_url,
                signer,
                TransportConfig {
                    user_agent: config.user_agent.clone(),
                    accept_invalid_certs: config.allow_invalid_tls,
                    timeout: Duration::from_secs(config.timeout_secs),
                },
            )
            .await?,
        );

        let accounts = AccountManager::new(
            Arc::clone(&transport),
            key,
            Arc::clone(&store),
            settings,
        );

        let issuer_cache = Arc::new(IssuerCache::new(config.issuer_bundle.clone()));
        issuer_cache.refresh().await;

        let assembler =
            CertificateAssembler::new(config.assets_dir.clone(), Arc::clone(&issuer_cache));

        Ok(Self {
            config,
            transport,
            accounts,
            responder,
            issuer_cache,
            assembler,
            last_activity: Mutex::new(Instant::now()),
        })
    }

    /// Account operations
    pub fn accounts(&self) -> &AccountManager {
        &self.accounts
    }

    /// The issuer cache, for diagnostics
    pub fn issuer_cache(&self) -> &Arc<IssuerCache> {
        &self.issuer_cache
    }

    /// Build an orchestrator for one order.
    /// Advanced callers use this to hold the cancellation flag.
    pub async fn orchestrator(&self) -> Result<OrderOrchestrator> {
        self.ensure_fresh().await?;
        Ok(OrderOrchestrator::new(
            Arc::clone(&self.transport),
            self.accounts.account_url().await?,
            Arc::clone(&self.responder),
            Duration::from_secs(self.config.dns_propagation_delay_secs),
        ))
    }

    /// Run a full order and package the result as a PKCS#12 artifact
    pub async fn issue(&self, spec: &OrderSpec) -> Result<CertificateArtifact> {
        let mut orchestrator = self.orchestrator().await?;
        let issued = orchestrator.run(spec).await?;

        let artifact = self
            .assembler
            .assemble(
                &issued.primary_domain,
                &issued.chain,
                issued.certificate_key_pem.as_deref(),
                &spec.pfx_password,
            )
            .await?;

        if self.config.export_pem {
            self.export_pem_assets(&artifact, &issued.chain.pem, issued.certificate_key_pem.as_deref())
                .await?;
        }

        self.touch().await;
        Ok(artifact)
    }

    /// Revoke a previously issued PKCS#12
    pub async fn revoke(
        &self,
        pfx_path: &Path,
        password: &str,
        reason: Option<RevocationReason>,
    ) -> Result<()> {
        self.ensure_fresh().await?;
        let revoker = Revoker::new(
            Arc::clone(&self.transport),
            self.accounts.account_url().await?,
        )
        .with_reason(reason.unwrap_or(RevocationReason::Unspecified));

        let result = revoker.revoke_pfx(pfx_path, password).await;
        self.touch().await;
        result
    }

    async fn export_pem_assets(
        &self,
        artifact: &CertificateArtifact,
        chain_pem: &str,
        key_pem: Option<&str>,
    ) -> Result<()> {
        let base = artifact.path.with_extension("");
        tokio::fs::write(base.with_extension("pem"), chain_pem).await?;
        if let Some(key) = key_pem {
            tokio::fs::write(base.with_extension("key.pem"), key).await?;
        }
        Ok(())
    }

    /// Re-initialize the transport when the engine sat idle too long
    async fn ensure_fresh(&self) -> Result<()> {
        let mut last = self.last_activity.lock().await;
        if last.elapsed() > IDLE_TIMEOUT {
            tracing::info!(
                "Engine idle for {:?}; reinitializing transport",
                last.elapsed()
            );
            self.transport.reinitialize().await?;
        }
        *last = Instant::now();
        Ok(())
    }

    async fn touch(&self) {
        let mut last = self.last_activity.lock().await;
        *last = Instant::now();
    }
}
