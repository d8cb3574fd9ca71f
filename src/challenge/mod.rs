//! Challenge responses and the external responder interface
//!
//! The engine prepares proof material; publishing it (a file on a web
//! server, a TXT record at the authoritative nameservers) is the job of an
//! external collaborator behind [`ChallengeResponder`].

use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;

/// A prepared proof for one authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeResponse {
    /// HTTP-01: serve `body` at `http://<domain><path>`
    Http01 {
        domain: String,
        token: String,
        /// `/.well-known/acme-challenge/<token>`
        path: String,
        /// The key authorization
        body: String,
    },
    /// DNS-01: publish a TXT record
    Dns01 {
        domain: String,
        /// `_acme-challenge.<domain without wildcard>`
        record_name: String,
        /// base64url(SHA-256(key authorization))
        record_value: String,
    },
}

impl ChallengeResponse {
    /// The identifier this response proves control of
    pub fn domain(&self) -> &str {
        match self {
            ChallengeResponse::Http01 { domain, .. } => domain,
            ChallengeResponse::Dns01 { domain, .. } => domain,
        }
    }
}

/// Receipt for a successful publish, passed back to `cleanup`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishHandle(pub ChallengeResponse);

/// External publisher of challenge responses
#[async_trait]
pub trait ChallengeResponder: Send + Sync {
    /// Make the key authorization reachable at
    /// `http://<domain>/.well-known/acme-challenge/<token>`.
    /// Returns once the file is being served.
    async fn publish_http01(
        &self,
        domain: &str,
        token: &str,
        key_auth: &str,
    ) -> Result<PublishHandle>;

    /// Publish a TXT record and wait out the propagation delay.
    /// Returns once the record should be visible to the CA.
    async fn publish_dns01(
        &self,
        record_name: &str,
        record_value: &str,
        propagation_delay: Duration,
    ) -> Result<PublishHandle>;

    /// Best-effort removal of a published response
    async fn cleanup(&self, handle: PublishHandle) -> Result<()>;
}

/// Responder that writes HTTP-01 tokens under a webroot directory.
///
/// DNS-01 is not supported; pair with a DNS-capable responder for wildcard
/// orders.
pub struct WebrootResponder {
    webroot: PathBuf,
}

impl WebrootResponder {
    /// Serve challenge files from `webroot/.well-known/acme-challenge/`
    pub fn new(webroot: impl Into<PathBuf>) -> Self {
        Self {
            webroot: webroot.into(),
        }
    }

    fn token_path(&self, token: &str) -> PathBuf {
        self.webroot
            .join(".well-known")
            .join("acme-challenge")
            .join(token)
    }
}

#[async_trait]
impl ChallengeResponder for WebrootResponder {
    async fn publish_http01(
        &self,
        domain: &str,
        token: &str,
        key_auth: &str,
    ) -> Result<PublishHandle> {
        let path = self.token_path(token);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, key_auth).await?;
        tracing::info!("Published HTTP-01 token for {} at {}", domain, path.display());

        Ok(PublishHandle(ChallengeResponse::Http01 {
            domain: domain.to_string(),
            token: token.to_string(),
            path: format!("/.well-known/acme-challenge/{}", token),
            body: key_auth.to_string(),
        }))
    }

    async fn publish_dns01(
        &self,
        record_name: &str,
        _record_value: &str,
        _propagation_delay: Duration,
    ) -> Result<PublishHandle> {
        Err(crate::error::EngineError::config(format!(
            "Webroot responder cannot publish DNS record {}",
            record_name
        )))
    }

    async fn cleanup(&self, handle: PublishHandle) -> Result<()> {
        if let ChallengeResponse::Http01 { token, .. } = &handle.0 {
            let path = self.token_path(token);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
        Ok(())
    }
}

/// Responder that announces DNS records in the log and waits for manual
/// publication plus the propagation delay.
pub struct ManualDnsResponder;

#[async_trait]
impl ChallengeResponder for ManualDnsResponder {
    async fn publish_http01(
        &self,
        domain: &str,
        _token: &str,
        _key_auth: &str,
    ) -> Result<PublishHandle> {
        Err(crate::error::EngineError::config(format!(
            "Manual DNS responder cannot serve HTTP-01 for {}",
            domain
        )))
    }

    async fn publish_dns01(
        &self,
        record_name: &str,
        record_value: &str,
        propagation_delay: Duration,
    ) -> Result<PublishHandle> {
        tracing::info!(
            "Create TXT record: {} IN TXT \"{}\" (waiting {:?} for propagation)",
            record_name,
            record_value,
            propagation_delay
        );
        tokio::time::sleep(propagation_delay).await;

        // record_name is _acme-challenge.<domain>
        let domain = record_name
            .strip_prefix("_acme-challenge.")
            .unwrap_or(record_name)
            .to_string();

        Ok(PublishHandle(ChallengeResponse::Dns01 {
            domain,
            record_name: record_name.to_string(),
            record_value: record_value.to_string(),
        }))
    }

    async fn cleanup(&self, handle: PublishHandle) -> Result<()> {
        if let ChallengeResponse::Dns01 { record_name, .. } = &handle.0 {
            tracing::info!("TXT record {} can now be removed", record_name);
        }
        Ok(())
    }
}

/// In-memory responder that records every publish and cleanup.
///
/// Used by the integration tests to assert the publish/cleanup pairing.
#[derive(Default)]
pub struct RecordingResponder {
    published: Mutex<Vec<ChallengeResponse>>,
    cleaned: Mutex<Vec<ChallengeResponse>>,
}

impl RecordingResponder {
    /// New empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far
    pub async fn published(&self) -> Vec<ChallengeResponse> {
        self.published.lock().await.clone()
    }

    /// Everything cleaned up so far
    pub async fn cleaned(&self) -> Vec<ChallengeResponse> {
        self.cleaned.lock().await.clone()
    }
}

#[async_trait]
impl ChallengeResponder for RecordingResponder {
    async fn publish_http01(
        &self,
        domain: &str,
        token: &str,
        key_auth: &str,
    ) -> Result<PublishHandle> {
        let response = ChallengeResponse::Http01 {
            domain: domain.to_string(),
            token: token.to_string(),
            path: format!("/.well-known/acme-challenge/{}", token),
            body: key_auth.to_string(),
        };
        self.published.lock().await.push(response.clone());
        Ok(PublishHandle(response))
    }

    async fn publish_dns01(
        &self,
        record_name: &str,
        record_value: &str,
        _propagation_delay: Duration,
    ) -> Result<PublishHandle> {
        let domain = record_name
            .strip_prefix("_acme-challenge.")
            .unwrap_or(record_name)
            .to_string();
        let response = ChallengeResponse::Dns01 {
            domain,
            record_name: record_name.to_string(),
            record_value: record_value.to_string(),
        };
        self.published.lock().await.push(response.clone());
        Ok(PublishHandle(response))
    }

    async fn cleanup(&self, handle: PublishHandle) -> Result<()> {
        self.cleaned.lock().await.push(handle.0);
        Ok(())
    }
}
