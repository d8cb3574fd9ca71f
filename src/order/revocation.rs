/// Certificate revocation
use crate::error::{EngineError, Result};
use crate::transport::{AcmeTransport, Auth};
use crate::types::RevocationReason;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use openssl::pkcs12::Pkcs12;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

/// Submits revocation requests signed by the account key
pub struct Revoker {
    transport: Arc<AcmeTransport>,
    account_url: String,
    reason: RevocationReason,
}

impl Revoker {
    /// New revoker for a registered account
    pub fn new(transport: Arc<AcmeTransport>, account_url: String) -> Self {
        Self {
            transport,
            account_url,
            reason: RevocationReason::Unspecified,
        }
    }

    /// Override the default `unspecified` reason code
    pub fn with_reason(mut self, reason: RevocationReason) -> Self {
        self.reason = reason;
        self
    }

    /// Revoke the leaf certificate stored in a PKCS#12 file
    pub async fn revoke_pfx(&self, path: &Path, password: &str) -> Result<()> {
        let der = tokio::fs::read(path).await?;
        let leaf_der = extract_leaf(&der, password)?;
        self.revoke_der(&leaf_der).await
    }

    /// Revoke a DER-encoded certificate
    pub async fn revoke_der(&self, cert_der: &[u8]) -> Result<()> {
        let directory = self.transport.directory().await?;

        let payload = json!({
            "certificate": URL_SAFE_NO_PAD.encode(cert_der),
            "reason": self.reason.as_u8(),
        });

        let response = self
            .transport
            .post(
                &directory.revoke_cert,
                Some(&payload),
                Auth::Kid(&self.account_url),
            )
            .await
            .map_err(|err| match err {
                EngineError::Acme(problem) => EngineError::revocation(problem.message()),
                other => other,
            })?;

        if response.status != 200 {
            return Err(EngineError::revocation(format!(
                "Server answered HTTP {}",
                response.status
            )));
        }

        tracing::info!("Certificate revoked ({:?})", self.reason);
        Ok(())
    }
}

/// First certificate of the PKCS#12, DER encoded
pub fn extract_leaf(pfx_der: &[u8], password: &str) -> Result<Vec<u8>> {
    let parsed = Pkcs12::from_der(pfx_der)
        .map_err(|e| EngineError::revocation(format!("Unreadable PKCS#12: {}", e)))?
        .parse2(password)
        .map_err(|e| EngineError::revocation(format!("Failed to open PKCS#12: {}", e)))?;

    let cert = parsed
        .cert
        .ok_or_else(|| EngineError::revocation("PKCS#12 holds no certificate"))?;
    Ok(cert.to_der()?)
}
