/// PKCS#12 assembly and on-disk artifact layout
use crate::certificate::{CertificateChain, IssuerCache};
use crate::error::{EngineError, Result};
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::stack::Stack;
use openssl::x509::X509;
use std::path::PathBuf;

/// The externally visible result of a successful order
#[derive(Debug, Clone)]
pub struct CertificateArtifact {
    /// Where the .pfx was written
    pub path: PathBuf,
    /// Certificate id, `YYYYMMDD_<8 hex>`
    pub certificate_id: String,
    /// Friendly name embedded in the PKCS#12
    pub friendly_name: String,
    /// Leaf expiry, Unix timestamp
    pub not_after: i64,
    /// Leaf certificate, DER
    pub leaf_der: Vec<u8>,
}

/// Packages an issued chain plus key into a password-protected PKCS#12
pub struct CertificateAssembler {
    assets_dir: PathBuf,
    issuer_cache: std::sync::Arc<IssuerCache>,
}

impl CertificateAssembler {
    /// Assembler writing under `assets_dir`
    pub fn new(assets_dir: impl Into<PathBuf>, issuer_cache: std::sync::Arc<IssuerCache>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            issuer_cache,
        }
    }

    /// Build and persist the PKCS#12 for `primary`.
    ///
    /// When the server-supplied chain has no intermediates, the issuer
    /// cache fills the gap. A first packaging failure triggers one cache
    /// refresh and retry; the second failure surfaces with guidance.
    pub async fn assemble(
        &self,
        primary: &str,
        chain: &CertificateChain,
        key_pem: Option<&str>,
        password: &str,
    ) -> Result<CertificateArtifact> {
        let certificate_id = chain.certificate_id()?;
        let friendly_name = friendly_name(primary, chain)?;

        let pfx_der = match self.build_pfx(chain, key_pem, password, &friendly_name).await {
            Ok(der) => der,
            Err(first) => {
                tracing::warn!(
                    "PKCS#12 assembly failed ({}); refreshing issuer cache and retrying",
                    first
                );
                self.issuer_cache.refresh().await;
                self.build_pfx(chain, key_pem, password, &friendly_name)
                    .await
                    .map_err(|e| {
                        EngineError::assembly(format!(
                            "{}. Check the system clock and the local trust store for the CA's intermediates",
                            e
                        ))
                    })?
            }
        };

        let path = self.artifact_path(primary, &certificate_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &pfx_der).await?;
        tracing::info!("Wrote {} ({} bytes)", path.display(), pfx_der.len());

        Ok(CertificateArtifact {
            path,
            certificate_id,
            friendly_name,
            not_after: chain.not_after()?,
            leaf_der: chain.leaf.clone(),
        })
    }

    /// `<assets>/<primary with '*' replaced by '_'>/<id>.pfx`
    pub fn artifact_path(&self, primary: &str, certificate_id: &str) -> PathBuf {
        self.assets_dir
            .join(primary.replace('*', "_"))
            .join(format!("{certificate_id}.pfx"))
    }

    async fn build_pfx(
        &self,
        chain: &CertificateChain,
        key_pem: Option<&str>,
        password: &str,
        friendly_name: &str,
    ) -> Result<Vec<u8>> {
        let leaf = X509::from_der(&chain.leaf)
            .map_err(|e| EngineError::assembly(format!("Leaf certificate rejected: {}", e)))?;

        let mut ca_stack = Stack::new()?;
        let mut intermediates: Vec<Vec<u8>> = chain.intermediates.clone();
        if intermediates.is_empty() {
            intermediates = self
                .issuer_cache
                .missing_intermediates(&chain.tail_issuer()?)
                .await;
            if !intermediates.is_empty() {
                tracing::info!(
                    "Server omitted intermediates; bundled {} from the issuer cache",
                    intermediates.len()
                );
            }
        }
        for der in &intermediates {
            let cert = X509::from_der(der)
                .map_err(|e| EngineError::assembly(format!("Intermediate rejected: {}", e)))?;
            ca_stack.push(cert)?;
        }

        let key: Option<PKey<Private>> = match key_pem {
            Some(pem_str) => Some(
                PKey::private_key_from_pem(pem_str.as_bytes()).map_err(|e| {
                    EngineError::assembly(format!("Certificate key rejected: {}", e))
                })?,
            ),
            None => None,
        };

        let mut builder = Pkcs12::builder();
        builder.name(friendly_name);
        builder.cert(&leaf);
        builder.ca(ca_stack);
        if let Some(key) = &key {
            builder.pkey(key);
        }

        let pkcs12 = builder
            .build2(password)
            .map_err(|e| EngineError::assembly(format!("PKCS#12 packaging failed: {}", e)))?;
        Ok(pkcs12
            .to_der()
            .map_err(|e| EngineError::assembly(format!("PKCS#12 encoding failed: {}", e)))?)
    }
}

/// `"<primary> [Certify] <effectiveDate> to <expiryDate>"`
fn friendly_name(primary: &str, chain: &CertificateChain) -> Result<String> {
    let effective = jiff::Timestamp::from_second(chain.not_before()?)
        .map_err(|e| EngineError::assembly(format!("Leaf notBefore out of range: {}", e)))?;
    let expiry = jiff::Timestamp::from_second(chain.not_after()?)
        .map_err(|e| EngineError::assembly(format!("Leaf notAfter out of range: {}", e)))?;

    Ok(format!(
        "{} [Certify] {} to {}",
        primary,
        effective.strftime("%Y-%m-%d"),
        expiry.strftime("%Y-%m-%d")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::test_support::{issued_chain, self_signed};
    use std::sync::Arc;

    fn key_to_pem(key: &PKey<Private>) -> String {
        String::from_utf8(key.private_key_to_pem_pkcs8().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_assemble_writes_deterministic_path() {
        let (pem_text, key) = self_signed("host.example.com", &["host.example.com"]);
        let chain = CertificateChain::from_pem(&pem_text).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let assembler =
            CertificateAssembler::new(dir.path(), Arc::new(IssuerCache::new(None)));

        let artifact = assembler
            .assemble("host.example.com", &chain, Some(&key_to_pem(&key)), "swordfish")
            .await
            .unwrap();

        let expected = dir
            .path()
            .join("host.example.com")
            .join(format!("{}.pfx", artifact.certificate_id));
        assert_eq!(artifact.path, expected);
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn test_wildcard_path_substitution() {
        let assembler = CertificateAssembler::new(
            "/var/lib/certforge",
            Arc::new(IssuerCache::new(None)),
        );
        let path = assembler.artifact_path("*.example.com", "20261030_0011aabb");
        assert_eq!(
            path,
            PathBuf::from("/var/lib/certforge/_.example.com/20261030_0011aabb.pfx")
        );
    }

    #[tokio::test]
    async fn test_pfx_round_trips_key_and_chain() {
        let (leaf, inter, _root, key) = issued_chain("host.example.com");
        let combined = format!("{leaf}{inter}");
        let chain = CertificateChain::from_pem(&combined).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let assembler =
            CertificateAssembler::new(dir.path(), Arc::new(IssuerCache::new(None)));

        let artifact = assembler
            .assemble("host.example.com", &chain, Some(&key_to_pem(&key)), "pw")
            .await
            .unwrap();

        let der = std::fs::read(&artifact.path).unwrap();
        let parsed = Pkcs12::from_der(&der).unwrap().parse2("pw").unwrap();

        let leaf_cert = parsed.cert.expect("pfx contains the leaf");
        assert_eq!(leaf_cert.to_der().unwrap(), chain.leaf);
        assert!(parsed.pkey.is_some());
        assert_eq!(parsed.ca.map(|s| s.len()).unwrap_or(0), 1);
    }

    #[tokio::test]
    async fn test_missing_intermediates_filled_from_cache() {
        use std::io::Write;

        let (leaf, inter, root, key) = issued_chain("host.example.com");

        let mut bundle = tempfile::NamedTempFile::new().unwrap();
        write!(bundle, "{inter}{root}").unwrap();
        let cache = Arc::new(IssuerCache::new(Some(bundle.path().to_path_buf())));
        cache.refresh().await;

        // Chain with the leaf only; the intermediate must come from the cache.
        let chain = CertificateChain::from_pem(&leaf).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let assembler = CertificateAssembler::new(dir.path(), cache);
        let artifact = assembler
            .assemble("host.example.com", &chain, Some(&key_to_pem(&key)), "pw")
            .await
            .unwrap();

        let der = std::fs::read(&artifact.path).unwrap();
        let parsed = Pkcs12::from_der(&der).unwrap().parse2("pw").unwrap();
        assert_eq!(parsed.ca.map(|s| s.len()).unwrap_or(0), 1);
    }

    #[tokio::test]
    async fn test_friendly_name_format() {
        let (pem_text, _key) = self_signed("host.example.com", &["host.example.com"]);
        let chain = CertificateChain::from_pem(&pem_text).unwrap();
        let name = friendly_name("host.example.com", &chain).unwrap();

        assert!(name.starts_with("host.example.com [Certify] "));
        assert!(name.contains(" to "));
    }
}
