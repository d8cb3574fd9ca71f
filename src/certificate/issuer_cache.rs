/// Best-effort cache of CA certificates from the host trust store
///
/// Used only to append intermediates a server-supplied chain is missing.
/// Never authoritative: a failed load leaves an empty snapshot and the
/// engine keeps going.
use crate::error::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

/// Bundle locations probed in order; the first readable one wins
const TRUST_BUNDLE_CANDIDATES: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt",
    "/etc/pki/tls/certs/ca-bundle.crt",
    "/etc/ssl/cert.pem",
];

#[derive(Debug, Clone)]
struct CachedIssuer {
    subject: String,
    self_signed: bool,
    der: Vec<u8>,
}

/// Immutable view of the cache contents at one point in time
#[derive(Debug, Default)]
pub struct IssuerSnapshot {
    issuers: Vec<CachedIssuer>,
}

impl IssuerSnapshot {
    fn find(&self, subject: &str) -> Option<&CachedIssuer> {
        self.issuers.iter().find(|c| c.subject == subject)
    }

    /// Number of cached certificates
    pub fn len(&self) -> usize {
        self.issuers.len()
    }

    /// Whether the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.issuers.is_empty()
    }
}

/// Copy-on-refresh issuer cache: readers clone the snapshot Arc and are
/// never blocked by a refresh.
pub struct IssuerCache {
    snapshot: RwLock<Arc<IssuerSnapshot>>,
    extra_bundle: Option<PathBuf>,
}

impl IssuerCache {
    /// Empty cache; call [`IssuerCache::refresh`] to populate
    pub fn new(extra_bundle: Option<PathBuf>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(IssuerSnapshot::default())),
            extra_bundle,
        }
    }

    /// Current snapshot
    pub async fn snapshot(&self) -> Arc<IssuerSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Re-read the trust bundles and swap in a fresh snapshot.
    /// Load failures are logged and leave the previous snapshot in place.
    pub async fn refresh(&self) {
        let mut issuers = Vec::new();

        // First readable system bundle wins; they are alternative spellings
        // of the same store.
        for candidate in TRUST_BUNDLE_CANDIDATES {
            if let Ok(bytes) = tokio::fs::read(candidate).await {
                let before = issuers.len();
                collect_issuers(&bytes, &mut issuers);
                if issuers.len() > before {
                    tracing::debug!(
                        "Loaded {} CA certificates from {}",
                        issuers.len() - before,
                        candidate
                    );
                    break;
                }
            }
        }

        if let Some(extra) = &self.extra_bundle {
            match tokio::fs::read(extra).await {
                Ok(bytes) => collect_issuers(&bytes, &mut issuers),
                Err(e) => {
                    tracing::warn!("Failed to read issuer bundle {}: {}", extra.display(), e)
                }
            }
        }

        if issuers.is_empty() {
            tracing::warn!("No trust bundle could be read; issuer cache stays as-is");
            return;
        }

        let snapshot = Arc::new(IssuerSnapshot { issuers });
        let mut guard = self.snapshot.write().await;
        *guard = snapshot;
    }

    /// Intermediates (DER) needed to connect `chain_tail_issuer` upward.
    /// Self-signed roots are not included; PKCS#12 bundles carry the chain,
    /// not the trust anchor.
    pub async fn missing_intermediates(&self, chain_tail_issuer: &str) -> Vec<Vec<u8>> {
        let snapshot = self.snapshot().await;
        let mut found = Vec::new();
        let mut subject = chain_tail_issuer.to_string();

        // Bounded walk; real chains are three or four deep at most.
        for _ in 0..4 {
            let Some(issuer) = snapshot.find(&subject) else {
                break;
            };
            if issuer.self_signed {
                break;
            }
            found.push(issuer.der.clone());

            let Ok((_, cert)) = X509Certificate::from_der(&issuer.der) else {
                break;
            };
            subject = cert.issuer().to_string();
        }

        found
    }
}

fn collect_issuers(pem_bytes: &[u8], out: &mut Vec<CachedIssuer>) {
    let Ok(blocks) = pem::parse_many(pem_bytes) else {
        return;
    };
    for block in blocks {
        if block.tag() != "CERTIFICATE" {
            continue;
        }
        let der = block.contents().to_vec();
        if let Ok((_, cert)) = X509Certificate::from_der(&der) {
            out.push(CachedIssuer {
                subject: cert.subject().to_string(),
                self_signed: cert.subject().to_string() == cert.issuer().to_string(),
                der,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::CertificateChain;
    use crate::certificate::test_support::issued_chain;
    use std::io::Write;

    #[tokio::test]
    async fn test_refresh_from_extra_bundle() {
        let (_leaf, inter, root, _key) = issued_chain("host.example.com");

        let mut bundle = tempfile::NamedTempFile::new().unwrap();
        write!(bundle, "{inter}{root}").unwrap();

        let cache = IssuerCache::new(Some(bundle.path().to_path_buf()));
        cache.refresh().await;

        assert!(cache.snapshot().await.len() >= 2);
    }

    #[tokio::test]
    async fn test_missing_intermediates_found() {
        let (leaf, inter, root, _key) = issued_chain("host.example.com");

        let mut bundle = tempfile::NamedTempFile::new().unwrap();
        write!(bundle, "{inter}{root}").unwrap();

        let cache = IssuerCache::new(Some(bundle.path().to_path_buf()));
        cache.refresh().await;

        // Server sent the leaf alone; the cache must supply the
        // intermediate but stop before the self-signed root.
        let chain = CertificateChain::from_pem(&leaf).unwrap();
        let extra = cache
            .missing_intermediates(&chain.tail_issuer().unwrap())
            .await;
        assert_eq!(extra.len(), 1);

        let inter_chain = CertificateChain::from_pem(&inter).unwrap();
        assert_eq!(extra[0], inter_chain.leaf);
    }

    #[tokio::test]
    async fn test_unknown_issuer_yields_nothing() {
        let cache = IssuerCache::new(None);
        let extra = cache.missing_intermediates("CN=nobody knows me").await;
        assert!(extra.is_empty());
    }
}
