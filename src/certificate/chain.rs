/// Certificate chain parsing and inspection
use crate::error::{EngineError, Result};
use sha2::{Digest, Sha256};
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::{FromDer, GeneralName};

/// A downloaded certificate chain: leaf first, then intermediates
#[derive(Debug, Clone)]
pub struct CertificateChain {
    /// End-entity certificate, DER
    pub leaf: Vec<u8>,
    /// Issuing intermediates in server order, DER
    pub intermediates: Vec<Vec<u8>>,
    /// The original PEM text as downloaded
    pub pem: String,
}

impl CertificateChain {
    /// Parse a PEM bundle; the first certificate is the leaf
    pub fn from_pem(pem_text: &str) -> Result<Self> {
        let mut certs = Vec::new();
        for block in pem::parse_many(pem_text.as_bytes())
            .map_err(|e| EngineError::pem(format!("Failed to parse chain PEM: {}", e)))?
        {
            if block.tag() == "CERTIFICATE" {
                certs.push(block.contents().to_vec());
            }
        }

        if certs.is_empty() {
            return Err(EngineError::pem("No certificates found in chain"));
        }

        let leaf = certs.remove(0);
        Ok(Self {
            leaf,
            intermediates: certs,
            pem: pem_text.to_string(),
        })
    }

    /// Leaf `notBefore` as a Unix timestamp
    pub fn not_before(&self) -> Result<i64> {
        let (_, cert) = parse(&self.leaf)?;
        Ok(cert.validity().not_before.timestamp())
    }

    /// Leaf `notAfter` as a Unix timestamp
    pub fn not_after(&self) -> Result<i64> {
        let (_, cert) = parse(&self.leaf)?;
        Ok(cert.validity().not_after.timestamp())
    }

    /// Subject common name of the leaf, when present
    pub fn common_name(&self) -> Result<Option<String>> {
        let (_, cert) = parse(&self.leaf)?;
        Ok(cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(|s| s.to_string()))
    }

    /// DNS names from the leaf's Subject Alternative Name extension
    pub fn subject_alt_names(&self) -> Result<Vec<String>> {
        let (_, cert) = parse(&self.leaf)?;
        let mut names = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                if let GeneralName::DNSName(dns) = name {
                    names.push(dns.to_string());
                }
            }
        }
        Ok(names)
    }

    /// Whether the leaf covers `domain` via its CN or SAN set
    pub fn covers_domain(&self, domain: &str) -> Result<bool> {
        if self.common_name()?.as_deref() == Some(domain) {
            return Ok(true);
        }
        Ok(self.subject_alt_names()?.iter().any(|n| n == domain))
    }

    /// Issuer DN of the last certificate in the chain (the point where the
    /// issuer cache would have to take over).
    pub fn tail_issuer(&self) -> Result<String> {
        let der = self.intermediates.last().unwrap_or(&self.leaf);
        let (_, cert) = parse(der)?;
        Ok(cert.issuer().to_string())
    }

    /// Identifier for the issued certificate: `YYYYMMDD_<8 hex>`, built
    /// from the leaf's expiry date and fingerprint.
    pub fn certificate_id(&self) -> Result<String> {
        let expiry = jiff::Timestamp::from_second(self.not_after()?)
            .map_err(|e| EngineError::crypto(format!("Leaf notAfter out of range: {}", e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&self.leaf);
        let fingerprint = hasher.finalize();

        Ok(format!(
            "{}_{}",
            expiry.strftime("%Y%m%d"),
            hex::encode(&fingerprint[..4])
        ))
    }
}

fn parse(der: &[u8]) -> Result<(&[u8], X509Certificate<'_>)> {
    X509Certificate::from_der(der)
        .map_err(|e| EngineError::crypto(format!("Invalid certificate DER: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::test_support::self_signed;

    #[test]
    fn test_chain_parsing_and_identity() {
        let (pem_text, _key) = self_signed("host.example.com", &["host.example.com"]);
        let chain = CertificateChain::from_pem(&pem_text).unwrap();

        assert!(chain.intermediates.is_empty());
        assert!(chain.covers_domain("host.example.com").unwrap());
        assert!(!chain.covers_domain("other.example.com").unwrap());

        let id = chain.certificate_id().unwrap();
        // YYYYMMDD_xxxxxxxx
        assert_eq!(id.len(), 8 + 1 + 8);
        assert_eq!(id.as_bytes()[8], b'_');
    }

    #[test]
    fn test_wildcard_san_lookup() {
        let (pem_text, _key) = self_signed("*.example.com", &["*.example.com"]);
        let chain = CertificateChain::from_pem(&pem_text).unwrap();
        assert!(chain.covers_domain("*.example.com").unwrap());
        assert_eq!(chain.subject_alt_names().unwrap(), vec!["*.example.com"]);
    }

    #[test]
    fn test_empty_pem_rejected() {
        assert!(CertificateChain::from_pem("not pem at all").is_err());
    }

    #[test]
    fn test_validity_window_ordering() {
        let (pem_text, _key) = self_signed("host.example.com", &["host.example.com"]);
        let chain = CertificateChain::from_pem(&pem_text).unwrap();
        assert!(chain.not_before().unwrap() < chain.not_after().unwrap());
    }
}
