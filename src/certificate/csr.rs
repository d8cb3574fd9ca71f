/// PKCS#10 CSR construction for order finalization
use crate::crypto::KeyAlgorithm;
use crate::error::{EngineError, Result};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509NameBuilder, X509ReqBuilder};

/// Key and CSR submitted at finalization.
///
/// `key_pem` is `None` when the caller supplied a ready-made CSR; the
/// matching private key then never passes through the engine.
#[derive(Debug, Clone)]
pub struct CsrMaterial {
    /// Private key for the certificate, PEM
    pub key_pem: Option<String>,
    /// DER-encoded PKCS#10 request
    pub csr_der: Vec<u8>,
}

impl CsrMaterial {
    /// Build a CSR with CN = `primary` and SAN = `domains`.
    ///
    /// `domains` must already be ASCII-normalized and include the primary.
    /// A fresh key is generated for `algorithm` unless `key_pem` supplies
    /// one.
    pub fn generate(
        primary: &str,
        domains: &[String],
        algorithm: KeyAlgorithm,
        key_pem: Option<&str>,
    ) -> Result<Self> {
        let pkey = match key_pem {
            Some(pem_str) => PKey::private_key_from_pem(pem_str.as_bytes())
                .map_err(|e| EngineError::pem(format!("Failed to parse certificate key: {}", e)))?,
            None => generate_certificate_key(algorithm)?,
        };

        let csr_der = build_request(primary, domains, &pkey)?;
        let key_pem = String::from_utf8(pkey.private_key_to_pem_pkcs8()?)
            .map_err(|e| EngineError::pem(format!("Key PEM is not UTF-8: {}", e)))?;

        tracing::info!("CSR generated for {} ({} names)", primary, domains.len());
        Ok(Self {
            key_pem: Some(key_pem),
            csr_der,
        })
    }

    /// Accept a caller-supplied CSR in PEM form: strip the armor and
    /// base64-decode to DER.
    pub fn from_pem(csr_pem: &str) -> Result<Self> {
        let block = pem::parse(csr_pem.as_bytes())
            .map_err(|e| EngineError::pem(format!("Failed to parse CSR PEM: {}", e)))?;

        match block.tag() {
            "CERTIFICATE REQUEST" | "NEW CERTIFICATE REQUEST" => Ok(Self {
                key_pem: None,
                csr_der: block.contents().to_vec(),
            }),
            other => Err(EngineError::pem(format!(
                "Expected a CERTIFICATE REQUEST block, found {}",
                other
            ))),
        }
    }
}

/// Generate the certificate key pair for an algorithm choice
pub fn generate_certificate_key(algorithm: KeyAlgorithm) -> Result<PKey<Private>> {
    match algorithm {
        KeyAlgorithm::Rs256 => {
            let rsa = openssl::rsa::Rsa::generate(2048)?;
            Ok(PKey::from_rsa(rsa)?)
        }
        alg => {
            let nid = alg.curve_nid().expect("EC algorithm has a curve");
            let group = openssl::ec::EcGroup::from_curve_name(nid)?;
            let ec = openssl::ec::EcKey::generate(&group)?;
            Ok(PKey::from_ec_key(ec)?)
        }
    }
}

fn build_request(primary: &str, domains: &[String], pkey: &PKey<Private>) -> Result<Vec<u8>> {
    let mut builder = X509ReqBuilder::new()?;

    let mut subject = X509NameBuilder::new()?;
    subject.append_entry_by_nid(Nid::COMMONNAME, primary)?;
    builder.set_subject_name(&subject.build())?;
    builder.set_pubkey(pkey)?;

    let mut san = SubjectAlternativeName::new();
    for domain in domains {
        san.dns(domain);
    }
    let ext = san.build(&builder.x509v3_context(None))?;
    let mut extensions = openssl::stack::Stack::new()?;
    extensions.push(ext)?;
    builder.add_extensions(&extensions)?;

    builder.sign(pkey, MessageDigest::sha256())?;
    Ok(builder.build().to_der()?)
}
