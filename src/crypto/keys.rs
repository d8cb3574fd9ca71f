//! Account and certificate key material backed by openssl

use crate::error::{EngineError, Result};
use crate::protocol::Jwk;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use openssl::bn::BigNumContext;
use openssl::ec::{EcGroup, EcKey};
use openssl::ecdsa::EcdsaSig;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Private};
use openssl::rsa::Rsa;

/// Supported key algorithms, named by their JWS identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum KeyAlgorithm {
    /// RSA 2048 with SHA-256
    #[serde(rename = "RS256")]
    Rs256,
    /// ECDSA P-256 with SHA-256
    #[serde(rename = "ES256")]
    Es256,
    /// ECDSA P-384 with SHA-384
    #[serde(rename = "ES384")]
    Es384,
    /// ECDSA P-521 with SHA-512
    #[serde(rename = "ES512")]
    Es512,
}

impl KeyAlgorithm {
    /// JWS `alg` header value
    pub fn jws_alg(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rs256 => "RS256",
            KeyAlgorithm::Es256 => "ES256",
            KeyAlgorithm::Es384 => "ES384",
            KeyAlgorithm::Es512 => "ES512",
        }
    }

    /// Curve for the ECDSA variants
    pub fn curve_nid(&self) -> Option<Nid> {
        match self {
            KeyAlgorithm::Rs256 => None,
            KeyAlgorithm::Es256 => Some(Nid::X9_62_PRIME256V1),
            KeyAlgorithm::Es384 => Some(Nid::SECP384R1),
            KeyAlgorithm::Es512 => Some(Nid::SECP521R1),
        }
    }

    /// JWK curve name for the ECDSA variants
    pub fn curve_name(&self) -> Option<&'static str> {
        match self {
            KeyAlgorithm::Rs256 => None,
            KeyAlgorithm::Es256 => Some("P-256"),
            KeyAlgorithm::Es384 => Some("P-384"),
            KeyAlgorithm::Es512 => Some("P-521"),
        }
    }

    /// Field element width in bytes; determines the raw signature layout
    pub fn field_len(&self) -> Option<usize> {
        match self {
            KeyAlgorithm::Rs256 => None,
            KeyAlgorithm::Es256 => Some(32),
            KeyAlgorithm::Es384 => Some(48),
            KeyAlgorithm::Es512 => Some(66),
        }
    }

    /// Digest paired with the algorithm
    pub fn digest(&self) -> MessageDigest {
        match self {
            KeyAlgorithm::Rs256 | KeyAlgorithm::Es256 => MessageDigest::sha256(),
            KeyAlgorithm::Es384 => MessageDigest::sha384(),
            KeyAlgorithm::Es512 => MessageDigest::sha512(),
        }
    }
}

impl std::str::FromStr for KeyAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RS256" => Ok(KeyAlgorithm::Rs256),
            "ES256" => Ok(KeyAlgorithm::Es256),
            "ES384" => Ok(KeyAlgorithm::Es384),
            "ES512" => Ok(KeyAlgorithm::Es512),
            _ => Err(format!("Unknown key algorithm: {}", s)),
        }
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.jws_alg())
    }
}

/// A private key together with its derived JWS algorithm
pub struct AccountKey {
    pkey: PKey<Private>,
    algorithm: KeyAlgorithm,
}

impl AccountKey {
    /// Generate a fresh key for the given algorithm
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self> {
        let pkey = generate_pkey(algorithm)?;
        Ok(Self { pkey, algorithm })
    }

    /// Load from a PEM-encoded private key, deriving the algorithm
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        let pkey = PKey::private_key_from_pem(pem_str.as_bytes())
            .map_err(|e| EngineError::pem(format!("Failed to parse private key PEM: {}", e)))?;
        let algorithm = derive_algorithm(&pkey)?;
        Ok(Self { pkey, algorithm })
    }

    /// Wrap an existing key, deriving the algorithm
    pub fn from_pkey(pkey: PKey<Private>) -> Result<Self> {
        let algorithm = derive_algorithm(&pkey)?;
        Ok(Self { pkey, algorithm })
    }

    /// Serialize to PKCS#8 PEM
    pub fn to_pem(&self) -> Result<String> {
        let bytes = self.pkey.private_key_to_pem_pkcs8()?;
        String::from_utf8(bytes)
            .map_err(|e| EngineError::pem(format!("Key PEM is not UTF-8: {}", e)))
    }

    /// The derived JWS algorithm
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// Borrow the underlying key
    pub fn pkey(&self) -> &PKey<Private> {
        &self.pkey
    }

    /// Public key as a JWK
    pub fn jwk(&self) -> Result<Jwk> {
        match self.algorithm {
            KeyAlgorithm::Rs256 => {
                let rsa = self.pkey.rsa()?;
                Ok(Jwk::rsa(
                    URL_SAFE_NO_PAD.encode(rsa.n().to_vec()),
                    URL_SAFE_NO_PAD.encode(rsa.e().to_vec()),
                ))
            }
            alg => {
                let ec = self.pkey.ec_key()?;
                let group = ec.group();
                let mut ctx = BigNumContext::new()?;
                let mut x = openssl::bn::BigNum::new()?;
                let mut y = openssl::bn::BigNum::new()?;
                ec.public_key().affine_coordinates(group, &mut x, &mut y, &mut ctx)?;

                let width = alg.field_len().expect("EC algorithm has a field width") as i32;
                Ok(Jwk::ec(
                    alg.curve_name().expect("EC algorithm has a curve name"),
                    URL_SAFE_NO_PAD.encode(x.to_vec_padded(width)?),
                    URL_SAFE_NO_PAD.encode(y.to_vec_padded(width)?),
                ))
            }
        }
    }

    /// RFC 7638 JWK thumbprint, base64url encoded
    pub fn thumbprint(&self) -> Result<String> {
        self.jwk()?.thumbprint_sha256()
    }

    /// Sign `input` and return the raw JWS signature bytes.
    ///
    /// RSA signatures are PKCS#1 v1.5; ECDSA signatures are converted from
    /// DER to the fixed-width `r || s` layout JWS requires.
    pub fn sign(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut signer = openssl::sign::Signer::new(self.algorithm.digest(), &self.pkey)?;
        let der = signer.sign_oneshot_to_vec(input)?;

        match self.algorithm.field_len() {
            None => Ok(der),
            Some(width) => {
                let sig = EcdsaSig::from_der(&der)?;
                let mut raw = sig.r().to_vec_padded(width as i32)?;
                raw.extend(sig.s().to_vec_padded(width as i32)?);
                Ok(raw)
            }
        }
    }

    /// Verify a raw JWS signature produced by [`AccountKey::sign`]
    pub fn verify(&self, input: &[u8], signature: &[u8]) -> Result<bool> {
        let der = match self.algorithm.field_len() {
            None => signature.to_vec(),
            Some(width) => {
                if signature.len() != width * 2 {
                    return Ok(false);
                }
                let r = openssl::bn::BigNum::from_slice(&signature[..width])?;
                let s = openssl::bn::BigNum::from_slice(&signature[width..])?;
                EcdsaSig::from_private_components(r, s)?.to_der()?
            }
        };

        let mut verifier =
            openssl::sign::Verifier::new(self.algorithm.digest(), &self.pkey)?;
        Ok(verifier.verify_oneshot(&der, input)?)
    }
}

fn generate_pkey(algorithm: KeyAlgorithm) -> Result<PKey<Private>> {
    match algorithm {
        KeyAlgorithm::Rs256 => {
            let rsa = Rsa::generate(2048)?;
            Ok(PKey::from_rsa(rsa)?)
        }
        alg => {
            let nid = alg.curve_nid().expect("EC algorithm has a curve");
            let group = EcGroup::from_curve_name(nid)?;
            let ec = EcKey::generate(&group)?;
            Ok(PKey::from_ec_key(ec)?)
        }
    }
}

fn derive_algorithm(pkey: &PKey<Private>) -> Result<KeyAlgorithm> {
    match pkey.id() {
        Id::RSA => Ok(KeyAlgorithm::Rs256),
        Id::EC => {
            let curve = pkey
                .ec_key()?
                .group()
                .curve_name()
                .ok_or_else(|| EngineError::crypto("EC key uses an unnamed curve"))?;
            match curve {
                Nid::X9_62_PRIME256V1 => Ok(KeyAlgorithm::Es256),
                Nid::SECP384R1 => Ok(KeyAlgorithm::Es384),
                Nid::SECP521R1 => Ok(KeyAlgorithm::Es512),
                other => Err(EngineError::crypto(format!(
                    "Unsupported EC curve: {:?}",
                    other
                ))),
            }
        }
        other => Err(EngineError::crypto(format!(
            "Unsupported key type: {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_all_algorithms() {
        for alg in [
            KeyAlgorithm::Rs256,
            KeyAlgorithm::Es256,
            KeyAlgorithm::Es384,
            KeyAlgorithm::Es512,
        ] {
            let key = AccountKey::generate(alg).unwrap();
            assert_eq!(key.algorithm(), alg);
        }
    }

    #[test]
    fn test_pem_round_trip_preserves_algorithm() {
        let key = AccountKey::generate(KeyAlgorithm::Es384).unwrap();
        let pem = key.to_pem().unwrap();
        let loaded = AccountKey::from_pem(&pem).unwrap();
        assert_eq!(loaded.algorithm(), KeyAlgorithm::Es384);
    }

    #[test]
    fn test_sign_and_verify() {
        let key = AccountKey::generate(KeyAlgorithm::Es256).unwrap();
        let sig = key.sign(b"signing input").unwrap();
        // ES256 raw signatures are always 64 bytes
        assert_eq!(sig.len(), 64);
        assert!(key.verify(b"signing input", &sig).unwrap());
        assert!(!key.verify(b"other input", &sig).unwrap());
    }

    #[test]
    fn test_rsa_signature_verifies() {
        let key = AccountKey::generate(KeyAlgorithm::Rs256).unwrap();
        let sig = key.sign(b"payload").unwrap();
        assert_eq!(sig.len(), 256);
        assert!(key.verify(b"payload", &sig).unwrap());
    }

    #[test]
    fn test_deterministic_signatures_after_reload() {
        // RSA PKCS#1 v1.5 is deterministic: a reloaded key must produce the
        // identical signature over a fixed payload.
        let key = AccountKey::generate(KeyAlgorithm::Rs256).unwrap();
        let pem = key.to_pem().unwrap();
        let reloaded = AccountKey::from_pem(&pem).unwrap();
        assert_eq!(
            key.sign(b"fixed payload").unwrap(),
            reloaded.sign(b"fixed payload").unwrap()
        );
    }
}
