/// JSON Web Key (JWK) representation for ACME
use crate::error::Result;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

/// Public JWK embedded in `newAccount` and `keyChange` envelopes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type ("RSA" or "EC")
    pub kty: String,

    /// RSA modulus
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA public exponent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC X coordinate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC Y coordinate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl Jwk {
    /// RSA public key
    pub fn rsa(n: impl Into<String>, e: impl Into<String>) -> Self {
        Self {
            kty: "RSA".to_string(),
            n: Some(n.into()),
            e: Some(e.into()),
            crv: None,
            x: None,
            y: None,
        }
    }

    /// EC public key
    pub fn ec(crv: impl Into<String>, x: impl Into<String>, y: impl Into<String>) -> Self {
        Self {
            kty: "EC".to_string(),
            n: None,
            e: None,
            crv: Some(crv.into()),
            x: Some(x.into()),
            y: Some(y.into()),
        }
    }

    /// RFC 7638 thumbprint: SHA-256 over the required members in
    /// lexicographic order, base64url encoded.
    pub fn thumbprint_sha256(&self) -> Result<String> {
        // serde_json maps are ordered; json! with sorted keys yields the
        // canonical form for these member sets.
        let canonical = match self.kty.as_str() {
            "RSA" => {
                let n = self.require("n", &self.n)?;
                let e = self.require("e", &self.e)?;
                json!({ "e": e, "kty": "RSA", "n": n })
            }
            "EC" => {
                let crv = self.require("crv", &self.crv)?;
                let x = self.require("x", &self.x)?;
                let y = self.require("y", &self.y)?;
                json!({ "crv": crv, "kty": "EC", "x": x, "y": y })
            }
            other => {
                return Err(crate::error::EngineError::crypto(format!(
                    "Unsupported JWK key type: {}",
                    other
                )));
            }
        };

        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }

    fn require<'a>(&self, name: &str, field: &'a Option<String>) -> Result<&'a str> {
        field.as_deref().ok_or_else(|| {
            crate::error::EngineError::crypto(format!(
                "JWK of type {} is missing the '{}' member",
                self.kty, name
            ))
        })
    }

    /// JSON value for embedding in a protected header
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
