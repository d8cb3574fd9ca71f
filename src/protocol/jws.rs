/// JWS envelope construction for ACME requests
use crate::crypto::AccountKey;
use crate::error::Result;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};

/// Build a flattened-JSON JWS (RFC 8555 §6.2) over `payload`, signed with
/// `key`. A `None` payload produces the empty payload used by POST-as-GET.
pub fn sign_flattened(
    key: &AccountKey,
    protected: &Value,
    payload: Option<&Value>,
) -> Result<String> {
    let protected_b64 = URL_SAFE_NO_PAD.encode(protected.to_string().as_bytes());
    let payload_b64 = match payload {
        Some(value) => URL_SAFE_NO_PAD.encode(value.to_string().as_bytes()),
        None => String::new(),
    };

    let signing_input = format!("{}.{}", protected_b64, payload_b64);
    let signature = key.sign(signing_input.as_bytes())?;

    let envelope = json!({
        "protected": protected_b64,
        "payload": payload_b64,
        "signature": URL_SAFE_NO_PAD.encode(signature),
    });

    Ok(envelope.to_string())
}

/// Protected header for a request authenticated by account URL (`kid`)
pub fn kid_header(alg: &str, kid: &str, nonce: &str, url: &str) -> Value {
    json!({
        "alg": alg,
        "kid": kid,
        "nonce": nonce,
        "url": url,
    })
}

/// Protected header for a request that identifies itself by public key
/// (`newAccount`, and the outer-less inner JWS of `keyChange`)
pub fn jwk_header(alg: &str, jwk: Value, nonce: Option<&str>, url: &str) -> Value {
    match nonce {
        Some(nonce) => json!({
            "alg": alg,
            "jwk": jwk,
            "nonce": nonce,
            "url": url,
        }),
        None => json!({
            "alg": alg,
            "jwk": jwk,
            "url": url,
        }),
    }
}
