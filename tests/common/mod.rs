use mockito::{Mock, Server, ServerGuard};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509, X509NameBuilder};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Mock ACME directory server for integration tests
pub struct MockAcmeServer {
    pub server: ServerGuard,
}

#[allow(dead_code)]
impl MockAcmeServer {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        Self { server }
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    pub fn directory_url(&self) -> String {
        format!("{}/directory", self.url())
    }

    pub async fn mock_directory(&mut self) -> Mock {
        let url = self.url();
        self.server
            .mock("GET", "/directory")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "newNonce": format!("{}/new-nonce", url),
                    "newAccount": format!("{}/new-account", url),
                    "newOrder": format!("{}/new-order", url),
                    "revokeCert": format!("{}/revoke-cert", url),
                    "keyChange": format!("{}/key-change", url),
                    "meta": {
                        "termsOfService": "https://example.com/tos"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    pub async fn mock_new_nonce(&mut self) -> Mock {
        self.server
            .mock("HEAD", "/new-nonce")
            .with_status(200)
            .with_header("replay-nonce", "test-nonce-1")
            .create_async()
            .await
    }

    pub async fn mock_new_account(&mut self) -> Mock {
        let url = self.url();
        self.server
            .mock("POST", "/new-account")
            .with_status(201)
            .with_header("replay-nonce", "test-nonce-2")
            .with_header("location", &format!("{}/account/1", url))
            .with_body(
                json!({
                    "status": "valid",
                    "contact": ["mailto:a@example.org"],
                    "termsOfServiceAgreed": true,
                    "orders": format!("{}/account/1/orders", url)
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    /// Standard preamble: directory + nonce + account registration mocks
    pub async fn mock_preamble(&mut self) -> (Mock, Mock, Mock) {
        let dir = self.mock_directory().await;
        let nonce = self.mock_new_nonce().await;
        let account = self.mock_new_account().await;
        (dir, nonce, account)
    }
}

/// Responds with each body in turn, repeating the final one
#[allow(dead_code)]
pub fn sequenced_bodies(
    bodies: Vec<String>,
) -> impl Fn(&mockito::Request) -> Vec<u8> + Send + Sync + 'static {
    let calls = AtomicUsize::new(0);
    move |_request| {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        let idx = n.min(bodies.len() - 1);
        bodies[idx].clone().into_bytes()
    }
}

/// Self-signed leaf certificate for `cn`; returns (chain PEM, key PEM)
#[allow(dead_code)]
pub fn self_signed_chain(cn: &str, sans: &[&str]) -> (String, String) {
    let (cert, key) = self_signed_cert(cn, sans);
    (
        String::from_utf8(cert.to_pem().unwrap()).unwrap(),
        String::from_utf8(key.private_key_to_pem_pkcs8().unwrap()).unwrap(),
    )
}

/// Self-signed certificate object for `cn`
#[allow(dead_code)]
pub fn self_signed_cert(cn: &str, sans: &[&str]) -> (X509, PKey<Private>) {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    let name = name.build();

    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder
        .set_serial_number(&serial.to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(90).unwrap())
        .unwrap();

    if !sans.is_empty() {
        let mut san = SubjectAlternativeName::new();
        for s in sans {
            san.dns(s);
        }
        let ext = san.build(&builder.x509v3_context(None, None)).unwrap();
        builder.append_extension(ext).unwrap();
    }

    builder.sign(&key, MessageDigest::sha256()).unwrap();
    (builder.build(), key)
}

/// A pending order resource body
#[allow(dead_code)]
pub fn order_body(
    base_url: &str,
    status: &str,
    domain: &str,
    certificate: Option<&str>,
) -> String {
    let mut body = json!({
        "status": status,
        "expires": "2026-10-01T00:00:00Z",
        "identifiers": [{"type": "dns", "value": domain.trim_start_matches("*.")}],
        "authorizations": [format!("{}/authz/1", base_url)],
        "finalize": format!("{}/order/1/finalize", base_url),
    });
    if let Some(cert) = certificate {
        body["certificate"] = json!(cert);
    }
    body.to_string()
}

/// An authorization resource body offering HTTP-01 and DNS-01
#[allow(dead_code)]
pub fn authz_body(base_url: &str, status: &str, domain: &str, wildcard: bool) -> String {
    json!({
        "identifier": {"type": "dns", "value": domain.trim_start_matches("*.")},
        "status": status,
        "expires": "2026-10-01T00:00:00Z",
        "wildcard": wildcard,
        "challenges": [
            {
                "type": "http-01",
                "url": format!("{}/chall/http", base_url),
                "status": "pending",
                "token": "tok-http-1"
            },
            {
                "type": "dns-01",
                "url": format!("{}/chall/dns", base_url),
                "status": "pending",
                "token": "tok-dns-1"
            }
        ]
    })
    .to_string()
}

/// A challenge resource body
#[allow(dead_code)]
pub fn challenge_body(base_url: &str, kind: &str, status: &str) -> String {
    json!({
        "type": kind,
        "url": format!("{}/chall/{}", base_url, if kind == "http-01" { "http" } else { "dns" }),
        "status": status,
        "token": if kind == "http-01" { "tok-http-1" } else { "tok-dns-1" }
    })
    .to_string()
}
