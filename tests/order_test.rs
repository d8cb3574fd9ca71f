mod common;

use certforge::prelude::*;
use certforge::challenge::RecordingResponder;
use common::{
    MockAcmeServer, authz_body, challenge_body, order_body, self_signed_chain, sequenced_bodies,
};
use serde_json::json;
use std::sync::Arc;

async fn engine_with(
    server: &MockAcmeServer,
    responder: Arc<RecordingResponder>,
    dir: &tempfile::TempDir,
) -> Engine {
    let config = EngineConfig::new(server.directory_url())
        .with_assets_dir(dir.path().join("assets"))
        .with_settings_path(dir.path().join("signing.json"));
    Engine::connect(config, responder).await.unwrap()
}

#[tokio::test]
async fn test_http01_issuance_end_to_end() {
    let mut server = MockAcmeServer::new().await;
    let url = server.url();
    let _preamble = server.mock_preamble().await;

    let _new_order = server
        .server
        .mock("POST", "/new-order")
        .with_status(201)
        .with_header("replay-nonce", "n-order")
        .with_header("location", &format!("{}/order/1", url))
        .with_body(order_body(&url, "pending", "host.example.com", None))
        .create_async()
        .await;

    // Pending when the challenge response is prepared, valid afterwards.
    let _authz = server
        .server
        .mock("POST", "/authz/1")
        .with_status(200)
        .with_header("replay-nonce", "n-authz")
        .with_body_from_request(sequenced_bodies(vec![
            authz_body(&url, "pending", "host.example.com", false),
            authz_body(&url, "valid", "host.example.com", false),
        ]))
        .create_async()
        .await;

    // First POST is the validation trigger, the rest are status polls.
    let _challenge = server
        .server
        .mock("POST", "/chall/http")
        .with_status(200)
        .with_header("replay-nonce", "n-chall")
        .with_body_from_request(sequenced_bodies(vec![
            challenge_body(&url, "http-01", "pending"),
            challenge_body(&url, "http-01", "valid"),
        ]))
        .create_async()
        .await;

    let _order = server
        .server
        .mock("POST", "/order/1")
        .with_status(200)
        .with_header("replay-nonce", "n-refetch")
        .with_body(order_body(&url, "ready", "host.example.com", None))
        .create_async()
        .await;

    let _finalize = server
        .server
        .mock("POST", "/order/1/finalize")
        .with_status(200)
        .with_header("replay-nonce", "n-final")
        .with_body(order_body(
            &url,
            "valid",
            "host.example.com",
            Some(&format!("{}/cert/1", url)),
        ))
        .create_async()
        .await;

    let (chain_pem, _key_pem) = self_signed_chain("host.example.com", &["host.example.com"]);
    let _cert = server
        .server
        .mock("POST", "/cert/1")
        .with_status(200)
        .with_header("replay-nonce", "n-cert")
        .with_body(chain_pem.clone())
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let responder = Arc::new(RecordingResponder::new());
    let engine = engine_with(&server, Arc::clone(&responder), &dir).await;
    engine.accounts().register("a@example.org", true).await.unwrap();

    let spec = OrderSpec::new("host.example.com")
        .with_challenge(ChallengeKind::Http01)
        .with_pfx_password("test-password");
    let artifact = engine.issue(&spec).await.unwrap();

    // The .pfx lands at the deterministic location and opens with the
    // supplied password.
    assert!(artifact.path.exists());
    assert!(
        artifact
            .path
            .starts_with(dir.path().join("assets").join("host.example.com"))
    );
    let pfx_der = std::fs::read(&artifact.path).unwrap();
    let parsed = openssl::pkcs12::Pkcs12::from_der(&pfx_der)
        .unwrap()
        .parse2("test-password")
        .unwrap();
    let leaf = parsed.cert.expect("pfx holds the leaf");
    let expected = openssl::x509::X509::from_pem(chain_pem.as_bytes()).unwrap();
    assert_eq!(leaf.to_der().unwrap(), expected.to_der().unwrap());
    assert!(parsed.pkey.is_some());

    // The leaf is valid for at least 60 more days.
    let now = jiff::Timestamp::now().as_second();
    assert!(artifact.not_after >= now + 60 * 24 * 3600);

    // Exactly one HTTP-01 response was published, and it was cleaned up.
    let published = responder.published().await;
    assert_eq!(published.len(), 1);
    match &published[0] {
        ChallengeResponse::Http01 { path, body, token, .. } => {
            assert_eq!(path, "/.well-known/acme-challenge/tok-http-1");
            assert!(body.starts_with(&format!("{}.", token)));
        }
        other => panic!("expected an HTTP-01 publish, got {other:?}"),
    }
    assert_eq!(responder.cleaned().await, published);
}

#[tokio::test]
async fn test_wildcard_order_uses_dns01_only() {
    let mut server = MockAcmeServer::new().await;
    let url = server.url();
    let _preamble = server.mock_preamble().await;

    let _new_order = server
        .server
        .mock("POST", "/new-order")
        .with_status(201)
        .with_header("replay-nonce", "n-order")
        .with_header("location", &format!("{}/order/1", url))
        .with_body(order_body(&url, "pending", "*.example.com", None))
        .create_async()
        .await;

    // The wildcard authorization offers both challenge kinds; the engine
    // must never pick HTTP-01 for it.
    let _authz = server
        .server
        .mock("POST", "/authz/1")
        .with_status(200)
        .with_header("replay-nonce", "n-authz")
        .with_body_from_request(sequenced_bodies(vec![
            authz_body(&url, "pending", "*.example.com", true),
            authz_body(&url, "valid", "*.example.com", true),
        ]))
        .create_async()
        .await;

    let _challenge = server
        .server
        .mock("POST", "/chall/dns")
        .with_status(200)
        .with_header("replay-nonce", "n-chall")
        .with_body_from_request(sequenced_bodies(vec![
            challenge_body(&url, "dns-01", "pending"),
            challenge_body(&url, "dns-01", "valid"),
        ]))
        .create_async()
        .await;

    let _order = server
        .server
        .mock("POST", "/order/1")
        .with_status(200)
        .with_body(order_body(&url, "ready", "*.example.com", None))
        .create_async()
        .await;

    let _finalize = server
        .server
        .mock("POST", "/order/1/finalize")
        .with_status(200)
        .with_body(order_body(
            &url,
            "valid",
            "*.example.com",
            Some(&format!("{}/cert/1", url)),
        ))
        .create_async()
        .await;

    let (chain_pem, _key_pem) = self_signed_chain("*.example.com", &["*.example.com"]);
    let _cert = server
        .server
        .mock("POST", "/cert/1")
        .with_status(200)
        .with_body(chain_pem)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let responder = Arc::new(RecordingResponder::new());
    let engine = engine_with(&server, Arc::clone(&responder), &dir).await;
    engine.accounts().register("a@example.org", true).await.unwrap();

    // No explicit preference: both kinds are enabled by default, and the
    // wildcard rule must still exclude HTTP-01.
    let spec = OrderSpec::new("*.example.com").with_pfx_password("pw");
    let artifact = engine.issue(&spec).await.unwrap();

    let published = responder.published().await;
    assert_eq!(published.len(), 1);
    match &published[0] {
        ChallengeResponse::Dns01 {
            record_name,
            record_value,
            ..
        } => {
            assert_eq!(record_name, "_acme-challenge.example.com");
            // base64url SHA-256 digests are 43 characters unpadded.
            assert_eq!(record_value.len(), 43);
        }
        other => panic!("expected a DNS-01 publish, got {other:?}"),
    }

    // '*' never appears in the artifact path.
    assert!(artifact.path.to_string_lossy().contains("_.example.com"));
    assert_eq!(responder.cleaned().await, published);
}

#[tokio::test]
async fn test_rate_limited_new_order_is_not_retried() {
    let mut server = MockAcmeServer::new().await;
    let _preamble = server.mock_preamble().await;

    let limited = server
        .server
        .mock("POST", "/new-order")
        .with_status(429)
        .with_header("replay-nonce", "n-limited")
        .with_header("retry-after", "60")
        .with_body(
            json!({
                "type": "urn:ietf:params:acme:error:rateLimited",
                "detail": "too many new orders"
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let responder = Arc::new(RecordingResponder::new());
    let engine = engine_with(&server, Arc::clone(&responder), &dir).await;
    engine.accounts().register("a@example.org", true).await.unwrap();

    let spec = OrderSpec::new("host.example.com");
    let err = engine.issue(&spec).await.unwrap_err();

    match err {
        EngineError::RateLimited { retry_after } => {
            assert_eq!(retry_after, Some(std::time::Duration::from_secs(60)));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
    // A rate limit stops the run cold: exactly one request.
    limited.assert_async().await;
}

#[tokio::test]
async fn test_order_already_ready_skips_challenges() {
    let mut server = MockAcmeServer::new().await;
    let url = server.url();
    let _preamble = server.mock_preamble().await;

    // No authorization or challenge mocks exist; touching them would fail.
    let _new_order = server
        .server
        .mock("POST", "/new-order")
        .with_status(201)
        .with_header("replay-nonce", "n-order")
        .with_header("location", &format!("{}/order/1", url))
        .with_body(order_body(&url, "ready", "host.example.com", None))
        .create_async()
        .await;

    let _finalize = server
        .server
        .mock("POST", "/order/1/finalize")
        .with_status(200)
        .with_body(order_body(
            &url,
            "valid",
            "host.example.com",
            Some(&format!("{}/cert/1", url)),
        ))
        .create_async()
        .await;

    let (chain_pem, _key_pem) = self_signed_chain("host.example.com", &["host.example.com"]);
    let _cert = server
        .server
        .mock("POST", "/cert/1")
        .with_status(200)
        .with_body(chain_pem)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let responder = Arc::new(RecordingResponder::new());
    let engine = engine_with(&server, Arc::clone(&responder), &dir).await;
    engine.accounts().register("a@example.org", true).await.unwrap();

    let spec = OrderSpec::new("host.example.com").with_pfx_password("pw");
    let artifact = engine.issue(&spec).await.unwrap();

    assert!(artifact.path.exists());
    assert!(responder.published().await.is_empty());
}

#[tokio::test]
async fn test_order_already_valid_downloads_without_finalizing() {
    let mut server = MockAcmeServer::new().await;
    let url = server.url();
    let _preamble = server.mock_preamble().await;

    // Valid straight away: no finalize mock exists, so re-finalizing would
    // fail the test.
    let _new_order = server
        .server
        .mock("POST", "/new-order")
        .with_status(201)
        .with_header("replay-nonce", "n-order")
        .with_header("location", &format!("{}/order/1", url))
        .with_body(order_body(
            &url,
            "valid",
            "host.example.com",
            Some(&format!("{}/cert/1", url)),
        ))
        .create_async()
        .await;

    let (chain_pem, _key_pem) = self_signed_chain("host.example.com", &["host.example.com"]);
    let _cert = server
        .server
        .mock("POST", "/cert/1")
        .with_status(200)
        .with_body(chain_pem)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let responder = Arc::new(RecordingResponder::new());
    let engine = engine_with(&server, Arc::clone(&responder), &dir).await;
    engine.accounts().register("a@example.org", true).await.unwrap();

    let spec = OrderSpec::new("host.example.com").with_pfx_password("pw");
    let artifact = engine.issue(&spec).await.unwrap();

    assert!(artifact.path.exists());
    assert!(responder.published().await.is_empty());
}

#[tokio::test]
async fn test_internationalized_name_is_ordered_in_ascii() {
    use base64::Engine as _;

    let mut server = MockAcmeServer::new().await;
    let url = server.url();
    let _preamble = server.mock_preamble().await;

    // The mock only answers when the order payload carries the punycode
    // form of the domain.
    let expected_payload = json!({
        "identifiers": [{"type": "dns", "value": "xn--bcher-kva.example"}]
    });
    let payload_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(expected_payload.to_string().as_bytes());

    let new_order = server
        .server
        .mock("POST", "/new-order")
        .match_body(mockito::Matcher::Regex(payload_b64))
        .with_status(201)
        .with_header("replay-nonce", "n-order")
        .with_header("location", &format!("{}/order/1", url))
        .with_body(order_body(&url, "ready", "xn--bcher-kva.example", None))
        .create_async()
        .await;

    let _finalize = server
        .server
        .mock("POST", "/order/1/finalize")
        .with_status(200)
        .with_body(order_body(
            &url,
            "valid",
            "xn--bcher-kva.example",
            Some(&format!("{}/cert/1", url)),
        ))
        .create_async()
        .await;

    let (chain_pem, _key_pem) =
        self_signed_chain("xn--bcher-kva.example", &["xn--bcher-kva.example"]);
    let _cert = server
        .server
        .mock("POST", "/cert/1")
        .with_status(200)
        .with_body(chain_pem)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let responder = Arc::new(RecordingResponder::new());
    let engine = engine_with(&server, Arc::clone(&responder), &dir).await;
    engine.accounts().register("a@example.org", true).await.unwrap();

    let spec = OrderSpec::new("bücher.example").with_pfx_password("pw");
    let artifact = engine.issue(&spec).await.unwrap();

    assert_eq!(artifact.friendly_name.split(' ').next(), Some("xn--bcher-kva.example"));
    new_order.assert_async().await;
}

#[tokio::test]
async fn test_cancelled_order_cleans_up_published_responses() {
    let mut server = MockAcmeServer::new().await;
    let url = server.url();
    let _preamble = server.mock_preamble().await;

    let _new_order = server
        .server
        .mock("POST", "/new-order")
        .with_status(201)
        .with_header("replay-nonce", "n-order")
        .with_header("location", &format!("{}/order/1", url))
        .with_body(order_body(&url, "pending", "host.example.com", None))
        .create_async()
        .await;

    let _authz = server
        .server
        .mock("POST", "/authz/1")
        .with_status(200)
        .with_body(authz_body(&url, "pending", "host.example.com", false))
        .create_async()
        .await;

    // Validation never settles; the cancel flag has to break the loop.
    let _challenge = server
        .server
        .mock("POST", "/chall/http")
        .with_status(200)
        .with_body(challenge_body(&url, "http-01", "pending"))
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let responder = Arc::new(RecordingResponder::new());
    let engine = engine_with(&server, Arc::clone(&responder), &dir).await;
    engine.accounts().register("a@example.org", true).await.unwrap();

    let mut orchestrator = engine.orchestrator().await.unwrap();
    let cancel = orchestrator.cancel_flag();

    let spec = OrderSpec::new("host.example.com").with_challenge(ChallengeKind::Http01);
    let run = tokio::spawn(async move { orchestrator.run(&spec).await });

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    cancel.cancel();

    let result = run.await.unwrap();
    assert!(matches!(result, Err(EngineError::Cancelled)));

    // Every successful publish was matched by a cleanup.
    let published = responder.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(responder.cleaned().await, published);
}
