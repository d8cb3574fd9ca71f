//! Authenticated HTTPS transport for an ACME directory
//!
//! Wraps reqwest with the protocol plumbing every ACME call shares: the
//! cached directory, the single-slot nonce cache, JWS envelope signing, and
//! the one free retry a `badNonce` rejection grants.

use crate::crypto::AccountSigner;
use crate::error::{EngineError, Result};
use crate::protocol::{Directory, DirectoryCache, NonceSlot, jws};
use crate::types::AcmeProblem;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const JOSE_CONTENT_TYPE: &str = "application/jose+json";

/// Observer for request/response pairs, for debug logging
pub type WireHook = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// User-Agent header sent with every request
    pub user_agent: String,
    /// Disable TLS certificate validation (dangerous; for private test CAs)
    pub accept_invalid_certs: bool,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("certforge/", env!("CARGO_PKG_VERSION")).to_string(),
            accept_invalid_certs: false,
            timeout: Duration::from_secs(30),
        }
    }
}

/// How a request authenticates itself
#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    /// Embed the public JWK (`newAccount` only)
    Jwk,
    /// Reference the account URL
    Kid(&'a str),
}

/// A decoded ACME response
#[derive(Debug, Clone)]
pub struct AcmeResponse {
    /// HTTP status
    pub status: u16,
    /// `Location` header, when present
    pub location: Option<String>,
    /// Response body
    pub body: Vec<u8>,
}

impl AcmeResponse {
    /// Body as UTF-8 text
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.clone())
            .map_err(|e| EngineError::transient(format!("Response body is not UTF-8: {}", e)))
    }

    /// Body parsed as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| EngineError::transient(format!("Failed to parse response: {}", e)))
    }

    /// The `Location` header, or an error when the endpoint must supply one
    pub fn location_required(&self) -> Result<&str> {
        self.location
            .as_deref()
            .ok_or_else(|| EngineError::transient("Response is missing the Location header"))
    }
}

/// HTTPS client bound to one ACME directory
pub struct AcmeTransport {
    http: reqwest::Client,
    directory: DirectoryCache,
    nonce: RwLock<NonceSlot>,
    signer: AccountSigner,
    hook: Option<WireHook>,
}

impl AcmeTransport {
    /// Connect to a directory: fetches the resource map and prepares the
    /// nonce cache.
    pub async fn connect(
        directory_url: &str,
        signer: AccountSigner,
        config: TransportConfig,
    ) -> Result<Self> {
        if config.accept_invalid_certs {
            tracing::warn!(
                "TLS certificate validation is DISABLED for {}; use only against a private test CA",
                directory_url
            );
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| {
                EngineError::transient(format!("Failed to build HTTP client: {}", e))
            })?;

        let directory = DirectoryCache::new(directory_url, http.clone());
        let dir = directory.fetch().await?;
        let nonce = RwLock::new(NonceSlot::new(&dir.new_nonce, http.clone()));

        Ok(Self {
            http,
            directory,
            nonce,
            signer,
            hook: None,
        })
    }

    /// Install a request/response observer
    pub fn with_wire_hook(mut self, hook: WireHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// The cached directory
    pub async fn directory(&self) -> Result<Directory> {
        self.directory.get().await
    }

    /// The signer backing this transport
    pub fn signer(&self) -> &AccountSigner {
        &self.signer
    }

    /// Drop the cached directory and nonce, then fetch the directory again.
    /// Used after a long idle period, when cached endpoints may be stale.
    pub async fn reinitialize(&self) -> Result<()> {
        self.directory.clear().await;
        let dir = self.directory.fetch().await?;
        let mut slot = self.nonce.write().await;
        *slot = NonceSlot::new(&dir.new_nonce, self.http.clone());
        tracing::debug!("Transport reinitialized against {}", self.directory.url());
        Ok(())
    }

    /// Signed POST. `None` payload is POST-as-GET.
    ///
    /// Exactly one nonce is consumed per attempt. A `badNonce` rejection is
    /// retried once with a fresh nonce without charging the caller's retry
    /// budget; every other failure is classified and returned.
    pub async fn post(
        &self,
        url: &str,
        payload: Option<&Value>,
        auth: Auth<'_>,
    ) -> Result<AcmeResponse> {
        let mut nonce = self.acquire_nonce().await?;
        let mut bad_nonce_retried = false;

        loop {
            let alg = self.signer.jws_alg().await;
            let protected = match auth {
                Auth::Jwk => jws::jwk_header(alg, self.signer.jwk().await?, Some(&nonce), url),
                Auth::Kid(kid) => jws::kid_header(alg, kid, &nonce, url),
            };
            let body = self.signer.sign_flattened(&protected, payload).await?;

            if let Some(hook) = &self.hook {
                hook("request", &format!("POST {} {}", url, body));
            }

            let response = self
                .http
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, JOSE_CONTENT_TYPE)
                .body(body)
                .send()
                .await
                .map_err(|e| EngineError::transient(format!("POST {} failed: {}", url, e)))?;

            let status = response.status().as_u16();
            let location = header_string(&response, "location");
            let replay_nonce = header_string(&response, "replay-nonce");
            let retry_after = header_string(&response, "retry-after")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);

            let bytes = response
                .bytes()
                .await
                .map_err(|e| EngineError::transient(format!("Failed to read response: {}", e)))?
                .to_vec();

            if let Some(hook) = &self.hook {
                hook(
                    "response",
                    &format!("{} {}", status, String::from_utf8_lossy(&bytes)),
                );
            }

            if (200..300).contains(&status) {
                if let Some(n) = replay_nonce {
                    self.store_nonce(n).await;
                }
                return Ok(AcmeResponse {
                    status,
                    location,
                    body: bytes,
                });
            }

            let problem: Option<AcmeProblem> = serde_json::from_slice(&bytes).ok();

            if let Some(p) = &problem
                && p.is_bad_nonce()
                && !bad_nonce_retried
            {
                bad_nonce_retried = true;
                tracing::debug!("badNonce from {}, retrying with a fresh nonce", url);
                // The rejection itself usually carries a usable Replay-Nonce.
                nonce = match replay_nonce {
                    Some(n) => n,
                    None => {
                        self.clear_nonce().await;
                        self.acquire_nonce().await?
                    }
                };
                continue;
            }

            if let Some(n) = replay_nonce {
                self.store_nonce(n).await;
            }

            // A second badNonce in a row means the free retry is spent;
            // the caller may still retry within its own budget.
            if let Some(p) = &problem
                && p.is_bad_nonce()
            {
                return Err(EngineError::transient(format!(
                    "badNonce persisted after refresh: {}",
                    p.message()
                )));
            }

            let rate_limited = status == 429
                || problem.as_ref().is_some_and(AcmeProblem::is_rate_limited);
            if rate_limited {
                return Err(EngineError::RateLimited { retry_after });
            }

            return match problem {
                Some(p) => Err(EngineError::Acme(p)),
                None => Err(EngineError::transient(format!(
                    "POST {} failed: HTTP {}",
                    url, status
                ))),
            };
        }
    }

    /// POST-as-GET: a signed request with an empty payload
    pub async fn post_as_get(&self, url: &str, kid: &str) -> Result<AcmeResponse> {
        self.post(url, None, Auth::Kid(kid)).await
    }

    async fn acquire_nonce(&self) -> Result<String> {
        self.nonce.read().await.acquire().await
    }

    async fn store_nonce(&self, nonce: String) {
        self.nonce.read().await.store(nonce).await;
    }

    async fn clear_nonce(&self) {
        self.nonce.read().await.clear().await;
    }
}

fn header_string(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}
