/// Anti-replay nonce cache for the ACME transport
use crate::error::Result;
use tokio::sync::Mutex;

/// Single-slot nonce cache.
///
/// The slot behaves like a one-element channel: `take` removes the stored
/// nonce so it can never be used twice, `store` keeps at most the newest
/// value. Concurrent requests that both need a nonce race for the slot; the
/// loser fetches a fresh one.
pub struct NonceSlot {
    new_nonce_url: String,
    http_client: reqwest::Client,
    slot: Mutex<Option<String>>,
}

impl NonceSlot {
    /// Create a slot backed by the directory's `newNonce` endpoint
    pub fn new(new_nonce_url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            new_nonce_url: new_nonce_url.into(),
            http_client,
            slot: Mutex::new(None),
        }
    }

    /// Take the cached nonce, or fetch a fresh one via `HEAD newNonce`
    pub async fn acquire(&self) -> Result<String> {
        if let Some(nonce) = self.slot.lock().await.take() {
            return Ok(nonce);
        }
        self.fetch().await
    }

    /// Store a `Replay-Nonce` observed on a response
    pub async fn store(&self, nonce: String) {
        let mut slot = self.slot.lock().await;
        *slot = Some(nonce);
    }

    /// Drop whatever the slot holds
    pub async fn clear(&self) {
        let mut slot = self.slot.lock().await;
        *slot = None;
    }

    async fn fetch(&self) -> Result<String> {
        let response = self
            .http_client
            .head(&self.new_nonce_url)
            .send()
            .await
            .map_err(|e| {
                crate::error::EngineError::transient(format!("Failed to fetch nonce: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(crate::error::EngineError::transient(format!(
                "Failed to fetch nonce: HTTP {}",
                response.status()
            )));
        }

        response
            .headers()
            .get("replay-nonce")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                crate::error::EngineError::transient("Missing Replay-Nonce header".to_string())
            })
    }
}
