//! Order lifecycle state machine
//!
//! Drives one certificate order from creation (or resume) through
//! authorization, finalization, and chain download. All transitions are
//! sequential; the orchestrator never has two requests in flight for the
//! same order.

use crate::certificate::{CertificateChain, CsrMaterial};
use crate::challenge::{ChallengeResponder, PublishHandle};
use crate::config::OrderSpec;
use crate::error::{EngineError, Result};
use crate::order::poll::{CancelFlag, PollSchedule, poll_until};
use crate::order::{Authorization, Challenge, Order};
use crate::transport::{AcmeTransport, Auth};
use crate::types::{
    AuthorizationStatus, ChallengeKind, ChallengeStatus, Identifier, OrderStatus, to_ascii_domain,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const CREATE_ATTEMPTS: u32 = 3;
const CREATE_BACKOFF: Duration = Duration::from_secs(1);

const CHALLENGE_POLL: PollSchedule = PollSchedule::Increasing {
    attempts: 10,
    base_ms: 1000,
    step_ms: 500,
};
const AUTHORIZATION_POLL: PollSchedule = PollSchedule::Fixed {
    attempts: 20,
    delay: Duration::from_secs(1),
};
const ORDER_SETTLE_POLL: PollSchedule = PollSchedule::Fixed {
    attempts: 5,
    delay: Duration::from_secs(2),
};

/// Observable progress of an order run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderState {
    /// Nothing sent yet
    Draft,
    /// Order resource exists on the server
    Created,
    /// Challenge responses published, validation in progress
    AuthorizationsPending,
    /// Every identifier proven
    AuthorizationsValid,
    /// CSR submitted
    Finalizing,
    /// Certificate URL known, fetching the chain
    Downloading,
    /// Chain downloaded
    Completed,
    /// Terminal failure; holds the error kind's name
    Failed(String),
}

/// Result of a completed order
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    /// Primary (ASCII) domain
    pub primary_domain: String,
    /// Order URL, usable for resume/audit
    pub order_url: String,
    /// Downloaded chain, leaf first
    pub chain: CertificateChain,
    /// Private key for the leaf, PEM; absent when the caller brought a CSR
    pub certificate_key_pem: Option<String>,
    /// `YYYYMMDD_<8 hex>` identifier
    pub certificate_id: String,
}

/// Drives a single order; one orchestrator per order URL
pub struct OrderOrchestrator {
    transport: Arc<AcmeTransport>,
    account_url: String,
    responder: Arc<dyn ChallengeResponder>,
    dns_propagation_delay: Duration,
    cancel: CancelFlag,
    state: OrderState,
    published: Vec<PublishHandle>,
    csr_key_pem: Option<String>,
}

impl OrderOrchestrator {
    /// New orchestrator bound to a registered account
    pub fn new(
        transport: Arc<AcmeTransport>,
        account_url: String,
        responder: Arc<dyn ChallengeResponder>,
        dns_propagation_delay: Duration,
    ) -> Self {
        Self {
            transport,
            account_url,
            responder,
            dns_propagation_delay,
            cancel: CancelFlag::new(),
            state: OrderState::Draft,
            published: Vec::new(),
            csr_key_pem: None,
        }
    }

    /// Cooperative cancellation handle for this run
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Current state
    pub fn state(&self) -> &OrderState {
        &self.state
    }

    /// Run the order to completion.
    ///
    /// Published challenge responses are cleaned up on every exit path,
    /// including failure and cancellation.
    pub async fn run(&mut self, spec: &OrderSpec) -> Result<IssuedCertificate> {
        let result = self.drive(spec).await;
        self.cleanup_published().await;

        if let Err(err) = &result {
            self.state = OrderState::Failed(error_kind(err));
            tracing::warn!("Order for {} failed: {}", spec.primary_domain, err);
        }
        result
    }

    async fn drive(&mut self, spec: &OrderSpec) -> Result<IssuedCertificate> {
        let domains = normalized_domains(spec)?;
        let primary = domains[0].clone();
        let preferences = effective_preferences(&spec.challenge_preferences);
        let propagation_delay = spec
            .dns_propagation_delay_secs
            .map(Duration::from_secs)
            .unwrap_or(self.dns_propagation_delay);

        let (order_url, mut order) = match &spec.order_resume_uri {
            Some(uri) => {
                tracing::info!("Resuming order {}", uri);
                (uri.clone(), self.fetch_order(uri).await?)
            }
            None => self.create_order(&domains).await?,
        };
        self.state = OrderState::Created;
        tracing::info!("Order {} is {:?}", order_url, order.status);

        if order.status == OrderStatus::Invalid {
            return Err(order_failure(&order));
        }

        if order.status == OrderStatus::Pending {
            self.state = OrderState::AuthorizationsPending;
            let pending = self
                .publish_responses(&order, &preferences, propagation_delay)
                .await?;

            for validation in pending {
                self.validate(&validation).await?;
            }
            self.state = OrderState::AuthorizationsValid;

            order = self.fetch_order(&order_url).await?;
        }

        // Give the server a moment to move from pending/processing to ready
        // once all authorizations are valid.
        if matches!(order.status, OrderStatus::Pending | OrderStatus::Processing) {
            order = self
                .poll_order(&order_url, ORDER_SETTLE_POLL)
                .await?
                .ok_or_else(|| {
                    EngineError::FinalizationTimeout(format!(
                        "Order {} never became ready",
                        order_url
                    ))
                })?;
        }

        if order.status == OrderStatus::Ready {
            self.state = OrderState::Finalizing;
            order = self.finalize(&order_url, &order, &primary, &domains, spec).await?;
        }

        match order.status {
            OrderStatus::Valid => {}
            OrderStatus::Invalid => return Err(order_failure(&order)),
            other => {
                return Err(EngineError::FinalizationTimeout(format!(
                    "Order {} stuck in {:?} after finalization",
                    order_url, other
                )));
            }
        }

        self.state = OrderState::Downloading;
        let certificate_url = order.certificate.clone().ok_or_else(|| {
            EngineError::transient(format!("Valid order {} has no certificate URL", order_url))
        })?;

        let pem_text = self
            .transport
            .post_as_get(&certificate_url, &self.account_url)
            .await?
            .text()?;
        let chain = CertificateChain::from_pem(&pem_text)?;

        if !chain.covers_domain(&primary)? {
            tracing::warn!(
                "Downloaded leaf does not name {}; continuing, but the CA response looks wrong",
                primary
            );
        }

        let certificate_id = chain.certificate_id()?;
        self.state = OrderState::Completed;
        tracing::info!("Order {} completed as {}", order_url, certificate_id);

        Ok(IssuedCertificate {
            primary_domain: primary,
            order_url,
            chain,
            certificate_key_pem: self.csr_key_pem.take(),
            certificate_id,
        })
    }

    async fn create_order(&self, domains: &[String]) -> Result<(String, Order)> {
        let directory = self.transport.directory().await?;
        let identifiers: Vec<Identifier> =
            domains.iter().map(|d| Identifier::dns(d.clone())).collect();
        let payload = json!({ "identifiers": identifiers });

        let mut attempts_left = CREATE_ATTEMPTS;
        loop {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            attempts_left -= 1;

            match self
                .transport
                .post(&directory.new_order, Some(&payload), Auth::Kid(&self.account_url))
                .await
            {
                Ok(response) => {
                    let order_url = response.location_required()?.to_string();
                    let order: Order = response.json()?;
                    return Ok((order_url, order));
                }
                Err(err @ EngineError::RateLimited { .. }) => return Err(err),
                Err(EngineError::Acme(p)) if p.is_account_does_not_exist() => {
                    return Err(EngineError::account_invalid(p.message()));
                }
                Err(EngineError::Acme(p)) if p.is_user_action_required() => {
                    return Err(EngineError::UserActionRequired(p.message()));
                }
                Err(err) if err.is_transient() && attempts_left > 0 => {
                    tracing::warn!(
                        "newOrder attempt failed ({}), {} attempts left",
                        err,
                        attempts_left
                    );
                    tokio::time::sleep(CREATE_BACKOFF).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Prepare and publish a response for every pending authorization.
    /// Returns the validations still to be driven.
    async fn publish_responses(
        &mut self,
        order: &Order,
        preferences: &[ChallengeKind],
        propagation_delay: Duration,
    ) -> Result<Vec<PendingValidation>> {
        let mut pending = Vec::new();

        for auth_url in &order.authorizations {
            let auth = self.fetch_authorization(auth_url).await?;
            let domain = auth.domain();

            match auth.status {
                AuthorizationStatus::Valid => {
                    tracing::debug!("Authorization for {} already valid", domain);
                    continue;
                }
                AuthorizationStatus::Pending => {}
                other => {
                    return Err(EngineError::AuthorizationFailed {
                        identifier: domain,
                        detail: format!("Authorization is {:?}", other),
                        subproblems: Vec::new(),
                    });
                }
            }

            // Wildcard identifiers can only be proven over DNS.
            let mut allowed: Vec<ChallengeKind> = preferences.to_vec();
            if auth.wildcard {
                allowed.retain(|k| *k != ChallengeKind::Http01);
            }

            let Some((kind, challenge)) = allowed.iter().find_map(|k| {
                auth.challenge(k.as_str()).map(|c| (*k, c.clone()))
            }) else {
                return Err(EngineError::AuthorizationFailed {
                    identifier: domain,
                    detail: "No usable challenge offered for this identifier".to_string(),
                    subproblems: Vec::new(),
                });
            };

            let signer = self.transport.signer();
            let handle = match kind {
                ChallengeKind::Http01 => {
                    let key_auth = signer.key_authorization(&challenge.token).await?;
                    self.responder
                        .publish_http01(&auth.identifier.value, &challenge.token, &key_auth)
                        .await?
                }
                ChallengeKind::Dns01 => {
                    // The authorization identifier is already stripped of
                    // any wildcard label.
                    let record_name = format!("_acme-challenge.{}", auth.identifier.value);
                    let record_value = signer.dns_txt(&challenge.token).await?;
                    self.responder
                        .publish_dns01(&record_name, &record_value, propagation_delay)
                        .await?
                }
            };
            self.published.push(handle);
            tracing::info!("Published {} response for {}", kind, domain);

            pending.push(PendingValidation {
                domain,
                authorization_url: auth_url.clone(),
                challenge,
            });
        }

        Ok(pending)
    }

    /// Ask the server to validate, then poll the challenge and its owning
    /// authorization until they settle.
    async fn validate(&self, validation: &PendingValidation) -> Result<()> {
        self.transport
            .post(
                &validation.challenge.url,
                Some(&json!({})),
                Auth::Kid(&self.account_url),
            )
            .await?;

        let settled = {
            let transport = Arc::clone(&self.transport);
            let kid = self.account_url.clone();
            let url = validation.challenge.url.clone();
            poll_until(
                move || {
                    let transport = Arc::clone(&transport);
                    let kid = kid.clone();
                    let url = url.clone();
                    async move { transport.post_as_get(&url, &kid).await?.json::<Challenge>() }
                },
                |c: &Challenge| {
                    matches!(c.status, ChallengeStatus::Valid | ChallengeStatus::Invalid)
                },
                CHALLENGE_POLL,
                &self.cancel,
            )
            .await?
        };

        if let Some(challenge) = settled
            && challenge.status == ChallengeStatus::Invalid
        {
            return Err(self.authorization_error(validation, Some(challenge)));
        }

        // The challenge may settle only at the authorization level; keep
        // polling there either way.
        let authorization = {
            let transport = Arc::clone(&self.transport);
            let kid = self.account_url.clone();
            let url = validation.authorization_url.clone();
            poll_until(
                move || {
                    let transport = Arc::clone(&transport);
                    let kid = kid.clone();
                    let url = url.clone();
                    async move {
                        transport.post_as_get(&url, &kid).await?.json::<Authorization>()
                    }
                },
                |a: &Authorization| !matches!(a.status, AuthorizationStatus::Pending),
                AUTHORIZATION_POLL,
                &self.cancel,
            )
            .await?
        };

        match authorization {
            Some(auth) if auth.status == AuthorizationStatus::Valid => {
                tracing::info!("Authorization valid for {}", validation.domain);
                Ok(())
            }
            Some(_) => {
                // Fetch the challenge once more for its problem detail.
                let challenge = self.fetch_challenge(&validation.challenge.url).await.ok();
                Err(self.authorization_error(validation, challenge))
            }
            None => Err(EngineError::AuthorizationFailed {
                identifier: validation.domain.clone(),
                detail: "Validation did not settle within the polling budget".to_string(),
                subproblems: Vec::new(),
            }),
        }
    }

    fn authorization_error(
        &self,
        validation: &PendingValidation,
        challenge: Option<Challenge>,
    ) -> EngineError {
        let problem = challenge.and_then(|c| c.error);
        let (detail, subproblems) = match problem {
            Some(p) => (p.message(), p.subproblems),
            None => ("Challenge validation failed".to_string(), Vec::new()),
        };
        EngineError::AuthorizationFailed {
            identifier: validation.domain.clone(),
            detail,
            subproblems,
        }
    }

    async fn finalize(
        &mut self,
        order_url: &str,
        order: &Order,
        primary: &str,
        domains: &[String],
        spec: &OrderSpec,
    ) -> Result<Order> {
        let material = match &spec.custom_csr_pem {
            Some(pem_text) => CsrMaterial::from_pem(pem_text)?,
            None => CsrMaterial::generate(
                primary,
                domains,
                spec.csr_key_alg,
                spec.custom_private_key_pem.as_deref(),
            )?,
        };
        self.csr_key_pem = material.key_pem.clone();

        let payload = json!({ "csr": URL_SAFE_NO_PAD.encode(&material.csr_der) });
        let response = self
            .transport
            .post(&order.finalize, Some(&payload), Auth::Kid(&self.account_url))
            .await?;
        let finalized: Order = response.json()?;

        if finalized.status.is_terminal() {
            return Ok(finalized);
        }

        self.poll_order(order_url, ORDER_SETTLE_POLL)
            .await?
            .ok_or_else(|| {
                EngineError::FinalizationTimeout(format!(
                    "Order {} did not issue within the polling budget",
                    order_url
                ))
            })
    }

    async fn poll_order(&self, order_url: &str, schedule: PollSchedule) -> Result<Option<Order>> {
        let transport = Arc::clone(&self.transport);
        let kid = self.account_url.clone();
        let url = order_url.to_string();
        poll_until(
            move || {
                let transport = Arc::clone(&transport);
                let kid = kid.clone();
                let url = url.clone();
                async move { transport.post_as_get(&url, &kid).await?.json::<Order>() }
            },
            |o: &Order| {
                matches!(
                    o.status,
                    OrderStatus::Ready | OrderStatus::Valid | OrderStatus::Invalid
                )
            },
            schedule,
            &self.cancel,
        )
        .await
    }

    async fn fetch_order(&self, url: &str) -> Result<Order> {
        self.transport
            .post_as_get(url, &self.account_url)
            .await?
            .json()
    }

    async fn fetch_authorization(&self, url: &str) -> Result<Authorization> {
        self.transport
            .post_as_get(url, &self.account_url)
            .await?
            .json()
    }

    async fn fetch_challenge(&self, url: &str) -> Result<Challenge> {
        self.transport
            .post_as_get(url, &self.account_url)
            .await?
            .json()
    }

    /// Remove every published response via the responder; best effort
    async fn cleanup_published(&mut self) {
        for handle in self.published.drain(..) {
            if let Err(e) = self.responder.cleanup(handle).await {
                tracing::warn!("Challenge cleanup failed: {}", e);
            }
        }
    }
}

struct PendingValidation {
    domain: String,
    authorization_url: String,
    challenge: Challenge,
}

/// ASCII-normalize and deduplicate the requested names, primary first
fn normalized_domains(spec: &OrderSpec) -> Result<Vec<String>> {
    let mut domains = vec![to_ascii_domain(&spec.primary_domain)?];
    for san in &spec.subject_alternative_names {
        let ascii = to_ascii_domain(san)?;
        if !domains.contains(&ascii) {
            domains.push(ascii);
        }
    }
    Ok(domains)
}

/// Caller preferences, defaulting to both kinds when none are enabled
fn effective_preferences(preferences: &[ChallengeKind]) -> Vec<ChallengeKind> {
    if preferences.is_empty() {
        vec![ChallengeKind::Http01, ChallengeKind::Dns01]
    } else {
        preferences.to_vec()
    }
}

fn order_failure(order: &Order) -> EngineError {
    match &order.error {
        Some(problem) => EngineError::Acme(problem.clone()),
        None => EngineError::transient("Order is invalid without a problem document"),
    }
}

fn error_kind(err: &EngineError) -> String {
    match err {
        EngineError::Transient(_) => "transient",
        EngineError::RateLimited { .. } => "rate-limited",
        EngineError::AccountInvalid(_) => "account-invalid",
        EngineError::UserActionRequired(_) => "user-action-required",
        EngineError::AuthorizationFailed { .. } => "authorization-failed",
        EngineError::FinalizationTimeout(_) => "finalization-timeout",
        EngineError::Cancelled => "cancelled",
        _ => "error",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_domains_dedup_and_order() {
        let spec = OrderSpec::new("host.example.com")
            .with_san("www.example.com")
            .with_san("host.example.com");
        let domains = normalized_domains(&spec).unwrap();
        assert_eq!(domains, vec!["host.example.com", "www.example.com"]);
    }

    #[test]
    fn test_normalized_domains_punycode() {
        let spec = OrderSpec::new("bücher.example").with_san("*.bücher.example");
        let domains = normalized_domains(&spec).unwrap();
        assert_eq!(
            domains,
            vec!["xn--bcher-kva.example", "*.xn--bcher-kva.example"]
        );
    }

    #[test]
    fn test_empty_preferences_enable_both() {
        assert_eq!(
            effective_preferences(&[]),
            vec![ChallengeKind::Http01, ChallengeKind::Dns01]
        );
        assert_eq!(
            effective_preferences(&[ChallengeKind::Dns01]),
            vec![ChallengeKind::Dns01]
        );
    }
}
