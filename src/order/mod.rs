//! Order, authorization, and challenge wire resources

pub mod orchestrator;
pub mod poll;
pub mod revocation;

pub use orchestrator::{IssuedCertificate, OrderOrchestrator, OrderState};
pub use revocation::Revoker;

use crate::types::{
    AcmeProblem, AuthorizationStatus, ChallengeStatus, Identifier, OrderStatus,
};
use serde::{Deserialize, Serialize};

/// ACME order resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Current status
    pub status: OrderStatus,

    /// Expiration timestamp of the order resource
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    /// Identifiers covered by this order
    pub identifiers: Vec<Identifier>,

    /// Authorization URLs, one per distinct identifier
    pub authorizations: Vec<String>,

    /// Finalization URL
    pub finalize: String,

    /// Certificate URL, populated once the order is valid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,

    /// Error that moved the order to invalid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AcmeProblem>,
}

/// ACME authorization resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authorization {
    /// The identifier being proven
    pub identifier: Identifier,

    /// Current status
    pub status: AuthorizationStatus,

    /// Expiration timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    /// Challenges offered by the server
    pub challenges: Vec<Challenge>,

    /// Set when the authorization was created for a wildcard identifier;
    /// the identifier value then lacks the `*.` prefix.
    #[serde(default)]
    pub wildcard: bool,
}

impl Authorization {
    /// Find an offered challenge by wire type
    pub fn challenge(&self, kind: &str) -> Option<&Challenge> {
        self.challenges.iter().find(|c| c.kind == kind)
    }

    /// The domain this authorization is for, with the wildcard label
    /// restored when applicable.
    pub fn domain(&self) -> String {
        if self.wildcard {
            format!("*.{}", self.identifier.value)
        } else {
            self.identifier.value.clone()
        }
    }
}

/// ACME challenge resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    /// Wire type, e.g. `http-01`; kept as a string so unknown types from
    /// the server do not fail deserialization.
    #[serde(rename = "type")]
    pub kind: String,

    /// Challenge URL
    pub url: String,

    /// Current status
    pub status: ChallengeStatus,

    /// Validation token
    pub token: String,

    /// Error recorded by the server on failed validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AcmeProblem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_parsing() {
        let json = r#"{
            "status": "pending",
            "expires": "2026-09-01T00:00:00Z",
            "identifiers": [{"type": "dns", "value": "example.com"}],
            "authorizations": ["https://ca/authz/1"],
            "finalize": "https://ca/order/1/finalize"
        }"#;

        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.certificate.is_none());
        assert!(order.error.is_none());
    }

    #[test]
    fn test_wildcard_authorization_domain() {
        let json = r#"{
            "identifier": {"type": "dns", "value": "example.com"},
            "status": "pending",
            "wildcard": true,
            "challenges": [
                {
                    "type": "dns-01",
                    "url": "https://ca/chall/1",
                    "status": "pending",
                    "token": "tok"
                }
            ]
        }"#;

        let auth: Authorization = serde_json::from_str(json).unwrap();
        assert!(auth.wildcard);
        assert_eq!(auth.domain(), "*.example.com");
        assert!(auth.challenge("dns-01").is_some());
        assert!(auth.challenge("http-01").is_none());
    }

    #[test]
    fn test_unknown_challenge_type_tolerated() {
        let json = r#"{
            "identifier": {"type": "dns", "value": "example.com"},
            "status": "pending",
            "challenges": [
                {
                    "type": "tls-alpn-01",
                    "url": "https://ca/chall/2",
                    "status": "pending",
                    "token": "tok"
                }
            ]
        }"#;

        let auth: Authorization = serde_json::from_str(json).unwrap();
        assert_eq!(auth.challenges[0].kind, "tls-alpn-01");
    }

    #[test]
    fn test_challenge_error_surface() {
        let json = r#"{
            "type": "http-01",
            "url": "https://ca/chall/3",
            "status": "invalid",
            "token": "tok",
            "error": {
                "type": "urn:ietf:params:acme:error:connection",
                "detail": "connection refused"
            }
        }"#;

        let challenge: Challenge = serde_json::from_str(json).unwrap();
        assert_eq!(challenge.status, ChallengeStatus::Invalid);
        assert_eq!(
            challenge.error.unwrap().detail.as_deref(),
            Some("connection refused")
        );
    }
}
