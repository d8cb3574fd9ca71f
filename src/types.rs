/// Common types and structures for the ACME protocol
use serde::{Deserialize, Serialize};

const ERROR_URN_PREFIX: &str = "urn:ietf:params:acme:error:";

/// Identifier for a certificate order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// Type: "dns" or "ip"
    #[serde(rename = "type")]
    pub id_type: String,
    /// Value: domain name or IP address
    pub value: String,
}

impl Identifier {
    /// Create a DNS identifier
    pub fn dns(domain: impl Into<String>) -> Self {
        Self {
            id_type: "dns".to_string(),
            value: domain.into(),
        }
    }

    /// Whether this identifier carries a wildcard label
    pub fn is_wildcard(&self) -> bool {
        self.value.starts_with("*.")
    }

    /// The identifier value with any leading wildcard label stripped
    pub fn without_wildcard(&self) -> &str {
        self.value.strip_prefix("*.").unwrap_or(&self.value)
    }
}

/// Problem document returned by an ACME server (RFC 7807 profile)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcmeProblem {
    /// Error type URN
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Human-readable detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// HTTP status code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Per-identifier sub-problems
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subproblems: Vec<AcmeSubproblem>,
}

/// One element of a problem document's `subproblems` array
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcmeSubproblem {
    /// Error type URN
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Human-readable detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// The identifier this sub-problem refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<Identifier>,
}

impl AcmeProblem {
    fn is(&self, short: &str) -> bool {
        self.kind == format!("{ERROR_URN_PREFIX}{short}")
    }

    /// `urn:ietf:params:acme:error:badNonce`
    pub fn is_bad_nonce(&self) -> bool {
        self.is("badNonce")
    }

    /// `urn:ietf:params:acme:error:rateLimited`
    pub fn is_rate_limited(&self) -> bool {
        self.is("rateLimited")
    }

    /// `urn:ietf:params:acme:error:accountDoesNotExist`
    pub fn is_account_does_not_exist(&self) -> bool {
        self.is("accountDoesNotExist")
    }

    /// `urn:ietf:params:acme:error:unauthorized`
    pub fn is_unauthorized(&self) -> bool {
        self.is("unauthorized")
    }

    /// `urn:ietf:params:acme:error:userActionRequired`
    pub fn is_user_action_required(&self) -> bool {
        self.is("userActionRequired")
    }

    /// Detail string, falling back to the type URN
    pub fn message(&self) -> String {
        self.detail.clone().unwrap_or_else(|| self.kind.clone())
    }
}

impl std::fmt::Display for AcmeProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({})", detail, self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Certificate revocation reason codes (RFC 5280 §5.3.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RevocationReason {
    /// Reason unspecified
    Unspecified = 0,
    /// Key compromise
    KeyCompromise = 1,
    /// CA compromise
    CaCompromise = 2,
    /// Affiliation changed
    AffiliationChanged = 3,
    /// Superseded
    Superseded = 4,
    /// Cessation of operation
    CessationOfOperation = 5,
    /// Certificate hold
    CertificateHold = 6,
    /// Remove from CRL
    RemoveFromCrl = 8,
    /// Privilege withdrawn
    PrivilegeWithdrawn = 9,
    /// AA compromise
    AaCompromise = 10,
}

impl RevocationReason {
    /// Numeric wire value
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl std::str::FromStr for RevocationReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unspecified" => Ok(RevocationReason::Unspecified),
            "key-compromise" => Ok(RevocationReason::KeyCompromise),
            "ca-compromise" => Ok(RevocationReason::CaCompromise),
            "affiliation-changed" => Ok(RevocationReason::AffiliationChanged),
            "superseded" => Ok(RevocationReason::Superseded),
            "cessation-of-operation" => Ok(RevocationReason::CessationOfOperation),
            "certificate-hold" => Ok(RevocationReason::CertificateHold),
            "remove-from-crl" => Ok(RevocationReason::RemoveFromCrl),
            "privilege-withdrawn" => Ok(RevocationReason::PrivilegeWithdrawn),
            "aa-compromise" => Ok(RevocationReason::AaCompromise),
            _ => Err(format!("Unknown revocation reason: {}", s)),
        }
    }
}

/// Challenge kinds the engine can prepare responses for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeKind {
    /// HTTP-01 challenge
    #[serde(rename = "http-01")]
    Http01,
    /// DNS-01 challenge
    #[serde(rename = "dns-01")]
    Dns01,
}

impl ChallengeKind {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeKind::Http01 => "http-01",
            ChallengeKind::Dns01 => "dns-01",
        }
    }
}

impl std::str::FromStr for ChallengeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "http-01" => Ok(ChallengeKind::Http01),
            "dns-01" => Ok(ChallengeKind::Dns01),
            _ => Err(format!("Unsupported challenge type: {}", s)),
        }
    }
}

impl std::fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order resource status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Awaiting authorizations
    Pending,
    /// Authorizations complete, awaiting finalization
    Ready,
    /// Finalization submitted, certificate being issued
    Processing,
    /// Certificate issued
    Valid,
    /// Terminal failure
    Invalid,
}

impl OrderStatus {
    /// Whether the order can make no further progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Valid | OrderStatus::Invalid)
    }
}

/// Authorization resource status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    /// Awaiting a successful challenge
    Pending,
    /// Proof of control accepted
    Valid,
    /// Proof of control rejected
    Invalid,
    /// Deactivated by the client
    Deactivated,
    /// Expired before completion
    Expired,
    /// Revoked by the server
    Revoked,
}

/// Challenge resource status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    /// Not yet attempted
    Pending,
    /// Server is validating
    Processing,
    /// Validation succeeded
    Valid,
    /// Validation failed
    Invalid,
}

/// Account status, normalized for callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    /// Account exists and is usable
    Valid,
    /// Deactivated by the client
    Deactivated,
    /// Revoked by the server
    Revoked,
    /// No account registered for this key
    DoesNotExist,
    /// Server reported something we do not recognize
    Unknown,
}

impl AccountStatus {
    /// Map a wire status string
    pub fn from_wire(s: &str) -> Self {
        match s {
            "valid" => AccountStatus::Valid,
            "deactivated" => AccountStatus::Deactivated,
            "revoked" => AccountStatus::Revoked,
            _ => AccountStatus::Unknown,
        }
    }
}

/// Normalize a domain name to its ASCII (punycode) form.
///
/// A leading wildcard label is preserved as-is; only the registrable part is
/// converted.
pub fn to_ascii_domain(domain: &str) -> crate::error::Result<String> {
    let (wildcard, rest) = match domain.strip_prefix("*.") {
        Some(rest) => (true, rest),
        None => (false, domain),
    };

    let ascii = idna::domain_to_ascii(rest)
        .map_err(|e| crate::error::EngineError::config(format!("Invalid domain {domain}: {e}")))?;

    if ascii.is_empty() {
        return Err(crate::error::EngineError::config(format!(
            "Domain {domain} normalized to an empty name"
        )));
    }

    Ok(if wildcard { format!("*.{ascii}") } else { ascii })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_wildcard() {
        let id = Identifier::dns("*.example.com");
        assert!(id.is_wildcard());
        assert_eq!(id.without_wildcard(), "example.com");

        let plain = Identifier::dns("example.com");
        assert!(!plain.is_wildcard());
    }

    #[test]
    fn test_problem_classification() {
        let problem = AcmeProblem {
            kind: "urn:ietf:params:acme:error:badNonce".to_string(),
            detail: Some("JWS has an invalid anti-replay nonce".to_string()),
            status: Some(400),
            subproblems: Vec::new(),
        };
        assert!(problem.is_bad_nonce());
        assert!(!problem.is_rate_limited());
    }

    #[test]
    fn test_problem_subproblems_parse() {
        let json = r#"{
            "type": "urn:ietf:params:acme:error:malformed",
            "detail": "Some identifiers were rejected",
            "subproblems": [
                {
                    "type": "urn:ietf:params:acme:error:rejectedIdentifier",
                    "detail": "Invalid underscore in DNS name",
                    "identifier": {"type": "dns", "value": "_bad.example.com"}
                }
            ]
        }"#;

        let problem: AcmeProblem = serde_json::from_str(json).unwrap();
        assert_eq!(problem.subproblems.len(), 1);
        assert_eq!(
            problem.subproblems[0].identifier.as_ref().unwrap().value,
            "_bad.example.com"
        );
    }

    #[test]
    fn test_order_status_parse() {
        let status: OrderStatus = serde_json::from_str("\"ready\"").unwrap();
        assert_eq!(status, OrderStatus::Ready);
        assert!(!status.is_terminal());
        assert!(OrderStatus::Invalid.is_terminal());
    }

    #[test]
    fn test_challenge_kind() {
        assert_eq!(ChallengeKind::Http01.as_str(), "http-01");
        assert_eq!("dns-01".parse::<ChallengeKind>(), Ok(ChallengeKind::Dns01));
        assert!("tls-alpn-01".parse::<ChallengeKind>().is_err());
    }

    #[test]
    fn test_account_status_mapping() {
        assert_eq!(AccountStatus::from_wire("valid"), AccountStatus::Valid);
        assert_eq!(AccountStatus::from_wire("revoked"), AccountStatus::Revoked);
        assert_eq!(AccountStatus::from_wire("weird"), AccountStatus::Unknown);
    }

    #[test]
    fn test_ascii_domain_normalization() {
        assert_eq!(
            to_ascii_domain("bücher.example").unwrap(),
            "xn--bcher-kva.example"
        );
        assert_eq!(
            to_ascii_domain("*.bücher.example").unwrap(),
            "*.xn--bcher-kva.example"
        );
        assert_eq!(to_ascii_domain("host.example.com").unwrap(), "host.example.com");
    }
}
