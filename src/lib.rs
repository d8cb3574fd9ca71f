//! # certforge — ACME v2 certificate engine
//!
//! A Rust library for driving certificate issuance and revocation against
//! ACME servers (RFC 8555) such as Let's Encrypt.
//!
//! ## Features
//!
//! - **Full order lifecycle**: account registration, order creation or
//!   resume, HTTP-01/DNS-01 authorization, CSR finalization, chain download
//! - **Account management**: registration, lookup, update, deactivation,
//!   key rollover
//! - **Deployment packaging**: PKCS#12 assembly with issuer-cache chain
//!   completion
//! - **Revocation**: straight from a persisted PKCS#12
//! - **Async/await**: built on Tokio; every round-trip and delay is a
//!   cancellable suspension point
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use certforge::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> certforge::Result<()> {
//!     let config = EngineConfig::lets_encrypt_staging()
//!         .with_contact_email("admin@example.org");
//!
//!     let responder = Arc::new(WebrootResponder::new("/var/www/html"));
//!     let engine = Engine::connect(config, responder).await?;
//!
//!     engine.accounts().register("admin@example.org", true).await?;
//!
//!     let spec = OrderSpec::new("host.example.com")
//!         .with_challenge(ChallengeKind::Http01)
//!         .with_pfx_password("changeit");
//!     let artifact = engine.issue(&spec).await?;
//!     println!("wrote {}", artifact.path.display());
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod certificate;
pub mod challenge;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod order;
pub mod protocol;
pub mod transport;
pub mod types;

pub use account::{Account, AccountManager, FileSettingsStore, SettingsStore, SigningSettings};
pub use certificate::{
    CertificateArtifact, CertificateAssembler, CertificateChain, CsrMaterial, IssuerCache,
};
pub use challenge::{
    ChallengeResponder, ChallengeResponse, ManualDnsResponder, PublishHandle,
    RecordingResponder, WebrootResponder,
};
pub use config::{EngineConfig, OrderSpec};
pub use crypto::{AccountKey, AccountSigner, KeyAlgorithm};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use order::{
    Authorization, Challenge, IssuedCertificate, Order, OrderOrchestrator, OrderState, Revoker,
};
pub use protocol::{Directory, DirectoryCache, Jwk, NonceSlot};
pub use transport::{AcmeTransport, AcmeResponse, Auth, TransportConfig};
pub use types::{
    AccountStatus, AcmeProblem, AcmeSubproblem, AuthorizationStatus, ChallengeKind,
    ChallengeStatus, Identifier, OrderStatus, RevocationReason,
};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::{
        account::{Account, AccountManager, SigningSettings},
        certificate::{CertificateArtifact, CertificateChain},
        challenge::{ChallengeResponder, ChallengeResponse, WebrootResponder},
        config::{EngineConfig, OrderSpec},
        crypto::{AccountKey, KeyAlgorithm},
        engine::Engine,
        error::{EngineError, Result},
        order::{IssuedCertificate, OrderOrchestrator, OrderState},
        types::{AccountStatus, ChallengeKind, OrderStatus, RevocationReason},
    };
}
