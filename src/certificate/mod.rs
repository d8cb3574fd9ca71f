//! Certificate assembly: CSR material, chain handling, issuer cache, and
//! PKCS#12 packaging

pub mod chain;
pub mod csr;
pub mod issuer_cache;
pub mod pkcs12;

pub use chain::CertificateChain;
pub use csr::CsrMaterial;
pub use issuer_cache::IssuerCache;
pub use pkcs12::{CertificateArtifact, CertificateAssembler};
