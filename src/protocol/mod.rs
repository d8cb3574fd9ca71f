//! ACME protocol primitives: directory, nonces, JWK, JWS envelopes

pub mod directory;
pub mod jwk;
pub mod jws;
pub mod nonce;

pub use directory::{Directory, DirectoryCache, DirectoryMeta};
pub use jwk::Jwk;
pub use nonce::NonceSlot;
