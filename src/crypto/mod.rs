//! Key material and JWS signing

pub mod keys;
pub mod signer;

pub use keys::{AccountKey, KeyAlgorithm};
pub use signer::{AccountSigner, SharedAccountKey};
