//! secrets - Credential store for confluence-tool
//!
//! Passwords never go into the plaintext config document. They are kept
//! here instead, one age-encrypted file per `(service, account)` pair.
//!
//! Uses age encryption (X25519 + ChaCha20-Poly1305).

pub mod store;
pub mod vault;

pub use store::{MemoryStore, SecretStore};
pub use vault::{Vault, VaultError};
