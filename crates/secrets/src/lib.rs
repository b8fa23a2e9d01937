//! Encrypted per-project credential vault.
//!
//! Values are sealed with AES-256-GCM under a single 32-byte master key
//! read once at startup. Ciphertext, IV, and auth tag are stored as hex
//! strings. Plaintext only ever exists inside the caller's function
//! scope — it must never reach a trace, log, API response, or error
//! message.

mod cipher;
mod store;

pub use cipher::{MasterKey, Sealed, SecretCipher};
pub use store::{SecretMeta, SecretStore};

/// Environment variable holding the 64-hex-character master key.
pub const MASTER_KEY_ENV: &str = "SECRETS_ENCRYPTION_KEY";
