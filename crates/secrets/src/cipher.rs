//! AES-256-GCM sealing and opening.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;

use nx_domain::error::{Error, Result};

use crate::MASTER_KEY_ENV;

/// GCM nonce length: 96 bits.
const IV_LEN: usize = 12;
/// GCM tag length: 128 bits.
const TAG_LEN: usize = 16;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Master key
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The 32-byte master key, sourced once at startup.
#[derive(Clone)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    /// Read the key from `SECRETS_ENCRYPTION_KEY`. Startup fails loudly
    /// when the variable is missing or not exactly 64 hex characters.
    pub fn from_env() -> Result<Self> {
        let raw = std::env::var(MASTER_KEY_ENV)
            .map_err(|_| Error::Config(format!("{MASTER_KEY_ENV} is not set")))?;
        Self::from_hex(&raw)
    }

    pub fn from_hex(raw: &str) -> Result<Self> {
        if raw.len() != 64 {
            return Err(Error::Config(format!(
                "{MASTER_KEY_ENV} must be exactly 64 hex characters, got {}",
                raw.len()
            )));
        }
        let bytes = hex::decode(raw)
            .map_err(|_| Error::Config(format!("{MASTER_KEY_ENV} is not valid hex")))?;
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material, even in debug output.
        f.write_str("MasterKey(..)")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sealed value
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One encrypted value: ciphertext, IV, and detached auth tag, all hex.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Sealed {
    pub encrypted_value: String,
    pub iv: String,
    pub auth_tag: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cipher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stateless AES-256-GCM wrapper around the master key.
#[derive(Clone)]
pub struct SecretCipher {
    aead: Aes256Gcm,
}

impl SecretCipher {
    pub fn new(key: &MasterKey) -> Self {
        Self {
            aead: Aes256Gcm::new_from_slice(&key.0).expect("master key is 32 bytes"),
        }
    }

    /// Seal a plaintext. Every call draws a fresh random IV, so two
    /// encryptions of the same plaintext produce different ciphertexts.
    pub fn seal(&self, plaintext: &str) -> Result<Sealed> {
        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);

        let mut sealed = self
            .aead
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: &[],
                },
            )
            .map_err(|_| Error::Internal("AES-GCM encryption failed".into()))?;

        // The aead crate appends the 16-byte tag; split it out so the
        // stored record matches the {value, iv, tag} wire shape.
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(Sealed {
            encrypted_value: hex::encode(sealed),
            iv: hex::encode(iv),
            auth_tag: hex::encode(tag),
        })
    }

    /// Open a sealed value. Any tampering with ciphertext, IV, or tag
    /// fails with `SECRET_DECRYPT_FAILED` — deliberately without detail.
    pub fn open(&self, sealed: &Sealed) -> Result<String> {
        let ciphertext = hex::decode(&sealed.encrypted_value).map_err(|_| Error::SecretDecrypt)?;
        let iv = hex::decode(&sealed.iv).map_err(|_| Error::SecretDecrypt)?;
        let tag = hex::decode(&sealed.auth_tag).map_err(|_| Error::SecretDecrypt)?;

        if iv.len() != IV_LEN || tag.len() != TAG_LEN {
            return Err(Error::SecretDecrypt);
        }

        let mut combined = ciphertext;
        combined.extend_from_slice(&tag);

        let nonce = Nonce::from_slice(&iv);
        let plaintext = self
            .aead
            .decrypt(
                nonce,
                Payload {
                    msg: &combined,
                    aad: &[],
                },
            )
            .map_err(|_| Error::SecretDecrypt)?;

        String::from_utf8(plaintext).map_err(|_| Error::SecretDecrypt)
    }
}
