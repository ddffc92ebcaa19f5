//! Symmetric encryption for the password column.
//!
//! Values are stored as `base64(nonce || ciphertext || tag)` using AES-256-GCM
//! with a fresh 96-bit nonce per call. The key is the SHA-256 digest of the
//! configured secret, so any non-empty secret string is usable.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

const NONCE_LENGTH: usize = 12;

#[derive(Clone)]
pub struct PasswordCipher {
    cipher: Aes256Gcm,
}

impl PasswordCipher {
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            bail!("encryption key must not be empty");
        }
        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key).context("failed to create cipher")?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|err| anyhow!("encryption failed: {err}"))?;

        let mut combined = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let combined = BASE64
            .decode(encoded)
            .context("ciphertext is not valid base64")?;
        if combined.len() <= NONCE_LENGTH {
            bail!("ciphertext too short");
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LENGTH);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|err| anyhow!("decryption failed (wrong key or corrupted data): {err}"))?;

        String::from_utf8(plaintext).context("decrypted value is not valid UTF-8")
    }
}

impl std::fmt::Debug for PasswordCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCipher").finish_non_exhaustive()
    }
}
