//! Field encryption: AES-256-GCM over individual profile values.
//!
//! The key is the SHA-256 digest of the configured secret. Every value gets a
//! fresh 96-bit nonce; the stored form is `base64(nonce || ciphertext)`.
//! Plaintext never leaves this module in logs.

use aes_gcm::Aes256Gcm;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Process-wide encryption context, built once from the configured secret
/// and handed to the encrypted store.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    /// Derive the cipher from a secret of any length.
    pub fn from_secret(secret: &SecretString) -> Self {
        let digest = Sha256::digest(secret.expose_secret().as_bytes());
        Self {
            cipher: Aes256Gcm::new(&digest),
        }
    }

    /// Encrypt an optional value. `None` stays `None`.
    pub fn encrypt(&self, plaintext: Option<&str>) -> Result<Option<String>, CryptoError> {
        plaintext.map(|p| self.encrypt_str(p)).transpose()
    }

    /// Decrypt an optional value. `None` stays `None`.
    pub fn decrypt(&self, stored: Option<&str>) -> Result<Option<String>, CryptoError> {
        stored.map(|s| self.decrypt_str(s)).transpose()
    }

    fn encrypt_str(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptFailed)?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    fn decrypt_str(&self, stored: &str) -> Result<String, CryptoError> {
        let data = STANDARD
            .decode(stored.trim())
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Truncated { len: data.len() });
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(aes_gcm::Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)?;
        String::from_utf8(plain).map_err(|_| CryptoError::InvalidUtf8)
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FieldCipher(..)")
    }
}
