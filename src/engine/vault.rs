use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};

use crate::{Encryption, Error, Result};

const NONCE_LEN: usize = 12;

/// Passthrough [`Encryption`]: the ciphertext is the UTF-8 plaintext.
///
/// Also the degraded mode the builder falls back to when the configured
/// encryption fails to initialize.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEncryption;

impl Encryption for NoEncryption {
    fn init(&self) -> bool {
        true
    }

    fn encrypt(&self, _key: &str, plaintext: &str) -> Result<Vec<u8>> {
        Ok(plaintext.as_bytes().to_vec())
    }

    fn decrypt(&self, _key: &str, ciphertext: &[u8]) -> Result<String> {
        String::from_utf8(ciphertext.to_vec()).map_err(|e| Error::Encryption(e.to_string()))
    }
}

/// AES-256-GCM with a 32-byte master key.
///
/// The output is the 12-byte nonce followed by the ciphertext. `"{salt}:{key}"` is
/// bound as associated data, so an entry only decrypts under the key it was
/// written to.
pub struct AesGcmEncryption {
    master_key: Vec<u8>,
    salt: String,
}

impl AesGcmEncryption {
    pub fn new(master_key: &[u8], salt: impl Into<String>) -> Self {
        Self {
            master_key: master_key.to_vec(),
            salt: salt.into(),
        }
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        if self.master_key.len() != 32 {
            return Err(Error::Encryption("Key must be 32 bytes".to_string()));
        }
        Aes256Gcm::new_from_slice(&self.master_key).map_err(|e| Error::Encryption(e.to_string()))
    }

    fn aad(&self, key: &str) -> Vec<u8> {
        format!("{}:{}", self.salt, key).into_bytes()
    }
}

impl std::fmt::Debug for AesGcmEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmEncryption").field("salt", &self.salt).finish_non_exhaustive()
    }
}

impl Encryption for AesGcmEncryption {
    fn init(&self) -> bool {
        self.cipher().is_ok()
    }

    fn encrypt(&self, key: &str, plaintext: &str) -> Result<Vec<u8>> {
        let cipher = self.cipher()?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng); // 96 bits / 12 bytes
        let aad = self.aad(key);
        let ciphertext = cipher
            .encrypt(&nonce, Payload { msg: plaintext.as_bytes(), aad: &aad })
            .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(combined)
    }

    fn decrypt(&self, key: &str, combined: &[u8]) -> Result<String> {
        if combined.len() < NONCE_LEN {
            return Err(Error::Encryption("Ciphertext too short".to_string()));
        }
        let cipher = self.cipher()?;
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let aad = self.aad(key);

        let plaintext_bytes = cipher
            .decrypt(nonce, Payload { msg: ciphertext, aad: &aad })
            .map_err(|_| Error::Encryption("decryption failed (wrong key or tampered data)".to_string()))?;
        String::from_utf8(plaintext_bytes).map_err(|e| Error::Encryption(e.to_string()))
    }
}
