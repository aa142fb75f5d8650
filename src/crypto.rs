//! Envelope encryption for sensitive data at rest (TOTP secrets).
//!
//! Uses HKDF to derive per-entity data encryption keys (DEKs) from a master key,
//! then encrypts data with AES-256-GCM.
//!
//! Format of encrypted data: MAGIC (4 bytes) || nonce (12 bytes) || ciphertext

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hkdf::Hkdf;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

/// Nonce size for AES-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// Master key size (256 bits for AES-256)
const MASTER_KEY_SIZE: usize = 32;

/// Magic bytes to identify encrypted data
const ENCRYPTED_MAGIC: &[u8] = b"ENC1";

/// Holds the master encryption key for envelope encryption.
/// The master key is used to derive per-entity DEKs via HKDF.
#[derive(Clone)]
pub struct MasterKey {
    key: [u8; MASTER_KEY_SIZE],
}

impl MasterKey {
    /// Create a MasterKey from a base64-encoded string.
    /// The decoded key must be exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|e| AppError::Internal(format!("Invalid master key encoding: {}", e)))?;

        if decoded.len() != MASTER_KEY_SIZE {
            return Err(AppError::Internal(format!(
                "Master key must be {} bytes, got {}",
                MASTER_KEY_SIZE,
                decoded.len()
            )));
        }

        let mut key = [0u8; MASTER_KEY_SIZE];
        key.copy_from_slice(&decoded);
        Ok(Self { key })
    }

    /// Generate a new random master key (for initial setup).
    /// Returns the key as a base64-encoded string.
    pub fn generate() -> String {
        use rand::RngCore;
        use rand::rngs::OsRng;
        let mut key = [0u8; MASTER_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }

    /// Derive a per-entity data encryption key using HKDF.
    /// Using the entity id as the info parameter gives each entity a unique DEK.
    fn derive_dek(&self, entity_id: &str) -> [u8; 32] {
        let hk = Hkdf::<Sha256>::new(Some(b"kursadmin-v1"), &self.key);
        let mut dek = [0u8; 32];
        hk.expand(entity_id.as_bytes(), &mut dek)
            .expect("HKDF expand should not fail with valid length");
        dek
    }

    /// Encrypt a secret for storage.
    /// Returns: MAGIC (4 bytes) || nonce (12 bytes) || ciphertext
    pub fn encrypt_secret(&self, entity_id: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        use rand::RngCore;
        use rand::rngs::OsRng;

        let dek = self.derive_dek(entity_id);
        let cipher = Aes256Gcm::new_from_slice(&dek)
            .map_err(|e| AppError::Internal(format!("Failed to create cipher: {}", e)))?;

        // Generate random nonce using OS entropy
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| AppError::Internal(format!("Encryption failed: {}", e)))?;

        // Combine: magic || nonce || ciphertext
        let mut result = Vec::with_capacity(ENCRYPTED_MAGIC.len() + NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(ENCRYPTED_MAGIC);
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// Decrypt a secret from storage.
    /// Accepts: MAGIC (4 bytes) || nonce (12 bytes) || ciphertext
    pub fn decrypt_secret(&self, entity_id: &str, encrypted: &[u8]) -> Result<Vec<u8>> {
        if encrypted.len() < ENCRYPTED_MAGIC.len() + NONCE_SIZE + 1 {
            return Err(AppError::Internal("Encrypted data too short".into()));
        }

        if &encrypted[..ENCRYPTED_MAGIC.len()] != ENCRYPTED_MAGIC {
            return Err(AppError::Internal(
                "Invalid encrypted data format (missing magic bytes)".into(),
            ));
        }

        let dek = self.derive_dek(entity_id);
        let cipher = Aes256Gcm::new_from_slice(&dek)
            .map_err(|e| AppError::Internal(format!("Failed to create cipher: {}", e)))?;

        let nonce_start = ENCRYPTED_MAGIC.len();
        let nonce_end = nonce_start + NONCE_SIZE;
        let nonce = Nonce::from_slice(&encrypted[nonce_start..nonce_end]);
        let ciphertext = &encrypted[nonce_end..];

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| AppError::Internal(format!("Decryption failed: {}", e)))?;

        Ok(plaintext)
    }
}

/// Hash a secret for database lookups (admin API keys, validation tokens).
/// Uses SHA-256 with application salt, returns lowercase hex string.
pub fn hash_secret(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"kursadmin-v1:");
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
