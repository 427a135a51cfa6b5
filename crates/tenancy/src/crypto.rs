//! AES-256-GCM encryption for integration credentials at rest (spec §3
//! "opaque encrypted blobs"). One random nonce per encryption, stored
//! alongside the ciphertext rather than derived, since nothing here needs
//! the nonce to be deterministic or short.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{Result, TenancyError};

/// A credential ciphertext plus the nonce it was sealed with, both
/// base64-encoded for storage in a TEXT column.
#[derive(Debug, Clone)]
pub struct EncryptedCredential {
    pub ciphertext_b64: String,
    pub nonce_b64: String,
}

fn cipher(key_hex: &str) -> Result<Aes256Gcm> {
    let key_bytes = hex::decode(key_hex)
        .map_err(|e| TenancyError::CredentialEncryption(format!("invalid encryption key: {e}")))?;
    Aes256Gcm::new_from_slice(&key_bytes)
        .map_err(|_| TenancyError::CredentialEncryption("encryption key must be 32 bytes".to_string()))
}

pub fn encrypt_credential(key_hex: &str, plaintext: &str) -> Result<EncryptedCredential> {
    let cipher = cipher(key_hex)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| TenancyError::CredentialEncryption(e.to_string()))?;
    Ok(EncryptedCredential {
        ciphertext_b64: STANDARD.encode(ciphertext),
        nonce_b64: STANDARD.encode(nonce),
    })
}

pub fn decrypt_credential(key_hex: &str, enc: &EncryptedCredential) -> Result<String> {
    let cipher = cipher(key_hex)?;
    let nonce_bytes = STANDARD
        .decode(&enc.nonce_b64)
        .map_err(|e| TenancyError::CredentialEncryption(format!("invalid stored nonce: {e}")))?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = STANDARD
        .decode(&enc.ciphertext_b64)
        .map_err(|e| TenancyError::CredentialEncryption(format!("invalid stored ciphertext: {e}")))?;
    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|e| TenancyError::CredentialEncryption(e.to_string()))?;
    String::from_utf8(plaintext).map_err(|e| TenancyError::CredentialEncryption(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_credential() {
        let key = "11".repeat(32);
        let enc = encrypt_credential(&key, "sk-live-abc123").unwrap();
        let dec = decrypt_credential(&key, &enc).unwrap();
        assert_eq!(dec, "sk-live-abc123");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let key_a = "11".repeat(32);
        let key_b = "22".repeat(32);
        let enc = encrypt_credential(&key_a, "sk-live-abc123").unwrap();
        assert!(decrypt_credential(&key_b, &enc).is_err());
    }

    #[test]
    fn rejects_malformed_key() {
        assert!(encrypt_credential("not-hex", "value").is_err());
    }
}
