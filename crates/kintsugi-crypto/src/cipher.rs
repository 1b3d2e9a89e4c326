//! ChaCha20-Poly1305 record encryption
//!
//! Every record carries its own random 96-bit nonce next to the
//! ciphertext, so it can be opened with nothing but the key.
//! A nonce is never reused: each call to [`encrypt`] draws a new one.

use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// 256-bit key (32 bytes)
pub const KEY_SIZE: usize = 32;
/// 96-bit nonce (12 bytes)
pub const NONCE_SIZE: usize = 12;
/// Poly1305 tag appended to every ciphertext
pub const TAG_SIZE: usize = 16;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed - data may be corrupted or tampered")]
    DecryptionFailed,

    #[error("Invalid key size: expected {KEY_SIZE}, got {0}")]
    InvalidKeySize(usize),

    #[error("Invalid nonce size: expected {NONCE_SIZE}, got {0}")]
    InvalidNonceSize(usize),
}

/// An encrypted payload as it sits in storage.
///
/// `data` is the ciphertext with the authentication tag appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    pub iv: Vec<u8>,
    pub data: Vec<u8>,
}

/// Generate a cryptographically secure random nonce
pub fn generate_iv() -> [u8; NONCE_SIZE] {
    let mut iv = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut iv);
    iv
}

fn cipher_for(key: &[u8]) -> Result<ChaCha20Poly1305, CipherError> {
    if key.len() != KEY_SIZE {
        return Err(CipherError::InvalidKeySize(key.len()));
    }
    ChaCha20Poly1305::new_from_slice(key).map_err(|_| CipherError::InvalidKeySize(key.len()))
}

/// Encrypt plaintext under `key` with a fresh nonce.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<EncryptedRecord, CipherError> {
    let cipher = cipher_for(key)?;
    let iv = generate_iv();

    let data = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CipherError::EncryptionFailed)?;

    Ok(EncryptedRecord {
        iv: iv.to_vec(),
        data,
    })
}

/// Decrypt a record produced by [`encrypt`].
///
/// A wrong key, a flipped bit anywhere in `iv` or `data`, or a truncated
/// record all surface as [`CipherError::DecryptionFailed`].
pub fn decrypt(key: &[u8], record: &EncryptedRecord) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    let cipher = cipher_for(key)?;

    if record.iv.len() != NONCE_SIZE {
        return Err(CipherError::InvalidNonceSize(record.iv.len()));
    }
    if record.data.len() < TAG_SIZE {
        return Err(CipherError::DecryptionFailed);
    }

    let plaintext = cipher
        .decrypt(Nonce::from_slice(&record.iv), record.data.as_slice())
        .map_err(|_| CipherError::DecryptionFailed)?;

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        key
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = random_key();
        let plaintext = br#"{"pages":[{"title":"Bowl","body":["gold seams"]}]}"#;

        let record = encrypt(&key, plaintext).unwrap();

        assert_eq!(record.iv.len(), NONCE_SIZE);
        assert_eq!(record.data.len(), plaintext.len() + TAG_SIZE);
        assert_ne!(&record.data[..plaintext.len()], plaintext.as_slice());

        let decrypted = decrypt(&key, &record).unwrap();
        assert_eq!(decrypted.as_slice(), plaintext);
    }

    #[test]
    fn test_same_plaintext_gets_fresh_iv() {
        let key = random_key();
        let first = encrypt(&key, b"same").unwrap();
        let second = encrypt(&key, b"same").unwrap();

        assert_ne!(first.iv, second.iv);
        assert_ne!(first, second);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = random_key();
        let mut record = encrypt(&key, b"secret data").unwrap();

        record.data[0] ^= 0x01;

        assert!(matches!(
            decrypt(&key, &record),
            Err(CipherError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampered_iv_fails() {
        let key = random_key();
        let mut record = encrypt(&key, b"secret data").unwrap();

        record.iv[NONCE_SIZE - 1] ^= 0x80;

        assert!(decrypt(&key, &record).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let record = encrypt(&random_key(), b"secret data").unwrap();
        assert!(decrypt(&random_key(), &record).is_err());
    }

    #[test]
    fn test_bad_sizes_rejected() {
        let key = random_key();
        assert!(matches!(
            encrypt(&key[..16], b"x"),
            Err(CipherError::InvalidKeySize(16))
        ));

        let record = EncryptedRecord {
            iv: vec![0u8; 8],
            data: vec![0u8; 32],
        };
        assert!(matches!(
            decrypt(&key, &record),
            Err(CipherError::InvalidNonceSize(8))
        ));

        let truncated = EncryptedRecord {
            iv: vec![0u8; NONCE_SIZE],
            data: vec![0u8; 4],
        };
        assert!(matches!(
            decrypt(&key, &truncated),
            Err(CipherError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_record_json_shape() {
        let record = EncryptedRecord {
            iv: vec![1, 2],
            data: vec![3],
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"iv":[1,2],"data":[3]}"#);
    }
}
