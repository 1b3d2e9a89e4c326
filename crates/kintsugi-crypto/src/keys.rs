//! Passphrase key derivation
//!
//! The key is SHA-256 of the passphrase, with no salt. The same passphrase
//! yields the same key in every session, so nothing but the passphrase has
//! to be remembered between runs. Key material is scrubbed from memory on drop.

use ring::digest::{digest, SHA256};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use tracing::debug;
use zeroize::Zeroizing;

use crate::cipher::KEY_SIZE;

/// Passphrase used when none has been configured.
pub const DEFAULT_PASSPHRASE: &str = "kintsugi-reader";

/// A derived 256-bit symmetric key. Lives in process memory only.
#[derive(Clone)]
pub struct KeyMaterial(Zeroizing<[u8; KEY_SIZE]>);

impl KeyMaterial {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}

impl PartialEq for KeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        ring::constant_time::verify_slices_are_equal(self.as_bytes(), other.as_bytes()).is_ok()
    }
}

impl Eq for KeyMaterial {}

/// Resolve user input to the passphrase actually used. Empty means default.
pub fn effective_passphrase(input: &str) -> &str {
    if input.is_empty() {
        DEFAULT_PASSPHRASE
    } else {
        input
    }
}

/// Derive key material from a passphrase. Pure and deterministic.
pub fn derive_key(passphrase: &str) -> KeyMaterial {
    let hash = digest(&SHA256, effective_passphrase(passphrase).as_bytes());
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(hash.as_ref());
    KeyMaterial(key)
}

/// Holds the session's passphrase and the key derived from it.
pub struct KeyManager {
    passphrase: SecretString,
    key: KeyMaterial,
}

impl KeyManager {
    pub fn new(passphrase: &str) -> Self {
        let passphrase = effective_passphrase(passphrase);
        Self {
            passphrase: SecretString::new(passphrase.to_string()),
            key: derive_key(passphrase),
        }
    }

    pub fn passphrase(&self) -> &str {
        self.passphrase.expose_secret()
    }

    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    /// Switch to a new passphrase, dropping the old key.
    ///
    /// Returns the new key. Re-deriving the current passphrase is skipped.
    pub fn rekey(&mut self, passphrase: &str) -> &KeyMaterial {
        let passphrase = effective_passphrase(passphrase);
        if passphrase != self.passphrase() {
            debug!("Deriving key for new passphrase");
            self.key = derive_key(passphrase);
            self.passphrase = SecretString::new(passphrase.to_string());
        }
        &self.key
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new(DEFAULT_PASSPHRASE)
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager").finish_non_exhaustive()
    }
}
