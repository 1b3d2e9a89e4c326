//! Kintsugi Crypto - passphrase keys and record encryption
//!
//! This crate provides:
//! - SHA-256 passphrase key derivation
//! - ChaCha20-Poly1305 record encryption with per-record nonces
//! - Session key management with zeroized key material

pub mod cipher;
pub mod keys;

pub use cipher::{decrypt, encrypt, CipherError, EncryptedRecord};
pub use keys::{derive_key, KeyManager, KeyMaterial, DEFAULT_PASSPHRASE};
