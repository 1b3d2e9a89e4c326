//! Encrypted record store
//!
//! Values are serialized to JSON, encrypted under the active key with a
//! fresh nonce, and written to the backing store as `{iv, data}` JSON.
//!
//! Loading never fails on a bad record. Whatever went wrong (wrong key,
//! tampering, truncation, garbage) the record is deleted and the caller's
//! fallback comes back. The store does not remember which key wrote which
//! record; after a key change the caller must re-persist everything.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use kintsugi_crypto::{cipher, EncryptedRecord, KeyMaterial};

use crate::backing::KeyValueStore;
use crate::Result;

pub struct EncryptedStore<S> {
    backing: S,
    key: KeyMaterial,
}

impl<S: KeyValueStore> EncryptedStore<S> {
    pub fn new(backing: S, key: KeyMaterial) -> Self {
        Self { backing, key }
    }

    /// Make `key` the active key. Existing records are left as they are.
    pub fn set_key(&mut self, key: KeyMaterial) {
        self.key = key;
    }

    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    pub fn backing(&self) -> &S {
        &self.backing
    }

    pub fn into_backing(self) -> S {
        self.backing
    }

    /// Encrypt `value` and write it under `logical_key`, overwriting.
    pub fn persist<T: Serialize + ?Sized>(&self, logical_key: &str, value: &T) -> Result<()> {
        let plaintext = serde_json::to_vec(value)?;
        let record = cipher::encrypt(self.key.as_bytes(), &plaintext)?;
        self.backing
            .set(logical_key, &serde_json::to_string(&record)?)?;
        debug!(key = logical_key, bytes = plaintext.len(), "Persisted encrypted record");
        Ok(())
    }

    /// Read and decrypt `logical_key`, or return `fallback`.
    ///
    /// An unreadable record is removed from the backing store.
    pub fn load<T: DeserializeOwned>(&self, logical_key: &str, fallback: T) -> T {
        let raw = match self.backing.get(logical_key) {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => return fallback,
            Err(e) => {
                warn!(key = logical_key, error = %e, "Backing store read failed");
                return fallback;
            }
        };

        match self.open(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = logical_key, error = %e, "Decrypt failed, clearing payload");
                if let Err(e) = self.backing.remove(logical_key) {
                    warn!(key = logical_key, error = %e, "Could not clear unreadable record");
                }
                fallback
            }
        }
    }

    fn open<T: DeserializeOwned>(&self, raw: &str) -> Result<T> {
        let record: EncryptedRecord = serde_json::from_str(raw)?;
        let plaintext = cipher::decrypt(self.key.as_bytes(), &record)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Read an unencrypted value.
    pub fn get_plain(&self, key: &str) -> Result<Option<String>> {
        self.backing.get(key)
    }

    /// Write an unencrypted value.
    pub fn set_plain(&self, key: &str, value: &str) -> Result<()> {
        self.backing.set(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::MemoryStore;
    use crate::storage_keys;
    use kintsugi_crypto::derive_key;
    use serde::Deserialize;
    use serde_json::{json, Value};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Mark {
        page: usize,
        at: i64,
    }

    fn store(pass: &str) -> EncryptedStore<MemoryStore> {
        EncryptedStore::new(MemoryStore::new(), derive_key(pass))
    }

    #[test]
    fn test_round_trip() {
        let store = store("kintsugi-reader");
        let marks = vec![Mark { page: 3, at: 1_700_000_000_000 }];

        store.persist(storage_keys::BOOKMARKS, &marks).unwrap();

        let loaded: Vec<Mark> = store.load(storage_keys::BOOKMARKS, Vec::new());
        assert_eq!(loaded, marks);

        let nested = json!({"pages": [{"title": "I", "body": ["a", "b"]}], "n": null});
        store.persist(storage_keys::BOOK, &nested).unwrap();
        assert_eq!(store.load(storage_keys::BOOK, Value::Null), nested);
    }

    #[test]
    fn test_absent_returns_fallback() {
        let store = store("kintsugi-reader");
        let loaded: Vec<Mark> = store.load(storage_keys::HISTORY, vec![]);
        assert!(loaded.is_empty());

        store.backing().set(storage_keys::HISTORY, "").unwrap();
        let loaded: Option<Value> = store.load(storage_keys::HISTORY, None);
        assert!(loaded.is_none());
    }

    #[test]
    fn test_record_is_not_plaintext() {
        let store = store("kintsugi-reader");
        store.persist(storage_keys::BOOK, "golden joinery").unwrap();

        let raw = store.backing().get(storage_keys::BOOK).unwrap().unwrap();
        assert!(!raw.contains("golden"));

        let record: EncryptedRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.iv.len(), 12);
    }

    #[test]
    fn test_same_value_twice_differs() {
        let store = store("kintsugi-reader");

        store.persist(storage_keys::HISTORY, &[1, 2, 3]).unwrap();
        let first = store.backing().get(storage_keys::HISTORY).unwrap();
        store.persist(storage_keys::HISTORY, &[1, 2, 3]).unwrap();
        let second = store.backing().get(storage_keys::HISTORY).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_tampered_record_is_discarded() {
        let store = store("kintsugi-reader");
        store.persist(storage_keys::BOOKMARKS, &[Mark { page: 1, at: 0 }]).unwrap();

        let raw = store.backing().get(storage_keys::BOOKMARKS).unwrap().unwrap();
        let mut record: EncryptedRecord = serde_json::from_str(&raw).unwrap();
        record.data[0] ^= 0x04;
        store
            .backing()
            .set(storage_keys::BOOKMARKS, &serde_json::to_string(&record).unwrap())
            .unwrap();

        let loaded: Vec<Mark> = store.load(storage_keys::BOOKMARKS, Vec::new());
        assert!(loaded.is_empty());
        assert!(store.backing().get(storage_keys::BOOKMARKS).unwrap().is_none());
    }

    #[test]
    fn test_every_bit_flip_is_caught() {
        let store = store("kintsugi-reader");
        store.persist(storage_keys::HISTORY, "x").unwrap();
        let raw = store.backing().get(storage_keys::HISTORY).unwrap().unwrap();
        let record: EncryptedRecord = serde_json::from_str(&raw).unwrap();

        for byte in 0..record.data.len() {
            for bit in 0..8 {
                let mut bad = record.clone();
                bad.data[byte] ^= 1 << bit;
                store
                    .backing()
                    .set(storage_keys::HISTORY, &serde_json::to_string(&bad).unwrap())
                    .unwrap();

                let loaded: Option<String> = store.load(storage_keys::HISTORY, None);
                assert!(loaded.is_none());
                assert!(store.backing().get(storage_keys::HISTORY).unwrap().is_none());
            }
        }
    }

    #[test]
    fn test_garbage_record_is_discarded() {
        let store = store("kintsugi-reader");
        store.backing().set(storage_keys::BOOK, "not json at all").unwrap();

        let loaded: Option<Value> = store.load(storage_keys::BOOK, None);

        assert!(loaded.is_none());
        assert!(store.backing().get(storage_keys::BOOK).unwrap().is_none());
    }

    #[test]
    fn test_wrong_shape_is_discarded() {
        let store = store("kintsugi-reader");
        store.persist(storage_keys::BOOKMARKS, "not a list").unwrap();

        let loaded: Vec<Mark> = store.load(storage_keys::BOOKMARKS, Vec::new());

        assert!(loaded.is_empty());
        assert!(store.backing().get(storage_keys::BOOKMARKS).unwrap().is_none());
    }

    #[test]
    fn test_key_switch_without_repersist_degrades() {
        let mut store = store("key-a");
        store.persist(storage_keys::HISTORY, &[5, 4]).unwrap();

        store.set_key(derive_key("key-b"));

        let loaded: Vec<u32> = store.load(storage_keys::HISTORY, Vec::new());
        assert!(loaded.is_empty());
        assert!(store.backing().get(storage_keys::HISTORY).unwrap().is_none());
    }

    #[test]
    fn test_key_switch_with_repersist_keeps_data() {
        let mut store = store("key-a");
        store.persist(storage_keys::HISTORY, &[5, 4]).unwrap();
        let history: Vec<u32> = store.load(storage_keys::HISTORY, Vec::new());

        store.set_key(derive_key("key-b"));
        store.persist(storage_keys::HISTORY, &history).unwrap();

        let reopened = EncryptedStore::new(store.into_backing(), derive_key("key-b"));
        let loaded: Vec<u32> = reopened.load(storage_keys::HISTORY, Vec::new());
        assert_eq!(loaded, vec![5, 4]);
    }

    #[test]
    fn test_plain_values_bypass_encryption() {
        let store = store("kintsugi-reader");
        store.set_plain(storage_keys::PASSPHRASE, "gold-seam").unwrap();

        assert_eq!(
            store.get_plain(storage_keys::PASSPHRASE).unwrap().as_deref(),
            Some("gold-seam")
        );
    }
}
