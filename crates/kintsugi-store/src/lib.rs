//! Kintsugi Store - encrypted local persistence
//!
//! Reader state is encrypted before it reaches the backing store.
//! Anyone reading the database gets `{iv, data}` blobs and nothing else.

pub mod backing;
pub mod encrypted;
pub mod sqlite;

pub use backing::{KeyValueStore, MemoryStore};
pub use encrypted::EncryptedStore;
pub use sqlite::SqliteStore;

/// Logical keys of the records the reader persists.
pub mod storage_keys {
    /// Cached document (encrypted)
    pub const BOOK: &str = "kr.book";
    /// Bookmark list (encrypted)
    pub const BOOKMARKS: &str = "kr.bookmarks";
    /// History list (encrypted)
    pub const HISTORY: &str = "kr.history";
    /// Current passphrase, stored in the clear
    pub const PASSPHRASE: &str = "kr.passphrase";

    /// Every record that has to be re-encrypted on a key change.
    pub const ENCRYPTED: [&str; 3] = [BOOK, BOOKMARKS, HISTORY];
}

/// Errors from store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Encryption error: {0}")]
    Encryption(#[from] kintsugi_crypto::CipherError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backing store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
