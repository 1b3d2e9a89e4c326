//! Kintsugi Core - reader state and session logic
//!
//! The reader owns one explicit state object. Encrypted persistence and
//! the offline agent are injected, so each can be tested on its own.

pub mod bookmarks;
pub mod config;
pub mod document;
pub mod history;
pub mod reader;
pub mod state;
pub mod zoom;

pub use bookmarks::{Bookmark, Bookmarks};
pub use config::ReaderConfig;
pub use document::{
    AgentDocumentSource, Document, DocumentSource, FileDocumentSource, HttpDocumentSource, Page,
    PageImage,
};
pub use history::{History, HistoryEntry, HISTORY_LIMIT};
pub use reader::Reader;
pub use state::{Notice, OfflineStatus, ReaderState};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("Storage error: {0}")]
    Store(#[from] kintsugi_store::StoreError),

    #[error("Document fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Offline agent error: {0}")]
    Agent(#[from] kintsugi_agent::AgentError),

    #[error("Document source unreachable: {0}")]
    Unreachable(String),

    #[error("Document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Document has no pages")]
    EmptyDocument,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ReaderError>;
