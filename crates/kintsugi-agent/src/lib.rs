//! Kintsugi Agent - background offline cache
//!
//! A long-lived agent with its own lifecycle, separate from the reader:
//! - installs a versioned snapshot of the reader's assets
//! - garbage-collects older snapshots on activation
//! - answers GET requests cache-first, network second
//! - refreshes the snapshot when a client asks, then tells every client
//! - keeps the snapshot on disk so the next agent starts where this one left off

pub mod agent;
pub mod cache;
pub mod channel;
pub mod http;
pub mod intercept;
pub mod manifest;
pub mod network;
pub mod snapshot;

pub use agent::{AgentConfig, AgentState, CacheAgent};
pub use cache::{Cache, CacheStorage};
pub use channel::{AgentClient, AgentHandle, AgentMessage, ClientMessage, Controller};
pub use http::{Request, Response};
pub use intercept::{intercept, Interception};
pub use manifest::{CACHE_NAME, OFFLINE_ASSETS, ROOT_DOCUMENT};
pub use network::{HttpNetwork, Network, NetworkError};
pub use snapshot::SnapshotStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Network error for {url}: {source}")]
    Network { url: String, source: NetworkError },

    #[error("Asset {url} returned status {status}")]
    AssetStatus { url: String, status: u16 },

    #[error("Invalid asset path {path}: {reason}")]
    InvalidAsset { path: String, reason: String },

    #[error("Not allowed while agent is {0:?}")]
    InvalidState(AgentState),

    #[error("Agent is not running")]
    Stopped,

    #[error("Agent is busy")]
    Busy,

    #[error("Snapshot database error: {0}")]
    Snapshot(#[from] rusqlite::Error),

    #[error("Snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
