//! Cache agent lifecycle
//!
//! `Installing -> Activating -> Active`. A failed install ends in
//! `Redundant` and leaves every existing cache as it was. Once active the
//! agent answers fetches cache-first and refreshes its snapshot on request.
//!
//! A persistent agent writes every cache change through to its
//! [`SnapshotStore`]. An agent whose version is already installed there
//! resumes as active without refetching anything.

use reqwest::Url;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::CacheStorage;
use crate::channel::{AgentMessage, ClientMessage};
use crate::http::{Request, Response};
use crate::intercept::{intercept, Interception};
use crate::manifest::{self, CACHE_NAME, OFFLINE_ASSETS, ROOT_DOCUMENT};
use crate::network::Network;
use crate::snapshot::SnapshotStore;
use crate::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Installing,
    Activating,
    Active,
    /// Install failed; this agent will never control anything
    Redundant,
}

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Current snapshot name. Every other cache is stale.
    pub cache_name: String,
    /// Base URL the manifest paths resolve against
    pub scope: Url,
    pub assets: Vec<String>,
}

impl AgentConfig {
    pub fn new(scope: Url) -> Self {
        Self {
            cache_name: CACHE_NAME.to_string(),
            scope,
            assets: OFFLINE_ASSETS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

pub struct CacheAgent {
    config: AgentConfig,
    caches: CacheStorage,
    network: Arc<dyn Network>,
    snapshot: Option<SnapshotStore>,
    state: AgentState,
}

impl CacheAgent {
    pub fn new(config: AgentConfig, network: Arc<dyn Network>) -> Self {
        Self::with_caches(config, CacheStorage::new(), network)
    }

    /// Start from caches left behind by an earlier deployment.
    pub fn with_caches(config: AgentConfig, caches: CacheStorage, network: Arc<dyn Network>) -> Self {
        Self {
            config,
            caches,
            network,
            snapshot: None,
            state: AgentState::Installing,
        }
    }

    /// Start from the on-disk snapshot and keep it up to date.
    pub fn persistent(
        config: AgentConfig,
        snapshot: SnapshotStore,
        network: Arc<dyn Network>,
    ) -> Result<Self, AgentError> {
        let caches = snapshot.load()?;
        let mut agent = Self::with_caches(config, caches, network);
        if agent.caches.has(&agent.config.cache_name) {
            agent.state = AgentState::Active;
            info!(cache = %agent.config.cache_name, "Resuming installed snapshot");
        }
        agent.snapshot = Some(snapshot);
        Ok(agent)
    }

    /// Whether installing this agent replaces an older snapshot.
    pub fn is_update(&self) -> bool {
        self.state == AgentState::Installing
            && self
                .caches
                .keys()
                .iter()
                .any(|name| *name != self.config.cache_name)
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn caches(&self) -> &CacheStorage {
        &self.caches
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Populate the snapshot. All assets or nothing.
    pub async fn install(&mut self) -> Result<(), AgentError> {
        self.state = AgentState::Installing;
        let installed = match self.fetch_manifest().await {
            Ok(entries) => self.store(entries),
            Err(e) => Err(e),
        };
        match installed {
            Ok(()) => {
                self.state = AgentState::Activating;
                info!(cache = %self.config.cache_name, "Offline snapshot installed");
                Ok(())
            }
            Err(e) => {
                self.state = AgentState::Redundant;
                warn!(error = %e, "Install failed, keeping previous caches");
                Err(e)
            }
        }
    }

    /// Drop every stale snapshot and take control. Returns deleted names.
    pub fn activate(&mut self) -> Result<Vec<String>, AgentError> {
        if self.state != AgentState::Activating {
            return Err(AgentError::InvalidState(self.state));
        }

        let stale: Vec<String> = self
            .caches
            .keys()
            .into_iter()
            .filter(|name| *name != self.config.cache_name)
            .collect();
        for name in &stale {
            self.caches.delete(name);
            if let Some(snapshot) = &self.snapshot {
                if let Err(e) = snapshot.delete(name) {
                    warn!(cache = %name, error = %e, "Could not delete stale cache from snapshot");
                }
            }
            debug!(cache = %name, "Deleted stale cache");
        }

        self.state = AgentState::Active;
        info!(deleted = stale.len(), "Agent active");
        Ok(stale)
    }

    /// Answer an intercepted request.
    ///
    /// Anything arriving before activation passes straight through.
    pub async fn handle_fetch(&mut self, request: &Request) -> Interception {
        if self.state != AgentState::Active {
            return Interception::Passthrough;
        }

        let root = match manifest::resolve(&self.config.scope, ROOT_DOCUMENT) {
            Ok(url) => Request::get(url),
            Err(e) => {
                warn!(error = %e, "Root document path does not resolve");
                return Interception::Passthrough;
            }
        };

        let network = Arc::clone(&self.network);
        let caches = &self.caches;
        let outcome = intercept(
            request,
            &root,
            |r| caches.match_request(r),
            |r| async move { network.fetch(&r).await },
        )
        .await;

        match &outcome {
            Interception::Fetched(response) => {
                if let Some(snapshot) = &self.snapshot {
                    let entry = [(request.clone(), response.clone())];
                    if let Err(e) = snapshot.write(&self.config.cache_name, &entry) {
                        warn!(url = %request.url, error = %e, "Could not write response to snapshot");
                    }
                }
                self.caches
                    .open(&self.config.cache_name)
                    .put(request, response.clone());
                debug!(url = %request.url, "Cached network response");
            }
            Interception::Fallback(_) => {
                debug!(url = %request.url, "Network failed, serving root document");
            }
            Interception::Offline(e) => {
                warn!(url = %request.url, error = %e, "Network failed with nothing cached");
            }
            Interception::Cached(_) | Interception::Passthrough => {}
        }

        outcome
    }

    /// Resolve a request fully, going to the network for passthroughs.
    pub async fn respond(&mut self, request: &Request) -> Result<Response, AgentError> {
        match self.handle_fetch(request).await {
            Interception::Passthrough => self
                .network
                .fetch(request)
                .await
                .map_err(|source| AgentError::Network {
                    url: request.url.to_string(),
                    source,
                }),
            Interception::Offline(source) => Err(AgentError::Network {
                url: request.url.to_string(),
                source,
            }),
            Interception::Cached(r) | Interception::Fetched(r) | Interception::Fallback(r) => Ok(r),
        }
    }

    /// Handle a message from a client.
    ///
    /// Returns the notification to broadcast to every client, if any.
    pub async fn handle_message(&mut self, message: ClientMessage) -> Option<AgentMessage> {
        match message {
            ClientMessage::CacheNow => match self.refresh().await {
                Ok(()) => Some(AgentMessage::CacheDone),
                Err(e) => {
                    warn!(error = %e, "Cache refresh failed");
                    None
                }
            },
        }
    }

    /// Re-fetch the whole manifest, overwriting existing entries.
    pub async fn refresh(&mut self) -> Result<(), AgentError> {
        let entries = self.fetch_manifest().await?;
        let count = entries.len();
        self.store(entries)?;
        info!(cache = %self.config.cache_name, assets = count, "Offline snapshot refreshed");
        Ok(())
    }

    async fn fetch_manifest(&self) -> Result<Vec<(Request, Response)>, AgentError> {
        let requests = manifest::requests(&self.config.scope, &self.config.assets)?;
        let mut entries = Vec::with_capacity(requests.len());

        for request in requests {
            let response =
                self.network
                    .fetch(&request)
                    .await
                    .map_err(|source| AgentError::Network {
                        url: request.url.to_string(),
                        source,
                    })?;
            if !response.ok() {
                return Err(AgentError::AssetStatus {
                    url: request.url.to_string(),
                    status: response.status,
                });
            }
            entries.push((request, response));
        }

        Ok(entries)
    }

    /// Snapshot first, then memory, so a failed write changes nothing.
    fn store(&mut self, entries: Vec<(Request, Response)>) -> Result<(), AgentError> {
        if let Some(snapshot) = &self.snapshot {
            snapshot.write(&self.config.cache_name, &entries)?;
        }
        let cache = self.caches.open(&self.config.cache_name);
        for (request, response) in entries {
            cache.put(&request, response);
        }
        Ok(())
    }
}
