//! Reader session
//!
//! One [`Reader`] per foreground context. It owns the state, the session
//! key and the encrypted store. The offline agent is attached separately
//! and may never show up.

use chrono::Utc;
use tracing::{debug, info, warn};

use kintsugi_agent::{AgentClient, AgentMessage, AgentState, ClientMessage};
use kintsugi_crypto::keys::effective_passphrase;
use kintsugi_crypto::{KeyManager, DEFAULT_PASSPHRASE};
use kintsugi_store::{storage_keys, EncryptedStore, KeyValueStore};

use crate::bookmarks::Bookmarks;
use crate::document::{Document, DocumentSource, Page};
use crate::history::History;
use crate::state::{Notice, OfflineStatus, ReaderState};
use crate::zoom::{self, Pinch, DEFAULT_SCALE, ZOOM_STEP};
use crate::Result;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn agent_status(client: &AgentClient) -> OfflineStatus {
    match client.state() {
        AgentState::Installing | AgentState::Activating => OfflineStatus::Checking,
        AgentState::Active => OfflineStatus::Ready,
        AgentState::Redundant => OfflineStatus::Disabled,
    }
}

pub struct Reader<S> {
    state: ReaderState,
    keys: KeyManager,
    store: EncryptedStore<S>,
    agent: Option<AgentClient>,
}

impl<S: KeyValueStore> Reader<S> {
    /// Start a session on the first page.
    ///
    /// The document comes from the encrypted cache when it decrypts, and
    /// from `source` otherwise. Only a cold start without a reachable
    /// source fails.
    pub async fn boot(backing: S, source: &dyn DocumentSource) -> Result<Self> {
        Self::start(backing, source, false).await
    }

    /// Start a session on the most recently viewed page.
    pub async fn resume(backing: S, source: &dyn DocumentSource) -> Result<Self> {
        Self::start(backing, source, true).await
    }

    async fn start(backing: S, source: &dyn DocumentSource, resume: bool) -> Result<Self> {
        let passphrase = match backing.get(storage_keys::PASSPHRASE) {
            Ok(Some(saved)) if !saved.is_empty() => saved,
            Ok(_) => DEFAULT_PASSPHRASE.to_string(),
            Err(e) => {
                warn!(error = %e, "Could not read saved passphrase, using default");
                DEFAULT_PASSPHRASE.to_string()
            }
        };
        let keys = KeyManager::new(&passphrase);
        let store = EncryptedStore::new(backing, keys.key().clone());

        let mut reader = Self {
            state: ReaderState::default(),
            keys,
            store,
            agent: None,
        };

        let document = reader.load_document(source).await?;
        let last_page = document.len() - 1;
        reader.state.document = Some(document);
        reader.state.bookmarks = reader.store.load(storage_keys::BOOKMARKS, Bookmarks::new());
        reader.state.history = reader.store.load(storage_keys::HISTORY, History::new());

        if resume {
            if let Some(last) = reader.state.history.latest() {
                reader.state.current_page = last.page.min(last_page);
            }
        }
        reader.record_visit();

        info!(
            pages = reader.state.page_count(),
            page = reader.state.current_page,
            bookmarks = reader.state.bookmarks.len(),
            "Reader ready"
        );
        Ok(reader)
    }

    async fn load_document(&self, source: &dyn DocumentSource) -> Result<Document> {
        let cached: Option<Document> = self.store.load(storage_keys::BOOK, None);
        if let Some(document) = cached.filter(|d| !d.is_empty()) {
            debug!(pages = document.len(), "Using cached document");
            return Ok(document);
        }

        let document = source.fetch_document().await?.validated()?;
        self.store.persist(storage_keys::BOOK, &document)?;
        info!(pages = document.len(), "Cached fetched document");
        Ok(document)
    }

    fn record_visit(&mut self) {
        self.state.history.visit(self.state.current_page, now_ms());
        if let Err(e) = self.store.persist(storage_keys::HISTORY, &self.state.history) {
            warn!(error = %e, "Could not persist history");
        }
    }

    pub fn state(&self) -> &ReaderState {
        &self.state
    }

    pub fn current_page(&self) -> usize {
        self.state.current_page
    }

    pub fn page(&self) -> Option<&Page> {
        self.state.document.as_ref()?.page(self.state.current_page)
    }

    pub fn page_count(&self) -> usize {
        self.state.page_count()
    }

    pub fn progress_percent(&self) -> u32 {
        self.state.progress_percent()
    }

    pub fn passphrase(&self) -> &str {
        self.keys.passphrase()
    }

    pub fn backing(&self) -> &S {
        self.store.backing()
    }

    // ---- navigation ----

    /// Move to `target`, clamped to the document. Returns the page landed on.
    pub fn go_to_page(&mut self, target: usize) -> usize {
        let total = self.state.page_count();
        if total == 0 {
            return self.state.current_page;
        }
        self.state.current_page = target.min(total - 1);
        self.record_visit();
        self.state.current_page
    }

    pub fn next_page(&mut self) -> usize {
        self.go_to_page(self.state.current_page.saturating_add(1))
    }

    pub fn prev_page(&mut self) -> usize {
        self.go_to_page(self.state.current_page.saturating_sub(1))
    }

    // ---- bookmarks & history ----

    /// Bookmark the current page.
    pub fn add_bookmark(&mut self) -> Result<Notice> {
        let page = self.state.current_page;
        if !self.state.bookmarks.add(page, now_ms()) {
            return Ok(Notice::AlreadyBookmarked);
        }
        self.store.persist(storage_keys::BOOKMARKS, &self.state.bookmarks)?;
        debug!(page, "Bookmark saved");
        Ok(Notice::BookmarkSaved)
    }

    pub fn remove_bookmark(&mut self, page: usize) -> Result<bool> {
        if !self.state.bookmarks.remove(page) {
            return Ok(false);
        }
        self.store.persist(storage_keys::BOOKMARKS, &self.state.bookmarks)?;
        Ok(true)
    }

    pub fn clear_history(&mut self) -> Result<()> {
        self.state.history.clear();
        self.store.persist(storage_keys::HISTORY, &self.state.history)?;
        Ok(())
    }

    // ---- passphrase ----

    /// Switch to a new passphrase and re-encrypt every record under it.
    ///
    /// An empty input means the default passphrase. The passphrase itself
    /// is stored unencrypted so the next session can derive the key.
    pub fn apply_passphrase(&mut self, input: &str) -> Result<Notice> {
        let passphrase = effective_passphrase(input);
        let key = self.keys.rekey(passphrase).clone();
        self.store.set_key(key);
        self.store.set_plain(storage_keys::PASSPHRASE, passphrase)?;

        self.store.persist(storage_keys::BOOK, &self.state.document)?;
        self.store.persist(storage_keys::BOOKMARKS, &self.state.bookmarks)?;
        self.store.persist(storage_keys::HISTORY, &self.state.history)?;

        info!("Re-encrypted reader records under new key");
        Ok(Notice::KeyUpdated)
    }

    // ---- zoom ----

    pub fn scale(&self) -> f64 {
        self.state.scale
    }

    pub fn set_scale(&mut self, scale: f64) -> f64 {
        self.state.scale = zoom::clamp_scale(scale);
        self.state.scale
    }

    pub fn zoom_in(&mut self) -> f64 {
        self.set_scale(self.state.scale + ZOOM_STEP)
    }

    pub fn zoom_out(&mut self) -> f64 {
        self.set_scale(self.state.scale - ZOOM_STEP)
    }

    pub fn reset_zoom(&mut self) -> f64 {
        self.set_scale(DEFAULT_SCALE)
    }

    pub fn double_tap(&mut self) -> f64 {
        self.set_scale(zoom::double_tap_target(self.state.scale))
    }

    /// Begin a pinch at the current scale.
    pub fn pinch_start(&self, distance: f64) -> Option<Pinch> {
        Pinch::start(distance, self.state.scale)
    }

    pub fn pinch_move(&mut self, pinch: &Pinch, distance: f64) -> f64 {
        self.set_scale(pinch.scale_at(distance))
    }

    // ---- offline agent ----

    /// Connect this session to the offline agent.
    ///
    /// The status stays `Checking` while the agent is still installing.
    /// Returns [`Notice::UpdatingOffline`] when the agent is replacing an
    /// older snapshot.
    pub fn attach_agent(&mut self, client: AgentClient) -> Option<Notice> {
        self.state.offline = agent_status(&client);
        debug!(status = %self.state.offline, "Agent attached");
        let update = client.is_update();
        self.agent = Some(client);
        update.then_some(Notice::UpdatingOffline)
    }

    /// Catch the status up with the agent's lifecycle. A refresh in flight
    /// or finished is left alone.
    pub fn sync_offline_status(&mut self) -> OfflineStatus {
        if let Some(client) = &self.agent {
            if !matches!(self.state.offline, OfflineStatus::Caching | OfflineStatus::Cached) {
                self.state.offline = agent_status(client);
            }
        }
        self.state.offline
    }

    /// Ask the agent to refresh its snapshot.
    ///
    /// Returns a notice only when the request could not be sent. Completion
    /// arrives later through [`Reader::on_agent_message`].
    pub fn request_offline_cache(&mut self) -> Option<Notice> {
        self.sync_offline_status();
        let Some(controller) = self.agent.as_ref().and_then(AgentClient::controller) else {
            debug!(status = %self.state.offline, "No active agent, refusing cache request");
            return Some(Notice::AgentUnavailable);
        };

        match controller.post_message(ClientMessage::CacheNow) {
            Ok(()) => {
                self.state.offline = OfflineStatus::Caching;
                None
            }
            Err(e) => {
                warn!(error = %e, "Could not reach agent");
                Some(Notice::AgentUnavailable)
            }
        }
    }

    pub fn on_agent_message(&mut self, message: AgentMessage) -> Notice {
        match message {
            AgentMessage::CacheDone => {
                self.state.offline = OfflineStatus::Cached;
                self.state.offline_ready = true;
                Notice::CacheRefreshed
            }
        }
    }

    /// Handle every agent broadcast already waiting.
    pub fn poll_agent(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Some(message) = self.agent.as_mut().and_then(AgentClient::try_recv) {
            notices.push(self.on_agent_message(message));
        }
        notices
    }

    /// Wait for the next agent broadcast. `None` without an agent.
    pub async fn next_agent_notice(&mut self) -> Option<Notice> {
        let message = self.agent.as_mut()?.recv().await?;
        Some(self.on_agent_message(message))
    }
}
