//! Reader configuration
//!
//! Read from `~/.kintsugi/config.json` when it exists. Every field is
//! optional; missing fields fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use kintsugi_agent::{snapshot, Controller, CACHE_NAME};

use crate::document::{AgentDocumentSource, DocumentSource, FileDocumentSource, HttpDocumentSource};
use crate::{ReaderError, Result};

const DEFAULT_SCOPE: &str = "http://localhost:8080/";
const DEFAULT_DOCUMENT: &str = "assets/data/sample-book.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// SQLite database path. `None` means `~/.kintsugi/reader.db`.
    pub database: Option<PathBuf>,
    /// Offline snapshot database. `None` means `~/.kintsugi/offline.db`.
    pub offline_database: Option<PathBuf>,
    /// Local document file. Takes precedence over `document_url`.
    pub document_path: Option<PathBuf>,
    /// Document URL. Relative URLs resolve against `scope`.
    pub document_url: String,
    /// Origin the reader and its offline assets are served from
    pub scope: String,
    /// Offline snapshot version
    pub cache_name: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            database: None,
            offline_database: None,
            document_path: None,
            document_url: DEFAULT_DOCUMENT.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            cache_name: CACHE_NAME.to_string(),
        }
    }
}

impl ReaderConfig {
    /// `~/.kintsugi/config.json`
    pub fn default_path() -> Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| ReaderError::Config("No home directory".to_string()))?
            .join(".kintsugi")
            .join("config.json"))
    }

    /// Load the user's config, or defaults if there is none.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| ReaderError::Config(format!("Invalid {}: {}", path.display(), e)))
    }

    pub fn scope_url(&self) -> Result<reqwest::Url> {
        let scope = reqwest::Url::parse(&self.scope)
            .map_err(|e| ReaderError::Config(format!("Invalid scope {}: {}", self.scope, e)))?;
        if scope.cannot_be_a_base() {
            return Err(ReaderError::Config(format!("Scope {} cannot be a base URL", self.scope)));
        }
        Ok(scope)
    }

    pub fn document_url(&self) -> Result<reqwest::Url> {
        self.scope_url()?
            .join(&self.document_url)
            .map_err(|e| ReaderError::Config(format!("Invalid document URL {}: {}", self.document_url, e)))
    }

    pub fn offline_path(&self) -> Result<PathBuf> {
        match &self.offline_database {
            Some(path) => Ok(path.clone()),
            None => snapshot::default_path().map_err(ReaderError::from),
        }
    }

    /// Where a cold start fetches the document from: the local file if
    /// configured, else the active offline agent, else the network.
    pub fn document_source(
        &self,
        client: reqwest::Client,
        controller: Option<Controller>,
    ) -> Result<Arc<dyn DocumentSource>> {
        Ok(match (&self.document_path, controller) {
            (Some(path), _) => Arc::new(FileDocumentSource::new(path.clone())),
            (None, Some(controller)) => Arc::new(AgentDocumentSource::new(controller, self.document_url()?)),
            (None, None) => Arc::new(HttpDocumentSource::new(client, self.document_url()?.to_string())),
        })
    }
}
