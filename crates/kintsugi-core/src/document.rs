//! Document model and where documents come from
//!
//! The document arrives already parsed: a list of pages, each with a
//! title, body paragraphs, and a standard/high-density image pair.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use kintsugi_agent::{Controller, Request};

use crate::{ReaderError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub title: String,
    pub body: Vec<String>,
    pub image: PageImage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageImage {
    /// Standard density
    pub regular: String,
    /// High density (2x)
    pub retina: String,
    /// Accessible description
    pub alt: String,
}

impl Document {
    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub(crate) fn validated(self) -> Result<Self> {
        if self.is_empty() {
            return Err(ReaderError::EmptyDocument);
        }
        Ok(self)
    }
}

/// Trait for document sources. Only consulted on a cold start.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_document(&self) -> Result<Document>;
}

/// Fetch the document JSON over HTTP
pub struct HttpDocumentSource {
    client: reqwest::Client,
    url: String,
}

impl HttpDocumentSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch_document(&self) -> Result<Document> {
        let document: Document = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!(url = %self.url, pages = document.len(), "Fetched document");
        document.validated()
    }
}

/// Fetch the document through the offline agent. Once the snapshot is
/// installed this works with no network at all.
pub struct AgentDocumentSource {
    controller: Controller,
    url: reqwest::Url,
}

impl AgentDocumentSource {
    pub fn new(controller: Controller, url: reqwest::Url) -> Self {
        Self { controller, url }
    }
}

#[async_trait]
impl DocumentSource for AgentDocumentSource {
    async fn fetch_document(&self) -> Result<Document> {
        let response = self.controller.fetch(Request::get(self.url.clone())).await?;
        if !response.ok() {
            return Err(ReaderError::Unreachable(format!(
                "{} returned {}",
                self.url, response.status
            )));
        }

        let document: Document = serde_json::from_slice(&response.body)?;
        info!(url = %self.url, pages = document.len(), "Fetched document through offline agent");
        document.validated()
    }
}

/// Read the document JSON from disk
pub struct FileDocumentSource {
    path: PathBuf,
}

impl FileDocumentSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl DocumentSource for FileDocumentSource {
    async fn fetch_document(&self) -> Result<Document> {
        let raw = tokio::fs::read(&self.path).await?;
        let document: Document = serde_json::from_slice(&raw)?;
        info!(path = %self.path.display(), pages = document.len(), "Loaded document");
        document.validated()
    }
}
