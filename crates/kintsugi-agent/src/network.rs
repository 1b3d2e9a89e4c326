//! Network access for the agent

use async_trait::async_trait;
use thiserror::Error;

use crate::http::{Request, Response};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Network unreachable")]
    Offline,

    #[error("Request failed: {0}")]
    Failed(String),
}

/// Trait for the network so the agent can be driven without one
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request. Any HTTP status counts as success;
    /// only transport failures are errors.
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// Real network over reqwest
#[derive(Debug, Clone, Default)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let resp = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    NetworkError::Offline
                } else {
                    NetworkError::Failed(e.to_string())
                }
            })?;

        let status = resp.status().as_u16();
        let url = resp.url().clone();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .bytes()
            .await
            .map_err(|e| NetworkError::Failed(e.to_string()))?;

        Ok(Response {
            url,
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}
