//! Fetch interception policy: cache first, network second, app shell last.
//!
//! | request | cache | network | result |
//! |---|---|---|---|
//! | non-GET | - | - | `Passthrough` |
//! | GET | hit | not called | `Cached` |
//! | GET | miss | ok | `Fetched` (caller stores a copy) |
//! | GET | miss | error | `Fallback` (cached root document) or `Offline` |

use std::future::Future;

use crate::http::{Request, Response};
use crate::network::NetworkError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// Not ours to handle; goes to the network untouched
    Passthrough,
    /// Served from cache, network never touched
    Cached(Response),
    /// Came from the network and should be cached
    Fetched(Response),
    /// Network failed; this is the cached root document
    Fallback(Response),
    /// Network failed and there is nothing to fall back to
    Offline(NetworkError),
}

impl Interception {
    /// The response to hand back, if any.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Cached(r) | Self::Fetched(r) | Self::Fallback(r) => Some(r),
            Self::Passthrough | Self::Offline(_) => None,
        }
    }
}

/// Decide how to answer `request`.
///
/// `lookup` is consulted for the request and, on network failure, for
/// `root`. `fetch` is called at most once, and only on a cache miss.
pub async fn intercept<L, F, Fut>(request: &Request, root: &Request, lookup: L, fetch: F) -> Interception
where
    L: Fn(&Request) -> Option<Response>,
    F: FnOnce(Request) -> Fut,
    Fut: Future<Output = Result<Response, NetworkError>>,
{
    if !request.is_get() {
        return Interception::Passthrough;
    }

    if let Some(cached) = lookup(request) {
        return Interception::Cached(cached);
    }

    match fetch(request.clone()).await {
        Ok(response) => Interception::Fetched(response),
        Err(e) => match lookup(root) {
            Some(shell) => Interception::Fallback(shell),
            None => Interception::Offline(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::{Method, Url};
    use std::cell::Cell;

    fn url(path: &str) -> Url {
        Url::parse("https://r.example/").unwrap().join(path).unwrap()
    }

    fn page(path: &str, body: &str) -> Response {
        Response::new(url(path), 200, body)
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let calls = Cell::new(0);
        let request = Request::get(url("style.css"));

        let result = intercept(
            &request,
            &Request::get(url("index.html")),
            |_| Some(page("style.css", "cached")),
            |_| {
                calls.set(calls.get() + 1);
                async { Ok(page("style.css", "fresh")) }
            },
        )
        .await;

        assert_eq!(result, Interception::Cached(page("style.css", "cached")));
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test]
    async fn test_miss_goes_to_network() {
        let request = Request::get(url("page2.svg"));

        let result = intercept(
            &request,
            &Request::get(url("index.html")),
            |_| None,
            |r| async move { Ok(Response::new(r.url, 200, "svg")) },
        )
        .await;

        assert_eq!(result, Interception::Fetched(page("page2.svg", "svg")));
    }

    #[tokio::test]
    async fn test_network_failure_serves_root() {
        let request = Request::get(url("chapter-9"));
        let root = Request::get(url("index.html"));

        let result = intercept(
            &request,
            &root,
            |r| (r.url.path() == "/index.html").then(|| page("index.html", "shell")),
            |_| async { Err(NetworkError::Offline) },
        )
        .await;

        assert_eq!(result, Interception::Fallback(page("index.html", "shell")));
    }

    #[tokio::test]
    async fn test_network_failure_without_root() {
        let result = intercept(
            &Request::get(url("chapter-9")),
            &Request::get(url("index.html")),
            |_| None,
            |_| async { Err(NetworkError::Offline) },
        )
        .await;

        assert_eq!(result, Interception::Offline(NetworkError::Offline));
        assert!(result.into_response().is_none());
    }

    #[tokio::test]
    async fn test_non_get_is_not_intercepted() {
        let lookups = Cell::new(0);
        let calls = Cell::new(0);

        let result = intercept(
            &Request::new(Method::POST, url("index.html")),
            &Request::get(url("index.html")),
            |_| {
                lookups.set(lookups.get() + 1);
                Some(page("index.html", "shell"))
            },
            |_| {
                calls.set(calls.get() + 1);
                async { Err(NetworkError::Offline) }
            },
        )
        .await;

        assert_eq!(result, Interception::Passthrough);
        assert_eq!((lookups.get(), calls.get()), (0, 0));
    }
}
