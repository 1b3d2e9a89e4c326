//! Offline asset manifest
//!
//! Baked in at build time. Bump [`CACHE_NAME`] whenever the list or the
//! assets behind it change; activation then drops the previous snapshot.

use reqwest::Url;

use crate::http::Request;
use crate::AgentError;

/// Versioned name of the current cache snapshot
pub const CACHE_NAME: &str = "kintsugi-reader-v1";

/// Served when the network is gone and the request was never cached
pub const ROOT_DOCUMENT: &str = "./index.html";

/// Everything the reader needs to start without a network
pub const OFFLINE_ASSETS: &[&str] = &[
    "./",
    "./index.html",
    "./assets/css/styles.css",
    "./assets/js/main.js",
    "./assets/data/sample-book.json",
    "./assets/images/page1.svg",
    "./assets/images/page1@2x.svg",
    "./assets/images/page2.svg",
    "./assets/images/page2@2x.svg",
    "./assets/images/page3.svg",
    "./assets/images/page3@2x.svg",
    "./manifest.json",
];

/// Resolve a manifest path against the agent's scope.
pub fn resolve(scope: &Url, path: &str) -> Result<Url, AgentError> {
    scope.join(path).map_err(|e| AgentError::InvalidAsset {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// GET requests for every path, in manifest order.
pub fn requests(scope: &Url, paths: &[String]) -> Result<Vec<Request>, AgentError> {
    paths
        .iter()
        .map(|path| resolve(scope, path).map(Request::get))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_against_scope() {
        let scope = Url::parse("https://reader.example/kintsugi/").unwrap();

        assert_eq!(
            resolve(&scope, "./").unwrap().as_str(),
            "https://reader.example/kintsugi/"
        );
        assert_eq!(
            resolve(&scope, ROOT_DOCUMENT).unwrap().as_str(),
            "https://reader.example/kintsugi/index.html"
        );
    }

    #[test]
    fn test_manifest_requests_keep_order() {
        let scope = Url::parse("https://reader.example/").unwrap();
        let paths: Vec<String> = OFFLINE_ASSETS.iter().map(|p| p.to_string()).collect();

        let requests = requests(&scope, &paths).unwrap();

        assert_eq!(requests.len(), OFFLINE_ASSETS.len());
        assert!(requests.iter().all(Request::is_get));
        assert_eq!(
            requests[4].url.as_str(),
            "https://reader.example/assets/data/sample-book.json"
        );
    }
}
