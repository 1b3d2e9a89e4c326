//! Named response caches owned by the agent
//!
//! The foreground never touches these. Lookups search every cache in the
//! order the caches were opened, so an entry left in an older snapshot is
//! still served until activation deletes it.

use std::collections::HashMap;

use crate::http::{Request, Response};

/// One named snapshot: GET URL -> response
#[derive(Debug, Clone, Default)]
pub struct Cache {
    entries: HashMap<String, Response>,
}

impl Cache {
    /// Store `response` for `request`, replacing any earlier entry.
    /// Only GET requests are cacheable; anything else is ignored.
    pub fn put(&mut self, request: &Request, response: Response) -> bool {
        if !request.is_get() {
            return false;
        }
        self.entries.insert(request.cache_key().to_string(), response);
        true
    }

    pub fn match_request(&self, request: &Request) -> Option<&Response> {
        if !request.is_get() {
            return None;
        }
        self.entries.get(request.cache_key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All caches known to the agent, by name
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    caches: Vec<(String, Cache)>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cache called `name`, creating it if needed.
    pub fn open(&mut self, name: &str) -> &mut Cache {
        let index = match self.caches.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.caches.push((name.to_string(), Cache::default()));
                self.caches.len() - 1
            }
        };
        &mut self.caches[index].1
    }

    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, cache)| cache)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn delete(&mut self, name: &str) -> bool {
        let before = self.caches.len();
        self.caches.retain(|(n, _)| n != name);
        self.caches.len() != before
    }

    /// Cache names in creation order
    pub fn keys(&self) -> Vec<String> {
        self.caches.iter().map(|(n, _)| n.clone()).collect()
    }

    /// First match across all caches
    pub fn match_request(&self, request: &Request) -> Option<Response> {
        self.caches
            .iter()
            .find_map(|(_, cache)| cache.match_request(request))
            .cloned()
    }
}
