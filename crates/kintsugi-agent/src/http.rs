//! Request and response values seen by the agent

use reqwest::{Method, Url};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
}

impl Request {
    pub fn new(method: Method, mut url: Url) -> Self {
        url.set_fragment(None);
        Self { method, url }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Key under which a cached response is stored
    pub fn cache_key(&self) -> &str {
        self.url.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(url: Url, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url,
            status,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// 2xx status
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_is_not_part_of_key() {
        let a = Request::get(Url::parse("https://r.example/index.html#page-3").unwrap());
        let b = Request::get(Url::parse("https://r.example/index.html").unwrap());
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_ok_range() {
        let url = Url::parse("https://r.example/").unwrap();
        assert!(Response::new(url.clone(), 200, "x").ok());
        assert!(Response::new(url.clone(), 204, "").ok());
        assert!(!Response::new(url.clone(), 304, "").ok());
        assert!(!Response::new(url, 404, "").ok());
    }
}
