//! Per-step request headers. The fingerprint headers are merged in by the
//! transport; these only describe where each request claims to come from.

use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderName, HeaderValue, ORIGIN, PRAGMA,
    REFERER, UPGRADE_INSECURE_REQUESTS,
};
use tracing::warn;

const SEC_FETCH_DEST: &str = "sec-fetch-dest";
const SEC_FETCH_MODE: &str = "sec-fetch-mode";
const SEC_FETCH_SITE: &str = "sec-fetch-site";

#[derive(Debug, Clone)]
pub struct RequestHeaders {
    accept_language: String,
}

impl RequestHeaders {
    pub fn new<S: Into<String>>(accept_language: S) -> Self {
        Self {
            accept_language: accept_language.into(),
        }
    }

    fn base(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        insert(&mut headers, ACCEPT_LANGUAGE, &self.accept_language);
        headers
    }

    /// The embed page is loaded as a cross-site iframe of the referer.
    pub fn embed(&self, referer: &str) -> HeaderMap {
        let mut headers = self.base();
        insert(&mut headers, REFERER, referer);
        headers.insert(SEC_FETCH_DEST, HeaderValue::from_static("iframe"));
        headers.insert(SEC_FETCH_MODE, HeaderValue::from_static("navigate"));
        headers.insert(SEC_FETCH_SITE, HeaderValue::from_static("cross-site"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        headers
    }

    /// Ping and activate are CORS calls from the player to the video host.
    pub fn drm(&self, player_origin: &str) -> HeaderMap {
        let mut headers = self.base();
        insert(&mut headers, ORIGIN, player_origin);
        insert(&mut headers, REFERER, &format!("{player_origin}/"));
        headers.insert(SEC_FETCH_DEST, HeaderValue::from_static("empty"));
        headers.insert(SEC_FETCH_MODE, HeaderValue::from_static("cors"));
        headers.insert(SEC_FETCH_SITE, HeaderValue::from_static("same-site"));
        headers
    }

    /// Playlists are fetched by the player page itself.
    pub fn playlist(&self, embed_url: &str) -> HeaderMap {
        let mut headers = self.base();
        insert(&mut headers, REFERER, embed_url);
        headers.insert(SEC_FETCH_DEST, HeaderValue::from_static("empty"));
        headers.insert(SEC_FETCH_MODE, HeaderValue::from_static("cors"));
        headers.insert(SEC_FETCH_SITE, HeaderValue::from_static("same-origin"));
        headers
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => warn!("Invalid value for header {}, skipping", name),
    }
}
