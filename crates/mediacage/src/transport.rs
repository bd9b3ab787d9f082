use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, SET_COOKIE};
use reqwest::{Client, Method, StatusCode};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::SessionError;
use crate::fingerprint::FingerprintProfile;

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    /// Merged over the transport defaults; these win on conflict.
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl TransportRequest {
    pub fn new<S: Into<String>>(method: Method, url: S) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get<S: Into<String>>(url: S) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// The HTTP surface every negotiation step and the keep-alive loop go through.
///
/// One instance belongs to one session: it carries that session's cookies and
/// must not be shared between sessions.
#[async_trait]
pub trait SessionTransport: Send + Sync + 'static {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse, SessionError>;

    /// Snapshot of the cookie store.
    fn cookies(&self) -> FxHashMap<String, String>;

    /// Headers attached to every request unless overridden.
    fn default_headers(&self) -> HeaderMap;

    /// Refuses any further request.
    fn close(&self);
}

/// reqwest-backed transport with its own cookie store.
///
/// Cookies set by any response are stored and sent back on every later
/// request, which is how the authorization obtained during activation reaches
/// the playlist and keep-alive calls.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    default_headers: HeaderMap,
    cookies: RwLock<FxHashMap<String, String>>,
    closed: AtomicBool,
}

impl HttpTransport {
    pub fn new(client: Client, fingerprint: &FingerprintProfile) -> Self {
        Self {
            client,
            default_headers: fingerprint.headers(),
            cookies: RwLock::new(FxHashMap::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Add a single cookie to the store.
    pub fn add_cookie<N: Into<String>, V: Into<String>>(&self, name: N, value: V) {
        self.cookies.write().insert(name.into(), value.into());
    }

    /// Set cookies from a cookie string (format: "name1=value1; name2=value2").
    pub fn set_cookies_from_string(&self, cookie_string: &str) {
        let mut cookies = self.cookies.write();
        for cookie in cookie_string.split(';') {
            if let Some((name, value)) = cookie.trim().split_once('=') {
                cookies.insert(name.trim().to_string(), value.trim().to_string());
            }
        }
    }

    fn build_cookie_header(&self) -> Option<HeaderValue> {
        let cookies = self.cookies.read();
        if cookies.is_empty() {
            return None;
        }
        let header = cookie_header(&cookies);
        HeaderValue::from_str(&header).ok()
    }

    /// Parse and store cookies from `Set-Cookie` response headers.
    fn store_cookies(&self, headers: &HeaderMap) {
        let mut cookies = self.cookies.write();
        for value in headers.get_all(SET_COOKIE).iter() {
            let Ok(cookie_str) = value.to_str() else {
                continue;
            };
            if let Some((name, value)) = parse_set_cookie(cookie_str) {
                debug!("Storing cookie {}", name);
                cookies.insert(name, value);
            }
        }
    }
}

#[async_trait]
impl SessionTransport for HttpTransport {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse, SessionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SessionError::TransportClosed);
        }

        let mut headers = self.default_headers.clone();
        headers.extend(request.headers);
        if let Some(cookie) = self.build_cookie_header() {
            headers.insert(COOKIE, cookie);
        }

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        // Query strings carry the session secret, keep them out of error text.
        let response = builder.send().await.map_err(reqwest::Error::without_url)?;
        let status = response.status();
        debug!("{} {} -> {}", request.method, request.url, status);

        self.store_cookies(response.headers());
        let headers = response.headers().clone();
        let body = response.text().await.map_err(reqwest::Error::without_url)?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }

    fn cookies(&self) -> FxHashMap<String, String> {
        self.cookies.read().clone()
    }

    fn default_headers(&self) -> HeaderMap {
        self.default_headers.clone()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Transport closed");
        }
    }
}

/// `name=value; name2=value2`, sorted by name so the output is stable.
pub fn cookie_header(cookies: &FxHashMap<String, String>) -> String {
    let mut pairs: Vec<_> = cookies.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Extracts `name=value` from a `Set-Cookie` header, ignoring attributes.
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let cookie_part = header.split(';').next()?;
    let (name, value) = cookie_part.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}
