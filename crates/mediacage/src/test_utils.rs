//! In-memory transport used by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use rustc_hash::FxHashMap;

use crate::error::SessionError;
use crate::transport::{SessionTransport, TransportRequest, TransportResponse};

struct Route {
    url_contains: String,
    status: StatusCode,
    body: String,
    cookie: Option<(String, String)>,
}

/// Answers requests from a routing table and records every call.
#[derive(Default)]
pub struct RecordingTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<TransportRequest>>,
    cookies: Mutex<FxHashMap<String, String>>,
    closed: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// First matching route wins; unmatched URLs answer `200` with an empty body.
    pub fn route(self, url_contains: &str, status: u16, body: &str) -> Self {
        self.routes.lock().push(Route {
            url_contains: url_contains.to_string(),
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
            cookie: None,
        });
        self
    }

    pub fn route_with_cookie(self, url_contains: &str, name: &str, value: &str) -> Self {
        self.routes.lock().push(Route {
            url_contains: url_contains.to_string(),
            status: StatusCode::OK,
            body: String::new(),
            cookie: Some((name.to_string(), value.to_string())),
        });
        self
    }

    pub fn calls(&self) -> Vec<TransportRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.url.clone()).collect()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.url.contains(needle))
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SessionTransport for RecordingTransport {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse, SessionError> {
        if self.is_closed() {
            return Err(SessionError::TransportClosed);
        }

        let (status, body, cookie) = {
            let routes = self.routes.lock();
            routes
                .iter()
                .find(|r| request.url.contains(&r.url_contains))
                .map(|r| (r.status, r.body.clone(), r.cookie.clone()))
                .unwrap_or((StatusCode::OK, String::new(), None))
        };
        if let Some((name, value)) = cookie {
            self.cookies.lock().insert(name, value);
        }
        self.calls.lock().push(request);

        Ok(TransportResponse {
            status,
            headers: HeaderMap::new(),
            body,
        })
    }

    fn cookies(&self) -> FxHashMap<String, String> {
        self.cookies.lock().clone()
    }

    fn default_headers(&self) -> HeaderMap {
        HeaderMap::new()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// An embed page carrying the three identifiers the way the player does.
pub fn sample_embed_page(server_id: &str, context_id: &str, secret: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html>
<head>
<meta property="og:title" content="Lesson 1 &amp; Intro">
<link rel="preconnect" href="https://video-{server_id}.mediadelivery.net">
</head>
<body>
<script>
    var player = new Player("#video");
    fetch("/.drm/ping?contextId={context_id}&secret={secret}");
</script>
<iframe src="https://iframe.mediadelivery.net/42/playlist.drm?contextId={context_id}&secret={secret}"></iframe>
</body>
</html>"##
    )
}

pub const SAMPLE_MASTER_PLAYLIST: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
640x360/video.drm
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080
1920x1080/video.drm
#EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720
1280x720/video.drm
";
