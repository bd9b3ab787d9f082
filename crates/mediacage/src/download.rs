use async_trait::async_trait;

use crate::error::BoxError;

/// Everything an external downloader needs to fetch the stream as the
/// authorized browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    /// Suggested output name, without extension.
    pub title: Option<String>,
}

impl DownloadRequest {
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The tool that performs the actual media retrieval.
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    async fn download(&self, request: &DownloadRequest) -> Result<(), BoxError>;
}
