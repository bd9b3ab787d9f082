mod parser;

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use reqwest::StatusCode;
use tracing::{debug, info};

pub use parser::{EmbedPageParser, MediaDeliveryParser};

use crate::embed::EmbedReference;
use crate::error::{HandshakeFailure, SessionError};
use crate::headers::RequestHeaders;
use crate::transport::{SessionTransport, TransportRequest};

const SNIPPET_LEN: usize = 200;

static SECRET_PARAM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"secret=[^&"'\s]+"#).unwrap());

/// The per-session signing secret. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new<S: Into<String>>(secret: S) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentifiers {
    pub server_id: String,
    pub context_id: String,
    pub secret: Secret,
}

impl SessionIdentifiers {
    /// Host serving the `.drm` endpoints for this session.
    pub fn video_host(&self) -> String {
        format!("https://video-{}.mediadelivery.net", self.server_id)
    }
}

/// What the handshake learns from the embed page.
#[derive(Debug, Clone)]
pub struct EmbedPage {
    pub identifiers: SessionIdentifiers,
    pub title: Option<String>,
}

pub struct HandshakeNegotiator {
    parser: Arc<dyn EmbedPageParser>,
    headers: RequestHeaders,
}

impl HandshakeNegotiator {
    pub fn new(parser: Arc<dyn EmbedPageParser>, headers: RequestHeaders) -> Self {
        Self { parser, headers }
    }

    /// Fetches the embed page and extracts fresh identifiers. Every call
    /// re-fetches since the secret may rotate per request.
    pub async fn negotiate<T: SessionTransport + ?Sized>(
        &self,
        transport: &T,
        reference: &EmbedReference,
    ) -> Result<EmbedPage, SessionError> {
        let embed_url = reference.embed_url();
        debug!("Fetching embed page: {}", embed_url);

        let request =
            TransportRequest::get(&embed_url).headers(self.headers.embed(&reference.referer));
        let response = match transport.request(request).await {
            Ok(response) => response,
            Err(SessionError::Http(e)) => {
                return Err(HandshakeFailure::Unreachable(e.to_string()).into());
            }
            Err(e) => return Err(e),
        };

        if is_denial(response.status) {
            return Err(SessionError::AccessDenied {
                status: response.status.as_u16(),
                snippet: snippet(&response.body),
            });
        }
        if !response.is_success() {
            return Err(HandshakeFailure::Unreachable(format!(
                "embed page returned status {}",
                response.status
            ))
            .into());
        }

        let page = self.parser.parse(&response.body)?;
        info!(
            parser = self.parser.version(),
            "Handshake complete for video {}", reference.video_id
        );
        debug!(
            server_id = %page.identifiers.server_id,
            context_id = %page.identifiers.context_id,
            secret = %page.identifiers.secret,
            title = ?page.title,
            "Extracted session identifiers"
        );
        Ok(page)
    }
}

fn is_denial(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::GONE
            | StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS
    )
}

/// Leading part of a response body, safe to surface in errors and logs.
pub(crate) fn snippet(body: &str) -> String {
    let head: String = body.chars().take(SNIPPET_LEN).collect();
    SECRET_PARAM_REGEX
        .replace_all(head.trim(), "secret=[REDACTED]")
        .into_owned()
}
