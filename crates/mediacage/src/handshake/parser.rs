//! Extraction rules for the embed page.
//!
//! The player markup changes without notice, so every rule lives here behind
//! [`EmbedPageParser`] and a new markup version gets a new implementation
//! instead of a patched regex elsewhere.

use std::sync::LazyLock;

use regex::Regex;

use super::{EmbedPage, Secret, SessionIdentifiers};
use crate::error::{EmbedToken, HandshakeFailure};

pub trait EmbedPageParser: Send + Sync {
    /// Short tag identifying the markup version this parser understands.
    fn version(&self) -> &'static str;

    fn parse(&self, body: &str) -> Result<EmbedPage, HandshakeFailure>;
}

static SERVER_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https://video-([^./"'\s]+)\.mediadelivery\.net"#).unwrap());
static CONTEXT_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"contextId=([^&"'\s]+)"#).unwrap());
static SECRET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[?&]secret=([^&"'\s]+)"#).unwrap());
static TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"og:title"\s+content="([^"]*)""#).unwrap());

/// Parser for the `iframe.mediadelivery.net` player page.
#[derive(Debug, Default, Clone, Copy)]
pub struct MediaDeliveryParser;

impl MediaDeliveryParser {
    fn capture(regex: &Regex, body: &str, token: EmbedToken) -> Result<String, HandshakeFailure> {
        regex
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or(HandshakeFailure::MissingToken(token))
    }
}

impl EmbedPageParser for MediaDeliveryParser {
    fn version(&self) -> &'static str {
        "v1"
    }

    fn parse(&self, body: &str) -> Result<EmbedPage, HandshakeFailure> {
        if body.trim().is_empty() {
            return Err(HandshakeFailure::UnrecognizedShape);
        }

        let server_id = Self::capture(&SERVER_ID_REGEX, body, EmbedToken::ServerId)?;
        let context_id = Self::capture(&CONTEXT_ID_REGEX, body, EmbedToken::ContextId)?;
        let secret = Self::capture(&SECRET_REGEX, body, EmbedToken::Secret)?;

        let title = TITLE_REGEX
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| unescape_html(m.as_str().trim()))
            .filter(|t| !t.is_empty());

        Ok(EmbedPage {
            identifiers: SessionIdentifiers {
                server_id,
                context_id,
                secret: Secret::new(secret),
            },
            title,
        })
    }
}

/// Decodes the entities that show up in `og:title` attributes.
fn unescape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail.find(';').and_then(|end| {
            let entity = &tail[1..end];
            decode_entity(entity).map(|c| (c, end + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = entity.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}
