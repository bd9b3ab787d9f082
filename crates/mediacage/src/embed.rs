use url::Url;

use crate::error::SessionError;

/// A protected video identified by its embed URL, plus the page that embeds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedReference {
    pub library_id: String,
    pub video_id: String,
    /// `scheme://host[:port]` of the embed player.
    pub origin: String,
    pub referer: String,
}

impl EmbedReference {
    /// Validates both URLs. Nothing here touches the network.
    pub fn parse(embed_url: &str, referer: &str) -> Result<Self, SessionError> {
        let (origin, library_id, video_id) = parse_embed_url(embed_url)?;
        let referer = parse_referer(referer)?;
        Ok(Self {
            library_id,
            video_id,
            origin,
            referer,
        })
    }

    pub fn embed_url(&self) -> String {
        format!(
            "{}/embed/{}/{}",
            self.origin, self.library_id, self.video_id
        )
    }
}

fn parse_embed_url(embed_url: &str) -> Result<(String, String, String), SessionError> {
    let url = Url::parse(embed_url.trim())
        .map_err(|e| SessionError::Validation(format!("invalid embed url '{embed_url}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(SessionError::Validation(format!(
            "embed url must use http(s): {embed_url}"
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| SessionError::Validation(format!("embed url has no host: {embed_url}")))?;

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        ["embed", library_id, video_id] => {
            let origin = match url.port() {
                Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
                None => format!("{}://{}", url.scheme(), host),
            };
            Ok((origin, library_id.to_string(), video_id.to_string()))
        }
        _ => Err(SessionError::Validation(format!(
            "embed url must look like scheme://host/embed/{{libraryId}}/{{videoId}}: {embed_url}"
        ))),
    }
}

fn parse_referer(referer: &str) -> Result<String, SessionError> {
    let url = Url::parse(referer.trim())
        .map_err(|e| SessionError::Validation(format!("invalid referer '{referer}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(SessionError::Validation(format!(
            "referer must be an http(s) url: {referer}"
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(SessionError::Validation(format!(
            "referer has no host: {referer}"
        )));
    }

    let mut referer = url.to_string();
    if !referer.ends_with('/') {
        referer.push('/');
    }
    Ok(referer)
}
