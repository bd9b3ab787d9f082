use m3u8_rs::Playlist;
use regex::Regex;
use reqwest::header::HeaderMap;
use tracing::{debug, info, warn};

use crate::embed::EmbedReference;
use crate::error::SessionError;
use crate::handshake::SessionIdentifiers;
use crate::transport::{SessionTransport, TransportRequest};

const VARIANT_SUFFIX: &str = "/video.drm";

/// How to pick a rendition from the master playlist.
#[derive(Debug, Clone, Default)]
pub enum ResolutionSelector {
    /// Highest bandwidth variant.
    #[default]
    Highest,
    /// Exact label such as `1280x720`, falling back to the label read as a
    /// regular expression (`720`, `1080$`).
    Preferred {
        label: String,
        pattern: Option<Regex>,
    },
}

impl ResolutionSelector {
    pub fn preferred<S: Into<String>>(label: S) -> Self {
        let label = label.into();
        let pattern = match Regex::new(&label) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!("Resolution '{}' is not a valid pattern: {}", label, e);
                None
            }
        };
        Self::Preferred { label, pattern }
    }

    /// `labels` must be ordered best first.
    fn select<'a>(&self, labels: &'a [String]) -> Option<&'a String> {
        match self {
            ResolutionSelector::Highest => labels.first(),
            ResolutionSelector::Preferred { label, pattern } => labels
                .iter()
                .find(|l| *l == label)
                .or_else(|| {
                    pattern
                        .as_ref()
                        .and_then(|p| labels.iter().find(|l| p.is_match(l)))
                }),
        }
    }
}

/// The rendition that will be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSelection {
    /// e.g. `1920x1080`
    pub label: String,
    /// e.g. `1080`, reported in keep-alive pings.
    pub height: String,
    pub url: String,
    pub available: Vec<String>,
}

pub struct PlaylistNegotiator {
    /// Headers for requests issued by the player page.
    headers: HeaderMap,
}

impl PlaylistNegotiator {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Lists the renditions of an activated session, picks one and requests
    /// its variant playlist once so the server associates it with the session.
    pub async fn select<T: SessionTransport + ?Sized>(
        &self,
        transport: &T,
        reference: &EmbedReference,
        identifiers: &SessionIdentifiers,
        selector: &ResolutionSelector,
    ) -> Result<StreamSelection, SessionError> {
        let base = format!("{}/{}", reference.origin, reference.video_id);
        debug!("Fetching master playlist: {}/playlist.drm", base);

        let request = TransportRequest::get(format!("{base}/playlist.drm"))
            .headers(self.headers.clone())
            .query("contextId", identifiers.context_id.as_str())
            .query("secret", identifiers.secret.expose());
        let response = transport.request(request).await?;
        if !response.is_success() {
            return Err(SessionError::Playlist(format!(
                "master playlist returned status {}",
                response.status
            )));
        }

        let labels = variant_labels(&response.body)?;
        if labels.is_empty() {
            return Err(SessionError::Playlist("no resolutions found".to_string()));
        }
        debug!(available = ?labels, "Available resolutions");

        let label = selector.select(&labels).cloned().ok_or_else(|| {
            SessionError::Playlist(format!(
                "requested resolution {selector:?} not found in available resolutions: {labels:?}"
            ))
        })?;
        info!("Selected resolution: {}", label);

        let variant_url = format!("{base}/{label}{VARIANT_SUFFIX}");
        let prime = TransportRequest::get(variant_url.as_str())
            .headers(self.headers.clone())
            .query("contextId", identifiers.context_id.as_str());
        match transport.request(prime).await {
            Ok(response) if !response.is_success() => {
                warn!("Variant playlist returned status {}", response.status);
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to fetch variant playlist: {}", e),
        }

        let height = label.rsplit('x').next().unwrap_or(&label).to_string();
        Ok(StreamSelection {
            url: format!("{variant_url}?contextId={}", identifiers.context_id),
            height,
            label,
            available: labels,
        })
    }
}

/// Rendition labels of a master playlist, highest bandwidth first.
fn variant_labels(body: &str) -> Result<Vec<String>, SessionError> {
    let playlist = m3u8_rs::parse_playlist_res(body.as_bytes())
        .map_err(|e| SessionError::Playlist(format!("invalid master playlist: {e}")))?;

    let Playlist::MasterPlaylist(master) = playlist else {
        return Err(SessionError::Playlist(
            "expected a master playlist".to_string(),
        ));
    };

    let mut variants: Vec<(u64, String)> = master
        .variants
        .into_iter()
        .filter(|v| !v.is_i_frame)
        .filter_map(|v| {
            let prefix = v.uri.split('?').next()?.strip_suffix(VARIANT_SUFFIX)?;
            let label = prefix.rsplit('/').next()?.trim();
            (!label.is_empty()).then(|| (v.bandwidth, label.to_string()))
        })
        .collect();
    variants.sort_by(|a, b| b.0.cmp(&a.0));

    let mut labels: Vec<String> = Vec::with_capacity(variants.len());
    for (_, label) in variants {
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    Ok(labels)
}
