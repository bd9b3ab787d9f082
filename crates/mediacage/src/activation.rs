use std::sync::Arc;

use reqwest::header::HeaderMap;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::error::{ActivationStep, SessionError};
use crate::handshake::SessionIdentifiers;
use crate::signing::{PingSigner, PingTick};
use crate::transport::{SessionTransport, TransportRequest};

#[derive(Debug, Clone)]
pub struct ActivationResult {
    pub authorized: bool,
    /// Cookie store right after activation.
    pub cookies: FxHashMap<String, String>,
    pub headers: HeaderMap,
}

/// Builds a signed `.drm/{context}/ping` request.
pub(crate) fn ping_request(
    identifiers: &SessionIdentifiers,
    tick: &PingTick,
    signer: &dyn PingSigner,
    headers: &HeaderMap,
) -> TransportRequest {
    let url = format!(
        "{}/.drm/{}/ping",
        identifiers.video_host(),
        identifiers.context_id
    );
    TransportRequest::get(url)
        .headers(headers.clone())
        .query("hash", signer.sign(identifiers, tick))
        .query("time", tick.time_param())
        .query("paused", tick.paused_param())
        .query("chosen_res", tick.resolution.as_str())
}

pub struct ActivationNegotiator {
    signer: Arc<dyn PingSigner>,
    /// Headers for the `.drm` endpoints.
    headers: HeaderMap,
}

impl ActivationNegotiator {
    pub fn new(signer: Arc<dyn PingSigner>, headers: HeaderMap) -> Self {
        Self { signer, headers }
    }

    /// Registers the session with a signed ping, then confirms playback
    /// intent. Activate is only sent once the ping is accepted, and both go
    /// through the same transport so cookies from the ping carry over.
    ///
    /// There is no retry: a rejection is final for these identifiers.
    pub async fn activate<T: SessionTransport + ?Sized>(
        &self,
        transport: &T,
        identifiers: &SessionIdentifiers,
    ) -> Result<ActivationResult, SessionError> {
        let ping = ping_request(
            identifiers,
            &PingTick::initial(),
            self.signer.as_ref(),
            &self.headers,
        );
        let response = transport.request(ping).await?;
        if !response.is_success() {
            return Err(SessionError::ActivationRejected {
                step: ActivationStep::Ping,
                status: response.status.as_u16(),
            });
        }
        debug!("Initial ping accepted");

        let activate = TransportRequest::get(format!(
            "{}/.drm/{}/activate",
            identifiers.video_host(),
            identifiers.context_id
        ))
        .headers(self.headers.clone());
        let response = transport.request(activate).await?;
        if !response.is_success() {
            return Err(SessionError::ActivationRejected {
                step: ActivationStep::Activate,
                status: response.status.as_u16(),
            });
        }

        let cookies = transport.cookies();
        info!("Session activated");
        debug!(cookies = ?cookies.keys().collect::<Vec<_>>(), "Cookies after activation");

        Ok(ActivationResult {
            authorized: true,
            cookies,
            headers: transport.default_headers(),
        })
    }
}
