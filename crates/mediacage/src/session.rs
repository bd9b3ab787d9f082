use std::sync::Arc;

use reqwest::header::REFERER;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::activation::{ActivationNegotiator, ActivationResult};
use crate::client::create_client;
use crate::config::SessionConfig;
use crate::download::{DownloadRequest, MediaDownloader};
use crate::embed::EmbedReference;
use crate::error::SessionError;
use crate::fingerprint::FingerprintProfile;
use crate::handshake::{EmbedPageParser, HandshakeNegotiator, MediaDeliveryParser, SessionIdentifiers};
use crate::headers::RequestHeaders;
use crate::keepalive::{KeepAliveHandle, KeepAliveScheduler, KeepAliveState};
use crate::playlist::{PlaylistNegotiator, StreamSelection};
use crate::signing::{Md5PingSigner, PingSigner};
use crate::transport::{HttpTransport, SessionTransport};

/// Drives one embed reference from handshake to an authorized, kept-alive
/// session.
///
/// A context owns its transport and is consumed by [`open`](Self::open), so
/// cookies and identifiers can never leak into another session.
pub struct SessionContext<T: SessionTransport + ?Sized = HttpTransport> {
    transport: Arc<T>,
    fingerprint: FingerprintProfile,
    config: SessionConfig,
    parser: Arc<dyn EmbedPageParser>,
    signer: Arc<dyn PingSigner>,
}

impl SessionContext<HttpTransport> {
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        let fingerprint = FingerprintProfile::generate(config.fingerprint_seed);
        let client = create_client(&config)?;
        let transport = Arc::new(HttpTransport::new(client, &fingerprint));
        Ok(Self::with_transport(transport, fingerprint, config))
    }
}

impl<T: SessionTransport + ?Sized> SessionContext<T> {
    pub fn with_transport(
        transport: Arc<T>,
        fingerprint: FingerprintProfile,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            fingerprint,
            config,
            parser: Arc::new(MediaDeliveryParser),
            signer: Arc::new(Md5PingSigner),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn EmbedPageParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn PingSigner>) -> Self {
        self.signer = signer;
        self
    }

    pub fn fingerprint(&self) -> &FingerprintProfile {
        &self.fingerprint
    }

    /// Validates the URLs before anything goes over the wire.
    pub async fn open_urls(
        self,
        embed_url: &str,
        referer: &str,
    ) -> Result<AuthorizedSession<T>, SessionError> {
        let reference = EmbedReference::parse(embed_url, referer)?;
        self.open(reference).await
    }

    /// Handshake, activation, rendition selection, then keep-alive.
    ///
    /// Stops at the first failing step; keep-alive is only started once
    /// everything before it succeeded.
    pub async fn open(self, reference: EmbedReference) -> Result<AuthorizedSession<T>, SessionError> {
        let transport = Arc::clone(&self.transport);
        match self.negotiate(reference).await {
            Ok(session) => Ok(session),
            Err(e) => {
                transport.close();
                Err(e)
            }
        }
    }

    async fn negotiate(self, reference: EmbedReference) -> Result<AuthorizedSession<T>, SessionError> {
        let headers = RequestHeaders::new(self.fingerprint.accept_language.as_str());
        debug!(
            user_agent = %self.fingerprint.user_agent,
            client_hints = ?self.fingerprint.client_hints,
            "Opening session for {}", reference.embed_url()
        );

        let page = HandshakeNegotiator::new(Arc::clone(&self.parser), headers.clone())
            .negotiate(self.transport.as_ref(), &reference)
            .await?;
        let identifiers = Arc::new(page.identifiers);

        let drm_headers = headers.drm(&reference.origin);
        let activation = ActivationNegotiator::new(Arc::clone(&self.signer), drm_headers.clone())
            .activate(self.transport.as_ref(), &identifiers)
            .await?;

        let stream = PlaylistNegotiator::new(headers.playlist(&reference.embed_url()))
            .select(
                self.transport.as_ref(),
                &reference,
                &identifiers,
                &self.config.resolution,
            )
            .await?;

        let keep_alive = KeepAliveScheduler::new(
            Arc::clone(&self.transport),
            self.signer,
            drm_headers,
            self.config.keep_alive_interval,
        )
        .start(Arc::clone(&identifiers), stream.height.clone())?;

        info!("Session authorized for video {}", reference.video_id);
        Ok(AuthorizedSession {
            reference,
            identifiers,
            activation,
            stream,
            title: page.title,
            transport: self.transport,
            keep_alive,
        })
    }

    /// Opens a session, hands it to `downloader`, and tears it down on every
    /// exit path: success, download failure or `shutdown` being cancelled.
    pub async fn run<D: MediaDownloader + ?Sized>(
        self,
        reference: EmbedReference,
        downloader: &D,
        shutdown: &CancellationToken,
    ) -> Result<(), SessionError> {
        let mut session = tokio::select! {
            session = self.open(reference) => session?,
            _ = shutdown.cancelled() => return Err(SessionError::Cancelled),
        };

        let request = session.download_request();
        info!("Handing stream {} to downloader", session.stream().label);

        let outcome = tokio::select! {
            result = downloader.download(&request) => result.map_err(SessionError::Download),
            _ = shutdown.cancelled() => Err(SessionError::Cancelled),
        };
        if let Err(e) = &outcome {
            warn!("Download did not complete: {}", e);
        }

        session.close().await;
        outcome
    }
}

/// An activated session with its keep-alive loop running.
pub struct AuthorizedSession<T: SessionTransport + ?Sized = HttpTransport> {
    reference: EmbedReference,
    identifiers: Arc<SessionIdentifiers>,
    activation: ActivationResult,
    stream: StreamSelection,
    title: Option<String>,
    transport: Arc<T>,
    keep_alive: KeepAliveHandle,
}

impl<T: SessionTransport + ?Sized> AuthorizedSession<T> {
    pub fn reference(&self) -> &EmbedReference {
        &self.reference
    }

    pub fn identifiers(&self) -> &SessionIdentifiers {
        &self.identifiers
    }

    pub fn activation(&self) -> &ActivationResult {
        &self.activation
    }

    pub fn stream(&self) -> &StreamSelection {
        &self.stream
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn keep_alive_state(&self) -> KeepAliveState {
        self.keep_alive.state()
    }

    /// Credentials for the downloader: the browser identity, the embed page as
    /// referer and the current cookies.
    pub fn download_request(&self) -> DownloadRequest {
        let mut headers: Vec<(String, String)> = self
            .transport
            .default_headers()
            .iter()
            .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
            .collect();
        headers.retain(|(k, _)| !k.eq_ignore_ascii_case(REFERER.as_str()));
        headers.push(("Referer".to_string(), self.reference.embed_url()));

        let mut cookies: Vec<(String, String)> = self.transport.cookies().into_iter().collect();
        cookies.sort();

        DownloadRequest {
            url: self.stream.url.clone(),
            headers,
            cookies,
            title: self.title.clone(),
        }
    }

    /// Stops the keep-alive loop, waiting for it to exit, then closes the
    /// transport. Safe to call more than once.
    pub async fn close(&mut self) {
        self.keep_alive.stop().await;
        self.transport.close();
        debug!("Session for video {} closed", self.reference.video_id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::error::{ActivationStep, BoxError, EmbedToken, HandshakeFailure};
    use crate::playlist::ResolutionSelector;
    use crate::test_utils::{RecordingTransport, SAMPLE_MASTER_PLAYLIST, sample_embed_page};

    const EMBED_URL: &str = "https://iframe.mediadelivery.net/embed/100/abc";
    const REFERER_URL: &str = "https://example.com/";

    fn happy_transport() -> Arc<RecordingTransport> {
        Arc::new(
            RecordingTransport::new()
                .route("/embed/", 200, &sample_embed_page("S1", "C1", "SECRET"))
                .route("playlist.drm", 200, SAMPLE_MASTER_PLAYLIST)
                .route_with_cookie("/activate", "drm_auth", "granted"),
        )
    }

    fn context(transport: &Arc<RecordingTransport>) -> SessionContext<RecordingTransport> {
        SessionContext::with_transport(
            Arc::clone(transport),
            FingerprintProfile::generate(Some(9)),
            SessionConfig::default(),
        )
    }

    fn reference() -> EmbedReference {
        EmbedReference::parse(EMBED_URL, REFERER_URL).unwrap()
    }

    struct FailingDownloader;

    #[async_trait]
    impl MediaDownloader for FailingDownloader {
        async fn download(&self, _request: &DownloadRequest) -> Result<(), BoxError> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Err("segment 12 returned 404".into())
        }
    }

    #[derive(Default)]
    struct RecordingDownloader {
        requests: Mutex<Vec<DownloadRequest>>,
    }

    #[async_trait]
    impl MediaDownloader for RecordingDownloader {
        async fn download(&self, request: &DownloadRequest) -> Result<(), BoxError> {
            self.requests.lock().push(request.clone());
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok(())
        }
    }

    struct StuckDownloader;

    #[async_trait]
    impl MediaDownloader for StuckDownloader {
        async fn download(&self, _request: &DownloadRequest) -> Result<(), BoxError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_runs_steps_in_order() {
        let transport = happy_transport();
        let mut session = context(&transport).open(reference()).await.unwrap();

        let urls = transport.urls();
        assert_eq!(urls[0], EMBED_URL);
        assert!(urls[1].ends_with("/.drm/C1/ping"));
        assert!(urls[2].ends_with("/.drm/C1/activate"));
        assert!(urls[3].ends_with("/abc/playlist.drm"));
        assert!(urls[4].ends_with("/abc/1920x1080/video.drm"));

        assert!(session.activation().authorized);
        assert_eq!(session.stream().label, "1920x1080");
        assert_eq!(session.title(), Some("Lesson 1 & Intro"));
        assert_eq!(session.keep_alive_state(), KeepAliveState::Running);

        let request = session.download_request();
        assert_eq!(
            request.url,
            "https://iframe.mediadelivery.net/abc/1920x1080/video.drm?contextId=C1"
        );
        assert_eq!(request.header("referer"), Some(EMBED_URL));
        assert_eq!(request.cookie_header().as_deref(), Some("drm_auth=granted"));

        session.close().await;
        assert_eq!(session.keep_alive_state(), KeepAliveState::Stopped);
        assert!(transport.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_after_download_failure() {
        let transport = happy_transport();
        let mut session = context(&transport).open(reference()).await.unwrap();

        let outcome = FailingDownloader.download(&session.download_request()).await;
        assert!(outcome.is_err());
        session.close().await;

        assert_eq!(session.keep_alive_state(), KeepAliveState::Stopped);
        let calls = transport.call_count();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.call_count(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_propagates_download_failure_after_close() {
        let transport = happy_transport();
        let err = context(&transport)
            .run(reference(), &FailingDownloader, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Download(_)));
        assert!(transport.is_closed());
        // pings were sent while the download was running
        assert!(transport.count_matching("/ping") >= 2);

        let calls = transport.call_count();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.call_count(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_success_hands_over_credentials() {
        let transport = happy_transport();
        let downloader = RecordingDownloader::default();
        context(&transport)
            .run(reference(), &downloader, &CancellationToken::new())
            .await
            .unwrap();

        let requests = downloader.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].title.as_deref(), Some("Lesson 1 & Intro"));
        assert!(transport.is_closed());
        // initial ping plus roughly one per second of download
        assert!(transport.count_matching("/ping") >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cancelled() {
        let transport = happy_transport();
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let err = context(&transport)
            .run(reference(), &StuckDownloader, &shutdown)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Cancelled));
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_handshake_failure_skips_activation() {
        let transport = Arc::new(RecordingTransport::new().route(
            "/embed/",
            200,
            r#"<a href="https://video-S1.mediadelivery.net">contextId=C1</a>"#,
        ));
        let err = context(&transport).open(reference()).await.err().unwrap();

        assert!(matches!(
            err,
            SessionError::Handshake(HandshakeFailure::MissingToken(EmbedToken::Secret))
        ));
        assert_eq!(transport.call_count(), 1);
        assert!(transport.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_failure_skips_keep_alive() {
        let transport = Arc::new(
            RecordingTransport::new()
                .route("/embed/", 200, &sample_embed_page("S1", "C1", "SECRET"))
                .route("/ping", 403, ""),
        );
        let err = context(&transport).open(reference()).await.err().unwrap();

        assert!(matches!(
            err,
            SessionError::ActivationRejected {
                step: ActivationStep::Ping,
                ..
            }
        ));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_validation_happens_before_network() {
        for (embed_url, referer) in [("not-a-url", REFERER_URL), (EMBED_URL, "ftp://bad")] {
            let transport = Arc::new(RecordingTransport::new());
            let err = context(&transport)
                .open_urls(embed_url, referer)
                .await
                .err()
                .unwrap();
            assert!(matches!(err, SessionError::Validation(_)));
            assert_eq!(transport.call_count(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_resolution_skips_keep_alive() {
        let transport = happy_transport();
        let config = SessionConfig::default().with_resolution(ResolutionSelector::preferred("4320"));
        let err = SessionContext::with_transport(
            Arc::clone(&transport),
            FingerprintProfile::generate(Some(9)),
            config,
        )
        .open(reference())
        .await
        .err()
        .unwrap();

        assert!(matches!(err, SessionError::Playlist(_)));
        let calls = transport.call_count();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(transport.call_count(), calls);
    }
}
