//! Background pings that keep an activated session alive while the
//! download runs.

use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};
use reqwest::header::HeaderMap;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::activation::ping_request;
use crate::error::SessionError;
use crate::handshake::SessionIdentifiers;
use crate::signing::{PingSigner, PingTick};
use crate::transport::SessionTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveState {
    Idle,
    Running,
    Stopped,
}

/// A keep-alive loop that has not been started yet.
pub struct KeepAliveScheduler<T: SessionTransport + ?Sized> {
    transport: Arc<T>,
    signer: Arc<dyn PingSigner>,
    headers: HeaderMap,
    interval: Duration,
}

impl<T: SessionTransport + ?Sized> KeepAliveScheduler<T> {
    pub fn new(
        transport: Arc<T>,
        signer: Arc<dyn PingSigner>,
        headers: HeaderMap,
        interval: Duration,
    ) -> Self {
        Self {
            transport,
            signer,
            headers,
            interval,
        }
    }

    pub fn state(&self) -> KeepAliveState {
        KeepAliveState::Idle
    }

    /// Spawns the loop on the current tokio runtime. The first ping goes out
    /// immediately, then one per interval.
    pub fn start(
        self,
        identifiers: Arc<SessionIdentifiers>,
        resolution: String,
    ) -> Result<KeepAliveHandle, SessionError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SessionError::KeepAlive(format!("no async runtime: {e}")))?;

        let token = CancellationToken::new();
        let interval = self.interval;
        let task = runtime.spawn(ping_loop(
            self.transport,
            self.signer,
            self.headers,
            identifiers,
            resolution,
            interval,
            token.clone(),
        ));
        info!("Keep-alive started ({:?} interval)", interval);

        Ok(KeepAliveHandle {
            token,
            task: Some(task),
            interval,
            state: KeepAliveState::Running,
        })
    }
}

async fn ping_loop<T: SessionTransport + ?Sized>(
    transport: Arc<T>,
    signer: Arc<dyn PingSigner>,
    headers: HeaderMap,
    identifiers: Arc<SessionIdentifiers>,
    resolution: String,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut rng = StdRng::from_os_rng();
    let mut position = 0.0_f64;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // The player reports a slightly jittered position every second.
        let jitter = (rng.random::<f64>() * 1e6).round() / 1e6;
        let tick = PingTick {
            time: position + jitter,
            paused: false,
            resolution: resolution.clone(),
        };
        position += 1.0;

        let request = ping_request(&identifiers, &tick, signer.as_ref(), &headers);
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            outcome = transport.request(request) => outcome,
        };

        match outcome {
            Ok(response) if response.is_success() => trace!("Keep-alive ping at {:.6}", tick.time),
            Ok(response) => warn!("Keep-alive ping rejected with status {}", response.status),
            Err(e) if e.is_unrecoverable() => {
                warn!("Keep-alive stopping, transport unusable: {}", e);
                break;
            }
            Err(e) => warn!("Keep-alive ping failed: {}", e),
        }
    }

    debug!("Keep-alive loop exited");
}

/// Running keep-alive loop. Only the owning session stops it.
#[derive(Debug)]
pub struct KeepAliveHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
    interval: Duration,
    state: KeepAliveState,
}

impl KeepAliveHandle {
    pub fn state(&self) -> KeepAliveState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The loop ended on its own, e.g. because the transport was closed.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signals the loop and waits until it has exited. Once this returns no
    /// further ping is sent. Calling it again is a no-op.
    pub async fn stop(&mut self) {
        if self.state != KeepAliveState::Running {
            return;
        }
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Keep-alive task ended abnormally: {}", e);
            }
        }
        self.state = KeepAliveState::Stopped;
        info!("Keep-alive stopped");
    }
}

impl Drop for KeepAliveHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            warn!("Keep-alive handle dropped while running, aborting loop");
            self.token.cancel();
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::Secret;
    use crate::signing::Md5PingSigner;
    use crate::test_utils::RecordingTransport;

    fn identifiers() -> Arc<SessionIdentifiers> {
        Arc::new(SessionIdentifiers {
            server_id: "S1".into(),
            context_id: "C1".into(),
            secret: Secret::new("SECRET"),
        })
    }

    fn scheduler(transport: Arc<RecordingTransport>) -> KeepAliveScheduler<RecordingTransport> {
        KeepAliveScheduler::new(
            transport,
            Arc::new(Md5PingSigner),
            HeaderMap::new(),
            Duration::from_secs(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadence_and_stop() {
        let transport = Arc::new(RecordingTransport::new());
        let scheduler = scheduler(transport.clone());
        assert_eq!(scheduler.state(), KeepAliveState::Idle);

        let mut handle = scheduler.start(identifiers(), "720".into()).unwrap();
        assert_eq!(handle.state(), KeepAliveState::Running);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let pings = transport.count_matching("/.drm/C1/ping");
        assert!((4..=6).contains(&pings), "got {pings} pings");

        handle.stop().await;
        assert_eq!(handle.state(), KeepAliveState::Stopped);
        let after_stop = transport.call_count();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.call_count(), after_stop);

        handle.stop().await;
        assert_eq!(handle.state(), KeepAliveState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_parameters() {
        let transport = Arc::new(RecordingTransport::new());
        let mut handle = scheduler(transport.clone())
            .start(identifiers(), "1080".into())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.stop().await;

        let calls = transport.calls();
        assert!(calls.len() >= 2);
        for (i, call) in calls.iter().enumerate() {
            let param = |name: &str| {
                call.query
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.clone())
                    .unwrap()
            };
            assert_eq!(param("paused"), "false");
            assert_eq!(param("chosen_res"), "1080");
            let time: f64 = param("time").parse().unwrap();
            assert!(time >= i as f64 && time <= i as f64 + 1.0, "tick {i}: {time}");
            assert_eq!(param("hash").len(), 32);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ticks_do_not_stop_loop() {
        let transport = Arc::new(RecordingTransport::new().route("/ping", 500, ""));
        let mut handle = scheduler(transport.clone())
            .start(identifiers(), "720".into())
            .unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(transport.call_count() >= 3);
        assert!(!handle.is_finished());
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_transport_ends_loop() {
        let transport = Arc::new(RecordingTransport::new());
        let mut handle = scheduler(transport.clone())
            .start(identifiers(), "720".into())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        transport.close();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(handle.is_finished());
        handle.stop().await;
        assert_eq!(handle.state(), KeepAliveState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_loop() {
        let transport = Arc::new(RecordingTransport::new());
        let handle = scheduler(transport.clone())
            .start(identifiers(), "720".into())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        drop(handle);
        tokio::task::yield_now().await;

        let after_drop = transport.call_count();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.call_count(), after_drop);
    }

    #[test]
    fn test_start_without_runtime() {
        let transport = Arc::new(RecordingTransport::new());
        let err = scheduler(transport)
            .start(identifiers(), "720".into())
            .unwrap_err();
        assert!(matches!(err, SessionError::KeepAlive(_)));
    }
}
