use std::time::Duration;

use crate::playlist::ResolutionSelector;

/// Interval between keep-alive pings; the player reports progress once a second.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub keep_alive_interval: Duration,
    pub request_timeout: Duration,
    pub proxy: Option<ProxyConfig>,
    pub resolution: ResolutionSelector,
    /// Fixes the generated fingerprint, mostly useful for debugging.
    pub fingerprint_seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            proxy: None,
            resolution: ResolutionSelector::Highest,
            fingerprint_seed: None,
        }
    }
}

impl SessionConfig {
    pub fn with_resolution(mut self, resolution: ResolutionSelector) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_fingerprint_seed(mut self, seed: u64) -> Self {
        self.fingerprint_seed = Some(seed);
        self
    }
}
