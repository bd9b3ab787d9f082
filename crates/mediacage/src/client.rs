use std::sync::Arc;

use reqwest::Client;
use rustls::{ClientConfig, crypto::ring};
use rustls_platform_verifier::BuilderVerifierExt;
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::SessionError;

/// Builds the HTTP client backing a single session.
///
/// Cookies are handled by [`HttpTransport`](crate::transport::HttpTransport),
/// so the client itself keeps no cookie store.
pub fn create_client(config: &SessionConfig) -> Result<Client, SessionError> {
    let provider = Arc::new(ring::default_provider());
    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| SessionError::Validation(format!("tls configuration: {e}")))?
        .with_platform_verifier()
        .map_err(|e| SessionError::Validation(format!("tls verifier: {e}")))?
        .with_no_client_auth();

    let mut builder = Client::builder()
        .use_preconfigured_tls(tls_config)
        .timeout(config.request_timeout)
        .pool_max_idle_per_host(4);

    if let Some(proxy_config) = &config.proxy {
        // An unusable proxy is an error, never a direct connection.
        let mut proxy = reqwest::Proxy::all(&proxy_config.url).map_err(|e| {
            SessionError::Validation(format!("invalid proxy '{}': {e}", proxy_config.url))
        })?;
        if let (Some(username), Some(password)) = (&proxy_config.username, &proxy_config.password)
        {
            proxy = proxy.basic_auth(username, password);
        }
        debug!("Routing session through configured proxy");
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}
