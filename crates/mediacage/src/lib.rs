//! Session negotiation for MediaCage protected video embeds.
//!
//! A [`SessionContext`] impersonates a browser loading the embed player:
//! it fetches the embed page for its session identifiers, activates the
//! session with a signed ping, picks a rendition and keeps the session alive
//! in the background while an external tool downloads the stream with the
//! resulting [`DownloadRequest`].

pub mod activation;
pub mod client;
pub mod config;
pub mod download;
pub mod embed;
pub mod error;
pub mod fingerprint;
pub mod handshake;
pub mod headers;
pub mod keepalive;
pub mod playlist;
pub mod session;
pub mod signing;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_utils;

pub use activation::{ActivationNegotiator, ActivationResult};
pub use config::{ProxyConfig, SessionConfig};
pub use download::{DownloadRequest, MediaDownloader};
pub use embed::EmbedReference;
pub use error::{ActivationStep, BoxError, EmbedToken, HandshakeFailure, SessionError};
pub use fingerprint::{Browser, FingerprintProfile, Platform};
pub use handshake::{
    EmbedPage, EmbedPageParser, HandshakeNegotiator, MediaDeliveryParser, Secret,
    SessionIdentifiers,
};
pub use keepalive::{KeepAliveHandle, KeepAliveScheduler, KeepAliveState};
pub use playlist::{PlaylistNegotiator, ResolutionSelector, StreamSelection};
pub use session::{AuthorizedSession, SessionContext};
pub use signing::{Md5PingSigner, PingSigner, PingTick};
pub use transport::{HttpTransport, SessionTransport, TransportRequest, TransportResponse};
