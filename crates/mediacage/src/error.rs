use std::fmt;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Tokens the embed page parser looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedToken {
    ServerId,
    ContextId,
    Secret,
}

impl fmt::Display for EmbedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbedToken::ServerId => write!(f, "server id"),
            EmbedToken::ContextId => write!(f, "context id"),
            EmbedToken::Secret => write!(f, "secret"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeFailure {
    #[error("embed page unreachable: {0}")]
    Unreachable(String),
    #[error("missing {0} in embed page")]
    MissingToken(EmbedToken),
    #[error("unrecognized embed page shape")]
    UnrecognizedShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationStep {
    Ping,
    Activate,
}

impl fmt::Display for ActivationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationStep::Ping => write!(f, "ping"),
            ActivationStep::Activate => write!(f, "activate"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeFailure),
    #[error("access denied (status {status}): {snippet}")]
    AccessDenied { status: u16, snippet: String },
    #[error("activation rejected at {step} (status {status})")]
    ActivationRejected { step: ActivationStep, status: u16 },
    #[error("playlist error: {0}")]
    Playlist(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("transport closed")]
    TransportClosed,
    #[error("keep-alive error: {0}")]
    KeepAlive(String),
    #[error("download failed: {0}")]
    Download(#[source] BoxError),
    #[error("session cancelled")]
    Cancelled,
}

impl SessionError {
    /// Whether the transport itself is unusable, as opposed to a single
    /// request having failed.
    pub fn is_unrecoverable(&self) -> bool {
        match self {
            SessionError::TransportClosed => true,
            SessionError::Http(e) => e.is_builder(),
            _ => false,
        }
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
