//! Ping signatures.
//!
//! The signature scheme is a property of the remote player and may change
//! independently of everything else, hence the trait.

use md5::{Digest, Md5};

use crate::handshake::SessionIdentifiers;

/// Playback state reported by a single ping.
#[derive(Debug, Clone, PartialEq)]
pub struct PingTick {
    /// Playback position in seconds.
    pub time: f64,
    pub paused: bool,
    /// Height of the chosen rendition, `0` before one is chosen.
    pub resolution: String,
}

impl PingTick {
    /// The tick sent during activation, before playback starts.
    pub fn initial() -> Self {
        Self {
            time: 0.0,
            paused: true,
            resolution: "0".to_string(),
        }
    }

    /// Position as the player prints it: the initial tick sends `0`, later
    /// ticks keep a fractional part even when it is zero (`2.0`).
    pub fn time_param(&self) -> String {
        if *self != Self::initial() && self.time.fract() == 0.0 {
            format!("{:.1}", self.time)
        } else {
            format!("{}", self.time)
        }
    }

    pub fn paused_param(&self) -> &'static str {
        if self.paused { "true" } else { "false" }
    }
}

pub trait PingSigner: Send + Sync {
    fn sign(&self, identifiers: &SessionIdentifiers, tick: &PingTick) -> String;
}

/// `md5("{secret}_{context}_{time}_{paused}_{res}")`, hex encoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct Md5PingSigner;

impl PingSigner for Md5PingSigner {
    fn sign(&self, identifiers: &SessionIdentifiers, tick: &PingTick) -> String {
        let payload = format!(
            "{}_{}_{}_{}_{}",
            identifiers.secret.expose(),
            identifiers.context_id,
            tick.time_param(),
            tick.paused_param(),
            tick.resolution
        );
        let mut hasher = Md5::new();
        hasher.update(payload.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
