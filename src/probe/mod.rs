//! Probe module for liveness checks.
//!
//! Supports ICMP, HTTP, and DNS probes. Every prober exposes the same
//! contract: `is_alive()` returns an up/down verdict plus a human-readable
//! detail string, and never fails for expected network failure classes.

mod dns;
mod http;
mod ping;

pub use dns::DnsProbe;
pub use http::HttpProbe;
pub use ping::IcmpProbe;

use serde::Deserialize;
use thiserror::Error;

/// Probe protocol, as named in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ProbeKind {
    #[serde(rename = "ICMP")]
    Icmp,
    #[serde(rename = "Web")]
    Http,
    #[serde(rename = "DNS")]
    Dns,
}

/// Internal probe failures. Never escapes `is_alive`; each prober converts
/// these into a `(false, detail)` verdict at its boundary.
#[derive(Error, Debug)]
pub(crate) enum ProbeError {
    #[error("network error: {0}")]
    Network(String),
}

/// Polymorphic prober, one variant per protocol.
#[derive(Debug)]
pub enum Prober {
    Icmp(IcmpProbe),
    Http(HttpProbe),
    Dns(DnsProbe),
}

impl Prober {
    /// Build a prober for `target` with the protocol's default parameters.
    pub fn build(target: &str, kind: ProbeKind) -> Self {
        match kind {
            ProbeKind::Icmp => Prober::Icmp(IcmpProbe::new(target)),
            ProbeKind::Http => Prober::Http(HttpProbe::new(target)),
            ProbeKind::Dns => Prober::Dns(DnsProbe::new(target)),
        }
    }

    /// The monitored endpoint this prober checks.
    pub fn target(&self) -> &str {
        match self {
            Prober::Icmp(p) => p.target(),
            Prober::Http(p) => p.target(),
            Prober::Dns(p) => p.target(),
        }
    }

    /// Probe once. Expected network failures become `(false, detail)`.
    pub async fn is_alive(&self) -> (bool, String) {
        match self {
            Prober::Icmp(p) => p.is_alive().await,
            Prober::Http(p) => p.is_alive().await,
            Prober::Dns(p) => p.is_alive().await,
        }
    }
}
