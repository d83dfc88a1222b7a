// ── Runtime client configuration ──
//
// These types describe *where* the backend lives and how the client
// services are tuned. They never touch disk: `ledgerlink-config` (or a
// test) builds a `ClientConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (local development backends only).
    DangerAcceptInvalid,
}

/// Configuration for one backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST API root (e.g., `https://bank.example`).
    pub base_url: Url,
    /// STOMP/WebSocket broker endpoint (e.g., `wss://bank.example/ws`).
    pub realtime_url: Url,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
    /// TTL applied to cacheable reads that don't specify their own.
    pub cache_ttl: Duration,
    /// Fixed delay between notification reconnect attempts.
    pub reconnect_delay: Duration,
    /// Consecutive failed reconnects before giving up. `None` = forever.
    pub max_reconnect_attempts: Option<u32>,
    /// How often the held token's expiry is re-checked.
    pub validity_check_interval: Duration,
    /// How often denormalized profile fields are re-fetched.
    pub profile_refresh_interval: Duration,
}

impl ClientConfig {
    /// Defaults for everything but the base URL. The realtime endpoint is
    /// derived as `ws(s)://{host}/ws`.
    pub fn new(base_url: Url) -> Self {
        let realtime_url = derive_realtime_url(&base_url);
        Self {
            base_url,
            realtime_url,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: None,
            validity_check_interval: Duration::from_secs(30),
            profile_refresh_interval: Duration::from_secs(120),
        }
    }
}

fn derive_realtime_url(base: &Url) -> Url {
    let mut url = base.clone();
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    // http(s) -> ws(s) is always permitted; anything else keeps its scheme.
    let _ = url.set_scheme(scheme);
    url.set_path("/ws");
    url.set_query(None);
    url
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_documented_intervals() {
        let config = ClientConfig::new(Url::parse("https://bank.example").unwrap());
        assert_eq!(config.cache_ttl, Duration::from_secs(30));
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.validity_check_interval, Duration::from_secs(30));
        assert_eq!(config.profile_refresh_interval, Duration::from_secs(120));
        assert!(config.max_reconnect_attempts.is_none());
        assert_eq!(config.tls, TlsVerification::SystemDefaults);
    }

    #[test]
    fn realtime_url_follows_base_scheme() {
        let secure = ClientConfig::new(Url::parse("https://bank.example/app?x=1").unwrap());
        assert_eq!(secure.realtime_url.as_str(), "wss://bank.example/ws");

        let local = ClientConfig::new(Url::parse("http://localhost:8080").unwrap());
        assert_eq!(local.realtime_url.as_str(), "ws://localhost:8080/ws");
    }
}
