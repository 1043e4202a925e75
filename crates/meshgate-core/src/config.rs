// ── Runtime session configuration ──
//
// Describes how to reach one gateway. Carries credential data and
// timing knobs but never touches disk; `meshgate-config` builds it.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use meshgate_api::{ReconnectConfig, TlsFiles};

/// Default bound on every gateway round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Where the MQTT broker and topic prefix come from.
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// Ask the nRF Cloud account API for the broker and topic prefix.
    Account { api_url: Url, api_key: SecretString },
    /// Connect to a known broker directly.
    Broker {
        host: String,
        topic_prefix: String,
        client_id: String,
    },
}

/// Configuration for a single gateway session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: Endpoint,
    pub gateway_id: String,
    pub port: u16,
    /// Mutual-TLS material; `None` for plain TCP to a local broker.
    pub tls: Option<TlsFiles>,
    pub keep_alive: Duration,
    /// Bound on each request/response round trip (and on each discovery step).
    pub timeout: Duration,
    /// Discover nodes that appear in a later node list after a refresh.
    pub rediscover_new_nodes: bool,
    /// Run a full network refresh as soon as the session is connected.
    pub discover_on_connect: bool,
    pub reconnect: ReconnectConfig,
}

impl SessionConfig {
    pub fn new(endpoint: Endpoint, gateway_id: impl Into<String>) -> Self {
        Self {
            endpoint,
            gateway_id: gateway_id.into(),
            port: 8883,
            tls: None,
            keep_alive: Duration::from_secs(30),
            timeout: DEFAULT_TIMEOUT,
            rediscover_new_nodes: true,
            discover_on_connect: false,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Endpoint {
    /// Human-readable location, for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Self::Account { api_url, .. } => api_url.to_string(),
            Self::Broker { host, .. } => host.clone(),
        }
    }
}
