// Transport-neutral seams shared by the MQTT adapter and its consumers.
//
// The session only ever sees `Publish` (send side) and `Inbound` (receive
// side), so tests can drive it without a broker.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
use crate::wire::{EventEnvelope, OperationEnvelope};

// ── Send side ────────────────────────────────────────────────────────

/// Publishes operation envelopes to the gateway.
///
/// Implementations must not block: the discovery chain publishes its next
/// step from inside the receive loop.
pub trait Publish: Send + Sync {
    fn publish(&self, envelope: &OperationEnvelope) -> Result<(), Error>;
}

// ── Receive side ─────────────────────────────────────────────────────

/// What the receive loop hands to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The broker acknowledged our subscription to the events topic.
    Subscribed,
    /// A JSON envelope arrived on the events topic.
    Event(EventEnvelope),
    /// Something arrived on the events topic that is not a JSON envelope.
    Malformed { reason: String },
}

impl Inbound {
    /// Classify a raw events-topic payload.
    pub fn from_payload(payload: &[u8]) -> Self {
        match EventEnvelope::from_slice(payload) {
            Ok(envelope) => Self::Event(envelope),
            Err(e) => Self::Malformed {
                reason: format!("{e} ({} bytes)", payload.len()),
            },
        }
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for broker reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% so a fleet of consoles does not reconnect in lockstep.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── TLS credentials ──────────────────────────────────────────────────

/// Locations of the mutual-TLS material nRF Cloud requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub ca_cert: PathBuf,
    pub client_cert: PathBuf,
    pub private_key: PathBuf,
}

/// PEM contents of a [`TlsFiles`] set.
#[derive(Clone)]
pub struct TlsMaterial {
    pub ca_cert: Vec<u8>,
    pub client_cert: Vec<u8>,
    pub private_key: Vec<u8>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca_cert", &self.ca_cert.len())
            .field("client_cert", &self.client_cert.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl TlsFiles {
    pub const CA_CERT: &'static str = "caCert.crt";
    pub const CLIENT_CERT: &'static str = "clientCert.crt";
    pub const PRIVATE_KEY: &'static str = "privateKey.key";

    /// The conventional file names inside a credentials directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            ca_cert: dir.join(Self::CA_CERT),
            client_cert: dir.join(Self::CLIENT_CERT),
            private_key: dir.join(Self::PRIVATE_KEY),
        }
    }

    pub async fn load(&self) -> Result<TlsMaterial, Error> {
        Ok(TlsMaterial {
            ca_cert: read_credential(&self.ca_cert).await?,
            client_cert: read_credential(&self.client_cert).await?,
            private_key: read_credential(&self.private_key).await?,
        })
    }
}

async fn read_credential(path: &Path) -> Result<Vec<u8>, Error> {
    tokio::fs::read(path).await.map_err(|source| Error::Credential {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d10 = calculate_backoff(10, &config);
        assert!(
            d10 <= Duration::from_secs(13),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
    }

    #[test]
    fn payload_classification() {
        let ok = Inbound::from_payload(br#"{"type":"event","event":{"type":"node_list","nodes":[]}}"#);
        assert!(matches!(ok, Inbound::Event(ref e) if e.is_event()));

        let bad = Inbound::from_payload(b"\x00\x01 not json");
        assert!(matches!(bad, Inbound::Malformed { .. }));
    }

    #[test]
    fn conventional_credential_names() {
        let files = TlsFiles::in_dir("/etc/meshgate");
        assert_eq!(files.ca_cert, PathBuf::from("/etc/meshgate/caCert.crt"));
        assert_eq!(files.private_key, PathBuf::from("/etc/meshgate/privateKey.key"));
    }

    #[tokio::test]
    async fn load_reads_all_three_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TlsFiles::CA_CERT), b"ca").unwrap();
        std::fs::write(dir.path().join(TlsFiles::CLIENT_CERT), b"cert").unwrap();
        std::fs::write(dir.path().join(TlsFiles::PRIVATE_KEY), b"key").unwrap();

        let material = TlsFiles::in_dir(dir.path()).load().await.unwrap();
        assert_eq!(material.client_cert, b"cert");
        assert!(!format!("{material:?}").contains("key\""));
    }

    #[tokio::test]
    async fn missing_credential_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = TlsFiles::in_dir(dir.path()).load().await.unwrap_err();
        match err {
            Error::Credential { path, .. } => assert!(path.ends_with("caCert.crt")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
