use thiserror::Error;

/// Top-level error type for the `meshgate-api` crate.
///
/// Covers the account lookup (HTTP), the MQTT transport, credential
/// loading, and wire encoding. `meshgate-core` maps these into
/// session-level diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Account lookup ──────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The account API answered with a non-success status.
    #[error("Account API error (HTTP {status}): {message}")]
    Account { status: u16, message: String },

    /// The account API rejected the API key.
    #[error("Invalid API key")]
    InvalidApiKey,

    // ── MQTT ────────────────────────────────────────────────────────
    /// The MQTT client refused a request (queue full, client closed).
    #[error("MQTT client error: {0}")]
    Mqtt(String),

    /// The MQTT connection to the broker failed.
    #[error("MQTT connection failed: {0}")]
    MqttConnection(String),

    // ── Credentials ─────────────────────────────────────────────────
    /// A TLS credential file could not be read.
    #[error("Cannot read TLS credential {path}: {source}")]
    Credential {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// Encoding an outbound envelope failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::MqttConnection(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if the account API refused our credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::InvalidApiKey | Self::Account { status: 401 | 403, .. })
    }
}
