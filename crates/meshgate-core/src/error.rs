// ── Core error types ──
//
// Session-level errors. Consumers never see MQTT client errors or HTTP
// status codes directly; `From<meshgate_api::Error>` translates them.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to gateway broker {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Correlation errors ───────────────────────────────────────────
    #[error("No response to {operation} within {timeout_secs}s")]
    Timeout {
        operation: &'static str,
        timeout_secs: u64,
    },

    #[error("Session cancelled")]
    Cancelled,

    /// The gate was released, but not by the event this request expects.
    #[error("Gateway answered {operation} with an unrelated event")]
    UnexpectedResponse { operation: &'static str },

    // ── Domain errors ────────────────────────────────────────────────
    #[error("Gateway rejected {operation} (code {code})")]
    GatewayRejected { operation: &'static str, code: i64 },

    #[error("Network discovery aborted: {reason}")]
    DiscoveryAborted { reason: String },

    #[error("{entity} not found: {identifier}")]
    NotFound { entity: &'static str, identifier: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn timeout(operation: &'static str, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation,
            timeout_secs: timeout.as_secs(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<meshgate_api::Error> for CoreError {
    fn from(err: meshgate_api::Error) -> Self {
        use meshgate_api::Error as Api;

        match err {
            Api::InvalidApiKey => CoreError::AuthenticationFailed {
                message: "Invalid nRF Cloud API key".into(),
            },
            Api::Account { status: 401 | 403, message } => {
                CoreError::AuthenticationFailed { message }
            }
            Api::Account { status, message } => CoreError::ConnectionFailed {
                endpoint: "nRF Cloud account API".into(),
                reason: format!("HTTP {status}: {message}"),
            },
            Api::Http(ref e) => CoreError::ConnectionFailed {
                endpoint: e
                    .url()
                    .map_or_else(|| "<unknown>".into(), ToString::to_string),
                reason: e.to_string(),
            },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Mqtt(reason) | Api::MqttConnection(reason) => CoreError::ConnectionFailed {
                endpoint: "MQTT broker".into(),
                reason,
            },
            Api::Credential { path, source } => CoreError::Config {
                message: format!("Cannot read TLS credential {path}: {source}"),
            },
            Api::Serialization(e) => CoreError::Internal(format!("Serialization error: {e}")),
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_account_is_auth_failure() {
        let err: CoreError = meshgate_api::Error::Account {
            status: 403,
            message: "forbidden".into(),
        }
        .into();
        assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    }

    #[test]
    fn mqtt_errors_become_connection_failures() {
        let err: CoreError = meshgate_api::Error::MqttConnection("refused".into()).into();
        assert_eq!(
            err.to_string(),
            "Cannot connect to gateway broker MQTT broker: refused"
        );
    }

    #[test]
    fn timeout_message_names_operation() {
        let err = CoreError::timeout("subnet_request", std::time::Duration::from_secs(15));
        assert_eq!(err.to_string(), "No response to subnet_request within 15s");
    }
}
