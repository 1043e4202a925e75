//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text and a stable exit code.

use miette::Diagnostic;
use thiserror::Error;

use meshgate_config::ConfigError;
use meshgate_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the gateway through {endpoint}")]
    #[diagnostic(
        code(meshgate::connection_failed),
        help(
            "{reason}\n\
             Check the broker host, the TLS credentials directory and that the gateway is online."
        )
    )]
    ConnectionFailed { endpoint: String, reason: String },

    // ── Authentication & configuration ───────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(meshgate::auth_failed),
        help("Verify the nRF Cloud API key. Store a new one with: meshgate config set-key")
    )]
    AuthFailed { message: String },

    #[error("No API key configured for profile '{profile}'")]
    #[diagnostic(
        code(meshgate::no_credentials),
        help(
            "Configure credentials with: meshgate config init\n\
             Or set the MESHGATE_API_KEY environment variable."
        )
    )]
    NoCredentials { profile: String },

    #[error("No gateway configured for profile '{profile}'")]
    #[diagnostic(
        code(meshgate::no_gateway),
        help(
            "Pass --gateway, or run: meshgate config set gateway_id <ID>\n\
             List the account's gateways with: meshgate gateways"
        )
    )]
    NoGateway { profile: String },

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(meshgate::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: meshgate config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No configuration found")]
    #[diagnostic(
        code(meshgate::no_config),
        help(
            "Create one with: meshgate config init\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(meshgate::config))]
    Config { message: String },

    // ── Gateway answers ──────────────────────────────────────────────
    #[error("No response to {operation} within {seconds}s")]
    #[diagnostic(
        code(meshgate::timeout),
        help("Increase the bound with --timeout, or check that the gateway is online.")
    )]
    Timeout { operation: String, seconds: u64 },

    #[error("Gateway rejected {operation} with code {code}")]
    #[diagnostic(
        code(meshgate::rejected),
        help("The operation was not applied.")
    )]
    Rejected { operation: String, code: i64 },

    #[error("Gateway answered {operation} with an unrelated event")]
    #[diagnostic(
        code(meshgate::unexpected_response),
        help("Another client may be driving the same gateway. Retry the command.")
    )]
    UnexpectedResponse { operation: String },

    #[error("Network discovery aborted: {reason}")]
    #[diagnostic(code(meshgate::discovery_aborted))]
    DiscoveryAborted { reason: String },

    #[error("Session ended")]
    #[diagnostic(code(meshgate::cancelled))]
    Cancelled,

    // ── Resources ────────────────────────────────────────────────────
    #[error("No {resource_type} found: {identifier}")]
    #[diagnostic(
        code(meshgate::not_found),
        help("Run: meshgate {list_command}")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(meshgate::validation))]
    Validation { field: String, reason: String },

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(meshgate::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(meshgate::io))]
    Io(#[from] std::io::Error),

    #[error("Could not render output: {0}")]
    #[diagnostic(code(meshgate::render))]
    Render(String),

    #[error("Internal error: {0}")]
    #[diagnostic(code(meshgate::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. }
            | Self::NoCredentials { .. }
            | Self::NoGateway { .. }
            | Self::ProfileNotFound { .. }
            | Self::NoConfig { .. }
            | Self::Config { .. } => exit_code::CONFIG,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { endpoint, reason } => {
                Self::ConnectionFailed { endpoint, reason }
            }
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::Timeout {
                operation,
                timeout_secs,
            } => Self::Timeout {
                operation: operation.into(),
                seconds: timeout_secs,
            },
            CoreError::Cancelled => Self::Cancelled,
            CoreError::UnexpectedResponse { operation } => Self::UnexpectedResponse {
                operation: operation.into(),
            },
            CoreError::GatewayRejected { operation, code } => Self::Rejected {
                operation: operation.into(),
                code,
            },
            CoreError::DiscoveryAborted { reason } => Self::DiscoveryAborted { reason },
            CoreError::NotFound { entity, identifier } => Self::NotFound {
                resource_type: entity.into(),
                identifier,
                list_command: list_command_for(entity).into(),
            },
            CoreError::ValidationFailed { message } => Self::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Config { message } => Self::Config { message },
            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}

fn list_command_for(entity: &str) -> &'static str {
    match entity {
        "beacon" => "beacons",
        "subnet" => "subnets list",
        "application key" => "app-keys list",
        "subscription" => "subscriptions list",
        _ => "nodes list",
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::NoGateway { profile } => Self::NoGateway { profile },
            ConfigError::UnknownProfile { name } => Self::ProfileNotFound {
                name,
                available: String::new(),
            },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_keep_their_exit_codes() {
        let timeout: CliError = CoreError::Timeout {
            operation: "subnet_request",
            timeout_secs: 15,
        }
        .into();
        assert_eq!(timeout.exit_code(), exit_code::TIMEOUT);

        let rejected: CliError = CoreError::GatewayRejected {
            operation: "provision",
            code: -5,
        }
        .into();
        assert_eq!(rejected.exit_code(), exit_code::REJECTED);
        assert_eq!(rejected.to_string(), "Gateway rejected provision with code -5");

        let invalid: CliError = CoreError::ValidationFailed {
            message: "bad".into(),
        }
        .into();
        assert_eq!(invalid.exit_code(), exit_code::USAGE);
    }

    #[test]
    fn not_found_points_at_list_command() {
        let err: CliError = CoreError::NotFound {
            entity: "application key",
            identifier: "none available".into(),
        }
        .into();
        match err {
            CliError::NotFound { list_command, .. } => assert_eq!(list_command, "app-keys list"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_gateway_is_a_config_error() {
        let err: CliError = ConfigError::NoGateway {
            profile: "lab".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::CONFIG);
    }
}
