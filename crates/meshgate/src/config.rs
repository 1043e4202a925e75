//! CLI configuration: thin wrapper around `meshgate_config` shared types.
//!
//! Re-exports the shared types and adds resolution that respects
//! `GlobalOpts` flag overrides (--gateway, --api-key, --timeout).

use std::time::Duration;

use secrecy::SecretString;

use meshgate_api::{AccountClient, DEFAULT_API_URL};
use meshgate_core::SessionConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use meshgate_config::{
    Config, Profile, config_path, load_config, load_config_or_default, save_config,
};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    config.active_profile_name(global.profile.as_deref())
}

/// The active profile with flag overrides applied.
///
/// Without a saved profile, `--gateway` alone is enough to start from
/// an empty one; otherwise there is nothing to connect to.
fn resolve_profile(global: &GlobalOpts, cfg: &Config) -> Result<(String, Profile), CliError> {
    let name = active_profile_name(global, cfg);

    let mut profile = match cfg.profiles.get(&name) {
        Some(profile) => profile.clone(),
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                available: available_profiles(cfg),
                name,
            });
        }
        None if global.gateway.is_some() || global.api_key.is_some() => Profile::default(),
        None => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    if let Some(gateway) = &global.gateway {
        profile.gateway_id = Some(gateway.clone());
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    Ok((name, profile))
}

/// Build the `SessionConfig` for a gateway-bound command.
pub fn build_session_config(global: &GlobalOpts) -> Result<SessionConfig, CliError> {
    let cfg = load_config()?;
    let (name, profile) = resolve_profile(global, &cfg)?;
    let flag_key = global.api_key.clone().map(SecretString::from);

    let config =
        meshgate_config::session_config_with_key(&profile, &name, &cfg.defaults, flag_key)?;
    tracing::debug!(
        profile = %name,
        gateway = %config.gateway_id,
        endpoint = %config.endpoint.describe(),
        "resolved session config"
    );
    Ok(config)
}

/// An nRF Cloud account client for the active profile.
pub fn build_account_client(global: &GlobalOpts) -> Result<AccountClient, CliError> {
    let cfg = load_config()?;
    let (name, profile) = resolve_profile(global, &cfg)?;

    let api_key = match &global.api_key {
        Some(key) => SecretString::from(key.clone()),
        None => meshgate_config::resolve_api_key(&profile, &name)?,
    };
    let api_url = meshgate_config::parse_api_url(
        profile.api_url.as_deref().unwrap_or(DEFAULT_API_URL),
    )?;
    let timeout = Duration::from_secs(profile.timeout.unwrap_or(cfg.defaults.timeout));

    AccountClient::new(api_url.as_str(), &api_key, timeout)
        .map_err(|e| CliError::from(meshgate_core::CoreError::from(e)))
}

pub fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        "(none)".into()
    } else {
        cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}
