//! Config subcommand handlers.

use std::path::PathBuf;

use dialoguer::{Input, Password, Select};

use meshgate_config::store_api_key;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

use super::util::{self, prompt_err};

const SETTABLE_KEYS: &str = "gateway_id, api_url, api_key, api_key_env, host, port, \
     topic_prefix, client_id, credentials, ca_cert, client_cert, private_key, tls, timeout, \
     keep_alive, rediscover_new_nodes, discover_on_connect";

// ── Helpers ─────────────────────────────────────────────────────────

/// A copy safe to print: plaintext keys are masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.api_key.is_some() {
            profile.api_key = Some("****".into());
        }
    }
    cfg
}

fn format_config(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(default) = &cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out, "\n[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);
    let _ = writeln!(out, "keep_alive = {}", cfg.defaults.keep_alive);

    for (name, p) in &cfg.profiles {
        let _ = writeln!(out, "\n[profiles.{name}]");
        let strings = [
            ("gateway_id", &p.gateway_id),
            ("api_url", &p.api_url),
            ("api_key", &p.api_key),
            ("api_key_env", &p.api_key_env),
            ("host", &p.host),
            ("topic_prefix", &p.topic_prefix),
            ("client_id", &p.client_id),
        ];
        for (key, value) in strings {
            if let Some(value) = value {
                let _ = writeln!(out, "{key} = \"{value}\"");
            }
        }
        if let Some(port) = p.port {
            let _ = writeln!(out, "port = {port}");
        }
        let paths = [
            ("credentials", &p.credentials),
            ("ca_cert", &p.ca_cert),
            ("client_cert", &p.client_cert),
            ("private_key", &p.private_key),
        ];
        for (key, value) in paths {
            if let Some(path) = value {
                let _ = writeln!(out, "{key} = \"{}\"", path.display());
            }
        }
        let flags = [
            ("tls", p.tls),
            ("rediscover_new_nodes", p.rediscover_new_nodes),
            ("discover_on_connect", p.discover_on_connect),
        ];
        for (key, value) in flags {
            if let Some(value) = value {
                let _ = writeln!(out, "{key} = {value}");
            }
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(keep_alive) = p.keep_alive {
            let _ = writeln!(out, "keep_alive = {keep_alive}");
        }
    }
    out
}

fn parse_field<T: std::str::FromStr>(key: &str, value: &str, expected: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: key.into(),
        reason: format!("must be {expected}"),
    })
}

/// Set one profile field from its `config set` name.
fn apply_setting(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    let key = key.replace('-', "_");
    match key.as_str() {
        "gateway_id" => profile.gateway_id = Some(value),
        "api_url" => {
            meshgate_config::parse_api_url(&value)?;
            profile.api_url = Some(value);
        }
        "api_key" => profile.api_key = Some(value),
        "api_key_env" => profile.api_key_env = Some(value),
        "host" => profile.host = Some(value),
        "port" => profile.port = Some(parse_field(&key, &value, "a port number")?),
        "topic_prefix" => profile.topic_prefix = Some(value),
        "client_id" => profile.client_id = Some(value),
        "credentials" => profile.credentials = Some(PathBuf::from(value)),
        "ca_cert" => profile.ca_cert = Some(PathBuf::from(value)),
        "client_cert" => profile.client_cert = Some(PathBuf::from(value)),
        "private_key" => profile.private_key = Some(PathBuf::from(value)),
        "tls" => profile.tls = Some(parse_field(&key, &value, "'true' or 'false'")?),
        "timeout" => profile.timeout = Some(parse_field(&key, &value, "a number (seconds)")?),
        "keep_alive" => {
            profile.keep_alive = Some(parse_field(&key, &value, "a number (seconds)")?);
        }
        "rediscover_new_nodes" => {
            profile.rediscover_new_nodes = Some(parse_field(&key, &value, "'true' or 'false'")?);
        }
        "discover_on_connect" => {
            profile.discover_on_connect = Some(parse_field(&key, &value, "'true' or 'false'")?);
        }
        _ => {
            return Err(CliError::Validation {
                field: key.clone(),
                reason: format!("unknown config key '{key}'. Valid keys: {SETTABLE_KEYS}"),
            });
        }
    }
    Ok(())
}

/// Keyring by default; `Some(key)` when the operator picks plaintext.
fn prompt_key_storage(profile_name: &str, key: String) -> Result<Option<String>, CliError> {
    let choices = [
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the API key?")
        .items(&choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        store_api_key(profile_name, &key)?;
        eprintln!("   ✓ API key stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(key))
    }
}

fn prompt_api_key() -> Result<String, CliError> {
    let key = Password::new()
        .with_prompt("nRF Cloud API key")
        .interact()
        .map_err(prompt_err)?;
    if key.is_empty() {
        return Err(CliError::Validation {
            field: "api_key".into(),
            reason: "API key cannot be empty".into(),
        });
    }
    Ok(key)
}

fn prompt_line(prompt: &str, default: &str) -> Result<String, CliError> {
    Input::new()
        .with_prompt(prompt)
        .default(default.to_owned())
        .interact_text()
        .map_err(prompt_err)
}

// ── Init wizard ─────────────────────────────────────────────────────

fn init() -> Result<(), CliError> {
    let config_path = config::config_path();
    eprintln!("meshgate configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    let profile_name = prompt_line("Profile name", "default")?;
    let gateway_id: String = Input::new()
        .with_prompt("Gateway device id")
        .interact_text()
        .map_err(prompt_err)?;

    let sources = [
        "Look up the broker through my nRF Cloud account",
        "Connect to a broker directly",
    ];
    let source = Select::new()
        .with_prompt("How to reach the gateway")
        .items(&sources)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    let mut profile = Profile {
        gateway_id: Some(gateway_id),
        ..Profile::default()
    };
    if source == 0 {
        let key = prompt_api_key()?;
        profile.api_key = prompt_key_storage(&profile_name, key)?;
    } else {
        profile.host = Some(prompt_line("Broker host", "localhost")?);
        let topic_prefix: String = Input::new()
            .with_prompt("Topic prefix (empty for none)")
            .allow_empty(true)
            .interact_text()
            .map_err(prompt_err)?;
        if !topic_prefix.is_empty() {
            profile.topic_prefix = Some(topic_prefix);
        }
    }
    profile.credentials = Some(PathBuf::from(prompt_line(
        "Directory with caCert.crt, clientCert.crt and privateKey.key",
        "credentials",
    )?));

    let mut cfg = config::load_config_or_default();
    cfg.profiles.insert(profile_name.clone(), profile);
    cfg.default_profile = Some(profile_name.clone());
    let path = config::save_config(&cfg)?;

    eprintln!("\n✓ Configuration written to {}", path.display());
    eprintln!("  Active profile: {profile_name}");
    eprintln!("\n  Test it: meshgate nodes list");
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(),

        ConfigCommand::Show => {
            let cfg = redacted(&config::load_config_or_default());
            let out = output::render_single(&global.output, &cfg, format_config, |_| {
                "config".into()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);
            let profile = cfg.profiles.entry(profile_name.clone()).or_default();
            apply_setting(profile, &key, value)?;

            config::save_config(&cfg)?;
            util::status(global, &format!("✓ Set {key} on profile '{profile_name}'"));
            Ok(())
        }

        ConfigCommand::SetKey { profile } => {
            let cfg = config::load_config_or_default();
            let name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name,
                });
            }
            let key = prompt_api_key()?;
            store_api_key(&name, &key)?;
            util::status(global, &format!("✓ API key stored in system keyring for '{name}'"));
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            util::status(global, &format!("✓ Default profile set to '{name}'"));
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.active_profile_name(None);
            if cfg.profiles.is_empty() {
                util::status(global, "No profiles configured. Run: meshgate config init");
            }
            for name in cfg.profiles.keys() {
                let marker = if *name == default { " *" } else { "" };
                println!("{name}{marker}");
            }
            Ok(())
        }

        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use meshgate_config::Defaults;
    use pretty_assertions::assert_eq;

    fn fresh_config(profile_name: &str, profile: Profile) -> Config {
        Config {
            default_profile: Some(profile_name.into()),
            defaults: Defaults::default(),
            profiles: [(profile_name.to_owned(), profile)].into_iter().collect(),
        }
    }

    #[test]
    fn settings_accept_dashed_names() {
        let mut profile = Profile::default();
        apply_setting(&mut profile, "gateway-id", "nrf-1".into()).unwrap();
        apply_setting(&mut profile, "port", "1883".into()).unwrap();
        apply_setting(&mut profile, "tls", "false".into()).unwrap();
        apply_setting(&mut profile, "discover_on_connect", "true".into()).unwrap();

        assert_eq!(profile.gateway_id.as_deref(), Some("nrf-1"));
        assert_eq!(profile.port, Some(1883));
        assert_eq!(profile.tls, Some(false));
        assert_eq!(profile.discover_on_connect, Some(true));
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut profile = Profile::default();
        let err = apply_setting(&mut profile, "port", "99999".into()).unwrap_err();
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "port"));

        let err = apply_setting(&mut profile, "controller", "x".into()).unwrap_err();
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "controller"));
        assert_eq!(profile, Profile::default());
    }

    #[test]
    fn show_masks_plaintext_keys() {
        let cfg = fresh_config(
            "lab",
            Profile {
                gateway_id: Some("nrf-1".into()),
                api_key: Some("secret".into()),
                ..Profile::default()
            },
        );
        let text = format_config(&redacted(&cfg));
        assert!(text.contains("[profiles.lab]"));
        assert!(text.contains("api_key = \"****\""));
        assert!(!text.contains("secret"));
    }
}
