//! Shared configuration for the meshgate console.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `meshgate_core::SessionConfig`. The CLI layers its
//! `GlobalOpts` overrides on top of what this crate resolves.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use meshgate_api::DEFAULT_API_URL;
use meshgate_core::{DEFAULT_TIMEOUT, Endpoint, SessionConfig, TlsFiles};

const KEYRING_SERVICE: &str = "meshgate";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no API key configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("no gateway configured for profile '{profile}'")]
    NoGateway { profile: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named gateway profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// The profile name `--profile` resolves to when absent.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Seconds to wait for each gateway response.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// MQTT keep-alive, seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            keep_alive: default_keep_alive(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}
fn default_keep_alive() -> u64 {
    30
}

/// A named gateway profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// nRF Cloud REST API base URL.
    pub api_url: Option<String>,

    /// API key (plaintext; prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Gateway device id, e.g. "nrf-352656100000000".
    pub gateway_id: Option<String>,

    /// Explicit broker; skips the account lookup when set.
    pub host: Option<String>,
    pub port: Option<u16>,
    pub topic_prefix: Option<String>,
    pub client_id: Option<String>,

    /// Directory holding caCert.crt, clientCert.crt and privateKey.key.
    pub credentials: Option<PathBuf>,
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub private_key: Option<PathBuf>,

    /// Set to false for plain TCP to a local broker.
    pub tls: Option<bool>,

    pub timeout: Option<u64>,
    pub keep_alive: Option<u64>,
    pub rediscover_new_nodes: Option<bool>,
    pub discover_on_connect: Option<bool>,
}

impl Profile {
    /// TLS file locations: the credentials directory, then per-file overrides.
    pub fn tls_files(&self) -> Option<TlsFiles> {
        if self.tls == Some(false) {
            return None;
        }
        let dir = self
            .credentials
            .clone()
            .unwrap_or_else(|| PathBuf::from("credentials"));
        let mut files = TlsFiles::in_dir(dir);
        if let Some(path) = &self.ca_cert {
            files.ca_cert.clone_from(path);
        }
        if let Some(path) = &self.client_cert {
            files.client_cert.clone_from(path);
        }
        if let Some(path) = &self.private_key {
            files.private_key.clone_from(path);
        }
        Some(files)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "meshgate", "meshgate").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("meshgate");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then the TOML file at `path` (if any), then `MESHGATE_*`
/// variables (`__` separates nesting, e.g. `MESHGATE_DEFAULTS__TIMEOUT`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("MESHGATE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(&path, cfg)?;
    Ok(path)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution (without CLI flags) ───────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/api-key"))
}

/// Resolve an API key from the credential chain (no CLI flag step).
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's api_key_env → env var lookup
    if let Some(ref env_name) = profile.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref key) = profile.api_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store an API key in the system keyring for `profile_name`.
pub fn store_api_key(profile_name: &str, api_key: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(api_key)?;
    Ok(())
}

// ── Session translation ─────────────────────────────────────────────

/// Where a profile's broker comes from, without resolving credentials.
pub fn uses_account_lookup(profile: &Profile) -> bool {
    profile.host.is_none()
}

/// Build a `SessionConfig` from a profile; no CLI flag overrides.
pub fn profile_to_session_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    session_config_with_key(profile, profile_name, defaults, None)
}

/// Same as [`profile_to_session_config`], but `api_key` (when given)
/// outranks the profile's credential chain.
pub fn session_config_with_key(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    api_key: Option<SecretString>,
) -> Result<SessionConfig, ConfigError> {
    let gateway_id = profile
        .gateway_id
        .clone()
        .ok_or_else(|| ConfigError::NoGateway {
            profile: profile_name.into(),
        })?;

    let endpoint = match &profile.host {
        Some(host) => Endpoint::Broker {
            host: host.clone(),
            topic_prefix: profile.topic_prefix.clone().unwrap_or_default(),
            client_id: profile
                .client_id
                .clone()
                .unwrap_or_else(|| format!("meshgate-{profile_name}")),
        },
        None => Endpoint::Account {
            api_url: parse_api_url(profile.api_url.as_deref().unwrap_or(DEFAULT_API_URL))?,
            api_key: match api_key {
                Some(key) => key,
                None => resolve_api_key(profile, profile_name)?,
            },
        },
    };

    let mut config = SessionConfig::new(endpoint, gateway_id);
    if let Some(port) = profile.port {
        config.port = port;
    }
    config.tls = profile.tls_files();
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.keep_alive = Duration::from_secs(profile.keep_alive.unwrap_or(defaults.keep_alive));
    if let Some(rediscover) = profile.rediscover_new_nodes {
        config.rediscover_new_nodes = rediscover;
    }
    if let Some(discover) = profile.discover_on_connect {
        config.discover_on_connect = discover;
    }
    Ok(config)
}

pub fn parse_api_url(raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: "api_url".into(),
        reason: format!("invalid URL: {raw}"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.defaults.timeout, 15);
    }

    #[test]
    fn profiles_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"
                default_profile = "lab"

                [defaults]
                timeout = 20

                [profiles.lab]
                gateway_id = "nrf-352656100000000"
                api_key = "plain"
                credentials = "/etc/meshgate/lab"
                discover_on_connect = true
            "#,
        );

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.active_profile_name(None), "lab");
        assert_eq!(config.active_profile_name(Some("other")), "other");
        let lab = config.profile("lab").unwrap();
        assert_eq!(lab.gateway_id.as_deref(), Some("nrf-352656100000000"));
        assert_eq!(config.defaults.timeout, 20);
        assert!(matches!(
            config.profile("missing"),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.profiles.insert(
            "default".into(),
            Profile {
                gateway_id: Some("gw".into()),
                host: Some("localhost".into()),
                tls: Some(false),
                ..Profile::default()
            },
        );
        save_config_to(&path, &config).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.profiles, config.profiles);
    }

    #[test]
    fn account_profile_builds_account_endpoint() {
        let profile = Profile {
            gateway_id: Some("gw-1".into()),
            api_key: Some("secret".into()),
            timeout: Some(5),
            ..Profile::default()
        };
        let config = profile_to_session_config(&profile, "test", &Defaults::default()).unwrap();

        assert_eq!(config.gateway_id, "gw-1");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.keep_alive, Duration::from_secs(30));
        match config.endpoint {
            Endpoint::Account { api_url, api_key } => {
                assert_eq!(api_url.as_str(), "https://api.nrfcloud.com/");
                assert_eq!(api_key.expose_secret(), "secret");
            }
            Endpoint::Broker { .. } => panic!("expected account endpoint"),
        }
        let tls = config.tls.unwrap();
        assert_eq!(tls.ca_cert, PathBuf::from("credentials").join("caCert.crt"));
    }

    #[test]
    fn broker_profile_skips_credentials() {
        let profile = Profile {
            gateway_id: Some("gw-1".into()),
            host: Some("127.0.0.1".into()),
            port: Some(1883),
            tls: Some(false),
            rediscover_new_nodes: Some(false),
            ..Profile::default()
        };
        assert!(!uses_account_lookup(&profile));
        let config = profile_to_session_config(&profile, "local", &Defaults::default()).unwrap();
        assert_eq!(config.port, 1883);
        assert!(config.tls.is_none());
        assert!(!config.rediscover_new_nodes);
        match config.endpoint {
            Endpoint::Broker { client_id, .. } => assert_eq!(client_id, "meshgate-local"),
            Endpoint::Account { .. } => panic!("expected broker endpoint"),
        }
    }

    #[test]
    fn per_file_tls_overrides_win() {
        let profile = Profile {
            credentials: Some("/creds".into()),
            private_key: Some("/secure/key.pem".into()),
            ..Profile::default()
        };
        let files = profile.tls_files().unwrap();
        assert_eq!(files.client_cert, PathBuf::from("/creds").join("clientCert.crt"));
        assert_eq!(files.private_key, PathBuf::from("/secure/key.pem"));
    }

    #[test]
    fn explicit_key_outranks_profile_key() {
        let profile = Profile {
            gateway_id: Some("gw-1".into()),
            api_key: Some("from-file".into()),
            ..Profile::default()
        };
        let config = session_config_with_key(
            &profile,
            "test",
            &Defaults::default(),
            Some(SecretString::from("from-flag")),
        )
        .unwrap();
        match config.endpoint {
            Endpoint::Account { api_key, .. } => assert_eq!(api_key.expose_secret(), "from-flag"),
            Endpoint::Broker { .. } => panic!("expected account endpoint"),
        }
    }

    #[test]
    fn missing_gateway_is_an_error() {
        let profile = Profile::default();
        let err = profile_to_session_config(&profile, "x", &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::NoGateway { .. }));
    }

    #[test]
    fn bad_api_url_is_rejected() {
        assert!(matches!(
            parse_api_url("not a url"),
            Err(ConfigError::Validation { .. })
        ));
    }
}
