//! Configuration for ontapkit consumers.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation into an `ontapkit_core::ProviderContext`. The core crate never
//! reads files; everything disk- or environment-shaped happens here.

use std::collections::HashSet;
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
use tracing::debug;

use ontapkit_core::{
    ClientSettings, ConnectionProfile, CoreError, PollPolicy, ProfileRegistry, ProviderContext,
};

const KEYRING_SERVICE: &str = "ontapkit";
const ENV_PREFIX: &str = "ONTAPKIT_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Job polling policy.
    #[serde(default)]
    pub polling: Polling,

    /// Connection profiles, in declaration order.
    #[serde(default)]
    pub profiles: Vec<ProfileEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_true")]
    pub validate_certs: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            validate_certs: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Polling {
    #[serde(default = "default_base_interval")]
    pub base_interval_secs: u64,

    #[serde(default = "default_max_interval")]
    pub max_interval_secs: u64,

    #[serde(default = "default_poll_timeout")]
    pub timeout_secs: u64,
}

impl Default for Polling {
    fn default() -> Self {
        Self {
            base_interval_secs: default_base_interval(),
            max_interval_secs: default_max_interval(),
            timeout_secs: default_poll_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_base_interval() -> u64 {
    1
}
fn default_max_interval() -> u64 {
    360
}
fn default_poll_timeout() -> u64 {
    1800
}

/// One `[[profiles]]` entry.
#[derive(Debug, Deserialize, Serialize)]
pub struct ProfileEntry {
    /// Unique profile name.
    pub name: String,

    /// Cluster management address: host, `host:port`, or URL.
    pub hostname: String,

    pub username: String,

    /// Password (plaintext; prefer `password_env` or keyring).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Override `defaults.validate_certs`.
    pub validate_certs: Option<bool>,

    /// In-flight request bound; `0` or unset = unlimited.
    #[serde(default)]
    pub max_concurrent_requests: usize,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "ontapkit", "ontapkit").map_or_else(
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
    p.push("ontapkit");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load and validate the config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load and validate the config from `path` + environment.
///
/// A missing file yields the defaults with no profiles. Environment keys use
/// `__` as the section separator, e.g. `ONTAPKIT_POLLING__TIMEOUT_SECS`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    validate(&config)?;
    Ok(config)
}

/// Parse and validate a config from a TOML string, without environment
/// overrides.
pub fn parse_config(toml: &str) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::string(toml))
        .extract()?;
    validate(&config)?;
    Ok(config)
}

// ── Validation ──────────────────────────────────────────────────────

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Reject configs no registry could be built from.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let polling = &config.polling;
    if polling.base_interval_secs == 0 {
        return Err(invalid("polling.base_interval_secs", "must be at least 1"));
    }
    if polling.base_interval_secs > polling.max_interval_secs {
        return Err(invalid(
            "polling.base_interval_secs",
            format!(
                "{} exceeds polling.max_interval_secs ({})",
                polling.base_interval_secs, polling.max_interval_secs
            ),
        ));
    }
    if config.defaults.timeout == 0 {
        return Err(invalid("defaults.timeout", "must be at least 1"));
    }

    let mut seen = HashSet::new();
    for (i, entry) in config.profiles.iter().enumerate() {
        let label = if entry.name.trim().is_empty() {
            format!("profiles[{i}]")
        } else {
            format!("profile '{}'", entry.name)
        };

        for (field, value) in [
            ("name", &entry.name),
            ("hostname", &entry.hostname),
            ("username", &entry.username),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(format!("{label}.{field}"), "must not be empty"));
            }
        }

        if !seen.insert(entry.name.as_str()) {
            return Err(invalid(
                "profiles",
                format!("duplicate profile name '{}'", entry.name),
            ));
        }
    }

    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a profile's password: `password_env` → system keyring
/// (`ontapkit`, `{name}/password`) → plaintext `password`.
pub fn resolve_secret(entry: &ProfileEntry) -> Result<SecretString, ConfigError> {
    resolve_secret_with(entry, |name| std::env::var(name).ok(), keyring_password)
}

fn keyring_password(profile: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile}/password"))
        .and_then(|entry| entry.get_password())
        .ok()
}

/// [`resolve_secret`] with the environment and keyring lookups supplied by
/// the caller.
pub fn resolve_secret_with(
    entry: &ProfileEntry,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env → env var lookup
    if let Some(pw) = entry.password_env.as_deref().and_then(&env) {
        debug!(profile = %entry.name, "password from environment");
        return Ok(SecretString::from(pw));
    }

    // 2. System keyring
    if let Some(pw) = keyring(&entry.name) {
        debug!(profile = %entry.name, "password from keyring");
        return Ok(SecretString::from(pw));
    }

    // 3. Plaintext in config
    if let Some(ref pw) = entry.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: entry.name.clone(),
    })
}

// ── Translation to core types ───────────────────────────────────────

/// Build a `ConnectionProfile` from an entry and its resolved secret.
fn entry_to_profile(
    entry: &ProfileEntry,
    defaults: &Defaults,
    secret: SecretString,
) -> ConnectionProfile {
    ConnectionProfile::new(&entry.name, &entry.hostname, &entry.username, secret)
        .with_validate_certs(entry.validate_certs.unwrap_or(defaults.validate_certs))
        .with_max_concurrent_requests(entry.max_concurrent_requests)
}

/// Every configured profile, in declaration order.
pub fn build_registry(config: &Config) -> Result<ProfileRegistry, ConfigError> {
    build_registry_with(config, resolve_secret)
}

/// [`build_registry`] resolving each profile's secret through `resolve`.
pub fn build_registry_with(
    config: &Config,
    resolve: impl Fn(&ProfileEntry) -> Result<SecretString, ConfigError>,
) -> Result<ProfileRegistry, ConfigError> {
    let profiles = config
        .profiles
        .iter()
        .map(|entry| Ok(entry_to_profile(entry, &config.defaults, resolve(entry)?)))
        .collect::<Result<Vec<_>, ConfigError>>()?;

    ProfileRegistry::from_profiles(profiles).map_err(|e| invalid("profiles", e.to_string()))
}

pub fn poll_policy(config: &Config) -> PollPolicy {
    PollPolicy {
        base_interval: Duration::from_secs(config.polling.base_interval_secs),
        max_interval: Duration::from_secs(config.polling.max_interval_secs),
        timeout: Duration::from_secs(config.polling.timeout_secs),
    }
}

pub fn client_settings(config: &Config) -> ClientSettings {
    ClientSettings {
        request_timeout: Duration::from_secs(config.defaults.timeout),
    }
}

/// Build the shared context: registry, client settings, and poll policy.
pub fn build_context(config: &Config) -> Result<ProviderContext, ConfigError> {
    build_context_with(config, resolve_secret)
}

/// [`build_context`] resolving each profile's secret through `resolve`.
pub fn build_context_with(
    config: &Config,
    resolve: impl Fn(&ProfileEntry) -> Result<SecretString, ConfigError>,
) -> Result<ProviderContext, ConfigError> {
    let registry = build_registry_with(config, resolve)?;
    debug!(profiles = registry.len(), "built provider context");
    Ok(ProviderContext::new(
        registry,
        client_settings(config),
        poll_policy(config),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn entry(password: Option<&str>, password_env: Option<&str>) -> ProfileEntry {
        ProfileEntry {
            name: "cluster1".into(),
            hostname: "10.0.0.5".into(),
            username: "admin".into(),
            password: password.map(Into::into),
            password_env: password_env.map(Into::into),
            validate_certs: None,
            max_concurrent_requests: 0,
        }
    }

    fn no_keyring(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn env_beats_keyring_and_plaintext() {
        let e = entry(Some("plain"), Some("CLUSTER1_PASSWORD"));
        let secret = resolve_secret_with(
            &e,
            |name| (name == "CLUSTER1_PASSWORD").then(|| "from-env".into()),
            |_| Some("from-keyring".into()),
        )
        .unwrap();
        assert_eq!(secret.expose_secret(), "from-env");
    }

    #[test]
    fn unset_env_var_falls_through_to_keyring() {
        let e = entry(Some("plain"), Some("UNSET_VAR"));
        let secret = resolve_secret_with(&e, |_| None, |p| Some(format!("{p}-keyring"))).unwrap();
        assert_eq!(secret.expose_secret(), "cluster1-keyring");
    }

    #[test]
    fn plaintext_is_last_resort() {
        let secret = resolve_secret_with(&entry(Some("plain"), None), |_| None, no_keyring).unwrap();
        assert_eq!(secret.expose_secret(), "plain");

        let err = resolve_secret_with(&entry(None, None), |_| None, no_keyring).unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { ref profile } if profile == "cluster1"));
    }

    #[test]
    fn config_error_maps_to_configuration() {
        let err: CoreError = invalid("polling.base_interval_secs", "too big").into();
        assert_eq!(err.kind(), ontapkit_core::ErrorKind::Configuration);
        assert!(err.to_string().contains("polling.base_interval_secs"));
    }
}
