#![allow(clippy::unwrap_used)]
// Config file loading and context construction.

use std::io::Write;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};
use tempfile::NamedTempFile;

use ontapkit_config::{
    ConfigError, ProfileEntry, build_context, build_context_with, build_registry_with,
    client_settings, load_config_from, parse_config, poll_policy, resolve_secret_with,
};

const FULL: &str = r#"
[defaults]
timeout = 45
validate_certs = true

[polling]
base_interval_secs = 2
max_interval_secs = 60
timeout_secs = 600

[[profiles]]
name = "cluster1"
hostname = "10.0.0.5"
username = "admin"
password = "netapp1!"
validate_certs = false
max_concurrent_requests = 4

[[profiles]]
name = "cluster2"
hostname = "https://cluster2.example.com:8443"
username = "ops"
password = "s3cret"
"#;

/// Environment and config file only; the host keyring is never consulted.
fn without_keyring(entry: &ProfileEntry) -> Result<SecretString, ConfigError> {
    resolve_secret_with(entry, |name| std::env::var(name).ok(), |_| None)
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn loads_full_config_from_file() {
    let file = write_config(FULL);
    let config = load_config_from(file.path()).unwrap();

    assert_eq!(config.defaults.timeout, 45);
    assert_eq!(config.polling.base_interval_secs, 2);
    assert_eq!(
        config.profiles.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        vec!["cluster1", "cluster2"]
    );
    assert_eq!(config.profiles[0].max_concurrent_requests, 4);
    assert_eq!(config.profiles[1].max_concurrent_requests, 0);

    let policy = poll_policy(&config);
    assert_eq!(policy.base_interval, Duration::from_secs(2));
    assert_eq!(policy.max_interval, Duration::from_secs(60));
    assert_eq!(policy.timeout, Duration::from_secs(600));
    assert_eq!(client_settings(&config).request_timeout, Duration::from_secs(45));
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config_from(&dir.path().join("absent.toml")).unwrap();

    assert_eq!(config.defaults.timeout, 30);
    assert!(config.defaults.validate_certs);
    assert_eq!(config.polling.base_interval_secs, 1);
    assert_eq!(config.polling.max_interval_secs, 360);
    assert_eq!(config.polling.timeout_secs, 1800);
    assert!(config.profiles.is_empty());
}

#[test]
fn registry_preserves_order_and_applies_defaults() {
    let config = parse_config(FULL).unwrap();
    let registry = build_registry_with(&config, without_keyring).unwrap();

    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["cluster1", "cluster2"]);

    let c1 = registry.resolve("cluster1").unwrap();
    assert!(!c1.validate_certs);
    assert_eq!(c1.max_concurrent_requests, 4);

    let c2 = registry.resolve("cluster2").unwrap();
    assert!(c2.validate_certs);
    assert_eq!(c2.endpoint, "https://cluster2.example.com:8443");
    assert_eq!(c2.username, "ops");
    assert_eq!(c2.secret.expose_secret(), "s3cret");
}

#[test]
fn context_builds_clients_for_configured_profiles() {
    let config = parse_config(FULL).unwrap();
    let ctx = build_context_with(&config, without_keyring).unwrap();

    let profile = ctx.registry().resolve("cluster2").unwrap();
    let client = ctx.factory().build(profile, "svm/0.1.0").unwrap();
    assert_eq!(client.base_url().as_str(), "https://cluster2.example.com:8443/api/");
    assert_eq!(ctx.poller().policy().base_interval, Duration::from_secs(2));
}

#[test]
fn duplicate_profile_names_rejected() {
    let err = parse_config(
        r#"
        [[profiles]]
        name = "a"
        hostname = "h1"
        username = "u"
        password = "p"

        [[profiles]]
        name = "a"
        hostname = "h2"
        username = "u"
        password = "p"
        "#,
    )
    .unwrap_err();

    assert!(
        matches!(err, ConfigError::Validation { ref field, .. } if field == "profiles"),
        "{err}"
    );
}

#[test]
fn empty_required_fields_rejected() {
    let err = parse_config(
        r#"
        [[profiles]]
        name = "a"
        hostname = " "
        username = "u"
        "#,
    )
    .unwrap_err();

    assert!(err.to_string().contains("profile 'a'.hostname"), "{err}");
}

#[test]
fn polling_base_above_max_rejected() {
    let err = parse_config(
        r#"
        [polling]
        base_interval_secs = 30
        max_interval_secs = 10
        "#,
    )
    .unwrap_err();

    assert!(matches!(err, ConfigError::Validation { .. }), "{err}");
    assert!(err.to_string().contains("polling.base_interval_secs"));
}

#[test]
fn malformed_toml_is_a_load_error() {
    let file = write_config("[[profiles]\nname = ");
    let err = load_config_from(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Figment(_)), "{err}");
}

#[test]
fn profile_without_any_secret_has_no_credentials() {
    let config = parse_config(
        r#"
        [[profiles]]
        name = "ontapkit-test-no-secret"
        hostname = "10.0.0.9"
        username = "admin"
        password_env = "ONTAPKIT_TEST_SURELY_UNSET_PASSWORD"
        "#,
    )
    .unwrap();

    let err = build_registry_with(&config, without_keyring).unwrap_err();
    assert!(
        matches!(err, ConfigError::NoCredentials { ref profile } if profile == "ontapkit-test-no-secret"),
        "{err}"
    );
}

#[test]
fn password_env_wins_before_the_keyring_is_consulted() {
    // Cargo sets this for every test run.
    let config = parse_config(
        r#"
        [[profiles]]
        name = "cluster1"
        hostname = "10.0.0.5"
        username = "admin"
        password_env = "CARGO_PKG_NAME"
        password = "unused"
        "#,
    )
    .unwrap();

    let ctx = build_context(&config).unwrap();
    let profile = ctx.registry().resolve("").unwrap();
    assert_eq!(profile.secret.expose_secret(), "ontapkit-config");
}
