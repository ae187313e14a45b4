// ── Runtime connection configuration ──
//
// These types describe *how* to reach a cluster. They carry credential data
// and connection tuning, but never touch disk. `ontapkit-config` constructs
// them from the TOML file and hands them in.

use std::fmt;
use std::time::Duration;

use secrecy::SecretString;

/// Named endpoint + credential bundle identifying one remote cluster.
///
/// Immutable once registered: the registry only hands out shared references.
#[derive(Clone)]
pub struct ConnectionProfile {
    /// Unique registry key.
    pub name: String,
    /// Cluster management address: bare host, `host:port`, or full URL.
    pub endpoint: String,
    pub username: String,
    pub secret: SecretString,
    /// Verify the cluster's TLS certificate.
    pub validate_certs: bool,
    /// In-flight request bound for this endpoint. `0` = unlimited.
    pub max_concurrent_requests: usize,
}

impl ConnectionProfile {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        username: impl Into<String>,
        secret: SecretString,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            username: username.into(),
            secret,
            validate_certs: true,
            max_concurrent_requests: 0,
        }
    }

    pub fn with_validate_certs(mut self, validate: bool) -> Self {
        self.validate_certs = validate;
        self
    }

    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }
}

// Hand-written so the secret never lands in logs.
impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .field("validate_certs", &self.validate_certs)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .finish()
    }
}

/// Async job polling policy, shared by every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// First sleep between status checks.
    pub base_interval: Duration,
    /// Upper bound for the doubled interval.
    pub max_interval: Duration,
    /// Wall-clock budget for the whole poll loop.
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(360),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Request tuning for every client built by the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}
