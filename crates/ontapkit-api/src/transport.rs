// Shared transport configuration and the HTTP seam.
//
// `TransportConfig` builds `reqwest::Client` instances (TLS policy, timeout,
// telemetry tag). `Transport` is the narrow send-one-request interface the
// executor talks to; `HttpTransport` is the reqwest-backed implementation.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{trace, warn};
use url::Url;

use crate::error::Error;
use crate::operation::Method;

/// Outbound header carrying the caller's purpose tag (object type + version)
/// for remote-side usage telemetry.
pub const PURPOSE_TAG_HEADER: &str = "X-Dot-Client-App";

const USER_AGENT: &str = concat!("ontapkit/", env!("CARGO_PKG_VERSION"));

/// Certificate verification policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Verify against the system certificate store.
    Verify,
    /// Accept any certificate (self-signed cluster management LIFs).
    DangerAcceptInvalid,
}

impl TlsMode {
    pub fn from_validate_certs(validate_certs: bool) -> Self {
        if validate_certs {
            Self::Verify
        } else {
            Self::DangerAcceptInvalid
        }
    }
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
    /// Telemetry tag sent as [`PURPOSE_TAG_HEADER`]. Never affects behavior.
    pub purpose_tag: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::Verify,
            timeout: Duration::from_secs(30),
            purpose_tag: None,
        }
    }
}

impl TransportConfig {
    pub fn with_purpose_tag(mut self, tag: impl Into<String>) -> Self {
        self.purpose_tag = Some(tag.into());
        self
    }

    /// Build a `reqwest::Client` from this config.
    ///
    /// An unusable purpose tag is dropped with a warning rather than failing
    /// the build.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut headers = HeaderMap::new();
        if let Some(ref tag) = self.purpose_tag {
            match HeaderValue::from_str(tag) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static("x-dot-client-app"), value);
                }
                Err(e) => warn!(tag = %tag, error = %e, "skipping invalid purpose tag"),
            }
        }

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers);

        if self.tls == TlsMode::DangerAcceptInvalid {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

// ── Transport seam ──────────────────────────────────────────────────

/// One fully-resolved outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// Raw response: status code plus undecoded body text.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a single request and returns the raw response.
///
/// Implementations report only transport-level failures as `Err`; any HTTP
/// status, including errors, is an `Ok(HttpResponse)`.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, Error>> + Send;
}

/// Basic-auth credentials applied to every request.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: SecretString,
}

/// reqwest-backed [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    auth: Option<BasicAuth>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig, auth: Option<BasicAuth>) -> Result<Self, Error> {
        Ok(Self {
            http: config.build_client()?,
            auth,
            timeout: config.timeout,
        })
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let mut builder = self
            .http
            .request(request.method.into(), request.url)
            .query(&request.query);

        if let Some(ref auth) = self.auth {
            builder = builder.basic_auth(&auth.username, Some(auth.password.expose_secret()));
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                Error::Transport(e)
            }
        })?;

        let status = resp.status().as_u16();
        trace!(status, "response received");
        let body = resp.text().await.map_err(Error::Transport)?;
        Ok(HttpResponse { status, body })
    }
}
