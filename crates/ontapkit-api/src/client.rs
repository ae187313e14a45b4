// REST operation executor
//
// Wraps a `Transport` with base-URL joining, per-profile concurrency
// limiting, cancellation, response decoding, and error classification.
// One `RestClient` talks to exactly one cluster endpoint.

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::{Error, ErrorEnvelope, classify};
use crate::limiter::ConcurrencyLimiter;
use crate::operation::Operation;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Transport};

/// Async executor for management API operations against one endpoint.
///
/// Generic over the [`Transport`] so tests can substitute an instrumented
/// one; production code uses [`HttpTransport`].
pub struct RestClient<T = HttpTransport> {
    transport: T,
    base_url: Url,
    limiter: ConcurrencyLimiter,
    cancel: CancellationToken,
}

impl<T: Transport> RestClient<T> {
    /// `base_url` must be the API root (e.g. `https://cluster1/api/`), see
    /// [`normalize_endpoint`].
    pub fn new(
        transport: T,
        base_url: Url,
        limiter: ConcurrencyLimiter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            base_url,
            limiter,
            cancel,
        }
    }

    /// The API root URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The limiter shared by every client of this profile.
    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Cancellation token observed by every call on this client.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Join a relative path (e.g. `"storage/volumes"`) onto the base URL.
    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Execute `op` and decode the success body into `R`.
    ///
    /// Suspends until a concurrency slot is free. The slot is held until the
    /// response has been fully decoded and classified. An empty success body
    /// decodes as JSON `null`, so `()` and `serde_json::Value` both work for
    /// bodiless responses.
    pub async fn execute<R: DeserializeOwned>(&self, op: &Operation) -> Result<R, Error> {
        self.run(op, None).await
    }

    /// [`execute`](Self::execute) that also aborts when `cancel` fires,
    /// whether still waiting for a slot or already in flight. The client's
    /// own token keeps applying.
    pub async fn execute_with<R: DeserializeOwned>(
        &self,
        op: &Operation,
        cancel: &CancellationToken,
    ) -> Result<R, Error> {
        self.run(op, Some(cancel)).await
    }

    async fn run<R: DeserializeOwned>(
        &self,
        op: &Operation,
        call: Option<&CancellationToken>,
    ) -> Result<R, Error> {
        let _slot = tokio::select! {
            biased;
            () = cancelled(call) => return Err(Error::Cancelled),
            slot = self.limiter.acquire(&self.cancel) => slot?,
        };

        let url = self.url(&op.path)?;
        debug!("{} {url}", op.method);

        let request = HttpRequest {
            method: op.method,
            url,
            query: op.query.clone(),
            body: op.body.clone(),
        };

        let resp = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(Error::Cancelled),
            () = cancelled(call) => return Err(Error::Cancelled),
            resp = self.transport.send(request) => resp?,
        };

        decode(resp)
    }
}

/// Resolves when `call` is cancelled; never without one.
async fn cancelled(call: Option<&CancellationToken>) {
    match call {
        Some(call) => call.cancelled().await,
        None => std::future::pending().await,
    }
}

// ── Response handling ────────────────────────────────────────────────

fn decode<R: DeserializeOwned>(resp: HttpResponse) -> Result<R, Error> {
    if !resp.is_success() {
        return Err(parse_error(resp));
    }

    let body = if resp.body.trim().is_empty() {
        "null"
    } else {
        resp.body.as_str()
    };

    serde_json::from_str(body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(&resp.body)),
        body: resp.body.clone(),
    })
}

fn parse_error(resp: HttpResponse) -> Error {
    let status = resp.status;

    match serde_json::from_str::<ErrorEnvelope>(&resp.body) {
        Ok(envelope) => Error::Api {
            status,
            kind: classify(status, envelope.error.code),
            error: envelope.error,
        },
        Err(_) => Error::Api {
            status,
            kind: classify(status, 0),
            error: crate::error::ApiError {
                code: 0,
                message: if resp.body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    preview(&resp.body).to_owned()
                },
                target: None,
            },
        },
    }
}

fn preview(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Turn a profile endpoint into the API root URL.
///
/// A bare host or `host:port` becomes `https://{host}/api/`; a full URL keeps
/// its scheme and gains an `/api/` suffix when missing.
pub fn normalize_endpoint(endpoint: &str) -> Result<Url, Error> {
    let raw = endpoint.trim();
    let with_scheme = if raw.contains("://") {
        raw.to_owned()
    } else {
        format!("https://{raw}")
    };

    let mut url = Url::parse(&with_scheme)?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidUrl(url::ParseError::EmptyHost));
    }

    let path = url.path().trim_end_matches('/').to_owned();
    if path.ends_with("/api") {
        url.set_path(&format!("{path}/"));
    } else {
        url.set_path(&format!("{path}/api/"));
    }
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ApiErrorKind;

    #[test]
    fn bare_host_gets_scheme_and_api_root() {
        let url = normalize_endpoint("cluster1.example.com").unwrap();
        assert_eq!(url.as_str(), "https://cluster1.example.com/api/");

        let url = normalize_endpoint("10.0.0.5:8443").unwrap();
        assert_eq!(url.as_str(), "https://10.0.0.5:8443/api/");
    }

    #[test]
    fn full_url_keeps_scheme_and_existing_api_suffix() {
        let url = normalize_endpoint("http://127.0.0.1:9000").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/api/");

        let url = normalize_endpoint("https://c1/api/").unwrap();
        assert_eq!(url.as_str(), "https://c1/api/");
    }

    #[test]
    fn malformed_endpoint_is_rejected() {
        assert!(normalize_endpoint("https://").is_err());
        assert!(normalize_endpoint("bad host name").is_err());
    }

    #[test]
    fn error_body_falls_back_to_status() {
        let err = parse_error(HttpResponse {
            status: 404,
            body: "<html>not here</html>".into(),
        });
        match err {
            Error::Api { status, kind, error } => {
                assert_eq!(status, 404);
                assert_eq!(kind, ApiErrorKind::NotFound);
                assert_eq!(error.code, 0);
                assert!(error.message.contains("not here"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn empty_success_body_decodes_as_null() {
        let value: serde_json::Value = decode(HttpResponse {
            status: 200,
            body: String::new(),
        })
        .unwrap();
        assert!(value.is_null());

        let () = decode(HttpResponse {
            status: 200,
            body: "  ".into(),
        })
        .unwrap();
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let body = "é".repeat(150);
        let p = preview(&body);
        assert!(p.len() <= 200);
        assert!(body.starts_with(p));
    }
}
