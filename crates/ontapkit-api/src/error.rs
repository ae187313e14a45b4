use std::fmt;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Top-level error type for the `ontapkit-api` crate.
///
/// Covers every failure mode of a single REST call: transport, remote
/// error payloads, response decoding, and cancellation. `ontapkit-core`
/// maps these into the domain taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake, certificate, or client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Remote ──────────────────────────────────────────────────────
    /// Error payload returned by the management API, already classified.
    #[error("API error (HTTP {status}, {kind}): {error}")]
    Api {
        status: u16,
        kind: ApiErrorKind,
        error: ApiError,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Request body could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ── Lifecycle ───────────────────────────────────────────────────
    /// The caller's cancellation token fired before the call completed.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Api {
                kind: ApiErrorKind::NotFound,
                ..
            }
        )
    }

    /// Returns `true` if this error never reached the remote side.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::InvalidUrl(_) | Self::Timeout { .. } | Self::Tls(_)
        )
    }

    /// Extract the remote error code, if available.
    pub fn api_error_code(&self) -> Option<i64> {
        match self {
            Self::Api { error, .. } => Some(error.code),
            _ => None,
        }
    }
}

// ── Remote error payload ────────────────────────────────────────────

/// Error object carried in a failed response:
/// `{"error": {"code": "4", "message": "entry doesn't exist", "target": "uuid"}}`.
///
/// The remote encodes `code` as a numeric string; plain JSON numbers are
/// accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    #[serde(default, deserialize_with = "lenient_code")]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub target: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}: {}", self.code, self.message)?;
        if let Some(ref target) = self.target {
            write!(f, " (target: {target})")?;
        }
        Ok(())
    }
}

/// Envelope around [`ApiError`] as it appears on the wire.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ApiError,
}

fn lenient_code<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Int(i64),
        Str(String),
    }

    match Code::deserialize(deserializer)? {
        Code::Int(n) => Ok(n),
        Code::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("non-numeric error code {s:?}"))),
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Domain family of a remote error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ApiErrorKind {
    NotFound,
    Conflict,
    Validation,
    Permission,
    /// Unrecognized code; passed through as a generic failure.
    Other,
}

/// "duplicate entry"
pub const CODE_DUPLICATE_ENTRY: i64 = 1;
/// "invalid argument"
pub const CODE_INVALID_ARGUMENT: i64 = 2;
/// "entry doesn't exist"
pub const CODE_ENTRY_NOT_FOUND: i64 = 4;
/// "permission denied"
pub const CODE_PERMISSION_DENIED: i64 = 6;
/// "unexpected argument"
pub const CODE_UNEXPECTED_ARGUMENT: i64 = 262_179;
/// "invalid value for field"
pub const CODE_INVALID_VALUE: i64 = 262_185;

/// Classify a remote failure by its numeric code, falling back to the HTTP
/// status family when the code is not one of the known values.
///
/// Pass `status = 0` for failures that carry no HTTP status (async job
/// results).
pub fn classify(status: u16, code: i64) -> ApiErrorKind {
    match code {
        CODE_ENTRY_NOT_FOUND => return ApiErrorKind::NotFound,
        CODE_DUPLICATE_ENTRY => return ApiErrorKind::Conflict,
        CODE_INVALID_ARGUMENT | CODE_UNEXPECTED_ARGUMENT | CODE_INVALID_VALUE => {
            return ApiErrorKind::Validation;
        }
        CODE_PERMISSION_DENIED => return ApiErrorKind::Permission,
        _ => {}
    }

    match status {
        404 => ApiErrorKind::NotFound,
        409 => ApiErrorKind::Conflict,
        400 | 422 => ApiErrorKind::Validation,
        401 | 403 => ApiErrorKind::Permission,
        _ => ApiErrorKind::Other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_win_over_status() {
        assert_eq!(classify(400, CODE_ENTRY_NOT_FOUND), ApiErrorKind::NotFound);
        assert_eq!(classify(400, CODE_DUPLICATE_ENTRY), ApiErrorKind::Conflict);
        assert_eq!(classify(500, CODE_INVALID_VALUE), ApiErrorKind::Validation);
        assert_eq!(classify(500, CODE_PERMISSION_DENIED), ApiErrorKind::Permission);
    }

    #[test]
    fn status_family_fallback() {
        assert_eq!(classify(404, 917_927), ApiErrorKind::NotFound);
        assert_eq!(classify(409, 0), ApiErrorKind::Conflict);
        assert_eq!(classify(422, 0), ApiErrorKind::Validation);
        assert_eq!(classify(403, 0), ApiErrorKind::Permission);
        assert_eq!(classify(500, 13_001), ApiErrorKind::Other);
        assert_eq!(classify(0, 13_001), ApiErrorKind::Other);
    }

    #[test]
    fn error_code_accepts_string_and_number() {
        let s: ErrorEnvelope =
            serde_json::from_str(r#"{"error":{"code":"4","message":"entry doesn't exist"}}"#)
                .unwrap();
        assert_eq!(s.error.code, 4);

        let n: ErrorEnvelope =
            serde_json::from_str(r#"{"error":{"code":262185,"message":"bad","target":"size"}}"#)
                .unwrap();
        assert_eq!(n.error.code, 262_185);
        assert_eq!(n.error.target.as_deref(), Some("size"));
    }

    #[test]
    fn non_numeric_code_is_rejected() {
        let res = serde_json::from_str::<ErrorEnvelope>(r#"{"error":{"code":"abc"}}"#);
        assert!(res.is_err());
    }
}
