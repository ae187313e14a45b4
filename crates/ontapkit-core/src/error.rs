// ── Core error types ──
//
// Domain taxonomy for every lifecycle step. Consumers never branch on HTTP
// status codes or JSON parse failures directly. The
// `From<ontapkit_api::Error>` impl translates transport-layer errors into
// the matching family.

use ontapkit_api::ApiErrorKind;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ── Transport ────────────────────────────────────────────────────
    #[error("Cannot reach cluster: {reason}")]
    Transport { reason: String },

    // ── Remote errors, by classified family ──────────────────────────
    #[error("Not found: {target}: {message}")]
    NotFound { target: String, message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String, code: Option<i64> },

    #[error("Rejected by cluster: {message}")]
    Validation { message: String, code: Option<i64> },

    #[error("Permission denied: {message}")]
    Permission { message: String, code: Option<i64> },

    #[error("API error: {message}")]
    Api {
        message: String,
        /// Remote error code, opaque beyond the classified families.
        code: Option<i64>,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Timed out after {waited_secs}s waiting for {operation}")]
    Timeout { operation: String, waited_secs: u64 },

    #[error("Unsupported change to '{field}': {reason}")]
    Unsupported { field: String, reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Discriminant of [`CoreError`], for branching and diagnostic summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Transport,
    NotFound,
    Conflict,
    Validation,
    Permission,
    Api,
    Timeout,
    Unsupported,
    Cancelled,
    Internal,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Permission { .. } => ErrorKind::Permission,
            Self::Api { .. } => ErrorKind::Api,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Remote error code carried by remote-originated errors.
    pub fn remote_code(&self) -> Option<i64> {
        match self {
            Self::Conflict { code, .. }
            | Self::Validation { code, .. }
            | Self::Permission { code, .. }
            | Self::Api { code, .. } => *code,
            _ => None,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Build the variant for a classified remote failure.
    pub fn from_remote(
        kind: ApiErrorKind,
        target: Option<&str>,
        code: i64,
        message: String,
        status: Option<u16>,
    ) -> Self {
        let code = (code != 0).then_some(code);
        match kind {
            ApiErrorKind::NotFound => Self::NotFound {
                target: target.unwrap_or("resource").to_owned(),
                message,
            },
            ApiErrorKind::Conflict => Self::Conflict { message, code },
            ApiErrorKind::Validation => Self::Validation {
                message: match target {
                    Some(t) => format!("{message} (field: {t})"),
                    None => message,
                },
                code,
            },
            ApiErrorKind::Permission => Self::Permission { message, code },
            ApiErrorKind::Other => Self::Api {
                message,
                code,
                status,
            },
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ontapkit_api::Error> for CoreError {
    fn from(err: ontapkit_api::Error) -> Self {
        match err {
            ontapkit_api::Error::Transport(e) => CoreError::Transport {
                reason: match e.url() {
                    Some(url) => format!("{url}: {e}"),
                    None => e.to_string(),
                },
            },
            ontapkit_api::Error::InvalidUrl(e) => CoreError::Transport {
                reason: format!("invalid endpoint: {e}"),
            },
            ontapkit_api::Error::Timeout { timeout_secs } => CoreError::Transport {
                reason: format!("request timed out after {timeout_secs}s"),
            },
            ontapkit_api::Error::Tls(msg) => CoreError::Transport {
                reason: format!("TLS error: {msg}"),
            },
            ontapkit_api::Error::Api {
                status,
                kind,
                error,
            } => CoreError::from_remote(
                kind,
                error.target.as_deref(),
                error.code,
                error.message,
                Some(status),
            ),
            ontapkit_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            ontapkit_api::Error::Serialization(message) => {
                CoreError::Internal(format!("Serialization error: {message}"))
            }
            ontapkit_api::Error::Cancelled => CoreError::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use ontapkit_api::ApiError;

    use super::*;

    fn api(status: u16, kind: ApiErrorKind, code: i64) -> ontapkit_api::Error {
        ontapkit_api::Error::Api {
            status,
            kind,
            error: ApiError {
                code,
                message: "boom".into(),
                target: Some("svm.name".into()),
            },
        }
    }

    #[test]
    fn remote_families_map_to_variants() {
        let cases = [
            (ApiErrorKind::NotFound, ErrorKind::NotFound),
            (ApiErrorKind::Conflict, ErrorKind::Conflict),
            (ApiErrorKind::Validation, ErrorKind::Validation),
            (ApiErrorKind::Permission, ErrorKind::Permission),
            (ApiErrorKind::Other, ErrorKind::Api),
        ];
        for (api_kind, core_kind) in cases {
            assert_eq!(CoreError::from(api(400, api_kind, 7)).kind(), core_kind);
        }
    }

    #[test]
    fn remote_code_is_preserved() {
        let err = CoreError::from(api(500, ApiErrorKind::Other, 917_536));
        assert_eq!(err.remote_code(), Some(917_536));
        match err {
            CoreError::Api { status, .. } => assert_eq!(status, Some(500)),
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[test]
    fn validation_message_names_target() {
        let err = CoreError::from(api(400, ApiErrorKind::Validation, 262_185));
        assert!(err.to_string().contains("field: svm.name"), "{err}");
    }

    #[test]
    fn transport_side_failures() {
        let err = CoreError::from(ontapkit_api::Error::Timeout { timeout_secs: 30 });
        assert_eq!(err.kind(), ErrorKind::Transport);

        let err = CoreError::from(ontapkit_api::Error::Cancelled);
        assert_eq!(err.kind(), ErrorKind::Cancelled);

        let err = CoreError::from(ontapkit_api::Error::Deserialization {
            message: "eof".into(),
            body: String::new(),
        });
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
