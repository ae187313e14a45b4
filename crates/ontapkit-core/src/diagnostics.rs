// ── Diagnostics ──
//
// Structured error/warning records appended to a caller-owned sink. The
// core never prints; a failure is recorded exactly once, where a lifecycle
// step gives up, and a `Halt` sentinel is returned instead of the error.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::error::{CoreError, ErrorKind};
use crate::reconcile::ReconcileIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.summary)?;
        if !self.detail.is_empty() {
            write!(f, " -- {}", self.detail)?;
        }
        Ok(())
    }
}

/// Sentinel returned once a failure has been recorded. Callers must stop the
/// current operation sequence when they receive one.
#[derive(Debug, Clone, Error)]
#[error("{operation} halted: {kind}")]
pub struct Halt {
    kind: ErrorKind,
    operation: String,
    /// Identity obtained before the failure (e.g. a create whose read-back
    /// failed), so the caller can retry the read or import the object.
    identity: Option<ReconcileIdentity>,
}

impl Halt {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn identity(&self) -> Option<&ReconcileIdentity> {
        self.identity.as_ref()
    }
}

/// Caller-owned diagnostic sink.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn warning(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
        });
    }

    /// Record `err` as the single error diagnostic for `operation` and return
    /// the sentinel.
    pub fn report(
        &mut self,
        operation: &str,
        identity: Option<&ReconcileIdentity>,
        err: &CoreError,
    ) -> Halt {
        let mut detail = err.to_string();
        if let Some(id) = identity {
            detail.push_str(&format!("; identity: {id}"));
        }
        if let Some(code) = err.remote_code() {
            detail.push_str(&format!("; remote code: {code}"));
        }

        debug!(operation, kind = %err.kind(), %detail, "recording diagnostic");
        self.push(Diagnostic {
            severity: Severity::Error,
            summary: format!("{operation} failed ({})", err.kind()),
            detail,
        });

        Halt {
            kind: err.kind(),
            operation: operation.to_owned(),
            identity: identity.cloned(),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hand the recorded entries to the caller, in recording order.
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
