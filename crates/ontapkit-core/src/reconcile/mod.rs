// ── Reconciliation contract ──
//
// The generic create/read/update/delete/import lifecycle every managed
// object type goes through. Object-specific knowledge lives behind the
// `Resource` trait, which speaks only in `StateMap`s.

pub mod controller;
pub mod diff;
pub mod import_key;
pub mod version;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

pub use controller::{Created, DeleteOutcome, ReadOutcome, Reconciler, Updated};
pub use diff::{FieldRule, Mutability, check_update, diff, present};
pub use import_key::ImportFormat;
pub use version::{ClusterVersion, check_version_gates};

/// Flat field map exchanged with the field-mapping glue. Absent keys carry no
/// opinion; keys are ordered so comparisons never depend on insertion order.
pub type StateMap = BTreeMap<String, Value>;

// ── ReconcileIdentity ───────────────────────────────────────────────

/// Minimal ordered key identifying one remote object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReconcileIdentity {
    parts: Vec<(String, String)>,
}

impl ReconcileIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one part, keeping the original position on replace.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.parts.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.parts.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Like [`get`](Self::get), but a missing part is an internal error.
    pub fn require(&self, name: &str) -> Result<&str, CoreError> {
        self.get(name)
            .ok_or_else(|| CoreError::Internal(format!("identity {self} has no '{name}' part")))
    }

    pub fn parts(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parts.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl fmt::Display for ReconcileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

// ── Resource ────────────────────────────────────────────────────────

/// Per-object-type glue consumed by [`Reconciler`].
///
/// Implementations describe where an object lives and how its fields map to
/// request and response bodies; the lifecycle sequencing, diffing, gating,
/// job polling, and not-found policy are supplied by the reconciler.
pub trait Resource: Send + Sync {
    /// Object type name, e.g. `"storage_volume"`. Used in diagnostics and the
    /// purpose tag.
    fn kind(&self) -> &'static str;

    /// Collection path, e.g. `"storage/volumes"`.
    fn collection_path(&self) -> String;

    /// Ordered import key layout.
    fn import_format(&self) -> ImportFormat;

    /// Mutability and version rules for fields that need them. Fields not
    /// listed are updatable on every version.
    fn fields(&self) -> &[FieldRule] {
        &[]
    }

    /// Identity of a record returned by the remote (or of the desired state
    /// when a create returns no record).
    fn identity_from_record(&self, record: &StateMap) -> Result<ReconcileIdentity, CoreError>;

    /// Direct record path when the identity is complete enough (typically it
    /// carries a `uuid`). `None` means the record must be located through
    /// [`lookup_query`](Self::lookup_query) first.
    fn record_path(&self, identity: &ReconcileIdentity) -> Option<String>;

    /// Collection query that finds the record for an identity lacking a
    /// direct path.
    fn lookup_query(&self, identity: &ReconcileIdentity) -> Vec<(String, String)>;

    /// Extra query parameters for reads (e.g. `fields=*`).
    fn read_query(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Request body for a set of fields.
    fn to_body(&self, fields: &StateMap) -> Value {
        Value::Object(fields.clone().into_iter().collect())
    }

    /// Remote state from a response record.
    fn from_record(&self, record: Value) -> Result<StateMap, CoreError> {
        match record {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(CoreError::Internal(format!(
                "{} record is not an object: {other}",
                self.kind()
            ))),
        }
    }
}
