// Field-level change computation and mutability rules.

use super::StateMap;
use super::version::ClusterVersion;
use crate::error::CoreError;

/// Fields whose value in `desired` differs from `prior`.
///
/// A key missing from `prior` counts as changed. Keys absent from `desired`
/// are never included; an explicit `null` in `desired` is included when the
/// prior value is non-null, which clears the field remotely.
pub fn diff(desired: &StateMap, prior: &StateMap) -> StateMap {
    desired
        .iter()
        .filter(|(key, value)| prior.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// `desired` without its `null` entries, for create bodies.
pub fn present(desired: &StateMap) -> StateMap {
    desired
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Updatable,
    /// Set at create only; any later change is rejected before a request.
    Immutable,
}

/// Per-field behaviour the reconciler enforces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub name: &'static str,
    pub mutability: Mutability,
    /// Oldest cluster version that accepts this field.
    pub min_version: Option<ClusterVersion>,
}

impl FieldRule {
    pub const fn updatable(name: &'static str) -> Self {
        Self {
            name,
            mutability: Mutability::Updatable,
            min_version: None,
        }
    }

    pub const fn immutable(name: &'static str) -> Self {
        Self {
            name,
            mutability: Mutability::Immutable,
            min_version: None,
        }
    }

    pub const fn since(mut self, version: ClusterVersion) -> Self {
        self.min_version = Some(version);
        self
    }
}

/// Reject a change set touching any immutable field.
pub fn check_update(rules: &[FieldRule], changed: &StateMap) -> Result<(), CoreError> {
    let offending = changed.keys().find(|key| {
        rules
            .iter()
            .any(|r| r.name == key.as_str() && r.mutability == Mutability::Immutable)
    });

    match offending {
        Some(field) => Err(CoreError::Unsupported {
            field: field.clone(),
            reason: "field cannot be changed after creation; recreate the object instead".into(),
        }),
        None => Ok(()),
    }
}

/// Whether any key of `fields` is version-gated.
pub(crate) fn has_gated_fields(rules: &[FieldRule], fields: &StateMap) -> bool {
    gated(rules, fields).next().is_some()
}

pub(crate) fn gated<'a>(
    rules: &'a [FieldRule],
    fields: &'a StateMap,
) -> impl Iterator<Item = (&'a str, ClusterVersion)> + 'a {
    rules.iter().filter_map(move |rule| match rule.min_version {
        Some(min) if fields.get(rule.name).is_some_and(|v| !v.is_null()) => {
            Some((rule.name, min))
        }
        _ => None,
    })
}
