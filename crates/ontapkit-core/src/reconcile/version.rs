// Cluster release version and field version gates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ontapkit_api::Operation;

use super::StateMap;
use super::diff::{FieldRule, gated};
use crate::error::CoreError;

/// Release triple reported by `GET cluster?fields=version`.
///
/// Ordered by generation, then major, then minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterVersion {
    pub generation: u32,
    pub major: u32,
    pub minor: u32,
}

#[derive(Deserialize)]
struct VersionEnvelope {
    version: ClusterVersion,
}

impl ClusterVersion {
    pub const fn new(generation: u32, major: u32, minor: u32) -> Self {
        Self {
            generation,
            major,
            minor,
        }
    }

    /// The request that reports the cluster version.
    pub fn operation() -> Operation {
        Operation::get("cluster").with_query("fields", "version")
    }

    /// Decode the `version` object of a cluster response. Extra keys such as
    /// `full` are ignored.
    pub fn from_response(body: Value) -> Result<Self, CoreError> {
        serde_json::from_value::<VersionEnvelope>(body)
            .map(|envelope| envelope.version)
            .map_err(|e| CoreError::Internal(format!("unexpected cluster version response: {e}")))
    }
}

impl fmt::Display for ClusterVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.generation, self.major, self.minor)
    }
}

impl FromStr for ClusterVersion {
    type Err = CoreError;

    /// Accepts `G.M` or `G.M.m`; a missing minor is `0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::Validation {
            message: format!("invalid cluster version '{s}', expected e.g. \"9.13.1\""),
            code: None,
        };

        let parts = s
            .trim()
            .split('.')
            .map(|p| p.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        match parts.as_slice() {
            [generation, major] => Ok(Self::new(*generation, *major, 0)),
            [generation, major, minor] => Ok(Self::new(*generation, *major, *minor)),
            _ => Err(invalid()),
        }
    }
}

/// Reject `fields` when any present field needs a newer cluster than
/// `cluster`.
pub fn check_version_gates(
    rules: &[FieldRule],
    fields: &StateMap,
    cluster: ClusterVersion,
) -> Result<(), CoreError> {
    match gated(rules, fields).find(|(_, min)| cluster < *min) {
        Some((field, min)) => Err(CoreError::Unsupported {
            field: field.to_owned(),
            reason: format!("requires cluster version {min} or later (cluster is {cluster})"),
        }),
        None => Ok(()),
    }
}
