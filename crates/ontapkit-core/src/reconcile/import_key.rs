// Import key parsing: `"a,b,c"` against an ordered field layout.

use super::ReconcileIdentity;
use crate::error::CoreError;

/// Ordered layout of a comma-separated import key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportFormat {
    pub fields: &'static [&'static str],
}

impl ImportFormat {
    pub const fn new(fields: &'static [&'static str]) -> Self {
        Self { fields }
    }

    /// Split `key` into exactly one non-empty component per field.
    /// Components are taken verbatim: surrounding whitespace is rejected,
    /// not trimmed.
    pub fn parse<'k>(&self, key: &'k str) -> Result<Vec<&'k str>, CoreError> {
        let parts: Vec<&str> = key.split(',').collect();

        if parts.len() != self.fields.len() {
            return Err(self.invalid(format!(
                "got {} component(s), need {}",
                parts.len(),
                self.fields.len()
            )));
        }
        if let Some(pos) = parts.iter().position(|p| p.trim().is_empty()) {
            return Err(self.invalid(format!("'{}' is empty", self.fields[pos])));
        }
        if let Some(pos) = parts.iter().position(|p| p.trim() != *p) {
            return Err(self.invalid(format!(
                "'{}' has leading or trailing whitespace",
                self.fields[pos]
            )));
        }

        Ok(parts)
    }

    /// Parse `key` and pair each component with its field name.
    pub fn identity(&self, key: &str) -> Result<ReconcileIdentity, CoreError> {
        let parts = self.parse(key)?;
        Ok(self
            .fields
            .iter()
            .zip(parts)
            .fold(ReconcileIdentity::new(), |id, (name, value)| id.with(*name, value)))
    }

    fn invalid(&self, problem: String) -> CoreError {
        CoreError::Validation {
            message: format!(
                "invalid import key: {problem}; expected \"{}\"",
                self.fields.join(",")
            ),
            code: None,
        }
    }
}
