// ── Connection registry ──
//
// Maps profile names to connection profiles. Built once at configuration
// time and passed by reference; there is no ambient registry.

use tracing::debug;

use crate::config::ConnectionProfile;
use crate::error::CoreError;

/// Append-only set of connection profiles with unique names.
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    profiles: Vec<ConnectionProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from an ordered profile list.
    pub fn from_profiles(profiles: Vec<ConnectionProfile>) -> Result<Self, CoreError> {
        let mut registry = Self::new();
        registry.register(profiles)?;
        Ok(registry)
    }

    /// Append profiles. Fails without modifying the registry if any name is
    /// empty or already taken (including duplicates within `profiles`).
    pub fn register(&mut self, profiles: Vec<ConnectionProfile>) -> Result<(), CoreError> {
        for (i, profile) in profiles.iter().enumerate() {
            if profile.name.trim().is_empty() {
                return Err(CoreError::config(format!(
                    "connection profile #{} has an empty name",
                    self.profiles.len() + i + 1
                )));
            }
            let taken = self.get(&profile.name).is_some()
                || profiles[..i].iter().any(|p| p.name == profile.name);
            if taken {
                return Err(CoreError::config(format!(
                    "duplicate connection profile name '{}'",
                    profile.name
                )));
            }
        }

        debug!(count = profiles.len(), "registering connection profiles");
        self.profiles.extend(profiles);
        Ok(())
    }

    /// Resolve a profile by name.
    ///
    /// An empty `name` selects the only registered profile; it is an error
    /// when zero or several are registered.
    pub fn resolve(&self, name: &str) -> Result<&ConnectionProfile, CoreError> {
        if self.profiles.is_empty() {
            return Err(CoreError::config(
                "no connection profiles configured; at least one is required",
            ));
        }

        if name.is_empty() {
            return match self.profiles.as_slice() {
                [only] => Ok(only),
                many => Err(CoreError::config(format!(
                    "profile name is required when more than one profile is configured (available: {})",
                    many.iter()
                        .map(|p| p.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))),
            };
        }

        self.get(name).ok_or_else(|| CoreError::NotFound {
            target: format!("connection profile '{name}'"),
            message: "no profile with this name is configured".into(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&ConnectionProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
