//! State observers
//!
//! An observer declares which components it reads and which it may write.
//! The scheduler keeps, per observer, the version of each observed component
//! it last processed; an observer runs when any of those is behind.

use crate::component::{ComponentKey, Version};
use crate::errors::Result;
use crate::registry::StateRegistry;

/// Reacts to changes of the components it observes
///
/// `observe` reads whatever it needs from the registry. Writes are limited to
/// the components listed by `modified_components`; anything else fails with
/// `UnauthorizedMutation`.
pub trait StateObserver {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    fn observed_components(&self) -> Vec<ComponentKey>;

    fn modified_components(&self) -> Vec<ComponentKey> {
        Vec::new()
    }

    /// Bring whatever this observer maintains up to date.
    ///
    /// # Errors
    ///
    /// Any error aborts the current pass and is returned to its caller.
    fn observe(&mut self, registry: &StateRegistry) -> Result<()>;
}

/// Per-observer version bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedVersions {
    observed: Vec<(ComponentKey, Version)>,
    modified: Vec<ComponentKey>,
}

impl ObservedVersions {
    /// Deduplicates both lists, keeping first-seen order. Every observed
    /// component starts at `Version::ZERO`.
    pub fn new(
        observed: impl IntoIterator<Item = ComponentKey>,
        modified: impl IntoIterator<Item = ComponentKey>,
    ) -> Self {
        let mut observed_keys: Vec<ComponentKey> = Vec::new();
        for key in observed {
            if !observed_keys.contains(&key) {
                observed_keys.push(key);
            }
        }
        let mut modified_keys: Vec<ComponentKey> = Vec::new();
        for key in modified {
            if !modified_keys.contains(&key) {
                modified_keys.push(key);
            }
        }

        Self {
            observed: observed_keys
                .into_iter()
                .map(|key| (key, Version::ZERO))
                .collect(),
            modified: modified_keys,
        }
    }

    pub fn observed_keys(&self) -> impl Iterator<Item = &ComponentKey> {
        self.observed.iter().map(|(key, _)| key)
    }

    pub fn modified_keys(&self) -> &[ComponentKey] {
        &self.modified
    }

    pub fn observes(&self, key: &ComponentKey) -> bool {
        self.observed.iter().any(|(k, _)| k == key)
    }

    pub fn modifies(&self, key: &ComponentKey) -> bool {
        self.modified.contains(key)
    }

    /// Version remembered for `key`, or `Version::ZERO` if it is not observed.
    pub fn last_observed_version(&self, key: &ComponentKey) -> Version {
        self.observed
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, version)| *version)
            .unwrap_or(Version::ZERO)
    }

    /// Remember `version` for `key`. Ignored if `key` is not observed.
    pub fn update_observed_version(&mut self, key: &ComponentKey, version: Version) {
        if let Some(slot) = self.observed.iter_mut().find(|(k, _)| k == key) {
            slot.1 = version;
        }
    }

    /// True if any observed component is newer than remembered. An observer
    /// with nothing observed is never stale.
    ///
    /// # Errors
    ///
    /// Returns `UnknownComponent` if an observed key is not registered.
    pub fn is_stale(&self, registry: &StateRegistry) -> Result<bool> {
        for (key, last) in &self.observed {
            if registry.version(key)? > *last {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Current versions of every observed component, in declaration order.
    pub(crate) fn fetch_current(
        &self,
        registry: &StateRegistry,
    ) -> Result<Vec<(ComponentKey, Version)>> {
        self.observed
            .iter()
            .map(|(key, _)| Ok((key.clone(), registry.version(key)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<ComponentKey> {
        names.iter().map(|n| ComponentKey::from(*n)).collect()
    }

    #[test]
    fn test_lists_are_deduplicated_in_order() {
        let versions = ObservedVersions::new(keys(&["b", "a", "b"]), keys(&["c", "c"]));
        let observed: Vec<&str> = versions.observed_keys().map(ComponentKey::as_str).collect();
        assert_eq!(observed, vec!["b", "a"]);
        assert_eq!(versions.modified_keys(), keys(&["c"]).as_slice());
    }

    #[test]
    fn test_unknown_key_reads_as_zero_and_ignores_updates() {
        let mut versions = ObservedVersions::new(keys(&["a"]), Vec::new());
        let other = ComponentKey::from("other");
        versions.update_observed_version(&other, Version::new(5));
        assert_eq!(versions.last_observed_version(&other), Version::ZERO);
        assert!(!versions.observes(&other));
    }

    #[test]
    fn test_update_and_read_back() {
        let mut versions = ObservedVersions::new(keys(&["a"]), Vec::new());
        let a = ComponentKey::from("a");
        assert_eq!(versions.last_observed_version(&a), Version::ZERO);
        versions.update_observed_version(&a, Version::new(3));
        assert_eq!(versions.last_observed_version(&a), Version::new(3));
    }

    #[test]
    fn test_staleness_uses_ordering() {
        let mut registry = StateRegistry::new();
        let a = registry.register("a", 0_u32).unwrap();
        let mut versions = ObservedVersions::new(keys(&["a"]), Vec::new());
        assert!(!versions.is_stale(&registry).unwrap());

        for _ in 0..5 {
            a.with_update(|v| *v += 1).unwrap();
        }
        assert!(versions.is_stale(&registry).unwrap());

        versions.update_observed_version(a.key(), a.version());
        assert!(!versions.is_stale(&registry).unwrap());
    }

    #[test]
    fn test_empty_observer_never_stale() {
        let mut registry = StateRegistry::new();
        let a = registry.register("a", 0_u32).unwrap();
        a.with_update(|v| *v += 1).unwrap();
        let versions = ObservedVersions::new(Vec::new(), Vec::new());
        assert!(!versions.is_stale(&registry).unwrap());
    }

    #[test]
    fn test_unregistered_observed_component_is_an_error() {
        let registry = StateRegistry::new();
        let versions = ObservedVersions::new(keys(&["ghost"]), Vec::new());
        assert!(versions.is_stale(&registry).is_err());
    }
}
