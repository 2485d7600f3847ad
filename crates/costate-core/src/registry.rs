//! State registry
//!
//! Explicit context passed to every handler and observer. Each registry owns
//! its own mutation gate, so independent registries (one per test, say) never
//! see each other's transactions.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::component::{Component, ComponentKey, ErasedComponent, Payload, Version};
use crate::errors::{CostateError, Result};
use crate::gate::MutationGate;

#[derive(Default)]
pub struct StateRegistry {
    components: BTreeMap<ComponentKey, Box<dyn ErasedComponent>>,
    gate: Rc<MutationGate>,
}

impl fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.components
                    .iter()
                    .map(|(key, component)| (key.as_str(), component.version())),
            )
            .finish()
    }
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component under `key` with version `Version::ZERO`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateComponent` if the key is already taken.
    pub fn register<T: Payload>(
        &mut self,
        key: impl Into<ComponentKey>,
        initial: T,
    ) -> Result<Component<T>> {
        let key = key.into();
        if self.components.contains_key(&key) {
            return Err(CostateError::DuplicateComponent {
                component: key.to_string(),
            });
        }

        let component = Component::new(key.clone(), initial, Rc::clone(&self.gate));
        tracing::debug!(state_component = %key, payload = std::any::type_name::<T>(), "component registered");
        self.components.insert(key, Box::new(component.clone()));
        Ok(component)
    }

    /// Fetch the component under `key`, creating it with `init` on first access.
    ///
    /// # Errors
    ///
    /// Returns `ComponentTypeMismatch` if the key holds another payload type.
    pub fn get_or_register_with<T: Payload>(
        &mut self,
        key: impl Into<ComponentKey>,
        init: impl FnOnce() -> T,
    ) -> Result<Component<T>> {
        let key = key.into();
        if self.components.contains_key(&key) {
            self.get(&key)
        } else {
            self.register(key, init())
        }
    }

    /// Typed handle to the component under `key`.
    ///
    /// # Errors
    ///
    /// - `UnknownComponent` if nothing is registered under the key
    /// - `ComponentTypeMismatch` if the payload type differs from `T`
    pub fn get<T: Payload>(&self, key: impl Into<ComponentKey>) -> Result<Component<T>> {
        let key = key.into();
        let erased = self.erased(&key)?;
        erased
            .as_any()
            .downcast_ref::<Component<T>>()
            .cloned()
            .ok_or_else(|| CostateError::ComponentTypeMismatch {
                component: key.to_string(),
                expected: std::any::type_name::<T>().to_string(),
                actual: erased.payload_type().to_string(),
            })
    }

    /// Current version of the component under `key`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownComponent` if nothing is registered under the key.
    pub fn version(&self, key: &ComponentKey) -> Result<Version> {
        self.erased(key).map(|component| component.version())
    }

    pub fn contains(&self, key: &ComponentKey) -> bool {
        self.components.contains_key(key)
    }

    /// Registered keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &ComponentKey> {
        self.components.keys()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub(crate) fn erased(&self, key: &ComponentKey) -> Result<&dyn ErasedComponent> {
        self.components
            .get(key)
            .map(|component| component.as_ref())
            .ok_or_else(|| CostateError::UnknownComponent {
                component: key.to_string(),
            })
    }

    pub(crate) fn gate(&self) -> &MutationGate {
        &self.gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let mut registry = StateRegistry::new();
        let a = registry.register("a", 1_u32).unwrap();
        let again: Component<u32> = registry.get("a").unwrap();

        a.with_update(|v| *v = 2).unwrap();
        assert_eq!(*again.read().unwrap(), 2);
        assert_eq!(again.version(), Version::new(1));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut registry = StateRegistry::new();
        registry.register("a", 1_u32).unwrap();
        let err = registry.register("a", 2_u32).unwrap_err();
        assert_eq!(
            err,
            CostateError::DuplicateComponent {
                component: "a".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_key() {
        let registry = StateRegistry::new();
        let err = registry.get::<u32>("missing").unwrap_err();
        assert!(matches!(err, CostateError::UnknownComponent { .. }));
        assert!(registry.version(&ComponentKey::from("missing")).is_err());
    }

    #[test]
    fn test_type_mismatch() {
        let mut registry = StateRegistry::new();
        registry.register("a", 1_u32).unwrap();
        let err = registry.get::<String>("a").unwrap_err();
        match err {
            CostateError::ComponentTypeMismatch {
                component, actual, ..
            } => {
                assert_eq!(component, "a");
                assert_eq!(actual, "u32");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_lazy_registration() {
        let mut registry = StateRegistry::new();
        let first = registry
            .get_or_register_with("lazy", || vec!["x".to_string()])
            .unwrap();
        first.with_update(|v| v.push("y".to_string())).unwrap();

        let second = registry
            .get_or_register_with("lazy", Vec::<String>::new)
            .unwrap();
        assert_eq!(second.get().unwrap().len(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_keys_sorted() {
        let mut registry = StateRegistry::new();
        registry.register("b", 0_u8).unwrap();
        registry.register("a", 0_u8).unwrap();
        let keys: Vec<&str> = registry.keys().map(ComponentKey::as_str).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_registries_are_isolated() {
        let mut one = StateRegistry::new();
        let mut two = StateRegistry::new();
        let a1 = one.register("a", 0_u8).unwrap();
        let a2 = two.register("a", 0_u8).unwrap();

        let _txn = one.gate().begin_transaction().unwrap();
        assert!(!two.gate().in_transaction());
        a2.with_update(|v| *v = 1).unwrap();
        assert_eq!(a2.version(), Version::new(1));
        assert_eq!(a1.version(), Version::ZERO);
    }
}
