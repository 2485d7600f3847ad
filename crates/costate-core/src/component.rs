//! Versioned state components and their update scopes
//!
//! A [`StateComponent`] pairs a payload with a monotonically increasing
//! [`Version`]. The payload is only reachable mutably through an
//! [`UpdateScope`], and releasing a scope advances the version by exactly one,
//! whether or not the payload actually changed. Observers therefore detect
//! staleness with a single `>` comparison, however many versions they missed.
//!
//! ```
//! use costate_core::StateRegistry;
//!
//! let mut registry = StateRegistry::new();
//! let counter = registry.register("counter", 0_u32).unwrap();
//!
//! {
//!     let mut scope = counter.begin_update().unwrap();
//!     *scope += 1;
//! } // released: version bumped
//!
//! assert_eq!(*counter.read().unwrap(), 1);
//! assert_eq!(counter.version().get(), 1);
//! ```

use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{CostateError, Result};
use crate::gate::{MutationGate, StagedComponent};

/// Version counter of a state component
///
/// `Version::ZERO` doubles as the "never observed" marker held by observers.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    pub const ZERO: Version = Version(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Versions stop at `u64::MAX`; reaching the ceiling is logged as an error.
    fn advanced(self, steps: u64) -> Self {
        match self.0.checked_add(steps) {
            Some(next) => Self(next),
            None => {
                tracing::error!(version = self.0, steps, "version counter exhausted");
                Self(u64::MAX)
            }
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Stable key of a state component within a registry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentKey(String);

impl ComponentKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ComponentKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&ComponentKey> for ComponentKey {
    fn from(key: &ComponentKey) -> Self {
        key.clone()
    }
}

/// Bound every component payload satisfies
///
/// `Clone` backs transaction rollback; serde backs undo snapshots.
pub trait Payload: Clone + Serialize + DeserializeOwned + fmt::Debug + 'static {}

impl<T> Payload for T where T: Clone + Serialize + DeserializeOwned + fmt::Debug + 'static {}

/// Addressable, versioned container of state
pub struct StateComponent<T> {
    key: ComponentKey,
    version: Cell<Version>,
    payload: RefCell<T>,
    gate: Rc<MutationGate>,
}

impl<T> StateComponent<T> {
    fn bump(&self, steps: u64) -> Version {
        let next = self.version.get().advanced(steps);
        self.version.set(next);
        tracing::trace!(state_component = %self.key, version = next.get(), "version published");
        next
    }
}

/// Shared handle to a [`StateComponent`]
///
/// Cloning the handle is cheap; every clone addresses the same component.
pub struct Component<T> {
    inner: Rc<StateComponent<T>>,
}

impl<T> Clone for Component<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Component<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("key", &self.inner.key)
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl<T: Payload> Component<T> {
    pub(crate) fn new(key: ComponentKey, initial: T, gate: Rc<MutationGate>) -> Self {
        Self {
            inner: Rc::new(StateComponent {
                key,
                version: Cell::new(Version::ZERO),
                payload: RefCell::new(initial),
                gate,
            }),
        }
    }

    pub fn key(&self) -> &ComponentKey {
        &self.inner.key
    }

    /// Current published version
    pub fn version(&self) -> Version {
        self.inner.version.get()
    }

    /// Borrow the current payload without opening a scope.
    ///
    /// # Errors
    ///
    /// Returns `ComponentBusy` while an update scope is open on the component.
    pub fn read(&self) -> Result<Ref<'_, T>> {
        self.inner
            .payload
            .try_borrow()
            .map_err(|_| CostateError::ComponentBusy {
                component: self.inner.key.to_string(),
            })
    }

    /// Clone of the current payload.
    ///
    /// # Errors
    ///
    /// Returns `ComponentBusy` while an update scope is open on the component.
    pub fn get(&self) -> Result<T> {
        self.read().map(|payload| payload.clone())
    }

    /// Open an exclusive update scope.
    ///
    /// # Errors
    ///
    /// - `UnauthorizedMutation` when an observer is running and did not
    ///   declare this component in its modified set
    /// - `ScopeAlreadyOpen` when a scope on this component is still alive
    pub fn begin_update(&self) -> Result<UpdateScope<'_, T>> {
        let inner = &self.inner;
        inner.gate.authorize(&inner.key)?;

        let payload =
            inner
                .payload
                .try_borrow_mut()
                .map_err(|_| CostateError::ScopeAlreadyOpen {
                    component: inner.key.to_string(),
                })?;

        inner.gate.stage(&inner.key, || {
            Box::new(Staged {
                component: self.clone(),
                pre_image: payload.clone(),
            })
        });

        tracing::trace!(state_component = %inner.key, "update scope opened");
        Ok(UpdateScope {
            component: self,
            payload,
        })
    }

    /// Run `f` inside an update scope; the version bump happens however `f` exits.
    ///
    /// # Errors
    ///
    /// Same as [`Component::begin_update`].
    pub fn with_update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut scope = self.begin_update()?;
        Ok(f(&mut scope))
    }

    /// Serialize the current payload for an undo snapshot.
    pub(crate) fn snapshot_value(&self) -> Result<serde_json::Value> {
        let payload = self.read()?;
        serde_json::to_value(&*payload).map_err(|e| CostateError::Snapshot {
            component: self.inner.key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Replace the payload with a snapshot through a normal update scope.
    pub(crate) fn restore_value(&self, data: &serde_json::Value) -> Result<()> {
        let restored: T =
            serde_json::from_value(data.clone()).map_err(|e| CostateError::Snapshot {
                component: self.inner.key.to_string(),
                reason: e.to_string(),
            })?;
        let mut scope = self.begin_update()?;
        *scope = restored;
        Ok(())
    }
}

struct Staged<T> {
    component: Component<T>,
    pre_image: T,
}

impl<T> StagedComponent for Staged<T> {
    fn publish(&self, bumps: u64) -> Version {
        self.component.inner.bump(bumps)
    }

    fn restore(self: Box<Self>) {
        let Staged {
            component,
            pre_image,
        } = *self;
        let slot = component.inner.payload.try_borrow_mut();
        match slot {
            Ok(mut payload) => *payload = pre_image,
            Err(_) => tracing::error!(
                state_component = %component.inner.key,
                "update scope outlived its transaction; payload not restored"
            ),
        };
    }
}

/// Exclusive mutation rights over one component
///
/// Derefs to the payload. Dropping the scope publishes exactly one version
/// bump, on every exit path including `?` and unwinding. Inside a dispatch
/// transaction the bump is staged and published when the handler succeeds.
pub struct UpdateScope<'a, T> {
    component: &'a Component<T>,
    payload: RefMut<'a, T>,
}

impl<T> UpdateScope<'_, T> {
    pub fn key(&self) -> &ComponentKey {
        &self.component.inner.key
    }
}

impl<T: fmt::Debug> fmt::Debug for UpdateScope<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateScope")
            .field("key", &self.component.inner.key)
            .field("payload", &*self.payload)
            .finish()
    }
}

impl<T> Deref for UpdateScope<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.payload
    }
}

impl<T> DerefMut for UpdateScope<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.payload
    }
}

impl<T> Drop for UpdateScope<'_, T> {
    fn drop(&mut self) {
        let inner = &self.component.inner;
        if inner.gate.defer_bump(&inner.key) {
            tracing::trace!(state_component = %inner.key, "update scope released (staged)");
        } else {
            inner.bump(1);
        }
    }
}

/// Type-erased view of a registered component
pub(crate) trait ErasedComponent {
    fn version(&self) -> Version;
    fn payload_type(&self) -> &'static str;
    fn snapshot(&self) -> Result<serde_json::Value>;
    fn restore(&self, data: &serde_json::Value) -> Result<()>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Payload> ErasedComponent for Component<T> {
    fn version(&self) -> Version {
        Component::version(self)
    }

    fn payload_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        self.snapshot_value()
    }

    fn restore(&self, data: &serde_json::Value) -> Result<()> {
        self.restore_value(data)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component<T: Payload>(key: &str, initial: T) -> Component<T> {
        Component::new(ComponentKey::from(key), initial, Rc::new(MutationGate::default()))
    }

    #[test]
    fn test_new_component_starts_at_zero() {
        let c = component("a", String::from("x"));
        assert_eq!(c.version(), Version::ZERO);
        assert_eq!(c.key().as_str(), "a");
    }

    #[test]
    fn test_scope_bumps_once_on_release() {
        let c = component("a", 0_i32);
        {
            let mut scope = c.begin_update().unwrap();
            *scope = 1;
            *scope = 2;
            assert_eq!(c.version(), Version::ZERO);
        }
        assert_eq!(c.version(), Version::new(1));
        assert_eq!(*c.read().unwrap(), 2);
    }

    #[test]
    fn test_untouched_scope_still_bumps() {
        let c = component("a", 0_i32);
        drop(c.begin_update().unwrap());
        assert_eq!(c.version(), Version::new(1));
    }

    #[test]
    fn test_sequential_scopes_bump_independently() {
        let c = component("a", vec![1_u8]);
        c.with_update(|v| v.push(2)).unwrap();
        c.with_update(|v| v.push(3)).unwrap();
        assert_eq!(c.version(), Version::new(2));
        assert_eq!(c.get().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_nested_scope_rejected() {
        let c = component("a", 0_i32);
        let _outer = c.begin_update().unwrap();
        let err = c.begin_update().unwrap_err();
        assert_eq!(
            err,
            CostateError::ScopeAlreadyOpen {
                component: "a".to_string()
            }
        );
    }

    #[test]
    fn test_read_while_open_is_busy() {
        let c = component("a", 0_i32);
        let _scope = c.begin_update().unwrap();
        assert!(matches!(c.read(), Err(CostateError::ComponentBusy { .. })));
    }

    #[test]
    fn test_early_return_still_bumps() {
        fn fails(c: &Component<i32>) -> Result<()> {
            let mut scope = c.begin_update()?;
            *scope = 5;
            Err(CostateError::handler_failure("Test", "stopped half way"))
        }

        let c = component("a", 0_i32);
        assert!(fails(&c).is_err());
        assert_eq!(c.version(), Version::new(1));
        assert_eq!(*c.read().unwrap(), 5);
    }

    #[test]
    fn test_panic_in_scope_still_bumps() {
        let c = component("a", 0_i32);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut scope = c.begin_update().unwrap();
            *scope = 9;
            panic!("handler bug");
        }));
        assert!(result.is_err());
        assert_eq!(c.version(), Version::new(1));
        assert!(c.begin_update().is_ok());
    }

    #[test]
    fn test_snapshot_and_restore_bump_version() {
        let c = component("a", vec![1_u32, 2]);
        let snapshot = c.snapshot_value().unwrap();
        c.with_update(|v| v.clear()).unwrap();

        c.restore_value(&snapshot).unwrap();
        assert_eq!(c.get().unwrap(), vec![1, 2]);
        assert_eq!(c.version(), Version::new(2));
    }

    #[test]
    fn test_restore_wrong_shape_fails_without_bump() {
        let c = component("a", 7_u32);
        let err = c.restore_value(&serde_json::json!("text")).unwrap_err();
        assert!(matches!(err, CostateError::Snapshot { .. }));
        assert_eq!(c.version(), Version::ZERO);
    }

    #[test]
    fn test_version_stops_at_ceiling() {
        let top = Version::new(u64::MAX - 1);
        assert_eq!(top.advanced(1), Version::new(u64::MAX));
        assert_eq!(top.advanced(5), Version::new(u64::MAX));
        assert_eq!(Version::new(7).advanced(3), Version::new(10));
    }

    #[test]
    fn test_rollback_restores_pre_image() {
        let gate = Rc::new(MutationGate::default());
        let c = Component::new(ComponentKey::from("a"), vec![1_u8], Rc::clone(&gate));
        {
            let _txn = gate.begin_transaction().unwrap();
            c.with_update(|v| v.push(2)).unwrap();
        }
        assert_eq!(c.get().unwrap(), vec![1]);
        assert_eq!(c.version(), Version::ZERO);
    }

    #[test]
    fn test_version_ordering() {
        assert!(Version::new(3) > Version::new(1));
        assert!(Version::ZERO < Version::new(1));
        assert_eq!(Version::new(4).to_string(), "v4");
    }
}
