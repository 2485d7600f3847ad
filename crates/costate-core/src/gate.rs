//! Mutation gate shared by every component of a registry
//!
//! The gate is the single place that knows whether a dispatch transaction is
//! open and which observer, if any, is currently allowed to write. Components
//! consult it when a scope is opened and when it is released.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use crate::component::{ComponentKey, Version};
use crate::errors::{CostateError, Result};

/// A component touched inside a transaction, with the payload it had before
pub(crate) trait StagedComponent {
    /// Advance the component's version by `bumps`, returning the new version.
    fn publish(&self, bumps: u64) -> Version;

    /// Put the pre-transaction payload back. The version is left alone.
    fn restore(self: Box<Self>);
}

struct StagedEntry {
    staged: Box<dyn StagedComponent>,
    bumps: u64,
}

#[derive(Default)]
struct Transaction {
    entries: BTreeMap<ComponentKey, StagedEntry>,
}

struct WriteAuthorization {
    observer: String,
    allowed: BTreeSet<ComponentKey>,
}

#[derive(Default)]
pub(crate) struct MutationGate {
    transaction: RefCell<Option<Transaction>>,
    writer: RefCell<Option<WriteAuthorization>>,
}

impl MutationGate {
    /// Reject the write if an observer is running and did not declare `key`.
    pub(crate) fn authorize(&self, key: &ComponentKey) -> Result<()> {
        match &*self.writer.borrow() {
            Some(auth) if !auth.allowed.contains(key) => Err(CostateError::UnauthorizedMutation {
                observer: auth.observer.clone(),
                component: key.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Record the pre-image of `key` the first time it is opened in the
    /// active transaction. No-op outside a transaction.
    pub(crate) fn stage(&self, key: &ComponentKey, make: impl FnOnce() -> Box<dyn StagedComponent>) {
        if let Some(txn) = self.transaction.borrow_mut().as_mut() {
            txn.entries
                .entry(key.clone())
                .or_insert_with(|| StagedEntry {
                    staged: make(),
                    bumps: 0,
                });
        }
    }

    /// Count a released scope against the active transaction.
    ///
    /// Returns `false` when the caller must publish the bump itself.
    pub(crate) fn defer_bump(&self, key: &ComponentKey) -> bool {
        let mut slot = self.transaction.borrow_mut();
        match slot.as_mut().and_then(|txn| txn.entries.get_mut(key)) {
            Some(entry) => {
                entry.bumps += 1;
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn in_transaction(&self) -> bool {
        self.transaction.borrow().is_some()
    }

    pub(crate) fn begin_transaction(&self) -> Result<TransactionGuard<'_>> {
        let mut slot = self.transaction.borrow_mut();
        if slot.is_some() {
            return Err(CostateError::TransactionAlreadyActive);
        }
        *slot = Some(Transaction::default());
        Ok(TransactionGuard {
            gate: self,
            finished: false,
        })
    }

    /// Restrict writes to `allowed` until the returned guard drops.
    pub(crate) fn authorize_writer<'a>(
        &'a self,
        observer: &str,
        allowed: impl IntoIterator<Item = &'a ComponentKey>,
    ) -> WriterGuard<'a> {
        let auth = WriteAuthorization {
            observer: observer.to_string(),
            allowed: allowed.into_iter().cloned().collect(),
        };
        let previous = self.writer.replace(Some(auth));
        WriterGuard {
            gate: self,
            previous,
        }
    }

    fn rollback_active(&self) -> usize {
        let Some(txn) = self.transaction.borrow_mut().take() else {
            return 0;
        };
        let restored = txn.entries.len();
        for (key, entry) in txn.entries {
            tracing::debug!(state_component = %key, discarded_bumps = entry.bumps, "rolling back");
            entry.staged.restore();
        }
        restored
    }
}

/// Open dispatch transaction; rolls back on drop unless committed.
pub(crate) struct TransactionGuard<'a> {
    gate: &'a MutationGate,
    finished: bool,
}

impl TransactionGuard<'_> {
    /// Publish every staged bump. Returns the new version of each component
    /// that was released at least once.
    pub(crate) fn commit(mut self) -> Vec<(ComponentKey, Version)> {
        self.finished = true;
        let Some(txn) = self.gate.transaction.borrow_mut().take() else {
            return Vec::new();
        };
        txn.entries
            .into_iter()
            .filter(|(_, entry)| entry.bumps > 0)
            .map(|(key, entry)| {
                let version = entry.staged.publish(entry.bumps);
                (key, version)
            })
            .collect()
    }

    /// Restore every staged payload and drop the pending bumps. Returns the
    /// number of components restored.
    pub(crate) fn rollback(mut self) -> usize {
        self.finished = true;
        self.gate.rollback_active()
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.gate.rollback_active();
        }
    }
}

/// Write authorization of the running observer; restores the previous one on drop.
pub(crate) struct WriterGuard<'a> {
    gate: &'a MutationGate,
    previous: Option<WriteAuthorization>,
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        *self.gate.writer.borrow_mut() = self.previous.take();
    }
}
