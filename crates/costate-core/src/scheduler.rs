//! Observer scheduler
//!
//! Runs stale observers in registration order, once per pass. A pass is
//! driven by the host (or by the kernel after a dispatch) and never
//! re-enters itself: an observer only gets `&StateRegistry`.

use std::fmt;
use std::time::Instant;

use costate_core_types::RequestId;

use crate::component::{ComponentKey, Version};
use crate::config::PassPolicy;
use crate::errors::{CostateError, Result};
use crate::observer::{ObservedVersions, StateObserver};
use crate::registry::StateRegistry;
use crate::{log_op_end, log_op_error, log_op_start};

/// Handle returned by [`ObserverScheduler::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    /// Computing the stale set
    Scanning,
    /// Running observers
    Running,
}

/// Observers that ran during one pass, in run order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub ran: Vec<(ObserverId, String)>,
}

impl PassReport {
    pub fn len(&self) -> usize {
        self.ran.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ran.is_empty()
    }

    pub fn ran_ids(&self) -> Vec<ObserverId> {
        self.ran.iter().map(|(id, _)| *id).collect()
    }

    pub fn ran_names(&self) -> Vec<&str> {
        self.ran.iter().map(|(_, name)| name.as_str()).collect()
    }

    pub fn contains(&self, id: ObserverId) -> bool {
        self.ran.iter().any(|(ran, _)| *ran == id)
    }
}

struct ObserverEntry {
    id: ObserverId,
    name: String,
    observer: Box<dyn StateObserver>,
    versions: ObservedVersions,
}

pub struct ObserverScheduler {
    entries: Vec<ObserverEntry>,
    next_id: u64,
    pass_policy: PassPolicy,
    phase: SchedulerPhase,
}

impl Default for ObserverScheduler {
    fn default() -> Self {
        Self::new(PassPolicy::default())
    }
}

impl fmt::Debug for ObserverScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverScheduler")
            .field(
                "observers",
                &self
                    .entries
                    .iter()
                    .map(|entry| (entry.id, entry.name.as_str()))
                    .collect::<Vec<_>>(),
            )
            .field("pass_policy", &self.pass_policy)
            .field("phase", &self.phase)
            .finish()
    }
}

impl ObserverScheduler {
    pub fn new(pass_policy: PassPolicy) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            pass_policy,
            phase: SchedulerPhase::Idle,
        }
    }

    pub fn pass_policy(&self) -> PassPolicy {
        self.pass_policy
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// Add `observer` at the end of the run order. Its observed and modified
    /// sets are read once, here.
    pub fn register(&mut self, observer: Box<dyn StateObserver>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;

        let name = observer.name().to_string();
        let versions = ObservedVersions::new(
            observer.observed_components(),
            observer.modified_components(),
        );
        tracing::debug!(observer = %name, id = id.get(), "observer registered");

        self.entries.push(ObserverEntry {
            id,
            name,
            observer,
            versions,
        });
        id
    }

    /// Remove the observer. Returns `false` if it was not registered.
    pub fn unregister(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        let removed = self.entries.len() != before;
        if removed {
            tracing::debug!(id = id.get(), "observer unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Version bookkeeping of a registered observer
    pub fn observed_versions(&self, id: ObserverId) -> Option<&ObservedVersions> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| &entry.versions)
    }

    /// Run every stale observer once, in registration order.
    ///
    /// # Errors
    ///
    /// The first observer error aborts the pass and is returned. That
    /// observer keeps its old versions and stays stale; later observers have
    /// not run. `UnknownComponent` if an observer watches an unregistered key.
    pub fn run_pending(&mut self, registry: &StateRegistry) -> Result<PassReport> {
        let request_id = RequestId::new();
        log_op_start!(
            "observer_pass",
            observers = self.entries.len(),
            request_id = %request_id
        );
        let start = Instant::now();

        let result = self.run_pass(registry);
        self.set_phase(SchedulerPhase::Idle);

        match &result {
            Ok((stale_count, report)) => {
                log_op_end!(
                    "observer_pass",
                    duration_ms = start.elapsed().as_millis() as u64,
                    stale_count = *stale_count,
                    ran_count = report.len(),
                    request_id = %request_id
                );
            }
            Err(err) => {
                log_op_error!(
                    "observer_pass",
                    err.clone(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    request_id = %request_id
                );
            }
        }

        result.map(|(_, report)| report)
    }

    /// Run one observer now, stale or not.
    ///
    /// # Errors
    ///
    /// `UnknownObserver` if `id` is not registered, otherwise whatever the
    /// observer returns.
    pub fn run_observer(&mut self, id: ObserverId, registry: &StateRegistry) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(CostateError::UnknownObserver { id: id.get() })?;
        run_entry(entry, registry)
    }

    fn run_pass(&mut self, registry: &StateRegistry) -> Result<(usize, PassReport)> {
        let mut report = PassReport::default();

        self.set_phase(SchedulerPhase::Scanning);
        let initially_stale = self.stale_flags(registry)?;
        let stale_count = initially_stale.iter().filter(|stale| **stale).count();

        self.set_phase(SchedulerPhase::Running);
        let pass_policy = self.pass_policy;
        for (entry, was_stale) in self.entries.iter_mut().zip(initially_stale) {
            let due = match pass_policy {
                PassPolicy::Snapshot => was_stale,
                PassPolicy::Rescan => entry.versions.is_stale(registry)?,
            };
            if !due {
                continue;
            }
            run_entry(entry, registry)?;
            report.ran.push((entry.id, entry.name.clone()));
        }

        Ok((stale_count, report))
    }

    fn stale_flags(&self, registry: &StateRegistry) -> Result<Vec<bool>> {
        self.entries
            .iter()
            .map(|entry| entry.versions.is_stale(registry))
            .collect()
    }

    fn set_phase(&mut self, phase: SchedulerPhase) {
        if self.phase != phase {
            tracing::trace!(from = ?self.phase, to = ?phase, "scheduler phase");
            self.phase = phase;
        }
    }
}

fn run_entry(entry: &mut ObserverEntry, registry: &StateRegistry) -> Result<()> {
    let fetched = entry.versions.fetch_current(registry)?;

    {
        let _writer = registry
            .gate()
            .authorize_writer(&entry.name, entry.versions.modified_keys());
        entry.observer.observe(registry)?;
    }

    for (key, version) in fetched {
        let version = if entry.versions.modifies(&key) {
            post_observe_version(registry, &key, version)?
        } else {
            version
        };
        entry.versions.update_observed_version(&key, version);
    }

    tracing::debug!(observer = %entry.name, id = entry.id.get(), "observer ran");
    Ok(())
}

fn post_observe_version(
    registry: &StateRegistry,
    key: &ComponentKey,
    fetched: Version,
) -> Result<Version> {
    Ok(registry.version(key)?.max(fetched))
}
