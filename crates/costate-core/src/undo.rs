//! Undo/redo history as an ordinary state component
//!
//! A handler that wants undo support opens an [`UndoScope`] on the undo
//! component before touching anything else, saves the components it is about
//! to change, releases the undo scope, and only then opens its forward scopes.
//! Undo and redo are themselves dispatched commands ([`HistoryCommand`]) whose
//! handlers restore snapshots through normal update scopes, so a restore bumps
//! versions and wakes observers like any other mutation.
//!
//! ```
//! use costate_core::{StateRegistry, UndoHistory};
//!
//! let mut registry = StateRegistry::new();
//! let title = registry.register("title", String::from("draft")).unwrap();
//! let undo = registry.register("undo", UndoHistory::default()).unwrap();
//!
//! {
//!     let mut undo_scope = undo.begin_undo_scope().unwrap();
//!     undo_scope.save_state(&title, "Rename").unwrap();
//! }
//! *title.begin_update().unwrap() = String::from("final");
//!
//! assert_eq!(undo.read().unwrap().undo_labels(), vec!["Rename"]);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::{Command, Dispatcher, HandlerContext};
use crate::component::{Component, ComponentKey, Payload, UpdateScope};
use crate::config::FailurePolicy;
use crate::errors::Result;

/// Key the kernel registers the undo component under
pub const UNDO_COMPONENT_KEY: &str = "undo";

/// The undo component
pub type UndoStateComponent = Component<UndoHistory>;

/// Serialized payload of one component at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub key: ComponentKey,
    pub data: serde_json::Value,
}

/// One user-visible undo step; may cover several components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoEntry {
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub snapshots: Vec<Snapshot>,
}

impl UndoEntry {
    fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            created_at: Utc::now(),
            snapshots: Vec::new(),
        }
    }

    pub fn covers(&self, key: &ComponentKey) -> bool {
        self.snapshots.iter().any(|snapshot| &snapshot.key == key)
    }
}

/// Payload of the undo component
///
/// Serializable as a whole so hosts can persist the history in whatever
/// format they like.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UndoHistory {
    undo: Vec<UndoEntry>,
    redo: Vec<UndoEntry>,
    /// 0 keeps everything
    max_depth: usize,
}

impl UndoHistory {
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Undo entries, oldest first
    pub fn undo_entries(&self) -> &[UndoEntry] {
        &self.undo
    }

    /// Redo entries, oldest first
    pub fn redo_entries(&self) -> &[UndoEntry] {
        &self.redo
    }

    /// Labels of the undo stack, most recent first
    pub fn undo_labels(&self) -> Vec<&str> {
        self.undo.iter().rev().map(|e| e.label.as_str()).collect()
    }

    /// Labels of the redo stack, most recent first
    pub fn redo_labels(&self) -> Vec<&str> {
        self.redo.iter().rev().map(|e| e.label.as_str()).collect()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// A fresh user action: new undo step, redo invalidated.
    fn record(&mut self, entry: UndoEntry) {
        self.undo.push(entry);
        self.redo.clear();
        self.trim();
    }

    fn pop(&mut self, direction: HistoryCommand) -> Option<UndoEntry> {
        match direction {
            HistoryCommand::Undo => self.undo.pop(),
            HistoryCommand::Redo => self.redo.pop(),
        }
    }

    /// Park the state an undo/redo is about to overwrite on the opposite stack.
    fn push_inverse(&mut self, direction: HistoryCommand, inverse: UndoEntry) {
        match direction {
            HistoryCommand::Undo => self.redo.push(inverse),
            HistoryCommand::Redo => {
                self.undo.push(inverse);
                self.trim();
            }
        }
    }

    fn trim(&mut self) {
        if self.max_depth > 0 && self.undo.len() > self.max_depth {
            let excess = self.undo.len() - self.max_depth;
            self.undo.drain(..excess);
        }
    }
}

/// Update scope over the undo component
///
/// Every `save_state` call made through one scope lands in the same entry;
/// releasing the scope records the entry and clears the redo stack.
pub struct UndoScope<'a> {
    scope: UpdateScope<'a, UndoHistory>,
    entry: Option<UndoEntry>,
}

impl Component<UndoHistory> {
    /// Open the undo component for recording a new step.
    ///
    /// # Errors
    ///
    /// Same as [`Component::begin_update`].
    pub fn begin_undo_scope(&self) -> Result<UndoScope<'_>> {
        Ok(UndoScope {
            scope: self.begin_update()?,
            entry: None,
        })
    }
}

impl UndoScope<'_> {
    /// Capture the current payload of `component` as the pre-mutation
    /// baseline. The first label given to a scope names the entry; saving the
    /// same component twice keeps the first snapshot.
    ///
    /// # Errors
    ///
    /// - `ComponentBusy` if `component` has an open update scope
    /// - `Snapshot` if the payload does not serialize
    pub fn save_state<T: Payload>(&mut self, component: &Component<T>, label: &str) -> Result<()> {
        if self
            .entry
            .as_ref()
            .is_some_and(|entry| entry.covers(component.key()))
        {
            return Ok(());
        }
        let data = component.snapshot_value()?;
        tracing::debug!(state_component = %component.key(), label, "state saved for undo");
        let entry = self.entry.get_or_insert_with(|| UndoEntry::new(label));
        entry.snapshots.push(Snapshot {
            key: component.key().clone(),
            data,
        });
        Ok(())
    }

    pub fn history(&self) -> &UndoHistory {
        &self.scope
    }
}

impl Drop for UndoScope<'_> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.scope.record(entry);
        }
    }
}

/// Built-in history commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HistoryCommand {
    Undo,
    Redo,
}

impl Command for HistoryCommand {
    type Kind = HistoryCommand;

    fn kind(&self) -> HistoryCommand {
        *self
    }
}

/// Dispatcher with the undo and redo handlers registered.
///
/// # Errors
///
/// Only fails if registration itself fails, which it cannot on a fresh
/// dispatcher.
pub fn history_dispatcher(failure_policy: FailurePolicy) -> Result<Dispatcher<HistoryCommand>> {
    let mut dispatcher = Dispatcher::<HistoryCommand>::with_failure_policy(failure_policy);
    dispatcher.register(HistoryCommand::Undo, replay)?;
    dispatcher.register(HistoryCommand::Redo, replay)?;
    Ok(dispatcher)
}

fn replay(ctx: &HandlerContext<'_>, direction: &HistoryCommand) -> Result<()> {
    let direction = *direction;
    let available = {
        let history = ctx.undo.read()?;
        match direction {
            HistoryCommand::Undo => history.can_undo(),
            HistoryCommand::Redo => history.can_redo(),
        }
    };
    if !available {
        tracing::debug!(?direction, "history empty; nothing to replay");
        return Ok(());
    }

    let entry = {
        let mut history = ctx.undo.begin_update()?;
        let Some(entry) = history.pop(direction) else {
            return Ok(());
        };

        let mut inverse = UndoEntry::new(entry.label.clone());
        for snapshot in &entry.snapshots {
            let current = ctx.registry.erased(&snapshot.key)?.snapshot()?;
            inverse.snapshots.push(Snapshot {
                key: snapshot.key.clone(),
                data: current,
            });
        }
        history.push_inverse(direction, inverse);
        entry
    };

    for snapshot in &entry.snapshots {
        ctx.registry.erased(&snapshot.key)?.restore(&snapshot.data)?;
    }

    tracing::debug!(
        ?direction,
        label = %entry.label,
        components = entry.snapshots.len(),
        "history replayed"
    );
    Ok(())
}
