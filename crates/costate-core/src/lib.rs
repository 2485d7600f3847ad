//! Costate Core - Reactive state-coordination kernel
//!
//! This crate provides the single-threaded kernel that keeps application
//! state consistent between producers and consumers, including:
//! - Versioned state components mutated only through RAII update scopes
//! - Commands routed to exactly one handler by a closed kind enum
//! - Two-phase dispatch that publishes version bumps only on success
//! - Observers that run when a component they watch has moved on
//! - Undo/redo history kept as an ordinary state component
//!
//! Everything runs on the caller's thread and to completion; nothing here is
//! `Send`.

pub mod command;
pub mod component;
pub mod config;
pub mod errors;
pub mod kernel;
pub mod logging_facility;
pub mod observer;
pub mod registry;
pub mod scheduler;
pub mod undo;

mod gate;

// Used by the logging macros
pub use costate_core_types;

// Re-export commonly used types
pub use command::{Command, CommandHandler, Dispatcher, HandlerContext};
pub use component::{Component, ComponentKey, Payload, StateComponent, UpdateScope, Version};
pub use config::{FailurePolicy, KernelConfig, PassPolicy};
pub use errors::{CostateError, CsError, CsErrorKind, Result};
pub use kernel::Kernel;
pub use observer::{ObservedVersions, StateObserver};
pub use registry::StateRegistry;
pub use scheduler::{ObserverId, ObserverScheduler, PassReport, SchedulerPhase};
pub use undo::{
    HistoryCommand, Snapshot, UndoEntry, UndoHistory, UndoScope, UndoStateComponent,
    UNDO_COMPONENT_KEY,
};
