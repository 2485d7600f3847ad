//! Commands, handlers and the dispatcher
//!
//! A command is an immutable description of a requested change. Its kind is
//! a closed enum, and the dispatcher routes each kind to exactly one handler
//! through a table built at registration time.
//!
//! ## Example
//!
//! ```
//! use costate_core::{Command, Dispatcher, HandlerContext, StateRegistry, UndoHistory};
//!
//! #[derive(Debug)]
//! enum CounterCommand {
//!     Add(u32),
//! }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
//! enum CounterKind {
//!     Add,
//! }
//!
//! impl Command for CounterCommand {
//!     type Kind = CounterKind;
//!
//!     fn kind(&self) -> CounterKind {
//!         match self {
//!             CounterCommand::Add(_) => CounterKind::Add,
//!         }
//!     }
//! }
//!
//! let mut registry = StateRegistry::new();
//! let counter = registry.register("counter", 0_u32).unwrap();
//! let undo = registry.register("undo", UndoHistory::default()).unwrap();
//!
//! let mut dispatcher: Dispatcher<CounterCommand> = Dispatcher::new();
//! dispatcher
//!     .register(CounterKind::Add, |ctx, cmd| {
//!         let CounterCommand::Add(n) = cmd;
//!         let counter = ctx.component::<u32>("counter")?;
//!         let mut scope = counter.begin_update()?;
//!         *scope += n;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let ctx = HandlerContext::new(&registry, &undo);
//! dispatcher.dispatch(&ctx, CounterCommand::Add(2)).unwrap();
//! assert_eq!(*counter.read().unwrap(), 2);
//! assert_eq!(counter.version().get(), 1);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use costate_core_types::RequestId;

use crate::component::{Component, ComponentKey, Payload};
use crate::config::FailurePolicy;
use crate::errors::{CostateError, Result};
use crate::registry::StateRegistry;
use crate::undo::UndoStateComponent;
use crate::{log_op_end, log_op_error, log_op_start};

/// Immutable request for a state change
pub trait Command: fmt::Debug {
    /// Closed set of command kinds; one handler per kind.
    type Kind: Copy + Ord + fmt::Debug;

    fn kind(&self) -> Self::Kind;

    /// Human-readable label for the undo history
    fn undo_label(&self) -> Option<&str> {
        None
    }
}

/// What a handler gets to work with
pub struct HandlerContext<'a> {
    pub registry: &'a StateRegistry,
    pub undo: &'a UndoStateComponent,
}

impl<'a> HandlerContext<'a> {
    pub fn new(registry: &'a StateRegistry, undo: &'a UndoStateComponent) -> Self {
        Self { registry, undo }
    }

    /// Shorthand for `self.registry.get(key)`.
    ///
    /// # Errors
    ///
    /// See [`StateRegistry::get`].
    pub fn component<T: Payload>(&self, key: impl Into<ComponentKey>) -> Result<Component<T>> {
        self.registry.get(key)
    }
}

/// Executes one command kind's effect through update scopes
pub type CommandHandler<C> = Box<dyn Fn(&HandlerContext<'_>, &C) -> Result<()>>;

/// Routes commands to their registered handler
pub struct Dispatcher<C: Command> {
    handlers: BTreeMap<C::Kind, CommandHandler<C>>,
    failure_policy: FailurePolicy,
}

impl<C: Command> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Command> fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}

impl<C: Command> Dispatcher<C> {
    /// Dispatcher with the default (`Rollback`) failure policy
    pub fn new() -> Self {
        Self::with_failure_policy(FailurePolicy::default())
    }

    pub fn with_failure_policy(failure_policy: FailurePolicy) -> Self {
        Self {
            handlers: BTreeMap::new(),
            failure_policy,
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Register the handler for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateHandlerRegistered` if `kind` already has a handler.
    pub fn register<F>(&mut self, kind: C::Kind, handler: F) -> Result<()>
    where
        F: Fn(&HandlerContext<'_>, &C) -> Result<()> + 'static,
    {
        if self.handlers.contains_key(&kind) {
            return Err(CostateError::DuplicateHandlerRegistered {
                kind: format!("{:?}", kind),
            });
        }
        tracing::debug!(command_kind = ?kind, "handler registered");
        self.handlers.insert(kind, Box::new(handler));
        Ok(())
    }

    pub fn is_registered(&self, kind: C::Kind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Registered kinds in order
    pub fn kinds(&self) -> impl Iterator<Item = C::Kind> + '_ {
        self.handlers.keys().copied()
    }

    /// Route `command` to its handler and run it to completion.
    ///
    /// The command is consumed. Under `FailurePolicy::Rollback` the handler's
    /// version bumps are published only if it returns `Ok`; otherwise every
    /// component it touched gets its payload back. The handler's error is
    /// returned as is.
    ///
    /// # Errors
    ///
    /// - `NoHandlerRegistered` if nothing handles the command's kind (no
    ///   state is touched)
    /// - `TransactionAlreadyActive` if called from inside another dispatch
    /// - whatever the handler returns
    pub fn dispatch(&self, ctx: &HandlerContext<'_>, command: C) -> Result<()> {
        let kind = command.kind();
        let request_id = RequestId::new();
        log_op_start!(
            "dispatch",
            command_kind = ?kind,
            request_id = %request_id
        );
        let start = Instant::now();

        let result = self.dispatch_impl(ctx, &command, kind);

        match &result {
            Ok(()) => {
                log_op_end!(
                    "dispatch",
                    duration_ms = start.elapsed().as_millis() as u64,
                    command_kind = ?kind,
                    request_id = %request_id
                );
            }
            Err(err) => {
                log_op_error!(
                    "dispatch",
                    err.clone(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    command_kind = ?kind,
                    request_id = %request_id
                );
            }
        }

        result
    }

    fn dispatch_impl(&self, ctx: &HandlerContext<'_>, command: &C, kind: C::Kind) -> Result<()> {
        let handler = self
            .handlers
            .get(&kind)
            .ok_or_else(|| CostateError::NoHandlerRegistered {
                kind: format!("{:?}", kind),
            })?;

        match self.failure_policy {
            FailurePolicy::KeepPartial => handler(ctx, command),
            FailurePolicy::Rollback => {
                let txn = ctx.registry.gate().begin_transaction()?;
                match handler(ctx, command) {
                    Ok(()) => {
                        let published = txn.commit();
                        tracing::debug!(
                            command_kind = ?kind,
                            published = published.len(),
                            "transaction committed"
                        );
                        Ok(())
                    }
                    Err(err) => {
                        let restored = txn.rollback();
                        tracing::debug!(command_kind = ?kind, restored, "transaction rolled back");
                        Err(err)
                    }
                }
            }
        }
    }
}
