//! Kernel façade
//!
//! Bundles the registry, the domain dispatcher, the history dispatcher, the
//! observer scheduler and the undo component behind one owner, wired from a
//! [`KernelConfig`].

use std::fmt;

use crate::command::{Command, Dispatcher, HandlerContext};
use crate::component::{Component, ComponentKey, Payload};
use crate::config::KernelConfig;
use crate::errors::Result;
use crate::observer::StateObserver;
use crate::registry::StateRegistry;
use crate::scheduler::{ObserverId, ObserverScheduler, PassReport};
use crate::undo::{
    history_dispatcher, HistoryCommand, UndoHistory, UndoStateComponent, UNDO_COMPONENT_KEY,
};

pub struct Kernel<C: Command> {
    config: KernelConfig,
    registry: StateRegistry,
    undo: UndoStateComponent,
    dispatcher: Dispatcher<C>,
    history: Dispatcher<HistoryCommand>,
    scheduler: ObserverScheduler,
}

impl<C: Command> fmt::Debug for Kernel<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("dispatcher", &self.dispatcher)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl<C: Command> Kernel<C> {
    /// Fresh kernel with the undo component registered under
    /// [`UNDO_COMPONENT_KEY`].
    ///
    /// # Errors
    ///
    /// Only fails if the built-in registrations fail.
    pub fn new(config: KernelConfig) -> Result<Self> {
        let mut registry = StateRegistry::new();
        let undo = registry.register(
            UNDO_COMPONENT_KEY,
            UndoHistory::with_max_depth(config.undo_depth),
        )?;

        tracing::debug!(
            failure_policy = ?config.failure_policy,
            pass_policy = ?config.pass_policy,
            run_observers_after_dispatch = config.run_observers_after_dispatch,
            undo_depth = config.undo_depth,
            "kernel created"
        );

        Ok(Self {
            dispatcher: Dispatcher::with_failure_policy(config.failure_policy),
            history: history_dispatcher(config.failure_policy)?,
            scheduler: ObserverScheduler::new(config.pass_policy),
            registry,
            undo,
            config,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    pub fn undo_state(&self) -> &UndoStateComponent {
        &self.undo
    }

    /// # Errors
    ///
    /// See [`StateRegistry::register`].
    pub fn register_component<T: Payload>(
        &mut self,
        key: impl Into<ComponentKey>,
        initial: T,
    ) -> Result<Component<T>> {
        self.registry.register(key, initial)
    }

    /// # Errors
    ///
    /// See [`Dispatcher::register`].
    pub fn register_handler<F>(&mut self, kind: C::Kind, handler: F) -> Result<()>
    where
        F: Fn(&HandlerContext<'_>, &C) -> Result<()> + 'static,
    {
        self.dispatcher.register(kind, handler)
    }

    pub fn register_observer(&mut self, observer: impl StateObserver + 'static) -> ObserverId {
        self.scheduler.register(Box::new(observer))
    }

    pub fn unregister_observer(&mut self, id: ObserverId) -> bool {
        self.scheduler.unregister(id)
    }

    pub fn observer_count(&self) -> usize {
        self.scheduler.len()
    }

    /// Dispatch a domain command, then run an observer pass if configured.
    ///
    /// # Errors
    ///
    /// The dispatch error (no pass runs), or the error of the following pass.
    pub fn dispatch(&mut self, command: C) -> Result<()> {
        let ctx = HandlerContext::new(&self.registry, &self.undo);
        self.dispatcher.dispatch(&ctx, command)?;
        self.after_dispatch()
    }

    /// Revert the most recent undo step. No-op on an empty history.
    ///
    /// # Errors
    ///
    /// Restore failures, or the error of the following pass.
    pub fn undo(&mut self) -> Result<()> {
        self.replay(HistoryCommand::Undo)
    }

    /// Re-apply the most recently undone step. No-op on an empty redo stack.
    ///
    /// # Errors
    ///
    /// Restore failures, or the error of the following pass.
    pub fn redo(&mut self) -> Result<()> {
        self.replay(HistoryCommand::Redo)
    }

    /// # Errors
    ///
    /// See [`ObserverScheduler::run_pending`].
    pub fn run_pending_observers(&mut self) -> Result<PassReport> {
        self.scheduler.run_pending(&self.registry)
    }

    /// # Errors
    ///
    /// See [`ObserverScheduler::run_observer`].
    pub fn run_observer(&mut self, id: ObserverId) -> Result<()> {
        self.scheduler.run_observer(id, &self.registry)
    }

    fn replay(&mut self, direction: HistoryCommand) -> Result<()> {
        let ctx = HandlerContext::new(&self.registry, &self.undo);
        self.history.dispatch(&ctx, direction)?;
        self.after_dispatch()
    }

    fn after_dispatch(&mut self) -> Result<()> {
        if self.config.run_observers_after_dispatch {
            self.scheduler.run_pending(&self.registry)?;
        }
        Ok(())
    }
}
