use costate_core_types::RequestId;
use thiserror::Error;

/// Result type alias using CostateError
pub type Result<T> = std::result::Result<T, CostateError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code usable for programmatic handling,
/// log assertions, and host-facing error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsErrorKind {
    // Routing
    NoHandlerRegistered,
    DuplicateHandlerRegistered,

    // Write authority
    UnauthorizedMutation,
    ScopeConflict,

    // Caller-authored code
    HandlerFailure,
    ObserverFailure,

    // Registry
    AlreadyExists,
    NotFound,
    TypeMismatch,

    // Integration
    Serialization,
    Config,
}

impl CsErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            CsErrorKind::NoHandlerRegistered => "ERR_NO_HANDLER_REGISTERED",
            CsErrorKind::DuplicateHandlerRegistered => "ERR_DUPLICATE_HANDLER_REGISTERED",
            CsErrorKind::UnauthorizedMutation => "ERR_UNAUTHORIZED_MUTATION",
            CsErrorKind::ScopeConflict => "ERR_SCOPE_CONFLICT",
            CsErrorKind::HandlerFailure => "ERR_HANDLER_FAILURE",
            CsErrorKind::ObserverFailure => "ERR_OBSERVER_FAILURE",
            CsErrorKind::AlreadyExists => "ERR_ALREADY_EXISTS",
            CsErrorKind::NotFound => "ERR_NOT_FOUND",
            CsErrorKind::TypeMismatch => "ERR_TYPE_MISMATCH",
            CsErrorKind::Serialization => "ERR_SERIALIZATION",
            CsErrorKind::Config => "ERR_CONFIG",
        }
    }
}

/// Canonical structured error type
///
/// Carries the classification used by the logging facility plus whatever
/// kernel context (component key, command kind, observer) was available
/// where the error surfaced.
#[derive(Debug, Clone)]
pub struct CsError {
    kind: CsErrorKind,
    op: Option<String>,
    component: Option<String>,
    command_kind: Option<String>,
    observer: Option<String>,
    request_id: Option<RequestId>,
    message: String,
}

impl CsError {
    /// Create a new error with the specified kind
    pub fn new(kind: CsErrorKind) -> Self {
        Self {
            kind,
            op: None,
            component: None,
            command_kind: None,
            observer: None,
            request_id: None,
            message: String::new(),
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add state component context
    pub fn with_component(mut self, key: impl Into<String>) -> Self {
        self.component = Some(key.into());
        self
    }

    /// Add command kind context
    pub fn with_command_kind(mut self, kind: impl Into<String>) -> Self {
        self.command_kind = Some(kind.into());
        self
    }

    /// Add observer context
    pub fn with_observer(mut self, name: impl Into<String>) -> Self {
        self.observer = Some(name.into());
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> CsErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the state component context, if any
    pub fn component(&self) -> Option<&str> {
        self.component.as_deref()
    }

    /// Get the command kind context, if any
    pub fn command_kind(&self) -> Option<&str> {
        self.command_kind.as_deref()
    }

    /// Get the observer context, if any
    pub fn observer(&self) -> Option<&str> {
        self.observer.as_deref()
    }

    /// Get the request ID context, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for CsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(component) = &self.component {
            write!(f, " (component: {})", component)?;
        }
        if let Some(kind) = &self.command_kind {
            write!(f, " (command: {})", kind)?;
        }
        if let Some(observer) = &self.observer {
            write!(f, " (observer: {})", observer)?;
        }
        Ok(())
    }
}

impl std::error::Error for CsError {}

// ========== End Error Facility ==========

/// Error taxonomy for kernel operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CostateError {
    // ===== Routing =====
    /// Dispatch was called for a command kind nobody handles
    #[error("No handler registered for command kind {kind}")]
    NoHandlerRegistered { kind: String },

    /// A second handler was registered for the same command kind
    #[error("A handler is already registered for command kind {kind}")]
    DuplicateHandlerRegistered { kind: String },

    // ===== Write authority =====
    /// An observer wrote to a component outside its declared modified set
    #[error("Observer {observer} may not mutate state component {component}")]
    UnauthorizedMutation { observer: String, component: String },

    /// An update scope is already open on the component
    #[error("An update scope is already open on state component {component}")]
    ScopeAlreadyOpen { component: String },

    /// The component cannot be read while an update scope holds it
    #[error("State component {component} is being updated and cannot be read")]
    ComponentBusy { component: String },

    /// A dispatch transaction was opened while another one was active
    #[error("A dispatch transaction is already active")]
    TransactionAlreadyActive,

    // ===== Caller-authored code =====
    /// A command handler gave up part way through
    #[error("Handler for {kind} failed: {reason}")]
    HandlerFailure { kind: String, reason: String },

    /// An observer gave up while reacting to a change
    #[error("Observer {observer} failed: {reason}")]
    ObserverFailure { observer: String, reason: String },

    // ===== Registry =====
    /// A state component key was registered twice
    #[error("State component already registered: {component}")]
    DuplicateComponent { component: String },

    /// No state component is registered under the key
    #[error("Unknown state component: {component}")]
    UnknownComponent { component: String },

    /// The component exists but holds a different payload type
    #[error("State component {component} holds {actual}, not {expected}")]
    ComponentTypeMismatch {
        component: String,
        expected: String,
        actual: String,
    },

    /// No observer is registered under the id
    #[error("Unknown observer id: {id}")]
    UnknownObserver { id: u64 },

    // ===== Integration =====
    /// A payload could not be captured into or restored from a snapshot
    #[error("Snapshot of state component {component} failed: {reason}")]
    Snapshot { component: String, reason: String },

    /// Kernel configuration could not be loaded
    #[error("Invalid kernel configuration: {reason}")]
    Config { reason: String },
}

impl CostateError {
    /// Convenience constructor for handlers reporting their own failures
    pub fn handler_failure(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        CostateError::HandlerFailure {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for observers reporting their own failures
    pub fn observer_failure(observer: impl Into<String>, reason: impl Into<String>) -> Self {
        CostateError::ObserverFailure {
            observer: observer.into(),
            reason: reason.into(),
        }
    }
}

/// Conversion from CostateError to the canonical CsError
impl From<CostateError> for CsError {
    fn from(err: CostateError) -> Self {
        match err {
            CostateError::NoHandlerRegistered { kind } => {
                CsError::new(CsErrorKind::NoHandlerRegistered)
                    .with_op("dispatch")
                    .with_command_kind(kind)
                    .with_message("No handler registered")
            }

            CostateError::DuplicateHandlerRegistered { kind } => {
                CsError::new(CsErrorKind::DuplicateHandlerRegistered)
                    .with_op("register_handler")
                    .with_command_kind(kind)
                    .with_message("Handler already registered")
            }

            CostateError::UnauthorizedMutation {
                observer,
                component,
            } => CsError::new(CsErrorKind::UnauthorizedMutation)
                .with_op("begin_update")
                .with_observer(observer)
                .with_component(component)
                .with_message("Component is not in the observer's modified set"),

            CostateError::ScopeAlreadyOpen { component } => {
                CsError::new(CsErrorKind::ScopeConflict)
                    .with_op("begin_update")
                    .with_component(component)
                    .with_message("Update scope already open")
            }

            CostateError::ComponentBusy { component } => CsError::new(CsErrorKind::ScopeConflict)
                .with_op("read")
                .with_component(component)
                .with_message("Component is being updated"),

            CostateError::TransactionAlreadyActive => CsError::new(CsErrorKind::ScopeConflict)
                .with_op("begin_transaction")
                .with_message("Dispatch transaction already active"),

            CostateError::HandlerFailure { kind, reason } => {
                CsError::new(CsErrorKind::HandlerFailure)
                    .with_op("dispatch")
                    .with_command_kind(kind)
                    .with_message(reason)
            }

            CostateError::ObserverFailure { observer, reason } => {
                CsError::new(CsErrorKind::ObserverFailure)
                    .with_op("observe")
                    .with_observer(observer)
                    .with_message(reason)
            }

            CostateError::DuplicateComponent { component } => {
                CsError::new(CsErrorKind::AlreadyExists)
                    .with_op("register_component")
                    .with_component(component)
                    .with_message("State component already registered")
            }

            CostateError::UnknownComponent { component } => CsError::new(CsErrorKind::NotFound)
                .with_component(component)
                .with_message("State component not found"),

            CostateError::ComponentTypeMismatch {
                component,
                expected,
                actual,
            } => CsError::new(CsErrorKind::TypeMismatch)
                .with_component(component)
                .with_message(format!("Expected {}, found {}", expected, actual)),

            CostateError::UnknownObserver { id } => CsError::new(CsErrorKind::NotFound)
                .with_op("run_observer")
                .with_message(format!("Observer {} not found", id)),

            CostateError::Snapshot { component, reason } => {
                CsError::new(CsErrorKind::Serialization)
                    .with_op("snapshot")
                    .with_component(component)
                    .with_message(reason)
            }

            CostateError::Config { reason } => CsError::new(CsErrorKind::Config)
                .with_op("load_config")
                .with_message(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_error_codes() {
        let err: CsError = CostateError::NoHandlerRegistered {
            kind: "Rename".to_string(),
        }
        .into();
        assert_eq!(err.kind(), CsErrorKind::NoHandlerRegistered);
        assert_eq!(err.code(), "ERR_NO_HANDLER_REGISTERED");
        assert_eq!(err.command_kind(), Some("Rename"));

        let err: CsError = CostateError::DuplicateHandlerRegistered {
            kind: "Rename".to_string(),
        }
        .into();
        assert_eq!(err.code(), "ERR_DUPLICATE_HANDLER_REGISTERED");
    }

    #[test]
    fn test_scope_errors_share_conflict_kind() {
        let open: CsError = CostateError::ScopeAlreadyOpen {
            component: "graph".to_string(),
        }
        .into();
        let busy: CsError = CostateError::ComponentBusy {
            component: "graph".to_string(),
        }
        .into();
        assert_eq!(open.kind(), CsErrorKind::ScopeConflict);
        assert_eq!(busy.kind(), CsErrorKind::ScopeConflict);
        assert_eq!(open.component(), Some("graph"));
    }

    #[test]
    fn test_unauthorized_mutation_carries_observer_and_component() {
        let err: CsError = CostateError::UnauthorizedMutation {
            observer: "minimap".to_string(),
            component: "selection".to_string(),
        }
        .into();
        assert_eq!(err.code(), "ERR_UNAUTHORIZED_MUTATION");
        assert_eq!(err.observer(), Some("minimap"));
        assert_eq!(err.component(), Some("selection"));
    }

    #[test]
    fn test_display_includes_code_and_context() {
        let err = CsError::new(CsErrorKind::HandlerFailure)
            .with_op("dispatch")
            .with_command_kind("CreatePlacemat")
            .with_message("graph is read only");
        let rendered = err.to_string();
        assert!(rendered.starts_with("[ERR_HANDLER_FAILURE]"));
        assert!(rendered.contains("dispatch"));
        assert!(rendered.contains("CreatePlacemat"));
        assert!(rendered.contains("graph is read only"));
    }

    #[test]
    fn test_request_id_context() {
        let id = RequestId::from_string("req-7".to_string());
        let err = CsError::new(CsErrorKind::ObserverFailure).with_request_id(id.clone());
        assert_eq!(err.request_id(), Some(&id));
    }
}
