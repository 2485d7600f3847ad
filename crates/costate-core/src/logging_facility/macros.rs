//! Canonical logging macros
//!
//! These macros emit the boundary events every kernel entry point shares.

/// Log the start of an operation
///
/// # Example
///
/// ```
/// # use costate_core::log_op_start;
/// log_op_start!("dispatch");
/// log_op_start!("dispatch", command_kind = "Rename");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::costate_core_types::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::costate_core_types::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation
///
/// # Example
///
/// ```
/// # use costate_core::log_op_end;
/// log_op_end!("dispatch", duration_ms = 3);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::costate_core_types::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::costate_core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log an operation error
///
/// Accepts anything convertible into [`CsError`](crate::errors::CsError).
///
/// # Example
///
/// ```
/// # use costate_core::{log_op_error, errors::CostateError};
/// let err = CostateError::UnknownComponent { component: "graph".to_string() };
/// log_op_error!("dispatch", err, duration_ms = 10);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        use $crate::errors::CsError;
        let cs_err: CsError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::costate_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?cs_err.kind(),
            err.code = cs_err.code(),
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        use $crate::errors::CsError;
        let cs_err: CsError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::costate_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?cs_err.kind(),
            err.code = cs_err.code(),
            $($field)*
        );
    }};
}
