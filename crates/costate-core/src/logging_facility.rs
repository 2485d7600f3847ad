//! Structured logging facility for Costate
//!
//! - Single initialization point via `init(profile)`
//! - Boundary macros (`log_op_start!`, `log_op_end!`, `log_op_error!`)
//! - Test capture mode for deterministic assertions
//!
//! # Usage
//!
//! ```rust
//! use costate_core::logging_facility::{init, Profile};
//!
//! // Initialize once at application startup
//! init(Profile::Development);
//! ```
//!
//! # Boundary ownership
//!
//! The dispatcher owns the `dispatch` boundary and the scheduler owns the
//! `observer_pass` boundary. Scopes, transactions and the undo history only
//! emit `tracing::debug!`/`tracing::trace!` events.

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
