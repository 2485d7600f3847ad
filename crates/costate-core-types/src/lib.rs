//! Core types shared across the Costate crates
//!
//! - **Correlation types**: RequestId for tying log events of one dispatch together
//! - **Schema constants**: Canonical field keys and event names for structured logging

pub mod correlation;
pub mod schema;

pub use correlation::RequestId;
