//! Kernel configuration
//!
//! Loaded from TOML by the host, or built in code from `KernelConfig::default()`.
//!
//! ```
//! use costate_core::config::{FailurePolicy, KernelConfig, PassPolicy};
//!
//! let config = KernelConfig::from_toml_str(
//!     r#"
//!     failure_policy = "keep_partial"
//!     pass_policy = "rescan"
//!     undo_depth = 50
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.failure_policy, FailurePolicy::KeepPartial);
//! assert_eq!(config.pass_policy, PassPolicy::Rescan);
//! assert!(!config.run_observers_after_dispatch);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{CostateError, Result};

/// What happens to released update scopes when a handler fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Version bumps are staged and only published when the handler returns
    /// `Ok`; on failure every touched payload is restored.
    #[default]
    Rollback,
    /// Scopes publish their bump on release. A failing handler leaves the
    /// scopes it already released in place.
    KeepPartial,
}

/// When a write made by one observer becomes visible to later observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassPolicy {
    /// Staleness is computed once from the versions visible at pass start;
    /// staleness caused during the pass is picked up by the next pass.
    #[default]
    Snapshot,
    /// Each observer's staleness is re-checked right before its turn.
    Rescan,
}

/// Kernel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    pub failure_policy: FailurePolicy,
    pub pass_policy: PassPolicy,
    /// Run a scheduler pass after every successful dispatch instead of
    /// waiting for the host's tick.
    pub run_observers_after_dispatch: bool,
    /// Maximum number of undo entries kept; 0 keeps everything.
    pub undo_depth: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            pass_policy: PassPolicy::default(),
            run_observers_after_dispatch: false,
            undo_depth: 100,
        }
    }
}

impl KernelConfig {
    /// Parse a configuration from TOML text. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `CostateError::Config` for malformed TOML, unknown keys, or
    /// unknown policy names.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|e| CostateError::Config {
            reason: e.to_string(),
        })
    }

    /// Read and parse a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns `CostateError::Config` if the file cannot be read or parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CostateError::Config {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&text)
    }

    /// Builder-style override of the failure policy
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Builder-style override of the pass policy
    pub fn with_pass_policy(mut self, policy: PassPolicy) -> Self {
        self.pass_policy = policy;
        self
    }

    /// Builder-style override of the auto-run flag
    pub fn with_run_observers_after_dispatch(mut self, enabled: bool) -> Self {
        self.run_observers_after_dispatch = enabled;
        self
    }

    /// Builder-style override of the undo depth
    pub fn with_undo_depth(mut self, depth: usize) -> Self {
        self.undo_depth = depth;
        self
    }
}
