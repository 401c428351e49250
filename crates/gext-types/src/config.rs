// ─────────────────────────────────────────────────────────────────────
// External Equation Kernel — Configuration
// ─────────────────────────────────────────────────────────────────────

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{GextError, GextResult};

/// Runtime configuration for the dispatcher and its debug trace.
///
/// Everything that crosses the protocol boundary is fixed by the
/// layout; these knobs only affect what the module side emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Trace file opened on first use when debugging is on.
    /// Default: `debugext.txt` in the working directory.
    pub debug_file: PathBuf,

    /// Trace every record even if the control vector's debug word is zero.
    /// Default: false.
    pub force_debug: bool,

    /// Log one `--- <mode>` line into the buffer on every call.
    /// Default: true.
    pub announce_calls: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            debug_file: PathBuf::from("debugext.txt"),
            force_debug: false,
            announce_calls: true,
        }
    }
}

impl KernelConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> GextResult<()> {
        if self.debug_file.as_os_str().is_empty() {
            return Err(GextError::Config("debug_file must not be empty".to_string()));
        }
        Ok(())
    }

    /// Load from JSON string.
    pub fn from_json(json: &str) -> GextResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| GextError::Config(format!("JSON parse error: {e}")))
    }
}
