// ─────────────────────────────────────────────────────────────────────
// External Equation Kernel — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

use crate::layout::Status;

/// Root error type for all external equation kernel failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GextError {
    /// The control vector header is inconsistent with the slice it lives in.
    #[error("layout error: {0}")]
    Layout(String),

    /// The host sent a mode code outside the protocol.
    #[error("mode {0} is not defined")]
    UnknownMode(i32),

    /// Host-declared problem size differs from the module's.
    #[error("number of {what} do not match: host {host}, module {module}")]
    DimensionMismatch {
        what: &'static str,
        host: i32,
        module: i32,
    },

    /// Equation index outside `[1, neq]`.
    #[error("equation index {index} outside [1, {count}]")]
    EquationIndex { index: i32, count: i32 },

    /// No usable string in the control vector.
    #[error("string extraction failed: {0}")]
    StringSlot(String),

    /// The function could not be evaluated at the current point.
    /// Recoverable: the solver may back off and retry.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// The module does not implement the requested mode.
    #[error("unsupported request: {0}")]
    Unsupported(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

impl GextError {
    /// Protocol status reported to the host for this error.
    pub fn status(&self) -> Status {
        match self {
            GextError::Evaluation(_) => Status::EvalError,
            _ => Status::Fatal,
        }
    }
}

pub type GextResult<T> = Result<T, GextError>;
