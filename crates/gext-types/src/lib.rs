// ─────────────────────────────────────────────────────────────────────
// External Equation Kernel — Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Protocol constants, configuration, and error hierarchy shared by the
//! external equation kernel, its modules, and the C entry points.

pub mod config;
pub mod error;
pub mod layout;

pub use config::KernelConfig;
pub use error::{GextError, GextResult};
pub use layout::{Destination, Mode, Status, StringKind};
