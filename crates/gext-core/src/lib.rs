// ─────────────────────────────────────────────────────────────────────
// External Equation Kernel — Core Protocol
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Control-vector protocol between a host solver and an external
//! equation module: typed vector view, message packer, string
//! extractor, debug sink, and the mode dispatcher.
//!
//! # Protocol Invariants
//!
//! 1. **Header validated once**: a [`ControlVector`] only exists for a
//!    vector whose declared length fits the memory it lives in and whose
//!    buffer starts past the header. Accessors never index outside it.
//!
//! 2. **Packing is best effort**: the packer truncates or drops lines
//!    that do not fit and never reports an error. `BUF_LEN` always
//!    equals the words actually written.
//!
//! 3. **Calls are stateless**: everything the dispatcher needs comes
//!    from the vector and the argument arrays of the current call.
//!
//! 4. **Failures are status codes**: module errors become a diagnostic
//!    record plus a nonzero status; nothing else crosses the boundary.

pub mod dispatch;
pub mod extract;
pub mod packer;
pub mod records;
pub mod sink;
pub mod vector;

pub use dispatch::{
    Capabilities, Diagnostic, Dimensions, Dispatcher, EvalRequest, ExternalModule, Messages,
    Outcome,
};
pub use extract::{extract_string, read_string, EXTRACT_FAILED};
pub use packer::MessagePacker;
pub use records::{drain, records, Record};
pub use sink::{DebugSink, FileDebugSink, MemorySink, NullSink};
pub use vector::{ControlVector, OwnedControlVector};
