// ─────────────────────────────────────────────────────────────────────
// External Equation Kernel — C Entry Points
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
// Note: #[deny(unsafe_code)] not applied: the entry points turn raw
// host pointers into slices. Everything past that conversion is safe.
//! Shared-library surface of the sine/cosine module.
//!
//! Exposes `gefunc` and `gefunc2` with the calling convention the host
//! solver expects (`stdcall` on 32-bit Windows, C elsewhere).
//!
//! # FFI Safety
//!
//! - The control vector's own length word sizes the slice built over
//!   `icntr`; vectors shorter than the header are rejected before any
//!   other word is read.
//! - `x` and `d` are viewed as `NVAR` doubles. Null pointers become
//!   empty slices; a mode that needs the array then reports a fatal
//!   status instead of dereferencing it.
//! - Panics are caught with `catch_unwind` and reported as status 2.
//! - The message callback is accepted for signature compatibility only.
//!   The host calls it when draining the buffer; the module never does.
//!
//! # Lifecycle
//!
//! The module instance is created on the first call and dropped after
//! Terminate. The debug trace file lives for the rest of the process.

use std::os::raw::{c_char, c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use parking_lot::Mutex;

use gext_core::{ControlVector, DebugSink, Dispatcher, ExternalModule, FileDebugSink};
use gext_sincos::SinCos;
use gext_types::layout::{HEADER_WORDS, LENGTH, NVAR};
use gext_types::{KernelConfig, Mode, Status};

/// `msgcb_t`: `(mode, nchars, buf, len)`.
pub type MessageCallback = Option<
    unsafe extern "system" fn(mode: *const c_int, nchars: *const c_int, buf: *const c_char, len: c_int),
>;

/// `msgcb2_t`: `(usrmem, mode, nchars, buf, len)`.
pub type MessageCallback2 = Option<
    unsafe extern "system" fn(
        usrmem: *mut c_void,
        mode: *const c_int,
        nchars: *const c_int,
        buf: *const c_char,
        len: c_int,
    ),
>;

/// Owns one module instance across calls and serves each call through a
/// [`Dispatcher`].
pub struct ModuleHost<M> {
    module: Option<M>,
    config: KernelConfig,
}

impl<M: ExternalModule + Default> ModuleHost<M> {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            module: None,
            config,
        }
    }

    /// Whether a module instance is alive (between first call and Terminate).
    pub fn is_active(&self) -> bool {
        self.module.is_some()
    }

    /// Serve one call over already-converted arguments.
    pub fn call(
        &mut self,
        sink: &dyn DebugSink,
        words: &mut [c_int],
        x: &[f64],
        f: &mut f64,
        d: &mut [f64],
    ) -> c_int {
        let mut vector = match ControlVector::new(words) {
            Ok(vector) => vector,
            Err(e) => {
                log::error!("rejected control vector: {e}");
                return Status::Fatal.code();
            }
        };
        let terminating = matches!(vector.mode(), Ok(Mode::Terminate));
        let dispatcher = Dispatcher::new(sink, &self.config);
        let module = self.module.get_or_insert_with(M::default);
        let outcome = dispatcher.dispatch(module, &mut vector, x, f, d);
        if terminating {
            self.module = None;
        }
        outcome.code()
    }
}

static HOST: Mutex<Option<ModuleHost<SinCos>>> = parking_lot::const_mutex(None);
static DEBUG_SINK: OnceLock<FileDebugSink> = OnceLock::new();

fn debug_sink() -> &'static FileDebugSink {
    DEBUG_SINK.get_or_init(|| FileDebugSink::new(KernelConfig::default().debug_file))
}

/// Convert the raw call arguments and serve the call.
///
/// # Safety
///
/// `icntr` must be null or point to at least `icntr[0]` writable ints.
/// `x`, `f`, `d` must each be null or valid for `icntr[NVAR]` doubles
/// (one double for `f`), and must not alias `icntr` or each other.
unsafe fn entry(icntr: *mut c_int, x: *const f64, f: *mut f64, d: *mut f64) -> c_int {
    if icntr.is_null() {
        log::error!("gefunc called without a control vector");
        return Status::Fatal.code();
    }
    let declared = *icntr.add(LENGTH);
    if declared < HEADER_WORDS as c_int {
        log::error!("control vector length {declared} shorter than header");
        return Status::Fatal.code();
    }
    let words = std::slice::from_raw_parts_mut(icntr, declared as usize);
    let nvar = usize::try_from(words[NVAR]).unwrap_or(0);

    let x: &[f64] = if x.is_null() {
        &[]
    } else {
        std::slice::from_raw_parts(x, nvar)
    };
    let d: &mut [f64] = if d.is_null() {
        &mut []
    } else {
        std::slice::from_raw_parts_mut(d, nvar)
    };
    let mut scratch = 0.0;
    let f: &mut f64 = if f.is_null() { &mut scratch } else { &mut *f };

    let served = catch_unwind(AssertUnwindSafe(|| {
        let mut host = HOST.lock();
        host.get_or_insert_with(|| ModuleHost::new(KernelConfig::default()))
            .call(debug_sink(), words, x, f, d)
    }));
    match served {
        Ok(code) => code,
        Err(_) => {
            log::error!("external module panicked, reporting fatal status");
            Status::Fatal.code()
        }
    }
}

/// Entry point called by the host solver.
///
/// # Safety
///
/// See [`entry`]; `msgcb` is not called.
#[no_mangle]
pub unsafe extern "system" fn gefunc(
    icntr: *mut c_int,
    x: *const f64,
    f: *mut f64,
    d: *mut f64,
    _msgcb: MessageCallback,
) -> c_int {
    entry(icntr, x, f, d)
}

/// Entry point variant carrying opaque user memory for the callback.
///
/// # Safety
///
/// See [`entry`]; neither `msgcb` nor `usrmem` is touched.
#[no_mangle]
pub unsafe extern "system" fn gefunc2(
    icntr: *mut c_int,
    x: *const f64,
    f: *mut f64,
    d: *mut f64,
    _msgcb: MessageCallback2,
    _usrmem: *mut c_void,
) -> c_int {
    entry(icntr, x, f, d)
}
