// ─────────────────────────────────────────────────────────────────────
// External Equation Kernel — Debug Sink
// ─────────────────────────────────────────────────────────────────────
//! Append-only trace of every record the packer handles.
//!
//! The packer receives a sink by reference. `FileDebugSink` opens its file
//! on first use and flushes after every line so nothing is lost if the
//! host process dies; it is never closed explicitly.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use parking_lot::Mutex;

use gext_types::Destination;

/// Receiver for mirrored records.
pub trait DebugSink: Send + Sync {
    fn write_line(&self, destination: Destination, line: &str);
}

/// Sink that discards everything.
pub struct NullSink;

impl DebugSink for NullSink {
    fn write_line(&self, _destination: Destination, _line: &str) {}
}

/// Format one trace line: `Stat: <line>` or ` Log: <line>`.
pub fn trace_line(destination: Destination, line: &str) -> String {
    format!("{}{line}", destination.trace_prefix())
}

enum FileState {
    Unopened,
    Open(File),
    Failed,
}

/// Lazily created trace file.
pub struct FileDebugSink {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileDebugSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(FileState::Unopened),
        }
    }

    /// Whether the file has been created yet.
    pub fn is_open(&self) -> bool {
        matches!(*self.state.lock(), FileState::Open(_))
    }
}

impl DebugSink for FileDebugSink {
    fn write_line(&self, destination: Destination, line: &str) {
        let mut state = self.state.lock();
        if let FileState::Unopened = *state {
            *state = match File::create(&self.path) {
                Ok(file) => FileState::Open(file),
                Err(e) => {
                    log::error!("Can't create {}: {e}", self.path.display());
                    FileState::Failed
                }
            };
        }
        if let FileState::Open(file) = &mut *state {
            let written = writeln!(file, "{}", trace_line(destination, line))
                .and_then(|()| file.flush());
            if let Err(e) = written {
                log::warn!("debug trace write to {} failed: {e}", self.path.display());
            }
        }
    }
}

/// In-memory sink, for hosts that collect the trace themselves.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trace lines written so far, already prefixed.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl DebugSink for MemorySink {
    fn write_line(&self, destination: Destination, line: &str) {
        self.lines.lock().push(trace_line(destination, line));
    }
}
