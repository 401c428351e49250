// ─────────────────────────────────────────────────────────────────────
// External Equation Kernel — Message Packer
// ─────────────────────────────────────────────────────────────────────
//! Appends diagnostic lines to the control vector's buffer.
//!
//! Record layout, starting at the first free buffer word:
//!
//! ```text
//! [byte length][destination tag][payload: ceil(len / 4) words]
//! ```
//!
//! # Best-effort policy
//!
//! Packing never fails. A line longer than [`MAX_LINE_BYTES`] is cut to
//! that length; a line that does not fit is cut to the words that remain;
//! with no words left the call does nothing. The header always records
//! what was stored, and `BUF_LEN` advances by exactly the words written.

use gext_types::layout::{words_for, Word, MAX_LINE_BYTES, RECORD_HEADER_WORDS, WORD_BYTES};
use gext_types::Destination;

use crate::sink::DebugSink;
use crate::vector::ControlVector;

/// Writes records into a control vector, mirroring them to a debug sink
/// when the vector's debug word is set.
pub struct MessagePacker<'s> {
    sink: &'s dyn DebugSink,
    force_debug: bool,
}

impl<'s> MessagePacker<'s> {
    pub fn new(sink: &'s dyn DebugSink) -> Self {
        Self {
            sink,
            force_debug: false,
        }
    }

    /// Mirror to the sink regardless of the debug word.
    pub fn with_force_debug(mut self, force: bool) -> Self {
        self.force_debug = force;
        self
    }

    /// Append `text` as one record. Returns the payload bytes stored.
    ///
    /// `text` must not contain NUL, newline, or tab characters; this is
    /// not checked.
    pub fn append(&self, vector: &mut ControlVector<'_>, text: &str, destination: Destination) -> usize {
        if self.force_debug || vector.debug_enabled() {
            self.sink.write_line(destination, text);
        }

        let start = vector.next_payload_index();
        let remaining = vector.remaining_payload_words();
        if remaining <= 0 {
            log::warn!("message buffer full, dropped {destination:?} line");
            return 0;
        }

        let mut n_bytes = text.len().min(MAX_LINE_BYTES);
        if words_for(n_bytes) as i64 > remaining {
            n_bytes = remaining as usize * WORD_BYTES;
        }

        vector.write_bytes(start, &text.as_bytes()[..n_bytes]);
        vector.set_word(start - 2, n_bytes as Word);
        vector.set_word(start - 1, destination.tag());
        vector.consume_buffer(RECORD_HEADER_WORDS + words_for(n_bytes));
        n_bytes
    }

    /// Append to the status file.
    pub fn status(&self, vector: &mut ControlVector<'_>, text: &str) -> usize {
        self.append(vector, text, Destination::Status)
    }

    /// Append to the log file.
    pub fn log(&self, vector: &mut ControlVector<'_>, text: &str) -> usize {
        self.append(vector, text, Destination::Log)
    }
}
