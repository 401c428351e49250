// ─────────────────────────────────────────────────────────────────────
// External Equation Kernel — Record Reader (host side)
// ─────────────────────────────────────────────────────────────────────
//! Walks the records a module left in the buffer and hands them to the
//! host's message callback.

use std::borrow::Cow;

use gext_types::layout::{words_for, Word, RECORD_HEADER_WORDS};
use gext_types::Destination;

use crate::vector::ControlVector;

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// `None` for tags outside the protocol.
    pub destination: Option<Destination>,
    pub tag: Word,
    pub bytes: Vec<u8>,
}

impl Record {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Iterator over the records in `BUF_LEN` words from `BUF_START`.
pub struct Records<'v> {
    vector: &'v ControlVector<'v>,
    cursor: usize,
    end: usize,
}

impl Iterator for Records<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.cursor + RECORD_HEADER_WORDS > self.end {
            return None;
        }
        let words = self.vector.words();
        let len = usize::try_from(words[self.cursor]).ok()?;
        let tag = words[self.cursor + 1];
        let payload = self.cursor + RECORD_HEADER_WORDS;
        if payload + words_for(len) > self.end {
            log::warn!("record at word {} overruns the buffer", self.cursor);
            self.cursor = self.end;
            return None;
        }
        let bytes = self.vector.read_bytes(payload, len)?;
        self.cursor = payload + words_for(len);
        Some(Record {
            destination: Destination::from_tag(tag),
            tag,
            bytes,
        })
    }
}

/// Records currently in the buffer, oldest first.
pub fn records<'v>(vector: &'v ControlVector<'v>) -> Records<'v> {
    let cursor = vector.buffer_start() - 1;
    let end = (cursor + vector.buffer_used()).min(vector.total_len());
    Records {
        vector,
        cursor,
        end,
    }
}

/// Hand every record to `callback(mode, bytes)`, where `mode` is the
/// callback flag for the record's destination. Records with an unknown
/// tag are skipped. Returns the number of records delivered.
pub fn drain<F>(vector: &ControlVector<'_>, mut callback: F) -> usize
where
    F: FnMut(i32, &[u8]),
{
    let mut delivered = 0;
    for record in records(vector) {
        match record.destination {
            Some(destination) => {
                callback(destination.callback_mode(), &record.bytes);
                delivered += 1;
            }
            None => log::warn!("skipping record with unknown destination {}", record.tag),
        }
    }
    delivered
}
