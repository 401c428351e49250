// ─────────────────────────────────────────────────────────────────────
// External Equation Kernel — String Extractor
// ─────────────────────────────────────────────────────────────────────
//! Reads the single host-deposited string (typically a directory or file
//! path) out of the control vector.
//!
//! Semantics follow a fixed-size C buffer: if the string fills `out`
//! exactly, no terminator is written and the caller must rely on the
//! returned count.

use gext_types::layout::WORD_BYTES;
use gext_types::{GextError, GextResult};

use crate::vector::ControlVector;

/// Returned across the C boundary when extraction fails.
pub const EXTRACT_FAILED: i32 = -1;

/// Copy the deposited string into `out`, returning the characters copied.
///
/// The count is clamped to `out.len()`. Copying stops at an embedded NUL
/// and the rest of the count is zero-filled. A NUL terminator follows the
/// copied characters only when there is room for it.
pub fn extract_string(vector: &ControlVector<'_>, out: &mut [u8]) -> GextResult<usize> {
    let (offset, declared) = vector.string_slot();
    let declared = usize::try_from(declared)
        .map_err(|_| GextError::StringSlot(format!("negative length {declared}")))?;
    let n_chars = declared.min(out.len());
    if n_chars == 0 {
        // Nothing to copy: the slot is not consulted.
        if let Some(first) = out.first_mut() {
            *first = 0;
        }
        return Ok(0);
    }

    let first_word = usize::try_from(offset)
        .ok()
        .and_then(|o| o.checked_sub(1))
        .ok_or_else(|| GextError::StringSlot(format!("offset {offset} is not 1-based")))?;
    let source = vector.read_bytes(first_word, n_chars).ok_or_else(|| {
        GextError::StringSlot(format!(
            "{n_chars} chars at word {offset} leave the vector of {} words ({} bytes)",
            vector.total_len(),
            vector.total_len() * WORD_BYTES
        ))
    })?;

    let copied = source.iter().position(|&b| b == 0).unwrap_or(n_chars);
    out[..copied].copy_from_slice(&source[..copied]);
    out[copied..n_chars].fill(0);
    if n_chars < out.len() {
        out[n_chars] = 0;
    }
    Ok(n_chars)
}

/// Extract the whole deposited string as UTF-8 (lossy), cut at the
/// first NUL.
///
/// The buffer never exceeds the vector's own size; a longer declared
/// length fails in [`extract_string`] on the range check.
pub fn read_string(vector: &ControlVector<'_>) -> GextResult<String> {
    let (_, declared) = vector.string_slot();
    let capacity = usize::try_from(declared)
        .map_err(|_| GextError::StringSlot(format!("negative length {declared}")))?
        .min(vector.total_len() * WORD_BYTES + 1);
    let mut out = vec![0u8; capacity];
    let n = extract_string(vector, &mut out)?;
    let end = out[..n].iter().position(|&b| b == 0).unwrap_or(n);
    Ok(String::from_utf8_lossy(&out[..end]).into_owned())
}
