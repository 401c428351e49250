// ─────────────────────────────────────────────────────────────────────
// External Equation Kernel — Control Vector View
// ─────────────────────────────────────────────────────────────────────
//! Typed access to the shared integer region.
//!
//! `ControlVector` borrows the host's words for the duration of one call.
//! The header is validated once in [`ControlVector::new`]; every accessor
//! afterwards indexes inside the declared length.
//!
//! `OwnedControlVector` is the host half: it allocates and sizes a vector,
//! fills in the request fields, and resets the buffer between calls.

use gext_types::layout::{
    words_for, Word, BUF_LEN, BUF_START, CONST_DERIV, DEBUG, DODRV, DOFUNC, EQNO, GETFIL,
    HEADER_WORDS, HV_PROD, LENGTH, MIN_BUF_START, MODE, NEQ, NEWPT, NVAR, NZ, SMODE, STR_LEN,
    STR_OFFSET, WORD_BYTES,
};
use gext_types::{GextError, GextResult, Mode, StringKind};

/// Borrowed, validated view over one control vector.
#[derive(Debug)]
pub struct ControlVector<'a> {
    words: &'a mut [Word],
}

impl<'a> ControlVector<'a> {
    /// Validate the header against `words` and wrap it.
    ///
    /// The view is restricted to the declared `LENGTH`, which must fit in
    /// the slice. `BUF_START` must point past the header and `BUF_LEN`
    /// must not be negative.
    pub fn new(words: &'a mut [Word]) -> GextResult<Self> {
        if words.len() < HEADER_WORDS {
            return Err(GextError::Layout(format!(
                "vector has {} words, header needs {HEADER_WORDS}",
                words.len()
            )));
        }
        let declared = usize::try_from(words[LENGTH]).map_err(|_| {
            GextError::Layout(format!("negative length {}", words[LENGTH]))
        })?;
        if declared < HEADER_WORDS || declared > words.len() {
            return Err(GextError::Layout(format!(
                "declared length {declared} outside [{HEADER_WORDS}, {}]",
                words.len()
            )));
        }
        let start = words[BUF_START];
        if start < MIN_BUF_START as Word || start as i64 > declared as i64 + 1 {
            return Err(GextError::Layout(format!(
                "buffer start {start} outside [{MIN_BUF_START}, {}]",
                declared + 1
            )));
        }
        if words[BUF_LEN] < 0 {
            return Err(GextError::Layout(format!(
                "negative buffer length {}",
                words[BUF_LEN]
            )));
        }
        Ok(Self {
            words: &mut words[..declared],
        })
    }

    /// Total words, as declared by the host.
    #[inline]
    pub fn total_len(&self) -> usize {
        self.words.len()
    }

    pub fn equations(&self) -> Word {
        self.words[NEQ]
    }

    pub fn variables(&self) -> Word {
        self.words[NVAR]
    }

    pub fn nonzeros(&self) -> Word {
        self.words[NZ]
    }

    pub fn mode_code(&self) -> Word {
        self.words[MODE]
    }

    pub fn mode(&self) -> GextResult<Mode> {
        Mode::from_code(self.mode_code())
    }

    /// 1-based equation index of the current request.
    pub fn equation_index(&self) -> Word {
        self.words[EQNO]
    }

    pub fn do_function(&self) -> bool {
        self.words[DOFUNC] != 0
    }

    pub fn do_derivatives(&self) -> bool {
        self.words[DODRV] != 0
    }

    pub fn new_point(&self) -> bool {
        self.words[NEWPT] != 0
    }

    pub fn debug_enabled(&self) -> bool {
        self.words[DEBUG] != 0
    }

    // ── Capability flags ────────────────────────────────────────────

    pub fn constant_derivatives(&self) -> bool {
        self.words[CONST_DERIV] != 0
    }

    pub fn set_constant_derivatives(&mut self, on: bool) {
        self.words[CONST_DERIV] = Word::from(on);
    }

    pub fn hessian_vector_products(&self) -> bool {
        self.words[HV_PROD] != 0
    }

    pub fn set_hessian_vector_products(&mut self, on: bool) {
        self.words[HV_PROD] = Word::from(on);
    }

    // ── String slot ─────────────────────────────────────────────────

    /// String kind the module asked for, if any.
    pub fn string_request(&self) -> Option<StringKind> {
        StringKind::from_id(self.words[GETFIL])
    }

    pub fn request_string(&mut self, kind: StringKind) {
        self.words[GETFIL] = kind.id();
    }

    pub fn clear_string_request(&mut self) {
        self.words[GETFIL] = 0;
    }

    /// Whether the host has deposited a string for this call.
    pub fn string_loaded(&self) -> bool {
        self.words[SMODE] != 0
    }

    /// `(offset, length)`: 1-based word offset and character count.
    pub fn string_slot(&self) -> (Word, Word) {
        (self.words[STR_OFFSET], self.words[STR_LEN])
    }

    // ── Buffer bookkeeping ──────────────────────────────────────────

    /// 1-based start of the buffer region.
    pub fn buffer_start(&self) -> usize {
        self.words[BUF_START] as usize
    }

    /// Words of the buffer already consumed by records.
    pub fn buffer_used(&self) -> usize {
        self.words[BUF_LEN] as usize
    }

    /// Words between the next record's payload and the end of the vector.
    /// Zero or negative means nothing more fits.
    pub fn remaining_payload_words(&self) -> i64 {
        self.total_len() as i64 - self.next_payload_index() as i64
    }

    /// 0-based index where the next record's payload would begin.
    pub(crate) fn next_payload_index(&self) -> usize {
        self.buffer_start() + self.buffer_used() + 1
    }

    pub(crate) fn consume_buffer(&mut self, words: usize) {
        self.words[BUF_LEN] += words as Word;
    }

    /// Read-only access to the raw words.
    pub fn words(&self) -> &[Word] {
        self.words
    }

    pub(crate) fn set_word(&mut self, index: usize, value: Word) {
        self.words[index] = value;
    }

    /// Copy `bytes` into consecutive words starting at `index`, packed
    /// in native byte order. Bytes of a final partial word beyond
    /// `bytes.len()` keep their previous contents.
    pub(crate) fn write_bytes(&mut self, index: usize, bytes: &[u8]) {
        for (slot, chunk) in self.words[index..].iter_mut().zip(bytes.chunks(WORD_BYTES)) {
            let mut packed = slot.to_ne_bytes();
            packed[..chunk.len()].copy_from_slice(chunk);
            *slot = Word::from_ne_bytes(packed);
        }
    }

    /// Bytes stored in the words starting at 0-based `index`, or `None`
    /// if the range leaves the vector.
    pub(crate) fn read_bytes(&self, index: usize, len: usize) -> Option<Vec<u8>> {
        let end = index.checked_add(words_for(len))?;
        let words = self.words.get(index..end)?;
        let mut bytes: Vec<u8> = words.iter().flat_map(|w| w.to_ne_bytes()).collect();
        bytes.truncate(len);
        Some(bytes)
    }
}

/// Host-side owner of a control vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedControlVector {
    words: Vec<Word>,
}

impl OwnedControlVector {
    /// Allocate `total_len` zeroed words with the buffer starting at the
    /// 1-based word `buffer_start`.
    pub fn new(total_len: usize, buffer_start: usize) -> GextResult<Self> {
        let len = Word::try_from(total_len)
            .map_err(|_| GextError::Layout(format!("length {total_len} too large")))?;
        let mut words = vec![0; total_len.max(HEADER_WORDS)];
        words[LENGTH] = len;
        words[BUF_START] = Word::try_from(buffer_start)
            .map_err(|_| GextError::Layout(format!("buffer start {buffer_start} too large")))?;
        let mut owned = Self { words };
        owned.view()?;
        Ok(owned)
    }

    /// Header followed directly by `buffer_words` words of buffer.
    pub fn with_buffer(buffer_words: usize) -> Self {
        let total = HEADER_WORDS + buffer_words;
        let mut words = vec![0; total];
        words[LENGTH] = total as Word;
        words[BUF_START] = MIN_BUF_START as Word;
        Self { words }
    }

    /// Validated view for one call.
    pub fn view(&mut self) -> GextResult<ControlVector<'_>> {
        ControlVector::new(&mut self.words)
    }

    pub fn set_problem(&mut self, equations: Word, variables: Word, nonzeros: Word) {
        self.words[NEQ] = equations;
        self.words[NVAR] = variables;
        self.words[NZ] = nonzeros;
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.words[MODE] = mode.code();
    }

    pub fn set_mode_code(&mut self, code: Word) {
        self.words[MODE] = code;
    }

    /// Fill the per-equation request fields.
    pub fn set_request(&mut self, equation: Word, do_function: bool, do_derivatives: bool) {
        self.words[EQNO] = equation;
        self.words[DOFUNC] = Word::from(do_function);
        self.words[DODRV] = Word::from(do_derivatives);
    }

    pub fn set_new_point(&mut self, changed: bool) {
        self.words[NEWPT] = Word::from(changed);
    }

    pub fn set_debug(&mut self, on: bool) {
        self.words[DEBUG] = Word::from(on);
    }

    /// Zero the consumption counter; done by the host before every call.
    pub fn begin_call(&mut self) {
        self.words[BUF_LEN] = 0;
    }

    /// Place `text` at the tail of the vector and flag it as loaded.
    pub fn deposit_string(&mut self, text: &str) -> GextResult<()> {
        let bytes = text.as_bytes();
        let need = words_for(bytes.len());
        let total = self.words.len();
        let first_free = self.words[BUF_START] as usize - 1;
        if total < first_free + need {
            return Err(GextError::Layout(format!(
                "string of {} bytes does not fit in the buffer",
                bytes.len()
            )));
        }
        let at = total - need;
        for (slot, chunk) in self.words[at..].iter_mut().zip(bytes.chunks(WORD_BYTES)) {
            let mut packed = [0u8; WORD_BYTES];
            packed[..chunk.len()].copy_from_slice(chunk);
            *slot = Word::from_ne_bytes(packed);
        }
        self.set_string_slot(at as Word + 1, bytes.len() as Word);
        self.words[SMODE] = 1;
        Ok(())
    }

    /// Raw string slot: 1-based word offset and character count.
    pub fn set_string_slot(&mut self, offset: Word, len: Word) {
        self.words[STR_OFFSET] = offset;
        self.words[STR_LEN] = len;
    }

    pub fn get(&self, index: usize) -> Word {
        self.words[index]
    }

    /// Raw header write. The next [`view`](Self::view) re-validates.
    pub fn set(&mut self, index: usize, value: Word) {
        self.words[index] = value;
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn as_mut_ptr(&mut self) -> *mut Word {
        self.words.as_mut_ptr()
    }
}
