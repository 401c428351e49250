// ─────────────────────────────────────────────────────────────────────
// External Equation Kernel — Control Vector Layout
// ─────────────────────────────────────────────────────────────────────
//! Word offsets, mode codes, and tags of the control vector protocol.
//!
//! Offsets are 0-based word indices into the vector. Values *stored* in
//! `BUF_START` and `STR_OFFSET` are 1-based word positions, as the host
//! writes them.

use serde::{Deserialize, Serialize};

use crate::error::{GextError, GextResult};

/// One protocol word: the C `int`.
pub type Word = i32;

/// Bytes per word.
pub const WORD_BYTES: usize = std::mem::size_of::<Word>();

/// Longest line a single record may carry.
pub const MAX_LINE_BYTES: usize = 256;

/// Words preceding the payload of every record (length, destination).
pub const RECORD_HEADER_WORDS: usize = 2;

pub const LENGTH: usize = 0;
pub const NEQ: usize = 1;
pub const NVAR: usize = 2;
pub const NZ: usize = 3;
pub const MODE: usize = 4;
pub const EQNO: usize = 5;
pub const DOFUNC: usize = 6;
pub const DODRV: usize = 7;
pub const NEWPT: usize = 8;
/// Set non-zero by the module to request a string.
pub const GETFIL: usize = 9;
pub const STR_OFFSET: usize = 10;
pub const STR_LEN: usize = 11;
/// Set non-zero by the host once a string is loaded.
pub const SMODE: usize = 12;
pub const CONST_DERIV: usize = 13;
pub const HV_PROD: usize = 14;
/// 1-based.
pub const BUF_START: usize = 25;
pub const BUF_LEN: usize = 26;
pub const DEBUG: usize = 27;

/// Words occupied by the fixed header.
pub const HEADER_WORDS: usize = 28;

/// Smallest legal `BUF_START` value: first word after the header, 1-based.
pub const MIN_BUF_START: usize = HEADER_WORDS + 1;

/// Number of words needed to hold `bytes` bytes.
#[inline]
pub const fn words_for(bytes: usize) -> usize {
    bytes.div_ceil(WORD_BYTES)
}

/// Phase of the protocol requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Init,
    Terminate,
    Evaluate,
    ConstantDerivative,
    HessianVectorProduct,
}

impl Mode {
    pub const fn code(self) -> Word {
        match self {
            Mode::Init => 1,
            Mode::Terminate => 2,
            Mode::Evaluate => 3,
            Mode::ConstantDerivative => 4,
            Mode::HessianVectorProduct => 5,
        }
    }

    pub fn from_code(code: Word) -> GextResult<Self> {
        match code {
            1 => Ok(Mode::Init),
            2 => Ok(Mode::Terminate),
            3 => Ok(Mode::Evaluate),
            4 => Ok(Mode::ConstantDerivative),
            5 => Ok(Mode::HessianVectorProduct),
            other => Err(GextError::UnknownMode(other)),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Init => "Initialization",
            Mode::Terminate => "Terminating",
            Mode::Evaluate => "Evaluation mode",
            Mode::ConstantDerivative => "Constant derivative call",
            Mode::HessianVectorProduct => "Hessian-vector product call",
        }
    }
}

/// Where the host should route a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    Status,
    Log,
}

impl Destination {
    pub const fn tag(self) -> Word {
        match self {
            Destination::Status => 1,
            Destination::Log => 2,
        }
    }

    pub fn from_tag(tag: Word) -> Option<Self> {
        match tag {
            1 => Some(Destination::Status),
            2 => Some(Destination::Log),
            _ => None,
        }
    }

    /// Prefix used in the debug trace file.
    pub const fn trace_prefix(self) -> &'static str {
        match self {
            Destination::Status => "Stat: ",
            Destination::Log => " Log: ",
        }
    }

    /// `mode` argument the host passes to its message callback.
    /// Note the callback flags are numbered the other way round.
    pub const fn callback_mode(self) -> i32 {
        match self {
            Destination::Status => callback::STAFILE,
            Destination::Log => callback::LOGFILE,
        }
    }
}

/// Strings a module may request through `GETFIL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringKind {
    ScratchDir,
    WorkDir,
    SystemDir,
    ControlFile,
}

impl StringKind {
    pub const fn id(self) -> Word {
        match self {
            StringKind::ScratchDir => 11,
            StringKind::WorkDir => 12,
            StringKind::SystemDir => 13,
            StringKind::ControlFile => 14,
        }
    }

    pub fn from_id(id: Word) -> Option<Self> {
        match id {
            11 => Some(StringKind::ScratchDir),
            12 => Some(StringKind::WorkDir),
            13 => Some(StringKind::SystemDir),
            14 => Some(StringKind::ControlFile),
            _ => None,
        }
    }
}

/// Return code of one entry-point call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Ok,
    /// Function could not be evaluated at this point; the solver may recover.
    EvalError,
    /// Protocol violation; the host should abort the solve.
    Fatal,
}

impl Status {
    pub const fn code(self) -> Word {
        match self {
            Status::Ok => 0,
            Status::EvalError => 1,
            Status::Fatal => 2,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

/// Bit flags for the `mode` argument of the host's message callback.
pub mod callback {
    pub const LOGFILE: i32 = 1;
    pub const STAFILE: i32 = 2;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_for() {
        assert_eq!(words_for(0), 0);
        assert_eq!(words_for(1), 1);
        assert_eq!(words_for(4), 1);
        assert_eq!(words_for(10), 3);
        assert_eq!(words_for(256), 64);
    }

    #[test]
    fn test_mode_codes() {
        for mode in [
            Mode::Init,
            Mode::Terminate,
            Mode::Evaluate,
            Mode::ConstantDerivative,
            Mode::HessianVectorProduct,
        ] {
            assert_eq!(Mode::from_code(mode.code()), Ok(mode));
        }
        assert_eq!(Mode::from_code(0), Err(GextError::UnknownMode(0)));
        assert_eq!(Mode::from_code(6), Err(GextError::UnknownMode(6)));
    }

    #[test]
    fn test_destination_tags() {
        assert_eq!(Destination::Status.tag(), 1);
        assert_eq!(Destination::Log.tag(), 2);
        assert_eq!(Destination::from_tag(3), None);
    }

    #[test]
    fn test_header_fits_before_buffer() {
        assert!(DEBUG < HEADER_WORDS);
        assert_eq!(MIN_BUF_START, 29);
    }

    #[test]
    fn test_string_kind_ids() {
        assert_eq!(StringKind::from_id(12), Some(StringKind::WorkDir));
        assert_eq!(StringKind::from_id(0), None);
        assert_eq!(StringKind::ControlFile.id(), 14);
    }
}
