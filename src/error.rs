use std::io;

/// The error type for unrecoverable problems.
///
/// These are only ever raised before any model exists: either the stream
/// could not be read at all, or its header is not one we understand.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("The stream does not contain enough bytes to parse the header")]
    NotEnoughBytesForHeader,

    #[error("Unexpected format flag {found:#04x}, expected {expected:#04x}")]
    UnexpectedFormatFlag { expected: u8, found: u8 },

    #[error("Unsupported format version {0}")]
    UnsupportedVersion(u16),

    #[error("Invalid word size flag {0}")]
    InvalidWordSize(u8),

    #[error("The machine name in the header was not valid utf-8")]
    MachineNameUtf8,

    #[error("The stream is zstd-compressed, but the zstd feature is disabled")]
    CompressedInputUnsupported,
}

/// This error indicates that a primitive read did not succeed.
///
/// `NeedMoreData` is not a problem with the data itself: the caller can supply
/// more bytes and retry the read from the same position.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    #[error("Not enough data")]
    NeedMoreData,

    #[error("The string at offset {offset} was not valid utf-8")]
    StringUtf8 { offset: u64 },
}

/// A structural problem found while decoding a record.
///
/// The decoder stops at the first one of these, but everything decoded up to
/// that point stays valid.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    #[error("The stream ended in the middle of a record")]
    Truncated,

    #[error("Unknown marker {marker:#04x} for format version {version}")]
    UnknownMarker { marker: u8, version: u16 },

    #[error("Opcode {opnum} at offset {offset} was never declared")]
    UnknownOpcode { opnum: u16, offset: u64 },

    #[error("The opcode table was declared twice")]
    OpcodeTableRedeclared,

    #[error("Unknown trace kind {0:?}")]
    UnknownTraceKind(String),

    #[error("Trace {0:#x} was already started")]
    DuplicateTrace(u64),

    #[error("Record for trace {found:#x} does not match the current trace {expected:?}")]
    TraceIdMismatch { expected: Option<u64>, found: u64 },

    #[error("The record requires a current trace, but no trace was started")]
    NoCurrentTrace,

    #[error("Trace {0:#x} has no active stage")]
    NoActiveStage(u64),

    #[error("Trace {0:#x} was never declared")]
    UnknownTrace(u64),

    #[error("No trace was assembled at address {0:#x}")]
    NoTraceAtAddress(u64),

    #[error("A merge point was recorded before its field layout was declared")]
    MergePointLayoutMissing,

    #[error("Unknown merge point field kind {0:#04x}")]
    UnknownFieldKind(u8),

    #[error("Invalid merge point value tag {0:#04x}")]
    InvalidValueTag(u8),

    #[error("Merge point field {0} does not exist or is not a string field")]
    InvalidPrefixField(u8),

    #[error("Merge point field {0} reuses a prefix that was never declared")]
    MissingCommonPrefix(u8),

    #[error("Unknown stack frame kind {0}")]
    UnknownFrameKind(u64),

    #[error("Stack trace depth {0} is too large")]
    StackTooDeep(u64),
}

impl DecodeError {
    /// Whether this error only means that the record is not complete yet.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, DecodeError::Read(ReadError::NeedMoreData))
    }
}

/// A [`DecodeError`] together with the place in the stream where it happened.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{error} (record at offset {offset})")]
pub struct DecodeFault {
    /// The offset of the marker byte of the failing record.
    pub offset: u64,
    /// The marker byte, if one could be read.
    pub marker: Option<u8>,
    pub error: DecodeError,
}
