//! Errors raised while writing or reading a bitstream.

/// A structural problem with a bitstream.
///
/// Every variant describes malformed or truncated input (when reading) or
/// a record that does not fit the abbreviation it was emitted with (when
/// writing). Callers above this crate fold all of them into their own
/// "malformed container" error.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BitstreamError {
    /// A read ran past the end of the buffer.
    #[error("unexpected end of stream at bit {bit}")]
    Truncated { bit: u64 },

    /// A record used an abbreviation id that was never defined.
    #[error("unknown abbreviation id {id}")]
    UnknownAbbrev { id: u32 },

    /// An abbreviation definition is not well formed.
    #[error("invalid abbreviation: {reason}")]
    InvalidAbbrev { reason: &'static str },

    /// A record does not fit the abbreviation it was emitted with.
    #[error("record does not match its abbreviation: {reason}")]
    AbbrevMismatch { reason: &'static str },

    /// An `END_BLOCK` was seen (or requested) with no block open.
    #[error("block end without a matching block start")]
    UnbalancedBlockEnd,

    /// The block-info block contains something it must not.
    #[error("invalid block-info block: {reason}")]
    InvalidBlockInfo { reason: &'static str },

    /// A variable-width integer does not fit in 64 bits.
    #[error("variable-width integer overflows 64 bits")]
    VbrOverflow,

    /// A decoded value does not fit the field it is destined for.
    #[error("value {value} out of range for {what}")]
    OutOfRange { what: &'static str, value: u64 },

    /// A bookmark was reset from a different block nesting depth.
    #[error("bookmark taken at block depth {expected}, reset at depth {actual}")]
    BookmarkScope { expected: usize, actual: usize },
}
