//! Block/record container substrate for Ori module files.
//!
//! A module file is a stream of 32-bit little-endian words read bit by bit.
//! The stream is organized as nested **blocks**, each holding **records**
//! (a code plus a list of integer operands and an optional blob). The
//! framing follows the well-known LLVM bitstream layout:
//!
//! ```text
//! abbrev id  meaning
//! ---------  ---------------------------------------------------------
//! 0          END_BLOCK        align to 32 bits, pop the block scope
//! 1          ENTER_SUBBLOCK   vbr8 block id, vbr4 abbrev width, align,
//!                             32-bit block length in words
//! 2          DEFINE_ABBREV    register a compact encoding for a record kind
//! 3          UNABBREV_RECORD  vbr6 code, vbr6 count, vbr6 operands
//! 4+         abbreviated record using a registered abbreviation
//! ```
//!
//! Block 0 is the **block-info** block. It names blocks and records for
//! self-description and registers abbreviations on behalf of other blocks.
//! Those abbreviations are installed every time the target block is entered,
//! which is what lets a reader jump straight into the middle of a block
//! (lazy loading) and still decode abbreviated records.
//!
//! # Crate Dependencies
//!
//! Standalone: no `ori_*` dependencies. [`BitstreamWriter`] produces bytes,
//! [`BitstreamCursor`] reads them back.

mod abbrev;
mod block_info;
mod cursor;
mod error;
mod writer;

pub use abbrev::{Abbrev, AbbrevOp, ScalarOp};
pub use block_info::{BlockInfo, BlockInfoEntry};
pub use cursor::{AdvanceFlags, BitstreamCursor, Bookmark, Entry, Record};
pub use error::BitstreamError;
pub use writer::BitstreamWriter;

/// Abbreviation id closing the current block.
pub const END_BLOCK: u32 = 0;
/// Abbreviation id opening a nested block.
pub const ENTER_SUBBLOCK: u32 = 1;
/// Abbreviation id defining a new abbreviation in the current block.
pub const DEFINE_ABBREV: u32 = 2;
/// Abbreviation id for a record written without an abbreviation.
pub const UNABBREV_RECORD: u32 = 3;
/// First abbreviation id available to registered abbreviations.
pub const FIRST_APPLICATION_ABBREV: u32 = 4;

/// Block id reserved for the block-info block.
pub const BLOCKINFO_BLOCK_ID: u32 = 0;

/// Abbreviation width used at the top level of a stream.
pub const TOP_LEVEL_ABBREV_WIDTH: u32 = 2;

/// Record codes inside the block-info block.
pub mod blockinfo_code {
    /// Select the block that following records and abbreviations describe.
    pub const SETBID: u32 = 1;
    /// Human-readable block name (one character per operand).
    pub const BLOCKNAME: u32 = 2;
    /// Human-readable record name: record code, then characters.
    pub const SETRECORDNAME: u32 = 3;
}
