//! Random-access reader over a bitstream.
//!
//! A cursor walks blocks and records, tracks the abbreviations in scope,
//! and remembers everything the block-info block said. Cursors are cheap to
//! clone: the buffer is shared through an `Arc`, so a module file can keep
//! one cursor per section and jump around in each independently.
//!
//! # Entries
//!
//! [`BitstreamCursor::advance`] returns the next structural entry. Abbrev
//! definitions and block-info blocks are consumed transparently. Callers
//! decide what to do with a sub-block: [`enter_sub_block`] or
//! [`skip_block`]. Records are read with [`read_record`].
//!
//! [`enter_sub_block`]: BitstreamCursor::enter_sub_block
//! [`skip_block`]: BitstreamCursor::skip_block
//! [`read_record`]: BitstreamCursor::read_record

use std::sync::Arc;

use bitflags::bitflags;

use crate::abbrev::{decode_char6, encoding};
use crate::block_info::name_from_fields;
use crate::{
    blockinfo_code, Abbrev, AbbrevOp, BitstreamError, BlockInfo, ScalarOp, BLOCKINFO_BLOCK_ID,
    DEFINE_ABBREV, END_BLOCK, ENTER_SUBBLOCK, FIRST_APPLICATION_ABBREV, TOP_LEVEL_ABBREV_WIDTH,
    UNABBREV_RECORD,
};

bitflags! {
    /// Options for [`BitstreamCursor::advance`].
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct AdvanceFlags: u8 {
        /// On reaching the end of the current block, report it but leave
        /// the cursor in front of the `END_BLOCK` marker.
        const DONT_POP_BLOCK_AT_END = 1 << 0;
        /// Skip nested blocks instead of reporting them.
        const SKIP_SUBBLOCKS = 1 << 1;
    }
}

/// One structural step through the stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Entry {
    /// The current block ended (or the stream ended, at top level).
    EndBlock,
    /// A nested block with this id starts here.
    SubBlock(u32),
    /// A record encoded with this abbreviation id follows.
    Record(u32),
}

/// A decoded record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub code: u32,
    pub fields: Vec<u64>,
    pub blob: Option<Vec<u8>>,
}

impl Record {
    /// Field `index`, or a malformed-record error if the record is too short.
    pub fn field(&self, index: usize) -> Result<u64, BitstreamError> {
        self.fields
            .get(index)
            .copied()
            .ok_or(BitstreamError::AbbrevMismatch {
                reason: "record has too few fields",
            })
    }
}

/// A saved cursor position.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Bookmark {
    bit: u64,
    depth: usize,
    abbrev_count: usize,
}

impl Bookmark {
    /// Bit offset of the bookmark.
    pub fn bit(self) -> u64 {
        self.bit
    }
}

#[derive(Clone, Debug)]
struct Scope {
    block_id: u32,
    prev_abbrev_width: u32,
    prev_abbrevs: Vec<Arc<Abbrev>>,
}

/// Reader over a shared, immutable bitstream buffer.
#[derive(Clone, Debug)]
pub struct BitstreamCursor {
    data: Arc<[u8]>,
    bit: u64,
    abbrev_width: u32,
    abbrevs: Vec<Arc<Abbrev>>,
    scopes: Vec<Scope>,
    block_info: BlockInfo,
}

impl BitstreamCursor {
    /// Cursor at the start of `data`.
    pub fn new(data: Arc<[u8]>) -> Self {
        BitstreamCursor {
            data,
            bit: 0,
            abbrev_width: TOP_LEVEL_ABBREV_WIDTH,
            abbrevs: Vec::new(),
            scopes: Vec::new(),
            block_info: BlockInfo::default(),
        }
    }

    /// The underlying buffer.
    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }

    /// Everything learned from block-info blocks so far.
    pub fn block_info(&self) -> &BlockInfo {
        &self.block_info
    }

    /// Current bit offset from the start of the buffer.
    pub fn current_bit(&self) -> u64 {
        self.bit
    }

    /// Number of open blocks.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Id of the innermost open block.
    pub fn current_block_id(&self) -> Option<u32> {
        self.scopes.last().map(|s| s.block_id)
    }

    fn size_in_bits(&self) -> u64 {
        self.data.len() as u64 * 8
    }

    /// Returns `true` if no more bits can be read.
    pub fn at_end(&self) -> bool {
        self.bit >= self.size_in_bits()
    }

    // ── Positioning ─────────────────────────────────────────────────

    /// Move to an absolute bit offset without changing the block scope.
    pub fn jump_to_bit(&mut self, bit: u64) -> Result<(), BitstreamError> {
        if bit > self.size_in_bits() {
            return Err(BitstreamError::OutOfRange {
                what: "bit offset",
                value: bit,
            });
        }
        self.bit = bit;
        Ok(())
    }

    /// Remember the current position.
    pub fn bookmark(&self) -> Bookmark {
        Bookmark {
            bit: self.bit,
            depth: self.scopes.len(),
            abbrev_count: self.abbrevs.len(),
        }
    }

    /// Return to a bookmark taken at the same block depth.
    pub fn reset(&mut self, bookmark: Bookmark) -> Result<(), BitstreamError> {
        if bookmark.depth != self.scopes.len() {
            return Err(BitstreamError::BookmarkScope {
                expected: bookmark.depth,
                actual: self.scopes.len(),
            });
        }
        self.abbrevs.truncate(bookmark.abbrev_count);
        self.bit = bookmark.bit;
        Ok(())
    }

    // ── Raw bits ────────────────────────────────────────────────────

    /// Read `nbits` (0..=64) bits, least significant first.
    pub fn read(&mut self, nbits: u32) -> Result<u64, BitstreamError> {
        debug_assert!(nbits <= 64, "invalid bit width {nbits}");
        if self.bit + u64::from(nbits) > self.size_in_bits() {
            return Err(BitstreamError::Truncated { bit: self.bit });
        }
        let mut value = 0u64;
        let mut got = 0u32;
        while got < nbits {
            let byte = u64::from(self.data[(self.bit / 8) as usize]);
            let offset = (self.bit % 8) as u32;
            let take = (8 - offset).min(nbits - got);
            let chunk = (byte >> offset) & ((1u64 << take) - 1);
            value |= chunk << got;
            got += take;
            self.bit += u64::from(take);
        }
        Ok(value)
    }

    /// Read a variable-width integer with `nbits`-bit chunks.
    pub fn read_vbr(&mut self, nbits: u32) -> Result<u64, BitstreamError> {
        let hi = 1u64 << (nbits - 1);
        let mut piece = self.read(nbits)?;
        if piece & hi == 0 {
            return Ok(piece);
        }
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let payload = piece & (hi - 1);
            if shift >= 64 {
                if payload != 0 {
                    return Err(BitstreamError::VbrOverflow);
                }
            } else {
                if (payload << shift) >> shift != payload {
                    return Err(BitstreamError::VbrOverflow);
                }
                result |= payload << shift;
            }
            if piece & hi == 0 {
                return Ok(result);
            }
            shift = shift.saturating_add(nbits - 1);
            piece = self.read(nbits)?;
        }
    }

    fn read_vbr_u32(&mut self, nbits: u32, what: &'static str) -> Result<u32, BitstreamError> {
        let value = self.read_vbr(nbits)?;
        u32::try_from(value).map_err(|_| BitstreamError::OutOfRange { what, value })
    }

    fn align32(&mut self) {
        self.bit = (self.bit + 31) & !31;
    }

    // ── Blocks ──────────────────────────────────────────────────────

    /// Step to the next entry in the current block.
    ///
    /// At top level the end of the buffer is reported as
    /// [`Entry::EndBlock`].
    pub fn advance(&mut self, flags: AdvanceFlags) -> Result<Entry, BitstreamError> {
        loop {
            if self.scopes.is_empty() && self.at_end() {
                return Ok(Entry::EndBlock);
            }
            let start = self.bit;
            let code = self.read(self.abbrev_width)? as u32;
            match code {
                END_BLOCK => {
                    if flags.contains(AdvanceFlags::DONT_POP_BLOCK_AT_END) {
                        self.bit = start;
                    } else {
                        self.pop_scope()?;
                    }
                    return Ok(Entry::EndBlock);
                }
                ENTER_SUBBLOCK => {
                    let block_id = self.read_vbr_u32(8, "block id")?;
                    if block_id == BLOCKINFO_BLOCK_ID {
                        self.read_block_info_block()?;
                        continue;
                    }
                    if flags.contains(AdvanceFlags::SKIP_SUBBLOCKS) {
                        self.skip_block()?;
                        continue;
                    }
                    return Ok(Entry::SubBlock(block_id));
                }
                DEFINE_ABBREV => {
                    let abbrev = self.read_abbrev_definition()?;
                    self.abbrevs.push(Arc::new(abbrev));
                }
                abbrev_id => return Ok(Entry::Record(abbrev_id)),
            }
        }
    }

    /// Enter the block announced by [`Entry::SubBlock`].
    pub fn enter_sub_block(&mut self, block_id: u32) -> Result<(), BitstreamError> {
        let width = self.read_vbr_u32(4, "abbreviation width")?;
        if width == 0 || width > 32 {
            return Err(BitstreamError::OutOfRange {
                what: "abbreviation width",
                value: u64::from(width),
            });
        }
        self.align32();
        let words = self.read(32)?;
        if self.bit + words * 32 > self.size_in_bits() {
            return Err(BitstreamError::Truncated { bit: self.bit });
        }

        let prev_abbrevs = std::mem::take(&mut self.abbrevs);
        self.scopes.push(Scope {
            block_id,
            prev_abbrev_width: self.abbrev_width,
            prev_abbrevs,
        });
        self.abbrev_width = width;
        self.abbrevs
            .extend(self.block_info.abbrevs(block_id).iter().cloned());
        Ok(())
    }

    /// Skip the block announced by [`Entry::SubBlock`] using its length word.
    pub fn skip_block(&mut self) -> Result<(), BitstreamError> {
        self.read_vbr(4)?;
        self.align32();
        let words = self.read(32)?;
        let end = self.bit + words * 32;
        if end > self.size_in_bits() {
            return Err(BitstreamError::Truncated { bit: self.bit });
        }
        self.bit = end;
        Ok(())
    }

    fn pop_scope(&mut self) -> Result<(), BitstreamError> {
        let scope = self.scopes.pop().ok_or(BitstreamError::UnbalancedBlockEnd)?;
        self.align32();
        self.abbrev_width = scope.prev_abbrev_width;
        self.abbrevs = scope.prev_abbrevs;
        Ok(())
    }

    // ── Abbreviations ───────────────────────────────────────────────

    fn read_abbrev_definition(&mut self) -> Result<Abbrev, BitstreamError> {
        let count = self.read_vbr(5)? as usize;
        let mut ops = Vec::with_capacity(count.min(64));
        let mut i = 0;
        while i < count {
            if self.read(1)? == 1 {
                ops.push(AbbrevOp::Literal(self.read_vbr(8)?));
                i += 1;
                continue;
            }
            match self.read(3)? {
                encoding::ARRAY => {
                    if i + 2 != count {
                        return Err(BitstreamError::InvalidAbbrev {
                            reason: "array element must be the last descriptor",
                        });
                    }
                    if self.read(1)? == 1 {
                        return Err(BitstreamError::InvalidAbbrev {
                            reason: "array element cannot be a literal",
                        });
                    }
                    let encoding = self.read(3)?;
                    ops.push(AbbrevOp::Array(self.read_scalar_descriptor(encoding)?));
                    i += 2;
                }
                encoding::BLOB => {
                    ops.push(AbbrevOp::Blob);
                    i += 1;
                }
                encoding => {
                    ops.push(AbbrevOp::Scalar(self.read_scalar_descriptor(encoding)?));
                    i += 1;
                }
            }
        }
        Abbrev::new(ops)
    }

    fn read_scalar_descriptor(&mut self, encoding: u64) -> Result<ScalarOp, BitstreamError> {
        let width = |cursor: &mut Self| -> Result<u8, BitstreamError> {
            let value = cursor.read_vbr(5)?;
            u8::try_from(value).map_err(|_| BitstreamError::InvalidAbbrev {
                reason: "operand width too large",
            })
        };
        match encoding {
            encoding::FIXED => Ok(ScalarOp::Fixed(width(self)?)),
            encoding::VBR => Ok(ScalarOp::Vbr(width(self)?)),
            encoding::CHAR6 => Ok(ScalarOp::Char6),
            _ => Err(BitstreamError::InvalidAbbrev {
                reason: "unknown operand encoding",
            }),
        }
    }

    fn read_block_info_block(&mut self) -> Result<(), BitstreamError> {
        self.enter_sub_block(BLOCKINFO_BLOCK_ID)?;
        let mut target: Option<u32> = None;
        loop {
            let code = self.read(self.abbrev_width)? as u32;
            match code {
                END_BLOCK => return self.pop_scope(),
                ENTER_SUBBLOCK => {
                    self.read_vbr(8)?;
                    self.skip_block()?;
                }
                DEFINE_ABBREV => {
                    let abbrev = self.read_abbrev_definition()?;
                    let block_id = target.ok_or(BitstreamError::InvalidBlockInfo {
                        reason: "abbreviation before SETBID",
                    })?;
                    self.block_info
                        .entry_mut(block_id)
                        .abbrevs
                        .push(Arc::new(abbrev));
                }
                abbrev_id => {
                    let record = self.read_record(abbrev_id)?;
                    match record.code {
                        blockinfo_code::SETBID => {
                            let id = record.field(0)?;
                            target = Some(u32::try_from(id).map_err(|_| {
                                BitstreamError::OutOfRange {
                                    what: "block id",
                                    value: id,
                                }
                            })?);
                        }
                        blockinfo_code::BLOCKNAME => {
                            let block_id = target.ok_or(BitstreamError::InvalidBlockInfo {
                                reason: "BLOCKNAME before SETBID",
                            })?;
                            self.block_info.entry_mut(block_id).name =
                                Some(name_from_fields(&record.fields));
                        }
                        blockinfo_code::SETRECORDNAME => {
                            let block_id = target.ok_or(BitstreamError::InvalidBlockInfo {
                                reason: "SETRECORDNAME before SETBID",
                            })?;
                            let code = record.field(0)?;
                            let code = u32::try_from(code).map_err(|_| {
                                BitstreamError::OutOfRange {
                                    what: "record code",
                                    value: code,
                                }
                            })?;
                            self.block_info
                                .entry_mut(block_id)
                                .record_names
                                .insert(code, name_from_fields(&record.fields[1..]));
                        }
                        // Unknown block-info records are ignored.
                        _ => {}
                    }
                }
            }
        }
    }

    // ── Records ─────────────────────────────────────────────────────

    /// Read a record announced by [`Entry::Record`].
    pub fn read_record(&mut self, abbrev_id: u32) -> Result<Record, BitstreamError> {
        if abbrev_id == UNABBREV_RECORD {
            let code = self.read_vbr_u32(6, "record code")?;
            let count = self.read_vbr(6)? as usize;
            let mut fields = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                fields.push(self.read_vbr(6)?);
            }
            return Ok(Record {
                code,
                fields,
                blob: None,
            });
        }

        let abbrev = abbrev_id
            .checked_sub(FIRST_APPLICATION_ABBREV)
            .and_then(|index| self.abbrevs.get(index as usize))
            .cloned()
            .ok_or(BitstreamError::UnknownAbbrev { id: abbrev_id })?;

        let mut values = Vec::with_capacity(abbrev.ops().len());
        let mut blob = None;
        for op in abbrev.ops() {
            match *op {
                AbbrevOp::Literal(value) => values.push(value),
                AbbrevOp::Scalar(scalar) => values.push(self.read_scalar(scalar)?),
                AbbrevOp::Array(elt) => {
                    let count = self.read_vbr(6)? as usize;
                    values.reserve(count.min(1024));
                    for _ in 0..count {
                        values.push(self.read_scalar(elt)?);
                    }
                }
                AbbrevOp::Blob => blob = Some(self.read_blob()?),
            }
        }

        if values.is_empty() {
            return Err(BitstreamError::AbbrevMismatch {
                reason: "abbreviated record has no code",
            });
        }
        let code = values.remove(0);
        let code = u32::try_from(code).map_err(|_| BitstreamError::OutOfRange {
            what: "record code",
            value: code,
        })?;
        Ok(Record {
            code,
            fields: values,
            blob,
        })
    }

    /// Skip a record announced by [`Entry::Record`].
    pub fn skip_record(&mut self, abbrev_id: u32) -> Result<u32, BitstreamError> {
        self.read_record(abbrev_id).map(|record| record.code)
    }

    fn read_scalar(&mut self, op: ScalarOp) -> Result<u64, BitstreamError> {
        match op {
            ScalarOp::Fixed(width) => self.read(u32::from(width)),
            ScalarOp::Vbr(width) => self.read_vbr(u32::from(width)),
            ScalarOp::Char6 => Ok(decode_char6(self.read(6)?)),
        }
    }

    fn read_blob(&mut self) -> Result<Vec<u8>, BitstreamError> {
        let len = self.read_vbr(6)?;
        self.align32();
        let start = self.bit / 8;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.data.len() as u64)
            .ok_or(BitstreamError::Truncated { bit: self.bit })?;
        let bytes = self.data[start as usize..end as usize].to_vec();
        self.bit = end * 8;
        self.align32();
        Ok(bytes)
    }
}
