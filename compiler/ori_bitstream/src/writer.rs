//! Bit-level stream writer.
//!
//! Bits are packed least-significant first into 32-bit words which are
//! flushed little-endian. Block lengths are backpatched when a block closes,
//! so a reader can skip a whole block without decoding it.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::abbrev::{encode_char6, encoding};
use crate::{
    blockinfo_code, Abbrev, AbbrevOp, BitstreamError, ScalarOp, BLOCKINFO_BLOCK_ID,
    DEFINE_ABBREV, END_BLOCK, ENTER_SUBBLOCK, FIRST_APPLICATION_ABBREV, TOP_LEVEL_ABBREV_WIDTH,
    UNABBREV_RECORD,
};

/// State saved when entering a block, restored when leaving it.
struct BlockScope {
    prev_abbrev_width: u32,
    prev_abbrevs: Vec<Arc<Abbrev>>,
    /// Byte index of the placeholder length word.
    length_word: usize,
}

/// Writes a block/record bitstream into an in-memory buffer.
pub struct BitstreamWriter {
    out: Vec<u8>,
    cur_word: u32,
    cur_bit: u32,
    abbrev_width: u32,
    abbrevs: Vec<Arc<Abbrev>>,
    scopes: Vec<BlockScope>,
    /// Abbreviations registered through the block-info block, per block id.
    block_info_abbrevs: FxHashMap<u32, Vec<Arc<Abbrev>>>,
    /// Block currently selected by `SETBID` inside the block-info block.
    block_info_target: Option<u32>,
}

impl Default for BitstreamWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BitstreamWriter {
    /// Create an empty writer at top level.
    pub fn new() -> Self {
        BitstreamWriter {
            out: Vec::with_capacity(4096),
            cur_word: 0,
            cur_bit: 0,
            abbrev_width: TOP_LEVEL_ABBREV_WIDTH,
            abbrevs: Vec::new(),
            scopes: Vec::new(),
            block_info_abbrevs: FxHashMap::default(),
            block_info_target: None,
        }
    }

    // ── Raw bits ────────────────────────────────────────────────────

    /// Current position in bits from the start of the stream.
    pub fn bit_position(&self) -> u64 {
        self.out.len() as u64 * 8 + u64::from(self.cur_bit)
    }

    /// Number of open blocks.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn write_word(&mut self, word: u32) {
        self.out.extend_from_slice(&word.to_le_bytes());
    }

    /// Emit the low `nbits` bits of `val` (1..=32).
    pub fn emit(&mut self, val: u32, nbits: u32) {
        debug_assert!(nbits > 0 && nbits <= 32, "invalid bit width {nbits}");
        debug_assert!(
            nbits == 32 || val >> nbits == 0,
            "value {val} does not fit in {nbits} bits"
        );
        self.cur_word |= val << self.cur_bit;
        if self.cur_bit + nbits < 32 {
            self.cur_bit += nbits;
            return;
        }
        self.write_word(self.cur_word);
        self.cur_word = if self.cur_bit == 0 {
            0
        } else {
            val >> (32 - self.cur_bit)
        };
        self.cur_bit = (self.cur_bit + nbits) & 31;
    }

    /// Emit the low `nbits` bits of a 64-bit value (1..=64).
    pub fn emit64(&mut self, val: u64, nbits: u32) {
        if nbits <= 32 {
            self.emit(val as u32, nbits);
        } else {
            self.emit(val as u32, 32);
            self.emit((val >> 32) as u32, nbits - 32);
        }
    }

    /// Emit `val` as a variable-width integer with `nbits`-bit chunks.
    pub fn emit_vbr(&mut self, val: u32, nbits: u32) {
        let threshold = 1u32 << (nbits - 1);
        let mut val = val;
        while val >= threshold {
            self.emit((val & (threshold - 1)) | threshold, nbits);
            val >>= nbits - 1;
        }
        self.emit(val, nbits);
    }

    /// 64-bit variant of [`emit_vbr`](Self::emit_vbr).
    pub fn emit_vbr64(&mut self, val: u64, nbits: u32) {
        if let Ok(small) = u32::try_from(val) {
            self.emit_vbr(small, nbits);
            return;
        }
        let threshold = 1u64 << (nbits - 1);
        let mut val = val;
        while val >= threshold {
            self.emit(((val & (threshold - 1)) | threshold) as u32, nbits);
            val >>= nbits - 1;
        }
        self.emit(val as u32, nbits);
    }

    /// Pad with zero bits up to the next 32-bit boundary.
    pub fn align32(&mut self) {
        if self.cur_bit > 0 {
            self.write_word(self.cur_word);
            self.cur_word = 0;
            self.cur_bit = 0;
        }
    }

    fn emit_code(&mut self, code: u32) {
        self.emit(code, self.abbrev_width);
    }

    fn backpatch_word(&mut self, byte_index: usize, word: u32) {
        self.out[byte_index..byte_index + 4].copy_from_slice(&word.to_le_bytes());
    }

    // ── Blocks ──────────────────────────────────────────────────────

    /// Open a nested block. Abbreviations registered for `block_id` in the
    /// block-info block become available immediately.
    pub fn enter_subblock(&mut self, block_id: u32, abbrev_width: u32) {
        self.emit_code(ENTER_SUBBLOCK);
        self.emit_vbr(block_id, 8);
        self.emit_vbr(abbrev_width, 4);
        self.align32();

        let length_word = self.out.len();
        self.write_word(0);

        let prev_abbrevs = std::mem::take(&mut self.abbrevs);
        self.scopes.push(BlockScope {
            prev_abbrev_width: self.abbrev_width,
            prev_abbrevs,
            length_word,
        });
        self.abbrev_width = abbrev_width;
        if let Some(shared) = self.block_info_abbrevs.get(&block_id) {
            self.abbrevs.extend(shared.iter().cloned());
        }
    }

    /// Close the innermost block and backpatch its length.
    pub fn exit_block(&mut self) -> Result<(), BitstreamError> {
        let Some(scope) = self.scopes.pop() else {
            return Err(BitstreamError::UnbalancedBlockEnd);
        };
        self.emit_code(END_BLOCK);
        self.align32();

        let words = (self.out.len() - scope.length_word) / 4 - 1;
        let words = u32::try_from(words).map_err(|_| BitstreamError::OutOfRange {
            what: "block length",
            value: words as u64,
        })?;
        self.backpatch_word(scope.length_word, words);

        self.abbrev_width = scope.prev_abbrev_width;
        self.abbrevs = scope.prev_abbrevs;
        self.block_info_target = None;
        Ok(())
    }

    // ── Abbreviations ───────────────────────────────────────────────

    fn encode_abbrev(&mut self, abbrev: &Abbrev) {
        self.emit_code(DEFINE_ABBREV);
        self.emit_vbr(abbrev.encoded_len() as u32, 5);
        for op in abbrev.ops() {
            match *op {
                AbbrevOp::Literal(value) => {
                    self.emit(1, 1);
                    self.emit_vbr64(value, 8);
                }
                AbbrevOp::Scalar(scalar) => self.encode_scalar_op(scalar),
                AbbrevOp::Array(elt) => {
                    self.emit(0, 1);
                    self.emit(encoding::ARRAY as u32, 3);
                    self.encode_scalar_op(elt);
                }
                AbbrevOp::Blob => {
                    self.emit(0, 1);
                    self.emit(encoding::BLOB as u32, 3);
                }
            }
        }
    }

    fn encode_scalar_op(&mut self, op: ScalarOp) {
        self.emit(0, 1);
        match op {
            ScalarOp::Fixed(width) => {
                self.emit(encoding::FIXED as u32, 3);
                self.emit_vbr(u32::from(width), 5);
            }
            ScalarOp::Vbr(width) => {
                self.emit(encoding::VBR as u32, 3);
                self.emit_vbr(u32::from(width), 5);
            }
            ScalarOp::Char6 => self.emit(encoding::CHAR6 as u32, 3),
        }
    }

    /// Register an abbreviation local to the current block and return its id.
    pub fn emit_abbrev(&mut self, abbrev: Abbrev) -> u32 {
        self.encode_abbrev(&abbrev);
        self.abbrevs.push(Arc::new(abbrev));
        FIRST_APPLICATION_ABBREV + (self.abbrevs.len() as u32 - 1)
    }

    // ── Block-info ──────────────────────────────────────────────────

    /// Open the block-info block. Close it with [`exit_block`](Self::exit_block).
    pub fn enter_blockinfo_block(&mut self) {
        self.enter_subblock(BLOCKINFO_BLOCK_ID, 2);
        self.block_info_target = None;
    }

    fn select_block_info_target(&mut self, block_id: u32) {
        if self.block_info_target == Some(block_id) {
            return;
        }
        self.emit_record(blockinfo_code::SETBID, &[u64::from(block_id)]);
        self.block_info_target = Some(block_id);
    }

    /// Register an abbreviation for `block_id` from inside the block-info
    /// block. Returns the id it will have inside every `block_id` block.
    pub fn emit_blockinfo_abbrev(&mut self, block_id: u32, abbrev: Abbrev) -> u32 {
        self.select_block_info_target(block_id);
        self.encode_abbrev(&abbrev);
        let list = self.block_info_abbrevs.entry(block_id).or_default();
        list.push(Arc::new(abbrev));
        FIRST_APPLICATION_ABBREV + (list.len() as u32 - 1)
    }

    /// Record a human-readable name for `block_id`.
    pub fn emit_block_name(&mut self, block_id: u32, name: &str) {
        self.select_block_info_target(block_id);
        let chars: Vec<u64> = name.bytes().map(u64::from).collect();
        self.emit_record(blockinfo_code::BLOCKNAME, &chars);
    }

    /// Record a human-readable name for record `code` of `block_id`.
    pub fn emit_record_name(&mut self, block_id: u32, code: u32, name: &str) {
        self.select_block_info_target(block_id);
        let mut fields = Vec::with_capacity(name.len() + 1);
        fields.push(u64::from(code));
        fields.extend(name.bytes().map(u64::from));
        self.emit_record(blockinfo_code::SETRECORDNAME, &fields);
    }

    // ── Records ─────────────────────────────────────────────────────

    /// Emit a record without an abbreviation.
    pub fn emit_record(&mut self, code: u32, fields: &[u64]) {
        self.emit_code(UNABBREV_RECORD);
        self.emit_vbr(code, 6);
        self.emit_vbr(fields.len() as u32, 6);
        for &field in fields {
            self.emit_vbr64(field, 6);
        }
    }

    /// Emit a record with abbreviation `abbrev_id`.
    ///
    /// `fields` excludes the code; the code is checked against (or encoded
    /// with) the abbreviation's first operand.
    pub fn emit_record_with_abbrev(
        &mut self,
        abbrev_id: u32,
        code: u32,
        fields: &[u64],
        blob: Option<&[u8]>,
    ) -> Result<(), BitstreamError> {
        let index = abbrev_id
            .checked_sub(FIRST_APPLICATION_ABBREV)
            .ok_or(BitstreamError::UnknownAbbrev { id: abbrev_id })?;
        let abbrev = self
            .abbrevs
            .get(index as usize)
            .cloned()
            .ok_or(BitstreamError::UnknownAbbrev { id: abbrev_id })?;

        let mut values = Vec::with_capacity(fields.len() + 1);
        values.push(u64::from(code));
        values.extend_from_slice(fields);

        self.emit_code(abbrev_id);
        let mut next = 0usize;
        let mut blob_used = false;
        for op in abbrev.ops() {
            match *op {
                AbbrevOp::Literal(expected) => {
                    let value = values.get(next).copied().ok_or(
                        BitstreamError::AbbrevMismatch {
                            reason: "too few values for abbreviation",
                        },
                    )?;
                    if value != expected {
                        return Err(BitstreamError::AbbrevMismatch {
                            reason: "value differs from literal operand",
                        });
                    }
                    next += 1;
                }
                AbbrevOp::Scalar(scalar) => {
                    let value = values.get(next).copied().ok_or(
                        BitstreamError::AbbrevMismatch {
                            reason: "too few values for abbreviation",
                        },
                    )?;
                    self.emit_scalar(scalar, value)?;
                    next += 1;
                }
                AbbrevOp::Array(elt) => {
                    let rest = &values[next.min(values.len())..];
                    self.emit_vbr(rest.len() as u32, 6);
                    for &value in rest {
                        self.emit_scalar(elt, value)?;
                    }
                    next = values.len();
                }
                AbbrevOp::Blob => {
                    let bytes = blob.ok_or(BitstreamError::AbbrevMismatch {
                        reason: "abbreviation expects a blob",
                    })?;
                    self.emit_blob_bytes(bytes);
                    blob_used = true;
                }
            }
        }
        if next != values.len() {
            return Err(BitstreamError::AbbrevMismatch {
                reason: "too many values for abbreviation",
            });
        }
        if blob.is_some() && !blob_used {
            return Err(BitstreamError::AbbrevMismatch {
                reason: "blob given for an abbreviation without a blob operand",
            });
        }
        Ok(())
    }

    /// Emit a record whose payload is a blob, registering nothing: the
    /// abbreviation must already exist in the current block.
    pub fn emit_blob_record(
        &mut self,
        abbrev_id: u32,
        code: u32,
        fields: &[u64],
        blob: &[u8],
    ) -> Result<(), BitstreamError> {
        self.emit_record_with_abbrev(abbrev_id, code, fields, Some(blob))
    }

    fn emit_scalar(&mut self, op: ScalarOp, value: u64) -> Result<(), BitstreamError> {
        match op {
            ScalarOp::Fixed(width) => {
                let width = u32::from(width);
                if width < 64 && value >> width != 0 {
                    return Err(BitstreamError::OutOfRange {
                        what: "fixed-width operand",
                        value,
                    });
                }
                self.emit64(value, width);
            }
            ScalarOp::Vbr(width) => self.emit_vbr64(value, u32::from(width)),
            ScalarOp::Char6 => {
                let c = u8::try_from(value)
                    .ok()
                    .and_then(encode_char6)
                    .ok_or(BitstreamError::OutOfRange {
                        what: "char6 operand",
                        value,
                    })?;
                self.emit(c as u32, 6);
            }
        }
        Ok(())
    }

    fn emit_blob_bytes(&mut self, bytes: &[u8]) {
        self.emit_vbr(bytes.len() as u32, 6);
        self.align32();
        self.out.extend_from_slice(bytes);
        while self.out.len() % 4 != 0 {
            self.out.push(0);
        }
    }

    // ── Output ──────────────────────────────────────────────────────

    /// Flush any partial word and return the finished stream.
    pub fn finish(mut self) -> Result<Vec<u8>, BitstreamError> {
        if !self.scopes.is_empty() {
            return Err(BitstreamError::UnbalancedBlockEnd);
        }
        self.align32();
        Ok(self.out)
    }
}
