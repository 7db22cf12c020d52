//! Abbreviations: compact per-record-kind encodings.
//!
//! An abbreviation lists how each operand of a record is encoded. The first
//! operand is the record code, usually a literal so it costs no bits at all.
//! `Array` and `Blob` consume the rest of the record and must come last.

use crate::BitstreamError;

/// Encoding of a single scalar operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarOp {
    /// Fixed-width field of the given number of bits (1..=64).
    Fixed(u8),
    /// Variable-width field in chunks of the given number of bits (2..=32).
    Vbr(u8),
    /// Six-bit character from `[a-zA-Z0-9._]`.
    Char6,
}

/// One operand slot of an abbreviation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AbbrevOp {
    /// The operand always has this value and is not stored.
    Literal(u64),
    /// A single scalar operand.
    Scalar(ScalarOp),
    /// All remaining operands, each with the element encoding.
    Array(ScalarOp),
    /// A length-prefixed, 32-bit aligned byte blob.
    Blob,
}

impl AbbrevOp {
    /// Shorthand for `Scalar(Fixed(width))`.
    pub const fn fixed(width: u8) -> Self {
        AbbrevOp::Scalar(ScalarOp::Fixed(width))
    }

    /// Shorthand for `Scalar(Vbr(width))`.
    pub const fn vbr(width: u8) -> Self {
        AbbrevOp::Scalar(ScalarOp::Vbr(width))
    }

    /// Shorthand for an array of 6-bit VBR elements.
    pub const fn array_vbr6() -> Self {
        AbbrevOp::Array(ScalarOp::Vbr(6))
    }

    /// Number of operand descriptors this slot occupies on disk.
    ///
    /// Arrays are written as the array marker followed by the element.
    pub(crate) fn encoded_len(self) -> usize {
        match self {
            AbbrevOp::Array(_) => 2,
            _ => 1,
        }
    }
}

/// Encoding tags used inside `DEFINE_ABBREV`.
pub(crate) mod encoding {
    pub const FIXED: u64 = 1;
    pub const VBR: u64 = 2;
    pub const ARRAY: u64 = 3;
    pub const CHAR6: u64 = 4;
    pub const BLOB: u64 = 5;
}

/// A validated abbreviation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Abbrev {
    ops: Vec<AbbrevOp>,
}

impl Abbrev {
    /// Create an abbreviation, checking operand widths and that `Array` or
    /// `Blob` only appear in the last position.
    pub fn new(ops: Vec<AbbrevOp>) -> Result<Self, BitstreamError> {
        if ops.is_empty() {
            return Err(BitstreamError::InvalidAbbrev {
                reason: "abbreviation has no operands",
            });
        }
        let last = ops.len() - 1;
        for (i, op) in ops.iter().enumerate() {
            match *op {
                AbbrevOp::Literal(_) => {}
                AbbrevOp::Scalar(scalar) => validate_scalar(scalar)?,
                AbbrevOp::Array(elt) => {
                    if i != last {
                        return Err(BitstreamError::InvalidAbbrev {
                            reason: "array must be the last operand",
                        });
                    }
                    validate_scalar(elt)?;
                }
                AbbrevOp::Blob => {
                    if i != last {
                        return Err(BitstreamError::InvalidAbbrev {
                            reason: "blob must be the last operand",
                        });
                    }
                }
            }
        }
        Ok(Abbrev { ops })
    }

    /// Abbreviation whose code is a literal and whose operands are an array
    /// of 6-bit VBR values. Fits any record of the given code.
    pub fn literal_array(code: u32) -> Self {
        Abbrev {
            ops: vec![AbbrevOp::Literal(u64::from(code)), AbbrevOp::array_vbr6()],
        }
    }

    /// Abbreviation for a record with `fields` scalar VBR6 operands and a
    /// trailing blob.
    pub fn literal_with_blob(code: u32, fields: usize) -> Self {
        let mut ops = Vec::with_capacity(fields + 2);
        ops.push(AbbrevOp::Literal(u64::from(code)));
        ops.extend(std::iter::repeat(AbbrevOp::vbr(6)).take(fields));
        ops.push(AbbrevOp::Blob);
        Abbrev { ops }
    }

    /// Operand slots, in order.
    pub fn ops(&self) -> &[AbbrevOp] {
        &self.ops
    }

    /// Number of operand descriptors written by `DEFINE_ABBREV`.
    pub(crate) fn encoded_len(&self) -> usize {
        self.ops.iter().map(|op| op.encoded_len()).sum()
    }
}

fn validate_scalar(op: ScalarOp) -> Result<(), BitstreamError> {
    match op {
        ScalarOp::Fixed(width) if width == 0 || width > 64 => Err(BitstreamError::InvalidAbbrev {
            reason: "fixed width must be in 1..=64",
        }),
        ScalarOp::Vbr(width) if !(2..=32).contains(&width) => Err(BitstreamError::InvalidAbbrev {
            reason: "vbr width must be in 2..=32",
        }),
        _ => Ok(()),
    }
}

/// Encode a character as a 6-bit value.
pub(crate) fn encode_char6(c: u8) -> Option<u64> {
    let v = match c {
        b'a'..=b'z' => c - b'a',
        b'A'..=b'Z' => c - b'A' + 26,
        b'0'..=b'9' => c - b'0' + 52,
        b'.' => 62,
        b'_' => 63,
        _ => return None,
    };
    Some(u64::from(v))
}

/// Decode a 6-bit value into its character.
pub(crate) fn decode_char6(v: u64) -> u64 {
    let c = match v {
        0..=25 => b'a' + v as u8,
        26..=51 => b'A' + (v as u8 - 26),
        52..=61 => b'0' + (v as u8 - 52),
        62 => b'.',
        _ => b'_',
    };
    u64::from(c)
}

#[cfg(test)]
mod tests;
