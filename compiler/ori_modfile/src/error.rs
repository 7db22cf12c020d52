//! Error types.
//!
//! - [`LoadError`]: a module could not be loaded or a lazy read hit a
//!   broken file. Terminal for the module it names.
//! - [`SerializeError`]: the writer could not encode a module.
//! - [`IrError`]: one function body could not be decoded. Never escapes the
//!   reader; the function degrades to a declaration.
//! - [`TableError`]: an on-disk hash table is malformed or too large.

use std::path::PathBuf;

use ori_bitstream::BitstreamError;
use ori_tir::Opcode;
use thiserror::Error;

/// Failure to load or read a module file.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("malformed module file for `{module}`: {detail}")]
    Malformed { module: String, detail: String },

    #[error("module file format {major}.{minor} is too new for this compiler")]
    FormatTooNew { major: u64, minor: u64 },

    #[error("module file format {major}.{minor} is too old for this compiler")]
    FormatTooOld { major: u64, minor: u64 },

    #[error("module `{module}` depends on missing modules: {}", missing.join(", "))]
    MissingDependency { module: String, missing: Vec<String> },

    #[error("module `{module}` shadows module `{underlying}`, which could not be loaded")]
    MissingShadowedModule { module: String, underlying: String },

    #[error("no module file found for `{module}`")]
    NotFound { module: String },

    #[error("module `{module}` is not loaded")]
    NotLoaded { module: String },

    #[error("cannot read `{}`: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

impl LoadError {
    /// A [`LoadError::Malformed`] for `module`.
    pub fn malformed(module: &str, detail: impl Into<String>) -> Self {
        LoadError::Malformed {
            module: module.to_owned(),
            detail: detail.into(),
        }
    }

    /// Names of missing modules, for errors that have them.
    pub fn missing_modules(&self) -> &[String] {
        match self {
            LoadError::MissingDependency { missing, .. } => missing,
            _ => &[],
        }
    }
}

/// Failure to serialize a module.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error(transparent)]
    Bitstream(#[from] BitstreamError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("declaration `{decl}` belongs to a module without a name")]
    UnnamedModule { decl: String },

    #[error("cannot reference `{decl}` from another module: {reason}")]
    Unreferenceable { decl: String, reason: &'static str },

    #[error("too many entries in the {table} table")]
    IdOverflow { table: &'static str },

    #[error("function `{function}` uses a value with no definition in its body")]
    UndefinedValue { function: String },

    #[error("cannot write `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to decode one IR function body.
#[derive(Debug, Error)]
pub enum IrError {
    #[error("unknown opcode {0}")]
    UnknownOpcode(u64),

    #[error("{opcode:?} stored with the wrong record layout (code {code})")]
    WrongLayout { opcode: Opcode, code: u32 },

    #[error("{opcode:?} expects {expected} operands, found {found}")]
    Arity {
        opcode: Opcode,
        expected: usize,
        found: usize,
    },

    #[error("basic block {0} is out of range")]
    BlockOutOfRange(u64),

    #[error("basic block {0} is referenced but never defined")]
    UndefinedBlock(u64),

    #[error("instruction before the first basic block")]
    NoCurrentBlock,

    #[error("value {id}#{result} is used but never defined")]
    UnresolvedValue { id: u64, result: u64 },

    #[error("unexpected record {code} in a function body")]
    UnexpectedRecord { code: u32 },

    #[error("invalid {what} {value}")]
    InvalidField { what: &'static str, value: u64 },

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Malformed or oversized on-disk hash table.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("table header at offset {0} is out of bounds")]
    Header(u32),

    #[error("bucket at offset {0} is truncated")]
    Bucket(u32),

    #[error("key of {0} bytes is too long")]
    KeyTooLong(usize),

    #[error("data of {0} bytes is too long")]
    DataTooLong(usize),

    #[error("table has too many entries")]
    TooManyEntries,

    #[error("entry list of {0} bytes is not a whole number of entries")]
    EntryList(usize),
}

#[cfg(test)]
mod tests;
