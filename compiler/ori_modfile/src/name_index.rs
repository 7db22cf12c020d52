//! Name-keyed lookup tables persisted in the index blocks.
//!
//! Every table maps a name to a list of [`IndexEntry`]s. An entry is five
//! bytes: a one-byte disambiguator (declaration kind tag, operator fixity,
//! or 0 for IR tables) followed by a little-endian 32-bit id. Looking a
//! name up decodes only that name's entry list.

use ori_sema::{ConformanceId, DeclContext, DeclId, DeclKind, SemaContext};

use crate::on_disk_table::{OnDiskTable, OnDiskTableBuilder};
use crate::TableError;

const ENTRY_SIZE: usize = 5;

/// One hit in a name table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexEntry {
    /// Kind tag or fixity, depending on the table.
    pub disambiguator: u8,
    /// 1-based id into the table the index points at.
    pub id: u32,
}

impl IndexEntry {
    pub fn new(disambiguator: u8, id: u32) -> Self {
        IndexEntry { disambiguator, id }
    }
}

fn encode_entry(entry: IndexEntry, out: &mut Vec<u8>) {
    out.push(entry.disambiguator);
    out.extend_from_slice(&entry.id.to_le_bytes());
}

/// Decode an entry list.
pub(crate) fn decode_entries(data: &[u8]) -> Result<Vec<IndexEntry>, TableError> {
    if data.len() % ENTRY_SIZE != 0 {
        return Err(TableError::EntryList(data.len()));
    }
    Ok(data
        .chunks_exact(ENTRY_SIZE)
        .map(|c| IndexEntry {
            disambiguator: c[0],
            id: u32::from_le_bytes([c[1], c[2], c[3], c[4]]),
        })
        .collect())
}

/// Collects entries for one table.
#[derive(Default)]
pub struct NameIndexBuilder {
    table: OnDiskTableBuilder,
}

impl NameIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` to the list for `name`.
    pub fn add(&mut self, name: &str, entry: IndexEntry) {
        let mut data = Vec::with_capacity(ENTRY_SIZE);
        encode_entry(entry, &mut data);
        self.table.insert(name.as_bytes(), &data);
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Lay out the table. Returns the blob and the table offset.
    pub fn finish(self) -> Result<(Vec<u8>, u32), TableError> {
        self.table.finish()
    }
}

/// A name table opened over its blob.
#[derive(Clone, Debug)]
pub struct NameIndex {
    table: OnDiskTable,
}

impl NameIndex {
    pub fn open(blob: Vec<u8>, table_offset: u32) -> Result<Self, TableError> {
        Ok(NameIndex {
            table: OnDiskTable::open(blob, table_offset)?,
        })
    }

    /// Entries for `name`; empty if the name is absent.
    pub fn lookup(&self, name: &str) -> Result<Vec<IndexEntry>, TableError> {
        match self.table.lookup(name.as_bytes())? {
            Some(data) => decode_entries(data),
            None => Ok(Vec::new()),
        }
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Every name with its entries. Order is unspecified.
    pub fn entries(&self) -> Result<Vec<(String, Vec<IndexEntry>)>, TableError> {
        self.table
            .entries()?
            .into_iter()
            .map(|(key, data)| {
                Ok((
                    String::from_utf8_lossy(key).into_owned(),
                    decode_entries(data)?,
                ))
            })
            .collect()
    }
}

/// `Module.Outer.Inner` for a nominal type; members of extensions are
/// named through the extended type. `None` for declarations in a local
/// scope.
pub fn qualified_decl_name(ctx: &SemaContext, decl: DeclId) -> Option<String> {
    let data = ctx.decl(decl);
    let prefix = match data.context {
        DeclContext::Module(module) => ctx.module_name(module).to_owned(),
        DeclContext::Decl(parent) => match &ctx.decl(parent).kind {
            DeclKind::Extension(ext) => {
                qualified_decl_name(ctx, ctx.nominal_of_type(ext.extended)?)?
            }
            _ if ctx.decl(parent).tag().is_nominal_type() => qualified_decl_name(ctx, parent)?,
            _ => return None,
        },
    };
    Some(format!("{prefix}.{}", ctx.name_str(data.name)))
}

/// `Nominal:Protocol` key of the witness table for a normal conformance.
pub fn witness_table_key(ctx: &SemaContext, conformance: ConformanceId) -> Option<String> {
    let normal = ctx.normal_conformance(conformance)?;
    Some(format!(
        "{}:{}",
        qualified_decl_name(ctx, normal.nominal)?,
        qualified_decl_name(ctx, normal.protocol)?
    ))
}

#[cfg(test)]
mod tests;
