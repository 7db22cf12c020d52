//! Companion documentation files.
//!
//! A documentation file sits next to a module file and maps each top-level
//! name to the brief comment of the first declaration with that name. The
//! layout is a magic word and one `DOC` block holding a metadata record and
//! an on-disk table in a blob.

use std::sync::Arc;

use ori_bitstream::{Abbrev, AdvanceFlags, BitstreamCursor, BitstreamWriter, Entry};
use ori_sema::{ModuleId, SemaContext};
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::format::{block, doc, DOC_MAGIC, SMALL_ABBREV_WIDTH, VERSION_MAJOR, VERSION_MINOR};
use crate::on_disk_table::{OnDiskTable, OnDiskTableBuilder};
use crate::{LoadError, SerializeError};

/// Serialize the brief comments of `module`'s top-level declarations.
pub fn serialize_module_doc(
    ctx: &SemaContext,
    module: ModuleId,
) -> Result<Vec<u8>, SerializeError> {
    let data = ctx.module(module);
    let mut table = OnDiskTableBuilder::new();
    let mut seen = FxHashSet::default();
    for &decl in &data.top_level {
        let Some(comment) = data.doc_comments.get(&decl) else {
            continue;
        };
        let name = ctx.decl_name(decl);
        if name.is_empty() || !seen.insert(name) {
            continue;
        }
        let brief = brief_of(comment);
        if !brief.is_empty() {
            table.insert(name.as_bytes(), brief.as_bytes());
        }
    }
    let entries = table.len();
    let (blob, table_offset) = table.finish()?;

    let mut out = BitstreamWriter::new();
    for byte in DOC_MAGIC {
        out.emit(u32::from(byte), 8);
    }
    out.enter_subblock(block::DOC, SMALL_ABBREV_WIDTH);
    out.emit_record(doc::METADATA, &[VERSION_MAJOR, VERSION_MINOR]);
    let abbrev = out.emit_abbrev(Abbrev::literal_with_blob(doc::BRIEF_COMMENTS, 1));
    out.emit_blob_record(abbrev, doc::BRIEF_COMMENTS, &[u64::from(table_offset)], &blob)?;
    out.exit_block()?;
    debug!(module = ctx.module_name(module), entries, "documentation serialized");
    Ok(out.finish()?)
}

/// First paragraph of a comment, with its lines joined by single spaces.
pub fn brief_of(comment: &str) -> String {
    let mut brief = String::new();
    for line in comment.lines().map(str::trim) {
        if line.is_empty() {
            if brief.is_empty() {
                continue;
            }
            break;
        }
        if !brief.is_empty() {
            brief.push(' ');
        }
        brief.push_str(line);
    }
    brief
}

/// An opened documentation file.
#[derive(Debug)]
pub struct DocFile {
    module: Arc<str>,
    comments: OnDiskTable,
}

impl DocFile {
    pub fn open(module: &str, data: Arc<[u8]>) -> Result<Self, LoadError> {
        let malformed = |detail: String| LoadError::malformed(module, detail);
        let bits = |e: ori_bitstream::BitstreamError| malformed(e.to_string());

        if data.len() < DOC_MAGIC.len() || data[..DOC_MAGIC.len()] != DOC_MAGIC {
            return Err(malformed("not a documentation file".to_owned()));
        }
        let mut cursor = BitstreamCursor::new(data);
        cursor.jump_to_bit(32).map_err(bits)?;
        match cursor.advance(AdvanceFlags::empty()).map_err(bits)? {
            Entry::SubBlock(block::DOC) => cursor.enter_sub_block(block::DOC).map_err(bits)?,
            _ => return Err(malformed("missing documentation block".to_owned())),
        }

        let mut saw_metadata = false;
        let mut comments = None;
        loop {
            match cursor.advance(AdvanceFlags::SKIP_SUBBLOCKS).map_err(bits)? {
                Entry::EndBlock => break,
                Entry::SubBlock(_) => {}
                Entry::Record(abbrev) => {
                    let record = cursor.read_record(abbrev).map_err(bits)?;
                    match record.code {
                        doc::METADATA => {
                            let major = record.field(0).map_err(bits)?;
                            let minor = record.field(1).map_err(bits)?;
                            if major > VERSION_MAJOR {
                                return Err(LoadError::FormatTooNew { major, minor });
                            }
                            saw_metadata = true;
                        }
                        doc::BRIEF_COMMENTS => {
                            let offset = record.field(0).map_err(bits)?;
                            let offset = u32::try_from(offset).map_err(|_| {
                                malformed(format!("table offset {offset} out of range"))
                            })?;
                            let blob = record.blob.unwrap_or_default();
                            comments = Some(
                                OnDiskTable::open(blob, offset)
                                    .map_err(|e| malformed(e.to_string()))?,
                            );
                        }
                        _ => {}
                    }
                }
            }
        }
        if !saw_metadata {
            return Err(malformed("documentation file has no metadata".to_owned()));
        }
        let comments = comments
            .ok_or_else(|| malformed("documentation file has no comment table".to_owned()))?;
        Ok(DocFile {
            module: Arc::from(module),
            comments,
        })
    }

    /// Brief comment of the top-level declaration named `name`.
    pub fn brief_comment(&self, name: &str) -> Result<Option<&str>, LoadError> {
        let Some(bytes) = self
            .comments
            .lookup(name.as_bytes())
            .map_err(|e| LoadError::malformed(&self.module, e.to_string()))?
        else {
            return Ok(None);
        };
        std::str::from_utf8(bytes)
            .map(Some)
            .map_err(|_| {
                LoadError::malformed(&self.module, format!("comment of `{name}` is not UTF-8"))
            })
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }
}
