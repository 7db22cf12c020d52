//! One opened module file.
//!
//! [`ModuleFile::open`] validates the container and reads every small
//! section eagerly: control, input, identifier offsets, the index blocks.
//! The decls and IR blocks are only located; a cursor is parked inside each
//! and entities are decoded from them on demand by a
//! [`ReadSession`](crate::reader::ReadSession).

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ori_bitstream::{AdvanceFlags, BitstreamCursor, BitstreamError, Entry, Record};
use ori_sema::{
    DeclId, KnownProtocol, LinkLibrary, LinkLibraryKind, ModuleId, Name, SemaContext, TypeId,
};
use ori_tir::{FuncId, GlobalId, VTableId, WitnessTableId};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::format::{
    block, control, identifier, index, input, ir_index, table_index, MAGIC, MIN_SUPPORTED_MAJOR,
    VERSION_MAJOR,
};
use crate::name_index::{IndexEntry, NameIndex};
use crate::LoadError;

/// Cache slot of one lazily decoded entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Slot<T> {
    /// Not decoded yet; the record starts at this bit offset.
    Unread(u64),
    /// Being decoded further up the call stack.
    InProgress,
    Ready(T),
}

/// Decoding state of an IR function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FunctionSlot {
    Unread(u64),
    /// Installed without its body.
    Declared { func: FuncId, has_body: bool },
    /// Body decoded, or no body exists.
    Complete(FuncId),
    /// The body failed to decode; the function stays a declaration.
    BodyFailed(FuncId),
}

/// How far a declaration shell has been filled in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Population {
    /// No shell yet, or a cross-reference (nothing to populate).
    Idle,
    /// Shell installed and queued.
    Pending,
    /// Being populated further up the call stack.
    Populating,
    Done,
}

impl FunctionSlot {
    pub(crate) fn func(self) -> Option<FuncId> {
        match self {
            FunctionSlot::Unread(_) => None,
            FunctionSlot::Declared { func, .. }
            | FunctionSlot::Complete(func)
            | FunctionSlot::BodyFailed(func) => Some(func),
        }
    }
}

/// Terminal state of a module file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileStatus {
    Valid,
    /// Every further request fails with this error.
    Malformed(LoadError),
}

/// Which parked cursor a read uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Section {
    Decls,
    Ir,
}

/// A dependency recorded in the input block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportInfo {
    pub name: String,
    pub exported: bool,
}

/// Name tables of the index block.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexKind {
    TopLevelValues,
    Operators,
    Extensions,
    ClassMembers,
    OperatorMethods,
}

/// A validated module file and its per-session caches.
pub struct ModuleFile {
    pub(crate) name: Arc<str>,
    pub(crate) path: Option<PathBuf>,
    pub(crate) version: (u64, u64),
    pub(crate) compiler_version: String,
    pub(crate) shadowed: Option<String>,
    pub(crate) imports: Vec<ImportInfo>,
    pub(crate) link_libraries: Vec<LinkLibrary>,
    pub(crate) source_files: Vec<String>,

    decls_cursor: Option<BitstreamCursor>,
    ir_cursor: Option<BitstreamCursor>,

    pub(crate) decls: Vec<Slot<DeclId>>,
    pub(crate) decl_offsets: Vec<u64>,
    pub(crate) population: Vec<Population>,
    /// Shells waiting to be populated, by table index.
    pub(crate) pending: VecDeque<usize>,
    /// Table index of every declaration this file created.
    pub(crate) decl_index: FxHashMap<DeclId, usize>,
    pub(crate) types: Vec<Slot<TypeId>>,
    identifier_offsets: Vec<u64>,
    identifier_blob: Vec<u8>,
    identifiers: Vec<Option<Name>>,

    pub(crate) top_level: Vec<u64>,
    tables: FxHashMap<IndexKind, NameIndex>,
    pub(crate) known_adopters: FxHashMap<KnownProtocol, Vec<u64>>,

    pub(crate) functions: Vec<FunctionSlot>,
    pub(crate) function_offsets: Vec<u64>,
    pub(crate) globals: Vec<Slot<GlobalId>>,
    pub(crate) vtables: Vec<Slot<VTableId>>,
    pub(crate) witness_tables: Vec<Slot<WitnessTableId>>,
    function_names: Option<NameIndex>,
    global_names: Option<NameIndex>,
    vtable_names: Option<NameIndex>,
    witness_table_names: Option<NameIndex>,

    /// Brief comments from the companion documentation file.
    pub(crate) docs: Option<crate::DocFile>,

    /// Module this file was loaded as, once registered with a context.
    pub(crate) module: Option<ModuleId>,
    pub(crate) status: FileStatus,
    /// Records decoded from the decls and IR blocks so far.
    pub(crate) records_read: u64,
}

impl std::fmt::Debug for ModuleFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleFile")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("version", &self.version)
            .field("decls", &self.decls.len())
            .field("types", &self.types.len())
            .field("functions", &self.functions.len())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl ModuleFile {
    /// Validate `data` and read its small sections. `name` is the name the
    /// file was requested under and is only used in errors.
    pub fn open(name: &str, data: Arc<[u8]>, path: Option<&Path>) -> Result<Self, LoadError> {
        let malformed = |detail: String| LoadError::malformed(name, detail);
        let bits = |e: BitstreamError| LoadError::malformed(name, e.to_string());

        if data.len() < MAGIC.len() || data[..MAGIC.len()] != MAGIC {
            return Err(malformed("not a module file".to_owned()));
        }
        let mut cursor = BitstreamCursor::new(data);
        cursor.jump_to_bit(32).map_err(bits)?;
        match cursor.advance(AdvanceFlags::empty()).map_err(bits)? {
            Entry::SubBlock(block::MODULE) => cursor.enter_sub_block(block::MODULE).map_err(bits)?,
            _ => return Err(malformed("missing module block".to_owned())),
        }

        let mut file = ModuleFile {
            name: Arc::from(name),
            path: path.map(Path::to_path_buf),
            version: (0, 0),
            compiler_version: String::new(),
            shadowed: None,
            imports: Vec::new(),
            link_libraries: Vec::new(),
            source_files: Vec::new(),
            decls_cursor: None,
            ir_cursor: None,
            decls: Vec::new(),
            decl_offsets: Vec::new(),
            population: Vec::new(),
            pending: VecDeque::new(),
            decl_index: FxHashMap::default(),
            types: Vec::new(),
            identifier_offsets: Vec::new(),
            identifier_blob: Vec::new(),
            identifiers: Vec::new(),
            top_level: Vec::new(),
            tables: FxHashMap::default(),
            known_adopters: FxHashMap::default(),
            functions: Vec::new(),
            function_offsets: Vec::new(),
            globals: Vec::new(),
            vtables: Vec::new(),
            witness_tables: Vec::new(),
            function_names: None,
            global_names: None,
            vtable_names: None,
            witness_table_names: None,
            docs: None,
            module: None,
            status: FileStatus::Valid,
            records_read: 0,
        };

        // The control block must come first so the version gate runs
        // before anything else is interpreted.
        match cursor.advance(AdvanceFlags::empty()).map_err(bits)? {
            Entry::SubBlock(block::CONTROL) => {
                cursor.enter_sub_block(block::CONTROL).map_err(bits)?;
                file.read_control_block(&mut cursor)?;
            }
            _ => return Err(malformed("control block is missing or not first".to_owned())),
        }

        let mut saw_decls = false;
        let mut saw_index = false;
        loop {
            match cursor.advance(AdvanceFlags::empty()).map_err(bits)? {
                Entry::EndBlock => break,
                Entry::Record(abbrev) => {
                    cursor.skip_record(abbrev).map_err(bits)?;
                }
                Entry::SubBlock(id) => match id {
                    block::INPUT => {
                        cursor.enter_sub_block(id).map_err(bits)?;
                        file.read_input_block(&mut cursor)?;
                    }
                    block::DECLS_AND_TYPES => {
                        let mut parked = cursor.clone();
                        parked.enter_sub_block(id).map_err(bits)?;
                        file.decls_cursor = Some(parked);
                        cursor.skip_block().map_err(bits)?;
                        saw_decls = true;
                    }
                    block::IR => {
                        let mut parked = cursor.clone();
                        parked.enter_sub_block(id).map_err(bits)?;
                        file.ir_cursor = Some(parked);
                        cursor.skip_block().map_err(bits)?;
                    }
                    block::IDENTIFIER_DATA => {
                        cursor.enter_sub_block(id).map_err(bits)?;
                        file.read_identifier_block(&mut cursor)?;
                    }
                    block::INDEX => {
                        cursor.enter_sub_block(id).map_err(bits)?;
                        file.read_index_block(&mut cursor)?;
                        saw_index = true;
                    }
                    block::IR_INDEX => {
                        cursor.enter_sub_block(id).map_err(bits)?;
                        file.read_ir_index_block(&mut cursor)?;
                    }
                    other => {
                        trace!(block = other, "skipping unknown block");
                        cursor.skip_block().map_err(bits)?;
                    }
                },
            }
        }
        if !saw_decls || !saw_index {
            return Err(malformed("missing declarations or index block".to_owned()));
        }
        if !file.functions.is_empty() && file.ir_cursor.is_none() {
            return Err(malformed("IR index without an IR block".to_owned()));
        }

        debug!(
            module = %file.name,
            decls = file.decls.len(),
            types = file.types.len(),
            functions = file.functions.len(),
            "module file opened"
        );
        Ok(file)
    }

    // ── Eager sections ──────────────────────────────────────────────

    /// Records of the block the cursor is in, until its end. Nested blocks
    /// are skipped.
    fn block_records(&self, cursor: &mut BitstreamCursor) -> Result<Vec<Record>, LoadError> {
        let mut records = Vec::new();
        loop {
            match cursor
                .advance(AdvanceFlags::SKIP_SUBBLOCKS)
                .map_err(|e| self.bitstream(e))?
            {
                Entry::EndBlock => return Ok(records),
                Entry::Record(abbrev) => {
                    records.push(cursor.read_record(abbrev).map_err(|e| self.bitstream(e))?);
                }
                Entry::SubBlock(_) => {}
            }
        }
    }

    fn read_control_block(&mut self, cursor: &mut BitstreamCursor) -> Result<(), LoadError> {
        let records = self.block_records(cursor)?;
        let mut saw_metadata = false;
        for record in records {
            match record.code {
                control::METADATA => {
                    let major = record.field(0).map_err(|e| self.bitstream(e))?;
                    let minor = record.field(1).map_err(|e| self.bitstream(e))?;
                    if major > VERSION_MAJOR {
                        return Err(LoadError::FormatTooNew { major, minor });
                    }
                    if major < MIN_SUPPORTED_MAJOR {
                        return Err(LoadError::FormatTooOld { major, minor });
                    }
                    self.version = (major, minor);
                    self.compiler_version = blob_string(&record);
                    saw_metadata = true;
                }
                control::MODULE_NAME => {
                    let stored = blob_string(&record);
                    if stored != *self.name {
                        trace!(requested = %self.name, stored = %stored, "module name differs");
                    }
                }
                control::SHADOWED_MODULE => self.shadowed = Some(blob_string(&record)),
                code => trace!(code, "skipping unknown control record"),
            }
        }
        if !saw_metadata {
            return Err(self.malformed("control block has no metadata"));
        }
        Ok(())
    }

    fn read_input_block(&mut self, cursor: &mut BitstreamCursor) -> Result<(), LoadError> {
        for record in self.block_records(cursor)? {
            match record.code {
                input::IMPORTED_MODULE => self.imports.push(ImportInfo {
                    name: blob_string(&record),
                    exported: record.field(0).map_err(|e| self.bitstream(e))? != 0,
                }),
                input::LINK_LIBRARY => {
                    let raw = record.field(0).map_err(|e| self.bitstream(e))?;
                    let kind = u8::try_from(raw)
                        .ok()
                        .and_then(LinkLibraryKind::from_raw)
                        .ok_or_else(|| self.malformed(format!("invalid link library kind {raw}")))?;
                    self.link_libraries.push(LinkLibrary {
                        name: blob_string(&record),
                        kind,
                    });
                }
                input::SOURCE_FILE => self.source_files.push(blob_string(&record)),
                code => trace!(code, "skipping unknown input record"),
            }
        }
        Ok(())
    }

    fn read_identifier_block(&mut self, cursor: &mut BitstreamCursor) -> Result<(), LoadError> {
        for record in self.block_records(cursor)? {
            if record.code == identifier::IDENTIFIER_DATA {
                self.identifier_blob = record.blob.unwrap_or_default();
            }
        }
        Ok(())
    }

    fn read_index_block(&mut self, cursor: &mut BitstreamCursor) -> Result<(), LoadError> {
        for record in self.block_records(cursor)? {
            match record.code {
                index::DECL_OFFSETS => {
                    self.decls = record.fields.iter().map(|&o| Slot::Unread(o)).collect();
                    self.population = vec![Population::Idle; record.fields.len()];
                    self.decl_offsets = record.fields;
                }
                index::TYPE_OFFSETS => {
                    self.types = record.fields.iter().map(|&o| Slot::Unread(o)).collect();
                }
                index::IDENTIFIER_OFFSETS => {
                    self.identifiers = vec![None; record.fields.len()];
                    self.identifier_offsets = record.fields;
                }
                index::TOP_LEVEL_DECLS => self.top_level = record.fields,
                index::TOP_LEVEL_VALUES => self.add_table(IndexKind::TopLevelValues, record)?,
                index::OPERATORS => self.add_table(IndexKind::Operators, record)?,
                index::EXTENSIONS => self.add_table(IndexKind::Extensions, record)?,
                index::CLASS_MEMBERS => self.add_table(IndexKind::ClassMembers, record)?,
                index::OPERATOR_METHODS => self.add_table(IndexKind::OperatorMethods, record)?,
                index::KNOWN_PROTOCOL_ADOPTERS => {
                    let Some((&raw, ids)) = record.fields.split_first() else {
                        continue;
                    };
                    match u8::try_from(raw).ok().and_then(KnownProtocol::from_raw) {
                        Some(known) => {
                            self.known_adopters.insert(known, ids.to_vec());
                        }
                        None => trace!(raw, "skipping adopters of an unknown protocol"),
                    }
                }
                code => trace!(code, "skipping unknown index record"),
            }
        }
        Ok(())
    }

    fn read_ir_index_block(&mut self, cursor: &mut BitstreamCursor) -> Result<(), LoadError> {
        for record in self.block_records(cursor)? {
            match record.code {
                ir_index::FUNCTION_OFFSETS => {
                    self.functions = record
                        .fields
                        .iter()
                        .map(|&o| FunctionSlot::Unread(o))
                        .collect();
                    self.function_offsets = record.fields;
                }
                ir_index::GLOBAL_OFFSETS => {
                    self.globals = record.fields.iter().map(|&o| Slot::Unread(o)).collect();
                }
                ir_index::VTABLE_OFFSETS => {
                    self.vtables = record.fields.iter().map(|&o| Slot::Unread(o)).collect();
                }
                ir_index::WITNESS_TABLE_OFFSETS => {
                    self.witness_tables = record.fields.iter().map(|&o| Slot::Unread(o)).collect();
                }
                ir_index::FUNCTION_NAMES => self.function_names = Some(self.open_table(record)?),
                ir_index::GLOBAL_NAMES => self.global_names = Some(self.open_table(record)?),
                ir_index::VTABLE_NAMES => self.vtable_names = Some(self.open_table(record)?),
                ir_index::WITNESS_TABLE_NAMES => {
                    self.witness_table_names = Some(self.open_table(record)?);
                }
                code => trace!(code, "skipping unknown IR index record"),
            }
        }
        Ok(())
    }

    fn open_table(&self, record: Record) -> Result<NameIndex, LoadError> {
        let offset = record.field(0).map_err(|e| self.bitstream(e))?;
        let offset = u32::try_from(offset)
            .map_err(|_| self.malformed(format!("table offset {offset} out of range")))?;
        NameIndex::open(record.blob.unwrap_or_default(), offset)
            .map_err(|e| self.malformed(e.to_string()))
    }

    fn add_table(&mut self, kind: IndexKind, record: Record) -> Result<(), LoadError> {
        let table = self.open_table(record)?;
        self.tables.insert(kind, table);
        Ok(())
    }

    // ── Errors ──────────────────────────────────────────────────────

    pub(crate) fn malformed(&self, detail: impl Into<String>) -> LoadError {
        LoadError::malformed(&self.name, detail)
    }

    pub(crate) fn bitstream(&self, err: BitstreamError) -> LoadError {
        self.malformed(err.to_string())
    }

    /// Fail if the file has been marked malformed.
    pub(crate) fn check_status(&self) -> Result<(), LoadError> {
        match &self.status {
            FileStatus::Valid => Ok(()),
            FileStatus::Malformed(err) => Err(err.clone()),
        }
    }

    // ── Lazy access ─────────────────────────────────────────────────

    pub(crate) fn cursor_mut(
        &mut self,
        section: Section,
    ) -> Result<&mut BitstreamCursor, LoadError> {
        let cursor = match section {
            Section::Decls => self.decls_cursor.as_mut(),
            Section::Ir => self.ir_cursor.as_mut(),
        };
        match cursor {
            Some(cursor) => Ok(cursor),
            None => Err(LoadError::malformed(&self.name, "section is missing")),
        }
    }

    /// Read the record at the cursor of `section`.
    pub(crate) fn next_record(&mut self, section: Section) -> Result<Record, LoadError> {
        let cursor = self.cursor_mut(section)?;
        let result = match cursor.advance(AdvanceFlags::DONT_POP_BLOCK_AT_END) {
            Ok(Entry::Record(abbrev)) => cursor.read_record(abbrev),
            Ok(_) => {
                return Err(self.malformed("expected a record"));
            }
            Err(e) => Err(e),
        };
        self.records_read += 1;
        result.map_err(|e| self.bitstream(e))
    }

    /// The next record if its code is one of `codes`; otherwise the cursor
    /// is left where it was.
    pub(crate) fn peek_record(
        &mut self,
        section: Section,
        codes: &[u32],
    ) -> Result<Option<Record>, LoadError> {
        let cursor = self.cursor_mut(section)?;
        let mark = cursor.bookmark();
        let record = match cursor.advance(AdvanceFlags::DONT_POP_BLOCK_AT_END) {
            Ok(Entry::Record(abbrev)) => cursor.read_record(abbrev).ok(),
            _ => None,
        };
        match record {
            Some(record) if codes.contains(&record.code) => {
                self.records_read += 1;
                Ok(Some(record))
            }
            _ => {
                let cursor = self.cursor_mut(section)?;
                cursor.reset(mark).map_err(|e| LoadError::malformed(&self.name, e.to_string()))?;
                Ok(None)
            }
        }
    }

    pub(crate) fn current_bit(&mut self, section: Section) -> Result<u64, LoadError> {
        Ok(self.cursor_mut(section)?.current_bit())
    }

    /// Bits between the cursor of `section` and the end of the file.
    pub(crate) fn bits_left(&mut self, section: Section) -> Result<u64, LoadError> {
        let cursor = self.cursor_mut(section)?;
        let total = (cursor.data().len() as u64).saturating_mul(8);
        Ok(total.saturating_sub(cursor.current_bit()))
    }

    pub(crate) fn jump(&mut self, section: Section, bit: u64) -> Result<(), LoadError> {
        let result = self.cursor_mut(section)?.jump_to_bit(bit);
        result.map_err(|e| self.bitstream(e))
    }

    /// Interned name for an identifier id; id 0 is the empty name.
    pub(crate) fn identifier(&mut self, ctx: &mut SemaContext, id: u64) -> Result<Name, LoadError> {
        let Some(index) = table_index(id) else {
            return Ok(Name::EMPTY);
        };
        if let Some(Some(name)) = self.identifiers.get(index) {
            return Ok(*name);
        }
        let offset = *self
            .identifier_offsets
            .get(index)
            .ok_or_else(|| self.malformed(format!("identifier {id} out of range")))?;
        let start = usize::try_from(offset)
            .ok()
            .filter(|&s| s < self.identifier_blob.len())
            .ok_or_else(|| self.malformed(format!("identifier offset {offset} out of range")))?;
        let bytes = &self.identifier_blob[start..];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let text = std::str::from_utf8(&bytes[..end])
            .map_err(|_| self.malformed(format!("identifier {id} is not UTF-8")))?;
        let name = ctx.intern(text);
        self.identifiers[index] = Some(name);
        Ok(name)
    }

    /// Identifier as a string, without interning.
    pub(crate) fn identifier_str(&self, id: u64) -> Result<&str, LoadError> {
        let Some(index) = table_index(id) else {
            return Ok("");
        };
        let offset = *self
            .identifier_offsets
            .get(index)
            .ok_or_else(|| self.malformed(format!("identifier {id} out of range")))?;
        let bytes = usize::try_from(offset)
            .ok()
            .and_then(|s| self.identifier_blob.get(s..))
            .ok_or_else(|| self.malformed(format!("identifier offset {offset} out of range")))?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..end])
            .map_err(|_| self.malformed(format!("identifier {id} is not UTF-8")))
    }

    /// Entries of a name table; empty if the table is absent.
    pub fn index_entries(&self, kind: IndexKind, name: &str) -> Result<Vec<IndexEntry>, LoadError> {
        match self.tables.get(&kind) {
            Some(table) => table.lookup(name).map_err(|e| self.malformed(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    pub(crate) fn ir_entries(
        &self,
        table: IrTable,
        name: &str,
    ) -> Result<Vec<IndexEntry>, LoadError> {
        let table = match table {
            IrTable::Functions => &self.function_names,
            IrTable::Globals => &self.global_names,
            IrTable::VTables => &self.vtable_names,
            IrTable::WitnessTables => &self.witness_table_names,
        };
        match table {
            Some(table) => table.lookup(name).map_err(|e| self.malformed(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Name the module was requested under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the module was read from, if it came from disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// `(major, minor)` format version.
    pub fn format_version(&self) -> (u64, u64) {
        self.version
    }

    /// Version string of the compiler that wrote the file.
    pub fn compiler_version(&self) -> &str {
        &self.compiler_version
    }

    pub fn imports(&self) -> &[ImportInfo] {
        &self.imports
    }

    pub fn link_libraries(&self) -> &[LinkLibrary] {
        &self.link_libraries
    }

    pub fn source_files(&self) -> &[String] {
        &self.source_files
    }

    /// Name of the module this one shadows.
    pub fn shadowed_module(&self) -> Option<&str> {
        self.shadowed.as_deref()
    }

    pub fn status(&self) -> &FileStatus {
        &self.status
    }

    pub fn has_ir(&self) -> bool {
        self.ir_cursor.is_some()
    }

    pub fn decl_count(&self) -> usize {
        self.decls.len()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Records decoded from the decls and IR blocks so far.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }
}

/// IR name tables.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum IrTable {
    Functions,
    Globals,
    VTables,
    WitnessTables,
}

fn blob_string(record: &Record) -> String {
    record
        .blob
        .as_deref()
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests;
