//! Module serializer.
//!
//! Flattens one module of a [`SemaContext`] (and optionally its IR) into a
//! module file.
//!
//! # Entry Points
//!
//! - [`serialize_module`]: declarations and types only
//! - [`serialize_module_with_ir`]: plus functions, globals, vtables and
//!   witness tables
//! - [`write_module_to_path`]: serialize and write to disk
//!
//! # Architecture
//!
//! [`ModuleWriter`] owns the bitstream and one [`IdTable`] per entity kind.
//! Referencing an entity assigns it an id and queues it; the decls block is
//! written by draining the declaration and type worklists until both are
//! empty. Records of the decls and IR blocks are written through
//! block-info abbreviations so the reader can jump into the middle of
//! either block.
//!
//! - `decls.rs`: declaration records and their trailing records
//! - `types.rs`: type records
//! - `conformance.rs`: conformance, substitution and requirement records
//! - `xref.rs`: cross-references to other modules' declarations
//! - `ir.rs`: the IR and IR index blocks
//! - `index.rs`: name tables and the index block

mod conformance;
mod decls;
mod index;
mod ir;
mod types;
mod xref;

use std::path::Path;

use ori_bitstream::{Abbrev, BitstreamWriter};
use ori_sema::{DeclId, ModuleId, Name, SemaContext, TypeId};
use ori_tir::{FuncId, GlobalId, TirModule, VTableId, WitnessTableId};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::format::{
    block, common, control, identifier, input, ir as ir_code, type_code, xref as xref_code,
    COMMON_RECORD_NAMES, DECLS_RECORD_NAMES, IR_RECORD_NAMES, MAGIC, MODULE_ABBREV_WIDTH,
    SMALL_ABBREV_WIDTH, VERSION_MAJOR, VERSION_MINOR, WIDE_ABBREV_WIDTH,
};
use crate::id_table::IdTable;
use crate::{SerializeError, WriterOptions};

/// Serialize `module` without IR.
pub fn serialize_module(
    ctx: &SemaContext,
    module: ModuleId,
    options: &WriterOptions,
) -> Result<Vec<u8>, SerializeError> {
    ModuleWriter::new(ctx, module, None, options).write()
}

/// Serialize `module` together with the IR in `tir`.
pub fn serialize_module_with_ir(
    ctx: &SemaContext,
    module: ModuleId,
    tir: &TirModule,
    options: &WriterOptions,
) -> Result<Vec<u8>, SerializeError> {
    ModuleWriter::new(ctx, module, Some(tir), options).write()
}

/// Serialize `module` (with IR, if given) and write it to `path`.
pub fn write_module_to_path(
    ctx: &SemaContext,
    module: ModuleId,
    tir: Option<&TirModule>,
    options: &WriterOptions,
    path: &Path,
) -> Result<(), SerializeError> {
    let bytes = ModuleWriter::new(ctx, module, tir, options).write()?;
    std::fs::write(path, bytes).map_err(|source| SerializeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Single-use serializer for one module.
pub(crate) struct ModuleWriter<'a> {
    ctx: &'a SemaContext,
    module: ModuleId,
    tir: Option<&'a TirModule>,
    options: &'a WriterOptions,
    out: BitstreamWriter,

    decls: IdTable<DeclId>,
    types: IdTable<TypeId>,
    identifiers: IdTable<Name>,
    decl_offsets: Vec<u64>,
    type_offsets: Vec<u64>,

    functions: IdTable<FuncId>,
    globals: IdTable<GlobalId>,
    vtables: IdTable<VTableId>,
    witness_tables: IdTable<WitnessTableId>,

    /// Block-info abbreviation per `(block, record code)`.
    abbrevs: FxHashMap<(u32, u32), u32>,
    /// Block whose abbreviations [`record`](Self::record) uses.
    current_block: u32,
}

impl<'a> ModuleWriter<'a> {
    fn new(
        ctx: &'a SemaContext,
        module: ModuleId,
        tir: Option<&'a TirModule>,
        options: &'a WriterOptions,
    ) -> Self {
        ModuleWriter {
            ctx,
            module,
            tir,
            options,
            out: BitstreamWriter::new(),
            decls: IdTable::new("declaration"),
            types: IdTable::new("type"),
            identifiers: IdTable::new("identifier"),
            decl_offsets: Vec::new(),
            type_offsets: Vec::new(),
            functions: IdTable::new("IR function"),
            globals: IdTable::new("IR global"),
            vtables: IdTable::new("vtable"),
            witness_tables: IdTable::new("witness table"),
            abbrevs: FxHashMap::default(),
            current_block: block::MODULE,
        }
    }

    fn write(mut self) -> Result<Vec<u8>, SerializeError> {
        let module_name = self.ctx.module_name(self.module).to_owned();
        debug!(module = %module_name, "serializing module");

        for byte in MAGIC {
            self.out.emit(u32::from(byte), 8);
        }
        self.out.enter_subblock(block::MODULE, MODULE_ABBREV_WIDTH);
        self.write_block_info()?;
        self.write_control_block()?;
        self.write_input_block()?;

        // Every top-level declaration gets an id before anything else so
        // the top-level list and the name tables see stable ids.
        let top_level = self.ctx.module(self.module).top_level.clone();
        let top_level_ids = top_level
            .iter()
            .map(|&d| self.decl_id(d))
            .collect::<Result<Vec<_>, _>>()?;
        let index_tables = self.collect_index_tables(&top_level)?;

        if let Some(tir) = self.tir {
            self.write_ir_blocks(tir)?;
        }
        self.write_decls_block()?;
        let identifier_offsets = self.write_identifier_block()?;
        self.write_index_block(&top_level_ids, &identifier_offsets, index_tables)?;

        self.out.exit_block()?;
        debug!(
            module = %module_name,
            decls = self.decls.len(),
            types = self.types.len(),
            identifiers = self.identifiers.len(),
            "module serialized"
        );
        Ok(self.out.finish()?)
    }

    // ── Record emission ─────────────────────────────────────────────

    /// Emit a record in the current block, through its block-info
    /// abbreviation when there is one.
    fn record(&mut self, code: u32, fields: &[u64]) -> Result<(), SerializeError> {
        match self.abbrevs.get(&(self.current_block, code)) {
            Some(&abbrev) => self
                .out
                .emit_record_with_abbrev(abbrev, code, fields, None)?,
            None => self.out.emit_record(code, fields),
        }
        Ok(())
    }

    fn enter_block(&mut self, block_id: u32, width: u32) {
        self.out.enter_subblock(block_id, width);
        self.current_block = block_id;
    }

    fn exit_block(&mut self) -> Result<(), SerializeError> {
        self.out.exit_block()?;
        self.current_block = block::MODULE;
        Ok(())
    }

    // ── Ids ─────────────────────────────────────────────────────────

    fn decl_id(&mut self, decl: DeclId) -> Result<u64, SerializeError> {
        self.decls.check_capacity()?;
        Ok(u64::from(self.decls.add_ref(decl)))
    }

    fn opt_decl_id(&mut self, decl: Option<DeclId>) -> Result<u64, SerializeError> {
        decl.map_or(Ok(0), |d| self.decl_id(d))
    }

    fn type_id(&mut self, ty: TypeId) -> Result<u64, SerializeError> {
        self.types.check_capacity()?;
        Ok(u64::from(self.types.add_ref(ty)))
    }

    fn opt_type_id(&mut self, ty: Option<TypeId>) -> Result<u64, SerializeError> {
        ty.map_or(Ok(0), |t| self.type_id(t))
    }

    /// Identifier id of `name`; 0 for the empty name.
    fn ident(&mut self, name: Name) -> Result<u64, SerializeError> {
        if name.is_empty() {
            return Ok(0);
        }
        self.identifiers.check_capacity()?;
        Ok(u64::from(self.identifiers.add_ref(name)))
    }

    /// 0 for the module being written, else the identifier of the
    /// module's name.
    fn module_ref(&mut self, module: ModuleId, decl: DeclId) -> Result<u64, SerializeError> {
        if module == self.module {
            return Ok(0);
        }
        let name = self.ctx.module(module).name;
        if name.is_empty() {
            return Err(SerializeError::UnnamedModule {
                decl: self.ctx.decl_name(decl).to_owned(),
            });
        }
        self.ident(name)
    }

    fn function_id(&mut self, func: FuncId) -> Result<u64, SerializeError> {
        self.functions.check_capacity()?;
        Ok(u64::from(self.functions.add_ref(func)))
    }

    fn global_id(&mut self, global: GlobalId) -> Result<u64, SerializeError> {
        self.globals.check_capacity()?;
        Ok(u64::from(self.globals.add_ref(global)))
    }

    // ── Blocks ──────────────────────────────────────────────────────

    fn write_block_info(&mut self) -> Result<(), SerializeError> {
        self.out.enter_blockinfo_block();
        let names = [
            (block::MODULE, "MODULE_BLOCK"),
            (block::CONTROL, "CONTROL_BLOCK"),
            (block::INPUT, "INPUT_BLOCK"),
            (block::DECLS_AND_TYPES, "DECLS_AND_TYPES_BLOCK"),
            (block::IDENTIFIER_DATA, "IDENTIFIER_DATA_BLOCK"),
            (block::INDEX, "INDEX_BLOCK"),
            (block::IR, "IR_BLOCK"),
            (block::IR_INDEX, "IR_INDEX_BLOCK"),
        ];
        if self.options.record_names {
            for (id, name) in names {
                self.out.emit_block_name(id, name);
            }
            for &(code, name) in DECLS_RECORD_NAMES.iter().chain(COMMON_RECORD_NAMES) {
                self.out.emit_record_name(block::DECLS_AND_TYPES, code, name);
            }
            for &(code, name) in IR_RECORD_NAMES.iter().chain(COMMON_RECORD_NAMES) {
                self.out.emit_record_name(block::IR, code, name);
            }
        }

        let decl_codes = (1..=18)
            .chain(type_code::BUILTIN..=type_code::SUBSTITUTED)
            .chain(xref_code::XREF..=xref_code::GENERIC_PARAM_PIECE)
            .chain(common::ABSTRACT_CONFORMANCE..=common::LAST_GENERIC_REQUIREMENT);
        for code in decl_codes {
            let id = self
                .out
                .emit_blockinfo_abbrev(block::DECLS_AND_TYPES, Abbrev::literal_array(code));
            self.abbrevs.insert((block::DECLS_AND_TYPES, code), id);
        }
        let ir_codes = (ir_code::FUNCTION..=ir_code::WITNESS_ASSOC_PROTOCOL_ENTRY)
            .chain(common::ABSTRACT_CONFORMANCE..=common::LAST_GENERIC_REQUIREMENT);
        for code in ir_codes {
            let id = self
                .out
                .emit_blockinfo_abbrev(block::IR, Abbrev::literal_array(code));
            self.abbrevs.insert((block::IR, code), id);
        }
        self.out.exit_block()?;
        Ok(())
    }

    fn write_control_block(&mut self) -> Result<(), SerializeError> {
        let ctx = self.ctx;
        let data = ctx.module(self.module);
        self.enter_block(block::CONTROL, SMALL_ABBREV_WIDTH);
        let metadata = self
            .out
            .emit_abbrev(Abbrev::literal_with_blob(control::METADATA, 2));
        let name = self
            .out
            .emit_abbrev(Abbrev::literal_with_blob(control::MODULE_NAME, 0));
        self.out.emit_blob_record(
            metadata,
            control::METADATA,
            &[VERSION_MAJOR, VERSION_MINOR],
            self.options.compiler_version.as_bytes(),
        )?;
        self.out.emit_blob_record(
            name,
            control::MODULE_NAME,
            &[],
            ctx.name_str(data.name).as_bytes(),
        )?;
        if let Some(shadowed) = data.shadows {
            let abbrev = self
                .out
                .emit_abbrev(Abbrev::literal_with_blob(control::SHADOWED_MODULE, 0));
            self.out.emit_blob_record(
                abbrev,
                control::SHADOWED_MODULE,
                &[],
                ctx.name_str(shadowed).as_bytes(),
            )?;
        }
        self.exit_block()
    }

    fn write_input_block(&mut self) -> Result<(), SerializeError> {
        let ctx = self.ctx;
        let data = ctx.module(self.module);
        self.enter_block(block::INPUT, SMALL_ABBREV_WIDTH);
        let import = self
            .out
            .emit_abbrev(Abbrev::literal_with_blob(input::IMPORTED_MODULE, 1));
        let library = self
            .out
            .emit_abbrev(Abbrev::literal_with_blob(input::LINK_LIBRARY, 1));
        let source = self
            .out
            .emit_abbrev(Abbrev::literal_with_blob(input::SOURCE_FILE, 0));
        for imported in &data.imports {
            self.out.emit_blob_record(
                import,
                input::IMPORTED_MODULE,
                &[u64::from(imported.exported)],
                ctx.module_name(imported.module).as_bytes(),
            )?;
        }
        for lib in &data.link_libraries {
            self.out.emit_blob_record(
                library,
                input::LINK_LIBRARY,
                &[lib.kind as u64],
                lib.name.as_bytes(),
            )?;
        }
        for file in &data.source_files {
            self.out
                .emit_blob_record(source, input::SOURCE_FILE, &[], file.as_bytes())?;
        }
        self.exit_block()
    }

    fn write_decls_block(&mut self) -> Result<(), SerializeError> {
        self.enter_block(block::DECLS_AND_TYPES, WIDE_ABBREV_WIDTH);
        loop {
            if let Some(decl) = self.decls.pop_next() {
                self.decl_offsets.push(self.out.bit_position());
                self.write_decl(decl)?;
            } else if let Some(ty) = self.types.pop_next() {
                self.type_offsets.push(self.out.bit_position());
                self.write_type(ty)?;
            } else {
                break;
            }
        }
        debug_assert!(self.decls.is_drained() && self.types.is_drained());
        self.exit_block()
    }

    /// Identifier blob: byte 0 reserved, then NUL-terminated strings in id
    /// order.
    fn write_identifier_block(&mut self) -> Result<Vec<u64>, SerializeError> {
        let mut blob = vec![0u8];
        let mut offsets = Vec::with_capacity(self.identifiers.len());
        for &name in self.identifiers.entries() {
            offsets.push(blob.len() as u64);
            blob.extend_from_slice(self.ctx.name_str(name).as_bytes());
            blob.push(0);
        }
        self.enter_block(block::IDENTIFIER_DATA, SMALL_ABBREV_WIDTH);
        let abbrev = self
            .out
            .emit_abbrev(Abbrev::literal_with_blob(identifier::IDENTIFIER_DATA, 0));
        self.out
            .emit_blob_record(abbrev, identifier::IDENTIFIER_DATA, &[], &blob)?;
        self.exit_block()?;
        Ok(offsets)
    }
}

#[cfg(test)]
mod tests;
