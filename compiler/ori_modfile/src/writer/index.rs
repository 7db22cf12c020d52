//! Name tables and the index block.

use ori_bitstream::Abbrev;
use ori_sema::{DeclId, DeclKind, DeclKindTag, KnownProtocol};
use rustc_hash::FxHashMap;

use crate::format::{block, index, SMALL_ABBREV_WIDTH};
use crate::name_index::{IndexEntry, NameIndexBuilder};
use crate::SerializeError;

use super::ModuleWriter;

/// Name tables built from a module's top-level declarations.
#[derive(Default)]
pub(super) struct IndexTables {
    top_level_values: NameIndexBuilder,
    operators: NameIndexBuilder,
    extensions: NameIndexBuilder,
    class_members: NameIndexBuilder,
    operator_methods: NameIndexBuilder,
    known_adopters: FxHashMap<KnownProtocol, Vec<u64>>,
}

impl ModuleWriter<'_> {
    /// Build the name tables. Runs before the decls block is written, so
    /// every declaration it mentions is already queued.
    pub(super) fn collect_index_tables(
        &mut self,
        top_level: &[DeclId],
    ) -> Result<IndexTables, SerializeError> {
        let ctx = self.ctx;
        let mut tables = IndexTables::default();
        for &d in top_level {
            let decl = ctx.decl(d);
            let id = self.decl_id(d)? as u32;
            let name = ctx.name_str(decl.name);
            self.collect_adopters(&mut tables, d, id);
            match &decl.kind {
                DeclKind::Extension(ext) => {
                    let Some(nominal) = ctx.nominal_of_type(ext.extended) else {
                        continue;
                    };
                    let nominal_tag = ctx.decl(nominal).tag();
                    tables.extensions.add(
                        ctx.decl_name(nominal),
                        IndexEntry::new(nominal_tag as u8, id),
                    );
                    let in_class = nominal_tag == DeclKindTag::Class;
                    self.collect_members(&mut tables, &ext.members, in_class)?;
                }
                DeclKind::Operator { fixity, .. } => {
                    tables.operators.add(name, IndexEntry::new(*fixity as u8, id));
                }
                _ => {
                    if !decl.name.is_empty() {
                        tables
                            .top_level_values
                            .add(name, IndexEntry::new(decl.tag() as u8, id));
                    }
                    if decl.tag().is_nominal_type() {
                        let is_class = decl.tag() == DeclKindTag::Class;
                        self.collect_members(&mut tables, decl.members(), is_class)?;
                    }
                }
            }
        }
        Ok(tables)
    }

    fn collect_members(
        &mut self,
        tables: &mut IndexTables,
        members: &[DeclId],
        in_class: bool,
    ) -> Result<(), SerializeError> {
        let ctx = self.ctx;
        for &m in members {
            let member = ctx.decl(m);
            let id = self.decl_id(m)? as u32;
            let name = ctx.name_str(member.name);
            let tag = member.tag();
            if in_class && !member.name.is_empty() {
                tables.class_members.add(name, IndexEntry::new(tag as u8, id));
            }
            if let DeclKind::Func(func) = &member.kind {
                if let Some(fixity) = func.operator {
                    tables
                        .operator_methods
                        .add(name, IndexEntry::new(fixity as u8, id));
                }
            }
            if tag.is_nominal_type() {
                self.collect_adopters(tables, m, id);
                self.collect_members(tables, member.members(), tag == DeclKindTag::Class)?;
            }
        }
        Ok(())
    }

    /// Record `decl` as an adopter of every known protocol it declares a
    /// conformance to.
    fn collect_adopters(&self, tables: &mut IndexTables, decl: DeclId, id: u32) {
        let ctx = self.ctx;
        for &c in ctx.decl(decl).conformances() {
            let known = ctx
                .conformance_protocol(c)
                .and_then(|p| match &ctx.decl(p).kind {
                    DeclKind::Protocol(proto) => proto.known,
                    _ => None,
                });
            if let Some(known) = known {
                tables
                    .known_adopters
                    .entry(known)
                    .or_default()
                    .push(u64::from(id));
            }
        }
    }

    pub(super) fn write_index_block(
        &mut self,
        top_level: &[u64],
        identifier_offsets: &[u64],
        tables: IndexTables,
    ) -> Result<(), SerializeError> {
        self.enter_block(block::INDEX, SMALL_ABBREV_WIDTH);
        let decl_offsets = std::mem::take(&mut self.decl_offsets);
        let type_offsets = std::mem::take(&mut self.type_offsets);
        self.record(index::DECL_OFFSETS, &decl_offsets)?;
        self.record(index::TYPE_OFFSETS, &type_offsets)?;
        self.record(index::IDENTIFIER_OFFSETS, identifier_offsets)?;
        self.record(index::TOP_LEVEL_DECLS, top_level)?;

        let IndexTables {
            top_level_values,
            operators,
            extensions,
            class_members,
            operator_methods,
            known_adopters,
        } = tables;
        for (code, builder) in [
            (index::TOP_LEVEL_VALUES, top_level_values),
            (index::OPERATORS, operators),
            (index::EXTENSIONS, extensions),
            (index::CLASS_MEMBERS, class_members),
            (index::OPERATOR_METHODS, operator_methods),
        ] {
            // An absent table reads as empty.
            if builder.is_empty() {
                continue;
            }
            let (blob, table_offset) = builder.finish()?;
            let abbrev = self.out.emit_abbrev(Abbrev::literal_with_blob(code, 1));
            self.out
                .emit_blob_record(abbrev, code, &[u64::from(table_offset)], &blob)?;
        }

        let mut adopters: Vec<_> = known_adopters.into_iter().collect();
        adopters.sort_by_key(|(known, _)| *known);
        for (known, ids) in adopters {
            let mut fields = Vec::with_capacity(ids.len() + 1);
            fields.push(known as u64);
            fields.extend(ids);
            self.record(index::KNOWN_PROTOCOL_ADOPTERS, &fields)?;
        }
        self.exit_block()
    }
}
