//! The IR block and its index.
//!
//! Every function, global, vtable and witness table is assigned an id
//! before anything is written, so function references inside bodies never
//! need a fixup. A body is written as `BASIC_BLOCK` records, each followed
//! by its instructions.
//!
//! Values are numbered per function, starting at 1: each block's arguments
//! in order, then every instruction that defines results gets one number.
//! An operand is the pair `(number, result index)`.

use ori_bitstream::Abbrev;
use ori_sema::{ConformanceRef, TypeId};
use ori_tir::{
    CallData, FunctionAttrs, FunctionBody, InstKind, Instruction, TirFunction, TirModule,
    ValueId, WitnessEntry,
};
use rustc_hash::FxHashMap;

use crate::format::{block, encode_signed, ir, ir_index, SMALL_ABBREV_WIDTH, WIDE_ABBREV_WIDTH};
use crate::name_index::{qualified_decl_name, witness_table_key, IndexEntry, NameIndexBuilder};
use crate::SerializeError;

use super::ModuleWriter;

/// Per-function value numbering.
struct ValueNumbering<'f> {
    numbers: FxHashMap<ValueId, (u64, u64)>,
    function: &'f str,
}

impl<'f> ValueNumbering<'f> {
    fn new(body: &FunctionBody, function: &'f str) -> Self {
        let mut numbers = FxHashMap::default();
        let mut next = 1u64;
        for block in &body.blocks {
            for &arg in &block.args {
                numbers.insert(arg, (next, 0));
                next += 1;
            }
            for inst in &block.insts {
                if inst.results.is_empty() {
                    continue;
                }
                for (index, &result) in inst.results.iter().enumerate() {
                    numbers.insert(result, (next, index as u64));
                }
                next += 1;
            }
        }
        ValueNumbering { numbers, function }
    }

    fn get(&self, value: ValueId) -> Result<(u64, u64), SerializeError> {
        self.numbers
            .get(&value)
            .copied()
            .ok_or_else(|| SerializeError::UndefinedValue {
                function: self.function.to_owned(),
            })
    }

    fn push(&self, fields: &mut Vec<u64>, value: ValueId) -> Result<(), SerializeError> {
        let (id, result) = self.get(value)?;
        fields.push(id);
        fields.push(result);
        Ok(())
    }

    fn push_all(&self, fields: &mut Vec<u64>, values: &[ValueId]) -> Result<(), SerializeError> {
        values.iter().try_for_each(|&v| self.push(fields, v))
    }
}

/// Bit offsets and name tables gathered while writing the IR block.
#[derive(Default)]
struct IrIndex {
    function_offsets: Vec<u64>,
    global_offsets: Vec<u64>,
    vtable_offsets: Vec<u64>,
    witness_table_offsets: Vec<u64>,
    function_names: NameIndexBuilder,
    global_names: NameIndexBuilder,
    vtable_names: NameIndexBuilder,
    witness_table_names: NameIndexBuilder,
}

impl ModuleWriter<'_> {
    pub(super) fn write_ir_blocks(&mut self, tir: &TirModule) -> Result<(), SerializeError> {
        for (id, _) in tir.functions() {
            self.function_id(id)?;
        }
        for (id, _) in tir.globals() {
            self.global_id(id)?;
        }
        for (id, _) in tir.vtables() {
            self.vtables.check_capacity()?;
            self.vtables.add_ref(id);
        }
        for (id, _) in tir.witness_tables() {
            self.witness_tables.check_capacity()?;
            self.witness_tables.add_ref(id);
        }

        let mut index = IrIndex::default();
        self.enter_block(block::IR, WIDE_ABBREV_WIDTH);
        for (id, func) in tir.functions() {
            index.function_offsets.push(self.out.bit_position());
            let disk = self.function_id(id)? as u32;
            index
                .function_names
                .add(self.ctx.name_str(func.name), IndexEntry::new(0, disk));
            self.write_function(func)?;
        }
        for (id, global) in tir.globals() {
            index.global_offsets.push(self.out.bit_position());
            let disk = self.global_id(id)? as u32;
            index
                .global_names
                .add(self.ctx.name_str(global.name), IndexEntry::new(0, disk));
            let fields = [
                global.linkage as u64,
                self.type_id(global.ty)?,
                self.ident(global.name)?,
                self.opt_decl_id(global.decl)?,
            ];
            self.record(ir::GLOBAL_VAR, &fields)?;
        }
        for (id, vtable) in tir.vtables() {
            index.vtable_offsets.push(self.out.bit_position());
            let disk = u64::from(self.vtables.add_ref(id));
            if let Some(name) = qualified_decl_name(self.ctx, vtable.class) {
                index.vtable_names.add(&name, IndexEntry::new(0, disk as u32));
            }
            let mut fields = vec![self.decl_id(vtable.class)?];
            for entry in &vtable.entries {
                fields.push(self.decl_id(entry.method)?);
                fields.push(self.function_id(entry.func)?);
            }
            self.record(ir::VTABLE, &fields)?;
        }
        for (id, table) in tir.witness_tables() {
            index.witness_table_offsets.push(self.out.bit_position());
            let disk = self.witness_tables.add_ref(id);
            if let Some(key) = witness_table_key(self.ctx, table.conformance) {
                index.witness_table_names.add(&key, IndexEntry::new(0, disk));
            }
            self.record(
                ir::WITNESS_TABLE,
                &[table.linkage as u64, table.entries.len() as u64],
            )?;
            self.write_conformance_ref(ConformanceRef::Concrete(table.conformance))?;
            for entry in &table.entries {
                self.write_witness_entry(entry)?;
            }
        }
        self.exit_block()?;

        tracing::debug!(
            functions = index.function_offsets.len(),
            globals = index.global_offsets.len(),
            vtables = index.vtable_offsets.len(),
            witness_tables = index.witness_table_offsets.len(),
            "IR block written"
        );
        self.write_ir_index_block(index)
    }

    fn write_function(&mut self, func: &TirFunction) -> Result<(), SerializeError> {
        let transparent = func.attrs.contains(FunctionAttrs::TRANSPARENT);
        let body = func
            .body
            .as_ref()
            .filter(|_| self.options.ir_bodies.includes(transparent));
        let fields = [
            func.linkage as u64,
            self.type_id(func.ty)?,
            self.ident(func.name)?,
            u64::from(func.attrs.bits()),
            self.opt_decl_id(func.decl)?,
            u64::from(body.is_none()),
            body.map_or(0, |b| b.blocks.len() as u64),
        ];
        self.record(ir::FUNCTION, &fields)?;
        let Some(body) = body else {
            return Ok(());
        };

        let ctx = self.ctx;
        let name = ctx.name_str(func.name);
        let values = ValueNumbering::new(body, name);
        for (index, block) in body.blocks.iter().enumerate() {
            let mut fields = Vec::with_capacity(block.args.len() + 1);
            fields.push(index as u64);
            for &arg in &block.args {
                let ty = body
                    .value(arg)
                    .ty
                    .ok_or_else(|| SerializeError::UndefinedValue {
                        function: name.to_owned(),
                    })?;
                fields.push(self.type_id(ty)?);
            }
            self.record(ir::BASIC_BLOCK, &fields)?;
            for inst in &block.insts {
                self.write_inst(&values, inst)?;
            }
        }
        Ok(())
    }

    fn write_inst(
        &mut self,
        values: &ValueNumbering<'_>,
        inst: &Instruction,
    ) -> Result<(), SerializeError> {
        let op = inst.opcode() as u64;
        match &inst.kind {
            InstKind::Unreachable => self.record(ir::INST_NO_OPERAND, &[op, 0]),

            InstKind::AllocStack { ty }
            | InstKind::AllocRef { ty }
            | InstKind::AllocBox { ty }
            | InstKind::Metatype { ty } => self.one_type(op, 0, *ty),
            InstKind::IntegerLiteral { ty, value } => self.one_type(op, encode_signed(*value), *ty),
            InstKind::FloatLiteral { ty, bits } => self.one_type(op, *bits, *ty),
            InstKind::StringLiteral { ty, value } => {
                let attr = self.ident(*value)?;
                self.one_type(op, attr, *ty)
            }
            InstKind::FunctionRef { ty, func } => {
                let attr = self.function_id(*func)?;
                self.one_type(op, attr, *ty)
            }
            InstKind::GlobalAddr { ty, global } => {
                let attr = self.global_id(*global)?;
                self.one_type(op, attr, *ty)
            }

            InstKind::DeallocStack { operand }
            | InstKind::DeallocRef { operand }
            | InstKind::DeallocBox { operand }
            | InstKind::DestroyAddr { addr: operand }
            | InstKind::RefCount { operand, .. }
            | InstKind::DeinitExistential { operand }
            | InstKind::DebugValue { operand }
            | InstKind::FixLifetime { operand }
            | InstKind::Return { operand }
            | InstKind::Throw { operand } => self.one_operand(values, op, 0, *operand),
            InstKind::InjectEnumAddr { operand, case } => {
                let attr = self.decl_id(*case)?;
                self.one_operand(values, op, attr, *operand)
            }

            InstKind::Load { ty, addr: operand }
            | InstKind::ProjectBox { ty, operand }
            | InstKind::CopyValue { ty, operand }
            | InstKind::Conversion { ty, operand, .. }
            | InstKind::OpenExistential { ty, operand }
            | InstKind::OpenExistentialRef { ty, operand }
            | InstKind::ValueMetatype { ty, operand } => {
                self.one_type_one_operand(values, op, 0, *ty, *operand)
            }
            InstKind::StructExtract { ty, operand, field }
            | InstKind::StructElementAddr { ty, operand, field } => {
                self.one_type_one_operand(values, op, u64::from(*field), *ty, *operand)
            }
            InstKind::TupleExtract { ty, operand, index }
            | InstKind::TupleElementAddr { ty, operand, index } => {
                self.one_type_one_operand(values, op, u64::from(*index), *ty, *operand)
            }
            InstKind::UncheckedEnumData { ty, operand, case }
            | InstKind::InitEnumDataAddr { ty, operand, case } => {
                let attr = self.decl_id(*case)?;
                self.one_type_one_operand(values, op, attr, *ty, *operand)
            }
            InstKind::ClassMethod {
                ty,
                operand,
                member,
            }
            | InstKind::SuperMethod {
                ty,
                operand,
                member,
            }
            | InstKind::DynamicMethod {
                ty,
                operand,
                member,
            } => {
                let attr = self.decl_id(*member)?;
                self.one_type_one_operand(values, op, attr, *ty, *operand)
            }
            InstKind::InitExistential {
                ty,
                operand,
                conformances,
            }
            | InstKind::InitExistentialRef {
                ty,
                operand,
                conformances,
            } => {
                let count = conformances.len() as u64;
                self.one_type_one_operand(values, op, count, *ty, *operand)?;
                for &conformance in conformances {
                    self.write_conformance_ref(conformance)?;
                }
                Ok(())
            }

            InstKind::Store { src, dest } => self.two_operands(values, op, 0, None, *src, *dest),
            InstKind::CopyAddr { src, dest, take } => {
                self.two_operands(values, op, u64::from(*take), None, *src, *dest)
            }
            InstKind::IndexAddr { ty, base, index } => {
                self.two_operands(values, op, 0, Some(*ty), *base, *index)
            }

            InstKind::Struct { ty, elements } | InstKind::Tuple { ty, elements } => {
                let mut fields = vec![op, 0, self.type_id(*ty)?];
                values.push_all(&mut fields, elements)?;
                self.record(ir::INST_ONE_TYPE_VALUES, &fields)
            }
            InstKind::Enum { ty, case, payload } => {
                let mut fields = vec![op, self.decl_id(*case)?, self.type_id(*ty)?];
                if let Some(payload) = payload {
                    values.push(&mut fields, *payload)?;
                }
                self.record(ir::INST_ONE_TYPE_VALUES, &fields)
            }
            InstKind::Branch { dest, args } => {
                let mut fields = vec![op, dest.index() as u64, 0];
                values.push_all(&mut fields, args)?;
                self.record(ir::INST_ONE_TYPE_VALUES, &fields)
            }
            InstKind::CondBranch {
                cond,
                true_dest,
                true_args,
                false_dest,
                false_args,
            } => {
                let mut fields = vec![op, 0, 0];
                values.push(&mut fields, *cond)?;
                fields.push(true_dest.index() as u64);
                fields.push(true_args.len() as u64);
                values.push_all(&mut fields, true_args)?;
                fields.push(false_dest.index() as u64);
                values.push_all(&mut fields, false_args)?;
                self.record(ir::INST_ONE_TYPE_VALUES, &fields)
            }
            InstKind::SwitchInt {
                operand,
                cases,
                default,
            } => {
                let mut fields = vec![op, 0, 0];
                values.push(&mut fields, *operand)?;
                fields.push(default.map_or(0, |b| b.index() as u64 + 1));
                for &(value, dest) in cases {
                    fields.push(encode_signed(value));
                    fields.push(dest.index() as u64);
                }
                self.record(ir::INST_ONE_TYPE_VALUES, &fields)
            }
            InstKind::SwitchEnum {
                operand,
                cases,
                default,
            } => {
                let mut fields = vec![op, 0, 0];
                values.push(&mut fields, *operand)?;
                fields.push(default.map_or(0, |b| b.index() as u64 + 1));
                for &(case, dest) in cases {
                    fields.push(self.decl_id(case)?);
                    fields.push(dest.index() as u64);
                }
                self.record(ir::INST_ONE_TYPE_VALUES, &fields)
            }
            InstKind::WitnessMethod {
                ty,
                lookup_type,
                member,
                conformance,
            } => {
                let fields = [
                    op,
                    self.decl_id(*member)?,
                    self.type_id(*ty)?,
                    self.type_id(*lookup_type)?,
                ];
                self.record(ir::INST_ONE_TYPE_VALUES, &fields)?;
                self.write_conformance_ref(*conformance)
            }

            InstKind::Apply(call) | InstKind::PartialApply(call) => {
                self.write_apply(values, op, call)
            }
            InstKind::Builtin {
                name,
                result_ty,
                substitutions,
                args,
            } => {
                let mut fields = vec![
                    op,
                    substitutions.len() as u64,
                    0,
                    self.type_id(*result_ty)?,
                    self.ident(*name)?,
                    0,
                ];
                values.push_all(&mut fields, args)?;
                self.record(ir::INST_APPLY, &fields)?;
                for sub in substitutions {
                    self.write_substitution(sub)?;
                }
                Ok(())
            }
        }
    }

    fn write_apply(
        &mut self,
        values: &ValueNumbering<'_>,
        op: u64,
        call: &CallData,
    ) -> Result<(), SerializeError> {
        let mut fields = vec![
            op,
            call.substitutions.len() as u64,
            self.type_id(call.callee_ty)?,
            self.type_id(call.result_ty)?,
        ];
        values.push(&mut fields, call.callee)?;
        values.push_all(&mut fields, &call.args)?;
        self.record(ir::INST_APPLY, &fields)?;
        for sub in &call.substitutions {
            self.write_substitution(sub)?;
        }
        Ok(())
    }

    fn one_type(&mut self, op: u64, attr: u64, ty: TypeId) -> Result<(), SerializeError> {
        let ty = self.type_id(ty)?;
        self.record(ir::INST_ONE_TYPE, &[op, attr, ty])
    }

    fn one_operand(
        &mut self,
        values: &ValueNumbering<'_>,
        op: u64,
        attr: u64,
        operand: ValueId,
    ) -> Result<(), SerializeError> {
        let (id, result) = values.get(operand)?;
        self.record(ir::INST_ONE_OPERAND, &[op, attr, id, result])
    }

    fn one_type_one_operand(
        &mut self,
        values: &ValueNumbering<'_>,
        op: u64,
        attr: u64,
        ty: TypeId,
        operand: ValueId,
    ) -> Result<(), SerializeError> {
        let ty = self.type_id(ty)?;
        let (id, result) = values.get(operand)?;
        self.record(ir::INST_ONE_TYPE_ONE_OPERAND, &[op, attr, ty, id, result])
    }

    fn two_operands(
        &mut self,
        values: &ValueNumbering<'_>,
        op: u64,
        attr: u64,
        ty: Option<TypeId>,
        first: ValueId,
        second: ValueId,
    ) -> Result<(), SerializeError> {
        let ty = self.opt_type_id(ty)?;
        let (v1, r1) = values.get(first)?;
        let (v2, r2) = values.get(second)?;
        self.record(ir::INST_TWO_OPERANDS, &[op, attr, ty, v1, r1, v2, r2])
    }

    fn write_witness_entry(&mut self, entry: &WitnessEntry) -> Result<(), SerializeError> {
        match entry {
            WitnessEntry::Method { requirement, func } => {
                let fields = [
                    self.decl_id(*requirement)?,
                    match func {
                        Some(f) => self.function_id(*f)?,
                        None => 0,
                    },
                ];
                self.record(ir::WITNESS_METHOD_ENTRY, &fields)
            }
            WitnessEntry::Base {
                protocol,
                conformance,
            } => {
                let protocol = self.decl_id(*protocol)?;
                self.record(ir::WITNESS_BASE_ENTRY, &[protocol])?;
                self.write_conformance_ref(ConformanceRef::Concrete(*conformance))
            }
            WitnessEntry::AssociatedType { assoc, ty } => {
                let fields = [self.decl_id(*assoc)?, self.type_id(*ty)?];
                self.record(ir::WITNESS_ASSOC_ENTRY, &fields)
            }
            WitnessEntry::AssociatedProtocol {
                assoc,
                protocol,
                conformance,
            } => {
                let fields = [self.decl_id(*assoc)?, self.decl_id(*protocol)?];
                self.record(ir::WITNESS_ASSOC_PROTOCOL_ENTRY, &fields)?;
                self.write_conformance_ref(*conformance)
            }
        }
    }

    fn write_ir_index_block(&mut self, index: IrIndex) -> Result<(), SerializeError> {
        self.enter_block(block::IR_INDEX, SMALL_ABBREV_WIDTH);
        self.record(ir_index::FUNCTION_OFFSETS, &index.function_offsets)?;
        self.record(ir_index::GLOBAL_OFFSETS, &index.global_offsets)?;
        self.record(ir_index::VTABLE_OFFSETS, &index.vtable_offsets)?;
        self.record(ir_index::WITNESS_TABLE_OFFSETS, &index.witness_table_offsets)?;
        for (code, builder) in [
            (ir_index::FUNCTION_NAMES, index.function_names),
            (ir_index::GLOBAL_NAMES, index.global_names),
            (ir_index::VTABLE_NAMES, index.vtable_names),
            (ir_index::WITNESS_TABLE_NAMES, index.witness_table_names),
        ] {
            if builder.is_empty() {
                continue;
            }
            let (blob, table_offset) = builder.finish()?;
            let abbrev = self.out.emit_abbrev(Abbrev::literal_with_blob(code, 1));
            self.out
                .emit_blob_record(abbrev, code, &[u64::from(table_offset)], &blob)?;
        }
        self.exit_block()
    }
}
