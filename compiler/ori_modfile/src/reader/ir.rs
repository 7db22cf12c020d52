//! IR functions, globals, vtables and witness tables.
//!
//! A function is installed in the IR module as a declaration as soon as it
//! is referenced, so a `function_ref` to a function whose body is still
//! being read resolves to the same id. Bodies are read separately and only
//! on request. A body that fails to decode is logged and dropped; the
//! function stays a declaration and its body is never read again.

use ori_sema::{ConformanceRef, TypeId};
use ori_tir::{
    BlockId, CallData, FuncId, FunctionAttrs, FunctionBody, GlobalId, InstKind, Linkage, Opcode,
    Operands, TirFunction, TirGlobal, VTable, VTableEntry, VTableId, ValueId, WitnessEntry,
    WitnessTable, WitnessTableId,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::format::{decode_signed, ir, table_index, WIDE_ABBREV_WIDTH};
use crate::module_file::{FunctionSlot, Section, Slot};
use crate::{IrError, LoadError};

use super::{Fields, ReadSession};

/// Record codes that continue a function body.
const BODY_CODES: &[u32] = &[
    ir::BASIC_BLOCK,
    ir::INST_NO_OPERAND,
    ir::INST_ONE_TYPE,
    ir::INST_ONE_OPERAND,
    ir::INST_ONE_TYPE_ONE_OPERAND,
    ir::INST_TWO_OPERANDS,
    ir::INST_ONE_TYPE_VALUES,
    ir::INST_APPLY,
];

/// Record layout each opcode is stored with.
fn layout_of(opcode: Opcode) -> u32 {
    use Opcode as O;
    match opcode {
        O::Unreachable => ir::INST_NO_OPERAND,
        O::AllocStack
        | O::AllocRef
        | O::AllocBox
        | O::Metatype
        | O::IntegerLiteral
        | O::FloatLiteral
        | O::StringLiteral
        | O::FunctionRef
        | O::GlobalAddr => ir::INST_ONE_TYPE,
        O::DeallocStack
        | O::DeallocRef
        | O::DeallocBox
        | O::DestroyAddr
        | O::StrongRetain
        | O::StrongRelease
        | O::RetainValue
        | O::ReleaseValue
        | O::UnownedRetain
        | O::UnownedRelease
        | O::DestroyValue
        | O::DeinitExistential
        | O::DebugValue
        | O::FixLifetime
        | O::Return
        | O::Throw
        | O::InjectEnumAddr => ir::INST_ONE_OPERAND,
        O::Load
        | O::ProjectBox
        | O::CopyValue
        | O::Upcast
        | O::UncheckedRefCast
        | O::UncheckedAddrCast
        | O::AddressToPointer
        | O::PointerToAddress
        | O::RefToRawPointer
        | O::RawPointerToRef
        | O::ConvertFunction
        | O::ThinToThickFunction
        | O::OpenExistential
        | O::OpenExistentialRef
        | O::ValueMetatype
        | O::StructExtract
        | O::StructElementAddr
        | O::TupleExtract
        | O::TupleElementAddr
        | O::UncheckedEnumData
        | O::InitEnumDataAddr
        | O::ClassMethod
        | O::SuperMethod
        | O::DynamicMethod
        | O::InitExistential
        | O::InitExistentialRef => ir::INST_ONE_TYPE_ONE_OPERAND,
        O::Store | O::CopyAddr | O::IndexAddr => ir::INST_TWO_OPERANDS,
        O::Struct
        | O::Tuple
        | O::Enum
        | O::Branch
        | O::CondBranch
        | O::SwitchInt
        | O::SwitchEnum
        | O::WitnessMethod => ir::INST_ONE_TYPE_VALUES,
        O::Apply | O::PartialApply | O::Builtin => ir::INST_APPLY,
    }
}

fn to_u32(what: &'static str, value: u64) -> Result<u32, IrError> {
    u32::try_from(value).map_err(|_| IrError::InvalidField { what, value })
}

/// Fail unless exactly `expected` operand pairs remain.
fn check_operands(opcode: Opcode, f: &Fields, expected: usize) -> Result<(), IrError> {
    if f.remaining() != expected * 2 {
        return Err(IrError::Arity {
            opcode,
            expected,
            found: f.remaining() / 2,
        });
    }
    Ok(())
}

/// A body's block count, if the rest of the file has room for that many
/// `BASIC_BLOCK` records.
fn checked_block_count(raw: u64, bits_left: u64) -> Result<usize, IrError> {
    usize::try_from(raw)
        .ok()
        .filter(|_| raw <= bits_left / u64::from(WIDE_ABBREV_WIDTH))
        .ok_or(IrError::InvalidField {
            what: "block count",
            value: raw,
        })
}

/// Rebuilds one function body from its numbered blocks and values.
struct BodyBuilder {
    body: FunctionBody,
    /// Block for each on-disk index, created up front.
    blocks: Vec<BlockId>,
    defined: Vec<bool>,
    /// Blocks standing in for redefinitions; removed when the body is done.
    disposable: Vec<BlockId>,
    current: Option<BlockId>,
    next_value: u64,
    values: FxHashMap<u64, SmallVec<[ValueId; 1]>>,
    placeholders: FxHashMap<(u64, u64), ValueId>,
}

impl BodyBuilder {
    fn new(block_count: usize) -> Self {
        let mut body = FunctionBody::new();
        let blocks = (0..block_count).map(|_| body.add_block()).collect();
        BodyBuilder {
            body,
            blocks,
            defined: vec![false; block_count],
            disposable: Vec::new(),
            current: None,
            next_value: 1,
            values: FxHashMap::default(),
            placeholders: FxHashMap::default(),
        }
    }

    fn block_for_definition(&mut self, index: u64) -> Result<BlockId, IrError> {
        let i = usize::try_from(index)
            .ok()
            .filter(|&i| i < self.blocks.len())
            .ok_or(IrError::BlockOutOfRange(index))?;
        if self.defined[i] {
            let block = self.body.add_block();
            self.disposable.push(block);
            return Ok(block);
        }
        self.defined[i] = true;
        Ok(self.blocks[i])
    }

    fn block_for_reference(&self, index: u64) -> Result<BlockId, IrError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.blocks.get(i).copied())
            .ok_or(IrError::BlockOutOfRange(index))
    }

    fn define_arg(&mut self, block: BlockId, ty: TypeId) {
        let arg = self.body.add_block_arg(block, ty);
        self.define(SmallVec::from_elem(arg, 1));
    }

    /// Number the next value-producing definition.
    fn define(&mut self, results: SmallVec<[ValueId; 1]>) {
        let number = self.next_value;
        self.next_value += 1;
        for (index, &value) in results.iter().enumerate() {
            if let Some(placeholder) = self.placeholders.remove(&(number, index as u64)) {
                self.body.replace_all_uses(placeholder, value);
            }
        }
        self.values.insert(number, results);
    }

    fn operand(&mut self, id: u64, result: u64) -> Result<ValueId, IrError> {
        if id == 0 {
            return Err(IrError::InvalidField {
                what: "value id",
                value: 0,
            });
        }
        if let Some(results) = self.values.get(&id) {
            return usize::try_from(result)
                .ok()
                .and_then(|r| results.get(r).copied())
                .ok_or(IrError::InvalidField {
                    what: "result index",
                    value: result,
                });
        }
        if let Some(&placeholder) = self.placeholders.get(&(id, result)) {
            return Ok(placeholder);
        }
        let placeholder = self.body.add_placeholder(None);
        self.placeholders.insert((id, result), placeholder);
        Ok(placeholder)
    }

    fn operands(&mut self, pairs: &[(u64, u64)]) -> Result<Operands, IrError> {
        pairs.iter().map(|&(id, r)| self.operand(id, r)).collect()
    }

    fn push(&mut self, kind: InstKind) -> Result<(), IrError> {
        let block = self.current.ok_or(IrError::NoCurrentBlock)?;
        let results = self.body.push_inst(block, kind);
        if !results.is_empty() {
            self.define(results);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<FunctionBody, IrError> {
        if let Some((&(id, result), _)) = self.placeholders.iter().min() {
            return Err(IrError::UnresolvedValue { id, result });
        }
        if let Some(index) = self.defined.iter().position(|&d| !d) {
            return Err(IrError::UndefinedBlock(index as u64));
        }
        self.body.remove_blocks(&self.disposable);
        Ok(self.body)
    }
}

impl ReadSession<'_> {
    // ── Functions ───────────────────────────────────────────────────

    /// Install function `id` of `file` as a declaration, without its body.
    pub(crate) fn resolve_function_decl(
        &mut self,
        file: usize,
        id: u64,
    ) -> Result<FuncId, LoadError> {
        let Some(index) = table_index(id) else {
            return Err(self.reject(file, "function id 0".to_owned()));
        };
        let offset = match self.files[file].functions.get(index) {
            Some(FunctionSlot::Unread(offset)) => *offset,
            Some(slot) => {
                if let Some(func) = slot.func() {
                    return Ok(func);
                }
                return Err(self.malformed(file, format!("function {id} is unreadable")));
            }
            None => return Err(self.reject(file, format!("function {id} is out of range"))),
        };
        let (function, has_body) = self.with_cursor_at(file, Section::Ir, offset, |s| {
            let mut f = s.expect(file, Section::Ir, ir::FUNCTION)?;
            let raw = f.next_u8("linkage")?;
            let linkage = Linkage::from_raw(raw)
                .ok_or_else(|| f.malformed(format!("unknown linkage {raw}")))?;
            let ty = s.resolve_type(file, f.next()?)?;
            let name = s.ident(file, f.next()?)?;
            let attrs = FunctionAttrs::from_bits_truncate(f.next_u8("function attributes")?);
            let decl = s.opt_decl(file, f.next()?)?;
            let is_declaration = f.next_bool()?;
            let mut function = TirFunction::declaration(name, linkage, ty);
            function.attrs = attrs;
            function.decl = decl;
            Ok((function, !is_declaration))
        })?;
        let func = self.tir.add_function(function);
        self.files[file].functions[index] = if has_body {
            FunctionSlot::Declared {
                func,
                has_body: true,
            }
        } else {
            FunctionSlot::Complete(func)
        };
        Ok(func)
    }

    /// Install function `id` of `file` with its body, if it has one that
    /// can be read.
    pub(crate) fn resolve_function(&mut self, file: usize, id: u64) -> Result<FuncId, LoadError> {
        let func = self.resolve_function_decl(file, id)?;
        let Some(index) = table_index(id) else {
            return Err(self.reject(file, "function id 0".to_owned()));
        };
        if !matches!(
            self.files[file].functions[index],
            FunctionSlot::Declared { has_body: true, .. }
        ) {
            return Ok(func);
        }
        // Another source already supplied this function.
        if self.tir.function(func).body.is_some() {
            self.files[file].functions[index] = FunctionSlot::Complete(func);
            return Ok(func);
        }

        let offset = self.files[file].function_offsets[index];
        let result = self.in_body_scope(|s| {
            s.with_cursor_at(file, Section::Ir, offset, |s| Ok(s.read_body(file)))
                .unwrap_or_else(|err| Err(IrError::Load(err)))
        });
        match result {
            Ok(body) => {
                debug!(
                    module = %self.files[file].name,
                    function = self.ctx.name_str(self.tir.function(func).name),
                    blocks = body.blocks.len(),
                    "function body read"
                );
                self.tir.function_mut(func).body = Some(body);
                self.files[file].functions[index] = FunctionSlot::Complete(func);
            }
            Err(err) => {
                warn!(
                    module = %self.files[file].name,
                    function = self.ctx.name_str(self.tir.function(func).name),
                    error = %err,
                    "function body could not be read; keeping the declaration"
                );
                self.files[file].functions[index] = FunctionSlot::BodyFailed(func);
            }
        }
        Ok(func)
    }

    /// Run `f` as part of reading a function body.
    fn in_body_scope<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let outer = std::mem::replace(&mut self.in_body, true);
        let value = f(self);
        self.in_body = outer;
        value
    }

    fn read_body(&mut self, file: usize) -> Result<FunctionBody, IrError> {
        let mut head = self.expect(file, Section::Ir, ir::FUNCTION)?;
        head.take(6)?;
        let block_count = head.next()?;
        let bits_left = self.files[file].bits_left(Section::Ir)?;
        let mut builder = BodyBuilder::new(checked_block_count(block_count, bits_left)?);
        while let Some(mut f) = self.peek(file, Section::Ir, BODY_CODES)? {
            if f.code() == ir::BASIC_BLOCK {
                let block = builder.block_for_definition(f.next()?)?;
                for ty in f.rest() {
                    let ty = self.resolve_type(file, ty)?;
                    builder.define_arg(block, ty);
                }
                builder.current = Some(block);
                continue;
            }
            let kind = self.read_inst(file, &mut builder, f)?;
            builder.push(kind)?;
        }
        builder.finish()
    }

    fn read_inst(
        &mut self,
        file: usize,
        b: &mut BodyBuilder,
        mut f: Fields,
    ) -> Result<InstKind, IrError> {
        let code = f.code();
        let raw = f.next()?;
        let opcode = u8::try_from(raw)
            .ok()
            .and_then(Opcode::from_raw)
            .ok_or(IrError::UnknownOpcode(raw))?;
        if layout_of(opcode) != code {
            return Err(IrError::WrongLayout { opcode, code });
        }
        let attr = f.next()?;

        Ok(match code {
            ir::INST_NO_OPERAND => InstKind::Unreachable,
            ir::INST_ONE_TYPE => self.read_one_type(file, opcode, attr, &mut f)?,
            ir::INST_ONE_OPERAND => {
                check_operands(opcode, &f, 1)?;
                let operand = b.operand(f.next()?, f.next()?)?;
                match opcode {
                    Opcode::DeallocStack => InstKind::DeallocStack { operand },
                    Opcode::DeallocRef => InstKind::DeallocRef { operand },
                    Opcode::DeallocBox => InstKind::DeallocBox { operand },
                    Opcode::DestroyAddr => InstKind::DestroyAddr { addr: operand },
                    Opcode::DeinitExistential => InstKind::DeinitExistential { operand },
                    Opcode::DebugValue => InstKind::DebugValue { operand },
                    Opcode::FixLifetime => InstKind::FixLifetime { operand },
                    Opcode::Return => InstKind::Return { operand },
                    Opcode::Throw => InstKind::Throw { operand },
                    Opcode::InjectEnumAddr => InstKind::InjectEnumAddr {
                        operand,
                        case: self.resolve_decl(file, attr)?,
                    },
                    _ => match opcode.ref_count() {
                        Some(op) => InstKind::RefCount { op, operand },
                        None => return Err(IrError::WrongLayout { opcode, code }),
                    },
                }
            }
            ir::INST_ONE_TYPE_ONE_OPERAND => {
                let ty = self.resolve_type(file, f.next()?)?;
                check_operands(opcode, &f, 1)?;
                let operand = b.operand(f.next()?, f.next()?)?;
                self.read_one_type_one_operand(file, opcode, attr, ty, operand)?
            }
            ir::INST_TWO_OPERANDS => {
                let ty = self.opt_type(file, f.next()?)?;
                check_operands(opcode, &f, 2)?;
                let first = b.operand(f.next()?, f.next()?)?;
                let second = b.operand(f.next()?, f.next()?)?;
                match opcode {
                    Opcode::Store => InstKind::Store {
                        src: first,
                        dest: second,
                    },
                    Opcode::CopyAddr => InstKind::CopyAddr {
                        src: first,
                        dest: second,
                        take: attr != 0,
                    },
                    _ => InstKind::IndexAddr {
                        ty: ty.ok_or(IrError::InvalidField {
                            what: "index_addr type",
                            value: 0,
                        })?,
                        base: first,
                        index: second,
                    },
                }
            }
            ir::INST_ONE_TYPE_VALUES => self.read_one_type_values(file, b, opcode, attr, &mut f)?,
            ir::INST_APPLY => self.read_apply(file, b, opcode, attr, &mut f)?,
            code => return Err(IrError::UnexpectedRecord { code }),
        })
    }

    fn read_one_type(
        &mut self,
        file: usize,
        opcode: Opcode,
        attr: u64,
        f: &mut Fields,
    ) -> Result<InstKind, IrError> {
        let ty = self.resolve_type(file, f.next()?)?;
        Ok(match opcode {
            Opcode::AllocStack => InstKind::AllocStack { ty },
            Opcode::AllocRef => InstKind::AllocRef { ty },
            Opcode::AllocBox => InstKind::AllocBox { ty },
            Opcode::Metatype => InstKind::Metatype { ty },
            Opcode::IntegerLiteral => InstKind::IntegerLiteral {
                ty,
                value: decode_signed(attr),
            },
            Opcode::FloatLiteral => InstKind::FloatLiteral { ty, bits: attr },
            Opcode::StringLiteral => InstKind::StringLiteral {
                ty,
                value: self.ident(file, attr)?,
            },
            Opcode::FunctionRef => InstKind::FunctionRef {
                ty,
                func: self.resolve_function_decl(file, attr)?,
            },
            Opcode::GlobalAddr => InstKind::GlobalAddr {
                ty,
                global: self.resolve_global(file, attr)?,
            },
            _ => {
                return Err(IrError::WrongLayout {
                    opcode,
                    code: ir::INST_ONE_TYPE,
                });
            }
        })
    }

    fn read_one_type_one_operand(
        &mut self,
        file: usize,
        opcode: Opcode,
        attr: u64,
        ty: TypeId,
        operand: ValueId,
    ) -> Result<InstKind, IrError> {
        Ok(match opcode {
            Opcode::Load => InstKind::Load { ty, addr: operand },
            Opcode::ProjectBox => InstKind::ProjectBox { ty, operand },
            Opcode::CopyValue => InstKind::CopyValue { ty, operand },
            Opcode::OpenExistential => InstKind::OpenExistential { ty, operand },
            Opcode::OpenExistentialRef => InstKind::OpenExistentialRef { ty, operand },
            Opcode::ValueMetatype => InstKind::ValueMetatype { ty, operand },
            Opcode::StructExtract => InstKind::StructExtract {
                ty,
                operand,
                field: to_u32("field index", attr)?,
            },
            Opcode::StructElementAddr => InstKind::StructElementAddr {
                ty,
                operand,
                field: to_u32("field index", attr)?,
            },
            Opcode::TupleExtract => InstKind::TupleExtract {
                ty,
                operand,
                index: to_u32("tuple index", attr)?,
            },
            Opcode::TupleElementAddr => InstKind::TupleElementAddr {
                ty,
                operand,
                index: to_u32("tuple index", attr)?,
            },
            Opcode::UncheckedEnumData => InstKind::UncheckedEnumData {
                ty,
                operand,
                case: self.resolve_decl(file, attr)?,
            },
            Opcode::InitEnumDataAddr => InstKind::InitEnumDataAddr {
                ty,
                operand,
                case: self.resolve_decl(file, attr)?,
            },
            Opcode::ClassMethod => InstKind::ClassMethod {
                ty,
                operand,
                member: self.resolve_decl(file, attr)?,
            },
            Opcode::SuperMethod => InstKind::SuperMethod {
                ty,
                operand,
                member: self.resolve_decl(file, attr)?,
            },
            Opcode::DynamicMethod => InstKind::DynamicMethod {
                ty,
                operand,
                member: self.resolve_decl(file, attr)?,
            },
            Opcode::InitExistential | Opcode::InitExistentialRef => {
                let mut conformances = Vec::new();
                for _ in 0..attr {
                    conformances.push(self.read_conformance_ref(file, Section::Ir)?);
                }
                if opcode == Opcode::InitExistential {
                    InstKind::InitExistential {
                        ty,
                        operand,
                        conformances,
                    }
                } else {
                    InstKind::InitExistentialRef {
                        ty,
                        operand,
                        conformances,
                    }
                }
            }
            _ => match opcode.conversion() {
                Some(op) => InstKind::Conversion { op, ty, operand },
                None => {
                    return Err(IrError::WrongLayout {
                        opcode,
                        code: ir::INST_ONE_TYPE_ONE_OPERAND,
                    });
                }
            },
        })
    }

    fn read_one_type_values(
        &mut self,
        file: usize,
        b: &mut BodyBuilder,
        opcode: Opcode,
        attr: u64,
        f: &mut Fields,
    ) -> Result<InstKind, IrError> {
        let ty = f.next()?;
        Ok(match opcode {
            Opcode::Struct | Opcode::Tuple => {
                let ty = self.resolve_type(file, ty)?;
                let elements = b.operands(&f.rest_pairs()?)?;
                if opcode == Opcode::Struct {
                    InstKind::Struct { ty, elements }
                } else {
                    InstKind::Tuple { ty, elements }
                }
            }
            Opcode::Enum => {
                let case = self.resolve_decl(file, attr)?;
                let ty = self.resolve_type(file, ty)?;
                let payload = match f.remaining() {
                    0 => None,
                    2 => Some(b.operand(f.next()?, f.next()?)?),
                    n => {
                        return Err(IrError::Arity {
                            opcode,
                            expected: 1,
                            found: n / 2,
                        });
                    }
                };
                InstKind::Enum { ty, case, payload }
            }
            Opcode::Branch => InstKind::Branch {
                dest: b.block_for_reference(attr)?,
                args: b.operands(&f.rest_pairs()?)?,
            },
            Opcode::CondBranch => {
                let cond = b.operand(f.next()?, f.next()?)?;
                let true_dest = b.block_for_reference(f.next()?)?;
                let n_true = f.next()?;
                let true_pairs = f.take(n_true.saturating_mul(2))?;
                let true_args = b.operands(&pairs(&true_pairs))?;
                let false_dest = b.block_for_reference(f.next()?)?;
                let false_args = b.operands(&f.rest_pairs()?)?;
                InstKind::CondBranch {
                    cond,
                    true_dest,
                    true_args,
                    false_dest,
                    false_args,
                }
            }
            Opcode::SwitchInt => {
                let operand = b.operand(f.next()?, f.next()?)?;
                let default = self.switch_default(b, f.next()?)?;
                let mut cases = Vec::new();
                for (value, dest) in f.rest_pairs()? {
                    cases.push((decode_signed(value), b.block_for_reference(dest)?));
                }
                InstKind::SwitchInt {
                    operand,
                    cases,
                    default,
                }
            }
            Opcode::SwitchEnum => {
                let operand = b.operand(f.next()?, f.next()?)?;
                let default = self.switch_default(b, f.next()?)?;
                let mut cases = Vec::new();
                for (case, dest) in f.rest_pairs()? {
                    cases.push((self.resolve_decl(file, case)?, b.block_for_reference(dest)?));
                }
                InstKind::SwitchEnum {
                    operand,
                    cases,
                    default,
                }
            }
            Opcode::WitnessMethod => {
                let member = self.resolve_decl(file, attr)?;
                let ty = self.resolve_type(file, ty)?;
                let lookup_type = self.resolve_type(file, f.next()?)?;
                let conformance = self.read_conformance_ref(file, Section::Ir)?;
                InstKind::WitnessMethod {
                    ty,
                    lookup_type,
                    member,
                    conformance,
                }
            }
            _ => {
                return Err(IrError::WrongLayout {
                    opcode,
                    code: ir::INST_ONE_TYPE_VALUES,
                });
            }
        })
    }

    /// Default destination stored as index + 1, or 0 for none.
    fn switch_default(&self, b: &BodyBuilder, raw: u64) -> Result<Option<BlockId>, IrError> {
        match raw.checked_sub(1) {
            Some(index) => b.block_for_reference(index).map(Some),
            None => Ok(None),
        }
    }

    fn read_apply(
        &mut self,
        file: usize,
        b: &mut BodyBuilder,
        opcode: Opcode,
        n_substitutions: u64,
        f: &mut Fields,
    ) -> Result<InstKind, IrError> {
        let callee_ty = f.next()?;
        let result_ty = self.resolve_type(file, f.next()?)?;
        let kind = if opcode == Opcode::Builtin {
            let name = self.ident(file, f.next()?)?;
            f.next()?;
            let args = b.operands(&f.rest_pairs()?)?;
            InstKind::Builtin {
                name,
                result_ty,
                substitutions: Vec::new(),
                args,
            }
        } else {
            let callee_ty = self.resolve_type(file, callee_ty)?;
            let callee = b.operand(f.next()?, f.next()?)?;
            let args = b.operands(&f.rest_pairs()?)?;
            let call = CallData {
                callee,
                callee_ty,
                result_ty,
                substitutions: Vec::new(),
                args,
            };
            if opcode == Opcode::Apply {
                InstKind::Apply(call)
            } else {
                InstKind::PartialApply(call)
            }
        };

        let mut substitutions = Vec::new();
        for _ in 0..n_substitutions {
            substitutions.push(self.read_substitution(file, Section::Ir)?);
        }
        Ok(match kind {
            InstKind::Builtin {
                name,
                result_ty,
                args,
                ..
            } => InstKind::Builtin {
                name,
                result_ty,
                substitutions,
                args,
            },
            InstKind::Apply(call) => InstKind::Apply(CallData {
                substitutions,
                ..call
            }),
            InstKind::PartialApply(call) => InstKind::PartialApply(CallData {
                substitutions,
                ..call
            }),
            other => other,
        })
    }

    // ── Globals and tables ──────────────────────────────────────────

    pub(crate) fn resolve_global(&mut self, file: usize, id: u64) -> Result<GlobalId, LoadError> {
        let Some(index) = table_index(id) else {
            return Err(self.reject(file, "global id 0".to_owned()));
        };
        let offset = match self.files[file].globals.get(index) {
            Some(Slot::Ready(global)) => return Ok(*global),
            Some(Slot::InProgress) => {
                return Err(self.malformed(file, format!("global {id} refers to itself")));
            }
            Some(Slot::Unread(offset)) => *offset,
            None => return Err(self.reject(file, format!("global {id} is out of range"))),
        };
        self.files[file].globals[index] = Slot::InProgress;
        let result = self.with_cursor_at(file, Section::Ir, offset, |s| {
            let mut f = s.expect(file, Section::Ir, ir::GLOBAL_VAR)?;
            let raw = f.next_u8("linkage")?;
            let linkage = Linkage::from_raw(raw)
                .ok_or_else(|| f.malformed(format!("unknown linkage {raw}")))?;
            let ty = s.resolve_type(file, f.next()?)?;
            let name = s.ident(file, f.next()?)?;
            let decl = s.opt_decl(file, f.next()?)?;
            Ok(s.tir.add_global(TirGlobal {
                name,
                linkage,
                ty,
                decl,
            }))
        });
        self.settle(file, |f| &mut f.globals[index], offset, result)
    }

    pub(crate) fn resolve_vtable(&mut self, file: usize, id: u64) -> Result<VTableId, LoadError> {
        let Some(index) = table_index(id) else {
            return Err(self.reject(file, "vtable id 0".to_owned()));
        };
        let offset = match self.files[file].vtables.get(index) {
            Some(Slot::Ready(vtable)) => return Ok(*vtable),
            Some(Slot::InProgress) => {
                return Err(self.malformed(file, format!("vtable {id} refers to itself")));
            }
            Some(Slot::Unread(offset)) => *offset,
            None => return Err(self.reject(file, format!("vtable {id} is out of range"))),
        };
        self.files[file].vtables[index] = Slot::InProgress;
        let result = self.with_cursor_at(file, Section::Ir, offset, |s| {
            let mut f = s.expect(file, Section::Ir, ir::VTABLE)?;
            let class = s.resolve_decl(file, f.next()?)?;
            let mut entries = Vec::new();
            for (method, func) in f.rest_pairs()? {
                entries.push(VTableEntry {
                    method: s.resolve_decl(file, method)?,
                    func: s.resolve_function_decl(file, func)?,
                });
            }
            Ok(s.tir.add_vtable(VTable { class, entries }))
        });
        self.settle(file, |f| &mut f.vtables[index], offset, result)
    }

    pub(crate) fn resolve_witness_table(
        &mut self,
        file: usize,
        id: u64,
    ) -> Result<WitnessTableId, LoadError> {
        let Some(index) = table_index(id) else {
            return Err(self.reject(file, "witness table id 0".to_owned()));
        };
        let offset = match self.files[file].witness_tables.get(index) {
            Some(Slot::Ready(table)) => return Ok(*table),
            Some(Slot::InProgress) => {
                return Err(self.malformed(file, format!("witness table {id} refers to itself")));
            }
            Some(Slot::Unread(offset)) => *offset,
            None => {
                return Err(self.reject(file, format!("witness table {id} is out of range")));
            }
        };
        self.files[file].witness_tables[index] = Slot::InProgress;
        let result = self.with_cursor_at(file, Section::Ir, offset, |s| s.read_witness_table(file));
        self.settle(file, |f| &mut f.witness_tables[index], offset, result)
    }

    fn read_witness_table(&mut self, file: usize) -> Result<WitnessTableId, LoadError> {
        let mut f = self.expect(file, Section::Ir, ir::WITNESS_TABLE)?;
        let raw = f.next_u8("linkage")?;
        let linkage =
            Linkage::from_raw(raw).ok_or_else(|| f.malformed(format!("unknown linkage {raw}")))?;
        let count = f.next()?;
        let ConformanceRef::Concrete(conformance) = self.read_conformance_ref(file, Section::Ir)?
        else {
            return Err(f.malformed("witness table for an abstract conformance"));
        };

        let mut entries = Vec::new();
        for _ in 0..count {
            let mut e = self.record(file, Section::Ir)?;
            entries.push(match e.code() {
                ir::WITNESS_METHOD_ENTRY => {
                    let requirement = self.resolve_decl(file, e.next()?)?;
                    let func = match e.next()? {
                        0 => None,
                        id => Some(self.resolve_function_decl(file, id)?),
                    };
                    WitnessEntry::Method { requirement, func }
                }
                ir::WITNESS_BASE_ENTRY => {
                    let protocol = self.resolve_decl(file, e.next()?)?;
                    match self.read_conformance_ref(file, Section::Ir)? {
                        ConformanceRef::Concrete(conformance) => WitnessEntry::Base {
                            protocol,
                            conformance,
                        },
                        ConformanceRef::Abstract { .. } => {
                            return Err(e.malformed("base witness is an abstract conformance"));
                        }
                    }
                }
                ir::WITNESS_ASSOC_ENTRY => WitnessEntry::AssociatedType {
                    assoc: self.resolve_decl(file, e.next()?)?,
                    ty: self.resolve_type(file, e.next()?)?,
                },
                ir::WITNESS_ASSOC_PROTOCOL_ENTRY => {
                    let assoc = self.resolve_decl(file, e.next()?)?;
                    let protocol = self.resolve_decl(file, e.next()?)?;
                    WitnessEntry::AssociatedProtocol {
                        assoc,
                        protocol,
                        conformance: self.read_conformance_ref(file, Section::Ir)?,
                    }
                }
                code => {
                    return Err(e.malformed(format!("record {code} is not a witness table entry")));
                }
            });
        }
        Ok(self.tir.add_witness_table(WitnessTable {
            conformance,
            linkage,
            entries,
        }))
    }

    /// Store the outcome of reading an IR table entity in its slot.
    fn settle<T: Copy>(
        &mut self,
        file: usize,
        slot: impl Fn(&mut crate::ModuleFile) -> &mut Slot<T>,
        offset: u64,
        result: Result<T, LoadError>,
    ) -> Result<T, LoadError> {
        match &result {
            Ok(value) => *slot(&mut self.files[file]) = Slot::Ready(*value),
            Err(err) => {
                *slot(&mut self.files[file]) = Slot::Unread(offset);
                self.poison(file, err);
            }
        }
        result
    }
}

fn pairs(fields: &[u64]) -> Vec<(u64, u64)> {
    fields.chunks_exact(2).map(|p| (p[0], p[1])).collect()
}

#[cfg(test)]
mod tests;
