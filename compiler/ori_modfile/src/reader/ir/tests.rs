use std::sync::Arc;

use ori_bitstream::Record;
use ori_sema::{Decl, DeclContext, DeclKind, NominalData, SemaContext};
use ori_tir::{TirModule, ValueDef};
use pretty_assertions::assert_eq;

use super::*;
use crate::module_file::{FileStatus, ModuleFile};
use crate::{serialize_module, WriterOptions};

/// A session over one opened file holding `struct Point`.
struct Parts {
    ctx: SemaContext,
    tir: TirModule,
    files: Vec<ModuleFile>,
    by_name: FxHashMap<String, usize>,
}

impl Parts {
    fn new() -> Self {
        let mut ctx = SemaContext::new();
        let module = ctx.add_module("Shapes");
        let name = ctx.intern("Point");
        let point = ctx.add_decl(Decl::new(
            name,
            DeclContext::Module(module),
            module,
            DeclKind::Struct(NominalData::default()),
        ));
        ctx.add_top_level(module, point);
        let bytes = serialize_module(&ctx, module, &WriterOptions::default())
            .unwrap_or_else(|e| panic!("serialization failed: {e}"));

        let mut ctx = SemaContext::new();
        let mut file = ModuleFile::open("Shapes", Arc::from(bytes), None)
            .unwrap_or_else(|e| panic!("open failed: {e}"));
        file.module = Some(ctx.add_module("Shapes"));
        let mut by_name = FxHashMap::default();
        by_name.insert("Shapes".to_owned(), 0);
        Parts {
            ctx,
            tir: TirModule::new(),
            files: vec![file],
            by_name,
        }
    }

    fn session(&mut self) -> ReadSession<'_> {
        ReadSession::new(&mut self.ctx, &mut self.tir, &mut self.files, &self.by_name)
    }
}

fn record(code: u32, fields: Vec<u64>) -> Record {
    Record {
        code,
        fields,
        blob: None,
    }
}

/// Decode one instruction record inside a body with a single open block.
fn decode(s: &mut ReadSession<'_>, record: Record) -> Result<InstKind, IrError> {
    let mut b = BodyBuilder::new(1);
    b.current = Some(b.block_for_definition(0)?);
    let fields = s.fields(0, record);
    s.in_body_scope(|s| s.read_inst(0, &mut b, fields))
}

fn int() -> TypeId {
    TypeId::new(0)
}

fn literal(value: i64) -> InstKind {
    InstKind::IntegerLiteral { ty: int(), value }
}

#[test]
fn forward_operand_is_patched_on_definition() {
    let mut b = BodyBuilder::new(1);
    b.current = Some(b.block_for_definition(0).unwrap_or_else(|e| panic!("{e}")));
    let forward = b.operand(1, 0).unwrap_or_else(|e| panic!("{e}"));
    b.push(InstKind::DebugValue { operand: forward })
        .unwrap_or_else(|e| panic!("{e}"));
    b.push(literal(3)).unwrap_or_else(|e| panic!("{e}"));
    let defined = b.operand(1, 0).unwrap_or_else(|e| panic!("{e}"));
    assert_ne!(defined, forward);
    b.push(InstKind::Return { operand: defined })
        .unwrap_or_else(|e| panic!("{e}"));

    let body = b.finish().unwrap_or_else(|e| panic!("{e}"));
    let block = &body.blocks[0];
    assert_eq!(block.insts[1].results[0], defined);
    assert_eq!(block.insts[0].kind, InstKind::DebugValue { operand: defined });
    assert_eq!(block.insts[2].kind, InstKind::Return { operand: defined });
    assert!(!body.has_uses(forward));
}

#[test]
fn same_forward_reference_shares_a_placeholder() {
    let mut b = BodyBuilder::new(1);
    let first = b.operand(4, 0).unwrap_or_else(|e| panic!("{e}"));
    let second = b.operand(4, 0).unwrap_or_else(|e| panic!("{e}"));
    let other_result = b.operand(4, 1).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(first, second);
    assert_ne!(first, other_result);
}

#[test]
fn value_never_defined_is_unresolved() {
    let mut b = BodyBuilder::new(1);
    b.current = Some(b.block_for_definition(0).unwrap_or_else(|e| panic!("{e}")));
    let dangling = b.operand(9, 0).unwrap_or_else(|e| panic!("{e}"));
    b.push(InstKind::Return { operand: dangling })
        .unwrap_or_else(|e| panic!("{e}"));
    assert!(matches!(
        b.finish(),
        Err(IrError::UnresolvedValue { id: 9, result: 0 })
    ));
}

#[test]
fn result_index_past_the_results_is_invalid() {
    let mut b = BodyBuilder::new(1);
    b.current = Some(b.block_for_definition(0).unwrap_or_else(|e| panic!("{e}")));
    b.push(literal(1)).unwrap_or_else(|e| panic!("{e}"));
    assert!(matches!(
        b.operand(1, 1),
        Err(IrError::InvalidField { value: 1, .. })
    ));
}

#[test]
fn block_index_out_of_range() {
    let mut b = BodyBuilder::new(2);
    assert!(matches!(
        b.block_for_definition(2),
        Err(IrError::BlockOutOfRange(2))
    ));
    assert!(matches!(
        b.block_for_reference(7),
        Err(IrError::BlockOutOfRange(7))
    ));
}

#[test]
fn block_referenced_but_not_defined() {
    let mut b = BodyBuilder::new(2);
    b.current = Some(b.block_for_definition(0).unwrap_or_else(|e| panic!("{e}")));
    let dest = b.block_for_reference(1).unwrap_or_else(|e| panic!("{e}"));
    b.push(InstKind::Branch {
        dest,
        args: Operands::new(),
    })
    .unwrap_or_else(|e| panic!("{e}"));
    assert!(matches!(b.finish(), Err(IrError::UndefinedBlock(1))));
}

#[test]
fn instruction_before_any_block() {
    let mut b = BodyBuilder::new(1);
    assert!(matches!(b.push(literal(0)), Err(IrError::NoCurrentBlock)));
}

#[test]
fn redefined_block_is_dropped() {
    let mut b = BodyBuilder::new(1);
    let entry = b.block_for_definition(0).unwrap_or_else(|e| panic!("{e}"));
    b.current = Some(entry);
    b.define_arg(entry, int());
    b.push(InstKind::Unreachable).unwrap_or_else(|e| panic!("{e}"));

    let duplicate = b.block_for_definition(0).unwrap_or_else(|e| panic!("{e}"));
    assert_ne!(duplicate, entry);
    b.current = Some(duplicate);
    b.define_arg(duplicate, int());
    b.push(literal(5)).unwrap_or_else(|e| panic!("{e}"));

    let body = b.finish().unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(body.blocks.len(), 1);
    assert_eq!(body.blocks[0].insts.len(), 1);
    let discarded = body
        .values
        .iter()
        .filter(|v| v.def == ValueDef::Discarded)
        .count();
    assert_eq!(discarded, 2);
}

#[test]
fn every_opcode_has_a_layout() {
    for &opcode in Opcode::ALL {
        let layout = layout_of(opcode);
        assert!((ir::INST_NO_OPERAND..=ir::INST_APPLY).contains(&layout));
    }
    assert_eq!(layout_of(Opcode::Return), ir::INST_ONE_OPERAND);
    assert_eq!(layout_of(Opcode::WitnessMethod), ir::INST_ONE_TYPE_VALUES);
}

#[test]
fn unknown_opcode_is_rejected() {
    let mut parts = Parts::new();
    let mut s = parts.session();
    let result = decode(&mut s, record(ir::INST_NO_OPERAND, vec![250, 0]));
    assert!(matches!(result, Err(IrError::UnknownOpcode(250))));
}

#[test]
fn opcode_in_the_wrong_layout_is_rejected() {
    let mut parts = Parts::new();
    let mut s = parts.session();
    let result = decode(
        &mut s,
        record(ir::INST_NO_OPERAND, vec![Opcode::Return as u64, 0]),
    );
    assert!(matches!(
        result,
        Err(IrError::WrongLayout { opcode: Opcode::Return, code }) if code == ir::INST_NO_OPERAND
    ));
}

#[test]
fn extra_operands_are_an_arity_error() {
    let mut parts = Parts::new();
    let mut s = parts.session();
    let result = decode(
        &mut s,
        record(ir::INST_ONE_OPERAND, vec![Opcode::Return as u64, 0, 1, 0, 2, 0]),
    );
    assert!(matches!(
        result,
        Err(IrError::Arity {
            opcode: Opcode::Return,
            expected: 1,
            found: 2,
        })
    ));
}

#[test]
fn bad_declaration_in_a_body_leaves_the_file_valid() {
    let mut parts = Parts::new();
    let mut s = parts.session();
    let result = decode(
        &mut s,
        record(
            ir::INST_ONE_OPERAND,
            vec![Opcode::InjectEnumAddr as u64, 9999, 1, 0],
        ),
    );
    assert!(matches!(
        result,
        Err(IrError::Load(LoadError::Malformed { .. }))
    ));
    assert_eq!(s.files[0].status(), &FileStatus::Valid);

    let point = s.files[0].top_level[0];
    let decl = s
        .resolve_decl(0, point)
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(s.ctx.decl_name(decl), "Point");
}

#[test]
fn bad_type_in_a_body_leaves_the_file_valid() {
    let mut parts = Parts::new();
    let mut s = parts.session();
    let result = decode(
        &mut s,
        record(ir::INST_ONE_TYPE, vec![Opcode::AllocStack as u64, 0, 9999]),
    );
    assert!(matches!(
        result,
        Err(IrError::Load(LoadError::Malformed { .. }))
    ));
    assert_eq!(s.files[0].status(), &FileStatus::Valid);
}

#[test]
fn block_count_is_bounded_by_the_file() {
    assert!(matches!(
        checked_block_count(1 << 40, 4096),
        Err(IrError::InvalidField {
            what: "block count",
            ..
        })
    ));
    assert_eq!(checked_block_count(3, 4096).ok(), Some(3));
}
