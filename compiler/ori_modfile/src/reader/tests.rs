use ori_sema::{
    BuiltinType, Decl, DeclContext, DeclKind, FunctionFlags, NominalData, TypeId, TypeKind,
};
use ori_tir::{
    FunctionAttrs, FunctionBody, InstKind, Linkage, Operands, TirFunction, TirModule,
};
use pretty_assertions::assert_eq;

use super::*;
use crate::module_file::{FunctionSlot, IrTable};
use crate::{serialize_module, serialize_module_with_ir, IrBodies, WriterOptions};

/// One opened file and everything a session borrows.
struct Fixture {
    ctx: SemaContext,
    tir: TirModule,
    files: Vec<ModuleFile>,
    by_name: FxHashMap<String, usize>,
}

impl Fixture {
    fn new(name: &str, bytes: Vec<u8>) -> Self {
        let mut ctx = SemaContext::new();
        let mut file = ModuleFile::open(name, Arc::from(bytes), None)
            .unwrap_or_else(|e| panic!("open failed: {e}"));
        file.module = Some(ctx.add_module(name));
        let mut by_name = FxHashMap::default();
        by_name.insert(name.to_owned(), 0);
        Fixture {
            ctx,
            tir: TirModule::new(),
            files: vec![file],
            by_name,
        }
    }

    fn read<T>(
        &mut self,
        f: impl FnOnce(&mut ReadSession<'_>) -> Result<T, LoadError>,
    ) -> Result<T, LoadError> {
        let mut session =
            ReadSession::new(&mut self.ctx, &mut self.tir, &mut self.files, &self.by_name);
        let value = f(&mut session)?;
        session.finish()?;
        Ok(value)
    }

    fn function_id(&self, name: &str) -> u64 {
        let entries = self.files[0]
            .ir_entries(IrTable::Functions, name)
            .unwrap_or_else(|e| panic!("{e}"));
        u64::from(entries[0].id)
    }

    fn slot(&self, id: u64) -> FunctionSlot {
        self.files[0].functions[(id - 1) as usize]
    }
}

fn top_level(ctx: &mut SemaContext, module: ModuleId, name: &str, kind: DeclKind) -> DeclId {
    let name = ctx.intern(name);
    let id = ctx.add_decl(Decl::new(name, DeclContext::Module(module), module, kind));
    ctx.add_top_level(module, id);
    id
}

/// `List` with a struct `Node` holding `var next: Node`.
fn linked() -> Vec<u8> {
    let mut ctx = SemaContext::new();
    let module = ctx.add_module("List");
    let node = top_level(&mut ctx, module, "Node", DeclKind::Struct(NominalData::default()));
    let node_ty = ctx.declared_type(node);
    let name = ctx.intern("next");
    let next = ctx.add_decl(Decl::new(
        name,
        DeclContext::Decl(node),
        module,
        DeclKind::Var {
            ty: Some(node_ty),
            is_let: false,
        },
    ));
    assert!(ctx.add_member(node, next));
    serialize_module(&ctx, module, &WriterOptions::default())
        .unwrap_or_else(|e| panic!("serialization failed: {e}"))
}

fn unit_function_type(ctx: &mut SemaContext) -> TypeId {
    let unit = ctx.intern_type(TypeKind::Tuple(Vec::new()));
    ctx.intern_type(TypeKind::Function {
        input: unit,
        result: unit,
        flags: FunctionFlags::empty(),
    })
}

fn function(ctx: &mut SemaContext, name: &str, body: FunctionBody) -> TirFunction {
    let ty = unit_function_type(ctx);
    let mut func = TirFunction::declaration(ctx.intern(name), Linkage::Public, ty);
    func.attrs = FunctionAttrs::empty();
    func.body = Some(body);
    func
}

fn with_ir(ctx: &SemaContext, module: ModuleId, tir: &TirModule) -> Vec<u8> {
    serialize_module_with_ir(
        ctx,
        module,
        tir,
        &WriterOptions::default().with_ir_bodies(IrBodies::All),
    )
    .unwrap_or_else(|e| panic!("serialization failed: {e}"))
}

/// `choose(flag)` whose second block returns a value the third defines.
///
/// ```text
/// bb0(flag): cond_br flag, bb1, bb2
/// bb1:       return x
/// bb2:       x = integer_literal 7; br bb1
/// ```
fn forward_reference() -> Vec<u8> {
    let mut ctx = SemaContext::new();
    let module = ctx.add_module("Flow");
    let flag_ty = ctx.intern_type(TypeKind::Builtin(BuiltinType::Integer { width: 1 }));
    let int = ctx.intern_type(TypeKind::Builtin(BuiltinType::Integer { width: 64 }));

    let mut body = FunctionBody::new();
    let bb0 = body.add_block();
    let bb1 = body.add_block();
    let bb2 = body.add_block();
    let flag = body.add_block_arg(bb0, flag_ty);
    let x = body.push_inst(bb2, InstKind::IntegerLiteral { ty: int, value: 7 })[0];
    body.push_inst(
        bb2,
        InstKind::Branch {
            dest: bb1,
            args: Operands::new(),
        },
    );
    body.push_inst(bb1, InstKind::Return { operand: x });
    body.push_inst(
        bb0,
        InstKind::CondBranch {
            cond: flag,
            true_dest: bb1,
            true_args: Operands::new(),
            false_dest: bb2,
            false_args: Operands::new(),
        },
    );

    let mut tir = TirModule::new();
    tir.add_function(function(&mut ctx, "choose", body));
    with_ir(&ctx, module, &tir)
}

#[test]
fn resolving_twice_reads_once() {
    let mut fx = Fixture::new("List", linked());
    let id = fx.files[0].top_level[0];
    let first = fx
        .read(|s| s.resolve_decl(0, id))
        .unwrap_or_else(|e| panic!("{e}"));
    let read = fx.files[0].records_read();
    let second = fx
        .read(|s| s.resolve_decl(0, id))
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(first, second);
    assert_eq!(fx.files[0].records_read(), read);
}

#[test]
fn self_referential_struct_keeps_its_identity() {
    let mut fx = Fixture::new("List", linked());
    let id = fx.files[0].top_level[0];
    let node = fx
        .read(|s| s.resolve_decl(0, id))
        .unwrap_or_else(|e| panic!("{e}"));

    let members = fx.ctx.decl(node).members().to_vec();
    assert_eq!(members.len(), 1);
    assert_eq!(fx.ctx.decl_name(members[0]), "next");
    let ty = fx
        .ctx
        .decl(members[0])
        .value_type()
        .unwrap_or_else(|| panic!("next has no type"));
    assert_eq!(
        fx.ctx.ty(ty),
        &TypeKind::Nominal {
            decl: node,
            parent: None
        }
    );
}

#[test]
fn out_of_range_id_poisons_the_file() {
    let mut fx = Fixture::new("List", linked());
    let err = fx
        .read(|s| s.resolve_decl(0, 10_000))
        .err()
        .unwrap_or_else(|| panic!("expected an error"));
    assert!(matches!(err, LoadError::Malformed { .. }), "unexpected error: {err}");
    assert!(matches!(fx.files[0].status(), FileStatus::Malformed(_)));

    let id = fx.files[0].top_level[0];
    let again = fx.read(|s| s.resolve_decl(0, id));
    assert!(matches!(again, Err(LoadError::Malformed { .. })));
}

#[test]
fn forward_value_reference_is_resolved() {
    let mut fx = Fixture::new("Flow", forward_reference());
    let id = fx.function_id("choose");
    let func = fx
        .read(|s| s.resolve_function(0, id))
        .unwrap_or_else(|e| panic!("{e}"));
    assert!(matches!(fx.slot(id), FunctionSlot::Complete(f) if f == func));

    let body = fx
        .tir
        .function(func)
        .body
        .as_ref()
        .unwrap_or_else(|| panic!("choose has no body"));
    assert_eq!(body.blocks.len(), 3);
    assert_eq!(body.blocks[0].args.len(), 1);
    assert!(matches!(
        body.blocks[0].insts[0].kind,
        InstKind::CondBranch { .. }
    ));

    let literal = &body.blocks[2].insts[0];
    assert!(matches!(
        literal.kind,
        InstKind::IntegerLiteral { value: 7, .. }
    ));
    assert_eq!(
        body.blocks[1].insts[0].kind,
        InstKind::Return {
            operand: literal.results[0]
        }
    );
}

#[test]
fn declaration_is_read_without_its_body() {
    let mut fx = Fixture::new("Flow", forward_reference());
    let id = fx.function_id("choose");
    let declared = fx
        .read(|s| s.resolve_function_decl(0, id))
        .unwrap_or_else(|e| panic!("{e}"));
    assert!(fx.tir.function(declared).is_declaration());
    assert_eq!(fx.ctx.name_str(fx.tir.function(declared).name), "choose");
    assert!(matches!(
        fx.slot(id),
        FunctionSlot::Declared { has_body: true, .. }
    ));

    let full = fx
        .read(|s| s.resolve_function(0, id))
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(declared, full);
    assert!(!fx.tir.function(full).is_declaration());
}

#[test]
fn unreadable_body_keeps_the_declaration() {
    let mut ctx = SemaContext::new();
    let other = ctx.add_module("Other");
    let module = ctx.add_module("Meta");
    let remote = top_level(
        &mut ctx,
        other,
        "Remote",
        DeclKind::Struct(NominalData::default()),
    );
    let remote_ty = ctx.declared_type(remote);
    let mut body = FunctionBody::new();
    let entry = body.add_block();
    let meta = body.push_inst(entry, InstKind::Metatype { ty: remote_ty })[0];
    body.push_inst(entry, InstKind::Return { operand: meta });
    let mut tir = TirModule::new();
    tir.add_function(function(&mut ctx, "describe", body));
    let bytes = with_ir(&ctx, module, &tir);

    // `Other` is never opened, so the body's type cannot be resolved.
    let mut fx = Fixture::new("Meta", bytes);
    let id = fx.function_id("describe");
    let func = fx
        .read(|s| s.resolve_function(0, id))
        .unwrap_or_else(|e| panic!("{e}"));
    assert!(fx.tir.function(func).is_declaration());
    assert!(matches!(fx.slot(id), FunctionSlot::BodyFailed(f) if f == func));
    assert_eq!(fx.files[0].status(), &FileStatus::Valid);

    let read = fx.files[0].records_read();
    let again = fx
        .read(|s| s.resolve_function(0, id))
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(again, func);
    assert_eq!(fx.files[0].records_read(), read);
}
