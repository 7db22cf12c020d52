use ori_sema::{
    BuiltinType, Decl, DeclContext, DeclKind, FuncData, FunctionFlags, ModuleId, NominalData,
    SemaContext, TypeId, TypeKind,
};
use ori_tir::{FunctionAttrs, FunctionBody, InstKind, Linkage, TirFunction, TirModule};
use pretty_assertions::assert_eq;

use super::*;
use crate::IrBodies;

fn top_level(ctx: &mut SemaContext, module: ModuleId, name: &str, kind: DeclKind) -> DeclId {
    let name = ctx.intern(name);
    let id = ctx.add_decl(Decl::new(name, DeclContext::Module(module), module, kind));
    ctx.add_top_level(module, id);
    id
}

fn var_of_type(ctx: &mut SemaContext, module: ModuleId, name: &str, ty: TypeId) -> DeclId {
    top_level(
        ctx,
        module,
        name,
        DeclKind::Var {
            ty: Some(ty),
            is_let: true,
        },
    )
}

fn unit_function_type(ctx: &mut SemaContext) -> TypeId {
    let unit = ctx.intern_type(TypeKind::Tuple(Vec::new()));
    ctx.intern_type(TypeKind::Function {
        input: unit,
        result: unit,
        flags: FunctionFlags::empty(),
    })
}

fn sample_module() -> (SemaContext, ModuleId) {
    let mut ctx = SemaContext::new();
    let module = ctx.add_module("Shapes");
    let point = top_level(
        &mut ctx,
        module,
        "Point",
        DeclKind::Struct(NominalData::default()),
    );
    let point_ty = ctx.declared_type(point);
    var_of_type(&mut ctx, module, "origin", point_ty);
    let int = ctx.intern_type(TypeKind::Builtin(BuiltinType::Integer { width: 64 }));
    var_of_type(&mut ctx, module, "count", int);
    (ctx, module)
}

fn serialize(ctx: &SemaContext, module: ModuleId) -> Vec<u8> {
    serialize_module(ctx, module, &WriterOptions::default())
        .unwrap_or_else(|e| panic!("serialization failed: {e}"))
}

#[test]
fn output_starts_with_magic() {
    let (ctx, module) = sample_module();
    let bytes = serialize(&ctx, module);
    assert_eq!(&bytes[..4], b"ORIM");
}

#[test]
fn serialization_is_deterministic() {
    let (ctx, module) = sample_module();
    assert_eq!(serialize(&ctx, module), serialize(&ctx, module));
}

#[test]
fn record_names_are_optional() {
    let (ctx, module) = sample_module();
    let named = serialize(&ctx, module);
    let bare = serialize_module(
        &ctx,
        module,
        &WriterOptions::default().with_record_names(false),
    )
    .unwrap_or_else(|e| panic!("serialization failed: {e}"));
    assert!(bare.len() < named.len());
}

#[test]
fn foreign_decl_in_unnamed_module_is_rejected() {
    let mut ctx = SemaContext::new();
    let anonymous = ctx.add_module("");
    let app = ctx.add_module("App");
    let hidden = top_level(
        &mut ctx,
        anonymous,
        "Hidden",
        DeclKind::Struct(NominalData::default()),
    );
    let hidden_ty = ctx.declared_type(hidden);
    var_of_type(&mut ctx, app, "value", hidden_ty);

    let err = serialize_module(&ctx, app, &WriterOptions::default())
        .err()
        .unwrap_or_else(|| panic!("expected an error"));
    assert!(
        matches!(&err, SerializeError::UnnamedModule { decl } if decl == "Hidden"),
        "unexpected error: {err}"
    );
}

#[test]
fn foreign_decl_in_local_scope_is_unreferenceable() {
    let mut ctx = SemaContext::new();
    let lib = ctx.add_module("Lib");
    let app = ctx.add_module("App");
    let func = top_level(&mut ctx, lib, "make", DeclKind::Func(FuncData::default()));
    let local_name = ctx.intern("Local");
    let local = ctx.add_decl(Decl::new(
        local_name,
        DeclContext::Decl(func),
        lib,
        DeclKind::Struct(NominalData::default()),
    ));
    let local_ty = ctx.declared_type(local);
    var_of_type(&mut ctx, app, "value", local_ty);

    let err = serialize_module(&ctx, app, &WriterOptions::default())
        .err()
        .unwrap_or_else(|| panic!("expected an error"));
    assert!(
        matches!(&err, SerializeError::Unreferenceable { decl, .. } if decl == "Local"),
        "unexpected error: {err}"
    );
}

fn transparent_function(ctx: &mut SemaContext, name: &str, body: FunctionBody) -> TirFunction {
    let ty = unit_function_type(ctx);
    let mut func = TirFunction::declaration(ctx.intern(name), Linkage::Public, ty);
    func.attrs = FunctionAttrs::TRANSPARENT;
    func.body = Some(body);
    func
}

#[test]
fn placeholder_operand_is_undefined_value() {
    let (mut ctx, module) = sample_module();
    let mut body = FunctionBody::new();
    let entry = body.add_block();
    let dangling = body.add_placeholder(None);
    body.push_inst(entry, InstKind::Return { operand: dangling });
    let mut tir = TirModule::new();
    tir.add_function(transparent_function(&mut ctx, "broken", body));

    let err = serialize_module_with_ir(&ctx, module, &tir, &WriterOptions::default())
        .err()
        .unwrap_or_else(|| panic!("expected an error"));
    assert!(
        matches!(&err, SerializeError::UndefinedValue { function } if function == "broken"),
        "unexpected error: {err}"
    );
}

#[test]
fn body_policy_controls_output() {
    let (mut ctx, module) = sample_module();
    let unit = ctx.intern_type(TypeKind::Tuple(Vec::new()));
    let mut body = FunctionBody::new();
    let entry = body.add_block();
    let arg = body.add_block_arg(entry, unit);
    body.push_inst(entry, InstKind::Return { operand: arg });
    let mut tir = TirModule::new();
    tir.add_function(transparent_function(&mut ctx, "identity", body));

    let write = |bodies| {
        serialize_module_with_ir(
            &ctx,
            module,
            &tir,
            &WriterOptions::default().with_ir_bodies(bodies),
        )
        .unwrap_or_else(|e| panic!("serialization failed: {e}"))
    };
    let none = write(IrBodies::None);
    let transparent = write(IrBodies::Transparent);
    let all = write(IrBodies::All);
    assert!(none.len() < transparent.len());
    assert_eq!(transparent, all);
}

#[test]
fn write_to_path_reports_io_errors() {
    let (ctx, module) = sample_module();
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let missing = dir.path().join("no-such-dir").join("Shapes.orim");
    let err = write_module_to_path(&ctx, module, None, &WriterOptions::default(), &missing)
        .err()
        .unwrap_or_else(|| panic!("expected an error"));
    assert!(matches!(err, SerializeError::Io { .. }), "unexpected error: {err}");

    let path = dir.path().join("Shapes.orim");
    write_module_to_path(&ctx, module, None, &WriterOptions::default(), &path)
        .unwrap_or_else(|e| panic!("write failed: {e}"));
    let on_disk = std::fs::read(&path).unwrap_or_else(|e| panic!("read failed: {e}"));
    assert_eq!(on_disk, serialize(&ctx, module));
}
