//! IR read back through the loader: functions, globals, vtables and
//! witness tables, each found by its key.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

use ori_modfile::{serialize_module_with_ir, IrBodies, LoaderConfig, ModuleLoader, WriterOptions};
use ori_sema::{
    BuiltinType, ConformanceState, Decl, DeclContext, DeclId, DeclKind, FuncData, FunctionFlags,
    ModuleId, NominalData, NormalConformance, ProtocolData, SemaContext, TypeId, TypeKind,
    ValueWitness,
};
use ori_tir::{
    FunctionBody, InstKind, Linkage, TirFunction, TirGlobal, TirModule, VTable, VTableEntry,
    WitnessEntry, WitnessTable,
};
use pretty_assertions::assert_eq;

fn top_level(ctx: &mut SemaContext, module: ModuleId, name: &str, kind: DeclKind) -> DeclId {
    let name = ctx.intern(name);
    let id = ctx.add_decl(Decl::new(name, DeclContext::Module(module), module, kind));
    ctx.add_top_level(module, id);
    id
}

fn member(ctx: &mut SemaContext, parent: DeclId, name: &str, kind: DeclKind) -> DeclId {
    let module = ctx.decl(parent).module;
    let name = ctx.intern(name);
    let id = ctx.add_decl(Decl::new(name, DeclContext::Decl(parent), module, kind));
    assert!(ctx.add_member(parent, id));
    id
}

fn unit_function_type(ctx: &mut SemaContext) -> TypeId {
    let unit = ctx.intern_type(TypeKind::Tuple(Vec::new()));
    ctx.intern_type(TypeKind::Function {
        input: unit,
        result: unit,
        flags: FunctionFlags::empty(),
    })
}

fn int64(ctx: &mut SemaContext) -> TypeId {
    ctx.intern_type(TypeKind::Builtin(BuiltinType::Integer { width: 64 }))
}

/// `Zoo` with a class `Animal { func speak() }`, a protocol
/// `Named { func name() }`, `struct Cat: Named`, a global `census` and IR
/// for all of them.
fn zoo(bodies: IrBodies) -> Vec<u8> {
    let mut ctx = SemaContext::new();
    let module = ctx.add_module("Zoo");

    let animal = top_level(
        &mut ctx,
        module,
        "Animal",
        DeclKind::Class {
            nominal: NominalData::default(),
            superclass: None,
        },
    );
    let speak = member(&mut ctx, animal, "speak", DeclKind::Func(FuncData::default()));

    let named = top_level(
        &mut ctx,
        module,
        "Named",
        DeclKind::Protocol(ProtocolData::default()),
    );
    let requirement = member(&mut ctx, named, "name", DeclKind::Func(FuncData::default()));
    let cat = top_level(&mut ctx, module, "Cat", DeclKind::Struct(NominalData::default()));
    let witness = member(&mut ctx, cat, "name", DeclKind::Func(FuncData::default()));
    let cat_ty = ctx.declared_type(cat);
    let mut normal = NormalConformance::shell(named, cat, cat, module);
    normal.conforming_type = Some(cat_ty);
    normal.value_witnesses.push(ValueWitness {
        requirement,
        witness: Some(witness),
        substitutions: Vec::new(),
    });
    normal.state = ConformanceState::Complete;
    let conformance = ctx.alloc_normal_conformance(normal);

    let fn_ty = unit_function_type(&mut ctx);
    let int = int64(&mut ctx);
    let mut tir = TirModule::new();

    let mut speak_fn = TirFunction::declaration(ctx.intern("Animal.speak"), Linkage::Public, fn_ty);
    speak_fn.decl = Some(speak);
    let mut body = FunctionBody::new();
    let entry = body.add_block();
    let answer = body.push_inst(entry, InstKind::IntegerLiteral { ty: int, value: 42 })[0];
    body.push_inst(entry, InstKind::Return { operand: answer });
    speak_fn.body = Some(body);
    let speak_fn = tir.add_function(speak_fn);

    let mut name_fn = TirFunction::declaration(ctx.intern("Cat.name"), Linkage::Hidden, fn_ty);
    name_fn.decl = Some(witness);
    let name_fn = tir.add_function(name_fn);

    tir.add_global(TirGlobal {
        name: ctx.intern("census"),
        linkage: Linkage::Public,
        ty: int,
        decl: None,
    });
    tir.add_vtable(VTable {
        class: animal,
        entries: vec![VTableEntry {
            method: speak,
            func: speak_fn,
        }],
    });
    tir.add_witness_table(WitnessTable {
        conformance,
        linkage: Linkage::Public,
        entries: vec![WitnessEntry::Method {
            requirement,
            func: Some(name_fn),
        }],
    });

    serialize_module_with_ir(
        &ctx,
        module,
        &tir,
        &WriterOptions::default().with_ir_bodies(bodies),
    )
    .expect("serialization failed")
}

fn loaded(bodies: IrBodies) -> (ModuleLoader, SemaContext, ori_modfile::ModuleHandle) {
    let mut loader = ModuleLoader::new(LoaderConfig::new().with_memory_module("Zoo", zoo(bodies)));
    let mut ctx = SemaContext::new();
    let handle = loader.load_module(&mut ctx, "Zoo").expect("Zoo should load");
    (loader, ctx, handle)
}

fn lookup_one(
    loader: &mut ModuleLoader,
    ctx: &mut SemaContext,
    handle: ori_modfile::ModuleHandle,
    name: &str,
) -> DeclId {
    let found = loader.lookup_value(ctx, handle, name).expect("lookup failed");
    assert_eq!(found.len(), 1, "{name} should resolve to one declaration");
    found[0]
}

#[test]
fn function_body_round_trips() {
    let (mut loader, mut ctx, zoo) = loaded(IrBodies::All);
    let func = loader
        .function_by_name(&mut ctx, zoo, "Animal.speak", false)
        .expect("read failed")
        .expect("Animal.speak is stored");
    let function = loader.ir().function(func);
    assert_eq!(ctx.name_str(function.name), "Animal.speak");
    assert_eq!(function.linkage, Linkage::Public);

    let body = function.body.as_ref().expect("the body was serialized");
    assert_eq!(body.blocks.len(), 1);
    let insts = &body.blocks[0].insts;
    assert_eq!(insts.len(), 2);
    let int = int64(&mut ctx);
    assert_eq!(insts[0].kind, InstKind::IntegerLiteral { ty: int, value: 42 });
    assert_eq!(
        insts[1].kind,
        InstKind::Return {
            operand: insts[0].results[0]
        }
    );

    let animal = lookup_one(&mut loader, &mut ctx, zoo, "Animal");
    let speak = ctx.decl(animal).members()[0];
    assert_eq!(loader.ir().function(func).decl, Some(speak));
}

#[test]
fn bodies_left_out_read_as_declarations() {
    let (mut loader, mut ctx, zoo) = loaded(IrBodies::None);
    let func = loader
        .function_by_name(&mut ctx, zoo, "Animal.speak", false)
        .expect("read failed")
        .expect("Animal.speak is stored");
    assert!(loader.ir().function(func).is_declaration());
}

#[test]
fn unknown_function_is_none() {
    let (mut loader, mut ctx, zoo) = loaded(IrBodies::All);
    let found = loader
        .function_by_name(&mut ctx, zoo, "Animal.purr", true)
        .expect("read failed");
    assert_eq!(found, None);
}

#[test]
fn global_is_found_by_name() {
    let (mut loader, mut ctx, zoo) = loaded(IrBodies::All);
    let global = loader
        .global_by_name(&mut ctx, zoo, "census")
        .expect("read failed")
        .expect("census is stored");
    let global = loader.ir().global(global);
    assert_eq!(ctx.name_str(global.name), "census");
    let int = int64(&mut ctx);
    assert_eq!(global.ty, int);
    assert_eq!(global.decl, None);
}

#[test]
fn vtable_is_found_by_class() {
    let (mut loader, mut ctx, zoo) = loaded(IrBodies::All);
    let animal = lookup_one(&mut loader, &mut ctx, zoo, "Animal");
    let speak = ctx.decl(animal).members()[0];

    let vtable = loader
        .vtable_for_class(&mut ctx, zoo, animal)
        .expect("read failed")
        .expect("Animal has a vtable");
    let vtable = loader.ir().vtable(vtable).clone();
    assert_eq!(vtable.class, animal);
    assert_eq!(vtable.entries.len(), 1);
    assert_eq!(vtable.entries[0].method, speak);
    let func = loader.ir().function(vtable.entries[0].func);
    assert_eq!(ctx.name_str(func.name), "Animal.speak");

    let cat = lookup_one(&mut loader, &mut ctx, zoo, "Cat");
    assert_eq!(loader.vtable_for_class(&mut ctx, zoo, cat).expect("read failed"), None);
}

#[test]
fn witness_table_is_found_by_conformance() {
    let (mut loader, mut ctx, zoo) = loaded(IrBodies::All);
    let cat = lookup_one(&mut loader, &mut ctx, zoo, "Cat");
    let named = lookup_one(&mut loader, &mut ctx, zoo, "Named");
    let requirement = ctx.decl(named).members()[0];
    let conformance = ctx
        .find_normal_conformance(cat, named, None)
        .expect("Cat conforms to Named");

    let table = loader
        .witness_table_for(&mut ctx, zoo, conformance)
        .expect("read failed")
        .expect("the conformance has a witness table");
    let table = loader.ir().witness_table(table).clone();
    assert_eq!(table.conformance, conformance);
    assert_eq!(table.linkage, Linkage::Public);
    let [WitnessEntry::Method {
        requirement: stored,
        func: Some(func),
    }] = table.entries.as_slice()
    else {
        panic!("unexpected entries: {:?}", table.entries);
    };
    assert_eq!(*stored, requirement);
    let func = loader.ir().function(*func);
    assert_eq!(ctx.name_str(func.name), "Cat.name");
    assert_eq!(func.linkage, Linkage::Hidden);
}

#[test]
fn functions_are_read_once() {
    let (mut loader, mut ctx, zoo) = loaded(IrBodies::All);
    let first = loader
        .function_by_name(&mut ctx, zoo, "Cat.name", true)
        .expect("read failed");
    let read = loader.file(zoo).records_read();
    let second = loader
        .function_by_name(&mut ctx, zoo, "Cat.name", true)
        .expect("read failed");
    assert_eq!(first, second);
    assert_eq!(loader.file(zoo).records_read(), read);
    assert_eq!(loader.ir().function_count(), 1);
}
