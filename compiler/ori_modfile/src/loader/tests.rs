use std::sync::Arc;

use ori_sema::{
    Associativity, BuiltinType, Decl, DeclContext, DeclKind, ExtensionData, FuncData,
    ImportedModule, LinkLibraryKind, NominalData, SemaContext, TypeId, TypeKind,
};
use pretty_assertions::assert_eq;

use super::*;
use crate::{serialize_module, serialize_module_doc, WriterOptions};

fn top_level(ctx: &mut SemaContext, module: ModuleId, name: &str, kind: DeclKind) -> DeclId {
    let name = ctx.intern(name);
    let id = ctx.add_decl(Decl::new(name, DeclContext::Module(module), module, kind));
    ctx.add_top_level(module, id);
    id
}

fn var(ctx: &mut SemaContext, module: ModuleId, name: &str, ty: TypeId) -> DeclId {
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

/// `Shapes` with a struct `Point` and a variable `origin: Point`.
fn shapes(ctx: &mut SemaContext) -> ModuleId {
    let module = ctx.add_module("Shapes");
    let point = top_level(ctx, module, "Point", DeclKind::Struct(NominalData::default()));
    let point_ty = ctx.declared_type(point);
    var(ctx, module, "origin", point_ty);
    module
}

fn bytes_of(ctx: &SemaContext, module: ModuleId) -> Vec<u8> {
    serialize_module(ctx, module, &WriterOptions::default())
        .unwrap_or_else(|e| panic!("serialization failed: {e}"))
}

fn shapes_loader() -> ModuleLoader {
    let mut writer_ctx = SemaContext::new();
    let module = shapes(&mut writer_ctx);
    let bytes = bytes_of(&writer_ctx, module);
    ModuleLoader::new(LoaderConfig::new().with_memory_module("Shapes", bytes))
}

fn load(loader: &mut ModuleLoader, ctx: &mut SemaContext, name: &str) -> ModuleHandle {
    loader
        .load_module(ctx, name)
        .unwrap_or_else(|e| panic!("loading {name} failed: {e}"))
}

#[test]
fn lookup_decodes_declaration_and_its_type() {
    let mut loader = shapes_loader();
    let mut ctx = SemaContext::new();
    let handle = load(&mut loader, &mut ctx, "Shapes");

    let points = loader
        .lookup_value(&mut ctx, handle, "Point")
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(points.len(), 1);
    let point = points[0];
    assert_eq!(ctx.decl_name(point), "Point");
    assert_eq!(ctx.decl(point).module, handle.module());

    let origins = loader
        .lookup_value(&mut ctx, handle, "origin")
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(origins.len(), 1);
    let ty = ctx
        .decl(origins[0])
        .value_type()
        .unwrap_or_else(|| panic!("origin has no type"));
    assert_eq!(
        ctx.ty(ty),
        &TypeKind::Nominal {
            decl: point,
            parent: None
        }
    );
}

#[test]
fn absent_name_is_empty() {
    let mut loader = shapes_loader();
    let mut ctx = SemaContext::new();
    let handle = load(&mut loader, &mut ctx, "Shapes");
    let found = loader
        .lookup_value(&mut ctx, handle, "Circle")
        .unwrap_or_else(|e| panic!("{e}"));
    assert!(found.is_empty());
}

#[test]
fn second_lookup_reads_nothing() {
    let mut loader = shapes_loader();
    let mut ctx = SemaContext::new();
    let handle = load(&mut loader, &mut ctx, "Shapes");

    let first = loader
        .lookup_value(&mut ctx, handle, "origin")
        .unwrap_or_else(|e| panic!("{e}"));
    let read = loader.file(handle).records_read();
    let second = loader
        .lookup_value(&mut ctx, handle, "origin")
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(first, second);
    assert_eq!(loader.file(handle).records_read(), read);
}

#[test]
fn loading_twice_returns_the_same_module() {
    let mut loader = shapes_loader();
    let mut ctx = SemaContext::new();
    let first = load(&mut loader, &mut ctx, "Shapes");
    let second = load(&mut loader, &mut ctx, "Shapes");
    assert_eq!(first, second);
    assert_eq!(ctx.module_count(), 1);
}

#[test]
fn top_level_decls_fill_the_module() {
    let mut loader = shapes_loader();
    let mut ctx = SemaContext::new();
    let handle = load(&mut loader, &mut ctx, "Shapes");
    let decls = loader
        .top_level_decls(&mut ctx, handle)
        .unwrap_or_else(|e| panic!("{e}"));
    let names: Vec<&str> = decls.iter().map(|&d| ctx.decl_name(d)).collect();
    assert_eq!(names, ["Point", "origin"]);
    assert_eq!(ctx.module(handle.module()).top_level, decls);
}

#[test]
fn unknown_module_is_not_found() {
    let mut loader = ModuleLoader::new(LoaderConfig::new());
    let mut ctx = SemaContext::new();
    let err = loader
        .load_module(&mut ctx, "Nowhere")
        .err()
        .unwrap_or_else(|| panic!("expected an error"));
    assert_eq!(
        err,
        LoadError::NotFound {
            module: "Nowhere".to_owned()
        }
    );
}

#[test]
fn missing_imports_are_reported_together() {
    let mut writer_ctx = SemaContext::new();
    let first = writer_ctx.add_module("Geometry");
    let second = writer_ctx.add_module("Color");
    let app = writer_ctx.add_module("App");
    let int = writer_ctx.intern_type(TypeKind::Builtin(BuiltinType::Integer { width: 64 }));
    var(&mut writer_ctx, app, "count", int);
    writer_ctx.module_mut(app).imports = vec![
        ImportedModule {
            module: first,
            exported: false,
        },
        ImportedModule {
            module: second,
            exported: true,
        },
    ];
    let bytes = bytes_of(&writer_ctx, app);

    let mut loader = ModuleLoader::new(LoaderConfig::new().with_memory_module("App", bytes));
    let mut ctx = SemaContext::new();
    let err = loader
        .load_module(&mut ctx, "App")
        .err()
        .unwrap_or_else(|| panic!("expected an error"));
    assert_eq!(
        err,
        LoadError::MissingDependency {
            module: "App".to_owned(),
            missing: vec!["Geometry".to_owned(), "Color".to_owned()],
        }
    );
    assert!(loader.handle("App").is_none());
}

#[test]
fn truncated_file_is_malformed() {
    let mut writer_ctx = SemaContext::new();
    let module = shapes(&mut writer_ctx);
    let mut bytes = bytes_of(&writer_ctx, module);
    bytes.truncate(12);

    let mut loader = ModuleLoader::new(LoaderConfig::new().with_memory_module("Shapes", bytes));
    let mut ctx = SemaContext::new();
    let err = loader
        .load_module(&mut ctx, "Shapes")
        .err()
        .unwrap_or_else(|| panic!("expected an error"));
    assert!(matches!(err, LoadError::Malformed { .. }), "unexpected error: {err}");
}

#[test]
fn link_libraries_include_imports() {
    let mut writer_ctx = SemaContext::new();
    let base = writer_ctx.add_module("Base");
    writer_ctx.module_mut(base).link_libraries = vec![LinkLibrary {
        name: "z".to_owned(),
        kind: LinkLibraryKind::Library,
    }];
    let app = writer_ctx.add_module("App");
    writer_ctx.module_mut(app).link_libraries = vec![LinkLibrary {
        name: "UI".to_owned(),
        kind: LinkLibraryKind::Framework,
    }];
    writer_ctx.module_mut(app).imports = vec![ImportedModule {
        module: base,
        exported: false,
    }];
    let config = LoaderConfig::new()
        .with_memory_module("Base", bytes_of(&writer_ctx, base))
        .with_memory_module("App", bytes_of(&writer_ctx, app));

    let mut loader = ModuleLoader::new(config);
    let mut ctx = SemaContext::new();
    let handle = load(&mut loader, &mut ctx, "App");
    let mut names = Vec::new();
    loader.collect_link_libraries(handle, |lib| names.push(lib.name.clone()));
    assert_eq!(names, ["UI", "z"]);

    let imports = &ctx.module(handle.module()).imports;
    assert_eq!(imports.len(), 1);
    assert_eq!(ctx.module_name(imports[0].module), "Base");
}

#[test]
fn doc_file_supplies_brief_comments() {
    let mut writer_ctx = SemaContext::new();
    let module = shapes(&mut writer_ctx);
    let point = writer_ctx.module(module).top_level[0];
    writer_ctx
        .module_mut(module)
        .doc_comments
        .insert(point, "A point in the plane.\n\nMore.".to_owned());

    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    std::fs::write(dir.path().join("Shapes.orim"), bytes_of(&writer_ctx, module))
        .unwrap_or_else(|e| panic!("{e}"));
    let doc = serialize_module_doc(&writer_ctx, module).unwrap_or_else(|e| panic!("{e}"));
    std::fs::write(dir.path().join("Shapes.orimdoc"), doc).unwrap_or_else(|e| panic!("{e}"));

    let mut loader = ModuleLoader::new(LoaderConfig::new().with_search_path(dir.path()));
    let mut ctx = SemaContext::new();
    let handle = load(&mut loader, &mut ctx, "Shapes");
    assert_eq!(
        loader.brief_comment(handle, "Point"),
        Some("A point in the plane.")
    );
    assert_eq!(loader.brief_comment(handle, "origin"), None);
}

#[test]
fn broken_doc_file_is_ignored() {
    let mut writer_ctx = SemaContext::new();
    let module = shapes(&mut writer_ctx);
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    std::fs::write(dir.path().join("Shapes.orim"), bytes_of(&writer_ctx, module))
        .unwrap_or_else(|e| panic!("{e}"));
    std::fs::write(dir.path().join("Shapes.orimdoc"), b"garbage").unwrap_or_else(|e| panic!("{e}"));

    let mut loader = ModuleLoader::new(LoaderConfig::new().with_search_path(dir.path()));
    let mut ctx = SemaContext::new();
    let handle = load(&mut loader, &mut ctx, "Shapes");
    assert_eq!(loader.brief_comment(handle, "Point"), None);
    assert!(loader.file(handle).path().is_some());
}

#[test]
fn memory_modules_share_bytes() {
    let mut writer_ctx = SemaContext::new();
    let module = shapes(&mut writer_ctx);
    let bytes: Arc<[u8]> = Arc::from(bytes_of(&writer_ctx, module));
    let config = LoaderConfig::new().with_memory_module("Shapes", Arc::clone(&bytes));
    let mut loader = ModuleLoader::new(config);
    let mut ctx = SemaContext::new();
    let handle = load(&mut loader, &mut ctx, "Shapes");
    assert_eq!(loader.file(handle).path(), None);
    assert_eq!(loader.file(handle).name(), "Shapes");
}

fn member(ctx: &mut SemaContext, parent: DeclId, name: &str, kind: DeclKind) -> DeclId {
    let module = ctx.decl(parent).module;
    let name = ctx.intern(name);
    let id = ctx.add_decl(Decl::new(name, DeclContext::Decl(parent), module, kind));
    assert!(ctx.add_member(parent, id));
    id
}

fn operator(fixity: OperatorFixity) -> DeclKind {
    DeclKind::Operator {
        fixity,
        associativity: Associativity::Left,
        precedence: 140,
    }
}

fn method(operator: Option<OperatorFixity>) -> DeclKind {
    DeclKind::Func(FuncData {
        operator,
        ..FuncData::default()
    })
}

/// `Arith` declares prefix and infix `-`, a class `Counter` with an
/// extension, and a struct `Tally` whose members share `Counter`'s names.
fn arith_loader() -> ModuleLoader {
    let mut ctx = SemaContext::new();
    let module = ctx.add_module("Arith");
    top_level(&mut ctx, module, "-", operator(OperatorFixity::Prefix));
    top_level(&mut ctx, module, "-", operator(OperatorFixity::Infix));

    let class = DeclKind::Class {
        nominal: NominalData::default(),
        superclass: None,
    };
    let counter = top_level(&mut ctx, module, "Counter", class);
    member(&mut ctx, counter, "increment", method(None));
    member(&mut ctx, counter, "+", method(Some(OperatorFixity::Infix)));
    let counter_ty = ctx.declared_type(counter);
    let extension = top_level(
        &mut ctx,
        module,
        "",
        DeclKind::Extension(ExtensionData {
            extended: counter_ty,
            generics: None,
            inherited: Vec::new(),
            members: Vec::new(),
            conformances: Vec::new(),
        }),
    );
    member(&mut ctx, extension, "reset", method(None));

    let tally = top_level(&mut ctx, module, "Tally", DeclKind::Struct(NominalData::default()));
    member(&mut ctx, tally, "increment", method(None));
    member(&mut ctx, tally, "+", method(Some(OperatorFixity::Prefix)));

    let bytes = bytes_of(&ctx, module);
    ModuleLoader::new(LoaderConfig::new().with_memory_module("Arith", bytes))
}

#[test]
fn operator_lookup_matches_fixity() {
    let mut loader = arith_loader();
    let mut ctx = SemaContext::new();
    let handle = load(&mut loader, &mut ctx, "Arith");

    for fixity in [OperatorFixity::Prefix, OperatorFixity::Infix] {
        let found = loader
            .lookup_operator(&mut ctx, handle, "-", fixity)
            .unwrap_or_else(|e| panic!("{e}"))
            .unwrap_or_else(|| panic!("no {fixity:?} operator"));
        assert_eq!(ctx.decl_name(found), "-");
        assert_eq!(ctx.decl(found).operator_fixity(), Some(fixity));
    }
    let postfix = loader
        .lookup_operator(&mut ctx, handle, "-", OperatorFixity::Postfix)
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(postfix, None);
    assert!(loader
        .lookup_value(&mut ctx, handle, "-")
        .unwrap_or_else(|e| panic!("{e}"))
        .is_empty());
}

#[test]
fn extensions_are_found_by_nominal() {
    let mut loader = arith_loader();
    let mut ctx = SemaContext::new();
    let handle = load(&mut loader, &mut ctx, "Arith");
    let counter = loader
        .lookup_value(&mut ctx, handle, "Counter")
        .unwrap_or_else(|e| panic!("{e}"))[0];
    let tally = loader
        .lookup_value(&mut ctx, handle, "Tally")
        .unwrap_or_else(|e| panic!("{e}"))[0];

    let extensions = loader
        .lookup_extensions(&mut ctx, handle, counter)
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(extensions.len(), 1);
    let members: Vec<&str> = ctx
        .decl(extensions[0])
        .members()
        .iter()
        .map(|&m| ctx.decl_name(m))
        .collect();
    assert_eq!(members, ["reset"]);
    assert_eq!(ctx.extensions_of(counter), extensions.as_slice());

    let none = loader
        .lookup_extensions(&mut ctx, handle, tally)
        .unwrap_or_else(|e| panic!("{e}"));
    assert!(none.is_empty());
}

#[test]
fn class_members_cover_class_extensions_only() {
    let mut loader = arith_loader();
    let mut ctx = SemaContext::new();
    let handle = load(&mut loader, &mut ctx, "Arith");
    let counter = loader
        .lookup_value(&mut ctx, handle, "Counter")
        .unwrap_or_else(|e| panic!("{e}"))[0];

    let increments = loader
        .lookup_class_members(&mut ctx, handle, "increment")
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(increments.len(), 1);
    assert_eq!(ctx.decl(increments[0]).context, DeclContext::Decl(counter));

    let resets = loader
        .lookup_class_members(&mut ctx, handle, "reset")
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(resets.len(), 1);
    let DeclContext::Decl(extension) = ctx.decl(resets[0]).context else {
        panic!("reset is declared in a module scope");
    };
    assert!(matches!(ctx.decl(extension).kind, DeclKind::Extension(_)));
}

#[test]
fn operator_methods_come_from_every_type() {
    let mut loader = arith_loader();
    let mut ctx = SemaContext::new();
    let handle = load(&mut loader, &mut ctx, "Arith");
    let mut fixities: Vec<_> = loader
        .lookup_operator_methods(&mut ctx, handle, "+")
        .unwrap_or_else(|e| panic!("{e}"))
        .into_iter()
        .map(|m| ctx.decl(m).operator_fixity())
        .collect();
    fixities.sort();
    assert_eq!(
        fixities,
        [Some(OperatorFixity::Infix), Some(OperatorFixity::Prefix)]
    );
    assert!(loader
        .lookup_operator_methods(&mut ctx, handle, "increment")
        .unwrap_or_else(|e| panic!("{e}"))
        .is_empty());
}
