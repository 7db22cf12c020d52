//! Finding module files on disk.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

use std::fs;
use std::path::Path;

use ori_modfile::{
    serialize_module_doc, write_module_to_path, LoadError, LoaderConfig, ModuleLoader,
    WriterOptions,
};
use ori_sema::{
    Decl, DeclContext, DeclId, DeclKind, ImportedModule, ModuleId, NominalData, SemaContext,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn top_level(ctx: &mut SemaContext, module: ModuleId, name: &str) -> DeclId {
    let name = ctx.intern(name);
    let id = ctx.add_decl(Decl::new(
        name,
        DeclContext::Module(module),
        module,
        DeclKind::Struct(NominalData::default()),
    ));
    ctx.add_top_level(module, id);
    id
}

fn write(ctx: &SemaContext, module: ModuleId, path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    write_module_to_path(ctx, module, None, &WriterOptions::default(), path)
        .expect("write failed");
}

/// `App` in `search/`, `Base` as a framework in `frameworks/`.
fn layout() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = SemaContext::new();
    let base = ctx.add_module("Base");
    let app = ctx.add_module("App");
    ctx.module_mut(app).imports.push(ImportedModule {
        module: base,
        exported: true,
    });
    let widget = top_level(&mut ctx, base, "Widget");
    ctx.module_mut(base).doc_comments.insert(
        widget,
        "A drawable thing.\nKeeps its own bounds.\n\nDetails follow.".to_owned(),
    );
    top_level(&mut ctx, app, "Window");

    write(&ctx, app, &dir.path().join("search/App.orim"));
    let base_path = dir.path().join("frameworks/Base.framework/Modules/Base.orim");
    write(&ctx, base, &base_path);
    let docs = serialize_module_doc(&ctx, base).expect("doc serialization failed");
    fs::write(base_path.with_extension("orimdoc"), docs).unwrap();
    dir
}

fn config(dir: &TempDir) -> LoaderConfig {
    LoaderConfig::new()
        .with_search_path(dir.path().join("search"))
        .with_framework_path(dir.path().join("frameworks"))
}

#[test]
fn imports_are_found_in_frameworks() {
    let dir = layout();
    let mut loader = ModuleLoader::new(config(&dir));
    let mut ctx = SemaContext::new();
    let app = loader.load_module(&mut ctx, "App").expect("App should load");
    let base = loader.handle("Base").expect("Base is loaded as a dependency");

    assert_eq!(
        loader.file(app).path(),
        Some(dir.path().join("search/App.orim").as_path())
    );
    assert_eq!(
        loader.file(base).path(),
        Some(
            dir.path()
                .join("frameworks/Base.framework/Modules/Base.orim")
                .as_path()
        )
    );
    let imports = &ctx.module(app.module()).imports;
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].module, base.module());
    assert!(imports[0].exported);
}

#[test]
fn brief_comments_come_from_the_doc_file() {
    let dir = layout();
    let mut loader = ModuleLoader::new(config(&dir));
    let mut ctx = SemaContext::new();
    loader.load_module(&mut ctx, "App").expect("App should load");
    let base = loader.handle("Base").expect("Base is loaded");
    assert_eq!(
        loader.brief_comment(base, "Widget"),
        Some("A drawable thing. Keeps its own bounds.")
    );
    assert_eq!(loader.brief_comment(base, "Gadget"), None);
}

#[test]
fn docs_can_be_turned_off() {
    let dir = layout();
    let mut loader = ModuleLoader::new(config(&dir).with_docs(false));
    let mut ctx = SemaContext::new();
    let base = loader.load_module(&mut ctx, "Base").expect("Base should load");
    assert_eq!(loader.brief_comment(base, "Widget"), None);
}

#[test]
fn missing_framework_path_reports_the_import() {
    let dir = layout();
    let mut loader =
        ModuleLoader::new(LoaderConfig::new().with_search_path(dir.path().join("search")));
    let mut ctx = SemaContext::new();
    let err = loader.load_module(&mut ctx, "App").unwrap_err();
    assert_eq!(
        err,
        LoadError::MissingDependency {
            module: "App".to_owned(),
            missing: vec!["Base".to_owned()],
        }
    );
}

#[test]
fn runtime_path_is_searched_last() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = SemaContext::new();
    let first = ctx.add_module("Core");
    top_level(&mut ctx, first, "FromSearch");
    write(&ctx, first, &dir.path().join("search/Core.orim"));

    let mut other = SemaContext::new();
    let second = other.add_module("Core");
    top_level(&mut other, second, "FromRuntime");
    write(&other, second, &dir.path().join("runtime/Core.orim"));

    let load = |config: LoaderConfig| {
        let mut loader = ModuleLoader::new(config);
        let mut ctx = SemaContext::new();
        let core = loader.load_module(&mut ctx, "Core").expect("Core should load");
        let decls = loader.top_level_decls(&mut ctx, core).expect("read failed");
        decls
            .iter()
            .map(|&d| ctx.decl_name(d).to_owned())
            .collect::<Vec<_>>()
    };
    let runtime_only = LoaderConfig::new().with_runtime_path(dir.path().join("runtime"));
    assert_eq!(load(runtime_only.clone()), vec!["FromRuntime"]);
    assert_eq!(
        load(runtime_only.with_search_path(dir.path().join("search"))),
        vec!["FromSearch"]
    );
}

#[test]
fn shadowed_module_is_loaded_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = SemaContext::new();
    let core = ctx.add_module("Core");
    let overlay = ctx.add_module("Overlay");
    top_level(&mut ctx, core, "Base");
    top_level(&mut ctx, overlay, "Extra");
    let core_name = ctx.intern("Core");
    ctx.module_mut(overlay).shadows = Some(core_name);
    write(&ctx, overlay, &dir.path().join("search/Overlay.orim"));

    let mut loader =
        ModuleLoader::new(LoaderConfig::new().with_search_path(dir.path().join("search")));
    let mut reader_ctx = SemaContext::new();
    let err = loader.load_module(&mut reader_ctx, "Overlay").unwrap_err();
    assert_eq!(
        err,
        LoadError::MissingShadowedModule {
            module: "Overlay".to_owned(),
            underlying: "Core".to_owned(),
        }
    );

    write(&ctx, core, &dir.path().join("search/Core.orim"));
    let overlay = loader
        .load_module(&mut reader_ctx, "Overlay")
        .expect("Overlay should load");
    assert!(loader.handle("Core").is_some());
    let shadows = reader_ctx.module(overlay.module()).shadows;
    assert_eq!(shadows.map(|n| reader_ctx.name_str(n)), Some("Core"));
}
