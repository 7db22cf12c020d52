use ori_bitstream::BitstreamWriter;
use ori_sema::{
    Decl, DeclContext, DeclKind, ImportedModule, LinkLibraryKind, NominalData, SemaContext,
};
use pretty_assertions::assert_eq;

use super::*;
use crate::format::{MODULE_ABBREV_WIDTH, SMALL_ABBREV_WIDTH};
use crate::{serialize_module, WriterOptions};

/// A container holding only a control block with the given version.
fn control_only(major: u64, minor: u64) -> Vec<u8> {
    let mut out = BitstreamWriter::new();
    for byte in MAGIC {
        out.emit(u32::from(byte), 8);
    }
    out.enter_subblock(block::MODULE, MODULE_ABBREV_WIDTH);
    out.enter_subblock(block::CONTROL, SMALL_ABBREV_WIDTH);
    out.emit_record(control::METADATA, &[major, minor]);
    out.exit_block().unwrap_or_else(|e| panic!("{e}"));
    out.exit_block().unwrap_or_else(|e| panic!("{e}"));
    out.finish().unwrap_or_else(|e| panic!("{e}"))
}

fn open(bytes: Vec<u8>) -> Result<ModuleFile, LoadError> {
    ModuleFile::open("Shapes", Arc::from(bytes), None)
}

fn sample() -> Vec<u8> {
    let mut ctx = SemaContext::new();
    let base = ctx.add_module("Base");
    let module = ctx.add_module("Shapes");
    let name = ctx.intern("Point");
    let point = ctx.add_decl(Decl::new(
        name,
        DeclContext::Module(module),
        module,
        DeclKind::Struct(NominalData::default()),
    ));
    ctx.add_top_level(module, point);
    let data = ctx.module_mut(module);
    data.imports.push(ImportedModule {
        module: base,
        exported: true,
    });
    data.link_libraries.push(LinkLibrary {
        name: "m".to_owned(),
        kind: LinkLibraryKind::Library,
    });
    data.source_files.push("shapes.ori".to_owned());
    serialize_module(
        &ctx,
        module,
        &WriterOptions::default().with_compiler_version("ori test"),
    )
    .unwrap_or_else(|e| panic!("serialization failed: {e}"))
}

#[test]
fn newer_major_version_is_rejected_first() {
    let err = open(control_only(VERSION_MAJOR + 1, 3))
        .err()
        .unwrap_or_else(|| panic!("expected an error"));
    assert_eq!(
        err,
        LoadError::FormatTooNew {
            major: VERSION_MAJOR + 1,
            minor: 3
        }
    );
}

#[test]
fn older_major_version_is_rejected() {
    let err = open(control_only(MIN_SUPPORTED_MAJOR - 1, 0))
        .err()
        .unwrap_or_else(|| panic!("expected an error"));
    assert_eq!(
        err,
        LoadError::FormatTooOld {
            major: MIN_SUPPORTED_MAJOR - 1,
            minor: 0
        }
    );
}

#[test]
fn supported_version_without_sections_is_malformed() {
    let err = open(control_only(VERSION_MAJOR, 0))
        .err()
        .unwrap_or_else(|| panic!("expected an error"));
    assert!(matches!(err, LoadError::Malformed { .. }), "unexpected error: {err}");
}

#[test]
fn wrong_magic_is_malformed() {
    let err = open(b"ELF\x7f\0\0\0\0".to_vec())
        .err()
        .unwrap_or_else(|| panic!("expected an error"));
    assert!(matches!(err, LoadError::Malformed { .. }), "unexpected error: {err}");
}

#[test]
fn truncated_control_block_is_malformed() {
    let mut bytes = control_only(VERSION_MAJOR, 0);
    bytes.truncate(bytes.len() - 8);
    let err = open(bytes)
        .err()
        .unwrap_or_else(|| panic!("expected an error"));
    assert!(matches!(err, LoadError::Malformed { .. }), "unexpected error: {err}");
}

#[test]
fn eager_sections_are_read() {
    let file = open(sample()).unwrap_or_else(|e| panic!("open failed: {e}"));
    assert_eq!(file.name(), "Shapes");
    assert_eq!(file.format_version(), (VERSION_MAJOR, crate::format::VERSION_MINOR));
    assert_eq!(file.compiler_version(), "ori test");
    assert_eq!(
        file.imports(),
        &[ImportInfo {
            name: "Base".to_owned(),
            exported: true
        }]
    );
    assert_eq!(file.link_libraries()[0].name, "m");
    assert_eq!(file.source_files(), &["shapes.ori".to_owned()]);
    assert_eq!(file.shadowed_module(), None);
    assert_eq!(file.status(), &FileStatus::Valid);
    assert!(!file.has_ir());
    assert_eq!(file.top_level.len(), 1);
    assert!(file.decl_count() >= 1);
}

#[test]
fn opening_reads_no_lazy_records() {
    let file = open(sample()).unwrap_or_else(|e| panic!("open failed: {e}"));
    assert_eq!(file.records_read(), 0);
    assert!(file.decls.iter().all(|slot| matches!(slot, Slot::Unread(_))));
}

#[test]
fn name_tables_answer_lookups() {
    let file = open(sample()).unwrap_or_else(|e| panic!("open failed: {e}"));
    let entries = file
        .index_entries(IndexKind::TopLevelValues, "Point")
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].disambiguator, ori_sema::DeclKindTag::Struct as u8);
    assert_eq!(u64::from(entries[0].id), file.top_level[0]);
    assert!(file
        .index_entries(IndexKind::TopLevelValues, "Circle")
        .unwrap_or_else(|e| panic!("{e}"))
        .is_empty());
}

#[test]
fn identifiers_are_interned_once() {
    let mut file = open(sample()).unwrap_or_else(|e| panic!("open failed: {e}"));
    let mut ctx = SemaContext::new();
    assert_eq!(
        file.identifier(&mut ctx, 0).unwrap_or_else(|e| panic!("{e}")),
        Name::EMPTY
    );
    let first = file.identifier(&mut ctx, 1).unwrap_or_else(|e| panic!("{e}"));
    let again = file.identifier(&mut ctx, 1).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(first, again);
    assert_eq!(file.identifier_str(1).unwrap_or_else(|e| panic!("{e}")), ctx.name_str(first));
    assert!(file.identifier(&mut ctx, 10_000).is_err());
}
