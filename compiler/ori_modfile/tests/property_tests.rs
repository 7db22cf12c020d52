//! Property-based tests for name tables, brief comments and top-level
//! lookups.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]
#![allow(
    clippy::disallowed_types,
    clippy::uninlined_format_args,
    reason = "Proptest macros generate code with these patterns"
)]

use ori_modfile::name_index::{NameIndex, NameIndexBuilder};
use ori_modfile::{
    brief_of, serialize_module, IndexEntry, LoaderConfig, ModuleLoader, WriterOptions,
};
use ori_sema::{Decl, DeclContext, DeclKind, NominalData, SemaContext};
use proptest::prelude::*;

fn identifier() -> impl Strategy<Value = String> {
    "[A-Za-z_][A-Za-z0-9_]{0,12}"
}

fn entries() -> impl Strategy<Value = Vec<IndexEntry>> {
    prop::collection::vec(
        (any::<u8>(), 1u32..10_000).prop_map(|(tag, id)| IndexEntry::new(tag, id)),
        1..4,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn name_index_returns_what_was_added(
        table in prop::collection::btree_map(identifier(), entries(), 0..40),
        absent in identifier(),
    ) {
        let mut builder = NameIndexBuilder::new();
        for (name, list) in &table {
            for &entry in list {
                builder.add(name, entry);
            }
        }
        let (blob, offset) = builder.finish().unwrap();
        let index = NameIndex::open(blob, offset).unwrap();

        prop_assert_eq!(index.len(), table.len());
        for (name, list) in &table {
            prop_assert_eq!(&index.lookup(name).unwrap(), list);
        }
        if !table.contains_key(&absent) {
            prop_assert!(index.lookup(&absent).unwrap().is_empty());
        }
    }

    #[test]
    fn brief_is_a_single_trimmed_line(
        lines in prop::collection::vec("[ a-z.]{0,20}", 0..8),
    ) {
        let comment = lines.join("\n");
        let brief = brief_of(&comment);
        prop_assert!(!brief.contains('\n'));
        prop_assert_eq!(brief.trim(), brief.as_str());
        prop_assert_eq!(brief_of(&brief), brief.clone());
    }

    #[test]
    fn every_top_level_name_resolves(
        names in prop::collection::btree_set(identifier(), 1..12),
    ) {
        let mut ctx = SemaContext::new();
        let module = ctx.add_module("Generated");
        for name in &names {
            let interned = ctx.intern(name);
            let decl = ctx.add_decl(Decl::new(
                interned,
                DeclContext::Module(module),
                module,
                DeclKind::Struct(NominalData::default()),
            ));
            ctx.add_top_level(module, decl);
        }
        let bytes = serialize_module(&ctx, module, &WriterOptions::default()).unwrap();

        let mut loader =
            ModuleLoader::new(LoaderConfig::new().with_memory_module("Generated", bytes));
        let mut reader = SemaContext::new();
        let handle = loader.load_module(&mut reader, "Generated").unwrap();
        for name in &names {
            let found = loader.lookup_value(&mut reader, handle, name).unwrap();
            prop_assert_eq!(found.len(), 1);
            prop_assert_eq!(reader.decl_name(found[0]), name.as_str());
        }
        let all = loader.top_level_decls(&mut reader, handle).unwrap();
        let in_order: Vec<&str> = all.iter().map(|&d| reader.decl_name(d)).collect();
        let expected: Vec<&str> = names.iter().map(String::as_str).collect();
        prop_assert_eq!(in_order, expected);
    }
}
