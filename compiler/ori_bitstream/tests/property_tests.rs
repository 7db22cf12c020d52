//! Property-based tests for the bitstream container.
//!
//! Random block trees are written with [`BitstreamWriter`] and walked back
//! with [`BitstreamCursor`]; the structure and every record must come back
//! exactly as written, whichever encoding each record used.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]
#![allow(
    clippy::disallowed_types,
    clippy::uninlined_format_args,
    reason = "Proptest macros generate code with these patterns"
)]

use std::sync::Arc;

use ori_bitstream::{Abbrev, AdvanceFlags, BitstreamCursor, BitstreamWriter, Entry};
use proptest::prelude::*;

#[derive(Clone, Debug, PartialEq)]
enum Item {
    Record {
        code: u32,
        fields: Vec<u64>,
        blob: Option<Vec<u8>>,
    },
    Block {
        id: u32,
        items: Vec<Item>,
    },
}

fn record_strategy() -> impl Strategy<Value = Item> {
    (
        1u32..40,
        prop::collection::vec(any::<u64>(), 0..8),
        prop::option::of(prop::collection::vec(any::<u8>(), 0..20)),
    )
        .prop_map(|(code, fields, blob)| Item::Record { code, fields, blob })
}

fn item_strategy() -> impl Strategy<Value = Item> {
    record_strategy().prop_recursive(3, 32, 6, |inner| {
        (8u32..20, prop::collection::vec(inner, 0..6))
            .prop_map(|(id, items)| Item::Block { id, items })
    })
}

fn write_items(w: &mut BitstreamWriter, items: &[Item]) {
    for item in items {
        match item {
            Item::Record { code, fields, blob } => match blob {
                Some(bytes) => {
                    let abbrev = w.emit_abbrev(Abbrev::literal_with_blob(*code, fields.len()));
                    w.emit_record_with_abbrev(abbrev, *code, fields, Some(bytes))
                        .unwrap();
                }
                None if fields.len() % 2 == 0 => w.emit_record(*code, fields),
                None => {
                    let abbrev = w.emit_abbrev(Abbrev::literal_array(*code));
                    w.emit_record_with_abbrev(abbrev, *code, fields, None)
                        .unwrap();
                }
            },
            Item::Block { id, items } => {
                w.enter_subblock(*id, 5);
                write_items(w, items);
                w.exit_block().unwrap();
            }
        }
    }
}

fn read_items(c: &mut BitstreamCursor) -> Vec<Item> {
    let mut items = Vec::new();
    loop {
        match c.advance(AdvanceFlags::empty()).unwrap() {
            Entry::EndBlock => return items,
            Entry::SubBlock(id) => {
                c.enter_sub_block(id).unwrap();
                let nested = read_items(c);
                items.push(Item::Block { id, items: nested });
            }
            Entry::Record(abbrev) => {
                let record = c.read_record(abbrev).unwrap();
                items.push(Item::Record {
                    code: record.code,
                    fields: record.fields,
                    blob: record.blob,
                });
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn block_trees_survive_a_round_trip(body in prop::collection::vec(item_strategy(), 0..6)) {
        let mut w = BitstreamWriter::new();
        w.enter_subblock(7, 3);
        write_items(&mut w, &body);
        w.exit_block().unwrap();
        let bytes = w.finish().unwrap();

        let mut c = BitstreamCursor::new(Arc::from(bytes));
        let top = read_items(&mut c);
        prop_assert_eq!(top, vec![Item::Block { id: 7, items: body }]);
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let mut c = BitstreamCursor::new(Arc::from(bytes));
        for _ in 0..64 {
            match c.advance(AdvanceFlags::empty()) {
                Ok(Entry::SubBlock(id)) => {
                    if c.enter_sub_block(id).is_err() {
                        break;
                    }
                }
                Ok(Entry::Record(abbrev)) => {
                    if c.read_record(abbrev).is_err() {
                        break;
                    }
                }
                Ok(Entry::EndBlock) if c.depth() == 0 => break,
                Ok(Entry::EndBlock) => {}
                Err(_) => break,
            }
        }
    }
}
