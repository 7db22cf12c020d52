use pretty_assertions::assert_eq;

use super::*;

fn open(builder: NameIndexBuilder) -> NameIndex {
    let (blob, offset) = builder
        .finish()
        .unwrap_or_else(|e| panic!("finish failed: {e}"));
    NameIndex::open(blob, offset).unwrap_or_else(|e| panic!("open failed: {e}"))
}

#[test]
fn overloads_share_a_key() {
    let mut builder = NameIndexBuilder::new();
    builder.add("max", IndexEntry::new(7, 3));
    builder.add("max", IndexEntry::new(7, 9));
    builder.add("Point", IndexEntry::new(2, 1));
    let index = open(builder);

    assert_eq!(index.len(), 2);
    assert_eq!(
        index.lookup("max"),
        Ok(vec![IndexEntry::new(7, 3), IndexEntry::new(7, 9)])
    );
    assert_eq!(index.lookup("Point"), Ok(vec![IndexEntry::new(2, 1)]));
}

#[test]
fn absent_name_is_empty() {
    let mut builder = NameIndexBuilder::new();
    builder.add("present", IndexEntry::new(1, 1));
    let index = open(builder);
    assert_eq!(index.lookup("absent"), Ok(Vec::new()));
}

#[test]
fn entries_lists_every_name() {
    let mut builder = NameIndexBuilder::new();
    builder.add("a", IndexEntry::new(1, 1));
    builder.add("b", IndexEntry::new(2, 2));
    let index = open(builder);
    let mut entries = index.entries().unwrap_or_else(|e| panic!("{e}"));
    entries.sort();
    assert_eq!(
        entries,
        vec![
            ("a".to_owned(), vec![IndexEntry::new(1, 1)]),
            ("b".to_owned(), vec![IndexEntry::new(2, 2)]),
        ]
    );
}

#[test]
fn large_ids_survive() {
    let mut builder = NameIndexBuilder::new();
    builder.add("big", IndexEntry::new(255, u32::MAX));
    let index = open(builder);
    assert_eq!(index.lookup("big"), Ok(vec![IndexEntry::new(255, u32::MAX)]));
}

#[test]
fn ragged_entry_list_is_rejected() {
    assert_eq!(decode_entries(&[1, 2, 3]), Err(TableError::EntryList(3)));
}
