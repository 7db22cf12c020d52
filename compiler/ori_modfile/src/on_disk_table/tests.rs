use pretty_assertions::assert_eq;

use super::*;

fn build(pairs: &[(&str, &str)]) -> OnDiskTable {
    let mut builder = OnDiskTableBuilder::new();
    for (key, data) in pairs {
        builder.insert(key.as_bytes(), data.as_bytes());
    }
    let (blob, offset) = builder
        .finish()
        .unwrap_or_else(|e| panic!("finish failed: {e}"));
    OnDiskTable::open(blob, offset).unwrap_or_else(|e| panic!("open failed: {e}"))
}

#[test]
fn djb_hash_matches_reference_values() {
    assert_eq!(djb_hash(b""), 5381);
    assert_eq!(djb_hash(b"a"), 5381 * 33 + u32::from(b'a'));
}

#[test]
fn present_and_absent_keys() {
    let table = build(&[("alpha", "1"), ("beta", "22"), ("gamma", "333")]);
    assert_eq!(table.len(), 3);
    assert_eq!(table.lookup(b"beta"), Ok(Some(&b"22"[..])));
    assert_eq!(table.lookup(b"gamma"), Ok(Some(&b"333"[..])));
    assert_eq!(table.lookup(b"delta"), Ok(None));
}

#[test]
fn inserting_twice_appends_data() {
    let table = build(&[("k", "ab"), ("k", "cd")]);
    assert_eq!(table.len(), 1);
    assert_eq!(table.lookup(b"k"), Ok(Some(&b"abcd"[..])));
}

#[test]
fn empty_table_has_one_bucket() {
    let table = build(&[]);
    assert!(table.is_empty());
    assert_eq!(table.lookup(b"anything"), Ok(None));
}

#[test]
fn many_keys_share_buckets() {
    let names: Vec<String> = (0..200).map(|i| format!("name{i}")).collect();
    let mut builder = OnDiskTableBuilder::new();
    for (i, name) in names.iter().enumerate() {
        builder.insert(name.as_bytes(), &(i as u32).to_le_bytes());
    }
    let (blob, offset) = builder.finish().unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(blob[0], 0, "byte 0 is reserved");
    let table = OnDiskTable::open(blob, offset).unwrap_or_else(|e| panic!("{e}"));
    for (i, name) in names.iter().enumerate() {
        let data = table
            .lookup(name.as_bytes())
            .unwrap_or_else(|e| panic!("{e}"))
            .unwrap_or_else(|| panic!("missing {name}"));
        assert_eq!(data, (i as u32).to_le_bytes());
    }
    assert_eq!(table.entries().map(|e| e.len()), Ok(200));
}

#[test]
fn bad_header_is_rejected() {
    assert_eq!(
        OnDiskTable::open(vec![0, 1, 2], 1).map(|_| ()),
        Err(TableError::Header(1))
    );
    // Bucket count that is not a power of two.
    let mut blob = vec![0u8];
    blob.extend_from_slice(&3u32.to_le_bytes());
    blob.extend_from_slice(&0u32.to_le_bytes());
    blob.extend_from_slice(&[0; 12]);
    assert!(OnDiskTable::open(blob, 1).is_err());
}
