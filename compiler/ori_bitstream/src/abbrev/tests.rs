use super::*;

#[test]
fn array_must_be_last() {
    let result = Abbrev::new(vec![
        AbbrevOp::Literal(4),
        AbbrevOp::array_vbr6(),
        AbbrevOp::vbr(6),
    ]);
    assert!(matches!(
        result,
        Err(BitstreamError::InvalidAbbrev { .. })
    ));
}

#[test]
fn blob_must_be_last() {
    let result = Abbrev::new(vec![AbbrevOp::Blob, AbbrevOp::fixed(1)]);
    assert!(result.is_err());
}

#[test]
fn widths_are_validated() {
    assert!(Abbrev::new(vec![AbbrevOp::fixed(0)]).is_err());
    assert!(Abbrev::new(vec![AbbrevOp::fixed(65)]).is_err());
    assert!(Abbrev::new(vec![AbbrevOp::vbr(1)]).is_err());
    assert!(Abbrev::new(vec![AbbrevOp::vbr(33)]).is_err());
    assert!(Abbrev::new(vec![AbbrevOp::fixed(64), AbbrevOp::vbr(32)]).is_ok());
}

#[test]
fn empty_abbrev_rejected() {
    assert!(Abbrev::new(Vec::new()).is_err());
}

#[test]
fn encoded_len_counts_array_element() {
    let abbrev = Abbrev::literal_array(9);
    assert_eq!(abbrev.encoded_len(), 3);
    let with_blob = Abbrev::literal_with_blob(2, 2);
    assert_eq!(with_blob.encoded_len(), 4);
}

#[test]
fn char6_covers_identifier_alphabet() {
    for c in b"azAZ09._".iter().copied() {
        let v = encode_char6(c).unwrap_or_else(|| panic!("{} should encode", c as char));
        assert_eq!(decode_char6(v), u64::from(c));
    }
    assert_eq!(encode_char6(b'-'), None);
    assert_eq!(encode_char6(b' '), None);
}
