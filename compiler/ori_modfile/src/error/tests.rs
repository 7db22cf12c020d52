use pretty_assertions::assert_eq;

use super::*;

#[test]
fn missing_dependency_lists_every_module() {
    let err = LoadError::MissingDependency {
        module: "App".into(),
        missing: vec!["Net".into(), "Json".into()],
    };
    assert_eq!(
        err.to_string(),
        "module `App` depends on missing modules: Net, Json"
    );
    assert_eq!(err.missing_modules(), ["Net".to_owned(), "Json".to_owned()]);
}

#[test]
fn bitstream_errors_convert_into_serialize_errors() {
    let err: SerializeError = BitstreamError::UnbalancedBlockEnd.into();
    assert!(matches!(err, SerializeError::Bitstream(_)));
}
