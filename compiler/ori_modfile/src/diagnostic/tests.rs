use std::path::Path;

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn single_missing_dependency() {
    let err = LoadError::MissingDependency {
        module: "B".into(),
        missing: vec!["A".into()],
    };
    let diag = err.diagnostic(Some(Path::new("lib/B.orim")));
    assert_eq!(diag.code, ErrorCode::E7004);
    assert_eq!(diag.message, "missing required module `A`");
    assert_eq!(diag.notes, vec!["required by module `B`".to_owned()]);
    assert_eq!(diag.path.as_deref(), Some(Path::new("lib/B.orim")));
}

#[test]
fn missing_dependencies_are_batched() {
    let err = LoadError::MissingDependency {
        module: "B".into(),
        missing: vec!["A".into(), "C".into()],
    };
    let diag = err.diagnostic(None);
    assert_eq!(diag.message, "missing required modules: `A`, `C`");
}

#[test]
fn rendered_form_includes_code_and_path() {
    let err = LoadError::malformed("A", "truncated control block");
    let rendered = err.diagnostic(Some(Path::new("A.orim"))).to_string();
    assert_eq!(
        rendered,
        "error[E7001]: malformed module file for `A`: truncated control block\n  --> A.orim"
    );
}
