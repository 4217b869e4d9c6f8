use serde_json::json;
use xml_path_duplex as xpd;
use xpd::{Document, Evaluator, PathError};

fn parse_error(text: &str) -> (usize, usize, std::ops::Range<usize>) {
    match xpd::compile(text) {
        Err(PathError::Parse { line, column, span, .. }) => (line, column, span),
        other => panic!("expected parse error for `{text}`, got {other:?}"),
    }
}

#[test]
fn test_malformed_expressions_are_parse_errors() {
    for text in ["", "/a/", "/a[", "/a[]", "/a[@x=]", "/a[@x='1'", "/a[@x=='1']", "/a]", "/a/@", "/a[$]"] {
        assert!(
            matches!(xpd::compile(text), Err(PathError::Parse { .. })),
            "`{text}` should not compile"
        );
    }
}

#[test]
fn test_parse_error_points_at_the_offending_character() {
    let (line, column, span) = parse_error("/a/b[@x='1']]");
    assert_eq!((line, column), (1, 13));
    assert_eq!(span, 12..13);

    let (_, column, _) = parse_error("/a/b[]");
    assert_eq!(column, 5);
}

#[test]
fn test_empty_using_pattern() {
    assert!(matches!(xpd::compile("/a using   "), Err(PathError::Parse { .. })));
    assert!(matches!(xpd::compile("/a[@b=$v{using }]"), Err(PathError::Parse { .. })));
}

#[test]
fn test_read_only_constructs_fail_on_write() {
    let ev = Evaluator::default();
    for path in ["//b", "/a//b", "/a/b[@x!='1']", "/a/b[@x<'1']", "/a/b[@x='1' or @y='2']", "/a/*"] {
        let mut doc = Document::parse_str("<a/>").unwrap();
        let err = ev.write(&mut doc, path, &json!("v")).unwrap_err();
        assert!(
            matches!(err, PathError::UnsupportedForWriting { .. }),
            "`{path}` gave {err:?}"
        );
        // reads of the same construct are fine
        assert!(ev.query(&doc, path).is_ok());
    }
}

#[test]
fn test_unknown_prefix_fails_at_evaluation_not_compile() {
    let expr = xpd::compile("/a/q:b").unwrap();
    let doc = Document::parse_str("<a/>").unwrap();
    let err = xpd::evaluate_node_set(&expr, &doc, doc.root(), &Default::default()).unwrap_err();
    assert!(matches!(err, PathError::Evaluation(_)));
}

#[test]
fn test_unresolved_variable() {
    let doc = Document::parse_str(r#"<a><b id="1"/></a>"#).unwrap();
    let err = Evaluator::default().query(&doc, "/a/b[@id=$id]").unwrap_err();
    match err {
        PathError::VariableResolution(name) => assert_eq!(name, "id"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_deleting_the_document_node_is_rejected() {
    let mut doc = Document::parse_str("<a/>").unwrap();
    let err = Evaluator::default().delete(&mut doc, "/").unwrap_err();
    assert!(matches!(err, PathError::UnsupportedForWriting { .. }));
}
