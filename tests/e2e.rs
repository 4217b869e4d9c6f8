use pretty_assertions::assert_eq;
use serde_json::json;
use xml_path_duplex as xpd;
use xpd::{ComponentType, Context, Document, Evaluator, Item, PathError};

#[test]
fn test_write_attribute_into_missing_element() {
    let mut doc = Document::parse_str("<root/>").unwrap();
    Evaluator::default().write(&mut doc, "/root/foo/@bar", &json!("13")).unwrap();
    assert_eq!(doc.to_xml(), r#"<root><foo bar="13"/></root>"#);
}

#[test]
fn test_list_view_reads_and_appends() {
    let mut doc = Document::parse_str("<a><b>1</b><b>2</b><b>3</b></a>").unwrap();
    let ev = Evaluator::default();
    let mut list = ev.list_view(&doc, "/a/b", ComponentType::Integer).unwrap();

    assert_eq!(list.get(&doc, 1).unwrap(), Some(Item::Scalar(json!(2))));
    list.add(&mut doc, Item::from(4)).unwrap();

    let items: Vec<Item> = [1, 2, 3, 4].into_iter().map(|n: i64| Item::from(n)).collect();
    assert_eq!(list.to_vec(&doc).unwrap(), items);
    assert_eq!(ev.query(&doc, "/a/b").unwrap().len(), 4);
    assert_eq!(doc.to_xml(), "<a><b>1</b><b>2</b><b>3</b><b>4</b></a>");
}

#[test]
fn test_predicate_selects_write_target() {
    let xml = r#"<a><b x="1"/><b x="2"/></a>"#;
    let ev = Evaluator::default();

    let mut doc = Document::parse_str(xml).unwrap();
    ev.write(&mut doc, "/a/b[@x='2']", &json!("hit")).unwrap();
    assert_eq!(doc.to_xml(), r#"<a><b x="1"/><b x="2">hit</b></a>"#);

    let mut doc = Document::parse_str(xml).unwrap();
    let err = ev.write(&mut doc, "/a/b", &json!("v")).unwrap_err();
    assert!(matches!(err, PathError::AmbiguousPath { count: 2, .. }), "{err}");
    assert_eq!(doc.to_xml(), xml);
}

#[test]
fn test_delete_all_matching_children() {
    let mut doc = Document::parse_str("<a><b>1</b><b>2</b></a>").unwrap();
    let a = doc.document_element().unwrap();
    let expr = xpd::compile("/a/b").unwrap();
    xpd::delete_all_matching_children(&expr, &mut doc, a, &Context::default()).unwrap();
    assert_eq!(doc.to_xml(), "<a/>");
}

#[test]
fn test_list_view_creates_missing_parent_on_add() {
    let mut doc = Document::parse_str("<root/>").unwrap();
    let mut list = Evaluator::default()
        .list_view(&doc, "/root/entries/entry", ComponentType::Text)
        .unwrap();
    assert!(list.is_empty(&doc).unwrap());
    list.add(&mut doc, Item::from("x")).unwrap();
    assert_eq!(doc.to_xml(), "<root><entries><entry>x</entry></entries></root>");
    assert_eq!(list.len(&doc).unwrap(), 1);
}

#[test]
fn test_read_and_write_share_the_same_path() {
    let mut doc = Document::parse_str("<order/>").unwrap();
    let ev = Evaluator::new(Context::new().with_namespace("c", "urn:customer"));
    let path = "/order/c:customer[@id='42']/c:name";

    assert!(ev.query(&doc, path).unwrap().is_empty());
    ev.write(&mut doc, path, &json!("Ada")).unwrap();
    assert_eq!(ev.query_text(&doc, path).unwrap(), vec!["Ada"]);
    assert_eq!(
        doc.to_xml(),
        r#"<order xmlns:c="urn:customer"><c:customer id="42"><c:name>Ada</c:name></c:customer></order>"#
    );

    assert_eq!(ev.delete(&mut doc, "/order/c:customer/c:name").unwrap(), 1);
    assert_eq!(doc.to_xml(), r#"<order xmlns:c="urn:customer"><c:customer id="42"/></order>"#);
}

#[test]
fn test_format_pattern_on_write() {
    let mut doc = Document::parse_str("<r/>").unwrap();
    let ev = Evaluator::default();
    ev.write(&mut doc, "/r/price using 0.00", &json!(3.5)).unwrap();
    assert_eq!(doc.to_xml(), "<r><price>3.50</price></r>");

    let expr = xpd::compile("/r/price using 0.00").unwrap();
    let v = xpd::evaluate_value(&expr, &doc, doc.root(), ev.context(), ComponentType::Float).unwrap();
    assert_eq!(v, Some(json!(3.5)));
}

#[test]
fn test_from_xml_convenience() {
    let out = xpd::from_xml("<a><b>1</b><b>2</b></a>", "/a/b[2]").unwrap();
    assert_eq!(out, vec!["2"]);
    assert!(matches!(xpd::from_xml("<a>", "/a"), Err(PathError::Xml(_))));
}

#[test]
fn test_decimal_literals_compare_and_write_as_written() {
    assert_eq!(xpd::from_xml("<a><b>2.0</b><b>2</b></a>", "/a/b[.=2.0]").unwrap(), vec!["2.0"]);
    assert_eq!(xpd::from_xml("<a><b>2.0</b><b>2</b></a>", "/a/b[.=2]").unwrap(), vec!["2"]);

    let mut doc = Document::parse_str("<a/>").unwrap();
    Evaluator::default().write(&mut doc, "/a/b[@v=2.0]", &json!("x")).unwrap();
    assert_eq!(doc.to_xml(), r#"<a><b v="2.0">x</b></a>"#);
}
