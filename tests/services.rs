use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use xml_path_duplex as xpd;
use xpd::filter::VariableRef;
use xpd::{ComponentType, Context, Document, Evaluator, Item, PathError, Renderer, TypeConverter, Variables};

struct Upper;

impl Renderer for Upper {
    fn render(&self, value: &Value, _pattern: Option<&str>) -> xpd::Result<String> {
        match value {
            Value::String(s) => Ok(s.to_uppercase()),
            other => Ok(other.to_string()),
        }
    }
}

struct YesNo;

impl TypeConverter for YesNo {
    fn convert(&self, component: ComponentType, text: &str, _pattern: Option<&str>) -> xpd::Result<Value> {
        match (component, text) {
            (ComponentType::Boolean, "yes") => Ok(json!(true)),
            (ComponentType::Boolean, "no") => Ok(json!(false)),
            (ComponentType::Boolean, other) => Err(PathError::Conversion(format!("`{other}` is not yes/no"))),
            (_, other) => Ok(Value::String(other.to_string())),
        }
    }
}

#[test]
fn test_custom_renderer_is_used_for_writes_and_comparisons() {
    let mut doc = Document::parse_str("<r/>").unwrap();
    let ctx = Context::new()
        .with_renderer(Upper)
        .with_variables(Variables::new().with("who", "ada"));
    let ev = Evaluator::new(ctx);

    ev.write(&mut doc, "/r/user[@id=$who]", &json!("lovelace")).unwrap();
    assert_eq!(doc.to_xml(), r#"<r><user id="ADA">LOVELACE</user></r>"#);
    assert_eq!(ev.query_text(&doc, "/r/user[@id=$who]").unwrap(), vec!["LOVELACE"]);
}

#[test]
fn test_custom_converter_feeds_views() {
    let doc = Document::parse_str("<flags><f>yes</f><f>no</f><f>maybe</f></flags>").unwrap();
    let ev = Evaluator::new(Context::new().with_converter(YesNo));
    let mut list = ev.list_view(&doc, "/flags/f", ComponentType::Boolean).unwrap();
    assert_eq!(list.get(&doc, 0).unwrap(), Some(Item::Scalar(json!(true))));
    assert_eq!(list.get(&doc, 1).unwrap(), Some(Item::Scalar(json!(false))));
    assert!(matches!(list.get(&doc, 2), Err(PathError::Conversion(_))));
}

#[test]
fn test_closure_variable_resolver() {
    let doc = Document::parse_str(r#"<a><b k="x">1</b><b k="y">2</b></a>"#).unwrap();
    let resolver = |var: &VariableRef| match var.position {
        Some(0) => Some(json!("y")),
        _ => None,
    };
    let ev = Evaluator::new(Context::new().with_variables(resolver));
    assert_eq!(ev.query_text(&doc, "/a/b[@k=$ARG0]").unwrap(), vec!["2"]);
    assert_eq!(ev.query_text(&doc, "/a/b[@k=$param0]").unwrap(), vec!["2"]);
    assert!(matches!(
        ev.query_text(&doc, "/a/b[@k=$other]"),
        Err(PathError::VariableResolution(_))
    ));
}

#[test]
fn test_variable_format_pattern_applies_to_that_variable_only() {
    let doc = Document::parse_str(r#"<prices><p amount="2.50">a</p><p amount="3">b</p></prices>"#).unwrap();
    let ctx = Context::new().with_variables(Variables::new().arg(2.5).arg(3));
    let expr = xpd::compile("/prices/p[@amount=$0{using 0.00}]").unwrap();
    assert_eq!(expr.variable_format_pattern("0"), Some("0.00"));
    assert_eq!(
        xpd::evaluate_string(&expr, &doc, doc.root(), &ctx).unwrap().as_deref(),
        Some("a")
    );
    let expr = xpd::compile("/prices/p[@amount=$1]").unwrap();
    assert_eq!(
        xpd::evaluate_string(&expr, &doc, doc.root(), &ctx).unwrap().as_deref(),
        Some("b")
    );
}

#[test]
fn test_options_drive_the_context() {
    let opts: xpd::Options = serde_json::from_value(json!({
        "namespaces": { "m": "urn:m" },
        "variables": { "sku": "A-1" },
        "trim_whitespace": false
    }))
    .unwrap();
    let ev = Evaluator::new(Context::from_options(&opts));
    let mut doc = Document::parse_str("<cat xmlns:m=\"urn:m\">\n  <m:item sku=\"A-1\"/>\n</cat>").unwrap();
    assert_eq!(ev.query(&doc, "/cat/m:item[@sku=$sku]").unwrap().len(), 1);
    ev.delete(&mut doc, "/cat/m:item[@sku=$sku]").unwrap();
    // whitespace is kept when trimming is off
    assert_eq!(doc.to_xml(), "<cat xmlns:m=\"urn:m\">\n  \n</cat>");
}
