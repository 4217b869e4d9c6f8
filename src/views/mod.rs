//! Live, lazily refreshed projections of a path onto a document.
//!
//! A view caches the nodes its expression selected and a dirty flag it shares
//! (weakly) with the document. Any mutation made through the document marks
//! every registered view dirty; the next access re-evaluates. A view's own
//! successful mutation leaves it clean because its cache already reflects
//! the change.
//!
//! Views never own the document. Reads take `&Document`, writes take
//! `&mut Document`.

mod list;
mod value;

pub use list::ListView;
pub use value::ValueView;

use serde_json::Value;

use crate::builder;
use crate::context::Context;
use crate::dom::{Document, NodeId, NodeKind};
use crate::equality;
use crate::errors::{PathError, Result};
use crate::expression::CompiledExpression;
use crate::services::ComponentType;

/// What a view yields and accepts.
#[derive(Debug, Clone)]
pub enum Item {
    Scalar(Value),
    /// A standalone tree; its document element carries the content.
    Fragment(Document),
}

impl Item {
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Item::Scalar(v) => Some(v),
            Item::Fragment(_) => None,
        }
    }

    pub fn as_fragment(&self) -> Option<&Document> {
        match self {
            Item::Fragment(d) => Some(d),
            Item::Scalar(_) => None,
        }
    }
}

impl From<Value> for Item {
    fn from(v: Value) -> Self {
        Item::Scalar(v)
    }
}

impl From<&str> for Item {
    fn from(s: &str) -> Self {
        Item::Scalar(Value::String(s.to_string()))
    }
}

impl From<i64> for Item {
    fn from(n: i64) -> Self {
        Item::Scalar(Value::from(n))
    }
}

impl From<Document> for Item {
    fn from(d: Document) -> Self {
        Item::Fragment(d)
    }
}

/// Scalars compare by value, fragments by structure.
impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Item::Scalar(a), Item::Scalar(b)) => a == b,
            (Item::Fragment(a), Item::Fragment(b)) => equality::equals(a, a.root(), b, b.root()),
            _ => false,
        }
    }
}

/// Read `node` as `component`.
pub(crate) fn read_item(
    doc: &Document,
    node: NodeId,
    component: ComponentType,
    expr: &CompiledExpression,
    ctx: &Context,
) -> Result<Item> {
    match component {
        ComponentType::Fragment => doc.extract(node).map(Item::Fragment),
        _ => ctx
            .services
            .converter
            .convert(component, &doc.text_content(node), expr.format_pattern())
            .map(Item::Scalar),
    }
}

/// Store `item` into `node`: scalars become its text, fragments replace its
/// attributes and children. The element keeps its own name.
pub(crate) fn write_item(
    doc: &mut Document,
    node: NodeId,
    item: &Item,
    expr: &CompiledExpression,
    ctx: &Context,
) -> Result<()> {
    match item {
        Item::Scalar(v) => {
            let text = ctx.services.renderer.render(v, expr.format_pattern())?;
            doc.set_text_content(node, &text)
        }
        Item::Fragment(fragment) => {
            let source = fragment
                .document_element()
                .ok_or_else(|| PathError::eval("fragment has no element"))?;
            match doc.kind(node) {
                NodeKind::Element => {
                    doc.clear_element(node);
                    doc.copy_content(fragment, source, node)?;
                    // The node's own prefix may have been declared on it.
                    let prefix = doc.prefix(node).map(str::to_string);
                    let ns = doc.namespace(node).map(str::to_string);
                    builder::declare_namespace(doc, node, prefix.as_deref(), ns.as_deref())
                }
                _ => doc.set_text_content(node, &fragment.text_content(source)),
            }
        }
    }
}

/// Whether `node` holds `item`: rendered text for scalars, structural content
/// for fragments.
pub(crate) fn item_matches(
    doc: &Document,
    node: NodeId,
    item: &Item,
    expr: &CompiledExpression,
    ctx: &Context,
) -> Result<bool> {
    match item {
        Item::Scalar(v) => {
            let text = ctx.services.renderer.render(v, expr.format_pattern())?;
            Ok(doc.text_content(node) == text)
        }
        Item::Fragment(fragment) => Ok(match fragment.document_element() {
            Some(source) if doc.is_element(node) => equality::content_equals(doc, node, fragment, source),
            Some(source) => doc.text_content(node) == fragment.text_content(source),
            None => false,
        }),
    }
}

/// Detach `node` and drop whitespace-only text left in its parent.
pub(crate) fn detach_and_trim(doc: &mut Document, node: NodeId, ctx: &Context) {
    let parent = doc.parent(node);
    doc.detach(node);
    if let (Some(p), true) = (parent, ctx.trim_whitespace) {
        doc.trim_whitespace(p);
    }
}
