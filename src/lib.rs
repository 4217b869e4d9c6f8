//! Duplex XML path expressions: one compiled path both reads a document and
//! synthesizes the structure it names on write.
//!
//! ```
//! use xml_path_duplex::{Document, Evaluator};
//! use serde_json::json;
//!
//! let mut doc = Document::parse_str("<root/>").unwrap();
//! let ev = Evaluator::default();
//! ev.write(&mut doc, "/root/foo/@bar", &json!("13")).unwrap();
//! assert_eq!(doc.to_xml(), r#"<root><foo bar="13"/></root>"#);
//! assert_eq!(ev.query_text(&doc, "/root/foo/@bar").unwrap(), vec!["13"]);
//! ```

pub mod errors;
pub mod context;
pub mod dom;
pub mod engine;     // read evaluator
pub mod builder;    // write (duplex) evaluator
pub mod equality;
pub mod namespace;
pub mod path;
pub mod filter;
pub mod services;   // renderer / converter / variable plug-ins
pub mod views;
mod expression;
mod parser;
mod comparison;

use serde_json::Value;

pub use builder::{
    create_child_with_predicate, delete, delete_all_matching_children, ensure_existence, ensure_parent_existence,
    write_value, Mode, StepFilter,
};
pub use context::{Context, Options};
pub use dom::{Document, NodeId, NodeKind};
pub use engine::{evaluate_node_set, evaluate_string, evaluate_value, from_xml};
pub use errors::{PathError, Result};
pub use expression::{compile, CompiledExpression};
pub use services::{ComponentType, Renderer, TypeConverter, VariableResolver, Variables};
pub use views::{Item, ListView, ValueView};

/// Compiles expression text and runs it against documents with one
/// [`Context`]. Everything here is also available as free functions taking a
/// [`CompiledExpression`].
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    ctx: Context,
}

impl Evaluator {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Nodes selected from the document node.
    pub fn query(&self, doc: &Document, expr: &str) -> Result<Vec<NodeId>> {
        evaluate_node_set(&compile(expr)?, doc, doc.root(), &self.ctx)
    }

    /// Texts of the nodes selected from the document node.
    pub fn query_text(&self, doc: &Document, expr: &str) -> Result<Vec<String>> {
        Ok(self
            .query(doc, expr)?
            .into_iter()
            .map(|n| doc.text_content(n))
            .collect())
    }

    /// Create `expr` as needed and store `value` there.
    pub fn write(&self, doc: &mut Document, expr: &str, value: &Value) -> Result<NodeId> {
        let root = doc.root();
        write_value(&compile(expr)?, doc, root, &self.ctx, value)
    }

    /// Remove every node `expr` selects; returns how many.
    pub fn delete(&self, doc: &mut Document, expr: &str) -> Result<usize> {
        let root = doc.root();
        delete(&compile(expr)?, doc, root, &self.ctx)
    }

    pub fn list_view(&self, doc: &Document, expr: &str, component: ComponentType) -> Result<ListView> {
        Ok(ListView::new(doc, compile(expr)?, doc.root(), component, &self.ctx))
    }

    pub fn value_view(&self, doc: &Document, expr: &str, component: ComponentType) -> Result<ValueView> {
        Ok(ValueView::new(doc, compile(expr)?, doc.root(), component, &self.ctx))
    }
}
