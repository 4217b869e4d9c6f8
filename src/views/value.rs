use std::cell::Cell;
use std::rc::Rc;

use super::{detach_and_trim, read_item, write_item, Item};
use crate::builder;
use crate::context::Context;
use crate::dom::{Document, NodeId};
use crate::engine;
use crate::errors::{PathError, Result};
use crate::expression::CompiledExpression;
use crate::namespace::{NamespaceMap, DEFAULT_NS_PREFIX};
use crate::path::QualifiedName;
use crate::services::ComponentType;

/// A live optional value: the first node an expression selects, if any.
#[derive(Debug)]
pub struct ValueView {
    expr: CompiledExpression,
    context: NodeId,
    component: ComponentType,
    ctx: Context,
    node: Option<NodeId>,
    dirty: Rc<Cell<bool>>,
}

impl ValueView {
    pub fn new(
        doc: &Document,
        expr: CompiledExpression,
        context: NodeId,
        component: ComponentType,
        ctx: &Context,
    ) -> Self {
        let dirty = Rc::new(Cell::new(true));
        doc.register_observer(&dirty);
        Self {
            expr,
            context,
            component,
            ctx: ctx.clone(),
            node: None,
            dirty,
        }
    }

    pub fn expression(&self) -> &CompiledExpression {
        &self.expr
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn notify_changed(&self) {
        self.dirty.set(true);
    }

    pub fn detach_from(&self, doc: &Document) {
        doc.unregister_observer(&self.dirty);
    }

    fn guard<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.dirty.set(true);
        }
        result
    }

    pub fn refresh_for_read(&mut self, doc: &Document) -> Result<()> {
        if !self.dirty.get() {
            return Ok(());
        }
        let nodes = self.guard(engine::evaluate_node_set(&self.expr, doc, self.context, &self.ctx))?;
        tracing::trace!(expr = self.expr.stripped_text(), present = !nodes.is_empty(), "value view refreshed");
        self.node = nodes.first().copied();
        self.dirty.set(false);
        Ok(())
    }

    /// Refresh, creating the node when it is missing. Returns the node.
    pub fn refresh_for_write(&mut self, doc: &mut Document) -> Result<NodeId> {
        self.refresh_for_read(doc)?;
        if let Some(node) = self.node.filter(|&n| doc.is_attached(n)) {
            return Ok(node);
        }
        let node = self.guard(builder::ensure_existence(&self.expr, doc, self.context, &self.ctx))?;
        self.node = Some(node);
        self.dirty.set(false);
        Ok(node)
    }

    pub fn is_present(&mut self, doc: &Document) -> Result<bool> {
        self.refresh_for_read(doc)?;
        Ok(self.node.is_some())
    }

    pub fn get(&mut self, doc: &Document) -> Result<Option<Item>> {
        self.refresh_for_read(doc)?;
        match self.node {
            Some(node) => read_item(doc, node, self.component, &self.expr, &self.ctx).map(Some),
            None => Ok(None),
        }
    }

    pub fn set(&mut self, doc: &mut Document, item: Item) -> Result<()> {
        let node = self.refresh_for_write(doc)?;
        self.guard(write_item(doc, node, &item, &self.expr, &self.ctx))?;
        self.dirty.set(false);
        Ok(())
    }

    /// Remove the node if present. Nothing is created.
    pub fn remove(&mut self, doc: &mut Document) -> Result<bool> {
        self.refresh_for_read(doc)?;
        let Some(node) = self.node.take() else {
            return Ok(false);
        };
        detach_and_trim(doc, node, &self.ctx);
        tracing::debug!(expr = self.expr.stripped_text(), "value removed");
        self.dirty.set(false);
        Ok(true)
    }

    /// Give the node a new name (`local` or `prefix:local`), keeping its
    /// position, children and value. The view goes dirty: the renamed node
    /// is generally no longer what the expression selects.
    pub fn rename(&mut self, doc: &mut Document, new_name: &str) -> Result<()> {
        self.refresh_for_read(doc)?;
        let node = self
            .node
            .ok_or_else(|| PathError::eval(format!("`{}` selects nothing to rename", self.expr.stripped_text())))?;
        let name = QualifiedName::parse(new_name);
        let namespaces = NamespaceMap::resolve(doc, self.ctx.namespace_overrides());
        let ns = self.guard(namespaces.namespace_for(&name))?;
        let prefix = match name.prefix.as_deref() {
            Some(DEFAULT_NS_PREFIX) => None,
            p => p,
        };
        let copy = self.guard(doc.renamed_copy(node, prefix, &name.local, ns))?;
        self.guard(doc.replace_node(node, copy))?;
        if prefix.is_some() || doc.is_element(copy) {
            self.guard(builder::declare_namespace(doc, copy, prefix, ns))?;
        }
        tracing::debug!(from = %doc.qualified_name(node), to = %name, "node renamed");
        self.node = None;
        self.dirty.set(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::compile;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn view(doc: &Document, path: &str) -> ValueView {
        ValueView::new(doc, compile(path).unwrap(), doc.root(), ComponentType::Text, &Context::default())
    }

    #[test]
    fn absent_then_created() {
        let mut doc = Document::parse_str("<r/>").unwrap();
        let mut v = view(&doc, "/r/a/@b");
        assert!(!v.is_present(&doc).unwrap());
        assert_eq!(v.get(&doc).unwrap(), None);
        v.set(&mut doc, Item::from("x")).unwrap();
        assert_eq!(doc.to_xml(), r#"<r><a b="x"/></r>"#);
        assert_eq!(v.get(&doc).unwrap(), Some(Item::Scalar(json!("x"))));
        assert!(v.remove(&mut doc).unwrap());
        assert_eq!(doc.to_xml(), "<r><a/></r>");
        assert!(!v.remove(&mut doc).unwrap());
    }

    #[test]
    fn rename_keeps_position_and_content() {
        let mut doc = Document::parse_str(r#"<r><x/><old k="1">t</old><y/></r>"#).unwrap();
        let mut v = view(&doc, "/r/old");
        v.rename(&mut doc, "new").unwrap();
        assert_eq!(doc.to_xml(), r#"<r><x/><new k="1">t</new><y/></r>"#);
        assert!(v.is_dirty());
        assert!(!v.is_present(&doc).unwrap());
    }

    #[test]
    fn rename_attribute() {
        let mut doc = Document::parse_str(r#"<r a="1" b="2"/>"#).unwrap();
        let mut v = view(&doc, "/r/@a");
        v.rename(&mut doc, "c").unwrap();
        assert_eq!(doc.to_xml(), r#"<r c="1" b="2"/>"#);
    }

    #[test]
    fn rename_attribute_onto_an_existing_name_fails() {
        let xml = r#"<r a="1" c="2"/>"#;
        let mut doc = Document::parse_str(xml).unwrap();
        let mut v = view(&doc, "/r/@a");
        assert!(matches!(v.rename(&mut doc, "c"), Err(PathError::Evaluation(_))));
        assert!(v.is_dirty());
        assert_eq!(doc.to_xml(), xml);
        assert!(Document::parse_str(&doc.to_xml()).is_ok());

        // Renaming to its own name is not a clash.
        v.rename(&mut doc, "a").unwrap();
        assert_eq!(doc.to_xml(), xml);
    }

    #[test]
    fn rename_of_missing_node_fails() {
        let mut doc = Document::parse_str("<r/>").unwrap();
        let mut v = view(&doc, "/r/none");
        assert!(matches!(v.rename(&mut doc, "x"), Err(PathError::Evaluation(_))));
    }
}
