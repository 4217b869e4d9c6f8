use std::cell::Cell;
use std::rc::Rc;

use super::{detach_and_trim, item_matches, read_item, write_item, Item};
use crate::builder;
use crate::context::Context;
use crate::dom::{Document, NodeId};
use crate::engine;
use crate::errors::{PathError, Result};
use crate::expression::CompiledExpression;
use crate::services::ComponentType;

/// A live list of every node an expression selects.
///
/// Reads (`get`, `len`, `index_of`, ...) refresh without touching the tree.
/// Writes (`add`, `set`, `remove`, ...) refresh and, when the list is empty,
/// create the element that will hold its items.
#[derive(Debug)]
pub struct ListView {
    expr: CompiledExpression,
    context: NodeId,
    component: ComponentType,
    ctx: Context,
    content: Vec<NodeId>,
    parent: Option<NodeId>,
    dirty: Rc<Cell<bool>>,
}

impl ListView {
    /// Bind `expr`, evaluated from `context`, to `doc`. The view starts dirty.
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
            content: Vec::new(),
            parent: None,
            dirty,
        }
    }

    pub fn expression(&self) -> &CompiledExpression {
        &self.expr
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Force the next access to re-evaluate.
    pub fn notify_changed(&self) {
        self.dirty.set(true);
    }

    /// Stop receiving change notifications from `doc`.
    pub fn detach_from(&self, doc: &Document) {
        doc.unregister_observer(&self.dirty);
    }

    // A failed operation leaves the cache untrusted.
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
        tracing::trace!(expr = self.expr.stripped_text(), items = nodes.len(), "list view refreshed");
        self.parent = nodes.last().and_then(|&n| doc.parent(n));
        self.content = nodes;
        self.dirty.set(false);
        Ok(())
    }

    /// Refresh, then make sure the element holding the items exists.
    /// Returns that element.
    pub fn refresh_for_write(&mut self, doc: &mut Document) -> Result<NodeId> {
        self.refresh_for_read(doc)?;
        if let Some(parent) = self.parent.filter(|&p| doc.is_attached(p)) {
            return Ok(parent);
        }
        let parent = self.guard(builder::ensure_parent_existence(&self.expr, doc, self.context, &self.ctx))?;
        self.parent = Some(parent);
        self.dirty.set(false);
        Ok(parent)
    }

    pub fn len(&mut self, doc: &Document) -> Result<usize> {
        self.refresh_for_read(doc)?;
        Ok(self.content.len())
    }

    pub fn is_empty(&mut self, doc: &Document) -> Result<bool> {
        Ok(self.len(doc)? == 0)
    }

    pub fn get(&mut self, doc: &Document, index: usize) -> Result<Option<Item>> {
        self.refresh_for_read(doc)?;
        match self.content.get(index) {
            Some(&node) => read_item(doc, node, self.component, &self.expr, &self.ctx).map(Some),
            None => Ok(None),
        }
    }

    /// The live nodes behind the items.
    pub fn nodes(&mut self, doc: &Document) -> Result<&[NodeId]> {
        self.refresh_for_read(doc)?;
        Ok(&self.content)
    }

    pub fn to_vec(&mut self, doc: &Document) -> Result<Vec<Item>> {
        self.refresh_for_read(doc)?;
        self.content
            .iter()
            .map(|&n| read_item(doc, n, self.component, &self.expr, &self.ctx))
            .collect()
    }

    pub fn index_of(&mut self, doc: &Document, item: &Item) -> Result<Option<usize>> {
        self.refresh_for_read(doc)?;
        self.position(doc, item)
    }

    pub fn contains(&mut self, doc: &Document, item: &Item) -> Result<bool> {
        Ok(self.index_of(doc, item)?.is_some())
    }

    fn position(&self, doc: &Document, item: &Item) -> Result<Option<usize>> {
        for (i, &node) in self.content.iter().enumerate() {
            if item_matches(doc, node, item, &self.expr, &self.ctx)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// Append a new node holding `item`, right after the current last item.
    /// A new node is created even if an equal item is already present.
    pub fn add(&mut self, doc: &mut Document, item: Item) -> Result<()> {
        let parent = self.refresh_for_write(doc)?;
        let node = self.guard(builder::create_child_with_predicate(&self.expr, doc, parent, &self.ctx))?;
        if let Some(&last) = self.content.last() {
            if let (Some(p), Some(i)) = (doc.parent(last), doc.index_in_parent(last)) {
                if p == parent {
                    self.guard(doc.insert_child(parent, i + 1, node))?;
                }
            }
        }
        self.guard(write_item(doc, node, &item, &self.expr, &self.ctx))?;
        tracing::debug!(expr = self.expr.stripped_text(), index = self.content.len(), "list item added");
        self.content.push(node);
        self.dirty.set(false);
        Ok(())
    }

    /// Replace the content of the item at `index` in place.
    pub fn set(&mut self, doc: &mut Document, index: usize, item: Item) -> Result<()> {
        self.refresh_for_write(doc)?;
        let node = *self
            .content
            .get(index)
            .ok_or_else(|| PathError::eval(format!("index {index} out of range for {} items", self.content.len())))?;
        self.guard(write_item(doc, node, &item, &self.expr, &self.ctx))?;
        self.dirty.set(false);
        Ok(())
    }

    /// Remove the first item equal to `item`. Returns whether one was found.
    pub fn remove(&mut self, doc: &mut Document, item: &Item) -> Result<bool> {
        self.refresh_for_write(doc)?;
        let Some(index) = self.guard(self.position(doc, item))? else {
            return Ok(false);
        };
        self.remove_node(doc, index);
        Ok(true)
    }

    /// Remove and return the item at `index`.
    pub fn remove_at(&mut self, doc: &mut Document, index: usize) -> Result<Item> {
        self.refresh_for_write(doc)?;
        let node = *self
            .content
            .get(index)
            .ok_or_else(|| PathError::eval(format!("index {index} out of range for {} items", self.content.len())))?;
        let item = self.guard(read_item(doc, node, self.component, &self.expr, &self.ctx))?;
        self.remove_node(doc, index);
        Ok(item)
    }

    /// Remove every item. The element that held them stays.
    pub fn clear(&mut self, doc: &mut Document) -> Result<()> {
        self.refresh_for_read(doc)?;
        for node in std::mem::take(&mut self.content) {
            detach_and_trim(doc, node, &self.ctx);
        }
        self.dirty.set(false);
        Ok(())
    }

    fn remove_node(&mut self, doc: &mut Document, index: usize) {
        let node = self.content.remove(index);
        detach_and_trim(doc, node, &self.ctx);
        tracing::debug!(expr = self.expr.stripped_text(), index, "list item removed");
        self.dirty.set(false);
    }
}
