//! A small mutable XML tree that path expressions are evaluated against.
//!
//! Nodes live in an arena owned by [`Document`] and are addressed by copyable
//! [`NodeId`] handles. Removing a node only detaches it; the slot stays in the
//! arena so handles held by callers never dangle, they just stop being
//! reachable (see [`Document::is_attached`]).
//!
//! The document also owns the observer list used by live views: every
//! structural mutation marks all registered views dirty.

mod load;
mod serialize;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::errors::{PathError, Result};

pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Handle to a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    prefix: Option<String>,
    local: String,
    namespace: Option<String>,
    value: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: Vec<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            prefix: None,
            local: String::new(),
            namespace: None,
            value: String::new(),
            parent: None,
            children: Vec::new(),
            attributes: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Document {
    nodes: Vec<NodeData>,
    observers: RefCell<Vec<Weak<Cell<bool>>>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloning copies the tree but not the observer list: views stay bound to the
/// original document.
impl Clone for Document {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            observers: RefCell::new(Vec::new()),
        }
    }
}

impl Document {
    /// An empty document holding only the document node.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData::new(NodeKind::Document)],
            observers: RefCell::new(Vec::new()),
        }
    }

    /// Parse XML text into a new document.
    pub fn parse_str(text: &str) -> Result<Self> {
        load::parse(text)
    }

    /// The document node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The single top-level element, if any.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|&c| self.kind(c) == NodeKind::Element)
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.data(id).kind
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.kind(id) == NodeKind::Element
    }

    pub fn local_name(&self, id: NodeId) -> &str {
        &self.data(id).local
    }

    pub fn prefix(&self, id: NodeId) -> Option<&str> {
        self.data(id).prefix.as_deref()
    }

    pub fn namespace(&self, id: NodeId) -> Option<&str> {
        self.data(id).namespace.as_deref()
    }

    /// `prefix:local`, or just `local` when unprefixed.
    pub fn qualified_name(&self, id: NodeId) -> String {
        let data = self.data(id);
        match &data.prefix {
            Some(p) => format!("{p}:{}", data.local),
            None => data.local.clone(),
        }
    }

    /// Raw value of attribute, text and comment nodes; empty for the rest.
    pub fn value(&self, id: NodeId) -> &str {
        &self.data(id).value
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.data(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.data(id).children
    }

    pub fn attributes(&self, id: NodeId) -> &[NodeId] {
        &self.data(id).attributes
    }

    /// Child elements only, in document order.
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |&c| self.is_element(c))
    }

    /// Whether `attr` is an `xmlns` or `xmlns:*` declaration.
    pub fn is_namespace_declaration(&self, attr: NodeId) -> bool {
        let data = self.data(attr);
        data.kind == NodeKind::Attribute
            && (data.prefix.as_deref() == Some("xmlns")
                || (data.prefix.is_none() && data.local == "xmlns"))
    }

    /// Concatenated text of all descendant text nodes (elements, document) or
    /// the node's own value (attributes, text, comments).
    pub fn text_content(&self, id: NodeId) -> String {
        match self.kind(id) {
            NodeKind::Document | NodeKind::Element => {
                let mut out = String::new();
                self.collect_text(id, &mut out);
                out
            }
            NodeKind::Attribute | NodeKind::Text | NodeKind::Comment => self.value(id).to_string(),
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for &child in self.children(id) {
            match self.kind(child) {
                NodeKind::Text => out.push_str(self.value(child)),
                NodeKind::Element => self.collect_text(child, out),
                _ => {}
            }
        }
    }

    /// Pre-order list of every element below `id` (excluding `id` itself).
    pub fn descendant_elements(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.child_elements(id).collect();
        stack.reverse();
        while let Some(next) = stack.pop() {
            out.push(next);
            let mut kids: Vec<NodeId> = self.child_elements(next).collect();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Whether the node can still be reached from the document node.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root() {
                return true;
            }
            match self.parent(current) {
                Some(p) => current = p,
                None => return false,
            }
        }
    }

    /// Position of `id` among its parent's children (or attributes).
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        let siblings = if self.kind(id) == NodeKind::Attribute {
            self.attributes(parent)
        } else {
            self.children(parent)
        };
        siblings.iter().position(|&s| s == id)
    }

    /// Find an attribute by local name and namespace URI.
    pub fn attribute(&self, element: NodeId, local: &str, namespace: Option<&str>) -> Option<NodeId> {
        self.attributes(element).iter().copied().find(|&a| {
            let data = self.data(a);
            data.local == local && data.namespace.as_deref() == namespace
        })
    }

    // ---- construction -------------------------------------------------

    fn push(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(data);
        NodeId(self.nodes.len() - 1)
    }

    /// A new, detached element.
    pub fn create_element(&mut self, prefix: Option<&str>, local: &str, namespace: Option<&str>) -> NodeId {
        let mut data = NodeData::new(NodeKind::Element);
        data.prefix = prefix.map(str::to_string);
        data.local = local.to_string();
        data.namespace = namespace.map(str::to_string);
        self.push(data)
    }

    /// A new, detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        let mut data = NodeData::new(NodeKind::Text);
        data.value = text.to_string();
        self.push(data)
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        let mut data = NodeData::new(NodeKind::Comment);
        data.value = text.to_string();
        self.push(data)
    }

    fn create_attribute(&mut self, prefix: Option<&str>, local: &str, namespace: Option<&str>, value: &str) -> NodeId {
        let mut data = NodeData::new(NodeKind::Attribute);
        data.prefix = prefix.map(str::to_string);
        data.local = local.to_string();
        data.namespace = namespace.map(str::to_string);
        data.value = value.to_string();
        self.push(data)
    }

    // ---- mutation -----------------------------------------------------

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check_container(parent, child)?;
        self.unlink(child);
        self.data_mut(child).parent = Some(parent);
        self.data_mut(parent).children.push(child);
        self.touch();
        Ok(())
    }

    /// Insert `child` at `index` among `parent`'s children, detaching it first.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<()> {
        self.check_container(parent, child)?;
        self.unlink(child);
        let len = self.children(parent).len();
        self.data_mut(child).parent = Some(parent);
        self.data_mut(parent).children.insert(index.min(len), child);
        self.touch();
        Ok(())
    }

    /// Put `replacement` where `old` is and detach `old`. An attribute may not
    /// take the name of another attribute on the same element.
    pub fn replace_node(&mut self, old: NodeId, replacement: NodeId) -> Result<()> {
        let parent = self
            .parent(old)
            .ok_or_else(|| PathError::eval("cannot replace a node without parent"))?;
        if self.kind(old) == NodeKind::Attribute {
            let (local, ns) = (self.local_name(replacement), self.namespace(replacement));
            if let Some(clash) = self.attribute(parent, local, ns).filter(|&a| a != old) {
                return Err(PathError::eval(format!(
                    "element already has an attribute `{}`",
                    self.qualified_name(clash)
                )));
            }
            let index = self.index_in_parent(old).unwrap_or(0);
            self.unlink(replacement);
            self.unlink(old);
            self.data_mut(replacement).parent = Some(parent);
            let attrs = &mut self.data_mut(parent).attributes;
            attrs.insert(index.min(attrs.len()), replacement);
            self.touch();
            return Ok(());
        }
        let index = self.index_in_parent(old).unwrap_or(0);
        self.unlink(old);
        self.insert_child(parent, index, replacement)
    }

    /// Remove `id` from its parent. Detached nodes are left alone.
    pub fn detach(&mut self, id: NodeId) {
        if self.parent(id).is_some() {
            self.unlink(id);
            self.touch();
        }
    }

    fn unlink(&mut self, id: NodeId) {
        let Some(parent) = self.data(id).parent else {
            return;
        };
        let is_attr = self.kind(id) == NodeKind::Attribute;
        let parent_data = self.data_mut(parent);
        if is_attr {
            parent_data.attributes.retain(|&a| a != id);
        } else {
            parent_data.children.retain(|&c| c != id);
        }
        self.data_mut(id).parent = None;
    }

    fn check_container(&self, parent: NodeId, child: NodeId) -> Result<()> {
        match self.kind(parent) {
            NodeKind::Document | NodeKind::Element => {}
            other => return Err(PathError::eval(format!("{other:?} nodes cannot hold children"))),
        }
        if matches!(self.kind(child), NodeKind::Attribute | NodeKind::Document) {
            return Err(PathError::eval(format!(
                "{:?} nodes cannot be appended as children",
                self.kind(child)
            )));
        }
        let mut cursor = Some(parent);
        while let Some(node) = cursor {
            if node == child {
                return Err(PathError::eval("cannot append a node below itself"));
            }
            cursor = self.parent(node);
        }
        Ok(())
    }

    /// Create or update an attribute; returns the attribute node.
    pub fn set_attribute(
        &mut self,
        element: NodeId,
        prefix: Option<&str>,
        local: &str,
        namespace: Option<&str>,
        value: &str,
    ) -> Result<NodeId> {
        if !self.is_element(element) {
            return Err(PathError::eval(format!(
                "cannot set attribute `{local}` on a {:?} node",
                self.kind(element)
            )));
        }
        if let Some(existing) = self.attribute(element, local, namespace) {
            self.data_mut(existing).value = value.to_string();
            self.touch();
            return Ok(existing);
        }
        let attr = self.create_attribute(prefix, local, namespace, value);
        self.data_mut(attr).parent = Some(element);
        self.data_mut(element).attributes.push(attr);
        self.touch();
        Ok(attr)
    }

    /// Replace the text of a node. Elements lose all children and get a
    /// single text child (none if `text` is empty).
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> Result<()> {
        match self.kind(id) {
            NodeKind::Element => {
                for child in self.children(id).to_vec() {
                    self.unlink(child);
                }
                if !text.is_empty() {
                    let t = self.create_text(text);
                    self.data_mut(t).parent = Some(id);
                    self.data_mut(id).children.push(t);
                }
            }
            NodeKind::Attribute | NodeKind::Text | NodeKind::Comment => {
                self.data_mut(id).value = text.to_string();
            }
            NodeKind::Document => {
                return Err(PathError::eval("cannot set text on the document node"));
            }
        }
        self.touch();
        Ok(())
    }

    /// Remove all attributes and children of an element.
    pub fn clear_element(&mut self, id: NodeId) {
        for attr in self.attributes(id).to_vec() {
            self.unlink(attr);
        }
        for child in self.children(id).to_vec() {
            self.unlink(child);
        }
        self.touch();
    }

    /// Drop whitespace-only text children of `parent`.
    pub fn trim_whitespace(&mut self, parent: NodeId) {
        let blank: Vec<NodeId> = self
            .children(parent)
            .iter()
            .copied()
            .filter(|&c| self.kind(c) == NodeKind::Text && self.value(c).trim().is_empty())
            .collect();
        if blank.is_empty() {
            return;
        }
        for node in blank {
            self.unlink(node);
        }
        self.touch();
    }

    /// Copy `source`'s attributes and (deeply) its children onto the element
    /// `target`. Existing attributes of the same name are overwritten.
    pub fn copy_content(&mut self, source_doc: &Document, source: NodeId, target: NodeId) -> Result<()> {
        for &attr in source_doc.attributes(source) {
            let data = source_doc.data(attr);
            self.set_attribute(
                target,
                data.prefix.as_deref(),
                &data.local,
                data.namespace.as_deref(),
                &data.value,
            )?;
        }
        for &child in source_doc.children(source) {
            let copy = self.import_node(source_doc, child);
            self.append_child(target, copy)?;
        }
        Ok(())
    }

    /// Deep-copy a node from `source_doc` (which may be `self`'s clone or any
    /// other document) into this arena. The copy is detached.
    pub fn import_node(&mut self, source_doc: &Document, source: NodeId) -> NodeId {
        let src = source_doc.data(source);
        let mut data = NodeData::new(src.kind);
        data.prefix = src.prefix.clone();
        data.local = src.local.clone();
        data.namespace = src.namespace.clone();
        data.value = src.value.clone();
        let id = self.push(data);
        for &attr in &src.attributes {
            let copy = self.import_node(source_doc, attr);
            self.data_mut(copy).parent = Some(id);
            self.data_mut(id).attributes.push(copy);
        }
        for &child in &src.children {
            let copy = self.import_node(source_doc, child);
            self.data_mut(copy).parent = Some(id);
            self.data_mut(id).children.push(copy);
        }
        id
    }

    /// Deep copy of a node within this arena. The copy is detached.
    fn deep_copy(&mut self, id: NodeId) -> NodeId {
        let src = self.data(id).clone();
        let copy = self.push(NodeData {
            parent: None,
            children: Vec::new(),
            attributes: Vec::new(),
            ..src.clone()
        });
        for attr in src.attributes {
            let a = self.deep_copy(attr);
            self.data_mut(a).parent = Some(copy);
            self.data_mut(copy).attributes.push(a);
        }
        for child in src.children {
            let c = self.deep_copy(child);
            self.data_mut(c).parent = Some(copy);
            self.data_mut(copy).children.push(c);
        }
        copy
    }

    /// Deep-copy `id` into a fresh standalone document (as its document
    /// element when `id` is an element).
    pub fn extract(&self, id: NodeId) -> Result<Document> {
        let mut out = Document::new();
        let root = out.root();
        match self.kind(id) {
            NodeKind::Document => {
                for &child in self.children(id) {
                    let copy = out.import_node(self, child);
                    out.append_child(root, copy)?;
                }
            }
            NodeKind::Element | NodeKind::Text | NodeKind::Comment => {
                let copy = out.import_node(self, id);
                out.append_child(root, copy)?;
            }
            NodeKind::Attribute => {
                return Err(PathError::eval("an attribute cannot be extracted as a fragment"));
            }
        }
        Ok(out)
    }

    /// Copy the node as a plain element carrying a new name; children and
    /// attributes (or, for attributes, the value) are carried over.
    pub(crate) fn renamed_copy(
        &mut self,
        id: NodeId,
        prefix: Option<&str>,
        local: &str,
        namespace: Option<&str>,
    ) -> Result<NodeId> {
        match self.kind(id) {
            NodeKind::Element => {
                let copy = self.create_element(prefix, local, namespace);
                for attr in self.attributes(id).to_vec() {
                    let a = self.deep_copy(attr);
                    self.data_mut(a).parent = Some(copy);
                    self.data_mut(copy).attributes.push(a);
                }
                for child in self.children(id).to_vec() {
                    let c = self.deep_copy(child);
                    self.data_mut(c).parent = Some(copy);
                    self.data_mut(copy).children.push(c);
                }
                Ok(copy)
            }
            NodeKind::Attribute => {
                let value = self.value(id).to_string();
                Ok(self.create_attribute(prefix, local, namespace, &value))
            }
            other => Err(PathError::eval(format!("{other:?} nodes cannot be renamed"))),
        }
    }

    // ---- observers ----------------------------------------------------

    /// Register a dirty flag that is set on every structural change.
    pub fn register_observer(&self, flag: &Rc<Cell<bool>>) {
        self.observers.borrow_mut().push(Rc::downgrade(flag));
    }

    /// Remove a previously registered flag.
    pub fn unregister_observer(&self, flag: &Rc<Cell<bool>>) {
        let target = Rc::downgrade(flag);
        self.observers.borrow_mut().retain(|w| !w.ptr_eq(&target));
    }

    /// Number of live observers, pruning dropped ones.
    pub fn observer_count(&self) -> usize {
        let mut observers = self.observers.borrow_mut();
        observers.retain(|w| w.strong_count() > 0);
        observers.len()
    }

    /// Mark every registered view dirty.
    pub fn notify_changed(&self) {
        let mut observers = self.observers.borrow_mut();
        observers.retain(|w| match w.upgrade() {
            Some(flag) => {
                flag.set(true);
                true
            }
            None => false,
        });
    }

    fn touch(&self) {
        self.notify_changed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn build_and_serialize() {
        let mut doc = Document::new();
        let root = doc.create_element(None, "root", None);
        doc.append_child(doc.root(), root).unwrap();
        let foo = doc.create_element(None, "foo", None);
        doc.append_child(root, foo).unwrap();
        doc.set_attribute(foo, None, "bar", None, "13").unwrap();
        assert_eq!(doc.to_xml(), r#"<root><foo bar="13"/></root>"#);
    }

    #[test]
    fn detached_nodes_are_not_attached() {
        let mut doc = Document::parse_str("<a><b/></a>").unwrap();
        let a = doc.document_element().unwrap();
        let b = doc.children(a)[0];
        assert!(doc.is_attached(b));
        doc.detach(b);
        assert!(!doc.is_attached(b));
        assert_eq!(doc.to_xml(), "<a/>");
    }

    #[test]
    fn cannot_append_below_itself() {
        let mut doc = Document::parse_str("<a><b/></a>").unwrap();
        let a = doc.document_element().unwrap();
        let b = doc.children(a)[0];
        assert!(doc.append_child(b, a).is_err());
    }

    #[test]
    fn observers_are_notified_and_pruned() {
        let mut doc = Document::parse_str("<a/>").unwrap();
        let flag = Rc::new(Cell::new(false));
        doc.register_observer(&flag);
        let a = doc.document_element().unwrap();
        doc.set_text_content(a, "x").unwrap();
        assert!(flag.get());
        drop(flag);
        assert_eq!(doc.observer_count(), 0);
    }

    #[test]
    fn trim_drops_only_blank_text() {
        let mut doc = Document::parse_str("<a>\n  <b/>\n  keep\n</a>").unwrap();
        let a = doc.document_element().unwrap();
        doc.trim_whitespace(a);
        assert_eq!(doc.children(a).len(), 2);
    }
}
