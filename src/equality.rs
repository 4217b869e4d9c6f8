//! Structural equality and hashing of nodes, possibly across documents.
//!
//! Two matches of the same logical node pulled from separate queries (or from
//! a fragment and the live tree) are never the same `NodeId`; list views use
//! these functions to decide "already contains" and "remove this value".

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use itertools::Itertools;

use crate::dom::{Document, NodeId};

/// Deep structural equality.
pub fn equals(a_doc: &Document, a: NodeId, b_doc: &Document, b: NodeId) -> bool {
    same_label(a_doc, a, b_doc, b) && content_equals(a_doc, a, b_doc, b)
}

/// Attributes and children equal; the nodes' own names and values are not
/// compared.
pub fn content_equals(a_doc: &Document, a: NodeId, b_doc: &Document, b: NodeId) -> bool {
    attributes_equal(a_doc, a, b_doc, b) && lists_equal(a_doc, a_doc.children(a), b_doc, b_doc.children(b))
}

/// Pairwise, in order.
pub fn lists_equal(a_doc: &Document, a: &[NodeId], b_doc: &Document, b: &[NodeId]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| equals(a_doc, x, b_doc, y))
}

/// Attribute sets as unordered sets.
pub fn attributes_equal(a_doc: &Document, a: NodeId, b_doc: &Document, b: NodeId) -> bool {
    let xs = canonical_attributes(a_doc, a);
    let ys = canonical_attributes(b_doc, b);
    xs.len() == ys.len() && xs.iter().zip(&ys).all(|(&x, &y)| equals(a_doc, x, b_doc, y))
}

fn same_label(a_doc: &Document, a: NodeId, b_doc: &Document, b: NodeId) -> bool {
    a_doc.kind(a) == b_doc.kind(b)
        && a_doc.local_name(a) == b_doc.local_name(b)
        && a_doc.namespace(a) == b_doc.namespace(b)
        && a_doc.prefix(a) == b_doc.prefix(b)
        && a_doc.value(a) == b_doc.value(b)
}

// Sorted by (namespace, local name, value).
fn canonical_attributes(doc: &Document, id: NodeId) -> Vec<NodeId> {
    doc.attributes(id)
        .iter()
        .copied()
        .sorted_by(|&x, &y| {
            (doc.namespace(x), doc.local_name(x), doc.value(x)).cmp(&(doc.namespace(y), doc.local_name(y), doc.value(y)))
        })
        .collect()
}

/// Feed the node's structure into `state`; consistent with [`equals`].
pub fn hash_node<H: Hasher>(doc: &Document, id: NodeId, state: &mut H) {
    doc.kind(id).hash(state);
    doc.local_name(id).hash(state);
    doc.namespace(id).hash(state);
    doc.prefix(id).hash(state);
    doc.value(id).hash(state);
    let attrs = canonical_attributes(doc, id);
    attrs.len().hash(state);
    for attr in attrs {
        hash_node(doc, attr, state);
    }
    doc.children(id).len().hash(state);
    for &child in doc.children(id) {
        hash_node(doc, child, state);
    }
}

pub fn node_hash(doc: &Document, id: NodeId) -> u64 {
    let mut h = DefaultHasher::new();
    hash_node(doc, id, &mut h);
    h.finish()
}

/// A node compared by structure rather than identity, for use in hash sets
/// and `Itertools::unique`.
#[derive(Debug, Clone, Copy)]
pub struct StructuralNode<'a> {
    pub doc: &'a Document,
    pub id: NodeId,
}

impl<'a> StructuralNode<'a> {
    pub fn new(doc: &'a Document, id: NodeId) -> Self {
        Self { doc, id }
    }
}

impl PartialEq for StructuralNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        equals(self.doc, self.id, other.doc, other.id)
    }
}

impl Eq for StructuralNode<'_> {}

impl Hash for StructuralNode<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_node(self.doc, self.id, state);
    }
}
