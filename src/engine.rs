use std::collections::HashSet;

use itertools::Itertools;
use serde_json::Value;

use crate::context::Context;
use crate::dom::{Document, NodeId, NodeKind};
use crate::errors::{PathError, Result};
use crate::expression::{compile, CompiledExpression};
use crate::filter::{self, Predicate, PredicateOutcome};
use crate::namespace::NamespaceMap;
use crate::path::{Axis, NameTest, Path, Segment, Step};
use crate::services::ComponentType;

/// =========================
/// Evaluation scope
/// =========================

/// What one evaluation needs besides the tree: the caller's context and the
/// namespace map resolved against the document being walked.
pub(crate) struct Scope<'c> {
    pub ctx: &'c Context,
    pub namespaces: NamespaceMap,
}

impl<'c> Scope<'c> {
    pub fn new(doc: &Document, ctx: &'c Context) -> Self {
        Self {
            ctx,
            namespaces: NamespaceMap::resolve(doc, &ctx.namespaces),
        }
    }

    /// Namespace URI the step's name test refers to (`None` for wildcards and
    /// unprefixed names).
    pub fn namespace_of(&self, step: &Step) -> Result<Option<&str>> {
        match &step.name {
            NameTest::Wildcard => Ok(None),
            NameTest::Name(q) => self.namespaces.namespace_for(q),
        }
    }
}

/// =========================
/// Public API (read)
/// =========================

/// Every node `expr` selects, starting at `context`, in document order and
/// without duplicates. "No match" is an empty vector, never an error.
pub fn evaluate_node_set(
    expr: &CompiledExpression,
    doc: &Document,
    context: NodeId,
    ctx: &Context,
) -> Result<Vec<NodeId>> {
    let scope = Scope::new(doc, ctx);
    let nodes = eval_path(expr.path(), doc, context, &scope)?;
    tracing::trace!(expr = expr.stripped_text(), matches = nodes.len(), "evaluated node set");
    Ok(nodes)
}

/// Text of the first selected node; `None` when nothing matches.
pub fn evaluate_string(
    expr: &CompiledExpression,
    doc: &Document,
    context: NodeId,
    ctx: &Context,
) -> Result<Option<String>> {
    Ok(evaluate_node_set(expr, doc, context, ctx)?
        .first()
        .map(|&n| doc.text_content(n)))
}

/// First selected node converted to `component` through the context's
/// [`TypeConverter`](crate::services::TypeConverter), honouring the
/// expression's ` using ` pattern.
pub fn evaluate_value(
    expr: &CompiledExpression,
    doc: &Document,
    context: NodeId,
    ctx: &Context,
    component: ComponentType,
) -> Result<Option<Value>> {
    match evaluate_string(expr, doc, context, ctx)? {
        Some(text) => ctx
            .services
            .converter
            .convert(component, &text, expr.format_pattern())
            .map(Some),
        None => Ok(None),
    }
}

/// Convenience: parse `xml`, evaluate `path` from the document node and
/// return the matched nodes' texts.
pub fn from_xml(xml: &str, path: &str) -> Result<Vec<String>> {
    let doc = Document::parse_str(xml)?;
    let expr = compile(path)?;
    let nodes = evaluate_node_set(&expr, &doc, doc.root(), &Context::default())?;
    Ok(nodes.into_iter().map(|n| doc.text_content(n)).collect())
}

/// =========================
/// Walker
/// =========================

pub(crate) fn eval_path(path: &Path, doc: &Document, context: NodeId, scope: &Scope) -> Result<Vec<NodeId>> {
    let mut current = vec![context];
    for seg in &path.segments {
        current = match seg {
            Segment::Root => vec![doc.root()],
            Segment::Step(step) => {
                let mut next = Vec::new();
                for &node in &current {
                    next.extend(eval_step(step, doc, node, scope)?);
                }
                next.into_iter().unique().collect()
            }
        };
        if current.is_empty() {
            break;
        }
    }
    Ok(current)
}

pub(crate) fn eval_step(step: &Step, doc: &Document, node: NodeId, scope: &Scope) -> Result<Vec<NodeId>> {
    let candidates = match step.axis {
        Axis::Child => matching_children(step, doc, node, scope)?,
        Axis::Attribute => matching_attributes(step, doc, node, scope)?,
        Axis::SelfNode => match doc.kind(node) {
            NodeKind::Document => doc.document_element().into_iter().collect(),
            _ => vec![node],
        },
        Axis::Parent => match doc.parent(node) {
            Some(p) if doc.is_element(p) => vec![p],
            _ => {
                return Err(PathError::eval(format!(
                    "`..` from <{}> has no parent element",
                    doc.qualified_name(node)
                )))
            }
        },
        Axis::Descendant => return eval_descendant(step, doc, node, scope),
    };
    apply_predicates(&step.predicates, candidates, doc, scope)
}

// `//x` is "x children of the node or any descendant": predicates (and
// positions) apply per parent, results come back in document order.
fn eval_descendant(step: &Step, doc: &Document, node: NodeId, scope: &Scope) -> Result<Vec<NodeId>> {
    let below = doc.descendant_elements(node);
    let mut hits = HashSet::new();
    for holder in std::iter::once(node).chain(below.iter().copied()) {
        let children = matching_children(step, doc, holder, scope)?;
        hits.extend(apply_predicates(&step.predicates, children, doc, scope)?);
    }
    Ok(below.into_iter().filter(|n| hits.contains(n)).collect())
}

/// Same-named child elements of `node`, in document order.
pub(crate) fn matching_children(step: &Step, doc: &Document, node: NodeId, scope: &Scope) -> Result<Vec<NodeId>> {
    let wanted = scope.namespace_of(step)?;
    Ok(doc
        .child_elements(node)
        .filter(|&c| step.matches_name(doc.local_name(c), doc.namespace(c), wanted))
        .collect())
}

fn matching_attributes(step: &Step, doc: &Document, node: NodeId, scope: &Scope) -> Result<Vec<NodeId>> {
    if !doc.is_element(node) {
        return Ok(Vec::new());
    }
    match &step.name {
        NameTest::Wildcard => Ok(doc
            .attributes(node)
            .iter()
            .copied()
            .filter(|&a| !doc.is_namespace_declaration(a))
            .collect()),
        NameTest::Name(q) => {
            let ns = scope.namespaces.namespace_for(q)?;
            Ok(doc.attribute(node, &q.local, ns).into_iter().collect())
        }
    }
}

/// Narrow `candidates` by each predicate in turn. Positions are 1-based and
/// count within the list left by the previous predicate.
pub(crate) fn apply_predicates(
    preds: &[Predicate],
    mut candidates: Vec<NodeId>,
    doc: &Document,
    scope: &Scope,
) -> Result<Vec<NodeId>> {
    for pred in preds {
        let mut kept = Vec::with_capacity(candidates.len());
        for (i, &c) in candidates.iter().enumerate() {
            let keep = match filter::evaluate(pred, doc, c, scope)? {
                PredicateOutcome::Matched(b) => b,
                PredicateOutcome::Position(n) => n == i + 1,
            };
            if keep {
                kept.push(c);
            }
        }
        candidates = kept;
    }
    Ok(candidates)
}
