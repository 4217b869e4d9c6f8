//! Write side of duplex evaluation: the same compiled path that reads a node
//! can create it (and whatever is missing above it) or delete it.
//!
//! Every operation goes through one walker, parameterised by a [`Mode`] and a
//! [`StepFilter`]. Only the last processed step runs in the requested mode;
//! the steps before it resolve-or-create (or, when deleting, only resolve).

use itertools::Itertools;
use serde_json::Value;

use crate::context::Context;
use crate::dom::{Document, NodeId, NodeKind, XMLNS_NAMESPACE};
use crate::engine::{self, Scope};
use crate::errors::{PathError, Result};
use crate::expression::CompiledExpression;
use crate::filter::{self, CmpOp, FilterExpr, Operand, Predicate};
use crate::namespace::DEFAULT_NS_PREFIX;
use crate::path::{Axis, NameTest, Path, Segment, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Use the single existing match, create it when there is none.
    ResolveOrCreate,
    /// Always create a new node.
    ForceCreate,
    /// Remove every match.
    Delete,
}

/// Which steps of the path the walker processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFilter {
    All,
    AllButLast,
    OnlyLast,
}

// What to do at one step. `Resolve` is the read-only action intermediate
// steps take while deleting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Resolve,
    ResolveOrCreate,
    ForceCreate,
    Delete,
}

/// Run the walker directly. The four named operations below cover the usual
/// cases; this is the general form.
pub fn resolve(
    expr: &CompiledExpression,
    doc: &mut Document,
    context: NodeId,
    ctx: &Context,
    mode: Mode,
    filter: StepFilter,
) -> Result<Vec<NodeId>> {
    expr.path().check_writable()?;
    let scope = Scope::new(doc, ctx);
    walk(expr.path(), doc, context, &scope, mode, filter)
}

/// The node `expr` selects from `context`, created (with any missing
/// ancestors) if absent. Calling it again finds the same node.
pub fn ensure_existence(expr: &CompiledExpression, doc: &mut Document, context: NodeId, ctx: &Context) -> Result<NodeId> {
    let nodes = resolve(expr, doc, context, ctx, Mode::ResolveOrCreate, StepFilter::All)?;
    single(expr, nodes)
}

/// The node that holds `expr`'s last step, created if absent.
pub fn ensure_parent_existence(
    expr: &CompiledExpression,
    doc: &mut Document,
    context: NodeId,
    ctx: &Context,
) -> Result<NodeId> {
    let nodes = resolve(expr, doc, context, ctx, Mode::ResolveOrCreate, StepFilter::AllButLast)?;
    single(expr, nodes)
}

/// Append a new node for `expr`'s last step under `parent`, even when an
/// identical sibling exists. The step's predicates become initial values.
pub fn create_child_with_predicate(
    expr: &CompiledExpression,
    doc: &mut Document,
    parent: NodeId,
    ctx: &Context,
) -> Result<NodeId> {
    let nodes = resolve(expr, doc, parent, ctx, Mode::ForceCreate, StepFilter::OnlyLast)?;
    single(expr, nodes)
}

/// Remove every node `expr`'s last step matches under `parent`, repeating
/// until none is left. Fails if a round leaves the same nodes matching.
pub fn delete_all_matching_children(
    expr: &CompiledExpression,
    doc: &mut Document,
    parent: NodeId,
    ctx: &Context,
) -> Result<()> {
    expr.path().check_writable()?;
    let Some(Segment::Step(last)) = expr.path().segments.last() else {
        return Err(PathError::unsupported("deleting the document node"));
    };
    let scope = Scope::new(doc, ctx);
    let mut matches = engine::eval_step(last, doc, parent, &scope)?;
    while !matches.is_empty() {
        walk(expr.path(), doc, parent, &scope, Mode::Delete, StepFilter::OnlyLast)?;
        let now = engine::eval_step(last, doc, parent, &scope)?;
        if now == matches {
            return Err(PathError::InfiniteDeletionLoop {
                path: expr.stripped_text().to_string(),
                remaining: now.len(),
            });
        }
        matches = now;
    }
    Ok(())
}

/// Ensure the node exists, then set its text to `value` rendered through the
/// context's renderer and the expression's ` using ` pattern.
pub fn write_value(
    expr: &CompiledExpression,
    doc: &mut Document,
    context: NodeId,
    ctx: &Context,
    value: &Value,
) -> Result<NodeId> {
    let node = ensure_existence(expr, doc, context, ctx)?;
    let text = ctx.services.renderer.render(value, expr.format_pattern())?;
    doc.set_text_content(node, &text)?;
    Ok(node)
}

/// Remove every match of `expr`. Missing ancestors are not created; the
/// returned count is zero then.
pub fn delete(expr: &CompiledExpression, doc: &mut Document, context: NodeId, ctx: &Context) -> Result<usize> {
    let removed = resolve(expr, doc, context, ctx, Mode::Delete, StepFilter::All)?;
    Ok(removed.len())
}

fn single(expr: &CompiledExpression, nodes: Vec<NodeId>) -> Result<NodeId> {
    match nodes.as_slice() {
        [node] => Ok(*node),
        [] => Err(PathError::eval(format!("`{}` did not produce a node", expr.stripped_text()))),
        _ => Err(PathError::AmbiguousPath {
            step: expr.stripped_text().to_string(),
            count: nodes.len(),
        }),
    }
}

// ---- walker -------------------------------------------------------------

fn walk(
    path: &Path,
    doc: &mut Document,
    context: NodeId,
    scope: &Scope,
    mode: Mode,
    filter: StepFilter,
) -> Result<Vec<NodeId>> {
    let segments: &[Segment] = match filter {
        StepFilter::All => &path.segments,
        StepFilter::AllButLast => match path.segments.split_last() {
            Some((Segment::Step(_), rest)) => rest,
            _ => &path.segments,
        },
        StepFilter::OnlyLast => match path.segments.split_last() {
            Some((last, _)) => std::slice::from_ref(last),
            None => &[],
        },
    };

    let mut current = vec![context];
    for (i, seg) in segments.iter().enumerate() {
        let action = match (i + 1 == segments.len(), mode) {
            (true, Mode::ResolveOrCreate) => Action::ResolveOrCreate,
            (true, Mode::ForceCreate) => Action::ForceCreate,
            (true, Mode::Delete) => Action::Delete,
            (false, Mode::Delete) => Action::Resolve,
            (false, _) => Action::ResolveOrCreate,
        };
        let mut next = Vec::new();
        for &node in &current {
            next.extend(apply_segment(seg, action, doc, node, scope)?);
        }
        current = next.into_iter().unique().collect();
        if current.is_empty() {
            break;
        }
    }
    Ok(current)
}

fn apply_segment(seg: &Segment, action: Action, doc: &mut Document, node: NodeId, scope: &Scope) -> Result<Vec<NodeId>> {
    let step = match seg {
        Segment::Root => {
            return match action {
                Action::Resolve | Action::ResolveOrCreate => Ok(vec![doc.root()]),
                Action::ForceCreate => Err(PathError::unsupported("creating the document node")),
                Action::Delete => Err(PathError::unsupported("deleting the document node")),
            }
        }
        Segment::Step(step) => step,
    };
    match step.axis {
        Axis::Attribute => attribute_step(step, action, doc, node, scope),
        Axis::Child => child_step(step, action, doc, node, scope),
        Axis::SelfNode | Axis::Parent => navigation_step(step, action, doc, node, scope),
        Axis::Descendant => match action {
            Action::Resolve => engine::eval_step(step, doc, node, scope),
            _ => Err(PathError::unsupported("//")),
        },
    }
}

fn attribute_step(step: &Step, action: Action, doc: &mut Document, node: NodeId, scope: &Scope) -> Result<Vec<NodeId>> {
    if action == Action::ForceCreate {
        return Err(PathError::unsupported(format!("creating another `{step}`")));
    }
    let found = engine::eval_step(step, doc, node, scope)?;
    match action {
        Action::Resolve => Ok(found),
        Action::Delete => {
            for &attr in &found {
                tracing::debug!(attribute = %doc.qualified_name(attr), "deleting attribute");
                doc.detach(attr);
            }
            Ok(found)
        }
        Action::ResolveOrCreate | Action::ForceCreate => match found.len() {
            0 => create_attribute(step, doc, node, scope).map(|a| vec![a]),
            1 => Ok(found),
            n => Err(ambiguous(step, n)),
        },
    }
}

fn child_step(step: &Step, action: Action, doc: &mut Document, node: NodeId, scope: &Scope) -> Result<Vec<NodeId>> {
    match action {
        Action::Resolve => engine::eval_step(step, doc, node, scope),
        Action::ForceCreate => create_element(step, doc, node, scope).map(|e| vec![e]),
        Action::Delete => {
            let found = engine::eval_step(step, doc, node, scope)?;
            if !found.is_empty() {
                if scope.ctx.trim_whitespace {
                    doc.trim_whitespace(node);
                }
                for &child in &found {
                    tracing::debug!(element = %doc.qualified_name(child), "deleting element");
                    doc.detach(child);
                }
            }
            Ok(found)
        }
        Action::ResolveOrCreate => {
            let found = engine::eval_step(step, doc, node, scope)?;
            match found.len() {
                0 => create_missing(step, doc, node, scope).map(|e| vec![e]),
                1 => Ok(found),
                n => Err(ambiguous(step, n)),
            }
        }
    }
}

fn navigation_step(step: &Step, action: Action, doc: &mut Document, node: NodeId, scope: &Scope) -> Result<Vec<NodeId>> {
    match action {
        Action::Resolve => engine::eval_step(step, doc, node, scope),
        Action::ForceCreate => Err(PathError::unsupported(format!("creating `{step}`"))),
        Action::ResolveOrCreate => {
            let found = engine::eval_step(step, doc, node, scope)?;
            if found.is_empty() {
                return Err(PathError::eval(format!("`{step}` does not select a node")));
            }
            Ok(found)
        }
        Action::Delete => {
            let found = engine::eval_step(step, doc, node, scope)?;
            for &n in &found {
                if let (Some(parent), true) = (doc.parent(n), scope.ctx.trim_whitespace) {
                    doc.trim_whitespace(parent);
                }
                tracing::debug!(node = %doc.qualified_name(n), "deleting node");
                doc.detach(n);
            }
            Ok(found)
        }
    }
}

fn ambiguous(step: &Step, count: usize) -> PathError {
    tracing::debug!(step = %step, count, "ambiguous write target");
    PathError::AmbiguousPath {
        step: step.to_string(),
        count,
    }
}

// ---- creation -----------------------------------------------------------

// A missing child. `[n]` past the end of the matching siblings appends
// siblings until the n-th exists.
fn create_missing(step: &Step, doc: &mut Document, parent: NodeId, scope: &Scope) -> Result<NodeId> {
    let positional = step.predicates.iter().enumerate().find_map(|(i, p)| match p {
        Predicate::Positional(n) => Some((i, *n)),
        Predicate::Expr(_) => None,
    });
    let Some((index, n)) = positional else {
        return create_element(step, doc, parent, scope);
    };
    if n == 0 {
        return Err(PathError::eval(format!("position 0 in `{step}`; positions start at 1")));
    }
    let siblings = engine::matching_children(step, doc, parent, scope)?;
    let existing = engine::apply_predicates(&step.predicates[..index], siblings, doc, scope)?.len();
    let count = n.saturating_sub(existing).max(1);
    let mut created = create_element(step, doc, parent, scope)?;
    for _ in 1..count {
        created = create_element(step, doc, parent, scope)?;
    }
    Ok(created)
}

fn create_element(step: &Step, doc: &mut Document, parent: NodeId, scope: &Scope) -> Result<NodeId> {
    let NameTest::Name(q) = &step.name else {
        return Err(PathError::unsupported(format!("creating `{step}`")));
    };
    let ns = scope.namespaces.namespace_for(q)?;
    let prefix = match q.prefix.as_deref() {
        Some(DEFAULT_NS_PREFIX) => None,
        p => p,
    };
    let element = doc.create_element(prefix, &q.local, ns);
    if doc.kind(parent) == NodeKind::Document {
        if let Some(old) = doc.document_element() {
            tracing::debug!(old = %doc.qualified_name(old), new = %q, "replacing document element");
            doc.detach(old);
        }
    }
    doc.append_child(parent, element)?;
    declare_namespace(doc, element, prefix, ns)?;
    tracing::debug!(element = %q, "created element");
    assign_predicates(&step.predicates, doc, element, scope)?;
    Ok(element)
}

fn create_attribute(step: &Step, doc: &mut Document, element: NodeId, scope: &Scope) -> Result<NodeId> {
    let NameTest::Name(q) = &step.name else {
        return Err(PathError::unsupported(format!("creating `{step}`")));
    };
    if !doc.is_element(element) {
        return Err(PathError::eval(format!(
            "cannot create `{step}` on a {:?} node",
            doc.kind(element)
        )));
    }
    if q.prefix.as_deref() == Some(DEFAULT_NS_PREFIX) {
        return Err(PathError::eval(format!("`{DEFAULT_NS_PREFIX}` cannot qualify attribute `{q}`")));
    }
    let ns = scope.namespaces.namespace_for(q)?;
    if q.prefix.is_some() {
        declare_namespace(doc, element, q.prefix.as_deref(), ns)?;
    }
    let attr = doc.set_attribute(element, q.prefix.as_deref(), &q.local, ns, "")?;
    tracing::debug!(attribute = %q, "created attribute");
    assign_predicates(&step.predicates, doc, attr, scope)?;
    Ok(attr)
}

// Make the serialized form carry the namespace the node was created with.
// Prefixes go on the document element when it does not bind them yet.
pub(crate) fn declare_namespace(doc: &mut Document, node: NodeId, prefix: Option<&str>, ns: Option<&str>) -> Result<()> {
    if matches!(prefix, Some("xml") | Some("xmlns")) || in_scope_namespace(doc, node, prefix) == ns {
        return Ok(());
    }
    let element = if doc.is_element(node) {
        node
    } else {
        doc.parent(node)
            .ok_or_else(|| PathError::eval("cannot declare a namespace on a detached node"))?
    };
    let uri = ns.unwrap_or_default();
    match prefix {
        Some(p) => {
            let holder = match doc.document_element() {
                Some(root) if doc.attribute(root, p, Some(XMLNS_NAMESPACE)).is_none() => root,
                _ => element,
            };
            doc.set_attribute(holder, Some("xmlns"), p, Some(XMLNS_NAMESPACE), uri)?;
        }
        None => {
            doc.set_attribute(element, None, "xmlns", Some(XMLNS_NAMESPACE), uri)?;
        }
    }
    Ok(())
}

fn in_scope_namespace<'d>(doc: &'d Document, node: NodeId, prefix: Option<&str>) -> Option<&'d str> {
    let mut cursor = Some(node);
    while let Some(n) = cursor {
        if doc.is_element(n) {
            let decl = doc.attribute(n, prefix.unwrap_or("xmlns"), Some(XMLNS_NAMESPACE));
            if let Some(d) = decl {
                return Some(doc.value(d)).filter(|v| !v.is_empty());
            }
        }
        cursor = doc.parent(n);
    }
    None
}

// Predicates on a freshly created node become its initial content:
// `b[@x='2']` gets x="2", `b[c]` gets a <c/> child.
fn assign_predicates(preds: &[Predicate], doc: &mut Document, node: NodeId, scope: &Scope) -> Result<()> {
    for pred in preds {
        match pred {
            Predicate::Positional(_) => {}
            Predicate::Expr(e) => assign(e, doc, node, scope)?,
        }
    }
    Ok(())
}

fn assign(expr: &FilterExpr, doc: &mut Document, node: NodeId, scope: &Scope) -> Result<()> {
    match expr {
        FilterExpr::Compare { op: CmpOp::Eq, lhs, rhs } => {
            let (target, source) = match (lhs, rhs) {
                (Operand::Path(p), other) => (p, other),
                (other, Operand::Path(p)) => (p, other),
                _ => return Ok(()),
            };
            let value = filter::operand_texts(source, doc, node, scope)?
                .into_iter()
                .next()
                .unwrap_or_default();
            for n in walk(target, doc, node, scope, Mode::ResolveOrCreate, StepFilter::All)? {
                doc.set_text_content(n, &value)?;
            }
            Ok(())
        }
        FilterExpr::Compare { op, .. } => Err(PathError::unsupported(format!("operator `{op}`"))),
        FilterExpr::Exists(Operand::Path(p)) => {
            walk(p, doc, node, scope, Mode::ResolveOrCreate, StepFilter::All)?;
            Ok(())
        }
        FilterExpr::Exists(Operand::Literal(_) | Operand::Variable(_)) => Ok(()),
        FilterExpr::And(parts) => {
            for part in parts {
                assign(part, doc, node, scope)?;
            }
            Ok(())
        }
        FilterExpr::Or(_) => Err(PathError::unsupported("or")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::compile;
    use crate::services::Variables;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn write(xml: &str, path: &str, value: Value) -> Result<String> {
        let mut doc = Document::parse_str(xml)?;
        let root = doc.root();
        write_value(&compile(path)?, &mut doc, root, &Context::default(), &value)?;
        Ok(doc.to_xml())
    }

    #[test]
    fn creates_missing_structure() {
        assert_eq!(write("<root/>", "/root/foo/@bar", json!("13")).unwrap(), r#"<root><foo bar="13"/></root>"#);
        assert_eq!(write("<root/>", "/root/a/b", json!(5)).unwrap(), "<root><a><b>5</b></a></root>");
    }

    #[test]
    fn predicates_select_or_seed_the_target() {
        let xml = r#"<a><b x="1"/><b x="2"/></a>"#;
        assert_eq!(
            write(xml, "/a/b[@x='2']/@y", json!("v")).unwrap(),
            r#"<a><b x="1"/><b x="2" y="v"/></a>"#
        );
        assert_eq!(
            write(xml, "/a/b[@x='3' and c='k']/d", json!("z")).unwrap(),
            r#"<a><b x="1"/><b x="2"/><b x="3"><c>k</c><d>z</d></b></a>"#
        );
        assert_eq!(write("<a/>", "/a/b[flag]/@v", json!("1")).unwrap(), r#"<a><b v="1"><flag/></b></a>"#);
    }

    #[test]
    fn ambiguous_targets_are_rejected() {
        let err = write(r#"<a><b x="1"/><b x="2"/></a>"#, "/a/b", json!("v")).unwrap_err();
        match err {
            PathError::AmbiguousPath { step, count } => {
                assert_eq!(step, "b");
                assert_eq!(count, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn positional_write_pads_siblings() {
        assert_eq!(write("<a><b>1</b></a>", "/a/b[3]", json!("3")).unwrap(), "<a><b>1</b><b/><b>3</b></a>");
        assert_eq!(write("<a><b>1</b><b>2</b></a>", "/a/b[2]", json!("x")).unwrap(), "<a><b>1</b><b>x</b></a>");
        assert!(matches!(write("<a/>", "/a/b[0]", json!("x")), Err(PathError::Evaluation(_))));
    }

    #[test]
    fn ensure_existence_is_idempotent() {
        let mut doc = Document::parse_str("<r/>").unwrap();
        let root = doc.root();
        let ctx = Context::default();
        let expr = compile("/r/a/b[@k='1']").unwrap();
        let first = ensure_existence(&expr, &mut doc, root, &ctx).unwrap();
        let second = ensure_existence(&expr, &mut doc, root, &ctx).unwrap();
        assert_eq!(first, second);
        assert_eq!(doc.to_xml(), r#"<r><a><b k="1"/></a></r>"#);
    }

    #[test]
    fn parent_and_forced_children() {
        let mut doc = Document::parse_str("<r/>").unwrap();
        let root = doc.root();
        let ctx = Context::default();
        let expr = compile("/r/list/item[@n=$0]").unwrap();
        let parent = ensure_parent_existence(&expr, &mut doc, root, &ctx).unwrap();
        assert_eq!(doc.local_name(parent), "list");

        let ctx = ctx.with_variables(Variables::new().arg("a"));
        let one = create_child_with_predicate(&expr, &mut doc, parent, &ctx).unwrap();
        let two = create_child_with_predicate(&expr, &mut doc, parent, &ctx).unwrap();
        assert_ne!(one, two);
        assert_eq!(doc.to_xml(), r#"<r><list><item n="a"/><item n="a"/></list></r>"#);
    }

    #[test]
    fn writing_a_new_root_replaces_the_old_one() {
        assert_eq!(write("<old/>", "/new/@v", json!(1)).unwrap(), r#"<new v="1"/>"#);
    }

    #[test]
    fn namespaces_are_declared_for_new_nodes() {
        let mut doc = Document::parse_str("<r/>").unwrap();
        let root = doc.root();
        let ctx = Context::new().with_namespace("p", "urn:p");
        let expr = compile("/r/p:a/@p:b").unwrap();
        write_value(&expr, &mut doc, root, &ctx, &json!("1")).unwrap();
        assert_eq!(doc.to_xml(), r#"<r xmlns:p="urn:p"><p:a p:b="1"/></r>"#);

        let mut doc = Document::parse_str(r#"<r xmlns="urn:d"/>"#).unwrap();
        let root = doc.root();
        let expr = compile("/xbdefaultns:r/xbdefaultns:a").unwrap();
        write_value(&expr, &mut doc, root, &Context::default(), &json!("x")).unwrap();
        assert_eq!(doc.to_xml(), r#"<r xmlns="urn:d"><a>x</a></r>"#);
    }

    #[test]
    fn read_only_constructs_are_rejected() {
        for path in ["//b", "/a/b[@x!='1']", "/a/b[@x='1' or @y='2']", "/a/b[c > 1]"] {
            assert!(
                matches!(write("<a/>", path, json!("v")), Err(PathError::UnsupportedForWriting { .. })),
                "{path}"
            );
        }
        let mut doc = Document::parse_str("<a><b/></a>").unwrap();
        let a = doc.document_element().unwrap();
        let expr = compile("@x").unwrap();
        assert!(matches!(
            create_child_with_predicate(&expr, &mut doc, a, &Context::default()),
            Err(PathError::UnsupportedForWriting { .. })
        ));
    }

    #[test]
    fn delete_all_matching_children_empties_the_parent() {
        let mut doc = Document::parse_str("<a>\n  <b>1</b>\n  <b>2</b>\n</a>").unwrap();
        let a = doc.document_element().unwrap();
        let ctx = Context::default();
        let expr = compile("/a/b").unwrap();
        delete_all_matching_children(&expr, &mut doc, a, &ctx).unwrap();
        assert_eq!(doc.to_xml(), "<a/>");
        // nothing left to delete
        delete_all_matching_children(&expr, &mut doc, a, &ctx).unwrap();
        assert_eq!(doc.to_xml(), "<a/>");
    }

    #[test]
    fn delete_all_with_position_repeats_until_empty() {
        let mut doc = Document::parse_str("<a><b/><b/><c/></a>").unwrap();
        let a = doc.document_element().unwrap();
        delete_all_matching_children(&compile("b[1]").unwrap(), &mut doc, a, &Context::default()).unwrap();
        assert_eq!(doc.to_xml(), "<a><c/></a>");
    }

    #[test]
    fn deletion_without_progress_fails_fast() {
        let mut doc = Document::parse_str("<r><a><b/></a></r>").unwrap();
        let r = doc.document_element().unwrap();
        let a = doc.children(r)[0];
        let b = doc.children(a)[0];
        let err = delete_all_matching_children(&compile("..").unwrap(), &mut doc, b, &Context::default()).unwrap_err();
        assert!(matches!(err, PathError::InfiniteDeletionLoop { remaining: 1, .. }));
    }

    #[test]
    fn delete_does_not_create_missing_parents() {
        let mut doc = Document::parse_str(r#"<a><b x="1"/><b x="2"/></a>"#).unwrap();
        let root = doc.root();
        let ctx = Context::default();
        assert_eq!(delete(&compile("/a/missing/b").unwrap(), &mut doc, root, &ctx).unwrap(), 0);
        assert_eq!(delete(&compile("/a/b/@x").unwrap(), &mut doc, root, &ctx).unwrap(), 2);
        assert_eq!(doc.to_xml(), "<a><b/><b/></a>");
    }
}
