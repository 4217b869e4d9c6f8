//! Build a [`Document`] from XML text using `roxmltree`.

use roxmltree::NodeType;

use super::{Document, NodeId, XMLNS_NAMESPACE, XML_NAMESPACE};
use crate::errors::Result;

pub(super) fn parse(text: &str) -> Result<Document> {
    let source = roxmltree::Document::parse(text)?;
    let mut doc = Document::new();
    let root = doc.root();
    for child in source.root().children() {
        copy_node(&mut doc, root, child)?;
    }
    Ok(doc)
}

fn copy_node(doc: &mut Document, parent: NodeId, node: roxmltree::Node<'_, '_>) -> Result<()> {
    match node.node_type() {
        NodeType::Element => {
            let tag = node.tag_name();
            let prefix = tag.namespace().and_then(|uri| prefix_for(node, uri));
            let element = doc.create_element(prefix, tag.name(), tag.namespace());
            doc.append_child(parent, element)?;

            // roxmltree reports in-scope namespaces; keep only those declared here.
            let inherited: Vec<(Option<&str>, &str)> = node
                .parent_element()
                .map(|p| p.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
                .unwrap_or_default();
            for ns in node.namespaces() {
                if ns.uri() == XML_NAMESPACE || inherited.contains(&(ns.name(), ns.uri())) {
                    continue;
                }
                match ns.name() {
                    Some(name) => doc.set_attribute(element, Some("xmlns"), name, Some(XMLNS_NAMESPACE), ns.uri())?,
                    None => doc.set_attribute(element, None, "xmlns", Some(XMLNS_NAMESPACE), ns.uri())?,
                };
            }

            for attr in node.attributes() {
                let prefix = attr.namespace().and_then(|uri| prefix_for(node, uri));
                doc.set_attribute(element, prefix, attr.name(), attr.namespace(), attr.value())?;
            }
            for child in node.children() {
                copy_node(doc, element, child)?;
            }
        }
        NodeType::Text => {
            let t = doc.create_text(node.text().unwrap_or_default());
            doc.append_child(parent, t)?;
        }
        NodeType::Comment => {
            let c = doc.create_comment(node.text().unwrap_or_default());
            doc.append_child(parent, c)?;
        }
        NodeType::Root | NodeType::PI => {}
    }
    Ok(())
}

fn prefix_for<'a>(node: roxmltree::Node<'a, '_>, uri: &str) -> Option<&'a str> {
    if uri == XML_NAMESPACE {
        return Some("xml");
    }
    node.namespaces()
        .find(|ns| ns.uri() == uri && ns.name().is_some())
        .and_then(|ns| ns.name())
}
