//! Prefix => URI resolution for qualified names in path steps.
//!
//! Prefixes come from the document element's `xmlns:*` declarations, overlaid
//! by caller overrides. Resolution happens at evaluation time because the
//! document may not exist when the expression is compiled.

use std::collections::BTreeMap;

use crate::dom::{Document, XMLNS_NAMESPACE, XML_NAMESPACE};
use crate::errors::{PathError, Result};
use crate::path::QualifiedName;

/// Prefix under which the root's default namespace (`xmlns="..."`) is published.
pub const DEFAULT_NS_PREFIX: &str = "xbdefaultns";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceMap {
    map: BTreeMap<String, String>,
}

impl NamespaceMap {
    /// Declarations on the document element, then `overrides` on top.
    pub fn resolve(doc: &Document, overrides: &BTreeMap<String, String>) -> Self {
        let mut map = BTreeMap::new();
        if let Some(root) = doc.document_element() {
            for &attr in doc.attributes(root) {
                if !doc.is_namespace_declaration(attr) {
                    continue;
                }
                let prefix = match doc.prefix(attr) {
                    Some(_) => doc.local_name(attr).to_string(),
                    None => DEFAULT_NS_PREFIX.to_string(),
                };
                map.insert(prefix, doc.value(attr).to_string());
            }
        }
        for (prefix, uri) in overrides {
            map.insert(prefix.clone(), uri.clone());
        }
        Self { map }
    }

    pub fn uri(&self, prefix: &str) -> Option<&str> {
        match prefix {
            "xml" => Some(XML_NAMESPACE),
            "xmlns" => Some(XMLNS_NAMESPACE),
            _ => self.map.get(prefix).map(String::as_str),
        }
    }

    /// Namespace URI a name refers to. Unprefixed names have none, except the
    /// literal `xmlns`.
    pub fn namespace_for(&self, name: &QualifiedName) -> Result<Option<&str>> {
        match &name.prefix {
            None if name.local == "xmlns" => Ok(Some(XMLNS_NAMESPACE)),
            None => Ok(None),
            Some(p) => self
                .uri(p)
                .map(Some)
                .ok_or_else(|| PathError::eval(format!("unknown namespace prefix `{p}` in `{name}`"))),
        }
    }
}
