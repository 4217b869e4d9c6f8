//! Compact XML serialization (no declaration, no indentation) through
//! `quick_xml::Writer`.

use std::io;

use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::{Document, NodeId, NodeKind};

impl Document {
    /// Serialize the whole document.
    pub fn to_xml(&self) -> String {
        self.node_to_xml(self.root())
    }

    /// Serialize a single node and its subtree.
    pub fn node_to_xml(&self, id: NodeId) -> String {
        let mut writer = Writer::new(Vec::new());
        // Writing into a Vec<u8> cannot fail.
        let _ = self.write_node(id, &mut writer);
        let buf = writer.into_inner();
        String::from_utf8(buf).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
    }

    fn write_node(&self, id: NodeId, writer: &mut Writer<Vec<u8>>) -> io::Result<()> {
        match self.kind(id) {
            NodeKind::Document => {
                for &child in self.children(id) {
                    self.write_node(child, writer)?;
                }
            }
            NodeKind::Element => {
                let name = self.qualified_name(id);
                let mut start = BytesStart::new(name.as_str());
                for &attr in self.attributes(id) {
                    let attr_name = self.qualified_name(attr);
                    start.push_attribute((attr_name.as_str(), self.value(attr)));
                }
                if self.children(id).is_empty() {
                    return writer.write_event(Event::Empty(start));
                }
                writer.write_event(Event::Start(start))?;
                for &child in self.children(id) {
                    self.write_node(child, writer)?;
                }
                writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
            }
            // A lone attribute serializes as `name="value"`.
            NodeKind::Attribute => {
                let text = format!("{}=\"{}\"", self.qualified_name(id), escape(self.value(id)));
                writer.get_mut().extend_from_slice(text.as_bytes());
            }
            NodeKind::Text => writer.write_event(Event::Text(BytesText::new(self.value(id))))?,
            NodeKind::Comment => writer.write_event(Event::Comment(BytesText::from_escaped(self.value(id))))?,
        }
        Ok(())
    }
}

impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_xml())
    }
}
