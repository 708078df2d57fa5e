//! Markup rendering for document subtrees.
//!
//! The emitter walks the arena iteratively (start/end edges) and writes
//! straight into an `io::Write` sink, so deep trees never recurse.
//!
//! Rendering rules:
//! - Elements are written as `<NAME attr="value">...</NAME>`, never self-closed.
//! - Attribute keys are XML-escaped; values only have `"` and `'` replaced.
//! - Raw text is written after the children, and only for nodes that do not
//!   turn character data into children.
//! - XML raw text goes into CDATA when it holds `<` or `&`, otherwise it is
//!   written verbatim. `&` is included on purpose, so that re-parsing the
//!   output yields the same text. HTML raw text is escaped.
//! - Unnamed nodes (the synthetic root, text nodes) contribute their content only.

use crate::document::Document;
use crate::err::Result;
use crate::flavor::Flavor;
use crate::node::Node;
use indextree::{NodeEdge, NodeId};
use log::trace;
use quick_xml::escape::escape;
use std::io::Write;

const CDATA_OPEN: &[u8] = b"<![CDATA[";
const CDATA_CLOSE: &[u8] = b"]]>";

/// Renders `id` and its subtree into a string.
pub fn render_inner(doc: &Document, id: NodeId, flavor: Flavor) -> String {
    let mut out = Vec::new();
    // Writing into a `Vec` cannot fail.
    let _ = write_inner(doc, id, flavor, &mut out);
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Renders `id` and its subtree into `writer`.
pub fn write_inner<W: Write>(doc: &Document, id: NodeId, flavor: Flavor, writer: &mut W) -> Result<()> {
    let mut emitter = MarkupEmitter { writer, flavor };
    for edge in doc.traverse(id) {
        match edge {
            NodeEdge::Start(node) => emitter.open(&doc[node])?,
            NodeEdge::End(node) => emitter.close(&doc[node])?,
        }
    }
    Ok(())
}

struct MarkupEmitter<'w, W: Write> {
    writer: &'w mut W,
    flavor: Flavor,
}

impl<W: Write> MarkupEmitter<'_, W> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    fn open(&mut self, node: &Node) -> Result<()> {
        let Some(name) = node.name() else {
            return Ok(());
        };
        trace!("open <{}>", name);
        self.write_bytes(b"<")?;
        self.write_bytes(name.as_bytes())?;
        for (key, value) in node.attributes() {
            self.write_bytes(b" ")?;
            self.write_bytes(escape(key.as_str()).as_bytes())?;
            self.write_bytes(b"=\"")?;
            self.write_attribute_value(value)?;
            self.write_bytes(b"\"")?;
        }
        self.write_bytes(b">")
    }

    fn close(&mut self, node: &Node) -> Result<()> {
        if !node.data_as_children() {
            if let Some(text) = node.text() {
                self.write_text(text)?;
            }
        }
        if let Some(name) = node.name() {
            trace!("close </{}>", name);
            self.write_bytes(b"</")?;
            self.write_bytes(name.as_bytes())?;
            self.write_bytes(b">")?;
        }
        Ok(())
    }

    fn write_attribute_value(&mut self, value: &str) -> Result<()> {
        let mut rest = value.as_bytes();
        while let Some(at) = memchr::memchr2(b'"', b'\'', rest) {
            self.write_bytes(&rest[..at])?;
            match rest[at] {
                b'"' => self.write_bytes(b"&quot;")?,
                _ => self.write_bytes(b"&apos;")?,
            }
            rest = &rest[at + 1..];
        }
        self.write_bytes(rest)
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        match self.flavor {
            Flavor::Html => self.write_bytes(escape(text).as_bytes()),
            Flavor::Xml if memchr::memchr2(b'<', b'&', text.as_bytes()).is_some() => {
                self.write_cdata(text)
            }
            Flavor::Xml => self.write_bytes(text.as_bytes()),
        }
    }

    /// A literal `]]>` ends the section, so it is split across two sections.
    fn write_cdata(&mut self, text: &str) -> Result<()> {
        let mut rest = text.as_bytes();
        self.write_bytes(CDATA_OPEN)?;
        while let Some(at) = memchr::memmem::find(rest, CDATA_CLOSE) {
            self.write_bytes(&rest[..at + 2])?;
            self.write_bytes(CDATA_CLOSE)?;
            self.write_bytes(CDATA_OPEN)?;
            rest = &rest[at + 2..];
        }
        self.write_bytes(rest)?;
        self.write_bytes(CDATA_CLOSE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn container(doc: &mut Document) -> NodeId {
        let id = doc.create_element("container");
        doc[id].set_attribute("id", "CONTAINER").unwrap();
        doc[id].set_attribute("test_attribute", "'\"").unwrap();
        id
    }

    #[test]
    fn test_attribute_quotes_are_replaced() {
        let mut doc = Document::default();
        let id = container(&mut doc);
        assert_eq!(
            render_inner(&doc, id, Flavor::Xml),
            r#"<CONTAINER id="CONTAINER" test_attribute="&apos;&quot;"></CONTAINER>"#
        );
    }

    #[test]
    fn test_raw_text_follows_children() {
        let mut doc = Document::new(false);
        let id = doc.create_element("p");
        let child = doc.create_element("b");
        doc.append_child(id, child).unwrap();
        doc[id].set_text(Some("tail".to_string()));
        assert_eq!(render_inner(&doc, id, Flavor::Xml), "<P><B></B>tail</P>");
    }

    #[test]
    fn test_raw_text_is_hidden_when_data_goes_to_children() {
        let mut doc = Document::new(true);
        let id = doc.create_element("p");
        doc[id].set_text(Some("hidden".to_string()));
        assert_eq!(render_inner(&doc, id, Flavor::Xml), "<P></P>");
    }

    #[test]
    fn test_xml_text_uses_cdata_for_markup_characters() {
        let mut doc = Document::new(false);
        let id = doc.create_element("t");

        doc[id].set_text(Some("a < b & c".to_string()));
        assert_eq!(render_inner(&doc, id, Flavor::Xml), "<T><![CDATA[a < b & c]]></T>");

        doc[id].set_text(Some("x]]>y<".to_string()));
        assert_eq!(
            render_inner(&doc, id, Flavor::Xml),
            "<T><![CDATA[x]]]]><![CDATA[>y<]]></T>"
        );
    }

    #[test]
    fn test_html_text_is_escaped() {
        let mut doc = Document::new(false);
        let id = doc.create_element("t");
        doc[id].set_text(Some("a < b & c".to_string()));
        assert_eq!(render_inner(&doc, id, Flavor::Html), "<T>a &lt; b &amp; c</T>");
    }

    #[test]
    fn test_unnamed_nodes_render_content_only() {
        let mut doc = Document::default();
        let root = doc.root();
        let a = doc.create_element("a");
        let text = doc.create_text("hello");
        doc.append_child(root, a).unwrap();
        doc.append_child(a, text).unwrap();
        assert_eq!(render_inner(&doc, root, Flavor::Xml), "<A>hello</A>");
        assert_eq!(render_inner(&doc, text, Flavor::Xml), "hello");
    }
}
