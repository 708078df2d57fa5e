//! HTML documents on top of the generic parser.
//!
//! Tag soup is not tokenized here. A [`Normalizer`] turns the raw markup into
//! well-formed XHTML first, then the result is parsed in the HTML flavor with
//! a document prototype that captures `HTML`, `HEAD` and `BODY` into fields.

use crate::document::Document;
use crate::err::Result;
use crate::expected::Expected;
use crate::flavor::Flavor;
use crate::parser::Parser;
use crate::prototype::{ElementType, PrototypeRef};
use crate::settings::ParserSettings;
use crate::value::{Value, ValueType};
use indextree::NodeId;
use log::debug;

/// External clean-up step producing well-formed XHTML from arbitrary HTML.
///
/// Implementations report failures through [`crate::Error::Normalize`].
pub trait Normalizer {
    fn normalize(&self, markup: &str) -> Result<String>;
}

/// Normalizer for input that is already well-formed XHTML.
#[derive(Debug, Default, Clone, Copy)]
pub struct XhtmlPassthrough;

impl Normalizer for XhtmlPassthrough {
    fn normalize(&self, markup: &str) -> Result<String> {
        Ok(markup.to_string())
    }
}

pub fn head_prototype() -> Result<PrototypeRef> {
    Ok(ElementType::new("HEAD")
        .expect_value("TITLE", ValueType::STRING)?
        .into_ref())
}

pub fn body_prototype() -> PrototypeRef {
    ElementType::new("BODY").into_ref()
}

pub fn html_prototype() -> Result<PrototypeRef> {
    Ok(ElementType::new("HTML")
        .expects(Expected::new("HEAD", ValueType::Prototype).prototype(head_prototype()?)?)?
        .expects(Expected::new("BODY", ValueType::Prototype).prototype(body_prototype())?)?
        .into_ref())
}

/// Prototype of the synthetic document root.
///
/// `HEAD` and `BODY` are also accepted directly under the root, for fragments
/// without an `<html>` wrapper.
pub fn document_prototype() -> Result<PrototypeRef> {
    Ok(ElementType::new("DOCUMENT")
        .expects(Expected::new("HTML", ValueType::Prototype).prototype(html_prototype()?)?)?
        .expects(Expected::new("HEAD", ValueType::Prototype).prototype(head_prototype()?)?)?
        .expects(Expected::new("BODY", ValueType::Prototype).prototype(body_prototype())?)?
        .into_ref())
}

pub struct HtmlParser<N = XhtmlPassthrough> {
    parser: Parser,
    normalizer: N,
}

impl<N> std::fmt::Debug for HtmlParser<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtmlParser").field("parser", &self.parser).finish()
    }
}

impl HtmlParser<XhtmlPassthrough> {
    pub fn new() -> Result<Self> {
        HtmlParser::with_normalizer(XhtmlPassthrough)
    }
}

impl<N: Normalizer> HtmlParser<N> {
    pub fn with_normalizer(normalizer: N) -> Result<Self> {
        Self::with_configuration(ParserSettings::new(), normalizer)
    }

    /// `settings` is forced to the HTML flavor.
    pub fn with_configuration(settings: ParserSettings, normalizer: N) -> Result<Self> {
        let parser = Parser::with_configuration(settings.flavor(Flavor::Html))
            .with_root_prototype(document_prototype()?);
        Ok(HtmlParser { parser, normalizer })
    }

    /// Normalizes and parses a whole document. Returns the `HTML` element when
    /// the document has one, the synthetic root otherwise.
    pub fn full_parse(&mut self, markup: &str) -> Result<NodeId> {
        let xhtml = self.normalizer.normalize(markup)?;
        debug!("normalized {} bytes of html into {} bytes", markup.len(), xhtml.len());
        self.parser.full_parse(&xhtml)?;
        Ok(self.result())
    }

    pub fn result(&self) -> NodeId {
        self.field_node(self.document().root(), "HTML")
            .unwrap_or_else(|| self.document().root())
    }

    pub fn head(&self) -> Option<NodeId> {
        self.section("HEAD")
    }

    pub fn body(&self) -> Option<NodeId> {
        self.section("BODY")
    }

    pub fn title(&self) -> Option<&str> {
        let head = self.head()?;
        self.document()[head].field("TITLE").and_then(Value::as_str)
    }

    pub fn render_inner(&self, id: NodeId) -> String {
        self.parser.render_inner(id)
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn parser_mut(&mut self) -> &mut Parser {
        &mut self.parser
    }

    pub fn document(&self) -> &Document {
        self.parser.document()
    }

    fn section(&self, name: &str) -> Option<NodeId> {
        let root = self.document().root();
        self.field_node(self.result(), name)
            .or_else(|| self.field_node(root, name))
    }

    fn field_node(&self, owner: NodeId, name: &str) -> Option<NodeId> {
        self.document()
            .node(owner)?
            .field(name)
            .and_then(Value::as_node)
            .filter(|id| self.document().contains(*id))
    }
}
