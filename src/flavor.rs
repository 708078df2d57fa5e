/// Markup dialect a parser produces and a serializer writes.
///
/// The two flavors share the whole pipeline. They differ in how raw text is
/// written back: XML keeps it verbatim (or in CDATA), HTML escapes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flavor {
    #[default]
    Xml,
    Html,
}

impl Flavor {
    /// Whether new elements turn character data into synthetic text children.
    ///
    /// Both dialects keep mixed content in document order by default; the
    /// policy can be overridden per parser through `ParserSettings`.
    pub fn default_data_as_children(self) -> bool {
        true
    }

    pub fn name(self) -> &'static str {
        match self {
            Flavor::Xml => "xml",
            Flavor::Html => "html",
        }
    }
}
