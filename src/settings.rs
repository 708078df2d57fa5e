use crate::flavor::Flavor;

/// Parser configuration, built with chained setters.
///
/// ```
/// use streamdom::{Flavor, ParserSettings};
///
/// let settings = ParserSettings::new()
///     .flavor(Flavor::Html)
///     .case_folding(false)
///     .data_as_children(Some(false));
///
/// assert!(!settings.should_fold_case());
/// assert!(!settings.get_data_as_children());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserSettings {
    flavor: Flavor,
    case_folding: bool,
    skip_whitespace_text: bool,
    data_as_children: Option<bool>,
}

impl Default for ParserSettings {
    fn default() -> Self {
        ParserSettings {
            flavor: Flavor::Xml,
            case_folding: true,
            skip_whitespace_text: true,
            data_as_children: None,
        }
    }
}

impl ParserSettings {
    pub fn new() -> Self {
        ParserSettings::default()
    }

    pub fn flavor(mut self, flavor: Flavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// Upper-case tag names as they are read. On by default.
    pub fn case_folding(mut self, fold: bool) -> Self {
        self.case_folding = fold;
        self
    }

    /// Drop character data made only of whitespace. On by default.
    pub fn skip_whitespace_text(mut self, skip: bool) -> Self {
        self.skip_whitespace_text = skip;
        self
    }

    /// Overrides the flavor's default data-as-children policy; `None` restores it.
    pub fn data_as_children(mut self, value: Option<bool>) -> Self {
        self.data_as_children = value;
        self
    }

    pub fn get_flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn should_fold_case(&self) -> bool {
        self.case_folding
    }

    pub fn should_skip_whitespace_text(&self) -> bool {
        self.skip_whitespace_text
    }

    pub fn get_data_as_children(&self) -> bool {
        self.data_as_children
            .unwrap_or_else(|| self.flavor.default_data_as_children())
    }

    pub(crate) fn fold<'a>(&self, name: &'a str) -> std::borrow::Cow<'a, str> {
        if self.case_folding {
            std::borrow::Cow::Owned(name.to_ascii_uppercase())
        } else {
            std::borrow::Cow::Borrowed(name)
        }
    }
}
