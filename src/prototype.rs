//! Node types ("prototypes") and the name → prototype factory table.

use crate::document::Document;
use crate::err::Result;
use crate::expected::{Expected, Schema};
use crate::node::{DataParserFn, Node};
use crate::value::ValueType;
use hashbrown::HashMap as FastMap;
use indextree::NodeId;
use log::debug;
use std::fmt;
use std::rc::Rc;

pub type PrototypeRef = Rc<dyn Prototype>;

/// A node type the parser instantiates instead of the generic element.
///
/// `init` runs once per instance, before the parser assigns the tag name and
/// attributes, and is where a type declares its schema and flags. `validate`
/// and `post_process` run on the closing tag; returning `false` from either
/// detaches the node.
pub trait Prototype {
    /// Registry key. Falls back to [`Prototype::type_name`].
    fn node_name(&self) -> Option<&str> {
        None
    }

    /// Short name of the implementing type.
    fn type_name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    fn init(&self, node: &mut Node) -> Result<()>;

    fn validate(&self, _document: &Document, _id: NodeId) -> bool {
        true
    }

    fn post_process(&self, _document: &mut Document, _id: NodeId) -> bool {
        true
    }

    fn registry_name(&self) -> String {
        self.node_name()
            .unwrap_or_else(|| self.type_name())
            .trim()
            .to_ascii_uppercase()
    }
}

type ValidateHook = Rc<dyn Fn(&Document, NodeId) -> bool>;
type PostProcessHook = Rc<dyn Fn(&mut Document, NodeId) -> bool>;

/// Closure-driven prototype for node types that need no state of their own.
///
/// The schema is built once and shared by every instance.
#[derive(Clone)]
pub struct ElementType {
    name: String,
    schema: Rc<Schema>,
    ignore_children: Option<bool>,
    data_as_children: Option<bool>,
    discard_on_finalize: bool,
    validate: Option<ValidateHook>,
    post_process: Option<PostProcessHook>,
    data_parser: Option<DataParserFn>,
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementType")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("ignore_children", &self.ignore_children)
            .field("data_as_children", &self.data_as_children)
            .field("discard_on_finalize", &self.discard_on_finalize)
            .finish()
    }
}

impl ElementType {
    pub fn new(name: impl AsRef<str>) -> Self {
        ElementType {
            name: name.as_ref().trim().to_ascii_uppercase(),
            schema: Rc::new(Schema::new()),
            ignore_children: None,
            data_as_children: None,
            discard_on_finalize: false,
            validate: None,
            post_process: None,
            data_parser: None,
        }
    }

    pub fn expects(mut self, expected: Expected) -> Result<Self> {
        Rc::make_mut(&mut self.schema).declare(expected)?;
        Ok(self)
    }

    /// Shorthand for a plain scalar child value.
    pub fn expect_value(self, name: &str, ty: ValueType) -> Result<Self> {
        self.expects(Expected::new(name, ty))
    }

    pub fn ignore_children(mut self, value: bool) -> Self {
        self.ignore_children = Some(value);
        self
    }

    pub fn data_as_children(mut self, value: bool) -> Self {
        self.data_as_children = Some(value);
        self
    }

    pub fn discard_on_finalize(mut self, value: bool) -> Self {
        self.discard_on_finalize = value;
        self
    }

    pub fn on_validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Document, NodeId) -> bool + 'static,
    {
        self.validate = Some(Rc::new(f));
        self
    }

    pub fn on_post_process<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Document, NodeId) -> bool + 'static,
    {
        self.post_process = Some(Rc::new(f));
        self
    }

    pub fn data_parser<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Document, &str) -> Option<NodeId> + 'static,
    {
        self.data_parser = Some(Rc::new(f));
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn into_ref(self) -> PrototypeRef {
        Rc::new(self)
    }
}

impl Prototype for ElementType {
    fn node_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn type_name(&self) -> &str {
        "ElementType"
    }

    fn init(&self, node: &mut Node) -> Result<()> {
        node.set_schema(Rc::clone(&self.schema))?;
        if let Some(ignore) = self.ignore_children {
            node.set_ignore_children(ignore)?;
        }
        if let Some(data_as_children) = self.data_as_children {
            node.set_data_as_children(data_as_children)?;
        }
        node.set_discard_on_finalize(self.discard_on_finalize);
        if let Some(f) = &self.data_parser {
            node.set_data_parser(Rc::clone(f));
        }
        Ok(())
    }

    fn validate(&self, document: &Document, id: NodeId) -> bool {
        self.validate.as_ref().is_none_or(|f| f(document, id))
    }

    fn post_process(&self, document: &mut Document, id: NodeId) -> bool {
        self.post_process.as_ref().is_none_or(|f| f(document, id))
    }
}

/// Factory table keyed by upper-cased node name.
#[derive(Default, Clone)]
pub struct Registry {
    entries: FastMap<String, PrototypeRef, ahash::RandomState>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `prototype` under its registry name. Returns `false` when the
    /// name was already taken, in which case the existing entry is kept.
    pub fn register(&mut self, prototype: PrototypeRef) -> bool {
        let name = prototype.registry_name();
        if self.entries.contains_key(&name) {
            debug!("prototype `{}` already registered, keeping the first", name);
            return false;
        }
        debug!("registering prototype `{}`", name);
        self.entries.insert(name, prototype);
        true
    }

    pub fn get(&self, name: &str) -> Option<&PrototypeRef> {
        self.entries.get(&name.trim().to_ascii_uppercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
