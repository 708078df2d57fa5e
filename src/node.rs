//! Node entity stored in a [`Document`](crate::Document) arena.
//!
//! A node owns its attributes, raw text, typed field store and error list.
//! Structure (parent, children) lives in the arena and is managed by the
//! document; everything here only touches the node itself.

use crate::document::Document;
use crate::err::{Error, Result};
use crate::expected::{Expected, PrototypeBinding, Schema, Verdict};
use crate::prototype::PrototypeRef;
use crate::value::{Value, ValueType, cast};
use bitflags::bitflags;
use hashbrown::HashMap as FastMap;
use indextree::NodeId;
use log::trace;
use std::fmt;
use std::rc::Rc;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// Children are bound through schema fields only, never appended.
        const IGNORE_CHILDREN = 0b0000_0001;
        /// `IGNORE_CHILDREN` was set explicitly and must not be inherited over.
        const IGNORE_CHILDREN_SET = 0b0000_0010;
        /// Character data becomes a synthetic text child.
        const DATA_AS_CHILDREN = 0b0000_0100;
        /// Detach (and free) the node once it has been finalized.
        const DISCARD_ON_FINALIZE = 0b0000_1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Element,
    /// Synthetic node holding coalesced character data.
    Text,
}

/// A slot in a node's typed field store.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Single(Value),
    List(Vec<Value>),
}

impl Field {
    pub fn as_single(&self) -> Option<&Value> {
        match self {
            Field::Single(v) => Some(v),
            Field::List(_) => None,
        }
    }

    pub fn as_list(&self) -> &[Value] {
        match self {
            Field::Single(v) => std::slice::from_ref(v),
            Field::List(values) => values,
        }
    }
}

/// Splits a node's raw text into a child subtree during finalize.
pub type DataParserFn = Rc<dyn Fn(&mut Document, &str) -> Option<NodeId>>;

pub struct Node {
    name: Option<String>,
    kind: NodeKind,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    fields: FastMap<String, Field, ahash::RandomState>,
    errors: Vec<String>,
    flags: NodeFlags,
    schema: Rc<Schema>,
    prototype: Option<PrototypeRef>,
    data_parser: Option<DataParserFn>,
    pub(crate) child_count: usize,
    pub(crate) cursor: usize,
    pub(crate) bound_to: Option<NodeId>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("attributes", &self.attributes)
            .field("text", &self.text)
            .field("fields", &self.fields)
            .field("errors", &self.errors)
            .field("flags", &self.flags)
            .field("child_count", &self.child_count)
            .finish()
    }
}

impl Node {
    fn with_kind(kind: NodeKind, name: Option<String>, flags: NodeFlags) -> Self {
        Node {
            name,
            kind,
            attributes: Vec::new(),
            text: None,
            fields: FastMap::with_hasher(ahash::RandomState::new()),
            errors: Vec::new(),
            flags,
            schema: Rc::new(Schema::new()),
            prototype: None,
            data_parser: None,
            child_count: 0,
            cursor: 0,
            bound_to: None,
        }
    }

    pub(crate) fn root(data_as_children: bool) -> Self {
        Self::with_kind(NodeKind::Root, None, data_flags(data_as_children))
    }

    /// A generic element. The name is stored as given.
    pub fn element(name: Option<String>, data_as_children: bool) -> Self {
        Self::with_kind(NodeKind::Element, name, data_flags(data_as_children))
    }

    pub fn text_node(text: impl Into<String>) -> Self {
        let mut node = Self::with_kind(NodeKind::Text, None, NodeFlags::empty());
        node.text = Some(text.into());
        node
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_text(&self) -> bool {
        self.kind == NodeKind::Text
    }

    fn ensure_structural(&self, action: &'static str) -> Result<()> {
        if self.is_text() {
            return Err(Error::TextNodeMutation { action });
        }
        Ok(())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Sets the node name; `clean` trims and upper-cases it first.
    pub fn set_name(&mut self, name: &str, clean: bool) -> Result<()> {
        self.ensure_structural("set name")?;
        self.name = Some(if clean {
            name.trim().to_ascii_uppercase()
        } else {
            name.to_string()
        });
        Ok(())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Stores each pair under its lower-cased key. Keys the schema declares as
    /// attribute expectations are also run through the value pipeline.
    pub fn set_attributes<I, K, V>(&mut self, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        self.ensure_structural("set attributes")?;
        for (key, value) in attributes {
            let key = key.as_ref().to_lowercase();
            let value = value.into();
            let expected = self.schema.attribute(&key).map(|e| e.name().to_string());
            self.store_attribute(key, value.clone());
            if let Some(name) = expected {
                self.append_expected_value(&name, value)?;
            }
        }
        Ok(())
    }

    fn store_attribute(&mut self, key: String, value: String) {
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn has_attributes(&self) -> bool {
        !self.attributes.is_empty()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|(k, _)| k.as_str())
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.attributes
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sets a single attribute. The name must be a valid XML `Name`.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        self.ensure_structural("set attributes")?;
        if !is_valid_attribute_name(name) {
            return Err(Error::InvalidAttributeName {
                name: name.to_string(),
            });
        }
        self.store_attribute(name.to_lowercase(), value.into());
        Ok(())
    }

    pub fn remove_attribute(&mut self, name: &str) {
        let name = name.to_lowercase();
        self.attributes.retain(|(k, _)| *k != name);
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn set_text(&mut self, text: Option<String>) {
        self.text = text;
    }

    pub(crate) fn append_text(&mut self, chunk: &str) {
        match &mut self.text {
            Some(text) => text.push_str(chunk),
            None => self.text = Some(chunk.to_string()),
        }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub(crate) fn push_error(&mut self, message: String) {
        trace!("node {:?} error: {}", self.name, message);
        self.errors.push(message);
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn ignores_children(&self) -> bool {
        self.flags.contains(NodeFlags::IGNORE_CHILDREN)
    }

    pub fn data_as_children(&self) -> bool {
        self.flags.contains(NodeFlags::DATA_AS_CHILDREN)
    }

    pub fn discard_on_finalize(&self) -> bool {
        self.flags.contains(NodeFlags::DISCARD_ON_FINALIZE)
    }

    pub fn set_ignore_children(&mut self, value: bool) -> Result<()> {
        self.ensure_structural("set ignore children")?;
        self.flags.set(NodeFlags::IGNORE_CHILDREN, value);
        self.flags.insert(NodeFlags::IGNORE_CHILDREN_SET);
        Ok(())
    }

    /// Inherits `value` unless the flag was set explicitly before.
    pub fn set_ignore_children_if_unset(&mut self, value: bool) -> Result<()> {
        self.ensure_structural("set ignore children")?;
        if !self.flags.contains(NodeFlags::IGNORE_CHILDREN_SET) {
            self.flags.set(NodeFlags::IGNORE_CHILDREN, value);
        }
        Ok(())
    }

    pub fn set_data_as_children(&mut self, value: bool) -> Result<()> {
        self.ensure_structural("set data as children")?;
        if self.ignores_children() {
            return Err(Error::DataAsChildrenIgnored);
        }
        self.flags.set(NodeFlags::DATA_AS_CHILDREN, value);
        Ok(())
    }

    pub fn set_discard_on_finalize(&mut self, value: bool) {
        self.flags.set(NodeFlags::DISCARD_ON_FINALIZE, value);
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn shared_schema(&self) -> Rc<Schema> {
        Rc::clone(&self.schema)
    }

    /// Replaces the whole schema, sharing it with other nodes of the same type.
    pub fn set_schema(&mut self, schema: Rc<Schema>) -> Result<()> {
        self.ensure_structural("use 'expects'")?;
        self.schema = schema;
        Ok(())
    }

    pub fn expects(&mut self, expected: Expected) -> Result<&mut Self> {
        self.ensure_structural("use 'expects'")?;
        Rc::make_mut(&mut self.schema).declare(expected)?;
        Ok(self)
    }

    /// Declares a scalar child value, optionally with a process stage.
    pub fn set_expected_value<F>(
        &mut self,
        name: &str,
        ty: ValueType,
        process: Option<F>,
    ) -> Result<&mut Self>
    where
        F: Fn(&str) -> String + 'static,
    {
        let mut expected = Expected::new(name, ty);
        if let Some(f) = process {
            expected = expected.process(f)?;
        }
        self.expects(expected)
    }

    /// Declares a prototype-bound child.
    pub fn set_expected_object(
        &mut self,
        name: &str,
        binding: PrototypeBinding,
        is_array: bool,
    ) -> Result<&mut Self> {
        let ty = if is_array {
            ValueType::PrototypeArray
        } else {
            ValueType::Prototype
        };
        let expected = Expected::new(name, ty);
        let expected = match binding {
            PrototypeBinding::Name(n) => expected.prototype_name(n)?,
            PrototypeBinding::Handle(h) => expected.prototype(h)?,
        };
        self.expects(expected)
    }

    pub fn prototype(&self) -> Option<&PrototypeRef> {
        self.prototype.as_ref()
    }

    pub(crate) fn set_prototype(&mut self, prototype: PrototypeRef) {
        self.prototype = Some(prototype);
    }

    pub fn use_data_parser<F>(&mut self, f: F)
    where
        F: Fn(&mut Document, &str) -> Option<NodeId> + 'static,
    {
        self.data_parser = Some(Rc::new(f));
    }

    pub(crate) fn set_data_parser(&mut self, f: DataParserFn) {
        self.data_parser = Some(f);
    }

    pub(crate) fn data_parser(&self) -> Option<&DataParserFn> {
        self.data_parser.as_ref()
    }

    /// The single value of a field; `None` when unset or list-typed.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .get(&name.trim().to_ascii_uppercase())
            .and_then(Field::as_single)
    }

    /// All values accumulated by a field, empty when unset.
    pub fn field_list(&self, name: &str) -> &[Value] {
        self.fields
            .get(&name.trim().to_ascii_uppercase())
            .map(Field::as_list)
            .unwrap_or(&[])
    }

    /// Fields in schema declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.schema
            .iter()
            .filter_map(|e| self.fields.get(e.name()).map(|f| (e.name(), f)))
    }

    /// Assigns a field directly, bypassing the pipeline. Array-typed entries
    /// append, all others overwrite.
    pub fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
        let key = name.trim().to_ascii_uppercase();
        let is_array = match self.schema.get(&key) {
            Some(expected) => expected.is_array(),
            None => return Err(Error::NotExpected { name: key }),
        };
        self.store_value(key, value, is_array);
        Ok(())
    }

    pub fn clear_field(&mut self, name: &str) {
        self.fields.remove(&name.trim().to_ascii_uppercase());
    }

    fn store_value(&mut self, key: String, value: Value, is_array: bool) {
        if !is_array {
            self.fields.insert(key, Field::Single(value));
            return;
        }
        let slot = self
            .fields
            .entry(key)
            .or_insert_with(|| Field::List(Vec::new()));
        match slot {
            Field::List(values) => values.push(value),
            Field::Single(_) => *slot = Field::List(vec![value]),
        }
    }

    /// Runs `raw` through the declared entry's pipeline and stores the result.
    ///
    /// Stage failures are data errors: they are recorded on this node and the
    /// field is left untouched. Only an undeclared name is an `Err`.
    pub fn append_expected_value(&mut self, name: &str, raw: String) -> Result<()> {
        let key = name.trim().to_ascii_uppercase();
        let schema = Rc::clone(&self.schema);
        let Some(expected) = schema.get(&key) else {
            return Err(Error::NotExpected { name: key });
        };

        if let Some(pre_validate) = expected.pre_validate_fn() {
            if !self.check_stage(&key, "pre-validate", pre_validate(&raw)) {
                return Ok(());
            }
        }

        let raw = match expected.process_fn() {
            Some(process) => process(&raw),
            None => raw,
        };

        let Some(value) = cast(raw, expected.value_type()) else {
            self.push_error(format!("'{}' cast failed", key));
            return Ok(());
        };

        if let Some(validate) = expected.validate_fn() {
            if !self.check_stage(&key, "validate", validate(&value)) {
                return Ok(());
            }
        }

        self.store_value(key, value, expected.is_array());
        Ok(())
    }

    fn check_stage(&mut self, key: &str, stage: &str, verdict: Verdict) -> bool {
        match verdict {
            Verdict::Accept => true,
            Verdict::Reject => {
                self.push_error(format!("'{}' {} failed", key, stage));
                false
            }
            Verdict::RejectWith(reason) => {
                self.push_error(format!("'{}' {} failed: {}", key, stage, reason));
                false
            }
        }
    }
}

fn data_flags(data_as_children: bool) -> NodeFlags {
    if data_as_children {
        NodeFlags::DATA_AS_CHILDREN
    } else {
        NodeFlags::empty()
    }
}

// https://www.w3.org/TR/REC-xml/#NT-NameStartChar
fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}'
            | '\u{300}'..='\u{36F}'
            | '\u{203F}'..='\u{2040}')
}

pub fn is_valid_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_name_start_char(first) => chars.all(is_name_char),
        _ => false,
    }
}
