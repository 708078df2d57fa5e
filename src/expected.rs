//! Declarative schema entries ("expectations").
//!
//! An [`Expected`] describes one child element or attribute a node type knows
//! about: the type its text is cast to, optional pre-validate / process /
//! validate stages and, for prototype types, which node type to instantiate.
//! Invalid combinations are rejected when the descriptor is built.

use crate::err::{Error, Result};
use crate::prototype::PrototypeRef;
use crate::value::{Value, ValueType};
use std::fmt;
use std::rc::Rc;

/// Outcome of a validating stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
    RejectWith(String),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

impl From<bool> for Verdict {
    fn from(ok: bool) -> Self {
        if ok { Verdict::Accept } else { Verdict::Reject }
    }
}

impl From<&str> for Verdict {
    fn from(reason: &str) -> Self {
        Verdict::RejectWith(reason.to_string())
    }
}

impl From<String> for Verdict {
    fn from(reason: String) -> Self {
        Verdict::RejectWith(reason)
    }
}

impl<E: fmt::Display> From<std::result::Result<(), E>> for Verdict {
    fn from(result: std::result::Result<(), E>) -> Self {
        match result {
            Ok(()) => Verdict::Accept,
            Err(e) => Verdict::RejectWith(e.to_string()),
        }
    }
}

pub type PreValidateFn = Rc<dyn Fn(&str) -> Verdict>;
pub type ProcessFn = Rc<dyn Fn(&str) -> String>;
pub type ValidateFn = Rc<dyn Fn(&Value) -> Verdict>;

/// How a prototype-typed expectation finds the node type to instantiate.
#[derive(Clone)]
pub enum PrototypeBinding {
    /// Looked up in the parser's registry when the element is encountered.
    Name(String),
    Handle(PrototypeRef),
}

impl fmt::Debug for PrototypeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrototypeBinding::Name(name) => f.debug_tuple("Name").field(name).finish(),
            PrototypeBinding::Handle(handle) => {
                f.debug_tuple("Handle").field(&handle.registry_name()).finish()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedTarget {
    Element,
    Attribute,
}

#[derive(Clone)]
pub struct Expected {
    name: String,
    target: ExpectedTarget,
    ty: ValueType,
    pre_validate: Option<PreValidateFn>,
    process: Option<ProcessFn>,
    validate: Option<ValidateFn>,
    binding: Option<PrototypeBinding>,
}

impl fmt::Debug for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expected")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("ty", &self.ty)
            .field("pre_validate", &self.pre_validate.is_some())
            .field("process", &self.process.is_some())
            .field("validate", &self.validate.is_some())
            .field("binding", &self.binding)
            .finish()
    }
}

impl Expected {
    /// Expectation for a child element called `name`.
    pub fn new(name: impl AsRef<str>, ty: ValueType) -> Self {
        Self::with_target(name, ty, ExpectedTarget::Element)
    }

    /// Expectation for an attribute of the node itself.
    pub fn attribute(name: impl AsRef<str>, ty: ValueType) -> Self {
        Self::with_target(name, ty, ExpectedTarget::Attribute)
    }

    fn with_target(name: impl AsRef<str>, ty: ValueType, target: ExpectedTarget) -> Self {
        Expected {
            name: name.as_ref().trim().to_ascii_uppercase(),
            target,
            ty,
            pre_validate: None,
            process: None,
            validate: None,
            binding: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> ExpectedTarget {
        self.target
    }

    pub fn value_type(&self) -> ValueType {
        self.ty
    }

    pub fn is_array(&self) -> bool {
        self.ty.is_array()
    }

    pub fn is_prototype(&self) -> bool {
        self.ty.is_prototype()
    }

    pub fn binding(&self) -> Option<&PrototypeBinding> {
        self.binding.as_ref()
    }

    pub(crate) fn pre_validate_fn(&self) -> Option<&PreValidateFn> {
        self.pre_validate.as_ref()
    }

    pub(crate) fn process_fn(&self) -> Option<&ProcessFn> {
        self.process.as_ref()
    }

    pub(crate) fn validate_fn(&self) -> Option<&ValidateFn> {
        self.validate.as_ref()
    }

    /// Changes the declared type, re-checking the prototype constraints.
    pub fn type_of(mut self, ty: ValueType) -> Result<Self> {
        if self.binding.is_some() {
            self.check_bindable(ty)?;
            self.ty = promote(ty);
            return Ok(self);
        }
        if self.process.is_some() && ty.is_prototype() {
            return Err(Error::ProcessOnPrototype { name: self.name });
        }
        self.ty = ty;
        Ok(self)
    }

    pub fn pre_validate<F, V>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> V + 'static,
        V: Into<Verdict>,
    {
        self.pre_validate = Some(Rc::new(move |raw: &str| f(raw).into()));
        self
    }

    pub fn process<F>(mut self, f: F) -> Result<Self>
    where
        F: Fn(&str) -> String + 'static,
    {
        if self.binding.is_some() || self.ty.is_prototype() {
            return Err(Error::ProcessOnPrototype { name: self.name });
        }
        self.process = Some(Rc::new(f));
        Ok(self)
    }

    pub fn validate<F, V>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> V + 'static,
        V: Into<Verdict>,
    {
        self.validate = Some(Rc::new(move |value: &Value| f(value).into()));
        self
    }

    /// Binds the expectation to a prototype registered under `name`.
    pub fn prototype_name(self, name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref().trim().to_ascii_uppercase();
        self.bind(PrototypeBinding::Name(name))
    }

    /// Binds the expectation to a concrete prototype handle.
    pub fn prototype(self, handle: PrototypeRef) -> Result<Self> {
        self.bind(PrototypeBinding::Handle(handle))
    }

    fn bind(mut self, binding: PrototypeBinding) -> Result<Self> {
        if self.target == ExpectedTarget::Attribute {
            return Err(Error::PrototypeOnAttribute { name: self.name });
        }
        if self.process.is_some() {
            return Err(Error::PrototypeWithProcess { name: self.name });
        }
        self.check_bindable(self.ty)?;
        self.ty = promote(self.ty);
        self.binding = Some(binding);
        Ok(self)
    }

    fn check_bindable(&self, ty: ValueType) -> Result<()> {
        if ty.is_prototype() || ty.is_array() {
            return Ok(());
        }
        Err(Error::PrototypeOnScalar {
            name: self.name.clone(),
            given: ty.name(),
        })
    }

    /// Checks the combinations that can only be judged once the descriptor is
    /// complete.
    pub(crate) fn check_declarable(&self) -> Result<()> {
        match self.target {
            ExpectedTarget::Attribute if self.ty.is_prototype() => {
                Err(Error::PrototypeOnAttribute {
                    name: self.name.clone(),
                })
            }
            ExpectedTarget::Element if self.ty.is_prototype() && self.binding.is_none() => {
                Err(Error::MissingPrototypeBinding {
                    name: self.name.clone(),
                })
            }
            _ => Ok(()),
        }
    }
}

fn promote(ty: ValueType) -> ValueType {
    match ty {
        ValueType::Array(_) => ValueType::PrototypeArray,
        other => other,
    }
}

/// The ordered set of expectations declared by one node.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entries: Vec<Expected>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, expected: Expected) -> Result<()> {
        expected.check_declarable()?;
        if self.get(expected.name()).is_some() {
            return Err(Error::DuplicateExpected {
                name: expected.name,
            });
        }
        self.entries.push(expected);
        Ok(())
    }

    /// Looks up an entry of either target by case-insensitive name.
    pub fn get(&self, name: &str) -> Option<&Expected> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    pub fn element(&self, name: &str) -> Option<&Expected> {
        self.get(name)
            .filter(|e| e.target == ExpectedTarget::Element)
    }

    pub fn attribute(&self, name: &str) -> Option<&Expected> {
        self.get(name)
            .filter(|e| e.target == ExpectedTarget::Attribute)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Expected> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prototype::ElementType;
    use crate::value::Scalar;

    #[test]
    fn test_names_are_upper_cased() {
        let e = Expected::new(" price ", ValueType::FLOAT);
        assert_eq!(e.name(), "PRICE");
    }

    #[test]
    fn test_prototype_rejected_when_process_is_set() {
        let err = Expected::new("book", ValueType::Prototype)
            .type_of(ValueType::STRING)
            .unwrap()
            .process(|v| v.to_uppercase())
            .unwrap()
            .type_of(ValueType::Prototype);
        assert!(matches!(err, Err(Error::ProcessOnPrototype { .. })));

        let err = Expected::new("author", ValueType::Array(Scalar::String))
            .process(|v| v.to_uppercase())
            .unwrap()
            .prototype_name("AUTHOR");
        assert!(matches!(err, Err(Error::PrototypeWithProcess { .. })));
    }

    #[test]
    fn test_prototype_rejected_on_scalar_type() {
        let err = Expected::new("title", ValueType::STRING).prototype_name("TITLE");
        match err {
            Err(Error::PrototypeOnScalar { name, given }) => {
                assert_eq!(name, "TITLE");
                assert_eq!(given, "string");
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_process_rejected_on_prototype() {
        let bound = Expected::new("book", ValueType::Prototype)
            .prototype_name("BOOK")
            .unwrap();
        assert!(matches!(
            bound.process(|v| v.to_string()),
            Err(Error::ProcessOnPrototype { .. })
        ));
    }

    #[test]
    fn test_binding_on_array_promotes_to_prototype_array() {
        let e = Expected::new("book", ValueType::Array(Scalar::Untyped))
            .prototype(ElementType::new("BOOK").into_ref())
            .unwrap();
        assert_eq!(e.value_type(), ValueType::PrototypeArray);
        assert!(e.is_prototype());
        assert!(e.is_array());
    }

    #[test]
    fn test_schema_rejects_duplicates_and_unbound_prototypes() {
        let mut schema = Schema::new();
        schema.declare(Expected::new("id", ValueType::INT)).unwrap();
        assert!(matches!(
            schema.declare(Expected::attribute("ID", ValueType::STRING)),
            Err(Error::DuplicateExpected { .. })
        ));
        assert!(matches!(
            schema.declare(Expected::new("book", ValueType::Prototype)),
            Err(Error::MissingPrototypeBinding { .. })
        ));
        assert!(matches!(
            schema.declare(Expected::attribute("lang", ValueType::Prototype)),
            Err(Error::PrototypeOnAttribute { .. })
        ));
        assert_eq!(schema.len(), 1);
        assert!(schema.element("Id").is_some());
        assert!(schema.attribute("id").is_none());
    }

    #[test]
    fn test_verdict_conversions() {
        assert_eq!(Verdict::from(true), Verdict::Accept);
        assert_eq!(Verdict::from(false), Verdict::Reject);
        assert_eq!(
            Verdict::from("Should be cheaper than 10"),
            Verdict::RejectWith("Should be cheaper than 10".to_string())
        );
        let failed: std::result::Result<(), String> = Err("bad date".to_string());
        assert_eq!(
            Verdict::from(failed),
            Verdict::RejectWith("bad date".to_string())
        );
    }
}
