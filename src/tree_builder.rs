//! The streaming state machine that turns token events into tree mutations.
//!
//! A `TreeBuilder` is a short-lived view over the parser's state, created for
//! every fed chunk. Everything that must survive between chunks lives in
//! [`ParseContext`].

use crate::document::Document;
use crate::err::{Error, Result};
use crate::expected::PrototypeBinding;
use crate::node::Node;
use crate::prototype::{PrototypeRef, Registry};
use crate::settings::ParserSettings;
use crate::tokenizer::TokenSink;
use hashbrown::HashMap as FastMap;
use indextree::NodeId;
use log::{debug, trace, warn};
use std::rc::Rc;

pub type FinalizeCallback = Box<dyn FnMut(&mut Document, NodeId)>;

pub(crate) type CallbackTable = FastMap<String, Vec<FinalizeCallback>, ahash::RandomState>;

/// Per-document parse state: the open-element stacks and the pending text
/// child.
#[derive(Debug)]
pub(crate) struct ParseContext {
    names: Vec<String>,
    /// `nodes[0]` is the base scope (root or fragment node) and is never popped.
    nodes: Vec<NodeId>,
    pending_text: Option<NodeId>,
}

impl ParseContext {
    pub(crate) fn new(base: NodeId) -> Self {
        ParseContext {
            names: Vec::new(),
            nodes: vec![base],
            pending_text: None,
        }
    }

    pub(crate) fn base(&self) -> NodeId {
        self.nodes[0]
    }

    pub(crate) fn depth(&self) -> usize {
        self.names.len()
    }

    fn scope(&self) -> NodeId {
        self.nodes.last().copied().unwrap_or_else(|| self.base())
    }
}

pub(crate) struct TreeBuilder<'p> {
    pub(crate) document: &'p mut Document,
    pub(crate) registry: &'p Registry,
    pub(crate) callbacks: &'p mut CallbackTable,
    pub(crate) context: &'p mut ParseContext,
    pub(crate) settings: &'p ParserSettings,
}

impl TreeBuilder<'_> {
    /// The node whose schema routes text of `scope`: its arena parent, or the
    /// node below it on the open stack when it was bound without being
    /// appended.
    fn schema_parent(&self, scope: NodeId) -> Option<NodeId> {
        if let Some(parent) = self.document.parent(scope) {
            return Some(parent);
        }
        let nodes = &self.context.nodes;
        match nodes.iter().rposition(|n| *n == scope) {
            Some(index) if index > 0 => Some(nodes[index - 1]),
            _ => None,
        }
    }

    fn instantiate(&mut self, prototype: &PrototypeRef) -> Result<NodeId> {
        let mut node = Node::element(None, self.document.default_data_as_children());
        node.set_prototype(Rc::clone(prototype));
        prototype.init(&mut node)?;
        Ok(self.document.insert(node))
    }

    /// Assigns name and attributes and inherits ignore-children from `scope`.
    fn configure(
        &mut self,
        id: NodeId,
        scope: NodeId,
        name: &str,
        attributes: Vec<(String, String)>,
    ) -> Result<bool> {
        let inherited = self.document.try_node(scope)?.ignores_children();
        let node = self.document.try_node_mut(id)?;
        node.set_name(name, false)?;
        node.set_ignore_children_if_unset(inherited)?;
        node.set_attributes(attributes)?;
        Ok(inherited)
    }

    /// Resolves the start tag against a prototype-bound entry of the scope.
    fn resolve_bound(
        &mut self,
        scope: NodeId,
        name: &str,
        attributes: &mut Option<Vec<(String, String)>>,
    ) -> Result<Option<NodeId>> {
        let schema = self.document.try_node(scope)?.shared_schema();
        let Some(expected) = schema.element(name).filter(|e| e.is_prototype()) else {
            return Ok(None);
        };
        let prototype = match expected.binding() {
            Some(PrototypeBinding::Handle(handle)) => Rc::clone(handle),
            Some(PrototypeBinding::Name(registered)) => match self.registry.get(registered) {
                Some(handle) => Rc::clone(handle),
                None => {
                    return Err(Error::PrototypeNotRegistered {
                        name: registered.clone(),
                    });
                }
            },
            None => return Ok(None),
        };

        debug!("`{}` resolved through the schema of {}", name, scope);
        let id = self.instantiate(&prototype)?;
        let hidden = self.configure(id, scope, name, attributes.take().unwrap_or_default())?;
        self.document.bind_field(scope, expected.name(), id)?;
        if !hidden {
            self.document.append_child(scope, id)?;
        }
        Ok(Some(id))
    }

    /// Resolves the start tag through the registry (open path first, then the
    /// bare name) or falls back to a generic element.
    fn resolve_registered(
        &mut self,
        scope: NodeId,
        name: &str,
        attributes: Vec<(String, String)>,
    ) -> Result<NodeId> {
        let path = registry_key(&self.context.names.join("_"));
        let prototype = self
            .registry
            .get(&path)
            .or_else(|| self.registry.get(&registry_key(name)))
            .cloned();

        let id = match prototype {
            Some(prototype) => {
                debug!("`{}` resolved through the registry as `{}`", name, prototype.registry_name());
                self.instantiate(&prototype)?
            }
            None => {
                let data_as_children = self.document.default_data_as_children();
                self.document.insert(Node::element(None, data_as_children))
            }
        };

        let hidden = self.configure(id, scope, name, attributes)?;
        if !hidden {
            self.document.append_child(scope, id)?;
        }
        Ok(id)
    }

    fn close_pending_text(&mut self) -> Result<()> {
        let Some(text) = self.context.pending_text.take() else {
            return Ok(());
        };
        if !self.document.finalize(text)? {
            self.document.remove(text)?;
            self.document.free(text);
        }
        Ok(())
    }

    /// Finalizes the innermost open node and runs its callbacks. Nodes created
    /// by this parse that end up neither attached nor bound are freed.
    fn close_scope(&mut self) -> Result<()> {
        let id = self.context.scope();
        let is_base = self.context.nodes.len() == 1;

        if !self.document.finalize(id)? {
            debug!("detaching {} after finalize", id);
            self.document.remove(id)?;
        }

        let name = self
            .document
            .try_node(id)?
            .name()
            .map(str::to_ascii_uppercase);
        if let Some(callbacks) = name.and_then(|n| self.callbacks.get_mut(&n)) {
            for callback in callbacks.iter_mut() {
                callback(&mut *self.document, id);
            }
        }

        if !is_base && !self.document.is_attached(id) && !self.document.is_bound(id) {
            self.document.free(id);
        }
        Ok(())
    }

    fn pop(&mut self) {
        self.context.names.pop();
        if self.context.nodes.len() > 1 {
            self.context.nodes.pop();
        }
    }

    /// Closes every element still open, innermost first.
    pub(crate) fn close_all(&mut self) -> Result<()> {
        while self.context.nodes.len() > 1 {
            let id = self.context.scope();
            warn!(
                "force-closing unterminated element `{}`",
                self.context.names.last().map(String::as_str).unwrap_or_default()
            );
            trace!("force-closing {}", id);
            self.close_pending_text()?;
            self.close_scope()?;
            self.pop();
        }
        self.close_pending_text()
    }

    /// Finalizes the base scope itself, as a fragment parse does once its text
    /// has been delivered.
    pub(crate) fn finalize_base(&mut self) -> Result<()> {
        self.close_all()?;
        self.close_scope()
    }
}

impl TokenSink for TreeBuilder<'_> {
    fn start_element(&mut self, name: &str, attributes: Vec<(String, String)>) -> Result<()> {
        self.close_pending_text()?;
        let name = self.settings.fold(name).into_owned();
        let scope = self.context.scope();
        trace!("start `{}` in {}", name, scope);

        self.context.names.push(name.clone());
        let mut attributes = Some(attributes);
        let id = match self.resolve_bound(scope, &name, &mut attributes)? {
            Some(id) => id,
            None => self.resolve_registered(scope, &name, attributes.unwrap_or_default())?,
        };
        self.context.nodes.push(id);
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if self.settings.should_skip_whitespace_text() && text.trim().is_empty() {
            return Ok(());
        }
        let scope = self.context.scope();
        trace!("{} bytes of text in {}", text.len(), scope);

        let node = self.document.try_node(scope)?;
        if let Some(name) = node.name().map(str::to_string) {
            if let Some(parent) = self.schema_parent(scope) {
                let routed = self
                    .document
                    .try_node(parent)?
                    .schema()
                    .element(&name)
                    .is_some_and(|e| !e.is_prototype());
                if routed {
                    return self
                        .document
                        .append_expected_value(parent, &name, text.to_string());
                }
            }
        }

        let node = self.document.try_node(scope)?;
        if node.data_as_children() && !node.ignores_children() && !node.is_text() {
            let pending = match self.context.pending_text {
                Some(pending) => pending,
                None => {
                    let pending = self.document.create_text(String::new());
                    self.document.append_child(scope, pending)?;
                    self.context.pending_text = Some(pending);
                    pending
                }
            };
            self.document.try_node_mut(pending)?.append_text(text);
        } else {
            self.document
                .try_node_mut(scope)?
                .set_text(Some(text.to_string()));
        }
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> Result<()> {
        trace!("end `{}`", name);
        self.close_pending_text()?;
        if self.context.nodes.len() > 1 {
            self.close_scope()?;
        }
        self.pop();
        Ok(())
    }
}

/// `:` and `-` are not valid in registry keys and map to `_`.
fn registry_key(name: &str) -> String {
    name.replace([':', '-'], "_")
}
