use crate::document::Document;
use crate::err::{Error, Result};
use crate::prototype::{PrototypeRef, Registry};
use crate::settings::ParserSettings;
use crate::tokenizer::{TokenSink, Tokenizer};
use crate::tree_builder::{CallbackTable, ParseContext, TreeBuilder};
use crate::xml_output;
use indextree::NodeId;
use log::{debug, warn};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Idle,
    /// Base scope established, nothing fed yet.
    Initialized,
    Parsing,
    /// End of input signalled; every element has been closed.
    Finalized,
}

/// Streaming parser: owns the document being built, the prototype registry
/// and the finalize callbacks.
///
/// The registry and callbacks survive [`Parser::clean`] and re-initialization,
/// the document is replaced whenever [`Parser::init`] is called without a
/// scope node.
pub struct Parser {
    settings: ParserSettings,
    document: Document,
    registry: Registry,
    callbacks: CallbackTable,
    root_prototype: Option<PrototypeRef>,
    tokenizer: Option<Tokenizer>,
    context: Option<ParseContext>,
    errors: Vec<String>,
    state: ParserState,
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("settings", &self.settings)
            .field("state", &self.state)
            .field("registry", &self.registry)
            .field("errors", &self.errors)
            .finish()
    }
}

impl Default for Parser {
    fn default() -> Self {
        Parser::with_configuration(ParserSettings::default())
    }
}

impl Parser {
    pub fn new() -> Self {
        Parser::default()
    }

    pub fn with_configuration(settings: ParserSettings) -> Self {
        Parser {
            document: Document::new(settings.get_data_as_children()),
            settings,
            registry: Registry::new(),
            callbacks: CallbackTable::default(),
            root_prototype: None,
            tokenizer: None,
            context: None,
            errors: Vec::new(),
            state: ParserState::Idle,
        }
    }

    /// Prototype applied to the synthetic root of every new document.
    pub fn with_root_prototype(mut self, prototype: PrototypeRef) -> Self {
        self.root_prototype = Some(prototype);
        self
    }

    pub fn settings(&self) -> &ParserSettings {
        &self.settings
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    /// Registers a node type. Registering a name twice keeps the first type.
    pub fn register_node(&mut self, prototype: PrototypeRef) -> &mut Self {
        self.registry.register(prototype);
        self
    }

    pub fn is_node_registered(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Adds a callback run, in registration order, after every element named
    /// `name` has been finalized.
    pub fn on_finalize_node<F>(&mut self, name: &str, callback: F) -> &mut Self
    where
        F: FnMut(&mut Document, NodeId) + 'static,
    {
        let name = name.trim().to_ascii_uppercase();
        debug!("adding finalize callback for `{}`", name);
        self.callbacks
            .entry(name)
            .or_default()
            .push(Box::new(callback));
        self
    }

    /// Starts a parse.
    ///
    /// With `scope` the parse runs in fragment mode: new nodes go under that
    /// existing node. Without it a fresh document is created. `skip_tokenizer`
    /// is for callers pushing text directly through [`Parser::push_text`].
    pub fn init(&mut self, scope: Option<NodeId>, skip_tokenizer: bool) -> Result<()> {
        if self.state != ParserState::Idle {
            self.clean();
        }

        let base = match scope {
            Some(id) => {
                self.document.try_node(id)?;
                id
            }
            None => {
                self.document = Document::new(self.settings.get_data_as_children());
                let root = self.document.root();
                if let Some(prototype) = &self.root_prototype {
                    let node = self.document.try_node_mut(root)?;
                    node.set_prototype(Rc::clone(prototype));
                    prototype.init(node)?;
                }
                root
            }
        };

        self.context = Some(ParseContext::new(base));
        self.tokenizer = if skip_tokenizer {
            None
        } else {
            Some(Tokenizer::new())
        };
        self.state = ParserState::Initialized;
        Ok(())
    }

    fn builder(&mut self) -> Result<TreeBuilder<'_>> {
        let context = self.context.as_mut().ok_or(Error::NotInitialized)?;
        Ok(TreeBuilder {
            document: &mut self.document,
            registry: &self.registry,
            callbacks: &mut self.callbacks,
            context,
            settings: &self.settings,
        })
    }

    /// Feeds one chunk of markup.
    ///
    /// `Ok(false)` reports a syntax error (see [`Parser::errors`]); the caller
    /// may keep feeding. `Err` is a precondition failure and aborts the parse.
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> Result<bool> {
        let context = self.context.as_mut().ok_or(Error::NotInitialized)?;
        let tokenizer = self.tokenizer.as_mut().ok_or(Error::NoTokenizer)?;
        let mut builder = TreeBuilder {
            document: &mut self.document,
            registry: &self.registry,
            callbacks: &mut self.callbacks,
            context,
            settings: &self.settings,
        };
        let ok = tokenizer.feed(chunk.as_ref(), &mut builder)?;
        self.record_errors();
        self.state = ParserState::Parsing;
        Ok(ok)
    }

    /// Signals end of input and force-closes elements left open.
    pub fn finish(&mut self) -> Result<bool> {
        let context = self.context.as_mut().ok_or(Error::NotInitialized)?;
        let mut builder = TreeBuilder {
            document: &mut self.document,
            registry: &self.registry,
            callbacks: &mut self.callbacks,
            context,
            settings: &self.settings,
        };
        let ok = match self.tokenizer.as_mut() {
            Some(tokenizer) => tokenizer.finish(&mut builder)?,
            None => true,
        };
        if builder.context.depth() > 0 {
            warn!("{} element(s) still open at end of input", builder.context.depth());
        }
        builder.close_all()?;
        self.record_errors();
        self.state = ParserState::Finalized;
        Ok(ok)
    }

    fn record_errors(&mut self) {
        if let Some(tokenizer) = self.tokenizer.as_mut() {
            self.errors.extend(tokenizer.take_errors());
        }
    }

    /// Delivers character data to the current scope without tokenizing it.
    pub fn push_text(&mut self, text: &str) -> Result<()> {
        self.builder()?.characters(text)
    }

    /// Finalizes the base scope of a fragment parse, running its callbacks.
    pub fn finalize_node(&mut self) -> Result<()> {
        self.builder()?.finalize_base()
    }

    /// Releases the tokenizer and transient stacks and clears the errors. The
    /// document, registry and callbacks are kept.
    pub fn clean(&mut self) {
        self.tokenizer = None;
        self.context = None;
        self.errors.clear();
        self.state = ParserState::Idle;
    }

    /// Parses a complete document and returns its result node.
    pub fn full_parse(&mut self, markup: &str) -> Result<NodeId> {
        self.init(None, false)?;
        self.feed(markup)?;
        self.finish()?;
        Ok(self.result())
    }

    /// The base scope of the current parse, or the document root.
    pub fn result(&self) -> NodeId {
        self.context
            .as_ref()
            .map(ParseContext::base)
            .unwrap_or_else(|| self.document.root())
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn errors_exist(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Replaces the children and text of `id` with `text`, routed exactly as
    /// character data inside that element would be, then finalizes `id`.
    ///
    /// Any parse in flight is reset.
    pub fn set_text_contents(&mut self, id: NodeId, text: &str) -> Result<()> {
        self.document.clean_children(id)?;
        self.document.try_node_mut(id)?.set_text(None);

        self.clean();
        self.init(Some(id), true)?;
        let outcome = self
            .push_text(text)
            .and_then(|_| self.finalize_node());
        self.clean();
        outcome
    }

    /// Replaces the children and text of `id` with the parsed `markup`.
    ///
    /// `id` itself is not finalized. Any parse in flight is reset. Returns
    /// `Ok(false)` on syntax errors, like [`Parser::feed`].
    pub fn set_inner(&mut self, id: NodeId, markup: &str) -> Result<bool> {
        self.document.clean_children(id)?;
        self.document.try_node_mut(id)?.set_text(None);

        self.clean();
        self.init(Some(id), false)?;
        let fed = self.feed(markup);
        let finished = self.finish();
        let errors = std::mem::take(&mut self.errors);
        self.clean();
        self.errors = errors;
        Ok(fed? & finished?)
    }

    /// Serializes `id` in the configured flavor.
    pub fn render_inner(&self, id: NodeId) -> String {
        xml_output::render_inner(&self.document, id, self.settings.get_flavor())
    }
}
