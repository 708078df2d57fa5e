#![deny(unused_must_use)]
#![forbid(unsafe_code)]
#![allow(clippy::upper_case_acronyms)]
//! Streaming markup-to-tree mapper.
//!
//! Markup is pushed in chunks of any size. Start tags are resolved against
//! the schema of the element they open in, so a node type can declare which
//! child elements it captures as typed values (with pre-validation,
//! processing and validation hooks) and which it binds as typed child nodes.
//! Finalized elements can be handed to callbacks and discarded right away,
//! which keeps memory bounded on arbitrarily long inputs.
//!
//! ```
//! use streamdom::{ElementType, Parser, ValueType};
//!
//! let book = ElementType::new("book")
//!     .expect_value("price", ValueType::FLOAT)?
//!     .into_ref();
//!
//! let mut parser = Parser::new();
//! parser.register_node(book);
//! let root = parser.full_parse("<catalog><book><price>4.5</price></book></catalog>")?;
//!
//! let doc = parser.document();
//! let book = doc.get_elements_by_tag_name(root, "book", true)[0];
//! assert_eq!(doc[book].field("price").and_then(|v| v.as_float()), Some(4.5));
//! # Ok::<(), streamdom::Error>(())
//! ```

pub use document::Document;
pub use err::{Error, Result};
pub use expected::{Expected, ExpectedTarget, PrototypeBinding, Schema, Verdict};
pub use flavor::Flavor;
pub use html::{HtmlParser, Normalizer, XhtmlPassthrough};
pub use indextree::NodeId;
pub use node::{DataParserFn, Field, Node, NodeFlags, NodeKind, is_valid_attribute_name};
pub use parser::{Parser, ParserState};
pub use prototype::{ElementType, Prototype, PrototypeRef, Registry};
pub use settings::ParserSettings;
pub use snapshot::NodeSnapshot;
pub use tokenizer::{TokenSink, Tokenizer};
pub use tree_builder::FinalizeCallback;
pub use value::{Scalar, Value, ValueType, cast};
pub use xml_output::{render_inner, write_inner};

mod document;
pub mod err;
mod expected;
mod flavor;
pub mod html;
mod node;
mod parser;
mod prototype;
mod settings;
pub mod snapshot;
mod tokenizer;
mod tree_builder;
mod value;
pub mod xml_output;

#[cfg(test)]
use std::sync::Once;

#[cfg(test)]
static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
#[cfg(test)]
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .init();
    });
}
