use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Precondition (programmer) errors.
///
/// Data errors produced by the value pipeline are never reported through this
/// type; they are recorded as messages on the owning node instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to execute 'removeChild' on 'Node': The node to be removed is not a child of this node.")]
    NotAChild,

    #[error("Failed to execute 'setAttribute' on 'Node': '{name}' is not a valid attribute name.")]
    InvalidAttributeName { name: String },

    #[error("Unable to {action} for data element")]
    TextNodeMutation { action: &'static str },

    #[error("'{name}' is already expected by this node")]
    DuplicateExpected { name: String },

    #[error("Key '{name}' not expected")]
    NotExpected { name: String },

    #[error("{name}: prototype usage not allowed when processing is used")]
    PrototypeWithProcess { name: String },

    #[error("{name}: process not allowed for prototypes")]
    ProcessOnPrototype { name: String },

    #[error("{name}: expected type should be a prototype or array type, '{given}' given")]
    PrototypeOnScalar { name: String, given: &'static str },

    #[error("{name}: prototypes cannot be bound to attributes")]
    PrototypeOnAttribute { name: String },

    #[error("{name}: prototype type declared without a prototype binding")]
    MissingPrototypeBinding { name: String },

    #[error("Node: '{name}' not registered")]
    PrototypeNotRegistered { name: String },

    #[error("Unable to set data as children as children are ignored")]
    DataAsChildrenIgnored,

    #[error("Failed to parse data using provided parser. Parser should return a node")]
    DataParserReturnedNoNode,

    #[error("node {id} does not exist in this document")]
    StaleNode { id: String },

    #[error("cannot append node {child} under {parent}: {reason}")]
    InvalidAppend {
        parent: String,
        child: String,
        reason: String,
    },

    #[error("parser is not initialized, call `init` first")]
    NotInitialized,

    #[error("parser was initialized without a tokenizer")]
    NoTokenizer,

    #[error("failed to normalize HTML: {message}")]
    Normalize { message: String },

    #[error("`serde_json` failed with error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("An I/O error has occurred: {0}")]
    Io(#[from] std::io::Error),
}
