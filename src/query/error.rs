use thiserror::Error;

/// Syntax error in a textual predicate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at byte {offset}: {message}")]
pub struct QueryParseError {
    pub offset: usize,
    pub message: String,
}

impl QueryParseError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error(transparent)]
    Parse(#[from] QueryParseError),

    #[error("unexpected node in structural query: {0}")]
    UnexpectedNode(String),

    #[error("element {element} is missing attribute {attribute}")]
    MissingAttribute { element: String, attribute: String },

    #[error("invalid {what}: {value:?}")]
    InvalidValue { what: &'static str, value: String },

    #[error("malformed search call: {0}")]
    MalformedCall(String),
}
