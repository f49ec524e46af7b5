use super::schema::SchemaError;
use crate::query::QueryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("element <{0}> is never closed")]
    UnclosedElement(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("predicate cannot be used as a span: {0}")]
    UnsupportedSpan(String),

    #[error("not a search extension call: {0}")]
    NotSearchCall(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}
