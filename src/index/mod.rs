pub mod config;
pub mod counters;
pub mod error;
pub mod field;
pub mod mapper;
pub mod memory;
pub mod schema;

pub use config::{DeclaredField, FieldRole, FieldType, IndexConfiguration};
pub use error::IndexError;
pub use field::{FieldDefinition, FieldValue, text_term};
pub use mapper::map_document;
pub use memory::{CallResult, DocId, MemoryIndex, SearchBackend};
pub use schema::{IndexSchema, SchemaError};
