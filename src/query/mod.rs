pub mod call;
pub mod error;
pub mod node;
pub mod parser;
pub mod text;
pub mod xml;

pub use call::{Page, SearchCall, SearchFunction, SortField, decode_query};
pub use error::{QueryError, QueryParseError};
pub use node::{BooleanQuery, Occur, ParseableQuery, RangeQuery, SpanNearQuery, TermQuery};
pub use parser::parse_query;
pub use text::escape_value;
