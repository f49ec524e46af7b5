//! # pathix - index-aware path query optimization
//!
//! pathix rewrites XQuery expression trees so that the documents a query
//! reads are selected by an inverted index instead of a full collection scan.
//! Every collection source becomes a `px:search` call whose predicate is
//! derived from the path steps and predicates that follow it; those steps
//! stay in place as a residual filter, so the rewrite never changes results.
//!
//! ## Architecture
//!
//! - [`xpath`] - Expression tree model and the rewrite framework
//! - [`query`] - Search predicates, their text and XML forms, search calls
//! - [`index`] - Field schema, document extraction and an in-memory backend
//! - [`compiler`] - The path optimizer and compile sessions with fallback
//!
//! ## Quick Start
//!
//! ```ignore
//! use pathix::compiler::{Compiler, JsonHost};
//! use pathix::index::IndexSchema;
//! use std::sync::Arc;
//!
//! let schema = Arc::new(IndexSchema::default());
//! let compiler = Compiler::new(JsonHost::default(), schema);
//! let compiled = compiler.compile(&tree_json).unwrap();
//!
//! if let Some(optimized) = &compiled.optimized {
//!     println!("{}", optimized);
//! }
//! ```
//!
//! ## Exactness
//!
//! A search predicate is always a necessary condition for a document to
//! contribute results. When it is also sufficient the optimizer additionally
//! pushes paging, sorting, `count` and `exists` into the search call.

pub mod compiler;
pub mod index;
pub mod query;
pub mod xpath;
