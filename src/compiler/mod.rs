//! Index-aware query compilation.
//!
//! [`PathOptimizer`] rewrites expression trees so that document selection
//! runs against the index; [`Compiler`] wraps a host query processor and
//! falls back to the original query whenever the rewrite cannot be used.

mod analysis;
mod error;
mod optimizer;
mod session;

pub use analysis::{Analyzer, PathQuery, Pred};
pub use error::{CompileError, OptimizeError};
pub use optimizer::{PathOptimizer, QueryOptimizer};
pub use session::{Compilation, Compiler, Diagnostic, DiagnosticKind, HostError, JsonHost, QueryHost};
