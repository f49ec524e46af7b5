use crate::xpath::ArityError;
use thiserror::Error;

/// Failure inside the rewrite pass. Never surfaced by [`super::Compiler`],
/// which falls back to the unoptimized tree.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("malformed search call: {0}")]
    MalformedSearchCall(String),

    #[error(transparent)]
    Arity(#[from] ArityError),

    #[error("optimizer invariant violated: {0}")]
    Internal(String),
}

/// Errors surfaced to the caller of [`super::Compiler::compile`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("parse error at {line}:{column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("translation error: {0}")]
    Translation(String),
}
