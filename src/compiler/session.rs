//! Compile sessions: parse, translate, optimize, recompile.

use super::error::CompileError;
use super::optimizer::{PathOptimizer, QueryOptimizer};
use crate::index::IndexSchema;
use crate::query::call::{SEARCH_NAMESPACE, SEARCH_PREFIX};
use crate::xpath::Expr;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Error reported by the host query processor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{line}:{column}: {message}")]
pub struct HostError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// The query processor that parses source text and runs compiled queries.
///
/// A host may be shared between threads. Errors are returned from each call
/// and collected per [`Compilation`]; hosts that instead report through a
/// shared, mutable error listener must serialize access to it themselves,
/// since one listener would otherwise see errors from concurrent compiles.
pub trait QueryHost {
    type Executable;

    /// Bind a namespace prefix for later compiles
    fn declare_namespace(&mut self, prefix: &str, uri: &str);

    fn compile(&self, source: &str) -> Result<Self::Executable, HostError>;

    /// Expression tree of a compiled query
    fn translate(&self, executable: &Self::Executable) -> Result<Expr, HostError>;

    /// Source text for a rewritten tree
    fn source_for(&self, tree: &Expr) -> String {
        tree.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    OptimizationFailure,
    RecompileError,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::OptimizationFailure => f.write_str("optimization failure"),
            DiagnosticKind::RecompileError => f.write_str("recompile error"),
        }
    }
}

/// A recovered problem recorded during one compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Result of one compile session
#[derive(Debug)]
pub struct Compilation<E> {
    pub executable: E,
    /// Translated tree, when optimization ran
    pub tree: Option<Expr>,
    /// Rewritten tree, when it replaced the original
    pub optimized: Option<Expr>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<E> Compilation<E> {
    pub fn is_optimized(&self) -> bool {
        self.optimized.is_some()
    }

    fn fallback(executable: E, tree: Expr, kind: DiagnosticKind, message: String) -> Self {
        warn!(%kind, %message, "falling back to unoptimized query");
        Self {
            executable,
            tree: Some(tree),
            optimized: None,
            diagnostics: vec![Diagnostic { kind, message }],
        }
    }
}

pub struct Compiler<H: QueryHost> {
    host: H,
    schema: Arc<IndexSchema>,
    optimizer: Arc<dyn QueryOptimizer>,
    optimize: bool,
}

impl<H: QueryHost> Compiler<H> {
    pub fn new(mut host: H, schema: Arc<IndexSchema>) -> Self {
        host.declare_namespace(SEARCH_PREFIX, SEARCH_NAMESPACE);
        Self {
            host,
            optimize: schema.is_indexing_enabled(),
            optimizer: Arc::new(PathOptimizer::new(Arc::clone(&schema))),
            schema,
        }
    }

    pub fn with_optimizer(mut self, optimizer: Arc<dyn QueryOptimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn set_optimization(&mut self, enabled: bool) {
        self.optimize = enabled;
    }

    pub fn is_optimizing(&self) -> bool {
        self.optimize
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Compile `source`, optimizing when enabled.
    ///
    /// Parse and translation errors are returned. Optimizer failures and
    /// failures to recompile the rewritten query fall back to the original
    /// executable and are recorded as diagnostics.
    pub fn compile(&self, source: &str) -> Result<Compilation<H::Executable>, CompileError> {
        let executable = self.host.compile(source).map_err(|e| CompileError::Parse {
            line: e.line,
            column: e.column,
            message: e.message,
        })?;
        if !self.optimize {
            return Ok(Compilation {
                executable,
                tree: None,
                optimized: None,
                diagnostics: Vec::new(),
            });
        }

        let tree = self
            .host
            .translate(&executable)
            .map_err(|e| CompileError::Translation(e.to_string()))?;

        let optimized = match self.optimizer.optimize(tree.clone()) {
            Ok(optimized) => optimized,
            Err(e) => {
                return Ok(Compilation::fallback(
                    executable,
                    tree,
                    DiagnosticKind::OptimizationFailure,
                    e.to_string(),
                ));
            }
        };
        if optimized == tree {
            return Ok(Compilation {
                executable,
                tree: Some(tree),
                optimized: None,
                diagnostics: Vec::new(),
            });
        }

        let rewritten = self.host.source_for(&optimized);
        match self.host.compile(&rewritten) {
            Ok(recompiled) => {
                debug!(query = %rewritten, "compiled optimized query");
                Ok(Compilation {
                    executable: recompiled,
                    tree: Some(tree),
                    optimized: Some(optimized),
                    diagnostics: Vec::new(),
                })
            }
            Err(e) => Ok(Compilation::fallback(
                executable,
                tree,
                DiagnosticKind::RecompileError,
                e.to_string(),
            )),
        }
    }
}

/// Host whose source text is a JSON-encoded expression tree
#[derive(Debug, Default, Clone)]
pub struct JsonHost {
    namespaces: Vec<(String, String)>,
}

impl JsonHost {
    pub fn namespaces(&self) -> &[(String, String)] {
        &self.namespaces
    }
}

impl QueryHost for JsonHost {
    type Executable = Expr;

    fn declare_namespace(&mut self, prefix: &str, uri: &str) {
        self.namespaces.push((prefix.to_string(), uri.to_string()));
    }

    fn compile(&self, source: &str) -> Result<Expr, HostError> {
        serde_json::from_str(source).map_err(|e| HostError {
            line: e.line(),
            column: e.column(),
            message: e.to_string(),
        })
    }

    fn translate(&self, executable: &Expr) -> Result<Expr, HostError> {
        Ok(executable.clone())
    }

    fn source_for(&self, tree: &Expr) -> String {
        // an unserializable tree fails to recompile and falls back
        serde_json::to_string(tree).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::OptimizeError;
    use crate::query::SearchCall;

    fn compiler() -> Compiler<JsonHost> {
        Compiler::new(JsonHost::default(), Arc::new(IndexSchema::default()))
    }

    fn source(tree: &Expr) -> String {
        serde_json::to_string(tree).unwrap()
    }

    fn rooted() -> Expr {
        Expr::path(vec![Expr::Root, Expr::child("a")])
    }

    struct Failing;

    impl QueryOptimizer for Failing {
        fn optimize(&self, _tree: Expr) -> Result<Expr, OptimizeError> {
            Err(OptimizeError::Internal("boom".into()))
        }
    }

    /// Accepts the input but rejects any search call
    struct NoExtensions(JsonHost);

    impl QueryHost for NoExtensions {
        type Executable = Expr;

        fn declare_namespace(&mut self, _prefix: &str, _uri: &str) {}

        fn compile(&self, source: &str) -> Result<Expr, HostError> {
            if source.contains("\"px\"") {
                return Err(HostError {
                    line: 1,
                    column: 1,
                    message: "unknown function px:search".into(),
                });
            }
            self.0.compile(source)
        }

        fn translate(&self, executable: &Expr) -> Result<Expr, HostError> {
            self.0.translate(executable)
        }

        fn source_for(&self, tree: &Expr) -> String {
            self.0.source_for(tree)
        }
    }

    #[test]
    fn test_compile_optimizes() {
        let compiler = compiler();
        assert_eq!(compiler.host().namespaces()[0].0, "px");
        let out = compiler.compile(&source(&rooted())).unwrap();
        assert!(out.is_optimized());
        assert!(out.diagnostics.is_empty());
        let Expr::Path(items) = &out.executable else {
            panic!("expected a path");
        };
        assert!(SearchCall::from_expr(&items[0]).unwrap().is_some());
    }

    #[test]
    fn test_parse_error_surfaces() {
        let err = compiler().compile("{ not json").unwrap_err();
        assert!(matches!(err, CompileError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_optimizer_failure_falls_back() {
        let compiler = compiler().with_optimizer(Arc::new(Failing));
        let out = compiler.compile(&source(&rooted())).unwrap();
        assert_eq!(out.executable, rooted());
        assert!(!out.is_optimized());
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::OptimizationFailure);
    }

    #[test]
    fn test_recompile_failure_falls_back() {
        let compiler = Compiler::new(NoExtensions(JsonHost::default()), Arc::new(IndexSchema::default()));
        let out = compiler.compile(&source(&rooted())).unwrap();
        assert_eq!(out.executable, rooted());
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::RecompileError);
    }

    #[test]
    fn test_optimization_disabled() {
        let mut compiler = compiler();
        compiler.set_optimization(false);
        let out = compiler.compile(&source(&rooted())).unwrap();
        assert_eq!(out.executable, rooted());
        assert!(out.tree.is_none());
    }
}
