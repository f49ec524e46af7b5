//! End-to-end rewrite scenarios, checked against the in-memory index.

use pathix::compiler::{
    CompileError, Compiler, DiagnosticKind, JsonHost, OptimizeError, PathOptimizer, QueryOptimizer,
};
use pathix::index::{
    CallResult, DeclaredField, DocId, FieldType, IndexConfiguration, IndexSchema, MemoryIndex,
    SearchBackend,
};
use pathix::query::{Occur, ParseableQuery, SearchCall, SearchFunction, SortField};
use pathix::xpath::{BinaryOp, Expr, Flwor, FlworClause, QName, SortKey};
use std::collections::BTreeSet;
use std::sync::Arc;

fn schema() -> Arc<IndexSchema> {
    let config = IndexConfiguration::default()
        .with_field(DeclaredField {
            name: "title".into(),
            field_type: FieldType::String,
            element: Some("title".into()),
            attribute: None,
        })
        .with_field(DeclaredField {
            name: "year".into(),
            field_type: FieldType::Int,
            element: Some("year".into()),
            attribute: None,
        });
    Arc::new(IndexSchema::from_config(&config).unwrap())
}

fn library(schema: Arc<IndexSchema>) -> MemoryIndex {
    let mut index = MemoryIndex::new(schema);
    let docs = [
        "<book><title>Emma</title><author>Austen</author><year>1815</year></book>",
        "<book><title>Emma</title><author>Someone</author><year>1990</year></book>",
        "<book><title>Persuasion</title><author>Austen</author><year>1817</year></book>",
        "<article><title>Emma</title><author>Austen</author></article>",
        "<book><title>Beloved</title><author>Morrison</author><year>1987</year></book>",
    ];
    for (i, xml) in docs.iter().enumerate() {
        index.add_document(&format!("{}.xml", i), xml).unwrap();
    }
    index
}

/// Every search call in the tree, outermost first
fn search_calls(expr: &Expr) -> Vec<(Expr, SearchCall)> {
    let mut found = Vec::new();
    collect(expr, &mut found);
    found
}

fn collect(expr: &Expr, out: &mut Vec<(Expr, SearchCall)>) {
    if let Ok(Some(call)) = SearchCall::from_expr(expr) {
        out.push((expr.clone(), call));
    }
    for child in expr.children() {
        collect(child, out);
    }
}

fn only_search(expr: &Expr) -> (Expr, SearchCall) {
    let mut calls = search_calls(expr);
    assert_eq!(calls.len(), 1, "expected one search call in {expr}");
    calls.remove(0)
}

fn adjacent(tokens: &[&str]) -> ParseableQuery {
    ParseableQuery::span_near(0, true, tokens.iter().map(|t| ParseableQuery::term("px_path", *t)))
}

fn text_equals(name: &str, value: &str) -> Expr {
    Expr::binary(BinaryOp::Equals, Expr::child(name), Expr::string(value))
}

fn emma_by_austen() -> Expr {
    let both = Expr::binary(
        BinaryOp::And,
        text_equals("title", "Emma"),
        text_equals("author", "Austen"),
    );
    Expr::path(vec![Expr::Root, Expr::child("book").with_predicate(both)])
}

#[test]
fn test_anded_predicates_merge_into_one_search() {
    let out = PathOptimizer::new(schema()).optimize(emma_by_austen()).unwrap();
    let (_, call) = only_search(&out);
    assert_eq!(
        call.query,
        ParseableQuery::and([
            adjacent(&["{}", "book"]),
            ParseableQuery::term("px_elt_text", "title=Emma"),
            ParseableQuery::term("px_elt_text", "author=Austen"),
        ])
    );
    // the original step and predicate stay as the residual filter
    let Expr::Path(items) = &out else {
        panic!("expected a path, got {out}");
    };
    assert_eq!(items[1], emma_by_austen().children()[1].clone());
}

#[test]
fn test_merged_search_is_the_intersection() {
    let schema = schema();
    let index = library(Arc::clone(&schema));
    let out = PathOptimizer::new(schema).optimize(emma_by_austen()).unwrap();
    let (node, call) = only_search(&out);

    let CallResult::Documents(merged) = index.evaluate(&node).unwrap() else {
        panic!("expected documents");
    };
    assert_eq!(merged, vec![0]);

    let ParseableQuery::Boolean(and) = &call.query else {
        panic!("expected an AND");
    };
    assert_eq!(and.occur(), Occur::Must);
    let mut separate: Option<BTreeSet<DocId>> = None;
    for clause in and.clauses() {
        let docs: BTreeSet<DocId> = index.search(clause, &[], None).unwrap().into_iter().collect();
        separate = Some(match separate {
            Some(acc) => acc.intersection(&docs).copied().collect(),
            None => docs,
        });
    }
    assert_eq!(separate.unwrap().into_iter().collect::<Vec<_>>(), merged);
}

#[test]
fn test_order_by_pushdown_sorts_in_the_index() {
    let schema = schema();
    let index = library(Arc::clone(&schema));
    let flwor = Expr::Flwor(Flwor::new(
        vec![
            FlworClause::For {
                var: QName::new("d"),
                position: None,
                seq: Expr::path(vec![Expr::Root, Expr::child("book")]),
            },
            FlworClause::OrderBy(vec![SortKey::new(Expr::path(vec![
                Expr::var("d"),
                SearchFunction::FieldValues.call(vec![Expr::string("title")]),
            ]))]),
        ],
        Expr::var("d"),
    ));
    let out = PathOptimizer::new(schema).optimize(flwor).unwrap();
    let Expr::Flwor(rewritten) = &out else {
        panic!("expected a flwor, got {out}");
    };
    assert!(rewritten.order_by().is_none());

    let (node, call) = only_search(&out);
    assert_eq!(call.sort, vec![SortField::ascending("title")]);
    let CallResult::Documents(docs) = index.evaluate(&node).unwrap() else {
        panic!("expected documents");
    };
    let titles: Vec<&str> = docs.iter().map(|d| index.uri(*d).unwrap()).collect();
    // Beloved, Emma, Emma, Persuasion
    assert_eq!(titles, vec!["4.xml", "0.xml", "1.xml", "2.xml"]);
}

#[test]
fn test_three_step_span_is_flat() {
    let tree = Expr::path(vec![Expr::Root, Expr::child("book"), Expr::child("title")]);
    let out = PathOptimizer::new(schema()).optimize(tree).unwrap();
    let (_, call) = only_search(&out);
    let ParseableQuery::SpanNear(span) = &call.query else {
        panic!("expected a span, got {}", call.query);
    };
    assert_eq!(span.clauses().len(), 3);
    assert_eq!(
        call.query.to_query_string(),
        r"SpanNear(px_path:\{\},px_path:book,px_path:title) inOrder=true"
    );
}

#[test]
fn test_unknown_field_stays_residual() {
    let pred = Expr::binary(
        BinaryOp::Equals,
        SearchFunction::FieldValues.call(vec![Expr::string("isbn")]),
        Expr::string("123"),
    );
    let step = Expr::child("book").with_predicate(pred);
    let tree = Expr::path(vec![Expr::Root, step.clone()]);
    let out = PathOptimizer::new(schema()).optimize(tree).unwrap();
    let (_, call) = only_search(&out);
    assert_eq!(call.query, adjacent(&["{}", "book"]));
    assert!(call.query.fields().iter().all(|f| *f != "isbn"));
    let Expr::Path(items) = &out else {
        panic!("expected a path");
    };
    assert_eq!(items[1], step);
}

#[test]
fn test_trees_without_sources_are_unchanged() {
    let optimizer = PathOptimizer::new(schema());
    let trees = [
        Expr::path(vec![Expr::var("x"), Expr::child("a")]),
        Expr::call("count", vec![Expr::var("x")]),
        Expr::binary(BinaryOp::Add, Expr::integer(1), Expr::integer(2)),
        Expr::string("hello"),
    ];
    for tree in trees {
        assert_eq!(optimizer.optimize(tree.clone()).unwrap(), tree);
    }
}

struct AlwaysFails;

impl QueryOptimizer for AlwaysFails {
    fn optimize(&self, _tree: Expr) -> Result<Expr, OptimizeError> {
        Err(OptimizeError::MalformedSearchCall("forced".into()))
    }
}

#[test]
fn test_fallback_never_surfaces_optimizer_failures() {
    let source = serde_json::to_string(&emma_by_austen()).unwrap();

    let failing = Compiler::new(JsonHost::default(), schema()).with_optimizer(Arc::new(AlwaysFails));
    let out = failing.compile(&source).unwrap();
    assert_eq!(out.executable, emma_by_austen());
    assert_eq!(out.diagnostics.len(), 1);
    assert_eq!(out.diagnostics[0].kind, DiagnosticKind::OptimizationFailure);

    let mut disabled = Compiler::new(JsonHost::default(), schema());
    disabled.set_optimization(false);
    let out = disabled.compile(&source).unwrap();
    assert_eq!(out.executable, emma_by_austen());
    assert!(out.diagnostics.is_empty());

    let enabled = Compiler::new(JsonHost::default(), schema());
    let out = enabled.compile(&source).unwrap();
    assert!(out.is_optimized());
    assert_eq!(search_calls(&out.executable).len(), 1);
}

#[test]
fn test_parse_errors_are_surfaced() {
    let compiler = Compiler::new(JsonHost::default(), schema());
    assert!(matches!(compiler.compile("[1, 2"), Err(CompileError::Parse { .. })));
}

#[test]
fn test_count_pushdown_matches_index() {
    let schema = schema();
    let index = library(Arc::clone(&schema));
    let books = Expr::path(vec![Expr::Root, Expr::child("book")]);
    let out = PathOptimizer::new(schema).optimize(Expr::call("count", vec![books])).unwrap();
    assert_eq!(index.evaluate(&out).unwrap(), CallResult::Count(4));
}

#[test]
fn test_prefixed_element_text_does_not_match_shorter_name() {
    let schema = schema();
    let mut index = MemoryIndex::new(Arc::clone(&schema));
    index
        .add_document("ns.xml", r#"<r xmlns:ns="u"><ns:title>x</ns:title><ns>y</ns></r>"#)
        .unwrap();
    let optimizer = PathOptimizer::new(schema);
    let search = |tree: Expr| {
        let out = optimizer.optimize(tree).unwrap();
        let (node, _) = only_search(&out);
        index.evaluate(&node).unwrap()
    };

    let equals = |name: &str, value: &str| {
        Expr::path(vec![
            Expr::Root,
            Expr::descendants(),
            Expr::child(name).with_predicate(Expr::binary(BinaryOp::Equals, Expr::Dot, Expr::string(value))),
        ])
    };
    // `ns` with text "title:x" is not `ns:title` with text "x"
    assert_eq!(search(equals("ns", "title:x")), CallResult::Documents(vec![]));
    assert_eq!(search(equals("ns:title", "x")), CallResult::Documents(vec![0]));
    assert_eq!(search(equals("ns", "y")), CallResult::Documents(vec![0]));
}
