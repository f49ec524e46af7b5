//! Index predicate extraction for collection-rooted paths.
//!
//! The analyzer walks the steps and predicates of a path whose first item
//! yields whole documents and derives a predicate that every matching
//! document satisfies. It also tracks whether the predicate is *exact*: true
//! when the documents it matches are exactly the documents for which the path
//! is non-empty. Only exact predicates allow paging and aggregate pushdown.

use crate::index::counters::ROOT_TOKEN;
use crate::index::field::{TEXT_UPPER_BOUND, text_term};
use crate::index::{FieldRole, FieldType, IndexSchema};
use crate::query::{ParseableQuery, SearchFunction, SortField};
use crate::xpath::{
    Axis, BinaryOp, Comparison, EmptyOrder, Expr, Literal, NodeTest, PathStep, QName, SortKey,
    SortOrder,
};
use std::slice;

/// How document structure is indexed
#[derive(Debug, Clone)]
enum Structure {
    /// Path occurrence token streams
    Paths { field: String },
    /// Element and attribute name terms only
    QNames {
        elements: Option<String>,
        attributes: Option<String>,
    },
    Unindexed,
}

/// Permitted number of tokens between the chain and its next step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gap {
    Bounded(u32),
    Unbounded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Located {
    Element(QName),
    Attribute(QName),
}

impl Located {
    fn token(&self) -> String {
        match self {
            Located::Element(name) => name.to_string(),
            Located::Attribute(name) => format!("@{name}"),
        }
    }
}

/// Structural constraint accumulated along a step chain
#[derive(Debug, Clone)]
struct Chain {
    span: Option<ParseableQuery>,
    names: Vec<ParseableQuery>,
    gap: Gap,
    last: Option<Located>,
    /// Named steps pushed so far
    depth: usize,
    /// Single unbounded step from the root, as in `//name`
    anywhere: bool,
    exact: bool,
    /// A positional predicate selected among siblings
    positional: bool,
    /// Later steps cannot be located
    broken: bool,
}

impl Chain {
    fn root() -> Self {
        Self {
            span: None,
            names: Vec::new(),
            gap: Gap::Bounded(0),
            last: None,
            depth: 0,
            anywhere: false,
            exact: true,
            positional: false,
            broken: false,
        }
    }

    fn at_document(&self) -> bool {
        self.depth == 0 && self.gap == Gap::Bounded(0)
    }

    fn push(&mut self, analyzer: &Analyzer<'_>, located: Located) {
        if self.positional {
            self.exact = false;
        }
        match &analyzer.structure {
            Structure::Paths { field } => {
                let term = ParseableQuery::term(field, located.token());
                self.span = Some(match (self.span.take(), self.gap) {
                    (None, Gap::Unbounded) => term,
                    (None, Gap::Bounded(slop)) => ParseableQuery::span_near(
                        slop,
                        true,
                        [ParseableQuery::term(field, ROOT_TOKEN), term],
                    ),
                    (Some(prev), Gap::Unbounded) => {
                        ParseableQuery::span_near(analyzer.schema.max_path_depth(), true, [prev, term])
                    }
                    (Some(prev), Gap::Bounded(slop)) => ParseableQuery::span_near(slop, true, [prev, term]),
                });
            }
            Structure::QNames {
                elements,
                attributes,
            } => {
                let (field, name) = match &located {
                    Located::Element(name) => (elements, name),
                    Located::Attribute(name) => (attributes, name),
                };
                if let Some(field) = field {
                    self.names.push(ParseableQuery::term(field, name.to_string()));
                }
                self.exact = false;
            }
            Structure::Unindexed => self.exact = false,
        }
        self.anywhere = self.depth == 0 && self.gap == Gap::Unbounded;
        self.depth += 1;
        self.gap = Gap::Bounded(0);
        self.last = Some(located);
    }

    /// An unnamed step: one more node of unknown name
    fn widen(&mut self) {
        if let Gap::Bounded(slop) = self.gap {
            self.gap = Gap::Bounded(slop + 1);
        }
        self.exact = false;
        self.anywhere = false;
        self.last = None;
    }

    fn stop(&mut self) {
        self.exact = false;
        self.broken = true;
    }

    fn query(&self) -> ParseableQuery {
        ParseableQuery::and(self.span.iter().chain(&self.names).cloned())
    }
}

/// A predicate's contribution
#[derive(Debug, Clone, PartialEq)]
pub struct Pred {
    pub query: ParseableQuery,
    pub exact: bool,
    /// The query implies the chain it was evaluated against
    pub covers: bool,
    /// Provably false
    pub empty: bool,
}

impl Pred {
    fn always() -> Self {
        Self {
            query: ParseableQuery::MatchAll,
            exact: true,
            covers: false,
            empty: false,
        }
    }

    fn never() -> Self {
        Self {
            empty: true,
            ..Self::always()
        }
    }

    fn new(query: ParseableQuery, exact: bool, covers: bool) -> Self {
        Self {
            query,
            exact,
            covers,
            empty: false,
        }
    }

    fn all(l: Pred, r: Pred, at_document: bool) -> Pred {
        if l.empty || r.empty {
            return Pred::never();
        }
        let trivial = l.query.is_match_all() || r.query.is_match_all();
        Pred {
            exact: l.exact && r.exact && (at_document || trivial),
            covers: l.covers || r.covers,
            query: ParseableQuery::and([l.query, r.query]),
            empty: false,
        }
    }

    fn any(l: Pred, r: Pred) -> Pred {
        match (l.empty, r.empty) {
            (true, _) => r,
            (_, true) => l,
            _ => Pred {
                exact: l.exact && r.exact,
                covers: l.covers && r.covers,
                query: ParseableQuery::or([l.query, r.query]),
                empty: false,
            },
        }
    }
}

#[derive(Debug)]
struct Constraint {
    pred: Pred,
    at_document: bool,
    depth: usize,
}

/// Chain plus the constraints met along it
struct Scope {
    chain: Chain,
    constraints: Vec<Constraint>,
    empty: bool,
}

impl Scope {
    fn new(chain: Chain) -> Self {
        Self {
            chain,
            constraints: Vec::new(),
            empty: false,
        }
    }

    fn finish(self) -> PathQuery {
        if self.empty {
            return PathQuery {
                query: ParseableQuery::MatchAll,
                exact: false,
                empty: true,
                one_per_doc: false,
            };
        }
        let mut exact = self.chain.exact;
        let query = match self.constraints.as_slice() {
            [only] if only.pred.covers && only.depth == self.chain.depth => {
                exact &= only.pred.exact;
                only.pred.query.clone()
            }
            constraints => {
                for c in constraints {
                    let neutral = c.pred.query.is_match_all();
                    if !c.pred.exact || !(c.at_document || neutral) {
                        exact = false;
                    }
                }
                ParseableQuery::and(
                    std::iter::once(self.chain.query())
                        .chain(constraints.iter().map(|c| c.pred.query.clone())),
                )
            }
        };
        PathQuery {
            query,
            exact,
            empty: false,
            one_per_doc: false,
        }
    }
}

/// Result of analyzing the steps that follow a document source
#[derive(Debug, Clone, PartialEq)]
pub struct PathQuery {
    pub query: ParseableQuery,
    pub exact: bool,
    /// Some predicate is provably false: the path is empty
    pub empty: bool,
    /// Yields at most one item per document
    pub one_per_doc: bool,
}

/// Value a comparison tests
enum Target {
    /// `qname=value` terms in a text field
    Text { field: String, name: String },
    /// A declared field with typed values
    Typed { field: String, field_type: FieldType },
}

pub struct Analyzer<'a> {
    schema: &'a IndexSchema,
    structure: Structure,
}

impl<'a> Analyzer<'a> {
    pub fn new(schema: &'a IndexSchema) -> Self {
        let structure = match schema.resolve(FieldRole::Path) {
            Some(field) => Structure::Paths {
                field: field.to_string(),
            },
            None => {
                let elements = schema.resolve(FieldRole::EltQName).map(str::to_string);
                let attributes = schema.resolve(FieldRole::AttQName).map(str::to_string);
                if elements.is_none() && attributes.is_none() {
                    Structure::Unindexed
                } else {
                    Structure::QNames {
                        elements,
                        attributes,
                    }
                }
            }
        };
        Self { schema, structure }
    }

    /// Analyze `steps` evaluated against each document of a search
    pub fn path(&self, steps: &[Expr]) -> PathQuery {
        let mut scope = Scope::new(Chain::root());
        self.walk(&mut scope, steps);
        let mut result = scope.finish();
        result.one_per_doc = !result.empty
            && matches!(steps, [Expr::Step(step)] if step.axis == Axis::Child
                && matches!(step.test, NodeTest::Name(_) | NodeTest::Wildcard | NodeTest::Element(_)));
        result
    }

    /// Analyze a predicate whose context item is a document node.
    /// `None` when the predicate contributes nothing to the search.
    pub fn document_predicate(&self, pred: &Expr) -> Option<Pred> {
        self.predicate(pred, &Chain::root())
    }

    fn walk(&self, scope: &mut Scope, steps: &[Expr]) {
        for item in steps {
            if scope.empty {
                return;
            }
            match item {
                Expr::Step(step) => {
                    self.step(&mut scope.chain, step);
                    if scope.chain.broken {
                        return;
                    }
                    for pred in &step.predicates {
                        self.constrain(scope, pred);
                    }
                }
                Expr::Dot => {}
                _ => {
                    scope.chain.stop();
                    return;
                }
            }
        }
    }

    fn step(&self, chain: &mut Chain, step: &PathStep) {
        match (step.axis, &step.test) {
            (Axis::Child, NodeTest::Name(name) | NodeTest::Element(Some(name))) => {
                chain.push(self, Located::Element(name.clone()))
            }
            (Axis::Descendant, NodeTest::Name(name) | NodeTest::Element(Some(name))) => {
                chain.gap = Gap::Unbounded;
                chain.push(self, Located::Element(name.clone()))
            }
            (Axis::Attribute, NodeTest::Name(name) | NodeTest::Attribute(Some(name))) => {
                chain.push(self, Located::Attribute(name.clone()))
            }
            (Axis::Child, NodeTest::Wildcard | NodeTest::Element(None)) => chain.widen(),
            (Axis::Descendant, NodeTest::Wildcard | NodeTest::Element(None)) => {
                chain.gap = Gap::Unbounded;
                chain.widen()
            }
            (Axis::DescendantOrSelf, NodeTest::Node) => chain.gap = Gap::Unbounded,
            (Axis::SelfAxis, NodeTest::Node) => {}
            (Axis::SelfAxis, NodeTest::Name(name) | NodeTest::Element(Some(name)))
                if chain.last.as_ref() == Some(&Located::Element(name.clone())) => {}
            _ => chain.stop(),
        }
    }

    fn constrain(&self, scope: &mut Scope, pred: &Expr) {
        if let Expr::Literal(literal @ (Literal::Integer(_) | Literal::Double(_))) = pred {
            // [1] keeps a non-empty node set non-empty
            if *literal != Literal::Integer(1) {
                scope.chain.exact = false;
            }
            scope.chain.positional = true;
            return;
        }
        let at_document = scope.chain.at_document();
        match self.predicate(pred, &scope.chain) {
            None => scope.chain.exact = false,
            Some(p) if p.empty => scope.empty = true,
            Some(mut p) => {
                if scope.chain.positional {
                    p.exact = false;
                    p.covers = false;
                }
                scope.constraints.push(Constraint {
                    pred: p,
                    at_document,
                    depth: scope.chain.depth,
                });
            }
        }
    }

    fn predicate(&self, pred: &Expr, chain: &Chain) -> Option<Pred> {
        match pred {
            Expr::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => match (self.predicate(lhs, chain), self.predicate(rhs, chain)) {
                (Some(l), Some(r)) => Some(Pred::all(l, r, chain.at_document())),
                (Some(p), None) | (None, Some(p)) => Some(Pred { exact: false, ..p }),
                (None, None) => None,
            },
            Expr::Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
            } => Some(Pred::any(self.predicate(lhs, chain)?, self.predicate(rhs, chain)?)),
            Expr::Binary { op, lhs, rhs } if op.comparison().is_some() => {
                self.comparison(*op, lhs, rhs, chain)
            }
            Expr::Literal(Literal::Boolean(value)) => Some(truth(*value)),
            Expr::Literal(Literal::String(value)) => Some(truth(!value.is_empty())),
            Expr::FunCall { name, args } if args.is_empty() && name.is_builtin("true") => {
                Some(Pred::always())
            }
            Expr::FunCall { name, args } if args.is_empty() && name.is_builtin("false") => {
                Some(Pred::never())
            }
            Expr::FunCall { name, args } if args.len() == 1 && name.is_builtin("exists") => {
                self.branch(&args[0], chain)
            }
            Expr::Sequence(items) => match items.as_slice() {
                [] => Some(Pred::never()),
                [single] => self.predicate(single, chain),
                _ => None,
            },
            Expr::Step(_) | Expr::Path(_) | Expr::Dot => self.branch(pred, chain),
            _ => None,
        }
    }

    /// Structural existence test relative to the chain
    fn branch(&self, expr: &Expr, chain: &Chain) -> Option<Pred> {
        let steps = match expr {
            Expr::Path(items) => items.as_slice(),
            other => slice::from_ref(other),
        };
        if !matches!(steps.first(), Some(Expr::Step(_) | Expr::Dot)) {
            return None;
        }
        let mut start = chain.clone();
        start.positional = false;
        let mut scope = Scope::new(start);
        self.walk(&mut scope, steps);
        let result = scope.finish();
        if result.empty {
            return Some(Pred::never());
        }
        Some(Pred::new(result.query, result.exact, true))
    }

    fn comparison(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr, chain: &Chain) -> Option<Pred> {
        let (operand, values, op) = match (literals(lhs), literals(rhs)) {
            (None, Some(values)) => (lhs, values, op),
            (Some(values), None) => (rhs, values, op.flipped()),
            _ => return None,
        };
        if values.is_empty() {
            // general comparison with () is false
            return Some(Pred::never());
        }
        let comparison = op.comparison()?;
        let (target, exact, covers) = self.target(operand, chain)?;

        let query = match target {
            Target::Text { field, name } => {
                let strings = values
                    .iter()
                    .map(|v| match v {
                        Literal::String(s) => Some(s.as_str()),
                        _ => None,
                    })
                    .collect::<Option<Vec<_>>>()?;
                text_query(&field, &name, comparison, &strings)?
            }
            Target::Typed { field, field_type } => {
                let terms = values
                    .iter()
                    .map(|v| match (field_type, v) {
                        (FieldType::Int, Literal::Integer(i)) => Some(i.to_string()),
                        (FieldType::String, Literal::String(s)) => Some(s.clone()),
                        _ => None,
                    })
                    .collect::<Option<Vec<_>>>()?;
                typed_query(&field, comparison, terms)?
            }
        };
        Some(Pred::new(query, exact, covers))
    }

    /// What `operand` compares, and whether the comparison is exact and
    /// implies the chain
    fn target(&self, operand: &Expr, chain: &Chain) -> Option<(Target, bool, bool)> {
        match operand {
            Expr::FunCall { name, args }
                if args.len() == 1 && (name.is_builtin("string") || name.is_builtin("data")) =>
            {
                self.target(&args[0], chain)
            }
            Expr::FunCall { name, args }
                if SearchFunction::from_qname(name) == Some(SearchFunction::FieldValues) =>
            {
                let (field, rest) = args.split_first()?;
                if !matches!(rest, [] | [Expr::Dot]) {
                    return None;
                }
                let Expr::Literal(Literal::String(field)) = field else {
                    return None;
                };
                let definition = self.schema.field(field)?;
                if !matches!(definition.field_type, FieldType::String | FieldType::Int) {
                    return None;
                }
                let target = Target::Typed {
                    field: definition.name.clone(),
                    field_type: definition.field_type,
                };
                Some((target, chain.at_document(), false))
            }
            Expr::Dot => {
                let target = self.text_target(chain.last.as_ref()?)?;
                Some((target, chain.anywhere, chain.anywhere))
            }
            Expr::Step(_) | Expr::Path(_) => {
                let steps = match operand {
                    Expr::Path(items) => items.as_slice(),
                    other => slice::from_ref(other),
                };
                let (last, init) = steps.split_last()?;
                let Expr::Step(last) = last else {
                    return None;
                };
                if !last.predicates.is_empty() {
                    return None;
                }
                let mut unbounded = last.axis == Axis::Descendant;
                // only `.` and `//` before the last step
                let mut descent_only = true;
                for step in init {
                    match step {
                        Expr::Dot => {}
                        Expr::Step(s) if s.is_abbreviated_descendant() => unbounded = true,
                        Expr::Step(s)
                            if s.predicates.is_empty()
                                && matches!(s.axis, Axis::Child | Axis::Descendant) =>
                        {
                            descent_only = false
                        }
                        _ => return None,
                    }
                }
                let located = match (last.axis, &last.test) {
                    (Axis::Child | Axis::Descendant, NodeTest::Name(name)) => {
                        Located::Element(name.clone())
                    }
                    (Axis::Attribute, NodeTest::Name(name)) => Located::Attribute(name.clone()),
                    _ => return None,
                };
                let exact = chain.at_document() && unbounded && descent_only;
                Some((self.text_target(&located)?, exact, false))
            }
            _ => None,
        }
    }

    fn text_target(&self, located: &Located) -> Option<Target> {
        let (role, name) = match located {
            Located::Element(name) => (FieldRole::ElementText, name),
            Located::Attribute(name) => (FieldRole::AttributeText, name),
        };
        Some(Target::Text {
            field: self.schema.resolve(role)?.to_string(),
            name: name.to_string(),
        })
    }

    /// Sort field for an `order by` key over the documents bound to `var`:
    /// `$var/px:field-values('f')` or `px:field-values('f', $var)`
    pub fn sort_field(&self, key: &SortKey, var: &QName) -> Option<SortField> {
        if key.collation.is_some() {
            return None;
        }
        let bound = Expr::Variable(var.clone());
        let (call, expected) = match &key.key {
            Expr::Path(items) => match items.as_slice() {
                [first, call] if *first == bound => (call, None),
                _ => return None,
            },
            call => (call, Some(&bound)),
        };
        let Expr::FunCall { name, args } = call else {
            return None;
        };
        if SearchFunction::from_qname(name) != Some(SearchFunction::FieldValues) {
            return None;
        }
        let field = match (args.as_slice(), expected) {
            ([Expr::Literal(Literal::String(field))], None) => field,
            ([Expr::Literal(Literal::String(field)), doc], Some(expected)) if doc == expected => field,
            _ => return None,
        };
        let definition = self.schema.field(field)?;
        // tokens and bytes fields have no sort order
        if !matches!(definition.field_type, FieldType::String | FieldType::Int) {
            return None;
        }
        Some(SortField {
            field: definition.name.clone(),
            descending: key.order == SortOrder::Descending,
            empty_greatest: key.empty == EmptyOrder::Greatest,
        })
    }
}

fn truth(value: bool) -> Pred {
    if value { Pred::always() } else { Pred::never() }
}

/// Literal values of a literal or a sequence of literals
fn literals(expr: &Expr) -> Option<Vec<&Literal>> {
    match expr {
        Expr::Literal(literal) => Some(vec![literal]),
        Expr::Sequence(items) => items
            .iter()
            .map(|item| match item {
                Expr::Literal(literal) => Some(literal),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

fn text_query(field: &str, name: &str, comparison: Comparison, values: &[&str]) -> Option<ParseableQuery> {
    let qualified = |value: &str| text_term(name, value);
    let lowest = text_term(name, "");
    let past_name = format!("{name}{TEXT_UPPER_BOUND}");
    let (lower, upper, include_lower, include_upper) = match (comparison, values) {
        (Comparison::Eq, _) => {
            return Some(ParseableQuery::or(
                values.iter().map(|v| ParseableQuery::term(field, qualified(v))),
            ));
        }
        (Comparison::Lt, [v]) => (lowest, qualified(v), true, false),
        (Comparison::Le, [v]) => (lowest, qualified(v), true, true),
        (Comparison::Gt, [v]) => (qualified(v), past_name, false, false),
        (Comparison::Ge, [v]) => (qualified(v), past_name, true, false),
        _ => return None,
    };
    Some(ParseableQuery::range(
        field,
        Some(lower),
        Some(upper),
        include_lower,
        include_upper,
    ))
}

fn typed_query(field: &str, comparison: Comparison, mut terms: Vec<String>) -> Option<ParseableQuery> {
    if comparison == Comparison::Eq {
        return Some(ParseableQuery::or(
            terms.into_iter().map(|t| ParseableQuery::term(field, t)),
        ));
    }
    if terms.len() != 1 {
        return None;
    }
    let value = terms.pop();
    Some(match comparison {
        Comparison::Lt => ParseableQuery::range(field, None, value, false, false),
        Comparison::Le => ParseableQuery::range(field, None, value, false, true),
        Comparison::Gt => ParseableQuery::range(field, value, None, false, false),
        Comparison::Ge => ParseableQuery::range(field, value, None, true, false),
        Comparison::Eq | Comparison::Ne => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DeclaredField, IndexConfiguration};

    fn schema() -> IndexSchema {
        let config = IndexConfiguration::default().with_field(DeclaredField {
            name: "year".into(),
            field_type: FieldType::Int,
            element: Some("year".into()),
            attribute: None,
        });
        IndexSchema::from_config(&config).unwrap()
    }

    fn path_term(token: &str) -> ParseableQuery {
        ParseableQuery::term("px_path", token)
    }

    fn adjacent(tokens: &[&str]) -> ParseableQuery {
        ParseableQuery::span_near(0, true, tokens.iter().map(|t| path_term(t)))
    }

    #[test]
    fn test_child_steps_form_flat_span() {
        let schema = schema();
        let pq = Analyzer::new(&schema).path(&[Expr::child("a"), Expr::child("b"), Expr::attr("id")]);
        assert_eq!(pq.query, adjacent(&["{}", "a", "b", "@id"]));
        assert!(pq.exact);
        assert!(!pq.one_per_doc);
    }

    #[test]
    fn test_descendant_and_wildcard_slop() {
        let schema = schema();
        let analyzer = Analyzer::new(&schema);

        let pq = analyzer.path(&[Expr::descendants(), Expr::child("title")]);
        assert_eq!(pq.query, path_term("title"));
        assert!(pq.exact);

        let pq = analyzer.path(&[Expr::child("a"), Expr::descendants(), Expr::child("b")]);
        assert_eq!(
            pq.query,
            ParseableQuery::span_near(255, true, [adjacent(&["{}", "a"]), path_term("b")])
        );

        let wildcard = Expr::step(Axis::Child, NodeTest::Wildcard);
        let pq = analyzer.path(&[Expr::child("a"), wildcard, Expr::child("b")]);
        assert_eq!(
            pq.query,
            ParseableQuery::span_near(1, true, [adjacent(&["{}", "a"]), path_term("b")])
        );
        assert!(!pq.exact);
    }

    #[test]
    fn test_content_predicates() {
        let schema = schema();
        let analyzer = Analyzer::new(&schema);
        let step = Expr::child("book").with_predicate(Expr::binary(
            BinaryOp::Equals,
            Expr::child("title"),
            Expr::string("Emma"),
        ));
        let pq = analyzer.path(&[step]);
        assert_eq!(
            pq.query,
            ParseableQuery::and([
                adjacent(&["{}", "book"]),
                ParseableQuery::term("px_elt_text", "title=Emma"),
            ])
        );
        assert!(!pq.exact);
        assert!(pq.one_per_doc);
    }

    #[test]
    fn test_anywhere_value_is_exact() {
        let schema = schema();
        let step = Expr::child("title").with_predicate(Expr::binary(
            BinaryOp::LessThan,
            Expr::Dot,
            Expr::string("M"),
        ));
        let pq = Analyzer::new(&schema).path(&[Expr::descendants(), step]);
        assert_eq!(
            pq.query,
            ParseableQuery::range("px_elt_text", Some("title=".into()), Some("title=M".into()), true, false)
        );
        assert!(pq.exact);
    }

    #[test]
    fn test_covering_branch_replaces_chain() {
        let schema = schema();
        let step = Expr::child("b").with_predicate(Expr::child("c"));
        let pq = Analyzer::new(&schema).path(&[Expr::child("a"), step]);
        assert_eq!(pq.query, adjacent(&["{}", "a", "b", "c"]));
        assert!(pq.exact);

        let two = Expr::child("b")
            .with_predicate(Expr::child("c"))
            .with_predicate(Expr::child("d"));
        let pq = Analyzer::new(&schema).path(&[two]);
        assert!(!pq.exact);
    }

    #[test]
    fn test_typed_field_predicates() {
        let schema = schema();
        let analyzer = Analyzer::new(&schema);
        let year = Expr::FunCall {
            name: SearchFunction::FieldValues.qname(),
            args: vec![Expr::string("year")],
        };
        let p = analyzer
            .document_predicate(&Expr::binary(BinaryOp::GreaterEqual, year.clone(), Expr::integer(1600)))
            .unwrap();
        assert_eq!(p.query, ParseableQuery::range("year", Some("1600".into()), None, true, false));
        assert!(p.exact);

        // string literal against an int field: not indexable
        assert!(analyzer
            .document_predicate(&Expr::binary(BinaryOp::Equals, year, Expr::string("x")))
            .is_none());
    }

    #[test]
    fn test_unknown_field_is_residual() {
        let schema = schema();
        let pred = Expr::binary(
            BinaryOp::Equals,
            Expr::FunCall {
                name: SearchFunction::FieldValues.qname(),
                args: vec![Expr::string("nope")],
            },
            Expr::string("x"),
        );
        let pq = Analyzer::new(&schema).path(&[Expr::child("a").with_predicate(pred)]);
        assert_eq!(pq.query, adjacent(&["{}", "a"]));
        assert!(!pq.exact);
    }

    #[test]
    fn test_false_and_empty_comparisons() {
        let schema = schema();
        let analyzer = Analyzer::new(&schema);
        let pq = analyzer.path(&[Expr::child("a").with_predicate(Expr::call("false", vec![]))]);
        assert!(pq.empty);
        let cmp = Expr::binary(BinaryOp::Equals, Expr::child("b"), Expr::empty());
        assert!(analyzer.path(&[Expr::child("a").with_predicate(cmp)]).empty);
    }

    #[test]
    fn test_or_and_residual_parts() {
        let schema = schema();
        let analyzer = Analyzer::new(&schema);
        let or = Expr::binary(BinaryOp::Or, Expr::child("b"), Expr::var("x"));
        let pq = analyzer.path(&[Expr::child("a").with_predicate(or)]);
        assert_eq!(pq.query, adjacent(&["{}", "a"]));

        let not = Expr::call("not", vec![Expr::child("b")]);
        let pq = analyzer.path(&[Expr::child("a").with_predicate(not)]);
        assert_eq!(pq.query, adjacent(&["{}", "a"]));
        assert!(!pq.exact);
    }

    #[test]
    fn test_qname_fallback_without_path_field() {
        let config = IndexConfiguration::default()
            .without_role(FieldRole::Path)
            .with_role(FieldRole::EltQName);
        let schema = IndexSchema::from_config(&config).unwrap();
        let pq = Analyzer::new(&schema).path(&[Expr::child("a"), Expr::child("b")]);
        assert_eq!(
            pq.query,
            ParseableQuery::and([
                ParseableQuery::term("px_elt_name", "a"),
                ParseableQuery::term("px_elt_name", "b"),
            ])
        );
        assert!(!pq.exact);
    }

    #[test]
    fn test_sort_field() {
        let schema = schema();
        let analyzer = Analyzer::new(&schema);
        let d = QName::new("d");
        let key = SortKey::new(Expr::path(vec![
            Expr::var("d"),
            Expr::FunCall {
                name: SearchFunction::FieldValues.qname(),
                args: vec![Expr::string("year")],
            },
        ]))
        .descending();
        assert_eq!(
            analyzer.sort_field(&key, &d),
            Some(SortField {
                field: "year".into(),
                descending: true,
                empty_greatest: false,
            })
        );
        let mut collated = key.clone();
        collated.collation = Some("http://example.com/c".into());
        assert_eq!(analyzer.sort_field(&collated, &d), None);
        assert_eq!(analyzer.sort_field(&key, &QName::new("e")), None);
    }

    #[test]
    fn test_token_field_is_not_a_sort_field() {
        let schema = schema();
        let analyzer = Analyzer::new(&schema);
        let key = SortKey::new(Expr::FunCall {
            name: SearchFunction::FieldValues.qname(),
            args: vec![Expr::string("px_path"), Expr::var("d")],
        });
        assert!(schema.field("px_path").is_some());
        assert_eq!(analyzer.sort_field(&key, &QName::new("d")), None);
    }
}
