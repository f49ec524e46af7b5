//! The path optimizer.
//!
//! A single bottom-up pass that replaces every collection source (`/` under
//! collection focus, or `collection()`) with a `px:search` call, merges the
//! index predicates of the steps and predicates that follow into that call,
//! and pushes sorting, paging and simple aggregates into the search where the
//! predicate is exact. The original steps and predicates stay in the tree as
//! the residual filter.

use super::analysis::Analyzer;
use super::error::OptimizeError;
use crate::index::IndexSchema;
use crate::query::{Page, ParseableQuery, SearchCall, SearchFunction, SortField};
use crate::xpath::{Expr, ExprVisitor, Flwor, FlworClause, Literal, Transformed};
use std::mem;
use std::sync::Arc;
use tracing::{debug, trace};

/// A tree rewrite run by [`super::Compiler`] between translation and
/// recompilation
pub trait QueryOptimizer: Send + Sync {
    fn optimize(&self, tree: Expr) -> Result<Expr, OptimizeError>;
}

pub struct PathOptimizer {
    schema: Arc<IndexSchema>,
}

impl PathOptimizer {
    pub fn new(schema: Arc<IndexSchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }
}

impl QueryOptimizer for PathOptimizer {
    fn optimize(&self, tree: Expr) -> Result<Expr, OptimizeError> {
        if !self.schema.is_indexing_enabled() {
            return Ok(tree);
        }
        let mut pass = OptimizerPass::new(&self.schema);
        let out = tree.accept(&mut pass)?;
        if out.changed {
            debug!(query = %out.data, "optimized query");
        }
        Ok(out.data)
    }
}

/// What is known about an expression rooted at a search call this pass built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SearchFacts {
    /// The search matches exactly the documents that yield items
    exact: bool,
    /// At most one item per document, in search order
    one_per_doc: bool,
    /// The items are the search's documents, filtered only by predicates
    /// already merged into it
    documents: bool,
}

const DOCUMENTS: SearchFacts = SearchFacts {
    exact: true,
    one_per_doc: true,
    documents: true,
};

struct OptimizerPass<'a> {
    analyzer: Analyzer<'a>,
    /// Non-zero inside predicates and non-initial path steps, where `/`
    /// is the root of the context document
    context: usize,
    /// Facts about the expression most recently rewritten
    facts: Option<SearchFacts>,
}

impl<'a> OptimizerPass<'a> {
    fn new(schema: &'a IndexSchema) -> Self {
        Self {
            analyzer: Analyzer::new(schema),
            context: 0,
            facts: None,
        }
    }

    fn rewrite(&mut self, expr: Expr) -> Result<(Transformed<Expr>, Option<SearchFacts>), OptimizeError> {
        self.facts = None;
        let out = expr.accept(self)?;
        Ok((out, self.facts.take()))
    }

    fn rewrite_each(&mut self, exprs: Vec<Expr>) -> Result<Transformed<Vec<Expr>>, OptimizeError> {
        let mut changed = false;
        let mut out = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let rewritten = expr.accept(self)?;
            changed |= rewritten.changed;
            out.push(rewritten.data);
        }
        self.facts = None;
        Ok(Transformed { data: out, changed })
    }

    fn in_context<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.context += 1;
        let out = f(self);
        self.context -= 1;
        out
    }

    fn source(&mut self) -> Transformed<Expr> {
        self.facts = Some(DOCUMENTS);
        Transformed::yes(SearchCall::new(ParseableQuery::MatchAll).to_expr())
    }

    fn empty(&mut self) -> Transformed<Expr> {
        self.facts = None;
        Transformed::yes(Expr::empty())
    }

    fn path(&mut self, items: Vec<Expr>) -> Result<Transformed<Expr>, OptimizeError> {
        let mut items = items.into_iter();
        let Some(first) = items.next() else {
            self.facts = None;
            return Ok(Transformed::no(Expr::Path(Vec::new())));
        };
        let steps: Vec<Expr> = items.collect();

        let (head, facts) = self.rewrite(first)?;
        let mut changed = head.changed;
        let mut head = head.data;
        let mut merged = None;

        if let Some(facts) = facts
            && facts.documents
            && unpaged(&mut head)?
        {
            let analyzed = self.analyzer.path(&steps);
            trace!(query = %analyzed.query, exact = analyzed.exact, "analyzed path");
            if analyzed.empty {
                debug!("path has a false predicate");
                return Ok(self.empty());
            }
            merge_query(&mut head, analyzed.query)?;
            changed = true;
            merged = Some(SearchFacts {
                exact: facts.exact && analyzed.exact,
                one_per_doc: analyzed.one_per_doc,
                documents: false,
            });
        }

        let steps = self.in_context(|pass| pass.rewrite_each(steps))?;
        changed |= steps.changed;
        let mut items = Vec::with_capacity(steps.data.len() + 1);
        items.push(head);
        items.extend(steps.data);

        self.facts = merged;
        Ok(Transformed {
            data: Expr::Path(items),
            changed,
        })
    }

    fn filter(&mut self, base: Expr, predicates: Vec<Expr>) -> Result<Transformed<Expr>, OptimizeError> {
        let (base, mut facts) = self.rewrite(base)?;
        let mut changed = base.changed;
        let mut base = base.data;
        let mut merging = facts.is_some();
        let mut residual = Vec::with_capacity(predicates.len());

        for pred in predicates {
            let Some(current) = facts.filter(|_| merging) else {
                if let Some(f) = facts.as_mut() {
                    f.exact = false;
                    f.documents = false;
                }
                residual.push(pred);
                continue;
            };

            if let Expr::Literal(Literal::Integer(n)) = pred {
                // later predicates see only the selected item
                merging = false;
                if current.exact && current.one_per_doc {
                    if n < 1 {
                        return Ok(self.empty());
                    }
                    if set_page(&mut base, Page::new(n as usize, Some(1)))? {
                        debug!(position = n, "pushed positional predicate into search");
                        changed = true;
                        facts = Some(SearchFacts {
                            documents: false,
                            ..current
                        });
                        continue;
                    }
                }
                facts = Some(SearchFacts {
                    exact: false,
                    documents: false,
                    ..current
                });
                residual.push(pred);
                continue;
            }

            let merged = if current.documents && unpaged(&mut base)? {
                self.analyzer.document_predicate(&pred)
            } else {
                None
            };
            match merged {
                Some(p) if p.empty => return Ok(self.empty()),
                Some(p) => {
                    trace!(query = %p.query, exact = p.exact, "analyzed document predicate");
                    merge_query(&mut base, p.query)?;
                    changed = true;
                    facts = Some(SearchFacts {
                        exact: current.exact && p.exact,
                        ..current
                    });
                }
                None => {
                    facts = Some(SearchFacts {
                        exact: false,
                        documents: false,
                        ..current
                    })
                }
            }
            residual.push(pred);
        }

        let residual = self.in_context(|pass| pass.rewrite_each(residual))?;
        changed |= residual.changed;
        let data = if residual.data.is_empty() {
            base
        } else {
            Expr::Filter {
                base: Box::new(base),
                predicates: residual.data,
            }
        };
        self.facts = facts;
        Ok(Transformed { data, changed })
    }

    /// `subsequence(seq, start, length?)`, as an operator or a function call
    fn subsequence(&mut self, mut node: Expr) -> Result<Transformed<Expr>, OptimizeError> {
        let mut children = take_children(&mut node).into_iter();
        let (Some(seq), Some(start)) = (children.next(), children.next()) else {
            return Err(OptimizeError::Internal(format!("subsequence without bounds: {node}")));
        };
        let length = children.next();

        let (seq, facts) = self.rewrite(seq)?;
        let start = start.accept(self)?;
        let length = length.map(|l| l.accept(self)).transpose()?;
        let changed = seq.changed || start.changed || length.as_ref().is_some_and(|l| l.changed);
        let mut seq = seq.data;

        let bounds = match (&start.data, length.as_ref().map(|l| &l.data)) {
            (Expr::Literal(Literal::Integer(s)), None) => Some((*s, None)),
            (Expr::Literal(Literal::Integer(s)), Some(Expr::Literal(Literal::Integer(l)))) => Some((*s, Some(*l))),
            _ => None,
        };
        if let Some(f) = facts
            && f.exact
            && f.one_per_doc
            && let Some((start, length)) = bounds
        {
            let Some(page) = Page::from_subsequence(start, length) else {
                return Ok(self.empty());
            };
            if set_page(&mut seq, page)? {
                debug!(start = page.start, length = ?page.length, "pushed subsequence into search");
                self.facts = Some(f);
                return Ok(Transformed::yes(seq));
            }
        }

        let mut rebuilt = vec![seq, start.data];
        rebuilt.extend(length.map(|l| l.data));
        self.facts = None;
        Ok(Transformed {
            data: node.with_children(rebuilt)?,
            changed,
        })
    }

    /// `count`, `exists`, `empty` and `not` over a search-rooted argument
    fn aggregate(&mut self, mut node: Expr) -> Result<Transformed<Expr>, OptimizeError> {
        let Expr::FunCall { name, .. } = &node else {
            return Err(OptimizeError::Internal(format!("not an aggregate: {node}")));
        };
        let function = name.local.clone();
        let Some(arg) = take_children(&mut node).pop() else {
            return Err(OptimizeError::Internal(format!("aggregate without argument: {node}")));
        };

        let (arg, facts) = self.rewrite(arg)?;
        let changed = arg.changed;
        let mut arg = arg.data;
        self.facts = None;

        if let Some(f) = facts
            && f.exact
            && let Some(root) = search_root_mut(&mut arg)
        {
            let call = decode(root)?;
            if call.page.is_none() {
                let query = call.query.to_xml_node();
                let replaced = match function.as_str() {
                    "exists" => Some(SearchFunction::Exists.call(vec![query])),
                    "empty" | "not" => Some(Expr::call("not", vec![SearchFunction::Exists.call(vec![query])])),
                    "count" if f.one_per_doc => Some(SearchFunction::Count.call(vec![query])),
                    _ => None,
                };
                if let Some(replaced) = replaced {
                    debug!(function = %function, "pushed aggregate into index");
                    return Ok(Transformed::yes(replaced));
                }
            }
        }

        Ok(Transformed {
            data: node.with_children(vec![arg])?,
            changed,
        })
    }

    fn flwor(&mut self, flwor: Flwor) -> Result<Transformed<Expr>, OptimizeError> {
        let Flwor { clauses, ret } = flwor;
        let single_for = clauses
            .iter()
            .filter(|c| matches!(c, FlworClause::For { .. }))
            .count()
            == 1;

        let mut changed = false;
        let mut for_facts = None;
        let mut rewritten = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let clause = match clause {
                FlworClause::For { var, position, seq } => {
                    let (seq, facts) = self.rewrite(seq)?;
                    changed |= seq.changed;
                    if single_for {
                        for_facts = facts;
                    }
                    FlworClause::For {
                        var,
                        position,
                        seq: seq.data,
                    }
                }
                other => {
                    let out = other.map_exprs(&mut |expr: Expr| expr.accept(self))?;
                    changed |= out.changed;
                    out.data
                }
            };
            rewritten.push(clause);
        }
        let ret = ret.accept(self)?;
        changed |= ret.changed;
        let mut flwor = Flwor::new(rewritten, ret.data);

        self.facts = None;
        if let Some(facts) = for_facts {
            if self.push_sort(&mut flwor)? {
                changed = true;
            }
            if let [FlworClause::For { var, position: None, .. }] = flwor.clauses.as_slice()
                && *flwor.ret == Expr::Variable(var.clone())
            {
                self.facts = Some(facts);
            }
        }
        Ok(Transformed {
            data: Expr::Flwor(flwor),
            changed,
        })
    }

    /// Move `order by` into the search call of the single `for` clause
    fn push_sort(&self, flwor: &mut Flwor) -> Result<bool, OptimizeError> {
        let Some(order) = flwor
            .clauses
            .iter()
            .position(|c| matches!(c, FlworClause::OrderBy(_)))
        else {
            return Ok(false);
        };
        // a positional variable would observe the unsorted order
        let Some(var) = flwor.clauses.iter().find_map(|c| match c {
            FlworClause::For {
                var,
                position: None,
                ..
            } => Some(var.clone()),
            _ => None,
        }) else {
            return Ok(false);
        };
        // a let rebinding the loop variable hides it from the keys
        if flwor
            .clauses
            .iter()
            .any(|c| matches!(c, FlworClause::Let { var: bound, .. } if *bound == var))
        {
            return Ok(false);
        }
        let FlworClause::OrderBy(keys) = &flwor.clauses[order] else {
            return Ok(false);
        };
        let Some(sort) = keys
            .iter()
            .map(|key| self.analyzer.sort_field(key, &var))
            .collect::<Option<Vec<_>>>()
        else {
            return Ok(false);
        };

        let Some(root) = flwor.clauses.iter_mut().find_map(|c| match c {
            FlworClause::For { seq, .. } => search_root_mut(seq),
            _ => None,
        }) else {
            return Ok(false);
        };
        let mut call = decode(root)?;
        if call.page.is_some() || !call.sort.is_empty() {
            return Ok(false);
        }
        call.sort = sort;
        debug!(sort = %SortField::spec(&call.sort), "pushed order by into search");
        *root = call.to_expr();
        flwor.clauses.remove(order);
        Ok(true)
    }
}

impl ExprVisitor for OptimizerPass<'_> {
    type Error = OptimizeError;

    fn descend(&mut self, expr: Expr) -> Result<Transformed<Expr>, OptimizeError> {
        match expr {
            Expr::Root if self.context == 0 => Ok(self.source()),
            Expr::FunCall { ref name, ref args } if args.is_empty() && name.is_builtin("collection") => {
                Ok(self.source())
            }
            Expr::Path(items) => self.path(items),
            Expr::Filter { base, predicates } => self.filter(*base, predicates),
            Expr::Subsequence { .. } => self.subsequence(expr),
            Expr::FunCall { ref name, ref args }
                if name.is_builtin("subsequence") && (2..=3).contains(&args.len()) =>
            {
                self.subsequence(expr)
            }
            Expr::FunCall { ref name, ref args }
                if args.len() == 1
                    && ["count", "exists", "empty", "not"]
                        .iter()
                        .any(|f| name.is_builtin(f)) =>
            {
                self.aggregate(expr)
            }
            Expr::Flwor(flwor) => self.flwor(flwor),
            Expr::Sequence(mut items) if items.len() == 1 => {
                let (out, facts) = self.rewrite(items.remove(0))?;
                self.facts = facts;
                Ok(out.map(|item| Expr::Sequence(vec![item])))
            }
            Expr::Step(step) => {
                let out = self.in_context(|pass| Expr::Step(step).map_children(|c| c.accept(pass)));
                self.facts = None;
                out
            }
            other => {
                let out = other.map_children(|c| c.accept(self));
                self.facts = None;
                out
            }
        }
    }
}

fn is_search_call(expr: &Expr) -> bool {
    matches!(expr, Expr::FunCall { name, .. }
        if SearchFunction::from_qname(name) == Some(SearchFunction::Search))
}

fn decode(expr: &Expr) -> Result<SearchCall, OptimizeError> {
    SearchCall::from_expr(expr)
        .map_err(|e| OptimizeError::MalformedSearchCall(e.to_string()))?
        .ok_or_else(|| OptimizeError::Internal(format!("expected a search call, got {expr}")))
}

/// The search call an expression's items come from
fn search_root_mut(expr: &mut Expr) -> Option<&mut Expr> {
    if is_search_call(expr) {
        return Some(expr);
    }
    match expr {
        Expr::Path(items) => items.first_mut().and_then(search_root_mut),
        Expr::Filter { base, .. } => search_root_mut(base),
        Expr::Sequence(items) if items.len() == 1 => search_root_mut(&mut items[0]),
        Expr::Flwor(flwor) => match flwor.clauses.as_mut_slice() {
            [FlworClause::For { seq, .. }] => search_root_mut(seq),
            _ => None,
        },
        _ => None,
    }
}

/// True if `expr` is rooted at a search call without paging
fn unpaged(expr: &mut Expr) -> Result<bool, OptimizeError> {
    match search_root_mut(expr) {
        Some(root) => Ok(decode(root)?.page.is_none()),
        None => Ok(false),
    }
}

fn set_page(expr: &mut Expr, page: Page) -> Result<bool, OptimizeError> {
    let Some(root) = search_root_mut(expr) else {
        return Ok(false);
    };
    let mut call = decode(root)?;
    if call.page.is_some() {
        return Ok(false);
    }
    call.page = Some(page);
    *root = call.to_expr();
    Ok(true)
}

fn merge_query(expr: &mut Expr, query: ParseableQuery) -> Result<(), OptimizeError> {
    if search_root_mut(expr).is_none() {
        return Err(OptimizeError::Internal(format!(
            "no search call to merge into: {expr}"
        )));
    }
    let Some(root) = search_root_mut(expr) else {
        return Ok(());
    };
    let mut call = decode(root)?;
    call.query = ParseableQuery::and([call.query, query]);
    *root = call.to_expr();
    Ok(())
}

fn take_children(node: &mut Expr) -> Vec<Expr> {
    node.children_mut().into_iter().map(mem::take).collect()
}
