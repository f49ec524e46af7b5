//! Tree-rewrite framework.
//!
//! A pass implements [`ExprVisitor`] and runs with [`Expr::accept`]. The
//! default traversal rewrites children first and then offers the rebuilt
//! node to [`ExprVisitor::visit`]; passes that need to see a node before its
//! children are rewritten (or carry state such as the current focus) override
//! [`ExprVisitor::descend`] for those node kinds.

use super::ast::{Expr, Flwor, FlworClause, QName, SortKey};
use std::collections::BTreeSet;
use std::convert::Infallible;

/// A rewritten value plus whether anything changed
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed<T> {
    pub data: T,
    pub changed: bool,
}

impl<T> Transformed<T> {
    pub fn yes(data: T) -> Self {
        Self {
            data,
            changed: true,
        }
    }

    pub fn no(data: T) -> Self {
        Self {
            data,
            changed: false,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Transformed<U> {
        Transformed {
            data: f(self.data),
            changed: self.changed,
        }
    }

    /// Apply a further rewrite, keeping the changed flag sticky
    pub fn and_then<E>(
        self,
        f: impl FnOnce(T) -> Result<Transformed<T>, E>,
    ) -> Result<Transformed<T>, E> {
        let next = f(self.data)?;
        Ok(Transformed {
            data: next.data,
            changed: self.changed || next.changed,
        })
    }

    pub fn into_inner(self) -> T {
        self.data
    }
}

pub trait ExprVisitor {
    type Error;

    /// Rewrite the children of `expr`. The default visits every child.
    fn descend(&mut self, expr: Expr) -> Result<Transformed<Expr>, Self::Error>
    where
        Self: Sized,
    {
        expr.map_children(|child| child.accept(self))
    }

    /// Rewrite a node whose children have already been handled
    fn visit(&mut self, expr: Expr) -> Result<Transformed<Expr>, Self::Error> {
        Ok(Transformed::no(expr))
    }
}

impl Expr {
    /// Run a rewrite pass over this tree
    pub fn accept<V: ExprVisitor>(self, visitor: &mut V) -> Result<Transformed<Expr>, V::Error> {
        visitor.descend(self)?.and_then(|expr| visitor.visit(expr))
    }

    /// Rebuild this node by passing each child through `f`.
    ///
    /// `order by` keys are mapped into a fresh key list rather than patched in
    /// place.
    pub fn map_children<E>(
        self,
        mut f: impl FnMut(Expr) -> Result<Transformed<Expr>, E>,
    ) -> Result<Transformed<Expr>, E> {
        if let Expr::Flwor(flwor) = self {
            return Ok(flwor.map_exprs(&mut f)?.map(Expr::Flwor));
        }
        let mut node = self;
        let mut changed = false;
        for slot in node.children_mut() {
            let rewritten = f(std::mem::take(slot))?;
            changed |= rewritten.changed;
            *slot = rewritten.data;
        }
        Ok(Transformed {
            data: node,
            changed,
        })
    }

    /// Bottom-up rewrite with a plain function
    pub fn transform_up(self, f: impl FnMut(Expr) -> Transformed<Expr>) -> Transformed<Expr> {
        let mut pass = FnPass(f);
        match self.accept(&mut pass) {
            Ok(out) => out,
            Err(never) => match never {},
        }
    }
}

impl Flwor {
    fn map_exprs<E>(
        self,
        f: &mut impl FnMut(Expr) -> Result<Transformed<Expr>, E>,
    ) -> Result<Transformed<Flwor>, E> {
        let mut changed = false;
        let mut clauses = Vec::with_capacity(self.clauses.len());
        for clause in self.clauses {
            let rewritten = clause.map_exprs(f)?;
            changed |= rewritten.changed;
            clauses.push(rewritten.data);
        }
        let ret = f(*self.ret)?;
        changed |= ret.changed;
        Ok(Transformed {
            data: Flwor::new(clauses, ret.data),
            changed,
        })
    }
}

impl FlworClause {
    /// Rebuild this clause by passing each expression through `f`
    pub(crate) fn map_exprs<E>(
        self,
        f: &mut impl FnMut(Expr) -> Result<Transformed<Expr>, E>,
    ) -> Result<Transformed<FlworClause>, E> {
        Ok(match self {
            FlworClause::For { var, position, seq } => {
                f(seq)?.map(|seq| FlworClause::For { var, position, seq })
            }
            FlworClause::Let { var, value } => f(value)?.map(|value| FlworClause::Let { var, value }),
            FlworClause::Where(condition) => f(condition)?.map(FlworClause::Where),
            FlworClause::OrderBy(keys) => {
                let mut changed = false;
                let mut mapped = Vec::with_capacity(keys.len());
                for key in keys {
                    let SortKey {
                        key,
                        order,
                        collation,
                        empty,
                    } = key;
                    let rewritten = f(key)?;
                    changed |= rewritten.changed;
                    mapped.push(SortKey {
                        key: rewritten.data,
                        order,
                        collation,
                        empty,
                    });
                }
                Transformed {
                    data: FlworClause::OrderBy(mapped),
                    changed,
                }
            }
        })
    }
}

struct FnPass<F>(F);

impl<F: FnMut(Expr) -> Transformed<Expr>> ExprVisitor for FnPass<F> {
    type Error = Infallible;

    fn visit(&mut self, expr: Expr) -> Result<Transformed<Expr>, Infallible> {
        Ok((self.0)(expr))
    }
}

/// Variables referenced in `expr` that are not bound by a FLWOR inside it
pub fn free_variables(expr: &Expr) -> BTreeSet<QName> {
    let mut referenced = BTreeSet::new();
    let mut bound = BTreeSet::new();
    expr.walk(&mut |node| match node {
        Expr::Variable(name) => {
            referenced.insert(name.clone());
        }
        Expr::Flwor(flwor) => {
            for clause in &flwor.clauses {
                match clause {
                    FlworClause::For { var, position, .. } => {
                        bound.insert(var.clone());
                        bound.extend(position.iter().cloned());
                    }
                    FlworClause::Let { var, .. } => {
                        bound.insert(var.clone());
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    });
    referenced.difference(&bound).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xpath::ast::{BinaryOp, Literal};

    struct CountingPass {
        visited: usize,
    }

    impl ExprVisitor for CountingPass {
        type Error = ();

        fn visit(&mut self, expr: Expr) -> Result<Transformed<Expr>, ()> {
            self.visited += 1;
            Ok(Transformed::no(expr))
        }
    }

    fn sample() -> Expr {
        Expr::path(vec![
            Expr::Root,
            Expr::child("a").with_predicate(Expr::binary(
                BinaryOp::Equals,
                Expr::child("b"),
                Expr::string("x"),
            )),
        ])
    }

    #[test]
    fn test_identity_pass_leaves_tree_unchanged() {
        let mut pass = CountingPass { visited: 0 };
        let out = sample().accept(&mut pass).unwrap();
        assert!(!out.changed);
        assert_eq!(out.data, sample());
        // path, root, step a, comparison, step b, literal
        assert_eq!(pass.visited, 6);
    }

    #[test]
    fn test_transform_up_rewrites_bottom_up() {
        let out = sample().transform_up(|expr| match expr {
            Expr::Literal(Literal::String(s)) => Transformed::yes(Expr::string(s.to_uppercase())),
            other => Transformed::no(other),
        });
        assert!(out.changed);
        assert!(out.data.to_string().contains(r#""X""#));
    }

    #[test]
    fn test_order_by_keys_rebuilt() {
        use crate::xpath::ast::{Flwor, SortKey};
        let flwor = Expr::Flwor(Flwor::new(
            vec![
                FlworClause::For {
                    var: QName::new("d"),
                    position: None,
                    seq: Expr::Root,
                },
                FlworClause::OrderBy(vec![
                    SortKey::new(Expr::string("k1")).descending(),
                    SortKey::new(Expr::var("d")),
                ]),
            ],
            Expr::var("d"),
        ));
        let out = flwor.transform_up(|expr| match expr {
            Expr::Literal(Literal::String(s)) if s == "k1" => Transformed::yes(Expr::string("k2")),
            other => Transformed::no(other),
        });
        assert!(out.changed);
        let Expr::Flwor(flwor) = out.data else {
            panic!("expected flwor");
        };
        let keys = flwor.order_by().unwrap();
        assert_eq!(keys[0].key, Expr::string("k2"));
        assert_eq!(keys[0].order, crate::xpath::ast::SortOrder::Descending);
        assert_eq!(keys[1].key, Expr::var("d"));
    }

    #[test]
    fn test_free_variables() {
        let flwor = Expr::Flwor(Flwor::new(
            vec![FlworClause::For {
                var: QName::new("d"),
                position: None,
                seq: Expr::var("input"),
            }],
            Expr::binary(BinaryOp::Add, Expr::var("d"), Expr::var("offset")),
        ));
        let free: Vec<String> = free_variables(&flwor).iter().map(|q| q.to_string()).collect();
        assert_eq!(free, vec!["input", "offset"]);
        assert!(free_variables(&sample()).is_empty());
    }
}
