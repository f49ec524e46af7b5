//! XQuery source serialization.
//!
//! The output uses the abbreviated syntax (`/`, `//`, `@`, no `child::`) and
//! inserts parentheses only where operator precedence demands them, so that a
//! rewritten tree can be handed back to the host compiler as plain text.

use super::ast::{
    Axis, EmptyOrder, Expr, Flwor, FlworClause, Literal, NodeTest, PathStep, SetOperator,
    SortOrder,
};
use std::fmt::{self, Write};

// Precedence levels, loosest first
const PREC_SINGLE: u8 = 2;
const PREC_UNION: u8 = 9;
const PREC_INTERSECT: u8 = 10;
const PREC_UNARY: u8 = 11;
const PREC_PATH: u8 = 12;
const PREC_PRIMARY: u8 = 13;

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::Flwor(_) | Expr::Conditional { .. } => PREC_SINGLE,
            Expr::Binary { op, .. } => op.precedence(),
            Expr::SetOp {
                op: SetOperator::Union,
                ..
            } => PREC_UNION,
            Expr::SetOp { .. } => PREC_INTERSECT,
            Expr::UnaryMinus(_) => PREC_UNARY,
            Expr::Path(_) | Expr::Step(_) | Expr::Root => PREC_PATH,
            _ => PREC_PRIMARY,
        }
    }
}

fn operand(f: &mut fmt::Formatter<'_>, expr: &Expr, min: u8) -> fmt::Result {
    if expr.precedence() < min {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

fn comma_separated(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        operand(f, item, PREC_SINGLE)?;
    }
    Ok(())
}

fn predicates(f: &mut fmt::Formatter<'_>, preds: &[Expr]) -> fmt::Result {
    for pred in preds {
        write!(f, "[{pred}]")?;
    }
    Ok(())
}

/// Quote a string literal; doubled quotes and `&amp;` keep it a single token
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\"\""),
            '&' => out.push_str("&amp;"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => f.write_str(&quote(s)),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Double(d) if d.is_finite() => {
                let mut text = format!("{d:?}");
                if !text.contains(['e', 'E']) {
                    text.push_str("e0");
                }
                f.write_str(&text)
            }
            Literal::Double(d) => {
                let text = if d.is_nan() {
                    "NaN"
                } else if *d > 0.0 {
                    "INF"
                } else {
                    "-INF"
                };
                write!(f, "xs:double(\"{text}\")")
            }
            Literal::Boolean(true) => f.write_str("true()"),
            Literal::Boolean(false) => f.write_str("false()"),
        }
    }
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::Name(name) => write!(f, "{name}"),
            NodeTest::Wildcard => f.write_str("*"),
            NodeTest::Node => f.write_str("node()"),
            NodeTest::Text => f.write_str("text()"),
            NodeTest::Comment => f.write_str("comment()"),
            NodeTest::ProcessingInstruction => f.write_str("processing-instruction()"),
            NodeTest::Document => f.write_str("document-node()"),
            NodeTest::Element(None) => f.write_str("element()"),
            NodeTest::Element(Some(name)) => write!(f, "element({name})"),
            NodeTest::Attribute(None) => f.write_str("attribute()"),
            NodeTest::Attribute(Some(name)) => write!(f, "attribute({name})"),
        }
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.axis, &self.test) {
            (Axis::SelfAxis, NodeTest::Node) => f.write_str(".")?,
            (Axis::Parent, NodeTest::Node) => f.write_str("..")?,
            (Axis::Child, test) => write!(f, "{test}")?,
            (Axis::Attribute, test) => write!(f, "@{test}")?,
            (axis, test) => write!(f, "{}::{test}", axis.as_str())?,
        }
        predicates(f, &self.predicates)
    }
}

fn path(f: &mut fmt::Formatter<'_>, steps: &[Expr]) -> fmt::Result {
    if let [Expr::Root] = steps {
        return f.write_str("/");
    }
    let last = steps.len().saturating_sub(1);
    for (i, step) in steps.iter().enumerate() {
        if i > 0 {
            f.write_char('/')?;
        }
        match step {
            Expr::Root if i == 0 => {}
            Expr::Step(s) if i > 0 && i < last && s.is_abbreviated_descendant() => {}
            Expr::Step(s) => write!(f, "{s}")?,
            other => operand(f, other, PREC_PRIMARY)?,
        }
    }
    Ok(())
}

fn flwor(f: &mut fmt::Formatter<'_>, flwor: &Flwor) -> fmt::Result {
    for clause in &flwor.clauses {
        match clause {
            FlworClause::For { var, position, seq } => {
                write!(f, "for ${var}")?;
                if let Some(pos) = position {
                    write!(f, " at ${pos}")?;
                }
                f.write_str(" in ")?;
                operand(f, seq, PREC_SINGLE)?;
            }
            FlworClause::Let { var, value } => {
                write!(f, "let ${var} := ")?;
                operand(f, value, PREC_SINGLE)?;
            }
            FlworClause::Where(condition) => {
                f.write_str("where ")?;
                operand(f, condition, PREC_SINGLE)?;
            }
            FlworClause::OrderBy(keys) => {
                f.write_str("order by ")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    operand(f, &key.key, PREC_SINGLE)?;
                    if key.order == SortOrder::Descending {
                        f.write_str(" descending")?;
                    }
                    if key.empty == EmptyOrder::Greatest {
                        f.write_str(" empty greatest")?;
                    }
                    if let Some(collation) = &key.collation {
                        write!(f, " collation {}", quote(collation))?;
                    }
                }
            }
        }
        f.write_char(' ')?;
    }
    f.write_str("return ")?;
    operand(f, &flwor.ret, PREC_SINGLE)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(literal) => write!(f, "{literal}"),
            Expr::Variable(name) => write!(f, "${name}"),
            Expr::Root => f.write_str("/"),
            Expr::Dot => f.write_str("."),
            Expr::Step(step) => write!(f, "{step}"),
            Expr::Path(steps) => path(f, steps),
            Expr::Filter { base, predicates: preds } => {
                operand(f, base, PREC_PRIMARY)?;
                predicates(f, preds)
            }
            Expr::Binary { op, lhs, rhs } => {
                let prec = op.precedence();
                // comparisons do not associate
                let left_min = if op.comparison().is_some() { prec + 1 } else { prec };
                operand(f, lhs, left_min)?;
                write!(f, " {} ", op.symbol())?;
                operand(f, rhs, prec + 1)
            }
            Expr::UnaryMinus(inner) => {
                f.write_char('-')?;
                operand(f, inner, PREC_UNARY)
            }
            Expr::FunCall { name, args } => {
                write!(f, "{name}(")?;
                comma_separated(f, args)?;
                f.write_char(')')
            }
            Expr::Sequence(items) => {
                f.write_char('(')?;
                comma_separated(f, items)?;
                f.write_char(')')
            }
            Expr::Subsequence { seq, start, length } => {
                f.write_str("subsequence(")?;
                operand(f, seq, PREC_SINGLE)?;
                f.write_str(", ")?;
                operand(f, start, PREC_SINGLE)?;
                if let Some(length) = length {
                    f.write_str(", ")?;
                    operand(f, length, PREC_SINGLE)?;
                }
                f.write_char(')')
            }
            Expr::SetOp { op, operands } => {
                let (symbol, prec) = match op {
                    SetOperator::Union => (" | ", PREC_UNION),
                    SetOperator::Intersect => (" intersect ", PREC_INTERSECT),
                    SetOperator::Except => (" except ", PREC_INTERSECT),
                };
                for (i, item) in operands.iter().enumerate() {
                    if i > 0 {
                        f.write_str(symbol)?;
                    }
                    operand(f, item, prec + 1)?;
                }
                Ok(())
            }
            Expr::Element {
                name,
                attributes,
                content,
            } => {
                write!(f, "element {name} {{ ")?;
                let mut items: Vec<&Expr> = attributes.iter().collect();
                match content.as_deref() {
                    // a sequence of content items is spliced, not nested
                    Some(Expr::Sequence(parts)) => items.extend(parts.iter()),
                    Some(other) => items.push(other),
                    None => {}
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    operand(f, item, PREC_SINGLE)?;
                }
                if !items.is_empty() {
                    f.write_char(' ')?;
                }
                f.write_char('}')
            }
            Expr::Attribute { name, value } => write!(f, "attribute {name} {{ {value} }}"),
            Expr::Text(value) => write!(f, "text {{ {value} }}"),
            Expr::Flwor(inner) => flwor(f, inner),
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                write!(f, "if ({condition}) then ")?;
                operand(f, then, PREC_SINGLE)?;
                f.write_str(" else ")?;
                operand(f, otherwise, PREC_SINGLE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::xpath::ast::*;

    #[test]
    fn test_abbreviated_paths() {
        let expr = Expr::path(vec![
            Expr::Root,
            Expr::descendants(),
            Expr::child("book"),
            Expr::attr("id"),
        ]);
        assert_eq!(expr.to_string(), "//book/@id");

        assert_eq!(Expr::path(vec![Expr::Root]).to_string(), "/");
        assert_eq!(
            Expr::path(vec![Expr::var("d"), Expr::descendants(), Expr::child("title")]).to_string(),
            "$d//title"
        );
        assert_eq!(
            Expr::path(vec![Expr::Root, Expr::descendants()]).to_string(),
            "/descendant-or-self::node()"
        );
        assert_eq!(
            Expr::step(Axis::Ancestor, NodeTest::Element(None)).to_string(),
            "ancestor::element()"
        );
    }

    #[test]
    fn test_predicates_and_filters() {
        let step = Expr::child("a").with_predicate(Expr::binary(
            BinaryOp::Equals,
            Expr::child("b"),
            Expr::string("x"),
        ));
        assert_eq!(Expr::path(vec![Expr::Root, step]).to_string(), r#"/a[b = "x"]"#);

        let filtered = Expr::filter(Expr::Root, vec![Expr::child("doc")]);
        assert_eq!(filtered.to_string(), "(/)[doc]");

        let positional = Expr::filter(
            Expr::path(vec![Expr::Root, Expr::child("doc")]),
            vec![Expr::integer(1)],
        );
        assert_eq!(positional.to_string(), "(/doc)[1]");
    }

    #[test]
    fn test_precedence_parentheses() {
        let sum = Expr::binary(BinaryOp::Add, Expr::integer(1), Expr::integer(2));
        let product = Expr::binary(BinaryOp::Multiply, sum.clone(), Expr::integer(3));
        assert_eq!(product.to_string(), "(1 + 2) * 3");

        let left_assoc = Expr::binary(BinaryOp::Subtract, sum, Expr::integer(4));
        assert_eq!(left_assoc.to_string(), "1 + 2 - 4");

        let or = Expr::binary(BinaryOp::Or, Expr::child("a"), Expr::child("b"));
        let and = Expr::binary(BinaryOp::And, or, Expr::child("c"));
        assert_eq!(and.to_string(), "(a or b) and c");
    }

    #[test]
    fn test_literals() {
        assert_eq!(Expr::string(r#"say "hi" & go"#).to_string(), r#""say ""hi"" &amp; go""#);
        assert_eq!(Expr::Literal(Literal::Double(1.5)).to_string(), "1.5e0");
        assert_eq!(Expr::boolean(false).to_string(), "false()");
        assert_eq!(Expr::empty().to_string(), "()");
    }

    #[test]
    fn test_flwor() {
        let flwor = Expr::Flwor(Flwor::new(
            vec![
                FlworClause::For {
                    var: QName::new("d"),
                    position: None,
                    seq: Expr::call("collection", vec![]),
                },
                FlworClause::OrderBy(vec![
                    SortKey::new(Expr::call("px:field-values", vec![Expr::string("title"), Expr::var("d")]))
                        .descending()
                        .empty_greatest(),
                ]),
            ],
            Expr::var("d"),
        ));
        assert_eq!(
            flwor.to_string(),
            r#"for $d in collection() order by px:field-values("title", $d) descending empty greatest return $d"#
        );
    }

    #[test]
    fn test_constructors() {
        let element = Expr::Element {
            name: QName::new("TermQuery"),
            attributes: vec![Expr::Attribute {
                name: QName::new("fieldName"),
                value: Box::new(Expr::string("px_path")),
            }],
            content: Some(Box::new(Expr::string("title"))),
        };
        assert_eq!(
            element.to_string(),
            r#"element TermQuery { attribute fieldName { "px_path" }, "title" }"#
        );

        let empty = Expr::Element {
            name: QName::new("MatchAllDocsQuery"),
            attributes: vec![],
            content: None,
        };
        assert_eq!(empty.to_string(), "element MatchAllDocsQuery { }");
    }

    #[test]
    fn test_subsequence_and_union() {
        let union = Expr::SetOp {
            op: SetOperator::Union,
            operands: vec![Expr::child("a"), Expr::child("b")],
        };
        let path = Expr::path(vec![Expr::Root, union, Expr::child("c")]);
        assert_eq!(path.to_string(), "/(a | b)/c");

        let sub = Expr::Subsequence {
            seq: Box::new(Expr::path(vec![Expr::Root, Expr::child("doc")])),
            start: Box::new(Expr::integer(2)),
            length: None,
        };
        assert_eq!(sub.to_string(), "subsequence(/doc, 2)");
    }
}
