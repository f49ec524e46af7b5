use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Qualified name with an optional namespace prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local: local.into(),
        }
    }

    pub fn prefixed(prefix: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            local: local.into(),
        }
    }

    /// Parse `prefix:local` or `local`
    pub fn parse(name: &str) -> Self {
        match name.split_once(':') {
            Some((prefix, local)) => Self::prefixed(prefix, local),
            None => Self::new(name),
        }
    }

    /// True for an unprefixed name or one in the `fn` prefix with the given local part
    pub fn is_builtin(&self, local: &str) -> bool {
        self.local == local && matches!(self.prefix.as_deref(), None | Some("fn"))
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// Navigation axis of a path step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Attribute,
    #[serde(rename = "self")]
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
}

impl Axis {
    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Attribute => "attribute",
            Axis::SelfAxis => "self",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::FollowingSibling => "following-sibling",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::Following => "following",
            Axis::Preceding => "preceding",
        }
    }
}

/// Node test of a path step
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeTest {
    Name(QName),
    /// `*`
    Wildcard,
    /// `node()`
    Node,
    /// `text()`
    Text,
    Comment,
    ProcessingInstruction,
    /// `document-node()`
    Document,
    /// `element()` or `element(name)`
    Element(Option<QName>),
    /// `attribute()` or `attribute(name)`
    Attribute(Option<QName>),
}

/// One step of a path: axis, node test and predicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    pub axis: Axis,
    pub test: NodeTest,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predicates: Vec<Expr>,
}

impl PathStep {
    pub fn new(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            predicates: Vec::new(),
        }
    }

    pub fn with_predicate(mut self, predicate: Expr) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// `descendant-or-self::node()` without predicates, written as `//` between steps
    pub fn is_abbreviated_descendant(&self) -> bool {
        self.axis == Axis::DescendantOrSelf && self.test == NodeTest::Node && self.predicates.is_empty()
    }
}

/// Atomic literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntegerDivide,
    Modulo,
    // general comparisons
    Equals,
    NotEquals,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    // value comparisons
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // node comparisons
    Is,
    Precedes,
    Follows,
    And,
    Or,
    To,
}

/// Comparison operator, independent of general/value flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "div",
            BinaryOp::IntegerDivide => "idiv",
            BinaryOp::Modulo => "mod",
            BinaryOp::Equals => "=",
            BinaryOp::NotEquals => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
            BinaryOp::Is => "is",
            BinaryOp::Precedes => "<<",
            BinaryOp::Follows => ">>",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::To => "to",
        }
    }

    /// Binding strength, higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 3,
            BinaryOp::And => 4,
            BinaryOp::To => 6,
            BinaryOp::Add | BinaryOp::Subtract => 7,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::IntegerDivide | BinaryOp::Modulo => 8,
            _ => 5,
        }
    }

    /// The comparison this operator performs, for general and value comparisons
    pub fn comparison(self) -> Option<Comparison> {
        match self {
            BinaryOp::Equals | BinaryOp::Eq => Some(Comparison::Eq),
            BinaryOp::NotEquals | BinaryOp::Ne => Some(Comparison::Ne),
            BinaryOp::LessThan | BinaryOp::Lt => Some(Comparison::Lt),
            BinaryOp::LessEqual | BinaryOp::Le => Some(Comparison::Le),
            BinaryOp::GreaterThan | BinaryOp::Gt => Some(Comparison::Gt),
            BinaryOp::GreaterEqual | BinaryOp::Ge => Some(Comparison::Ge),
            _ => None,
        }
    }

    /// Operator with swapped operands: `a < b` is `b > a`
    pub fn flipped(self) -> Self {
        match self {
            BinaryOp::LessThan => BinaryOp::GreaterThan,
            BinaryOp::LessEqual => BinaryOp::GreaterEqual,
            BinaryOp::GreaterThan => BinaryOp::LessThan,
            BinaryOp::GreaterEqual => BinaryOp::LessEqual,
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Le => BinaryOp::Ge,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Ge => BinaryOp::Le,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Placement of empty keys in an ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyOrder {
    #[default]
    Least,
    Greatest,
}

/// One `order by` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub key: Expr,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
    #[serde(default)]
    pub empty: EmptyOrder,
}

impl SortKey {
    pub fn new(key: Expr) -> Self {
        Self {
            key,
            order: SortOrder::Ascending,
            collation: None,
            empty: EmptyOrder::Least,
        }
    }

    pub fn descending(mut self) -> Self {
        self.order = SortOrder::Descending;
        self
    }

    pub fn empty_greatest(mut self) -> Self {
        self.empty = EmptyOrder::Greatest;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlworClause {
    For {
        var: QName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<QName>,
        seq: Expr,
    },
    Let {
        var: QName,
        value: Expr,
    },
    Where(Expr),
    OrderBy(Vec<SortKey>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flwor {
    pub clauses: Vec<FlworClause>,
    #[serde(rename = "return")]
    pub ret: Box<Expr>,
}

/// Expression tree node.
///
/// Trees are treated as immutable values: rewrites build new nodes and
/// hand back the old ones untouched when nothing changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Literal(Literal),
    Variable(QName),
    /// `/`: the root of the context document
    Root,
    /// `.`: the context item
    Dot,
    Step(PathStep),
    /// Steps joined by `/`; the first may be a primary expression
    Path(Vec<Expr>),
    Filter {
        base: Box<Expr>,
        predicates: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    UnaryMinus(Box<Expr>),
    FunCall {
        name: QName,
        args: Vec<Expr>,
    },
    /// Comma sequence; the empty sequence is `()`
    Sequence(Vec<Expr>),
    Subsequence {
        seq: Box<Expr>,
        start: Box<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        length: Option<Box<Expr>>,
    },
    SetOp {
        op: SetOperator,
        operands: Vec<Expr>,
    },
    Element {
        name: QName,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attributes: Vec<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<Box<Expr>>,
    },
    Attribute {
        name: QName,
        value: Box<Expr>,
    },
    Text(Box<Expr>),
    Flwor(Flwor),
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Default for Expr {
    /// The empty sequence
    fn default() -> Self {
        Expr::Sequence(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected} children, got {actual}")]
pub struct ArityError {
    pub expected: usize,
    pub actual: usize,
}

// Construction helpers
impl Expr {
    pub fn empty() -> Self {
        Expr::Sequence(Vec::new())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn integer(value: i64) -> Self {
        Expr::Literal(Literal::Integer(value))
    }

    pub fn boolean(value: bool) -> Self {
        Expr::Literal(Literal::Boolean(value))
    }

    pub fn var(name: &str) -> Self {
        Expr::Variable(QName::parse(name))
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::FunCall {
            name: QName::parse(name),
            args,
        }
    }

    pub fn step(axis: Axis, test: NodeTest) -> Self {
        Expr::Step(PathStep::new(axis, test))
    }

    /// `child::name`
    pub fn child(name: &str) -> Self {
        Self::step(Axis::Child, NodeTest::Name(QName::parse(name)))
    }

    /// `attribute::name`
    pub fn attr(name: &str) -> Self {
        Self::step(Axis::Attribute, NodeTest::Name(QName::parse(name)))
    }

    /// `descendant-or-self::node()`, the `//` abbreviation
    pub fn descendants() -> Self {
        Self::step(Axis::DescendantOrSelf, NodeTest::Node)
    }

    pub fn path(steps: Vec<Expr>) -> Self {
        Expr::Path(steps)
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn filter(base: Expr, predicates: Vec<Expr>) -> Self {
        Expr::Filter {
            base: Box::new(base),
            predicates,
        }
    }

    /// Add a predicate to a step, or wrap anything else in a filter
    pub fn with_predicate(self, predicate: Expr) -> Self {
        match self {
            Expr::Step(step) => Expr::Step(step.with_predicate(predicate)),
            Expr::Filter {
                base,
                mut predicates,
            } => {
                predicates.push(predicate);
                Expr::Filter { base, predicates }
            }
            other => Expr::filter(other, vec![predicate]),
        }
    }

    pub fn is_empty_sequence(&self) -> bool {
        matches!(self, Expr::Sequence(items) if items.is_empty())
    }
}

// Arity and reconstruction
impl Expr {
    /// Child expressions in evaluation order
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Literal(_) | Expr::Variable(_) | Expr::Root | Expr::Dot => Vec::new(),
            Expr::Step(step) => step.predicates.iter().collect(),
            Expr::Path(items) | Expr::Sequence(items) => items.iter().collect(),
            Expr::Filter { base, predicates } => {
                std::iter::once(&**base).chain(predicates.iter()).collect()
            }
            Expr::Binary { lhs, rhs, .. } => vec![&**lhs, &**rhs],
            Expr::UnaryMinus(operand) | Expr::Text(operand) => vec![&**operand],
            Expr::FunCall { args, .. } => args.iter().collect(),
            Expr::Subsequence { seq, start, length } => {
                let mut children = vec![&**seq, &**start];
                children.extend(length.as_deref());
                children
            }
            Expr::SetOp { operands, .. } => operands.iter().collect(),
            Expr::Element {
                attributes,
                content,
                ..
            } => attributes.iter().chain(content.as_deref()).collect(),
            Expr::Attribute { value, .. } => vec![&**value],
            Expr::Flwor(flwor) => flwor.children(),
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => vec![&**condition, &**then, &**otherwise],
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Literal(_) | Expr::Variable(_) | Expr::Root | Expr::Dot => Vec::new(),
            Expr::Step(step) => step.predicates.iter_mut().collect(),
            Expr::Path(items) | Expr::Sequence(items) => items.iter_mut().collect(),
            Expr::Filter { base, predicates } => std::iter::once(&mut **base)
                .chain(predicates.iter_mut())
                .collect(),
            Expr::Binary { lhs, rhs, .. } => vec![&mut **lhs, &mut **rhs],
            Expr::UnaryMinus(operand) | Expr::Text(operand) => vec![&mut **operand],
            Expr::FunCall { args, .. } => args.iter_mut().collect(),
            Expr::Subsequence { seq, start, length } => {
                let mut children = vec![&mut **seq, &mut **start];
                children.extend(length.as_deref_mut());
                children
            }
            Expr::SetOp { operands, .. } => operands.iter_mut().collect(),
            Expr::Element {
                attributes,
                content,
                ..
            } => attributes
                .iter_mut()
                .chain(content.as_deref_mut())
                .collect(),
            Expr::Attribute { value, .. } => vec![&mut **value],
            Expr::Flwor(flwor) => flwor.children_mut(),
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => vec![&mut **condition, &mut **then, &mut **otherwise],
        }
    }

    pub fn arity(&self) -> usize {
        self.children().len()
    }

    /// Rebuild this node around a revised child list of the same length
    pub fn with_children(mut self, children: Vec<Expr>) -> Result<Expr, ArityError> {
        let expected = self.arity();
        if children.len() != expected {
            return Err(ArityError {
                expected,
                actual: children.len(),
            });
        }
        for (slot, child) in self.children_mut().into_iter().zip(children) {
            *slot = child;
        }
        Ok(self)
    }

    /// Pre-order walk over this node and all descendants
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// True if any node in the tree satisfies the predicate
    pub fn any(&self, mut pred: impl FnMut(&Expr) -> bool) -> bool {
        let mut found = false;
        self.walk(&mut |node| found = found || pred(node));
        found
    }
}

impl Flwor {
    pub fn new(clauses: Vec<FlworClause>, ret: Expr) -> Self {
        Self {
            clauses,
            ret: Box::new(ret),
        }
    }

    fn children(&self) -> Vec<&Expr> {
        let mut children = Vec::new();
        for clause in &self.clauses {
            match clause {
                FlworClause::For { seq, .. } => children.push(seq),
                FlworClause::Let { value, .. } => children.push(value),
                FlworClause::Where(condition) => children.push(condition),
                FlworClause::OrderBy(keys) => children.extend(keys.iter().map(|k| &k.key)),
            }
        }
        children.push(&*self.ret);
        children
    }

    fn children_mut(&mut self) -> Vec<&mut Expr> {
        let mut children = Vec::new();
        for clause in &mut self.clauses {
            match clause {
                FlworClause::For { seq, .. } => children.push(seq),
                FlworClause::Let { value, .. } => children.push(value),
                FlworClause::Where(condition) => children.push(condition),
                FlworClause::OrderBy(keys) => {
                    children.extend(keys.iter_mut().map(|k| &mut k.key))
                }
            }
        }
        children.push(&mut *self.ret);
        children
    }

    /// The single `order by` clause, if any
    pub fn order_by(&self) -> Option<&[SortKey]> {
        self.clauses.iter().find_map(|clause| match clause {
            FlworClause::OrderBy(keys) => Some(keys.as_slice()),
            _ => None,
        })
    }
}
