pub mod ast;
pub mod display;
pub mod visitor;

pub use ast::{
    ArityError, Axis, BinaryOp, Comparison, EmptyOrder, Expr, Flwor, FlworClause, Literal,
    NodeTest, PathStep, QName, SetOperator, SortKey, SortOrder,
};
pub use visitor::{ExprVisitor, Transformed, free_variables};
