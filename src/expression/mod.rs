// Expression language - templates, variable paths and arithmetic

pub mod parser;
pub mod resolver;

pub use parser::{parse, BinaryOp, Expr, ExprError, Token};
pub use resolver::{ExpressionResolver, VariableRef};
