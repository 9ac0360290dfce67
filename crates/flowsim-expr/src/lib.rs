//! flowsim-expr: expression language for derived flow nodes
//!
//! This crate contains the pure formula logic for `expr` nodes:
//! - AST types (Expr, BinaryOp)
//! - Nom-based recursive-descent parser
//! - Reference collection (plain and SHIFT-scoped)
//! - Built-in function library with arity checks
//! - Semantic validation against the template's node ids
//!
//! Evaluation is left to the graph engine that consumes the compiled model.

pub mod ast;
pub mod error;
pub mod functions;
pub mod parser;
pub mod validator;

pub use ast::{collect_references, collect_scoped_references, BinaryOp, Expr, References};
pub use error::{ExprError, ExprIssue};
pub use parser::parse_expression;
pub use validator::{analyze, validate_expression, ExprNode, ExprValidation};
