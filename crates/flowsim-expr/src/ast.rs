//! Expression AST
//!
//! Purely structural tree produced once per `expr` node. The AST is used
//! for reference collection and validation and is then discarded; the
//! canonical model keeps only the formula text.
//!
//! ```text
//! MIN(arrivals, capacity * 0.9)
//!
//! Call { MIN }
//!  ├── NodeRef(arrivals)
//!  └── BinaryOp(Mul)
//!       ├── NodeRef(capacity)
//!       └── Literal(0.9)
//! ```

use std::collections::BTreeSet;
use std::fmt;

use crate::functions::SHIFT;

// =============================================================================
// CORE AST TYPES
// =============================================================================

/// A parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal: `0.9`, `12`, `1e-3`
    Literal(f64),
    /// Array literal: `[1, 2, 3]`
    ArrayLiteral(Vec<Expr>),
    /// Reference to another node by id: `arrivals`
    NodeRef(String),
    /// Binary operation: `a + b`, `a <= b`
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Function call: `MIN(a, b)`, `SHIFT(queue, 1)`
    Call { name: String, args: Vec<Expr> },
}

/// Binary operators, arithmetic and comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
        }
    }

    /// Binding strength, higher binds tighter
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div => 3,
            BinaryOp::Add | BinaryOp::Sub => 2,
            _ => 1,
        }
    }
}

impl Expr {
    pub fn node_ref(id: impl Into<String>) -> Self {
        Expr::NodeRef(id.into())
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn as_literal(&self) -> Option<f64> {
        match self {
            Expr::Literal(v) => Some(*v),
            _ => None,
        }
    }

    /// Render back to formula text with minimal parentheses
    pub fn to_expr_string(&self) -> String {
        self.to_string()
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, parent: BinaryOp, right: bool) -> fmt::Result {
        let needs_parens = match self {
            Expr::BinaryOp { op, .. } => {
                op.precedence() < parent.precedence()
                    || (right && op.precedence() == parent.precedence())
            }
            _ => false,
        };
        if needs_parens {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::NodeRef(id) => write!(f, "{}", id),
            Expr::ArrayLiteral(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Expr::BinaryOp { op, left, right } => {
                left.fmt_operand(f, *op, false)?;
                write!(f, " {} ", op.symbol())?;
                right.fmt_operand(f, *op, true)
            }
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

// =============================================================================
// REFERENCE COLLECTION
// =============================================================================

/// Node references found in an expression, split by temporal context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct References {
    /// References evaluated in the current bin
    pub direct: BTreeSet<String>,
    /// References reached through the series argument of `SHIFT`
    pub shifted: BTreeSet<String>,
}

impl References {
    /// Every referenced node id, regardless of temporal context
    pub fn all(&self) -> BTreeSet<String> {
        self.direct.union(&self.shifted).cloned().collect()
    }
}

/// Collect the set of node ids referenced anywhere in the expression
pub fn collect_references(expr: &Expr) -> BTreeSet<String> {
    collect_scoped_references(expr).all()
}

/// Collect references, separating those reached through `SHIFT`
pub fn collect_scoped_references(expr: &Expr) -> References {
    let mut refs = References::default();
    walk(expr, false, &mut refs);
    refs
}

fn walk(expr: &Expr, shifted: bool, refs: &mut References) {
    match expr {
        Expr::Literal(_) => {}
        Expr::NodeRef(id) => {
            if shifted {
                refs.shifted.insert(id.clone());
            } else {
                refs.direct.insert(id.clone());
            }
        }
        Expr::ArrayLiteral(items) => {
            for item in items {
                walk(item, shifted, refs);
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            walk(left, shifted, refs);
            walk(right, shifted, refs);
        }
        Expr::Call { name, args } => {
            let is_shift = name.eq_ignore_ascii_case(SHIFT);
            for (i, arg) in args.iter().enumerate() {
                walk(arg, shifted || (is_shift && i == 0), refs);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_collect_references_walks_calls_and_operands() {
        let expr = Expr::call(
            "MIN",
            vec![
                Expr::node_ref("arrivals"),
                Expr::binary(BinaryOp::Mul, Expr::node_ref("capacity"), Expr::Literal(0.9)),
            ],
        );
        assert_eq!(collect_references(&expr), set(&["arrivals", "capacity"]));
    }

    #[test]
    fn test_literals_contribute_nothing() {
        let expr = Expr::ArrayLiteral(vec![Expr::Literal(1.0), Expr::Literal(2.0)]);
        assert!(collect_references(&expr).is_empty());
    }

    #[test]
    fn test_shift_series_is_scoped() {
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::call("SHIFT", vec![Expr::node_ref("queue"), Expr::Literal(1.0)]),
            Expr::node_ref("arrivals"),
        );
        let refs = collect_scoped_references(&expr);
        assert_eq!(refs.direct, set(&["arrivals"]));
        assert_eq!(refs.shifted, set(&["queue"]));
    }

    #[test]
    fn test_display_minimal_parentheses() {
        let expr = Expr::binary(
            BinaryOp::Mul,
            Expr::binary(BinaryOp::Add, Expr::node_ref("a"), Expr::node_ref("b")),
            Expr::node_ref("c"),
        );
        assert_eq!(expr.to_expr_string(), "(a + b) * c");

        let expr = Expr::binary(
            BinaryOp::Sub,
            Expr::node_ref("a"),
            Expr::binary(BinaryOp::Sub, Expr::node_ref("b"), Expr::node_ref("c")),
        );
        assert_eq!(expr.to_expr_string(), "a - (b - c)");
    }
}
