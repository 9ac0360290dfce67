//! Semantic validation of expression nodes
//!
//! Validation is first-phase only. A formula that shifts its own node
//! (`queue = SHIFT(queue, 1) + arrivals - served`) is well-formed but can
//! only be evaluated with a seeded initial value, so it comes back as
//! [`ExprValidation::RequiresInitialCondition`] for the topology pass to
//! close.

use std::collections::BTreeSet;

use crate::ast::{collect_scoped_references, Expr};
use crate::error::{ExprError, ExprIssue};
use crate::functions::{self, SHIFT};
use crate::parser::parse_expression;
use tracing::debug;

/// Outcome of validating one expression node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprValidation {
    Valid,
    /// Well-formed, but needs an initial condition for the given node id
    RequiresInitialCondition(String),
    Invalid(Vec<ExprIssue>),
}

impl ExprValidation {
    pub fn is_invalid(&self) -> bool {
        matches!(self, ExprValidation::Invalid(_))
    }

    pub fn issues(&self) -> &[ExprIssue] {
        match self {
            ExprValidation::Invalid(issues) => issues,
            _ => &[],
        }
    }
}

/// An expression node ready for validation
#[derive(Debug, Clone, Copy)]
pub struct ExprNode<'a> {
    pub id: &'a str,
    pub expr: &'a Expr,
    /// Explicit dependency list, if the node declares one
    pub dependencies: Option<&'a [String]>,
}

/// Validate an expression against the set of node ids in the template
pub fn validate_expression(node: ExprNode<'_>, known_nodes: &BTreeSet<String>) -> ExprValidation {
    let mut issues = Vec::new();
    let id = node.id;

    check_calls(id, node.expr, &mut issues);

    let refs = collect_scoped_references(node.expr);
    for reference in refs.all() {
        if !known_nodes.contains(&reference) {
            issues.push(ExprIssue::UnknownNode {
                node: id.to_string(),
                reference,
            });
        }
    }

    let self_shift = refs.shifted.contains(id);
    if refs.direct.contains(id) || (self_shift && has_zero_lag_self_shift(id, node.expr)) {
        issues.push(ExprIssue::SelfReference {
            node: id.to_string(),
        });
    }

    if let Some(declared) = node.dependencies {
        let declared: BTreeSet<&str> = declared
            .iter()
            .map(String::as_str)
            .filter(|d| *d != id)
            .collect();
        let referenced: BTreeSet<&str> = refs
            .direct
            .iter()
            .chain(refs.shifted.iter())
            .map(String::as_str)
            .filter(|r| *r != id)
            .collect();

        for missing in referenced.difference(&declared) {
            issues.push(ExprIssue::MissingDependency {
                node: id.to_string(),
                dependency: missing.to_string(),
            });
        }
        for extra in declared.difference(&referenced) {
            issues.push(ExprIssue::ExtraDependency {
                node: id.to_string(),
                dependency: extra.to_string(),
            });
        }
    }

    if !issues.is_empty() {
        ExprValidation::Invalid(issues)
    } else if self_shift {
        ExprValidation::RequiresInitialCondition(id.to_string())
    } else {
        ExprValidation::Valid
    }
}

/// Parse then validate a formula in one step
pub fn analyze(
    id: &str,
    formula: &str,
    dependencies: Option<&[String]>,
    known_nodes: &BTreeSet<String>,
) -> Result<ExprValidation, ExprError> {
    let expr = parse_expression(id, formula)?;
    let outcome = validate_expression(
        ExprNode {
            id,
            expr: &expr,
            dependencies,
        },
        known_nodes,
    );
    debug!("Expression node '{}': {:?}", id, outcome);
    Ok(outcome)
}

/// Function names and arities, plus the SHIFT lag shape
fn check_calls(id: &str, expr: &Expr, issues: &mut Vec<ExprIssue>) {
    match expr {
        Expr::Literal(_) | Expr::NodeRef(_) => {}
        Expr::ArrayLiteral(items) => {
            for item in items {
                check_calls(id, item, issues);
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            check_calls(id, left, issues);
            check_calls(id, right, issues);
        }
        Expr::Call { name, args } => {
            match functions::lookup(name) {
                None => issues.push(ExprIssue::UnknownFunction {
                    node: id.to_string(),
                    function: name.clone(),
                }),
                Some(spec) if !spec.accepts(args.len()) => issues.push(ExprIssue::Arity {
                    node: id.to_string(),
                    function: spec.name.to_string(),
                    expected: spec.arity(),
                    found: args.len(),
                }),
                Some(spec) if spec.name == SHIFT => {
                    if shift_lag(&args[1]).is_none() {
                        issues.push(ExprIssue::InvalidShiftLag {
                            node: id.to_string(),
                            found: args[1].to_expr_string(),
                        });
                    }
                }
                Some(_) => {}
            }
            for arg in args {
                check_calls(id, arg, issues);
            }
        }
    }
}

fn shift_lag(arg: &Expr) -> Option<u64> {
    let lag = arg.as_literal()?;
    (lag >= 0.0 && lag.fract() == 0.0).then_some(lag as u64)
}

/// `SHIFT(self, 0)` reads the current bin and is a plain algebraic loop
fn has_zero_lag_self_shift(id: &str, expr: &Expr) -> bool {
    match expr {
        Expr::Literal(_) | Expr::NodeRef(_) => false,
        Expr::ArrayLiteral(items) => items.iter().any(|e| has_zero_lag_self_shift(id, e)),
        Expr::BinaryOp { left, right, .. } => {
            has_zero_lag_self_shift(id, left) || has_zero_lag_self_shift(id, right)
        }
        Expr::Call { name, args } => {
            let zero_self = name.eq_ignore_ascii_case(SHIFT)
                && args.len() == 2
                && shift_lag(&args[1]) == Some(0)
                && crate::ast::collect_references(&args[0]).contains(id);
            zero_self || args.iter().any(|e| has_zero_lag_self_shift(id, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn known(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn deps(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_valid_expression() {
        let nodes = known(&["arrivals", "capacity", "served"]);
        let result = analyze("served", "MIN(arrivals, capacity * 0.9)", None, &nodes).unwrap();
        assert_eq!(result, ExprValidation::Valid);
    }

    #[test]
    fn test_unknown_reference() {
        let nodes = known(&["arrivals", "served"]);
        let result = analyze("served", "MIN(arrivals, capacity)", None, &nodes).unwrap();
        assert_eq!(
            result.issues(),
            &[ExprIssue::UnknownNode {
                node: "served".into(),
                reference: "capacity".into()
            }]
        );
    }

    #[test]
    fn test_dependency_mismatch_reports_missing_and_extra() {
        let nodes = known(&["a", "b", "c", "out"]);
        let declared = deps(&["a", "c"]);
        let result = analyze("out", "a + b", Some(&declared), &nodes).unwrap();
        assert_eq!(
            result.issues(),
            &[
                ExprIssue::MissingDependency {
                    node: "out".into(),
                    dependency: "b".into()
                },
                ExprIssue::ExtraDependency {
                    node: "out".into(),
                    dependency: "c".into()
                },
            ]
        );
    }

    #[test]
    fn test_declared_dependencies_exact_match() {
        let nodes = known(&["a", "b", "out"]);
        let declared = deps(&["b", "a"]);
        let result = analyze("out", "a * b", Some(&declared), &nodes).unwrap();
        assert_eq!(result, ExprValidation::Valid);
    }

    #[test]
    fn test_self_shift_requires_initial_condition() {
        let nodes = known(&["queue", "arrivals", "served"]);
        let declared = deps(&["arrivals", "served"]);
        let result = analyze(
            "queue",
            "MAX(0, SHIFT(queue, 1) + arrivals - served)",
            Some(&declared),
            &nodes,
        )
        .unwrap();
        assert_eq!(
            result,
            ExprValidation::RequiresInitialCondition("queue".into())
        );
    }

    #[test]
    fn test_self_reference_without_shift_is_invalid() {
        let nodes = known(&["queue", "arrivals"]);
        let result = analyze("queue", "queue + arrivals", None, &nodes).unwrap();
        assert_eq!(
            result.issues(),
            &[ExprIssue::SelfReference {
                node: "queue".into()
            }]
        );
    }

    #[test]
    fn test_zero_lag_self_shift_is_invalid() {
        let nodes = known(&["queue"]);
        let result = analyze("queue", "SHIFT(queue, 0) + 1", None, &nodes).unwrap();
        assert!(result.is_invalid());
    }

    #[test]
    fn test_shift_of_other_node_is_valid() {
        let nodes = known(&["arrivals", "lagged"]);
        let result = analyze("lagged", "SHIFT(arrivals, 2)", None, &nodes).unwrap();
        assert_eq!(result, ExprValidation::Valid);
    }

    #[test]
    fn test_function_checks() {
        let nodes = known(&["a", "b", "out"]);
        let result = analyze("out", "SQRT(a) + MIN(a) + SHIFT(a, b)", None, &nodes).unwrap();
        let issues = result.issues();
        assert_eq!(issues.len(), 3);
        assert!(matches!(issues[0], ExprIssue::UnknownFunction { .. }));
        assert!(matches!(issues[1], ExprIssue::Arity { found: 1, .. }));
        assert!(matches!(issues[2], ExprIssue::InvalidShiftLag { .. }));
    }

    #[test]
    fn test_parse_error_propagates() {
        let nodes = known(&["a"]);
        let err = analyze("out", "MIN(a,", None, &nodes).unwrap_err();
        assert_eq!(err.node(), "out");
    }
}
