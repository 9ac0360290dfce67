//! Expression errors

use thiserror::Error;

/// Failure to parse a formula
///
/// Messages omit the node id; use [`ExprError::node`] for it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("expression syntax error: {message}")]
    Syntax { node: String, message: String },

    #[error("expression is empty")]
    Empty { node: String },

    #[error("incomplete expression")]
    Incomplete { node: String },
}

impl ExprError {
    /// Id of the node whose formula failed to parse
    pub fn node(&self) -> &str {
        match self {
            ExprError::Syntax { node, .. }
            | ExprError::Empty { node }
            | ExprError::Incomplete { node } => node,
        }
    }
}

/// Semantic problem found in a well-formed expression
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExprIssue {
    #[error("references unknown node '{reference}'")]
    UnknownNode { node: String, reference: String },

    #[error("references '{dependency}' which is missing from its declared dependencies")]
    MissingDependency { node: String, dependency: String },

    #[error("declares dependency '{dependency}' which its expression does not reference")]
    ExtraDependency { node: String, dependency: String },

    #[error("calls unknown function '{function}'")]
    UnknownFunction { node: String, function: String },

    #[error("{function} expects {expected} argument(s), found {found}")]
    Arity {
        node: String,
        function: String,
        expected: String,
        found: usize,
    },

    #[error("SHIFT lag must be a non-negative integer literal, found '{found}'")]
    InvalidShiftLag { node: String, found: String },

    #[error("references itself outside a SHIFT with positive lag")]
    SelfReference { node: String },
}

impl ExprIssue {
    /// Id of the node whose formula has the issue
    pub fn node(&self) -> &str {
        match self {
            ExprIssue::UnknownNode { node, .. }
            | ExprIssue::MissingDependency { node, .. }
            | ExprIssue::ExtraDependency { node, .. }
            | ExprIssue::UnknownFunction { node, .. }
            | ExprIssue::Arity { node, .. }
            | ExprIssue::InvalidShiftLag { node, .. }
            | ExprIssue::SelfReference { node } => node,
        }
    }
}
