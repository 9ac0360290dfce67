//! Template errors
//!
//! Three terminal kinds: parse, validation and not-found. Validation
//! failures carry every issue found in the failing phase, each naming the
//! entity it concerns.

use std::fmt;
use std::path::PathBuf;

use flowsim_expr::ExprError;
use thiserror::Error;

/// Errors raised while loading, validating or compiling templates
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("parse error in {context}: {message}")]
    Parse { context: String, message: String },

    #[error("validation failed: {0}")]
    Validation(ValidationReport),

    #[error("template not found: {0}")]
    NotFound(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),
}

impl TemplateError {
    /// Single-issue validation error
    pub fn validation(entity: ValidationEntity, message: impl Into<String>) -> Self {
        let mut report = ValidationReport::new();
        report.push(entity, message);
        TemplateError::Validation(report)
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, TemplateError::Parse { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, TemplateError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TemplateError::NotFound(_))
    }

    /// Validation issues, empty for other kinds
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            TemplateError::Validation(report) => report.issues(),
            _ => &[],
        }
    }
}

impl From<ExprError> for TemplateError {
    fn from(error: ExprError) -> Self {
        TemplateError::Parse {
            context: format!("node '{}'", error.node()),
            message: error.to_string(),
        }
    }
}

/// The entity a validation issue is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationEntity {
    Template,
    Metadata,
    Window,
    Grid,
    Parameter { name: String, index: Option<usize> },
    Node(String),
    Output { index: usize, series: String },
    TopologyNode(String),
    Edge(String),
    Rng,
}

impl ValidationEntity {
    pub fn parameter(name: impl Into<String>) -> Self {
        ValidationEntity::Parameter {
            name: name.into(),
            index: None,
        }
    }

    pub fn parameter_element(name: impl Into<String>, index: usize) -> Self {
        ValidationEntity::Parameter {
            name: name.into(),
            index: Some(index),
        }
    }

    pub fn node(id: impl Into<String>) -> Self {
        ValidationEntity::Node(id.into())
    }
}

impl fmt::Display for ValidationEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationEntity::Template => write!(f, "template"),
            ValidationEntity::Metadata => write!(f, "metadata"),
            ValidationEntity::Window => write!(f, "window"),
            ValidationEntity::Grid => write!(f, "grid"),
            ValidationEntity::Parameter { name, index: None } => write!(f, "parameter '{}'", name),
            ValidationEntity::Parameter {
                name,
                index: Some(i),
            } => write!(f, "parameter '{}'[{}]", name, i),
            ValidationEntity::Node(id) => write!(f, "node '{}'", id),
            ValidationEntity::Output { index, series } => {
                write!(f, "output #{} ('{}')", index, series)
            }
            ValidationEntity::TopologyNode(id) => write!(f, "topology node '{}'", id),
            ValidationEntity::Edge(id) => write!(f, "edge '{}'", id),
            ValidationEntity::Rng => write!(f, "rng"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub entity: ValidationEntity,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.entity, self.message)
    }
}

/// Issues collected during one validation phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entity: ValidationEntity, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            entity,
            message: message.into(),
        });
    }

    /// Absorb the issues of a failed step; other errors are returned
    pub fn absorb(&mut self, error: TemplateError) -> Result<(), TemplateError> {
        match error {
            TemplateError::Validation(other) => {
                self.issues.extend(other.issues);
                Ok(())
            }
            other => Err(other),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// `Ok` when no issues were recorded
    pub fn into_result(self) -> Result<(), TemplateError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(TemplateError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.issues.as_slice() {
            [single] => write!(f, "{}", single),
            issues => {
                write!(f, "{} issues", issues.len())?;
                for issue in issues {
                    write!(f, "\n  - {}", issue)?;
                }
                Ok(())
            }
        }
    }
}
