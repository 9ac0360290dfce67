//! flowsim-templates: flow-simulation template documents
//!
//! This crate contains everything between raw template text and a
//! validated, fully substituted [`Template`]:
//! - Template schema (serde types for the YAML document)
//! - Parameter value model and type coercion
//! - `${name}` substitution over raw text
//! - Tolerant header extraction for unsubstituted templates
//! - Builtin and inline profiles for PMF expansion
//! - Two-phase whole-template validation
//!
//! No I/O happens here; loading and caching belong to the service in the
//! `flowsim` crate.
//!
//! # Example
//!
//! ```yaml
//! schemaVersion: 1
//! generator: flowsim
//! metadata:
//!   id: checkout
//!   title: Checkout service
//!   version: 1.0.0
//! parameters:
//!   - name: efficiency
//!     type: number
//!     default: 0.8
//!     min: 0
//!     max: 1
//! grid: { bins: 4, binSize: 1, binUnit: hours }
//! nodes:
//!   - id: served
//!     kind: expr
//!     expr: MIN(arrivals, capacity * ${efficiency})
//! ```

pub mod definition;
pub mod error;
pub mod header;
pub mod params;
pub mod profile;
pub mod substitution;
pub mod validator;

pub use definition::{
    endpoint_node, ArrayElementType, InitialCondition, Mode, NodeKind, ParamType, PmfSpec,
    ProfileSpec, RngSpec, Semantics, Template, TemplateGrid, TemplateMetadata, TemplateNode,
    TemplateOutput, TemplateParameter, TemplateProvenance, TemplateTopology, TemplateWindow,
    TopologyEdge, TopologyNode, ALL_SERIES, GENERATOR_PREFIX, MAX_BINS, RNG_KIND_PCG32,
    SCHEMA_VERSION,
};
pub use error::{TemplateError, ValidationEntity, ValidationIssue, ValidationReport};
pub use header::{declared_parameters, parse_header, RngHeader, TemplateHeader};
pub use params::{check_bounds, format_number, ParamMap, ParamValue};
pub use profile::{builtin_profile, expand_pmf, resolve_profile, BuiltinProfile, ProfileKind};
pub use substitution::{has_placeholders, placeholders, substitute};
pub use validator::{check_bound_lengths, check_parameter_values, validate_template};

/// Strictly parse placeholder-free template text
///
/// Fails with a parse error naming the leftover placeholders if the text
/// has not been substituted.
pub fn parse_template(text: &str) -> Result<Template, TemplateError> {
    if has_placeholders(text) {
        return Err(TemplateError::Parse {
            context: "template".to_string(),
            message: format!(
                "unsubstituted placeholders: {}",
                placeholders(text).into_iter().collect::<Vec<_>>().join(", ")
            ),
        });
    }
    Template::from_yaml(text)
}
