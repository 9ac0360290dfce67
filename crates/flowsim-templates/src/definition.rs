//! Template Definition
//!
//! Strict schema for a flow-simulation template. Only fully substituted
//! text (no `${...}` placeholders) is expected to deserialize into these
//! types; see [`crate::header`] for the tolerant pre-substitution pass.
//!
//! `window` may be omitted; the engine then runs on bin indices alone.
//! When present it is validated (UTC start, `UTC` timezone).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TemplateError;
use crate::params::ParamValue;

/// Schema version this crate reads and writes
pub const SCHEMA_VERSION: u32 = 1;

/// Generators must identify themselves with this prefix
pub const GENERATOR_PREFIX: &str = "flowsim";

/// The only supported RNG kind
pub const RNG_KIND_PCG32: &str = "pcg32";

/// Output series wildcard
pub const ALL_SERIES: &str = "*";

/// Largest accepted `grid.bins`; one minute bins over roughly two years
pub const MAX_BINS: i64 = 1_000_000;

/// A complete template (root document)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub generator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub metadata: TemplateMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<TemplateParameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<TemplateWindow>,
    #[serde(default)]
    pub grid: TemplateGrid,
    #[serde(default)]
    pub topology: TemplateTopology,
    #[serde(default)]
    pub nodes: Vec<TemplateNode>,
    #[serde(default)]
    pub outputs: Vec<TemplateOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng: Option<RngSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<TemplateProvenance>,
}

impl Template {
    /// Strictly parse substituted template text
    pub fn from_yaml(text: &str) -> Result<Self, TemplateError> {
        serde_yaml::from_str(text).map_err(|e| TemplateError::Parse {
            context: "template".to_string(),
            message: e.to_string(),
        })
    }

    /// Mode declared by the template, `simulation` when absent
    pub fn effective_mode(&self) -> Mode {
        self.mode.unwrap_or_default()
    }

    pub fn node(&self, id: &str) -> Option<&TemplateNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_ids(&self) -> BTreeSet<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    pub fn parameter(&self, name: &str) -> Option<&TemplateParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Compilation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Simulation,
    Telemetry,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Simulation => "simulation",
            Mode::Telemetry => "telemetry",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulation" => Ok(Mode::Simulation),
            "telemetry" => Ok(Mode::Telemetry),
            other => Err(TemplateError::Parse {
                context: "mode".to_string(),
                message: format!("unknown mode '{}', expected simulation or telemetry", other),
            }),
        }
    }
}

/// Template metadata
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateMetadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

// =============================================================================
// PARAMETERS
// =============================================================================

/// Declared parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Element type for `array` parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_of: Option<ArrayElementType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_yaml::Value>,
    /// Lower bound, applied per element for arrays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound, applied per element for arrays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl TemplateParameter {
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            array_of: None,
            title: None,
            description: None,
            default: None,
            min: None,
            max: None,
        }
    }

    pub fn with_default(mut self, default: serde_yaml::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_array_of(mut self, element: ArrayElementType) -> Self {
        self.array_of = Some(element);
        self
    }

    /// Declared default, normalized to this parameter's type
    pub fn default_value(&self) -> Result<Option<ParamValue>, TemplateError> {
        self.default
            .as_ref()
            .map(|v| ParamValue::from_yaml(&self.name, v, Some(self)))
            .transpose()
    }

    /// Element type of an array parameter (`double` unless declared `int`)
    pub fn element_type(&self) -> ArrayElementType {
        self.array_of.unwrap_or(ArrayElementType::Double)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayElementType {
    #[serde(alias = "integer")]
    Int,
    #[serde(alias = "number", alias = "float")]
    Double,
}

// =============================================================================
// TIME
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateWindow {
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateGrid {
    #[serde(default)]
    pub bins: i64,
    #[serde(default)]
    pub bin_size: i64,
    #[serde(default)]
    pub bin_unit: String,
}

// =============================================================================
// NODES
// =============================================================================

/// Supported node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Const,
    Pmf,
    Expr,
}

impl NodeKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "const" => Some(NodeKind::Const),
            "pmf" => Some(NodeKind::Pmf),
            "expr" => Some(NodeKind::Expr),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Const => "const",
            NodeKind::Pmf => "pmf",
            NodeKind::Expr => "expr",
        }
    }
}

/// A computation node
///
/// `kind` stays a string so an unsupported kind is reported by the
/// validator against the node id rather than failing deserialization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateNode {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
    /// Telemetry series reference for `const` nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmf: Option<PmfSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileSpec>,
    /// Formula for `expr` nodes; `expression` is accepted as an alias
    #[serde(
        default,
        alias = "expression",
        skip_serializing_if = "Option::is_none"
    )]
    pub expr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl TemplateNode {
    pub fn node_kind(&self) -> Option<NodeKind> {
        NodeKind::parse(&self.kind)
    }
}

/// Value/probability pairs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PmfSpec {
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default)]
    pub probabilities: Vec<f64>,
}

impl PmfSpec {
    /// Expected value, `Σ value · probability`
    pub fn expected_value(&self) -> f64 {
        self.values
            .iter()
            .zip(&self.probabilities)
            .map(|(v, p)| v * p)
            .sum()
    }
}

/// Temporal weighting curve attached to a PMF node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfileSpec {
    /// `builtin` or `inline`
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateOutput {
    #[serde(default)]
    pub series: String,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub as_name: Option<String>,
}

// =============================================================================
// TOPOLOGY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateTopology {
    #[serde(default)]
    pub nodes: Vec<TopologyNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<TopologyEdge>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyNode {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub semantics: Semantics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_kernel: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_condition: Option<InitialCondition>,
}

/// Mapping of logical roles to node ids
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Semantics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrivals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub served: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failures: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_echo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_demand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms_sum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub served_count: Option<String>,
}

impl Semantics {
    /// Every role that is set, as `(role name, node id)`
    pub fn roles(&self) -> Vec<(&'static str, &str)> {
        [
            ("arrivals", &self.arrivals),
            ("served", &self.served),
            ("errors", &self.errors),
            ("attempts", &self.attempts),
            ("failures", &self.failures),
            ("retryEcho", &self.retry_echo),
            ("queue", &self.queue),
            ("capacity", &self.capacity),
            ("externalDemand", &self.external_demand),
            ("processingTimeMsSum", &self.processing_time_ms_sum),
            ("servedCount", &self.served_count),
        ]
        .into_iter()
        .filter_map(|(role, target)| target.as_deref().map(|t| (role, t)))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TopologyEdge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl TopologyEdge {
    /// Label used in diagnostics: explicit id, else `from->to`
    pub fn label(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}->{}", self.from, self.to))
    }
}

/// Strip an optional `:port` suffix from an edge endpoint
pub fn endpoint_node(endpoint: &str) -> &str {
    endpoint.split(':').next().unwrap_or(endpoint)
}

// =============================================================================
// RNG / PROVENANCE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RngSpec {
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Author-declared provenance hints
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateProvenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    /// Base parameters, merged under caller overrides
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParamValue>,
}
