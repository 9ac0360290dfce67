//! Canonical simulation model
//!
//! The compiler's output: a fully resolved, placeholder-free model an
//! evaluation engine can run as is. Field order here is the serialized
//! order, so `schemaVersion` must stay first.

use std::collections::BTreeMap;

use flowsim_templates::{
    Mode, ParamMap, PmfSpec, RngSpec, TemplateGrid, TemplateMetadata, TemplateOutput,
    TemplateTopology, TemplateWindow,
};
use serde::{Deserialize, Serialize};

/// Metadata key recording the kind a materialized node was compiled from
pub const META_ORIGIN_KIND: &str = "origin.kind";
pub const META_PROFILE_KIND: &str = "profile.kind";
pub const META_PROFILE_NAME: &str = "profile.name";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimModelArtifact {
    pub schema_version: u32,
    pub generator: String,
    pub mode: Mode,
    pub metadata: TemplateMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<TemplateWindow>,
    pub grid: TemplateGrid,
    pub topology: TemplateTopology,
    pub nodes: Vec<ArtifactNode>,
    #[serde(default)]
    pub outputs: Vec<TemplateOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng: Option<RngSpec>,
    pub provenance: Provenance,
}

impl SimModelArtifact {
    pub fn node(&self, id: &str) -> Option<&ArtifactNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// A materialized node
///
/// PMF nodes with a profile arrive here as `const` nodes carrying the
/// expanded series; their original `pmf` block is kept for traceability.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArtifactNode {
    pub id: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmf: Option<PmfSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Where a model came from and how to recognize it again
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub source: String,
    pub generator: String,
    pub generated_at: String,
    pub template_id: String,
    pub template_version: String,
    pub mode: Mode,
    /// SHA-256 (hex) of the substituted template text
    pub model_id: String,
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: ParamMap,
}
