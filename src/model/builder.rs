//! Model builder
//!
//! Turns a validated, substituted [`Template`] into a [`SimModelArtifact`].
//!
//! ## Content-addressed model id
//!
//! ```text
//! SHA-256(substituted template text) -> lowercase hex -> modelId
//! ```
//!
//! The same template with the same parameters always substitutes to the
//! same text, so it always gets the same model id.

use chrono::{DateTime, Utc};
use flowsim_templates::{
    expand_pmf, NodeKind, ParamMap, Template, TemplateError, TemplateNode,
};
use sha2::{Digest, Sha256};

use super::artifact::{
    ArtifactNode, Provenance, SimModelArtifact, META_ORIGIN_KIND, META_PROFILE_KIND,
    META_PROFILE_NAME,
};
use crate::GENERATOR_NAME;

/// Provenance timestamp format (sortable UTC)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Provenance source when none is given
pub const DEFAULT_SOURCE: &str = "template";

/// Model id for substituted template text
pub fn model_id(substituted_text: &str) -> String {
    hex::encode(Sha256::digest(substituted_text.as_bytes()))
}

/// Generator identity used when the template's provenance names none
pub fn default_generator() -> String {
    format!("{}/{}", GENERATOR_NAME, env!("CARGO_PKG_VERSION"))
}

/// Provenance parameters: template base, then declared defaults, then overrides
pub fn merge_parameters(template: &Template, overrides: &ParamMap) -> Result<ParamMap, TemplateError> {
    let mut merged = template
        .provenance
        .as_ref()
        .map(|p| p.parameters.clone())
        .unwrap_or_default();
    for param in &template.parameters {
        if let Some(default) = param.default_value()? {
            merged.insert(param.name.clone(), default);
        }
    }
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(merged)
}

pub struct ModelBuilder<'a> {
    template: &'a Template,
    substituted_text: &'a str,
    overrides: &'a ParamMap,
    source: String,
    generated_at: Option<DateTime<Utc>>,
}

impl<'a> ModelBuilder<'a> {
    /// `overrides` are the caller's normalized parameter values
    pub fn new(template: &'a Template, substituted_text: &'a str, overrides: &'a ParamMap) -> Self {
        Self {
            template,
            substituted_text,
            overrides,
            source: DEFAULT_SOURCE.to_string(),
            generated_at: None,
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Fix the provenance timestamp instead of using the current time
    pub fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    pub fn build(self) -> Result<SimModelArtifact, TemplateError> {
        let template = self.template;
        let mode = template.effective_mode();

        let nodes = template
            .nodes
            .iter()
            .map(|node| materialize(node, template.grid.bins))
            .collect::<Result<Vec<_>, _>>()?;

        let generator = template
            .provenance
            .as_ref()
            .and_then(|p| p.generator.clone())
            .filter(|g| !g.trim().is_empty())
            .unwrap_or_else(default_generator);

        let provenance = Provenance {
            source: self.source,
            generator,
            generated_at: self
                .generated_at
                .unwrap_or_else(Utc::now)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
            template_id: template.metadata.id.clone(),
            template_version: template.metadata.version.clone(),
            mode,
            model_id: model_id(self.substituted_text),
            schema_version: template.schema_version,
            parameters: merge_parameters(template, self.overrides)?,
        };

        Ok(SimModelArtifact {
            schema_version: template.schema_version,
            generator: template.generator.clone(),
            mode,
            metadata: template.metadata.clone(),
            window: template.window.clone(),
            grid: template.grid.clone(),
            topology: template.topology.clone(),
            nodes,
            outputs: template.outputs.clone(),
            rng: template.rng.clone(),
            provenance,
        })
    }
}

fn materialize(node: &TemplateNode, bins: i64) -> Result<ArtifactNode, TemplateError> {
    let mut out = ArtifactNode {
        id: node.id.clone(),
        kind: node.kind.clone(),
        values: node.values.clone(),
        source: node.source.clone(),
        expr: node.expr.clone(),
        dependencies: node.dependencies.clone(),
        pmf: node.pmf.clone(),
        metadata: node.metadata.clone(),
    };

    if node.node_kind() != Some(NodeKind::Pmf) {
        return Ok(out);
    }
    let (Some(pmf), Some(profile)) = (&node.pmf, &node.profile) else {
        return Ok(out);
    };

    out.kind = NodeKind::Const.as_str().to_string();
    out.values = Some(expand_pmf(&node.id, pmf, profile, bins)?);
    out.metadata
        .insert(META_ORIGIN_KIND.to_string(), NodeKind::Pmf.as_str().to_string());
    out.metadata
        .insert(META_PROFILE_KIND.to_string(), profile.kind.clone());
    if let Some(name) = &profile.name {
        out.metadata.insert(META_PROFILE_NAME.to_string(), name.clone());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flowsim_templates::ParamValue;
    use pretty_assertions::assert_eq;

    const TEMPLATE: &str = r#"
schemaVersion: 1
generator: flowsim
metadata: { id: demand, title: Demand, version: 2.0.0 }
parameters:
  - name: scale
    type: number
    default: 1.5
grid: { bins: 3, binSize: 1, binUnit: hours }
nodes:
  - id: demand
    kind: pmf
    pmf: { values: [10, 20], probabilities: [0.4, 0.6] }
    profile: { kind: inline, weights: [0.5, 1.5, 1.0] }
  - id: jitter
    kind: pmf
    pmf: { values: [0, 1], probabilities: [0.5, 0.5] }
  - id: load
    kind: expr
    expr: demand * 1.5
topology:
  nodes:
    - id: svc
      kind: service
      semantics: { arrivals: demand, served: load }
provenance:
  parameters:
    region: eu-west
    scale: 1.0
"#;

    fn template() -> Template {
        Template::from_yaml(TEMPLATE).unwrap()
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_model_id_is_sha256_hex() {
        let id = model_id("abc");
        assert_eq!(
            id,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(model_id("abc"), model_id("abc"));
        assert_ne!(model_id("abc"), model_id("abd"));
    }

    #[test]
    fn test_pmf_with_profile_becomes_const() {
        let t = template();
        let artifact = ModelBuilder::new(&t, TEMPLATE, &ParamMap::new())
            .generated_at(at())
            .build()
            .unwrap();

        let demand = artifact.node("demand").unwrap();
        assert_eq!(demand.kind, "const");
        assert_eq!(demand.values, Some(vec![8.0, 24.0, 16.0]));
        assert_eq!(demand.pmf, t.nodes[0].pmf);
        assert_eq!(demand.metadata.get(META_ORIGIN_KIND).map(String::as_str), Some("pmf"));
        assert_eq!(demand.metadata.get(META_PROFILE_KIND).map(String::as_str), Some("inline"));
        assert!(!demand.metadata.contains_key(META_PROFILE_NAME));

        let jitter = artifact.node("jitter").unwrap();
        assert_eq!(jitter.kind, "pmf");
        assert_eq!(jitter.values, None);

        assert_eq!(artifact.node("load").unwrap().expr.as_deref(), Some("demand * 1.5"));
    }

    #[test]
    fn test_provenance() {
        let t = template();
        let overrides: ParamMap = [("scale".to_string(), ParamValue::Float(2.0))]
            .into_iter()
            .collect();
        let artifact = ModelBuilder::new(&t, TEMPLATE, &overrides)
            .source("demand.yaml")
            .generated_at(at())
            .build()
            .unwrap();

        let p = &artifact.provenance;
        assert_eq!(p.source, "demand.yaml");
        assert_eq!(p.generator, default_generator());
        assert_eq!(p.generated_at, "2025-03-01T12:00:00Z");
        assert_eq!(p.template_id, "demand");
        assert_eq!(p.template_version, "2.0.0");
        assert_eq!(p.model_id, model_id(TEMPLATE));
        assert_eq!(p.schema_version, 1);

        let expected: ParamMap = [
            ("region".to_string(), ParamValue::from("eu-west")),
            ("scale".to_string(), ParamValue::Float(2.0)),
        ]
        .into_iter()
        .collect();
        assert_eq!(p.parameters, expected);
    }

    #[test]
    fn test_declared_default_beats_template_base() {
        let merged = merge_parameters(&template(), &ParamMap::new()).unwrap();
        assert_eq!(merged.get("scale"), Some(&ParamValue::Float(1.5)));
    }

    #[test]
    fn test_explicit_generator_kept() {
        let mut t = template();
        t.provenance.as_mut().unwrap().generator = Some("flowsim-studio/4.1".into());
        let artifact = ModelBuilder::new(&t, TEMPLATE, &ParamMap::new())
            .build()
            .unwrap();
        assert_eq!(artifact.provenance.generator, "flowsim-studio/4.1");
    }
}
