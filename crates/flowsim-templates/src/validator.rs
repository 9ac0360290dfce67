//! Template Validator
//!
//! Whole-document checks run on a strictly parsed, fully substituted
//! template. Validation happens in two phases:
//!
//! 1. **Header**: generator, schema version, metadata, window, grid
//! 2. **Body**: parameters, nodes, outputs, topology, initial conditions, RNG
//!
//! The body is only checked once the header is clean, since node and
//! profile rules depend on the grid. Each phase reports every issue it
//! finds in one [`ValidationReport`].
//!
//! Expression nodes that shift themself are collected while checking nodes
//! and closed against topology `queue` semantics at the end of the body
//! phase.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use chrono::DateTime;
use flowsim_expr::{analyze, ExprValidation};
use regex::Regex;
use tracing::debug;

use crate::definition::{
    endpoint_node, Mode, NodeKind, ParamType, Template, TemplateNode, ALL_SERIES,
    GENERATOR_PREFIX, MAX_BINS, RNG_KIND_PCG32, SCHEMA_VERSION,
};
use crate::error::{TemplateError, ValidationEntity, ValidationReport};
use crate::params::{check_bounds, ParamMap};
use crate::profile::resolve_profile;

/// Allowed deviation of a PMF's probability sum from 1
pub const PMF_TOLERANCE: f64 = 1e-10;

static SEMVER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?$").unwrap()
});

/// Validate a substituted template in its effective mode
pub fn validate_template(template: &Template) -> Result<(), TemplateError> {
    validate_header(template)?;
    validate_body(template)?;
    debug!("Template '{}' is valid", template.metadata.id);
    Ok(())
}

/// Header phase: generator, schema version, metadata, window, grid
pub fn validate_header(template: &Template) -> Result<(), TemplateError> {
    let mut report = ValidationReport::new();

    if template.generator.trim().is_empty() {
        report.push(ValidationEntity::Template, "generator is required");
    } else if !template.generator.starts_with(GENERATOR_PREFIX) {
        report.push(
            ValidationEntity::Template,
            format!(
                "generator '{}' must start with '{}'",
                template.generator, GENERATOR_PREFIX
            ),
        );
    }

    if template.schema_version != SCHEMA_VERSION {
        report.push(
            ValidationEntity::Template,
            format!(
                "unsupported schemaVersion {}, expected {}",
                template.schema_version, SCHEMA_VERSION
            ),
        );
    }

    let metadata = &template.metadata;
    if metadata.id.trim().is_empty() {
        report.push(ValidationEntity::Metadata, "id is required");
    }
    if metadata.title.trim().is_empty() {
        report.push(ValidationEntity::Metadata, "title is required");
    }
    if metadata.version.trim().is_empty() {
        report.push(ValidationEntity::Metadata, "version is required");
    } else if !SEMVER_RE.is_match(metadata.version.trim()) {
        report.push(
            ValidationEntity::Metadata,
            format!("version '{}' is not a semantic version", metadata.version),
        );
    }

    if let Some(window) = &template.window {
        match DateTime::parse_from_rfc3339(window.start.trim()) {
            Ok(start) if start.offset().local_minus_utc() == 0 => {}
            Ok(_) => report.push(
                ValidationEntity::Window,
                format!("start '{}' must be UTC (zero offset)", window.start),
            ),
            Err(e) => report.push(
                ValidationEntity::Window,
                format!("start '{}' is not an ISO-8601 timestamp: {}", window.start, e),
            ),
        }
        if window.timezone != "UTC" {
            report.push(
                ValidationEntity::Window,
                format!("timezone must be 'UTC', got '{}'", window.timezone),
            );
        }
    }

    let grid = &template.grid;
    if grid.bins <= 0 {
        report.push(
            ValidationEntity::Grid,
            format!("bins must be positive, got {}", grid.bins),
        );
    } else if grid.bins > MAX_BINS {
        report.push(
            ValidationEntity::Grid,
            format!("bins must be at most {}, got {}", MAX_BINS, grid.bins),
        );
    }
    if grid.bin_size <= 0 {
        report.push(
            ValidationEntity::Grid,
            format!("binSize must be positive, got {}", grid.bin_size),
        );
    }
    if grid.bin_unit.trim().is_empty() {
        report.push(ValidationEntity::Grid, "binUnit is required");
    }

    report.into_result()
}

/// Body phase; assumes the header phase passed
pub fn validate_body(template: &Template) -> Result<(), TemplateError> {
    let mut report = ValidationReport::new();

    check_parameters(template, &mut report)?;
    let pending = check_nodes(template, &mut report)?;
    check_outputs(template, &mut report);
    check_topology(template, &mut report);
    check_initial_conditions(template, &pending, &mut report);
    check_rng(template, &mut report);

    report.into_result()
}

/// Bounds of every declared parameter present in `values`
pub fn check_parameter_values(template: &Template, values: &ParamMap) -> Result<(), TemplateError> {
    let mut report = ValidationReport::new();
    for param in &template.parameters {
        if let Some(value) = values.get(&param.name) {
            if let Err(e) = check_bounds(param, value) {
                report.absorb(e)?;
            }
        }
    }
    report.into_result()
}

/// Const nodes whose whole `values` came from a parameter must span the grid
///
/// `bindings` maps node id to parameter name, as recorded by
/// [`crate::header::parse_header`] on the raw text.
pub fn check_bound_lengths(
    template: &Template,
    bindings: &BTreeMap<String, String>,
) -> Result<(), TemplateError> {
    let mut report = ValidationReport::new();
    for (node_id, param) in bindings {
        let Some(node) = template.node(node_id) else {
            continue;
        };
        if node.node_kind() != Some(NodeKind::Const) {
            continue;
        }
        let len = node.values.as_ref().map_or(0, Vec::len);
        if i64::try_from(len).ok() != Some(template.grid.bins) {
            report.push(
                ValidationEntity::node(node_id),
                format!(
                    "values from parameter '{}' have {} elements but the grid has {} bins",
                    param, len, template.grid.bins
                ),
            );
        }
    }
    report.into_result()
}

// =============================================================================
// BODY CHECKS
// =============================================================================

fn check_parameters(template: &Template, report: &mut ValidationReport) -> Result<(), TemplateError> {
    let mut seen = BTreeSet::new();
    for param in &template.parameters {
        let entity = ValidationEntity::parameter(&param.name);
        if param.name.trim().is_empty() {
            report.push(entity, "name is required");
            continue;
        }
        if !seen.insert(param.name.as_str()) {
            report.push(entity, "declared more than once");
            continue;
        }
        if param.array_of.is_some() && param.param_type != ParamType::Array {
            report.push(
                entity.clone(),
                format!("arrayOf only applies to array parameters, not {}", param.param_type),
            );
        }
        if let (Some(min), Some(max)) = (param.min, param.max) {
            if min > max {
                report.push(entity.clone(), format!("min {} exceeds max {}", min, max));
            }
        }

        match param.default_value() {
            Ok(Some(value)) => {
                if let Err(e) = check_bounds(param, &value) {
                    report.absorb(e)?;
                }
            }
            Ok(None) => {}
            Err(e) => report.absorb(e)?,
        }
    }
    Ok(())
}

/// Check every node; returns the ids that need an initial condition
fn check_nodes(
    template: &Template,
    report: &mut ValidationReport,
) -> Result<BTreeSet<String>, TemplateError> {
    let known = template.node_ids();
    let mut seen = BTreeSet::new();
    let mut pending = BTreeSet::new();

    for (index, node) in template.nodes.iter().enumerate() {
        if node.id.trim().is_empty() {
            report.push(
                ValidationEntity::node(format!("#{}", index)),
                "id is required",
            );
            continue;
        }
        let entity = ValidationEntity::node(&node.id);
        if !seen.insert(node.id.as_str()) {
            report.push(entity, "duplicate node id");
            continue;
        }

        match node.node_kind() {
            Some(NodeKind::Const) => check_const(node, report),
            Some(NodeKind::Pmf) => check_pmf(node, template.grid.bins, report)?,
            Some(NodeKind::Expr) => {
                let Some(formula) = node.expr.as_deref().filter(|f| !f.trim().is_empty()) else {
                    report.push(entity, "expr node requires an expression");
                    continue;
                };
                match analyze(&node.id, formula, node.dependencies.as_deref(), &known)? {
                    ExprValidation::Valid => {}
                    ExprValidation::RequiresInitialCondition(id) => {
                        pending.insert(id);
                    }
                    ExprValidation::Invalid(issues) => {
                        for issue in issues {
                            report.push(ValidationEntity::node(issue.node()), issue.to_string());
                        }
                    }
                }
            }
            None if node.kind.trim().is_empty() => report.push(entity, "kind is required"),
            None => report.push(
                entity,
                format!(
                    "unsupported kind '{}', expected const, pmf or expr",
                    node.kind
                ),
            ),
        }
    }

    Ok(pending)
}

fn check_const(node: &TemplateNode, report: &mut ValidationReport) {
    let entity = ValidationEntity::node(&node.id);
    match (&node.values, &node.source) {
        (None, None) => report.push(entity, "const node requires values or a source"),
        (Some(values), _) if values.is_empty() => report.push(entity, "values must not be empty"),
        (Some(values), _) => {
            if let Some(index) = values.iter().position(|v| !v.is_finite()) {
                report.push(entity, format!("values[{}] is not a finite number", index));
            }
        }
        (None, Some(source)) if source.trim().is_empty() => {
            report.push(entity, "source must not be empty")
        }
        (None, Some(_)) => {}
    }
}

fn check_pmf(
    node: &TemplateNode,
    bins: i64,
    report: &mut ValidationReport,
) -> Result<(), TemplateError> {
    let entity = ValidationEntity::node(&node.id);
    let Some(pmf) = &node.pmf else {
        report.push(entity, "pmf node requires a pmf block");
        return Ok(());
    };

    if pmf.values.is_empty() {
        report.push(entity.clone(), "pmf values must not be empty");
    }
    if pmf.values.len() != pmf.probabilities.len() {
        report.push(
            entity.clone(),
            format!(
                "pmf has {} values but {} probabilities",
                pmf.values.len(),
                pmf.probabilities.len()
            ),
        );
    }
    if let Some(index) = pmf.values.iter().position(|v| !v.is_finite()) {
        report.push(entity.clone(), format!("pmf values[{}] is not a finite number", index));
    }

    let negative: Vec<String> = pmf
        .probabilities
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.is_finite() || **p < 0.0)
        .map(|(i, p)| format!("[{}]={}", i, p))
        .collect();
    if !negative.is_empty() {
        report.push(
            entity.clone(),
            format!("probabilities must be non-negative: {}", negative.join(", ")),
        );
    } else {
        let sum: f64 = pmf.probabilities.iter().sum();
        if (sum - 1.0).abs() > PMF_TOLERANCE {
            report.push(
                entity.clone(),
                format!("probabilities sum to {} instead of 1", sum),
            );
        }
    }

    if let Some(profile) = &node.profile {
        if let Err(e) = resolve_profile(&node.id, profile, bins) {
            report.absorb(e)?;
        }
    }
    Ok(())
}

fn check_outputs(template: &Template, report: &mut ValidationReport) {
    for (index, output) in template.outputs.iter().enumerate() {
        let series = output.series.trim();
        if series == ALL_SERIES || template.node(series).is_some() {
            continue;
        }
        let message = if series.is_empty() {
            "series is required".to_string()
        } else {
            format!("series '{}' is not a node id or '{}'", series, ALL_SERIES)
        };
        report.push(
            ValidationEntity::Output {
                index,
                series: output.series.clone(),
            },
            message,
        );
    }
}

fn check_topology(template: &Template, report: &mut ValidationReport) {
    let topology = &template.topology;
    if topology.nodes.is_empty() {
        report.push(ValidationEntity::Template, "topology requires at least one node");
        return;
    }

    let node_ids = template.node_ids();
    let simulation = template.effective_mode() == Mode::Simulation;
    let mut topology_ids = BTreeSet::new();

    for (index, tnode) in topology.nodes.iter().enumerate() {
        if tnode.id.trim().is_empty() {
            report.push(
                ValidationEntity::TopologyNode(format!("#{}", index)),
                "id is required",
            );
            continue;
        }
        let entity = ValidationEntity::TopologyNode(tnode.id.clone());
        if !topology_ids.insert(tnode.id.as_str()) {
            report.push(entity, "duplicate topology node id");
            continue;
        }
        if tnode.kind.trim().is_empty() {
            report.push(entity.clone(), "kind is required");
        }

        for (role, target) in tnode.semantics.roles() {
            if !node_ids.contains(target) {
                report.push(
                    entity.clone(),
                    format!("semantics.{} references unknown node '{}'", role, target),
                );
            }
        }

        if simulation {
            let semantics = &tnode.semantics;
            if semantics.arrivals.is_none() {
                report.push(entity.clone(), "simulation mode requires semantics.arrivals");
            }
            if semantics.served.is_none() && semantics.queue.is_none() {
                report.push(
                    entity.clone(),
                    "simulation mode requires semantics.served or semantics.queue",
                );
            }
        }

        if let Some(kernel) = &tnode.retry_kernel {
            if kernel.iter().any(|k| !k.is_finite() || *k < 0.0) {
                report.push(
                    entity.clone(),
                    "retryKernel coefficients must be finite and non-negative",
                );
            }
        }
        if let Some(depth) = tnode
            .initial_condition
            .as_ref()
            .and_then(|ic| ic.queue_depth)
        {
            if !depth.is_finite() || depth < 0.0 {
                report.push(
                    entity,
                    format!("initialCondition.queueDepth must be non-negative, got {}", depth),
                );
            }
        }
    }

    if topology.nodes.len() > 1 && topology.edges.is_empty() {
        report.push(
            ValidationEntity::Template,
            format!(
                "topology with {} nodes requires at least one edge",
                topology.nodes.len()
            ),
        );
    }

    let mut edge_ids = BTreeSet::new();
    for edge in &topology.edges {
        let entity = ValidationEntity::Edge(edge.label());
        if let Some(id) = &edge.id {
            if !edge_ids.insert(id.as_str()) {
                report.push(entity.clone(), "duplicate edge id");
            }
        }
        for (end, endpoint) in [("from", &edge.from), ("to", &edge.to)] {
            let target = endpoint_node(endpoint);
            if target.is_empty() {
                report.push(entity.clone(), format!("{} is required", end));
            } else if !topology_ids.contains(target) {
                report.push(
                    entity.clone(),
                    format!("{} references unknown topology node '{}'", end, target),
                );
            }
        }
        if let Some(weight) = edge.weight {
            if !weight.is_finite() || weight < 0.0 {
                report.push(
                    entity,
                    format!("weight must be finite and non-negative, got {}", weight),
                );
            }
        }
    }
}

/// Each self-shifting node needs exactly one seeded queue
fn check_initial_conditions(
    template: &Template,
    pending: &BTreeSet<String>,
    report: &mut ValidationReport,
) {
    for node_id in pending {
        let owners: Vec<_> = template
            .topology
            .nodes
            .iter()
            .filter(|t| t.semantics.queue.as_deref() == Some(node_id.as_str()))
            .collect();

        match owners.as_slice() {
            [] => report.push(
                ValidationEntity::node(node_id),
                "shifts itself and requires a topology node with matching queue semantics \
                 and initialCondition.queueDepth",
            ),
            [owner] => {
                let seeded = owner
                    .initial_condition
                    .as_ref()
                    .is_some_and(|ic| ic.queue_depth.is_some());
                if !seeded {
                    report.push(
                        ValidationEntity::TopologyNode(owner.id.clone()),
                        format!(
                            "must declare initialCondition.queueDepth for self-referencing node '{}'",
                            node_id
                        ),
                    );
                }
            }
            many => report.push(
                ValidationEntity::node(node_id),
                format!(
                    "queue semantics claimed by {} topology nodes, expected exactly one",
                    many.len()
                ),
            ),
        }
    }
}

fn check_rng(template: &Template, report: &mut ValidationReport) {
    let Some(rng) = &template.rng else {
        return;
    };
    if rng.kind != RNG_KIND_PCG32 {
        report.push(
            ValidationEntity::Rng,
            format!("unsupported kind '{}', expected '{}'", rng.kind, RNG_KIND_PCG32),
        );
    }
    if rng.seed.is_none() {
        report.push(ValidationEntity::Rng, "seed is required");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;
    use pretty_assertions::assert_eq;

    const BASE: &str = r#"
schemaVersion: 1
generator: flowsim-sim
metadata:
  id: checkout
  title: Checkout
  version: 1.0.0
window:
  start: 2025-01-01T00:00:00Z
  timezone: UTC
grid:
  bins: 4
  binSize: 60
  binUnit: minutes
topology:
  nodes:
    - id: svc
      kind: service
      semantics:
        arrivals: arrivals
        served: served
nodes:
  - id: arrivals
    kind: const
    values: [10, 12, 14, 16]
  - id: capacity
    kind: const
    values: [180, 180, 180, 180]
  - id: served
    kind: expr
    expr: MIN(arrivals, capacity * 0.9)
    dependencies: [arrivals, capacity]
outputs:
  - series: served
  - series: "*"
rng:
  kind: pcg32
  seed: 42
"#;

    fn base() -> Template {
        Template::from_yaml(BASE).unwrap()
    }

    fn entities(err: &TemplateError) -> Vec<ValidationEntity> {
        err.issues().iter().map(|i| i.entity.clone()).collect()
    }

    #[test]
    fn test_valid_template() {
        validate_template(&base()).unwrap();
    }

    #[test]
    fn test_header_issues_are_collected_together() {
        let mut t = base();
        t.generator = "acme".into();
        t.metadata.version = "one".into();
        t.grid.bins = 0;
        t.window.as_mut().unwrap().timezone = "Europe/London".into();
        let err = validate_template(&t).unwrap_err();
        assert_eq!(
            entities(&err),
            vec![
                ValidationEntity::Template,
                ValidationEntity::Metadata,
                ValidationEntity::Window,
                ValidationEntity::Grid,
            ]
        );
    }

    #[test]
    fn test_body_not_checked_until_header_passes() {
        let mut t = base();
        t.metadata.id.clear();
        t.outputs[0].series = "missing".into();
        let err = validate_template(&t).unwrap_err();
        assert_eq!(entities(&err), vec![ValidationEntity::Metadata]);
    }

    #[test]
    fn test_oversized_grid_rejected_before_body() {
        let mut t = base();
        t.grid.bins = 2_400_000_000_000_000_000;
        let err = validate_template(&t).unwrap_err();
        assert_eq!(entities(&err), vec![ValidationEntity::Grid]);
        assert!(err.to_string().contains("at most 1000000"));

        t.grid.bins = MAX_BINS;
        assert!(validate_header(&t).is_ok());
    }

    #[test]
    fn test_window_offset_rejected() {
        let mut t = base();
        t.window.as_mut().unwrap().start = "2025-01-01T00:00:00+02:00".into();
        let err = validate_header(&t).unwrap_err();
        assert!(err.to_string().contains("must be UTC"));
    }

    #[test]
    fn test_schema_version_checked() {
        let mut t = base();
        t.schema_version = 2;
        assert!(validate_header(&t)
            .unwrap_err()
            .to_string()
            .contains("unsupported schemaVersion 2"));
    }

    #[test]
    fn test_dependency_mismatch_reports_both_sides() {
        let mut t = base();
        let served = t.nodes.iter_mut().find(|n| n.id == "served").unwrap();
        served.dependencies = Some(vec!["arrivals".into(), "served_count".into()]);
        let err = validate_template(&t).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("'capacity' which is missing"));
        assert!(text.contains("declares dependency 'served_count'"));
        assert_eq!(err.issues().len(), 2);
    }

    #[test]
    fn test_expression_syntax_is_parse_error() {
        let mut t = base();
        t.nodes[2].expr = Some("MIN(arrivals,".into());
        let err = validate_template(&t).unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("node 'served'"));
    }

    #[test]
    fn test_pmf_rules() {
        let mut t = base();
        t.nodes.push(TemplateNode {
            id: "demand".into(),
            kind: "pmf".into(),
            pmf: Some(crate::definition::PmfSpec {
                values: vec![1.0, 2.0],
                probabilities: vec![0.5, 0.6],
            }),
            ..Default::default()
        });
        let err = validate_template(&t).unwrap_err();
        assert!(err.to_string().contains("probabilities sum to"));

        let demand = t.nodes.last_mut().unwrap();
        demand.pmf.as_mut().unwrap().probabilities = vec![1.2, -0.2];
        let err = validate_template(&t).unwrap_err();
        assert!(err.to_string().contains("[1]=-0.2"));

        let demand = t.nodes.last_mut().unwrap();
        demand.pmf.as_mut().unwrap().probabilities = vec![0.25, 0.75];
        validate_template(&t).unwrap();
    }

    #[test]
    fn test_unknown_kind_and_duplicate_ids() {
        let mut t = base();
        t.nodes.push(TemplateNode {
            id: "arrivals".into(),
            kind: "const".into(),
            values: Some(vec![1.0]),
            ..Default::default()
        });
        t.nodes.push(TemplateNode {
            id: "router".into(),
            kind: "router".into(),
            ..Default::default()
        });
        let err = validate_template(&t).unwrap_err();
        assert_eq!(
            entities(&err),
            vec![ValidationEntity::node("arrivals"), ValidationEntity::node("router")]
        );
    }

    #[test]
    fn test_outputs_must_exist() {
        let mut t = base();
        t.outputs[0].series = "latency".into();
        let err = validate_template(&t).unwrap_err();
        assert_eq!(
            entities(&err),
            vec![ValidationEntity::Output {
                index: 0,
                series: "latency".into()
            }]
        );
    }

    #[test]
    fn test_simulation_semantics_required() {
        let mut t = base();
        t.topology.nodes[0].semantics.served = None;
        let err = validate_template(&t).unwrap_err();
        assert!(err.to_string().contains("semantics.served or semantics.queue"));

        t.mode = Some(Mode::Telemetry);
        validate_template(&t).unwrap();
    }

    #[test]
    fn test_dangling_semantics_and_edges() {
        let mut t = base();
        t.topology.nodes[0].semantics.errors = Some("errors".into());
        let second = crate::definition::TopologyNode {
            id: "db".into(),
            kind: "database".into(),
            semantics: crate::definition::Semantics {
                arrivals: Some("served".into()),
                served: Some("served".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        t.topology.nodes.push(second);
        let err = validate_template(&t).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("semantics.errors references unknown node 'errors'"));
        assert!(text.contains("requires at least one edge"));

        t.topology.nodes[0].semantics.errors = None;
        t.topology.edges.push(crate::definition::TopologyEdge {
            id: None,
            from: "svc:out".into(),
            to: "cache".into(),
            weight: Some(-1.0),
        });
        let err = validate_template(&t).unwrap_err();
        assert_eq!(
            entities(&err),
            vec![
                ValidationEntity::Edge("svc:out->cache".into()),
                ValidationEntity::Edge("svc:out->cache".into()),
            ]
        );
    }

    #[test]
    fn test_rng_rules() {
        let mut t = base();
        t.rng = Some(crate::definition::RngSpec {
            kind: "mt19937".into(),
            seed: None,
        });
        let err = validate_template(&t).unwrap_err();
        assert_eq!(entities(&err), vec![ValidationEntity::Rng, ValidationEntity::Rng]);
    }

    #[test]
    fn test_parameter_defaults_checked() {
        let mut t = base();
        t.parameters.push(
            crate::definition::TemplateParameter::new("efficiency", ParamType::Number)
                .with_default(serde_yaml::Value::from(1.5))
                .with_bounds(Some(0.0), Some(1.0)),
        );
        let err = validate_template(&t).unwrap_err();
        assert_eq!(entities(&err), vec![ValidationEntity::parameter("efficiency")]);
    }

    #[test]
    fn test_parameter_values_report_every_element() {
        let mut t = base();
        t.parameters.push(
            crate::definition::TemplateParameter::new("weights", ParamType::Array)
                .with_bounds(Some(0.0), Some(1.0)),
        );
        let values: ParamMap = [(
            "weights".to_string(),
            ParamValue::FloatArray(vec![0.5, 1.5, -1.0]),
        )]
        .into_iter()
        .collect();
        let err = check_parameter_values(&t, &values).unwrap_err();
        assert_eq!(
            entities(&err),
            vec![
                ValidationEntity::parameter_element("weights", 1),
                ValidationEntity::parameter_element("weights", 2),
            ]
        );
    }

    #[test]
    fn test_bound_lengths() {
        let t = base();
        let bindings: BTreeMap<_, _> = [("arrivals".to_string(), "pattern".to_string())]
            .into_iter()
            .collect();
        check_bound_lengths(&t, &bindings).unwrap();

        let mut short = base();
        short.nodes[0].values = Some(vec![1.0, 2.0]);
        let err = check_bound_lengths(&short, &bindings).unwrap_err();
        assert!(err.to_string().contains("parameter 'pattern' have 2 elements"));
        assert_eq!(entities(&err), vec![ValidationEntity::node("arrivals")]);
    }

    mod initial_conditions {
        use super::*;
        use pretty_assertions::assert_eq;

        const QUEUE: &str = r#"
schemaVersion: 1
generator: flowsim
metadata: { id: backlog, title: Backlog, version: 0.1.0 }
grid: { bins: 3, binSize: 1, binUnit: hours }
nodes:
  - id: arrivals
    kind: const
    values: [5, 5, 5]
  - id: served
    kind: const
    values: [4, 4, 4]
  - id: queue
    kind: expr
    expr: MAX(0, SHIFT(queue, 1) + arrivals - served)
topology:
  nodes:
    - id: svc
      kind: service
      semantics: { arrivals: arrivals, queue: queue }
      initialCondition: { queueDepth: 0 }
"#;

        #[test]
        fn test_seeded_queue_is_valid() {
            validate_template(&Template::from_yaml(QUEUE).unwrap()).unwrap();
        }

        #[test]
        fn test_missing_queue_depth() {
            let mut t = Template::from_yaml(QUEUE).unwrap();
            t.topology.nodes[0].initial_condition = None;
            let err = validate_template(&t).unwrap_err();
            assert_eq!(entities(&err), vec![ValidationEntity::TopologyNode("svc".into())]);
        }

        #[test]
        fn test_no_queue_owner() {
            let mut t = Template::from_yaml(QUEUE).unwrap();
            t.topology.nodes[0].semantics.queue = None;
            t.topology.nodes[0].semantics.served = Some("served".into());
            let err = validate_template(&t).unwrap_err();
            assert_eq!(entities(&err), vec![ValidationEntity::node("queue")]);
        }

        #[test]
        fn test_unshifted_self_reference_is_invalid() {
            let mut t = Template::from_yaml(QUEUE).unwrap();
            t.nodes[2].expr = Some("queue + arrivals".into());
            let err = validate_template(&t).unwrap_err();
            assert!(err.to_string().contains("references itself"));
        }
    }
}
