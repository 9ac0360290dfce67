//! Template Service
//!
//! Lists and compiles templates by id. Templates come either from a
//! directory ([`TemplateService::new`]) or from `(id, text)` pairs handed
//! over by an external loader ([`TemplateService::from_sources`]); both are
//! cached lazily on first access (see [`cache`]).
//!
//! ## Compile pipeline
//!
//! ```text
//! raw text + caller params
//!   -> coerce params to declared types
//!   -> substitute ${...} (caller values, then declared defaults)
//!   -> strict parse, apply mode override
//!   -> validate template, parameter bounds, bound const lengths
//!   -> build artifact (PMF expansion, provenance, model id)
//!   -> emit YAML
//! ```
//!
//! Every stage after lookup fails hard; nothing is downgraded to a warning.

pub mod cache;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use flowsim_templates::{
    check_bound_lengths, check_parameter_values, declared_parameters, parse_header,
    parse_template, substitute, validate_template, Mode, ParamMap, ParamValue, Template,
    TemplateError, TemplateHeader, TemplateParameter, ValidationReport,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ServiceConfig;
use crate::emit::to_yaml;
use crate::model::{merge_parameters, ModelBuilder, SimModelArtifact};

pub use cache::{CacheEntry, CacheState};
use cache::{SharedCache, TemplateOrigin};

/// Provenance source for [`TemplateService::compile_text`]
pub const INLINE_SOURCE: &str = "inline";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileOptions {
    /// Replace the template's declared mode
    pub mode: Option<Mode>,
    /// Fixed provenance timestamp, for reproducible output
    pub generated_at: Option<DateTime<Utc>>,
}

impl CompileOptions {
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn at(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = Some(generated_at);
        self
    }
}

/// A compiled model and its serialized form
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledModel {
    pub artifact: SimModelArtifact,
    pub yaml: String,
}

impl CompiledModel {
    pub fn model_id(&self) -> &str {
        &self.artifact.provenance.model_id
    }
}

/// Listing entry for one cached template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateSummary {
    pub id: String,
    pub source: String,
    pub state: CacheState,
    pub header: TemplateHeader,
}

impl From<(&String, &CacheEntry)> for TemplateSummary {
    fn from((id, entry): (&String, &CacheEntry)) -> Self {
        Self {
            id: id.clone(),
            source: entry.source.clone(),
            state: entry.state(),
            header: entry.header.clone(),
        }
    }
}

pub struct TemplateService {
    origin: TemplateOrigin,
    cache: SharedCache,
}

impl TemplateService {
    /// Directory-backed service; nothing is read until first access
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_origin(TemplateOrigin::Directory(config))
    }

    /// Service over loader-supplied `(template id, raw text)` pairs
    pub fn from_sources<I, K, V>(sources: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let sources = sources
            .into_iter()
            .map(|(id, text)| (id.into(), text.into()))
            .collect();
        Self::with_origin(TemplateOrigin::Sources(sources))
    }

    fn with_origin(origin: TemplateOrigin) -> Self {
        Self {
            origin,
            cache: SharedCache::default(),
        }
    }

    /// All cached templates, sorted by id
    pub fn list_templates(&self) -> Result<Vec<TemplateSummary>, TemplateError> {
        let guard = self.cache.loaded(&self.origin)?;
        Ok(guard.entries.iter().map(TemplateSummary::from).collect())
    }

    pub fn get_template(&self, id: &str) -> Result<TemplateSummary, TemplateError> {
        let guard = self.cache.loaded(&self.origin)?;
        guard
            .entries
            .get_key_value(id)
            .map(TemplateSummary::from)
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    /// The strictly parsed template, if its raw text parsed without parameters
    pub fn strict_template(&self, id: &str) -> Result<Option<Template>, TemplateError> {
        let guard = self.cache.loaded(&self.origin)?;
        guard
            .entries
            .get(id)
            .map(|entry| entry.template.clone())
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    /// Drop the cache; the next access loads again
    ///
    /// A load already in progress is discarded and redone.
    pub fn reload(&self) {
        self.cache.clear();
        debug!("Template cache cleared");
    }

    /// Compile a cached template with caller parameters
    pub fn compile(
        &self,
        id: &str,
        params: &ParamMap,
        options: &CompileOptions,
    ) -> Result<CompiledModel, TemplateError> {
        let (raw, source, bindings) = {
            let guard = self.cache.loaded(&self.origin)?;
            let entry = guard
                .entries
                .get(id)
                .ok_or_else(|| TemplateError::NotFound(id.to_string()))?;
            (
                entry.raw.clone(),
                entry.source.clone(),
                entry.header.parameter_bindings.clone(),
            )
        };
        compile_source(&raw, &source, &bindings, params, options)
    }

    /// Compile raw template text without touching the cache
    pub fn compile_text(
        &self,
        text: &str,
        params: &ParamMap,
        options: &CompileOptions,
    ) -> Result<CompiledModel, TemplateError> {
        let bindings = parse_header(text)
            .map(|h| h.parameter_bindings)
            .unwrap_or_default();
        compile_source(text, INLINE_SOURCE, &bindings, params, options)
    }
}

/// Caller parameters from a JSON object, keyed by parameter name
pub fn params_from_json(value: &serde_json::Value) -> Result<ParamMap, TemplateError> {
    let Some(object) = value.as_object() else {
        return Err(TemplateError::Parse {
            context: "parameters".to_string(),
            message: "expected a JSON object of parameter values".to_string(),
        });
    };
    object
        .iter()
        .map(|(name, v)| ParamValue::from_json(name, v, None).map(|pv| (name.clone(), pv)))
        .collect()
}

/// The compile pipeline over one raw template text
fn compile_source(
    raw: &str,
    source: &str,
    bindings: &BTreeMap<String, String>,
    params: &ParamMap,
    options: &CompileOptions,
) -> Result<CompiledModel, TemplateError> {
    let declared = declared_parameters(raw)?;
    let values = coerce_params(params, &declared)?;

    let substituted = substitute(raw, &values, &declared)?;
    let mut template = parse_template(&substituted)?;
    if let Some(mode) = options.mode {
        template.mode = Some(mode);
    }

    validate_template(&template)?;
    check_parameter_values(&template, &merge_parameters(&template, &values)?)?;
    check_bound_lengths(&template, bindings)?;

    let mut builder = ModelBuilder::new(&template, &substituted, &values).source(source);
    if let Some(at) = options.generated_at {
        builder = builder.generated_at(at);
    }
    let artifact = builder.build()?;
    let yaml = to_yaml(&artifact)?;

    info!(
        "Compiled template '{}' (mode {}, model {})",
        artifact.metadata.id, artifact.mode, artifact.provenance.model_id
    );
    Ok(CompiledModel { artifact, yaml })
}

/// Normalize caller values against their declarations, reporting every failure
fn coerce_params(
    params: &ParamMap,
    declared: &[TemplateParameter],
) -> Result<ParamMap, TemplateError> {
    let mut report = ValidationReport::new();
    let mut values = ParamMap::new();
    for (name, value) in params {
        let param = declared.iter().find(|p| &p.name == name);
        if param.is_none() {
            debug!("Parameter '{}' is not declared; substituting as given", name);
        }
        match value.clone().coerce(name, param) {
            Ok(v) => {
                values.insert(name.clone(), v);
            }
            Err(e) => report.absorb(e)?,
        }
    }
    report.into_result()?;
    Ok(values)
}
