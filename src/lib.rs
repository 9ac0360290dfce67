//! flowsim: flow-simulation template compiler
//!
//! Compiles parameterized, human-authored flow-simulation templates into
//! canonical, fully resolved simulation models that a graph-evaluation
//! engine can run deterministically.
//!
//! ## Crates
//!
//! - `flowsim-expr`: expression language for derived nodes
//! - `flowsim-templates`: template schema, parameters, substitution,
//!   profiles and validation
//! - `flowsim` (this crate): model builder, YAML emitter and the caching
//!   [`TemplateService`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use flowsim::{CompileOptions, ParamMap, ParamValue, ServiceConfig, TemplateService};
//!
//! let service = TemplateService::new(ServiceConfig::from_env());
//! let mut params = ParamMap::new();
//! params.insert("efficiency".into(), ParamValue::Float(0.9));
//! let model = service.compile("checkout-service", &params, &CompileOptions::default())?;
//! println!("{}", model.yaml);
//! ```

pub mod config;
pub mod emit;
pub mod model;
pub mod service;

/// Generator name used in default provenance identities
pub const GENERATOR_NAME: &str = "flowsim";

pub use config::ServiceConfig;
pub use emit::to_yaml;
pub use model::{model_id, ArtifactNode, ModelBuilder, Provenance, SimModelArtifact};
pub use service::{
    params_from_json, CacheState, CompileOptions, CompiledModel, TemplateService, TemplateSummary,
};

pub use flowsim_templates::{
    Mode, ParamMap, ParamValue, Template, TemplateError, ValidationEntity, ValidationIssue,
    ValidationReport,
};
