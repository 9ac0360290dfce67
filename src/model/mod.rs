//! Canonical model types and the builder that produces them

pub mod artifact;
pub mod builder;

pub use artifact::{
    ArtifactNode, Provenance, SimModelArtifact, META_ORIGIN_KIND, META_PROFILE_KIND,
    META_PROFILE_NAME,
};
pub use builder::{
    default_generator, merge_parameters, model_id, ModelBuilder, DEFAULT_SOURCE, TIMESTAMP_FORMAT,
};
