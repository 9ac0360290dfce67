//! Profile Resolution
//!
//! A profile spreads a PMF node's expected value over the time grid. The
//! per-bin series is `E[pmf] * w[i]`, where `w` is the profile's weight
//! vector normalized to a mean of 1, so the series keeps the PMF's mean.
//!
//! ## Kinds
//!
//! | kind      | source                         | length rule                 |
//! |-----------|--------------------------------|-----------------------------|
//! | `builtin` | named 24-bin curve (hourly)    | stretched or block-averaged |
//! | `inline`  | `weights` on the node          | must equal `grid.bins`      |

use crate::definition::{PmfSpec, ProfileSpec, MAX_BINS};
use crate::error::{TemplateError, ValidationEntity};

/// Native length of every builtin curve
pub const BUILTIN_PROFILE_BINS: usize = 24;

/// A named hourly weight curve
#[derive(Debug)]
pub struct BuiltinProfile {
    pub name: &'static str,
    pub description: &'static str,
    pub weights: [f64; BUILTIN_PROFILE_BINS],
}

pub static BUILTIN_PROFILES: &[BuiltinProfile] = &[
    BuiltinProfile {
        name: "flat",
        description: "Uniform load",
        weights: [1.0; BUILTIN_PROFILE_BINS],
    },
    BuiltinProfile {
        name: "diurnal",
        description: "Quiet night, broad afternoon peak",
        weights: [
            0.30, 0.25, 0.20, 0.20, 0.25, 0.40, 0.60, 0.90, 1.20, 1.40, 1.50, 1.55, //
            1.60, 1.55, 1.50, 1.45, 1.40, 1.35, 1.25, 1.10, 0.90, 0.70, 0.50, 0.40,
        ],
    },
    BuiltinProfile {
        name: "weekday-office",
        description: "Office hours with a lunch dip",
        weights: [
            0.10, 0.10, 0.10, 0.10, 0.10, 0.20, 0.50, 1.20, 2.00, 2.20, 2.10, 1.90, //
            1.60, 1.90, 2.10, 2.00, 1.80, 1.30, 0.70, 0.40, 0.30, 0.20, 0.15, 0.10,
        ],
    },
    BuiltinProfile {
        name: "evening-peak",
        description: "Consumer traffic peaking after work",
        weights: [
            0.40, 0.30, 0.20, 0.20, 0.20, 0.30, 0.50, 0.70, 0.80, 0.90, 0.90, 1.00, //
            1.00, 1.00, 1.00, 1.10, 1.20, 1.50, 1.90, 2.30, 2.40, 2.00, 1.30, 0.80,
        ],
    },
    BuiltinProfile {
        name: "three-shift",
        description: "Round-the-clock work with shift-change dips at 06, 14 and 22",
        weights: [
            1.00, 1.00, 1.00, 1.00, 1.00, 0.90, 0.60, 0.85, 1.00, 1.00, 1.00, 1.00, //
            1.00, 0.90, 0.60, 0.85, 1.00, 1.00, 1.00, 1.00, 1.00, 0.90, 0.60, 0.85,
        ],
    },
];

/// Look up a builtin curve, case-insensitively
pub fn builtin_profile(name: &str) -> Option<&'static BuiltinProfile> {
    BUILTIN_PROFILES
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
}

pub fn builtin_profile_names() -> impl Iterator<Item = &'static str> {
    BUILTIN_PROFILES.iter().map(|p| p.name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Builtin,
    Inline,
}

impl ProfileKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "builtin" => Some(ProfileKind::Builtin),
            "inline" => Some(ProfileKind::Inline),
            _ => None,
        }
    }
}

/// Normalized (mean 1) weights of `profile` over `bins` bins
pub fn resolve_profile(
    node_id: &str,
    profile: &ProfileSpec,
    bins: i64,
) -> Result<Vec<f64>, TemplateError> {
    let fail = |message: String| TemplateError::validation(ValidationEntity::node(node_id), message);

    if bins > MAX_BINS {
        return Err(fail(format!(
            "profile bin count {} exceeds the limit of {}",
            bins, MAX_BINS
        )));
    }
    let bins = usize::try_from(bins)
        .ok()
        .filter(|b| *b > 0)
        .ok_or_else(|| fail(format!("profile requires a positive bin count, got {}", bins)))?;

    let raw = match ProfileKind::parse(&profile.kind) {
        Some(ProfileKind::Builtin) => {
            let name = profile
                .name
                .as_deref()
                .ok_or_else(|| fail("builtin profile requires a name".to_string()))?;
            let curve = builtin_profile(name).ok_or_else(|| {
                fail(format!(
                    "unknown builtin profile '{}' (available: {})",
                    name,
                    builtin_profile_names().collect::<Vec<_>>().join(", ")
                ))
            })?;
            adapt_length(&curve.weights, bins).ok_or_else(|| {
                fail(format!(
                    "builtin profile '{}' has {} bins and cannot be fitted to {} bins",
                    curve.name, BUILTIN_PROFILE_BINS, bins
                ))
            })?
        }
        Some(ProfileKind::Inline) => {
            let weights = profile
                .weights
                .as_ref()
                .ok_or_else(|| fail("inline profile requires weights".to_string()))?;
            if weights.len() != bins {
                return Err(fail(format!(
                    "inline profile has {} weights but the grid has {} bins",
                    weights.len(),
                    bins
                )));
            }
            weights.clone()
        }
        None => {
            return Err(fail(format!(
                "unknown profile kind '{}', expected builtin or inline",
                profile.kind
            )))
        }
    };

    normalize(&raw).map_err(fail)
}

/// Expand a PMF node into a per-bin series through its profile
pub fn expand_pmf(
    node_id: &str,
    pmf: &PmfSpec,
    profile: &ProfileSpec,
    bins: i64,
) -> Result<Vec<f64>, TemplateError> {
    let expected = pmf.expected_value();
    let weights = resolve_profile(node_id, profile, bins)?;
    Ok(weights.into_iter().map(|w| expected * w).collect())
}

/// Stretch or block-average a curve to `bins` entries
fn adapt_length(weights: &[f64], bins: usize) -> Option<Vec<f64>> {
    let native = weights.len();
    if native == bins {
        return Some(weights.to_vec());
    }
    if bins % native == 0 {
        let repeat = bins / native;
        return Some(
            weights
                .iter()
                .flat_map(|w| std::iter::repeat(*w).take(repeat))
                .collect(),
        );
    }
    if native % bins == 0 {
        let block = native / bins;
        return Some(
            weights
                .chunks(block)
                .map(|c| c.iter().sum::<f64>() / block as f64)
                .collect(),
        );
    }
    None
}

fn normalize(weights: &[f64]) -> Result<Vec<f64>, String> {
    let bad: Vec<String> = weights
        .iter()
        .enumerate()
        .filter(|(_, w)| !w.is_finite() || **w < 0.0)
        .map(|(i, w)| format!("[{}]={}", i, w))
        .collect();
    if !bad.is_empty() {
        return Err(format!(
            "profile weights must be finite and non-negative: {}",
            bad.join(", ")
        ));
    }

    let mean = weights.iter().sum::<f64>() / weights.len() as f64;
    if mean <= 0.0 {
        return Err("profile weights must have a positive mean".to_string());
    }
    Ok(weights.iter().map(|w| w / mean).collect())
}
