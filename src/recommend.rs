use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;

use tracing::{debug, info, warn};

use crate::error::{ChrisError, Result};
use crate::resource::{ComputeResource, PluginRequirement};

/// Numerator of the runtime heuristic. Stands in for the input size.
const BASE_RUNTIME: f64 = 1000.0;
const MEMORY_WEIGHT: f64 = 0.2;
const GPU_WEIGHT: f64 = 0.5;
const EPSILON: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recommendation {
    Selected(String),
    None,
}

impl Recommendation {
    pub fn name(&self) -> &str {
        match self {
            Recommendation::Selected(name) => name,
            Recommendation::None => "none",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Recommendation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Closed-form estimate of how long the plugin would take on the resource.
/// Lower is better.
pub fn expected_runtime(requirement: &PluginRequirement, resource: &ComputeResource) -> Result<f64> {
    if requirement.min_memory_limit == 0 {
        return Err(ChrisError::InvalidInput(format!(
            "plugin {} declares a min_memory_limit of 0",
            requirement.name
        )));
    }

    if resource.cpu_clock_speed_ghz == 0.0 {
        warn!(
            resource = %resource.name,
            plugin = %requirement.name,
            "compute resource has no cpu clock speed, its cpus are not counted"
        );
    }

    let memory_ratio = resource.memory as f64 / requirement.min_memory_limit as f64;
    let mut throughput =
        resource.cpus as f64 * resource.cpu_clock_speed_ghz + MEMORY_WEIGHT * memory_ratio;

    if requirement.min_gpu_limit != 0 {
        throughput += GPU_WEIGHT * resource.gpus as f64;
    }

    Ok(BASE_RUNTIME / (throughput + EPSILON))
}

/// Picks the resource with the lowest expected runtime among the ones whose
/// cost is within budget. The first resource wins ties.
///
/// Resources are not checked against the plugin's minimums here, see
/// `Matcher::recommend_compatible` for that.
#[tracing::instrument(name = "recommend::recommend", skip_all, fields(
    plugin = %requirement.name,
    budget = budget
))]
pub fn recommend(
    requirement: &PluginRequirement,
    resources: &[ComputeResource],
    allowed: Option<&HashSet<String>>,
    budget: f64,
) -> Result<Recommendation> {
    if budget.is_nan() {
        return Err(ChrisError::InvalidInput("budget is not a number".to_owned()));
    }

    let mut best: Option<(&ComputeResource, f64)> = None;

    for resource in resources.iter().filter(|resource| {
        !resource.is_auto() && allowed.map_or(true, |names| names.contains(&resource.name))
    }) {
        let runtime = expected_runtime(requirement, resource)?;

        debug!(resource = %resource.name, runtime, cost = resource.cost, "scored resource");

        if resource.cost > budget {
            continue;
        }

        match best {
            Some((_, best_runtime)) if runtime >= best_runtime => {}
            _ => best = Some((resource, runtime)),
        }
    }

    let recommendation = match best {
        None => Recommendation::None,
        Some((resource, _)) => Recommendation::Selected(resource.name.clone()),
    };

    info!(%recommendation, "recommended compute resource");

    Ok(recommendation)
}
