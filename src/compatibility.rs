use serde::{Deserialize, Serialize};

use crate::error::{ChrisError, Result};
use crate::resource::{ComputeResource, PluginRequirement};

/// Whether a single compute resource can run a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityVerdict {
    pub resource_name: String,
    pub fit: bool,
    /// One entry per violated dimension, in CPU, GPU, memory, workers order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message: Vec<String>,
}

impl CompatibilityVerdict {
    fn evaluate(requirement: &PluginRequirement, resource: &ComputeResource) -> Self {
        let mut reasons = Vec::new();

        if resource.cpus < requirement.min_cpu_limit {
            reasons.push(format!(
                "{} CPU's, but {} CPUs available.",
                requirement.min_cpu_limit, resource.cpus
            ));
        }
        if resource.gpus < requirement.min_gpu_limit {
            reasons.push(format!(
                "{} GPU's, but {} GPUs available.",
                requirement.min_gpu_limit, resource.gpus
            ));
        }
        if resource.memory < requirement.min_memory_limit {
            reasons.push(format!(
                "{} MB's memory, but {} MB's available.",
                requirement.min_memory_limit, resource.memory
            ));
        }
        if resource.workers < requirement.min_number_of_workers {
            reasons.push(format!(
                "{} workers, but only {} workers available.",
                requirement.min_number_of_workers, resource.workers
            ));
        }

        Self {
            resource_name: resource.name.clone(),
            fit: reasons.is_empty(),
            message: reasons,
        }
    }
}

/// Checks a plugin's requirement against every compute resource except the
/// automatic-selection pseudo-resources. Verdicts keep the catalog order.
#[tracing::instrument(name = "compatibility::check", skip_all, fields(
    plugin = %requirement.name,
    resources = resources.len()
))]
pub fn check(
    requirement: &PluginRequirement,
    resources: &[ComputeResource],
) -> Vec<CompatibilityVerdict> {
    resources
        .iter()
        .filter(|resource| !resource.is_auto())
        .map(|resource| CompatibilityVerdict::evaluate(requirement, resource))
        .collect()
}

/// The verdicts of one plugin plus the projections callers usually want.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSummary {
    pub plugin_name: String,
    pub matching: Vec<CompatibilityVerdict>,
    /// At least one resource fits.
    pub passed: bool,
    /// Pretty printed `matching`.
    pub message: String,
    /// Names of the resources that fit, in catalog order.
    pub pass_list: Vec<String>,
}

impl CheckSummary {
    pub fn new(plugin_name: impl Into<String>, matching: Vec<CompatibilityVerdict>) -> Result<Self> {
        let pass_list: Vec<String> = matching
            .iter()
            .filter(|verdict| verdict.fit)
            .map(|verdict| verdict.resource_name.clone())
            .collect();

        let message = serde_json::to_string_pretty(&matching)
            .map_err(|error| ChrisError::Serialization(error.to_string()))?;

        Ok(Self {
            plugin_name: plugin_name.into(),
            passed: !pass_list.is_empty(),
            matching,
            message,
            pass_list,
        })
    }
}

pub fn summarize(
    requirement: &PluginRequirement,
    resources: &[ComputeResource],
) -> Result<CheckSummary> {
    CheckSummary::new(requirement.name.clone(), check(requirement, resources))
}
