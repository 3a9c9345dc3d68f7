use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ChrisError, Result};

/// Pseudo-resource that lets CUBE pick a free compute resource.
pub const AUTO_FREE: &str = "auto_free";
/// Pseudo-resource that lets CUBE pick the best compute resource.
pub const AUTO_BEST: &str = "auto_best";

/// A named execution environment registered in CUBE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeResource {
    pub name: String,
    /// Milli-core CPUs.
    pub cpus: u64,
    pub gpus: u64,
    /// Memory in MB.
    pub memory: u64,
    /// Max number of concurrent workers.
    pub workers: u64,
    /// Currency units per use.
    pub cost: f64,
    #[serde(default)]
    pub cpu_clock_speed_ghz: f64,
    #[serde(default)]
    pub description: String,
}

impl ComputeResource {
    /// Returns true for the automatic-selection pseudo-resources, which are
    /// never evaluated against plugin requirements.
    pub fn is_auto(&self) -> bool {
        self.name == AUTO_FREE || self.name == AUTO_BEST
    }
}

/// The minimum resources a plugin declares it needs to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRequirement {
    pub id: u64,
    pub name: String,
    pub min_cpu_limit: u64,
    pub min_gpu_limit: u64,
    pub min_memory_limit: u64,
    pub min_number_of_workers: u64,
}

/// How a plugin is looked up in CUBE.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PluginLookup {
    Name(String),
    Id(u64),
}

impl PluginLookup {
    pub fn parse_id(input: &str) -> Result<Self> {
        input
            .trim()
            .parse::<u64>()
            .map(PluginLookup::Id)
            .map_err(|_| ChrisError::InvalidInput(format!("invalid plugin id: {input:?}")))
    }

    pub fn matches(&self, plugin: &Plugin) -> bool {
        match self {
            PluginLookup::Name(name) => plugin.name == *name,
            PluginLookup::Id(id) => plugin.id == *id,
        }
    }
}

impl fmt::Display for PluginLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginLookup::Name(name) => write!(f, "name {name}"),
            PluginLookup::Id(id) => write!(f, "id {id}"),
        }
    }
}

/// A plugin registered in CUBE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub dock_image: String,
    #[serde(default, rename = "type")]
    pub plugin_type: String,
    #[serde(default)]
    pub min_cpu_limit: u64,
    #[serde(default)]
    pub min_gpu_limit: u64,
    #[serde(default)]
    pub min_memory_limit: u64,
    #[serde(default)]
    pub min_number_of_workers: u64,
    /// Url of the compute resources the plugin is registered with.
    #[serde(default)]
    pub compute_resources: String,
}

impl Plugin {
    pub fn requirement(&self) -> PluginRequirement {
        PluginRequirement {
            id: self.id,
            name: self.name.clone(),
            min_cpu_limit: self.min_cpu_limit,
            min_gpu_limit: self.min_gpu_limit,
            min_memory_limit: self.min_memory_limit,
            min_number_of_workers: self.min_number_of_workers,
        }
    }
}

/// A plugin as listed in a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRef {
    #[serde(rename = "plugin_id", alias = "id")]
    pub id: u64,
    #[serde(rename = "plugin_name", alias = "name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub locked: bool,
}
