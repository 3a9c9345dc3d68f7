use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use tracing::warn;

use crate::compatibility::CheckSummary;
use crate::error::{ChrisError, Result};
use crate::resource::PluginRef;

/// Fit of every plugin in a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCheckResult {
    /// True iff every plugin fits at least one compute resource.
    pub fit: bool,
    /// Name of the last plugin that fits no compute resource, empty if none.
    pub fail_case: String,
    pub details: Vec<CheckSummary>,
}

/// Folds per-plugin summaries, in pipeline order, into one result.
pub fn aggregate(summaries: impl IntoIterator<Item = CheckSummary>) -> PipelineCheckResult {
    let mut result = PipelineCheckResult {
        fit: true,
        fail_case: String::new(),
        details: Vec::new(),
    };

    for summary in summaries {
        if !summary.passed {
            warn!(plugin = %summary.plugin_name, "plugin fits no compute resource");
            result.fail_case = summary.plugin_name.clone();
        }
        result.fit = result.fit && summary.passed;
        result.details.push(summary);
    }

    result
}

/// An edge of a pipeline's plugin tree as CUBE stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginPiping {
    pub id: u64,
    pub plugin_id: u64,
    #[serde(default)]
    pub previous_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTopology {
    pub plugins: Vec<PluginRef>,
    /// Piping ids, parents before children.
    pub topology_node_ids: Vec<u64>,
    /// Plugin ids in the same order as `topology_node_ids`.
    pub topology: Vec<u64>,
}

/// Orders pipings so every piping comes after its previous one. Among pipings
/// that are ready at the same time the lowest id goes first.
pub fn topological_order(pipings: &[PluginPiping]) -> Result<Vec<&PluginPiping>> {
    let by_id: BTreeMap<u64, &PluginPiping> =
        pipings.iter().map(|piping| (piping.id, piping)).collect();

    let mut children: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    let mut pending_parents: BTreeMap<u64, usize> = BTreeMap::new();

    for piping in by_id.values() {
        pending_parents.entry(piping.id).or_insert(0);

        if let Some(previous_id) = piping.previous_id {
            if !by_id.contains_key(&previous_id) {
                return Err(ChrisError::UnexpectedResponse(format!(
                    "piping {} points to unknown piping {previous_id}",
                    piping.id
                )));
            }
            children.entry(previous_id).or_default().push(piping.id);
            *pending_parents.entry(piping.id).or_insert(0) += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<u64>> = pending_parents
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| Reverse(*id))
        .collect();

    let mut order = Vec::with_capacity(by_id.len());

    while let Some(Reverse(id)) = ready.pop() {
        order.push(by_id[&id]);

        for child in children.get(&id).into_iter().flatten() {
            let count = pending_parents
                .get_mut(child)
                .expect("should exist because every piping was counted above");
            *count -= 1;
            if *count == 0 {
                ready.push(Reverse(*child));
            }
        }
    }

    if order.len() != by_id.len() {
        return Err(ChrisError::UnexpectedResponse(
            "pipeline pipings contain a cycle".to_owned(),
        ));
    }

    Ok(order)
}

impl PipelineTopology {
    pub fn new(plugins: Vec<PluginRef>, pipings: &[PluginPiping]) -> Result<Self> {
        let order = topological_order(pipings)?;

        Ok(Self {
            plugins,
            topology_node_ids: order.iter().map(|piping| piping.id).collect(),
            topology: order.iter().map(|piping| piping.plugin_id).collect(),
        })
    }
}
