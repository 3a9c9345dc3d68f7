use std::collections::HashSet;

use async_trait::async_trait;
use tracing::info;

use crate::compatibility::{self, CheckSummary, CompatibilityVerdict};
use crate::error::Result;
use crate::pipeline::{self, PipelineCheckResult};
use crate::recommend::{self, Recommendation};
use crate::resource::{ComputeResource, PluginLookup, PluginRef, PluginRequirement};

/// Where plugin, pipeline and compute resource metadata comes from.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn fetch_resources(&self) -> Result<Vec<ComputeResource>>;

    async fn fetch_requirement(&self, lookup: &PluginLookup) -> Result<PluginRequirement>;

    /// Plugins of the pipeline in the order the backend lists them.
    async fn fetch_pipeline_plugins(&self, pipeline_id: u64) -> Result<Vec<PluginRef>>;
}

/// Runs compatibility checks and recommendations against fresh backend data.
/// Nothing is cached between calls.
pub struct Matcher<'a, B: ?Sized> {
    backend: &'a B,
}

impl<'a, B> Matcher<'a, B>
where
    B: Backend + ?Sized,
{
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    #[tracing::instrument(name = "Matcher::check_plugin", skip_all, fields(
        lookup = %lookup
    ))]
    pub async fn check_plugin(&self, lookup: &PluginLookup) -> Result<Vec<CompatibilityVerdict>> {
        let requirement = self.backend.fetch_requirement(lookup).await?;
        let resources = self.backend.fetch_resources().await?;

        Ok(compatibility::check(&requirement, &resources))
    }

    #[tracing::instrument(name = "Matcher::check_plugin_summary", skip_all, fields(
        lookup = %lookup
    ))]
    pub async fn check_plugin_summary(&self, lookup: &PluginLookup) -> Result<CheckSummary> {
        let requirement = self.backend.fetch_requirement(lookup).await?;
        let resources = self.backend.fetch_resources().await?;

        compatibility::summarize(&requirement, &resources)
    }

    /// Checks every plugin of the pipeline one after the other, looked up by
    /// id since names are not unique across versions. The first failed fetch
    /// aborts the whole check.
    #[tracing::instrument(name = "Matcher::check_pipeline", skip_all, fields(
        pipeline_id = pipeline_id
    ))]
    pub async fn check_pipeline(&self, pipeline_id: u64) -> Result<PipelineCheckResult> {
        let plugins = self.backend.fetch_pipeline_plugins(pipeline_id).await?;

        info!(plugins = plugins.len(), "checking pipeline plugins");

        let mut summaries = Vec::with_capacity(plugins.len());
        for plugin in plugins {
            let summary = self
                .check_plugin_summary(&PluginLookup::Id(plugin.id))
                .await?;
            summaries.push(summary);
        }

        Ok(pipeline::aggregate(summaries))
    }

    #[tracing::instrument(name = "Matcher::recommend", skip_all, fields(
        lookup = %lookup,
        budget = budget
    ))]
    pub async fn recommend(
        &self,
        lookup: &PluginLookup,
        allowed: Option<&HashSet<String>>,
        budget: f64,
    ) -> Result<Recommendation> {
        let resources = self.backend.fetch_resources().await?;
        let requirement = self.backend.fetch_requirement(lookup).await?;

        recommend::recommend(&requirement, &resources, allowed, budget)
    }

    /// Like [`Matcher::recommend`], but only resources that meet the plugin's
    /// minimums are candidates. Both checks see the same catalog snapshot.
    #[tracing::instrument(name = "Matcher::recommend_compatible", skip_all, fields(
        lookup = %lookup,
        budget = budget
    ))]
    pub async fn recommend_compatible(
        &self,
        lookup: &PluginLookup,
        allowed: Option<&HashSet<String>>,
        budget: f64,
    ) -> Result<Recommendation> {
        let resources = self.backend.fetch_resources().await?;
        let requirement = self.backend.fetch_requirement(lookup).await?;

        let compatible: HashSet<String> = compatibility::check(&requirement, &resources)
            .into_iter()
            .filter(|verdict| verdict.fit)
            .map(|verdict| verdict.resource_name)
            .filter(|name| allowed.map_or(true, |allowed| allowed.contains(name)))
            .collect();

        info!(candidates = compatible.len(), "restricted to compatible resources");

        recommend::recommend(&requirement, &resources, Some(&compatible), budget)
    }
}
