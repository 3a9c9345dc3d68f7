use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::HashSet;

use chris_matcher::{
    backend::Matcher,
    client::{ChrisClient, Credentials},
    config::{Config, DEFAULT_ADDRESS, DEFAULT_PASSWORD, DEFAULT_USERNAME},
    resource::PluginLookup,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a config file. When given the login flags are ignored.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Address of CUBE, must end with /api/v1/.
    #[arg(long, global = true, default_value = DEFAULT_ADDRESS)]
    address: String,

    #[arg(long, global = true, default_value = DEFAULT_USERNAME)]
    username: String,

    #[arg(long, global = true, default_value = DEFAULT_PASSWORD)]
    password: String,

    /// Token authorization, takes priority over username and password.
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Get a plugin's details by id or by name.
    PluginDetails {
        #[arg(long, required_unless_present = "name", conflicts_with = "name")]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// List the names of the compute resources.
    ListComputeResources,
    /// Get the details of every compute resource.
    ComputeResourcesDetails,
    /// List the installed plugins.
    ListPlugins,
    /// List the pipelines.
    ListPipelines,
    /// Check which compute resources can run a plugin.
    CheckPlugin {
        /// Name of the plugin.
        name: String,
    },
    /// Check that every plugin of a pipeline can run on some compute resource.
    CheckPipeline {
        #[arg(long, required_unless_present = "name", conflicts_with = "name")]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Recommend the compute resource with the lowest expected runtime within budget.
    Recommend {
        /// Name of the plugin.
        plugin: String,
        #[arg(long)]
        budget: f64,
        /// Comma separated names of the compute resources to choose from.
        #[arg(long, value_delimiter = ',')]
        allow: Option<Vec<String>>,
        /// Only choose from compute resources that meet the plugin's minimums.
        #[arg(long)]
        compatible_only: bool,
    },
    /// Print the plugins of a pipeline in topological order.
    PipelineTopology {
        /// Id of the pipeline.
        id: u64,
    },
}

impl Cli {
    async fn connect(&self) -> Result<ChrisClient> {
        let (address, credentials) = match &self.config {
            Some(file) => {
                let config = Config::from_file(file).await?;
                let credentials = config.cube.credentials()?;
                (config.cube.address, credentials)
            }
            None => {
                let credentials = match &self.token {
                    Some(token) => Credentials::Token(token.clone()),
                    None => Credentials::Password {
                        username: self.username.clone(),
                        password: self.password.clone(),
                    },
                };
                (self.address.clone(), credentials)
            }
        };

        Ok(ChrisClient::login(&address, credentials).await?)
    }
}

fn json_print(value: &impl Serialize) -> Result<()> {
    // serde_json::Value keeps object keys sorted.
    let value = serde_json::to_value(value)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = cli.connect().await?;
    let matcher = Matcher::new(&client);

    match cli.command {
        Commands::PluginDetails { id, name } => {
            let lookup = match (id, name) {
                (Some(id), _) => PluginLookup::parse_id(&id)?,
                (None, Some(name)) => PluginLookup::Name(name),
                (None, None) => anyhow::bail!("either --id or --name is required"),
            };
            json_print(&client.get_plugin_details(&lookup).await?)
        }
        Commands::ListComputeResources => json_print(&client.list_compute_resources().await?),
        Commands::ComputeResourcesDetails => {
            json_print(&client.get_compute_resources_details().await?)
        }
        Commands::ListPlugins => json_print(&client.list_installed_plugins().await?),
        Commands::ListPipelines => json_print(&client.list_all_pipelines().await?),
        Commands::CheckPlugin { name } => {
            json_print(&matcher.check_plugin_summary(&PluginLookup::Name(name)).await?)
        }
        Commands::CheckPipeline { id, name } => {
            let pipeline_id = match (id, name) {
                (Some(id), _) => id
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| anyhow::anyhow!("invalid pipeline id: {id:?}"))?,
                (None, Some(name)) => client.pipeline_name_to_id(&name).await?,
                (None, None) => anyhow::bail!("either --id or --name is required"),
            };
            json_print(&matcher.check_pipeline(pipeline_id).await?)
        }
        Commands::Recommend {
            plugin,
            budget,
            allow,
            compatible_only,
        } => {
            let lookup = PluginLookup::Name(plugin);
            let allowed: Option<HashSet<String>> = allow.map(|names| names.into_iter().collect());

            let recommendation = if compatible_only {
                matcher
                    .recommend_compatible(&lookup, allowed.as_ref(), budget)
                    .await?
            } else {
                matcher.recommend(&lookup, allowed.as_ref(), budget).await?
            };
            json_print(&serde_json::json!({ "recommendation": recommendation }))
        }
        Commands::PipelineTopology { id } => json_print(&client.get_pipeline_topology(id).await?),
    }
}
