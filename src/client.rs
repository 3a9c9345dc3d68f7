use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::backend::Backend;
use crate::error::{ChrisError, Result};
use crate::pipeline::{PipelineTopology, PluginPiping};
use crate::resource::{ComputeResource, Pipeline, Plugin, PluginLookup, PluginRef, PluginRequirement};

const API_SUFFIX: &str = "/api/v1/";

#[derive(Debug, Clone)]
pub enum Credentials {
    Password { username: String, password: String },
    /// Takes priority over username and password when both are known.
    Token(String),
}

/// Urls CUBE advertises at its api root.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionLinks {
    pub uploadedfiles: String,
    pub user: String,
    #[serde(default)]
    pub pipelines: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    count: u64,
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    username: String,
}

#[derive(Debug, Deserialize)]
struct PipelineDetail {
    plugins: String,
    plugin_pipings: String,
}

/// An authenticated session with a CUBE instance.
#[derive(Debug, Clone)]
pub struct ChrisClient {
    http: Client,
    addr: String,
    token: String,
    username: String,
    collection_links: CollectionLinks,
}

impl ChrisClient {
    /// Logs into CUBE. `address` is the api root and must end with `/api/v1/`.
    #[tracing::instrument(name = "ChrisClient::login", skip_all, fields(
        address = %address
    ))]
    pub async fn login(address: &str, credentials: Credentials) -> Result<Self> {
        if !address.ends_with(API_SUFFIX) {
            return Err(ChrisError::InvalidInput(format!(
                "address of CUBE must end with \"{API_SUFFIX}\""
            )));
        }

        let token = match credentials {
            Credentials::Token(token) => token,
            Credentials::Password { username, password } => {
                if username.is_empty() || password.is_empty() {
                    return Err(ChrisError::IncorrectLogin(
                        "username and password are required".to_owned(),
                    ));
                }
                Self::fetch_token(address, &username, &password).await?
            }
        };

        let http = Self::authenticated_http_client(&token)?;

        let response = http.get(address).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(ChrisError::IncorrectLogin(json_field(&body, "detail")));
        }
        if status != StatusCode::OK {
            return Err(ChrisError::UnexpectedResponse(format!(
                "CUBE response status code was {status}"
            )));
        }

        let collection_links = parse_collection_links(&body)?;

        let user: UserResponse = http
            .get(&collection_links.user)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info!(username = %user.username, "logged into CUBE");

        Ok(Self {
            http,
            addr: address.to_owned(),
            token,
            username: user.username,
            collection_links,
        })
    }

    #[tracing::instrument(name = "ChrisClient::fetch_token", skip_all)]
    async fn fetch_token(address: &str, username: &str, password: &str) -> Result<String> {
        let response = Client::new()
            .post(format!("{address}auth-token/"))
            .header(header::ACCEPT, "application/json")
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;

        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await?;
            return Err(ChrisError::IncorrectLogin(first_non_field_error(&body)));
        }

        let token: TokenResponse = response.error_for_status()?.json().await?;

        Ok(token.token)
    }

    fn authenticated_http_client(token: &str) -> Result<Client> {
        let mut authorization = HeaderValue::from_str(&format!("Token {token}"))
            .map_err(|_| ChrisError::InvalidInput("token contains invalid characters".to_owned()))?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(header::AUTHORIZATION, authorization);

        Ok(Client::builder().default_headers(headers).build()?)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn address(&self) -> &str {
        &self.addr
    }

    pub fn collection_links(&self) -> &CollectionLinks {
        &self.collection_links
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    fn compute_resources_url(&self) -> String {
        format!("{}computeresources/", self.addr)
    }

    fn plugin_search_url(&self) -> String {
        format!("{}plugins/search/", self.addr)
    }

    fn pipelines_url(&self) -> String {
        self.collection_links
            .pipelines
            .clone()
            .unwrap_or_else(|| format!("{}pipelines/", self.addr))
    }

    #[tracing::instrument(name = "ChrisClient::get_compute_resources", skip_all)]
    pub async fn get_compute_resources(&self) -> Result<Vec<ComputeResource>> {
        let page: Page<ComputeResource> = self.get_json(&self.compute_resources_url()).await?;
        info!(count = page.count, "fetched compute resources");
        Ok(page.results)
    }

    pub async fn list_compute_resources(&self) -> Result<Vec<String>> {
        let resources = self.get_compute_resources().await?;
        Ok(resources.into_iter().map(|resource| resource.name).collect())
    }

    pub async fn get_compute_resources_details(&self) -> Result<BTreeMap<String, ComputeResource>> {
        let resources = self.get_compute_resources().await?;
        Ok(resources
            .into_iter()
            .map(|resource| (resource.name.clone(), resource))
            .collect())
    }

    #[tracing::instrument(name = "ChrisClient::list_installed_plugins", skip_all)]
    pub async fn list_installed_plugins(&self) -> Result<Vec<String>> {
        let page: Page<Plugin> = self.get_json(&self.plugin_search_url()).await?;
        Ok(page.results.into_iter().map(|plugin| plugin.name).collect())
    }

    /// Every plugin matching the lookup. Never empty.
    #[tracing::instrument(name = "ChrisClient::search_plugins", skip_all, fields(
        lookup = %lookup
    ))]
    pub async fn search_plugins(&self, lookup: &PluginLookup) -> Result<Vec<Plugin>> {
        let query = match lookup {
            PluginLookup::Name(name) => ("name_exact", name.clone()),
            PluginLookup::Id(id) => ("id", id.to_string()),
        };

        let page: Page<Plugin> = self
            .http
            .get(self.plugin_search_url())
            .query(&[query])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let plugins: Vec<Plugin> = page
            .results
            .into_iter()
            .filter(|plugin| lookup.matches(plugin))
            .collect();

        if plugins.is_empty() {
            warn!("no plugin matched the lookup");
            return Err(ChrisError::PluginNotFound(lookup.clone()));
        }

        Ok(plugins)
    }

    /// Plugins matching the lookup keyed by name.
    pub async fn get_plugin_details(&self, lookup: &PluginLookup) -> Result<BTreeMap<String, Plugin>> {
        let plugins = self.search_plugins(lookup).await?;
        Ok(plugins
            .into_iter()
            .map(|plugin| (plugin.name.clone(), plugin))
            .collect())
    }

    #[tracing::instrument(name = "ChrisClient::list_all_pipelines", skip_all)]
    pub async fn list_all_pipelines(&self) -> Result<BTreeMap<String, Pipeline>> {
        let page: Page<Pipeline> = self.get_json(&self.pipelines_url()).await?;
        Ok(page
            .results
            .into_iter()
            .map(|pipeline| (pipeline.name.clone(), pipeline))
            .collect())
    }

    pub async fn pipeline_name_to_id(&self, pipeline_name: &str) -> Result<u64> {
        self.list_all_pipelines()
            .await?
            .get(pipeline_name)
            .map(|pipeline| pipeline.id)
            .ok_or_else(|| ChrisError::PipelineNotFound(format!("name {pipeline_name}")))
    }

    async fn get_pipeline_detail(&self, pipeline_id: u64) -> Result<PipelineDetail> {
        let response = self
            .http
            .get(format!("{}{pipeline_id}/", self.pipelines_url()))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ChrisError::PipelineNotFound(format!("id {pipeline_id}")));
        }

        Ok(response.error_for_status()?.json().await?)
    }

    #[tracing::instrument(name = "ChrisClient::get_pipeline_plugins", skip_all, fields(
        pipeline_id = pipeline_id
    ))]
    pub async fn get_pipeline_plugins(&self, pipeline_id: u64) -> Result<Vec<PluginRef>> {
        let detail = self.get_pipeline_detail(pipeline_id).await?;
        let page: Page<PluginRef> = self.get_json(&detail.plugins).await?;
        Ok(page.results)
    }

    #[tracing::instrument(name = "ChrisClient::get_pipeline_topology", skip_all, fields(
        pipeline_id = pipeline_id
    ))]
    pub async fn get_pipeline_topology(&self, pipeline_id: u64) -> Result<PipelineTopology> {
        let detail = self.get_pipeline_detail(pipeline_id).await?;
        let pipings: Page<PluginPiping> = self.get_json(&detail.plugin_pipings).await?;
        let plugins: Page<PluginRef> = self.get_json(&detail.plugins).await?;

        PipelineTopology::new(plugins.results, &pipings.results)
    }
}

#[async_trait]
impl Backend for ChrisClient {
    async fn fetch_resources(&self) -> Result<Vec<ComputeResource>> {
        self.get_compute_resources().await
    }

    async fn fetch_requirement(&self, lookup: &PluginLookup) -> Result<PluginRequirement> {
        let plugins = self.search_plugins(lookup).await?;
        plugins
            .first()
            .map(Plugin::requirement)
            .ok_or_else(|| ChrisError::PluginNotFound(lookup.clone()))
    }

    async fn fetch_pipeline_plugins(&self, pipeline_id: u64) -> Result<Vec<PluginRef>> {
        self.get_pipeline_plugins(pipeline_id).await
    }
}

fn parse_collection_links(body: &str) -> Result<CollectionLinks> {
    let unexpected = || ChrisError::UnexpectedResponse(body.to_owned());

    let root: serde_json::Value = serde_json::from_str(body).map_err(|_| unexpected())?;
    let links = root.get("collection_links").ok_or_else(unexpected)?;

    serde_json::from_value(links.clone()).map_err(|_| unexpected())
}

/// Value of a top level string field of a json error body, or the body itself.
fn json_field(body: &str, field: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get(field)?.as_str().map(str::to_owned))
        .unwrap_or_else(|| body.to_owned())
}

fn first_non_field_error(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("non_field_errors")?.get(0)?.as_str().map(str::to_owned))
        .unwrap_or_else(|| body.to_owned())
}
