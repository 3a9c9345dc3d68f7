//! HTTP front end.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Liveness message |
//! | POST | `/api/login` | Log into CUBE |
//! | POST | `/api/get_plugin_details` | Plugin details by id or name |
//! | POST | `/api/list_compute_resources` | Compute resource names |
//! | POST | `/api/get_compute_resources_details` | Compute resources by name |
//! | POST | `/api/list_installed_plugins` | Plugin names |
//! | POST | `/api/list_pipelines` | Pipelines by name |
//! | POST | `/api/check_plugin_compute_env` | Check one plugin |
//! | POST | `/api/check_pipeline_compute_env` | Check every plugin of a pipeline |
//! | POST | `/api/recommend_compute_env` | Recommend a compute resource |

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use tracing::{error, info};

use crate::backend::Matcher;
use crate::client::{ChrisClient, Credentials};
use crate::compatibility::CheckSummary;
use crate::error::ChrisError;
use crate::pipeline::PipelineCheckResult;
use crate::recommend::Recommendation;
use crate::resource::{ComputeResource, Pipeline, Plugin, PluginLookup};

/// Shared state for handlers. Holds the CUBE session once someone logged in.
#[derive(Clone, Default)]
pub struct AppState {
    session: Arc<RwLock<Option<ChrisClient>>>,
}

impl AppState {
    pub fn with_client(client: ChrisClient) -> Self {
        Self {
            session: Arc::new(RwLock::new(Some(client))),
        }
    }

    async fn client(&self) -> Result<ChrisClient, ChrisError> {
        self.session.read().await.clone().ok_or(ChrisError::NotLoggedIn)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub struct ApiError(ChrisError);

impl From<ChrisError> for ApiError {
    fn from(error: ChrisError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChrisError::PluginNotFound(_) | ChrisError::PipelineNotFound(_) => StatusCode::NOT_FOUND,
            ChrisError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ChrisError::IncorrectLogin(_) | ChrisError::NotLoggedIn => StatusCode::UNAUTHORIZED,
            ChrisError::Transport(_) | ChrisError::UnexpectedResponse(_) => StatusCode::BAD_GATEWAY,
            ChrisError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match status {
            StatusCode::BAD_GATEWAY => error!(error = %self.0, "request to CUBE failed"),
            StatusCode::INTERNAL_SERVER_ERROR => error!(error = %self.0, "failed to build response"),
            _ => {}
        }

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.0.to_string()),
        };

        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/login", post(login))
        .route("/get_plugin_details", post(get_plugin_details))
        .route("/list_compute_resources", post(list_compute_resources))
        .route("/get_compute_resources_details", post(get_compute_resources_details))
        .route("/list_installed_plugins", post(list_installed_plugins))
        .route("/list_pipelines", post(list_pipelines))
        .route("/check_plugin_compute_env", post(check_plugin_compute_env))
        .route("/check_pipeline_compute_env", post(check_pipeline_compute_env))
        .route("/recommend_compute_env", post(recommend_compute_env));

    Router::new()
        .route("/", get(index))
        .nest("/api", api_routes)
        .with_state(state)
}

async fn index() -> &'static str {
    "server is online"
}

/// Accepts ids sent either as json numbers or as numeric strings.
fn parse_id(value: &serde_json::Value, what: &str) -> Result<u64, ChrisError> {
    let id = match value {
        serde_json::Value::Number(number) => number.as_u64(),
        serde_json::Value::String(text) => text.trim().parse().ok(),
        _ => None,
    };

    id.ok_or_else(|| ChrisError::InvalidInput(format!("invalid {what} id: {value}")))
}

fn parse_budget(value: &serde_json::Value) -> Result<f64, ChrisError> {
    let budget = match value {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => text.trim().parse().ok(),
        _ => None,
    };

    budget
        .filter(|budget| !budget.is_nan())
        .ok_or_else(|| ChrisError::InvalidInput(format!("invalid budget: {value}")))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[tracing::instrument(name = "server::login", skip_all, fields(
    address = %request.address
))]
async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> ApiResult<String> {
    let credentials = match request.token {
        Some(token) if !token.is_empty() => Credentials::Token(token),
        _ => Credentials::Password {
            username: request.username,
            password: request.password,
        },
    };

    let client = ChrisClient::login(&request.address, credentials).await?;
    let username = client.username().to_owned();

    *state.session.write().await = Some(client);

    info!(%username, "session established");

    Ok(ApiResponse::ok(username))
}

#[derive(Debug, Deserialize)]
pub struct PluginDetailsRequest {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub name: Option<String>,
}

async fn get_plugin_details(
    State(state): State<AppState>,
    Json(request): Json<PluginDetailsRequest>,
) -> ApiResult<BTreeMap<String, Plugin>> {
    let lookup = match (request.id, request.name) {
        (Some(id), _) => PluginLookup::Id(parse_id(&id, "plugin")?),
        (None, Some(name)) => PluginLookup::Name(name),
        (None, None) => {
            return Err(ChrisError::InvalidInput("either id or name is required".to_owned()).into())
        }
    };

    let client = state.client().await?;
    Ok(ApiResponse::ok(client.get_plugin_details(&lookup).await?))
}

async fn list_compute_resources(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    let client = state.client().await?;
    Ok(ApiResponse::ok(client.list_compute_resources().await?))
}

async fn get_compute_resources_details(
    State(state): State<AppState>,
) -> ApiResult<BTreeMap<String, ComputeResource>> {
    let client = state.client().await?;
    Ok(ApiResponse::ok(client.get_compute_resources_details().await?))
}

async fn list_installed_plugins(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    let client = state.client().await?;
    Ok(ApiResponse::ok(client.list_installed_plugins().await?))
}

async fn list_pipelines(State(state): State<AppState>) -> ApiResult<BTreeMap<String, Pipeline>> {
    let client = state.client().await?;
    Ok(ApiResponse::ok(client.list_all_pipelines().await?))
}

#[derive(Debug, Deserialize)]
pub struct CheckPluginRequest {
    pub plugin_name: String,
}

async fn check_plugin_compute_env(
    State(state): State<AppState>,
    Json(request): Json<CheckPluginRequest>,
) -> ApiResult<CheckSummary> {
    let client = state.client().await?;
    let summary = Matcher::new(&client)
        .check_plugin_summary(&PluginLookup::Name(request.plugin_name))
        .await?;

    Ok(ApiResponse::ok(summary))
}

#[derive(Debug, Deserialize)]
pub struct CheckPipelineRequest {
    #[serde(default)]
    pub pipeline_id: Option<serde_json::Value>,
    #[serde(default)]
    pub pipeline_name: Option<String>,
}

async fn check_pipeline_compute_env(
    State(state): State<AppState>,
    Json(request): Json<CheckPipelineRequest>,
) -> ApiResult<PipelineCheckResult> {
    let client = state.client().await?;

    let pipeline_id = match (request.pipeline_id, request.pipeline_name) {
        (Some(id), _) => parse_id(&id, "pipeline")?,
        (None, Some(name)) => client.pipeline_name_to_id(&name).await?,
        (None, None) => {
            return Err(ChrisError::InvalidInput(
                "either pipeline_id or pipeline_name is required".to_owned(),
            )
            .into())
        }
    };

    let result = Matcher::new(&client).check_pipeline(pipeline_id).await?;

    Ok(ApiResponse::ok(result))
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub plugin_name: String,
    pub budget: serde_json::Value,
    #[serde(default)]
    pub env_list: Option<Vec<String>>,
}

async fn recommend_compute_env(
    State(state): State<AppState>,
    Json(request): Json<RecommendRequest>,
) -> ApiResult<Recommendation> {
    let budget = parse_budget(&request.budget)?;
    let allowed: Option<HashSet<String>> = request.env_list.map(|names| names.into_iter().collect());

    let client = state.client().await?;
    let recommendation = Matcher::new(&client)
        .recommend(&PluginLookup::Name(request.plugin_name), allowed.as_ref(), budget)
        .await?;

    Ok(ApiResponse::ok(recommendation))
}
