use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::backend::Backend;
use crate::error::{ChrisError, Result};
use crate::resource::{ComputeResource, PluginLookup, PluginRef, PluginRequirement};

pub const TOKEN: &str = "d7b3c8a1f0e94b2c";
pub const PASSWORD: &str = "chris1234";

pub fn resource(name: &str, cpus: u64, gpus: u64, memory: u64, workers: u64, cost: f64) -> ComputeResource {
    ComputeResource {
        name: name.to_owned(),
        cpus,
        gpus,
        memory,
        workers,
        cost,
        cpu_clock_speed_ghz: 1.0,
        description: String::new(),
    }
}

pub fn requirement(name: &str, cpu: u64, gpu: u64, memory: u64, workers: u64) -> PluginRequirement {
    PluginRequirement {
        id: 0,
        name: name.to_owned(),
        min_cpu_limit: cpu,
        min_gpu_limit: gpu,
        min_memory_limit: memory,
        min_number_of_workers: workers,
    }
}

/// In memory backend that counts how many times it was asked for data.
#[derive(Default)]
pub struct FakeBackend {
    pub resources: Vec<ComputeResource>,
    pub plugins: Vec<PluginRequirement>,
    pub pipelines: HashMap<u64, Vec<PluginRef>>,
    /// Requirement lookups for this plugin fail with a transport error.
    pub unreachable_plugin: Option<String>,
    pub resource_fetches: AtomicUsize,
    pub requirement_fetches: AtomicUsize,
}

#[async_trait]
impl Backend for FakeBackend {
    async fn fetch_resources(&self) -> Result<Vec<ComputeResource>> {
        self.resource_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.resources.clone())
    }

    async fn fetch_requirement(&self, lookup: &PluginLookup) -> Result<PluginRequirement> {
        self.requirement_fetches.fetch_add(1, Ordering::SeqCst);

        let plugin = self
            .plugins
            .iter()
            .find(|plugin| match lookup {
                PluginLookup::Name(name) => plugin.name == *name,
                PluginLookup::Id(id) => plugin.id == *id,
            })
            .cloned();

        let unreachable = match (lookup, &plugin) {
            (PluginLookup::Name(name), _) => self.unreachable_plugin.as_ref() == Some(name),
            (PluginLookup::Id(_), Some(plugin)) => {
                self.unreachable_plugin.as_ref() == Some(&plugin.name)
            }
            (PluginLookup::Id(_), None) => false,
        };
        if unreachable {
            return Err(ChrisError::Transport("connection reset".to_owned()));
        }

        plugin.ok_or_else(|| ChrisError::PluginNotFound(lookup.clone()))
    }

    async fn fetch_pipeline_plugins(&self, pipeline_id: u64) -> Result<Vec<PluginRef>> {
        self.pipelines
            .get(&pipeline_id)
            .cloned()
            .ok_or_else(|| ChrisError::PipelineNotFound(format!("id {pipeline_id}")))
    }
}

fn page(results: Vec<Value>) -> Json<Value> {
    Json(json!({ "count": results.len(), "next": null, "results": results }))
}

fn cube_plugins() -> Vec<Value> {
    vec![
        json!({
            "id": 1,
            "name": "pl-s3retrieve",
            "version": "2.0.0",
            "dock_image": "fnndsc/pl-s3retrieve",
            "type": "fs",
            "min_cpu_limit": 1000,
            "min_gpu_limit": 0,
            "min_memory_limit": 200,
            "min_number_of_workers": 1,
            "compute_resources": "http://cube/api/v1/plugins/1/computeresources/"
        }),
        json!({
            "id": 2,
            "name": "pl-ageatscan",
            "version": "0.1.0",
            "dock_image": "fnndsc/pl-ageatscan",
            "type": "ds",
            "min_cpu_limit": 4000,
            "min_gpu_limit": 1,
            "min_memory_limit": 1000,
            "min_number_of_workers": 1
        }),
    ]
}

fn cube_resources() -> Vec<Value> {
    vec![
        json!({ "name": "auto_free", "cpus": 0, "gpus": 0, "memory": 0, "workers": 0, "cost": 0.0 }),
        json!({
            "name": "host",
            "cpus": 2000,
            "gpus": 0,
            "memory": 4000,
            "workers": 4,
            "cost": 1.0,
            "cpu_clock_speed_ghz": 2.5,
            "description": "local docker host"
        }),
        json!({
            "name": "moc",
            "cpus": 8000,
            "gpus": 2,
            "memory": 16000,
            "workers": 8,
            "cost": 10.0,
            "cpu_clock_speed_ghz": 3.0
        }),
    ]
}

async fn auth_token(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["password"] == PASSWORD {
        (StatusCode::OK, Json(json!({ "token": TOKEN })))
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "non_field_errors": ["Unable to log in with provided credentials."] })),
        )
    }
}

async fn api_root(State(base): State<String>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let authorized = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some(format!("Token {TOKEN}").as_str());

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Invalid token." })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "collection_links": {
                "uploadedfiles": format!("{base}uploadedfiles/"),
                "user": format!("{base}users/1/"),
                "pipelines": format!("{base}pipelines/")
            }
        })),
    )
}

async fn plugin_search(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let results = cube_plugins()
        .into_iter()
        .filter(|plugin| match params.get("name_exact") {
            Some(name) => plugin["name"] == *name.as_str(),
            None => true,
        })
        .filter(|plugin| match params.get("id") {
            Some(id) => plugin["id"].to_string() == *id,
            None => true,
        })
        .collect();

    page(results)
}

async fn pipeline_detail(
    State(base): State<String>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, StatusCode> {
    if id != 1 {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(Json(json!({
        "id": 1,
        "name": "s3retrieve-ageatscan",
        "plugins": format!("{base}pipelines/1/plugins/"),
        "plugin_pipings": format!("{base}pipelines/1/pipings/")
    })))
}

/// Starts a stub of the CUBE api on a local port and returns its api root.
pub async fn spawn_cube() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local port");
    let base = format!("http://{}/api/v1/", listener.local_addr().expect("local addr"));

    let router = Router::new()
        .route("/api/v1/", get(api_root))
        .route("/api/v1/auth-token/", post(auth_token))
        .route(
            "/api/v1/users/1/",
            get(|| async { Json(json!({ "username": "chris" })) }),
        )
        .route(
            "/api/v1/computeresources/",
            get(|| async { page(cube_resources()) }),
        )
        .route("/api/v1/plugins/search/", get(plugin_search))
        .route(
            "/api/v1/pipelines/",
            get(|| async {
                page(vec![
                    json!({ "id": 1, "name": "s3retrieve-ageatscan", "authors": "chris", "locked": false }),
                    json!({ "id": 2, "name": "empty", "locked": true }),
                ])
            }),
        )
        .route("/api/v1/pipelines/{id}/", get(pipeline_detail))
        .route(
            "/api/v1/pipelines/1/plugins/",
            get(|| async { page(cube_plugins()) }),
        )
        .route(
            "/api/v1/pipelines/1/pipings/",
            get(|| async {
                page(vec![
                    json!({ "id": 11, "plugin_id": 2, "previous_id": 10 }),
                    json!({ "id": 10, "plugin_id": 1, "previous_id": null }),
                ])
            }),
        )
        .with_state(base.clone());

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve CUBE stub");
    });

    base
}
