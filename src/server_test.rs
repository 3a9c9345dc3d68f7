#[cfg(test)]
mod router_tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::client::{ChrisClient, Credentials};
    use crate::error::ChrisError;
    use crate::server::{build_router, ApiError, AppState};
    use crate::test_support::{spawn_cube, PASSWORD, TOKEN};

    async fn post(router: &Router, uri: &str, body: Value) -> anyhow::Result<(StatusCode, Value)> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?;

        let response = router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;

        Ok((status, serde_json::from_slice(&bytes)?))
    }

    async fn logged_in_router() -> anyhow::Result<Router> {
        let address = spawn_cube().await;
        let client = ChrisClient::login(&address, Credentials::Token(TOKEN.to_owned())).await?;
        Ok(build_router(AppState::with_client(client)))
    }

    #[tokio::test]
    async fn index_reports_the_server_is_online() -> anyhow::Result<()> {
        let router = build_router(AppState::default());

        let request = Request::builder().uri("/").body(Body::empty())?;
        let response = router.oneshot(request).await?;

        assert_eq!(StatusCode::OK, response.status());
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(&b"server is online"[..], &bytes[..]);

        Ok(())
    }

    #[tokio::test]
    async fn requires_a_session() -> anyhow::Result<()> {
        let router = build_router(AppState::default());

        let (status, body) = post(&router, "/api/list_compute_resources", json!({})).await?;

        assert_eq!(StatusCode::UNAUTHORIZED, status);
        assert_eq!(json!(false), body["success"]);
        assert_eq!(json!("not logged in to CUBE"), body["error"]);

        Ok(())
    }

    #[tokio::test]
    async fn login_establishes_a_session() -> anyhow::Result<()> {
        let address = spawn_cube().await;
        let router = build_router(AppState::default());

        let (status, body) = post(
            &router,
            "/api/login",
            json!({ "address": address, "username": "chris", "password": PASSWORD }),
        )
        .await?;
        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!("chris"), body["data"]);

        let (status, body) = post(&router, "/api/list_compute_resources", json!({})).await?;
        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!(["auto_free", "host", "moc"]), body["data"]);

        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() -> anyhow::Result<()> {
        let address = spawn_cube().await;
        let router = build_router(AppState::default());

        let (status, _) = post(
            &router,
            "/api/login",
            json!({ "address": address, "username": "chris", "password": "hunter2" }),
        )
        .await?;

        assert_eq!(StatusCode::UNAUTHORIZED, status);

        Ok(())
    }

    #[tokio::test]
    async fn plugin_details_accept_numeric_string_ids() -> anyhow::Result<()> {
        let router = logged_in_router().await?;

        let (status, body) = post(&router, "/api/get_plugin_details", json!({ "id": "1" })).await?;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!(1), body["data"]["pl-s3retrieve"]["id"]);

        Ok(())
    }

    #[tokio::test]
    async fn non_numeric_plugin_id_is_a_bad_request() -> anyhow::Result<()> {
        let router = logged_in_router().await?;

        let (status, _) = post(&router, "/api/get_plugin_details", json!({ "id": "one" })).await?;

        assert_eq!(StatusCode::BAD_REQUEST, status);

        Ok(())
    }

    #[tokio::test]
    async fn unknown_plugin_is_not_found() -> anyhow::Result<()> {
        let router = logged_in_router().await?;

        let (status, _) = post(
            &router,
            "/api/check_plugin_compute_env",
            json!({ "plugin_name": "pl-missing" }),
        )
        .await?;

        assert_eq!(StatusCode::NOT_FOUND, status);

        Ok(())
    }

    #[tokio::test]
    async fn checks_a_plugin() -> anyhow::Result<()> {
        let router = logged_in_router().await?;

        let (status, body) = post(
            &router,
            "/api/check_plugin_compute_env",
            json!({ "plugin_name": "pl-ageatscan" }),
        )
        .await?;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!(true), body["data"]["passed"]);
        assert_eq!(json!(["moc"]), body["data"]["pass_list"]);
        assert_eq!(
            json!({
                "resource_name": "host",
                "fit": false,
                "message": [
                    "4000 CPU's, but 2000 CPUs available.",
                    "1 GPU's, but 0 GPUs available."
                ]
            }),
            body["data"]["matching"][0]
        );

        Ok(())
    }

    #[tokio::test]
    async fn checks_a_pipeline_by_name() -> anyhow::Result<()> {
        let router = logged_in_router().await?;

        let (status, body) = post(
            &router,
            "/api/check_pipeline_compute_env",
            json!({ "pipeline_name": "s3retrieve-ageatscan" }),
        )
        .await?;

        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!(true), body["data"]["fit"]);
        assert_eq!(json!(""), body["data"]["fail_case"]);

        Ok(())
    }

    #[tokio::test]
    async fn unknown_pipeline_id_is_not_found() -> anyhow::Result<()> {
        let router = logged_in_router().await?;

        let (status, _) = post(
            &router,
            "/api/check_pipeline_compute_env",
            json!({ "pipeline_id": 9 }),
        )
        .await?;

        assert_eq!(StatusCode::NOT_FOUND, status);

        Ok(())
    }

    #[tokio::test]
    async fn recommends_a_compute_resource() -> anyhow::Result<()> {
        let router = logged_in_router().await?;

        let (status, body) = post(
            &router,
            "/api/recommend_compute_env",
            json!({ "plugin_name": "pl-s3retrieve", "budget": 20 }),
        )
        .await?;
        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!("moc"), body["data"]);

        let (_, body) = post(
            &router,
            "/api/recommend_compute_env",
            json!({ "plugin_name": "pl-s3retrieve", "budget": "5", "env_list": ["host", "moc"] }),
        )
        .await?;
        assert_eq!(json!("host"), body["data"]);

        let (_, body) = post(
            &router,
            "/api/recommend_compute_env",
            json!({ "plugin_name": "pl-s3retrieve", "budget": 0.5 }),
        )
        .await?;
        assert_eq!(json!("none"), body["data"]);

        Ok(())
    }

    #[tokio::test]
    async fn non_numeric_budget_is_a_bad_request() -> anyhow::Result<()> {
        let router = logged_in_router().await?;

        let (status, _) = post(
            &router,
            "/api/recommend_compute_env",
            json!({ "plugin_name": "pl-s3retrieve", "budget": "lots" }),
        )
        .await?;

        assert_eq!(StatusCode::BAD_REQUEST, status);

        Ok(())
    }

    #[tokio::test]
    async fn serialization_failure_is_an_internal_error() -> anyhow::Result<()> {
        let error = ApiError::from(ChrisError::Serialization("key must be a string".to_owned()));

        let response = error.into_response();

        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, response.status());
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body: Value = serde_json::from_slice(&bytes)?;
        assert_eq!(json!(false), body["success"]);
        assert_eq!(json!("serialization failed: key must be a string"), body["error"]);

        Ok(())
    }
}
