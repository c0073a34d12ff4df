#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use reel_api::config::ServerConfig;
use reel_api::router::build_app_router;
use reel_api::state::AppState;
use reel_pipeline::{Orchestrator, PipelineConfig};
use reel_core::script::{Scene, Script, ScriptRequest};
use reel_providers::mock::mock_script;
use reel_providers::{ImageProvider, ProviderError, Providers, ScriptProvider};
use tokio::sync::Semaphore;

/// Build a test `ServerConfig` writing under `output_root`.
///
/// Placeholder frames are kept tiny so mock stages finish quickly.
pub fn test_config(output_root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        pipeline: PipelineConfig {
            output_root: output_root.to_path_buf(),
            frame_width: 8,
            frame_height: 16,
            progress_keepalive: Duration::from_secs(30),
            ..PipelineConfig::default()
        },
    }
}

/// Application state over an unconfigured provider set: only mock runs
/// can make progress.
pub fn test_state(output_root: &Path) -> AppState {
    let config = test_config(output_root);
    let orchestrator = Orchestrator::new(config.pipeline.clone(), Providers::unconfigured());
    AppState::new(config, orchestrator)
}

/// Live providers whose image calls wait until [`HeldImages::release`].
pub struct HeldImages {
    gate: Semaphore,
}

impl HeldImages {
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl ImageProvider for HeldImages {
    async fn generate_image(
        &self,
        _scene: &Scene,
        _prompt: &str,
        output: &Path,
    ) -> Result<(), ProviderError> {
        self.gate.acquire().await.unwrap().forget();
        std::fs::write(output, b"png").map_err(ProviderError::from)
    }
}

struct CannedScripts;

#[async_trait]
impl ScriptProvider for CannedScripts {
    async fn generate_script(&self, _request: &ScriptRequest) -> Result<Script, ProviderError> {
        Ok(mock_script())
    }
}

/// Application state whose non-mock image stage stays active until the
/// returned handle releases it.
pub fn held_state(output_root: &Path) -> (AppState, Arc<HeldImages>) {
    let config = test_config(output_root);
    let images = Arc::new(HeldImages {
        gate: Semaphore::new(0),
    });
    let providers = Providers {
        script: Arc::new(CannedScripts),
        image: images.clone(),
        ..Providers::unconfigured()
    };
    let orchestrator = Orchestrator::new(config.pipeline.clone(), providers);
    (AppState::new(config, orchestrator), images)
}

/// Build the full application router with all middleware layers, exactly
/// as `main.rs` does.
pub fn build_test_app(state: AppState) -> Router {
    let config = state.config.clone();
    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty(), false).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty(), false).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Body::from(body.to_string()), true).await
}

async fn send(app: Router, method: Method, uri: &str, body: Body, json: bool) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if json {
        builder = builder.header("content-type", "application/json");
    }
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Start a mock run and return its id.
pub async fn start_mock_run(app: Router) -> String {
    let response = post_json(
        app,
        "/api/generate",
        serde_json::json!({"theme": "changing jobs", "mock": true}),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    let json = body_json(response).await;
    json["data"]["run_id"].as_str().unwrap().to_string()
}
