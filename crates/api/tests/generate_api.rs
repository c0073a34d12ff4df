//! Integration tests for run control and the progress stream.

mod common;

use axum::http::StatusCode;
use common::{body_bytes, body_json, get, post_json, start_mock_run};
use serde_json::json;

// ---------------------------------------------------------------------------
// Test: mock start returns the run id and the script
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mock_start_creates_run_with_script() {
    let dir = tempfile::tempdir().unwrap();
    let app = common::build_test_app(common::test_state(dir.path()));

    let response = post_json(
        app.clone(),
        "/api/generate",
        json!({"theme": "changing jobs", "duration": 30, "mock": true}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    let run_id = json["data"]["run_id"].as_str().unwrap().to_string();
    let scenes = json["data"]["script"]["scenes"].as_array().unwrap();
    assert_eq!(scenes.len(), 5);
    assert_eq!(scenes[0]["scene_id"], 1);
    assert!(dir.path().join(&run_id).join("script.json").exists());

    let snapshot = body_json(get(app, &format!("/api/generate/{run_id}")).await).await;
    assert_eq!(snapshot["data"]["run_id"], run_id.as_str());
    assert_eq!(snapshot["data"]["mock"], true);
    assert!(snapshot["data"]["images"].is_null());
    assert!(snapshot["data"]["active_stage"].is_null());
}

#[tokio::test]
async fn blank_theme_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = common::build_test_app(common::test_state(dir.path()));

    let response = post_json(app, "/api/generate", json!({"theme": "  ", "mock": true})).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

// ---------------------------------------------------------------------------
// Test: unknown run ids are 404 everywhere
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_run_returns_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = common::build_test_app(common::test_state(dir.path()));

    let response = get(app.clone(), "/api/generate/no_such_run").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");

    for path in ["continue", "compose", "generate-voices", "finalize"] {
        let response = post_json(app.clone(), &format!("/api/generate/no_such_run/{path}"), json!({})).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "POST {path}");
    }

    let response = get(app, "/api/generate/no_such_run/progress").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: unknown changed scene id is rejected without side effects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_changed_scene_id_returns_400() {
    let dir = tempfile::tempdir().unwrap();
    let app = common::build_test_app(common::test_state(dir.path()));
    let run_id = start_mock_run(app.clone()).await;

    let response = post_json(
        app.clone(),
        &format!("/api/generate/{run_id}/continue"),
        json!({"changed_scene_ids": [1, 99]}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let snapshot = body_json(get(app.clone(), &format!("/api/generate/{run_id}")).await).await;
    assert!(snapshot["data"]["images"].is_null());
    assert!(snapshot["data"]["active_stage"].is_null());

    // No stage was admitted, so there is nothing to stream.
    let response = get(app, &format!("/api/generate/{run_id}/progress")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: stage preconditions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn videos_before_images_returns_400() {
    let dir = tempfile::tempdir().unwrap();
    let app = common::build_test_app(common::test_state(dir.path()));
    let run_id = start_mock_run(app.clone()).await;

    let response = post_json(app, &format!("/api/generate/{run_id}/compose"), json!({})).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: a second advance while a stage is active conflicts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn advance_while_active_returns_409() {
    let dir = tempfile::tempdir().unwrap();
    let (state, images) = common::held_state(dir.path());
    let app = common::build_test_app(state);
    let response = post_json(app.clone(), "/api/generate", json!({"theme": "changing jobs"})).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let run_id = body_json(response).await["data"]["run_id"]
        .as_str()
        .unwrap()
        .to_string();
    let uri = format!("/api/generate/{run_id}/continue");

    let first = post_json(app.clone(), &uri, json!({})).await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    let ack = body_json(first).await;
    assert_eq!(ack["data"]["stage"], "image");

    let second = post_json(app.clone(), &uri, json!({})).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let json = body_json(second).await;
    assert_eq!(json["code"], "CONFLICT");

    images.release(5);
    let stream = get(app, &format!("/api/generate/{run_id}/progress")).await;
    let text = String::from_utf8(body_bytes(stream).await).unwrap();
    assert!(text.contains("event: images_ready"));
}

// ---------------------------------------------------------------------------
// Test: SSE stream of a mock image stage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mock_image_stage_streams_progress_until_ready() {
    let dir = tempfile::tempdir().unwrap();
    let app = common::build_test_app(common::test_state(dir.path()));
    let run_id = start_mock_run(app.clone()).await;

    let response = post_json(app.clone(), &format!("/api/generate/{run_id}/continue"), json!({})).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = get(app.clone(), &format!("/api/generate/{run_id}/progress")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    // The stream ends after the terminal event, so the body completes.
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.contains("event: running"), "body: {body}");
    assert!(body.contains("\"scene\":5,\"totalScenes\":5"), "body: {body}");
    assert!(body.contains("event: done"), "body: {body}");
    let ready_at = body.find("event: images_ready").expect("images_ready frame");
    assert!(body[ready_at..].contains("scene_5.png"));
    assert!(!body.contains("event: error"));

    let snapshot = body_json(get(app.clone(), &format!("/api/generate/{run_id}")).await).await;
    let images = snapshot["data"]["images"].as_array().unwrap();
    assert_eq!(images.len(), 5);
    let url = images[0]["url"].as_str().unwrap();
    assert!(url.starts_with(&format!("/output/{run_id}/scene_1.png?t=")));
    assert_eq!(snapshot["data"]["last_outcome"]["status"], "ready");

    // Artifacts are served from the output root.
    let response = get(app, &format!("/output/{run_id}/scene_1.png")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn partial_regeneration_without_targets_returns_400() {
    let dir = tempfile::tempdir().unwrap();
    let app = common::build_test_app(common::test_state(dir.path()));
    let run_id = start_mock_run(app.clone()).await;

    let response = post_json(
        app.clone(),
        &format!("/api/generate/{run_id}/continue"),
        json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let _ = body_bytes(get(app.clone(), &format!("/api/generate/{run_id}/progress")).await).await;

    let response = post_json(
        app,
        &format!("/api/generate/{run_id}/regenerate-images"),
        json!({"scene_instructions": {}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
