use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request as HttpRequest, StatusCode},
};
use quantopt_core::{AppCore, CoreConfig};
use quantopt_server::router::build_router;
use serde_json::{Value, json};
use tower::ServiceExt;

fn app() -> (Arc<AppCore>, Router) {
    let core = Arc::new(AppCore::new(CoreConfig::default()));
    let router = build_router(core.clone());
    (core, router)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = HttpRequest::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn sphere_task(name: &str, budget: usize) -> Value {
    json!({
        "name": name,
        "parameter_config": {
            "a": {"lower_bound": -2.0, "upper_bound": 2.0},
            "b": {"lower_bound": 0.01, "upper_bound": 1.0, "scale": "log"}
        },
        "optimizer_config": {"optimizer_type": "OnePlusOne", "budget": budget, "num_workers": 2},
        "objective": {"type": "builtin", "name": "sphere"}
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let (_, app) = app();
    let request = HttpRequest::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn create_and_fetch_task() {
    let (_, app) = app();
    let (status, body) = call(&app, "POST", "/api/tasks", Some(sphere_task("demo", 10))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "pending");
    let task_id = body["data"]["task_id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, "GET", "/api/tasks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert!(body["data"][0].get("trace").is_none());

    let (status, body) = call(&app, "GET", &format!("/api/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "demo");
    assert_eq!(body["data"]["config"]["optimizer_config"]["algorithm"], "one_plus_one");
    assert_eq!(body["data"]["trace"], json!([]));
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let (core, app) = app();
    let mut bad = sphere_task("bad", 10);
    bad["parameter_config"]["a"]["upper_bound"] = json!(-5.0);
    let (status, body) = call(&app, "POST", "/api/tasks", Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], 400);
    assert!(core.queue.is_empty());

    let mut unknown = sphere_task("unknown", 10);
    unknown["objective"] = json!({"type": "builtin", "name": "does-not-exist"});
    let (status, _) = call(&app, "POST", "/api/tasks", Some(unknown)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut command = sphere_task("command", 10);
    command["objective"] = json!({"type": "command", "program": "python3"});
    let (status, _) = call(&app, "POST", "/api/tasks", Some(command)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_task_is_404() {
    let (_, app) = app();
    let (status, body) = call(&app, "GET", "/api/tasks/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (status, _) = call(&app, "POST", "/api/tasks/nope/start", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn task_runs_through_the_api() {
    let (core, app) = app();
    let (_, body) = call(&app, "POST", "/api/tasks", Some(sphere_task("run", 20))).await;
    let task_id = body["data"]["task_id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, "POST", &format!("/api/tasks/{task_id}/start"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "running");

    let (status, _) = call(&app, "POST", &format!("/api/tasks/{task_id}/start"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let task = core.queue.get(&task_id).unwrap();
    tokio::time::timeout(Duration::from_secs(20), task.wait())
        .await
        .unwrap();

    let (status, body) = call(&app, "GET", &format!("/api/tasks/{task_id}/trace"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 20);

    let (status, body) = call(&app, "GET", &format!("/api/tasks/{task_id}/result"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_evaluations"], 20);
}

#[tokio::test]
async fn bad_action_is_rejected() {
    let (_, app) = app();
    let (_, body) = call(&app, "POST", "/api/tasks", Some(sphere_task("x", 5))).await;
    let task_id = body["data"]["task_id"].as_str().unwrap().to_string();

    let (status, _) = call(&app, "POST", &format!("/api/tasks/{task_id}/rewind"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, "POST", &format!("/api/tasks/{task_id}/pause"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = call(&app, "POST", "/api/queue/explode", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn queue_endpoints_drive_tasks() {
    let (_, app) = app();
    for name in ["first", "second"] {
        call(&app, "POST", "/api/tasks", Some(sphere_task(name, 4))).await;
    }

    let (status, body) = call(&app, "POST", "/api/queue/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_processing"], true);
    assert_eq!(body["data"]["task_count"], 2);

    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        let (_, body) = call(&app, "GET", "/api/tasks", None).await;
        let done = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .all(|task| task["status"] == "completed");
        if done {
            break;
        }
        assert!(Instant::now() < deadline, "queue did not finish");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let (_, body) = call(&app, "GET", "/api/queue", None).await;
        if body["data"]["is_processing"] == false {
            assert_eq!(body["data"]["active_task_id"], Value::Null);
            break;
        }
        assert!(Instant::now() < deadline, "queue did not drain");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn objectives_are_listed() {
    let (_, app) = app();
    let (status, body) = call(&app, "GET", "/api/objectives", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["data"]["builtin"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(names.contains(&"qubit_pulse"));
    assert!(names.contains(&"rosenbrock"));
    assert_eq!(body["data"]["command_enabled"], false);
}

#[tokio::test]
async fn dashboard_is_served() {
    let (_, app) = app();
    for uri in ["/", "/tasks/anything"] {
        let request = HttpRequest::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.starts_with("text/html"));
    }

    let request = HttpRequest::builder()
        .uri("/missing.js")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
