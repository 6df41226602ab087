mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use common::*;
use fieldnotes::{app, AppState, MemoryStorage};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn router() -> Router {
    app(AppState::new(session_with(Arc::new(MemoryStorage::new()))))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn seed(app: &Router) {
    let (s, _) = call(
        app,
        Method::POST,
        "/api/v1/users",
        Some(json!({ "email": "ada@example.com", "name": "Ada", "lat": 1.0, "lng": 2.0, "formatted_address": "x" })),
    )
    .await;
    assert_eq!(s, StatusCode::CREATED);
    let (s, _) = call(app, Method::POST, "/api/v1/categories", Some(json!({ "name": "travel" }))).await;
    assert_eq!(s, StatusCode::CREATED);
    for slug in ["one", "two"] {
        let (s, _) = call(
            app,
            Method::POST,
            "/api/v1/posts",
            Some(json!({ "user_id": 1, "category_id": 1, "title": slug, "slug": slug, "html": "" })),
        )
        .await;
        assert_eq!(s, StatusCode::CREATED);
    }
    for slug in ["rust", "maps"] {
        call(app, Method::POST, "/api/v1/tags", Some(json!({ "slug": slug, "name": slug }))).await;
    }
}

#[tokio::test]
async fn health_and_version() {
    let app = router();
    let (s, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(s, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    let (s, body) = call(&app, Method::GET, "/version", None).await;
    assert_eq!(s, StatusCode::OK);
    assert_eq!(body["name"], "fieldnotes");
}

#[tokio::test]
async fn create_then_read_with_include() {
    let app = router();
    seed(&app).await;
    let (s, body) = call(&app, Method::GET, "/api/v1/posts/2?include=author,category", None).await;
    assert_eq!(s, StatusCode::OK);
    assert_eq!(body["data"]["slug"], "two");
    assert_eq!(body["data"]["author"]["email"], "ada@example.com");
    assert_eq!(body["data"]["category"]["name"], "travel");
    assert_eq!(body["meta"]["include"], json!(["author", "category"]));

    let (_, body) = call(&app, Method::GET, "/api/v1/posts/2", None).await;
    assert!(body.get("meta").is_none());

    let (s, body) = call(&app, Method::GET, "/api/v1/posts/99", None).await;
    assert_eq!(s, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn list_filters_and_counts() {
    let app = router();
    seed(&app).await;
    let (s, body) = call(&app, Method::GET, "/api/v1/posts?id__gt=1&include=author", None).await;
    assert_eq!(s, StatusCode::OK);
    assert_eq!(body["meta"]["count"], 1);
    assert_eq!(body["meta"]["include"], json!(["author"]));
    assert_eq!(body["data"][0]["slug"], "two");
    assert_eq!(body["data"][0]["author"]["name"], "Ada");

    let (_, body) = call(&app, Method::GET, "/api/v1/tags?slug__in=rust,maps&limit=1", None).await;
    assert_eq!(body["meta"]["count"], 1);
    assert!(body["meta"].get("include").is_none());
    assert_eq!(body["data"][0]["slug"], "rust");

    let (_, body) = call(&app, Method::GET, "/api/v1/added_locations?live=true", None).await;
    assert_eq!(body["meta"]["count"], 0);
    assert!(body["meta"]["live_at"].is_string());

    let (s, body) = call(&app, Method::GET, "/api/v1/posts?nickname=x", None).await;
    assert_eq!(s, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (s, _) = call(&app, Method::GET, "/api/v1/comments", None).await;
    assert_eq!(s, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn write_errors_map_to_statuses() {
    let app = router();
    seed(&app).await;
    let (s, body) = call(
        &app,
        Method::POST,
        "/api/v1/users",
        Some(json!({ "email": "ada@example.com", "name": "Twin", "lat": 0.0, "lng": 0.0, "formatted_address": "y" })),
    )
    .await;
    assert_eq!(s, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "duplicate_key");

    let (s, body) = call(&app, Method::PATCH, "/api/v1/users/1", Some(json!({ "name": "x".repeat(200) }))).await;
    assert_eq!(s, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");

    let (s, _) = call(&app, Method::POST, "/api/v1/categories", Some(json!([1, 2]))).await;
    assert_eq!(s, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patch_updates_columns() {
    let app = router();
    seed(&app).await;
    let (s, body) = call(&app, Method::PATCH, "/api/v1/categories/1", Some(json!({ "name": "trips" }))).await;
    assert_eq!(s, StatusCode::OK);
    assert_eq!(body["data"]["name"], "trips");
    let (_, body) = call(&app, Method::GET, "/api/v1/categories/1", None).await;
    assert_eq!(body["data"]["name"], "trips");
}

#[tokio::test]
async fn delete_honours_cascade_flag() {
    let app = router();
    seed(&app).await;
    let (s, body) = call(&app, Method::DELETE, "/api/v1/users/1", None).await;
    assert_eq!(s, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "constraint_violation");

    let (s, _) = call(&app, Method::DELETE, "/api/v1/users/1?cascade=true", None).await;
    assert_eq!(s, StatusCode::NO_CONTENT);
    let (_, body) = call(&app, Method::GET, "/api/v1/posts", None).await;
    assert_eq!(body["meta"]["count"], 0);
}

#[tokio::test]
async fn link_and_unlink_tags() {
    let app = router();
    seed(&app).await;
    let (s, _) = call(&app, Method::PUT, "/api/v1/posts/1/tags/2", None).await;
    assert_eq!(s, StatusCode::NO_CONTENT);
    let (s, _) = call(&app, Method::PUT, "/api/v1/posts/1/tags/1", None).await;
    assert_eq!(s, StatusCode::NO_CONTENT);

    let (_, body) = call(&app, Method::GET, "/api/v1/posts/1?include=tags", None).await;
    let slugs: Vec<&str> = body["data"]["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["slug"].as_str().unwrap())
        .collect();
    assert_eq!(slugs, vec!["rust", "maps"]);

    let (s, _) = call(&app, Method::DELETE, "/api/v1/posts/1/tags/1", None).await;
    assert_eq!(s, StatusCode::NO_CONTENT);
    let (s, body) = call(&app, Method::DELETE, "/api/v1/posts/1/tags/1", None).await;
    assert_eq!(s, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "link_not_found");

    let (s, _) = call(&app, Method::PUT, "/api/v1/posts/1/followers/1", None).await;
    assert_eq!(s, StatusCode::BAD_REQUEST);
}
