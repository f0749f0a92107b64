use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.uploads.max_upload_size as usize;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        // Internal
        .route("/_internal/health", get(handlers::health))
        // Uploaded files
        .route("/uploads/*name", get(handlers::serve_upload))
        // Collections
        .route("/:collection", get(handlers::list_records))
        .route(
            "/:collection",
            post(handlers::create_record).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/:collection/:id", patch(handlers::update_record))
        .route("/:collection/:id", delete(handlers::delete_record))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::create_router;
    use crate::testutil::test_state;
    use crate::uploads::UploadStore;

    const BOUNDARY: &str = "XBOUNDARYX";

    async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    /// Text parts are `(name, value)`, file parts are `(name, filename, bytes)`.
    fn multipart_request(uri: &str, texts: &[(&str, &str)], files: &[(&str, &str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, value) in texts {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        for (name, filename, content) in files {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir).await);

        let (status, body) = send(&app, empty_request("GET", "/_internal/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["status"], "ok");
    }

    #[tokio::test]
    async fn test_json_crud_flow() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir).await);

        let (status, body) = send(&app, empty_request("GET", "/downloads")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "fail");

        let (status, body) =
            send(&app, json_request("POST", "/downloads", json!({"title": "x"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"], json!({"id": 1, "title": "x"}));

        let (status, body) =
            send(&app, json_request("POST", "/downloads", json!({"title": "y"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["id"], 2);

        let (status, body) = send(
            &app,
            json_request("PATCH", "/downloads/2", json!({"title": "z", "size": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!({"id": 2, "title": "z", "size": 3}));

        let (status, body) = send(&app, empty_request("DELETE", "/downloads/1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["message"], "Record deleted");

        let (status, body) = send(&app, empty_request("GET", "/downloads")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([{"id": 2, "title": "z", "size": 3}]));
    }

    #[tokio::test]
    async fn test_form_urlencoded_create() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir).await);

        let request = Request::builder()
            .method("POST")
            .uri("/users")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=Ana&city=Recife"))
            .unwrap();

        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"], json!({"id": 1, "name": "Ana", "city": "Recife"}));
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir).await);

        let (status, body) =
            send(&app, json_request("POST", "/nope", json!({"title": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "fail");

        let (status, _) =
            send(&app, json_request("PATCH", "/users/7", json!({"name": "x"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, empty_request("DELETE", "/users/7")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, empty_request("DELETE", "/users/abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, empty_request("DELETE", "/users/0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, json_request("POST", "/users", json!([1, 2]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_multipart_create_serve_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let app = create_router(state.clone());

        let request = multipart_request(
            "/aplicativos",
            &[("name", "App")],
            &[("arquivo", "app.apk", "apk-bytes")],
        );
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["id"], 1);
        assert_eq!(body["data"]["name"], "App");
        assert_eq!(body["data"]["filename"], Value::Null);

        let stored = body["data"]["arquivo"].as_str().unwrap().to_string();
        assert!(stored.ends_with("_app.apk"));
        assert!(state.uploads.exists(&stored).await.unwrap());

        let response = app
            .clone()
            .oneshot(empty_request("GET", &format!("/uploads/{stored}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"apk-bytes");

        let (status, _) = send(&app, empty_request("DELETE", "/aplicativos/1")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!state.uploads.exists(&stored).await.unwrap());

        let (status, _) = send(&app, empty_request("GET", &format!("/uploads/{stored}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_multipart_ignores_unconfigured_file_parts() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let app = create_router(state.clone());

        let request = multipart_request(
            "/publicidadesdb",
            &[("title", "Ad")],
            &[("arquivo", "skip.bin", "x"), ("filename", "ad.png", "png")],
        );
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["data"].get("arquivo").is_none());
        assert!(body["data"]["filename"].as_str().unwrap().ends_with("_ad.png"));

        let stored: Vec<_> = std::fs::read_dir(dir.path().join("arquivos"))
            .unwrap()
            .collect();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_multipart_unknown_collection_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir).await);

        let request = multipart_request("/nope", &[("title", "x")], &[("filename", "a.png", "png")]);
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let stored = std::fs::read_dir(dir.path().join("arquivos")).unwrap().count();
        assert_eq!(stored, 0);
    }

    #[tokio::test]
    async fn test_form_urlencoded_update() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir).await);

        let (status, _) = send(
            &app,
            json_request("POST", "/downloads", json!({"title": "x", "size": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let request = Request::builder()
            .method("PATCH")
            .uri("/downloads/1")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("title=z"))
            .unwrap();

        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!({"id": 1, "title": "z", "size": 3}));
    }

    #[tokio::test]
    async fn test_write_failures_return_500() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir).await);

        let (status, _) =
            send(&app, json_request("POST", "/aplicativos", json!({"name": "App"}))).await;
        assert_eq!(status, StatusCode::CREATED);

        // Replace the document with a directory so every rewrite fails.
        std::fs::remove_file(dir.path().join("db.json")).unwrap();
        std::fs::create_dir(dir.path().join("db.json")).unwrap();

        let request = multipart_request(
            "/aplicativos",
            &[("name", "Other")],
            &[("arquivo", "other.apk", "apk-bytes")],
        );
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");

        // The upload written for the failed create is gone again.
        let stored = std::fs::read_dir(dir.path().join("arquivos")).unwrap().count();
        assert_eq!(stored, 0);

        let (status, body) =
            send(&app, json_request("PATCH", "/aplicativos/1", json!({"name": "New"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");

        let (status, body) = send(&app, empty_request("DELETE", "/aplicativos/1")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");

        let (status, body) = send(&app, empty_request("GET", "/aplicativos")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([{"id": 1, "name": "App", "arquivo": null, "filename": null}]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_uploads_with_same_name() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let app = create_router(state.clone());

        let mut handles = Vec::new();
        for i in 0..40 {
            let app = app.clone();
            handles.push(tokio::spawn(async move {
                let content = format!("ad-{i}");
                let request = multipart_request(
                    "/publicidadesdb",
                    &[("title", content.as_str())],
                    &[("filename", "ad.png", content.as_str())],
                );
                send(&app, request).await
            }));
        }

        for handle in handles {
            let (status, _) = handle.await.unwrap();
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, body) = send(&app, empty_request("GET", "/publicidadesdb")).await;
        let records = body["data"].as_array().unwrap();
        assert_eq!(records.len(), 40);

        let names: std::collections::HashSet<_> = records
            .iter()
            .map(|r| r["filename"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names.len(), 40);

        let stored = std::fs::read_dir(dir.path().join("arquivos")).unwrap().count();
        assert_eq!(stored, 40);

        // Every record points at its own bytes.
        for record in records {
            let name = record["filename"].as_str().unwrap();
            let data = state.uploads.get(name).await.unwrap();
            assert_eq!(&data[..], record["title"].as_str().unwrap().as_bytes());
        }
    }
}
