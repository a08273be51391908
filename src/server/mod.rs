mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;

pub use self::state::*;

/// Request body ceiling enforced by the serving layer
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(api::home_handler))
        .route("/upload", post(api::upload_handler))
        .route("/search", post(api::search_handler))
        .route("/stats", get(api::stats_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use image::{ImageFormat, RgbImage};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::config::DataDir;
    use crate::store::ImageStore;
    use crate::store::tests::stub_embedder;

    const BOUNDARY: &str = "imquery-test-boundary";

    fn test_state(root: &TempDir) -> Arc<AppState> {
        let data_dir: DataDir = root.path().join("data").to_str().unwrap().parse().unwrap();
        let mut store =
            ImageStore::new(data_dir, root.path().join("images"), Box::new(stub_embedder()));
        store.load_or_rebuild().unwrap();
        AppState::new(store)
    }

    /// 1x1 PNG, which the stub embedder maps to the cat vector
    fn cat_png() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        RgbImage::new(1, 1).write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn multipart_request(field: &str, filename: Option<&str>, content: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\r\n",
                    field, name
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", field).as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn response_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upload_without_file_field_is_rejected() {
        let root = TempDir::new().unwrap();
        let state = test_state(&root);

        let response = create_app(state)
            .oneshot(multipart_request("other", Some("cat.png"), &cat_png()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response_json(response).await["error"], "No file provided");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upload_without_filename_is_rejected() {
        let root = TempDir::new().unwrap();
        let state = test_state(&root);

        let response = create_app(state)
            .oneshot(multipart_request("file", Some(""), &cat_png()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response_json(response).await["error"], "No file selected");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disallowed_extension_is_rejected_without_rebuild() {
        let root = TempDir::new().unwrap();
        let state = test_state(&root);
        let app = create_app(state);

        let response = app
            .clone()
            .oneshot(multipart_request("file", Some("notes.txt"), b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response_json(response).await["error"], "Invalid file type");

        let response =
            app.oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap()).await.unwrap();
        let stats = response_json(response).await;
        assert_eq!(stats["total_images"], 0);
        assert_eq!(stats["index_exists"], false);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn search_with_empty_query_is_rejected() {
        let root = TempDir::new().unwrap();
        let state = test_state(&root);

        let response = create_app(state)
            .oneshot(json_request("/search", r#"{"query": "  "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response_json(response).await["error"], "No query provided");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn search_with_empty_index_is_rejected() {
        let root = TempDir::new().unwrap();
        let state = test_state(&root);

        let response = create_app(state)
            .oneshot(json_request("/search", r#"{"query": "a photo of a cat"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response_json(response).await["error"], "No images indexed yet");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upload_then_search_round_trip() {
        let root = TempDir::new().unwrap();
        let state = test_state(&root);
        let app = create_app(state);

        let response = app
            .clone()
            .oneshot(multipart_request("file", Some("cat.png"), &cat_png()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["total_images"], 1);

        let response = app
            .clone()
            .oneshot(json_request("/search", r#"{"query": "a photo of a cat"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["rank"], 1);
        assert_eq!(results[0]["filename"], "cat.png");
        assert!(results[0]["score"].as_f64().unwrap() > 0.);
        assert!(
            results[0]["image_data"].as_str().unwrap().starts_with("data:image/png;base64,")
        );

        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let stats = response_json(response).await;
        assert_eq!(stats["total_images"], 1);
        assert_eq!(stats["index_exists"], true);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn colliding_upload_names_get_a_counter_suffix() {
        let root = TempDir::new().unwrap();
        let state = test_state(&root);
        let app = create_app(state);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(multipart_request("file", Some("cat.png"), &cat_png()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let images = root.path().join("images");
        assert!(images.join("cat.png").exists());
        assert!(images.join("cat_1.png").exists());

        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response_json(response).await["total_images"], 2);
    }
}
