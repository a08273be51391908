use std::fs;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, State};
use axum::response::Html;
use log::info;
use tokio::task::block_in_place;

use super::error::{ApiError, Result};
use super::state::AppState;
use super::types::*;
use crate::config::is_allowed_file;
use crate::utils;

/// Static search page
pub async fn home_handler() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

/// Accept an image upload, save it into the image folder and rebuild the
/// index before answering with the new total.
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut upload = None;
    while let Some(field) =
        multipart.next_field().await.map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("").to_string();
        let data = field.bytes().await.map_err(|e| ApiError::bad_request(e.to_string()))?;
        upload = Some((filename, data));
        break;
    }

    let Some((filename, data)) = upload else {
        return Err(ApiError::bad_request("No file provided"));
    };
    if filename.is_empty() {
        return Err(ApiError::bad_request("No file selected"));
    }
    let filename = utils::sanitize_filename(&filename);
    if !is_allowed_file(&filename) {
        return Err(ApiError::bad_request("Invalid file type"));
    }

    // write lock held across save + rebuild: uploads serialize here
    let mut store = state.store.write().await;
    fs::create_dir_all(store.images_dir())?;
    let destination = utils::unique_destination(store.images_dir(), &filename);
    fs::write(&destination, &data)?;
    info!("saved upload to {}", destination.display());

    block_in_place(|| store.rebuild())?;

    Ok(Json(UploadResponse {
        success: true,
        message: "Image uploaded and indexed successfully".to_string(),
        total_images: store.len(),
    }))
}

/// Embed the query text and return the best-matching image.
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let query = request.query.unwrap_or_default().trim().to_string();
    if query.is_empty() {
        return Err(ApiError::bad_request("No query provided"));
    }

    let store = state.store.read().await;
    if store.is_empty() {
        return Err(ApiError::bad_request("No images indexed yet"));
    }

    info!("searching for {:?}", query);
    let hits = block_in_place(|| store.search(&query, 1))?;

    let mut results = Vec::with_capacity(hits.len());
    for (rank, hit) in hits.iter().enumerate() {
        let image_data = block_in_place(|| utils::thumbnail_data_uri(&hit.path))?;
        results.push(SearchResult {
            rank: rank + 1,
            path: hit.path.display().to_string(),
            filename: hit
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            distance: hit.distance,
            score: utils::similarity_score(hit.distance),
            image_data,
        });
    }

    Ok(Json(SearchResponse { results }))
}

pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let store = state.store.read().await;
    Json(StatsResponse {
        total_images: store.len(),
        index_exists: !store.is_empty(),
        method: "L2 distance (flat index)",
    })
}
