use serde::{Deserialize, Serialize};

/// Body of `POST /search`
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    /// 1-based rank, best match first
    pub rank: usize,
    pub path: String,
    pub filename: String,
    /// Squared L2 distance between query and image embedding
    pub distance: f32,
    /// `1 / (1 + distance)`, display sugar only
    pub score: f32,
    /// `data:image/png;base64,...` thumbnail for inline display
    pub image_data: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub total_images: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_images: usize,
    pub index_exists: bool,
    pub method: &'static str,
}
