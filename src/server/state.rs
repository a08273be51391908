use std::sync::Arc;

use tokio::sync::RwLock;

use crate::store::ImageStore;

/// Shared application state.
///
/// Searches take the read half of the lock; uploads take the write half for
/// the whole rebuild, so concurrent uploads serialize instead of racing.
pub struct AppState {
    pub store: RwLock<ImageStore>,
}

impl AppState {
    pub fn new(store: ImageStore) -> Arc<Self> {
        Arc::new(AppState { store: RwLock::new(store) })
    }
}
