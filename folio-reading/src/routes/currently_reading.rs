use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use folio_shared::middleware::OptionalAuthUser;
use folio_shared::types::ApiResponse;

use crate::visibility::CurrentlyReading;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CurrentlyReadingResponse {
    /// Size of the full visible set.
    pub total: usize,
    /// First `currently_reading_cap` entries of the visible set.
    pub items: Vec<CurrentlyReading>,
}

// --- GET /users/:id/currently-reading ---

/// Resolver errors are logged and shown as an empty shelf, never as partial data.
pub async fn get_currently_reading(
    OptionalAuthUser(viewer): OptionalAuthUser,
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<Uuid>,
) -> Json<ApiResponse<CurrentlyReadingResponse>> {
    let viewer_id = viewer.map(|v| v.id);

    let visible = match state.visibility.resolve(owner_id, viewer_id).await {
        Ok(visible) => visible,
        Err(e) => {
            tracing::error!(error = %e, owner_id = %owner_id, viewer_id = ?viewer_id, "currently reading resolution failed");
            Vec::new()
        }
    };

    let total = visible.len();
    let items = visible.into_iter().take(state.config.currently_reading_cap).collect();

    Json(ApiResponse::ok(CurrentlyReadingResponse { total, items }))
}
