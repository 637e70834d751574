use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use folio_shared::clients::db::with_conn;
use folio_shared::errors::AppResult;
use folio_shared::types::auth::AuthUser;
use folio_shared::types::ApiResponse;

use super::{client_ip, ensure_owner};
use crate::models::UpdatePrivacySettings;
use crate::services::privacy_service::{self, PrivacyAuditSummary, PrivacySettingsView, PrivacyStats};
use crate::AppState;

// --- GET /users/:id/privacy-settings ---

pub async fn get_privacy_settings(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PrivacySettingsView>>> {
    ensure_owner(&user, user_id)?;

    let settings = with_conn(&state.db, move |conn| privacy_service::get_settings(conn, user_id)).await?;

    Ok(Json(ApiResponse::ok(settings)))
}

// --- PUT /users/:id/privacy-settings ---

pub async fn update_privacy_settings(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UpdatePrivacySettings>,
) -> AppResult<Json<ApiResponse<PrivacySettingsView>>> {
    ensure_owner(&user, user_id)?;
    privacy_service::validate_update(&payload)?;

    let ip = client_ip(&headers);
    let settings = with_conn(&state.db, move |conn| {
        privacy_service::update_settings(conn, user_id, &payload, ip)
    })
    .await?;

    Ok(Json(ApiResponse::ok(settings)))
}

// --- POST /users/:id/privacy-settings/reset ---

pub async fn reset_privacy_settings(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<PrivacySettingsView>>> {
    ensure_owner(&user, user_id)?;

    let ip = client_ip(&headers);
    let settings = with_conn(&state.db, move |conn| {
        privacy_service::update_settings(conn, user_id, &privacy_service::default_update(), ip)
    })
    .await?;

    Ok(Json(ApiResponse::ok_with_message(settings, "privacy settings reset to defaults")))
}

// --- GET /users/:id/privacy-stats ---

pub async fn get_privacy_stats(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PrivacyStats>>> {
    ensure_owner(&user, user_id)?;

    let stats = with_conn(&state.db, move |conn| privacy_service::privacy_stats(conn, user_id)).await?;

    Ok(Json(ApiResponse::ok(stats)))
}

// --- GET /users/:id/privacy-audit ---

pub async fn get_privacy_audit(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PrivacyAuditSummary>>> {
    ensure_owner(&user, user_id)?;

    let summary = with_conn(&state.db, move |conn| privacy_service::audit_summary(conn, user_id)).await?;

    Ok(Json(ApiResponse::ok(summary)))
}
