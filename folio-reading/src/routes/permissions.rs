use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use folio_shared::clients::db::with_conn;
use folio_shared::errors::AppResult;
use folio_shared::types::auth::AuthUser;
use folio_shared::types::ApiResponse;

use super::{client_ip, ensure_owner};
use crate::models::{CustomPermission, PermissionType};
use crate::services::permission_service::{self, AccessGrant, PermissionGrant};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RevokeQuery {
    #[serde(default)]
    pub permission_type: PermissionType,
}

// --- PUT /users/:id/custom-permissions/:target_id ---

pub async fn grant_permission(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((user_id, target_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
    Json(payload): Json<PermissionGrant>,
) -> AppResult<Json<ApiResponse<CustomPermission>>> {
    ensure_owner(&user, user_id)?;

    let ip = client_ip(&headers);
    let permission = with_conn(&state.db, move |conn| {
        permission_service::grant_permission(conn, user_id, target_id, &payload, ip)
    })
    .await?;

    Ok(Json(ApiResponse::ok(permission)))
}

// --- DELETE /users/:id/custom-permissions/:target_id?permission_type= ---

pub async fn revoke_permission(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((user_id, target_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<RevokeQuery>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<()>>> {
    ensure_owner(&user, user_id)?;

    let ip = client_ip(&headers);
    with_conn(&state.db, move |conn| {
        permission_service::revoke_permission(conn, user_id, target_id, query.permission_type, ip)
    })
    .await?;

    Ok(Json(ApiResponse::ok_with_message((), "permission revoked")))
}

// --- GET /users/:id/access ---

pub async fn users_with_access(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<AccessGrant>>>> {
    ensure_owner(&user, user_id)?;

    let grants = with_conn(&state.db, move |conn| permission_service::users_with_access(conn, user_id)).await?;

    Ok(Json(ApiResponse::ok(grants)))
}
