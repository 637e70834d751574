pub mod currently_reading;
pub mod health;
pub mod permissions;
pub mod privacy;
pub mod progress;

use axum::http::HeaderMap;
use uuid::Uuid;

use folio_shared::errors::{AppError, AppResult};
use folio_shared::types::auth::AuthUser;

/// Settings, stats, grants and audit are visible to their owner only.
pub(crate) fn ensure_owner(user: &AuthUser, user_id: Uuid) -> AppResult<()> {
    if user.id != user_id {
        return Err(AppError::forbidden("access denied"));
    }
    Ok(())
}

/// Client address for audit rows, from the proxy headers.
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
