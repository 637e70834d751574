use async_trait::async_trait;
use diesel::prelude::*;
use uuid::Uuid;

use folio_shared::clients::db::{with_conn, DbPool};
use folio_shared::errors::AppResult;

use super::{ProgressRecord, ReadingGate};
use crate::models::{BookSummary, PrivacySettings, ReadingProgress, ReadingStatus};
use crate::schema::{books, follow_target_types, follows, reading_progress, user_friends, user_privacy_settings};

/// Follow target type that scopes user-to-user follows.
pub const USER_TARGET_TYPE: &str = "user";

/// Read side of visibility resolution. Every method is a plain read; errors
/// must be returned, never papered over with a permissive default.
#[async_trait]
pub trait VisibilityStore: Send + Sync {
    /// The owner's account-wide gate, `None` when no settings row exists.
    async fn reading_gate(&self, owner_id: Uuid) -> AppResult<Option<ReadingGate>>;

    /// Accepted friendship in either direction.
    async fn is_friend(&self, viewer_id: Uuid, owner_id: Uuid) -> AppResult<bool>;

    /// `viewer_id` follows `owner_id` as a user. False when the user target type is unknown.
    async fn is_follower(&self, viewer_id: Uuid, owner_id: Uuid) -> AppResult<bool>;

    /// The owner's in-progress records, most recently updated first.
    async fn in_progress_records(&self, owner_id: Uuid) -> AppResult<Vec<ProgressRecord>>;

    /// Books that exist among `book_ids`, in no particular order.
    async fn books(&self, book_ids: &[Uuid]) -> AppResult<Vec<BookSummary>>;
}

#[derive(Clone)]
pub struct PgVisibilityStore {
    pool: DbPool,
}

impl PgVisibilityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VisibilityStore for PgVisibilityStore {
    async fn reading_gate(&self, owner_id: Uuid) -> AppResult<Option<ReadingGate>> {
        with_conn(&self.pool, move |conn| {
            let settings = user_privacy_settings::table
                .filter(user_privacy_settings::user_id.eq(owner_id))
                .select(PrivacySettings::as_select())
                .first(conn)
                .optional()?;
            Ok(settings.as_ref().map(ReadingGate::from))
        })
        .await
    }

    async fn is_friend(&self, viewer_id: Uuid, owner_id: Uuid) -> AppResult<bool> {
        with_conn(&self.pool, move |conn| {
            let count: i64 = user_friends::table
                .filter(user_friends::status.eq("accepted"))
                .filter(
                    user_friends::user_id.eq(viewer_id).and(user_friends::friend_id.eq(owner_id))
                        .or(user_friends::user_id.eq(owner_id).and(user_friends::friend_id.eq(viewer_id))),
                )
                .count()
                .get_result(conn)?;
            Ok(count > 0)
        })
        .await
    }

    async fn is_follower(&self, viewer_id: Uuid, owner_id: Uuid) -> AppResult<bool> {
        with_conn(&self.pool, move |conn| {
            let target_type: Option<i32> = follow_target_types::table
                .filter(follow_target_types::name.eq(USER_TARGET_TYPE))
                .select(follow_target_types::id)
                .first(conn)
                .optional()?;

            let Some(target_type_id) = target_type else {
                tracing::warn!("follow target type 'user' missing, treating viewer as non-follower");
                return Ok(false);
            };

            let count: i64 = follows::table
                .filter(follows::follower_id.eq(viewer_id))
                .filter(follows::following_id.eq(owner_id))
                .filter(follows::target_type_id.eq(target_type_id))
                .count()
                .get_result(conn)?;
            Ok(count > 0)
        })
        .await
    }

    async fn in_progress_records(&self, owner_id: Uuid) -> AppResult<Vec<ProgressRecord>> {
        with_conn(&self.pool, move |conn| {
            let rows = reading_progress::table
                .filter(reading_progress::user_id.eq(owner_id))
                .filter(reading_progress::status.eq(ReadingStatus::InProgress.as_str()))
                .order(reading_progress::updated_at.desc())
                .select(ReadingProgress::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(ProgressRecord::from).collect())
        })
        .await
    }

    async fn books(&self, book_ids: &[Uuid]) -> AppResult<Vec<BookSummary>> {
        let book_ids = book_ids.to_vec();
        with_conn(&self.pool, move |conn| {
            let found = books::table
                .filter(books::id.eq_any(&book_ids))
                .select(BookSummary::as_select())
                .load(conn)?;
            Ok(found)
        })
        .await
    }
}
