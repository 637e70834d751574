use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use folio_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{
    NewReadingProgress, PrivacyLevel, ReadingProgress, ReadingProgressChanges, ReadingStatus,
};
use crate::schema::{books, reading_progress};
use crate::services::privacy_service;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProgressUpdate {
    pub status: ReadingStatus,
    #[validate(range(min = 0, message = "current_page must not be negative"))]
    pub current_page: Option<i32>,
    #[validate(range(min = 0, message = "total_pages must not be negative"))]
    pub total_pages: Option<i32>,
    #[validate(length(max = 2000, message = "notes must be at most 2000 characters"))]
    pub notes: Option<String>,
    pub privacy_level: Option<String>,
    pub allow_friends: Option<bool>,
    pub allow_followers: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct VisibilityUpdate {
    pub privacy_level: Option<String>,
    pub allow_friends: Option<bool>,
    pub allow_followers: Option<bool>,
}

/// Fields computed from a status/page change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedFields {
    pub percentage: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub finish_date: Option<DateTime<Utc>>,
}

/// Percentage complete, capped at 100. Needs a non-zero current page and a positive total.
pub fn percentage(current_page: Option<i32>, total_pages: Option<i32>) -> Option<i32> {
    match (current_page, total_pages) {
        (Some(current), Some(total)) if current > 0 && total > 0 => {
            let pct = (f64::from(current) / f64::from(total) * 100.0).round() as i32;
            Some(pct.min(100))
        }
        _ => None,
    }
}

/// Start date is stamped the first time a record is in progress, finish date the
/// first time it is completed. Existing dates are never overwritten.
pub fn derive_fields(
    update: &ProgressUpdate,
    existing: Option<&ReadingProgress>,
    now: DateTime<Utc>,
) -> DerivedFields {
    let existing_start = existing.and_then(|p| p.start_date);
    let existing_finish = existing.and_then(|p| p.finish_date);

    let start_date = match (update.status, existing_start) {
        (ReadingStatus::InProgress, None) => Some(now),
        _ => None,
    };
    let finish_date = match (update.status, existing_finish) {
        (ReadingStatus::Completed, None) => Some(now),
        _ => None,
    };

    DerivedFields {
        percentage: percentage(update.current_page, update.total_pages),
        start_date,
        finish_date,
    }
}

fn parse_level(level: Option<&String>) -> AppResult<Option<PrivacyLevel>> {
    level
        .map(|l| {
            l.parse::<PrivacyLevel>()
                .map_err(|_| AppError::new(ErrorCode::InvalidPrivacyLevel, format!("invalid privacy level: {l}")))
        })
        .transpose()
}

fn validate_pages(update: &ProgressUpdate) -> AppResult<()> {
    if let (Some(current), Some(total)) = (update.current_page, update.total_pages) {
        if current > total {
            return Err(AppError::with_details(
                ErrorCode::InvalidPageRange,
                "current_page cannot exceed total_pages",
                serde_json::json!({ "current_page": current, "total_pages": total }),
            ));
        }
    }
    Ok(())
}

pub fn find_progress(conn: &mut PgConnection, user_id: Uuid, book_id: Uuid) -> AppResult<Option<ReadingProgress>> {
    let progress = reading_progress::table
        .filter(reading_progress::user_id.eq(user_id))
        .filter(reading_progress::book_id.eq(book_id))
        .select(ReadingProgress::as_select())
        .first(conn)
        .optional()?;
    Ok(progress)
}

/// Creates or updates the user's record for a book. New records take their
/// privacy level from the request, else from the user's default level.
pub fn upsert_progress(
    conn: &mut PgConnection,
    user_id: Uuid,
    book_id: Uuid,
    update: &ProgressUpdate,
) -> AppResult<ReadingProgress> {
    update.validate()?;
    validate_pages(update)?;
    let requested_level = parse_level(update.privacy_level.as_ref())?;

    let book_exists: i64 = books::table
        .filter(books::id.eq(book_id))
        .count()
        .get_result(conn)?;
    if book_exists == 0 {
        return Err(AppError::new(ErrorCode::BookNotFound, "book not found"));
    }

    let saved = match write_progress(conn, user_id, book_id, update, requested_level) {
        // A concurrent request inserted the row first; the second pass updates it.
        Err(e) if e.is_unique_violation() => {
            tracing::debug!(user_id = %user_id, book_id = %book_id, "progress insert raced, retrying as update");
            write_progress(conn, user_id, book_id, update, requested_level)?
        }
        other => other?,
    };

    tracing::info!(
        user_id = %user_id,
        book_id = %book_id,
        status = %update.status,
        "reading progress saved"
    );
    Ok(saved)
}

fn write_progress(
    conn: &mut PgConnection,
    user_id: Uuid,
    book_id: Uuid,
    update: &ProgressUpdate,
    requested_level: Option<PrivacyLevel>,
) -> AppResult<ReadingProgress> {
    let now = Utc::now();
    let existing = find_progress(conn, user_id, book_id)?;
    let derived = derive_fields(update, existing.as_ref(), now);

    let saved = match existing {
        Some(existing) => {
            let changes = ReadingProgressChanges {
                status: update.status.to_string(),
                current_page: update.current_page,
                total_pages: update.total_pages,
                percentage: derived.percentage,
                start_date: derived.start_date,
                finish_date: derived.finish_date,
                notes: update.notes.clone(),
                privacy_level: requested_level.map(|l| l.to_string()),
                allow_friends: update.allow_friends,
                allow_followers: update.allow_followers,
                updated_at: now,
            };
            diesel::update(reading_progress::table.find(existing.id))
                .set(&changes)
                .returning(ReadingProgress::as_returning())
                .get_result(conn)?
        }
        None => {
            let level = match requested_level {
                Some(level) => level,
                None => privacy_service::default_level_for(conn, user_id)?,
            };
            let new_progress = NewReadingProgress {
                user_id,
                book_id: Some(book_id),
                status: update.status.to_string(),
                current_page: update.current_page,
                total_pages: update.total_pages,
                percentage: derived.percentage,
                start_date: derived.start_date,
                finish_date: derived.finish_date,
                notes: update.notes.clone(),
                privacy_level: level.to_string(),
                allow_friends: update.allow_friends.unwrap_or(false),
                allow_followers: update.allow_followers.unwrap_or(false),
            };
            diesel::insert_into(reading_progress::table)
                .values(&new_progress)
                .returning(ReadingProgress::as_returning())
                .get_result(conn)?
        }
    };
    Ok(saved)
}

pub fn delete_progress(conn: &mut PgConnection, user_id: Uuid, book_id: Uuid) -> AppResult<()> {
    let deleted = diesel::delete(
        reading_progress::table
            .filter(reading_progress::user_id.eq(user_id))
            .filter(reading_progress::book_id.eq(book_id)),
    )
    .execute(conn)?;

    if deleted == 0 {
        return Err(AppError::new(ErrorCode::ProgressNotFound, "reading progress not found"));
    }
    tracing::info!(user_id = %user_id, book_id = %book_id, "reading progress deleted");
    Ok(())
}

/// Edits the audience of one record. Independent of the owner's global settings.
pub fn update_visibility(
    conn: &mut PgConnection,
    user_id: Uuid,
    book_id: Uuid,
    update: &VisibilityUpdate,
    ip_address: Option<String>,
) -> AppResult<ReadingProgress> {
    let level = parse_level(update.privacy_level.as_ref())?;

    let existing = find_progress(conn, user_id, book_id)?
        .ok_or_else(|| AppError::new(ErrorCode::ProgressNotFound, "reading progress not found"))?;

    let updated = diesel::update(reading_progress::table.find(existing.id))
        .set((
            level.map(|l| reading_progress::privacy_level.eq(l.to_string())),
            update.allow_friends.map(|v| reading_progress::allow_friends.eq(v)),
            update.allow_followers.map(|v| reading_progress::allow_followers.eq(v)),
            reading_progress::updated_at.eq(Utc::now()),
        ))
        .returning(ReadingProgress::as_returning())
        .get_result(conn)?;

    privacy_service::record_audit(
        conn,
        user_id,
        privacy_service::ACTION_VISIBILITY_UPDATED,
        serde_json::json!({
            "reading_progress_id": updated.id,
            "before": {
                "privacy_level": existing.privacy_level,
                "allow_friends": existing.allow_friends,
                "allow_followers": existing.allow_followers,
            },
            "after": {
                "privacy_level": updated.privacy_level,
                "allow_friends": updated.allow_friends,
                "allow_followers": updated.allow_followers,
            },
        }),
        ip_address,
    );

    Ok(updated)
}
