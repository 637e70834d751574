use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{books, custom_permissions, privacy_audit_log, reading_progress, user_privacy_settings};

// --- Privacy level ---

/// Audience of a single reading-progress record, and the seed for new records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    #[default]
    Private,
    Friends,
    Followers,
    Public,
}

impl PrivacyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyLevel::Private => "private",
            PrivacyLevel::Friends => "friends",
            PrivacyLevel::Followers => "followers",
            PrivacyLevel::Public => "public",
        }
    }

    /// Reads a stored value. Anything unrecognised is treated as private.
    pub fn from_stored(value: &str) -> Self {
        value.parse().unwrap_or(PrivacyLevel::Private)
    }
}

impl std::fmt::Display for PrivacyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PrivacyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(PrivacyLevel::Private),
            "friends" => Ok(PrivacyLevel::Friends),
            "followers" => Ok(PrivacyLevel::Followers),
            "public" => Ok(PrivacyLevel::Public),
            _ => Err(format!("unknown privacy level: {s}")),
        }
    }
}

// --- Reading status ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    NotStarted,
    InProgress,
    Completed,
    OnHold,
    Abandoned,
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::NotStarted => "not_started",
            ReadingStatus::InProgress => "in_progress",
            ReadingStatus::Completed => "completed",
            ReadingStatus::OnHold => "on_hold",
            ReadingStatus::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Book ---

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, PartialEq)]
#[diesel(table_name = books)]
pub struct BookSummary {
    pub id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub cover_image_url: Option<String>,
    pub pages: Option<i32>,
}

// --- Privacy settings ---

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = user_privacy_settings)]
pub struct PrivacySettings {
    pub id: Uuid,
    pub user_id: Uuid,
    pub default_privacy_level: String,
    pub allow_public_reading_profile: bool,
    pub allow_friends_to_see_reading: bool,
    pub allow_followers_to_see_reading: bool,
    pub show_reading_stats_publicly: bool,
    pub show_currently_reading_publicly: bool,
    pub show_reading_history_publicly: bool,
    pub show_reading_goals_publicly: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_privacy_settings)]
pub struct NewPrivacySettings {
    pub user_id: Uuid,
    pub default_privacy_level: String,
    pub allow_public_reading_profile: bool,
    pub allow_friends_to_see_reading: bool,
    pub allow_followers_to_see_reading: bool,
    pub show_reading_stats_publicly: bool,
    pub show_currently_reading_publicly: bool,
    pub show_reading_history_publicly: bool,
    pub show_reading_goals_publicly: bool,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, AsChangeset, Deserialize, Serialize, Default)]
#[diesel(table_name = user_privacy_settings)]
pub struct UpdatePrivacySettings {
    pub default_privacy_level: Option<String>,
    pub allow_public_reading_profile: Option<bool>,
    pub allow_friends_to_see_reading: Option<bool>,
    pub allow_followers_to_see_reading: Option<bool>,
    pub show_reading_stats_publicly: Option<bool>,
    pub show_currently_reading_publicly: Option<bool>,
    pub show_reading_history_publicly: Option<bool>,
    pub show_reading_goals_publicly: Option<bool>,
}

// --- Reading progress ---

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = reading_progress)]
pub struct ReadingProgress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Option<Uuid>,
    pub status: String,
    pub current_page: Option<i32>,
    pub total_pages: Option<i32>,
    pub percentage: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub finish_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub privacy_level: String,
    pub allow_friends: bool,
    pub allow_followers: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = reading_progress)]
pub struct NewReadingProgress {
    pub user_id: Uuid,
    pub book_id: Option<Uuid>,
    pub status: String,
    pub current_page: Option<i32>,
    pub total_pages: Option<i32>,
    pub percentage: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub finish_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub privacy_level: String,
    pub allow_friends: bool,
    pub allow_followers: bool,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = reading_progress)]
pub struct ReadingProgressChanges {
    pub status: String,
    pub current_page: Option<i32>,
    pub total_pages: Option<i32>,
    pub percentage: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub finish_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub privacy_level: Option<String>,
    pub allow_friends: Option<bool>,
    pub allow_followers: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

// --- Audit ---

#[derive(Debug, Insertable)]
#[diesel(table_name = privacy_audit_log)]
pub struct NewPrivacyAuditEntry {
    pub user_id: Uuid,
    pub action_type: String,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = privacy_audit_log)]
pub struct PrivacyAuditEntry {
    pub id: Uuid,
    pub action_type: String,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

// --- Custom permissions ---

/// What a per-user grant covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionType {
    #[default]
    ProfileView,
    ReadingProgress,
    ReadingStats,
    ReadingHistory,
}

impl PermissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionType::ProfileView => "profile_view",
            PermissionType::ReadingProgress => "reading_progress",
            PermissionType::ReadingStats => "reading_stats",
            PermissionType::ReadingHistory => "reading_history",
        }
    }
}

impl std::fmt::Display for PermissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = custom_permissions)]
pub struct CustomPermission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub target_user_id: Uuid,
    pub permission_type: String,
    pub permission_level: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = custom_permissions)]
pub struct NewCustomPermission {
    pub user_id: Uuid,
    pub target_user_id: Uuid,
    pub permission_type: String,
    pub permission_level: String,
    pub expires_at: Option<DateTime<Utc>>,
}
