use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use folio_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{
    NewPrivacyAuditEntry, NewPrivacySettings, PrivacyAuditEntry, PrivacyLevel, PrivacySettings,
    UpdatePrivacySettings,
};
use crate::schema::{privacy_audit_log, reading_progress, user_privacy_settings};

pub const ACTION_SETTINGS_UPDATED: &str = "privacy_settings_updated";
pub const ACTION_VISIBILITY_UPDATED: &str = "reading_visibility_updated";
pub const ACTION_PERMISSION_GRANTED: &str = "permission_granted";
pub const ACTION_PERMISSION_REVOKED: &str = "permission_revoked";

/// Audit rows scanned when summarising.
const AUDIT_WINDOW: i64 = 50;
/// Audit rows returned as recent activity.
const RECENT_ACTIVITY: usize = 10;

/// Settings as returned to the owner. Stored row, or defaults when none exists yet.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PrivacySettingsView {
    pub default_privacy_level: PrivacyLevel,
    pub allow_public_reading_profile: bool,
    pub allow_friends_to_see_reading: bool,
    pub allow_followers_to_see_reading: bool,
    pub show_reading_stats_publicly: bool,
    pub show_currently_reading_publicly: bool,
    pub show_reading_history_publicly: bool,
    pub show_reading_goals_publicly: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for PrivacySettingsView {
    fn default() -> Self {
        Self {
            default_privacy_level: PrivacyLevel::Private,
            allow_public_reading_profile: false,
            allow_friends_to_see_reading: false,
            allow_followers_to_see_reading: false,
            show_reading_stats_publicly: false,
            show_currently_reading_publicly: false,
            show_reading_history_publicly: false,
            show_reading_goals_publicly: false,
            updated_at: None,
        }
    }
}

impl From<PrivacySettings> for PrivacySettingsView {
    fn from(row: PrivacySettings) -> Self {
        Self {
            default_privacy_level: PrivacyLevel::from_stored(&row.default_privacy_level),
            allow_public_reading_profile: row.allow_public_reading_profile,
            allow_friends_to_see_reading: row.allow_friends_to_see_reading,
            allow_followers_to_see_reading: row.allow_followers_to_see_reading,
            show_reading_stats_publicly: row.show_reading_stats_publicly,
            show_currently_reading_publicly: row.show_currently_reading_publicly,
            show_reading_history_publicly: row.show_reading_history_publicly,
            show_reading_goals_publicly: row.show_reading_goals_publicly,
            updated_at: Some(row.updated_at),
        }
    }
}

/// Every field set to its default. Used by reset.
pub fn default_update() -> UpdatePrivacySettings {
    let defaults = PrivacySettingsView::default();
    UpdatePrivacySettings {
        default_privacy_level: Some(defaults.default_privacy_level.to_string()),
        allow_public_reading_profile: Some(defaults.allow_public_reading_profile),
        allow_friends_to_see_reading: Some(defaults.allow_friends_to_see_reading),
        allow_followers_to_see_reading: Some(defaults.allow_followers_to_see_reading),
        show_reading_stats_publicly: Some(defaults.show_reading_stats_publicly),
        show_currently_reading_publicly: Some(defaults.show_currently_reading_publicly),
        show_reading_history_publicly: Some(defaults.show_reading_history_publicly),
        show_reading_goals_publicly: Some(defaults.show_reading_goals_publicly),
    }
}

/// Rejects unknown privacy levels before anything is written.
pub fn validate_update(update: &UpdatePrivacySettings) -> AppResult<()> {
    if let Some(level) = &update.default_privacy_level {
        level
            .parse::<PrivacyLevel>()
            .map_err(|_| AppError::new(ErrorCode::InvalidPrivacyLevel, format!("invalid privacy level: {level}")))?;
    }
    Ok(())
}

fn new_settings_from(user_id: Uuid, update: &UpdatePrivacySettings) -> NewPrivacySettings {
    NewPrivacySettings {
        user_id,
        default_privacy_level: update
            .default_privacy_level
            .clone()
            .unwrap_or_else(|| PrivacyLevel::Private.to_string()),
        allow_public_reading_profile: update.allow_public_reading_profile.unwrap_or(false),
        allow_friends_to_see_reading: update.allow_friends_to_see_reading.unwrap_or(false),
        allow_followers_to_see_reading: update.allow_followers_to_see_reading.unwrap_or(false),
        show_reading_stats_publicly: update.show_reading_stats_publicly.unwrap_or(false),
        show_currently_reading_publicly: update.show_currently_reading_publicly.unwrap_or(false),
        show_reading_history_publicly: update.show_reading_history_publicly.unwrap_or(false),
        show_reading_goals_publicly: update.show_reading_goals_publicly.unwrap_or(false),
    }
}

pub fn find_settings(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Option<PrivacySettings>> {
    let settings = user_privacy_settings::table
        .filter(user_privacy_settings::user_id.eq(user_id))
        .select(PrivacySettings::as_select())
        .first(conn)
        .optional()?;
    Ok(settings)
}

pub fn get_settings(conn: &mut PgConnection, user_id: Uuid) -> AppResult<PrivacySettingsView> {
    Ok(find_settings(conn, user_id)?.map(PrivacySettingsView::from).unwrap_or_default())
}

/// Level new progress records start with.
pub fn default_level_for(conn: &mut PgConnection, user_id: Uuid) -> AppResult<PrivacyLevel> {
    Ok(get_settings(conn, user_id)?.default_privacy_level)
}

/// Updates the owner's settings, creating the row on first write. Concurrent
/// first writes converge on one row through the `user_id` unique key.
pub fn update_settings(
    conn: &mut PgConnection,
    user_id: Uuid,
    update: &UpdatePrivacySettings,
    ip_address: Option<String>,
) -> AppResult<PrivacySettingsView> {
    validate_update(update)?;

    let previous = find_settings(conn, user_id)?;
    let saved = diesel::insert_into(user_privacy_settings::table)
        .values(&new_settings_from(user_id, update))
        .on_conflict(user_privacy_settings::user_id)
        .do_update()
        .set((update, user_privacy_settings::updated_at.eq(Utc::now())))
        .returning(PrivacySettings::as_returning())
        .get_result(conn)?;

    tracing::info!(user_id = %user_id, created = previous.is_none(), "privacy settings saved");

    let previous_view = previous.map(PrivacySettingsView::from);
    let view = PrivacySettingsView::from(saved);
    record_audit(
        conn,
        user_id,
        ACTION_SETTINGS_UPDATED,
        serde_json::json!({
            "previous_settings": previous_view,
            "new_settings": view,
            "changed_fields": changed_fields(update),
        }),
        ip_address,
    );

    Ok(view)
}

fn changed_fields(update: &UpdatePrivacySettings) -> Vec<String> {
    match serde_json::to_value(update) {
        Ok(serde_json::Value::Object(map)) => map
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k)
            .collect(),
        _ => Vec::new(),
    }
}

/// Writes an audit row. Failures are logged and swallowed.
pub fn record_audit(
    conn: &mut PgConnection,
    user_id: Uuid,
    action_type: &str,
    details: serde_json::Value,
    ip_address: Option<String>,
) {
    let entry = NewPrivacyAuditEntry {
        user_id,
        action_type: action_type.to_string(),
        details,
        ip_address,
    };
    if let Err(e) = diesel::insert_into(privacy_audit_log::table).values(&entry).execute(conn) {
        tracing::warn!(error = %e, user_id = %user_id, action_type, "failed to write privacy audit entry");
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PrivacyStats {
    pub total_entries: usize,
    pub public_entries: usize,
    pub friends_only_entries: usize,
    pub followers_only_entries: usize,
    pub private_entries: usize,
    pub custom_entries: usize,
}

impl PrivacyStats {
    /// Tallies raw stored levels. `custom` gets its own bucket; other unknown
    /// values only count towards the total.
    pub fn tally<'a>(levels: impl IntoIterator<Item = &'a str>) -> Self {
        let mut stats = Self::default();
        for level in levels {
            stats.total_entries += 1;
            match level.parse::<PrivacyLevel>() {
                Ok(PrivacyLevel::Public) => stats.public_entries += 1,
                Ok(PrivacyLevel::Friends) => stats.friends_only_entries += 1,
                Ok(PrivacyLevel::Followers) => stats.followers_only_entries += 1,
                Ok(PrivacyLevel::Private) => stats.private_entries += 1,
                Err(_) if level == "custom" => stats.custom_entries += 1,
                Err(_) => {}
            }
        }
        stats
    }
}

pub fn privacy_stats(conn: &mut PgConnection, user_id: Uuid) -> AppResult<PrivacyStats> {
    let levels: Vec<String> = reading_progress::table
        .filter(reading_progress::user_id.eq(user_id))
        .select(reading_progress::privacy_level)
        .load(conn)?;
    Ok(PrivacyStats::tally(levels.iter().map(String::as_str)))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PrivacyAuditSummary {
    pub total_updates: usize,
    pub total_permission_changes: usize,
    pub recent_activity: Vec<PrivacyAuditEntry>,
}

impl PrivacyAuditSummary {
    /// Expects entries newest first.
    pub fn summarize(entries: Vec<PrivacyAuditEntry>) -> Self {
        let mut summary = Self::default();
        for entry in &entries {
            match entry.action_type.as_str() {
                ACTION_SETTINGS_UPDATED | ACTION_VISIBILITY_UPDATED => summary.total_updates += 1,
                ACTION_PERMISSION_GRANTED | ACTION_PERMISSION_REVOKED => summary.total_permission_changes += 1,
                _ => {}
            }
        }
        summary.recent_activity = entries.into_iter().take(RECENT_ACTIVITY).collect();
        summary
    }
}

/// Summary over the owner's most recent audit rows.
pub fn audit_summary(conn: &mut PgConnection, user_id: Uuid) -> AppResult<PrivacyAuditSummary> {
    let entries = privacy_audit_log::table
        .filter(privacy_audit_log::user_id.eq(user_id))
        .order(privacy_audit_log::created_at.desc())
        .limit(AUDIT_WINDOW)
        .select(PrivacyAuditEntry::as_select())
        .load(conn)?;
    Ok(PrivacyAuditSummary::summarize(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_fully_private() {
        let view = PrivacySettingsView::default();
        assert_eq!(view.default_privacy_level, PrivacyLevel::Private);
        assert!(!view.allow_public_reading_profile);
        assert!(!view.allow_friends_to_see_reading);
        assert!(!view.allow_followers_to_see_reading);
        assert!(view.updated_at.is_none());
    }

    #[test]
    fn invalid_default_level_is_rejected() {
        let update = UpdatePrivacySettings {
            default_privacy_level: Some("members".into()),
            ..Default::default()
        };
        let err = validate_update(&update).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPrivacyLevel);

        assert!(validate_update(&UpdatePrivacySettings::default()).is_ok());
        assert!(validate_update(&default_update()).is_ok());
    }

    #[test]
    fn first_write_fills_missing_fields_with_defaults() {
        let user_id = Uuid::new_v4();
        let update = UpdatePrivacySettings {
            allow_friends_to_see_reading: Some(true),
            ..Default::default()
        };
        let row = new_settings_from(user_id, &update);
        assert_eq!(row.user_id, user_id);
        assert_eq!(row.default_privacy_level, "private");
        assert!(row.allow_friends_to_see_reading);
        assert!(!row.allow_public_reading_profile);
        assert!(!row.allow_followers_to_see_reading);
    }

    #[test]
    fn changed_fields_lists_only_provided_values() {
        let update = UpdatePrivacySettings {
            allow_public_reading_profile: Some(false),
            default_privacy_level: Some("public".into()),
            ..Default::default()
        };
        let mut fields = changed_fields(&update);
        fields.sort();
        assert_eq!(fields, vec!["allow_public_reading_profile", "default_privacy_level"]);
    }

    #[test]
    fn stats_count_each_level() {
        let stats = PrivacyStats::tally(["public", "public", "friends", "followers", "private", "custom"]);
        assert_eq!(
            stats,
            PrivacyStats {
                total_entries: 6,
                public_entries: 2,
                friends_only_entries: 1,
                followers_only_entries: 1,
                private_entries: 1,
                custom_entries: 1,
            }
        );
    }

    #[test]
    fn unknown_levels_count_only_towards_total() {
        let stats = PrivacyStats::tally(["public", "members"]);
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.public_entries, 1);
        assert_eq!(stats.custom_entries, 0);
    }

    fn entry(action_type: &str) -> PrivacyAuditEntry {
        PrivacyAuditEntry {
            id: Uuid::new_v4(),
            action_type: action_type.to_string(),
            details: serde_json::json!({}),
            ip_address: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn audit_summary_counts_updates_and_permission_changes() {
        let mut entries = vec![
            entry(ACTION_PERMISSION_REVOKED),
            entry(ACTION_SETTINGS_UPDATED),
            entry(ACTION_VISIBILITY_UPDATED),
            entry(ACTION_PERMISSION_GRANTED),
            entry("something_else"),
        ];
        entries.extend((0..8).map(|_| entry(ACTION_SETTINGS_UPDATED)));
        let newest = entries[0].id;

        let summary = PrivacyAuditSummary::summarize(entries);

        assert_eq!(summary.total_updates, 10);
        assert_eq!(summary.total_permission_changes, 2);
        assert_eq!(summary.recent_activity.len(), 10);
        assert_eq!(summary.recent_activity[0].id, newest);
    }

    #[test]
    fn empty_log_summarises_to_zero() {
        let summary = PrivacyAuditSummary::summarize(Vec::new());
        assert_eq!(summary.total_updates, 0);
        assert!(summary.recent_activity.is_empty());
    }
}
