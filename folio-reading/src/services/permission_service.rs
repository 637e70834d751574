use chrono::{DateTime, Duration, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;
use validator::Validate;

use folio_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{CustomPermission, NewCustomPermission, PermissionType};
use crate::schema::{custom_permissions, follow_target_types, follows, user_friends};
use crate::services::privacy_service::{self, ACTION_PERMISSION_GRANTED, ACTION_PERMISSION_REVOKED};
use crate::visibility::USER_TARGET_TYPE;

/// Grants expire after this many days unless the request says otherwise.
const DEFAULT_GRANT_DAYS: i64 = 30;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PermissionGrant {
    #[serde(default)]
    pub permission_type: PermissionType,
    #[validate(length(min = 1, max = 20, message = "permission_level must be 1 to 20 characters"))]
    pub permission_level: String,
    #[validate(range(min = 1, max = 365, message = "expires_in_days must be between 1 and 365"))]
    pub expires_in_days: Option<i64>,
}

impl PermissionGrant {
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(self.expires_in_days.unwrap_or(DEFAULT_GRANT_DAYS))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Friend,
    Follower,
    Custom,
}

/// One user who can reach the owner's reading, and through which relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessGrant {
    pub user_id: Uuid,
    pub access_type: AccessType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Creates or refreshes a grant. One row per (owner, target, type).
pub fn grant_permission(
    conn: &mut PgConnection,
    owner_id: Uuid,
    target_user_id: Uuid,
    grant: &PermissionGrant,
    ip_address: Option<String>,
) -> AppResult<CustomPermission> {
    grant.validate()?;
    if owner_id == target_user_id {
        return Err(AppError::bad_request("cannot grant a permission to yourself"));
    }

    let now = Utc::now();
    let expires_at = grant.expires_at(now);
    let saved = diesel::insert_into(custom_permissions::table)
        .values(&NewCustomPermission {
            user_id: owner_id,
            target_user_id,
            permission_type: grant.permission_type.to_string(),
            permission_level: grant.permission_level.clone(),
            expires_at: Some(expires_at),
        })
        .on_conflict((
            custom_permissions::user_id,
            custom_permissions::target_user_id,
            custom_permissions::permission_type,
        ))
        .do_update()
        .set((
            custom_permissions::permission_level.eq(&grant.permission_level),
            custom_permissions::expires_at.eq(Some(expires_at)),
            custom_permissions::updated_at.eq(now),
        ))
        .returning(CustomPermission::as_returning())
        .get_result(conn)?;

    tracing::info!(
        owner_id = %owner_id,
        target_user_id = %target_user_id,
        permission_type = %grant.permission_type,
        "custom permission granted"
    );
    privacy_service::record_audit(
        conn,
        owner_id,
        ACTION_PERMISSION_GRANTED,
        serde_json::json!({
            "target_user_id": target_user_id,
            "permission_type": saved.permission_type,
            "permission_level": saved.permission_level,
            "expires_at": saved.expires_at,
        }),
        ip_address,
    );

    Ok(saved)
}

pub fn revoke_permission(
    conn: &mut PgConnection,
    owner_id: Uuid,
    target_user_id: Uuid,
    permission_type: PermissionType,
    ip_address: Option<String>,
) -> AppResult<()> {
    let deleted = diesel::delete(
        custom_permissions::table
            .filter(custom_permissions::user_id.eq(owner_id))
            .filter(custom_permissions::target_user_id.eq(target_user_id))
            .filter(custom_permissions::permission_type.eq(permission_type.as_str())),
    )
    .execute(conn)?;

    if deleted == 0 {
        return Err(AppError::new(ErrorCode::PermissionNotFound, "custom permission not found"));
    }

    tracing::info!(
        owner_id = %owner_id,
        target_user_id = %target_user_id,
        permission_type = %permission_type,
        "custom permission revoked"
    );
    privacy_service::record_audit(
        conn,
        owner_id,
        ACTION_PERMISSION_REVOKED,
        serde_json::json!({
            "target_user_id": target_user_id,
            "permission_type": permission_type.as_str(),
        }),
        ip_address,
    );
    Ok(())
}

/// Friends, user-followers and unexpired custom grants of `owner_id`.
pub fn users_with_access(conn: &mut PgConnection, owner_id: Uuid) -> AppResult<Vec<AccessGrant>> {
    let friendships: Vec<(Uuid, Uuid)> = user_friends::table
        .filter(user_friends::status.eq("accepted"))
        .filter(user_friends::user_id.eq(owner_id).or(user_friends::friend_id.eq(owner_id)))
        .select((user_friends::user_id, user_friends::friend_id))
        .load(conn)?;

    let followers: Vec<Uuid> = follows::table
        .inner_join(follow_target_types::table)
        .filter(follow_target_types::name.eq(USER_TARGET_TYPE))
        .filter(follows::following_id.eq(owner_id))
        .select(follows::follower_id)
        .load(conn)?;

    let permissions = custom_permissions::table
        .filter(custom_permissions::user_id.eq(owner_id))
        .select(CustomPermission::as_select())
        .load(conn)?;

    Ok(collect_access(owner_id, &friendships, &followers, permissions, Utc::now()))
}

fn collect_access(
    owner_id: Uuid,
    friendships: &[(Uuid, Uuid)],
    followers: &[Uuid],
    permissions: Vec<CustomPermission>,
    now: DateTime<Utc>,
) -> Vec<AccessGrant> {
    let relation = |user_id: Uuid, access_type: AccessType| AccessGrant {
        user_id,
        access_type,
        permission_type: None,
        permission_level: None,
        expires_at: None,
    };

    let friends: BTreeSet<Uuid> = friendships
        .iter()
        .map(|&(a, b)| if a == owner_id { b } else { a })
        .filter(|id| *id != owner_id)
        .collect();
    let followers: BTreeSet<Uuid> = followers.iter().copied().collect();

    let mut grants: Vec<AccessGrant> = friends
        .into_iter()
        .map(|id| relation(id, AccessType::Friend))
        .chain(followers.into_iter().map(|id| relation(id, AccessType::Follower)))
        .collect();

    grants.extend(
        permissions
            .into_iter()
            .filter(|p| p.expires_at.map_or(true, |at| at > now))
            .map(|p| AccessGrant {
                user_id: p.target_user_id,
                access_type: AccessType::Custom,
                permission_type: Some(p.permission_type),
                permission_level: Some(p.permission_level),
                expires_at: p.expires_at,
            }),
    );
    grants
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permission(target: Uuid, expires_at: Option<DateTime<Utc>>) -> CustomPermission {
        let now = Utc::now();
        CustomPermission {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            target_user_id: target,
            permission_type: "profile_view".into(),
            permission_level: "read".into(),
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn friendships_in_either_direction_name_the_other_user() {
        let (owner, a, b) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let grants = collect_access(owner, &[(owner, a), (b, owner), (a, owner)], &[], Vec::new(), Utc::now());

        let mut friends: Vec<Uuid> = grants.iter().map(|g| g.user_id).collect();
        friends.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(friends, expected);
        assert!(grants.iter().all(|g| g.access_type == AccessType::Friend));
    }

    #[test]
    fn expired_grants_are_left_out() {
        let owner = Uuid::new_v4();
        let now = Utc::now();
        let (live, expired, open_ended) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let grants = collect_access(
            owner,
            &[],
            &[],
            vec![
                permission(live, Some(now + Duration::days(1))),
                permission(expired, Some(now - Duration::days(1))),
                permission(open_ended, None),
            ],
            now,
        );

        let ids: Vec<Uuid> = grants.iter().map(|g| g.user_id).collect();
        assert_eq!(ids, vec![live, open_ended]);
        assert_eq!(grants[0].permission_type.as_deref(), Some("profile_view"));
    }

    #[test]
    fn a_friend_who_also_follows_appears_under_both() {
        let (owner, fan) = (Uuid::new_v4(), Uuid::new_v4());
        let grants = collect_access(owner, &[(owner, fan)], &[fan, fan], Vec::new(), Utc::now());
        let types: Vec<AccessType> = grants.iter().map(|g| g.access_type).collect();
        assert_eq!(types, vec![AccessType::Friend, AccessType::Follower]);
    }

    #[test]
    fn grant_defaults_to_thirty_days_of_profile_view() {
        let grant: PermissionGrant = serde_json::from_str(r#"{"permission_level":"read"}"#).unwrap();
        let now = Utc::now();
        assert_eq!(grant.permission_type, PermissionType::ProfileView);
        assert_eq!(grant.expires_at(now), now + Duration::days(30));
        assert!(grant.validate().is_ok());
    }

    #[test]
    fn grant_limits_are_validated() {
        let grant = PermissionGrant {
            permission_type: PermissionType::ReadingStats,
            permission_level: String::new(),
            expires_in_days: Some(400),
        };
        let errors = grant.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("permission_level"));
        assert!(fields.contains_key("expires_in_days"));
    }
}
