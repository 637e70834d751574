//! Runs against a live Postgres. Each test applies the migration into its own
//! schema and drops it afterwards.
//!
//! DATABASE_URL=postgres://... cargo test -p folio-reading --test postgres_store -- --ignored

use chrono::{Duration, Utc};
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use std::sync::{Arc, Barrier};
use uuid::Uuid;

use folio_reading::models::{PermissionType, ReadingStatus, UpdatePrivacySettings};
use folio_reading::schema::{
    books, custom_permissions, follow_target_types, follows, reading_progress, user_friends,
    user_privacy_settings,
};
use folio_reading::services::permission_service::{self, AccessType, PermissionGrant};
use folio_reading::services::privacy_service;
use folio_reading::services::progress_service::{self, ProgressUpdate};
use folio_reading::visibility::{PgVisibilityStore, ReadingGate, VisibilityResolver, VisibilityStore};
use folio_shared::clients::db::{DbConn, DbPool};
use folio_shared::errors::ErrorCode;

const MIGRATION: &str = include_str!("../migrations/2025-01-01-000000_reading_privacy/up.sql");

#[derive(Debug)]
struct SearchPath(String);

impl CustomizeConnection<PgConnection, diesel::r2d2::Error> for SearchPath {
    fn on_acquire(&self, conn: &mut PgConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!("SET search_path TO {}", self.0))
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

struct TestDb {
    url: String,
    schema: String,
    pool: DbPool,
}

impl TestDb {
    /// `None` when DATABASE_URL is unset.
    fn connect() -> Option<Self> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping");
            return None;
        };
        let schema = format!("folio_test_{}", Uuid::new_v4().simple());

        let mut admin = PgConnection::establish(&url).unwrap();
        admin
            .batch_execute(&format!("CREATE SCHEMA {schema}; SET search_path TO {schema}; {MIGRATION}"))
            .unwrap();

        let pool = Pool::builder()
            .max_size(4)
            .connection_customizer(Box::new(SearchPath(schema.clone())))
            .build(ConnectionManager::<PgConnection>::new(&url))
            .unwrap();
        Some(Self { url, schema, pool })
    }

    fn conn(&self) -> DbConn {
        self.pool.get().unwrap()
    }

    fn store(&self) -> PgVisibilityStore {
        PgVisibilityStore::new(self.pool.clone())
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        if let Ok(mut conn) = PgConnection::establish(&self.url) {
            let _ = conn.batch_execute(&format!("DROP SCHEMA {} CASCADE", self.schema));
        }
    }
}

fn befriend(conn: &mut PgConnection, user_id: Uuid, friend_id: Uuid, status: &str) {
    diesel::insert_into(user_friends::table)
        .values((
            user_friends::user_id.eq(user_id),
            user_friends::friend_id.eq(friend_id),
            user_friends::status.eq(status),
        ))
        .execute(conn)
        .unwrap();
}

fn follow(conn: &mut PgConnection, follower_id: Uuid, following_id: Uuid, target_type: &str) {
    let target_type_id: i32 = follow_target_types::table
        .filter(follow_target_types::name.eq(target_type))
        .select(follow_target_types::id)
        .first(conn)
        .unwrap();
    diesel::insert_into(follows::table)
        .values((
            follows::follower_id.eq(follower_id),
            follows::following_id.eq(following_id),
            follows::target_type_id.eq(target_type_id),
        ))
        .execute(conn)
        .unwrap();
}

fn insert_book(conn: &mut PgConnection, title: &str) -> Uuid {
    diesel::insert_into(books::table)
        .values(books::title.eq(title))
        .returning(books::id)
        .get_result(conn)
        .unwrap()
}

fn insert_record(
    conn: &mut PgConnection,
    owner_id: Uuid,
    book_id: Uuid,
    status: ReadingStatus,
    privacy_level: &str,
    allow_friends: bool,
    minutes_ago: i64,
) -> Uuid {
    diesel::insert_into(reading_progress::table)
        .values((
            reading_progress::user_id.eq(owner_id),
            reading_progress::book_id.eq(Some(book_id)),
            reading_progress::status.eq(status.as_str()),
            reading_progress::privacy_level.eq(privacy_level),
            reading_progress::allow_friends.eq(allow_friends),
            reading_progress::updated_at.eq(Utc::now() - Duration::minutes(minutes_ago)),
        ))
        .returning(reading_progress::id)
        .get_result(conn)
        .unwrap()
}

fn progress_update(status: ReadingStatus) -> ProgressUpdate {
    ProgressUpdate {
        status,
        current_page: Some(10),
        total_pages: Some(200),
        notes: None,
        privacy_level: None,
        allow_friends: None,
        allow_followers: None,
    }
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn accepted_friendship_counts_in_either_direction() {
    let Some(db) = TestDb::connect() else { return };
    let (owner, asked, asker, pending) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    {
        let mut conn = db.conn();
        befriend(&mut conn, owner, asked, "accepted");
        befriend(&mut conn, asker, owner, "accepted");
        befriend(&mut conn, pending, owner, "pending");
    }
    let store = db.store();

    assert!(store.is_friend(asked, owner).await.unwrap());
    assert!(store.is_friend(asker, owner).await.unwrap());
    assert!(store.is_friend(owner, asker).await.unwrap());
    assert!(!store.is_friend(pending, owner).await.unwrap());
    assert!(!store.is_friend(Uuid::new_v4(), owner).await.unwrap());
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn only_user_follows_make_a_follower() {
    let Some(db) = TestDb::connect() else { return };
    let (owner, fan, author_fan) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    {
        let mut conn = db.conn();
        follow(&mut conn, fan, owner, "user");
        follow(&mut conn, author_fan, owner, "author");
    }
    let store = db.store();

    assert!(store.is_follower(fan, owner).await.unwrap());
    assert!(!store.is_follower(author_fan, owner).await.unwrap());
    // Following is one-way.
    assert!(!store.is_follower(owner, fan).await.unwrap());
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn missing_user_target_type_means_no_followers() {
    let Some(db) = TestDb::connect() else { return };
    let (owner, fan) = (Uuid::new_v4(), Uuid::new_v4());
    {
        let mut conn = db.conn();
        follow(&mut conn, fan, owner, "author");
        diesel::delete(follow_target_types::table.filter(follow_target_types::name.eq("user")))
            .execute(&mut conn)
            .unwrap();
    }

    assert!(!db.store().is_follower(fan, owner).await.unwrap());
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn only_in_progress_records_newest_first() {
    let Some(db) = TestDb::connect() else { return };
    let owner = Uuid::new_v4();
    let (older, newer) = {
        let mut conn = db.conn();
        let book = insert_book(&mut conn, "Middlemarch");
        let other = insert_book(&mut conn, "Persuasion");
        let done = insert_book(&mut conn, "Emma");
        let older = insert_record(&mut conn, owner, book, ReadingStatus::InProgress, "public", false, 30);
        let newer = insert_record(&mut conn, owner, other, ReadingStatus::InProgress, "private", false, 5);
        insert_record(&mut conn, owner, done, ReadingStatus::Completed, "public", false, 1);
        insert_record(&mut conn, Uuid::new_v4(), book, ReadingStatus::InProgress, "public", false, 1);
        (older, newer)
    };

    let records = db.store().in_progress_records(owner).await.unwrap();

    let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![newer, older]);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn reading_gate_comes_from_allow_flags() {
    let Some(db) = TestDb::connect() else { return };
    let owner = Uuid::new_v4();
    let store = db.store();

    assert_eq!(store.reading_gate(owner).await.unwrap(), None);

    {
        let mut conn = db.conn();
        let update = UpdatePrivacySettings {
            allow_friends_to_see_reading: Some(true),
            show_currently_reading_publicly: Some(true),
            ..Default::default()
        };
        privacy_service::update_settings(&mut conn, owner, &update, None).unwrap();
    }

    assert_eq!(
        store.reading_gate(owner).await.unwrap(),
        Some(ReadingGate { public: false, friends: true, followers: false })
    );
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn friend_sees_shared_records_and_stranger_sees_none() {
    let Some(db) = TestDb::connect() else { return };
    let (owner, friend) = (Uuid::new_v4(), Uuid::new_v4());
    {
        let mut conn = db.conn();
        let update = UpdatePrivacySettings {
            allow_friends_to_see_reading: Some(true),
            ..Default::default()
        };
        privacy_service::update_settings(&mut conn, owner, &update, None).unwrap();
        befriend(&mut conn, owner, friend, "accepted");
        let shared = insert_book(&mut conn, "Shared");
        let open = insert_book(&mut conn, "Open");
        let hidden = insert_book(&mut conn, "Hidden");
        insert_record(&mut conn, owner, shared, ReadingStatus::InProgress, "private", true, 3);
        insert_record(&mut conn, owner, open, ReadingStatus::InProgress, "public", false, 2);
        insert_record(&mut conn, owner, hidden, ReadingStatus::InProgress, "private", false, 1);
    }
    let resolver = VisibilityResolver::new(Arc::new(db.store()));

    let seen_by_friend = resolver.resolve(owner, Some(friend)).await.unwrap();
    let titles: Vec<&str> = seen_by_friend.iter().map(|c| c.book.title.as_str()).collect();
    assert_eq!(titles, vec!["Open", "Shared"]);

    assert!(resolver.resolve(owner, None).await.unwrap().is_empty());
    assert!(resolver.resolve(owner, Some(Uuid::new_v4())).await.unwrap().is_empty());
    assert_eq!(resolver.resolve(owner, Some(owner)).await.unwrap().len(), 3);
}

#[test]
#[ignore = "needs DATABASE_URL"]
fn concurrent_first_settings_writes_share_one_row() {
    let Some(db) = TestDb::connect() else { return };

    for _ in 0..20 {
        let user_id = Uuid::new_v4();
        let barrier = Arc::new(Barrier::new(2));
        let writers: Vec<_> = (0..2)
            .map(|i| {
                let pool = db.pool.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let mut conn = pool.get().unwrap();
                    let update = UpdatePrivacySettings {
                        allow_friends_to_see_reading: Some(i == 0),
                        ..Default::default()
                    };
                    barrier.wait();
                    privacy_service::update_settings(&mut conn, user_id, &update, None)
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap().unwrap();
        }

        let rows: i64 = user_privacy_settings::table
            .filter(user_privacy_settings::user_id.eq(user_id))
            .count()
            .get_result(&mut db.conn())
            .unwrap();
        assert_eq!(rows, 1);
    }
}

#[test]
#[ignore = "needs DATABASE_URL"]
fn concurrent_first_progress_writes_share_one_row() {
    let Some(db) = TestDb::connect() else { return };
    let book_id = insert_book(&mut db.conn(), "Contested");

    for _ in 0..20 {
        let user_id = Uuid::new_v4();
        let barrier = Arc::new(Barrier::new(2));
        let writers: Vec<_> = (0..2)
            .map(|_| {
                let pool = db.pool.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let mut conn = pool.get().unwrap();
                    barrier.wait();
                    progress_service::upsert_progress(
                        &mut conn,
                        user_id,
                        book_id,
                        &progress_update(ReadingStatus::InProgress),
                    )
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap().unwrap();
        }

        let rows: Vec<Option<chrono::DateTime<Utc>>> = reading_progress::table
            .filter(reading_progress::user_id.eq(user_id))
            .select(reading_progress::start_date)
            .load(&mut db.conn())
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_some());
    }
}

#[test]
#[ignore = "needs DATABASE_URL"]
fn new_progress_takes_the_owner_default_level() {
    let Some(db) = TestDb::connect() else { return };
    let mut conn = db.conn();
    let owner = Uuid::new_v4();
    let book_id = insert_book(&mut conn, "Defaults");
    let update = UpdatePrivacySettings {
        default_privacy_level: Some("followers".into()),
        ..Default::default()
    };
    privacy_service::update_settings(&mut conn, owner, &update, None).unwrap();

    let saved =
        progress_service::upsert_progress(&mut conn, owner, book_id, &progress_update(ReadingStatus::InProgress))
            .unwrap();
    assert_eq!(saved.privacy_level, "followers");

    let err = progress_service::upsert_progress(
        &mut conn,
        owner,
        Uuid::new_v4(),
        &progress_update(ReadingStatus::InProgress),
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::BookNotFound);
}

#[test]
#[ignore = "needs DATABASE_URL"]
fn permission_grants_feed_access_list_and_audit() {
    let Some(db) = TestDb::connect() else { return };
    let mut conn = db.conn();
    let (owner, friend, fan, guest) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    befriend(&mut conn, friend, owner, "accepted");
    follow(&mut conn, fan, owner, "user");

    let grant = PermissionGrant {
        permission_type: PermissionType::ReadingProgress,
        permission_level: "read".into(),
        expires_in_days: None,
    };
    permission_service::grant_permission(&mut conn, owner, guest, &grant, Some("203.0.113.9".into())).unwrap();
    let refreshed = PermissionGrant { permission_level: "full".into(), ..grant.clone() };
    let saved = permission_service::grant_permission(&mut conn, owner, guest, &refreshed, None).unwrap();
    assert_eq!(saved.permission_level, "full");

    let rows: i64 = custom_permissions::table
        .filter(custom_permissions::user_id.eq(owner))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(rows, 1);

    let access = permission_service::users_with_access(&mut conn, owner).unwrap();
    let mut seen: Vec<(Uuid, AccessType)> = access.iter().map(|g| (g.user_id, g.access_type)).collect();
    seen.sort_by_key(|(_, t)| *t);
    assert_eq!(seen, vec![(friend, AccessType::Friend), (fan, AccessType::Follower), (guest, AccessType::Custom)]);

    permission_service::revoke_permission(&mut conn, owner, guest, PermissionType::ReadingProgress, None).unwrap();
    let err = permission_service::revoke_permission(&mut conn, owner, guest, PermissionType::ReadingProgress, None)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PermissionNotFound);

    privacy_service::update_settings(&mut conn, owner, &UpdatePrivacySettings::default(), None).unwrap();

    let summary = privacy_service::audit_summary(&mut conn, owner).unwrap();
    assert_eq!(summary.total_permission_changes, 3);
    assert_eq!(summary.total_updates, 1);
    assert_eq!(summary.recent_activity.len(), 4);
    assert_eq!(summary.recent_activity[0].action_type, privacy_service::ACTION_SETTINGS_UPDATED);
}
