use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use folio_shared::errors::{AppError, AppResult};

use super::{ProgressRecord, ReadingGate, VisibilityStore};
use crate::models::BookSummary;

/// In-memory `VisibilityStore` for tests and local checks. Built up front,
/// read-only afterwards. Counts lookups so callers can assert which reads ran.
#[derive(Default)]
pub struct MemoryStore {
    settings: HashMap<Uuid, ReadingGate>,
    // (user_id, friend_id, accepted)
    friendships: Vec<(Uuid, Uuid, bool)>,
    // (follower_id, following_id)
    follows: HashSet<(Uuid, Uuid)>,
    user_target_type_missing: bool,
    records: HashMap<Uuid, Vec<ProgressRecord>>,
    books: HashMap<Uuid, BookSummary>,
    fail_settings: bool,
    fail_relationships: bool,
    fail_books: bool,
    settings_lookups: AtomicUsize,
    relationship_lookups: AtomicUsize,
    record_lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(mut self, owner_id: Uuid, gate: ReadingGate) -> Self {
        self.settings.insert(owner_id, gate);
        self
    }

    pub fn with_friendship(mut self, user_id: Uuid, friend_id: Uuid) -> Self {
        self.friendships.push((user_id, friend_id, true));
        self
    }

    pub fn with_pending_friendship(mut self, user_id: Uuid, friend_id: Uuid) -> Self {
        self.friendships.push((user_id, friend_id, false));
        self
    }

    pub fn with_follow(mut self, follower_id: Uuid, following_id: Uuid) -> Self {
        self.follows.insert((follower_id, following_id));
        self
    }

    pub fn without_user_target_type(mut self) -> Self {
        self.user_target_type_missing = true;
        self
    }

    pub fn with_record(mut self, owner_id: Uuid, record: ProgressRecord) -> Self {
        self.records.entry(owner_id).or_default().push(record);
        self
    }

    pub fn with_book(mut self, book: BookSummary) -> Self {
        self.books.insert(book.id, book);
        self
    }

    pub fn failing_settings(mut self) -> Self {
        self.fail_settings = true;
        self
    }

    pub fn failing_relationships(mut self) -> Self {
        self.fail_relationships = true;
        self
    }

    pub fn failing_books(mut self) -> Self {
        self.fail_books = true;
        self
    }

    pub fn settings_lookups(&self) -> usize {
        self.settings_lookups.load(Ordering::SeqCst)
    }

    pub fn relationship_lookups(&self) -> usize {
        self.relationship_lookups.load(Ordering::SeqCst)
    }

    pub fn record_lookups(&self) -> usize {
        self.record_lookups.load(Ordering::SeqCst)
    }

    fn relationship_read(&self) -> AppResult<()> {
        self.relationship_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_relationships {
            return Err(AppError::internal("relationship lookup failed"));
        }
        Ok(())
    }
}

#[async_trait]
impl VisibilityStore for MemoryStore {
    async fn reading_gate(&self, owner_id: Uuid) -> AppResult<Option<ReadingGate>> {
        self.settings_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_settings {
            return Err(AppError::internal("settings lookup failed"));
        }
        Ok(self.settings.get(&owner_id).copied())
    }

    async fn is_friend(&self, viewer_id: Uuid, owner_id: Uuid) -> AppResult<bool> {
        self.relationship_read()?;
        Ok(self.friendships.iter().any(|&(user, friend, accepted)| {
            accepted
                && ((user == viewer_id && friend == owner_id) || (user == owner_id && friend == viewer_id))
        }))
    }

    async fn is_follower(&self, viewer_id: Uuid, owner_id: Uuid) -> AppResult<bool> {
        self.relationship_read()?;
        if self.user_target_type_missing {
            return Ok(false);
        }
        Ok(self.follows.contains(&(viewer_id, owner_id)))
    }

    async fn in_progress_records(&self, owner_id: Uuid) -> AppResult<Vec<ProgressRecord>> {
        self.record_lookups.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.get(&owner_id).cloned().unwrap_or_default();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }

    async fn books(&self, book_ids: &[Uuid]) -> AppResult<Vec<BookSummary>> {
        if self.fail_books {
            return Err(AppError::internal("book lookup failed"));
        }
        Ok(book_ids.iter().filter_map(|id| self.books.get(id).cloned()).collect())
    }
}
