//! Currently-reading visibility.
//!
//! A non-owner sees an in-progress record only when two independent checks
//! pass: the owner's account-wide reading gate, then the record's own
//! audience flags. The owner always sees everything.

#[cfg(any(test, feature = "test-util"))]
mod memory;
mod store;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use folio_shared::errors::AppResult;

use crate::models::{BookSummary, PrivacyLevel, PrivacySettings, ReadingProgress};

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
pub use store::{PgVisibilityStore, VisibilityStore, USER_TARGET_TYPE};

/// Relationship of a viewer to the owner. Anonymous viewers have neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelationshipFacts {
    pub is_friend: bool,
    pub is_follower: bool,
}

impl RelationshipFacts {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Asks the store both questions concurrently.
    pub async fn lookup(store: &dyn VisibilityStore, viewer_id: Uuid, owner_id: Uuid) -> AppResult<Self> {
        let (is_friend, is_follower) = tokio::try_join!(
            store.is_friend(viewer_id, owner_id),
            store.is_follower(viewer_id, owner_id),
        )?;
        Ok(Self { is_friend, is_follower })
    }
}

/// The owner's account-wide sharing flags. A missing settings row is all-false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadingGate {
    pub public: bool,
    pub friends: bool,
    pub followers: bool,
}

impl ReadingGate {
    pub fn closed() -> Self {
        Self::default()
    }

    /// Opens the gate for a viewer, or `None` when it stays shut.
    pub fn evaluate(self, facts: RelationshipFacts) -> Option<OpenGate> {
        let open = self.public
            || (self.friends && facts.is_friend)
            || (self.followers && facts.is_follower);
        open.then_some(OpenGate { facts })
    }
}

impl From<&PrivacySettings> for ReadingGate {
    fn from(settings: &PrivacySettings) -> Self {
        Self {
            public: settings.allow_public_reading_profile,
            friends: settings.allow_friends_to_see_reading,
            followers: settings.allow_followers_to_see_reading,
        }
    }
}

/// Proof that the account-wide gate passed. The per-record filter is only
/// reachable through this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenGate {
    facts: RelationshipFacts,
}

impl OpenGate {
    pub fn facts(&self) -> RelationshipFacts {
        self.facts
    }

    pub fn permits(&self, record: &ProgressRecord) -> bool {
        record.privacy_level == PrivacyLevel::Public
            || (record.allow_friends && self.facts.is_friend)
            || (record.allow_followers && self.facts.is_follower)
    }

    /// Keeps permitted records in their original order.
    pub fn filter(&self, records: Vec<ProgressRecord>) -> Vec<ProgressRecord> {
        records.into_iter().filter(|r| self.permits(r)).collect()
    }
}

/// An in-progress reading record as the resolver sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressRecord {
    pub id: Uuid,
    pub book_id: Option<Uuid>,
    pub privacy_level: PrivacyLevel,
    pub allow_friends: bool,
    pub allow_followers: bool,
    pub current_page: Option<i32>,
    pub total_pages: Option<i32>,
    pub percentage: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn new(book_id: Option<Uuid>, privacy_level: PrivacyLevel) -> Self {
        Self {
            id: Uuid::new_v4(),
            book_id,
            privacy_level,
            allow_friends: false,
            allow_followers: false,
            current_page: None,
            total_pages: None,
            percentage: None,
            updated_at: Utc::now(),
        }
    }

    pub fn allow_friends(mut self, allow: bool) -> Self {
        self.allow_friends = allow;
        self
    }

    pub fn allow_followers(mut self, allow: bool) -> Self {
        self.allow_followers = allow;
        self
    }

    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = at;
        self
    }
}

impl From<ReadingProgress> for ProgressRecord {
    fn from(row: ReadingProgress) -> Self {
        Self {
            id: row.id,
            book_id: row.book_id,
            privacy_level: PrivacyLevel::from_stored(&row.privacy_level),
            allow_friends: row.allow_friends,
            allow_followers: row.allow_followers,
            current_page: row.current_page,
            total_pages: row.total_pages,
            percentage: row.percentage,
            updated_at: row.updated_at,
        }
    }
}

/// A visible record joined with its book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentlyReading {
    pub progress: ProgressRecord,
    pub book: BookSummary,
}

/// Which branch a resolution took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Owner,
    Closed,
    Open,
}

impl Resolution {
    fn as_str(&self) -> &'static str {
        match self {
            Resolution::Owner => "owner",
            Resolution::Closed => "closed",
            Resolution::Open => "open",
        }
    }
}

#[derive(Clone)]
pub struct VisibilityResolver {
    store: Arc<dyn VisibilityStore>,
}

impl VisibilityResolver {
    pub fn new(store: Arc<dyn VisibilityStore>) -> Self {
        Self { store }
    }

    /// Every in-progress record of `owner_id` that `viewer_id` may see, newest
    /// first, each joined with an existing book. `None` is an anonymous viewer.
    pub async fn resolve(&self, owner_id: Uuid, viewer_id: Option<Uuid>) -> AppResult<Vec<CurrentlyReading>> {
        let (resolution, records) = match self.visible_records(owner_id, viewer_id).await {
            Ok(result) => result,
            Err(e) => {
                metrics::counter!("visibility_resolutions_total", "outcome" => "error").increment(1);
                return Err(e);
            }
        };
        metrics::counter!("visibility_resolutions_total", "outcome" => resolution.as_str()).increment(1);

        let visible = self.attach_books(records).await;
        tracing::debug!(
            owner_id = %owner_id,
            viewer_id = ?viewer_id,
            resolution = resolution.as_str(),
            visible = visible.len(),
            "currently reading resolved"
        );
        Ok(visible)
    }

    async fn visible_records(
        &self,
        owner_id: Uuid,
        viewer_id: Option<Uuid>,
    ) -> AppResult<(Resolution, Vec<ProgressRecord>)> {
        if viewer_id == Some(owner_id) {
            let records = self.store.in_progress_records(owner_id).await?;
            return Ok((Resolution::Owner, records));
        }

        let (gate, facts) = match viewer_id {
            None => {
                let settings = self.store.reading_gate(owner_id).await?;
                (settings.unwrap_or_default(), RelationshipFacts::anonymous())
            }
            Some(viewer_id) => {
                let (settings, facts) = tokio::try_join!(
                    self.store.reading_gate(owner_id),
                    RelationshipFacts::lookup(self.store.as_ref(), viewer_id, owner_id),
                )?;
                (settings.unwrap_or_default(), facts)
            }
        };

        let Some(open) = gate.evaluate(facts) else {
            return Ok((Resolution::Closed, Vec::new()));
        };

        let records = self.store.in_progress_records(owner_id).await?;
        Ok((Resolution::Open, open.filter(records)))
    }

    /// Drops records with no book id or whose book is gone. A failed book
    /// lookup counts as "no book found".
    async fn attach_books(&self, records: Vec<ProgressRecord>) -> Vec<CurrentlyReading> {
        let mut seen = HashSet::new();
        let book_ids: Vec<Uuid> = records
            .iter()
            .filter_map(|r| r.book_id)
            .filter(|id| seen.insert(*id))
            .collect();
        if book_ids.is_empty() {
            return Vec::new();
        }

        let books: HashMap<Uuid, BookSummary> = match self.store.books(&book_ids).await {
            Ok(books) => books.into_iter().map(|b| (b.id, b)).collect(),
            Err(e) => {
                tracing::warn!(error = %e, count = book_ids.len(), "book lookup failed, treating books as missing");
                HashMap::new()
            }
        };

        records
            .into_iter()
            .filter_map(|progress| {
                let book = books.get(&progress.book_id?)?.clone();
                Some(CurrentlyReading { progress, book })
            })
            .collect()
    }
}

/// Number of records `viewer_id` would see on `owner_id`'s profile. Used by
/// checks that compare the HTTP layer against the stored data.
pub async fn expected_visible_count(
    store: Arc<dyn VisibilityStore>,
    owner_id: Uuid,
    viewer_id: Option<Uuid>,
) -> AppResult<usize> {
    let visible = VisibilityResolver::new(store).resolve(owner_id, viewer_id).await?;
    Ok(visible.len())
}
