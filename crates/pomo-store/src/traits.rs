//! Store trait definitions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pomo_api::SessionRecord;
use pomo_util::{SessionId, UserId};

use crate::StoreResult;

/// Durable home of session records, keyed by user.
///
/// The engine hands records over by value and never reads them back
/// except during startup recovery.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace a record by id.
    ///
    /// A write carrying an older `updated_at` than the stored row is dropped.
    async fn upsert(&self, user: &UserId, record: &SessionRecord) -> StoreResult<()>;

    /// Remove a record. Deleting an absent record succeeds.
    async fn delete(&self, user: &UserId, id: &SessionId) -> StoreResult<()>;

    /// Most recently started record that is neither completed nor ended
    async fn load_most_recent_incomplete(&self, user: &UserId)
    -> StoreResult<Option<SessionRecord>>;

    /// Completed records whose end time is at or after `since`, oldest first
    async fn list_completed_since(
        &self,
        user: &UserId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<SessionRecord>>;

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
