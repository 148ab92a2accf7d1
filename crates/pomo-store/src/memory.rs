//! In-memory store with failure injection

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pomo_api::SessionRecord;
use pomo_util::{SessionId, UserId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::{SessionStore, StoreError, StoreResult};

type RecordMap = HashMap<UserId, HashMap<SessionId, SessionRecord>>;

/// Ephemeral store; useful for tests and for running without a database
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<RecordMap>,
    fail_writes: AtomicBool,
    upserts: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent upsert and delete fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful upserts so far
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Successful deletes so far
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// All records stored for a user, ordered by start time
    pub fn records(&self, user: &UserId) -> Vec<SessionRecord> {
        let records = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut list: Vec<_> = records
            .get(user)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by_key(|r| r.start_time);
        list
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, RecordMap>> {
        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn upsert(&self, user: &UserId, record: &SessionRecord) -> StoreResult<()> {
        self.check_writable()?;
        let mut records = self.lock()?;
        let by_id = records.entry(user.clone()).or_default();

        let stale = by_id
            .get(&record.id)
            .is_some_and(|existing| existing.updated_at > record.updated_at);
        if !stale {
            by_id.insert(record.id.clone(), record.clone());
        }

        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, user: &UserId, id: &SessionId) -> StoreResult<()> {
        self.check_writable()?;
        let mut records = self.lock()?;
        if let Some(by_id) = records.get_mut(user) {
            by_id.remove(id);
        }

        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_most_recent_incomplete(
        &self,
        user: &UserId,
    ) -> StoreResult<Option<SessionRecord>> {
        let records = self.lock()?;
        Ok(records.get(user).and_then(|by_id| {
            by_id
                .values()
                .filter(|r| r.is_in_progress())
                .max_by_key(|r| r.start_time)
                .cloned()
        }))
    }

    async fn list_completed_since(
        &self,
        user: &UserId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<SessionRecord>> {
        let records = self.lock()?;
        let mut list: Vec<_> = records
            .get(user)
            .map(|by_id| {
                by_id
                    .values()
                    .filter(|r| r.completed && r.end_time.is_some_and(|end| end >= since))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        list.sort_by_key(|r| r.end_time);
        Ok(list)
    }

    fn is_healthy(&self) -> bool {
        self.records.lock().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pomo_api::Phase;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryStore::new();
        let user = UserId::default();
        let record = SessionRecord::begin(Phase::Focus, 25, None, at(0));

        store.set_fail_writes(true);
        let result = store.upsert(&user, &record).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.upsert_count(), 0);

        store.set_fail_writes(false);
        store.upsert(&user, &record).await.unwrap();
        assert_eq!(store.upsert_count(), 1);
        assert_eq!(store.records(&user), vec![record]);
    }

    #[tokio::test]
    async fn test_incomplete_and_completed_queries() {
        let store = MemoryStore::new();
        let user = UserId::default();
        let first = SessionRecord::begin(Phase::Focus, 25, None, at(0));
        let second = SessionRecord::begin(Phase::ShortBreak, 5, None, at(25));

        store
            .upsert(&user, &first.clone().finalized(at(25), at(25)))
            .await
            .unwrap();
        store.upsert(&user, &second).await.unwrap();

        let incomplete = store.load_most_recent_incomplete(&user).await.unwrap();
        assert_eq!(incomplete.map(|r| r.id), Some(second.id));

        let completed = store.list_completed_since(&user, at(0)).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, first.id);
    }

    #[tokio::test]
    async fn test_stale_write_keeps_newer_record() {
        let store = MemoryStore::new();
        let user = UserId::default();
        let record = SessionRecord::begin(Phase::Focus, 25, None, at(0));

        store
            .upsert(&user, &record.clone().finalized(at(25), at(25)))
            .await
            .unwrap();
        store.upsert(&user, &record.touched(at(5))).await.unwrap();

        assert!(store.records(&user)[0].completed);
    }
}
