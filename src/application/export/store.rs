//! Job progress store.
//!
//! Process-local and not durable: the in-memory implementation loses every
//! job on restart. The trait exists so a shared cache can back it instead
//! without touching the orchestrator.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use super::job::ExportJob;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("progress store backend failed: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<ExportJob>, StoreError>;

    /// Replace the record for `job.id`, restarting its retention window.
    async fn set(&self, job: ExportJob) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<Option<ExportJob>, StoreError>;

    /// Bring the record's expiry forward to `deadline` if that is sooner.
    /// Returns `false` for unknown ids.
    async fn retain_until(&self, id: Uuid, deadline: Instant) -> Result<bool, StoreError>;

    /// Drop every record whose expiry is at or before `now`.
    async fn evict_expired(&self, now: Instant) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone)]
struct StoredJob {
    job: ExportJob,
    expires_at: Instant,
}

/// DashMap-backed store: readers never block each other and each job id
/// has exactly one writer, so per-key replacement is all the locking needed.
#[derive(Debug)]
pub struct InMemoryProgressStore {
    entries: DashMap<Uuid, StoredJob>,
    retention: Duration,
}

impl InMemoryProgressStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            retention,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn get(&self, id: Uuid) -> Result<Option<ExportJob>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(&id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.job.clone()))
    }

    async fn set(&self, job: ExportJob) -> Result<(), StoreError> {
        let expires_at = Instant::now() + self.retention;
        self.entries.insert(job.id, StoredJob { job, expires_at });
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<ExportJob>, StoreError> {
        Ok(self.entries.remove(&id).map(|(_, entry)| entry.job))
    }

    async fn retain_until(&self, id: Uuid, deadline: Instant) -> Result<bool, StoreError> {
        Ok(match self.entries.get_mut(&id) {
            Some(mut entry) => {
                entry.expires_at = entry.expires_at.min(deadline);
                true
            }
            None => false,
        })
    }

    async fn evict_expired(&self, now: Instant) -> Result<usize, StoreError> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        Ok(before.saturating_sub(self.entries.len()))
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::domain::types::ExportStage;

    fn job() -> ExportJob {
        ExportJob::new(Uuid::new_v4(), "p1", OffsetDateTime::UNIX_EPOCH)
    }

    #[tokio::test(start_paused = true)]
    async fn records_expire_after_retention() {
        let store = InMemoryProgressStore::new(Duration::from_secs(60));
        let job = job();
        store.set(job.clone()).await.expect("set");

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.get(job.id).await.expect("get"), Some(job.clone()));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get(job.id).await.expect("get"), None);
        assert_eq!(store.len(), 1, "expired records linger until swept");

        let evicted = store.evict_expired(Instant::now()).await.expect("evict");
        assert_eq!(evicted, 1);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn writes_restart_retention_and_deadlines_only_shorten_it() {
        let store = InMemoryProgressStore::new(Duration::from_secs(60));
        let job = job();
        store.set(job.clone()).await.expect("set");

        tokio::time::advance(Duration::from_secs(50)).await;
        let next = job
            .advance(ExportStage::Fetching, 10, "Loading project data")
            .expect("advance");
        store.set(next.clone()).await.expect("set");

        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(store.get(job.id).await.expect("get"), Some(next));

        let far = Instant::now() + Duration::from_secs(3600);
        assert!(store.retain_until(job.id, far).await.expect("retain"));
        let soon = Instant::now() + Duration::from_secs(5);
        assert!(store.retain_until(job.id, soon).await.expect("retain"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get(job.id).await.expect("get"), None);
        assert!(!store.retain_until(Uuid::nil(), soon).await.expect("retain"));
    }

    #[tokio::test]
    async fn delete_returns_last_record() {
        let store = InMemoryProgressStore::new(Duration::from_secs(60));
        let job = job();
        store.set(job.clone()).await.expect("set");
        assert_eq!(store.delete(job.id).await.expect("delete"), Some(job.clone()));
        assert_eq!(store.delete(job.id).await.expect("delete"), None);
    }
}
