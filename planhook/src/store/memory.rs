//! In-memory user store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use super::{PlanWrite, StoreError, UserStore};
use crate::order::PlanTier;

/// Process-local [`UserStore`].
///
/// Holds no data across restarts. It can be switched offline to exercise the
/// dependency-failure path, and it counts writes so callers can assert that
/// a request did not touch persistence.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, PlanTier>>,
    offline: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing users.
    pub fn with_users<'a>(users: impl IntoIterator<Item = (&'a str, PlanTier)>) -> Self {
        let users = users
            .into_iter()
            .map(|(email, plan)| (email.to_string(), plan))
            .collect();
        Self {
            users: RwLock::new(users),
            ..Self::default()
        }
    }

    /// Simulate the store becoming unreachable (or reachable again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of write attempts that reached the store.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn upsert_plan(&self, email: &str, plan: PlanTier) -> Result<PlanWrite, StoreError> {
        self.check_online()?;
        self.writes.fetch_add(1, Ordering::SeqCst);

        let previous = self.users.write().await.insert(email.to_string(), plan);
        Ok(match previous {
            Some(_) => PlanWrite::Updated,
            None => PlanWrite::Created,
        })
    }

    async fn update_plan(&self, email: &str, plan: PlanTier) -> Result<PlanWrite, StoreError> {
        self.check_online()?;
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut users = self.users.write().await;
        Ok(match users.get_mut(email) {
            Some(current) => {
                *current = plan;
                PlanWrite::Updated
            }
            None => PlanWrite::NotFound,
        })
    }

    async fn find_plan(&self, email: &str) -> Result<Option<PlanTier>, StoreError> {
        self.check_online()?;
        Ok(self.users.read().await.get(email).copied())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_online()
    }

    async fn close(&self) {
        self.set_offline(true);
        info!("memory_store_closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let store = MemoryUserStore::new();

        let first = store.upsert_plan("a@x.com", PlanTier::Starter).await.unwrap();
        let second = store.upsert_plan("a@x.com", PlanTier::Pro).await.unwrap();

        assert_eq!(first, PlanWrite::Created);
        assert_eq!(second, PlanWrite::Updated);
        assert_eq!(store.find_plan("a@x.com").await.unwrap(), Some(PlanTier::Pro));
        assert_eq!(store.user_count().await, 1);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_update_requires_existing() {
        let store = MemoryUserStore::with_users([("b@x.com", PlanTier::Free)]);

        assert_eq!(
            store.update_plan("missing@x.com", PlanTier::Pro).await.unwrap(),
            PlanWrite::NotFound
        );
        assert_eq!(
            store.update_plan("b@x.com", PlanTier::Enterprise).await.unwrap(),
            PlanWrite::Updated
        );
        assert_eq!(store.find_plan("missing@x.com").await.unwrap(), None);
        assert_eq!(
            store.find_plan("b@x.com").await.unwrap(),
            Some(PlanTier::Enterprise)
        );
    }

    #[tokio::test]
    async fn test_offline_store_fails() {
        let store = MemoryUserStore::new();
        store.set_offline(true);

        assert!(matches!(
            store.upsert_plan("a@x.com", PlanTier::Pro).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.ping().await.is_err());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_close_takes_store_offline() {
        let store = MemoryUserStore::new();
        store.close().await;
        assert!(store.ping().await.is_err());
    }
}
