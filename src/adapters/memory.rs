use crate::domain::ClientIdentity;
use crate::domain::rate_limit::{rate_limit, retry_after};
use crate::services::rate_limit_service::{RateLimitStore, Reservation};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::{Duration, OffsetDateTime};

/// Process-local send ledger. Suitable for a single instance.
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    last_sent: DashMap<ClientIdentity, OffsetDateTime>,
}

impl MemoryRateLimitStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn reserve(
        &self,
        identity: &ClientIdentity,
        now: OffsetDateTime,
        window: Duration,
    ) -> anyhow::Result<Reservation> {
        // The entry holds the shard lock, so check and update are one step.
        match self.last_sent.entry(identity.clone()) {
            Entry::Occupied(mut entry) => {
                let last = *entry.get();
                if rate_limit(Some(last), now, window) {
                    entry.insert(now);
                    Ok(Reservation::Granted { reserved_at: now })
                } else {
                    let wait = retry_after(Some(last), now, window).unwrap_or(window);
                    Ok(Reservation::Denied { retry_after: wait })
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                Ok(Reservation::Granted { reserved_at: now })
            }
        }
    }

    async fn release(&self, identity: &ClientIdentity, reserved_at: OffsetDateTime) -> anyhow::Result<()> {
        self.last_sent.remove_if(identity, |_, last| *last == reserved_at);
        Ok(())
    }

    async fn prune(&self, now: OffsetDateTime, window: Duration) -> anyhow::Result<usize> {
        let before = self.last_sent.len();
        self.last_sent.retain(|_, last| !rate_limit(Some(*last), now, window));
        Ok(before.saturating_sub(self.last_sent.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use time::macros::datetime;

    const WINDOW: Duration = Duration::seconds(60);

    #[tokio::test]
    async fn test_reserve_inside_window_denied() {
        let store = MemoryRateLimitStore::new();
        let id = ClientIdentity::new("ip:1.1.1.1");
        let t0 = datetime!(2024-05-01 12:00:00 UTC);

        assert_eq!(store.reserve(&id, t0, WINDOW).await.unwrap(), Reservation::Granted { reserved_at: t0 });
        assert_eq!(
            store.reserve(&id, t0 + Duration::seconds(30), WINDOW).await.unwrap(),
            Reservation::Denied { retry_after: Duration::seconds(30) }
        );

        let t1 = t0 + Duration::seconds(61);
        assert_eq!(store.reserve(&id, t1, WINDOW).await.unwrap(), Reservation::Granted { reserved_at: t1 });
    }

    #[tokio::test]
    async fn test_identities_are_isolated() {
        let store = MemoryRateLimitStore::new();
        let t0 = datetime!(2024-05-01 12:00:00 UTC);

        assert!(matches!(
            store.reserve(&ClientIdentity::new("a"), t0, WINDOW).await.unwrap(),
            Reservation::Granted { .. }
        ));
        assert!(matches!(
            store.reserve(&ClientIdentity::new("b"), t0, WINDOW).await.unwrap(),
            Reservation::Granted { .. }
        ));
    }

    #[tokio::test]
    async fn test_release_only_drops_matching_reservation() {
        let store = MemoryRateLimitStore::new();
        let id = ClientIdentity::new("a");
        let t0 = datetime!(2024-05-01 12:00:00 UTC);
        store.reserve(&id, t0, WINDOW).await.unwrap();

        store.release(&id, t0 - Duration::seconds(5)).await.unwrap();
        assert_eq!(store.len(), 1, "stale release must not clear a newer reservation");

        store.release(&id, t0).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_prune_removes_expired_entries() {
        let store = MemoryRateLimitStore::new();
        let t0 = datetime!(2024-05-01 12:00:00 UTC);
        store.reserve(&ClientIdentity::new("old"), t0, WINDOW).await.unwrap();
        store.reserve(&ClientIdentity::new("new"), t0 + Duration::seconds(50), WINDOW).await.unwrap();

        let removed = store.prune(t0 + Duration::seconds(70), WINDOW).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_grant_exactly_one() {
        let store = Arc::new(MemoryRateLimitStore::new());
        let id = ClientIdentity::new("ip:7.7.7.7");
        let now = datetime!(2024-05-01 12:00:00 UTC);

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            let id = id.clone();
            tasks.push(tokio::spawn(async move { store.reserve(&id, now, WINDOW).await.unwrap() }));
        }

        let mut granted = 0;
        for task in futures::future::join_all(tasks).await {
            if matches!(task.unwrap(), Reservation::Granted { .. }) {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }
}
