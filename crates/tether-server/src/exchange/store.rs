//! In-memory correlation store
//!
//! Entries live in a `DashMap` keyed by session, so an operation only
//! takes the shard lock of its own key for the duration of the call.
//! Nobody waits while holding a lock: each entry carries the sending half
//! of a oneshot channel and the issuer awaits the receiving half.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;

use tether_core::exchange::PendingExchange;
use tether_core::time::current_time_millis;
use tether_core::traits::ExchangeStore;
use tether_core::{AbortReason, Exchange, ExchangeError, ExchangeId, Resolution, SessionId};

/// A stored exchange plus the channel that wakes its issuer
struct Slot {
    exchange: Exchange,
    /// Taken on the first resolution, so each exchange resolves at most once
    waiter: Option<oneshot::Sender<Resolution>>,
}

/// Default [`ExchangeStore`] holding everything in process memory
pub struct InMemoryExchangeStore {
    slots: DashMap<SessionId, Slot>,
    /// Next exchange generation; 0 is never handed out
    next_id: AtomicU64,
}

impl InMemoryExchangeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> ExchangeId {
        ExchangeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for InMemoryExchangeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeStore for InMemoryExchangeStore {
    async fn set(
        &self,
        session_id: &SessionId,
        request: String,
    ) -> Result<PendingExchange, ExchangeError> {
        match self.slots.entry(session_id.clone()) {
            Entry::Occupied(_) => Err(ExchangeError::AlreadyPending(session_id.clone())),
            Entry::Vacant(vacant) => {
                let id = self.allocate_id();
                let (tx, rx) = oneshot::channel();
                vacant.insert(Slot {
                    exchange: Exchange::new(
                        session_id.clone(),
                        id,
                        request,
                        current_time_millis(),
                    ),
                    waiter: Some(tx),
                });
                tracing::debug!("Exchange {} created for {}", id, session_id);
                Ok(PendingExchange::new(session_id.clone(), id, rx))
            }
        }
    }

    async fn get(&self, session_id: &SessionId) -> Option<Exchange> {
        self.slots.get(session_id).map(|slot| slot.exchange.clone())
    }

    async fn complete(
        &self,
        session_id: &SessionId,
        exchange_id: ExchangeId,
        response: Bytes,
        has_error: bool,
    ) -> Result<(), ExchangeError> {
        let waiter = {
            let mut slot = self
                .slots
                .get_mut(session_id)
                .ok_or_else(|| ExchangeError::NotPending(session_id.clone()))?;

            if slot.exchange.id != exchange_id {
                tracing::debug!(
                    "Rejected stale write for {} on {} (current: {})",
                    exchange_id,
                    session_id,
                    slot.exchange.id
                );
                return Err(ExchangeError::NotPending(session_id.clone()));
            }
            if slot.exchange.has_response {
                return Err(ExchangeError::AlreadyCompleted(session_id.clone()));
            }

            slot.exchange.response = Some(response.clone());
            slot.exchange.has_response = true;
            slot.exchange.has_error = has_error;
            slot.waiter.take()
        };

        tracing::debug!(
            "Exchange {} completed for {} ({} bytes, error: {})",
            exchange_id,
            session_id,
            response.len(),
            has_error
        );

        // Shard guard is released before waking the issuer
        if let Some(tx) = waiter {
            let _ = tx.send(Resolution::Completed {
                response,
                has_error,
            });
        }
        Ok(())
    }

    async fn remove(&self, session_id: &SessionId) -> Option<Exchange> {
        self.slots.remove(session_id).map(|(_, slot)| slot.exchange)
    }

    async fn take(&self, session_id: &SessionId, exchange_id: ExchangeId) -> Option<Exchange> {
        self.slots
            .remove_if(session_id, |_, slot| slot.exchange.id == exchange_id)
            .map(|(_, slot)| slot.exchange)
    }

    async fn abort(&self, session_id: &SessionId, reason: AbortReason) -> bool {
        match self.slots.remove(session_id) {
            Some((_, slot)) => {
                resolve_aborted(session_id, slot, reason);
                true
            }
            None => false,
        }
    }

    async fn abort_if(
        &self,
        session_id: &SessionId,
        exchange_id: ExchangeId,
        reason: AbortReason,
    ) -> bool {
        match self
            .slots
            .remove_if(session_id, |_, slot| slot.exchange.id == exchange_id)
        {
            Some((_, slot)) => {
                resolve_aborted(session_id, slot, reason);
                true
            }
            None => false,
        }
    }

    async fn drain(&self, reason: AbortReason) -> usize {
        // Collect first: removing while iterating would deadlock on the shard
        let keys: Vec<SessionId> = self.slots.iter().map(|r| r.key().clone()).collect();

        let mut drained = 0;
        for key in keys {
            if self.abort(&key, reason).await {
                drained += 1;
            }
        }
        drained
    }

    fn pending_count(&self) -> usize {
        self.slots.len()
    }
}

fn resolve_aborted(session_id: &SessionId, mut slot: Slot, reason: AbortReason) {
    tracing::debug!(
        "Exchange {} for {} aborted: {}",
        slot.exchange.id,
        session_id,
        reason
    );
    if let Some(tx) = slot.waiter.take() {
        let _ = tx.send(Resolution::Aborted(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(id: &str) -> SessionId {
        SessionId::new(id)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = InMemoryExchangeStore::new();
        let pending = store.set(&sid("dev-1"), "whoami".into()).await.unwrap();

        let ex = store.get(&sid("dev-1")).await.unwrap();
        assert_eq!(ex.id, pending.id);
        assert_eq!(ex.request, "whoami");
        assert!(ex.is_pending());
        assert_eq!(store.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = InMemoryExchangeStore::new();
        assert!(store.get(&sid("nobody")).await.is_none());
    }

    #[tokio::test]
    async fn test_set_twice_is_already_pending() {
        let store = InMemoryExchangeStore::new();
        store.set(&sid("dev-1"), "first".into()).await.unwrap();

        let err = store.set(&sid("dev-1"), "second".into()).await.unwrap_err();
        assert_eq!(err, ExchangeError::AlreadyPending(sid("dev-1")));

        // Original request is untouched
        assert_eq!(store.get(&sid("dev-1")).await.unwrap().request, "first");
    }

    #[tokio::test]
    async fn test_ids_are_unique_per_instance() {
        let store = InMemoryExchangeStore::new();
        let a = store.set(&sid("dev-1"), "a".into()).await.unwrap();
        store.remove(&sid("dev-1")).await;
        let b = store.set(&sid("dev-1"), "b".into()).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_complete_wakes_waiter() {
        let store = InMemoryExchangeStore::new();
        let mut pending = store.set(&sid("dev-1"), "whoami".into()).await.unwrap();

        store
            .complete(&sid("dev-1"), pending.id, Bytes::from_static(b"root"), false)
            .await
            .unwrap();

        assert_eq!(
            pending.resolved().await,
            Some(Resolution::Completed {
                response: Bytes::from_static(b"root"),
                has_error: false,
            })
        );

        let ex = store.get(&sid("dev-1")).await.unwrap();
        assert!(ex.has_response);
        assert_eq!(ex.response.as_deref(), Some(&b"root"[..]));
    }

    #[tokio::test]
    async fn test_complete_without_exchange_is_not_pending() {
        let store = InMemoryExchangeStore::new();
        let err = store
            .complete(&sid("dev-1"), ExchangeId(1), Bytes::new(), false)
            .await
            .unwrap_err();
        assert_eq!(err, ExchangeError::NotPending(sid("dev-1")));
    }

    #[tokio::test]
    async fn test_complete_is_write_once() {
        let store = InMemoryExchangeStore::new();
        let pending = store.set(&sid("dev-1"), "id".into()).await.unwrap();

        store
            .complete(&sid("dev-1"), pending.id, Bytes::from_static(b"uid=0"), false)
            .await
            .unwrap();
        let err = store
            .complete(&sid("dev-1"), pending.id, Bytes::from_static(b"other"), true)
            .await
            .unwrap_err();
        assert_eq!(err, ExchangeError::AlreadyCompleted(sid("dev-1")));

        let ex = store.get(&sid("dev-1")).await.unwrap();
        assert_eq!(ex.response.as_deref(), Some(&b"uid=0"[..]));
        assert!(!ex.has_error);
    }

    #[tokio::test]
    async fn test_stale_exchange_id_is_rejected() {
        let store = InMemoryExchangeStore::new();
        let old = store.set(&sid("dev-1"), "old".into()).await.unwrap();
        store.take(&sid("dev-1"), old.id).await.unwrap();
        let mut fresh = store.set(&sid("dev-1"), "new".into()).await.unwrap();

        let err = store
            .complete(&sid("dev-1"), old.id, Bytes::from_static(b"late"), false)
            .await
            .unwrap_err();
        assert_eq!(err, ExchangeError::NotPending(sid("dev-1")));

        // The newer exchange is unaffected
        assert!(store.get(&sid("dev-1")).await.unwrap().is_pending());
        assert!(fresh.try_resolved().is_none());
    }

    #[tokio::test]
    async fn test_take_ignores_other_instance() {
        let store = InMemoryExchangeStore::new();
        let pending = store.set(&sid("dev-1"), "x".into()).await.unwrap();

        assert!(store
            .take(&sid("dev-1"), ExchangeId(pending.id.as_u64() + 100))
            .await
            .is_none());
        assert!(store.take(&sid("dev-1"), pending.id).await.is_some());
        assert!(store.get(&sid("dev-1")).await.is_none());
    }

    #[tokio::test]
    async fn test_abort_resolves_waiter() {
        let store = InMemoryExchangeStore::new();
        let mut pending = store.set(&sid("dev-1"), "x".into()).await.unwrap();

        assert!(store.abort(&sid("dev-1"), AbortReason::SessionLost).await);
        assert!(!store.abort(&sid("dev-1"), AbortReason::SessionLost).await);

        assert_eq!(
            pending.resolved().await,
            Some(Resolution::Aborted(AbortReason::SessionLost))
        );
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_abort_if_spares_newer_exchange() {
        let store = InMemoryExchangeStore::new();
        let old = store.set(&sid("dev-1"), "old".into()).await.unwrap();
        store.take(&sid("dev-1"), old.id).await.unwrap();
        let mut fresh = store.set(&sid("dev-1"), "new".into()).await.unwrap();

        assert!(
            !store
                .abort_if(&sid("dev-1"), old.id, AbortReason::SessionLost)
                .await
        );
        assert!(fresh.try_resolved().is_none());
        assert!(store.get(&sid("dev-1")).await.unwrap().is_pending());

        assert!(
            store
                .abort_if(&sid("dev-1"), fresh.id, AbortReason::SessionLost)
                .await
        );
        assert_eq!(
            fresh.resolved().await,
            Some(Resolution::Aborted(AbortReason::SessionLost))
        );
    }

    #[tokio::test]
    async fn test_abort_after_complete_keeps_completion() {
        let store = InMemoryExchangeStore::new();
        let mut pending = store.set(&sid("dev-1"), "x".into()).await.unwrap();
        store
            .complete(&sid("dev-1"), pending.id, Bytes::from_static(b"done"), false)
            .await
            .unwrap();
        store.abort(&sid("dev-1"), AbortReason::SessionLost).await;

        assert!(matches!(
            pending.resolved().await,
            Some(Resolution::Completed { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_drops_waiter() {
        let store = InMemoryExchangeStore::new();
        let mut pending = store.set(&sid("dev-1"), "x".into()).await.unwrap();

        let removed = store.remove(&sid("dev-1")).await.unwrap();
        assert_eq!(removed.id, pending.id);
        assert_eq!(pending.resolved().await, None);
    }

    #[tokio::test]
    async fn test_drain_aborts_everything() {
        let store = InMemoryExchangeStore::new();
        let mut a = store.set(&sid("a"), "x".into()).await.unwrap();
        let mut b = store.set(&sid("b"), "y".into()).await.unwrap();

        assert_eq!(store.drain(AbortReason::ShuttingDown).await, 2);
        assert_eq!(store.pending_count(), 0);
        assert_eq!(
            a.resolved().await,
            Some(Resolution::Aborted(AbortReason::ShuttingDown))
        );
        assert_eq!(
            b.resolved().await,
            Some(Resolution::Aborted(AbortReason::ShuttingDown))
        );
    }

    #[tokio::test]
    async fn test_complete_does_not_touch_other_keys() {
        let store = InMemoryExchangeStore::new();
        let s1 = store.set(&sid("s1"), "x".into()).await.unwrap();
        let mut s2 = store.set(&sid("s2"), "y".into()).await.unwrap();

        store
            .complete(&sid("s1"), s1.id, Bytes::from_static(b"ok"), false)
            .await
            .unwrap();

        assert!(s2.try_resolved().is_none());
        assert!(store.get(&sid("s2")).await.unwrap().is_pending());
    }
}
