//! Session registry implementation

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use tether_core::api::SessionInfo;
use tether_core::time::current_time_millis;
use tether_core::traits::ExchangeStore;
use tether_core::{AbortReason, AgentInfo, ConnectionStatus, ExchangeId, SessionId};

/// Authoritative set of connected agent sessions.
///
/// Gatekeeper for the dispatcher: commands to sessions that are unknown or
/// disconnected never reach the store. Tearing a session down resolves its
/// pending exchange as lost.
pub struct SessionRegistry {
    /// Sessions indexed by session ID
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
    /// Store whose exchanges are aborted on teardown
    store: Arc<dyn ExchangeStore>,
}

/// Handle to a registered session
pub struct SessionHandle {
    /// Session ID
    pub id: SessionId,
    /// Details reported on first connect
    pub info: AgentInfo,
    /// When the session connected (unix millis)
    pub connected_at: u64,
    /// Last poll or heartbeat (unix millis)
    last_seen_at: AtomicU64,
    /// [`ConnectionStatus`] encoded via `as_u8`
    status: AtomicU8,
    /// Latest exchange dispatched through this handle; 0 before the first
    exchange: AtomicU64,
}

impl SessionHandle {
    fn new(id: SessionId, info: AgentInfo) -> Self {
        let now = current_time_millis();
        Self {
            id,
            info,
            connected_at: now,
            last_seen_at: AtomicU64::new(now),
            status: AtomicU8::new(ConnectionStatus::Connected.as_u8()),
            exchange: AtomicU64::new(0),
        }
    }

    /// Current status
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// Whether the session accepts commands
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Last time the agent was seen (unix millis)
    pub fn last_seen_at(&self) -> u64 {
        self.last_seen_at.load(Ordering::Acquire)
    }

    /// Record agent activity
    pub fn touch(&self) {
        self.last_seen_at
            .store(current_time_millis(), Ordering::Release);
    }

    /// Flip to disconnected. Only the first caller gets `true`, so exactly
    /// one teardown path runs even when disconnect and the sweeper race.
    pub fn try_disconnect(&self) -> bool {
        self.status
            .compare_exchange(
                ConnectionStatus::Connected.as_u8(),
                ConnectionStatus::Disconnected.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Claim `exchange_id` for this connection, so tearing the connection
    /// down aborts it and nothing dispatched through a newer one.
    ///
    /// The dispatcher binds before re-checking [`is_connected`]; teardown
    /// disconnects before reading the binding. With both sides sequentially
    /// consistent, one of them always sees the other.
    ///
    /// [`is_connected`]: Self::is_connected
    pub fn bind_exchange(&self, exchange_id: ExchangeId) {
        self.exchange.store(exchange_id.as_u64(), Ordering::SeqCst);
    }

    /// Latest exchange bound to this connection
    pub fn bound_exchange(&self) -> Option<ExchangeId> {
        match self.exchange.load(Ordering::SeqCst) {
            0 => None,
            id => Some(ExchangeId(id)),
        }
    }

    /// API view of this session
    pub fn session_info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            status: self.status(),
            connected_at: self.connected_at,
            last_seen_at: self.last_seen_at(),
            info: self.info.clone(),
        }
    }
}

impl SessionRegistry {
    /// Create a registry that tears down exchanges in `store`
    pub fn new(store: Arc<dyn ExchangeStore>) -> Self {
        Self {
            sessions: DashMap::new(),
            store,
        }
    }

    /// Register a session, or refresh it if it is already connected.
    ///
    /// A pending exchange of an already-connected session is kept.
    pub fn register(&self, id: SessionId, info: AgentInfo) -> Arc<SessionHandle> {
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(mut occupied) if !occupied.get().is_connected() => {
                // A teardown is still finishing; the new connection replaces it
                let handle = Arc::new(SessionHandle::new(id.clone(), info));
                occupied.insert(Arc::clone(&handle));
                tracing::info!("Session reconnected: {}", id);
                handle
            }
            Entry::Occupied(occupied) => {
                let handle = Arc::clone(occupied.get());
                handle.touch();
                tracing::debug!("Session refreshed: {}", id);
                handle
            }
            Entry::Vacant(vacant) => {
                let handle = Arc::new(SessionHandle::new(id.clone(), info));
                vacant.insert(Arc::clone(&handle));
                tracing::info!(
                    "Session registered: {} (hostname: {})",
                    id,
                    handle.info.hostname.as_deref().unwrap_or("unknown")
                );
                handle
            }
        }
    }

    /// Unregister a session and resolve its pending exchange as lost.
    ///
    /// Returns the removed handle, or `None` if the session was unknown or
    /// another caller already tore it down.
    pub async fn unregister(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        let handle = self.get(id)?;
        if self.evict(&handle).await {
            Some(handle)
        } else {
            None
        }
    }

    /// Tear down this particular connection of a session.
    ///
    /// Only the exchange bound to `handle` is aborted, so an agent that
    /// reconnects while the abort is in flight keeps its new command.
    /// Returns false if another caller already tore it down.
    pub async fn evict(&self, handle: &Arc<SessionHandle>) -> bool {
        if !handle.try_disconnect() {
            return false;
        }

        let aborted = match handle.bound_exchange() {
            Some(exchange_id) => {
                self.store
                    .abort_if(&handle.id, exchange_id, AbortReason::SessionLost)
                    .await
            }
            None => false,
        };
        self.sessions
            .remove_if(&handle.id, |_, current| Arc::ptr_eq(current, handle));

        tracing::info!(
            "Session unregistered: {}{}",
            handle.id,
            if aborted { " (pending command aborted)" } else { "" }
        );
        true
    }

    /// The session's handle, if it currently accepts commands
    pub fn connected(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.get(id).filter(|handle| handle.is_connected())
    }

    /// Whether commands may be dispatched to the session
    pub fn is_active(&self, id: &SessionId) -> bool {
        self.connected(id).is_some()
    }

    /// Record activity for a connected session; false if unknown
    pub fn touch(&self, id: &SessionId) -> bool {
        match self.sessions.get(id) {
            Some(handle) if handle.is_connected() => {
                handle.touch();
                true
            }
            _ => false,
        }
    }

    /// Get a session by ID
    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.get(id).map(|r| Arc::clone(&r))
    }

    /// List all sessions
    pub fn list(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.iter().map(|r| Arc::clone(&r)).collect()
    }

    /// Connected sessions last seen before `cutoff` (unix millis)
    pub fn stale_sessions(&self, cutoff: u64) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .iter()
            .filter(|r| r.is_connected() && r.last_seen_at() < cutoff)
            .map(|r| Arc::clone(&r))
            .collect()
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
