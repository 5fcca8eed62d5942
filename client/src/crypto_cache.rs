use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
#[cfg(test)] use mockall::automock;
use quic_transport::connection_id::ConnectionId;
use rustc_hash::FxHashMap;
use tracing::debug;
use crate::config::ServerId;

/// Handshake state the client remembers about a server across connections.
///
/// A server can tell the client which connection id to use for the next connection attempt
///  (typically in a stateless reject). Those ids are queued here and handed out once each.
#[derive(Debug, Default)]
pub struct CachedState {
    server_designated_connection_ids: Mutex<VecDeque<ConnectionId>>,
}

impl CachedState {
    pub fn has_server_designated_connection_id(&self) -> bool {
        !self.connection_ids().is_empty()
    }

    pub fn next_server_designated_connection_id(&self) -> Option<ConnectionId> {
        self.connection_ids().pop_front()
    }

    pub fn add_server_designated_connection_id(&self, connection_id: ConnectionId) {
        debug!("server designated connection id {}", connection_id);
        self.connection_ids().push_back(connection_id);
    }

    fn connection_ids(&self) -> std::sync::MutexGuard<'_, VecDeque<ConnectionId>> {
        // the queue is consistent after every operation, so a panic while holding the lock
        //  leaves nothing to repair
        self.server_designated_connection_ids.lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// The client's cache of per-server handshake state. It is shared between connections (and
///  potentially threads), so it is injected rather than owned by a connection.
#[cfg_attr(test, automock)]
pub trait CryptoConfigCache: Send + Sync {
    fn lookup_or_create(&self, server_id: &ServerId) -> Arc<CachedState>;
}

#[derive(Default)]
pub struct InMemoryCryptoConfigCache {
    entries: Mutex<FxHashMap<ServerId, Arc<CachedState>>>,
}

impl CryptoConfigCache for InMemoryCryptoConfigCache {
    fn lookup_or_create(&self, server_id: &ServerId) -> Arc<CachedState> {
        let mut entries = self.entries.lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.entry(server_id.clone())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_designated_ids_are_handed_out_once_in_order() {
        let state = CachedState::default();
        assert!(!state.has_server_designated_connection_id());
        assert_eq!(state.next_server_designated_connection_id(), None);

        state.add_server_designated_connection_id(ConnectionId::from_raw(7));
        state.add_server_designated_connection_id(ConnectionId::from_raw(9));
        assert!(state.has_server_designated_connection_id());

        assert_eq!(state.next_server_designated_connection_id(), Some(ConnectionId::from_raw(7)));
        assert_eq!(state.next_server_designated_connection_id(), Some(ConnectionId::from_raw(9)));
        assert_eq!(state.next_server_designated_connection_id(), None);
    }

    #[test]
    fn test_in_memory_cache_is_per_server() {
        let cache = InMemoryCryptoConfigCache::default();
        let a = ServerId::new("a.example.org", 443);
        let b = ServerId::new("b.example.org", 443);

        cache.lookup_or_create(&a).add_server_designated_connection_id(ConnectionId::from_raw(1));

        assert!(Arc::ptr_eq(&cache.lookup_or_create(&a), &cache.lookup_or_create(&a)));
        assert!(cache.lookup_or_create(&a).has_server_designated_connection_id());
        assert!(!cache.lookup_or_create(&b).has_server_designated_connection_id());
    }
}
