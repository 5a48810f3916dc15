//! Concurrent registry of live chat sessions keyed by conversation identity.
//!
//! The `ChatRegistry` maps each `ConversationId` to the address of the session
//! serving it. Registration is atomic per identity: of two racing
//! registrations exactly one wins, and the loser gets the winner's address
//! back so it can forward instead of creating a duplicate.
//!
//! Entries whose session has died are treated as absent: `lookup` removes
//! them, and `register` replaces them.

use std::fmt;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parley_types::conversation::ConversationId;
use tracing::debug;
use uuid::Uuid;

/// Address of a running session as seen by the registry.
pub trait SessionAddress: Clone + Send + Sync + 'static {
    /// Unique id of the session instance behind this address.
    fn instance(&self) -> Uuid;

    /// Whether the session can still accept messages.
    fn is_alive(&self) -> bool;
}

/// Returned by [`ChatRegistry::register`] when a live session already owns
/// the identity.
#[derive(Debug, Clone)]
pub struct AlreadyRegistered<A>(pub A);

/// Identity -> session address map, safe for concurrent use.
pub struct ChatRegistry<A: SessionAddress> {
    entries: DashMap<ConversationId, A>,
}

impl<A: SessionAddress> ChatRegistry<A> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register `address` for `chat_id`.
    ///
    /// Fails with the current address if a live session is registered. A dead
    /// entry is replaced.
    pub fn register(&self, chat_id: ConversationId, address: A) -> Result<(), AlreadyRegistered<A>> {
        match self.entries.entry(chat_id) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_alive() {
                    return Err(AlreadyRegistered(occupied.get().clone()));
                }
                debug!(chat_id = %occupied.key(), "replacing stale registry entry");
                occupied.insert(address);
                Ok(())
            }
            Entry::Vacant(vacant) => {
                debug!(chat_id = %vacant.key(), "registered chat session");
                vacant.insert(address);
                Ok(())
            }
        }
    }

    /// Find the live session for `chat_id`, cleaning up a dead entry.
    pub fn lookup(&self, chat_id: &ConversationId) -> Option<A> {
        // Clone out so the shard lock is released before any removal.
        let address = self.entries.get(chat_id)?.value().clone();
        if address.is_alive() {
            return Some(address);
        }
        self.unregister_instance(chat_id, address.instance());
        None
    }

    /// Remove whatever is registered for `chat_id`. Idempotent.
    ///
    /// Returns `true` if an entry was removed.
    pub fn unregister(&self, chat_id: &ConversationId) -> bool {
        let removed = self.entries.remove(chat_id).is_some();
        if removed {
            debug!(%chat_id, "unregistered chat session");
        }
        removed
    }

    /// Remove the entry for `chat_id` only if it still points at `instance`.
    ///
    /// A stopping session uses this so it never evicts its successor.
    pub fn unregister_instance(&self, chat_id: &ConversationId, instance: Uuid) -> bool {
        let removed = self
            .entries
            .remove_if(chat_id, |_, address| address.instance() == instance)
            .is_some();
        if removed {
            debug!(%chat_id, %instance, "unregistered chat session");
        }
        removed
    }

    /// Number of entries (including dead ones not yet cleaned up).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<A: SessionAddress> Default for ChatRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: SessionAddress> fmt::Debug for ChatRegistry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone)]
    struct FakeAddress {
        instance: Uuid,
        alive: Arc<AtomicBool>,
    }

    impl FakeAddress {
        fn new() -> Self {
            Self {
                instance: Uuid::now_v7(),
                alive: Arc::new(AtomicBool::new(true)),
            }
        }

        fn kill(&self) {
            self.alive.store(false, Ordering::SeqCst);
        }
    }

    impl SessionAddress for FakeAddress {
        fn instance(&self) -> Uuid {
            self.instance
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn register_then_lookup() {
        let registry = ChatRegistry::new();
        let addr = FakeAddress::new();
        registry.register(ConversationId::from(42), addr.clone()).unwrap();

        let found = registry.lookup(&ConversationId::from(42)).unwrap();
        assert_eq!(found.instance(), addr.instance());
        assert!(registry.lookup(&ConversationId::from(43)).is_none());
    }

    #[test]
    fn second_registration_returns_winner() {
        let registry = ChatRegistry::new();
        let first = FakeAddress::new();
        let second = FakeAddress::new();

        registry.register(ConversationId::from(1), first.clone()).unwrap();
        let AlreadyRegistered(winner) = registry
            .register(ConversationId::from(1), second)
            .unwrap_err();

        assert_eq!(winner.instance(), first.instance());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn dead_entry_is_replaced_on_register() {
        let registry = ChatRegistry::new();
        let old = FakeAddress::new();
        registry.register(ConversationId::from(1), old.clone()).unwrap();
        old.kill();

        let fresh = FakeAddress::new();
        registry.register(ConversationId::from(1), fresh.clone()).unwrap();
        let found = registry.lookup(&ConversationId::from(1)).unwrap();
        assert_eq!(found.instance(), fresh.instance());
    }

    #[test]
    fn lookup_cleans_dead_entry() {
        let registry = ChatRegistry::new();
        let addr = FakeAddress::new();
        registry.register(ConversationId::from("42"), addr.clone()).unwrap();
        addr.kill();

        assert!(registry.lookup(&ConversationId::from("42")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ChatRegistry::new();
        registry.register(ConversationId::from(5), FakeAddress::new()).unwrap();

        assert!(registry.unregister(&ConversationId::from(5)));
        assert!(!registry.unregister(&ConversationId::from(5)));
        assert!(registry.lookup(&ConversationId::from(5)).is_none());
    }

    #[test]
    fn unregister_instance_spares_successor() {
        let registry = ChatRegistry::new();
        let old = FakeAddress::new();
        registry.register(ConversationId::from(9), old.clone()).unwrap();
        old.kill();
        let successor = FakeAddress::new();
        registry.register(ConversationId::from(9), successor.clone()).unwrap();

        // The old session finishing its shutdown must not evict the new one.
        assert!(!registry.unregister_instance(&ConversationId::from(9), old.instance()));
        assert!(registry.lookup(&ConversationId::from(9)).is_some());

        assert!(registry.unregister_instance(&ConversationId::from(9), successor.instance()));
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_registration_has_single_winner() {
        let registry = Arc::new(ChatRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .register(ConversationId::from(77), FakeAddress::new())
                        .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn debug_impl() {
        let registry: ChatRegistry<FakeAddress> = ChatRegistry::default();
        let debug = format!("{registry:?}");
        assert!(debug.contains("ChatRegistry"));
        assert!(debug.contains("entries"));
    }
}
