/*!
 * Callback Registry
 * Token-keyed subscription sets, one per event kind
 */

use crate::core::types::Pid;
use crate::events::EventKind;
use ahash::RandomState;
use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Subscriber callback, invoked with the PID of an observed event
pub type ProcessCallback = Arc<dyn Fn(Pid) + Send + Sync>;

/// Opaque subscription token. Identity is the token, never the closure:
/// registering the same closure twice yields two independent
/// subscriptions, each separately removable.
pub type SubscriptionId = u64;

/// Per-kind subscription set
struct KindSlot {
    // Mirrors `!callbacks.is_empty()`; updated only under the write lock
    // so the lock-free hot-path check stays in sync with the map.
    has_subscribers: AtomicBool,
    callbacks: RwLock<HashMap<SubscriptionId, ProcessCallback, RandomState>>,
}

impl KindSlot {
    fn new() -> Self {
        Self {
            has_subscribers: AtomicBool::new(false),
            callbacks: RwLock::new(HashMap::with_hasher(RandomState::new())),
        }
    }
}

/// Registry mapping each event kind to its current subscribers.
///
/// Thread-safe against concurrent subscribe/unsubscribe/dispatch. The
/// event consumption path checks `has_subscribers` (a single atomic
/// load) before touching any lock, so an idle kind costs nothing.
pub struct CallbackRegistry {
    next_id: AtomicU64,
    exec: KindSlot,
    exit: KindSlot,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            exec: KindSlot::new(),
            exit: KindSlot::new(),
        }
    }

    #[inline]
    fn slot(&self, kind: EventKind) -> &KindSlot {
        match kind {
            EventKind::Exec => &self.exec,
            EventKind::Exit => &self.exit,
        }
    }

    /// Register a callback under the given kind.
    ///
    /// Every call creates a new, independent subscription.
    pub fn subscribe(&self, kind: EventKind, callback: ProcessCallback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let slot = self.slot(kind);
        let mut callbacks = slot.callbacks.write();
        callbacks.insert(id, callback);
        slot.has_subscribers.store(true, Ordering::SeqCst);
        drop(callbacks);

        debug!("registered {} callback {}", kind.as_str(), id);
        id
    }

    /// Remove one registration. Repeated calls for the same token are
    /// no-ops and return false.
    ///
    /// Once this returns, the callback is never handed to the dispatch
    /// queue again; units already enqueued before the call may still
    /// fire (dispatch is asynchronous by design).
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let slot = self.slot(kind);
        let mut callbacks = slot.callbacks.write();
        let removed = callbacks.remove(&id).is_some();
        slot.has_subscribers
            .store(!callbacks.is_empty(), Ordering::SeqCst);
        drop(callbacks);

        if removed {
            debug!("unregistered {} callback {}", kind.as_str(), id);
        }
        removed
    }

    /// Lock-free check used on the hot event-consumption path
    #[inline]
    pub fn has_subscribers(&self, kind: EventKind) -> bool {
        self.slot(kind).has_subscribers.load(Ordering::SeqCst)
    }

    /// Visit every current subscriber of `kind` under the read lock
    pub fn for_each(&self, kind: EventKind, mut f: impl FnMut(&ProcessCallback)) {
        let callbacks = self.slot(kind).callbacks.read();
        for callback in callbacks.values() {
            f(callback);
        }
    }

    /// Current subscriber count for `kind`
    pub fn len(&self, kind: EventKind) -> usize {
        self.slot(kind).callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len(EventKind::Exec) == 0 && self.len(EventKind::Exit) == 0
    }

    /// Drop every registration of every kind. Used at monitor teardown
    /// so the next acquire cycle starts from fresh maps.
    pub fn clear(&self) {
        for kind in [EventKind::Exec, EventKind::Exit] {
            let slot = self.slot(kind);
            let mut callbacks = slot.callbacks.write();
            callbacks.clear();
            slot.has_subscribers.store(false, Ordering::SeqCst);
        }
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for one registration.
///
/// `unsubscribe` is idempotent and safe to call concurrently with
/// dispatch. Dropping the handle does NOT unsubscribe; removal is
/// always explicit.
pub struct Subscription {
    registry: Arc<CallbackRegistry>,
    kind: EventKind,
    id: SubscriptionId,
}

impl Subscription {
    pub(crate) fn new(registry: Arc<CallbackRegistry>, kind: EventKind, id: SubscriptionId) -> Self {
        Self { registry, kind, id }
    }

    #[inline]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove this registration; returns false if already removed
    pub fn unsubscribe(&self) -> bool {
        self.registry.unsubscribe(self.kind, self.id)
    }
}
