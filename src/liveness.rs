/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Client liveness tracking.
//!
//! A client that submits an event may die without withdrawing it, which
//! would leave its pattern on the LED forever. The transport that carries
//! client calls is the only component that can observe a client vanishing,
//! so it is modelled as a capability: [`ClientLiveness::subscribe`] arms a
//! one-shot callback for a client handle, [`ClientLiveness::unsubscribe`]
//! disarms it.
//!
//! [`LivenessTracker`] is the arbiter-side bookkeeping: at most one
//! subscription per app id, created on first submission and dropped when the
//! event leaves the system. The tracker is plain data guarded by the service
//! lock; delivery of a loss signal re-enters the arbiter through its control
//! channel, never synchronously from transport context.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::event::AppId;

// ── Transport-facing types ────────────────────────────────────────────────────

/// Opaque identity of a client process, assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientHandle(pub u64);

/// Token for one armed liveness subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Callback fired at most once when the subscribed client disappears.
pub type LostCallback = Box<dyn FnOnce() + Send + 'static>;

/// Liveness capability provided by the transport collaborator.
///
/// Delivery is best-effort: a transport that fails to arm a subscription
/// logs the problem and the worst outcome is a stale LED pattern until the
/// next explicit withdrawal.
pub trait ClientLiveness: Send + Sync {
    /// Arm `on_lost` to fire when `client` terminates.
    fn subscribe(&self, client: ClientHandle, on_lost: LostCallback) -> SubscriptionId;

    /// Disarm a subscription. Unknown or already-fired ids are a no-op.
    fn unsubscribe(&self, id: SubscriptionId);
}

// ── LivenessTracker ───────────────────────────────────────────────────────────

/// App-id → subscription map owned by the arbiter.
///
/// `BTreeMap` so the diagnostic snapshot lists keys in a stable order.
#[derive(Default)]
pub struct LivenessTracker {
    entries: BTreeMap<AppId, SubscriptionId>,
}

impl LivenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `app_id` to `client`'s liveness, unless already attached.
    ///
    /// Idempotent per key: a repeat submission for an app id that is already
    /// tracked keeps the original subscription and drops `on_lost` unused.
    pub fn attach(
        &mut self,
        app_id: AppId,
        client: ClientHandle,
        transport: &dyn ClientLiveness,
        on_lost: LostCallback,
    ) {
        if self.entries.contains_key(&app_id) {
            return;
        }
        let id = transport.subscribe(client, on_lost);
        debug!(app_id, subscription = id.0, "attach liveness entry");
        self.entries.insert(app_id, id);
    }

    /// Drop the subscription for `app_id`, if any.
    pub fn detach(&mut self, app_id: AppId, transport: &dyn ClientLiveness) {
        if let Some(id) = self.entries.remove(&app_id) {
            debug!(app_id, subscription = id.0, "detach liveness entry");
            transport.unsubscribe(id);
        }
    }

    pub fn is_attached(&self, app_id: AppId) -> bool {
        self.entries.contains_key(&app_id)
    }

    /// Attached app ids in ascending order.
    pub fn attached_keys(&self) -> Vec<AppId> {
        self.entries.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── LocalLiveness ─────────────────────────────────────────────────────────────

/// In-process [`ClientLiveness`] implementation.
///
/// Stands in for a real transport in the demo binary and in tests:
/// [`LocalLiveness::report_lost`] plays the role of the process-death signal
/// and fires every subscription armed for that client handle.
#[derive(Default)]
pub struct LocalLiveness {
    inner: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscriptions: HashMap<u64, (ClientHandle, LostCallback)>,
}

impl LocalLiveness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the death of `client`: fire and remove every subscription
    /// armed for it. Callbacks run outside the registry lock.
    pub fn report_lost(&self, client: ClientHandle) {
        let fired: Vec<LostCallback> = {
            let mut inner = self.inner.lock().unwrap();
            let ids: Vec<u64> = inner
                .subscriptions
                .iter()
                .filter(|(_, (c, _))| *c == client)
                .map(|(&id, _)| id)
                .collect();
            ids.into_iter()
                .filter_map(|id| inner.subscriptions.remove(&id).map(|(_, cb)| cb))
                .collect()
        };
        if fired.is_empty() {
            warn!(client = client.0, "client lost with no subscriptions armed");
        }
        for cb in fired {
            cb();
        }
    }

    /// Number of currently armed subscriptions.
    pub fn armed(&self) -> usize {
        self.inner.lock().unwrap().subscriptions.len()
    }
}

impl ClientLiveness for LocalLiveness {
    fn subscribe(&self, client: ClientHandle, on_lost: LostCallback) -> SubscriptionId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscriptions.insert(id, (client, on_lost));
        SubscriptionId(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.lock().unwrap().subscriptions.remove(&id.0);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_callback(counter: &Arc<AtomicUsize>) -> LostCallback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    // ── LivenessTracker ───────────────────────────────────────────────────────

    #[test]
    fn attach_is_idempotent_per_key() {
        let transport = LocalLiveness::new();
        let mut tracker = LivenessTracker::new();
        let fired = Arc::new(AtomicUsize::new(0));

        tracker.attach(5, ClientHandle(1), &transport, counting_callback(&fired));
        tracker.attach(5, ClientHandle(1), &transport, counting_callback(&fired));

        assert_eq!(transport.armed(), 1, "second attach must not re-subscribe");
        assert!(tracker.is_attached(5));
    }

    #[test]
    fn detach_disarms_the_subscription() {
        let transport = LocalLiveness::new();
        let mut tracker = LivenessTracker::new();
        let fired = Arc::new(AtomicUsize::new(0));

        tracker.attach(5, ClientHandle(1), &transport, counting_callback(&fired));
        tracker.detach(5, &transport);

        assert_eq!(transport.armed(), 0);
        assert!(!tracker.is_attached(5));

        // Death after detach fires nothing.
        transport.report_lost(ClientHandle(1));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn detach_of_unknown_key_is_a_no_op() {
        let transport = LocalLiveness::new();
        let mut tracker = LivenessTracker::new();
        tracker.detach(42, &transport);
        assert!(tracker.is_empty());
    }

    #[test]
    fn attached_keys_are_sorted() {
        let transport = LocalLiveness::new();
        let mut tracker = LivenessTracker::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for id in [20, 5, 11] {
            tracker.attach(id, ClientHandle(7), &transport, counting_callback(&fired));
        }
        assert_eq!(tracker.attached_keys(), vec![5, 11, 20]);
    }

    // ── LocalLiveness ─────────────────────────────────────────────────────────

    #[test]
    fn report_lost_fires_each_subscription_once() {
        let transport = LocalLiveness::new();
        let fired = Arc::new(AtomicUsize::new(0));

        transport.subscribe(ClientHandle(1), counting_callback(&fired));
        transport.subscribe(ClientHandle(1), counting_callback(&fired));
        transport.subscribe(ClientHandle(2), counting_callback(&fired));

        transport.report_lost(ClientHandle(1));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(transport.armed(), 1, "client 2 remains armed");

        // A second report for the same client finds nothing to fire.
        transport.report_lost(ClientHandle(1));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_of_fired_id_is_harmless() {
        let transport = LocalLiveness::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let id = transport.subscribe(ClientHandle(1), counting_callback(&fired));
        transport.report_lost(ClientHandle(1));
        transport.unsubscribe(id);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
