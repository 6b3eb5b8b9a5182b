//! Pending-event queue, ordered by priority.
//!
//! Pure data-structure logic: no locking, no liveness, no hardware. The
//! arbiter mutates the queue only while holding its service lock and reacts
//! to the [`EnqueueOutcome`] itself (in particular, releasing the liveness
//! entry it speculatively created for a rejected one-shot).
//!
//! Ordering: descending by app id, so index 0 is always the highest-priority
//! pending event. Keys are unique within the queue (same-key submissions
//! replace in place), which makes the descending sort total and the queue
//! deterministic.

use tracing::{debug, warn};

use crate::event::{AppId, LedEvent};

// ── Outcome ───────────────────────────────────────────────────────────────────

/// What [`EventQueue::enqueue`] did with the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended as a new entry.
    Queued,

    /// Replaced an existing entry with the same app id.
    Replaced,

    /// One-shot submission dropped because a strictly higher-priority event
    /// is already pending. The caller owns the cleanup of anything it
    /// prepared for this event.
    Rejected,
}

// ── EventQueue ────────────────────────────────────────────────────────────────

/// Ordered collection of pending [`LedEvent`]s, keyed by app id.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<LedEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `event`, replacing any same-key entry, and restore descending
    /// order.
    ///
    /// A one-shot event is rejected outright when the current head has a
    /// strictly greater app id: one-shots are fire-and-forget, and queueing
    /// one behind work that will never yield to it would just let it rot.
    /// Periodic events are exempt — being preempted and resumed is their
    /// normal life cycle.
    ///
    /// Note the strict `>` here versus the `>=` the arbiter uses when a head
    /// challenges the active slot. The asymmetry is load-bearing: an
    /// equal-priority one-shot may replace its own predecessor but must not
    /// be rejected by it.
    pub fn enqueue(&mut self, event: LedEvent) -> EnqueueOutcome {
        let app_id = event.app_id();

        if !event.is_periodic() {
            if let Some(head) = self.events.first() {
                if head.app_id() > app_id {
                    warn!(
                        app_id,
                        head_app_id = head.app_id(),
                        "reject one-shot enqueue: lower priority than pending head"
                    );
                    return EnqueueOutcome::Rejected;
                }
            }
        }

        let outcome = match self.events.iter_mut().find(|e| e.app_id() == app_id) {
            Some(slot) => {
                debug!(app_id, "replace pending event");
                *slot = event;
                EnqueueOutcome::Replaced
            }
            None => {
                debug!(app_id, "enqueue event");
                self.events.push(event);
                EnqueueOutcome::Queued
            }
        };

        // Keys are unique, so the descending sort has no ties to break.
        self.events.sort_by(|a, b| b.app_id().cmp(&a.app_id()));
        outcome
    }

    /// Remove and return the entry with `app_id`, if present.
    pub fn dequeue(&mut self, app_id: AppId) -> Option<LedEvent> {
        let index = self.events.iter().position(|e| e.app_id() == app_id)?;
        debug!(app_id, "dequeue event");
        Some(self.events.remove(index))
    }

    /// Remove and return the highest-priority pending event.
    pub fn pop_highest(&mut self) -> Option<LedEvent> {
        if self.events.is_empty() {
            None
        } else {
            Some(self.events.remove(0))
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Pending events in priority order (highest first).
    pub fn iter(&self) -> impl Iterator<Item = &LedEvent> {
        self.events.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
