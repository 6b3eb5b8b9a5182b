//! Priority-preemptive arbiter for the status LED.
//!
//! [`LedArbiter`] owns the single hardware resource and decides, after every
//! state change, which pending event gets it. The decision procedure is the
//! four-way comparison between the active slot and the head of the pending
//! queue described on [`ArbiterState::reschedule`]; everything else in this
//! module is bookkeeping around it.
//!
//! # Synchronization
//! One mutex (the service lock) guards the queue, the active slot and the
//! liveness table. Every entry point — submit, withdraw, turn-off, the
//! control-loop handlers — runs entirely under it, so no two re-evaluations
//! can interleave. The lock is never held across a sleep; the only hardware
//! calls made under it are the fast, non-blocking frame writes.
//!
//! One-shot playback runs on its own task with its own narrow lock (see
//! [`crate::player`]) and re-enters the arbiter exclusively through the
//! control channel:
//!
//! ```text
//! submit/withdraw ──┐                          ┌─► Lights
//!                   ├─► [service lock] ────────┤
//! control loop  ────┘        ▲                 └─► spawn playback task
//!   ▲                        │
//!   │ PlaybackFinished       │ ClientLost
//!   └── playback task        └── liveness callbacks (transport context)
//! ```
//!
//! The channel replaces any back-reference from the player into the service:
//! a completed run reports `PlaybackFinished { generation }` and the handler
//! ignores it unless the generation still matches the active slot, which
//! makes a completion racing a newer activation harmless.

use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::event::{AppId, EventKind, LedEvent, PriorityBounds, FLAG_REPLACE};
use crate::hal::{LedFrame, Lights};
use crate::liveness::{ClientHandle, ClientLiveness, LivenessTracker, LostCallback};
use crate::player::{play, PlaybackControl, PlaybackEnd};
use crate::queue::{EnqueueOutcome, EventQueue};

mod snapshot;

pub use snapshot::ArbiterSnapshot;

// ── Control channel ───────────────────────────────────────────────────────────

/// Asynchronous re-entry points, serialized by the control loop.
#[derive(Debug)]
enum Control {
    /// A one-shot run finished all its repeats without being cancelled.
    PlaybackFinished { generation: u64 },

    /// The transport reported the client owning `app_id` gone.
    ClientLost { app_id: AppId },
}

// ── Active slot ───────────────────────────────────────────────────────────────

/// The event currently owning the hardware, plus the handle to its playback
/// task when it is a one-shot.
struct ActiveEvent {
    event: LedEvent,
    playback: Option<Arc<PlaybackControl>>,
    /// Monotonic activation counter; proves a `PlaybackFinished` message
    /// refers to this occupancy of the slot and not an earlier one.
    generation: u64,
}

// ── ArbiterState ──────────────────────────────────────────────────────────────

/// Everything guarded by the service lock.
struct ArbiterState {
    queue: EventQueue,
    current: Option<ActiveEvent>,
    liveness: LivenessTracker,
    bounds: PriorityBounds,
    lights: Arc<dyn Lights>,
    transport: Arc<dyn ClientLiveness>,
    ctl_tx: mpsc::UnboundedSender<Control>,
    next_generation: u64,
}

impl ArbiterState {
    // ── Re-evaluation ─────────────────────────────────────────────────────────

    /// Pop the highest-priority pending event and decide who owns the LED.
    ///
    /// The four cases over `(current, head)`:
    /// 1. `(None, None)` — make sure the LED is dark. Idempotent.
    /// 2. `(Some, Some)` — `head` preempts when its key is `>=` the active
    ///    key (a displaced periodic re-queues, a displaced one-shot is
    ///    finalized). A strictly lower periodic head goes back to waiting; a
    ///    strictly lower one-shot head is dropped for good.
    /// 3. `(None, Some)` — activate `head`.
    /// 4. `(Some, None)` — the active event keeps running.
    ///
    /// The match is total; there is no error path out of re-evaluation.
    fn reschedule(&mut self) {
        let head = self.queue.pop_highest();
        let current_id = self.current.as_ref().map(|a| a.event.app_id());
        debug!(current = ?current_id, head = ?head.as_ref().map(|e| e.app_id()), "re-evaluate");

        match (current_id, head) {
            (None, None) => self.finish_current(),
            (Some(current_id), Some(head)) => {
                if head.app_id() >= current_id {
                    self.activate(head);
                } else if head.is_periodic() {
                    // Not its turn yet — back into the queue.
                    self.queue.enqueue(head);
                } else {
                    // A one-shot that cannot win now never will; drop it.
                    debug!(
                        app_id = head.app_id(),
                        current_id, "drop one-shot below active priority"
                    );
                    self.liveness.detach(head.app_id(), self.transport.as_ref());
                }
            }
            (None, Some(head)) => self.activate(head),
            (Some(_), None) => {}
        }
    }

    // ── Activation ────────────────────────────────────────────────────────────

    /// Give the LED to `head`, displacing whatever holds it.
    fn activate(&mut self, head: LedEvent) {
        self.displace_current();
        debug_assert!(self.current.is_none(), "active slot must be empty here");

        let generation = self.bump_generation();
        match head.kind() {
            EventKind::Periodic {
                colors,
                on_ms,
                off_ms,
            } => {
                info!(app_id = head.app_id(), "activate periodic event");
                self.lights.set_leds(&LedFrame {
                    colors: *colors,
                    on_ms: *on_ms,
                    off_ms: *off_ms,
                    option: head.option,
                });
                self.current = Some(ActiveEvent {
                    event: head,
                    playback: None,
                    generation,
                });
            }
            EventKind::OneShot { .. } => {
                info!(app_id = head.app_id(), "activate one-shot event");
                let control = PlaybackControl::new();
                self.current = Some(ActiveEvent {
                    event: head.clone(),
                    playback: Some(Arc::clone(&control)),
                    generation,
                });

                // The task gets private copies of everything; it reports back
                // only through the channel.
                let lights = Arc::clone(&self.lights);
                let tx = self.ctl_tx.clone();
                tokio::spawn(async move {
                    if play(control, head, lights).await == PlaybackEnd::Completed {
                        let _ = tx.send(Control::PlaybackFinished { generation });
                    }
                });
            }
        }
    }

    /// Vacate the active slot ahead of a new activation.
    ///
    /// A periodic event survives displacement by returning to the queue. A
    /// one-shot does not: its playback is cancelled (a no-op if it already
    /// finished) and it is finalized on the spot, so its liveness entry never
    /// outlives its claim on the LED.
    fn displace_current(&mut self) {
        let Some(active) = self.current.take() else {
            return;
        };
        if active.event.is_periodic() {
            debug!(app_id = active.event.app_id(), "re-queue displaced periodic event");
            self.queue.enqueue(active.event);
        } else {
            if let Some(control) = &active.playback {
                control.cancel();
            }
            self.finalize(active);
        }
    }

    // ── Finalization ──────────────────────────────────────────────────────────

    /// Release `active`'s liveness entry and darken the LED.
    fn finalize(&mut self, active: ActiveEvent) {
        debug!(app_id = active.event.app_id(), "finalize event");
        self.liveness.detach(active.event.app_id(), self.transport.as_ref());
        self.lights.set_leds(&LedFrame::all_off());
    }

    /// Finalize whatever occupies the slot; with an empty slot this still
    /// forces the LED dark, which is what makes case 1 of
    /// [`reschedule`](Self::reschedule) idempotent.
    fn finish_current(&mut self) {
        match self.current.take() {
            Some(active) => self.finalize(active),
            None => self.lights.set_leds(&LedFrame::all_off()),
        }
    }

    /// Stop the active event, whatever its kind: cancel a running playback,
    /// then finalize. No-op on an empty slot.
    fn stop_current(&mut self) {
        let Some(active) = self.current.take() else {
            return;
        };
        if let Some(control) = &active.playback {
            control.cancel();
        }
        self.finalize(active);
    }

    // ── Entry-point bodies ────────────────────────────────────────────────────

    fn withdraw_key(&mut self, app_id: AppId) {
        if self
            .current
            .as_ref()
            .is_some_and(|a| a.event.app_id() == app_id)
        {
            debug!(app_id, "withdraw removes the active event");
            self.stop_current();
        }
        if self.queue.dequeue(app_id).is_some() {
            self.liveness.detach(app_id, self.transport.as_ref());
        }
        self.reschedule();
    }

    fn playback_finished(&mut self, generation: u64) {
        let is_current = self
            .current
            .as_ref()
            .is_some_and(|a| a.generation == generation);
        if is_current {
            debug!(generation, "one-shot playback complete");
            self.finish_current();
            self.reschedule();
        } else {
            debug!(generation, "ignore completion of superseded playback");
        }
    }

    fn client_lost(&mut self, app_id: AppId) {
        if !self.liveness.is_attached(app_id) {
            debug!(app_id, "client-lost signal for unattached key ignored");
            return;
        }
        warn!(app_id, "client lost — withdrawing its event");
        self.liveness.detach(app_id, self.transport.as_ref());
        self.withdraw_key(app_id);
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

// ── LedArbiter ────────────────────────────────────────────────────────────────

/// Handle to the arbiter service. Cheap to clone; all clones share one
/// service lock and one control loop.
#[derive(Clone)]
pub struct LedArbiter {
    state: Arc<Mutex<ArbiterState>>,
    ctl_tx: mpsc::UnboundedSender<Control>,
}

impl LedArbiter {
    /// Construct the service and start its control loop.
    ///
    /// Must run inside a tokio runtime: activations spawn playback tasks.
    pub fn new(
        lights: Arc<dyn Lights>,
        transport: Arc<dyn ClientLiveness>,
        bounds: PriorityBounds,
    ) -> Self {
        let (ctl_tx, ctl_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(ArbiterState {
            queue: EventQueue::new(),
            current: None,
            liveness: LivenessTracker::new(),
            bounds,
            lights,
            transport,
            ctl_tx: ctl_tx.clone(),
            next_generation: 0,
        }));

        spawn_control_loop(Arc::downgrade(&state), ctl_rx);

        Self { state, ctl_tx }
    }

    /// Submit `event` on behalf of `client`.
    ///
    /// `flags` recognizes [`FLAG_REPLACE`]; all other bits are reserved and
    /// accepted without effect. The only failure is validation — once this
    /// returns `Ok`, the event is the arbiter's problem.
    pub fn submit(
        &self,
        event: LedEvent,
        flags: u32,
        client: ClientHandle,
    ) -> Result<(), crate::event::EventError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        event.validate_bounds(&state.bounds)?;
        if flags & !FLAG_REPLACE != 0 {
            debug!(flags, "ignoring reserved submit flags");
        }

        let app_id = event.app_id();
        info!(app_id, periodic = event.is_periodic(), "submit event");

        // Arm liveness before the queue can accept the event; a rejected
        // one-shot hands the entry straight back.
        let tx = state.ctl_tx.clone();
        let on_lost: LostCallback = Box::new(move || {
            let _ = tx.send(Control::ClientLost { app_id });
        });
        state
            .liveness
            .attach(app_id, client, state.transport.as_ref(), on_lost);

        if state.queue.enqueue(event) == EnqueueOutcome::Rejected {
            state.liveness.detach(app_id, state.transport.as_ref());
        }
        state.reschedule();
        Ok(())
    }

    /// Withdraw whatever event `event`'s app id has in the system; the rest
    /// of the payload and the client handle are ignored. Idempotent.
    pub fn withdraw(&self, event: &LedEvent, _client: ClientHandle) {
        info!(app_id = event.app_id(), "withdraw event");
        self.state.lock().unwrap().withdraw_key(event.app_id());
    }

    /// Force the LED off, stopping the active event. Pending events stay
    /// queued until the next submission or withdrawal re-evaluates.
    pub fn turn_off(&self) {
        self.state.lock().unwrap().stop_current();
    }

    /// Asynchronous client-loss signal, as a transport would deliver it.
    /// Unknown keys are ignored.
    pub fn notify_client_lost(&self, app_id: AppId) {
        let _ = self.ctl_tx.send(Control::ClientLost { app_id });
    }

    /// Point-in-time diagnostic view, taken under the service lock.
    pub fn snapshot(&self) -> ArbiterSnapshot {
        let state = self.state.lock().unwrap();
        ArbiterSnapshot {
            current: state.current.as_ref().map(|a| a.event.clone()),
            pending: state.queue.iter().cloned().collect(),
            liveness_keys: state.liveness.attached_keys(),
        }
    }
}

// ── Control loop ──────────────────────────────────────────────────────────────

/// Drain the control channel, re-entering the service lock per message.
///
/// Holds only a weak reference to the state: the loop dies with the last
/// arbiter handle instead of keeping the state alive through its own sender.
fn spawn_control_loop(state: Weak<Mutex<ArbiterState>>, mut rx: mpsc::UnboundedReceiver<Control>) {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Some(state) = state.upgrade() else {
                break;
            };
            let mut state = state.lock().unwrap();
            match msg {
                Control::PlaybackFinished { generation } => state.playback_finished(generation),
                Control::ClientLost { app_id } => state.client_lost(app_id),
            }
        }
        debug!("arbiter control loop stopped");
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{color, Step, APP_ID_BATTERY, APP_ID_CALL, LED_COUNT};
    use crate::hal::RecordingLights;
    use crate::liveness::LocalLiveness;
    use std::time::Duration;

    const CLIENT_A: ClientHandle = ClientHandle(100);
    const CLIENT_B: ClientHandle = ClientHandle(200);

    fn arbiter() -> (LedArbiter, Arc<RecordingLights>, Arc<LocalLiveness>) {
        let lights = Arc::new(RecordingLights::default());
        let transport = Arc::new(LocalLiveness::new());
        let arb = LedArbiter::new(
            lights.clone(),
            transport.clone(),
            PriorityBounds::default(),
        );
        (arb, lights, transport)
    }

    fn periodic(app_id: AppId, c: i32) -> LedEvent {
        LedEvent::periodic(app_id, &[c; LED_COUNT], 200, 3000).unwrap()
    }

    fn one_shot(app_id: AppId, c: i32, duration_ms: u32) -> LedEvent {
        let steps = vec![
            Step {
                duration_ms,
                colors: [c; LED_COUNT],
            },
            Step {
                duration_ms,
                colors: [color::BLACK; LED_COUNT],
            },
        ];
        LedEvent::one_shot(app_id, steps, 1).unwrap()
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met within 2s");
    }

    fn active_id(arb: &LedArbiter) -> Option<AppId> {
        arb.snapshot().current.map(|e| e.app_id())
    }

    // ── Activation & queueing ─────────────────────────────────────────────────

    #[tokio::test]
    async fn first_periodic_submission_activates_immediately() {
        let (arb, lights, _) = arbiter();
        arb.submit(periodic(APP_ID_CALL, color::RED), FLAG_REPLACE, CLIENT_A)
            .unwrap();

        assert_eq!(active_id(&arb), Some(APP_ID_CALL));
        let last = lights.last().unwrap();
        assert_eq!(last.colors, [color::RED; LED_COUNT]);
        assert_eq!(last.on_ms, 200);
        assert_eq!(last.off_ms, 3000);
    }

    #[tokio::test]
    async fn lower_priority_periodic_waits_in_queue() {
        let (arb, _, transport) = arbiter();
        arb.submit(periodic(APP_ID_CALL, color::RED), FLAG_REPLACE, CLIENT_A)
            .unwrap();
        arb.submit(periodic(APP_ID_BATTERY, color::GREEN), FLAG_REPLACE, CLIENT_B)
            .unwrap();

        let snap = arb.snapshot();
        assert_eq!(snap.current.map(|e| e.app_id()), Some(APP_ID_CALL));
        assert_eq!(snap.pending.len(), 1);
        assert_eq!(snap.pending[0].app_id(), APP_ID_BATTERY);
        assert_eq!(snap.liveness_keys, vec![APP_ID_BATTERY, APP_ID_CALL]);
        assert_eq!(transport.armed(), 2);
    }

    #[tokio::test]
    async fn higher_priority_periodic_preempts_and_requeues_the_loser() {
        let (arb, lights, _) = arbiter();
        arb.submit(periodic(APP_ID_BATTERY, color::GREEN), FLAG_REPLACE, CLIENT_A)
            .unwrap();
        arb.submit(periodic(APP_ID_CALL, color::RED), FLAG_REPLACE, CLIENT_B)
            .unwrap();

        let snap = arb.snapshot();
        assert_eq!(snap.current.map(|e| e.app_id()), Some(APP_ID_CALL));
        assert_eq!(snap.pending[0].app_id(), APP_ID_BATTERY);

        // Displacing a periodic event repaints directly — no blackout frame.
        let frames = lights.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].colors, [color::RED; LED_COUNT]);
    }

    #[tokio::test]
    async fn equal_priority_submission_preempts_the_active_slot() {
        let (arb, lights, _) = arbiter();
        arb.submit(periodic(APP_ID_CALL, color::RED), FLAG_REPLACE, CLIENT_A)
            .unwrap();
        arb.submit(periodic(APP_ID_CALL, color::WHITE), FLAG_REPLACE, CLIENT_A)
            .unwrap();

        assert_eq!(
            lights.last().unwrap().colors,
            [color::WHITE; LED_COUNT],
            "same-key submission takes over the slot"
        );
    }

    // ── One-shot admission ────────────────────────────────────────────────────

    #[tokio::test]
    async fn low_one_shot_against_higher_active_periodic_is_dropped() {
        // The pending queue is empty, so the one-shot enqueues fine; it is
        // the re-evaluation against the active slot that discards it.
        let (arb, _, transport) = arbiter();
        arb.submit(periodic(APP_ID_CALL, color::RED), FLAG_REPLACE, CLIENT_A)
            .unwrap();
        arb.submit(
            one_shot(APP_ID_BATTERY, color::BLUE, 100),
            FLAG_REPLACE,
            CLIENT_B,
        )
        .unwrap();

        let snap = arb.snapshot();
        assert_eq!(snap.current.map(|e| e.app_id()), Some(APP_ID_CALL));
        assert!(snap.pending.is_empty(), "the one-shot must not linger");
        assert_eq!(
            snap.liveness_keys,
            vec![APP_ID_CALL],
            "the dropped one-shot's liveness entry is released"
        );
        assert_eq!(transport.armed(), 1);
    }

    #[tokio::test]
    async fn one_shot_queued_behind_higher_pending_head_is_rejected() {
        let (arb, _, transport) = arbiter();
        // Active 20, pending 10 — now a one-shot 5 must be rejected at the
        // queue itself (head 10 > 5).
        arb.submit(periodic(APP_ID_CALL, color::RED), FLAG_REPLACE, CLIENT_A)
            .unwrap();
        arb.submit(periodic(10, color::YELLOW), FLAG_REPLACE, CLIENT_A)
            .unwrap();
        arb.submit(one_shot(5, color::BLUE, 100), FLAG_REPLACE, CLIENT_B)
            .unwrap();

        let snap = arb.snapshot();
        assert_eq!(snap.pending.len(), 1);
        assert_eq!(snap.liveness_keys, vec![10, APP_ID_CALL]);
        assert_eq!(transport.armed(), 2);
    }

    #[tokio::test]
    async fn higher_one_shot_preempts_running_one_shot() {
        let (arb, lights, _) = arbiter();
        // 60 s steps keep the low one-shot mid-playback for the whole test.
        arb.submit(
            one_shot(APP_ID_BATTERY, color::BLUE, 60_000),
            FLAG_REPLACE,
            CLIENT_A,
        )
        .unwrap();

        let probe = lights.clone();
        wait_for(move || !probe.frames().is_empty()).await;

        arb.submit(
            one_shot(APP_ID_CALL, color::MAGENTA, 60_000),
            FLAG_REPLACE,
            CLIENT_B,
        )
        .unwrap();

        assert_eq!(active_id(&arb), Some(APP_ID_CALL));
        assert!(arb.snapshot().pending.is_empty(), "one-shots never re-queue");
        assert_eq!(arb.snapshot().liveness_keys, vec![APP_ID_CALL]);

        let probe = lights.clone();
        wait_for(move || {
            probe
                .frames()
                .iter()
                .any(|f| f.colors == [color::MAGENTA; LED_COUNT])
        })
        .await;
    }

    // ── Completion ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn one_shot_completion_restores_the_preempted_periodic() {
        let (arb, lights, transport) = arbiter();
        arb.submit(periodic(APP_ID_BATTERY, color::GREEN), FLAG_REPLACE, CLIENT_A)
            .unwrap();
        arb.submit(one_shot(APP_ID_CALL, color::CYAN, 20), FLAG_REPLACE, CLIENT_B)
            .unwrap();

        assert_eq!(active_id(&arb), Some(APP_ID_CALL));

        // ~40 ms of playback, then completion promotes the periodic again.
        let arb2 = arb.clone();
        wait_for(move || active_id(&arb2) == Some(APP_ID_BATTERY)).await;

        assert!(arb.snapshot().pending.is_empty());
        assert_eq!(arb.snapshot().liveness_keys, vec![APP_ID_BATTERY]);
        assert_eq!(transport.armed(), 1);
        assert_eq!(
            lights.last().unwrap().colors,
            [color::GREEN; LED_COUNT],
            "the periodic frame is repainted after the one-shot's blackout"
        );
    }

    // ── Withdrawal ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn withdrawing_the_active_periodic_promotes_the_next() {
        let (arb, lights, _) = arbiter();
        arb.submit(periodic(APP_ID_CALL, color::RED), FLAG_REPLACE, CLIENT_A)
            .unwrap();
        arb.submit(periodic(APP_ID_BATTERY, color::GREEN), FLAG_REPLACE, CLIENT_B)
            .unwrap();

        arb.withdraw(&periodic(APP_ID_CALL, color::RED), CLIENT_A);

        let snap = arb.snapshot();
        assert_eq!(snap.current.map(|e| e.app_id()), Some(APP_ID_BATTERY));
        assert!(snap.pending.is_empty());
        assert_eq!(snap.liveness_keys, vec![APP_ID_BATTERY]);
        assert_eq!(lights.last().unwrap().colors, [color::GREEN; LED_COUNT]);
    }

    #[tokio::test]
    async fn withdrawing_the_active_one_shot_cancels_its_playback() {
        let (arb, lights, transport) = arbiter();
        let ev = one_shot(APP_ID_CALL, color::BLUE, 60_000);
        arb.submit(ev.clone(), FLAG_REPLACE, CLIENT_A).unwrap();

        let probe = lights.clone();
        wait_for(move || !probe.frames().is_empty()).await;

        arb.withdraw(&ev, CLIENT_A);

        let snap = arb.snapshot();
        assert!(snap.current.is_none());
        assert!(snap.liveness_keys.is_empty());
        assert_eq!(transport.armed(), 0);
        assert!(lights.last().unwrap().is_dark());

        // The cancelled task writes nothing further.
        let count = lights.frames().len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(lights.frames().len(), count);
    }

    #[tokio::test]
    async fn withdrawing_an_unknown_key_changes_nothing() {
        let (arb, _, transport) = arbiter();
        arb.submit(periodic(APP_ID_CALL, color::RED), FLAG_REPLACE, CLIENT_A)
            .unwrap();

        arb.withdraw(&periodic(7, color::BLACK), CLIENT_B);

        let snap = arb.snapshot();
        assert_eq!(snap.current.map(|e| e.app_id()), Some(APP_ID_CALL));
        assert_eq!(snap.liveness_keys, vec![APP_ID_CALL]);
        assert_eq!(transport.armed(), 1);
    }

    // ── Liveness loss ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn losing_the_active_client_turns_off_and_promotes_the_next() {
        let (arb, lights, transport) = arbiter();
        arb.submit(periodic(10, color::RED), FLAG_REPLACE, CLIENT_A)
            .unwrap();
        arb.submit(periodic(APP_ID_BATTERY, color::GREEN), FLAG_REPLACE, CLIENT_B)
            .unwrap();

        transport.report_lost(CLIENT_A);

        let arb2 = arb.clone();
        wait_for(move || active_id(&arb2) == Some(APP_ID_BATTERY)).await;
        assert_eq!(arb.snapshot().liveness_keys, vec![APP_ID_BATTERY]);
        assert_eq!(lights.last().unwrap().colors, [color::GREEN; LED_COUNT]);
    }

    #[tokio::test]
    async fn losing_a_queued_client_only_dequeues() {
        let (arb, _, transport) = arbiter();
        arb.submit(periodic(APP_ID_CALL, color::RED), FLAG_REPLACE, CLIENT_A)
            .unwrap();
        arb.submit(periodic(APP_ID_BATTERY, color::GREEN), FLAG_REPLACE, CLIENT_B)
            .unwrap();

        transport.report_lost(CLIENT_B);

        let arb2 = arb.clone();
        wait_for(move || arb2.snapshot().pending.is_empty()).await;
        assert_eq!(active_id(&arb), Some(APP_ID_CALL));
        assert_eq!(arb.snapshot().liveness_keys, vec![APP_ID_CALL]);
    }

    #[tokio::test]
    async fn client_lost_for_unattached_key_is_a_no_op() {
        let (arb, _, _) = arbiter();
        arb.submit(periodic(APP_ID_CALL, color::RED), FLAG_REPLACE, CLIENT_A)
            .unwrap();

        arb.notify_client_lost(9);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snap = arb.snapshot();
        assert_eq!(snap.current.map(|e| e.app_id()), Some(APP_ID_CALL));
        assert_eq!(snap.liveness_keys, vec![APP_ID_CALL]);
    }

    // ── Validation & flags ────────────────────────────────────────────────────

    #[tokio::test]
    async fn out_of_bounds_app_id_is_rejected_before_any_state_change() {
        let (arb, lights, transport) = arbiter();
        let err = arb
            .submit(periodic(99, color::RED), FLAG_REPLACE, CLIENT_A)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::event::EventError::AppIdOutOfRange { app_id: 99, .. }
        ));

        assert!(arb.snapshot().current.is_none());
        assert!(arb.snapshot().liveness_keys.is_empty());
        assert_eq!(transport.armed(), 0);
        assert!(lights.frames().is_empty());
    }

    #[tokio::test]
    async fn reserved_flags_are_accepted_without_effect() {
        let (arb, _, _) = arbiter();
        arb.submit(
            periodic(APP_ID_CALL, color::RED),
            crate::event::FLAG_UNDEFINED | 0x80,
            CLIENT_A,
        )
        .unwrap();
        assert_eq!(active_id(&arb), Some(APP_ID_CALL));
    }

    // ── Preemption invariant ──────────────────────────────────────────────────

    #[tokio::test]
    async fn active_slot_always_holds_the_highest_key() {
        let (arb, _, _) = arbiter();
        for id in [3, 12, 7, 20, 1] {
            arb.submit(periodic(id, color::RED), FLAG_REPLACE, CLIENT_A)
                .unwrap();
            let snap = arb.snapshot();
            let active = snap.current.as_ref().map(|e| e.app_id()).unwrap();
            for pending in &snap.pending {
                assert!(pending.app_id() < active);
            }
        }

        // Draining by withdrawal walks down the priority order.
        for expect in [20, 12, 7, 3, 1] {
            assert_eq!(active_id(&arb), Some(expect));
            arb.withdraw(&periodic(expect, color::RED), CLIENT_A);
        }
        assert!(arb.snapshot().current.is_none());
    }

    // ── turn_off ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn turn_off_stops_the_active_event_but_keeps_the_queue() {
        let (arb, lights, _) = arbiter();
        arb.submit(periodic(APP_ID_CALL, color::RED), FLAG_REPLACE, CLIENT_A)
            .unwrap();
        arb.submit(periodic(APP_ID_BATTERY, color::GREEN), FLAG_REPLACE, CLIENT_B)
            .unwrap();

        arb.turn_off();

        let snap = arb.snapshot();
        assert!(snap.current.is_none());
        assert_eq!(snap.pending.len(), 1, "queued events await the next trigger");
        assert!(lights.last().unwrap().is_dark());
    }
}
