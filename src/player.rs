/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Background player for one-shot sequences.
//!
//! One [`PlaybackControl`] is created per activation and shared between the
//! arbiter (which may cancel) and the spawned playback task. The control's
//! mutex is the playback lock: the task holds it across every hardware write
//! and releases it only for the timed wait, so once [`PlaybackControl::cancel`]
//! has returned — having set the flag under that same lock — no further write
//! from this run can reach the hardware.
//!
//! The timed wait races the step duration against the cancellation bell.
//! `Notify::notify_one` stores a permit, so a cancel that lands between the
//! flag check and the wait still wakes the sleeper immediately instead of
//! letting it doze through a full step.
//!
//! The player never touches the arbiter's state or lock. On natural
//! completion [`play`] returns [`PlaybackEnd::Completed`] and the arbiter's
//! wrapper task reports back through the control channel; a cancelled run
//! returns silently because the canceller owns the cleanup.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

use crate::event::{EventKind, LedEvent};
use crate::hal::{LedFrame, Lights};

// ── PlaybackControl ───────────────────────────────────────────────────────────

#[derive(Default)]
struct PlaybackState {
    cancelled: bool,
    running: bool,
}

/// Shared cancellation state for one playback run.
pub struct PlaybackControl {
    state: Mutex<PlaybackState>,
    bell: Notify,
}

impl PlaybackControl {
    /// Create a control already in the running state.
    ///
    /// "Running" is armed here, not in [`play`], so that a cancel landing in
    /// the gap between spawning the task and its first poll is not mistaken
    /// for a no-op.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PlaybackState {
                cancelled: false,
                running: true,
            }),
            bell: Notify::new(),
        })
    }

    /// Request cancellation of the run.
    ///
    /// Returns `true` if a run was in progress (the caller then owns the
    /// finalize step), `false` for the cheap no-op case. Safe to call from
    /// any thread, any number of times.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.running {
            return false;
        }
        state.cancelled = true;
        drop(state);
        self.bell.notify_one();
        true
    }
}

// ── Playback ──────────────────────────────────────────────────────────────────

/// How a playback run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// All repeats ran to the end; the caller must finalize and reschedule.
    Completed,

    /// Cancellation was observed; the canceller performs the cleanup.
    Cancelled,
}

/// Run `event`'s one-shot sequence to completion or cancellation.
///
/// `event` is the player's private snapshot — the queue and active slot hold
/// their own copies and none of them is shared mutable state.
pub async fn play(
    control: Arc<PlaybackControl>,
    event: LedEvent,
    lights: Arc<dyn Lights>,
) -> PlaybackEnd {
    let EventKind::OneShot { steps, repeat } = event.kind() else {
        // The arbiter only hands one-shot events to the player.
        debug_assert!(false, "playback started for a periodic event");
        control.state.lock().unwrap().running = false;
        return PlaybackEnd::Completed;
    };

    debug!(app_id = event.app_id(), repeat, "begin one-shot playback");

    'run: for _ in 0..*repeat {
        for step in steps {
            {
                let state = control.state.lock().unwrap();
                if state.cancelled {
                    break 'run;
                }
                lights.set_leds(&LedFrame {
                    colors: step.colors,
                    on_ms: 0,
                    off_ms: 0,
                    option: event.option,
                });
            }

            tokio::select! {
                _ = control.bell.notified() => {}
                _ = tokio::time::sleep(Duration::from_millis(u64::from(step.duration_ms))) => {}
            }
        }
    }

    let mut state = control.state.lock().unwrap();
    state.running = false;
    let end = if state.cancelled {
        PlaybackEnd::Cancelled
    } else {
        PlaybackEnd::Completed
    };
    debug!(app_id = event.app_id(), ?end, "end one-shot playback");
    end
}

// ── Tests ─────────────────────────────────────────────────────────────────────
