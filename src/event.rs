/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core event data structures for the LED arbiter.
//!
//! A [`LedEvent`] is one application's display request for the 7-segment
//! status LED. It is immutable after construction — a client that wants a
//! different pattern submits a new event, which replaces the old one under
//! the arbiter's same-key semantics.
//!
//! ```text
//! client ──(wire words)──► LedEvent ──(arbiter)──► LedFrame ──► Lights
//!                           ↑ validated at construction
//! ```
//!
//! The periodic/one-shot split is a tagged enum rather than two types: the
//! two kinds flow through exactly the same queue and active-slot machinery
//! and only diverge at activation time.

use std::fmt;

use thiserror::Error;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Number of individually addressable LED segments.
pub const LED_COUNT: usize = 7;

/// Priority key identifying an application class. Doubles as the scheduling
/// priority: higher wins.
pub type AppId = i32;

/// Battery/charging indications.
pub const APP_ID_BATTERY: AppId = 5;

/// Incoming-call indications — the highest-priority application class.
pub const APP_ID_CALL: AppId = 20;

/// Replace an already-queued event with the same app id. This is the only
/// flag with defined behaviour, and replacement is also what the queue does
/// by default, so the flag is informational.
pub const FLAG_REPLACE: u32 = 0x0000_0001;

/// Reserved flag value. Accepted and ignored.
pub const FLAG_UNDEFINED: u32 = 0x0000_0002;

/// Segment color values, `0x00RRGGBB`.
pub mod color {
    pub const BLACK: i32 = 0x0000_0000;
    pub const WHITE: i32 = 0x00FF_FFFF;
    pub const RED: i32 = 0x00FF_0000;
    pub const YELLOW: i32 = 0x00FF_FF00;
    pub const GREEN: i32 = 0x0000_FF00;
    pub const CYAN: i32 = 0x0000_FFFF;
    pub const BLUE: i32 = 0x0000_00FF;
    pub const MAGENTA: i32 = 0x00FF_00FF;
}

// ── Priority bounds ───────────────────────────────────────────────────────────

/// Exclusive bounds on valid app ids: `min < id < top`.
///
/// The defaults admit ids 1..=20, with [`APP_ID_CALL`] at the top of the
/// range. Deployments with more application classes raise `top` via the
/// configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityBounds {
    pub min: AppId,
    pub top: AppId,
}

impl PriorityBounds {
    /// `true` if `app_id` lies strictly between the bounds.
    pub fn contains(&self, app_id: AppId) -> bool {
        app_id > self.min && app_id < self.top
    }
}

impl Default for PriorityBounds {
    fn default() -> Self {
        Self {
            min: 0,
            top: APP_ID_CALL + 1,
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why an event failed validation.
///
/// This is the only fallible edge a client sees: every variant is produced
/// synchronously at construction or submission time, before the event touches
/// any scheduler state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    /// App id outside the configured `(min, top)` exclusive range.
    #[error("app id {app_id} is outside the valid range ({min}, {top}) exclusive")]
    AppIdOutOfRange {
        app_id: AppId,
        min: AppId,
        top: AppId,
    },

    /// A color slice whose length is not [`LED_COUNT`].
    #[error("expected {LED_COUNT} segment colors, got {actual}")]
    WrongColorCount { actual: usize },

    /// A one-shot event with no steps.
    #[error("one-shot event has an empty step sequence")]
    EmptySequence,

    /// A one-shot event with `repeat == 0`.
    #[error("one-shot repeat count must be greater than zero")]
    ZeroRepeat,

    /// A step that would play for zero milliseconds.
    #[error("step {index} has zero duration")]
    ZeroStepDuration { index: usize },
}

// ── Event data model ──────────────────────────────────────────────────────────

/// One timed entry of a one-shot sequence: a full 7-segment frame shown for
/// `duration_ms` before the player advances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub duration_ms: u32,
    pub colors: [i32; LED_COUNT],
}

/// Payload of a [`LedEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A steady blink pattern the hardware sustains on its own. Designed to
    /// be preempted and resumed, so the arbiter re-queues it when displaced.
    Periodic {
        colors: [i32; LED_COUNT],
        on_ms: u32,
        off_ms: u32,
    },

    /// A finite sequence the background player drives step by step. Never
    /// re-queued: if it cannot run now, it is dropped.
    OneShot { steps: Vec<Step>, repeat: u32 },
}

/// A display request for the status LED, tagged with the priority key of the
/// submitting application class.
///
/// `app_id` and the payload are fixed at construction; `option` is an opaque
/// pass-through flag the hardware layer interprets (the arbiter never looks
/// at it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedEvent {
    app_id: AppId,
    /// Opaque value forwarded verbatim with every hardware call.
    pub option: i32,
    kind: EventKind,
}

impl LedEvent {
    /// Build a periodic event.
    ///
    /// # Errors
    /// [`EventError::WrongColorCount`] unless `colors` has exactly
    /// [`LED_COUNT`] entries.
    pub fn periodic(
        app_id: AppId,
        colors: &[i32],
        on_ms: u32,
        off_ms: u32,
    ) -> Result<Self, EventError> {
        let colors: [i32; LED_COUNT] = colors
            .try_into()
            .map_err(|_| EventError::WrongColorCount {
                actual: colors.len(),
            })?;
        Ok(Self {
            app_id,
            option: 0,
            kind: EventKind::Periodic {
                colors,
                on_ms,
                off_ms,
            },
        })
    }

    /// Build a one-shot event.
    ///
    /// # Errors
    /// * [`EventError::EmptySequence`] for an empty `steps`.
    /// * [`EventError::ZeroRepeat`] for `repeat == 0`.
    /// * [`EventError::ZeroStepDuration`] if any step would play for 0 ms —
    ///   such a step could never be observed and would spin the player.
    pub fn one_shot(app_id: AppId, steps: Vec<Step>, repeat: u32) -> Result<Self, EventError> {
        if steps.is_empty() {
            return Err(EventError::EmptySequence);
        }
        if repeat == 0 {
            return Err(EventError::ZeroRepeat);
        }
        if let Some(index) = steps.iter().position(|s| s.duration_ms == 0) {
            return Err(EventError::ZeroStepDuration { index });
        }
        Ok(Self {
            app_id,
            option: 0,
            kind: EventKind::OneShot { steps, repeat },
        })
    }

    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn is_periodic(&self) -> bool {
        matches!(self.kind, EventKind::Periodic { .. })
    }

    /// Check the app id against the arbiter's configured bounds.
    ///
    /// Kept separate from construction because the bounds are deployment
    /// configuration, not an intrinsic property of the event: the same event
    /// value may be valid on one device and rejected on another.
    pub fn validate_bounds(&self, bounds: &PriorityBounds) -> Result<(), EventError> {
        if bounds.contains(self.app_id) {
            Ok(())
        } else {
            Err(EventError::AppIdOutOfRange {
                app_id: self.app_id,
                min: bounds.min,
                top: bounds.top,
            })
        }
    }
}

impl fmt::Display for LedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AppId: {}", self.app_id)?;
        match &self.kind {
            EventKind::Periodic {
                colors,
                on_ms,
                off_ms,
            } => {
                write!(f, ", Periodic, OnMs: {on_ms}, OffMs: {off_ms}")?;
                for (i, c) in colors.iter().enumerate() {
                    write!(f, "\n  #{i}] color: {c:#08x}")?;
                }
                Ok(())
            }
            EventKind::OneShot { steps, repeat } => {
                write!(f, ", OneShot, Repeat: {repeat}")?;
                for (i, step) in steps.iter().enumerate() {
                    write!(f, "\n  #{i}] duration: {}ms, colors:", step.duration_ms)?;
                    for c in &step.colors {
                        write!(f, " {c:#08x}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
