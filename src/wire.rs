/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Wire layout of a [`LedEvent`].
//!
//! The transport marshals an event as a flat sequence of `i32` words:
//!
//! ```text
//! periodic: 1, app_id, option, 7, color×7, on_ms, off_ms
//! one-shot: 0, app_id, option, step_count, (8, duration, color×7)×N, repeat
//! ```
//!
//! Arrays carry their length as a leading word, which is why a periodic
//! payload starts with a literal `7` and every one-shot step row with an `8`.
//! The discriminant comes first so a decoder can dispatch before touching the
//! payload.
//!
//! [`decode`] re-validates everything construction validates — plus the
//! structural failure modes only a wire format has — so a malformed or
//! malicious stream is rejected before an event value can exist at all.

use thiserror::Error;

use crate::event::{EventError, EventKind, LedEvent, PriorityBounds, Step, LED_COUNT};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why a word stream failed to decode.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    /// Ran out of words at `offset`.
    #[error("encoded event truncated at word {offset}")]
    Truncated { offset: usize },

    /// The kind discriminant was neither 0 nor 1.
    #[error("unknown event kind discriminant {0}")]
    BadKind(i32),

    /// A one-shot step row whose length prefix is not `duration + 7 colors`.
    #[error("step {index} has length {actual}, expected {expected}")]
    BadStepLength {
        index: usize,
        actual: i32,
        expected: i32,
    },

    /// A numeric field that must be non-negative on the wire.
    #[error("field '{field}' must not be negative, got {value}")]
    NegativeField { field: &'static str, value: i32 },

    /// Words left over after a complete event was read.
    #[error("{remaining} trailing words after the encoded event")]
    TrailingWords { remaining: usize },

    /// The decoded values fail event validation.
    #[error(transparent)]
    Invalid(#[from] EventError),
}

// ── Encode ────────────────────────────────────────────────────────────────────

/// Serialize `event` into its word layout.
pub fn encode(event: &LedEvent) -> Vec<i32> {
    let mut words = Vec::new();
    match event.kind() {
        EventKind::Periodic {
            colors,
            on_ms,
            off_ms,
        } => {
            words.push(1);
            words.push(event.app_id());
            words.push(event.option);
            words.push(LED_COUNT as i32);
            words.extend_from_slice(colors);
            words.push(*on_ms as i32);
            words.push(*off_ms as i32);
        }
        EventKind::OneShot { steps, repeat } => {
            words.push(0);
            words.push(event.app_id());
            words.push(event.option);
            words.push(steps.len() as i32);
            for step in steps {
                words.push((LED_COUNT + 1) as i32);
                words.push(step.duration_ms as i32);
                words.extend_from_slice(&step.colors);
            }
            words.push(*repeat as i32);
        }
    }
    words
}

// ── Decode ────────────────────────────────────────────────────────────────────

struct Reader<'a> {
    words: &'a [i32],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn next(&mut self) -> Result<i32, WireError> {
        let word = *self
            .words
            .get(self.pos)
            .ok_or(WireError::Truncated { offset: self.pos })?;
        self.pos += 1;
        Ok(word)
    }

    fn next_non_negative(&mut self, field: &'static str) -> Result<i32, WireError> {
        let value = self.next()?;
        if value < 0 {
            return Err(WireError::NegativeField { field, value });
        }
        Ok(value)
    }

    fn next_colors(&mut self) -> Result<[i32; LED_COUNT], WireError> {
        let mut colors = [0; LED_COUNT];
        for slot in &mut colors {
            *slot = self.next()?;
        }
        Ok(colors)
    }
}

/// Deserialize one event from `words`, consuming them entirely.
///
/// `bounds` are the arbiter's configured priority bounds — the wire edge
/// applies the same app-id validation the submission edge does, so a decoded
/// event is always safe to hand to the scheduler.
pub fn decode(words: &[i32], bounds: &PriorityBounds) -> Result<LedEvent, WireError> {
    let mut r = Reader { words, pos: 0 };

    let kind = r.next()?;
    let app_id = r.next()?;
    let option = r.next()?;

    let mut event = match kind {
        1 => {
            let len = r.next()?;
            if len != LED_COUNT as i32 {
                return Err(EventError::WrongColorCount {
                    actual: len.max(0) as usize,
                }
                .into());
            }
            let colors = r.next_colors()?;
            let on_ms = r.next_non_negative("on_ms")? as u32;
            let off_ms = r.next_non_negative("off_ms")? as u32;
            LedEvent::periodic(app_id, &colors, on_ms, off_ms)?
        }
        0 => {
            let step_count = r.next()?;
            if step_count <= 0 {
                return Err(EventError::EmptySequence.into());
            }
            // No up-front capacity: the count is untrusted, and a lying
            // prefix runs into `Truncated` after at most words.len() reads.
            let mut steps = Vec::new();
            for index in 0..step_count as usize {
                let row_len = r.next()?;
                if row_len != (LED_COUNT + 1) as i32 {
                    return Err(WireError::BadStepLength {
                        index,
                        actual: row_len,
                        expected: (LED_COUNT + 1) as i32,
                    });
                }
                let duration_ms = r.next_non_negative("duration_ms")? as u32;
                let colors = r.next_colors()?;
                steps.push(Step {
                    duration_ms,
                    colors,
                });
            }
            let repeat = r.next_non_negative("repeat")? as u32;
            LedEvent::one_shot(app_id, steps, repeat)?
        }
        other => return Err(WireError::BadKind(other)),
    };

    if r.pos != words.len() {
        return Err(WireError::TrailingWords {
            remaining: words.len() - r.pos,
        });
    }

    event.option = option;
    event.validate_bounds(bounds)?;
    Ok(event)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
