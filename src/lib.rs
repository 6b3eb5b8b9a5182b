/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! led-arbiter – priority-preemptive arbiter for a multi-segment status LED.
//!
//! Multiple applications share one 7-segment indicator; each submits display
//! requests tagged with a fixed per-application priority, and the arbiter
//! decides who owns the hardware at any moment.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── event     – request data model, colors, validation
//! ├── queue     – pending-event queue, ordered by priority
//! ├── arbiter/  – the service: admission, preemption, finalization
//! ├── player    – cancellable background runner for one-shot sequences
//! ├── liveness  – client-death subscriptions and tracking
//! ├── wire      – interoperable word-stream request layout
//! ├── hal/      – Lights trait, sysfs and logging backends
//! └── config/   – YAML service configuration
//! ```

pub mod arbiter;
pub mod config;
pub mod event;
pub mod hal;
pub mod liveness;
pub mod player;
pub mod queue;
pub mod wire;
