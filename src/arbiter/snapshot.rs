//! Read-only diagnostic view of the arbiter.

use std::fmt;

use crate::event::{AppId, LedEvent};

/// Point-in-time copy of the arbiter's externally observable state, taken
/// under the service lock by [`LedArbiter::snapshot`](super::LedArbiter::snapshot).
///
/// The `Display` form is the human-readable dump used by diagnostics
/// tooling; tests assert on the structured fields instead.
#[derive(Debug, Clone)]
pub struct ArbiterSnapshot {
    /// Event currently owning the LED, if any.
    pub current: Option<LedEvent>,

    /// Pending queue, highest priority first.
    pub pending: Vec<LedEvent>,

    /// App ids with an armed liveness subscription, ascending.
    pub liveness_keys: Vec<AppId>,
}

impl fmt::Display for ArbiterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Current event:")?;
        match &self.current {
            Some(event) => writeln!(f, "  - {event}")?,
            None => writeln!(f, "  (none)")?,
        }

        writeln!(f, "Pending queue:")?;
        if self.pending.is_empty() {
            writeln!(f, "  (empty)")?;
        }
        for event in &self.pending {
            writeln!(f, "  - {event}")?;
        }

        writeln!(f, "Liveness keys:")?;
        if self.liveness_keys.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for key in &self.liveness_keys {
            writeln!(f, "  - AppId: {key}")?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{color, LedEvent, LED_COUNT};

    #[test]
    fn display_renders_all_sections() {
        let snap = ArbiterSnapshot {
            current: Some(
                LedEvent::periodic(20, &[color::RED; LED_COUNT], 200, 3000).unwrap(),
            ),
            pending: vec![LedEvent::periodic(5, &[color::GREEN; LED_COUNT], 100, 100).unwrap()],
            liveness_keys: vec![5, 20],
        };
        let text = snap.to_string();
        assert!(text.contains("Current event:"));
        assert!(text.contains("AppId: 20"));
        assert!(text.contains("Pending queue:"));
        assert!(text.contains("AppId: 5"));
        assert!(text.contains("Liveness keys:"));
    }

    #[test]
    fn display_marks_empty_sections() {
        let snap = ArbiterSnapshot {
            current: None,
            pending: vec![],
            liveness_keys: vec![],
        };
        let text = snap.to_string();
        assert!(text.contains("(none)"));
        assert!(text.contains("(empty)"));
    }
}
