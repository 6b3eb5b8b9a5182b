//! Linux LED class backend.
//!
//! Each of the 7 segments maps to one device directory under the sysfs root
//! (`/sys/class/leds/<name>/`). A frame's per-segment color is reduced to a
//! scalar `brightness` with the standard luminance weighting, and a timed
//! blink cycle is forwarded to the `delay_on` / `delay_off` attributes of the
//! kernel timer trigger when the frame requests one.
//!
//! All writes are best-effort: the first failure is logged, later ones are
//! silent. LED class devices routinely lack the delay attributes (no timer
//! trigger bound), and a headless test box has none of the paths at all.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use super::{LedFrame, Lights};
use crate::event::LED_COUNT;

/// Perceptual luminance of a `0x00RRGGBB` color, 0..=255.
///
/// Integer approximation of the Rec. 601 luma weights:
/// `(77·R + 150·G + 29·B) >> 8`.
pub fn rgb_to_brightness(color: i32) -> i32 {
    let color = color & 0x00FF_FFFF;
    ((77 * ((color >> 16) & 0xFF)) + (150 * ((color >> 8) & 0xFF)) + (29 * (color & 0xFF))) >> 8
}

/// [`Lights`] backend writing to LED class devices.
pub struct SysfsLights {
    root: PathBuf,
    segments: [String; LED_COUNT],
    already_warned: AtomicBool,
}

impl SysfsLights {
    pub fn new(root: impl Into<PathBuf>, segments: [String; LED_COUNT]) -> Self {
        Self {
            root: root.into(),
            segments,
            already_warned: AtomicBool::new(false),
        }
    }

    fn write_int(&self, path: &Path, value: i32) {
        if let Err(e) = fs::write(path, format!("{value}\n")) {
            if !self.already_warned.swap(true, Ordering::Relaxed) {
                warn!(path = %path.display(), error = %e, "LED sysfs write failed");
            }
        }
    }

    fn segment_dir(&self, index: usize) -> PathBuf {
        self.root.join(&self.segments[index])
    }
}

impl Lights for SysfsLights {
    fn set_leds(&self, frame: &LedFrame) {
        for (index, &color) in frame.colors.iter().enumerate() {
            let dir = self.segment_dir(index);
            self.write_int(&dir.join("brightness"), rgb_to_brightness(color));

            // Timer-trigger blink cycle. Only meaningful when both phases are
            // non-zero; a solid frame leaves the attributes untouched.
            if frame.on_ms > 0 && frame.off_ms > 0 {
                self.write_int(&dir.join("delay_on"), frame.on_ms as i32);
                self.write_int(&dir.join("delay_off"), frame.off_ms as i32);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
