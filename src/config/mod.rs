//! Arbiter configuration loading.
//!
//! The expected YAML structure is:
//! ```yaml
//! arbiter:
//!   app_id_min: 0
//!   app_id_top: 21
//! leds:
//!   sysfs_root: /sys/class/leds
//!   segments: [red, green, blue, led4, led5, led6, led7]
//! ```
//!
//! Every field is optional; missing values fall back to the defaults shown
//! above. The segment list must name exactly one LED class device per
//! segment of the strip.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::event::{PriorityBounds, LED_COUNT};

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
///
/// Kept private — callers work with [`ArbiterConfig`] instead.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    arbiter: BoundsEntry,
    #[serde(default)]
    leds: LedsEntry,
}

#[derive(Debug, Deserialize)]
struct BoundsEntry {
    #[serde(default = "default_app_id_min")]
    app_id_min: i32,
    #[serde(default = "default_app_id_top")]
    app_id_top: i32,
}

#[derive(Debug, Deserialize)]
struct LedsEntry {
    #[serde(default = "default_sysfs_root")]
    sysfs_root: PathBuf,
    #[serde(default = "default_segments")]
    segments: Vec<String>,
}

fn default_app_id_min() -> i32 {
    PriorityBounds::default().min
}

fn default_app_id_top() -> i32 {
    PriorityBounds::default().top
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys/class/leds")
}

fn default_segments() -> Vec<String> {
    ["red", "green", "blue", "led4", "led5", "led6", "led7"]
        .map(String::from)
        .to_vec()
}

impl Default for BoundsEntry {
    fn default() -> Self {
        Self {
            app_id_min: default_app_id_min(),
            app_id_top: default_app_id_top(),
        }
    }
}

impl Default for LedsEntry {
    fn default() -> Self {
        Self {
            sysfs_root: default_sysfs_root(),
            segments: default_segments(),
        }
    }
}

// ── Public configuration ──────────────────────────────────────────────────────

/// Validated service configuration.
#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    /// Exclusive app-id bounds applied at the submission and wire edges.
    pub bounds: PriorityBounds,

    /// Root of the LED class tree for the sysfs backend.
    pub sysfs_root: PathBuf,

    /// One LED class device name per segment, in segment order.
    pub segments: [String; LED_COUNT],
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            bounds: PriorityBounds::default(),
            sysfs_root: default_sysfs_root(),
            segments: ["red", "green", "blue", "led4", "led5", "led6", "led7"].map(String::from),
        }
    }
}

impl ArbiterConfig {
    /// Parse and validate `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the YAML is
    /// structurally invalid, the bounds admit no app id, or the segment list
    /// does not name exactly [`LED_COUNT`] devices.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading arbiter configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: ConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        let config = Self::from_entries(file)?;
        info!(
            app_id_min = config.bounds.min,
            app_id_top = config.bounds.top,
            sysfs_root = %config.sysfs_root.display(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn from_entries(file: ConfigFile) -> Result<Self> {
        if file.arbiter.app_id_min + 1 >= file.arbiter.app_id_top {
            bail!(
                "app id bounds ({}, {}) admit no valid id — bounds are exclusive",
                file.arbiter.app_id_min,
                file.arbiter.app_id_top
            );
        }

        let segment_count = file.leds.segments.len();
        let segments: [String; LED_COUNT] =
            file.leds.segments.try_into().map_err(|_| {
                anyhow::anyhow!("expected {LED_COUNT} LED segments, got {segment_count}")
            })?;

        Ok(Self {
            bounds: PriorityBounds {
                min: file.arbiter.app_id_min,
                top: file.arbiter.app_id_top,
            },
            sysfs_root: file.leds.sysfs_root,
            segments,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
