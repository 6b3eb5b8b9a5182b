/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};

use led_arbiter::arbiter::LedArbiter;
use led_arbiter::config::ArbiterConfig;
use led_arbiter::event::{color, LedEvent, Step, APP_ID_BATTERY, APP_ID_CALL, FLAG_REPLACE, LED_COUNT};
use led_arbiter::hal::{sysfs::SysfsLights, Lights, LogLights};
use led_arbiter::liveness::{ClientHandle, LocalLiveness};

// ── CLI argument definition ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Log every frame instead of driving hardware.
    Console,
    /// Linux LED class devices under the configured sysfs root.
    Sysfs,
}

/// ledarbd — status LED arbiter daemon.
///
/// Example:
///   ledarbd --config configs/arbiter_config.yaml --backend sysfs
#[derive(Debug, Parser)]
#[command(
    name = "ledarbd",
    about = "Priority-preemptive status LED arbiter",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML arbiter configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// LED backend to drive.
    #[arg(short = 'b', long = "backend", value_enum, default_value = "console")]
    backend: Backend,

    /// Run the built-in demo scenario and exit.
    #[arg(short = 'd', long = "demo", default_value_t = false)]
    demo: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialise structured logging.
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    info!("ledarbd starting up...");

    let cli = Cli::parse();
    info!(config = ?cli.config, backend = ?cli.backend, demo = cli.demo, "Configuration");

    // ── Load configuration ────────────────────────────────────────────────────
    let config = match &cli.config {
        Some(path) => match ArbiterConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load configuration: {:#}", e);
                process::exit(1);
            }
        },
        None => {
            warn!("No configuration file provided, using default settings");
            ArbiterConfig::default()
        }
    };

    // ── Build the service ─────────────────────────────────────────────────────
    let lights: Arc<dyn Lights> = match cli.backend {
        Backend::Console => Arc::new(LogLights),
        Backend::Sysfs => Arc::new(SysfsLights::new(
            config.sysfs_root.clone(),
            config.segments.clone(),
        )),
    };
    let transport = Arc::new(LocalLiveness::new());
    let arbiter = LedArbiter::new(lights, transport.clone(), config.bounds);

    if cli.demo {
        run_demo(&arbiter, &transport).await;
        return;
    }

    // TODO: wire the IPC transport for out-of-process clients; until then the
    // service is only reachable through the demo scenario.
    warn!("no client transport in this build — run with --demo to exercise the arbiter");
}

// ── Demo scenario ─────────────────────────────────────────────────────────────

/// Scripted walk through the arbitration rules: a low-priority periodic
/// battery pattern, preempted by a one-shot call flash, restored on
/// completion, and cleaned up when its client dies.
async fn run_demo(arbiter: &LedArbiter, transport: &LocalLiveness) {
    let battery_client = ClientHandle(1);
    let call_client = ClientHandle(2);

    info!("demo: battery client posts a periodic pattern");
    let battery = LedEvent::periodic(APP_ID_BATTERY, &[color::BLUE; LED_COUNT], 200, 3000)
        .expect("demo event is valid");
    if let Err(e) = arbiter.submit(battery, FLAG_REPLACE, battery_client) {
        error!("demo submit failed: {e}");
        return;
    }

    info!("demo: call client preempts with a one-shot flash");
    let steps = vec![
        Step {
            duration_ms: 200,
            colors: [color::RED; LED_COUNT],
        },
        Step {
            duration_ms: 200,
            colors: [color::WHITE; LED_COUNT],
        },
    ];
    let call = LedEvent::one_shot(APP_ID_CALL, steps, 3).expect("demo event is valid");
    if let Err(e) = arbiter.submit(call, FLAG_REPLACE, call_client) {
        error!("demo submit failed: {e}");
        return;
    }

    info!("demo: snapshot while the one-shot plays\n{}", arbiter.snapshot());

    // 3 repeats x 2 steps x 200 ms, plus slack — the battery pattern is
    // repainted when the flash completes.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    info!("demo: snapshot after completion\n{}", arbiter.snapshot());

    info!("demo: battery client dies without withdrawing");
    transport.report_lost(battery_client);
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!("demo: final snapshot\n{}", arbiter.snapshot());
}
