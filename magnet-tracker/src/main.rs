//! Magnet Tracker (magnet-tracker) - Main entry point
//!
//! Runs the tracker against the scripted subsystem: replays an event script
//! (or the built-in demo), reconciles a logging render target after every
//! step and prints the diagnostics summary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use magnet_common::{time, uuid_utils};
use magnet_tracker::scripted::{EventScript, ScriptedSubsystem, StaticPatternLoader};
use magnet_tracker::{
    DiagnosticsSummary, EntityReconciler, MagnetTracker, OverlayState, RenderTarget,
    TrackerConfig, TrackerEvent, TrackingState,
};
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for magnet-tracker
#[derive(Parser, Debug)]
#[command(name = "magnet-tracker")]
#[command(about = "Fridge magnet tracker driven by a scripted tracking subsystem")]
#[command(version)]
struct Args {
    /// Config file (overrides MAGNET_TRACKER_CONFIG and the default location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Event script to replay (built-in demo when omitted)
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset (overrides the config file)
    #[arg(short, long)]
    log_level: Option<String>,
}

/// Log level used when neither RUST_LOG, `--log-level` nor the config set one
const DEFAULT_LOG_LEVEL: &str = "info";

/// How long to wait for the session to leave `Loading`
const START_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for an update to be reflected in metrics
const STEP_TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logging comes up before config loading so its warnings are visible;
    // the config's level is applied afterwards through the reload handle.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let filter_from_env = env_filter.is_some();
    let initial_filter = env_filter.unwrap_or_else(|| {
        EnvFilter::new(filter_directive(
            args.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL),
        ))
    });
    let (filter_layer, filter_handle) = reload::Layer::new(initial_filter);
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = TrackerConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?
        .value;

    if !filter_from_env && args.log_level.is_none() && config.logging.level != DEFAULT_LOG_LEVEL {
        if let Err(e) = filter_handle.reload(EnvFilter::new(filter_directive(&config.logging.level)))
        {
            warn!("Failed to apply configured log level: {}", e);
        }
    }

    info!("Starting magnet tracker (resource group {})", config.resource_group);

    let script = match &args.script {
        Some(path) => EventScript::load(path)
            .with_context(|| format!("Failed to load event script {}", path.display()))?,
        None => {
            info!("No script given, replaying the built-in demo");
            EventScript::demo()
        }
    };

    let subsystem = Arc::new(ScriptedSubsystem::from_script(&script));
    let loader = Arc::new(StaticPatternLoader::new(script.reference_patterns()));
    let tracker = MagnetTracker::from_config(&config, subsystem.clone(), loader);
    let mut reconciler = EntityReconciler::new(LogTarget::default());

    tracker.start().await;
    let state = tracker
        .wait_for_state(START_TIMEOUT, |s| {
            !matches!(s, TrackingState::Idle | TrackingState::Loading)
        })
        .await;

    if state != Some(TrackingState::Running) {
        warn!("Tracking did not start: {}", tracker.status_description().await);
        print_summary(&tracker).await;
        tracker.stop().await;
        return Ok(());
    }

    tokio::select! {
        played = play(&tracker, &subsystem, &script, &mut reconciler) => {
            played.context("Event script failed")?;
            info!("Event script finished");
        }
        _ = shutdown_signal() => {}
    }

    print_summary(&tracker).await;

    tracker.stop().await;
    let teardown = reconciler.clear();
    info!(removed = teardown.removed.len(), "Scene cleared");

    info!("Shutdown complete");
    Ok(())
}

/// Replay script steps, reconciling after each one
async fn play(
    tracker: &MagnetTracker,
    subsystem: &ScriptedSubsystem,
    script: &EventScript,
    reconciler: &mut EntityReconciler<LogTarget>,
) -> Result<()> {
    for (delay, update) in script.updates() {
        tokio::time::sleep(delay).await;

        let mut events = tracker.subscribe();
        subsystem.push(update)?;
        wait_for_metrics(&mut events).await;

        let snapshot = tracker.snapshot().await;
        let report = reconciler.reconcile(&snapshot.overlays);
        info!(
            created = report.created.len(),
            updated = report.updated.len(),
            removed = report.removed.len(),
            last_event = %snapshot.metrics.last_event_description,
            "Render pass"
        );
    }
    Ok(())
}

async fn wait_for_metrics(events: &mut broadcast::Receiver<TrackerEvent>) {
    let waited = tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(TrackerEvent::MetricsUpdated { .. }) | Err(RecvError::Closed) => break,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
            }
        }
    })
    .await;

    if waited.is_err() {
        warn!("Timed out waiting for metrics refresh");
    }
}

/// Filter directive applying `level` to the tracker crates
fn filter_directive(level: &str) -> String {
    format!("magnet_tracker={0},magnet_common={0}", level)
}

async fn print_summary(tracker: &MagnetTracker) {
    let summary = DiagnosticsSummary::from_snapshot(&tracker.snapshot().await, time::now());
    println!("{}", summary);
}

/// Render target that logs entity operations
#[derive(Debug, Default)]
struct LogTarget {
    next_entity: u64,
}

impl RenderTarget for LogTarget {
    type Handle = u64;

    fn create_entity(&mut self, overlay: &OverlayState) -> u64 {
        self.next_entity += 1;
        let translation = overlay.pose.translation();
        info!(
            entity = self.next_entity,
            anchor = %uuid_utils::short(&overlay.id),
            reference = %overlay.reference_name,
            title = %overlay.info.title,
            x = translation.x,
            y = translation.y,
            z = translation.z,
            "Entity created"
        );
        self.next_entity
    }

    fn update_entity(&mut self, handle: &mut u64, overlay: &OverlayState) {
        info!(
            entity = *handle,
            reference = %overlay.reference_name,
            state = overlay.tracking_label(),
            scale = overlay.estimated_scale_factor,
            "Entity updated"
        );
    }

    fn remove_entity(&mut self, handle: u64) {
        info!(entity = handle, "Entity removed");
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
