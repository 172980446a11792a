//! midi-staff - show the notes held on a MIDI keyboard

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use midi_staff::platform::midir_backend::print_ports;
use midi_staff::platform::MidirAccess;
use midi_staff::{
    paths, AppConfig, ConsoleRenderer, NoteTracker, SessionHandle, SessionState, StaffRenderer,
};

/// midi-staff - Live held-note display for MIDI keyboards
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI input ports
    #[arg(long)]
    list_ports: bool,

    /// Select the first input whose name contains this text
    #[arg(short, long)]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting midi-staff v{}", env!("CARGO_PKG_VERSION"));

    let config_path = paths::resolve_config(args.config.as_deref());
    info!("Configuration file: {}", config_path.display());

    let mut config = AppConfig::load_or_default(&config_path)
        .await
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    if let Some(device) = args.device {
        config.midi.preferred_device = Some(device);
    }
    config.validate()?;

    if args.list_ports {
        print_ports(&config.midi.client_name);
        return Ok(());
    }

    let access = Arc::new(MidirAccess::new(&config.midi));
    let session = SessionHandle::spawn(access, config.session_options());

    let result = run(&session, &config).await;

    session.stop().await;
    info!("midi-staff stopped");
    result
}

/// Render held notes until Ctrl+C or a permission error
async fn run(session: &SessionHandle, config: &AppConfig) -> Result<()> {
    let mut events = session
        .take_event_receiver()
        .context("Note event receiver already taken")?;

    let mut tracker = NoteTracker::new();
    tracker.set_source(session.selected().as_deref());
    let mut notes_rx = tracker.subscribe();
    let mut state_rx = session.watch_state();
    let mut devices_rx = session.watch_devices();
    let mut selected_rx = session.watch_selected();

    let mut renderer = ConsoleRenderer::stdout(config.display.color);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        // Selection changes are published before the first event of the new
        // input is forwarded, so they must be seen before pending events.
        tokio::select! {
            biased;

            _ = &mut shutdown => return Ok(()),

            Ok(()) = selected_rx.changed() => {
                let selected = selected_rx.borrow_and_update().clone();
                match &selected {
                    Some(id) => info!("Reading notes from '{}'", id),
                    None => info!("No MIDI input selected"),
                }
                tracker.set_source(selected.as_deref());
            }

            Some(input) = events.recv() => {
                if config.display.show_events {
                    renderer.event(&input.event)?;
                }
                tracker.apply_input(&input);
            }

            Ok(()) = notes_rx.changed() => {
                let pitches = notes_rx.borrow_and_update().pitches();
                renderer.render(&pitches)?;
            }

            Ok(()) = state_rx.changed() => {
                let state = state_rx.borrow_and_update().clone();
                match state {
                    SessionState::Loading => info!("Requesting MIDI access..."),
                    SessionState::Loaded(context) => {
                        debug!("MIDI session loaded (selected: {:?})", context.selected_device_id);
                    }
                    SessionState::PermissionError(e) => {
                        error!("Cannot read MIDI input: {}", e);
                        return Err(e.into());
                    }
                    SessionState::Stopped => return Ok(()),
                }
            }

            Ok(()) = devices_rx.changed() => {
                let devices = devices_rx.borrow_and_update().clone();
                if devices.is_empty() {
                    warn!("No MIDI input devices found");
                }
                for device in &devices {
                    let state = if device.is_connected() {
                        "connected".green()
                    } else {
                        "disconnected".red()
                    };
                    info!("MIDI input '{}' ({}) {}", device.name, device.manufacturer, state);
                }
            }

        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
