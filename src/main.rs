pub mod config;
pub mod mqtt;
pub mod rain;
pub mod ui;

use crate::mqtt::ListenerHandle;
use crate::rain::RainStyle;
use crate::ui::MatrixRainApp;
use color_eyre::{eyre::eyre, Result};
use eframe::egui;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Capacity of the spawn-request queue between the listener and the render
/// loop. Messages arriving while it is full are dropped with a warning.
const SPAWN_QUEUE_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = config::load(config_path.as_deref())?;

    let style = RainStyle::from_config(&config.screensaver);
    let (spawn_tx, spawn_rx) = mpsc::channel(SPAWN_QUEUE_CAPACITY);
    let shutdown = CancellationToken::new();

    // Connect and subscribe before the window opens; broker failures at
    // startup are fatal.
    let listener =
        ListenerHandle::spawn(&config.mqtt, style, spawn_tx, shutdown.clone()).await?;

    info!("Starting rain display");
    let mut native_options = eframe::NativeOptions::default();
    native_options.viewport = egui::ViewportBuilder::default()
        .with_inner_size(egui::vec2(
            config.screensaver.width as f32,
            config.screensaver.height as f32,
        ))
        .with_resizable(false);

    let screensaver = config.screensaver.clone();
    let ui_shutdown = shutdown.clone();
    let ui_result = eframe::run_native(
        "MQTT Matrix Rain",
        native_options,
        Box::new(move |cc| {
            Ok(Box::new(MatrixRainApp::new(
                cc,
                &screensaver,
                spawn_rx,
                ui_shutdown,
            )))
        }),
    );

    // Teardown runs on every exit path; listener failures during shutdown
    // are logged inside join() and never re-raised.
    shutdown.cancel();
    listener.join().await;
    ui_result.map_err(|e| eyre!("Display loop failed: {}", e))?;

    info!("Clean shutdown completed");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}
