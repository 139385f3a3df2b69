pub mod actuation;
pub mod config;
pub mod controller;
pub mod engine;
pub mod mapping;
pub mod persistence;

use crate::actuation::{Actuator, EngineNotice, LoggingActuator};
use crate::config::{ensure_default_config, AppConfig};
use crate::controller::{DeviceSampler, DeviceSource};
use crate::engine::EngineHandle;
use crate::mapping::{DeviceMapping, MappingEditor, MappingStore};
use crate::persistence::MappingRepository;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings_path = AppConfig::default_path();
    if let Err(e) = ensure_default_config(&settings_path).await {
        warn!("Could not write default settings: {}", e);
    }
    let config = AppConfig::load_or_default(&settings_path).await;
    info!("Running with settings: {:?}", config);

    let repository = Arc::new(MappingRepository::at_default_location());
    let store = Arc::new(RwLock::new(load_mappings(&repository, &config).await));

    let editor = MappingEditor::spawn(store.clone(), Some(repository.clone()));
    let editor_client = editor.client();

    let (notice_tx, notice_rx) = mpsc::channel(32);
    let notice_task = tokio::spawn(log_notices(notice_rx));

    let mut engine = EngineHandle::spawn(
        || {
            let sampler = DeviceSampler::create()?.initialize();
            Ok(Box::new(sampler) as Box<dyn DeviceSource>)
        },
        store.clone(),
        select_actuator(&config),
        Some(notice_tx),
        config.frame_interval(),
    )
    .await
    .map_err(|e| eyre!("Failed to start frame loop: {}", e))?;

    let shutdown = CancellationToken::new();
    let autosave = repository.clone().start_autosave_task(
        store.clone(),
        config.autosave_interval_secs,
        shutdown.clone(),
    );

    info!("Translating gamepad input, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;
    info!("Ctrl-C received, shutting down");

    match engine.shutdown().await {
        Ok(stats) => info!(
            "Engine stopped: {} frames, {} motion commands dispatched",
            stats.frames, stats.motion_dispatched
        ),
        Err(e) => error!("Engine did not stop cleanly: {}", e),
    }

    shutdown.cancel();
    if let Err(e) = autosave.await {
        warn!("Autosave task ended abnormally: {}", e);
    }

    if let Err(e) = editor_client.save().await {
        error!("Failed to save mappings on exit: {}", e);
    }
    notice_task.abort();

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
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

/// Restores the stored mappings, seeding a starter layout on first run
async fn load_mappings(repository: &MappingRepository, config: &AppConfig) -> MappingStore {
    let store = repository.load_or_empty().await;
    if !store.is_empty() || !config.seed_default_layout {
        return store;
    }

    info!("No stored mappings, seeding device 0 with the starter layout");
    MappingStore::from_devices(vec![DeviceMapping::default_layout(
        0,
        &config.mapping_defaults,
    )])
}

fn select_actuator(config: &AppConfig) -> Arc<dyn Actuator> {
    if config.dry_run {
        info!("Dry run enabled, actuation is only logged");
        return Arc::new(LoggingActuator);
    }
    native_actuator()
}

#[cfg(target_os = "linux")]
fn native_actuator() -> Arc<dyn Actuator> {
    use crate::actuation::uinput::UinputActuator;

    let actuator = UinputActuator::new();
    match actuator.open_devices() {
        Ok(()) => info!("Using uinput actuation backend"),
        Err(e) if e.is_permission_denied() => warn!(
            "No write access to /dev/uinput ({}); input will not be synthesized until access is granted",
            e
        ),
        Err(e) => warn!("uinput backend not ready yet: {}", e),
    }
    Arc::new(actuator)
}

#[cfg(not(target_os = "linux"))]
fn native_actuator() -> Arc<dyn Actuator> {
    warn!("No native actuation backend on this platform, falling back to dry run");
    Arc::new(LoggingActuator)
}

async fn log_notices(mut notices: mpsc::Receiver<EngineNotice>) {
    while let Some(notice) = notices.recv().await {
        match notice {
            EngineNotice::PermissionRequired { origin, detail } => error!(
                "Permission required to synthesize input for {}: {}. Grant access to the input device and try again",
                origin, detail
            ),
            EngineNotice::ActuationFailed { origin, error } => {
                warn!("Actuation failed for {}: {}", origin, error)
            }
        }
    }
}
