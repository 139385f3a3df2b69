//! Frame loop lifecycle and its handle
//!
//! # State Machine
//!
//! ```text
//! Initializing ──► Running ──(shutdown)──► Stopped ──► held keys released
//! ```
//!
//! The loop owns the device source, so it runs on a dedicated thread with its
//! own current-thread runtime; the gamepad backend never has to cross threads.
//! Actuation is dispatched onto the caller's runtime.

use crate::actuation::{Actuator, CommandOrigin, Completion, EngineNotice, TaskDispatcher};
use crate::controller::{ControllerError, DeviceSource};
use crate::engine::frame::{EngineStats, FrameReport, TranslationEngine};
use crate::mapping::MappingStore;
use chrono::Local;
use statum::{machine, state};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long the stopped loop waits for its final releases to execute
const RELEASE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No tokio runtime available: {0}")]
    RuntimeError(String),

    #[error("Frame loop thread error: {0}")]
    ThreadError(String),

    #[error("Device source failed to start: {0}")]
    SourceError(#[from] ControllerError),
}

#[state]
#[derive(Debug, Clone)]
pub enum LoopState {
    Initializing,
    Running,
    Stopped,
}

#[machine]
pub struct FrameLoop<S: LoopState> {
    source: Box<dyn DeviceSource>,
    store: Arc<RwLock<MappingStore>>,
    engine: TranslationEngine,
    dispatcher: TaskDispatcher,
    completions: mpsc::UnboundedReceiver<Completion>,
    /// Key and mouse button completions received so far
    keys_completed: u64,
    frame_interval: Duration,
}

impl FrameLoop<Initializing> {
    pub fn create(
        source: Box<dyn DeviceSource>,
        store: Arc<RwLock<MappingStore>>,
        actuator: Arc<dyn Actuator>,
        runtime: Handle,
        notice_sender: Option<mpsc::Sender<EngineNotice>>,
        frame_interval: Duration,
    ) -> Self {
        info!(
            "Creating frame loop with {}ms frame interval",
            frame_interval.as_millis()
        );
        let (dispatcher, completions) = TaskDispatcher::new(actuator, runtime);

        Self::new(
            source,
            store,
            TranslationEngine::new(notice_sender),
            dispatcher,
            completions,
            0,
            frame_interval,
        )
    }

    pub fn start(self) -> FrameLoop<Running> {
        info!("Frame loop transitioning to Running state");
        self.transition()
    }
}

impl<S: LoopState> FrameLoop<S> {
    fn apply_completion(&mut self, completion: Completion) {
        if matches!(completion.origin, CommandOrigin::Key(_)) {
            self.keys_completed += 1;
        }
        self.engine.on_completion(completion);
    }

    /// Key and mouse button commands that have not completed yet
    fn keys_outstanding(&self) -> u64 {
        self.dispatcher
            .keys_submitted()
            .saturating_sub(self.keys_completed)
    }
}

impl FrameLoop<Running> {
    /// Applies every completion that arrived since the last frame
    fn drain_completions(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(completion) = self.completions.try_recv() {
            self.apply_completion(completion);
            drained += 1;
        }
        drained
    }

    /// Runs a single frame
    pub async fn run_frame(&mut self) -> FrameReport {
        let drained = self.drain_completions();
        if drained > 0 {
            debug!("Applied {} actuation completions", drained);
        }

        let store = Arc::clone(&self.store);
        let report = {
            let mappings = store.read().await;
            self.engine.step(
                &mappings,
                self.source.as_mut(),
                &mut self.dispatcher,
                Instant::now(),
            )
        };

        if !report.unknown_devices.is_empty() {
            let mut mappings = store.write().await;
            for device in &report.unknown_devices {
                mappings.ensure_device(*device);
            }
        }

        report
    }

    /// Runs frames on a fixed interval until `shutdown` fires
    pub async fn run_until_shutdown(mut self, shutdown: CancellationToken) -> FrameLoop<Stopped> {
        info!("Entering main frame loop");

        let mut interval_timer = tokio::time::interval(self.frame_interval);
        interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut last_stats_time = Local::now();
        let stats_interval = chrono::Duration::seconds(30);
        let mut connected = 0;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received for frame loop");
                    break;
                }

                _ = interval_timer.tick() => {
                    let report = self.run_frame().await;
                    if report.devices != connected {
                        info!("{} device(s) connected", report.devices);
                        connected = report.devices;
                    }

                    let now = Local::now();
                    if now.signed_duration_since(last_stats_time) > stats_interval {
                        let stats = self.engine.stats();
                        info!(
                            "Frame loop stats: {} frames, {} commands, {} motion dropped, {} motion suppressed, {} failures reported at {}",
                            stats.frames,
                            self.dispatcher.submitted(),
                            stats.motion_dropped,
                            stats.motion_suppressed,
                            stats.failures_reported,
                            now.format("%H:%M:%S")
                        );
                        last_stats_time = now;
                    }
                }
            }
        }

        info!("Frame loop transitioning to Stopped state");
        self.transition()
    }
}

impl FrameLoop<Stopped> {
    /// Releases everything still held and waits briefly for the releases to run
    pub async fn finish(mut self) -> EngineStats {
        self.engine.release_all(&mut self.dispatcher);

        // Key commands complete in order, so the releases are done once every
        // key command submitted so far has reported back
        let deadline = tokio::time::Instant::now() + RELEASE_GRACE;
        while self.keys_outstanding() > 0 {
            match tokio::time::timeout_at(deadline, self.completions.recv()).await {
                Ok(Some(completion)) => self.apply_completion(completion),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "{} key command(s) still pending at shutdown",
                        self.keys_outstanding()
                    );
                    break;
                }
            }
        }

        let stats = self.engine.stats();
        info!("Frame loop stopped after {} frames", stats.frames);
        stats
    }
}

/// Handle for the frame loop running on its own thread
#[derive(Debug)]
pub struct EngineHandle {
    shutdown: CancellationToken,
    thread: Option<std::thread::JoinHandle<EngineStats>>,
}

impl EngineHandle {
    /// Starts the frame loop.
    ///
    /// `source_factory` runs on the loop thread, so the device source itself
    /// does not need to be `Send`. Resolves once the source is up.
    pub async fn spawn<F>(
        source_factory: F,
        store: Arc<RwLock<MappingStore>>,
        actuator: Arc<dyn Actuator>,
        notice_sender: Option<mpsc::Sender<EngineNotice>>,
        frame_interval: Duration,
    ) -> Result<Self, EngineError>
    where
        F: FnOnce() -> Result<Box<dyn DeviceSource>, ControllerError> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|e| EngineError::RuntimeError(e.to_string()))?;
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), EngineError>>();

        let thread = std::thread::Builder::new()
            .name("frame-loop".to_string())
            .spawn(move || {
                let local = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(local) => local,
                    Err(e) => {
                        let _ = ready_tx.send(Err(EngineError::RuntimeError(e.to_string())));
                        return EngineStats::default();
                    }
                };

                let source = match source_factory() {
                    Ok(source) => source,
                    Err(e) => {
                        error!("Device source failed to start: {}", e);
                        let _ = ready_tx.send(Err(e.into()));
                        return EngineStats::default();
                    }
                };

                let running = FrameLoop::create(
                    source,
                    store,
                    actuator,
                    runtime,
                    notice_sender,
                    frame_interval,
                )
                .start();
                let _ = ready_tx.send(Ok(()));

                local.block_on(async move {
                    let stopped = running.run_until_shutdown(token).await;
                    stopped.finish().await
                })
            })
            .map_err(|e| EngineError::ThreadError(e.to_string()))?;

        match ready_rx.await {
            Ok(Ok(())) => {
                info!("Frame loop started");
                Ok(Self {
                    shutdown,
                    thread: Some(thread),
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(EngineError::ThreadError(
                "Frame loop thread exited during startup".to_string(),
            )),
        }
    }

    /// Stops the loop, releases held keys and waits for the thread to end
    pub async fn shutdown(&mut self) -> Result<EngineStats, EngineError> {
        debug!("Sending shutdown signal to frame loop");
        self.shutdown.cancel();

        let Some(thread) = self.thread.take() else {
            debug!("Frame loop already shut down");
            return Ok(EngineStats::default());
        };

        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(stats)) => Ok(stats),
            Ok(Err(_)) => {
                error!("Frame loop thread panicked");
                Err(EngineError::ThreadError("Frame loop thread panicked".to_string()))
            }
            Err(e) => Err(EngineError::ThreadError(e.to_string())),
        }
    }
}
