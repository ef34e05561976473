//! Standalone host lifecycle.
//!
//! When no foreign host is present, [`StandaloneHost`] owns everything a
//! plugin host would: the device stream and its realtime callback, the rack,
//! input mute, feedback protection, and persistence of the device
//! configuration and rack state in the shared settings cache.
//!
//! # Threads
//!
//! The device callback only ever `try_lock`s the [`ProcessorContainer`] and
//! outputs silence if it is contended. The control thread locks it only
//! while the stream is stopped (device change, restore, shutdown), so the
//! callback never waits. Every other control operation goes through the
//! [`RackController`] and never touches the container.
//!
//! # Failure handling
//!
//! | Situation | Outcome |
//! |-----------|---------|
//! | Device refuses the configuration | falls back to 44.1 kHz / 512, reports a [`Downgrade`] |
//! | Input and output may loop | input muted until acknowledged |
//! | Settings cache locked by another process | operation fails, nothing written |
//! | State applied but device will not restart | [`StateChange::Partial`] |

use crate::backend::{
    AudioBackend, DeviceInfo, DuplexCallback, ErrorCallback, StreamConfig, StreamHandle,
};
use crate::feedback::FeedbackRisk;
use crate::scheduler::{ControlTask, TaskQueue};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use rackhost_config::{
    ConfigError, DeviceConfig, PLUGIN_STATE_VERSION, PluginStateRecord, SettingsStore,
    SharedContext, export_state, import_state,
};
use rackhost_core::SetupError;
use rackhost_rack::{
    ChannelLayout, InstanceId, ProcessorContainer, RackController, RestoreReport, StateTree, rack,
};
use rackhost_registry::ModuleRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How often drained instances are reclaimed.
pub const GARBAGE_INTERVAL: Duration = Duration::from_millis(50);

/// How often parked instances are retried.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Delay between a device change and writing it to the cache.
pub const PERSIST_DELAY: Duration = Duration::from_secs(1);

/// Whether a failed operation left anything changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// Nothing changed; the prior state is intact.
    Unchanged,
    /// Part of the operation took effect.
    Partial,
}

/// Reason code attached to failure notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Another process holds the settings cache lock.
    LockUnavailable,
    /// File I/O failed.
    Io,
    /// Stored data could not be parsed or produced.
    Format,
    /// The audio device failed.
    Device,
    /// The user declined.
    Cancelled,
    /// Unmute refused until the feedback risk is acknowledged.
    FeedbackUnacknowledged,
}

/// Errors from host operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The device could not be opened, even with fallback settings.
    #[error("audio device error: {0}")]
    Device(#[from] crate::Error),

    /// New state was applied but the stream did not come back.
    #[error("state applied but the audio device did not restart: {source}")]
    Restart {
        /// Why the stream failed.
        #[source]
        source: crate::Error,
    },

    /// Reading or writing the settings cache or a state file failed.
    #[error("settings persistence failed: {source}")]
    Persistence {
        /// Underlying error.
        #[source]
        source: ConfigError,
        /// What took effect before the failure.
        change: StateChange,
    },

    /// Input cannot be unmuted before the feedback risk is acknowledged.
    #[error("input stays muted until the feedback risk is acknowledged")]
    FeedbackUnacknowledged,

    /// The user declined a confirmation.
    #[error("cancelled by user")]
    Cancelled,
}

impl HostError {
    fn unchanged(source: ConfigError) -> Self {
        HostError::Persistence {
            source,
            change: StateChange::Unchanged,
        }
    }

    /// Notification code for this error.
    pub fn reason(&self) -> FailureReason {
        match self {
            HostError::Device(_) | HostError::Restart { .. } => FailureReason::Device,
            HostError::Persistence { source, .. } if source.is_lock_failure() => {
                FailureReason::LockUnavailable
            }
            HostError::Persistence {
                source: ConfigError::TomlParse(_) | ConfigError::TomlSerialize(_),
                ..
            } => FailureReason::Format,
            HostError::Persistence { .. } => FailureReason::Io,
            HostError::FeedbackUnacknowledged => FailureReason::FeedbackUnacknowledged,
            HostError::Cancelled => FailureReason::Cancelled,
        }
    }

    /// Whether anything took effect before the failure.
    pub fn change(&self) -> StateChange {
        match self {
            HostError::Restart { .. } => StateChange::Partial,
            HostError::Persistence { change, .. } => *change,
            _ => StateChange::Unchanged,
        }
    }
}

/// Why the host runs on different settings than requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DowngradeReason {
    /// The device refused the sample rate or block size.
    ConfigRejected,
    /// The requested device could not be opened; the default device is used.
    DeviceUnavailable,
}

/// The host started with fallback settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Downgrade {
    /// What was asked for.
    pub requested: DeviceConfig,
    /// What is running.
    pub actual: DeviceConfig,
    /// Downgrade code.
    pub reason: DowngradeReason,
    /// The error the requested configuration produced.
    pub error: String,
}

/// Outcome of starting the stream.
#[derive(Debug, Clone, Default)]
pub struct StartReport {
    /// Set if fallback settings are in use.
    pub downgrade: Option<Downgrade>,
    /// Instances that could not prepare for the running settings.
    pub parked: Vec<(InstanceId, SetupError)>,
    /// Set if the input is force-muted.
    pub feedback: Option<FeedbackRisk>,
}

/// Notifications for GUI collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Input mute changed.
    MuteChanged {
        /// New state.
        muted: bool,
    },
    /// The device pairing may loop; input was muted.
    FeedbackRiskDetected(FeedbackRisk),
    /// A new device configuration is running.
    DeviceChanged(DeviceConfig),
    /// Fallback settings are running.
    Downgraded(Downgrade),
    /// The device reported an error while streaming.
    StreamError(String),
    /// State was saved.
    SaveSucceeded {
        /// File written.
        path: PathBuf,
    },
    /// A save failed.
    SaveFailed {
        /// Reason code.
        reason: FailureReason,
    },
    /// State was loaded.
    LoadSucceeded {
        /// Instances in the rack.
        instances: usize,
        /// Restore warnings.
        warnings: usize,
    },
    /// A load failed.
    LoadFailed {
        /// Reason code.
        reason: FailureReason,
    },
}

/// Save or load, for prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Writing plugin state.
    Save,
    /// Reading plugin state.
    Load,
}

/// A question for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Proceed with the operation?
    Confirm(Operation),
    /// The operation failed; try again?
    Retry(Operation),
}

/// Whatever talks to the user: a dialog, a CLI prompt, a test script.
pub trait UserPrompt {
    /// Asks a yes/no question.
    fn confirm(&mut self, prompt: Prompt) -> bool;

    /// Tells the user an operation failed.
    fn notify_failure(&mut self, operation: Operation, error: &HostError);
}

/// Headless prompt: accepts every confirmation, declines retries, logs
/// failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl UserPrompt for AutoConfirm {
    fn confirm(&mut self, prompt: Prompt) -> bool {
        matches!(prompt, Prompt::Confirm(_))
    }

    fn notify_failure(&mut self, operation: Operation, error: &HostError) {
        tracing::warn!(?operation, error = %error, "operation failed");
    }
}

/// Flags for [`StandaloneHost::save_plugin_state`] and
/// [`StandaloneHost::reload_plugin_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Ask before starting.
    pub ask_before: bool,
    /// Offer a retry when the operation fails.
    pub ask_again_on_failure: bool,
    /// Tell the user about a final failure.
    pub notify_on_failure: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            ask_before: false,
            ask_again_on_failure: false,
            notify_on_failure: true,
        }
    }
}

/// Owner of the device, the rack and their persistence in standalone mode.
pub struct StandaloneHost<B: AudioBackend> {
    backend: B,
    context: Arc<SharedContext>,
    store: SettingsStore,
    controller: RackController,
    container: Arc<Mutex<ProcessorContainer>>,
    config: DeviceConfig,
    stream: Option<StreamHandle>,
    muted: Arc<AtomicBool>,
    feedback: Option<FeedbackRisk>,
    feedback_acknowledged: bool,
    last_save_path: Option<PathBuf>,
    config_dirty: bool,
    tasks: TaskQueue,
    stream_errors_tx: Sender<String>,
    stream_errors: Receiver<String>,
    listeners: Vec<Sender<HostEvent>>,
}

impl<B: AudioBackend> StandaloneHost<B> {
    /// Builds a host from the cached device configuration.
    ///
    /// A missing or unreadable cache falls back to defaults. The stream is
    /// not opened until [`start`](Self::start).
    pub fn new(backend: B, registry: Arc<ModuleRegistry>, context: Arc<SharedContext>) -> Self {
        if !context.is_initialized() {
            tracing::debug!("shared context used before initialize");
        }
        let store = context.store();
        let config = match store.load_device_config() {
            Ok(Some(config)) => config,
            Ok(None) => DeviceConfig::default(),
            Err(err) => {
                tracing::warn!(error = %err, "cached device config unusable, using defaults");
                DeviceConfig::default()
            }
        };
        let (controller, processor) = rack(registry, config.playback_settings());
        let container = ProcessorContainer::new(processor, layout_for(&config));

        let now = Instant::now();
        let mut tasks = TaskQueue::new();
        tasks.schedule_every(ControlTask::CollectGarbage, GARBAGE_INTERVAL, now);
        tasks.schedule_every(ControlTask::RetryPendingSetup, RETRY_INTERVAL, now);

        let (stream_errors_tx, stream_errors) = crossbeam_channel::unbounded();
        tracing::info!(backend = backend.name(), "standalone host created");
        Self {
            backend,
            context,
            store,
            controller,
            container: Arc::new(Mutex::new(container)),
            config,
            stream: None,
            muted: Arc::new(AtomicBool::new(false)),
            feedback: None,
            feedback_acknowledged: false,
            last_save_path: None,
            config_dirty: false,
            tasks,
            stream_errors_tx,
            stream_errors,
            listeners: Vec::new(),
        }
    }

    // ── Device ─────────────────────────────────────────────────────────────

    /// Opens the stream for the current device configuration.
    ///
    /// Every pairing is checked for feedback before it is opened. If the
    /// device refuses the configuration, retries at 44.1 kHz / 512 frames,
    /// then on the default devices, and reports the downgrade. Falling back
    /// to other devices resets feedback acknowledgement.
    ///
    /// # Errors
    ///
    /// [`HostError::Device`] with the original error if every attempt fails.
    /// Acknowledgement and mute are then left as they were, unless the
    /// requested pairing itself needs the mute.
    pub fn start(&mut self) -> Result<StartReport, HostError> {
        self.stop();
        let acknowledged = self.feedback_acknowledged;
        let muted = self.is_muted();

        let requested = self.config.clone();
        let first = match self.launch(&requested) {
            Ok(parked) => {
                return Ok(StartReport {
                    downgrade: None,
                    parked,
                    feedback: self.forced_mute(),
                });
            }
            Err(err) => err,
        };
        tracing::warn!(
            sample_rate = requested.sample_rate,
            block_size = requested.block_size,
            error = %first,
            "requested device configuration refused"
        );

        let fallback = requested.fallback();
        let mut candidates = vec![(fallback.clone(), DowngradeReason::ConfigRejected)];
        if fallback.input_device.is_some() || fallback.output_device.is_some() {
            candidates.push((
                DeviceConfig {
                    input_device: None,
                    output_device: None,
                    ..fallback
                },
                DowngradeReason::DeviceUnavailable,
            ));
        }
        for (actual, reason) in candidates {
            if actual == requested {
                continue;
            }
            if !actual.same_pairing(&requested) {
                self.feedback_acknowledged = false;
            }
            match self.launch(&actual) {
                Ok(parked) => {
                    let downgrade = Downgrade {
                        requested,
                        actual: actual.clone(),
                        reason,
                        error: first.to_string(),
                    };
                    tracing::warn!(
                        ?reason,
                        sample_rate = actual.sample_rate,
                        block_size = actual.block_size,
                        "running with fallback device configuration"
                    );
                    self.config = actual;
                    self.mark_config_dirty(Instant::now());
                    self.emit(HostEvent::Downgraded(downgrade.clone()));
                    return Ok(StartReport {
                        downgrade: Some(downgrade),
                        parked,
                        feedback: self.forced_mute(),
                    });
                }
                Err(err) => {
                    tracing::warn!(?reason, error = %err, "fallback configuration refused");
                    self.feedback_acknowledged = acknowledged;
                }
            }
        }
        self.feedback = FeedbackRisk::assess(&requested);
        let forced = self.forced_mute().is_some();
        self.restore_mute(muted || forced);
        Err(HostError::Device(first))
    }

    /// Stops the stream. The rack keeps its state.
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::info!("audio stream stopped");
        }
    }

    /// Returns `true` while the stream is open.
    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    /// Replaces the device configuration and restarts the stream.
    ///
    /// The new configuration is written to the cache shortly after by
    /// [`tick`](Self::tick). Changing devices resets feedback
    /// acknowledgement.
    ///
    /// # Errors
    ///
    /// [`HostError::Device`] if nothing could be opened; the previous
    /// configuration is restored and restarted.
    pub fn set_device_config(&mut self, config: DeviceConfig) -> Result<StartReport, HostError> {
        let acknowledged = self.feedback_acknowledged;
        let muted = self.is_muted();
        let previous = std::mem::replace(&mut self.config, config);
        if !previous.same_pairing(&self.config) {
            self.feedback_acknowledged = false;
        }
        match self.start() {
            Ok(report) => {
                self.mark_config_dirty(Instant::now());
                self.emit(HostEvent::DeviceChanged(self.config.clone()));
                Ok(report)
            }
            Err(err) => {
                self.config = previous;
                self.feedback_acknowledged = acknowledged;
                self.restore_mute(muted);
                if let Err(restart) = self.start() {
                    tracing::error!(error = %restart, "previous device configuration did not restart");
                }
                Err(err)
            }
        }
    }

    /// The running (or next) device configuration.
    pub fn device_config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Devices the backend offers.
    pub fn list_devices(&self) -> Result<Vec<DeviceInfo>, HostError> {
        Ok(self.backend.list_devices()?)
    }

    // ── Mute and feedback ──────────────────────────────────────────────────

    /// Sets input mute; takes effect on the next device callback.
    ///
    /// # Errors
    ///
    /// [`HostError::FeedbackUnacknowledged`] when unmuting a risky pairing
    /// before [`acknowledge_feedback_risk`](Self::acknowledge_feedback_risk).
    pub fn set_muted(&mut self, muted: bool) -> Result<(), HostError> {
        if !muted && self.feedback.is_some() && !self.feedback_acknowledged {
            return Err(HostError::FeedbackUnacknowledged);
        }
        if self.muted.swap(muted, Ordering::AcqRel) != muted {
            tracing::info!(muted, "input mute changed");
            self.emit(HostEvent::MuteChanged { muted });
        }
        Ok(())
    }

    /// Returns `true` if input is muted.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    /// The detected feedback risk, if any.
    pub fn feedback_risk(&self) -> Option<&FeedbackRisk> {
        self.feedback.as_ref()
    }

    /// Allows unmuting despite the feedback risk, until the devices change.
    pub fn acknowledge_feedback_risk(&mut self) {
        if self.feedback.is_some() {
            tracing::info!("feedback risk acknowledged");
        }
        self.feedback_acknowledged = true;
    }

    // ── Persistence ────────────────────────────────────────────────────────

    /// Writes the rack to the settings cache.
    ///
    /// Saving twice without a change in between leaves identical bytes.
    ///
    /// # Errors
    ///
    /// [`HostError::Cancelled`] if declined, [`HostError::Persistence`] if
    /// the cache lock or the write failed; the cache is then unchanged.
    pub fn save_plugin_state(
        &mut self,
        options: SaveOptions,
        prompt: &mut dyn UserPrompt,
    ) -> Result<(), HostError> {
        if options.ask_before && !prompt.confirm(Prompt::Confirm(Operation::Save)) {
            self.emit(HostEvent::SaveFailed {
                reason: FailureReason::Cancelled,
            });
            return Err(HostError::Cancelled);
        }
        loop {
            match self.store.save_plugin_state(&self.record()) {
                Ok(()) => {
                    let path = self.store.plugin_state_path();
                    tracing::info!(path = %path.display(), "plugin state saved");
                    self.emit(HostEvent::SaveSucceeded { path });
                    return Ok(());
                }
                Err(source) => {
                    let err = HostError::unchanged(source);
                    if !self.on_failure(Operation::Save, &err, options, prompt) {
                        return Err(err);
                    }
                }
            }
        }
    }

    /// Restores the rack from the settings cache.
    ///
    /// The stream is stopped while the rack is rebuilt. With nothing cached
    /// the rack is left as it is and an empty report returned.
    ///
    /// # Errors
    ///
    /// [`HostError::Cancelled`], [`HostError::Persistence`] (rack unchanged)
    /// or [`HostError::Restart`] (rack restored, stream down).
    pub fn reload_plugin_state(
        &mut self,
        options: SaveOptions,
        prompt: &mut dyn UserPrompt,
    ) -> Result<RestoreReport, HostError> {
        if options.ask_before && !prompt.confirm(Prompt::Confirm(Operation::Load)) {
            self.emit(HostEvent::LoadFailed {
                reason: FailureReason::Cancelled,
            });
            return Err(HostError::Cancelled);
        }
        loop {
            match self.store.load_plugin_state() {
                Ok(Some(record)) => {
                    let report = self.apply(&record.rack)?;
                    self.last_save_path = record.last_save_path;
                    return Ok(report);
                }
                Ok(None) => {
                    tracing::info!("no cached plugin state");
                    return Ok(RestoreReport::default());
                }
                Err(source) => {
                    let err = HostError::unchanged(source);
                    if !self.on_failure(Operation::Load, &err, options, prompt) {
                        return Err(err);
                    }
                }
            }
        }
    }

    /// Writes the rack to a user file and records it as the last save path.
    ///
    /// # Errors
    ///
    /// [`StateChange::Unchanged`] if the file could not be written,
    /// [`StateChange::Partial`] if the file was written but the cache was not.
    pub fn save_plugin_state_to(&mut self, path: impl AsRef<Path>) -> Result<(), HostError> {
        let path = path.as_ref();
        let result = match export_state(path, &self.controller.serialize()) {
            Ok(()) => {
                self.last_save_path = Some(path.to_path_buf());
                self.store
                    .save_plugin_state(&self.record())
                    .map_err(|source| HostError::Persistence {
                        source,
                        change: StateChange::Partial,
                    })
            }
            Err(source) => Err(HostError::unchanged(source)),
        };
        match result {
            Ok(()) => {
                tracing::info!(path = %path.display(), "plugin state saved to file");
                self.emit(HostEvent::SaveSucceeded {
                    path: path.to_path_buf(),
                });
                Ok(())
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "saving plugin state to file failed");
                self.emit(HostEvent::SaveFailed {
                    reason: err.reason(),
                });
                Err(err)
            }
        }
    }

    /// Restores the rack from a user file.
    pub fn load_plugin_state_from(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<RestoreReport, HostError> {
        let path = path.as_ref();
        let tree = match import_state(path) {
            Ok(tree) => tree,
            Err(source) => {
                let err = HostError::unchanged(source);
                tracing::warn!(path = %path.display(), error = %err, "loading plugin state from file failed");
                self.emit(HostEvent::LoadFailed {
                    reason: err.reason(),
                });
                return Err(err);
            }
        };
        let report = self.apply(&tree)?;
        self.last_save_path = Some(path.to_path_buf());
        Ok(report)
    }

    /// File the rack was last saved to or loaded from.
    pub fn last_save_path(&self) -> Option<&Path> {
        self.last_save_path.as_deref()
    }

    /// Writes the device configuration to the cache now.
    pub fn save_device_config(&mut self) -> Result<(), HostError> {
        self.store
            .save_device_config(&self.config)
            .map_err(HostError::unchanged)?;
        self.config_dirty = false;
        self.tasks.cancel(ControlTask::PersistDeviceConfig);
        Ok(())
    }

    /// Sets how long cache operations wait for another process.
    pub fn set_lock_timeout(&mut self, timeout: Duration) {
        self.store = self.store.clone().with_lock_timeout(timeout);
    }

    // ── Control thread ─────────────────────────────────────────────────────

    /// Runs scheduled control tasks due at `now` and forwards stream errors.
    ///
    /// Call regularly from the control thread. Returns the number of tasks
    /// run.
    pub fn tick(&mut self, now: Instant) -> usize {
        while let Ok(message) = self.stream_errors.try_recv() {
            tracing::warn!(error = %message, "audio stream error");
            self.emit(HostEvent::StreamError(message));
        }
        let due = self.tasks.due(now);
        for task in &due {
            match task {
                ControlTask::CollectGarbage => {
                    self.controller.collect_garbage();
                }
                ControlTask::PersistDeviceConfig => {
                    if self.config_dirty
                        && let Err(err) = self.save_device_config()
                    {
                        tracing::warn!(error = %err, "device config not cached, will retry");
                        self.tasks
                            .schedule_at(ControlTask::PersistDeviceConfig, now + PERSIST_DELAY);
                    }
                }
                ControlTask::RetryPendingSetup => {
                    if !self.controller.pending().is_empty() {
                        let still = self.controller.retry_pending();
                        tracing::debug!(parked = still.len(), "retried parked instances");
                    }
                }
            }
        }
        due.len()
    }

    /// Flushes device configuration, then plugin state, then releases the
    /// device and tears the rack down.
    ///
    /// The device is released even if a flush fails; the first failure is
    /// returned.
    pub fn shutdown(mut self) -> Result<(), HostError> {
        let device = self
            .store
            .save_device_config(&self.config)
            .map_err(HostError::unchanged);
        let state = self
            .store
            .save_plugin_state(&self.record())
            .map_err(HostError::unchanged);
        self.stop();
        {
            let mut container = self.container.lock();
            self.controller.shutdown(container.processor_mut());
        }
        tracing::info!(
            device_saved = device.is_ok(),
            state_saved = state.is_ok(),
            "standalone host shut down"
        );
        device.and(state)
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    /// The rack's control half.
    pub fn controller(&self) -> &RackController {
        &self.controller
    }

    /// The rack's control half, mutably.
    pub fn controller_mut(&mut self) -> &mut RackController {
        &mut self.controller
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The settings cache.
    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    /// The shared context the host was built with.
    pub fn context(&self) -> &Arc<SharedContext> {
        &self.context
    }

    /// Subscribes to host notifications.
    pub fn subscribe(&mut self) -> Receiver<HostEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.listeners.push(tx);
        rx
    }

    // ── Internals ──────────────────────────────────────────────────────────

    fn record(&self) -> PluginStateRecord {
        PluginStateRecord {
            version: PLUGIN_STATE_VERSION,
            last_save_path: self.last_save_path.clone(),
            rack: self.controller.serialize(),
        }
    }

    /// Prepares the rack for `config` and opens the stream. Stream stopped.
    fn open(&mut self, config: &DeviceConfig) -> crate::Result<Vec<(InstanceId, SetupError)>> {
        let parked = {
            let mut container = self.container.lock();
            container.set_layout(layout_for(config));
            container.prepare(&mut self.controller, config.playback_settings())
        };
        let handle = self.backend.open_duplex(
            &StreamConfig::from(config),
            self.callback(config),
            self.error_callback(),
        )?;
        self.stream = Some(handle);
        tracing::info!(
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            parked = parked.len(),
            "audio stream running"
        );
        Ok(parked)
    }

    fn callback(&self, config: &DeviceConfig) -> DuplexCallback {
        let container = Arc::clone(&self.container);
        let muted = Arc::clone(&self.muted);
        let period = config.block_size.max(1) as usize;
        let out_ch = usize::from(config.output_channels.max(1));
        let silence = vec![0.0f32; period * usize::from(config.input_channels)];
        Box::new(move |input: &[f32], output: &mut [f32]| {
            let Some(mut rack) = container.try_lock() else {
                output.fill(0.0);
                return;
            };
            if muted.load(Ordering::Acquire) {
                // Keep the chain running on silence so its state stays coherent.
                for chunk in output.chunks_mut(period * out_ch) {
                    rack.process_duplex(&silence, chunk);
                }
                output.fill(0.0);
            } else {
                rack.process_duplex(input, output);
            }
        })
    }

    fn error_callback(&self) -> ErrorCallback {
        let tx = self.stream_errors_tx.clone();
        Arc::new(move |message: &str| {
            let _ = tx.send(message.to_owned());
        })
    }

    /// Forces mute before `config` can produce a callback, if it is risky.
    fn launch(&mut self, config: &DeviceConfig) -> crate::Result<Vec<(InstanceId, SetupError)>> {
        self.check_feedback(config);
        self.open(config)
    }

    fn check_feedback(&mut self, config: &DeviceConfig) {
        self.feedback = FeedbackRisk::assess(config);
        let Some(risk) = self.feedback.clone() else {
            return;
        };
        tracing::warn!(
            device = risk.device.as_deref().unwrap_or("default"),
            channels = risk.channel_count(),
            "input and output may feed back"
        );
        self.emit(HostEvent::FeedbackRiskDetected(risk));
        if !self.feedback_acknowledged && !self.muted.swap(true, Ordering::AcqRel) {
            self.emit(HostEvent::MuteChanged { muted: true });
        }
    }

    fn restore_mute(&mut self, muted: bool) {
        if self.muted.swap(muted, Ordering::AcqRel) != muted {
            self.emit(HostEvent::MuteChanged { muted });
        }
    }

    fn forced_mute(&self) -> Option<FeedbackRisk> {
        if self.feedback_acknowledged {
            None
        } else {
            self.feedback.clone()
        }
    }

    fn apply(&mut self, tree: &StateTree) -> Result<RestoreReport, HostError> {
        let was_running = self.is_running();
        self.stop();
        let report = {
            let mut container = self.container.lock();
            self.controller.restore(container.processor_mut(), tree)
        };
        self.emit(HostEvent::LoadSucceeded {
            instances: report.instances,
            warnings: report.warnings.len(),
        });
        if was_running {
            self.start().map_err(|err| match err {
                HostError::Device(source) => HostError::Restart { source },
                other => other,
            })?;
        }
        Ok(report)
    }

    /// Logs and reports a failure. Returns `true` if the user wants a retry.
    fn on_failure(
        &mut self,
        operation: Operation,
        err: &HostError,
        options: SaveOptions,
        prompt: &mut dyn UserPrompt,
    ) -> bool {
        tracing::warn!(?operation, error = %err, "plugin state operation failed");
        if options.ask_again_on_failure && prompt.confirm(Prompt::Retry(operation)) {
            return true;
        }
        if options.notify_on_failure {
            prompt.notify_failure(operation, err);
        }
        let reason = err.reason();
        self.emit(match operation {
            Operation::Save => HostEvent::SaveFailed { reason },
            Operation::Load => HostEvent::LoadFailed { reason },
        });
        false
    }

    fn mark_config_dirty(&mut self, now: Instant) {
        self.config_dirty = true;
        self.tasks
            .schedule_at(ControlTask::PersistDeviceConfig, now + PERSIST_DELAY);
    }

    fn emit(&mut self, event: HostEvent) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl<B: AudioBackend> std::fmt::Debug for StandaloneHost<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandaloneHost")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("running", &self.stream.is_some())
            .field("muted", &self.is_muted())
            .finish_non_exhaustive()
    }
}

fn layout_for(config: &DeviceConfig) -> ChannelLayout {
    if config.input_channels == 0 {
        ChannelLayout::output_only(usize::from(config.output_channels))
    } else {
        ChannelLayout::from_masks(
            usize::from(config.input_channels),
            usize::from(config.output_channels),
            config.input_mask,
            config.output_mask,
        )
    }
}
