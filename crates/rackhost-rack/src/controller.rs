//! Control half of the rack.
//!
//! [`RackController`] is the only thing that mutates the rack's structure. It
//! keeps a mirror of every instance in signal order (active, parked after a
//! failed setup, or placeholder), sends structural commands to the
//! [`RackProcessor`] and reclaims whatever the processor hands back.
//!
//! # Slots
//!
//! | Kind | Where the instance lives | In the active order |
//! |------|--------------------------|---------------------|
//! | `Live` | command queue or processor chain | once promoted |
//! | `Parked` | here, after `begin_playback` failed | never |
//! | `Placeholder` | here, as the raw state node | never |
//!
//! A removed live instance leaves the mirror at once but keeps its index
//! reserved until the processor returns it and it is destroyed here.

use crate::command::{Garbage, RackCommand};
use crate::error::RackError;
use crate::events::RackEvent;
use crate::instance::{Instance, InstanceId, InstanceState, InstanceStatus};
use crate::processor::RackProcessor;
use crate::state::{InstanceNode, ParamValue, RestoreReport, RestoreWarning, StateTree};
use crate::view::{InstanceView, RackView};
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use rackhost_core::{ParamBinding, PlaybackSettings, SetupError};
use rackhost_registry::{ModuleRegistry, RegisteredModule};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

enum SlotKind {
    Live(ParamBinding),
    Parked {
        instance: Box<Instance>,
        error: SetupError,
    },
    Placeholder(InstanceNode),
}

/// Why an instance could not be queued. The instance comes back unplayed
/// unless the processor is gone.
enum LaunchError {
    Setup(Box<Instance>, SetupError),
    QueueFull(Box<Instance>),
    Disconnected,
}

impl From<LaunchError> for RackError {
    fn from(err: LaunchError) -> Self {
        match err {
            LaunchError::Setup(instance, source) => RackError::Setup {
                id: instance.id(),
                source,
            },
            LaunchError::QueueFull(_) => RackError::QueueFull,
            LaunchError::Disconnected => RackError::Disconnected,
        }
    }
}

struct Slot {
    status: Arc<InstanceStatus>,
    kind: SlotKind,
}

impl Slot {
    fn id(&self) -> InstanceId {
        self.status.id()
    }

    fn is_live(&self) -> bool {
        matches!(self.kind, SlotKind::Live(_))
    }
}

/// The control-thread side of a rack.
///
/// Created together with its processor by [`rack`](crate::rack). Not `Sync`;
/// keep it on one control thread.
pub struct RackController {
    registry: Arc<ModuleRegistry>,
    slots: Vec<Slot>,
    /// Per type, which instance indices are taken.
    occupancy: HashMap<&'static str, Vec<bool>>,
    /// Removed from the mirror, not yet returned by the processor.
    draining: Vec<Arc<InstanceStatus>>,
    commands: Sender<RackCommand>,
    garbage: Receiver<Garbage>,
    settings: PlaybackSettings,
    next_id: u64,
    view: Arc<ArcSwap<RackView>>,
    generation: u64,
    listeners: Vec<Sender<RackEvent>>,
}

impl RackController {
    pub(crate) fn new(
        registry: Arc<ModuleRegistry>,
        commands: Sender<RackCommand>,
        garbage: Receiver<Garbage>,
        settings: PlaybackSettings,
    ) -> Self {
        let occupancy = registry
            .iter()
            .map(|m| (m.info().id, vec![false; m.info().max_instances]))
            .collect();
        Self {
            registry,
            slots: Vec::new(),
            occupancy,
            draining: Vec::new(),
            commands,
            garbage,
            settings,
            next_id: 1,
            view: Arc::new(ArcSwap::from_pointee(RackView::default())),
            generation: 0,
            listeners: Vec::new(),
        }
    }

    // ── Structure ──────────────────────────────────────────────────────────

    /// Adds an instance of `type_id` at the end of the chain.
    ///
    /// The instance's parameters start at their defaults and it is prepared
    /// for the current settings here, off the realtime thread. It joins the
    /// processing order at the processor's next block boundary.
    ///
    /// # Errors
    ///
    /// - [`RackError::Capacity`] if every index of the type is taken
    ///   (including ones still draining). Nothing changes.
    /// - [`RackError::Setup`] if `begin_playback` fails. The instance is kept,
    ///   parked outside the active order, and retried on the next
    ///   [`reconfigure`](Self::reconfigure) or [`retry_pending`](Self::retry_pending).
    pub fn add_instance(&mut self, type_id: &str) -> Result<InstanceId, RackError> {
        self.collect_garbage();
        let registry = Arc::clone(&self.registry);
        let module = registry
            .get(type_id)
            .ok_or_else(|| RackError::UnknownModule(type_id.to_owned()))?;
        let info = module.info();
        let index = self
            .claim_index(info.id, None)
            .ok_or_else(|| RackError::Capacity {
                type_id: info.id.to_owned(),
                max: info.max_instances,
            })?;
        let Some(instance) = self.build(module, index) else {
            self.release_index(info.id, index);
            return Err(RackError::Capacity {
                type_id: info.id.to_owned(),
                max: info.max_instances,
            });
        };
        let id = instance.id();
        let position = self.live_before(self.slots.len());
        let status = Arc::clone(&instance.status);
        let params = instance.params.clone();

        let (kind, failure) = match self.launch(instance, position) {
            Ok(()) => (SlotKind::Live(params), None),
            Err(LaunchError::Setup(instance, source)) => {
                instance.status.set_setup_failed(true);
                let kind = SlotKind::Parked {
                    instance,
                    error: source.clone(),
                };
                (kind, Some(source))
            }
            Err(err) => {
                self.release_index(info.id, index);
                return Err(err.into());
            }
        };
        self.slots.push(Slot { status, kind });
        tracing::info!(%id, type_id = info.id, index, "instance added");
        self.emit(RackEvent::InstanceAdded {
            id,
            type_id: info.id.to_owned(),
            index,
        });
        if let Some(source) = failure {
            tracing::warn!(%id, error = %source, "instance setup failed, parked");
            self.emit(RackEvent::SetupFailed {
                id,
                error: source.clone(),
            });
            self.publish();
            return Err(RackError::Setup { id, source });
        }
        self.publish();
        Ok(id)
    }

    /// Removes an instance.
    ///
    /// A live instance is marked `Draining` and leaves the processing order at
    /// the next block boundary; it is destroyed once the processor hands it
    /// back. Parked instances and placeholders go immediately.
    pub fn remove_instance(&mut self, id: InstanceId) -> Result<(), RackError> {
        self.collect_garbage();
        let pos = self
            .slot_position(id)
            .ok_or(RackError::UnknownInstance(id))?;
        if self.slots[pos].is_live() {
            let status = Arc::clone(&self.slots[pos].status);
            let previous = status.state();
            status.set_state(InstanceState::Draining);
            if let Err(err) = self.send(RackCommand::Remove(id)) {
                status.set_state(previous);
                return Err(err);
            }
            self.slots.remove(pos);
            self.draining.push(status);
        } else {
            let slot = self.slots.remove(pos);
            if let SlotKind::Parked { instance, .. } = slot.kind {
                self.destroy(instance);
            } else {
                slot.status.set_state(InstanceState::Destroyed);
            }
        }
        tracing::info!(%id, "instance removed");
        self.emit(RackEvent::InstanceRemoved { id });
        self.publish();
        Ok(())
    }

    /// Cancels an instance that was added but never became active.
    ///
    /// # Errors
    ///
    /// [`RackError::NotCancellable`] for anything not parked, including a
    /// draining instance; that one must be re-added as a new instance.
    pub fn cancel_pending(&mut self, id: InstanceId) -> Result<(), RackError> {
        match self.slot_position(id) {
            Some(pos) if matches!(self.slots[pos].kind, SlotKind::Parked { .. }) => {
                self.remove_instance(id)
            }
            Some(_) => Err(RackError::NotCancellable(id)),
            None if self.draining.iter().any(|s| s.id() == id) => {
                Err(RackError::NotCancellable(id))
            }
            None => Err(RackError::UnknownInstance(id)),
        }
    }

    /// Replaces the signal order.
    ///
    /// `order` must name every instance in [`order`](Self::order) exactly
    /// once. The processor adopts the new order between two blocks.
    pub fn reorder(&mut self, order: &[InstanceId]) -> Result<(), RackError> {
        self.collect_garbage();
        if order.len() != self.slots.len() {
            return Err(RackError::InvalidOrder(format!(
                "expected {} instances, got {}",
                self.slots.len(),
                order.len()
            )));
        }
        let mut seen = HashSet::with_capacity(order.len());
        let mut permutation = Vec::with_capacity(order.len());
        for &id in order {
            if !seen.insert(id) {
                return Err(RackError::InvalidOrder(format!("{id} listed twice")));
            }
            let pos = self
                .slot_position(id)
                .ok_or_else(|| RackError::InvalidOrder(format!("{id} is not in the rack")))?;
            permutation.push(pos);
        }

        let live: Vec<InstanceId> = permutation
            .iter()
            .filter(|&&p| self.slots[p].is_live())
            .map(|&p| self.slots[p].id())
            .collect();
        self.send(RackCommand::Reorder(live))?;

        let mut old: Vec<Option<Slot>> = std::mem::take(&mut self.slots)
            .into_iter()
            .map(Some)
            .collect();
        self.slots = permutation.iter().filter_map(|&p| old[p].take()).collect();

        tracing::debug!(instances = order.len(), "rack reordered");
        self.emit(RackEvent::Reordered {
            order: order.to_vec(),
        });
        self.publish();
        Ok(())
    }

    /// Sets an instance's bypass flag; effective from the next block.
    pub fn set_bypassed(&mut self, id: InstanceId, bypassed: bool) -> Result<(), RackError> {
        let status = self.status(id).ok_or(RackError::UnknownInstance(id))?;
        status.set_bypassed(bypassed);
        Ok(())
    }

    // ── Queries ────────────────────────────────────────────────────────────

    /// Parameter binding of a live or parked instance.
    pub fn params(&self, id: InstanceId) -> Option<ParamBinding> {
        let slot = self.slots.iter().find(|s| s.id() == id)?;
        match &slot.kind {
            SlotKind::Live(params) => Some(params.clone()),
            SlotKind::Parked { instance, .. } => Some(instance.params.clone()),
            SlotKind::Placeholder(_) => None,
        }
    }

    /// Shared status of any instance in the rack or still draining.
    pub fn status(&self, id: InstanceId) -> Option<Arc<InstanceStatus>> {
        self.slots
            .iter()
            .map(|s| &s.status)
            .chain(&self.draining)
            .find(|s| s.id() == id)
            .cloned()
    }

    /// Every instance in signal order, including parked ones and placeholders.
    pub fn order(&self) -> Vec<InstanceId> {
        self.slots.iter().map(Slot::id).collect()
    }

    /// Instances the processor will run, in signal order.
    ///
    /// Includes instances whose insertion is still queued; compare with
    /// [`InstanceStatus::state`] to see which have been promoted.
    pub fn active_order(&self) -> Vec<InstanceId> {
        self.slots
            .iter()
            .filter(|s| s.is_live())
            .map(Slot::id)
            .collect()
    }

    /// Instances parked after a failed setup, with the failure.
    pub fn pending(&self) -> Vec<(InstanceId, SetupError)> {
        self.slots
            .iter()
            .filter_map(|s| match &s.kind {
                SlotKind::Parked { error, .. } => Some((s.id(), error.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of instances in the rack.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the rack holds no instances.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Settings every live instance is prepared for.
    pub fn settings(&self) -> PlaybackSettings {
        self.settings
    }

    /// The registry instances are created from.
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Handle to the published [`RackView`]; readable from any thread.
    pub fn view(&self) -> Arc<ArcSwap<RackView>> {
        Arc::clone(&self.view)
    }

    /// The current published snapshot.
    pub fn snapshot(&self) -> Arc<RackView> {
        self.view.load_full()
    }

    /// Receives every [`RackEvent`] from now on.
    pub fn subscribe(&mut self) -> Receiver<RackEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.listeners.push(tx);
        rx
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    /// Reclaims everything the processor has handed back.
    ///
    /// Removed instances get `finish_playback`, are marked `Destroyed` and
    /// free their index. Called at the start of every mutating operation;
    /// hosts also call it periodically.
    pub fn collect_garbage(&mut self) -> usize {
        let mut collected = 0;
        while let Ok(item) = self.garbage.try_recv() {
            collected += 1;
            match item {
                Garbage::Removed(instance) => {
                    self.draining.retain(|s| s.id() != instance.id());
                    self.destroy(instance);
                }
                Garbage::Rejected(mut instance) => {
                    instance.finish();
                    if self.draining.iter().any(|s| s.id() == instance.id()) {
                        self.draining.retain(|s| s.id() != instance.id());
                        self.destroy(instance);
                    } else {
                        self.park(
                            instance,
                            SetupError::Resource("processing chain is full".into()),
                        );
                    }
                }
                Garbage::Order(_) => {}
            }
        }
        if collected > 0 {
            self.publish();
        }
        collected
    }

    /// Re-prepares the whole rack for new settings.
    ///
    /// Call with the audio stream stopped. Every live instance gets
    /// `finish_playback` and `begin_playback`; those that fail are parked.
    /// Previously parked instances are retried. Returns every instance that
    /// is parked afterwards.
    pub fn reconfigure(
        &mut self,
        processor: &mut RackProcessor,
        settings: PlaybackSettings,
    ) -> Vec<(InstanceId, SetupError)> {
        self.collect_garbage();
        self.settings = settings;
        let parked_before = self.pending_ids();
        let failed = processor.prepare(settings);
        self.collect_garbage();
        for (instance, error) in failed {
            self.park(instance, error);
        }
        self.retry(&parked_before);
        processor.sync();
        self.collect_garbage();
        tracing::info!(
            sample_rate = settings.sample_rate,
            block_size = settings.block_size,
            channels = settings.channels,
            parked = self.pending().len(),
            "rack reconfigured"
        );
        self.publish();
        self.pending()
    }

    /// Tries `begin_playback` again on every parked instance.
    ///
    /// Returns the instances that are still parked.
    pub fn retry_pending(&mut self) -> Vec<(InstanceId, SetupError)> {
        self.collect_garbage();
        let ids = self.pending_ids();
        self.retry(&ids)
    }

    fn pending_ids(&self) -> Vec<InstanceId> {
        self.slots
            .iter()
            .filter(|s| matches!(s.kind, SlotKind::Parked { .. }))
            .map(Slot::id)
            .collect()
    }

    fn retry(&mut self, ids: &[InstanceId]) -> Vec<(InstanceId, SetupError)> {
        let mut still_parked = Vec::new();
        for pos in 0..self.slots.len() {
            if !ids.contains(&self.slots[pos].id()) {
                continue;
            }
            let SlotKind::Parked { instance, .. } = &self.slots[pos].kind else {
                continue;
            };
            let params = instance.params.clone();
            let (instance, previous) =
                match std::mem::replace(&mut self.slots[pos].kind, SlotKind::Live(params)) {
                    SlotKind::Parked { instance, error } => (instance, error),
                    other => {
                        self.slots[pos].kind = other;
                        continue;
                    }
                };
            let id = instance.id();
            let position = self.live_before(pos);
            match self.launch(instance, position) {
                Ok(()) => {
                    tracing::info!(%id, "parked instance recovered");
                    self.emit(RackEvent::SetupRecovered { id });
                }
                Err(err) => {
                    let (instance, error) = match err {
                        LaunchError::Setup(instance, error) => (instance, error),
                        LaunchError::QueueFull(instance) => (instance, previous),
                        LaunchError::Disconnected => continue,
                    };
                    instance.status.set_state(InstanceState::Preparing);
                    self.slots[pos].kind = SlotKind::Parked {
                        instance,
                        error: error.clone(),
                    };
                    still_parked.push((id, error));
                }
            }
        }
        self.publish();
        still_parked
    }

    /// Tears the rack down: every instance is finished and destroyed.
    ///
    /// Call with the audio stream stopped.
    pub fn shutdown(&mut self, processor: &mut RackProcessor) {
        self.clear(processor);
        self.publish();
        tracing::info!("rack shut down");
    }

    // ── State ──────────────────────────────────────────────────────────────

    /// Serializes every instance in signal order.
    ///
    /// Parked instances and placeholders are included exactly as they would
    /// be restored, so a failed setup never loses data.
    pub fn serialize(&self) -> StateTree {
        let instances = self
            .slots
            .iter()
            .map(|slot| {
                let params = match &slot.kind {
                    SlotKind::Live(params) => Some(params),
                    SlotKind::Parked { instance, .. } => Some(&instance.params),
                    SlotKind::Placeholder(node) => {
                        let mut node = node.clone();
                        node.bypassed = slot.status.is_bypassed();
                        return node;
                    }
                };
                InstanceNode {
                    type_id: slot.status.type_id().to_owned(),
                    index: slot.status.index(),
                    bypassed: slot.status.is_bypassed(),
                    params: params.map(param_values).unwrap_or_default(),
                }
            })
            .collect();
        StateTree {
            instances,
            ..StateTree::default()
        }
    }

    /// Replaces the rack's contents with `tree`.
    ///
    /// Needs exclusive access to the processor, so call it with the stream
    /// stopped or the processor's lock held; the audio thread outputs
    /// silence for the blocks it misses.
    ///
    /// Instances are recreated in order with their stored index when it is
    /// free. Stored parameter values are applied by id; parameters missing
    /// from the tree keep their defaults. Unknown types become inert
    /// placeholders that serialize back unchanged.
    pub fn restore(&mut self, processor: &mut RackProcessor, tree: &StateTree) -> RestoreReport {
        self.clear(processor);
        let registry = Arc::clone(&self.registry);
        let mut report = RestoreReport::default();

        for node in &tree.instances {
            let Some(module) = registry.get(&node.type_id) else {
                tracing::warn!(type_id = %node.type_id, "unknown module type in state");
                report.warnings.push(RestoreWarning::UnknownType {
                    type_id: node.type_id.clone(),
                });
                self.add_placeholder(node);
                continue;
            };
            let info = module.info();
            let Some(index) = self.claim_index(info.id, Some(node.index)) else {
                tracing::warn!(type_id = info.id, "no free instance for restored node");
                report.warnings.push(RestoreWarning::OverCapacity {
                    type_id: node.type_id.clone(),
                });
                self.add_placeholder(node);
                continue;
            };

            let Some(mut instance) = self.build(module, index) else {
                self.release_index(info.id, index);
                report.warnings.push(RestoreWarning::OverCapacity {
                    type_id: node.type_id.clone(),
                });
                self.add_placeholder(node);
                continue;
            };
            for pv in &node.params {
                match instance.params.index_of(&pv.id) {
                    Some(param) => {
                        instance.params.set(param, pv.value);
                    }
                    None => report.warnings.push(RestoreWarning::UnknownParam {
                        type_id: node.type_id.clone(),
                        param: pv.id.clone(),
                    }),
                }
            }
            instance.status.set_bypassed(node.bypassed);
            instance.status.set_state(InstanceState::Preparing);

            let status = Arc::clone(&instance.status);
            let params = instance.params.clone();
            self.slots.push(Slot {
                status,
                kind: SlotKind::Live(params),
            });
            match instance.context.begin_playback(index, &self.settings) {
                Ok(()) => {
                    instance.playing = true;
                    if let Err(mut instance) = processor.adopt(instance) {
                        instance.finish();
                        self.park(
                            instance,
                            SetupError::Resource("processing chain is full".into()),
                        );
                    }
                }
                Err(error) => {
                    report.warnings.push(RestoreWarning::SetupFailed {
                        type_id: node.type_id.clone(),
                        index,
                        error: error.clone(),
                    });
                    self.park(instance, error);
                }
            }
        }

        report.instances = self.slots.len();
        tracing::info!(
            instances = report.instances,
            warnings = report.warnings.len(),
            "rack state restored"
        );
        self.emit(RackEvent::Restored {
            instances: report.instances,
        });
        self.publish();
        report
    }

    /// [`serialize`](Self::serialize) as JSON bytes, for hosts that store an
    /// opaque state blob.
    pub fn save_state_bytes(&self) -> Result<Vec<u8>, RackError> {
        Ok(serde_json::to_vec(&self.serialize())?)
    }

    /// Parses a blob from [`save_state_bytes`](Self::save_state_bytes) and
    /// restores it.
    ///
    /// # Errors
    ///
    /// [`RackError::State`] if the bytes do not parse; the rack is unchanged.
    pub fn load_state_bytes(
        &mut self,
        processor: &mut RackProcessor,
        bytes: &[u8],
    ) -> Result<RestoreReport, RackError> {
        let tree: StateTree = serde_json::from_slice(bytes)?;
        Ok(self.restore(processor, &tree))
    }

    // ── Internals ──────────────────────────────────────────────────────────

    fn next_id(&mut self) -> InstanceId {
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Takes a free index, preferring `wanted`.
    fn claim_index(&mut self, type_id: &'static str, wanted: Option<usize>) -> Option<usize> {
        let taken = self.occupancy.get_mut(type_id)?;
        let index = wanted
            .filter(|&i| taken.get(i) == Some(&false))
            .or_else(|| taken.iter().position(|t| !t))?;
        taken[index] = true;
        Some(index)
    }

    fn release_index(&mut self, type_id: &str, index: usize) {
        if let Some(slot) = self
            .occupancy
            .get_mut(type_id)
            .and_then(|taken| taken.get_mut(index))
        {
            *slot = false;
        }
    }

    fn build(&mut self, module: &RegisteredModule, index: usize) -> Option<Box<Instance>> {
        let info = module.info();
        let params = module.parameters().claim(index)?;
        params.reset();
        let id = self.next_id();
        Some(Box::new(Instance {
            status: Arc::new(InstanceStatus::new(id, info.id, index, false)),
            context: module.create_context(),
            params,
            supports_double: info.supports_double,
            playing: false,
        }))
    }

    fn add_placeholder(&mut self, node: &InstanceNode) {
        let id = self.next_id();
        let status = Arc::new(InstanceStatus::new(id, &node.type_id, node.index, true));
        status.set_bypassed(node.bypassed);
        status.set_state(InstanceState::Preparing);
        self.slots.push(Slot {
            status,
            kind: SlotKind::Placeholder(node.clone()),
        });
        self.emit(RackEvent::PlaceholderCreated {
            id,
            type_id: node.type_id.clone(),
        });
    }

    /// Prepares an instance and queues it for insertion.
    fn launch(&mut self, mut instance: Box<Instance>, position: usize) -> Result<(), LaunchError> {
        instance.status.set_state(InstanceState::Preparing);
        if let Err(error) = instance
            .context
            .begin_playback(instance.index(), &self.settings)
        {
            return Err(LaunchError::Setup(instance, error));
        }
        instance.playing = true;
        if self.commands.is_full() {
            instance.finish();
            return Err(LaunchError::QueueFull(instance));
        }
        instance.status.set_setup_failed(false);
        let id = instance.id();
        if self
            .commands
            .try_send(RackCommand::Insert { instance, position })
            .is_err()
        {
            tracing::warn!(%id, "rack processor dropped, instance discarded");
            return Err(LaunchError::Disconnected);
        }
        Ok(())
    }

    fn send(&mut self, command: RackCommand) -> Result<(), RackError> {
        self.collect_garbage();
        self.commands.try_send(command).map_err(|e| queue_error(&e))
    }

    /// Moves an instance into its slot as parked.
    fn park(&mut self, instance: Box<Instance>, error: SetupError) {
        let id = instance.id();
        instance.status.set_setup_failed(true);
        instance.status.set_state(InstanceState::Preparing);
        tracing::warn!(
            %id,
            type_id = instance.status.type_id(),
            %error,
            "instance setup failed, parked"
        );
        match self.slots.iter_mut().find(|s| s.id() == id) {
            Some(slot) => {
                slot.kind = SlotKind::Parked {
                    instance,
                    error: error.clone(),
                }
            }
            None => {
                self.destroy(instance);
                return;
            }
        }
        self.emit(RackEvent::SetupFailed { id, error });
    }

    fn destroy(&mut self, mut instance: Box<Instance>) {
        instance.finish();
        instance.status.set_state(InstanceState::Destroyed);
        let id = instance.id();
        self.release_index(instance.status.type_id(), instance.index());
        tracing::debug!(%id, type_id = instance.status.type_id(), "instance destroyed");
        self.emit(RackEvent::InstanceDestroyed { id });
    }

    /// Empties the rack, reclaiming everything from the processor.
    fn clear(&mut self, processor: &mut RackProcessor) {
        self.collect_garbage();
        processor.sync();
        self.collect_garbage();
        for instance in processor.take_all() {
            self.destroy(instance);
        }
        for slot in std::mem::take(&mut self.slots) {
            match slot.kind {
                SlotKind::Parked { instance, .. } => self.destroy(instance),
                SlotKind::Live(_) | SlotKind::Placeholder(_) => {
                    slot.status.set_state(InstanceState::Destroyed);
                }
            }
        }
        for status in std::mem::take(&mut self.draining) {
            self.release_index(status.type_id(), status.index());
            status.set_state(InstanceState::Destroyed);
        }
    }

    fn slot_position(&self, id: InstanceId) -> Option<usize> {
        self.slots.iter().position(|s| s.id() == id)
    }

    /// Number of live slots before `pos`: the processor chain position of a
    /// live instance at `pos`.
    fn live_before(&self, pos: usize) -> usize {
        self.slots[..pos].iter().filter(|s| s.is_live()).count()
    }

    fn emit(&mut self, event: RackEvent) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn publish(&mut self) {
        self.generation += 1;
        let instances = self
            .slots
            .iter()
            .map(|slot| {
                let module = self
                    .registry
                    .get(slot.status.type_id())
                    .filter(|_| !slot.status.is_placeholder());
                InstanceView {
                    status: Arc::clone(&slot.status),
                    name: module.map_or_else(
                        || slot.status.type_id().to_owned(),
                        |m| m.info().name.to_owned(),
                    ),
                    has_editor: module.is_some_and(|m| m.info().has_editor),
                }
            })
            .collect();
        self.view.store(Arc::new(RackView {
            generation: self.generation,
            instances,
        }));
    }
}

impl std::fmt::Debug for RackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RackController")
            .field("instances", &self.slots.len())
            .field("draining", &self.draining.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn queue_error<T>(err: &TrySendError<T>) -> RackError {
    match err {
        TrySendError::Full(_) => RackError::QueueFull,
        TrySendError::Disconnected(_) => RackError::Disconnected,
    }
}

fn param_values(params: &ParamBinding) -> Vec<ParamValue> {
    (0..params.len())
        .filter_map(|i| {
            let descriptor = params.descriptor(i)?;
            Some(ParamValue {
                id: descriptor.string_id.to_owned(),
                value: params.get(i),
            })
        })
        .collect()
}
