// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The producer's handle on a device.
//!
//! A [DeviceContext] owns everything the producer timeline mutates: the active command
//! stream, the frame counter, the access tracker, the fast-clear ledger and the
//! submission splitter.  It is passed by `&mut` into every operation instead of living
//! in global state, and its lifetime is the device's: create it with
//! [DeviceContext::new], tear it down with [DeviceContext::shutdown].

use crate::bindings::dirty_tracking::{
    ValidationLog, ValidationWarning, check_read_write_rebind, check_sampling, check_write,
};
use crate::bindings::fast_clear::FastClearLedger;
use crate::bindings::resource_tracking::{ResourceAccessTracker, ResourceDesc, WaitSlot};
use crate::bindings::visible_to::{MemoryClass, TargetConfig, TargetKind};
use crate::bindings::{AccessClass, ResourceId};
use crate::device::config::Config;
use crate::device::splitter::{SubmissionSplitter, should_split};
use crate::device::stream::{Command, CommandStream, DeferredOp};
use crate::error::Error;
use crate::fence::{FenceGate, Label};
use crate::imp;
use crate::imp::Backing;
use crate::sys::time::Instant;
use std::collections::HashMap;
use std::sync::Arc;

//targets get page alignment so compression metadata can be addressed per page
const TARGET_ALIGNMENT: u64 = 4096;

#[derive(Debug)]
pub struct DeviceContext {
    device: Arc<imp::Device>,
    config: Config,
    stream: CommandStream,
    tracker: ResourceAccessTracker,
    ledger: FastClearLedger,
    splitter: SubmissionSplitter,
    validation: ValidationLog,
    frame: u64,
    next_resource: u64,
    fence_label: Label,
    fence_sentinel: u64,
    //single-allocation resources; version rings own their own allocations
    owned: HashMap<ResourceId, Backing>,
}

impl DeviceContext {
    pub fn new(device: Arc<imp::Device>, config: Config) -> Self {
        logwise::info_sync!(
            "DeviceContext::new on {device}",
            device = logwise::privacy::LogIt(&device.debug_name())
        );
        let validation = ValidationLog::new(config.collect_validation);
        DeviceContext {
            splitter: SubmissionSplitter::new(Label::new(format!("{} submissions", device.debug_name()))),
            fence_label: Label::new(format!("{} transition fences", device.debug_name())),
            device,
            config,
            stream: CommandStream::new(),
            tracker: ResourceAccessTracker::new(),
            ledger: FastClearLedger::new(),
            validation,
            frame: 0,
            next_resource: 1,
            fence_sentinel: 0,
            owned: HashMap::new(),
        }
    }

    pub fn device(&self) -> &Arc<imp::Device> {
        &self.device
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current producer frame.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Commands recorded since the last split.
    pub fn recorded(&self) -> &[Command] {
        self.stream.commands()
    }

    pub fn encoded_size(&self) -> usize {
        self.stream.encoded_size()
    }

    pub fn tracker(&self) -> &ResourceAccessTracker {
        &self.tracker
    }

    pub fn ledger(&self) -> &FastClearLedger {
        &self.ledger
    }

    pub(crate) fn stream_mut(&mut self) -> &mut CommandStream {
        &mut self.stream
    }

    pub(crate) fn tracker_mut(&mut self) -> &mut ResourceAccessTracker {
        &mut self.tracker
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut FastClearLedger {
        &mut self.ledger
    }

    pub(crate) fn next_fence_gate(&mut self) -> FenceGate {
        self.fence_sentinel += 1;
        FenceGate::new(&self.fence_label, self.fence_sentinel)
    }

    pub(crate) fn register_resource(&mut self, desc: ResourceDesc, initial: AccessClass) -> ResourceId {
        let id = ResourceId(self.next_resource);
        self.next_resource += 1;
        logwise::trace_sync!(
            "register {id} {name}",
            id = id.0,
            name = logwise::privacy::LogIt(&desc.debug_name)
        );
        self.tracker.register(id, desc, initial, self.frame);
        id
    }

    pub(crate) fn unregister_resource(&mut self, id: ResourceId) {
        self.tracker.remove(id);
        self.ledger.mark_resolved(id);
    }

    fn known(&self, id: ResourceId) -> Result<(), Error> {
        if self.tracker.contains(id) {
            Ok(())
        } else {
            Err(Error::UnknownResource(id))
        }
    }

    /// Creates a device-local render, depth or storage target.
    ///
    /// Targets start out [AccessClass::Writable].
    pub fn create_target(&mut self, config: TargetConfig<'_>) -> Result<ResourceId, Error> {
        let byte_len = config
            .byte_len()
            .ok_or_else(|| Error::InvalidArgument(format!("{} is too large to address", config.debug_name)))?;
        if byte_len == 0 {
            return Err(Error::InvalidArgument(format!("{} has zero size", config.debug_name)));
        }
        if config.subresources == 0 {
            return Err(Error::InvalidArgument(format!("{} has no subresources", config.debug_name)));
        }
        let backing = self.device.allocate(byte_len, TARGET_ALIGNMENT, config.memory_class())?;
        let slot = match config.kind {
            TargetKind::Color => WaitSlot::Color,
            TargetKind::Depth => WaitSlot::Depth,
            TargetKind::Storage => WaitSlot::Shader,
        };
        let id = self.register_resource(
            ResourceDesc {
                range: backing.range(),
                slot,
                compressed: config.compressed,
                subresources: config.subresources,
                debug_name: config.debug_name.to_string(),
            },
            AccessClass::Writable,
        );
        self.owned.insert(id, backing);
        Ok(id)
    }

    /// Creates a device-local buffer written by shaders.
    pub fn create_device_buffer(&mut self, size: u64, debug_name: &str) -> Result<ResourceId, Error> {
        if size == 0 {
            return Err(Error::InvalidArgument(format!("{debug_name} has zero size")));
        }
        let backing = self
            .device
            .allocate(size, self.config.buffer_alignment, MemoryClass::DeviceLocal)?;
        let id = self.register_resource(
            ResourceDesc {
                range: backing.range(),
                slot: WaitSlot::Shader,
                compressed: false,
                subresources: 1,
                debug_name: debug_name.to_string(),
            },
            AccessClass::Writable,
        );
        self.owned.insert(id, backing);
        Ok(id)
    }

    /// Destroys a target or device buffer.
    ///
    /// The allocation is freed on the consumer timeline, after everything already
    /// recorded against it.  Version rings are destroyed with
    /// [crate::multibuffer::BufferVersionRing::destroy] instead.
    pub fn destroy_resource(&mut self, id: ResourceId) -> Result<(), Error> {
        self.known(id)?;
        let Some(backing) = self.owned.remove(&id) else {
            return Err(Error::InvalidArgument(format!(
                "{id:?} belongs to a version ring; destroy the ring instead"
            )));
        };
        self.stream.encode_deferred(DeferredOp::Free(backing));
        self.unregister_resource(id);
        Ok(())
    }

    /// Records that the clear path performed a hardware fast clear on `id`.
    ///
    /// A clear is a device write, so the resource also becomes dirty.  Clearing again
    /// before the previous clear was resolved is legal.
    pub fn mark_cleared(&mut self, id: ResourceId) -> Result<(), Error> {
        self.known(id)?;
        if self.ledger.mark_cleared(id, self.frame) {
            logwise::trace_sync!("{id} re-cleared while unresolved", id = id.0);
        }
        self.tracker.mark_dirty(id, self.frame);
        Ok(())
    }

    /// Records that an explicit resolve pass ran for `id`.
    ///
    /// Returns whether `id` had been unresolved.
    pub fn mark_resolved(&mut self, id: ResourceId) -> Result<bool, Error> {
        self.known(id)?;
        Ok(self.ledger.mark_resolved(id))
    }

    /// Records a device write to `id`, setting its dirty bit.
    pub fn mark_written(&mut self, id: ResourceId) -> Result<(), ValidationWarning> {
        let result = match self.tracker.mark_dirty(id, self.frame) {
            Some(previous) => {
                let name = self
                    .tracker
                    .get(id)
                    .map(|e| e.desc().debug_name.clone())
                    .unwrap_or_default();
                check_write(id, previous, &name)
            }
            None => Err(ValidationWarning::UnknownResource(id)),
        };
        self.validation.report(result)
    }

    /// Validates binding `id` for a new read-write use.
    pub fn bind_read_write(&mut self, id: ResourceId) -> Result<(), ValidationWarning> {
        let result = match self.tracker.get(id) {
            Some(entry) => check_read_write_rebind(id, entry),
            None => Err(ValidationWarning::UnknownResource(id)),
        };
        self.validation.report(result)
    }

    /// Validates binding `id` to be sampled as an ordinary texture.
    pub fn bind_for_sampling(&mut self, id: ResourceId) -> Result<(), ValidationWarning> {
        let result = match self.tracker.get(id) {
            Some(entry) => check_sampling(id, entry, self.ledger.contains(id)),
            None => Err(ValidationWarning::UnknownResource(id)),
        };
        self.validation.report(result)
    }

    /// Warnings collected since the last call.
    pub fn take_validation_warnings(&mut self) -> Vec<ValidationWarning> {
        self.validation.take()
    }

    /// Records front-end work (draws, dispatches, copies) of `bytes` encoded size.
    pub fn encode_opaque(&mut self, bytes: usize) {
        self.stream.encode_opaque(bytes);
    }

    /// Cuts the stream if it has reached `threshold_bytes`.  Returns whether it did.
    ///
    /// Only call this where closing a submission is safe, e.g. between passes.
    pub fn maybe_split(&mut self, threshold_bytes: usize) -> bool {
        if should_split(self.stream.encoded_size(), threshold_bytes) {
            self.force_split().is_some()
        } else {
            false
        }
    }

    /// [Self::maybe_split] with the configured threshold.
    pub fn split_if_full(&mut self) -> bool {
        self.maybe_split(self.config.split_threshold_bytes)
    }

    /// Submits everything recorded so far.  Returns the submission index, or `None` if
    /// there was nothing to submit.
    pub fn force_split(&mut self) -> Option<u64> {
        let submission = self.splitter.cut(&mut self.stream)?;
        let index = submission.index;
        self.device.submit(submission);
        Some(index)
    }

    /// Submits the frame and advances the frame counter.
    pub fn end_frame(&mut self) -> Option<u64> {
        let submitted = self.force_split();
        self.frame += 1;
        logwise::trace_sync!("end_frame -> {frame}", frame = self.frame);
        submitted
    }

    /// Index of the most recent submission.
    pub fn submitted_submission(&self) -> u64 {
        self.splitter.submitted()
    }

    /// Index of the most recent submission the device has finished.
    pub fn completed_submission(&self) -> u64 {
        self.splitter.label().value()
    }

    /// Waits until submission `index` has retired.
    pub async fn wait_for_submission(&mut self, index: u64) -> Result<(), Error> {
        if index > self.splitter.submitted() {
            self.force_split();
        }
        if index > self.splitter.submitted() {
            return Err(Error::InvalidArgument(format!(
                "submission {index} has not been recorded"
            )));
        }
        let label = self.splitter.label().clone();
        self.device
            .wait_for_label(&label, index, self.config.device_timeout)
            .await?;
        Ok(())
    }

    /// Submits everything and blocks until the device is idle.
    ///
    /// This is a full stop.  It will result in a hitch.
    pub async fn wait_idle(&mut self) -> Result<(), Error> {
        self.force_split();
        let stall = logwise::perfwarn_begin!("DeviceContext::wait_idle full device stall");
        let started = Instant::now();
        let result = self.device.wait_idle(self.config.device_timeout).await;
        drop(stall);
        let micros = started.elapsed().as_micros() as u64;
        logwise::trace_sync!("wait_idle stalled {micros}us", micros = micros);
        Ok(result?)
    }

    /// Drains the device and tears the context down.
    pub async fn shutdown(mut self) -> Result<(), Error> {
        self.wait_idle().await?;
        let leaked: Vec<ResourceId> = self.owned.keys().copied().collect();
        for id in leaked {
            self.destroy_resource(id)?;
        }
        self.wait_idle().await?;
        if !self.tracker.is_empty() {
            logwise::warn_sync!(
                "DeviceContext::shutdown with {count} version rings still registered",
                count = self.tracker.len()
            );
        }
        Ok(())
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        if !self.stream.is_empty() {
            logwise::warn_sync!(
                "DeviceContext dropped with {count} unsubmitted commands",
                count = self.stream.len()
            );
        }
    }
}
