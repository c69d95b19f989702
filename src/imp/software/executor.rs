// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The consumer timeline.

Executes one [Submission] at a time, in order.  Host execution is serial, so by the time
an instruction runs every earlier instruction has retired; waits therefore only need to
be counted, except label waits, which can genuinely never be satisfied if the stream is
malformed.  That faults the device, exactly as a real device would hang on it.
*/

use super::{Device, Error};
use crate::bindings::ResourceId;
use crate::device::stream::{CacheAction, Command, DeferredOp, Submission};
use crate::sys::time::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

/// Counters kept by the consumer timeline.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub submissions: u64,
    pub waits_for_writes: u64,
    /// Waits that carried a cache action, i.e. actually invalidated something.
    pub cache_invalidating_waits: u64,
    pub fences_signaled: u64,
    pub label_waits: u64,
    pub cache_operations: u64,
    pub deferred_ops: u64,
    pub opaque_bytes: u64,
    resolves: HashMap<ResourceId, u64>,
}

impl Stats {
    /// How many resolve passes ran for `resource`.
    pub fn resolve_count(&self, resource: ResourceId) -> u64 {
        self.resolves.get(&resource).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
pub(super) struct Executor {
    fault: Option<String>,
    stats: Stats,
}

impl Executor {
    pub(super) fn stats(&self) -> &Stats {
        &self.stats
    }

    pub(super) fn check_fault(&self) -> Result<(), Error> {
        match &self.fault {
            Some(fault) => Err(Error::DeviceFault(fault.clone())),
            None => Ok(()),
        }
    }

    pub(super) fn execute(&mut self, device: &Device, submission: Submission) -> Result<(), Error> {
        logwise::trace_sync!("execute submission {index}", index = submission.index);
        for command in submission.commands {
            if let Err(e) = self.execute_command(device, command) {
                self.fault = Some(e.to_string());
                return Err(e);
            }
        }
        self.stats.submissions += 1;
        Ok(())
    }

    fn execute_command(&mut self, device: &Device, command: Command) -> Result<(), Error> {
        match command {
            Command::WaitForWrites { cache, .. } => {
                self.stats.waits_for_writes += 1;
                if cache != CacheAction::None {
                    self.stats.cache_invalidating_waits += 1;
                }
            }
            Command::EndOfPipeFence { label, sentinel, .. } => {
                label.signal(sentinel);
                self.stats.fences_signaled += 1;
            }
            Command::WaitOnLabel { label, value } => {
                self.stats.label_waits += 1;
                if !label.is_reached(value) {
                    let message = format!(
                        "wait on {} for {} can never be satisfied (label is at {})",
                        label.debug_name(),
                        value,
                        label.value()
                    );
                    logwise::error_sync!("{message}", message = logwise::privacy::LogIt(&message));
                    return Err(Error::DeviceFault(message));
                }
            }
            Command::CacheOperation { .. } => {
                self.stats.cache_operations += 1;
            }
            Command::ResolveMetadata { resource, .. } => {
                *self.stats.resolves.entry(resource).or_insert(0) += 1;
            }
            Command::Deferred(op) => {
                self.stats.deferred_ops += 1;
                execute_deferred(device, op);
            }
            Command::Opaque { bytes } => {
                self.stats.opaque_bytes += bytes as u64;
            }
        }
        Ok(())
    }
}

fn execute_deferred(device: &Device, op: DeferredOp) {
    match op {
        DeferredOp::RebindVersion { slot, version } => {
            if let Some(previous) = slot.rebind(version) {
                device.free(&previous);
            }
        }
        DeferredOp::Retire { slot } => {
            if let Some(previous) = slot.retire() {
                device.free(&previous);
            }
        }
        DeferredOp::Free(backing) => device.free(&backing),
    }
}

/// A dedicated consumer-timeline thread.
///
/// While running, the device trails the producer on its own schedule instead of
/// only progressing when the producer waits on it.
#[derive(Debug)]
pub struct ExecutorThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<(), Error>>>,
}

impl ExecutorThread {
    /// Starts draining `device`, sleeping `idle_poll` whenever the queue is empty.
    pub fn spawn(device: Arc<Device>, idle_poll: Duration) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let move_stop = stop.clone();
        let handle = std::thread::Builder::new()
            .name(format!("{} executor", device.debug_name()))
            .spawn(move || {
                while !move_stop.load(Ordering::Acquire) {
                    if !device.execute_next()? {
                        std::thread::sleep(idle_poll);
                    }
                }
                Ok(())
            })?;
        Ok(ExecutorThread {
            stop,
            handle: Some(handle),
        })
    }

    /// Stops the thread.  Returns the fault that stopped it early, if any.
    pub fn stop(mut self) -> Result<(), Error> {
        self.stop_inner()
    }

    fn stop_inner(&mut self) -> Result<(), Error> {
        self.stop.store(true, Ordering::Release);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(Error::DeviceFault("executor thread panicked".to_string()))),
            None => Ok(()),
        }
    }
}

impl Drop for ExecutorThread {
    fn drop(&mut self) {
        if let Err(e) = self.stop_inner() {
            logwise::error_sync!("executor thread stopped with {e}", e = logwise::privacy::LogIt(&e));
        }
    }
}
