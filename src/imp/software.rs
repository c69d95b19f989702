// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0

//! Host-executed device.
//!
//! ## Memory
//!
//! Allocations get device virtual addresses from a bump allocator.  Addresses are never
//! reused, so a stale address in a recorded stream can never alias a newer allocation.
//! Frees are expected to arrive through the consumer timeline (as
//! [DeferredOp](crate::device::stream::DeferredOp)s), once the device is known to be done.
//!
//! ## Execution
//!
//! Submitted streams wait in a FIFO.  Whoever holds the executor lock is the consumer
//! timeline: either an [ExecutorThread], or a CPU wait that drains the queue inline
//! (much like polling a real device driver makes it progress).  Either way exactly one
//! thread executes at a time, in submission order.

mod error;
mod executor;

pub use error::Error;
pub use executor::{ExecutorThread, Stats};

use crate::bindings::ResourceId;
use crate::bindings::visible_to::MemoryClass;
use crate::device::stream::{AddressRange, CommandStream, Submission};
use crate::fence::Label;
use crate::sys::time::Duration;
use crate::sys::{TimedOut, with_deadline};
use executor::Executor;
use std::collections::{HashMap, VecDeque};
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

const BASE_ADDRESS: u64 = 0x1_0000_0000;

/// Identifies one backing allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocationId(pub u64);

/// One block of device memory.
///
/// Cloning shares the allocation; it does not copy it.
#[derive(Clone)]
pub struct Backing {
    id: AllocationId,
    range: AddressRange,
    alignment: u64,
    memory_class: MemoryClass,
    storage: Arc<Mutex<Box<[u8]>>>,
}

impl Debug for Backing {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backing")
            .field("id", &self.id)
            .field("range", &self.range)
            .field("memory_class", &self.memory_class)
            .finish()
    }
}

impl Backing {
    pub fn id(&self) -> AllocationId {
        self.id
    }
    pub fn range(&self) -> AddressRange {
        self.range
    }
    pub fn len(&self) -> usize {
        self.range.len as usize
    }
    pub fn is_empty(&self) -> bool {
        self.range.len == 0
    }
    pub fn alignment(&self) -> u64 {
        self.alignment
    }
    pub fn memory_class(&self) -> MemoryClass {
        self.memory_class
    }
    pub(crate) fn bytes(&self) -> MutexGuard<'_, Box<[u8]>> {
        //a poisoned lock only means a panic mid-write; the bytes are still the bytes
        self.storage.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug)]
struct Allocator {
    next_address: u64,
    next_id: u64,
    live: HashMap<AllocationId, u64>,
    live_bytes: u64,
    total: u64,
    peak_live: usize,
}

/// A host-executed device.
pub struct Device {
    debug_name: String,
    capacity: Option<u64>,
    allocator: Mutex<Allocator>,
    queue: Mutex<VecDeque<Submission>>,
    executor: Mutex<Executor>,
    //one write per executed submission; the value is the number executed so far
    completed: Label,
    submitted: Mutex<u64>,
}

impl Debug for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("debug_name", &self.debug_name)
            .field("capacity", &self.capacity)
            .field("completed", &self.completed.value())
            .finish()
    }
}

impl Device {
    pub fn new(debug_name: &str) -> Arc<Self> {
        Self::build(debug_name, None)
    }

    /// A device that fails allocations past `capacity` live bytes.
    pub fn with_capacity(debug_name: &str, capacity: u64) -> Arc<Self> {
        Self::build(debug_name, Some(capacity))
    }

    fn build(debug_name: &str, capacity: Option<u64>) -> Arc<Self> {
        logwise::info_sync!("software::Device::new {name}", name = logwise::privacy::LogIt(&debug_name));
        Arc::new(Device {
            debug_name: debug_name.to_string(),
            capacity,
            allocator: Mutex::new(Allocator {
                next_address: BASE_ADDRESS,
                next_id: 1,
                live: HashMap::new(),
                live_bytes: 0,
                total: 0,
                peak_live: 0,
            }),
            queue: Mutex::new(VecDeque::new()),
            executor: Mutex::new(Executor::default()),
            completed: Label::new(format!("{debug_name} completed submissions")),
            submitted: Mutex::new(0),
        })
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    /// Allocates `size` bytes of zeroed device memory.
    ///
    /// Requests past the capacity, the address space, or host memory fail with
    /// [Error::OutOfDeviceMemory]; they never take the allocator down.
    pub fn allocate(&self, size: u64, alignment: u64, memory_class: MemoryClass) -> Result<Backing, Error> {
        let mut allocator = self.allocator.lock().unwrap();
        let available = match self.capacity {
            Some(capacity) => capacity.saturating_sub(allocator.live_bytes),
            None => u64::MAX - allocator.next_address,
        };
        let out_of_memory = || {
            logwise::error_sync!(
                "software::Device out of memory: requested {requested}, available {available}",
                requested = size,
                available = available
            );
            Error::OutOfDeviceMemory {
                requested: size,
                available,
            }
        };
        if size > available {
            return Err(out_of_memory());
        }
        let alignment = alignment.max(1).checked_next_power_of_two().ok_or_else(out_of_memory)?;
        let base = allocator
            .next_address
            .checked_add(alignment - 1)
            .ok_or_else(out_of_memory)?
            & !(alignment - 1);
        let next_address = base.checked_add(size.max(1)).ok_or_else(out_of_memory)?;
        let len = usize::try_from(size).map_err(|_| out_of_memory())?;
        let mut storage = Vec::new();
        storage.try_reserve_exact(len).map_err(|_| out_of_memory())?;
        storage.resize(len, 0u8);

        allocator.next_address = next_address;
        let id = AllocationId(allocator.next_id);
        allocator.next_id += 1;
        allocator.live.insert(id, size);
        allocator.live_bytes += size;
        allocator.total += 1;
        allocator.peak_live = allocator.peak_live.max(allocator.live.len());
        logwise::trace_sync!(
            "allocate {id} at {base} ({size} bytes)",
            id = id.0,
            base = base,
            size = size
        );
        Ok(Backing {
            id,
            range: AddressRange::new(base, size),
            alignment,
            memory_class,
            storage: Arc::new(Mutex::new(storage.into_boxed_slice())),
        })
    }

    /// Returns an allocation.  Called from the consumer timeline.
    pub(crate) fn free(&self, backing: &Backing) {
        let mut allocator = self.allocator.lock().unwrap();
        let size = allocator.live.remove(&backing.id);
        assert!(size.is_some(), "{:?} freed twice", backing.id);
        allocator.live_bytes -= size.unwrap_or(0);
        logwise::trace_sync!("free {id}", id = backing.id.0);
    }

    /// Records the resolve pass that expands `resource`'s fast-clear metadata.
    pub fn encode_resolve(&self, stream: &mut CommandStream, resource: ResourceId, range: AddressRange) {
        stream.encode_resolve_metadata(resource, range);
    }

    /// Queues a closed recording for the consumer timeline.
    pub fn submit(&self, submission: Submission) {
        logwise::trace_sync!(
            "submit {index} ({bytes} bytes)",
            index = submission.index,
            bytes = submission.encoded_bytes
        );
        //count under the queue lock so the count never runs ahead of the queue
        let mut queue = self.queue.lock().unwrap();
        queue.push_back(submission);
        *self.submitted.lock().unwrap() += 1;
    }

    /// Executes the oldest queued submission.  Returns `false` if there was none.
    pub fn execute_next(&self) -> Result<bool, Error> {
        let mut executor = self.executor.lock().unwrap();
        executor.check_fault()?;
        let Some(submission) = self.queue.lock().unwrap().pop_front() else {
            return Ok(false);
        };
        executor.execute(self, submission)?;
        self.completed.signal(executor.stats().submissions);
        Ok(true)
    }

    /// Executes everything queued.  Returns how many submissions ran.
    pub fn run_until_idle(&self) -> Result<usize, Error> {
        let mut ran = 0;
        while self.execute_next()? {
            ran += 1;
        }
        Ok(ran)
    }

    pub fn is_idle(&self) -> bool {
        self.completed.is_reached(*self.submitted.lock().unwrap())
    }

    /// Waits until `label` reaches `sentinel`, draining the queue inline first.
    pub async fn wait_for_label(&self, label: &Label, sentinel: u64, deadline: Duration) -> Result<(), Error> {
        if label.is_reached(sentinel) {
            return Ok(());
        }
        self.run_until_idle()?;
        if label.is_reached(sentinel) {
            return Ok(());
        }
        match with_deadline(label.wait_for(sentinel), deadline).await {
            Ok(()) => Ok(()),
            Err(TimedOut) => {
                logwise::error_sync!(
                    "device hung waiting for {label} >= {sentinel}",
                    label = logwise::privacy::LogIt(&label.debug_name()),
                    sentinel = sentinel
                );
                Err(Error::DeviceHung {
                    label: label.debug_name().to_string(),
                    value: sentinel,
                    timeout: deadline,
                })
            }
        }
    }

    /// Waits until everything submitted so far has executed.
    pub async fn wait_idle(&self, deadline: Duration) -> Result<(), Error> {
        let target = *self.submitted.lock().unwrap();
        self.wait_for_label(&self.completed, target, deadline).await
    }

    pub fn submitted_count(&self) -> u64 {
        *self.submitted.lock().unwrap()
    }

    pub fn completed_count(&self) -> u64 {
        self.completed.value()
    }

    /// Allocations ever made.
    pub fn allocation_count(&self) -> u64 {
        self.allocator.lock().unwrap().total
    }

    /// Allocations made and not yet freed.
    pub fn live_allocation_count(&self) -> usize {
        self.allocator.lock().unwrap().live.len()
    }

    /// The most allocations ever live at once.
    pub fn peak_live_allocations(&self) -> usize {
        self.allocator.lock().unwrap().peak_live
    }

    pub fn live_bytes(&self) -> u64 {
        self.allocator.lock().unwrap().live_bytes
    }

    pub fn is_live(&self, id: AllocationId) -> bool {
        self.allocator.lock().unwrap().live.contains_key(&id)
    }

    pub fn stats(&self) -> Stats {
        self.executor.lock().unwrap().stats().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_aligned_and_never_reuse_addresses() {
        let device = Device::new("test");
        let a = device.allocate(10, 256, MemoryClass::CpuVisible).unwrap();
        let b = device.allocate(10, 256, MemoryClass::CpuVisible).unwrap();
        assert_eq!(a.range().base % 256, 0);
        assert_eq!(b.range().base % 256, 0);
        assert!(b.range().base >= a.range().end());
        device.free(&a);
        let c = device.allocate(10, 256, MemoryClass::CpuVisible).unwrap();
        assert!(c.range().base > b.range().base);
        assert_eq!(device.allocation_count(), 3);
        assert_eq!(device.live_allocation_count(), 2);
        assert_eq!(device.peak_live_allocations(), 2);
    }

    #[test]
    fn capacity_is_enforced() {
        let device = Device::with_capacity("small", 100);
        let a = device.allocate(80, 4, MemoryClass::DeviceLocal).unwrap();
        let e = device.allocate(40, 4, MemoryClass::DeviceLocal).unwrap_err();
        assert_eq!(
            e,
            Error::OutOfDeviceMemory {
                requested: 40,
                available: 20
            }
        );
        device.free(&a);
        assert!(device.allocate(40, 4, MemoryClass::DeviceLocal).is_ok());
    }

    #[test]
    fn address_space_exhaustion_is_an_error() {
        let device = Device::new("uncapped");
        for size in [u64::MAX - 8, u64::MAX] {
            assert!(matches!(
                device.allocate(size, 256, MemoryClass::DeviceLocal),
                Err(Error::OutOfDeviceMemory { requested, .. }) if requested == size
            ));
        }
        assert!(matches!(
            device.allocate(16, u64::MAX, MemoryClass::DeviceLocal),
            Err(Error::OutOfDeviceMemory { .. })
        ));
        let ok = device.allocate(16, 256, MemoryClass::DeviceLocal).unwrap();
        assert_eq!(ok.len(), 16);
        assert_eq!(device.allocation_count(), 1);
    }

    #[test]
    fn executes_in_submission_order() {
        let device = Device::new("test");
        let label = Label::new("order");
        for i in 1..=3 {
            let mut stream = CommandStream::new();
            stream.encode_end_of_pipe_fence(
                crate::device::stream::EventKind::BottomOfPipe,
                &label,
                i,
                crate::device::stream::CacheAction::None,
            );
            let (commands, encoded_bytes) = stream.take();
            device.submit(Submission {
                index: i,
                commands,
                encoded_bytes,
            });
        }
        assert!(!device.is_idle());
        assert!(device.execute_next().unwrap());
        assert_eq!(label.value(), 1);
        assert_eq!(device.run_until_idle().unwrap(), 2);
        assert_eq!(label.value(), 3);
        assert!(device.is_idle());
        assert!(!device.execute_next().unwrap());
    }
}
