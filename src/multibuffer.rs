// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Multibuffering implementation.

A [BufferVersionRing] is one logical buffer backed by one or more versions (independent
allocations).  The main idea is,

1.  The CPU writes a version nobody else can see.
2.  On unlock, a deferred operation on the consumer timeline rebinds the device's view
    (the [ConsumerSlot]) to that version and frees the one it replaces.
3.  A fence right after the rebind keeps anything recorded later from running first.

So the producer never writes a version the device is, or will imminently be, reading.
The exception is the very first write lock: nothing has read the original allocation
yet, so it is handed out directly.

# Versions

| policy               | live allocations                                      |
|----------------------|-------------------------------------------------------|
| `Static`             | 1; a second write lock is an error                    |
| `Dynamic{versions}`  | at most `versions`; the producer waits when too far ahead |
| `Volatile`           | fresh per write, never throttled                      |

# Locks

A ring has at most one outstanding lock.  This is enforced with a compare-exchange on
the lock state, not a mutex; a second lock fails with [Error::AlreadyLocked] instead of
waiting.

A read lock observes the consumer's version.  To make that safe it submits everything
and waits for the device to go idle, which is a full stop.  Prefer write-only use.
*/

use crate::bindings::buffer_access::LockMode;
use crate::bindings::resource_tracking::{ResourceDesc, WaitSlot};
use crate::bindings::visible_to::{MemoryClass, UsagePolicy};
use crate::bindings::{AccessClass, ResourceId};
use crate::device::DeviceContext;
use crate::device::stream::{CacheAction, DeferredOp, EventKind};
use crate::error::Error;
use crate::fence::{FenceGate, Label};
use crate::imp::{AllocationId, Backing};
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const UNLOCKED: u8 = 0;
const LOCKED_WRITE: u8 = 1;
const LOCKED_READ: u8 = 2;

const MIN_DYNAMIC_VERSIONS: u8 = 2;
const MAX_DYNAMIC_VERSIONS: u8 = 8;

fn state_name(state: u8) -> &'static str {
    match state {
        UNLOCKED => "unlocked",
        LOCKED_WRITE => "locked for writing",
        LOCKED_READ => "locked for reading",
        _ => "in an unknown state",
    }
}

/// The version the device reads.
///
/// Only the consumer timeline changes the binding, by executing
/// [DeferredOp::RebindVersion] and [DeferredOp::Retire].
pub struct ConsumerSlot {
    bound: Mutex<Option<Backing>>,
    debug_name: String,
}

impl Debug for ConsumerSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerSlot")
            .field("debug_name", &self.debug_name)
            .field("bound", &self.current().map(|b| b.id()))
            .finish()
    }
}

impl ConsumerSlot {
    fn new(initial: Backing, debug_name: String) -> Self {
        ConsumerSlot {
            bound: Mutex::new(Some(initial)),
            debug_name,
        }
    }

    fn bound(&self) -> std::sync::MutexGuard<'_, Option<Backing>> {
        self.bound.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Binds `version`, returning the version it replaces.
    pub(crate) fn rebind(&self, version: Backing) -> Option<Backing> {
        logwise::trace_sync!(
            "{slot} rebind -> {version}",
            slot = logwise::privacy::LogIt(&self.debug_name),
            version = version.id().0
        );
        self.bound().replace(version)
    }

    /// Unbinds, returning the bound version.
    pub(crate) fn retire(&self) -> Option<Backing> {
        self.bound().take()
    }

    pub fn current(&self) -> Option<Backing> {
        self.bound().clone()
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

/// A locked view of one version.
///
/// Valid until the lock that produced it is released; after that every access fails
/// with [Error::NotLocked].
#[derive(Debug)]
pub struct Mapping {
    backing: Backing,
    offset: usize,
    len: usize,
    mode: LockMode,
    epoch: u64,
    lock_epoch: Arc<AtomicU64>,
    resource: Arc<str>,
}

impl Mapping {
    fn check(&self, mode: LockMode) -> Result<(), Error> {
        if self.lock_epoch.load(Ordering::Acquire) != self.epoch {
            return Err(Error::NotLocked {
                resource: self.resource.to_string(),
            });
        }
        if self.mode != mode {
            return Err(Error::InvalidArgument(format!(
                "{} is mapped {:?}",
                self.resource, self.mode
            )));
        }
        Ok(())
    }

    /// Copies `bytes` into the mapping at `offset` (relative to the mapping).
    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<(), Error> {
        self.check(LockMode::WriteOnly)?;
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= self.len)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "write of {} bytes at {offset} overruns {} ({} bytes)",
                    bytes.len(),
                    self.resource,
                    self.len
                ))
            })?;
        let mut storage = self.backing.bytes();
        storage[self.offset + offset..self.offset + end].copy_from_slice(bytes);
        Ok(())
    }

    /// Runs `f` on the mapped bytes.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R, Error> {
        self.check(LockMode::WriteOnly)?;
        let mut storage = self.backing.bytes();
        Ok(f(&mut storage[self.offset..self.offset + self.len]))
    }

    /// Copies the mapped bytes out.
    pub fn read(&self) -> Result<Vec<u8>, Error> {
        self.check(LockMode::ReadOnly)?;
        let storage = self.backing.bytes();
        Ok(storage[self.offset..self.offset + self.len].to_vec())
    }

    /// The version this mapping points into.
    pub fn allocation(&self) -> AllocationId {
        self.backing.id()
    }

    /// Device address of the first mapped byte.
    pub fn address(&self) -> u64 {
        self.backing.range().base + self.offset as u64
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

/// Releases the lock if a lock future is dropped before it resolves.
struct PendingLock<'a> {
    state: &'a AtomicU8,
    armed: bool,
}

impl Drop for PendingLock<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.store(UNLOCKED, Ordering::Release);
        }
    }
}

/**
One logical buffer, versioned so the CPU producer never writes what the device is reading.

Create with [BufferVersionRing::new], write with [BufferVersionRing::access_write] (or the
manual [BufferVersionRing::lock] / [BufferVersionRing::unlock] pair), and tear down with
[BufferVersionRing::destroy].
*/
pub struct BufferVersionRing {
    id: ResourceId,
    debug_name: Arc<str>,
    size: usize,
    alignment: u64,
    policy: UsagePolicy,
    state: AtomicU8,
    first_lock: AtomicBool,
    lock_epoch: Arc<AtomicU64>,
    //the version written under the current write lock
    producer: Mutex<Option<Backing>>,
    consumer: Arc<ConsumerSlot>,
    //written with the count of executed rebinds
    label: Label,
    rebinds_enqueued: AtomicU64,
    destroyed: bool,
}

impl Debug for BufferVersionRing {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferVersionRing")
            .field("id", &self.id)
            .field("debug_name", &self.debug_name)
            .field("size", &self.size)
            .field("policy", &self.policy)
            .field("state", &state_name(self.state.load(Ordering::Relaxed)))
            .field("consumer", &self.consumer)
            .finish()
    }
}

impl BufferVersionRing {
    /// Allocates the original version and registers the ring with `ctx`.
    ///
    /// Dynamic rings need between 2 and 8 versions.
    pub fn new(ctx: &mut DeviceContext, size: usize, policy: UsagePolicy, debug_name: &str) -> Result<Self, Error> {
        if size == 0 {
            return Err(Error::InvalidArgument(format!("{debug_name} has zero size")));
        }
        if let UsagePolicy::Dynamic { versions } = policy
            && !(MIN_DYNAMIC_VERSIONS..=MAX_DYNAMIC_VERSIONS).contains(&versions)
        {
            return Err(Error::InvalidArgument(format!(
                "{debug_name} asks for {versions} versions; dynamic rings need {MIN_DYNAMIC_VERSIONS}..={MAX_DYNAMIC_VERSIONS}"
            )));
        }
        let alignment = ctx.config().buffer_alignment;
        let original = ctx
            .device()
            .allocate(size as u64, alignment, MemoryClass::CpuVisible)?;
        let id = ctx.register_resource(
            ResourceDesc {
                range: original.range(),
                slot: WaitSlot::Shader,
                compressed: false,
                subresources: 1,
                debug_name: debug_name.to_string(),
            },
            AccessClass::Readable,
        );
        logwise::info_sync!(
            "BufferVersionRing::new {name} ({size} bytes, {policy})",
            name = logwise::privacy::LogIt(&debug_name),
            size = size,
            policy = logwise::privacy::LogIt(&policy)
        );
        Ok(BufferVersionRing {
            id,
            debug_name: Arc::from(debug_name),
            size,
            alignment,
            policy,
            state: AtomicU8::new(UNLOCKED),
            first_lock: AtomicBool::new(true),
            lock_epoch: Arc::new(AtomicU64::new(0)),
            producer: Mutex::new(None),
            consumer: Arc::new(ConsumerSlot::new(original, debug_name.to_string())),
            label: Label::new(format!("{debug_name} rebinds")),
            rebinds_enqueued: AtomicU64::new(0),
            destroyed: false,
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn policy(&self) -> UsagePolicy {
        self.policy
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    /// The most versions this ring keeps live, or `None` if unbounded.
    pub fn version_count(&self) -> Option<usize> {
        self.policy.version_count()
    }

    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Acquire) != UNLOCKED
    }

    /// The version the device currently reads.
    pub fn consumer_allocation(&self) -> Option<AllocationId> {
        self.consumer.current().map(|b| b.id())
    }

    /// The version being written under the current write lock.
    pub fn producer_allocation(&self) -> Option<AllocationId> {
        self.producer.lock().unwrap_or_else(|e| e.into_inner()).as_ref().map(|b| b.id())
    }

    /// Unlocked versions the consumer timeline has not bound yet.
    pub fn pending_rebinds(&self) -> u64 {
        let enqueued = self.rebinds_enqueued.load(Ordering::Acquire);
        enqueued.saturating_sub(self.label.value())
    }

    /// The label the consumer timeline writes after each rebind.
    pub fn label(&self) -> &Label {
        &self.label
    }

    /**
    Locks `size` bytes at `offset` for `mode`.

    Write locks must start at offset 0: every write lock after the first hands out a
    fresh version, whose bytes outside the locked range would be undefined.

    Read locks stall until the device is idle.
    */
    pub async fn lock(&self, ctx: &mut DeviceContext, mode: LockMode, size: usize, offset: usize) -> Result<Mapping, Error> {
        if !ctx.tracker().contains(self.id) {
            return Err(Error::UnknownResource(self.id));
        }
        if size == 0 || offset.checked_add(size).is_none_or(|end| end > self.size) {
            return Err(Error::InvalidArgument(format!(
                "lock of {size} bytes at {offset} is outside {} ({} bytes)",
                self.debug_name, self.size
            )));
        }
        if mode == LockMode::WriteOnly && offset != 0 {
            logwise::error_sync!(
                "{name}: write lock at nonzero offset {offset}",
                name = logwise::privacy::LogIt(&self.debug_name),
                offset = offset
            );
            return Err(Error::InvalidArgument(format!(
                "write locks on {} must start at offset 0, not {offset}",
                self.debug_name
            )));
        }
        let desired = match mode {
            LockMode::WriteOnly => LOCKED_WRITE,
            LockMode::ReadOnly => LOCKED_READ,
        };
        if let Err(current) = self
            .state
            .compare_exchange(UNLOCKED, desired, Ordering::AcqRel, Ordering::Acquire)
        {
            logwise::error_sync!(
                "{name} locked while {state}",
                name = logwise::privacy::LogIt(&self.debug_name),
                state = state_name(current)
            );
            return Err(Error::AlreadyLocked {
                resource: self.debug_name.to_string(),
                state: state_name(current),
            });
        }
        let mut pending = PendingLock {
            state: &self.state,
            armed: true,
        };
        let backing = match mode {
            LockMode::WriteOnly => self.lock_write(ctx).await?,
            LockMode::ReadOnly => self.lock_read(ctx).await?,
        };
        pending.armed = false;
        Ok(Mapping {
            backing,
            offset,
            len: size,
            mode,
            epoch: self.lock_epoch.load(Ordering::Acquire),
            lock_epoch: self.lock_epoch.clone(),
            resource: self.debug_name.clone(),
        })
    }

    async fn lock_write(&self, ctx: &mut DeviceContext) -> Result<Backing, Error> {
        if self.first_lock.load(Ordering::Acquire) {
            //nothing can have read the original yet
            let original = self.consumer.current().ok_or(Error::UnknownResource(self.id))?;
            *self.producer.lock().unwrap_or_else(|e| e.into_inner()) = Some(original.clone());
            return Ok(original);
        }
        match self.policy {
            UsagePolicy::Static => {
                logwise::error_sync!(
                    "{name} is static and was already written",
                    name = logwise::privacy::LogIt(&self.debug_name)
                );
                return Err(Error::StaticResource {
                    resource: self.debug_name.to_string(),
                });
            }
            UsagePolicy::Dynamic { versions } => self.throttle(ctx, versions).await?,
            UsagePolicy::Volatile => {}
        }
        let version = ctx
            .device()
            .allocate(self.size as u64, self.alignment, MemoryClass::CpuVisible)?;
        *self.producer.lock().unwrap_or_else(|e| e.into_inner()) = Some(version.clone());
        Ok(version)
    }

    /// Waits until allocating one more version stays within `versions` live.
    ///
    /// Live = the consumer's version + pending rebinds + the one about to be allocated.
    async fn throttle(&self, ctx: &mut DeviceContext, versions: u8) -> Result<(), Error> {
        let allowed_pending = u64::from(versions) - 2;
        if self.pending_rebinds() <= allowed_pending {
            return Ok(());
        }
        let target = self.rebinds_enqueued.load(Ordering::Acquire) - allowed_pending;
        logwise::warn_sync!(
            "{name} is {pending} versions ahead of the device; waiting",
            name = logwise::privacy::LogIt(&self.debug_name),
            pending = self.pending_rebinds()
        );
        let throttled = logwise::perfwarn_begin!("BufferVersionRing::throttle");
        ctx.force_split();
        let device = ctx.device().clone();
        device
            .wait_for_label(&self.label, target, ctx.config().device_timeout)
            .await?;
        drop(throttled);
        Ok(())
    }

    async fn lock_read(&self, ctx: &mut DeviceContext) -> Result<Backing, Error> {
        ctx.wait_idle().await?;
        self.consumer.current().ok_or(Error::UnknownResource(self.id))
    }

    /// Releases the outstanding lock, publishing a written version to the device.
    pub fn unlock(&self, ctx: &mut DeviceContext) -> Result<(), Error> {
        let state = self.state.load(Ordering::Acquire);
        if state == UNLOCKED {
            logwise::error_sync!(
                "{name} unlocked without a lock",
                name = logwise::privacy::LogIt(&self.debug_name)
            );
            return Err(Error::NotLocked {
                resource: self.debug_name.to_string(),
            });
        }
        self.lock_epoch.fetch_add(1, Ordering::AcqRel);
        let first = self.first_lock.swap(false, Ordering::AcqRel);
        let produced = self.producer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if state == LOCKED_WRITE
            && !first
            && let Some(version) = produced
        {
            let range = version.range();
            let sentinel = self.rebinds_enqueued.fetch_add(1, Ordering::AcqRel) + 1;
            ctx.stream_mut().encode_deferred(DeferredOp::RebindVersion {
                slot: self.consumer.clone(),
                version,
            });
            //nothing recorded after this may run before the rebind
            FenceGate::new(&self.label, sentinel).encode_barrier(
                ctx.stream_mut(),
                EventKind::BottomOfPipe,
                CacheAction::None,
            );
            ctx.tracker_mut().set_range(self.id, range);
        }
        self.state.store(UNLOCKED, Ordering::Release);
        Ok(())
    }

    /// Write-locks the whole buffer.  The guard unlocks on drop.
    pub async fn access_write<'a>(&'a self, ctx: &'a mut DeviceContext) -> Result<RingGuard<'a>, Error> {
        let mapping = self.lock(ctx, LockMode::WriteOnly, self.size, 0).await?;
        Ok(RingGuard {
            ring: self,
            ctx,
            mapping,
            armed: true,
        })
    }

    /// Read-locks the whole buffer.  The guard unlocks on drop.
    ///
    /// This waits for the device to go idle.
    pub async fn access_read<'a>(&'a self, ctx: &'a mut DeviceContext) -> Result<RingGuard<'a>, Error> {
        let mapping = self.lock(ctx, LockMode::ReadOnly, self.size, 0).await?;
        Ok(RingGuard {
            ring: self,
            ctx,
            mapping,
            armed: true,
        })
    }

    /// Unregisters the ring and frees its versions on the consumer timeline.
    ///
    /// Fails with [Error::StillLocked] while a lock is outstanding.
    pub fn destroy(&mut self, ctx: &mut DeviceContext) -> Result<(), Error> {
        if self.is_locked() {
            logwise::error_sync!(
                "{name} destroyed while locked",
                name = logwise::privacy::LogIt(&self.debug_name)
            );
            return Err(Error::StillLocked {
                resource: self.debug_name.to_string(),
            });
        }
        if self.destroyed || !ctx.tracker().contains(self.id) {
            return Err(Error::UnknownResource(self.id));
        }
        ctx.stream_mut().encode_deferred(DeferredOp::Retire {
            slot: self.consumer.clone(),
        });
        ctx.unregister_resource(self.id);
        self.destroyed = true;
        Ok(())
    }
}

impl Drop for BufferVersionRing {
    fn drop(&mut self) {
        if !self.destroyed {
            logwise::warn_sync!(
                "BufferVersionRing {name} dropped without destroy; its versions leak",
                name = logwise::privacy::LogIt(&self.debug_name)
            );
        }
    }
}

/// A lock on a whole [BufferVersionRing], released on drop.
#[derive(Debug)]
pub struct RingGuard<'a> {
    ring: &'a BufferVersionRing,
    ctx: &'a mut DeviceContext,
    mapping: Mapping,
    armed: bool,
}

impl RingGuard<'_> {
    /// Unlocks now, surfacing any error that drop would only log.
    pub fn unlock(mut self) -> Result<(), Error> {
        self.armed = false;
        self.ring.unlock(self.ctx)
    }
}

impl Deref for RingGuard<'_> {
    type Target = Mapping;
    fn deref(&self) -> &Mapping {
        &self.mapping
    }
}

impl Drop for RingGuard<'_> {
    fn drop(&mut self) {
        if self.armed
            && let Err(e) = self.ring.unlock(self.ctx)
        {
            logwise::error_sync!("RingGuard unlock failed: {e}", e = logwise::privacy::LogIt(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Config;
    use crate::imp;

    fn context() -> DeviceContext {
        DeviceContext::new(imp::Device::new("multibuffer"), Config::default())
    }

    #[test]
    fn rejects_bad_version_counts() {
        let mut ctx = context();
        for versions in [0, 1, 9] {
            assert!(matches!(
                BufferVersionRing::new(&mut ctx, 16, UsagePolicy::Dynamic { versions }, "bad"),
                Err(Error::InvalidArgument(_))
            ));
        }
        assert!(matches!(
            BufferVersionRing::new(&mut ctx, 0, UsagePolicy::Volatile, "empty"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn first_write_lock_reuses_original() {
        let mut ctx = context();
        let mut ring = BufferVersionRing::new(&mut ctx, 16, UsagePolicy::Dynamic { versions: 3 }, "ring").unwrap();
        let original = ring.consumer_allocation();
        test_executors::sleep_on(async {
            let mapping = ring.lock(&mut ctx, LockMode::WriteOnly, 16, 0).await.unwrap();
            assert_eq!(Some(mapping.allocation()), original);
            ring.unlock(&mut ctx).unwrap();
        });
        assert!(ctx.recorded().is_empty(), "first unlock propagates nothing");
        assert_eq!(ctx.device().allocation_count(), 1);
        ring.destroy(&mut ctx).unwrap();
    }

    #[test]
    fn mapping_dies_with_its_lock() {
        let mut ctx = context();
        let mut ring = BufferVersionRing::new(&mut ctx, 8, UsagePolicy::Volatile, "ring").unwrap();
        let mapping = test_executors::sleep_on(ring.lock(&mut ctx, LockMode::WriteOnly, 8, 0)).unwrap();
        mapping.write(0, &[1, 2, 3]).unwrap();
        assert!(matches!(mapping.write(6, &[1, 2, 3]), Err(Error::InvalidArgument(_))));
        assert!(matches!(mapping.read(), Err(Error::InvalidArgument(_))));
        ring.unlock(&mut ctx).unwrap();
        assert!(matches!(mapping.write(0, &[1]), Err(Error::NotLocked { .. })));
        assert!(matches!(ring.unlock(&mut ctx), Err(Error::NotLocked { .. })));
        ring.destroy(&mut ctx).unwrap();
    }

    #[test]
    fn guard_unlocks_on_drop() {
        let mut ctx = context();
        let mut ring = BufferVersionRing::new(&mut ctx, 4, UsagePolicy::Volatile, "ring").unwrap();
        test_executors::sleep_on(async {
            let guard = ring.access_write(&mut ctx).await.unwrap();
            guard.with_bytes_mut(|b| b.fill(7)).unwrap();
            assert!(ring.is_locked());
            drop(guard);
        });
        assert!(!ring.is_locked());
        ring.destroy(&mut ctx).unwrap();
        assert!(matches!(ring.destroy(&mut ctx), Err(Error::UnknownResource(_))));
    }

    #[test]
    fn abandoned_throttle_releases_the_lock() {
        let mut ctx = context();
        let mut ring = BufferVersionRing::new(&mut ctx, 32, UsagePolicy::Dynamic { versions: 2 }, "held back").unwrap();
        test_executors::sleep_on(async {
            for _ in 0..2 {
                ring.lock(&mut ctx, LockMode::WriteOnly, 32, 0).await.unwrap();
                ring.unlock(&mut ctx).unwrap();
            }
        });
        assert_eq!(ring.pending_rebinds(), 1);

        //keep the rebind away from the device so the next lock has to wait for it
        let (held, encoded_bytes) = ctx.stream_mut().take();
        let abandoned = test_executors::sleep_on(crate::sys::with_deadline(
            ring.lock(&mut ctx, LockMode::WriteOnly, 32, 0),
            std::time::Duration::from_millis(10),
        ));
        assert!(abandoned.is_err());
        assert!(!ring.is_locked());

        ctx.device().submit(crate::device::stream::Submission {
            index: 0,
            commands: held,
            encoded_bytes,
        });
        ctx.device().run_until_idle().unwrap();
        assert_eq!(ring.pending_rebinds(), 0);
        test_executors::sleep_on(async {
            ring.lock(&mut ctx, LockMode::WriteOnly, 32, 0).await.unwrap();
            ring.unlock(&mut ctx).unwrap();
        });
        ring.destroy(&mut ctx).unwrap();
    }

    #[test]
    fn read_lock_reports_device_faults() {
        let mut ctx = context();
        let mut ring = BufferVersionRing::new(&mut ctx, 16, UsagePolicy::Volatile, "faulted").unwrap();
        let orphan = Label::new("orphan");
        FenceGate::new(&orphan, 1).encode_device_wait(ctx.stream_mut());
        let read = test_executors::sleep_on(ring.lock(&mut ctx, LockMode::ReadOnly, 16, 0));
        assert!(matches!(read, Err(Error::Device(imp::Error::DeviceFault(_)))));
        assert!(!ring.is_locked());
        ring.destroy(&mut ctx).unwrap();
    }
}
