// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Version ring behavior on the software device.

The consumer timeline only runs when something waits on it (or an executor thread is
spawned), so each test controls exactly when rebinds execute.
*/

use locks_and_labels::DeviceContext;
use locks_and_labels::Error;
use locks_and_labels::bindings::buffer_access::LockMode;
use locks_and_labels::bindings::visible_to::UsagePolicy;
use locks_and_labels::device::Config;
use locks_and_labels::imp::{Device, ExecutorThread};
use locks_and_labels::multibuffer::BufferVersionRing;
use std::time::Duration;

fn context() -> DeviceContext {
    DeviceContext::new(Device::new("version_ring"), Config::default())
}

fn write_cycle(ring: &BufferVersionRing, ctx: &mut DeviceContext, fill: u8) {
    test_executors::sleep_on(async {
        let guard = ring.access_write(ctx).await.unwrap();
        guard.with_bytes_mut(|b| b.fill(fill)).unwrap();
        guard.unlock().unwrap();
    });
}

#[test]
fn writes_never_touch_the_consumer_version() {
    let mut ctx = context();
    let mut ring = BufferVersionRing::new(&mut ctx, 4, UsagePolicy::Dynamic { versions: 3 }, "uniforms").unwrap();
    write_cycle(&ring, &mut ctx, 1);
    let consumer = ring.consumer_allocation().unwrap();

    let mapping = test_executors::sleep_on(ring.lock(&mut ctx, LockMode::WriteOnly, 4, 0)).unwrap();
    assert_ne!(mapping.allocation(), consumer);
    assert_eq!(ring.producer_allocation(), Some(mapping.allocation()));
    mapping.write(0, &[2, 2, 2, 2]).unwrap();
    ring.unlock(&mut ctx).unwrap();

    //the rebind is recorded, not executed
    assert_eq!(ring.consumer_allocation(), Some(consumer));
    assert!(ctx.device().is_live(consumer));
    assert_eq!(ring.pending_rebinds(), 1);
    assert_eq!(
        ctx.tracker().get(ring.id()).unwrap().desc().range.base,
        mapping.address(),
        "the tracker follows the newest version"
    );

    ctx.force_split();
    ctx.device().run_until_idle().unwrap();
    assert_eq!(ring.consumer_allocation(), Some(mapping.allocation()));
    assert!(!ctx.device().is_live(consumer));
    assert_eq!(ring.pending_rebinds(), 0);
    ring.destroy(&mut ctx).unwrap();
}

#[test]
fn first_lock_allocates_nothing() {
    let mut ctx = context();
    let mut ring = BufferVersionRing::new(&mut ctx, 64, UsagePolicy::Dynamic { versions: 2 }, "vertices").unwrap();
    assert_eq!(ctx.device().allocation_count(), 1);
    write_cycle(&ring, &mut ctx, 5);
    assert_eq!(ctx.device().allocation_count(), 1);
    assert!(ctx.recorded().is_empty());
    write_cycle(&ring, &mut ctx, 6);
    assert_eq!(ctx.device().allocation_count(), 2);
    ring.destroy(&mut ctx).unwrap();
}

#[test]
fn read_lock_sees_latest_unlocked_write() {
    let mut ctx = context();
    let mut ring = BufferVersionRing::new(&mut ctx, 4, UsagePolicy::Dynamic { versions: 3 }, "readback").unwrap();
    write_cycle(&ring, &mut ctx, 1);
    write_cycle(&ring, &mut ctx, 9);
    let allocations = ctx.device().allocation_count();

    test_executors::sleep_on(async {
        let guard = ring.access_read(&mut ctx).await.unwrap();
        assert_eq!(guard.read().unwrap(), vec![9, 9, 9, 9]);
        assert!(matches!(guard.write(0, &[0]), Err(Error::InvalidArgument(_))));
    });
    assert_eq!(ctx.device().allocation_count(), allocations, "read locks never allocate");
    assert!(ctx.device().is_idle());

    let partial = test_executors::sleep_on(ring.lock(&mut ctx, LockMode::ReadOnly, 2, 2)).unwrap();
    assert_eq!(partial.read().unwrap(), vec![9, 9]);
    ring.unlock(&mut ctx).unwrap();
    ring.destroy(&mut ctx).unwrap();
}

#[test]
fn one_lock_at_a_time() {
    let mut ctx = context();
    let mut ring = BufferVersionRing::new(&mut ctx, 16, UsagePolicy::Volatile, "exclusive").unwrap();
    let _mapping = test_executors::sleep_on(ring.lock(&mut ctx, LockMode::WriteOnly, 16, 0)).unwrap();

    let second = test_executors::sleep_on(ring.lock(&mut ctx, LockMode::ReadOnly, 16, 0));
    assert!(matches!(second, Err(Error::AlreadyLocked { state: "locked for writing", .. })));
    let third = test_executors::sleep_on(ring.lock(&mut ctx, LockMode::WriteOnly, 16, 0));
    assert!(matches!(third, Err(Error::AlreadyLocked { .. })));
    assert!(matches!(ring.destroy(&mut ctx), Err(Error::StillLocked { .. })));

    ring.unlock(&mut ctx).unwrap();
    assert!(test_executors::sleep_on(ring.lock(&mut ctx, LockMode::WriteOnly, 16, 0)).is_ok());
    ring.unlock(&mut ctx).unwrap();
    ring.destroy(&mut ctx).unwrap();
}

#[test]
fn three_versions_five_cycles() {
    let mut ctx = context();
    let mut ring = BufferVersionRing::new(&mut ctx, 256, UsagePolicy::Dynamic { versions: 3 }, "per_frame").unwrap();
    let original = ring.consumer_allocation().unwrap();

    for cycle in 0..5u8 {
        write_cycle(&ring, &mut ctx, cycle);
        assert!(ctx.device().live_allocation_count() <= 3);
        if cycle == 1 {
            //the second version is unlocked but the device has not rebound yet
            assert!(ctx.device().is_live(original));
        }
    }
    assert!(ctx.device().peak_live_allocations() <= 3);
    assert_eq!(ctx.device().allocation_count(), 5);

    test_executors::sleep_on(ctx.wait_idle()).unwrap();
    assert!(!ctx.device().is_live(original));
    assert_eq!(ctx.device().live_allocation_count(), 1);
    assert_eq!(ring.pending_rebinds(), 0);

    let readback = test_executors::sleep_on(async {
        let guard = ring.access_read(&mut ctx).await.unwrap();
        guard.read().unwrap()
    });
    assert!(readback.iter().all(|b| *b == 4));

    ring.destroy(&mut ctx).unwrap();
    test_executors::sleep_on(ctx.wait_idle()).unwrap();
    assert_eq!(ctx.device().live_allocation_count(), 0);
}

#[test]
fn volatile_rings_are_never_throttled() {
    let mut ctx = context();
    let mut ring = BufferVersionRing::new(&mut ctx, 32, UsagePolicy::Volatile, "streaming").unwrap();
    for cycle in 0..10 {
        write_cycle(&ring, &mut ctx, cycle);
    }
    assert_eq!(ctx.device().completed_count(), 0, "nothing forced the device to run");
    assert_eq!(ctx.device().live_allocation_count(), 10);
    assert_eq!(ring.pending_rebinds(), 9);
    ring.destroy(&mut ctx).unwrap();
    test_executors::sleep_on(ctx.wait_idle()).unwrap();
    assert_eq!(ctx.device().live_allocation_count(), 0);
}

#[test]
fn static_rings_are_written_once() {
    let mut ctx = context();
    let mut ring = BufferVersionRing::new(&mut ctx, 8, UsagePolicy::Static, "lut").unwrap();
    write_cycle(&ring, &mut ctx, 3);
    let again = test_executors::sleep_on(ring.lock(&mut ctx, LockMode::WriteOnly, 8, 0));
    assert!(matches!(again, Err(Error::StaticResource { .. })));
    assert!(!ring.is_locked(), "a failed lock leaves the ring unlocked");

    let contents = test_executors::sleep_on(async {
        let guard = ring.access_read(&mut ctx).await.unwrap();
        guard.read().unwrap()
    });
    assert_eq!(contents, vec![3; 8]);
    ring.destroy(&mut ctx).unwrap();
}

#[test]
fn write_locks_reject_offsets() {
    let mut ctx = context();
    let mut ring = BufferVersionRing::new(&mut ctx, 64, UsagePolicy::Dynamic { versions: 2 }, "partial").unwrap();
    let offset = test_executors::sleep_on(ring.lock(&mut ctx, LockMode::WriteOnly, 32, 16));
    assert!(matches!(offset, Err(Error::InvalidArgument(_))));
    let overrun = test_executors::sleep_on(ring.lock(&mut ctx, LockMode::ReadOnly, 64, 1));
    assert!(matches!(overrun, Err(Error::InvalidArgument(_))));
    let empty = test_executors::sleep_on(ring.lock(&mut ctx, LockMode::WriteOnly, 0, 0));
    assert!(matches!(empty, Err(Error::InvalidArgument(_))));
    assert!(!ring.is_locked());
    ring.destroy(&mut ctx).unwrap();
}

#[test]
fn rings_trail_an_executor_thread() {
    let device = Device::new("threaded");
    let executor = ExecutorThread::spawn(device.clone(), Duration::from_millis(1)).unwrap();
    let mut ctx = DeviceContext::new(device.clone(), Config::default());
    let mut ring = BufferVersionRing::new(&mut ctx, 128, UsagePolicy::Dynamic { versions: 2 }, "threaded").unwrap();

    for frame in 0..20u8 {
        write_cycle(&ring, &mut ctx, frame);
        ctx.end_frame();
        assert!(device.live_allocation_count() <= 2);
    }
    test_executors::sleep_on(ctx.wait_idle()).unwrap();
    assert_eq!(device.live_allocation_count(), 1);

    ring.destroy(&mut ctx).unwrap();
    test_executors::sleep_on(ctx.shutdown()).unwrap();
    executor.stop().unwrap();
    assert_eq!(device.live_allocation_count(), 0);
}
