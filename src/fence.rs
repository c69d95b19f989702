// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! CPU/device handshakes.
//!
//! A [Label] is one 64-bit word of device memory.  The device writes a sentinel into it
//! at a chosen point in its instruction stream; a later device instruction, or the CPU,
//! waits for the word to reach that sentinel.  A [FenceGate] is one such handshake: a
//! label plus the sentinel that marks "everything before here has retired".
//!
//! Gates are created per use and are cheap to throw away.  Labels are long-lived and
//! only ever move forward: writing a smaller value than the current one is ignored, so
//! `value >= sentinel` is the only comparison anyone needs.

use crate::device::stream::{CacheAction, CommandStream, EventKind};
use crate::imp;
use crate::sys::time::Duration;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

struct Waiter {
    id: u64,
    threshold: u64,
    sender: r#continue::Sender<()>,
}

struct LabelInner {
    value: AtomicU64,
    waiters: Mutex<Vec<Waiter>>,
    next_waiter: AtomicU64,
    debug_name: String,
}

impl LabelInner {
    fn waiters(&self) -> std::sync::MutexGuard<'_, Vec<Waiter>> {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for LabelInner {
    fn drop(&mut self) {
        //nobody can be waiting on us if we're being dropped, but senders must not be dropped unsent
        let take = std::mem::take(self.waiters.get_mut().unwrap_or_else(|e| e.into_inner()));
        for waiter in take {
            waiter.sender.send(());
        }
    }
}

/// Removes a waiter from the list when its wait finishes or is abandoned.
struct Registration<'a> {
    inner: &'a LabelInner,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let removed = {
            let mut waiters = self.inner.waiters();
            waiters
                .iter()
                .position(|w| w.id == self.id)
                .map(|index| waiters.swap_remove(index))
        };
        if let Some(waiter) = removed {
            waiter.sender.send(());
        }
    }
}

/// One word of device memory that the device writes and anyone may wait on.
#[derive(Clone)]
pub struct Label {
    inner: Arc<LabelInner>,
}

impl Debug for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Label")
            .field("debug_name", &self.inner.debug_name)
            .field("value", &self.value())
            .finish()
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
impl Eq for Label {}

impl Label {
    pub fn new(debug_name: impl Into<String>) -> Self {
        Label {
            inner: Arc::new(LabelInner {
                value: AtomicU64::new(0),
                waiters: Mutex::new(Vec::new()),
                next_waiter: AtomicU64::new(0),
                debug_name: debug_name.into(),
            }),
        }
    }

    pub fn debug_name(&self) -> &str {
        &self.inner.debug_name
    }

    /// The last value the device wrote.
    pub fn value(&self) -> u64 {
        self.inner.value.load(Ordering::Acquire)
    }

    pub fn is_reached(&self, sentinel: u64) -> bool {
        self.value() >= sentinel
    }

    /// Device-side write.
    ///
    /// Only the consumer timeline calls this.
    pub(crate) fn signal(&self, value: u64) {
        self.inner.value.fetch_max(value, Ordering::AcqRel);
        let current = self.value();
        let ready = {
            let mut waiters = self.inner.waiters();
            let (ready, pending): (Vec<_>, Vec<_>) = waiters.drain(..).partition(|w| w.threshold <= current);
            *waiters = pending;
            ready
        };
        for waiter in ready {
            waiter.sender.send(());
        }
    }

    /// Resumes once the label reaches `sentinel`.
    ///
    /// Does not drive the device; something else must be executing the stream.
    pub async fn wait_for(&self, sentinel: u64) {
        //insert first
        let (s, r) = r#continue::continuation();
        let id = self.inner.next_waiter.fetch_add(1, Ordering::Relaxed);
        self.inner.waiters().push(Waiter {
            id,
            threshold: sentinel,
            sender: s,
        });
        let _registration = Registration { inner: &self.inner, id };
        //then check
        if self.is_reached(sentinel) {
            return;
        }
        r.await;
    }

    #[cfg(test)]
    fn waiter_count(&self) -> usize {
        self.inner.waiters().len()
    }
}

/// A single handshake on a [Label].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceGate {
    label: Label,
    sentinel: u64,
}

impl FenceGate {
    pub fn new(label: &Label, sentinel: u64) -> Self {
        FenceGate {
            label: label.clone(),
            sentinel,
        }
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn sentinel(&self) -> u64 {
        self.sentinel
    }

    /// Records the end-of-pipe write: once every prior instruction retires, the device
    /// writes the sentinel, applying `cache` first.
    pub fn encode_signal(&self, stream: &mut CommandStream, event: EventKind, cache: CacheAction) {
        stream.encode_end_of_pipe_fence(event, &self.label, self.sentinel, cache);
    }

    /// Records a device-side wait; nothing after it runs until the sentinel lands.
    pub fn encode_device_wait(&self, stream: &mut CommandStream) {
        stream.encode_wait_on_label(&self.label, self.sentinel);
    }

    /// Records the signal followed by the wait, freezing the order around this point.
    pub fn encode_barrier(&self, stream: &mut CommandStream, event: EventKind, cache: CacheAction) {
        self.encode_signal(stream, event, cache);
        self.encode_device_wait(stream);
    }

    /// CPU poll.
    pub fn is_signaled(&self) -> bool {
        self.label.is_reached(self.sentinel)
    }

    /// CPU wait.  Drives `device` if work is queued and gives up after `deadline`.
    pub async fn wait(&self, device: &imp::Device, deadline: Duration) -> Result<(), imp::Error> {
        device.wait_for_label(&self.label, self.sentinel, deadline).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_only_move_forward() {
        let label = Label::new("test");
        label.signal(5);
        label.signal(3);
        assert_eq!(label.value(), 5);
        assert!(label.is_reached(5));
        assert!(!label.is_reached(6));
    }

    #[test]
    fn wait_resumes_after_signal() {
        let label = Label::new("test");
        let move_label = label.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            move_label.signal(2);
        });
        test_executors::sleep_on(label.wait_for(2));
        assert!(label.is_reached(2));
        t.join().unwrap();
    }

    #[test]
    fn waiters_wake_at_their_own_thresholds() {
        let label = Label::new("staggered");
        let move_label = label.clone();
        let t = std::thread::spawn(move || {
            for value in 1..=3 {
                std::thread::sleep(std::time::Duration::from_millis(5));
                move_label.signal(value);
            }
        });
        let both = futures::future::join(label.wait_for(1), label.wait_for(3));
        test_executors::sleep_on(both);
        assert_eq!(label.value(), 3);
        t.join().unwrap();
    }

    #[test]
    fn abandoned_waits_leave_no_waiters() {
        let label = Label::new("long lived");
        for _ in 0..5 {
            let r = test_executors::sleep_on(crate::sys::with_deadline(
                label.wait_for(100),
                std::time::Duration::from_millis(2),
            ));
            assert!(r.is_err());
        }
        assert_eq!(label.waiter_count(), 0);
        label.signal(3);
        for sentinel in 1..=3 {
            test_executors::sleep_on(label.wait_for(sentinel));
        }
        assert_eq!(label.waiter_count(), 0);
    }

    #[test]
    fn gate_encodes_signal_then_wait() {
        let label = Label::new("gate");
        let gate = FenceGate::new(&label, 7);
        let mut stream = CommandStream::new();
        gate.encode_barrier(&mut stream, EventKind::BottomOfPipe, CacheAction::None);
        assert_eq!(stream.len(), 2);
        assert!(!gate.is_signaled());
        label.signal(7);
        assert!(gate.is_signaled());
    }
}
