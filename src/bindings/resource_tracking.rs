// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Resource access tracking for the transition protocol
//!
//! This module records, per resource, which role the device is currently using it in,
//! so that [crate::DeviceContext::request_transition] can decide which cache and fence
//! operations a role change actually needs.
//!
//! # Overview
//!
//! Each tracked resource carries:
//! - an [`AccessClass`]: the role the device is currently using it in
//! - a `dirty` bit: the device has written it since it last left a writable role
//! - `last_touched_frame`: the producer frame of the last transition or write
//! - a [`ResourceDesc`]: the address range and wait slot the barriers operate on
//!
//! # Internal Usage
//!
//! Entries are mutated only on the producer timeline: by the transition protocol, by
//! the device write operation that sets `dirty`, and by version-ring unlocks, which
//! move a buffer's address range to its newly bound version.  There is never
//! concurrent access, so unlike CPU/GPU lock state there are no atomics here.

use crate::device::stream::AddressRange;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

/// Opaque handle to a resource registered with a [crate::DeviceContext].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u64);

impl Debug for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResourceId({})", self.0)
    }
}

/// The role in which the device is using a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessClass {
    /// Read by shaders, fixed-function units or copies.
    Readable,
    /// Written by the device.
    Writable,
    /// Read-write (UAV-style) use, with a barrier against prior writes.
    ReadWriteBarrier,
    /// As [AccessClass::ReadWriteBarrier], but each subresource is waited on separately.
    ReadWriteBarrierPerSubresource,
    /// Read-write use with no barrier at all.
    ///
    /// The caller asserts that it already established equivalent synchronization by
    /// other means, e.g. an explicit compute fence.  If that is not true, the result is
    /// a data race or a stale read, and there is no signal anywhere at the point of
    /// misuse.  This is the single most dangerous corner of the protocol.
    ReadWriteNoBarrier,
    /// Only the compressed-metadata caches need to agree.
    MetaDataOnly,
}

impl AccessClass {
    /// Whether entering this class means waiting for prior writes.
    pub fn enters_readable_phase(&self) -> bool {
        matches!(
            self,
            AccessClass::Readable
                | AccessClass::ReadWriteBarrier
                | AccessClass::ReadWriteBarrierPerSubresource
        )
    }
}

/// Which cache unit drains writes to a resource.
///
/// Color and depth targets are written through different units downstream, so
/// each waits against its own slot mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WaitSlot {
    Color,
    Depth,
    Shader,
}

impl WaitSlot {
    pub const COUNT: usize = 3;
    pub const ALL: [WaitSlot; WaitSlot::COUNT] = [WaitSlot::Color, WaitSlot::Depth, WaitSlot::Shader];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// What the transition protocol needs to know about a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDesc {
    pub range: AddressRange,
    pub slot: WaitSlot,
    /// Whether fast clears leave compression metadata that must be resolved before sampling.
    pub compressed: bool,
    pub subresources: u32,
    pub debug_name: String,
}

impl ResourceDesc {
    /// Splits the address range into one range per subresource.
    ///
    /// The last range absorbs any remainder.
    pub fn subresource_ranges(&self) -> Vec<AddressRange> {
        let count = self.subresources.max(1) as u64;
        let stride = self.range.len / count;
        (0..count)
            .map(|i| {
                let base = self.range.base + i * stride;
                let len = if i == count - 1 {
                    self.range.len - stride * (count - 1)
                } else {
                    stride
                };
                AddressRange::new(base, len)
            })
            .collect()
    }
}

/// Tracked state for a single resource.
#[derive(Debug, Clone)]
pub struct TrackerEntry {
    desc: ResourceDesc,
    access: AccessClass,
    dirty: bool,
    last_touched_frame: u64,
}

impl TrackerEntry {
    pub fn desc(&self) -> &ResourceDesc {
        &self.desc
    }
    pub fn access(&self) -> AccessClass {
        self.access
    }
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
    pub fn last_touched_frame(&self) -> u64 {
        self.last_touched_frame
    }

    /// Whether a read transition would have nothing to do.
    pub(crate) fn is_clean_readable(&self) -> bool {
        self.access == AccessClass::Readable && !self.dirty
    }
}

/// Per-resource access state.
///
/// # Usage Pattern
///
/// 1. Register a resource with its descriptor and initial class
/// 2. The transition protocol reads entries to decide on barriers, then updates them
/// 3. Device writes mark entries dirty
/// 4. Remove the entry when the resource is destroyed
#[derive(Debug, Default)]
pub struct ResourceAccessTracker {
    entries: HashMap<ResourceId, TrackerEntry>,
}

impl ResourceAccessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, id: ResourceId, desc: ResourceDesc, initial: AccessClass, frame: u64) {
        let old = self.entries.insert(
            id,
            TrackerEntry {
                desc,
                access: initial,
                dirty: false,
                last_touched_frame: frame,
            },
        );
        assert!(old.is_none(), "{id:?} registered twice");
    }

    pub(crate) fn remove(&mut self, id: ResourceId) -> Option<TrackerEntry> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: ResourceId) -> Option<&TrackerEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Moves the resource to `access`.
    ///
    /// Entering a readable phase clears the dirty bit; everything else leaves it alone.
    pub(crate) fn set_access(&mut self, id: ResourceId, access: AccessClass, frame: u64) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.access = access;
            if access.enters_readable_phase() {
                entry.dirty = false;
            }
            entry.last_touched_frame = frame;
        }
    }

    /// Records a device write.  Returns the class the resource was in.
    pub(crate) fn mark_dirty(&mut self, id: ResourceId, frame: u64) -> Option<AccessClass> {
        self.entries.get_mut(&id).map(|entry| {
            entry.dirty = true;
            entry.last_touched_frame = frame;
            entry.access
        })
    }

    /// Points the resource at a new backing allocation.
    pub(crate) fn set_range(&mut self, id: ResourceId, range: AddressRange) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.desc.range = range;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(len: u64, subresources: u32) -> ResourceDesc {
        ResourceDesc {
            range: AddressRange::new(0x1000, len),
            slot: WaitSlot::Color,
            compressed: true,
            subresources,
            debug_name: "t".to_string(),
        }
    }

    #[test]
    fn readable_phase_clears_dirty() {
        let mut tracker = ResourceAccessTracker::new();
        let id = ResourceId(1);
        tracker.register(id, desc(64, 1), AccessClass::Writable, 0);
        assert_eq!(tracker.mark_dirty(id, 1), Some(AccessClass::Writable));
        assert!(tracker.get(id).unwrap().is_dirty());

        tracker.set_access(id, AccessClass::ReadWriteNoBarrier, 2);
        assert!(tracker.get(id).unwrap().is_dirty(), "no-barrier keeps the dirty bit");

        tracker.set_access(id, AccessClass::Readable, 3);
        let entry = tracker.get(id).unwrap();
        assert!(!entry.is_dirty());
        assert!(entry.is_clean_readable());
        assert_eq!(entry.last_touched_frame(), 3);
    }

    #[test]
    fn subresource_ranges_cover_the_resource() {
        let ranges = desc(100, 3).subresource_ranges();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0], AddressRange::new(0x1000, 33));
        assert_eq!(ranges[1], AddressRange::new(0x1000 + 33, 33));
        assert_eq!(ranges[2], AddressRange::new(0x1000 + 66, 34));
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut tracker = ResourceAccessTracker::new();
        assert_eq!(tracker.mark_dirty(ResourceId(9), 0), None);
        tracker.set_access(ResourceId(9), AccessClass::Readable, 0);
        assert!(tracker.is_empty());
    }
}
