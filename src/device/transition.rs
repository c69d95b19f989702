// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The transition protocol.

Given a batch of resources and a target [AccessClass], record the minimal set of waits,
fences and cache operations that makes every resource valid in the new role.

# Per class

| target                            | recorded                                                                  |
|-----------------------------------|---------------------------------------------------------------------------|
| `Readable`, `ReadWriteBarrier`    | one wait per resource on its slot's mask, then pending resolve passes     |
| `ReadWriteBarrierPerSubresource`  | as above, one wait per subresource                                        |
| `Writable`                        | an end-of-pipe fence + device wait, then a full cache writeback/invalidate |
| `ReadWriteNoBarrier`              | nothing                                                                   |
| `MetaDataOnly`                    | one metadata flush per distinct slot in the batch                         |

Within a batch, only the last wait for each slot class carries the slot's cache
action.  Every earlier wait of that class would have invalidated the same caches, and
the wait that follows does it again anyway.

A resource that is already clean in the requested read role is skipped, so
re-requesting a transition costs nothing.
*/

use crate::bindings::resource_tracking::WaitSlot;
use crate::bindings::{AccessClass, ResourceId};
use crate::device::context::DeviceContext;
use crate::device::stream::{AddressRange, CacheAction, EventKind, ExtendedCacheAction, SlotMask};
use crate::error::Error;

/// What a wait on one [WaitSlot] drains, and which caches it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCapabilities {
    pub mask: SlotMask,
    pub cache: CacheAction,
    pub extended: ExtendedCacheAction,
    /// The flush that makes compression metadata agree, for `MetaDataOnly`.
    pub metadata: ExtendedCacheAction,
}

/// Capabilities per [WaitSlot], indexed by [WaitSlot::index].
pub const SLOT_TABLE: [SlotCapabilities; WaitSlot::COUNT] = [
    //Color
    SlotCapabilities {
        mask: SlotMask::COLOR_TARGETS,
        cache: CacheAction::WritebackInvalidateL2,
        extended: ExtendedCacheAction::FlushColorTargets,
        metadata: ExtendedCacheAction::FlushColorMetadata,
    },
    //Depth
    SlotCapabilities {
        mask: SlotMask::DEPTH_TARGET,
        cache: CacheAction::WritebackInvalidateL2,
        extended: ExtendedCacheAction::FlushDepthTarget,
        metadata: ExtendedCacheAction::FlushDepthMetadata,
    },
    //Shader
    SlotCapabilities {
        mask: SlotMask::SHADER_WRITES,
        cache: CacheAction::WritebackInvalidateL2,
        extended: ExtendedCacheAction::None,
        metadata: ExtendedCacheAction::None,
    },
];

impl SlotCapabilities {
    pub const fn for_slot(slot: WaitSlot) -> &'static SlotCapabilities {
        &SLOT_TABLE[slot.index()]
    }
}

impl DeviceContext {
    /**
    Moves every resource in `resources` to `target`, recording whatever the move needs.

    The whole batch is validated before anything is recorded; an unknown id rejects it
    with [Error::UnknownResource] and leaves the stream untouched.  Duplicate ids are
    treated as one.

    `ReadWriteNoBarrier` records nothing at all.  See [AccessClass::ReadWriteNoBarrier]
    before using it.
    */
    pub fn request_transition(&mut self, resources: &[ResourceId], target: AccessClass) -> Result<(), Error> {
        let mut batch: Vec<ResourceId> = Vec::with_capacity(resources.len());
        for id in resources {
            if !self.tracker().contains(*id) {
                return Err(Error::UnknownResource(*id));
            }
            if !batch.contains(id) {
                batch.push(*id);
            }
        }
        logwise::trace_sync!(
            "request_transition {count} resources -> {target}",
            count = batch.len(),
            target = logwise::privacy::LogIt(&target)
        );
        match target {
            AccessClass::Readable | AccessClass::ReadWriteBarrier | AccessClass::ReadWriteBarrierPerSubresource => {
                self.transition_readable(&batch, target)
            }
            AccessClass::Writable => self.transition_writable(&batch),
            AccessClass::ReadWriteNoBarrier => self.set_batch_access(&batch, target),
            AccessClass::MetaDataOnly => self.transition_metadata(&batch),
        }
        Ok(())
    }

    fn set_batch_access(&mut self, batch: &[ResourceId], target: AccessClass) {
        let frame = self.frame();
        for id in batch {
            self.tracker_mut().set_access(*id, target, frame);
        }
    }

    fn transition_readable(&mut self, batch: &[ResourceId], target: AccessClass) {
        let mut waits: Vec<(WaitSlot, AddressRange)> = Vec::new();
        let mut resolves: Vec<(ResourceId, WaitSlot, AddressRange, bool)> = Vec::new();
        for id in batch {
            let Some(entry) = self.tracker().get(*id) else { continue };
            let fast_cleared = self.ledger().contains(*id);
            //clean and already in a role that sees the latest writes
            let settled = !entry.is_dirty() && (entry.access() == AccessClass::Readable || entry.access() == target);
            if settled && !fast_cleared {
                continue;
            }
            let desc = entry.desc();
            if target == AccessClass::ReadWriteBarrierPerSubresource {
                waits.extend(desc.subresource_ranges().into_iter().map(|r| (desc.slot, r)));
            } else {
                waits.push((desc.slot, desc.range));
            }
            if fast_cleared {
                resolves.push((*id, desc.slot, desc.range, desc.compressed));
            }
        }

        //the last wait of each slot class carries the invalidation
        let mut last = [None; WaitSlot::COUNT];
        for (i, (slot, _)) in waits.iter().enumerate() {
            last[slot.index()] = Some(i);
        }
        for (i, (slot, range)) in waits.iter().enumerate() {
            let caps = SlotCapabilities::for_slot(*slot);
            if last[slot.index()] == Some(i) {
                self.stream_mut()
                    .encode_wait_for_writes(*range, caps.mask, caps.cache, caps.extended);
            } else {
                self.stream_mut()
                    .encode_wait_for_writes(*range, caps.mask, CacheAction::None, ExtendedCacheAction::None);
            }
        }

        let mut resolved_slots = [false; WaitSlot::COUNT];
        for (id, slot, range, compressed) in resolves {
            if compressed {
                let device = self.device().clone();
                device.encode_resolve(self.stream_mut(), id, range);
                resolved_slots[slot.index()] = true;
            } else {
                logwise::trace_sync!("{id} cleared without compression; nothing to resolve", id = id.0);
            }
            self.ledger_mut().mark_resolved(id);
        }
        //the resolve pass is itself a write through the target's unit
        for slot in WaitSlot::ALL {
            if resolved_slots[slot.index()] {
                let caps = SlotCapabilities::for_slot(slot);
                self.stream_mut().encode_cache_operation(caps.cache, caps.extended);
            }
        }

        self.set_batch_access(batch, target);
    }

    fn transition_writable(&mut self, batch: &[ResourceId]) {
        let needs_fence = batch.iter().any(|id| {
            self.tracker()
                .get(*id)
                .is_some_and(|e| e.access() != AccessClass::Writable || e.is_dirty())
        });
        self.set_batch_access(batch, AccessClass::Writable);
        if !needs_fence {
            return;
        }
        //readers and writers of the old role must all retire before anything writes
        let gate = self.next_fence_gate();
        gate.encode_barrier(self.stream_mut(), EventKind::BottomOfPipe, CacheAction::None);
        self.stream_mut()
            .encode_cache_operation(CacheAction::WritebackInvalidateAll, ExtendedCacheAction::None);
    }

    fn transition_metadata(&mut self, batch: &[ResourceId]) {
        let mut slots = [false; WaitSlot::COUNT];
        for id in batch {
            if let Some(entry) = self.tracker().get(*id) {
                slots[entry.desc().slot.index()] = true;
            }
        }
        for slot in WaitSlot::ALL {
            let caps = SlotCapabilities::for_slot(slot);
            if slots[slot.index()] && caps.metadata != ExtendedCacheAction::None {
                self.stream_mut().encode_cache_operation(CacheAction::None, caps.metadata);
            }
        }
        self.set_batch_access(batch, AccessClass::MetaDataOnly);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::visible_to::{TargetConfig, TargetKind};
    use crate::device::Config;
    use crate::device::stream::Command;
    use crate::imp;

    fn context() -> DeviceContext {
        DeviceContext::new(imp::Device::new("transition"), Config::default())
    }

    fn waits(ctx: &DeviceContext) -> Vec<(SlotMask, CacheAction)> {
        ctx.recorded()
            .iter()
            .filter_map(|c| match c {
                Command::WaitForWrites { slots, cache, .. } => Some((*slots, *cache)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn table_is_indexed_by_slot() {
        for slot in WaitSlot::ALL {
            let caps = SlotCapabilities::for_slot(slot);
            match slot {
                WaitSlot::Color => assert_eq!(caps.mask, SlotMask::COLOR_TARGETS),
                WaitSlot::Depth => assert_eq!(caps.mask, SlotMask::DEPTH_TARGET),
                WaitSlot::Shader => assert_eq!(caps.mask, SlotMask::SHADER_WRITES),
            }
        }
    }

    #[test]
    fn only_last_wait_per_slot_invalidates() {
        let mut ctx = context();
        let a = ctx.create_target(TargetConfig::new(TargetKind::Color, 8, 8, 4, "a")).unwrap();
        let b = ctx.create_target(TargetConfig::new(TargetKind::Color, 8, 8, 4, "b")).unwrap();
        let d = ctx.create_target(TargetConfig::new(TargetKind::Depth, 8, 8, 4, "d")).unwrap();
        ctx.request_transition(&[a, d, b], AccessClass::Readable).unwrap();
        assert_eq!(
            waits(&ctx),
            vec![
                (SlotMask::COLOR_TARGETS, CacheAction::None),
                (SlotMask::DEPTH_TARGET, CacheAction::WritebackInvalidateL2),
                (SlotMask::COLOR_TARGETS, CacheAction::WritebackInvalidateL2),
            ]
        );
    }

    #[test]
    fn unknown_id_rejects_whole_batch() {
        let mut ctx = context();
        let a = ctx.create_target(TargetConfig::new(TargetKind::Color, 8, 8, 4, "a")).unwrap();
        let bogus = ResourceId(1000);
        assert!(matches!(
            ctx.request_transition(&[a, bogus], AccessClass::Readable),
            Err(Error::UnknownResource(id)) if id == bogus
        ));
        assert!(ctx.recorded().is_empty());
        assert_eq!(ctx.tracker().get(a).unwrap().access(), AccessClass::Writable);
    }

    #[test]
    fn duplicates_wait_once() {
        let mut ctx = context();
        let a = ctx.create_target(TargetConfig::new(TargetKind::Color, 8, 8, 4, "a")).unwrap();
        ctx.request_transition(&[a, a], AccessClass::Readable).unwrap();
        assert_eq!(waits(&ctx).len(), 1);
    }

    #[test]
    fn metadata_only_flushes_per_distinct_slot() {
        let mut ctx = context();
        let a = ctx.create_target(TargetConfig::new(TargetKind::Color, 8, 8, 4, "a")).unwrap();
        let b = ctx.create_target(TargetConfig::new(TargetKind::Color, 8, 8, 4, "b")).unwrap();
        let s = ctx.create_device_buffer(64, "s").unwrap();
        ctx.request_transition(&[a, b, s], AccessClass::MetaDataOnly).unwrap();
        let ops: Vec<_> = ctx
            .recorded()
            .iter()
            .filter_map(|c| match c {
                Command::CacheOperation { cache, extended } => Some((*cache, *extended)),
                _ => None,
            })
            .collect();
        assert_eq!(ops, vec![(CacheAction::None, ExtendedCacheAction::FlushColorMetadata)]);
        assert_eq!(ctx.recorded().len(), 1);
    }
}
