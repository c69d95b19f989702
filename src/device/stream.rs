// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0

//! The recorded command stream.
//!
//! The synchronization core does not define a device wire format.  It records typed
//! [Command]s, each standing for one instruction (or one short instruction sequence) of
//! whatever the device natively speaks, and charges each one the byte size such an
//! instruction takes, so the [submission splitter](crate::device::splitter) has
//! something to measure.
//!
//! ## Encoders
//!
//! The `encode_*` methods are the narrow interface the core uses to talk to the device:
//!
//! - **`encode_wait_for_writes`** - wait for prior writes to an address range to retire,
//!   then apply a cache action
//! - **`encode_end_of_pipe_fence`** / **`encode_wait_on_label`** - the [FenceGate](crate::fence::FenceGate) primitives
//! - **`encode_cache_operation`** - a bare cache writeback/invalidate
//! - **`encode_deferred`** - work for the consumer timeline itself
//!
//! Instructions within one stream execute in program order.  Nothing else is ordered.

use crate::bindings::ResourceId;
use crate::fence::Label;
use crate::imp::Backing;
use crate::multibuffer::ConsumerSlot;
use std::fmt::{Debug, Formatter};
use std::ops::BitOr;
use std::sync::Arc;

//sizes of the instruction sequences each command stands for
const WAIT_FOR_WRITES_BYTES: usize = 7 * 4;
const END_OF_PIPE_FENCE_BYTES: usize = 6 * 4;
const WAIT_ON_LABEL_BYTES: usize = 7 * 4;
const CACHE_OPERATION_BYTES: usize = 7 * 4;
const RESOLVE_METADATA_BYTES: usize = 64;

/// A range of device virtual addresses.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    pub base: u64,
    pub len: u64,
}

impl AddressRange {
    pub const fn new(base: u64, len: u64) -> Self {
        AddressRange { base, len }
    }

    pub fn end(&self) -> u64 {
        self.base + self.len
    }
}

impl Debug for AddressRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}..{:#x}", self.base, self.end())
    }
}

/// Which write units a wait drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotMask(pub u32);

impl SlotMask {
    /// The eight color backends.
    pub const COLOR_TARGETS: SlotMask = SlotMask(0xFF);
    pub const DEPTH_TARGET: SlotMask = SlotMask(1 << 8);
    /// Shader (UAV) writes and copies.
    pub const SHADER_WRITES: SlotMask = SlotMask(1 << 9);

    pub fn contains(self, other: SlotMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SlotMask {
    type Output = SlotMask;
    fn bitor(self, rhs: SlotMask) -> SlotMask {
        SlotMask(self.0 | rhs.0)
    }
}

/// Action on the main payload caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheAction {
    None,
    /// Write back and invalidate the shared cache and the per-unit shader caches.
    WritebackInvalidateL2,
    /// Write back and invalidate everything, including fixed-function caches.
    WritebackInvalidateAll,
}

/// Action on the fixed-function and metadata caches, independent of [CacheAction].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtendedCacheAction {
    None,
    FlushColorTargets,
    FlushDepthTarget,
    FlushColorMetadata,
    FlushDepthMetadata,
}

/// Where in the pipeline an end-of-pipe write waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BottomOfPipe,
}

/// Work executed by the consumer timeline, in stream order.
#[derive(Clone)]
pub enum DeferredOp {
    /// Rebind a version ring's consumer slot to a newly written version,
    /// freeing the version it replaces.
    RebindVersion {
        slot: Arc<ConsumerSlot>,
        version: Backing,
    },
    /// Unbind and free a version ring's consumer slot.
    Retire { slot: Arc<ConsumerSlot> },
    /// Free a single allocation.
    Free(Backing),
}

impl Debug for DeferredOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DeferredOp::RebindVersion { slot, version } => f
                .debug_struct("RebindVersion")
                .field("slot", &slot.debug_name())
                .field("version", &version.id())
                .finish(),
            DeferredOp::Retire { slot } => f.debug_struct("Retire").field("slot", &slot.debug_name()).finish(),
            DeferredOp::Free(backing) => f.debug_tuple("Free").field(&backing.id()).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Command {
    WaitForWrites {
        range: AddressRange,
        slots: SlotMask,
        cache: CacheAction,
        extended: ExtendedCacheAction,
    },
    EndOfPipeFence {
        event: EventKind,
        label: Label,
        sentinel: u64,
        cache: CacheAction,
    },
    WaitOnLabel {
        label: Label,
        value: u64,
    },
    CacheOperation {
        cache: CacheAction,
        extended: ExtendedCacheAction,
    },
    /// The resolve pass that expands fast-clear metadata into pixels.
    ResolveMetadata {
        resource: ResourceId,
        range: AddressRange,
    },
    Deferred(DeferredOp),
    /// Front-end work the core does not interpret (draws, dispatches, copies).
    Opaque {
        bytes: usize,
    },
}

impl Command {
    /// Bytes this command occupies in the device's native stream.
    pub fn encoded_size(&self) -> usize {
        match self {
            Command::WaitForWrites { .. } => WAIT_FOR_WRITES_BYTES,
            Command::EndOfPipeFence { .. } => END_OF_PIPE_FENCE_BYTES,
            Command::WaitOnLabel { .. } => WAIT_ON_LABEL_BYTES,
            Command::CacheOperation { .. } => CACHE_OPERATION_BYTES,
            Command::ResolveMetadata { .. } => RESOLVE_METADATA_BYTES,
            //runs on the submission side, never reaches the device
            Command::Deferred(_) => 0,
            Command::Opaque { bytes } => *bytes,
        }
    }
}

/// An in-progress recording.
#[derive(Debug, Default)]
pub struct CommandStream {
    commands: Vec<Command>,
    encoded_bytes: usize,
}

impl CommandStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, command: Command) {
        self.encoded_bytes += command.encoded_size();
        self.commands.push(command);
    }

    pub fn encode_wait_for_writes(
        &mut self,
        range: AddressRange,
        slots: SlotMask,
        cache: CacheAction,
        extended: ExtendedCacheAction,
    ) {
        self.push(Command::WaitForWrites {
            range,
            slots,
            cache,
            extended,
        });
    }

    pub fn encode_end_of_pipe_fence(&mut self, event: EventKind, label: &Label, sentinel: u64, cache: CacheAction) {
        self.push(Command::EndOfPipeFence {
            event,
            label: label.clone(),
            sentinel,
            cache,
        });
    }

    pub fn encode_wait_on_label(&mut self, label: &Label, value: u64) {
        self.push(Command::WaitOnLabel {
            label: label.clone(),
            value,
        });
    }

    pub fn encode_cache_operation(&mut self, cache: CacheAction, extended: ExtendedCacheAction) {
        self.push(Command::CacheOperation { cache, extended });
    }

    pub(crate) fn encode_resolve_metadata(&mut self, resource: ResourceId, range: AddressRange) {
        self.push(Command::ResolveMetadata { resource, range });
    }

    pub fn encode_deferred(&mut self, op: DeferredOp) {
        self.push(Command::Deferred(op));
    }

    pub fn encode_opaque(&mut self, bytes: usize) {
        self.push(Command::Opaque { bytes });
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn encoded_size(&self) -> usize {
        self.encoded_bytes
    }

    pub(crate) fn take(&mut self) -> (Vec<Command>, usize) {
        let bytes = std::mem::take(&mut self.encoded_bytes);
        (std::mem::take(&mut self.commands), bytes)
    }
}

/// A closed recording, handed to the device as one unit.
#[derive(Debug)]
pub struct Submission {
    pub index: u64,
    pub commands: Vec<Command>,
    pub encoded_bytes: usize,
}
