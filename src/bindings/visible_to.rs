// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Resource placement and usage declarations.
//!
//! When creating resources it's important to declare how they will be used, so the
//! synchronization core can pick the right number of versions, the right memory, and
//! the right wait slots.  This module provides those declarations:
//!
//! - [`MemoryClass`] - where the backing allocations live
//! - [`UsagePolicy`] - how often the producer rewrites a buffer
//! - [`TargetKind`] and [`TargetConfig`] - describe device-written targets
//!
//! # Examples
//!
//! ```
//! use locks_and_labels::bindings::visible_to::{MemoryClass, TargetConfig, TargetKind, UsagePolicy};
//!
//! // A uniform buffer rewritten every frame, triple buffered
//! let policy = UsagePolicy::Dynamic { versions: 3 };
//! assert_eq!(policy.version_count(), Some(3));
//!
//! // A color target that supports fast clears
//! let target = TargetConfig::new(TargetKind::Color, 256, 256, 4, "albedo").with_compression(true);
//! assert_eq!(target.byte_len(), Some(256 * 256 * 4));
//! assert_eq!(MemoryClass::DeviceLocal, target.memory_class());
//! ```

/// Where a backing allocation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryClass {
    /// Mapped into the CPU address space.  Version rings live here.
    CpuVisible,
    /// Only the device touches it.  Targets live here.
    DeviceLocal,
}

/// Describes how often the producer rewrites a buffer.
///
/// This determines how many versions a [crate::multibuffer::BufferVersionRing] may
/// keep alive at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsagePolicy {
    /// Written once, at creation.  One version.
    Static,
    /// Rewritten regularly, roughly once per frame.
    ///
    /// At most `versions` allocations are live at any instant; the producer waits on
    /// the consumer when it gets that far ahead.  Must be at least 2.
    Dynamic { versions: u8 },
    /// Rewritten many times per frame.  A fresh version per write, never throttled.
    Volatile,
}

impl UsagePolicy {
    /// The most versions this policy keeps live, or `None` if unbounded.
    pub fn version_count(&self) -> Option<usize> {
        match self {
            UsagePolicy::Static => Some(1),
            UsagePolicy::Dynamic { versions } => Some(*versions as usize),
            UsagePolicy::Volatile => None,
        }
    }
}

/// The kind of device-written target.
///
/// Each kind drains through a different cache unit, so each waits on its own slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// A render target written by the color backend.
    Color,
    /// A depth/stencil target written by the depth backend.
    Depth,
    /// A texture or buffer written by shaders (UAV-style).
    Storage,
}

/// Configuration for a device-local target.
#[derive(Debug, Clone)]
pub struct TargetConfig<'a> {
    pub kind: TargetKind,
    pub width: u32,
    pub height: u32,
    pub bytes_per_texel: u32,
    /// Mip levels times array slices.  Per-subresource barriers wait on each separately.
    pub subresources: u32,
    /// Whether the target carries compression metadata that fast clears write.
    pub compressed: bool,
    pub debug_name: &'a str,
}

impl<'a> TargetConfig<'a> {
    pub fn new(
        kind: TargetKind,
        width: u32,
        height: u32,
        bytes_per_texel: u32,
        debug_name: &'a str,
    ) -> Self {
        TargetConfig {
            kind,
            width,
            height,
            bytes_per_texel,
            subresources: 1,
            compressed: false,
            debug_name,
        }
    }

    pub fn with_compression(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    pub fn with_subresources(mut self, subresources: u32) -> Self {
        self.subresources = subresources;
        self
    }

    /// Size of the target in bytes, or `None` if it does not fit in a `u64`.
    pub fn byte_len(&self) -> Option<u64> {
        u64::from(self.width)
            .checked_mul(u64::from(self.height))?
            .checked_mul(u64::from(self.bytes_per_texel))
    }

    pub fn memory_class(&self) -> MemoryClass {
        MemoryClass::DeviceLocal
    }
}
