// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Configuration for a [DeviceContext](super::DeviceContext).
//!
//! # Examples
//!
//! ```
//! use locks_and_labels::device::Config;
//! use std::time::Duration;
//!
//! let config = Config::default()
//!     .with_split_threshold(128 * 1024)
//!     .with_device_timeout(Duration::from_secs(2))
//!     .with_collect_validation(true);
//! assert_eq!(config.split_threshold_bytes, 128 * 1024);
//! ```

use crate::sys::time::Duration;

/// Default size at which [super::DeviceContext::maybe_split] cuts a submission.
pub const DEFAULT_SPLIT_THRESHOLD_BYTES: usize = 64 * 1024;

/// Default deadline for CPU waits on the device.
pub const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_secs(5);

/// Alignment of version-ring allocations.
pub const DEFAULT_BUFFER_ALIGNMENT: u64 = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Encoded size at which an opportunistic split cuts the stream.
    pub split_threshold_bytes: usize,
    /// How long a CPU wait gives the device before declaring it hung.
    pub device_timeout: Duration,
    /// Keep validation warnings for [super::DeviceContext::take_validation_warnings].
    ///
    /// Warnings are always logged; this only controls collection.
    pub collect_validation: bool,
    pub buffer_alignment: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            split_threshold_bytes: DEFAULT_SPLIT_THRESHOLD_BYTES,
            device_timeout: DEFAULT_DEVICE_TIMEOUT,
            collect_validation: cfg!(debug_assertions),
            buffer_alignment: DEFAULT_BUFFER_ALIGNMENT,
        }
    }
}

impl Config {
    pub fn with_split_threshold(mut self, bytes: usize) -> Self {
        self.split_threshold_bytes = bytes;
        self
    }

    pub fn with_device_timeout(mut self, timeout: Duration) -> Self {
        self.device_timeout = timeout;
        self
    }

    pub fn with_collect_validation(mut self, collect: bool) -> Self {
        self.collect_validation = collect;
        self
    }

    pub fn with_buffer_alignment(mut self, alignment: u64) -> Self {
        self.buffer_alignment = alignment;
        self
    }
}
