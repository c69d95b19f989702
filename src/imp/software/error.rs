// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::sys::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Escalated to the caller untouched; the core neither retries nor degrades.
    #[error("out of device memory: requested {requested} bytes with {available} available")]
    OutOfDeviceMemory { requested: u64, available: u64 },
    /// A CPU wait outlived its deadline.  Not recoverable.
    #[error("device did not reach {value} on label {label} within {timeout:?}; treating it as hung")]
    DeviceHung {
        label: String,
        value: u64,
        timeout: Duration,
    },
    #[error("device fault: {0}")]
    DeviceFault(String),
}
