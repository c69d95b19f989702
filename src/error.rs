// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Errors returned by the synchronization core.
//!
//! Almost everything here is a caller contract violation rather than a recoverable
//! runtime condition.  They are returned loudly at the violation site instead of being
//! papered over, since silent resource corruption costs far more to debug.

use crate::bindings::ResourceId;
use crate::imp;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A second lock was requested while one is outstanding.
    #[error("{resource} is already locked ({state})")]
    AlreadyLocked {
        resource: String,
        state: &'static str,
    },
    /// Unlock was called without a matching lock, or a mapping was used after unlock.
    #[error("{resource} is not locked")]
    NotLocked { resource: String },
    /// The resource cannot be destroyed while a lock is outstanding.
    #[error("{resource} is still locked and cannot be destroyed")]
    StillLocked { resource: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Static resources are written exactly once, at creation.
    #[error("{resource} is static and has already been written")]
    StaticResource { resource: String },
    #[error("unknown resource {0:?}")]
    UnknownResource(ResourceId),
    #[error(transparent)]
    Device(#[from] imp::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_errors_pass_through() {
        let e: Error = imp::Error::DeviceFault("boom".to_string()).into();
        assert_eq!(e.to_string(), "device fault: boom");
    }
}
