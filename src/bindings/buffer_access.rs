/*!
Defines lock modes for [crate::multibuffer::BufferVersionRing].
*/

/// How a version ring is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// The producer will overwrite the locked range.
    ///
    /// Every write lock after the first hands out a fresh version, so the whole
    /// range must be written: offsets other than 0 are rejected.
    WriteOnly,
    /// The producer will read the consumer's current version back.
    ///
    /// This stalls until the device is idle.
    ReadOnly,
}
