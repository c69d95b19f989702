/*!
This module implements validation of the "dirty" bit that read-write resources carry.

The device write operation sets the bit; a barrier into a readable phase clears it.
Rebinding a resource for a new read-write use while the bit is still set, without an
intervening barrier, is almost certainly a race.  Sampling a target that still has
unresolved fast-clear metadata is almost certainly garbage.

Neither is fatal.  Each check returns a [ValidationWarning], which is logged and,
when collection is enabled, kept in a [ValidationLog] that a test harness can drain.
Production builds are free to ignore the returned `Result`.
*/

use crate::bindings::AccessClass;
use crate::bindings::ResourceId;
use crate::bindings::resource_tracking::TrackerEntry;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationWarning {
    #[error("{name} ({resource:?}) rebound for read-write use while dirty, without a barrier")]
    DirtyReadWriteRebind { resource: ResourceId, name: String },
    #[error("{name} ({resource:?}) sampled with unresolved fast-clear metadata")]
    SampledWhileFastCleared { resource: ResourceId, name: String },
    #[error("{name} ({resource:?}) sampled while {access:?} (dirty: {dirty}); transition it to Readable first")]
    SampledWithoutTransition {
        resource: ResourceId,
        name: String,
        access: AccessClass,
        dirty: bool,
    },
    #[error("{name} ({resource:?}) written by the device while Readable")]
    WriteWhileReadable { resource: ResourceId, name: String },
    #[error("{0:?} is not a known resource")]
    UnknownResource(ResourceId),
}

pub(crate) fn check_read_write_rebind(id: ResourceId, entry: &TrackerEntry) -> Result<(), ValidationWarning> {
    if entry.is_dirty() && entry.access() != AccessClass::ReadWriteNoBarrier {
        return Err(ValidationWarning::DirtyReadWriteRebind {
            resource: id,
            name: entry.desc().debug_name.clone(),
        });
    }
    Ok(())
}

pub(crate) fn check_sampling(id: ResourceId, entry: &TrackerEntry, fast_cleared: bool) -> Result<(), ValidationWarning> {
    //the ledger check wins; it's the more specific bug
    if fast_cleared {
        return Err(ValidationWarning::SampledWhileFastCleared {
            resource: id,
            name: entry.desc().debug_name.clone(),
        });
    }
    if !entry.is_clean_readable() {
        return Err(ValidationWarning::SampledWithoutTransition {
            resource: id,
            name: entry.desc().debug_name.clone(),
            access: entry.access(),
            dirty: entry.is_dirty(),
        });
    }
    Ok(())
}

pub(crate) fn check_write(id: ResourceId, previous: AccessClass, name: &str) -> Result<(), ValidationWarning> {
    if previous == AccessClass::Readable {
        return Err(ValidationWarning::WriteWhileReadable {
            resource: id,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Collects warnings for a test harness.
#[derive(Debug, Default)]
pub struct ValidationLog {
    collect: bool,
    warnings: Vec<ValidationWarning>,
}

impl ValidationLog {
    pub fn new(collect: bool) -> Self {
        ValidationLog {
            collect,
            warnings: Vec::new(),
        }
    }

    /// Logs the warning (if any) and passes the result through.
    pub(crate) fn report(&mut self, result: Result<(), ValidationWarning>) -> Result<(), ValidationWarning> {
        if let Err(warning) = &result {
            logwise::warn_sync!(
                "validation: {warning}",
                warning = logwise::privacy::LogIt(warning)
            );
            if self.collect {
                self.warnings.push(warning.clone());
            }
        }
        result
    }

    pub fn take(&mut self) -> Vec<ValidationWarning> {
        std::mem::take(&mut self.warnings)
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }
}
