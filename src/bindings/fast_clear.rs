// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Tracks targets whose fast-clear metadata has not been resolved.

A fast clear writes compressed metadata instead of per-pixel values.  Until a resolve
pass expands that metadata, sampling the target as an ordinary texture reads garbage.
The transition protocol consults this ledger the first time a target becomes readable
and resolves it lazily.

Re-clearing a target that is still unresolved is legal; the entry is simply restamped.
*/

use crate::bindings::ResourceId;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct FastClearLedger {
    //resource -> lastClearedFrame
    unresolved: HashMap<ResourceId, u64>,
}

impl FastClearLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a hardware fast clear.
    ///
    /// Returns `true` if the resource was already unresolved from an earlier clear.
    pub fn mark_cleared(&mut self, resource: ResourceId, frame: u64) -> bool {
        self.unresolved.insert(resource, frame).is_some()
    }

    /// Removes the resource after a resolve pass.  Returns whether it was present.
    pub fn mark_resolved(&mut self, resource: ResourceId) -> bool {
        self.unresolved.remove(&resource).is_some()
    }

    pub fn contains(&self, resource: ResourceId) -> bool {
        self.unresolved.contains_key(&resource)
    }

    pub fn last_cleared_frame(&self, resource: ResourceId) -> Option<u64> {
        self.unresolved.get(&resource).copied()
    }

    pub fn len(&self) -> usize {
        self.unresolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unresolved.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reclear_restamps() {
        let mut ledger = FastClearLedger::new();
        let r = ResourceId(4);
        assert!(!ledger.mark_cleared(r, 1));
        assert!(ledger.mark_cleared(r, 5));
        assert_eq!(ledger.last_cleared_frame(r), Some(5));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn resolve_removes() {
        let mut ledger = FastClearLedger::new();
        let r = ResourceId(4);
        ledger.mark_cleared(r, 0);
        assert!(ledger.mark_resolved(r));
        assert!(!ledger.contains(r));
        assert!(!ledger.mark_resolved(r));
        assert!(ledger.is_empty());
    }
}
