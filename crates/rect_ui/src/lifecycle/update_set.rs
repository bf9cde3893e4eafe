//! Ordered set of behaviours receiving `update`
//!
//! Iteration works on a snapshot. Removals requested while a snapshot is
//! being walked are parked and applied when the walk ends, so the walk never
//! observes a shifting list.

use crate::error::{UiError, UiResult};
use crate::foundation::collections::BehaviourKey;

/// Update-phase membership with deferred removal
#[derive(Debug, Default)]
pub struct UpdateSet {
    entries: Vec<BehaviourKey>,
    pending_removal: Vec<BehaviourKey>,
    iterating: bool,
}

impl UpdateSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members, including ones waiting for removal
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set has no members
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `key` is a member that is not waiting for removal
    pub fn contains(&self, key: BehaviourKey) -> bool {
        self.entries.contains(&key) && !self.pending_removal.contains(&key)
    }

    /// Whether a snapshot walk is in progress
    pub const fn is_iterating(&self) -> bool {
        self.iterating
    }

    /// Add a member
    ///
    /// Re-adding a member whose removal is still pending cancels the removal.
    pub fn add(&mut self, key: BehaviourKey) -> UiResult<()> {
        if let Some(position) = self.pending_removal.iter().position(|k| *k == key) {
            self.pending_removal.remove(position);
            return Ok(());
        }
        if self.entries.contains(&key) {
            return Err(UiError::AlreadyRegistered("update behaviour").warn());
        }
        self.entries.push(key);
        Ok(())
    }

    /// Remove a member, deferred while a walk is in progress
    pub fn remove(&mut self, key: BehaviourKey) -> UiResult<()> {
        if !self.contains(key) {
            return Err(UiError::NotRegistered("update behaviour").warn());
        }
        if self.iterating {
            self.pending_removal.push(key);
        } else {
            self.entries.retain(|k| *k != key);
        }
        Ok(())
    }

    /// Start a walk and return the members to visit
    pub fn begin_iteration(&mut self) -> Vec<BehaviourKey> {
        self.iterating = true;
        self.entries.clone()
    }

    /// Finish a walk and apply parked removals
    pub fn end_iteration(&mut self) {
        self.iterating = false;
        let pending = std::mem::take(&mut self.pending_removal);
        self.entries.retain(|k| !pending.contains(k));
    }
}
