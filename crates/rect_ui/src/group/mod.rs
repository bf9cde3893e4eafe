//! Canvas groups: compound alpha and interactable state
//!
//! Each group points at the nearest group above it. Final alpha is the
//! product along that chain and is memoized per group. A change pushes
//! invalidation down to the registered child groups instead of children
//! polling their parents. Final interactable is the conjunction along the
//! chain, cut off at the first group that ignores its parents.

use std::cell::Cell;

use crate::error::{UiError, UiResult};
use crate::foundation::collections::{GroupKey, NodeKey, SlotMap};

/// One canvas group attached to a node
#[derive(Debug)]
pub struct CanvasGroup {
    node: NodeKey,
    alpha: f32,
    interactable: bool,
    ignore_parent_group: bool,
    restrict_navigation_area: bool,
    parent: Option<GroupKey>,
    children: Vec<GroupKey>,
    cache_final_alpha: Cell<f32>,
    alpha_dirty: Cell<bool>,
    last_final_interactable: bool,
}

impl CanvasGroup {
    fn new(node: NodeKey) -> Self {
        Self {
            node,
            alpha: 1.0,
            interactable: true,
            ignore_parent_group: false,
            restrict_navigation_area: false,
            parent: None,
            children: Vec::new(),
            cache_final_alpha: Cell::new(1.0),
            alpha_dirty: Cell::new(true),
            last_final_interactable: true,
        }
    }

    /// Node owning this group
    pub const fn node(&self) -> NodeKey {
        self.node
    }

    /// Own alpha
    pub const fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Own interactable flag
    pub const fn interactable(&self) -> bool {
        self.interactable
    }

    /// Whether the interactable walk stops at this group
    pub const fn ignore_parent_group(&self) -> bool {
        self.ignore_parent_group
    }

    /// Whether navigation is confined to this group's subtree
    pub const fn restrict_navigation_area(&self) -> bool {
        self.restrict_navigation_area
    }

    /// Nearest group above this one
    pub const fn parent(&self) -> Option<GroupKey> {
        self.parent
    }
}

/// Group whose final interactable state flipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractableChange {
    /// Group that flipped
    pub group: GroupKey,
    /// Node owning that group
    pub node: NodeKey,
    /// New final state
    pub interactable: bool,
}

/// Arena of all canvas groups in a world
#[derive(Debug, Default)]
pub struct CanvasGroups {
    groups: SlotMap<GroupKey, CanvasGroup>,
}

impl CanvasGroups {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a group
    pub fn get(&self, key: GroupKey) -> Option<&CanvasGroup> {
        self.groups.get(key)
    }

    fn group_mut(&mut self, key: GroupKey) -> UiResult<&mut CanvasGroup> {
        self.groups.get_mut(key).ok_or_else(|| UiError::StaleGroup(key).warn())
    }

    pub(crate) fn insert(&mut self, node: NodeKey) -> GroupKey {
        self.groups.insert(CanvasGroup::new(node))
    }

    pub(crate) fn remove(&mut self, key: GroupKey) -> Option<CanvasGroup> {
        let group = self.groups.remove(key)?;
        if let Some(parent) = group.parent.and_then(|p| self.groups.get_mut(p)) {
            parent.children.retain(|c| *c != key);
        }
        for child in &group.children {
            if let Some(child) = self.groups.get_mut(*child) {
                child.parent = None;
            }
            self.invalidate_alpha(*child);
        }
        Some(group)
    }

    /// Final alpha of a group, 1.0 when the group does not resolve
    pub fn final_alpha(&self, key: Option<GroupKey>) -> f32 {
        let Some(group) = key.and_then(|k| self.groups.get(k)) else {
            return 1.0;
        };
        if group.alpha_dirty.get() {
            let inherited = self.final_alpha(group.parent);
            group.cache_final_alpha.set(group.alpha * inherited);
            group.alpha_dirty.set(false);
        }
        group.cache_final_alpha.get()
    }

    /// Final interactable state of a group, `true` when the group does not resolve
    pub fn final_interactable(&self, key: Option<GroupKey>) -> bool {
        let mut current = key;
        while let Some(group) = current.and_then(|k| self.groups.get(k)) {
            if !group.interactable {
                return false;
            }
            if group.ignore_parent_group {
                return true;
            }
            current = group.parent;
        }
        true
    }

    /// Nearest group at or above `key` that restricts navigation
    pub fn restrict_navigation_group(&self, key: Option<GroupKey>) -> Option<GroupKey> {
        let mut current = key;
        while let Some(k) = current {
            let group = self.groups.get(k)?;
            if group.restrict_navigation_area {
                return Some(k);
            }
            current = group.parent;
        }
        None
    }

    /// Set the own alpha, invalidating this group and every group below it
    pub fn set_alpha(&mut self, key: GroupKey, alpha: f32) -> UiResult<()> {
        let group = self.group_mut(key)?;
        if group.alpha == alpha {
            return Ok(());
        }
        group.alpha = alpha;
        self.invalidate_alpha(key);
        Ok(())
    }

    /// Set the own interactable flag
    pub fn set_interactable(&mut self, key: GroupKey, interactable: bool) -> UiResult<Vec<InteractableChange>> {
        let group = self.group_mut(key)?;
        if group.interactable == interactable {
            return Ok(Vec::new());
        }
        group.interactable = interactable;
        Ok(self.check_interactable_changes(key))
    }

    /// Set whether the interactable walk stops at this group
    pub fn set_ignore_parent_group(&mut self, key: GroupKey, ignore: bool) -> UiResult<Vec<InteractableChange>> {
        let group = self.group_mut(key)?;
        if group.ignore_parent_group == ignore {
            return Ok(Vec::new());
        }
        group.ignore_parent_group = ignore;
        Ok(self.check_interactable_changes(key))
    }

    /// Set whether navigation is confined to this group's subtree
    pub fn set_restrict_navigation_area(&mut self, key: GroupKey, restrict: bool) -> UiResult<()> {
        self.group_mut(key)?.restrict_navigation_area = restrict;
        Ok(())
    }

    /// Re-register a group under a new parent group
    pub(crate) fn set_parent(&mut self, key: GroupKey, parent: Option<GroupKey>) -> Vec<InteractableChange> {
        let Some(group) = self.groups.get_mut(key) else {
            return Vec::new();
        };
        if group.parent == parent || parent == Some(key) {
            return Vec::new();
        }
        let old_parent = std::mem::replace(&mut group.parent, parent);

        if let Some(old) = old_parent.and_then(|p| self.groups.get_mut(p)) {
            old.children.retain(|c| *c != key);
        }
        if let Some(new) = parent.and_then(|p| self.groups.get_mut(p)) {
            new.children.push(key);
        }

        self.invalidate_alpha(key);
        self.check_interactable_changes(key)
    }

    fn invalidate_alpha(&self, key: GroupKey) {
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if let Some(group) = self.groups.get(current) {
                group.alpha_dirty.set(true);
                stack.extend(group.children.iter().copied());
            }
        }
    }

    /// Compare final interactable values below `key` with their last broadcast value
    fn check_interactable_changes(&mut self, key: GroupKey) -> Vec<InteractableChange> {
        let mut changes = Vec::new();
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            let value = self.final_interactable(Some(current));
            let Some(group) = self.groups.get_mut(current) else {
                continue;
            };
            if group.last_final_interactable != value {
                group.last_final_interactable = value;
                changes.push(InteractableChange {
                    group: current,
                    node: group.node,
                    interactable: value,
                });
            }
            stack.extend(group.children.iter().copied());
        }
        changes
    }
}
