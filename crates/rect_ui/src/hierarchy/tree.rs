//! Node arena and hierarchy bookkeeping
//!
//! [`UiTree`] owns every node of one world. Parent and child links are arena
//! keys; a key that no longer resolves is treated as absent. Structural
//! mutations queue [`Notification`]s instead of calling out directly, and the
//! world dispatches them once the mutation has finished.
//!
//! Two values are computed lazily:
//! - width/height, cached in each node's [`crate::rect::AnchorRect`]
//! - the flatten index, recomputed by one pre-order walk over every root,
//!   in root order, when the tree's flatten flag is set

use std::cell::Cell;

use crate::error::{UiError, UiResult};
use crate::foundation::collections::{GroupKey, HostId, NodeKey, SessionId, SlotMap, SurfaceKey};
use crate::foundation::logging::consistency_failure;
use crate::foundation::math::{Mat4, Transform, Vec2, Vec3};
use crate::rect::ParentRect;

use super::events::{HierarchyEvent, Notification};
use super::node::{RaycastProps, UiNode};

/// Change of a node's derived membership after a structural mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkChange {
    /// Node whose links were recomputed
    pub node: NodeKey,
    /// Render surface before the change
    pub old_surface: Option<SurfaceKey>,
    /// Render surface after the change
    pub new_surface: Option<SurfaceKey>,
    /// Canvas group before the change
    pub old_group: Option<GroupKey>,
    /// Canvas group after the change
    pub new_group: Option<GroupKey>,
    /// Effective active state before the change
    pub was_active: bool,
    /// Effective active state after the change
    pub is_active: bool,
}

impl LinkChange {
    /// Whether the nearest surface changed
    pub fn surface_changed(&self) -> bool {
        self.old_surface != self.new_surface
    }

    /// Whether the nearest canvas group changed
    pub fn group_changed(&self) -> bool {
        self.old_group != self.new_group
    }

    /// Whether the effective active state flipped
    pub const fn active_changed(&self) -> bool {
        self.was_active != self.is_active
    }
}

/// Hierarchy arena of one world
#[derive(Debug, Default)]
pub struct UiTree {
    nodes: SlotMap<NodeKey, UiNode>,
    roots: Vec<NodeKey>,
    pending: Vec<Notification>,
    layout_dirty: bool,
    flatten_dirty: Cell<bool>,
    deferred_parents: Vec<(SessionId, Option<NodeKey>)>,
}

impl UiTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a key still resolves
    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Look up a node
    pub fn get(&self, key: NodeKey) -> Option<&UiNode> {
        self.nodes.get(key)
    }

    /// Look up a node, reporting a stale handle as a usage error
    pub fn node(&self, key: NodeKey) -> UiResult<&UiNode> {
        self.nodes.get(key).ok_or_else(|| UiError::StaleNode(key).warn())
    }

    pub(crate) fn node_mut(&mut self, key: NodeKey) -> UiResult<&mut UiNode> {
        self.nodes.get_mut(key).ok_or_else(|| UiError::StaleNode(key).warn())
    }

    /// Parent-less nodes in root order
    pub fn roots(&self) -> &[NodeKey] {
        &self.roots
    }

    /// Iterate every node
    pub fn iter(&self) -> impl Iterator<Item = (NodeKey, &UiNode)> {
        self.nodes.iter()
    }

    /// Parent of a node, if it has a live one
    pub fn parent_of(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes
            .get(key)
            .and_then(|node| node.parent)
            .filter(|parent| self.nodes.contains_key(*parent))
    }

    /// Topmost ancestor of a node (the node itself for roots)
    pub fn root_of(&self, key: NodeKey) -> NodeKey {
        let mut current = key;
        while let Some(parent) = self.parent_of(current) {
            current = parent;
        }
        current
    }

    /// Whether `ancestor` is `node` or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor: NodeKey, node: NodeKey) -> bool {
        let mut current = Some(node);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = self.parent_of(key);
        }
        false
    }

    /// Subtree of `key` in pre-order (depth first, sibling order)
    pub fn preorder(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut order = Vec::new();
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            order.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        order
    }

    /// Siblings of a node including itself (roots for parent-less nodes)
    pub fn siblings(&self, key: NodeKey) -> &[NodeKey] {
        self.sibling_list(self.parent_of(key))
    }

    fn sibling_list(&self, parent: Option<NodeKey>) -> &[NodeKey] {
        match parent.and_then(|p| self.nodes.get(p)) {
            Some(node) => &node.children,
            None => &self.roots,
        }
    }

    fn sibling_list_mut(&mut self, parent: Option<NodeKey>) -> &mut Vec<NodeKey> {
        match parent {
            Some(p) if self.nodes.contains_key(p) => &mut self.nodes[p].children,
            _ => &mut self.roots,
        }
    }

    pub(crate) fn notify(&mut self, target: NodeKey, event: HierarchyEvent) {
        self.pending.push(Notification::new(target, event));
    }

    pub(crate) fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn has_notifications(&self) -> bool {
        !self.pending.is_empty()
    }

    // ------------------------------------------------------------------
    // Creation and destruction
    // ------------------------------------------------------------------

    /// Create a node for a host object and attach it under `parent`
    pub fn insert(
        &mut self,
        host: HostId,
        raycast: RaycastProps,
        parent: Option<NodeKey>,
        session: Option<SessionId>,
    ) -> UiResult<(NodeKey, Vec<LinkChange>)> {
        if let Some(parent) = parent {
            if !self.nodes.contains_key(parent) {
                return Err(UiError::StaleNode(parent).warn());
            }
        }

        let mut node = UiNode::new(host, raycast);
        node.session = session;
        let key = self.nodes.insert(node);
        self.layout_dirty = true;
        self.link_into(key, parent);
        let changes = self.refresh_links(key);
        self.notify(key, HierarchyEvent::AttachmentChanged);
        if let Some(parent) = parent {
            self.notify(parent, HierarchyEvent::ChildAttachmentChanged { child: key, attached: true });
        }
        Ok((key, changes))
    }

    /// Remove a node and its whole subtree, returning the removed nodes in pre-order
    pub fn remove_subtree(&mut self, key: NodeKey) -> UiResult<Vec<(NodeKey, UiNode)>> {
        if !self.nodes.contains_key(key) {
            return Err(UiError::StaleNode(key).warn());
        }
        let old_parent = self.parent_of(key);
        self.unlink(key);
        if let Some(parent) = old_parent {
            self.notify(parent, HierarchyEvent::ChildAttachmentChanged { child: key, attached: false });
        }

        let removed = self
            .preorder(key)
            .into_iter()
            .filter_map(|k| self.nodes.remove(k).map(|node| (k, node)))
            .collect();
        Ok(removed)
    }

    fn link_into(&mut self, key: NodeKey, parent: Option<NodeKey>) {
        let deferred = self.nodes[key].session;
        let list = self.sibling_list_mut(parent);
        if parent.is_none() && list.contains(&key) {
            consistency_failure(&format!("root node {key:?}: already exist"));
        } else {
            list.push(key);
        }
        let index = i32::try_from(list.len() - 1).unwrap_or(i32::MAX);

        let node = &mut self.nodes[key];
        node.parent = parent;
        match deferred {
            Some(session) => self.deferred_parents.push((session, parent)),
            None => node.hierarchy_index = index,
        }
        self.mark_flatten_dirty();
    }

    fn unlink(&mut self, key: NodeKey) {
        let parent = self.parent_of(key);
        let list = self.sibling_list_mut(parent);
        match list.iter().position(|k| *k == key) {
            Some(position) => {
                list.remove(position);
            }
            None if parent.is_none() => {
                consistency_failure(&format!("root node {key:?}: not exist"));
            }
            None => {
                consistency_failure(&format!("child {key:?} missing from its parent's child list"));
            }
        }
        if self.nodes[key].session.is_none() {
            self.renumber(parent);
        }
        self.mark_flatten_dirty();
        self.nodes[key].parent = None;
    }

    /// Assign `hierarchy_index = position` for every child of `parent`
    ///
    /// Returns whether any index changed.
    fn renumber(&mut self, parent: Option<NodeKey>) -> bool {
        let list = self.sibling_list(parent).to_vec();
        let mut changed = false;
        for (position, child) in list.into_iter().enumerate() {
            let index = i32::try_from(position).unwrap_or(i32::MAX);
            if let Some(node) = self.nodes.get_mut(child) {
                if node.hierarchy_index != index {
                    node.hierarchy_index = index;
                    changed = true;
                }
            }
        }
        changed
    }

    // ------------------------------------------------------------------
    // Hierarchy order
    // ------------------------------------------------------------------

    /// Move a node to position `index` among its siblings
    ///
    /// `-1` means first, values past the end mean last. Returns whether any
    /// sibling index changed. Nodes inside an open bulk session only record
    /// the requested index; ordering is resolved when the session ends.
    pub fn set_hierarchy_index(&mut self, key: NodeKey, index: i32) -> UiResult<bool> {
        let node = self.node_mut(key)?;
        if let Some(session) = node.session {
            node.hierarchy_index = index;
            let parent = node.parent;
            self.deferred_parents.push((session, parent));
            return Ok(false);
        }

        let parent = self.parent_of(key);
        let list = self.sibling_list_mut(parent);
        let Some(current) = list.iter().position(|k| *k == key) else {
            return Err(UiError::NotRegistered("sibling list entry").consistency());
        };
        let last = list.len() - 1;
        let target = usize::try_from(index).map_or(0, |i| i.min(last));

        list.remove(current);
        list.insert(target, key);

        let changed = self.renumber(parent);
        if changed {
            self.mark_flatten_dirty();
            if let Some(parent) = parent {
                self.notify(parent, HierarchyEvent::ChildHierarchyIndexChanged { child: key });
            }
        }
        Ok(changed)
    }

    /// Move a node before all of its siblings
    pub fn set_as_first_sibling(&mut self, key: NodeKey) -> UiResult<bool> {
        self.set_hierarchy_index(key, -1)
    }

    /// Move a node after all of its siblings
    pub fn set_as_last_sibling(&mut self, key: NodeKey) -> UiResult<bool> {
        let count = i32::try_from(self.siblings(key).len()).unwrap_or(i32::MAX);
        self.set_hierarchy_index(key, count)
    }

    /// Resolve deferred sibling order of every parent touched during a session
    ///
    /// Children with an explicit index are ordered by it; unassigned children
    /// (`-1`) keep their attach order after them.
    pub(crate) fn finalize_session(&mut self, session: SessionId) {
        let mut parents: Vec<Option<NodeKey>> = Vec::new();
        self.deferred_parents.retain(|(s, parent)| {
            if *s == session {
                if !parents.contains(parent) {
                    parents.push(*parent);
                }
                false
            } else {
                true
            }
        });

        for parent in parents {
            if parent.is_some_and(|p| !self.nodes.contains_key(p)) {
                continue;
            }
            let mut list = self.sibling_list(parent).to_vec();
            list.sort_by_key(|k| match self.nodes.get(*k).map(|n| n.hierarchy_index) {
                Some(index) if index >= 0 => index,
                _ => i32::MAX,
            });
            *self.sibling_list_mut(parent) = list;
            let changed = self.renumber(parent);
            let Some(&first) = self.sibling_list(parent).first() else {
                continue;
            };
            self.mark_flatten_dirty();
            if let (true, Some(parent)) = (changed, parent) {
                self.notify(parent, HierarchyEvent::ChildHierarchyIndexChanged { child: first });
            }
        }
    }

    /// Flatten index of a node
    ///
    /// Counts every node of every hierarchy in one pre-order walk, roots in
    /// root order, so later roots always follow the whole subtree of earlier
    /// ones. The walk only runs when the tree is marked dirty.
    pub fn flatten_index(&self, key: NodeKey) -> i32 {
        if !self.nodes.contains_key(key) {
            return 0;
        }
        if self.flatten_dirty.get() {
            let mut next = 0;
            for root in &self.roots {
                for node in self.preorder(*root) {
                    self.nodes[node].flatten_index.set(next);
                    next += 1;
                }
            }
            self.flatten_dirty.set(false);
        }
        self.nodes[key].flatten_index.get()
    }

    /// Mark flatten indices for recompute on the next query
    pub fn mark_flatten_dirty(&self) {
        self.flatten_dirty.set(true);
    }

    /// Whether flatten indices wait for recompute
    pub fn is_flatten_dirty(&self) -> bool {
        self.flatten_dirty.get()
    }

    // ------------------------------------------------------------------
    // Reparenting and link propagation
    // ------------------------------------------------------------------

    /// Move a node (and its subtree) under a new parent
    ///
    /// With `keep_world_position` the node keeps its world transform and its
    /// anchored position is rederived from the new relative transform.
    /// Otherwise the anchored position is preserved and the layout pass
    /// places the node inside its new parent.
    pub fn reparent(
        &mut self,
        key: NodeKey,
        new_parent: Option<NodeKey>,
        keep_world_position: bool,
    ) -> UiResult<Vec<LinkChange>> {
        self.node(key)?;
        if let Some(parent) = new_parent {
            self.node(parent)?;
            if self.is_ancestor_or_self(key, parent) {
                return Err(UiError::CyclicParent { child: key, parent }.warn());
            }
        }
        let old_parent = self.parent_of(key);
        if old_parent == new_parent {
            return Ok(Vec::new());
        }

        let world_before = keep_world_position.then(|| self.anchored_world_matrix(key));

        self.unlink(key);
        if let Some(parent) = old_parent {
            self.notify(parent, HierarchyEvent::ChildAttachmentChanged { child: key, attached: false });
        }
        self.link_into(key, new_parent);

        let changes = self.refresh_links(key);
        self.invalidate_size_recursive(key);

        if let Some(world) = world_before {
            let parent_world = new_parent.map_or_else(Mat4::identity, |p| self.anchored_world_matrix(p));
            let relative = parent_world
                .try_inverse()
                .map(|inverse| inverse * world)
                .and_then(|m| Transform::from_matrix(&m));
            if let Some(relative) = relative {
                let parent_rect = self.parent_rect(key);
                let node = &mut self.nodes[key];
                let plane = Vec2::new(relative.location.y, relative.location.z);
                node.transform = relative;
                node.rect.calculate_anchor_from_transform(plane, &parent_rect);
            }
        }
        self.mark_layout_dirty(key);

        self.notify(key, HierarchyEvent::AttachmentChanged);
        if let Some(parent) = new_parent {
            self.notify(parent, HierarchyEvent::ChildAttachmentChanged { child: key, attached: true });
        }
        Ok(changes)
    }

    /// Recompute surface, group and ancestor-active caches for a subtree
    ///
    /// Queues `RenderSurfaceChanged` and `ActiveInHierarchyChanged` for every
    /// node where they flipped, and returns all changes.
    pub(crate) fn refresh_links(&mut self, key: NodeKey) -> Vec<LinkChange> {
        let mut changes = Vec::new();
        for current in self.preorder(key) {
            let (parent_surface, parent_group, parent_active) = match self.parent_of(current) {
                Some(p) => {
                    let parent = &self.nodes[p];
                    (parent.render_surface, parent.canvas_group, parent.is_ui_active_in_hierarchy())
                }
                None => (None, None, true),
            };

            let node = &mut self.nodes[current];
            let change = LinkChange {
                node: current,
                old_surface: node.render_surface,
                new_surface: node.own_surface.or(parent_surface),
                old_group: node.canvas_group,
                new_group: node.own_group.or(parent_group),
                was_active: node.is_ui_active_in_hierarchy(),
                is_active: node.active_self && parent_active,
            };
            node.render_surface = change.new_surface;
            node.canvas_group = change.new_group;
            node.all_up_parent_active = parent_active;

            if change.surface_changed() {
                self.notify(current, HierarchyEvent::RenderSurfaceChanged);
            }
            if change.active_changed() {
                self.notify(current, HierarchyEvent::ActiveInHierarchyChanged { active: change.is_active });
            }
            if change.surface_changed() || change.group_changed() || change.active_changed() {
                changes.push(change);
            }
        }
        changes
    }

    /// Set or clear the surface owned by a node itself
    pub(crate) fn set_own_surface(&mut self, key: NodeKey, surface: Option<SurfaceKey>) -> UiResult<Vec<LinkChange>> {
        self.node_mut(key)?.own_surface = surface;
        Ok(self.refresh_links(key))
    }

    /// Set or clear the canvas group owned by a node itself
    pub(crate) fn set_own_group(&mut self, key: NodeKey, group: Option<GroupKey>) -> UiResult<Vec<LinkChange>> {
        self.node_mut(key)?.own_group = group;
        Ok(self.refresh_links(key))
    }

    // ------------------------------------------------------------------
    // Active state
    // ------------------------------------------------------------------

    /// Set the declared active flag of a node
    ///
    /// Returns every node whose effective state flipped, with its new state.
    /// If an ancestor already suppresses the node only the declared flag
    /// changes.
    pub fn set_ui_active(&mut self, key: NodeKey, active: bool) -> UiResult<Vec<(NodeKey, bool)>> {
        let node = self.node_mut(key)?;
        if node.active_self == active {
            return Ok(Vec::new());
        }
        node.active_self = active;
        if !node.all_up_parent_active {
            return Ok(Vec::new());
        }

        let mut flipped = vec![(key, active)];
        self.notify(key, HierarchyEvent::ActiveInHierarchyChanged { active });
        let children = self.nodes[key].children.clone();
        for child in children {
            self.propagate_parent_active(child, active, &mut flipped);
        }
        Ok(flipped)
    }

    fn propagate_parent_active(&mut self, key: NodeKey, parent_active: bool, flipped: &mut Vec<(NodeKey, bool)>) {
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        let was_active = node.is_ui_active_in_hierarchy();
        node.all_up_parent_active = parent_active;
        let is_active = node.is_ui_active_in_hierarchy();
        if was_active == is_active {
            return;
        }

        flipped.push((key, is_active));
        self.notify(key, HierarchyEvent::ActiveInHierarchyChanged { active: is_active });
        let children = self.nodes[key].children.clone();
        for child in children {
            self.propagate_parent_active(child, is_active, flipped);
        }
    }

    // ------------------------------------------------------------------
    // Geometry
    // ------------------------------------------------------------------

    /// Width of a node (cached)
    pub fn width(&self, key: NodeKey) -> f32 {
        let Some(node) = self.nodes.get(key) else {
            return 0.0;
        };
        node.rect.width(|| self.parent_of(key).map(|p| self.width(p)))
    }

    /// Height of a node (cached)
    pub fn height(&self, key: NodeKey) -> f32 {
        let Some(node) = self.nodes.get(key) else {
            return 0.0;
        };
        node.rect.height(|| self.parent_of(key).map(|p| self.height(p)))
    }

    /// Width and height of a node
    pub fn size(&self, key: NodeKey) -> Vec2 {
        Vec2::new(self.width(key), self.height(key))
    }

    /// Rect of the node's parent, or [`ParentRect::NONE`] for roots
    pub fn parent_rect(&self, key: NodeKey) -> ParentRect {
        self.parent_of(key).map_or(ParentRect::NONE, |parent| {
            let pivot = self.nodes[parent].rect.pivot();
            ParentRect::from_size_and_pivot(self.width(parent), self.height(parent), pivot)
        })
    }

    /// Local-space left edge
    pub fn local_space_left(&self, key: NodeKey) -> f32 {
        self.nodes.get(key).map_or(0.0, |n| n.rect.local_left(self.width(key)))
    }

    /// Local-space right edge
    pub fn local_space_right(&self, key: NodeKey) -> f32 {
        self.nodes.get(key).map_or(0.0, |n| n.rect.local_right(self.width(key)))
    }

    /// Local-space bottom edge
    pub fn local_space_bottom(&self, key: NodeKey) -> f32 {
        self.nodes.get(key).map_or(0.0, |n| n.rect.local_bottom(self.height(key)))
    }

    /// Local-space top edge
    pub fn local_space_top(&self, key: NodeKey) -> f32 {
        self.nodes.get(key).map_or(0.0, |n| n.rect.local_top(self.height(key)))
    }

    /// Bottom-left corner in the node's local rect plane
    pub fn local_space_left_bottom_point(&self, key: NodeKey) -> Vec2 {
        Vec2::new(self.local_space_left(key), self.local_space_bottom(key))
    }

    /// Rect center relative to the pivot
    pub fn local_space_center(&self, key: NodeKey) -> Vec2 {
        Vec2::new(
            (self.local_space_left(key) + self.local_space_right(key)) * 0.5,
            (self.local_space_bottom(key) + self.local_space_top(key)) * 0.5,
        )
    }

    /// World matrix of a node (parent chain composed)
    pub fn world_matrix(&self, key: NodeKey) -> Mat4 {
        let mut matrix = Mat4::identity();
        let mut current = Some(key);
        while let Some(k) = current {
            let Some(node) = self.nodes.get(k) else {
                break;
            };
            matrix = node.transform.to_matrix() * matrix;
            current = self.parent_of(k);
        }
        matrix
    }

    /// World matrix with every location on the chain derived from anchor data
    ///
    /// Equals [`UiTree::world_matrix`] once the layout pass has run, but does
    /// not depend on it.
    fn anchored_world_matrix(&self, key: NodeKey) -> Mat4 {
        let mut matrix = Mat4::identity();
        let mut current = Some(key);
        while let Some(k) = current {
            let Some(node) = self.nodes.get(k) else {
                break;
            };
            let plane = node.rect.calculate_transform_from_anchor(&self.parent_rect(k));
            let mut transform = node.transform;
            transform.location = Vec3::new(transform.location.x, plane.x, plane.y);
            matrix = transform.to_matrix() * matrix;
            current = self.parent_of(k);
        }
        matrix
    }

    /// Drop cached sizes of a node and all of its descendants
    pub(crate) fn invalidate_size_recursive(&self, key: NodeKey) {
        for node in self.preorder(key) {
            self.nodes[node].rect.invalidate_size();
        }
    }

    /// Flag a node for the next layout pass
    pub fn mark_layout_dirty(&mut self, key: NodeKey) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.layout_dirty = true;
            self.layout_dirty = true;
        }
    }

    /// Whether any node waits for the layout pass
    pub const fn is_layout_dirty(&self) -> bool {
        self.layout_dirty
    }

    /// Reset every derived cache of one node
    pub fn mark_all_dirty(&mut self, key: NodeKey) -> UiResult<()> {
        self.node(key)?.rect.invalidate_all();
        self.mark_flatten_dirty();
        self.mark_layout_dirty(key);
        Ok(())
    }

    /// Reset every derived cache of a node and all of its descendants
    pub fn mark_all_dirty_recursive(&mut self, key: NodeKey) -> UiResult<()> {
        self.node(key)?;
        for node in self.preorder(key) {
            self.mark_all_dirty(node)?;
        }
        Ok(())
    }

    /// Run `edit` on a node's anchor rect and schedule the consequences
    ///
    /// Size caches of the subtree are dropped and the node is laid out again
    /// on the next layout pass.
    pub(crate) fn edit_rect(
        &mut self,
        key: NodeKey,
        edit: impl FnOnce(&mut crate::rect::AnchorRect, &ParentRect),
    ) -> UiResult<()> {
        let parent_rect = self.parent_rect(key);
        edit(&mut self.node_mut(key)?.rect, &parent_rect);
        self.invalidate_size_recursive(key);
        self.mark_layout_dirty(key);
        Ok(())
    }

    /// Replace a node's relative transform
    pub(crate) fn set_transform(&mut self, key: NodeKey, transform: Transform) -> UiResult<()> {
        self.node_mut(key)?.transform = transform;
        Ok(())
    }

    /// Store an externally set relative location and rederive the anchored position
    ///
    /// Returns whether the location actually changed.
    pub(crate) fn apply_external_location(&mut self, key: NodeKey, location: Vec3) -> UiResult<bool> {
        let parent_rect = self.parent_rect(key);
        let node = self.node_mut(key)?;
        if node.transform.location == location {
            return Ok(false);
        }
        node.transform.location = location;
        node.rect
            .calculate_anchor_from_transform(Vec2::new(location.y, location.z), &parent_rect);
        Ok(true)
    }

    /// Lay out every dirty node
    ///
    /// Dirty nodes and their descendants get their relative location
    /// recomputed from anchors. Location and size are compared exactly
    /// against the previous values, and `DimensionsChanged` is queued only
    /// when one of them differs.
    pub fn update_layout(&mut self) -> bool {
        if !self.layout_dirty {
            return false;
        }
        self.layout_dirty = false;
        let mut any_changed = false;
        for root in self.roots.clone() {
            any_changed |= self.update_layout_node(root, false);
        }
        any_changed
    }

    fn update_layout_node(&mut self, key: NodeKey, force: bool) -> bool {
        let Some(node) = self.nodes.get(key) else {
            return false;
        };
        let dirty = force || node.layout_dirty;
        let mut any_changed = false;

        if dirty {
            let plane = node.rect.calculate_transform_from_anchor(&self.parent_rect(key));
            let size = self.size(key);

            let node = &mut self.nodes[key];
            let location = Vec3::new(node.transform.location.x, plane.x, plane.y);
            let position_changed = node.transform.location != location;
            let size_changed = node.last_size != Some(size);
            node.transform.location = location;
            node.last_size = Some(size);
            node.layout_dirty = false;

            if position_changed || size_changed {
                any_changed = true;
                self.notify(key, HierarchyEvent::DimensionsChanged { position_changed, size_changed });
            }
        }

        for child in self.nodes[key].children.clone() {
            any_changed |= self.update_layout_node(child, dirty);
        }
        any_changed
    }

    // ------------------------------------------------------------------
    // Misc authoritative fields
    // ------------------------------------------------------------------

    pub(crate) fn set_name(&mut self, key: NodeKey, name: &str) -> UiResult<()> {
        self.node_mut(key)?.name = name.to_owned();
        Ok(())
    }

    pub(crate) fn set_raycast(&mut self, key: NodeKey, raycast: RaycastProps) -> UiResult<()> {
        self.node_mut(key)?.raycast = raycast;
        Ok(())
    }

    /// Tag a subtree with a bulk session (or clear the tag)
    pub(crate) fn set_session(&mut self, key: NodeKey, session: Option<SessionId>) {
        for node in self.preorder(key) {
            self.nodes[node].session = session;
        }
    }

    /// Nodes currently tagged with a session
    pub(crate) fn nodes_in_session(&self, session: SessionId) -> Vec<NodeKey> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.session == Some(session))
            .map(|(key, _)| key)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raycast::{RaycastType, TraceChannel};
    use approx::assert_relative_eq;

    fn props() -> RaycastProps {
        RaycastProps::new(TraceChannel::default(), RaycastType::Rect)
    }

    fn add(tree: &mut UiTree, parent: Option<NodeKey>) -> NodeKey {
        tree.insert(HostId::default(), props(), parent, None).unwrap().0
    }

    fn indices(tree: &UiTree, parent: NodeKey) -> Vec<i32> {
        tree.get(parent)
            .unwrap()
            .children()
            .iter()
            .map(|c| tree.get(*c).unwrap().hierarchy_index())
            .collect()
    }

    #[test]
    fn test_children_get_sequential_indices() {
        let mut tree = UiTree::new();
        let root = add(&mut tree, None);
        let a = add(&mut tree, Some(root));
        let b = add(&mut tree, Some(root));
        let c = add(&mut tree, Some(root));

        assert_eq!(tree.get(root).unwrap().children(), &[a, b, c]);
        assert_eq!(indices(&tree, root), vec![0, 1, 2]);
        assert_eq!(tree.roots(), &[root]);
    }

    #[test]
    fn test_set_hierarchy_index_clamps_and_renumbers() {
        let mut tree = UiTree::new();
        let root = add(&mut tree, None);
        let a = add(&mut tree, Some(root));
        let b = add(&mut tree, Some(root));
        let c = add(&mut tree, Some(root));
        tree.take_notifications();

        assert!(tree.set_hierarchy_index(a, 99).unwrap());
        assert_eq!(tree.get(root).unwrap().children(), &[b, c, a]);
        assert_eq!(indices(&tree, root), vec![0, 1, 2]);

        assert!(tree.set_as_first_sibling(a).unwrap());
        assert_eq!(tree.get(root).unwrap().children(), &[a, b, c]);

        let events = tree.take_notifications();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|n| n.target == root));
    }

    #[test]
    fn test_set_hierarchy_index_without_change_is_silent() {
        let mut tree = UiTree::new();
        let root = add(&mut tree, None);
        let a = add(&mut tree, Some(root));
        let _b = add(&mut tree, Some(root));
        tree.flatten_index(a);
        tree.take_notifications();

        assert!(!tree.set_hierarchy_index(a, 0).unwrap());
        assert!(tree.take_notifications().is_empty());
        assert!(!tree.is_flatten_dirty());
    }

    #[test]
    fn test_flatten_index_is_preorder() {
        let mut tree = UiTree::new();
        let root = add(&mut tree, None);
        let a = add(&mut tree, Some(root));
        let a1 = add(&mut tree, Some(a));
        let a2 = add(&mut tree, Some(a));
        let b = add(&mut tree, Some(root));
        let b1 = add(&mut tree, Some(b));

        let order = [root, a, a1, a2, b, b1];
        let values: Vec<i32> = order.iter().map(|k| tree.flatten_index(*k)).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4, 5]);

        tree.set_as_first_sibling(b).unwrap();
        let order = [root, b, b1, a, a1, a2];
        let values: Vec<i32> = order.iter().map(|k| tree.flatten_index(*k)).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_flatten_continues_across_roots() {
        let mut tree = UiTree::new();
        let first = add(&mut tree, None);
        let first_child = add(&mut tree, Some(first));
        let second = add(&mut tree, None);
        let second_child = add(&mut tree, Some(second));

        let order = [first, first_child, second, second_child];
        let values: Vec<i32> = order.iter().map(|k| tree.flatten_index(*k)).collect();
        assert_eq!(values, vec![0, 1, 2, 3]);

        assert!(tree.set_as_last_sibling(first).unwrap());
        assert_eq!(tree.roots(), &[second, first]);
        let order = [second, second_child, first, first_child];
        let values: Vec<i32> = order.iter().map(|k| tree.flatten_index(*k)).collect();
        assert_eq!(values, vec![0, 1, 2, 3]);

        add(&mut tree, Some(second));
        assert_eq!(tree.flatten_index(first), 3);
    }

    #[test]
    fn test_reparent_moves_subtree_and_renumbers() {
        let mut tree = UiTree::new();
        let root = add(&mut tree, None);
        let a = add(&mut tree, Some(root));
        let b = add(&mut tree, Some(root));
        let c = add(&mut tree, Some(root));
        let leaf = add(&mut tree, Some(a));

        tree.reparent(a, Some(c), false).unwrap();
        assert_eq!(tree.get(root).unwrap().children(), &[b, c]);
        assert_eq!(indices(&tree, root), vec![0, 1]);
        assert_eq!(tree.parent_of(a), Some(c));
        assert_eq!(tree.root_of(leaf), root);
        assert_eq!(tree.flatten_index(leaf), 4);
    }

    #[test]
    fn test_reparent_into_descendant_is_rejected() {
        let mut tree = UiTree::new();
        let root = add(&mut tree, None);
        let child = add(&mut tree, Some(root));

        let result = tree.reparent(root, Some(child), false);
        assert_eq!(result, Err(UiError::CyclicParent { child: root, parent: child }));
        assert_eq!(tree.parent_of(child), Some(root));
    }

    #[test]
    fn test_detach_to_root_joins_root_list() {
        let mut tree = UiTree::new();
        let root = add(&mut tree, None);
        let child = add(&mut tree, Some(root));

        tree.reparent(child, None, false).unwrap();
        assert_eq!(tree.roots(), &[root, child]);
        assert_eq!(tree.get(child).unwrap().hierarchy_index(), 1);
    }

    #[test]
    fn test_reparent_keep_world_position() {
        let mut tree = UiTree::new();
        let first = add(&mut tree, None);
        let second = add(&mut tree, None);
        tree.apply_external_location(second, Vec3::new(0.0, 30.0, -10.0)).unwrap();
        let child = add(&mut tree, Some(first));
        tree.update_layout();
        let before = tree.world_matrix(child).transform_point(&crate::foundation::math::Point3::origin());

        tree.reparent(child, Some(second), true).unwrap();
        tree.update_layout();
        let after = tree.world_matrix(child).transform_point(&crate::foundation::math::Point3::origin());

        assert_relative_eq!(before, after, epsilon = 1e-4);
        assert_relative_eq!(tree.get(child).unwrap().rect().anchored_position(), Vec2::new(-30.0, 10.0), epsilon = 1e-4);
    }

    #[test]
    fn test_reparent_keep_world_position_uses_pending_anchor_edit() {
        let mut tree = UiTree::new();
        let first = add(&mut tree, None);
        let second = add(&mut tree, None);
        tree.apply_external_location(second, Vec3::new(0.0, 30.0, -10.0)).unwrap();
        let child = add(&mut tree, Some(first));
        tree.update_layout();
        tree.edit_rect(child, |rect, _| rect.set_anchored_position(Vec2::new(20.0, 5.0)))
            .unwrap();

        tree.reparent(child, Some(second), true).unwrap();
        tree.update_layout();
        let after = tree.world_matrix(child).transform_point(&crate::foundation::math::Point3::origin());

        assert_relative_eq!(after.coords, Vec3::new(0.0, 20.0, 5.0), epsilon = 1e-4);
        assert_relative_eq!(tree.get(child).unwrap().rect().anchored_position(), Vec2::new(-10.0, 15.0), epsilon = 1e-4);
    }

    #[test]
    fn test_layout_places_corner_anchored_child() {
        let mut tree = UiTree::new();
        let root = add(&mut tree, None);
        let child = add(&mut tree, Some(root));
        tree.edit_rect(child, |rect, _| {
            rect.set_anchors(Vec2::zeros(), Vec2::zeros());
            rect.set_pivot(Vec2::zeros());
            rect.set_size_delta(Vec2::new(20.0, 20.0));
        })
        .unwrap();

        assert!(tree.update_layout());
        let location = tree.get(child).unwrap().transform().location;
        assert_relative_eq!(location.y, -50.0);
        assert_relative_eq!(location.z, -50.0);
        assert_relative_eq!(tree.local_space_left(child), 0.0);
        assert_relative_eq!(tree.local_space_bottom(child), 0.0);
        assert_relative_eq!(tree.local_space_left_bottom_point(root), Vec2::new(-50.0, -50.0));
    }

    #[test]
    fn test_layout_is_silent_when_nothing_moves() {
        let mut tree = UiTree::new();
        let root = add(&mut tree, None);
        let child = add(&mut tree, Some(root));
        tree.update_layout();
        tree.take_notifications();

        tree.mark_layout_dirty(child);
        assert!(!tree.update_layout());
        assert!(tree.take_notifications().is_empty());
    }

    #[test]
    fn test_stretched_child_follows_parent_resize() {
        let mut tree = UiTree::new();
        let root = add(&mut tree, None);
        let child = add(&mut tree, Some(root));
        tree.edit_rect(child, |rect, _| {
            rect.set_anchors(Vec2::zeros(), Vec2::new(1.0, 1.0));
            rect.set_size_delta(Vec2::new(-10.0, -10.0));
        })
        .unwrap();
        assert_relative_eq!(tree.width(child), 90.0);

        tree.edit_rect(root, |rect, _| rect.set_size_delta(Vec2::new(300.0, 100.0))).unwrap();
        assert_relative_eq!(tree.width(child), 290.0);
        assert_relative_eq!(tree.height(child), 90.0);
    }

    #[test]
    fn test_set_ui_active_propagates_only_flips() {
        let mut tree = UiTree::new();
        let root = add(&mut tree, None);
        let a = add(&mut tree, Some(root));
        let hidden = add(&mut tree, Some(a));
        let under_hidden = add(&mut tree, Some(hidden));
        tree.set_ui_active(hidden, false).unwrap();
        tree.take_notifications();

        let flipped = tree.set_ui_active(a, false).unwrap();
        assert_eq!(flipped, vec![(a, false)]);
        assert!(!tree.get(hidden).unwrap().all_up_parent_ui_active());
        assert!(!tree.get(under_hidden).unwrap().all_up_parent_ui_active());

        let flipped = tree.set_ui_active(a, true).unwrap();
        assert_eq!(flipped, vec![(a, true)]);
        assert!(tree.get(hidden).unwrap().all_up_parent_ui_active());
        assert!(!tree.get(under_hidden).unwrap().is_ui_active_in_hierarchy());
    }

    #[test]
    fn test_set_ui_active_under_inactive_ancestor_does_not_propagate() {
        let mut tree = UiTree::new();
        let root = add(&mut tree, None);
        let child = add(&mut tree, Some(root));
        let leaf = add(&mut tree, Some(child));
        tree.set_ui_active(root, false).unwrap();
        tree.take_notifications();

        assert!(tree.set_ui_active(child, false).unwrap().is_empty());
        assert!(!tree.get(child).unwrap().is_ui_active_self());
        assert!(tree.take_notifications().is_empty());

        let flipped = tree.set_ui_active(root, true).unwrap();
        assert_eq!(flipped, vec![(root, true)]);
        assert!(!tree.get(leaf).unwrap().all_up_parent_ui_active());
    }

    #[test]
    fn test_remove_subtree_frees_all_keys() {
        let mut tree = UiTree::new();
        let root = add(&mut tree, None);
        let a = add(&mut tree, Some(root));
        let b = add(&mut tree, Some(a));
        let sibling = add(&mut tree, Some(root));

        let removed = tree.remove_subtree(a).unwrap();
        assert_eq!(removed.iter().map(|(k, _)| *k).collect::<Vec<_>>(), vec![a, b]);
        assert!(!tree.contains(b));
        assert_eq!(tree.get(sibling).unwrap().hierarchy_index(), 0);
        assert_eq!(tree.remove_subtree(a).unwrap_err(), UiError::StaleNode(a));
    }

    #[test]
    fn test_mark_all_dirty_recursive_resets_caches() {
        let mut tree = UiTree::new();
        let root = add(&mut tree, None);
        let child = add(&mut tree, Some(root));
        tree.width(child);
        tree.flatten_index(child);
        assert!(tree.get(child).unwrap().rect().is_width_cached());

        tree.mark_all_dirty_recursive(root).unwrap();
        assert!(!tree.get(child).unwrap().rect().is_width_cached());
        assert!(tree.is_flatten_dirty());
        assert!(tree.is_layout_dirty());
    }

    #[test]
    fn test_session_defers_sibling_order() {
        let mut tree = UiTree::new();
        let session = SessionId(1);
        let root = add(&mut tree, None);
        let a = tree.insert(HostId(1), props(), Some(root), Some(session)).unwrap().0;
        let b = tree.insert(HostId(2), props(), Some(root), Some(session)).unwrap().0;
        tree.set_hierarchy_index(b, 0).unwrap();
        tree.set_hierarchy_index(a, 1).unwrap();
        assert_eq!(tree.get(root).unwrap().children(), &[a, b]);

        tree.set_session(root, None);
        tree.finalize_session(session);
        assert_eq!(tree.get(root).unwrap().children(), &[b, a]);
        assert_eq!(indices(&tree, root), vec![0, 1]);
        assert_eq!(tree.flatten_index(b), 1);
    }
}
