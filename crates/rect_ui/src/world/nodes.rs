//! Node-level operations: hierarchy, active state, rect and transform edits

use crate::error::{UiError, UiResult};
use crate::foundation::collections::NodeKey;
use crate::foundation::math::{Mat4, Quat, Vec2, Vec3};
use crate::raycast::{HitMesh, RaycastType, TraceChannel};
use crate::rect::{AnchorRect, ParentRect};

use super::UiWorld;

impl UiWorld {
    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    /// Move a node under a new parent (`None` makes it a root)
    pub fn set_parent(&mut self, node: NodeKey, parent: Option<NodeKey>, keep_world_position: bool) -> UiResult<()> {
        let old_root = self.tree.root_of(node);
        let changes = self.tree.reparent(node, parent, keep_world_position)?;
        self.apply_link_changes(node, &changes);
        self.mark_hierarchy_sort_dirty(old_root);
        self.mark_hierarchy_sort_dirty(node);
        self.flush_events();
        Ok(())
    }

    /// Move a node to position `index` among its siblings
    pub fn set_hierarchy_index(&mut self, node: NodeKey, index: i32) -> UiResult<()> {
        if self.tree.set_hierarchy_index(node, index)? {
            self.after_reorder(node);
        }
        Ok(())
    }

    /// Move a node before its siblings
    pub fn set_as_first_sibling(&mut self, node: NodeKey) -> UiResult<()> {
        if self.tree.set_as_first_sibling(node)? {
            self.after_reorder(node);
        }
        Ok(())
    }

    /// Move a node after its siblings
    pub fn set_as_last_sibling(&mut self, node: NodeKey) -> UiResult<()> {
        if self.tree.set_as_last_sibling(node)? {
            self.after_reorder(node);
        }
        Ok(())
    }

    fn after_reorder(&mut self, node: NodeKey) {
        if let Some(surface) = self.tree.get(node).and_then(|n| n.render_surface()) {
            self.registry.mark_members_dirty(surface);
        }
        self.mark_hierarchy_sort_dirty(node);
        self.flush_events();
    }

    /// Flatten hierarchy index of a node
    pub fn flatten_hierarchy_index(&self, node: NodeKey) -> i32 {
        self.tree.flatten_index(node)
    }

    /// Rename a node
    pub fn set_name(&mut self, node: NodeKey, name: &str) -> UiResult<()> {
        self.tree.set_name(node, name)
    }

    // ------------------------------------------------------------------
    // Active state
    // ------------------------------------------------------------------

    /// Set a node's declared active flag
    ///
    /// Behaviours on nodes whose effective state flipped are enabled or
    /// disabled.
    pub fn set_ui_active(&mut self, node: NodeKey, active: bool) -> UiResult<()> {
        let flipped = self.tree.set_ui_active(node, active)?;
        for (key, is_active) in flipped {
            if let Some(surface) = self.tree.get(key).and_then(|n| n.render_surface()) {
                self.registry.mark_members_dirty(surface);
            }
            self.set_node_behaviours_enabled(key, is_active);
        }
        self.flush_events();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Raycast settings
    // ------------------------------------------------------------------

    fn edit_raycast(&mut self, node: NodeKey, edit: impl FnOnce(&mut crate::hierarchy::RaycastProps)) -> UiResult<()> {
        let mut props = self.tree.node(node)?.raycast().clone();
        edit(&mut props);
        self.tree.set_raycast(node, props)
    }

    /// Set whether pointer raycasts consider a node
    pub fn set_raycast_target(&mut self, node: NodeKey, target: bool) -> UiResult<()> {
        self.edit_raycast(node, |props| props.target = target)
    }

    /// Set the trace channel of a node
    pub fn set_trace_channel(&mut self, node: NodeKey, channel: TraceChannel) -> UiResult<()> {
        self.edit_raycast(node, |props| props.channel = channel)
    }

    /// Set rect or mesh hit testing for a node
    pub fn set_raycast_type(&mut self, node: NodeKey, raycast_type: RaycastType) -> UiResult<()> {
        self.edit_raycast(node, |props| props.raycast_type = raycast_type)
    }

    /// Set the triangles used by mesh hit tests
    pub fn set_hit_mesh(&mut self, node: NodeKey, mesh: Option<HitMesh>) -> UiResult<()> {
        self.edit_raycast(node, |props| props.mesh = mesh)
    }

    // ------------------------------------------------------------------
    // Anchor rect
    // ------------------------------------------------------------------

    fn edit_rect(&mut self, node: NodeKey, edit: impl FnOnce(&mut AnchorRect, &ParentRect)) -> UiResult<()> {
        self.tree.edit_rect(node, edit)?;
        self.flush_events();
        Ok(())
    }

    fn parent_size(&self, node: NodeKey) -> Option<Vec2> {
        self.tree.parent_of(node).map(|p| self.tree.size(p))
    }

    fn require_parent(&self, node: NodeKey) -> UiResult<()> {
        self.tree.node(node)?;
        match self.tree.parent_of(node) {
            Some(_) => Ok(()),
            None => Err(UiError::NoParent(node).warn()),
        }
    }

    /// Set the anchored position
    pub fn set_anchored_position(&mut self, node: NodeKey, value: Vec2) -> UiResult<()> {
        self.edit_rect(node, |rect, _| rect.set_anchored_position(value))
    }

    /// Set the horizontal component of the anchored position
    pub fn set_horizontal_anchored_position(&mut self, node: NodeKey, value: f32) -> UiResult<()> {
        self.edit_rect(node, |rect, _| {
            let current = rect.anchored_position();
            rect.set_anchored_position(Vec2::new(value, current.y));
        })
    }

    /// Set the vertical component of the anchored position
    pub fn set_vertical_anchored_position(&mut self, node: NodeKey, value: f32) -> UiResult<()> {
        self.edit_rect(node, |rect, _| {
            let current = rect.anchored_position();
            rect.set_anchored_position(Vec2::new(current.x, value));
        })
    }

    /// Set the size delta
    pub fn set_size_delta(&mut self, node: NodeKey, value: Vec2) -> UiResult<()> {
        self.edit_rect(node, |rect, _| rect.set_size_delta(value))
    }

    /// Set the pivot
    pub fn set_pivot(&mut self, node: NodeKey, value: Vec2) -> UiResult<()> {
        self.edit_rect(node, |rect, _| rect.set_pivot(value))
    }

    /// Set the minimum anchor
    pub fn set_anchor_min(&mut self, node: NodeKey, value: Vec2) -> UiResult<()> {
        self.edit_rect(node, |rect, _| {
            let max = rect.data().anchor_max;
            rect.set_anchors(value, max);
        })
    }

    /// Set the maximum anchor
    pub fn set_anchor_max(&mut self, node: NodeKey, value: Vec2) -> UiResult<()> {
        self.edit_rect(node, |rect, _| {
            let min = rect.data().anchor_min;
            rect.set_anchors(min, value);
        })
    }

    /// Set the width, adjusting the size delta for stretched nodes
    pub fn set_width(&mut self, node: NodeKey, width: f32) -> UiResult<()> {
        let parent_width = self.parent_size(node).map(|s| s.x);
        self.edit_rect(node, |rect, _| rect.set_width(width, parent_width))
    }

    /// Set the height, adjusting the size delta for stretched nodes
    pub fn set_height(&mut self, node: NodeKey, height: f32) -> UiResult<()> {
        let parent_height = self.parent_size(node).map(|s| s.y);
        self.edit_rect(node, |rect, _| rect.set_height(height, parent_height))
    }

    /// Move the left edge relative to the left anchor, keeping the right edge
    pub fn set_anchor_left(&mut self, node: NodeKey, value: f32) -> UiResult<()> {
        self.require_parent(node)?;
        self.edit_rect(node, |rect, _| rect.set_anchor_left(value))
    }

    /// Move the right edge relative to the right anchor, keeping the left edge
    pub fn set_anchor_right(&mut self, node: NodeKey, value: f32) -> UiResult<()> {
        self.require_parent(node)?;
        self.edit_rect(node, |rect, _| rect.set_anchor_right(value))
    }

    /// Move the bottom edge relative to the bottom anchor, keeping the top edge
    pub fn set_anchor_bottom(&mut self, node: NodeKey, value: f32) -> UiResult<()> {
        self.require_parent(node)?;
        self.edit_rect(node, |rect, _| rect.set_anchor_bottom(value))
    }

    /// Move the top edge relative to the top anchor, keeping the bottom edge
    pub fn set_anchor_top(&mut self, node: NodeKey, value: f32) -> UiResult<()> {
        self.require_parent(node)?;
        self.edit_rect(node, |rect, _| rect.set_anchor_top(value))
    }

    /// Change the horizontal anchors (`value.x` = min, `value.y` = max)
    ///
    /// `keep_size` keeps the width; otherwise the edges stay in place.
    /// `keep_relative_position` afterwards restores the previous local
    /// position by rederiving the anchored position.
    pub fn set_horizontal_anchor_min_max(
        &mut self,
        node: NodeKey,
        value: Vec2,
        keep_size: bool,
        keep_relative_position: bool,
    ) -> UiResult<()> {
        let parent_width = self.parent_size(node).map_or(0.0, |s| s.x);
        self.edit_rect(node, |rect, parent| {
            let previous = rect.calculate_transform_from_anchor(parent);
            rect.set_horizontal_anchor_min_max(value, keep_size, parent_width);
            if keep_relative_position {
                rect.calculate_anchor_from_transform(previous, parent);
            }
        })
    }

    /// Change the vertical anchors (`value.x` = min, `value.y` = max)
    pub fn set_vertical_anchor_min_max(
        &mut self,
        node: NodeKey,
        value: Vec2,
        keep_size: bool,
        keep_relative_position: bool,
    ) -> UiResult<()> {
        let parent_height = self.parent_size(node).map_or(0.0, |s| s.y);
        self.edit_rect(node, |rect, parent| {
            let previous = rect.calculate_transform_from_anchor(parent);
            rect.set_vertical_anchor_min_max(value, keep_size, parent_height);
            if keep_relative_position {
                rect.calculate_anchor_from_transform(previous, parent);
            }
        })
    }

    // ------------------------------------------------------------------
    // Transform
    // ------------------------------------------------------------------

    /// Set the relative location and rederive the anchored position
    pub fn set_relative_location(&mut self, node: NodeKey, location: Vec3) -> UiResult<()> {
        self.on_host_transform_changed(node, location)
    }

    /// Set the relative rotation
    pub fn set_relative_rotation(&mut self, node: NodeKey, rotation: Quat) -> UiResult<()> {
        let mut transform = *self.tree.node(node)?.transform();
        transform.rotation = rotation;
        self.tree.set_transform(node, transform)?;
        self.tree.mark_layout_dirty(node);
        Ok(())
    }

    /// Set the relative scale
    pub fn set_relative_scale(&mut self, node: NodeKey, scale: Vec3) -> UiResult<()> {
        let mut transform = *self.tree.node(node)?.transform();
        transform.scale = scale;
        self.tree.set_transform(node, transform)?;
        self.tree.mark_layout_dirty(node);
        Ok(())
    }

    /// World matrix of a node
    pub fn world_transform(&self, node: NodeKey) -> Mat4 {
        self.tree.world_matrix(node)
    }

    // ------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------

    /// Reset every derived cache of a node
    pub fn mark_all_dirty(&mut self, node: NodeKey) -> UiResult<()> {
        self.tree.mark_all_dirty(node)
    }

    /// Reset every derived cache of a node and its descendants
    pub fn mark_all_dirty_recursive(&mut self, node: NodeKey) -> UiResult<()> {
        self.tree.mark_all_dirty_recursive(node)
    }

    /// Run the layout pass now instead of waiting for the next tick
    pub fn force_update_layout(&mut self) {
        if self.tree.update_layout() {
            log::trace!("layout pass moved or resized nodes");
        }
        self.flush_events();
    }

    /// Queue a node's behaviours for `rebuild_layout` on the next tick
    pub fn mark_rebuild_layout(&mut self, node: NodeKey) -> UiResult<()> {
        self.tree.node(node)?;
        if !self.rebuild_queue.contains(&node) {
            self.rebuild_queue.push(node);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::HostId;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-4;

    fn world_with_stretched_child() -> (UiWorld, NodeKey, NodeKey) {
        let mut world = UiWorld::new();
        let root = world.on_attach(HostId(1), None).unwrap();
        world.set_size_delta(root, Vec2::new(200.0, 100.0)).unwrap();
        let child = world.on_attach(HostId(2), Some(root)).unwrap();
        world.set_anchor_min(child, Vec2::new(0.0, 0.5)).unwrap();
        world.set_anchor_max(child, Vec2::new(1.0, 0.5)).unwrap();
        world.set_size_delta(child, Vec2::new(-20.0, 40.0)).unwrap();
        world.set_horizontal_anchored_position(child, -5.0).unwrap();
        (world, root, child)
    }

    #[test]
    fn test_set_anchor_left_on_stretched_node() {
        let (mut world, _, child) = world_with_stretched_child();
        assert_relative_eq!(world.tree().get(child).unwrap().rect().anchor_right(), 15.0, epsilon = EPSILON);

        world.set_anchored_position(child, Vec2::zeros()).unwrap();
        assert_relative_eq!(world.tree().get(child).unwrap().rect().anchor_right(), 10.0, epsilon = EPSILON);

        world.set_anchor_left(child, 10.0).unwrap();
        assert_relative_eq!(world.tree().width(child), 180.0, epsilon = EPSILON);
        assert_relative_eq!(world.tree().get(child).unwrap().rect().size_delta().x, -20.0, epsilon = EPSILON);
    }

    #[test]
    fn test_anchor_edges_need_parent() {
        let mut world = UiWorld::new();
        let root = world.on_attach(HostId(1), None).unwrap();
        let before = world.tree().get(root).unwrap().rect().size_delta();
        assert_eq!(world.set_anchor_left(root, 10.0), Err(UiError::NoParent(root)));
        assert_eq!(world.tree().get(root).unwrap().rect().size_delta(), before);
    }

    #[test]
    fn test_set_width_on_stretched_node() {
        let (mut world, _, child) = world_with_stretched_child();
        world.set_width(child, 150.0).unwrap();
        assert_relative_eq!(world.tree().get(child).unwrap().rect().size_delta().x, -50.0, epsilon = EPSILON);
        assert_relative_eq!(world.tree().width(child), 150.0, epsilon = EPSILON);
    }

    #[test]
    fn test_anchor_min_max_keep_relative_position() {
        let (mut world, _, child) = world_with_stretched_child();
        world.force_update_layout();
        let before = world.tree().get(child).unwrap().transform().location;

        world
            .set_horizontal_anchor_min_max(child, Vec2::new(0.5, 0.5), true, true)
            .unwrap();
        world.force_update_layout();
        let after = world.tree().get(child).unwrap().transform().location;
        assert_relative_eq!(before, after, epsilon = EPSILON);
        assert!(!world.tree().get(child).unwrap().rect().is_horizontal_stretched());
        assert_relative_eq!(world.tree().width(child), 180.0, epsilon = EPSILON);
    }

    #[test]
    fn test_host_transform_rederives_anchors() {
        let mut world = UiWorld::new();
        let root = world.on_attach(HostId(1), None).unwrap();
        let child = world.on_attach(HostId(2), Some(root)).unwrap();
        world.force_update_layout();

        world.on_host_transform_changed(child, Vec3::new(0.0, 12.0, -7.0)).unwrap();
        assert_relative_eq!(
            world.tree().get(child).unwrap().rect().anchored_position(),
            Vec2::new(12.0, -7.0),
            epsilon = EPSILON
        );
        world.force_update_layout();
        assert_relative_eq!(
            world.tree().get(child).unwrap().transform().location,
            Vec3::new(0.0, 12.0, -7.0),
            epsilon = EPSILON
        );
    }

    #[test]
    fn test_rotation_keeps_anchored_position() {
        let mut world = UiWorld::new();
        let root = world.on_attach(HostId(1), None).unwrap();
        world.set_anchored_position(root, Vec2::new(3.0, 4.0)).unwrap();
        world
            .set_relative_rotation(root, Quat::from_axis_angle(&Vec3::x_axis(), 0.5))
            .unwrap();
        world.set_relative_scale(root, Vec3::new(2.0, 2.0, 2.0)).unwrap();
        world.force_update_layout();
        assert_relative_eq!(world.tree().get(root).unwrap().rect().anchored_position(), Vec2::new(3.0, 4.0));
        assert_relative_eq!(world.world_transform(root)[(0, 0)], 2.0, epsilon = EPSILON);
    }
}
