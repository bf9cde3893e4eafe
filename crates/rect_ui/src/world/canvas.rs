//! Surfaces, canvas groups and raycasters attached to nodes

use crate::error::{UiError, UiResult};
use crate::foundation::collections::{GroupKey, NodeKey, RaycasterKey, SurfaceKey};
use crate::hierarchy::{HierarchyEvent, UiNode};
use crate::raycast::Raycaster;
use crate::surface::{ClipType, RenderMode, ViewExtension};

use super::UiWorld;

impl UiWorld {
    // ------------------------------------------------------------------
    // Render surfaces
    // ------------------------------------------------------------------

    /// Make `node` the owner of a new render surface
    pub fn add_surface(&mut self, node: NodeKey, mode: RenderMode) -> UiResult<SurfaceKey> {
        if self.tree.node(node)?.own_surface().is_some() {
            return Err(UiError::AlreadyRegistered("render surface").warn());
        }
        let key = self.registry.insert(node);
        self.registry.set_render_mode(key, mode)?;
        let changes = self.tree.set_own_surface(node, Some(key))?;
        self.apply_link_changes(node, &changes);
        self.registry.mark_members_dirty(key);
        self.mark_hierarchy_sort_dirty(node);
        log::debug!("surface {key:?} added on node {node:?} as {mode:?}");
        self.flush_events();
        Ok(key)
    }

    /// Remove the surface owned by `node`
    ///
    /// Its members fall back to the nearest surface above.
    pub fn remove_surface(&mut self, node: NodeKey) -> UiResult<()> {
        let Some(key) = self.tree.node(node)?.own_surface() else {
            return Err(UiError::NotRegistered("render surface").warn());
        };
        let changes = self.tree.set_own_surface(node, None)?;
        self.apply_link_changes(node, &changes);
        self.registry.remove(key);
        self.mark_hierarchy_sort_dirty(node);
        log::debug!("surface {key:?} removed from node {node:?}");
        self.flush_events();
        Ok(())
    }

    /// Reclassify a surface
    pub fn set_render_mode(&mut self, surface: SurfaceKey, mode: RenderMode) -> UiResult<()> {
        if self.registry.set_render_mode(surface, mode)? {
            self.registry.mark_members_dirty(surface);
        }
        Ok(())
    }

    /// Set a surface's explicit sort order
    ///
    /// With `propagate_to_children`, nested surfaces shift by the same delta.
    pub fn set_sort_order(&mut self, surface: SurfaceKey, value: i32, propagate_to_children: bool) -> UiResult<()> {
        self.registry.set_sort_order(surface, value, propagate_to_children)
    }

    /// Sort a surface above every other surface of its hierarchy
    pub fn set_sort_order_to_highest_of_hierarchy(&mut self, surface: SurfaceKey, propagate_to_children: bool) -> UiResult<()> {
        self.registry.set_sort_order_to_highest_of_hierarchy(surface, propagate_to_children)
    }

    /// Sort a surface below every other surface of its hierarchy
    pub fn set_sort_order_to_lowest_of_hierarchy(&mut self, surface: SurfaceKey, propagate_to_children: bool) -> UiResult<()> {
        self.registry.set_sort_order_to_lowest_of_hierarchy(surface, propagate_to_children)
    }

    /// Sort a surface above every other surface of its render mode
    pub fn set_sort_order_to_highest_of_all(&mut self, surface: SurfaceKey, propagate_to_children: bool) -> UiResult<()> {
        self.registry.set_sort_order_to_highest_of_all(surface, propagate_to_children)
    }

    /// Sort a surface below every other surface of its render mode
    pub fn set_sort_order_to_lowest_of_all(&mut self, surface: SurfaceKey, propagate_to_children: bool) -> UiResult<()> {
        self.registry.set_sort_order_to_lowest_of_all(surface, propagate_to_children)
    }

    /// Let a nested surface use its own sort order
    pub fn set_override_sorting(&mut self, surface: SurfaceKey, override_sorting: bool) -> UiResult<()> {
        self.registry.set_override_sorting(surface, override_sorting)
    }

    /// Set a surface's clipping
    pub fn set_clip(&mut self, surface: SurfaceKey, clip: ClipType) -> UiResult<()> {
        self.registry.surface_mut(surface)?.clip = clip;
        Ok(())
    }

    /// Set whether a rect-clipped surface also applies its parent's rect clip
    pub fn set_inherit_rect_clip(&mut self, surface: SurfaceKey, inherit: bool) -> UiResult<()> {
        self.registry.surface_mut(surface)?.inherit_rect_clip = inherit;
        Ok(())
    }

    /// Surfaces of one render mode, in their last sorted order
    pub fn get_canvas_bucket(&self, mode: RenderMode) -> &[SurfaceKey] {
        self.registry.bucket(mode)
    }

    /// Effective sort order of a surface
    pub fn actual_sort_order(&self, surface: SurfaceKey) -> i32 {
        self.registry.actual_sort_order(surface)
    }

    /// Attach an observer for bucket re-sorts
    pub fn set_view_extension(&mut self, extension: Option<Box<dyn ViewExtension>>) {
        self.registry.set_view_extension(extension);
    }

    // ------------------------------------------------------------------
    // Canvas groups
    // ------------------------------------------------------------------

    /// Make `node` the owner of a new canvas group
    pub fn add_canvas_group(&mut self, node: NodeKey) -> UiResult<GroupKey> {
        if self.tree.node(node)?.own_group().is_some() {
            return Err(UiError::AlreadyRegistered("canvas group").warn());
        }
        let key = self.groups.insert(node);
        let changes = self.tree.set_own_group(node, Some(key))?;
        self.apply_link_changes(node, &changes);
        self.flush_events();
        Ok(key)
    }

    /// Remove the canvas group owned by `node`
    pub fn remove_canvas_group(&mut self, node: NodeKey) -> UiResult<()> {
        let Some(key) = self.tree.node(node)?.own_group() else {
            return Err(UiError::NotRegistered("canvas group").warn());
        };
        // The group must outlive the link pass, which compares against it.
        let changes = self.tree.set_own_group(node, None)?;
        self.apply_link_changes(node, &changes);
        self.groups.remove(key);
        self.flush_events();
        Ok(())
    }

    /// Set a group's own alpha
    pub fn set_group_alpha(&mut self, group: GroupKey, alpha: f32) -> UiResult<()> {
        self.groups.set_alpha(group, alpha)
    }

    /// Set a group's own interactable flag
    pub fn set_group_interactable(&mut self, group: GroupKey, interactable: bool) -> UiResult<()> {
        let changes = self.groups.set_interactable(group, interactable)?;
        self.broadcast_interactable(&changes);
        Ok(())
    }

    /// Stop a group inheriting interactability from groups above it
    pub fn set_group_ignore_parent_group(&mut self, group: GroupKey, ignore: bool) -> UiResult<()> {
        let changes = self.groups.set_ignore_parent_group(group, ignore)?;
        self.broadcast_interactable(&changes);
        Ok(())
    }

    /// Mark a group as a navigation boundary
    pub fn set_group_restrict_navigation_area(&mut self, group: GroupKey, restrict: bool) -> UiResult<()> {
        self.groups.set_restrict_navigation_area(group, restrict)
    }

    fn broadcast_interactable(&mut self, changes: &[crate::group::InteractableChange]) {
        for change in changes {
            self.tree.notify(
                change.node,
                HierarchyEvent::InteractionStateChanged {
                    interactable: change.interactable,
                },
            );
        }
        self.flush_events();
    }

    /// Alpha of a node's nearest group, multiplied up the chain (1 without a group)
    pub fn final_alpha(&self, node: NodeKey) -> f32 {
        self.groups
            .final_alpha(self.tree.get(node).and_then(UiNode::canvas_group))
    }

    /// Whether a node's group chain allows interaction (true without a group)
    pub fn final_interactable(&self, node: NodeKey) -> bool {
        self.groups
            .final_interactable(self.tree.get(node).and_then(UiNode::canvas_group))
    }

    /// Nearest group above or on `node` that restricts navigation
    pub fn restrict_navigation_group(&self, node: NodeKey) -> Option<GroupKey> {
        self.groups
            .restrict_navigation_group(self.tree.get(node).and_then(UiNode::canvas_group))
    }

    // ------------------------------------------------------------------
    // Raycasters
    // ------------------------------------------------------------------

    /// Register a raycaster
    pub fn add_raycaster(&mut self, raycaster: Raycaster) -> RaycasterKey {
        self.registry.add_raycaster(raycaster)
    }

    /// Unregister a raycaster
    pub fn remove_raycaster(&mut self, key: RaycasterKey) -> UiResult<()> {
        self.registry.remove_raycaster(key).map(|_| ())
    }

    /// Change a raycaster's depth; the raycaster gets a new key
    pub fn set_raycaster_depth(&mut self, key: RaycasterKey, depth: i32) -> UiResult<RaycasterKey> {
        self.registry.set_raycaster_depth(key, depth)
    }

    /// Enable or disable a raycaster
    pub fn set_raycaster_enabled(&mut self, key: RaycasterKey, enabled: bool) -> UiResult<()> {
        self.registry.raycaster_mut(key)?.enabled = enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::HostId;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-6;

    #[test]
    fn test_nested_surface_links_and_removal() {
        let mut world = UiWorld::new();
        let root = world.on_attach(HostId(1), None).unwrap();
        let panel = world.on_attach(HostId(2), Some(root)).unwrap();
        let leaf = world.on_attach(HostId(3), Some(panel)).unwrap();

        let outer = world.add_surface(root, RenderMode::ScreenOverlay).unwrap();
        let inner = world.add_surface(panel, RenderMode::ScreenOverlay).unwrap();
        assert_eq!(world.node(leaf).unwrap().render_surface(), Some(inner));
        assert_eq!(world.registry().get(inner).unwrap().parent_surface(), Some(outer));
        assert_eq!(world.add_surface(panel, RenderMode::ScreenOverlay), Err(UiError::AlreadyRegistered("render surface")));

        world.remove_surface(panel).unwrap();
        assert_eq!(world.node(leaf).unwrap().render_surface(), Some(outer));
        assert!(world.registry().get(inner).is_none());
        assert_eq!(world.get_canvas_bucket(RenderMode::ScreenOverlay), &[outer]);
        assert_eq!(world.remove_surface(panel), Err(UiError::NotRegistered("render surface")));
    }

    #[test]
    fn test_render_mode_moves_between_buckets() {
        let mut world = UiWorld::new();
        let root = world.on_attach(HostId(1), None).unwrap();
        let surface = world.add_surface(root, RenderMode::ScreenOverlay).unwrap();
        world.set_render_mode(surface, RenderMode::RenderTarget).unwrap();

        assert!(world.get_canvas_bucket(RenderMode::ScreenOverlay).is_empty());
        assert_eq!(world.get_canvas_bucket(RenderMode::RenderTarget), &[surface]);
        let occurrences = RenderMode::ALL
            .iter()
            .filter(|mode| world.get_canvas_bucket(**mode).contains(&surface))
            .count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn test_group_lookups_through_nodes() {
        let mut world = UiWorld::new();
        let root = world.on_attach(HostId(1), None).unwrap();
        let child = world.on_attach(HostId(2), Some(root)).unwrap();
        assert_relative_eq!(world.final_alpha(child), 1.0, epsilon = EPSILON);
        assert!(world.final_interactable(child));
        assert_eq!(world.restrict_navigation_group(child), None);

        let outer = world.add_canvas_group(root).unwrap();
        let inner = world.add_canvas_group(child).unwrap();
        world.set_group_alpha(outer, 0.5).unwrap();
        world.set_group_alpha(inner, 0.5).unwrap();
        world.set_group_restrict_navigation_area(outer, true).unwrap();
        assert_relative_eq!(world.final_alpha(child), 0.25, epsilon = EPSILON);
        assert_eq!(world.restrict_navigation_group(child), Some(outer));

        world.set_group_interactable(outer, false).unwrap();
        assert!(!world.final_interactable(child));
        world.set_group_ignore_parent_group(inner, true).unwrap();
        assert!(world.final_interactable(child));

        world.remove_canvas_group(child).unwrap();
        assert_eq!(world.node(child).unwrap().canvas_group(), Some(outer));
        assert!(!world.final_interactable(child));
    }

    #[test]
    fn test_detach_unregisters_surfaces_and_groups() {
        let mut world = UiWorld::new();
        let root = world.on_attach(HostId(1), None).unwrap();
        let child = world.on_attach(HostId(2), Some(root)).unwrap();
        let surface = world.add_surface(child, RenderMode::WorldSpaceCustom).unwrap();
        let group = world.add_canvas_group(child).unwrap();

        world.on_detach(child).unwrap();
        assert!(world.registry().get(surface).is_none());
        assert!(world.groups().get(group).is_none());
        assert!(world.get_canvas_bucket(RenderMode::WorldSpaceCustom).is_empty());
    }
}
