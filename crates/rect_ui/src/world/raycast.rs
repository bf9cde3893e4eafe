//! Raycast dispatch and clip visibility

use crate::foundation::collections::{NodeKey, SurfaceKey};
use crate::foundation::math::{rect_plane, Point3, Vec3};
use crate::hierarchy::UiNode;
use crate::raycast::{sort_hits, LocalRect, LocalSegment, RaycastType, Raycaster, SegmentHit, UiHit};
use crate::surface::ClipType;

use super::UiWorld;

/// How strictly a node's shape is tested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precision {
    /// Use the node's configured raycast type
    Configured,
    /// Use the hit mesh whenever the node has one
    Mesh,
}

impl UiWorld {
    /// Trace a segment through every registered raycaster
    ///
    /// Raycasters are tried by descending depth. Once a depth produced hits,
    /// the remaining raycasters of that depth are still traced and lower
    /// depths are skipped. Hits come back topmost first.
    pub fn raycast(&self, start: Vec3, end: Vec3) -> Vec<UiHit> {
        let mut hits = Vec::new();
        let mut hit_depth = None;
        for (_, raycaster) in self.registry.raycasters() {
            if !raycaster.enabled {
                continue;
            }
            if hit_depth.is_some_and(|depth| raycaster.depth < depth) {
                break;
            }
            let before = hits.len();
            self.trace(raycaster, &start, &end, &mut hits);
            if hits.len() > before && hit_depth.is_none() {
                hit_depth = Some(raycaster.depth);
            }
        }
        sort_hits(&mut hits);
        hits
    }

    fn trace(&self, raycaster: &Raycaster, start: &Vec3, end: &Vec3, hits: &mut Vec<UiHit>) {
        for (key, node) in self.tree.iter() {
            let props = node.raycast();
            if !props.target || props.channel != raycaster.trace_channel || !node.is_ui_active_in_hierarchy() {
                continue;
            }
            let accepted = node
                .render_surface()
                .and_then(|s| self.registry.get(s)?.render_mode())
                .is_some_and(|mode| raycaster.target_modes.accepts(mode));
            if !accepted || !self.groups.final_interactable(node.canvas_group()) {
                continue;
            }
            if let Some(hit) = self.hit_node(key, node, start, end, Precision::Configured, raycaster.depth) {
                hits.push(hit);
            }
        }
    }

    /// Editor-style picking among `candidates`
    ///
    /// Uses the hit mesh when a node has one, ignores the raycast-target
    /// flag and still requires an active node with a surface and an unclipped
    /// hit point.
    pub fn raycast_hit_ui(&self, candidates: &[NodeKey], start: Vec3, end: Vec3) -> Vec<UiHit> {
        let mut hits: Vec<UiHit> = candidates
            .iter()
            .filter_map(|key| {
                let node = self.tree.get(*key)?;
                if !node.is_ui_active_in_hierarchy() {
                    return None;
                }
                self.hit_node(*key, node, &start, &end, Precision::Mesh, 0)
            })
            .collect();
        sort_hits(&mut hits);
        hits
    }

    fn hit_node(
        &self,
        key: NodeKey,
        node: &UiNode,
        start: &Vec3,
        end: &Vec3,
        precision: Precision,
        depth: i32,
    ) -> Option<UiHit> {
        // Nodes detached from any surface are skipped silently.
        let surface = node.render_surface()?;
        self.registry.get(surface)?;

        let world_matrix = self.tree.world_matrix(key);
        let segment = LocalSegment::from_world(&world_matrix, start, end)?;
        let rect = LocalRect {
            left: self.tree.local_space_left(key),
            right: self.tree.local_space_right(key),
            bottom: self.tree.local_space_bottom(key),
            top: self.tree.local_space_top(key),
        };

        let props = node.raycast();
        let use_mesh = precision == Precision::Mesh || props.raycast_type == RaycastType::Mesh;
        let SegmentHit {
            fraction,
            local_point,
            local_normal,
        } = match (&props.mesh, use_mesh) {
            (Some(mesh), true) if !mesh.is_empty() => segment.hit_mesh(&rect, mesh)?,
            _ => segment.hit_rect(&rect)?,
        };

        let world_point = start + (end - start) * fraction;
        if !self.is_point_visible(surface, &world_point) {
            return None;
        }
        let world_normal = world_matrix.transform_vector(&local_normal).normalize();

        Some(UiHit {
            node: key,
            surface,
            distance: fraction * (end - start).norm(),
            world_point,
            world_normal,
            local_point,
            depth,
            sort_order: self.registry.actual_sort_order(surface),
            flatten_index: self.tree.flatten_index(key),
        })
    }

    /// Whether a world point survives the rect clipping of a surface
    ///
    /// A surface without clipping shows everything. With `inherit_rect_clip`
    /// the parent surface's clip applies as well.
    pub fn is_point_visible(&self, surface: SurfaceKey, world_point: &Vec3) -> bool {
        let Some(render_surface) = self.registry.get(surface) else {
            return true;
        };
        let ClipType::Rect {
            left,
            right,
            bottom,
            top,
        } = render_surface.clip()
        else {
            return true;
        };

        let node = render_surface.node();
        let Some(inverse) = self.tree.world_matrix(node).try_inverse() else {
            return false;
        };
        let local = inverse.transform_point(&Point3::from(*world_point)).coords;
        let point = rect_plane(&local);
        let inside = point.x >= self.tree.local_space_left(node) + left
            && point.x <= self.tree.local_space_right(node) - right
            && point.y >= self.tree.local_space_bottom(node) + bottom
            && point.y <= self.tree.local_space_top(node) - top;
        if !inside {
            return false;
        }

        match render_surface.parent_surface() {
            Some(parent) if render_surface.inherit_rect_clip() => self.is_point_visible(parent, world_point),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::HostId;
    use crate::foundation::math::Vec2;
    use crate::raycast::{cycle_hit, HitMesh, RenderModeMask, TraceChannel};
    use crate::surface::RenderMode;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-4;

    /// A 100x100 overlay canvas at the origin whose rect is a raycast target
    fn world_with_canvas() -> (UiWorld, NodeKey, SurfaceKey) {
        let mut world = UiWorld::new();
        let root = world.on_attach(HostId(1), None).unwrap();
        let surface = world.add_surface(root, RenderMode::ScreenOverlay).unwrap();
        world.set_raycast_target(root, true).unwrap();
        world.add_raycaster(Raycaster::new(0, TraceChannel::default(), RenderModeMask::all()));
        (world, root, surface)
    }

    fn add_target(world: &mut UiWorld, host: u64, parent: NodeKey) -> NodeKey {
        let node = world.on_attach(HostId(host), Some(parent)).unwrap();
        world.set_raycast_target(node, true).unwrap();
        node
    }

    fn front() -> Vec3 {
        Vec3::new(10.0, 0.0, 0.0)
    }

    fn back() -> Vec3 {
        Vec3::new(-10.0, 0.0, 0.0)
    }

    #[test]
    fn test_segment_through_rect_hits() {
        let (world, root, surface) = world_with_canvas();
        let hits = world.raycast(front(), back());
        assert_eq!(hits.len(), 1);
        let hit = hits[0];
        assert_eq!(hit.node, root);
        assert_eq!(hit.surface, surface);
        assert_relative_eq!(hit.distance, 10.0, epsilon = EPSILON);
        assert_relative_eq!(hit.world_point, Vec3::zeros(), epsilon = EPSILON);
        assert_relative_eq!(hit.world_normal, Vec3::x(), epsilon = EPSILON);
    }

    #[test]
    fn test_no_raycasters_no_hits() {
        let mut world = UiWorld::new();
        let root = world.on_attach(HostId(1), None).unwrap();
        world.add_surface(root, RenderMode::ScreenOverlay).unwrap();
        world.set_raycast_target(root, true).unwrap();
        assert!(world.raycast(front(), back()).is_empty());
    }

    #[test]
    fn test_filters_skip_inactive_uninteractable_and_surfaceless_nodes() {
        let (mut world, root, _) = world_with_canvas();
        world.set_raycast_target(root, false).unwrap();
        let child = add_target(&mut world, 2, root);
        world.force_update_layout();
        assert_eq!(world.raycast(front(), back()).len(), 1);

        world.set_ui_active(child, false).unwrap();
        assert!(world.raycast(front(), back()).is_empty());
        world.set_ui_active(child, true).unwrap();

        let group = world.add_canvas_group(root).unwrap();
        world.set_group_interactable(group, false).unwrap();
        assert!(world.raycast(front(), back()).is_empty());
        world.set_group_interactable(group, true).unwrap();

        world.set_trace_channel(child, TraceChannel(3)).unwrap();
        assert!(world.raycast(front(), back()).is_empty());
        world.set_trace_channel(child, TraceChannel::default()).unwrap();

        world.remove_surface(root).unwrap();
        assert!(world.raycast(front(), back()).is_empty());
    }

    #[test]
    fn test_higher_sort_order_hit_first() {
        let (mut world, root, _) = world_with_canvas();
        let a = add_target(&mut world, 2, root);
        let b = add_target(&mut world, 3, root);
        let a_surface = world.add_surface(a, RenderMode::ScreenOverlay).unwrap();
        world.set_override_sorting(a_surface, true).unwrap();
        world.set_sort_order(a_surface, 5, false).unwrap();
        world.force_update_layout();

        let hits = world.raycast(front(), back());
        let order: Vec<NodeKey> = hits.iter().map(|h| h.node).collect();
        assert_eq!(order, vec![a, b, root]);

        let mut index = 0;
        assert_eq!(cycle_hit(&hits, &mut index).map(|h| h.node), Some(a));
        assert_eq!(cycle_hit(&hits, &mut index).map(|h| h.node), Some(b));
    }

    #[test]
    fn test_siblings_order_by_flatten_index() {
        let (mut world, root, _) = world_with_canvas();
        let first = add_target(&mut world, 2, root);
        let second = add_target(&mut world, 3, root);
        world.force_update_layout();
        let order: Vec<NodeKey> = world.raycast(front(), back()).iter().map(|h| h.node).collect();
        assert_eq!(order, vec![second, first, root]);

        world.set_as_last_sibling(first).unwrap();
        let order: Vec<NodeKey> = world.raycast(front(), back()).iter().map(|h| h.node).collect();
        assert_eq!(order, vec![first, second, root]);
    }

    #[test]
    fn test_highest_depth_with_hits_wins() {
        let (mut world, root, _) = world_with_canvas();
        let special = add_target(&mut world, 2, root);
        world.set_trace_channel(special, TraceChannel(1)).unwrap();
        world.force_update_layout();

        let high = world.add_raycaster(Raycaster::new(10, TraceChannel(1), RenderModeMask::all()));
        let hits = world.raycast(front(), back());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node, special);
        assert_eq!(hits[0].depth, 10);

        // Nothing on channel 1 any more: the lower depth gets its turn.
        world.set_raycaster_enabled(high, false).unwrap();
        let hits = world.raycast(front(), back());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node, root);
        assert_eq!(hits[0].depth, 0);
    }

    #[test]
    fn test_render_mode_mask_filters_surfaces() {
        let mut world = UiWorld::new();
        let root = world.on_attach(HostId(1), None).unwrap();
        world.add_surface(root, RenderMode::WorldSpaceCustom).unwrap();
        world.set_raycast_target(root, true).unwrap();
        world.add_raycaster(Raycaster::new(0, TraceChannel::default(), RenderModeMask::SCREEN_OVERLAY));
        assert!(world.raycast(front(), back()).is_empty());
        world.add_raycaster(Raycaster::new(0, TraceChannel::default(), RenderModeMask::WORLD_SPACE));
        assert_eq!(world.raycast(front(), back()).len(), 1);
    }

    #[test]
    fn test_rect_clip_rejects_hits() {
        let (mut world, _, surface) = world_with_canvas();
        world
            .set_clip(
                surface,
                ClipType::Rect {
                    left: 60.0,
                    right: 0.0,
                    bottom: 0.0,
                    top: 0.0,
                },
            )
            .unwrap();
        assert!(world.raycast(front(), back()).is_empty());
        assert!(world.is_point_visible(surface, &Vec3::new(0.0, 20.0, 0.0)));
        assert!(!world.is_point_visible(surface, &Vec3::new(0.0, 0.0, 0.0)));

        world.set_clip(surface, ClipType::None).unwrap();
        assert_eq!(world.raycast(front(), back()).len(), 1);
    }

    #[test]
    fn test_inherited_rect_clip() {
        let (mut world, root, outer) = world_with_canvas();
        let child = world.on_attach(HostId(2), Some(root)).unwrap();
        world.set_size_delta(child, Vec2::new(400.0, 400.0)).unwrap();
        world.force_update_layout();
        let inner = world.add_surface(child, RenderMode::ScreenOverlay).unwrap();
        world.set_clip(outer, ClipType::rect()).unwrap();
        world.set_clip(inner, ClipType::rect()).unwrap();

        let outside_outer = Vec3::new(0.0, 120.0, 0.0);
        assert!(!world.is_point_visible(inner, &outside_outer));
        world.set_inherit_rect_clip(inner, false).unwrap();
        assert!(world.is_point_visible(inner, &outside_outer));
    }

    #[test]
    fn test_raycast_hit_ui_prefers_mesh() {
        let (mut world, root, _) = world_with_canvas();
        world.set_raycast_target(root, false).unwrap();
        // Lower-left half of the rect only.
        let mesh = HitMesh::new(vec![[
            Vec2::new(-50.0, -50.0),
            Vec2::new(50.0, -50.0),
            Vec2::new(-50.0, 50.0),
        ]]);
        world.set_hit_mesh(root, Some(mesh)).unwrap();

        let upper_right = (Vec3::new(10.0, 30.0, 30.0), Vec3::new(-10.0, 30.0, 30.0));
        let lower_left = (Vec3::new(10.0, -30.0, -30.0), Vec3::new(-10.0, -30.0, -30.0));
        assert!(world.raycast_hit_ui(&[root], upper_right.0, upper_right.1).is_empty());
        let hits = world.raycast_hit_ui(&[root], lower_left.0, lower_left.1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].depth, 0);

        // Pointer raycasts ignore the mesh while the node tests its rect.
        world.set_raycast_target(root, true).unwrap();
        assert_eq!(world.raycast(upper_right.0, upper_right.1).len(), 1);
        world.set_raycast_type(root, RaycastType::Mesh).unwrap();
        assert!(world.raycast(upper_right.0, upper_right.1).is_empty());
    }

    #[test]
    fn test_ray_on_rect_edge_hits_and_passes_clip() {
        let (mut world, root, surface) = world_with_canvas();
        world.set_clip(surface, ClipType::rect()).unwrap();
        let hits = world.raycast(Vec3::new(10.0, 50.0, 0.0), Vec3::new(-10.0, 50.0, 0.0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node, root);
        assert!(world.raycast(Vec3::new(10.0, 50.5, 0.0), Vec3::new(-10.0, 50.5, 0.0)).is_empty());
    }

    #[test]
    fn test_hit_order_follows_root_canvas_order() {
        let mut world = UiWorld::new();
        world.add_raycaster(Raycaster::new(0, TraceChannel::default(), RenderModeMask::all()));
        let a = world.on_attach(HostId(1), None).unwrap();
        let sa = world.add_surface(a, RenderMode::ScreenOverlay).unwrap();
        world.on_attach(HostId(2), Some(a)).unwrap();
        let a2 = add_target(&mut world, 3, a);
        let b = world.on_attach(HostId(4), None).unwrap();
        let sb = world.add_surface(b, RenderMode::ScreenOverlay).unwrap();
        let b1 = add_target(&mut world, 5, b);
        world.tick(0.016);

        // Last in the bucket draws on top and is hit first.
        assert_eq!(world.get_canvas_bucket(RenderMode::ScreenOverlay), &[sa, sb]);
        let order: Vec<NodeKey> = world.raycast(front(), back()).iter().map(|h| h.node).collect();
        assert_eq!(order, vec![b1, a2]);

        world.set_as_last_sibling(a).unwrap();
        world.tick(0.016);
        assert_eq!(world.tree().roots(), &[b, a]);
        assert_eq!(world.get_canvas_bucket(RenderMode::ScreenOverlay), &[sb, sa]);
        let order: Vec<NodeKey> = world.raycast(front(), back()).iter().map(|h| h.node).collect();
        assert_eq!(order, vec![a2, b1]);
    }
}
