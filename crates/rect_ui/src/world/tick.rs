//! Per-frame driver

use crate::foundation::collections::{BehaviourKey, NodeKey, SurfaceKey};
use crate::hierarchy::UiNode;

use super::UiWorld;

impl UiWorld {
    /// Advance the UI by one frame
    ///
    /// Runs, in order: pending `start` calls, `update` on every enabled
    /// behaviour, queued `rebuild_layout` calls, the layout pass with member
    /// list rebuilds, then bucket and drawcall sorting.
    pub fn tick(&mut self, delta_time: f32) {
        self.run_start_phase();
        self.run_update_phase(delta_time);
        self.run_rebuild_layout_phase();
        self.update_canvases();
        self.sort_surfaces();
    }

    fn run_start_phase(&mut self) {
        // Behaviours enabled by a `start` call start in the same phase.
        loop {
            let queue = self.behaviours.take_start_queue();
            if queue.is_empty() {
                break;
            }
            for key in queue {
                let Some(slot) = self.behaviours.slot_mut(key) else {
                    continue;
                };
                if !slot.state.enabled || slot.state.started {
                    continue;
                }
                slot.state.started = true;
                self.invoke(key, |behaviour, ctx| behaviour.start(ctx));
            }
        }
    }

    fn run_update_phase(&mut self, delta_time: f32) {
        let snapshot = self.behaviours.update_set_mut().begin_iteration();
        for key in snapshot {
            if !self.behaviours.update_set().contains(key) || !self.should_update(key) {
                continue;
            }
            self.invoke(key, |behaviour, ctx| behaviour.update(ctx, delta_time));
        }
        self.behaviours.update_set_mut().end_iteration();
    }

    fn should_update(&self, key: BehaviourKey) -> bool {
        let Some(state) = self.behaviours.state(key) else {
            return false;
        };
        // Enabled during this update phase: `start` runs first, next tick.
        if !state.enabled || !state.started {
            return false;
        }
        if !self.paused {
            return true;
        }
        let mode = self
            .behaviours
            .node_of(key)
            .and_then(|node| self.tree.get(node)?.render_surface())
            .and_then(|surface| self.registry.get(surface)?.render_mode());
        let affected = match mode {
            Some(mode) if mode.is_screen_space() => self.settings.screen_space_affected_by_pause,
            _ => self.settings.world_space_affected_by_pause,
        };
        !affected
    }

    fn run_rebuild_layout_phase(&mut self) {
        let mut queue = std::mem::take(&mut self.rebuild_queue);
        queue.retain(|node| self.tree.contains(*node));
        queue.sort_by_key(|node| std::cmp::Reverse(self.depth_of(*node)));
        for node in queue {
            for key in self.behaviours.on_node(node) {
                if self.behaviours.state(key).is_some_and(|s| s.enabled) {
                    self.invoke(key, |behaviour, ctx| behaviour.rebuild_layout(ctx));
                }
            }
        }
    }

    fn depth_of(&self, node: NodeKey) -> usize {
        let mut depth = 0;
        let mut current = self.tree.parent_of(node);
        while let Some(parent) = current {
            depth += 1;
            current = self.tree.parent_of(parent);
        }
        depth
    }

    fn update_canvases(&mut self) {
        if self.tree.update_layout() {
            log::trace!("layout pass moved or resized nodes");
        }
        self.flush_events();

        let dirty: Vec<SurfaceKey> = self
            .registry
            .iter()
            .filter(|(_, surface)| surface.members_dirty)
            .map(|(key, _)| key)
            .collect();
        for key in dirty {
            let members = self.collect_members(key);
            if let Ok(surface) = self.registry.surface_mut(key) {
                surface.members = members;
                surface.members_dirty = false;
            }
        }
    }

    /// Active nodes rendered by `surface`, in flatten order
    fn collect_members(&self, surface: SurfaceKey) -> Vec<NodeKey> {
        let Some(owner) = self.registry.get(surface).map(|s| s.node()) else {
            return Vec::new();
        };
        self.tree
            .preorder(owner)
            .into_iter()
            .filter(|key| {
                self.tree
                    .get(*key)
                    .is_some_and(|n| n.render_surface() == Some(surface) && UiNode::is_ui_active_in_hierarchy(n))
            })
            .collect()
    }

    fn sort_surfaces(&mut self) {
        let tree = &self.tree;
        let sorted_buckets = self.registry.sort_dirty_buckets(|node| tree.flatten_index(node));
        if !sorted_buckets.is_empty() {
            log::trace!("re-sorted surface buckets {sorted_buckets:?}");
        }

        let sorting = self
            .registry
            .drawcall_sorting_surfaces(|node| tree.get(node).is_some_and(UiNode::is_ui_active_in_hierarchy));
        for key in sorting {
            let sorted = self.registry.sort_drawcall(key, |node| tree.flatten_index(node));
            let Some(renderer) = self.renderer.as_mut() else {
                continue;
            };
            for surface in sorted {
                if let Some(render_surface) = self.registry.get(surface) {
                    renderer.rebuild_drawcalls(
                        surface,
                        render_surface.member_nodes(),
                        self.registry.actual_sort_order(surface),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UiSettings;
    use crate::foundation::collections::HostId;
    use crate::lifecycle::{BehaviourContext, UiBehaviour};
    use crate::surface::{RenderMode, SurfaceRenderer};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Counter {
        log: Log,
        name: &'static str,
    }

    impl UiBehaviour for Counter {
        fn start(&mut self, _ctx: &mut BehaviourContext<'_>) {
            self.log.borrow_mut().push(format!("{}:start", self.name));
        }
        fn update(&mut self, _ctx: &mut BehaviourContext<'_>, _delta_time: f32) {
            self.log.borrow_mut().push(format!("{}:update", self.name));
        }
        fn rebuild_layout(&mut self, _ctx: &mut BehaviourContext<'_>) {
            self.log.borrow_mut().push(format!("{}:rebuild", self.name));
        }
    }

    fn counter(name: &'static str, log: &Log) -> Box<Counter> {
        Box::new(Counter {
            log: Rc::clone(log),
            name,
        })
    }

    #[test]
    fn test_all_starts_run_before_updates() {
        let log = Log::default();
        let mut world = UiWorld::new();
        let a = world.on_attach(HostId(1), None).unwrap();
        let b = world.on_attach(HostId(2), None).unwrap();
        world.add_behaviour(a, counter("a", &log)).unwrap();
        world.add_behaviour(b, counter("b", &log)).unwrap();
        world.tick(0.016);
        assert_eq!(*log.borrow(), vec!["a:start", "b:start", "a:update", "b:update"]);
    }

    #[test]
    fn test_pause_skips_screen_space_only_by_default() {
        let log = Log::default();
        let mut world = UiWorld::new();
        let overlay = world.on_attach(HostId(1), None).unwrap();
        world.add_surface(overlay, RenderMode::ScreenOverlay).unwrap();
        let in_world = world.on_attach(HostId(2), None).unwrap();
        world.add_surface(in_world, RenderMode::WorldSpaceNative).unwrap();
        world.add_behaviour(overlay, counter("overlay", &log)).unwrap();
        world.add_behaviour(in_world, counter("world", &log)).unwrap();
        world.tick(0.016);
        log.borrow_mut().clear();

        world.set_paused(true);
        world.tick(0.016);
        assert_eq!(*log.borrow(), vec!["world:update"]);
    }

    #[test]
    fn test_pause_flags_from_settings() {
        let log = Log::default();
        let mut world = UiWorld::with_settings(UiSettings::new().with_pause_behaviour(false, true));
        let node = world.on_attach(HostId(1), None).unwrap();
        world.add_behaviour(node, counter("bare", &log)).unwrap();
        world.tick(0.016);
        log.borrow_mut().clear();

        world.set_paused(true);
        world.tick(0.016);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_rebuild_layout_runs_deepest_first() {
        let log = Log::default();
        let mut world = UiWorld::new();
        let root = world.on_attach(HostId(1), None).unwrap();
        let child = world.on_attach(HostId(2), Some(root)).unwrap();
        let grandchild = world.on_attach(HostId(3), Some(child)).unwrap();
        world.add_behaviour(root, counter("root", &log)).unwrap();
        world.add_behaviour(grandchild, counter("grandchild", &log)).unwrap();
        world.tick(0.016);
        log.borrow_mut().clear();

        world.mark_rebuild_layout(root).unwrap();
        world.mark_rebuild_layout(grandchild).unwrap();
        world.tick(0.016);
        assert_eq!(
            *log.borrow(),
            vec!["root:update", "grandchild:update", "grandchild:rebuild", "root:rebuild"]
        );
    }

    #[derive(Default)]
    struct Captured {
        calls: Vec<(SurfaceKey, Vec<NodeKey>, i32)>,
    }

    struct CapturingRenderer(Rc<RefCell<Captured>>);

    impl SurfaceRenderer for CapturingRenderer {
        fn rebuild_drawcalls(&mut self, surface: SurfaceKey, members: &[NodeKey], actual_sort_order: i32) {
            self.0.borrow_mut().calls.push((surface, members.to_vec(), actual_sort_order));
        }
    }

    #[test]
    fn test_members_follow_hierarchy_order_and_activity() {
        let captured = Rc::new(RefCell::new(Captured::default()));
        let mut world = UiWorld::new();
        world.set_surface_renderer(Some(Box::new(CapturingRenderer(Rc::clone(&captured)))));
        let root = world.on_attach(HostId(1), None).unwrap();
        let surface = world.add_surface(root, RenderMode::ScreenOverlay).unwrap();
        world.set_sort_order(surface, 3, false).unwrap();
        let a = world.on_attach(HostId(2), Some(root)).unwrap();
        let b = world.on_attach(HostId(3), Some(root)).unwrap();
        world.tick(0.016);
        assert_eq!(world.registry().get(surface).unwrap().member_nodes(), &[root, a, b]);
        assert_eq!(captured.borrow().calls.last().cloned(), Some((surface, vec![root, a, b], 3)));

        world.set_as_first_sibling(b).unwrap();
        world.set_ui_active(a, false).unwrap();
        world.tick(0.016);
        assert_eq!(world.registry().get(surface).unwrap().member_nodes(), &[root, b]);
    }

    #[test]
    fn test_equal_sort_orders_bucket_by_flatten_index() {
        let mut world = UiWorld::new();
        let root = world.on_attach(HostId(1), None).unwrap();
        let first = world.on_attach(HostId(2), Some(root)).unwrap();
        let second = world.on_attach(HostId(3), Some(root)).unwrap();
        let s_second = world.add_surface(second, RenderMode::ScreenOverlay).unwrap();
        let s_first = world.add_surface(first, RenderMode::ScreenOverlay).unwrap();
        world.tick(0.016);
        assert_eq!(world.get_canvas_bucket(RenderMode::ScreenOverlay), &[s_first, s_second]);
        world.tick(0.016);
        assert_eq!(world.get_canvas_bucket(RenderMode::ScreenOverlay), &[s_first, s_second]);

        world.set_as_first_sibling(second).unwrap();
        world.tick(0.016);
        assert_eq!(world.get_canvas_bucket(RenderMode::ScreenOverlay), &[s_second, s_first]);
    }
}
