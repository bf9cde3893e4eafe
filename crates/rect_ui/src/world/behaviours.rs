//! Behaviour lifecycle and bulk sessions

use crate::error::{UiError, UiResult};
use crate::foundation::collections::{BehaviourKey, NodeKey, SessionId};
use crate::hierarchy::UiNode;
use crate::lifecycle::{BehaviourContext, BehaviourState, Deferred, UiBehaviour};

use super::UiWorld;

impl UiWorld {
    /// Attach a behaviour to a node
    ///
    /// `awake` runs immediately, followed by `on_enable` if the node is
    /// effectively active. Both wait for the end of the session when the node
    /// belongs to an open bulk session.
    pub fn add_behaviour(&mut self, node: NodeKey, behaviour: Box<dyn UiBehaviour>) -> UiResult<BehaviourKey> {
        let session = self.tree.node(node)?.session();
        let key = self.behaviours.insert(node, behaviour);

        if let Some(session) = session {
            if self.sessions.push(session, Deferred::Awake(key)) {
                self.sessions.push(session, Deferred::Enable(key));
                return Ok(key);
            }
        }
        self.run_awake(key);
        if self.on_host_active_state_queried(node) {
            self.run_enable(key);
        }
        Ok(key)
    }

    /// Disable, destroy and drop a behaviour
    ///
    /// A behaviour removing itself from inside one of its callbacks is
    /// destroyed once that callback returns.
    pub fn remove_behaviour(&mut self, key: BehaviourKey) -> UiResult<()> {
        let Some(slot) = self.behaviours.slot_mut(key) else {
            return Err(UiError::StaleBehaviour(key).warn());
        };
        if slot.behaviour.is_none() {
            slot.destroy_requested = true;
            return Ok(());
        }
        self.destroy_behaviour(key);
        Ok(())
    }

    /// Lifecycle progress of a behaviour
    pub fn behaviour_state(&self, key: BehaviourKey) -> Option<BehaviourState> {
        self.behaviours.state(key)
    }

    pub(crate) fn destroy_behaviour(&mut self, key: BehaviourKey) {
        let Some(state) = self.behaviours.state(key) else {
            return;
        };
        if self.behaviours.slot(key).is_some_and(|slot| slot.behaviour.is_none()) {
            if let Some(slot) = self.behaviours.slot_mut(key) {
                slot.destroy_requested = true;
            }
            return;
        }
        if state.enabled {
            self.run_disable(key);
        }
        if state.awoken {
            self.invoke(key, |behaviour, ctx| behaviour.on_destroy(ctx));
        }
        self.behaviours.remove(key);
        log::debug!("behaviour {key:?} destroyed");
    }

    /// Run one callback with the behaviour taken out of its slot
    ///
    /// Returns `false` when the behaviour does not resolve or is already
    /// running.
    pub(crate) fn invoke(
        &mut self,
        key: BehaviourKey,
        call: impl FnOnce(&mut dyn UiBehaviour, &mut BehaviourContext<'_>),
    ) -> bool {
        let Some(node) = self.behaviours.node_of(key) else {
            return false;
        };
        let Some(mut behaviour) = self.behaviours.take_box(key) else {
            return false;
        };

        self.callback_depth += 1;
        {
            let mut ctx = BehaviourContext {
                world: self,
                node,
                behaviour: key,
            };
            call(behaviour.as_mut(), &mut ctx);
        }
        self.callback_depth -= 1;

        if self.behaviours.put_back(key, behaviour)
            && self.behaviours.slot(key).is_some_and(|slot| slot.destroy_requested)
        {
            self.destroy_behaviour(key);
        }
        self.flush_events();
        true
    }

    pub(crate) fn run_awake(&mut self, key: BehaviourKey) {
        let Some(slot) = self.behaviours.slot_mut(key) else {
            return;
        };
        if slot.state.awoken {
            return;
        }
        slot.state.awoken = true;
        self.invoke(key, |behaviour, ctx| behaviour.awake(ctx));
    }

    pub(crate) fn run_enable(&mut self, key: BehaviourKey) {
        let Some(slot) = self.behaviours.slot_mut(key) else {
            return;
        };
        if !slot.state.awoken || slot.state.enabled {
            return;
        }
        slot.state.enabled = true;
        let started = slot.state.started;
        if !started {
            self.behaviours.queue_start(key);
        }
        // A failed add has already been logged.
        let _ = self.behaviours.update_set_mut().add(key);
        self.invoke(key, |behaviour, ctx| behaviour.on_enable(ctx));
    }

    pub(crate) fn run_disable(&mut self, key: BehaviourKey) {
        let Some(slot) = self.behaviours.slot_mut(key) else {
            return;
        };
        if !slot.state.enabled {
            return;
        }
        slot.state.enabled = false;
        let _ = self.behaviours.update_set_mut().remove(key);
        self.invoke(key, |behaviour, ctx| behaviour.on_disable(ctx));
    }

    /// Enable or disable every awoken behaviour of a node
    pub(crate) fn set_node_behaviours_enabled(&mut self, node: NodeKey, enabled: bool) {
        for key in self.behaviours.on_node(node) {
            if enabled {
                self.run_enable(key);
            } else {
                self.run_disable(key);
            }
        }
    }

    // ------------------------------------------------------------------
    // Bulk sessions
    // ------------------------------------------------------------------

    /// Open a bulk construction session
    pub fn begin_bulk_session(&mut self, id: SessionId) -> UiResult<()> {
        self.sessions.begin(id)
    }

    /// Tag an existing subtree with an open session
    pub fn set_node_session(&mut self, node: NodeKey, id: SessionId) -> UiResult<()> {
        self.tree.node(node)?;
        if !self.sessions.is_open(id) {
            return Err(UiError::SessionNotOpen(id).warn());
        }
        self.tree.set_session(node, Some(id));
        Ok(())
    }

    /// Close a session: resolve deferred sibling order, then replay the
    /// parked events and lifecycle calls in the order they were queued
    pub fn end_bulk_session(&mut self, id: SessionId) -> UiResult<()> {
        let deferred = self.sessions.end(id)?;
        for node in self.tree.nodes_in_session(id) {
            if let Ok(node) = self.tree.node_mut(node) {
                node.session = None;
            }
        }
        self.tree.finalize_session(id);
        let surfaces: Vec<_> = self.registry.iter().map(|(key, _)| key).collect();
        for surface in surfaces {
            self.registry.mark_sort_dirty(surface);
            self.registry.mark_members_dirty(surface);
        }

        self.callback_depth += 1;
        for item in deferred {
            match item {
                Deferred::Event(notification) => self.dispatch(notification),
                Deferred::Awake(key) => self.run_awake(key),
                Deferred::Enable(key) => {
                    let active = self
                        .behaviours
                        .node_of(key)
                        .and_then(|node| self.tree.get(node))
                        .is_some_and(UiNode::is_ui_active_in_hierarchy);
                    if active {
                        self.run_enable(key);
                    }
                }
            }
        }
        self.callback_depth -= 1;
        self.flush_events();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::HostId;
    use crate::hierarchy::HierarchyEvent;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
    }

    impl Recorder {
        fn boxed(name: &'static str, log: &Log) -> Box<Self> {
            Box::new(Self {
                name,
                log: Rc::clone(log),
            })
        }

        fn record(&self, what: &str) {
            self.log.borrow_mut().push(format!("{}:{what}", self.name));
        }
    }

    impl UiBehaviour for Recorder {
        fn awake(&mut self, _ctx: &mut BehaviourContext<'_>) {
            self.record("awake");
        }
        fn on_enable(&mut self, _ctx: &mut BehaviourContext<'_>) {
            self.record("enable");
        }
        fn on_disable(&mut self, _ctx: &mut BehaviourContext<'_>) {
            self.record("disable");
        }
        fn start(&mut self, _ctx: &mut BehaviourContext<'_>) {
            self.record("start");
        }
        fn update(&mut self, _ctx: &mut BehaviourContext<'_>, _delta_time: f32) {
            self.record("update");
        }
        fn on_destroy(&mut self, _ctx: &mut BehaviourContext<'_>) {
            self.record("destroy");
        }
        fn on_hierarchy_event(&mut self, _world: &UiWorld, _node: NodeKey, event: &HierarchyEvent) -> bool {
            if let HierarchyEvent::AttachmentChanged = event {
                self.record("attached");
            }
            false
        }
    }

    fn take(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.borrow_mut())
    }

    #[test]
    fn test_lifecycle_order() {
        let log = Log::default();
        let mut world = UiWorld::new();
        let node = world.on_attach(HostId(1), None).unwrap();
        let key = world.add_behaviour(node, Recorder::boxed("a", &log)).unwrap();
        assert_eq!(take(&log), vec!["a:awake", "a:enable"]);

        world.tick(0.016);
        world.tick(0.016);
        assert_eq!(take(&log), vec!["a:start", "a:update", "a:update"]);

        world.set_ui_active(node, false).unwrap();
        world.tick(0.016);
        assert_eq!(take(&log), vec!["a:disable"]);

        world.set_ui_active(node, true).unwrap();
        world.tick(0.016);
        assert_eq!(take(&log), vec!["a:enable", "a:update"]);

        world.remove_behaviour(key).unwrap();
        assert_eq!(take(&log), vec!["a:disable", "a:destroy"]);
        assert_eq!(world.remove_behaviour(key), Err(UiError::StaleBehaviour(key)));
    }

    #[test]
    fn test_behaviour_on_inactive_node_waits_for_enable() {
        let log = Log::default();
        let mut world = UiWorld::new();
        let parent = world.on_attach(HostId(1), None).unwrap();
        let child = world.on_attach(HostId(2), Some(parent)).unwrap();
        world.set_ui_active(parent, false).unwrap();

        world.add_behaviour(child, Recorder::boxed("c", &log)).unwrap();
        world.tick(0.016);
        assert_eq!(take(&log), vec!["c:awake"]);

        world.set_ui_active(parent, true).unwrap();
        world.tick(0.016);
        assert_eq!(take(&log), vec!["c:enable", "c:start", "c:update"]);
    }

    #[test]
    fn test_detach_destroys_behaviours() {
        let log = Log::default();
        let mut world = UiWorld::new();
        let parent = world.on_attach(HostId(1), None).unwrap();
        let child = world.on_attach(HostId(2), Some(parent)).unwrap();
        world.add_behaviour(child, Recorder::boxed("c", &log)).unwrap();
        take(&log);

        world.on_detach(parent).unwrap();
        assert_eq!(take(&log), vec!["c:disable", "c:destroy"]);
        assert!(world.behaviours().is_empty());
    }

    #[test]
    fn test_session_defers_awake_and_events() {
        let log = Log::default();
        let mut world = UiWorld::new();
        let root = world.on_attach(HostId(1), None).unwrap();
        world.add_behaviour(root, Recorder::boxed("root", &log)).unwrap();
        let session = SessionId(9);
        world.begin_bulk_session(session).unwrap();

        let node = world.on_attach_in_session(HostId(2), Some(root), session).unwrap();
        world.add_behaviour(node, Recorder::boxed("n", &log)).unwrap();
        assert_eq!(take(&log), vec!["root:awake", "root:enable"]);

        world.end_bulk_session(session).unwrap();
        assert_eq!(take(&log), vec!["n:awake", "n:enable"]);
        assert_eq!(world.end_bulk_session(session), Err(UiError::SessionNotOpen(session)));
        assert_eq!(world.on_attach_in_session(HostId(3), None, session), Err(UiError::SessionNotOpen(session)));
    }

    struct SelfRemover;

    impl UiBehaviour for SelfRemover {
        fn update(&mut self, ctx: &mut BehaviourContext<'_>, _delta_time: f32) {
            let key = ctx.behaviour;
            ctx.world.remove_behaviour(key).unwrap();
        }
    }

    #[test]
    fn test_self_removal_during_update() {
        let mut world = UiWorld::new();
        let node = world.on_attach(HostId(1), None).unwrap();
        let key = world.add_behaviour(node, Box::new(SelfRemover)).unwrap();
        world.tick(0.016);
        assert!(world.behaviour_state(key).is_none());
        assert!(world.behaviours().update_set().is_empty());
    }
}
