//! The per-world UI context
//!
//! [`UiWorld`] owns the node tree, canvas groups, surfaces, raycasters,
//! behaviours and bulk sessions of one host world. Every operation runs
//! through it; there is no global lookup.
//!
//! Mutations run to completion first and queue their hierarchy events on the
//! tree. The world then dispatches the queue FIFO, or parks an event in its
//! bulk session when the target node is tagged with an open one. While a
//! behaviour callback runs, dispatch waits until the callback returned so the
//! running behaviour is back in its slot and can receive the events too.

use crate::config::UiSettings;
use crate::error::{UiError, UiResult};
use crate::foundation::collections::{HostId, NodeKey, SessionId};
use crate::foundation::math::Vec3;
use crate::group::CanvasGroups;
use crate::hierarchy::{HierarchyEvent, LinkChange, Notification, Propagation, RaycastProps, UiNode, UiTree};
use crate::lifecycle::{Behaviours, BulkSessions, Deferred};
use crate::surface::{SurfaceRegistry, SurfaceRenderer};

mod behaviours;
mod canvas;
mod nodes;
mod raycast;
mod tick;

/// One UI world
pub struct UiWorld {
    settings: UiSettings,
    tree: UiTree,
    groups: CanvasGroups,
    registry: SurfaceRegistry,
    behaviours: Behaviours,
    sessions: BulkSessions,
    renderer: Option<Box<dyn SurfaceRenderer>>,
    rebuild_queue: Vec<NodeKey>,
    paused: bool,
    callback_depth: u32,
}

impl Default for UiWorld {
    fn default() -> Self {
        Self::with_settings(UiSettings::default())
    }
}

impl UiWorld {
    /// Create a world with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a world with the given settings
    pub fn with_settings(settings: UiSettings) -> Self {
        let registry = SurfaceRegistry::new(settings.warn_duplicate_raycasters);
        Self {
            settings,
            tree: UiTree::new(),
            groups: CanvasGroups::new(),
            registry,
            behaviours: Behaviours::new(),
            sessions: BulkSessions::new(),
            renderer: None,
            rebuild_queue: Vec::new(),
            paused: false,
            callback_depth: 0,
        }
    }

    /// Settings this world was created with
    pub const fn settings(&self) -> &UiSettings {
        &self.settings
    }

    /// Node tree (read-only)
    pub const fn tree(&self) -> &UiTree {
        &self.tree
    }

    /// Canvas groups (read-only)
    pub const fn groups(&self) -> &CanvasGroups {
        &self.groups
    }

    /// Surfaces and raycasters (read-only)
    pub const fn registry(&self) -> &SurfaceRegistry {
        &self.registry
    }

    /// Behaviours (read-only)
    pub const fn behaviours(&self) -> &Behaviours {
        &self.behaviours
    }

    /// Look up a node
    pub fn node(&self, key: NodeKey) -> Option<&UiNode> {
        self.tree.get(key)
    }

    /// Whether update callbacks are currently subject to pausing
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Pause or resume the world
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            log::debug!("ui world {}", if paused { "paused" } else { "resumed" });
            self.paused = paused;
        }
    }

    /// Attach the consumer of sorted surface members
    pub fn set_surface_renderer(&mut self, renderer: Option<Box<dyn SurfaceRenderer>>) {
        self.renderer = renderer;
    }

    // ------------------------------------------------------------------
    // Host hooks
    // ------------------------------------------------------------------

    /// Create a node for a host object under `parent`
    pub fn on_attach(&mut self, host: HostId, parent: Option<NodeKey>) -> UiResult<NodeKey> {
        self.attach(host, parent, None)
    }

    /// Create a node as part of an open bulk session
    ///
    /// Its events, sibling ordering and behaviour startup are held until
    /// [`UiWorld::end_bulk_session`].
    pub fn on_attach_in_session(
        &mut self,
        host: HostId,
        parent: Option<NodeKey>,
        session: SessionId,
    ) -> UiResult<NodeKey> {
        if !self.sessions.is_open(session) {
            return Err(UiError::SessionNotOpen(session).warn());
        }
        self.attach(host, parent, Some(session))
    }

    fn attach(&mut self, host: HostId, parent: Option<NodeKey>, session: Option<SessionId>) -> UiResult<NodeKey> {
        let raycast = RaycastProps::new(self.settings.default_trace_channel, self.settings.default_raycast_type);
        let (key, changes) = self.tree.insert(host, raycast, parent, session)?;
        log::debug!("attached node {key:?} for host {host:?} under {parent:?}");
        self.apply_link_changes(key, &changes);
        self.mark_hierarchy_sort_dirty(key);
        self.flush_events();
        Ok(key)
    }

    /// Destroy a node and its subtree
    ///
    /// Behaviours are disabled and destroyed first, then surfaces and groups
    /// owned by the removed nodes are unregistered.
    pub fn on_detach(&mut self, node: NodeKey) -> UiResult<()> {
        self.tree.node(node)?;
        let subtree = self.tree.preorder(node);
        for key in &subtree {
            for behaviour in self.behaviours.on_node(*key) {
                self.destroy_behaviour(behaviour);
            }
        }

        let parent_surface = self.tree.parent_of(node).and_then(|p| self.tree.get(p)?.render_surface());
        let removed = self.tree.remove_subtree(node)?;
        for (_, removed_node) in &removed {
            if let Some(surface) = removed_node.own_surface() {
                self.registry.remove(surface);
            }
            if let Some(group) = removed_node.own_group() {
                self.groups.remove(group);
            }
        }
        if let Some(surface) = parent_surface {
            self.registry.mark_members_dirty(surface);
        }
        self.rebuild_queue.retain(|k| self.tree.contains(*k));
        log::debug!("detached node {node:?} ({} nodes removed)", removed.len());
        self.flush_events();
        Ok(())
    }

    /// The host moved a node; store the relative location and rederive its anchors
    pub fn on_host_transform_changed(&mut self, node: NodeKey, relative_location: Vec3) -> UiResult<()> {
        if self.tree.apply_external_location(node, relative_location)? {
            self.tree.notify(
                node,
                HierarchyEvent::DimensionsChanged {
                    position_changed: true,
                    size_changed: false,
                },
            );
            self.flush_events();
        }
        Ok(())
    }

    /// Effective active state, as reported to the host
    pub fn on_host_active_state_queried(&self, node: NodeKey) -> bool {
        self.tree.get(node).is_some_and(UiNode::is_ui_active_in_hierarchy)
    }

    // ------------------------------------------------------------------
    // Derived-state maintenance
    // ------------------------------------------------------------------

    /// Apply the consequences of recomputed node links
    ///
    /// Re-links surfaces and groups owned inside the subtree, marks member
    /// lists dirty, broadcasts interaction changes and toggles behaviours.
    fn apply_link_changes(&mut self, subtree: NodeKey, changes: &[LinkChange]) {
        self.refresh_owned_links(subtree);

        for change in changes {
            if change.surface_changed() || change.active_changed() {
                for surface in [change.old_surface, change.new_surface].into_iter().flatten() {
                    self.registry.mark_members_dirty(surface);
                }
            }
            let owns_group = self.tree.get(change.node).and_then(UiNode::own_group).is_some();
            if change.group_changed() && !owns_group {
                let before = self.groups.final_interactable(change.old_group);
                let after = self.groups.final_interactable(change.new_group);
                if before != after {
                    self.tree
                        .notify(change.node, HierarchyEvent::InteractionStateChanged { interactable: after });
                }
            }
            if change.active_changed() {
                self.set_node_behaviours_enabled(change.node, change.is_active);
            }
        }
    }

    /// Point every surface and group owned inside `subtree` at the nearest one above it
    fn refresh_owned_links(&mut self, subtree: NodeKey) {
        for key in self.tree.preorder(subtree) {
            let Some(node) = self.tree.get(key) else {
                continue;
            };
            let (own_surface, own_group) = (node.own_surface(), node.own_group());
            let parent = self.tree.parent_of(key).and_then(|p| self.tree.get(p));
            let parent_surface = parent.and_then(UiNode::render_surface);
            let parent_group = parent.and_then(UiNode::canvas_group);

            if let Some(surface) = own_surface {
                self.registry.set_parent_surface(surface, parent_surface);
            }
            if let Some(group) = own_group {
                for change in self.groups.set_parent(group, parent_group) {
                    self.tree.notify(
                        change.node,
                        HierarchyEvent::InteractionStateChanged {
                            interactable: change.interactable,
                        },
                    );
                }
            }
        }
    }

    /// Flag the bucket of every surface in the hierarchy containing `node`
    fn mark_hierarchy_sort_dirty(&mut self, node: NodeKey) {
        let root = self.tree.root_of(node);
        let affected: Vec<_> = self
            .registry
            .iter()
            .filter(|(_, surface)| self.tree.contains(surface.node()) && self.tree.root_of(surface.node()) == root)
            .map(|(key, _)| key)
            .collect();
        for surface in affected {
            self.registry.mark_sort_dirty(surface);
        }
    }

    // ------------------------------------------------------------------
    // Event dispatch
    // ------------------------------------------------------------------

    /// Dispatch queued events, FIFO, unless a behaviour callback is running
    pub(crate) fn flush_events(&mut self) {
        if self.callback_depth > 0 {
            return;
        }
        while self.tree.has_notifications() {
            for notification in self.tree.take_notifications() {
                self.route(notification);
            }
        }
    }

    fn route(&mut self, notification: Notification) {
        let session = self.tree.get(notification.target).and_then(UiNode::session);
        if let Some(session) = session {
            if self.sessions.push(session, Deferred::Event(notification)) {
                return;
            }
        }
        self.dispatch(notification);
    }

    /// Deliver one event and bubble it per its propagation rule
    pub(crate) fn dispatch(&mut self, notification: Notification) {
        let Notification { target, event } = notification;
        if self.deliver(target, &event) {
            return;
        }
        match event.propagation() {
            Propagation::Stop => {}
            Propagation::Parent => {
                if let Some(parent) = self.tree.parent_of(target) {
                    self.deliver(parent, &event.as_seen_by_parent(target));
                }
            }
            Propagation::Ancestors => {
                let mut current = self.tree.parent_of(target);
                while let Some(ancestor) = current {
                    if self.deliver(ancestor, &event) {
                        break;
                    }
                    current = self.tree.parent_of(ancestor);
                }
            }
        }
    }

    /// Hand an event to the awoken behaviours of one node; `true` if consumed
    fn deliver(&mut self, node: NodeKey, event: &HierarchyEvent) -> bool {
        for key in self.behaviours.on_node(node) {
            if !self.behaviours.state(key).is_some_and(|s| s.awoken) {
                continue;
            }
            let Some(mut behaviour) = self.behaviours.take_box(key) else {
                continue;
            };
            self.callback_depth += 1;
            let consumed = behaviour.on_hierarchy_event(self, node, event);
            self.callback_depth -= 1;
            self.behaviours.put_back(key, behaviour);
            if consumed {
                return true;
            }
        }
        false
    }
}
