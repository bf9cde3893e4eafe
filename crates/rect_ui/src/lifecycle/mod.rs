//! Behaviours attached to UI nodes and their lifecycle
//!
//! A behaviour goes through `awake`, then `on_enable`/`on_disable` as its
//! node's effective active state flips, `start` once on the first tick after
//! it was enabled, `update` every tick while enabled and `on_destroy` when it
//! is removed. Hierarchy events reach every awoken behaviour on the target
//! node.

use crate::foundation::collections::{BehaviourKey, NodeKey, SecondaryMap, SlotMap};
use crate::hierarchy::HierarchyEvent;
use crate::world::UiWorld;

mod session;
mod update_set;

pub use session::{BulkSessions, Deferred};
pub use update_set::UpdateSet;

/// Access handed to lifecycle callbacks
pub struct BehaviourContext<'a> {
    /// World the behaviour lives in
    pub world: &'a mut UiWorld,
    /// Node the behaviour is attached to
    pub node: NodeKey,
    /// Handle of the running behaviour
    pub behaviour: BehaviourKey,
}

/// Per-node logic driven by the world
///
/// Every callback has an empty default body.
pub trait UiBehaviour {
    /// Called once when the behaviour is added
    fn awake(&mut self, _ctx: &mut BehaviourContext<'_>) {}

    /// Called when the behaviour becomes enabled
    fn on_enable(&mut self, _ctx: &mut BehaviourContext<'_>) {}

    /// Called when the behaviour becomes disabled
    fn on_disable(&mut self, _ctx: &mut BehaviourContext<'_>) {}

    /// Called once, on the first tick after the first enable
    fn start(&mut self, _ctx: &mut BehaviourContext<'_>) {}

    /// Called every tick while enabled
    fn update(&mut self, _ctx: &mut BehaviourContext<'_>, _delta_time: f32) {}

    /// Called before the behaviour is dropped
    fn on_destroy(&mut self, _ctx: &mut BehaviourContext<'_>) {}

    /// Called during the layout rebuild step for nodes queued with
    /// [`UiWorld::mark_rebuild_layout`]
    fn rebuild_layout(&mut self, _ctx: &mut BehaviourContext<'_>) {}

    /// Receive a hierarchy event; return `true` to stop it bubbling further
    fn on_hierarchy_event(&mut self, _world: &UiWorld, _node: NodeKey, _event: &HierarchyEvent) -> bool {
        false
    }
}

/// Lifecycle progress of a behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BehaviourState {
    /// `awake` has run
    pub awoken: bool,
    /// Currently enabled
    pub enabled: bool,
    /// `start` has run
    pub started: bool,
}

pub(crate) struct BehaviourSlot {
    pub(crate) node: NodeKey,
    // Taken out while one of its callbacks runs.
    pub(crate) behaviour: Option<Box<dyn UiBehaviour>>,
    pub(crate) state: BehaviourState,
    pub(crate) destroy_requested: bool,
}

/// Arena of behaviours plus the start queue and update set
#[derive(Default)]
pub struct Behaviours {
    slots: SlotMap<BehaviourKey, BehaviourSlot>,
    by_node: SecondaryMap<NodeKey, Vec<BehaviourKey>>,
    start_queue: Vec<BehaviourKey>,
    update_set: UpdateSet,
}

impl Behaviours {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live behaviours
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no behaviour is alive
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Lifecycle progress of a behaviour
    pub fn state(&self, key: BehaviourKey) -> Option<BehaviourState> {
        self.slots.get(key).map(|slot| slot.state)
    }

    /// Node a behaviour is attached to
    pub fn node_of(&self, key: BehaviourKey) -> Option<NodeKey> {
        self.slots.get(key).map(|slot| slot.node)
    }

    /// Behaviours attached to a node, in attach order
    pub fn on_node(&self, node: NodeKey) -> Vec<BehaviourKey> {
        self.by_node.get(node).cloned().unwrap_or_default()
    }

    /// Update-phase membership
    pub const fn update_set(&self) -> &UpdateSet {
        &self.update_set
    }

    pub(crate) fn update_set_mut(&mut self) -> &mut UpdateSet {
        &mut self.update_set
    }

    pub(crate) fn slot(&self, key: BehaviourKey) -> Option<&BehaviourSlot> {
        self.slots.get(key)
    }

    pub(crate) fn slot_mut(&mut self, key: BehaviourKey) -> Option<&mut BehaviourSlot> {
        self.slots.get_mut(key)
    }

    pub(crate) fn insert(&mut self, node: NodeKey, behaviour: Box<dyn UiBehaviour>) -> BehaviourKey {
        let key = self.slots.insert(BehaviourSlot {
            node,
            behaviour: Some(behaviour),
            state: BehaviourState::default(),
            destroy_requested: false,
        });
        match self.by_node.entry(node) {
            Some(entry) => entry.or_default().push(key),
            None => crate::foundation::logging::consistency_failure(&format!(
                "behaviour {key:?} attached to a node {node:?} that does not exist"
            )),
        }
        key
    }

    pub(crate) fn remove(&mut self, key: BehaviourKey) -> Option<BehaviourSlot> {
        let slot = self.slots.remove(key)?;
        if let Some(list) = self.by_node.get_mut(slot.node) {
            list.retain(|k| *k != key);
            if list.is_empty() {
                self.by_node.remove(slot.node);
            }
        }
        self.start_queue.retain(|k| *k != key);
        Some(slot)
    }

    pub(crate) fn take_box(&mut self, key: BehaviourKey) -> Option<Box<dyn UiBehaviour>> {
        self.slots.get_mut(key)?.behaviour.take()
    }

    /// Put a behaviour back after its callback; `false` if it was removed meanwhile
    pub(crate) fn put_back(&mut self, key: BehaviourKey, behaviour: Box<dyn UiBehaviour>) -> bool {
        match self.slots.get_mut(key) {
            Some(slot) => {
                slot.behaviour = Some(behaviour);
                true
            }
            None => false,
        }
    }

    pub(crate) fn queue_start(&mut self, key: BehaviourKey) {
        if !self.start_queue.contains(&key) {
            self.start_queue.push(key);
        }
    }

    pub(crate) fn take_start_queue(&mut self) -> Vec<BehaviourKey> {
        std::mem::take(&mut self.start_queue)
    }
}
