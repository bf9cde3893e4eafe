//! Hierarchy change events and their bubbling rules
//!
//! Every structural or geometric change in the tree is expressed as one
//! [`HierarchyEvent`] addressed to a node. How far an event travels up the
//! ancestor chain is data, not code: [`BUBBLING_RULES`] maps each event kind
//! to a [`Propagation`], and the dispatcher in the world walks parents
//! according to that table. A handler returning `true` consumes the event.

use crate::foundation::collections::NodeKey;

/// Change notification delivered to a node's behaviours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyEvent {
    /// The node's effective active state flipped
    ActiveInHierarchyChanged {
        /// New effective active state
        active: bool,
    },
    /// The node's resolved position and/or size changed
    DimensionsChanged {
        /// Relative location changed
        position_changed: bool,
        /// Width or height changed
        size_changed: bool,
    },
    /// The node was attached to or detached from a parent
    AttachmentChanged,
    /// The final interactable state of the node's canvas group flipped
    InteractionStateChanged {
        /// New final interactable state
        interactable: bool,
    },
    /// The nearest render surface of the node changed
    RenderSurfaceChanged,
    /// A child's effective active state flipped
    ChildActiveInHierarchyChanged {
        /// Child whose state flipped
        child: NodeKey,
        /// New effective active state of the child
        active: bool,
    },
    /// A child's dimensions changed
    ChildDimensionsChanged {
        /// Child that changed
        child: NodeKey,
        /// Relative location changed
        position_changed: bool,
        /// Width or height changed
        size_changed: bool,
    },
    /// A child was attached to or detached from this node's subtree
    ChildAttachmentChanged {
        /// Child that moved
        child: NodeKey,
        /// `true` on attach, `false` on detach
        attached: bool,
    },
    /// The sibling order under this node changed
    ChildHierarchyIndexChanged {
        /// Child whose index was set
        child: NodeKey,
    },
}

/// Discriminant of [`HierarchyEvent`] used to look up bubbling rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HierarchyEventKind {
    /// See [`HierarchyEvent::ActiveInHierarchyChanged`]
    ActiveInHierarchyChanged,
    /// See [`HierarchyEvent::DimensionsChanged`]
    DimensionsChanged,
    /// See [`HierarchyEvent::AttachmentChanged`]
    AttachmentChanged,
    /// See [`HierarchyEvent::InteractionStateChanged`]
    InteractionStateChanged,
    /// See [`HierarchyEvent::RenderSurfaceChanged`]
    RenderSurfaceChanged,
    /// See [`HierarchyEvent::ChildActiveInHierarchyChanged`]
    ChildActiveInHierarchyChanged,
    /// See [`HierarchyEvent::ChildDimensionsChanged`]
    ChildDimensionsChanged,
    /// See [`HierarchyEvent::ChildAttachmentChanged`]
    ChildAttachmentChanged,
    /// See [`HierarchyEvent::ChildHierarchyIndexChanged`]
    ChildHierarchyIndexChanged,
}

/// How far an event travels past its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Delivered to the target only
    Stop,
    /// Target, then the parent receives the child variant
    Parent,
    /// Target, then every ancestor until consumed
    Ancestors,
}

/// Bubbling rule per event kind
pub const BUBBLING_RULES: &[(HierarchyEventKind, Propagation)] = &[
    (HierarchyEventKind::ActiveInHierarchyChanged, Propagation::Parent),
    (HierarchyEventKind::DimensionsChanged, Propagation::Parent),
    (HierarchyEventKind::AttachmentChanged, Propagation::Stop),
    (HierarchyEventKind::InteractionStateChanged, Propagation::Stop),
    (HierarchyEventKind::RenderSurfaceChanged, Propagation::Stop),
    (HierarchyEventKind::ChildActiveInHierarchyChanged, Propagation::Stop),
    (HierarchyEventKind::ChildDimensionsChanged, Propagation::Stop),
    (HierarchyEventKind::ChildAttachmentChanged, Propagation::Ancestors),
    (HierarchyEventKind::ChildHierarchyIndexChanged, Propagation::Stop),
];

impl HierarchyEvent {
    /// Kind of this event
    pub const fn kind(&self) -> HierarchyEventKind {
        match self {
            Self::ActiveInHierarchyChanged { .. } => HierarchyEventKind::ActiveInHierarchyChanged,
            Self::DimensionsChanged { .. } => HierarchyEventKind::DimensionsChanged,
            Self::AttachmentChanged => HierarchyEventKind::AttachmentChanged,
            Self::InteractionStateChanged { .. } => HierarchyEventKind::InteractionStateChanged,
            Self::RenderSurfaceChanged => HierarchyEventKind::RenderSurfaceChanged,
            Self::ChildActiveInHierarchyChanged { .. } => {
                HierarchyEventKind::ChildActiveInHierarchyChanged
            }
            Self::ChildDimensionsChanged { .. } => HierarchyEventKind::ChildDimensionsChanged,
            Self::ChildAttachmentChanged { .. } => HierarchyEventKind::ChildAttachmentChanged,
            Self::ChildHierarchyIndexChanged { .. } => HierarchyEventKind::ChildHierarchyIndexChanged,
        }
    }

    /// Propagation rule from [`BUBBLING_RULES`]
    pub fn propagation(&self) -> Propagation {
        let kind = self.kind();
        BUBBLING_RULES
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(Propagation::Stop, |(_, p)| *p)
    }

    /// Event the parent receives when `origin` emits this event
    ///
    /// Child variants already name their child and travel unchanged.
    pub const fn as_seen_by_parent(&self, origin: NodeKey) -> Self {
        match *self {
            Self::ActiveInHierarchyChanged { active } => {
                Self::ChildActiveInHierarchyChanged { child: origin, active }
            }
            Self::DimensionsChanged {
                position_changed,
                size_changed,
            } => Self::ChildDimensionsChanged {
                child: origin,
                position_changed,
                size_changed,
            },
            Self::AttachmentChanged => Self::ChildAttachmentChanged {
                child: origin,
                attached: true,
            },
            other => other,
        }
    }
}

/// Event addressed to a node, waiting to be dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    /// Node the event is delivered to first
    pub target: NodeKey,
    /// The event
    pub event: HierarchyEvent,
}

impl Notification {
    /// Create a notification
    pub const fn new(target: NodeKey, event: HierarchyEvent) -> Self {
        Self { target, event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn key(n: u64) -> NodeKey {
        NodeKey::from(KeyData::from_ffi(n))
    }

    #[test]
    fn test_every_kind_has_a_rule() {
        let kinds = [
            HierarchyEventKind::ActiveInHierarchyChanged,
            HierarchyEventKind::DimensionsChanged,
            HierarchyEventKind::AttachmentChanged,
            HierarchyEventKind::InteractionStateChanged,
            HierarchyEventKind::RenderSurfaceChanged,
            HierarchyEventKind::ChildActiveInHierarchyChanged,
            HierarchyEventKind::ChildDimensionsChanged,
            HierarchyEventKind::ChildAttachmentChanged,
            HierarchyEventKind::ChildHierarchyIndexChanged,
        ];
        for kind in kinds {
            assert_eq!(BUBBLING_RULES.iter().filter(|(k, _)| *k == kind).count(), 1);
        }
    }

    #[test]
    fn test_self_events_become_child_events() {
        let child = key(1 << 32 | 1);
        let seen = HierarchyEvent::ActiveInHierarchyChanged { active: false }.as_seen_by_parent(child);
        assert_eq!(seen, HierarchyEvent::ChildActiveInHierarchyChanged { child, active: false });
        assert_eq!(seen.propagation(), Propagation::Stop);

        let seen = HierarchyEvent::DimensionsChanged {
            position_changed: true,
            size_changed: false,
        }
        .as_seen_by_parent(child);
        assert_eq!(seen.kind(), HierarchyEventKind::ChildDimensionsChanged);
    }

    #[test]
    fn test_child_attachment_walks_all_ancestors() {
        let child = key(1 << 32 | 2);
        let event = HierarchyEvent::ChildAttachmentChanged { child, attached: false };
        assert_eq!(event.propagation(), Propagation::Ancestors);
        assert_eq!(event.as_seen_by_parent(key(1 << 32 | 3)), event);
    }
}
