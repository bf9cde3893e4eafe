//! Handle types for the per-world arenas
//!
//! Every back-reference in the UI core (parent, owning surface, canvas group,
//! raycaster, behaviour) is one of these keys. A key whose slot has been
//! freed simply stops resolving; callers treat that as "absent", not as a bug.

pub use slotmap::{SecondaryMap, SlotMap};

slotmap::new_key_type! {
    /// Handle to a UI node in the hierarchy arena
    pub struct NodeKey;

    /// Handle to a render surface (canvas)
    pub struct SurfaceKey;

    /// Handle to a canvas group
    pub struct GroupKey;

    /// Handle to a registered raycaster
    pub struct RaycasterKey;

    /// Handle to a lifecycle behaviour
    pub struct BehaviourKey;
}

/// Opaque identifier of the host scene object a node is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HostId(pub u64);

/// Identifier of a bulk construction session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);
