//! UI hierarchy: node arena, sibling order, flatten index, active state
//! propagation and change events

pub mod events;
pub mod node;
pub mod tree;

pub use events::{HierarchyEvent, HierarchyEventKind, Notification, Propagation, BUBBLING_RULES};
pub use node::{RaycastProps, UiNode};
pub use tree::{LinkChange, UiTree};
