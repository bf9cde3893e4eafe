//! UI node data
//!
//! A node stores only authoritative state plus the caches the tree
//! maintains for it. Back-references (parent, surface, group) are arena keys.

use std::cell::Cell;

use crate::foundation::collections::{GroupKey, HostId, NodeKey, SessionId, SurfaceKey};
use crate::foundation::math::{Transform, Vec2};
use crate::raycast::{HitMesh, RaycastType, TraceChannel};
use crate::rect::{AnchorData, AnchorRect};

/// Hit-test configuration of a node
#[derive(Debug, Clone, PartialEq)]
pub struct RaycastProps {
    /// Whether pointer raycasts consider this node
    pub target: bool,
    /// Channel the node is traced on
    pub channel: TraceChannel,
    /// Rect or mesh test
    pub raycast_type: RaycastType,
    /// Local rect-plane triangles used by mesh tests
    pub mesh: Option<HitMesh>,
}

impl RaycastProps {
    /// Props for a node that is not a raycast target
    pub const fn new(channel: TraceChannel, raycast_type: RaycastType) -> Self {
        Self {
            target: false,
            channel,
            raycast_type,
            mesh: None,
        }
    }
}

/// One UI node in the hierarchy arena
#[derive(Debug)]
pub struct UiNode {
    pub(crate) host: HostId,
    pub(crate) name: String,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,
    pub(crate) hierarchy_index: i32,
    pub(crate) flatten_index: Cell<i32>,
    pub(crate) active_self: bool,
    pub(crate) all_up_parent_active: bool,
    pub(crate) own_surface: Option<SurfaceKey>,
    pub(crate) render_surface: Option<SurfaceKey>,
    pub(crate) own_group: Option<GroupKey>,
    pub(crate) canvas_group: Option<GroupKey>,
    pub(crate) rect: AnchorRect,
    pub(crate) transform: Transform,
    pub(crate) layout_dirty: bool,
    pub(crate) last_size: Option<Vec2>,
    pub(crate) raycast: RaycastProps,
    pub(crate) session: Option<SessionId>,
}

impl UiNode {
    pub(crate) fn new(host: HostId, raycast: RaycastProps) -> Self {
        Self {
            host,
            name: String::new(),
            parent: None,
            children: Vec::new(),
            hierarchy_index: -1,
            flatten_index: Cell::new(0),
            active_self: true,
            all_up_parent_active: true,
            own_surface: None,
            render_surface: None,
            own_group: None,
            canvas_group: None,
            rect: AnchorRect::new(AnchorData::default()),
            transform: Transform::identity(),
            layout_dirty: true,
            last_size: None,
            raycast,
            session: None,
        }
    }

    /// Host object this node is attached to
    pub const fn host(&self) -> HostId {
        self.host
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent node, if any
    pub const fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    /// Children in hierarchy order
    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    /// Index among siblings, `-1` while unassigned
    pub const fn hierarchy_index(&self) -> i32 {
        self.hierarchy_index
    }

    /// Declared active flag
    pub const fn is_ui_active_self(&self) -> bool {
        self.active_self
    }

    /// Cached conjunction of all ancestors' declared flags
    pub const fn all_up_parent_ui_active(&self) -> bool {
        self.all_up_parent_active
    }

    /// Effective active state
    pub const fn is_ui_active_in_hierarchy(&self) -> bool {
        self.active_self && self.all_up_parent_active
    }

    /// Surface owned by this node itself
    pub const fn own_surface(&self) -> Option<SurfaceKey> {
        self.own_surface
    }

    /// Nearest ancestor-or-self surface
    pub const fn render_surface(&self) -> Option<SurfaceKey> {
        self.render_surface
    }

    /// Group owned by this node itself
    pub const fn own_group(&self) -> Option<GroupKey> {
        self.own_group
    }

    /// Nearest ancestor-or-self canvas group
    pub const fn canvas_group(&self) -> Option<GroupKey> {
        self.canvas_group
    }

    /// Anchor rect of the node
    pub const fn rect(&self) -> &AnchorRect {
        &self.rect
    }

    /// Anchor data of the node
    pub fn anchor_data(&self) -> &AnchorData {
        self.rect.data()
    }

    /// Relative transform
    pub const fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Hit-test configuration
    pub const fn raycast(&self) -> &RaycastProps {
        &self.raycast
    }

    /// Bulk session this node belongs to
    pub const fn session(&self) -> Option<SessionId> {
        self.session
    }
}
