//! Render surfaces (canvases)
//!
//! A surface batches one hierarchy subtree into a renderable unit. Nested
//! surfaces inherit their parent's sort order unless they override sorting;
//! only root and override surfaces sort drawcalls.

use serde::{Deserialize, Serialize};

use crate::foundation::collections::{NodeKey, SurfaceKey};

mod registry;

pub use registry::{SurfaceRegistry, ViewExtension};

/// Render-mode classification of a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderMode {
    /// Drawn over the viewport
    ScreenOverlay,
    /// Drawn in the world by the engine's own renderer
    WorldSpaceNative,
    /// Drawn in the world by the UI renderer
    WorldSpaceCustom,
    /// Drawn into an offscreen render target
    RenderTarget,
}

impl RenderMode {
    /// All modes, in bucket order
    pub const ALL: [Self; 4] = [
        Self::ScreenOverlay,
        Self::WorldSpaceNative,
        Self::WorldSpaceCustom,
        Self::RenderTarget,
    ];

    /// Bucket index of this mode
    pub const fn bucket(self) -> usize {
        match self {
            Self::ScreenOverlay => 0,
            Self::WorldSpaceNative => 1,
            Self::WorldSpaceCustom => 2,
            Self::RenderTarget => 3,
        }
    }

    /// Whether surfaces of this mode live in screen space
    pub const fn is_screen_space(self) -> bool {
        matches!(self, Self::ScreenOverlay)
    }
}

/// Clipping applied to a surface's content
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ClipType {
    /// No clipping
    #[default]
    None,
    /// Clip to the surface node's rect shrunk by the given insets
    Rect {
        /// Inset from the left edge
        left: f32,
        /// Inset from the right edge
        right: f32,
        /// Inset from the bottom edge
        bottom: f32,
        /// Inset from the top edge
        top: f32,
    },
}

impl ClipType {
    /// Rect clip with no insets
    pub const fn rect() -> Self {
        Self::Rect {
            left: 0.0,
            right: 0.0,
            bottom: 0.0,
            top: 0.0,
        }
    }
}

/// One render surface
#[derive(Debug)]
pub struct RenderSurface {
    pub(crate) node: NodeKey,
    pub(crate) render_mode: Option<RenderMode>,
    pub(crate) sort_order: i32,
    pub(crate) override_sorting: bool,
    pub(crate) parent_surface: Option<SurfaceKey>,
    pub(crate) members: Vec<NodeKey>,
    pub(crate) members_dirty: bool,
    pub(crate) clip: ClipType,
    pub(crate) inherit_rect_clip: bool,
    pub(crate) drawcall_generation: u64,
}

impl RenderSurface {
    pub(crate) fn new(node: NodeKey) -> Self {
        Self {
            node,
            render_mode: None,
            sort_order: 0,
            override_sorting: false,
            parent_surface: None,
            members: Vec::new(),
            members_dirty: true,
            clip: ClipType::None,
            inherit_rect_clip: true,
            drawcall_generation: 0,
        }
    }

    /// Node owning this surface
    pub const fn node(&self) -> NodeKey {
        self.node
    }

    /// Classification, `None` until first classified
    pub const fn render_mode(&self) -> Option<RenderMode> {
        self.render_mode
    }

    /// Explicit sort order
    pub const fn sort_order(&self) -> i32 {
        self.sort_order
    }

    /// Whether this surface ignores its parent's sort order
    pub const fn override_sorting(&self) -> bool {
        self.override_sorting
    }

    /// Nearest surface above this one
    pub const fn parent_surface(&self) -> Option<SurfaceKey> {
        self.parent_surface
    }

    /// Whether no surface exists above this one
    pub const fn is_root_surface(&self) -> bool {
        self.parent_surface.is_none()
    }

    /// Whether this surface sorts its own drawcalls
    pub const fn sorts_drawcalls(&self) -> bool {
        self.is_root_surface() || self.override_sorting
    }

    /// Member nodes, in drawcall order after the last sort
    pub fn member_nodes(&self) -> &[NodeKey] {
        &self.members
    }

    /// Clip settings
    pub const fn clip(&self) -> ClipType {
        self.clip
    }

    /// Whether rect clipping also applies the parent surface's rect clip
    pub const fn inherit_rect_clip(&self) -> bool {
        self.inherit_rect_clip
    }

    /// Number of drawcall sorts performed so far
    pub const fn drawcall_generation(&self) -> u64 {
        self.drawcall_generation
    }
}

/// Consumer of sorted member lists (mesh batching lives outside this crate)
pub trait SurfaceRenderer {
    /// Called after a surface's members were put into drawcall order
    fn rebuild_drawcalls(&mut self, surface: SurfaceKey, members: &[NodeKey], actual_sort_order: i32);
}
