//! Pointer raycasting across render surfaces
//!
//! Raycasters are tried from the highest depth down. All raycasters sharing
//! the depth that first produced hits are traced; lower depths are skipped.
//! Hits are ordered the way they are drawn: topmost first.

use std::collections::HashSet;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::foundation::collections::{NodeKey, SurfaceKey};
use crate::foundation::math::Vec3;
use crate::surface::RenderMode;

mod geometry;

pub use geometry::{HitMesh, LocalRect, LocalSegment, Ray, SegmentHit, Triangle};

/// Trace channel a node or raycaster belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TraceChannel(pub u8);

impl TraceChannel {
    /// Number of valid channels
    pub const COUNT: u8 = 32;

    /// Whether the channel index is in range
    pub const fn is_valid(self) -> bool {
        self.0 < Self::COUNT
    }
}

/// Hit-test precision of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RaycastType {
    /// Test against the node's rect
    #[default]
    Rect,
    /// Test against the node's hit mesh, inside its rect
    Mesh,
}

bitflags! {
    /// Render modes a raycaster traces into
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RenderModeMask: u8 {
        /// Screen-overlay surfaces
        const SCREEN_OVERLAY = 1 << 0;
        /// World-space surfaces drawn by the engine renderer
        const WORLD_SPACE_NATIVE = 1 << 1;
        /// World-space surfaces drawn by the UI renderer
        const WORLD_SPACE_CUSTOM = 1 << 2;
        /// Render-target surfaces
        const RENDER_TARGET = 1 << 3;
        /// Every world-space mode
        const WORLD_SPACE = Self::WORLD_SPACE_NATIVE.bits() | Self::WORLD_SPACE_CUSTOM.bits();
    }
}

impl RenderModeMask {
    /// Mask with a single mode
    pub const fn of(mode: RenderMode) -> Self {
        match mode {
            RenderMode::ScreenOverlay => Self::SCREEN_OVERLAY,
            RenderMode::WorldSpaceNative => Self::WORLD_SPACE_NATIVE,
            RenderMode::WorldSpaceCustom => Self::WORLD_SPACE_CUSTOM,
            RenderMode::RenderTarget => Self::RENDER_TARGET,
        }
    }

    /// Whether the mask includes `mode`
    pub const fn accepts(self, mode: RenderMode) -> bool {
        self.contains(Self::of(mode))
    }
}

/// A registered ray source
#[derive(Debug, Clone, PartialEq)]
pub struct Raycaster {
    /// Priority; higher depths are traced first
    pub depth: i32,
    /// Only nodes on this channel are tested
    pub trace_channel: TraceChannel,
    /// Surface render modes this raycaster can hit
    pub target_modes: RenderModeMask,
    /// Disabled raycasters are skipped
    pub enabled: bool,
}

impl Raycaster {
    /// Create an enabled raycaster
    pub const fn new(depth: i32, trace_channel: TraceChannel, target_modes: RenderModeMask) -> Self {
        Self {
            depth,
            trace_channel,
            target_modes,
            enabled: true,
        }
    }
}

/// One hit produced by a raycast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UiHit {
    /// Node that was hit
    pub node: NodeKey,
    /// Surface rendering the node
    pub surface: SurfaceKey,
    /// Distance from the segment start
    pub distance: f32,
    /// Hit point in world space
    pub world_point: Vec3,
    /// Surface normal in world space
    pub world_normal: Vec3,
    /// Hit point in the node's local space
    pub local_point: Vec3,
    /// Depth of the raycaster that produced the hit (0 for direct queries)
    pub depth: i32,
    /// Effective sort order of the surface at hit time
    pub sort_order: i32,
    /// Flatten index of the node at hit time
    pub flatten_index: i32,
}

/// Put hits into visual stacking order and drop repeated nodes
///
/// Higher sort order first, then higher flatten index, then nearer hits.
pub fn sort_hits(hits: &mut Vec<UiHit>) {
    hits.sort_by(|a, b| {
        b.sort_order
            .cmp(&a.sort_order)
            .then(b.flatten_index.cmp(&a.flatten_index))
            .then(a.distance.total_cmp(&b.distance))
    });
    let mut seen = HashSet::new();
    hits.retain(|hit| seen.insert(hit.node));
}

/// Pick the hit at `index` and advance it, wrapping around
///
/// Repeated clicks at the same spot select successively deeper nodes.
pub fn cycle_hit<'a>(hits: &'a [UiHit], index: &mut usize) -> Option<&'a UiHit> {
    if hits.is_empty() {
        *index = 0;
        return None;
    }
    if *index >= hits.len() {
        *index = 0;
    }
    let hit = &hits[*index];
    *index = (*index + 1) % hits.len();
    Some(hit)
}
