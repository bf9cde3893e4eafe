//! # Rect UI
//!
//! Retained-mode UI core for a host scene graph: anchored rect transforms,
//! hierarchy bookkeeping, canvas groups, render surface sorting and pointer
//! raycasting.
//!
//! ## Features
//!
//! - **Anchored rects**: pivot, anchors, anchored position and size delta on the local YZ plane
//! - **Hierarchy**: sibling order, lazy flatten index, effective active state
//! - **Canvas groups**: compound alpha and interactability
//! - **Render surfaces**: four render-mode buckets, inherited sort orders, drawcall ordering
//! - **Raycasting**: depth-ordered raycasters, rect and mesh hit tests, rect clipping
//! - **Behaviours**: awake/enable/start/update lifecycle with bulk construction sessions
//!
//! ## Quick Start
//!
//! ```rust
//! use rect_ui::prelude::*;
//!
//! let mut world = UiWorld::new();
//! let canvas = world.on_attach(HostId(1), None).unwrap();
//! world.add_surface(canvas, RenderMode::ScreenOverlay).unwrap();
//! let button = world.on_attach(HostId(2), Some(canvas)).unwrap();
//! world.set_size_delta(button, Vec2::new(40.0, 20.0)).unwrap();
//! world.set_raycast_target(button, true).unwrap();
//! world.add_raycaster(Raycaster::new(0, TraceChannel::default(), RenderModeMask::all()));
//!
//! world.tick(1.0 / 60.0);
//! let hits = world.raycast(Vec3::new(10.0, 0.0, 0.0), Vec3::new(-10.0, 0.0, 0.0));
//! assert_eq!(hits[0].node, button);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod rect;
pub mod hierarchy;
pub mod group;
pub mod surface;
pub mod raycast;
pub mod lifecycle;
pub mod world;

mod error;

pub use error::{UiError, UiResult};
pub use world::UiWorld;

/// Common imports for UI users
pub mod prelude {
    pub use crate::{
        UiError, UiResult, UiWorld,
        config::{Config, UiSettings},
        foundation::{
            collections::{BehaviourKey, GroupKey, HostId, NodeKey, RaycasterKey, SessionId, SurfaceKey},
            math::{Quat, Transform, Vec2, Vec3},
        },
        hierarchy::HierarchyEvent,
        lifecycle::{BehaviourContext, UiBehaviour},
        raycast::{cycle_hit, HitMesh, RaycastType, Raycaster, RenderModeMask, TraceChannel, UiHit},
        rect::AnchorData,
        surface::{ClipType, RenderMode, SurfaceRenderer, ViewExtension},
    };
}

#[cfg(test)]
mod tests;
