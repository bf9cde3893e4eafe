//! Per-world registry of surfaces and raycasters
//!
//! Surfaces are classified into four render-mode buckets. Each bucket has
//! its own dirty flag and is re-sorted at most once per tick by
//! `(actual sort order, flatten index of the surface node)`, ascending.

use crate::error::{UiError, UiResult};
use crate::foundation::collections::{NodeKey, RaycasterKey, SlotMap, SurfaceKey};
use crate::foundation::logging::consistency_failure;
use crate::raycast::Raycaster;

use super::{RenderMode, RenderSurface};

const DUPLICATE_RAYCASTER_GUIDANCE: &str = "\
Detected multiple raycasters with the same depth and trace channel; this may cause wrong interaction results \
(e.g. clicking object A but hitting object B). Raycasters with the same depth are all traced and their hits \
sorted by distance. Raycasters with different depths are traced from highest depth to lowest, and tracing \
stops at the first depth that hits anything.";

/// Observer of bucket re-sorts (e.g. a view extension ordering its render passes)
pub trait ViewExtension {
    /// Called after a bucket was re-sorted
    fn on_priorities_changed(&mut self, mode: RenderMode, ordered: &[SurfaceKey]);
}

/// Surface buckets and raycaster list of one world
#[derive(Default)]
pub struct SurfaceRegistry {
    surfaces: SlotMap<SurfaceKey, RenderSurface>,
    buckets: [Vec<SurfaceKey>; 4],
    bucket_dirty: [bool; 4],
    raycasters: SlotMap<RaycasterKey, Raycaster>,
    raycaster_order: Vec<RaycasterKey>,
    view_extension: Option<Box<dyn ViewExtension>>,
    warn_duplicate_raycasters: bool,
}

impl SurfaceRegistry {
    /// Create an empty registry
    pub fn new(warn_duplicate_raycasters: bool) -> Self {
        Self {
            warn_duplicate_raycasters,
            ..Self::default()
        }
    }

    /// Attach an observer for bucket re-sorts
    pub fn set_view_extension(&mut self, extension: Option<Box<dyn ViewExtension>>) {
        self.view_extension = extension;
    }

    // ------------------------------------------------------------------
    // Surfaces
    // ------------------------------------------------------------------

    /// Look up a surface
    pub fn get(&self, key: SurfaceKey) -> Option<&RenderSurface> {
        self.surfaces.get(key)
    }

    pub(crate) fn surface_mut(&mut self, key: SurfaceKey) -> UiResult<&mut RenderSurface> {
        self.surfaces.get_mut(key).ok_or_else(|| UiError::StaleSurface(key).warn())
    }

    /// Iterate all surfaces
    pub fn iter(&self) -> impl Iterator<Item = (SurfaceKey, &RenderSurface)> {
        self.surfaces.iter()
    }

    pub(crate) fn insert(&mut self, node: NodeKey) -> SurfaceKey {
        self.surfaces.insert(RenderSurface::new(node))
    }

    pub(crate) fn remove(&mut self, key: SurfaceKey) -> Option<RenderSurface> {
        let surface = self.surfaces.remove(key)?;
        if let Some(mode) = surface.render_mode {
            let bucket = &mut self.buckets[mode.bucket()];
            match bucket.iter().position(|s| *s == key) {
                Some(position) => {
                    bucket.remove(position);
                }
                None => consistency_failure(&format!("surface {key:?}: not exist in {mode:?} bucket")),
            }
        }
        Some(surface)
    }

    /// Surfaces of one render mode in their last sorted order
    pub fn bucket(&self, mode: RenderMode) -> &[SurfaceKey] {
        &self.buckets[mode.bucket()]
    }

    /// Whether a bucket waits for re-sorting
    pub const fn is_bucket_dirty(&self, mode: RenderMode) -> bool {
        self.bucket_dirty[mode.bucket()]
    }

    /// Classify a surface, moving it between buckets
    ///
    /// Returns whether the classification changed.
    pub fn set_render_mode(&mut self, key: SurfaceKey, mode: RenderMode) -> UiResult<bool> {
        let surface = self.surface_mut(key)?;
        let previous = surface.render_mode;
        if previous == Some(mode) {
            return Ok(false);
        }
        surface.render_mode = Some(mode);

        if let Some(previous) = previous {
            self.buckets[previous.bucket()].retain(|s| *s != key);
        }
        let bucket = &mut self.buckets[mode.bucket()];
        if bucket.contains(&key) {
            consistency_failure(&format!("surface {key:?}: already exist in {mode:?} bucket"));
        } else {
            bucket.push(key);
        }
        self.bucket_dirty[mode.bucket()] = true;
        log::debug!("surface {key:?} classified as {mode:?} (was {previous:?})");
        Ok(true)
    }

    /// Flag the bucket holding `key` for re-sorting
    pub fn mark_sort_dirty(&mut self, key: SurfaceKey) {
        if let Some(mode) = self.surfaces.get(key).and_then(|s| s.render_mode) {
            self.bucket_dirty[mode.bucket()] = true;
        }
    }

    /// Flag the bucket of `key` and of every surface nested under it
    fn mark_chain_sort_dirty(&mut self, key: SurfaceKey) {
        let nested: Vec<SurfaceKey> = self
            .surfaces
            .keys()
            .filter(|s| self.is_surface_ancestor_or_self(key, *s))
            .collect();
        for surface in nested {
            self.mark_sort_dirty(surface);
        }
    }

    pub(crate) fn set_parent_surface(&mut self, key: SurfaceKey, parent: Option<SurfaceKey>) {
        let Some(surface) = self.surfaces.get_mut(key) else {
            return;
        };
        if surface.parent_surface != parent && parent != Some(key) {
            surface.parent_surface = parent;
            self.mark_chain_sort_dirty(key);
        }
    }

    pub(crate) fn mark_members_dirty(&mut self, key: SurfaceKey) {
        if let Some(surface) = self.surfaces.get_mut(key) {
            surface.members_dirty = true;
        }
    }

    /// Whether `ancestor` is `key` or a surface above it
    pub fn is_surface_ancestor_or_self(&self, ancestor: SurfaceKey, key: SurfaceKey) -> bool {
        let mut current = Some(key);
        while let Some(k) = current {
            if k == ancestor {
                return true;
            }
            current = self.surfaces.get(k).and_then(|s| s.parent_surface);
        }
        false
    }

    /// Root-most surface above `key`
    pub fn root_surface(&self, key: SurfaceKey) -> SurfaceKey {
        let mut current = key;
        while let Some(parent) = self.surfaces.get(current).and_then(|s| s.parent_surface) {
            current = parent;
        }
        current
    }

    /// Nearest surface at or above `key` that sorts its own drawcalls
    pub fn sorting_surface(&self, key: SurfaceKey) -> SurfaceKey {
        let mut current = key;
        while let Some(surface) = self.surfaces.get(current) {
            match surface.parent_surface {
                Some(parent) if !surface.override_sorting => current = parent,
                _ => break,
            }
        }
        current
    }

    /// Effective sort order: own value for root or override surfaces,
    /// otherwise inherited from the surface above
    pub fn actual_sort_order(&self, key: SurfaceKey) -> i32 {
        self.surfaces
            .get(self.sorting_surface(key))
            .map_or(0, |s| s.sort_order)
    }

    /// Set the explicit sort order, optionally shifting nested surfaces by the same amount
    pub fn set_sort_order(&mut self, key: SurfaceKey, value: i32, propagate_to_children: bool) -> UiResult<()> {
        let surface = self.surface_mut(key)?;
        let delta = value - surface.sort_order;
        if delta == 0 {
            return Ok(());
        }
        surface.sort_order = value;

        if propagate_to_children {
            let nested: Vec<SurfaceKey> = self
                .surfaces
                .keys()
                .filter(|s| *s != key && self.is_surface_ancestor_or_self(key, *s))
                .collect();
            for surface in nested {
                self.surfaces[surface].sort_order += delta;
            }
        }
        self.mark_chain_sort_dirty(key);
        Ok(())
    }

    /// Set whether a surface ignores its parent's sort order
    pub fn set_override_sorting(&mut self, key: SurfaceKey, override_sorting: bool) -> UiResult<()> {
        let surface = self.surface_mut(key)?;
        if surface.override_sorting != override_sorting {
            surface.override_sorting = override_sorting;
            self.mark_chain_sort_dirty(key);
        }
        Ok(())
    }

    fn extreme_sort_order(
        &self,
        key: SurfaceKey,
        candidates: impl Iterator<Item = SurfaceKey>,
        highest: bool,
    ) -> Option<i32> {
        let orders = candidates
            .filter(|s| !self.is_surface_ancestor_or_self(key, *s))
            .filter_map(|s| self.surfaces.get(s).map(|surface| surface.sort_order));
        if highest {
            orders.max()
        } else {
            orders.min()
        }
    }

    fn hierarchy_members(&self, key: SurfaceKey) -> Vec<SurfaceKey> {
        let root = self.root_surface(key);
        self.surfaces
            .keys()
            .filter(|s| self.is_surface_ancestor_or_self(root, *s))
            .collect()
    }

    /// Put a surface above every other surface sharing its root surface
    pub fn set_sort_order_to_highest_of_hierarchy(&mut self, key: SurfaceKey, propagate_to_children: bool) -> UiResult<()> {
        let members = self.hierarchy_members(key);
        match self.extreme_sort_order(key, members.into_iter(), true) {
            Some(max) => self.set_sort_order(key, max + 1, propagate_to_children),
            None => Ok(()),
        }
    }

    /// Put a surface below every other surface sharing its root surface
    pub fn set_sort_order_to_lowest_of_hierarchy(&mut self, key: SurfaceKey, propagate_to_children: bool) -> UiResult<()> {
        let members = self.hierarchy_members(key);
        match self.extreme_sort_order(key, members.into_iter(), false) {
            Some(min) => self.set_sort_order(key, min - 1, propagate_to_children),
            None => Ok(()),
        }
    }

    /// Put a surface above every other surface of its render mode
    pub fn set_sort_order_to_highest_of_all(&mut self, key: SurfaceKey, propagate_to_children: bool) -> UiResult<()> {
        let Some(mode) = self.surface_mut(key)?.render_mode else {
            return Ok(());
        };
        let bucket = self.buckets[mode.bucket()].clone();
        match self.extreme_sort_order(key, bucket.into_iter(), true) {
            Some(max) => self.set_sort_order(key, max + 1, propagate_to_children),
            None => Ok(()),
        }
    }

    /// Put a surface below every other surface of its render mode
    pub fn set_sort_order_to_lowest_of_all(&mut self, key: SurfaceKey, propagate_to_children: bool) -> UiResult<()> {
        let Some(mode) = self.surface_mut(key)?.render_mode else {
            return Ok(());
        };
        let bucket = self.buckets[mode.bucket()].clone();
        match self.extreme_sort_order(key, bucket.into_iter(), false) {
            Some(min) => self.set_sort_order(key, min - 1, propagate_to_children),
            None => Ok(()),
        }
    }

    /// Re-sort every dirty bucket
    ///
    /// `flatten` resolves a node's flatten hierarchy index. Returns the modes
    /// whose buckets were sorted.
    pub fn sort_dirty_buckets(&mut self, flatten: impl Fn(NodeKey) -> i32) -> Vec<RenderMode> {
        let mut sorted = Vec::new();
        for mode in RenderMode::ALL {
            let index = mode.bucket();
            if !self.bucket_dirty[index] {
                continue;
            }
            let mut keyed: Vec<(i32, i32, SurfaceKey)> = self.buckets[index]
                .iter()
                .filter_map(|s| {
                    let surface = self.surfaces.get(*s)?;
                    Some((self.actual_sort_order(*s), flatten(surface.node), *s))
                })
                .collect();
            keyed.sort_by_key(|(order, flat, _)| (*order, *flat));
            self.buckets[index] = keyed.into_iter().map(|(_, _, s)| s).collect();
            self.bucket_dirty[index] = false;

            if let Some(extension) = self.view_extension.as_mut() {
                extension.on_priorities_changed(mode, &self.buckets[index]);
            }
            sorted.push(mode);
        }
        sorted
    }

    /// Root and override surfaces, across all buckets, whose node passes `active`
    pub fn drawcall_sorting_surfaces(&self, active: impl Fn(NodeKey) -> bool) -> Vec<SurfaceKey> {
        self.buckets
            .iter()
            .flatten()
            .copied()
            .filter(|s| {
                self.surfaces
                    .get(*s)
                    .is_some_and(|surface| surface.sorts_drawcalls() && active(surface.node))
            })
            .collect()
    }

    /// Put member lists into drawcall order for a root or override surface
    ///
    /// Sorts the members of `key` and of every nested surface that inherits
    /// its sorting. Returns the surfaces that were sorted.
    pub fn sort_drawcall(&mut self, key: SurfaceKey, flatten: impl Fn(NodeKey) -> i32) -> Vec<SurfaceKey> {
        if !self.surfaces.get(key).is_some_and(RenderSurface::sorts_drawcalls) {
            return Vec::new();
        }
        let group: Vec<SurfaceKey> = self
            .surfaces
            .keys()
            .filter(|s| self.sorting_surface(*s) == key)
            .collect();
        for surface in &group {
            let surface = &mut self.surfaces[*surface];
            surface.members.sort_by_cached_key(|n| flatten(*n));
            surface.drawcall_generation += 1;
        }
        group
    }

    // ------------------------------------------------------------------
    // Raycasters
    // ------------------------------------------------------------------

    /// Register a raycaster, keeping the list sorted by descending depth
    ///
    /// Equal depths keep registration order. A second raycaster with the same
    /// depth and trace channel is accepted with a warning.
    pub fn add_raycaster(&mut self, raycaster: Raycaster) -> RaycasterKey {
        if self.warn_duplicate_raycasters {
            let duplicate = self.raycaster_order.iter().any(|k| {
                self.raycasters
                    .get(*k)
                    .is_some_and(|r| r.depth == raycaster.depth && r.trace_channel == raycaster.trace_channel)
            });
            if duplicate {
                log::warn!(
                    "raycaster depth {} channel {:?}: {DUPLICATE_RAYCASTER_GUIDANCE}",
                    raycaster.depth,
                    raycaster.trace_channel
                );
            }
        }

        let depth = raycaster.depth;
        let key = self.raycasters.insert(raycaster);
        let position = self
            .raycaster_order
            .iter()
            .position(|k| self.raycasters.get(*k).is_some_and(|r| r.depth < depth))
            .unwrap_or(self.raycaster_order.len());
        self.raycaster_order.insert(position, key);
        key
    }

    /// Unregister a raycaster
    pub fn remove_raycaster(&mut self, key: RaycasterKey) -> UiResult<Raycaster> {
        let raycaster = self
            .raycasters
            .remove(key)
            .ok_or_else(|| UiError::NotRegistered("raycaster").warn())?;
        self.raycaster_order.retain(|k| *k != key);
        Ok(raycaster)
    }

    /// Look up a raycaster
    pub fn raycaster(&self, key: RaycasterKey) -> Option<&Raycaster> {
        self.raycasters.get(key)
    }

    /// Mutable access to a raycaster's settings
    ///
    /// Depth changes through [`SurfaceRegistry::set_raycaster_depth`] to keep ordering.
    pub fn raycaster_mut(&mut self, key: RaycasterKey) -> UiResult<&mut Raycaster> {
        self.raycasters.get_mut(key).ok_or_else(|| UiError::StaleRaycaster(key).warn())
    }

    /// Change a raycaster's depth and re-insert it in order
    pub fn set_raycaster_depth(&mut self, key: RaycasterKey, depth: i32) -> UiResult<RaycasterKey> {
        let mut raycaster = self.remove_raycaster(key)?;
        raycaster.depth = depth;
        Ok(self.add_raycaster(raycaster))
    }

    /// Raycasters by descending depth
    pub fn raycasters(&self) -> impl Iterator<Item = (RaycasterKey, &Raycaster)> {
        self.raycaster_order
            .iter()
            .filter_map(|k| self.raycasters.get(*k).map(|r| (*k, r)))
    }
}
