//! Anchored rectangle algebra
//!
//! An [`AnchorRect`] describes a node's rectangle relative to its parent with
//! a pivot, two anchor points, an anchored position and a size delta. On each
//! axis, `anchor_min != anchor_max` means the axis is stretched: the size is
//! the parent's anchor span plus `size_delta`. Otherwise `size_delta` is the
//! size itself.
//!
//! Derived values (width, height, the four anchor edges) are cached in
//! [`Cell`]s so that read paths stay `&self`. Every mutator invalidates the
//! caches it affects; parent-driven invalidation goes through
//! [`AnchorRect::invalidate_size`].

use std::cell::Cell;

use serde::{Deserialize, Serialize};

use crate::foundation::math::Vec2;

/// Authoritative anchor description of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorData {
    /// Normalized pivot inside the node's own rect
    pub pivot: Vec2,
    /// Normalized anchor on the parent rect (lower corner)
    pub anchor_min: Vec2,
    /// Normalized anchor on the parent rect (upper corner)
    pub anchor_max: Vec2,
    /// Offset of the pivot from the anchor reference point
    pub anchored_position: Vec2,
    /// Size, or additive size correction on stretched axes
    pub size_delta: Vec2,
}

impl Default for AnchorData {
    fn default() -> Self {
        Self {
            pivot: Vec2::new(0.5, 0.5),
            anchor_min: Vec2::new(0.5, 0.5),
            anchor_max: Vec2::new(0.5, 0.5),
            anchored_position: Vec2::zeros(),
            size_delta: Vec2::new(100.0, 100.0),
        }
    }
}

impl AnchorData {
    /// Whether the horizontal axis is stretched
    pub fn is_horizontal_stretched(&self) -> bool {
        self.anchor_min.x != self.anchor_max.x
    }

    /// Whether the vertical axis is stretched
    pub fn is_vertical_stretched(&self) -> bool {
        self.anchor_min.y != self.anchor_max.y
    }
}

/// Rect of a parent as seen by its children
///
/// `left`/`bottom` are the parent's local-space edges, i.e. `-pivot * size`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParentRect {
    /// Parent's local left edge
    pub left: f32,
    /// Parent's local bottom edge
    pub bottom: f32,
    /// Parent width
    pub width: f32,
    /// Parent height
    pub height: f32,
}

impl ParentRect {
    /// Rect used for parent-less nodes: zero size at the origin
    pub const NONE: Self = Self {
        left: 0.0,
        bottom: 0.0,
        width: 0.0,
        height: 0.0,
    };

    /// Build a parent rect from its size and pivot
    pub fn from_size_and_pivot(width: f32, height: f32, pivot: Vec2) -> Self {
        Self {
            left: -pivot.x * width,
            bottom: -pivot.y * height,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct DerivedCache {
    width: Cell<Option<f32>>,
    height: Cell<Option<f32>>,
    anchor_left: Cell<Option<f32>>,
    anchor_right: Cell<Option<f32>>,
    anchor_bottom: Cell<Option<f32>>,
    anchor_top: Cell<Option<f32>>,
}

fn cached(cell: &Cell<Option<f32>>, compute: impl FnOnce() -> f32) -> f32 {
    if let Some(value) = cell.get() {
        return value;
    }
    let value = compute();
    cell.set(Some(value));
    value
}

/// Anchor data plus its lazily computed derived values
#[derive(Debug, Clone, Default)]
pub struct AnchorRect {
    data: AnchorData,
    cache: DerivedCache,
}

impl AnchorRect {
    /// Create a rect from anchor data
    pub fn new(data: AnchorData) -> Self {
        Self {
            data,
            cache: DerivedCache::default(),
        }
    }

    /// Authoritative anchor data
    pub fn data(&self) -> &AnchorData {
        &self.data
    }

    /// Current pivot
    pub fn pivot(&self) -> Vec2 {
        self.data.pivot
    }

    /// Current anchored position
    pub fn anchored_position(&self) -> Vec2 {
        self.data.anchored_position
    }

    /// Current size delta
    pub fn size_delta(&self) -> Vec2 {
        self.data.size_delta
    }

    /// Whether the horizontal axis is stretched
    pub fn is_horizontal_stretched(&self) -> bool {
        self.data.is_horizontal_stretched()
    }

    /// Whether the vertical axis is stretched
    pub fn is_vertical_stretched(&self) -> bool {
        self.data.is_vertical_stretched()
    }

    /// Width of the rect
    ///
    /// `parent_width` is only evaluated on a cache miss; `None` means the node
    /// has no parent, in which case `size_delta.x` is the width.
    pub fn width(&self, parent_width: impl FnOnce() -> Option<f32>) -> f32 {
        cached(&self.cache.width, || {
            let d = &self.data;
            match parent_width() {
                Some(pw) if d.is_horizontal_stretched() => {
                    d.size_delta.x + pw * (d.anchor_max.x - d.anchor_min.x)
                }
                _ => d.size_delta.x,
            }
        })
    }

    /// Height of the rect, see [`AnchorRect::width`]
    pub fn height(&self, parent_height: impl FnOnce() -> Option<f32>) -> f32 {
        cached(&self.cache.height, || {
            let d = &self.data;
            match parent_height() {
                Some(ph) if d.is_vertical_stretched() => {
                    d.size_delta.y + ph * (d.anchor_max.y - d.anchor_min.y)
                }
                _ => d.size_delta.y,
            }
        })
    }

    /// Local-space left edge for a given width
    pub fn local_left(&self, width: f32) -> f32 {
        -self.data.pivot.x * width
    }

    /// Local-space right edge for a given width
    pub fn local_right(&self, width: f32) -> f32 {
        (1.0 - self.data.pivot.x) * width
    }

    /// Local-space bottom edge for a given height
    pub fn local_bottom(&self, height: f32) -> f32 {
        -self.data.pivot.y * height
    }

    /// Local-space top edge for a given height
    pub fn local_top(&self, height: f32) -> f32 {
        (1.0 - self.data.pivot.y) * height
    }

    /// Distance from the anchor-min reference line to the left edge
    pub fn anchor_left(&self) -> f32 {
        cached(&self.cache.anchor_left, || {
            let d = &self.data;
            d.anchored_position.x - d.size_delta.x * d.pivot.x
        })
    }

    /// Distance from the right edge inward to the anchor-max reference line
    pub fn anchor_right(&self) -> f32 {
        cached(&self.cache.anchor_right, || {
            let d = &self.data;
            -(d.anchored_position.x + d.size_delta.x * (1.0 - d.pivot.x))
        })
    }

    /// Distance from the anchor-min reference line to the bottom edge
    pub fn anchor_bottom(&self) -> f32 {
        cached(&self.cache.anchor_bottom, || {
            let d = &self.data;
            d.anchored_position.y - d.size_delta.y * d.pivot.y
        })
    }

    /// Distance from the top edge inward to the anchor-max reference line
    pub fn anchor_top(&self) -> f32 {
        cached(&self.cache.anchor_top, || {
            let d = &self.data;
            -(d.anchored_position.y + d.size_delta.y * (1.0 - d.pivot.y))
        })
    }

    /// Local pivot position inside the parent rect (horizontal, vertical)
    pub fn calculate_transform_from_anchor(&self, parent: &ParentRect) -> Vec2 {
        let d = &self.data;
        let horizontal = parent.left
            + parent.width * d.anchor_min.x
            + parent.width * (d.anchor_max.x - d.anchor_min.x) * d.pivot.x
            + d.anchored_position.x;
        let vertical = parent.bottom
            + parent.height * d.anchor_min.y
            + parent.height * (d.anchor_max.y - d.anchor_min.y) * d.pivot.y
            + d.anchored_position.y;
        Vec2::new(horizontal, vertical)
    }

    /// Recompute the anchored position from a concrete local position
    ///
    /// Inverse of [`AnchorRect::calculate_transform_from_anchor`].
    pub fn calculate_anchor_from_transform(&mut self, local: Vec2, parent: &ParentRect) {
        let d = &self.data;
        let reference_x = parent.left
            + parent.width * d.anchor_min.x
            + parent.width * (d.anchor_max.x - d.anchor_min.x) * d.pivot.x;
        let reference_y = parent.bottom
            + parent.height * d.anchor_min.y
            + parent.height * (d.anchor_max.y - d.anchor_min.y) * d.pivot.y;
        self.set_anchored_position(Vec2::new(local.x - reference_x, local.y - reference_y));
    }

    /// Set the anchored position
    pub fn set_anchored_position(&mut self, value: Vec2) {
        self.data.anchored_position = value;
        self.invalidate_edges();
    }

    /// Set the size delta
    pub fn set_size_delta(&mut self, value: Vec2) {
        self.data.size_delta = value;
        self.invalidate_edges();
        self.invalidate_size();
    }

    /// Set the pivot, keeping anchored position and size delta
    pub fn set_pivot(&mut self, value: Vec2) {
        self.data.pivot = value;
        self.invalidate_edges();
    }

    /// Set both anchors without compensation
    pub fn set_anchors(&mut self, anchor_min: Vec2, anchor_max: Vec2) {
        self.data.anchor_min = anchor_min;
        self.data.anchor_max = anchor_max;
        self.invalidate_size();
    }

    /// Set the width by adjusting `size_delta.x`
    pub fn set_width(&mut self, width: f32, parent_width: Option<f32>) {
        let d = &self.data;
        let size_x = match parent_width {
            Some(pw) if d.is_horizontal_stretched() => width - pw * (d.anchor_max.x - d.anchor_min.x),
            _ => width,
        };
        self.set_size_delta(Vec2::new(size_x, self.data.size_delta.y));
    }

    /// Set the height by adjusting `size_delta.y`
    pub fn set_height(&mut self, height: f32, parent_height: Option<f32>) {
        let d = &self.data;
        let size_y = match parent_height {
            Some(ph) if d.is_vertical_stretched() => height - ph * (d.anchor_max.y - d.anchor_min.y),
            _ => height,
        };
        self.set_size_delta(Vec2::new(self.data.size_delta.x, size_y));
    }

    /// Move the left edge, keeping the right edge
    pub fn set_anchor_left(&mut self, value: f32) {
        let right = self.anchor_right();
        let size_x = -right - value;
        let position_x = value + size_x * self.data.pivot.x;
        self.set_horizontal_offsets(size_x, position_x);
    }

    /// Move the right edge, keeping the left edge
    pub fn set_anchor_right(&mut self, value: f32) {
        let left = self.anchor_left();
        let size_x = -value - left;
        let position_x = left + size_x * self.data.pivot.x;
        self.set_horizontal_offsets(size_x, position_x);
    }

    /// Move the bottom edge, keeping the top edge
    pub fn set_anchor_bottom(&mut self, value: f32) {
        let top = self.anchor_top();
        let size_y = -top - value;
        let position_y = value + size_y * self.data.pivot.y;
        self.set_vertical_offsets(size_y, position_y);
    }

    /// Move the top edge, keeping the bottom edge
    pub fn set_anchor_top(&mut self, value: f32) {
        let bottom = self.anchor_bottom();
        let size_y = -value - bottom;
        let position_y = bottom + size_y * self.data.pivot.y;
        self.set_vertical_offsets(size_y, position_y);
    }

    fn set_horizontal_offsets(&mut self, size_x: f32, position_x: f32) {
        self.data.size_delta.x = size_x;
        self.data.anchored_position.x = position_x;
        self.invalidate_edges();
        self.cache.width.set(None);
    }

    fn set_vertical_offsets(&mut self, size_y: f32, position_y: f32) {
        self.data.size_delta.y = size_y;
        self.data.anchored_position.y = position_y;
        self.invalidate_edges();
        self.cache.height.set(None);
    }

    /// Change the horizontal anchors (`value.x` = min, `value.y` = max)
    ///
    /// With `keep_size` the width stays what it was. Without it the left and
    /// right edges stay where they were inside the parent rect.
    pub fn set_horizontal_anchor_min_max(&mut self, value: Vec2, keep_size: bool, parent_width: f32) {
        let previous_width = self.width(|| Some(parent_width));
        let absolute_left = parent_width * self.data.anchor_min.x + self.anchor_left();
        let absolute_right = parent_width * self.data.anchor_max.x - self.anchor_right();

        self.data.anchor_min.x = value.x;
        self.data.anchor_max.x = value.y;
        self.invalidate_size();
        self.invalidate_edges();

        if keep_size {
            self.set_width(previous_width, Some(parent_width));
        } else {
            let offset_min = absolute_left - parent_width * value.x;
            let offset_max = absolute_right - parent_width * value.y;
            let size_x = offset_max - offset_min;
            self.set_horizontal_offsets(size_x, offset_min + size_x * self.data.pivot.x);
        }
    }

    /// Change the vertical anchors (`value.x` = min, `value.y` = max)
    pub fn set_vertical_anchor_min_max(&mut self, value: Vec2, keep_size: bool, parent_height: f32) {
        let previous_height = self.height(|| Some(parent_height));
        let absolute_bottom = parent_height * self.data.anchor_min.y + self.anchor_bottom();
        let absolute_top = parent_height * self.data.anchor_max.y - self.anchor_top();

        self.data.anchor_min.y = value.x;
        self.data.anchor_max.y = value.y;
        self.invalidate_size();
        self.invalidate_edges();

        if keep_size {
            self.set_height(previous_height, Some(parent_height));
        } else {
            let offset_min = absolute_bottom - parent_height * value.x;
            let offset_max = absolute_top - parent_height * value.y;
            let size_y = offset_max - offset_min;
            self.set_vertical_offsets(size_y, offset_min + size_y * self.data.pivot.y);
        }
    }

    /// Drop cached width and height (own or ancestor size changed)
    pub fn invalidate_size(&self) {
        self.cache.width.set(None);
        self.cache.height.set(None);
    }

    fn invalidate_edges(&self) {
        self.cache.anchor_left.set(None);
        self.cache.anchor_right.set(None);
        self.cache.anchor_bottom.set(None);
        self.cache.anchor_top.set(None);
    }

    /// Drop every derived value
    pub fn invalidate_all(&self) {
        self.invalidate_size();
        self.invalidate_edges();
    }

    /// Whether the width is currently cached
    pub fn is_width_cached(&self) -> bool {
        self.cache.width.get().is_some()
    }
}
