//! Segment tests against the local rect plane
//!
//! A node's rect lies on its local YZ plane at X=0. A world segment is first
//! moved into the node's local space; it only can hit when its endpoints lie
//! on different sides of that plane.

use serde::{Deserialize, Serialize};

use crate::foundation::math::{rect_plane, Mat4, Point3, Vec2, Vec3};

/// A ray for segment and triangle tests
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Origin of the ray
    pub origin: Vec3,
    /// Direction of the ray (normalized)
    pub direction: Vec3,
}

impl Ray {
    /// Creates a new ray with the given origin and direction
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Point along the ray at distance t
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// A triangle in a node's local space
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    /// First vertex
    pub v0: Vec3,
    /// Second vertex
    pub v1: Vec3,
    /// Third vertex
    pub v2: Vec3,
}

impl Triangle {
    /// Creates a new triangle
    pub const fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }

    /// Triangle lying on the rect plane
    pub fn on_rect_plane(points: &[Vec2; 3]) -> Self {
        let lift = |p: &Vec2| Vec3::new(0.0, p.x, p.y);
        Self::new(lift(&points[0]), lift(&points[1]), lift(&points[2]))
    }

    /// Normal of the triangle (right-hand rule)
    pub fn normal(&self) -> Vec3 {
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;
        edge1.cross(&edge2).normalize()
    }

    /// Möller-Trumbore ray-triangle intersection
    ///
    /// Returns `(t, u, v)` with `t` the distance along the ray and `u`, `v`
    /// barycentric coordinates.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<(f32, f32, f32)> {
        const EPSILON: f32 = 0.000_001;

        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;

        let h = ray.direction.cross(&edge2);
        let a = edge1.dot(&h);
        // Parallel to the triangle
        if a.abs() < EPSILON {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - self.v0;
        let u = f * s.dot(&h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(&edge1);
        let v = f * ray.direction.dot(&q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(&q);
        (t >= 0.0).then_some((t, u, v))
    }
}

/// Precise hit geometry of a node, as triangles on its local rect plane
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HitMesh {
    /// Triangles in rect-plane coordinates (horizontal, vertical)
    pub triangles: Vec<[Vec2; 3]>,
}

impl HitMesh {
    /// Mesh from rect-plane triangles
    pub const fn new(triangles: Vec<[Vec2; 3]>) -> Self {
        Self { triangles }
    }

    /// Whether the mesh has no triangles
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

/// Rect bounds in a node's local rect plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalRect {
    /// Left edge
    pub left: f32,
    /// Right edge
    pub right: f32,
    /// Bottom edge
    pub bottom: f32,
    /// Top edge
    pub top: f32,
}

impl LocalRect {
    /// Whether a rect-plane point lies inside, edges included
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.left && point.x <= self.right && point.y >= self.bottom && point.y <= self.top
    }
}

/// Result of a successful segment test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentHit {
    /// Fraction of the segment at the hit, in `[0, 1]`
    pub fraction: f32,
    /// Hit point in the node's local space
    pub local_point: Vec3,
    /// Hit normal in the node's local space
    pub local_normal: Vec3,
}

/// A world-space segment moved into a node's local space
#[derive(Debug, Clone, Copy)]
pub struct LocalSegment {
    start: Vec3,
    end: Vec3,
}

impl LocalSegment {
    /// Move a world segment into the space described by `world_matrix`
    ///
    /// `None` when the matrix cannot be inverted (zero scale).
    pub fn from_world(world_matrix: &Mat4, start: &Vec3, end: &Vec3) -> Option<Self> {
        let inverse = world_matrix.try_inverse()?;
        Some(Self {
            start: inverse.transform_point(&Point3::from(*start)).coords,
            end: inverse.transform_point(&Point3::from(*end)).coords,
        })
    }

    /// Segment that is already in local space
    pub const fn new(start: Vec3, end: Vec3) -> Self {
        Self { start, end }
    }

    /// Crossing of the rect plane, if the endpoints lie on different sides
    fn plane_crossing(&self) -> Option<(f32, Vec3)> {
        if sign(self.start.x) == sign(self.end.x) {
            return None;
        }
        let depth = self.start.x - self.end.x;
        if depth == 0.0 {
            return None;
        }
        let fraction = self.start.x / depth;
        Some((fraction, self.start + (self.end - self.start) * fraction))
    }

    /// Test against the rect
    pub fn hit_rect(&self, rect: &LocalRect) -> Option<SegmentHit> {
        let (fraction, local_point) = self.plane_crossing()?;
        rect.contains(rect_plane(&local_point)).then(|| SegmentHit {
            fraction,
            local_point,
            local_normal: Vec3::x(),
        })
    }

    /// Test against the rect first, then against each mesh triangle
    pub fn hit_mesh(&self, rect: &LocalRect, mesh: &HitMesh) -> Option<SegmentHit> {
        self.hit_rect(rect)?;

        let length = (self.end - self.start).norm();
        if length == 0.0 {
            return None;
        }
        let ray = Ray::new(self.start, self.end - self.start);
        mesh.triangles.iter().find_map(|points| {
            let triangle = Triangle::on_rect_plane(points);
            let (t, _, _) = triangle.intersect_ray(&ray)?;
            (t <= length).then(|| SegmentHit {
                fraction: t / length,
                local_point: ray.point_at(t),
                local_normal: triangle.normal(),
            })
        })
    }
}

fn sign(value: f32) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}
