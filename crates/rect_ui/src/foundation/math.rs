//! Math utilities and types
//!
//! A UI node's rect lies on its local YZ plane at X = 0: local Y is the
//! horizontal axis, local Z the vertical axis and local X is depth.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Relative transform of a node: location, rotation and scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Location relative to the parent node (x depth, y horizontal, z vertical)
    pub location: Vec3,

    /// Rotation relative to the parent node
    pub rotation: Quat,

    /// Scale relative to the parent node
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            location: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only a location
    pub fn from_location(location: Vec3) -> Self {
        Self {
            location,
            ..Default::default()
        }
    }

    /// Convert to a transformation matrix (translate * rotate * scale)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.location)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Rebuild a transform from a matrix without shear
    ///
    /// Returns `None` when the matrix has a zero scale axis.
    pub fn from_matrix(matrix: &Mat4) -> Option<Self> {
        let location = Vec3::new(matrix.m14, matrix.m24, matrix.m34);
        let column = |c: usize| Vec3::new(matrix[(0, c)], matrix[(1, c)], matrix[(2, c)]);
        let (x, y, z) = (column(0), column(1), column(2));
        let scale = Vec3::new(x.magnitude(), y.magnitude(), z.magnitude());
        if scale.iter().any(|s| *s <= f32::EPSILON) {
            return None;
        }

        let rotation_matrix = nalgebra::Matrix3::from_columns(&[x / scale.x, y / scale.y, z / scale.z]);
        let rotation = Quat::from_matrix(&rotation_matrix);

        Some(Self {
            location,
            rotation,
            scale,
        })
    }
}

/// Split a local position into its rect-plane coordinates (horizontal, vertical)
pub fn rect_plane(location: &Vec3) -> Vec2 {
    Vec2::new(location.y, location.z)
}
