//! Orthonormal shading frames.

use glam::Vec3;

/// Build an orthonormal basis `(tangent, bitangent)` around a unit normal.
///
/// Branchless construction from Duff et al., "Building an Orthonormal Basis,
/// Revisited".
pub fn make_orthonormals(n: Vec3) -> (Vec3, Vec3) {
    let sign = if n.z >= 0.0 { 1.0 } else { -1.0 };
    let a = -1.0 / (sign + n.z);
    let b = n.x * n.y * a;

    let tangent = Vec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x);
    let bitangent = Vec3::new(b, sign + n.y * n.y * a, -n.y);

    (tangent, bitangent)
}

/// Local shading frame with `z` along the normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub x: Vec3,
    pub y: Vec3,
    pub z: Vec3,
}

impl Frame {
    /// Arbitrary frame around `n`.
    pub fn from_normal(n: Vec3) -> Self {
        let (x, y) = make_orthonormals(n);
        Self { x, y, z: n }
    }

    /// Frame whose `x` axis follows the tangent `t` projected onto the plane of `n`.
    ///
    /// Falls back to [`Frame::from_normal`] when `t` is degenerate or parallel to `n`.
    pub fn from_normal_tangent(n: Vec3, t: Vec3) -> Self {
        let projected = t - n * n.dot(t);
        match projected.try_normalize() {
            Some(x) => Self {
                x,
                y: n.cross(x),
                z: n,
            },
            None => Self::from_normal(n),
        }
    }

    #[inline]
    pub fn to_local(&self, v: Vec3) -> Vec3 {
        Vec3::new(v.dot(self.x), v.dot(self.y), v.dot(self.z))
    }

    #[inline]
    pub fn to_world(&self, v: Vec3) -> Vec3 {
        self.x * v.x + self.y * v.y + self.z * v.z
    }
}
