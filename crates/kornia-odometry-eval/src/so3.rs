//! Rotation matrix utilities.
//!
//! Closed-form conversions between rotation matrices and rotation vectors
//! (axis scaled by angle, the logarithm of SO(3)).

use glam::{DMat3, DMat4, DVec3};
use nalgebra::{Matrix3, SVD};

const SMALL_ANGLE_EPSILON: f64 = 1.0e-8;

// below this value of `1 + cos(theta)` the antisymmetric part is too small to recover the axis
const NEAR_PI_EPSILON: f64 = 1.0e-6;

/// Top-left 3x3 block of a pose.
#[inline]
pub fn rotation_block(pose: &DMat4) -> DMat3 {
    DMat3::from_mat4(*pose)
}

/// Trace of a 3x3 matrix.
#[inline]
pub fn trace(m: &DMat3) -> f64 {
    m.x_axis.x + m.y_axis.y + m.z_axis.z
}

/// Vector space <- skew-symmetric matrix.
#[inline]
pub fn vee(m: &DMat3) -> DVec3 {
    DVec3::new(m.y_axis.z, m.z_axis.x, m.x_axis.y)
}

/// Rotation angle of a rotation matrix in radians, in `[0, pi]`.
///
/// The cosine is clamped to `[-1, 1]` so slightly non-orthonormal input still
/// yields a finite angle.
pub fn rotation_angle(r: &DMat3) -> f64 {
    let d = 0.5 * (trace(r) - 1.0);
    d.clamp(-1.0, 1.0).acos()
}

/// Rotation vector (axis * angle) of a rotation matrix.
///
/// Uses the Rodrigues formula `w = theta / (2 sin theta) * vee(R - R^T)`, with a
/// first order expansion near the identity and the symmetric part of `R` near `pi`.
///
/// PRECONDITION: `r` is orthonormal with determinant +1.
pub fn rotation_log(r: &DMat3) -> DVec3 {
    let cos_theta = (0.5 * (trace(r) - 1.0)).clamp(-1.0, 1.0);
    let theta = cos_theta.acos();
    let antisym = vee(&(*r - r.transpose()));

    if theta < SMALL_ANGLE_EPSILON {
        return 0.5 * antisym;
    }

    if 1.0 + cos_theta > NEAR_PI_EPSILON {
        return antisym * (theta / (2.0 * theta.sin()));
    }

    // R + R^T = 2 cos(theta) I + 2 (1 - cos(theta)) a a^T
    let sym = (*r + r.transpose()) * 0.5;
    let outer = (sym - DMat3::IDENTITY * cos_theta) * (1.0 / (1.0 - cos_theta));
    let diag = DVec3::new(outer.x_axis.x, outer.y_axis.y, outer.z_axis.z);

    let k = if diag.x >= diag.y && diag.x >= diag.z {
        0
    } else if diag.y >= diag.z {
        1
    } else {
        2
    };
    let mut axis = outer.col(k) / diag[k].max(0.0).sqrt();
    axis = axis.normalize_or_zero();

    // the sign of the axis is carried by the (tiny) antisymmetric part
    if axis.dot(antisym) < 0.0 {
        axis = -axis;
    }
    axis * theta
}

/// Rotation matrix of a rotation vector (axis * angle).
pub fn rotation_exp(w: DVec3) -> DMat3 {
    let theta = w.length();
    if theta < SMALL_ANGLE_EPSILON {
        return DMat3::IDENTITY + hat(w);
    }
    DMat3::from_axis_angle(w / theta, theta)
}

/// Lie algebra <- vector space.
pub fn hat(v: DVec3) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(0.0, v.z, -v.y),
        DVec3::new(-v.z, 0.0, v.x),
        DVec3::new(v.y, -v.x, 0.0),
    )
}

/// Closest rotation matrix (in Frobenius norm) to `m`.
///
/// Computed as `U * diag(1, 1, det(U V^T)) * V^T` from the SVD of `m`.
pub fn project_to_rotation(m: &DMat3) -> DMat3 {
    let svd = SVD::new(to_nalgebra(m), true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        // u and v_t are always computed when requested
        return *m;
    };

    let mut s = Matrix3::<f64>::identity();
    if (u * v_t).determinant() < 0.0 {
        s[(2, 2)] = -1.0;
    }
    from_nalgebra(&(u * s * v_t))
}

pub(crate) fn to_nalgebra(m: &DMat3) -> Matrix3<f64> {
    // both are column-major
    Matrix3::from_column_slice(&m.to_cols_array())
}

pub(crate) fn from_nalgebra(m: &Matrix3<f64>) -> DMat3 {
    DMat3::from_cols_slice(m.as_slice())
}
