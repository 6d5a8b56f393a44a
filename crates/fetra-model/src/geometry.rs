//! Geometric primitives shared by the mesh and the writers.

use nalgebra::{Matrix3, Vector3};

/// Default tolerance for comparing deck reals.
pub const DOUBLE_COMPARE_TOLERANCE: f64 = f64::EPSILON * 5.0;

pub fn is_zero(x: f64) -> bool {
    x.abs() <= DOUBLE_COMPARE_TOLERANCE
}

/// Relative-or-absolute comparison: `|x-y| <= tol * max(1, |x|, |y|)`.
pub fn is_equal(x: f64, y: f64) -> bool {
    (x - y).abs() <= DOUBLE_COMPARE_TOLERANCE * 1.0_f64.max(x.abs().max(y.abs()))
}

/// A 3-component real vector as it appears on deck cards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorialValue(Vector3<f64>);

impl VectorialValue {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        VectorialValue(Vector3::new(x, y, z))
    }

    pub fn zero() -> Self {
        VectorialValue(Vector3::zeros())
    }

    pub const X: VectorialValue = VectorialValue::new(1.0, 0.0, 0.0);
    pub const Y: VectorialValue = VectorialValue::new(0.0, 1.0, 0.0);
    pub const Z: VectorialValue = VectorialValue::new(0.0, 0.0, 1.0);

    pub fn x(&self) -> f64 {
        self.0.x
    }

    pub fn y(&self) -> f64 {
        self.0.y
    }

    pub fn z(&self) -> f64 {
        self.0.z
    }

    pub fn dot(&self, other: &VectorialValue) -> f64 {
        self.0.dot(&other.0)
    }

    pub fn cross(&self, other: &VectorialValue) -> VectorialValue {
        VectorialValue(self.0.cross(&other.0))
    }

    pub fn norm(&self) -> f64 {
        self.0.norm()
    }

    pub fn normalized(&self) -> VectorialValue {
        VectorialValue(self.0.normalize())
    }

    /// Gram-Schmidt step: this vector minus its projection on `other`, unit length.
    pub fn orthonormalized(&self, other: &VectorialValue) -> VectorialValue {
        let projection = other.0 * self.0.dot(&other.0) / other.0.norm_squared();
        VectorialValue((self.0 - projection).normalize())
    }

    pub fn scaled(&self, factor: f64) -> VectorialValue {
        VectorialValue(self.0 * factor)
    }

    pub fn add(&self, other: &VectorialValue) -> VectorialValue {
        VectorialValue(self.0 + other.0)
    }

    pub fn subtract(&self, other: &VectorialValue) -> VectorialValue {
        VectorialValue(self.0 - other.0)
    }

    pub fn is_zero(&self) -> bool {
        is_zero(self.0.norm())
    }

    pub fn iseq(&self, other: &VectorialValue) -> bool {
        is_equal(self.0.x, other.0.x)
            && is_equal(self.0.y, other.0.y)
            && is_equal(self.0.z, other.0.z)
    }

    pub fn inner(&self) -> &Vector3<f64> {
        &self.0
    }
}

/// Small dense inversion used for local bases; `None` on a singular matrix.
pub fn invert_matrix(m: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    m.try_inverse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn comparison_is_relative_for_large_values() {
        assert!(is_equal(1.0e9, 1.0e9 * (1.0 + f64::EPSILON)));
        assert!(!is_equal(1.0e9, 1.0e9 + 1.0));
        assert!(is_equal(0.0, 0.0));
        assert!(!is_equal(0.0, 1.0e-10));
    }

    #[test]
    fn cross_product_is_right_handed() {
        let z = VectorialValue::X.cross(&VectorialValue::Y);
        assert!(z.iseq(&VectorialValue::Z));
    }

    #[test]
    fn orthonormalized_removes_projection() {
        let v = VectorialValue::new(1.0, 1.0, 0.0);
        let ortho = v.orthonormalized(&VectorialValue::X);
        assert_relative_eq!(ortho.dot(&VectorialValue::X), 0.0, epsilon = 1e-12);
        assert_relative_eq!(ortho.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn invert_matrix_rejects_singular() {
        let singular = Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 0.0, 1.0);
        assert!(invert_matrix(&singular).is_none());
        let identity = Matrix3::identity();
        let inverse = invert_matrix(&identity).expect("identity inverts");
        assert_relative_eq!(inverse[(0, 0)], 1.0);
    }
}
