//! Local coordinate systems referenced by nodes, cells and loadings.

use crate::geometry::{VectorialValue, is_zero};
use crate::identifiers::{Id, Identified};

/// Reserved id of the implicit global Cartesian frame.
pub const GLOBAL_COORDINATE_SYSTEM_ID: Id = 0;

/// An orthonormal frame with an origin, all expressed in global coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Basis {
    pub origin: VectorialValue,
    pub ex: VectorialValue,
    pub ey: VectorialValue,
    pub ez: VectorialValue,
}

impl Basis {
    pub fn global() -> Basis {
        Basis {
            origin: VectorialValue::zero(),
            ex: VectorialValue::X,
            ey: VectorialValue::Y,
            ez: VectorialValue::Z,
        }
    }

    /// Build from the deck's three-point form: origin, a point on the local z
    /// axis, and a point in the local xz plane.
    pub fn from_points(
        origin: VectorialValue,
        z_point: VectorialValue,
        xz_point: VectorialValue,
    ) -> Option<Basis> {
        let ez = z_point.subtract(&origin);
        if ez.is_zero() {
            return None;
        }
        let ez = ez.normalized();
        let in_plane = xz_point.subtract(&origin);
        if in_plane.is_zero() || in_plane.cross(&ez).is_zero() {
            return None;
        }
        let ex = in_plane.orthonormalized(&ez);
        let ey = ez.cross(&ex);
        Some(Basis { origin, ex, ey, ez })
    }

    pub fn vector_to_global(&self, local: &VectorialValue) -> VectorialValue {
        self.ex
            .scaled(local.x())
            .add(&self.ey.scaled(local.y()))
            .add(&self.ez.scaled(local.z()))
    }

    pub fn point_to_global(&self, local: &VectorialValue) -> VectorialValue {
        self.origin.add(&self.vector_to_global(local))
    }

    /// Intrinsic Z-Y'-X'' angles (radians) of the rotation taking the global
    /// frame onto this one.
    pub fn euler_angles_intrinsic_zyx(&self) -> (f64, f64, f64) {
        // Rotation matrix columns are ex, ey, ez in global components.
        let r00 = self.ex.x();
        let r10 = self.ex.y();
        let r20 = self.ex.z();
        let r21 = self.ey.z();
        let r22 = self.ez.z();
        let yaw = r10.atan2(r00);
        let pitch = (-r20).asin();
        let roll = r21.atan2(r22);
        (yaw, pitch, roll)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateSystemKind {
    Cartesian,
    /// Radial/tangential/axial frame; the local base depends on the point.
    Cylindrical,
    Spherical,
    /// Orientation defined by two mesh nodes (resolved during finish()).
    TwoNodesOrientation {
        node1: Id,
        node2: Id,
    },
    /// Orientation defined by an explicit direction vector.
    VectorOrientation {
        direction: VectorialValue,
    },
}

/// A named frame owned by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateSystem {
    pub id: Id,
    pub original_id: Option<Id>,
    pub kind: CoordinateSystemKind,
    basis: Basis,
}

impl CoordinateSystem {
    pub fn new(id: Id, original_id: Option<Id>, kind: CoordinateSystemKind, basis: Basis) -> Self {
        CoordinateSystem {
            id,
            original_id,
            kind,
            basis,
        }
    }

    pub fn global() -> Self {
        CoordinateSystem::new(
            GLOBAL_COORDINATE_SYSTEM_ID,
            Some(GLOBAL_COORDINATE_SYSTEM_ID),
            CoordinateSystemKind::Cartesian,
            Basis::global(),
        )
    }

    pub fn basis(&self) -> &Basis {
        &self.basis
    }

    pub fn set_basis(&mut self, basis: Basis) {
        self.basis = basis;
    }

    /// Express a locally-written vector in the global frame, using the base
    /// as last updated by [`CoordinateSystem::update_local_base`].
    pub fn vector_to_global(&self, local: &VectorialValue) -> VectorialValue {
        self.basis.vector_to_global(local)
    }

    pub fn position_to_global(&self, local: &VectorialValue) -> VectorialValue {
        match self.kind {
            CoordinateSystemKind::Cylindrical => {
                // Local coordinates are (r, theta, z), theta in degrees.
                let theta = local.y().to_radians();
                let radial = VectorialValue::new(
                    local.x() * theta.cos(),
                    local.x() * theta.sin(),
                    local.z(),
                );
                self.basis.point_to_global(&radial)
            }
            CoordinateSystemKind::Spherical => {
                // Local coordinates are (r, theta, phi), angles in degrees.
                let theta = local.y().to_radians();
                let phi = local.z().to_radians();
                let cart = VectorialValue::new(
                    local.x() * theta.sin() * phi.cos(),
                    local.x() * theta.sin() * phi.sin(),
                    local.x() * theta.cos(),
                );
                self.basis.point_to_global(&cart)
            }
            _ => self.basis.point_to_global(local),
        }
    }

    /// Recompute the point-dependent local base for curvilinear systems.
    ///
    /// For Cartesian frames this is a no-op; for cylindrical ones the radial
    /// axis is re-aimed at `position`.
    pub fn update_local_base(&mut self, position: &VectorialValue) {
        match self.kind {
            CoordinateSystemKind::Cylindrical | CoordinateSystemKind::Spherical => {
                let relative = position.subtract(&self.basis.origin);
                let axial = self.basis.ez;
                let radial = relative.subtract(&axial.scaled(relative.dot(&axial)));
                if is_zero(radial.norm()) {
                    return;
                }
                let ur = radial.normalized();
                let utheta = axial.cross(&ur);
                self.basis.ex = ur;
                self.basis.ey = utheta;
            }
            _ => {}
        }
    }

    pub fn euler_angles_intrinsic_zyx(&self) -> (f64, f64, f64) {
        self.basis.euler_angles_intrinsic_zyx()
    }
}

impl Identified for CoordinateSystem {
    fn id(&self) -> Id {
        self.id
    }

    fn original_id(&self) -> Option<Id> {
        self.original_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn three_point_basis_is_orthonormal() {
        let basis = Basis::from_points(
            VectorialValue::new(1.0, 0.0, 0.0),
            VectorialValue::new(1.0, 0.0, 2.0),
            VectorialValue::new(3.0, 1.0, 0.0),
        )
        .expect("well-formed points");
        assert_relative_eq!(basis.ex.dot(&basis.ey), 0.0, epsilon = 1e-12);
        assert_relative_eq!(basis.ex.dot(&basis.ez), 0.0, epsilon = 1e-12);
        assert_relative_eq!(basis.ex.norm(), 1.0, epsilon = 1e-12);
        assert!(basis.ez.iseq(&VectorialValue::Z));
    }

    #[test]
    fn degenerate_points_are_rejected() {
        let origin = VectorialValue::zero();
        assert!(Basis::from_points(origin, origin, VectorialValue::X).is_none());
        // xz point on the z axis leaves ex undefined.
        assert!(
            Basis::from_points(origin, VectorialValue::Z, VectorialValue::new(0.0, 0.0, 5.0))
                .is_none()
        );
    }

    #[test]
    fn euler_angles_of_global_frame_are_zero() {
        let (yaw, pitch, roll) = Basis::global().euler_angles_intrinsic_zyx();
        assert_relative_eq!(yaw, 0.0);
        assert_relative_eq!(pitch, 0.0);
        assert_relative_eq!(roll, 0.0);
    }

    #[test]
    fn euler_angles_recover_a_z_rotation() {
        let angle = 0.7_f64;
        let basis = Basis {
            origin: VectorialValue::zero(),
            ex: VectorialValue::new(angle.cos(), angle.sin(), 0.0),
            ey: VectorialValue::new(-angle.sin(), angle.cos(), 0.0),
            ez: VectorialValue::Z,
        };
        let (yaw, pitch, roll) = basis.euler_angles_intrinsic_zyx();
        assert_relative_eq!(yaw, angle, epsilon = 1e-12);
        assert_relative_eq!(pitch, 0.0, epsilon = 1e-12);
        assert_relative_eq!(roll, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn cylindrical_base_follows_the_point() {
        let mut cs = CoordinateSystem::new(
            1,
            Some(1),
            CoordinateSystemKind::Cylindrical,
            Basis::global(),
        );
        cs.update_local_base(&VectorialValue::new(0.0, 2.0, 1.0));
        // Radial axis now points along +Y, tangential along -X.
        let global = cs.vector_to_global(&VectorialValue::new(1.0, 0.0, 0.0));
        assert!(global.iseq(&VectorialValue::Y));
        let tangential = cs.vector_to_global(&VectorialValue::new(0.0, 1.0, 0.0));
        assert!(tangential.iseq(&VectorialValue::new(-1.0, 0.0, 0.0)));
    }

    #[test]
    fn cylindrical_positions_unwrap_angles() {
        let cs = CoordinateSystem::new(
            1,
            Some(1),
            CoordinateSystemKind::Cylindrical,
            Basis::global(),
        );
        let p = cs.position_to_global(&VectorialValue::new(2.0, 90.0, 3.0));
        assert_relative_eq!(p.x(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.y(), 2.0, epsilon = 1e-12);
        assert_relative_eq!(p.z(), 3.0, epsilon = 1e-12);
    }
}
