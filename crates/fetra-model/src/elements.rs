//! Element sets: the closed family of property assignments.
//!
//! Every variant shares the same contract: it assigns a property to the cells
//! of a cell group, usually with a material.

use crate::dofs::{DOF, DOFCoefs};
use crate::identifiers::{Id, Identified};

/// Identity and bindings shared by all element-set variants.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSetBase {
    pub id: Id,
    pub original_id: Option<Id>,
    pub material: Option<Id>,
    pub cell_group: Option<String>,
}

impl ElementSetBase {
    pub fn new(id: Id, original_id: Option<Id>) -> Self {
        ElementSetBase {
            id,
            original_id,
            material: None,
            cell_group: None,
        }
    }
}

/// One term of a direct input matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixEntry {
    pub node1: Id,
    pub dof1: DOF,
    pub node2: Id,
    pub dof2: DOF,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementSet {
    /// 3D continuum property (PSOLID-like).
    Continuum { base: ElementSetBase },
    /// Homogeneous shell with a thickness and optional distributed
    /// non-structural mass (PSHELL-like).
    Shell {
        base: ElementSetBase,
        thickness: f64,
        nonstructural_mass: f64,
    },
    /// Layered shell; `(material, thickness, orientation)` per ply.
    Composite {
        base: ElementSetBase,
        layers: Vec<(Id, f64, f64)>,
    },
    CircularSectionBeam {
        base: ElementSetBase,
        radius: f64,
    },
    RectangularSectionBeam {
        base: ElementSetBase,
        width: f64,
        height: f64,
    },
    ISectionBeam {
        base: ElementSetBase,
        height: f64,
        flange_width: f64,
        flange_thickness: f64,
        web_thickness: f64,
    },
    /// Beam given directly by area and inertias (PBAR/PBEAM-like).
    GenericSectionBeam {
        base: ElementSetBase,
        area: f64,
        iy: f64,
        iz: f64,
        torsional_constant: f64,
    },
    /// Zero-length spring at a node.
    DiscretePoint {
        base: ElementSetBase,
        stiffness: DOFCoefs,
    },
    /// Two-node spring along a segment.
    DiscreteSegment {
        base: ElementSetBase,
        stiffness: DOFCoefs,
    },
    /// Concentrated mass and inertias at a node (CONM2-like).
    NodalMass {
        base: ElementSetBase,
        mass: f64,
        ixx: f64,
        iyy: f64,
        izz: f64,
    },
    /// Generalized spring-damper with a stiffness per DOF pair (PBUSH-like).
    StructuralSegment {
        base: ElementSetBase,
        stiffness: DOFCoefs,
        damping: DOFCoefs,
    },
    StiffnessMatrix {
        base: ElementSetBase,
        entries: Vec<MatrixEntry>,
    },
    MassMatrix {
        base: ElementSetBase,
        entries: Vec<MatrixEntry>,
    },
    DampingMatrix {
        base: ElementSetBase,
        entries: Vec<MatrixEntry>,
    },
}

impl ElementSet {
    pub fn base(&self) -> &ElementSetBase {
        match self {
            ElementSet::Continuum { base }
            | ElementSet::Shell { base, .. }
            | ElementSet::Composite { base, .. }
            | ElementSet::CircularSectionBeam { base, .. }
            | ElementSet::RectangularSectionBeam { base, .. }
            | ElementSet::ISectionBeam { base, .. }
            | ElementSet::GenericSectionBeam { base, .. }
            | ElementSet::DiscretePoint { base, .. }
            | ElementSet::DiscreteSegment { base, .. }
            | ElementSet::NodalMass { base, .. }
            | ElementSet::StructuralSegment { base, .. }
            | ElementSet::StiffnessMatrix { base, .. }
            | ElementSet::MassMatrix { base, .. }
            | ElementSet::DampingMatrix { base, .. } => base,
        }
    }

    pub fn base_mut(&mut self) -> &mut ElementSetBase {
        match self {
            ElementSet::Continuum { base }
            | ElementSet::Shell { base, .. }
            | ElementSet::Composite { base, .. }
            | ElementSet::CircularSectionBeam { base, .. }
            | ElementSet::RectangularSectionBeam { base, .. }
            | ElementSet::ISectionBeam { base, .. }
            | ElementSet::GenericSectionBeam { base, .. }
            | ElementSet::DiscretePoint { base, .. }
            | ElementSet::DiscreteSegment { base, .. }
            | ElementSet::NodalMass { base, .. }
            | ElementSet::StructuralSegment { base, .. }
            | ElementSet::StiffnessMatrix { base, .. }
            | ElementSet::MassMatrix { base, .. }
            | ElementSet::DampingMatrix { base, .. } => base,
        }
    }

    pub fn material(&self) -> Option<Id> {
        self.base().material
    }

    pub fn cell_group(&self) -> Option<&str> {
        self.base().cell_group.as_deref()
    }

    pub fn is_beam(&self) -> bool {
        matches!(
            self,
            ElementSet::CircularSectionBeam { .. }
                | ElementSet::RectangularSectionBeam { .. }
                | ElementSet::ISectionBeam { .. }
                | ElementSet::GenericSectionBeam { .. }
        )
    }

    pub fn is_shell(&self) -> bool {
        matches!(self, ElementSet::Shell { .. } | ElementSet::Composite { .. })
    }

    pub fn is_discrete(&self) -> bool {
        matches!(
            self,
            ElementSet::DiscretePoint { .. }
                | ElementSet::DiscreteSegment { .. }
                | ElementSet::NodalMass { .. }
                | ElementSet::StructuralSegment { .. }
        )
    }

    pub fn is_matrix(&self) -> bool {
        matches!(
            self,
            ElementSet::StiffnessMatrix { .. }
                | ElementSet::MassMatrix { .. }
                | ElementSet::DampingMatrix { .. }
        )
    }

    pub fn matrix_entries(&self) -> Option<&[MatrixEntry]> {
        match self {
            ElementSet::StiffnessMatrix { entries, .. }
            | ElementSet::MassMatrix { entries, .. }
            | ElementSet::DampingMatrix { entries, .. } => Some(entries),
            _ => None,
        }
    }

    /// Topological dimension the member cells must have, when constrained.
    pub fn compatible_dimension(&self) -> Option<u8> {
        match self {
            ElementSet::Continuum { .. } => Some(3),
            ElementSet::Shell { .. } | ElementSet::Composite { .. } => Some(2),
            s if s.is_beam() => Some(1),
            ElementSet::DiscreteSegment { .. } | ElementSet::StructuralSegment { .. } => Some(1),
            ElementSet::DiscretePoint { .. } | ElementSet::NodalMass { .. } => Some(0),
            _ => None,
        }
    }

    /// Whether member cells carry rotational unknowns.
    pub fn carries_rotations(&self) -> bool {
        self.is_beam() || self.is_shell() || self.is_discrete()
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            ElementSet::Continuum { .. } => "continuum",
            ElementSet::Shell { .. } => "shell",
            ElementSet::Composite { .. } => "composite",
            ElementSet::CircularSectionBeam { .. } => "circular-section-beam",
            ElementSet::RectangularSectionBeam { .. } => "rectangular-section-beam",
            ElementSet::ISectionBeam { .. } => "i-section-beam",
            ElementSet::GenericSectionBeam { .. } => "generic-section-beam",
            ElementSet::DiscretePoint { .. } => "discrete-point",
            ElementSet::DiscreteSegment { .. } => "discrete-segment",
            ElementSet::NodalMass { .. } => "nodal-mass",
            ElementSet::StructuralSegment { .. } => "structural-segment",
            ElementSet::StiffnessMatrix { .. } => "stiffness-matrix",
            ElementSet::MassMatrix { .. } => "mass-matrix",
            ElementSet::DampingMatrix { .. } => "damping-matrix",
        }
    }
}

impl Identified for ElementSet {
    fn id(&self) -> Id {
        self.base().id
    }

    fn original_id(&self) -> Option<Id> {
        self.base().original_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_predicates_are_disjoint() {
        let beam = ElementSet::GenericSectionBeam {
            base: ElementSetBase::new(1, Some(1)),
            area: 1.0,
            iy: 1.0,
            iz: 1.0,
            torsional_constant: 1.0,
        };
        assert!(beam.is_beam());
        assert!(!beam.is_shell());
        assert!(!beam.is_discrete());
        assert_eq!(beam.compatible_dimension(), Some(1));

        let matrix = ElementSet::StiffnessMatrix {
            base: ElementSetBase::new(2, None),
            entries: vec![],
        };
        assert!(matrix.is_matrix());
        assert_eq!(matrix.compatible_dimension(), None);
    }

    #[test]
    fn shells_bind_dimension_two() {
        let shell = ElementSet::Shell {
            base: ElementSetBase::new(3, Some(10)),
            thickness: 0.01,
            nonstructural_mass: 0.0,
        };
        assert_eq!(shell.compatible_dimension(), Some(2));
        assert!(shell.carries_rotations());
    }
}
