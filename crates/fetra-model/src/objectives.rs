//! Solution-verification assertions attached to analyses.

use crate::dofs::DOF;
use crate::identifiers::{Id, Identified};

/// A declarative check on a computed result. Owned by the model, referenced
/// by at most one analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum Assertion {
    /// Nodal displacement at one DOF, optionally at a given load step.
    NodalDisplacement {
        id: Id,
        node: Id,
        dof: DOF,
        value: f64,
        tolerance: f64,
        load_step: Option<f64>,
    },
    /// Complex nodal displacement at one DOF and excitation frequency.
    NodalComplexDisplacement {
        id: Id,
        node: Id,
        dof: DOF,
        real: f64,
        imaginary: f64,
        frequency: f64,
        tolerance: f64,
    },
    /// Eigenfrequency of mode `number`.
    Frequency {
        id: Id,
        number: i32,
        value: f64,
        tolerance: f64,
    },
}

impl Assertion {
    pub fn kind_label(&self) -> &'static str {
        match self {
            Assertion::NodalDisplacement { .. } => "nodal-displacement",
            Assertion::NodalComplexDisplacement { .. } => "nodal-complex-displacement",
            Assertion::Frequency { .. } => "frequency",
        }
    }

    /// The node and DOF the assertion reads, when nodal.
    pub fn node_dof(&self) -> Option<(Id, DOF)> {
        match self {
            Assertion::NodalDisplacement { node, dof, .. }
            | Assertion::NodalComplexDisplacement { node, dof, .. } => Some((*node, *dof)),
            Assertion::Frequency { .. } => None,
        }
    }
}

impl Identified for Assertion {
    fn id(&self) -> Id {
        match self {
            Assertion::NodalDisplacement { id, .. }
            | Assertion::NodalComplexDisplacement { id, .. }
            | Assertion::Frequency { id, .. } => *id,
        }
    }

    fn original_id(&self) -> Option<Id> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodal_assertions_expose_node_and_dof() {
        let assertion = Assertion::NodalDisplacement {
            id: -1,
            node: 4,
            dof: DOF::DZ,
            value: 0.01,
            tolerance: 0.02,
            load_step: None,
        };
        assert_eq!(assertion.node_dof(), Some((4, DOF::DZ)));

        let frequency = Assertion::Frequency {
            id: -2,
            number: 1,
            value: 150.0,
            tolerance: 0.02,
        };
        assert_eq!(frequency.node_dof(), None);
    }
}
