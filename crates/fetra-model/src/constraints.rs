//! Constraints and constraint sets.

use crate::dofs::{DOF, DOFCoefs, DOFS};
use crate::geometry::VectorialValue;
use crate::identifiers::{Id, Identified};

/// Constraint-set discriminator, part of the set's reference identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintSetType {
    Spc,
    /// Imposed-displacement overrides (SPCD).
    Spcd,
    Mpc,
    Contact,
    /// The model-wide implicit set applying to every analysis.
    Common,
}

impl ConstraintSetType {
    pub fn label(self) -> &'static str {
        match self {
            ConstraintSetType::Spc => "SPC",
            ConstraintSetType::Spcd => "SPCD",
            ConstraintSetType::Mpc => "MPC",
            ConstraintSetType::Contact => "CONTACT",
            ConstraintSetType::Common => "COMMON",
        }
    }
}

/// Reference identity of a constraint set: type tag plus deck id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintSetRef {
    pub set_type: ConstraintSetType,
    pub id: Id,
}

impl ConstraintSetRef {
    pub fn new(set_type: ConstraintSetType, id: Id) -> Self {
        ConstraintSetRef { set_type, id }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSet {
    pub id: Id,
    pub original_id: Option<Id>,
    pub set_type: ConstraintSetType,
}

impl ConstraintSet {
    pub fn new(id: Id, original_id: Option<Id>, set_type: ConstraintSetType) -> Self {
        ConstraintSet {
            id,
            original_id,
            set_type,
        }
    }

    pub fn reference(&self) -> ConstraintSetRef {
        ConstraintSetRef::new(self.set_type, self.original_id.unwrap_or(self.id))
    }
}

impl Identified for ConstraintSet {
    fn id(&self) -> Id {
        self.id
    }

    fn original_id(&self) -> Option<Id> {
        self.original_id
    }
}

/// Identity shared by all constraint variants.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintBase {
    pub id: Id,
    pub original_id: Option<Id>,
}

impl ConstraintBase {
    pub fn new(id: Id, original_id: Option<Id>) -> Self {
        ConstraintBase { id, original_id }
    }
}

/// One slave participation of an RBE3 interpolation.
#[derive(Debug, Clone, PartialEq)]
pub struct Rbe3Slave {
    pub node: Id,
    pub dofs: DOFS,
    pub coefficient: f64,
}

/// One contact participation of a gap.
#[derive(Debug, Clone, PartialEq)]
pub struct GapParticipation {
    pub node1: Id,
    pub node2: Id,
    pub direction: VectorialValue,
}

/// One element face of a boundary surface, designated by two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceFace {
    pub cell: Id,
    pub node1: Option<Id>,
    pub node2: Option<Id>,
    pub swap_normal: bool,
}

/// A named set of element faces (SURF-like), targeted by sliding contact.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundarySurface {
    pub id: Id,
    pub original_id: Option<Id>,
    pub faces: Vec<SurfaceFace>,
}

impl Identified for BoundarySurface {
    fn id(&self) -> Id {
        self.id
    }

    fn original_id(&self) -> Option<Id> {
        self.original_id
    }
}

/// The closed constraint family.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Single-point constraint: a DOFS set with a per-DOF imposed value on a
    /// list of nodes.
    Spc {
        base: ConstraintBase,
        nodes: Vec<Id>,
        dofs: DOFS,
        values: DOFCoefs,
        /// Per-DOF imposed function (value reference), when time-dependent.
        functions: Vec<(DOF, Id)>,
    },
    /// Linear multi-point constraint: `sum(coef_i * u_i) = imposed`.
    Lmpc {
        base: ConstraintBase,
        imposed: f64,
        terms: Vec<(Id, DOFCoefs)>,
    },
    /// Full rigid link between a master and its slaves.
    Rigid {
        base: ConstraintBase,
        master: Id,
        slaves: Vec<Id>,
    },
    /// Rigid link on a DOF subset between two or more nodes.
    QuasiRigid {
        base: ConstraintBase,
        dofs: DOFS,
        master: Option<Id>,
        nodes: Vec<Id>,
    },
    /// Weighted interpolation (RBE3): master follows its slaves.
    Rbe3 {
        base: ConstraintBase,
        master: Id,
        master_dofs: DOFS,
        slaves: Vec<Rbe3Slave>,
    },
    /// Contact gap with an initial opening.
    Gap {
        base: ConstraintBase,
        initial_opening: f64,
        participations: Vec<GapParticipation>,
    },
    /// Sliding contact between two boundary surfaces (CONTACT-like).
    SurfaceSlide {
        base: ConstraintBase,
        /// Boundary surface (original id) the master faces belong to.
        master_surface: Id,
        /// Boundary surface (original id) the slave faces belong to.
        slave_surface: Id,
    },
}

impl Constraint {
    pub fn base(&self) -> &ConstraintBase {
        match self {
            Constraint::Spc { base, .. }
            | Constraint::Lmpc { base, .. }
            | Constraint::Rigid { base, .. }
            | Constraint::QuasiRigid { base, .. }
            | Constraint::Rbe3 { base, .. }
            | Constraint::Gap { base, .. }
            | Constraint::SurfaceSlide { base, .. } => base,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Constraint::Spc { .. } => "spc",
            Constraint::Lmpc { .. } => "lmpc",
            Constraint::Rigid { .. } => "rigid",
            Constraint::QuasiRigid { .. } => "quasi-rigid",
            Constraint::Rbe3 { .. } => "rbe3",
            Constraint::Gap { .. } => "gap",
            Constraint::SurfaceSlide { .. } => "surface-slide",
        }
    }

    /// Node ids this constraint touches.
    pub fn node_ids(&self) -> Vec<Id> {
        match self {
            Constraint::Spc { nodes, .. } => nodes.clone(),
            Constraint::Lmpc { terms, .. } => terms.iter().map(|(n, _)| *n).collect(),
            Constraint::Rigid { master, slaves, .. } => {
                let mut ids = vec![*master];
                ids.extend(slaves.iter().copied());
                ids
            }
            Constraint::QuasiRigid { master, nodes, .. } => {
                let mut ids = Vec::new();
                if let Some(m) = master {
                    ids.push(*m);
                }
                ids.extend(nodes.iter().copied());
                ids
            }
            Constraint::Rbe3 { master, slaves, .. } => {
                let mut ids = vec![*master];
                ids.extend(slaves.iter().map(|s| s.node));
                ids
            }
            Constraint::Gap { participations, .. } => participations
                .iter()
                .flat_map(|p| [p.node1, p.node2])
                .collect(),
            Constraint::SurfaceSlide { .. } => Vec::new(),
        }
    }

    /// DOFs constrained at `node` by this constraint.
    pub fn dofs_for_node(&self, node: Id) -> DOFS {
        match self {
            Constraint::Spc { nodes, dofs, .. } => {
                if nodes.contains(&node) {
                    *dofs
                } else {
                    DOFS::NONE
                }
            }
            Constraint::Lmpc { terms, .. } => terms
                .iter()
                .find(|(n, _)| *n == node)
                .map(|(_, coefs)| coefs.dofs())
                .unwrap_or(DOFS::NONE),
            Constraint::Rigid { master, slaves, .. } => {
                if *master == node || slaves.contains(&node) {
                    DOFS::ALL_DOFS
                } else {
                    DOFS::NONE
                }
            }
            Constraint::QuasiRigid { dofs, master, nodes, .. } => {
                if master.map(|m| m == node).unwrap_or(false) || nodes.contains(&node) {
                    *dofs
                } else {
                    DOFS::NONE
                }
            }
            Constraint::Rbe3 { master, master_dofs, slaves, .. } => {
                if *master == node {
                    *master_dofs
                } else {
                    slaves
                        .iter()
                        .find(|s| s.node == node)
                        .map(|s| s.dofs)
                        .unwrap_or(DOFS::NONE)
                }
            }
            Constraint::Gap { .. } | Constraint::SurfaceSlide { .. } => DOFS::NONE,
        }
    }

    /// True when the constraint can have no observable effect.
    pub fn is_ineffective(&self) -> bool {
        match self {
            Constraint::Spc { nodes, dofs, .. } => nodes.is_empty() || dofs.is_empty(),
            Constraint::Lmpc { terms, .. } => terms.iter().all(|(_, c)| c.is_zero()),
            Constraint::Rigid { slaves, .. } => slaves.is_empty(),
            Constraint::QuasiRigid { dofs, nodes, .. } => dofs.is_empty() || nodes.is_empty(),
            Constraint::Rbe3 { slaves, .. } => slaves.is_empty(),
            Constraint::Gap { participations, .. } => participations.is_empty(),
            Constraint::SurfaceSlide { .. } => false,
        }
    }
}

impl Identified for Constraint {
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

    fn spc(nodes: Vec<Id>, dofs: DOFS) -> Constraint {
        Constraint::Spc {
            base: ConstraintBase::new(1, Some(5)),
            nodes,
            dofs,
            values: DOFCoefs::default(),
            functions: Vec::new(),
        }
    }

    #[test]
    fn spc_reports_dofs_only_for_its_nodes() {
        let constraint = spc(vec![1, 5], DOFS::ALL_DOFS);
        assert_eq!(constraint.dofs_for_node(1), DOFS::ALL_DOFS);
        assert_eq!(constraint.dofs_for_node(2), DOFS::NONE);
        assert_eq!(constraint.node_ids(), vec![1, 5]);
    }

    #[test]
    fn rigid_pins_all_dofs_on_master_and_slaves() {
        let rigid = Constraint::Rigid {
            base: ConstraintBase::new(2, None),
            master: 100,
            slaves: vec![101, 102],
        };
        assert_eq!(rigid.dofs_for_node(100), DOFS::ALL_DOFS);
        assert_eq!(rigid.dofs_for_node(102), DOFS::ALL_DOFS);
        assert_eq!(rigid.dofs_for_node(999), DOFS::NONE);
    }

    #[test]
    fn empty_constraints_are_ineffective() {
        assert!(spc(vec![], DOFS::ALL_DOFS).is_ineffective());
        assert!(spc(vec![1], DOFS::NONE).is_ineffective());
        assert!(!spc(vec![1], DOFS::TRANSLATIONS).is_ineffective());
    }
}
