//! Loadings and load sets.

use crate::coordinates::GLOBAL_COORDINATE_SYSTEM_ID;
use crate::dofs::DOF;
use crate::geometry::VectorialValue;
use crate::identifiers::{Id, Identified};
use crate::materials::CellContainer;

/// Load-set discriminator, part of the set's reference identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadSetType {
    /// Static load selection (`LOAD`).
    Load,
    /// Dynamic load selection (`DLOAD`).
    Dload,
    /// Excitation amplitude vector (`EXCITEID` / DAREA).
    ExciteId,
}

impl LoadSetType {
    pub fn label(self) -> &'static str {
        match self {
            LoadSetType::Load => "LOAD",
            LoadSetType::Dload => "DLOAD",
            LoadSetType::ExciteId => "EXCITEID",
        }
    }
}

/// Reference identity of a load set: type tag plus deck id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadSetRef {
    pub set_type: LoadSetType,
    pub id: Id,
}

impl LoadSetRef {
    pub fn new(set_type: LoadSetType, id: Id) -> Self {
        LoadSetRef { set_type, id }
    }
}

/// A named set of loadings. May linearly combine other load sets, in which
/// case `finish()` flattens it when the target requires concrete loadings.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSet {
    pub id: Id,
    pub original_id: Option<Id>,
    pub set_type: LoadSetType,
    pub embedded_loadsets: Vec<(LoadSetRef, f64)>,
}

impl LoadSet {
    pub fn new(id: Id, original_id: Option<Id>, set_type: LoadSetType) -> Self {
        LoadSet {
            id,
            original_id,
            set_type,
            embedded_loadsets: Vec::new(),
        }
    }

    pub fn reference(&self) -> LoadSetRef {
        LoadSetRef::new(self.set_type, self.original_id.unwrap_or(self.id))
    }
}

impl Identified for LoadSet {
    fn id(&self) -> Id {
        self.id
    }

    fn original_id(&self) -> Option<Id> {
        self.original_id
    }
}

/// Identity shared by all loading variants.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadingBase {
    pub id: Id,
    pub original_id: Option<Id>,
}

impl LoadingBase {
    pub fn new(id: Id, original_id: Option<Id>) -> Self {
        LoadingBase { id, original_id }
    }
}

/// The closed loading family. Nodal variants name nodes, element variants
/// name cells through a [`CellContainer`].
#[derive(Debug, Clone, PartialEq)]
pub enum Loading {
    /// Force and moment vectors at a node, written in `cs`.
    NodalForce {
        base: LoadingBase,
        node: Id,
        force: VectorialValue,
        moment: VectorialValue,
        cs: Id,
    },
    /// Force at a node whose direction is the segment between two other nodes.
    NodalForceTwoNodes {
        base: LoadingBase,
        node: Id,
        node1: Id,
        node2: Id,
        magnitude: f64,
        /// True for a moment (FORCE1 vs MOMENT1 semantics).
        is_moment: bool,
    },
    Gravity {
        base: LoadingBase,
        acceleration: f64,
        direction: VectorialValue,
    },
    /// Centrifugal load around an axis through a node (RFORCE-like).
    Rotation {
        base: LoadingBase,
        speed: f64,
        center: Id,
        axis: VectorialValue,
    },
    /// Per-DOF function along beam cells.
    ForceLine {
        base: LoadingBase,
        cells: CellContainer,
        dof: DOF,
        function: Id,
    },
    /// Constant force/moment densities over face cells.
    ForceSurface {
        base: LoadingBase,
        cells: CellContainer,
        force: VectorialValue,
        moment: VectorialValue,
    },
    /// Pressure normal to existing face cells.
    NormalPressionFace {
        base: LoadingBase,
        cells: CellContainer,
        pression: f64,
    },
    /// Pressure on the face of a volume cell designated by two nodes; the
    /// boundary-cell pass rewrites this into [`Loading::NormalPressionFace`].
    PressionFaceTwoNodes {
        base: LoadingBase,
        cell: Id,
        node1: Id,
        node2: Id,
        pression: f64,
    },
    InitialTemperature {
        base: LoadingBase,
        nodes: Vec<Id>,
        temperature: f64,
    },
    /// Frequency-domain excitation: phase + spectrum + amplitude vector.
    DynamicExcitation {
        base: LoadingBase,
        dyna_phase: Id,
        function_table: Id,
        load_set: LoadSetRef,
    },
}

impl Loading {
    pub fn base(&self) -> &LoadingBase {
        match self {
            Loading::NodalForce { base, .. }
            | Loading::NodalForceTwoNodes { base, .. }
            | Loading::Gravity { base, .. }
            | Loading::Rotation { base, .. }
            | Loading::ForceLine { base, .. }
            | Loading::ForceSurface { base, .. }
            | Loading::NormalPressionFace { base, .. }
            | Loading::PressionFaceTwoNodes { base, .. }
            | Loading::InitialTemperature { base, .. }
            | Loading::DynamicExcitation { base, .. } => base,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Loading::NodalForce { .. } => "nodal-force",
            Loading::NodalForceTwoNodes { .. } => "nodal-force-two-nodes",
            Loading::Gravity { .. } => "gravity",
            Loading::Rotation { .. } => "rotation",
            Loading::ForceLine { .. } => "force-line",
            Loading::ForceSurface { .. } => "force-surface",
            Loading::NormalPressionFace { .. } => "normal-pression-face",
            Loading::PressionFaceTwoNodes { .. } => "pression-face-two-nodes",
            Loading::InitialTemperature { .. } => "initial-temperature",
            Loading::DynamicExcitation { .. } => "dynamic-excitation",
        }
    }

    /// Node ids this loading references directly.
    pub fn node_ids(&self) -> Vec<Id> {
        match self {
            Loading::NodalForce { node, .. } => vec![*node],
            Loading::NodalForceTwoNodes {
                node, node1, node2, ..
            } => vec![*node, *node1, *node2],
            Loading::Rotation { center, .. } => vec![*center],
            Loading::PressionFaceTwoNodes { node1, node2, .. } => vec![*node1, *node2],
            Loading::InitialTemperature { nodes, .. } => nodes.clone(),
            _ => Vec::new(),
        }
    }

    /// A copy of this loading with all magnitudes scaled, under a new id.
    ///
    /// Used when flattening combined load sets.
    pub fn scaled(&self, factor: f64, new_id: Id) -> Loading {
        let mut clone = self.clone();
        match &mut clone {
            Loading::NodalForce { base, force, moment, .. } => {
                base.id = new_id;
                base.original_id = None;
                *force = force.scaled(factor);
                *moment = moment.scaled(factor);
            }
            Loading::NodalForceTwoNodes { base, magnitude, .. } => {
                base.id = new_id;
                base.original_id = None;
                *magnitude *= factor;
            }
            Loading::Gravity { base, acceleration, .. } => {
                base.id = new_id;
                base.original_id = None;
                *acceleration *= factor;
            }
            Loading::Rotation { base, speed, .. } => {
                base.id = new_id;
                base.original_id = None;
                *speed *= factor;
            }
            Loading::ForceSurface { base, force, moment, .. } => {
                base.id = new_id;
                base.original_id = None;
                *force = force.scaled(factor);
                *moment = moment.scaled(factor);
            }
            Loading::NormalPressionFace { base, pression, .. } => {
                base.id = new_id;
                base.original_id = None;
                *pression *= factor;
            }
            Loading::PressionFaceTwoNodes { base, pression, .. } => {
                base.id = new_id;
                base.original_id = None;
                *pression *= factor;
            }
            Loading::InitialTemperature { base, temperature, .. } => {
                base.id = new_id;
                base.original_id = None;
                *temperature *= factor;
            }
            Loading::ForceLine { base, .. } | Loading::DynamicExcitation { base, .. } => {
                base.id = new_id;
                base.original_id = None;
            }
        }
        clone
    }

    /// True when the loading can have no observable effect.
    pub fn is_ineffective(&self) -> bool {
        match self {
            Loading::NodalForce { force, moment, .. } => force.is_zero() && moment.is_zero(),
            Loading::NodalForceTwoNodes { magnitude, .. } => *magnitude == 0.0,
            Loading::Gravity { acceleration, direction, .. } => {
                *acceleration == 0.0 || direction.is_zero()
            }
            Loading::Rotation { speed, axis, .. } => *speed == 0.0 || axis.is_zero(),
            Loading::ForceSurface { force, moment, .. } => force.is_zero() && moment.is_zero(),
            Loading::NormalPressionFace { pression, .. } => *pression == 0.0,
            Loading::PressionFaceTwoNodes { pression, .. } => *pression == 0.0,
            _ => false,
        }
    }
}

impl Identified for Loading {
    fn id(&self) -> Id {
        self.base().id
    }

    fn original_id(&self) -> Option<Id> {
        self.base().original_id
    }
}

/// Convenience constructor for the common single-node force.
pub fn nodal_force(
    id: Id,
    original_id: Option<Id>,
    node: Id,
    force: VectorialValue,
    moment: VectorialValue,
) -> Loading {
    Loading::NodalForce {
        base: LoadingBase::new(id, original_id),
        node,
        force,
        moment,
        cs: GLOBAL_COORDINATE_SYSTEM_ID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_multiplies_magnitudes_and_renumbers() {
        let force = nodal_force(
            1,
            Some(7),
            42,
            VectorialValue::new(1.0, 0.0, 2.0),
            VectorialValue::zero(),
        );
        let scaled = force.scaled(5.0, -3);
        match &scaled {
            Loading::NodalForce { base, force, .. } => {
                assert_eq!(base.id, -3);
                assert_eq!(base.original_id, None);
                assert!(force.iseq(&VectorialValue::new(5.0, 0.0, 10.0)));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn zero_force_is_ineffective() {
        let loading = nodal_force(1, None, 4, VectorialValue::zero(), VectorialValue::zero());
        assert!(loading.is_ineffective());
        let loaded = nodal_force(2, None, 4, VectorialValue::X, VectorialValue::zero());
        assert!(!loaded.is_ineffective());
    }

    #[test]
    fn load_set_reference_prefers_original_id() {
        let set = LoadSet::new(-5, Some(10), LoadSetType::Load);
        assert_eq!(set.reference(), LoadSetRef::new(LoadSetType::Load, 10));
        let auto = LoadSet::new(-6, None, LoadSetType::Dload);
        assert_eq!(auto.reference(), LoadSetRef::new(LoadSetType::Dload, -6));
    }
}
