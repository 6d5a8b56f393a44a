//! Analyses and their auxiliary objects.

use crate::constraints::ConstraintSetRef;
use crate::identifiers::{Id, Identified};
use crate::loadings::LoadSetRef;

/// Identity, label and the ordered set selections shared by all analyses.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisBase {
    pub id: Id,
    pub original_id: Option<Id>,
    pub label: String,
    load_sets: Vec<LoadSetRef>,
    constraint_sets: Vec<ConstraintSetRef>,
    assertions: Vec<Id>,
}

impl AnalysisBase {
    pub fn new(id: Id, original_id: Option<Id>, label: &str) -> Self {
        AnalysisBase {
            id,
            original_id,
            label: label.to_string(),
            load_sets: Vec::new(),
            constraint_sets: Vec::new(),
            assertions: Vec::new(),
        }
    }

    pub fn add_load_set(&mut self, reference: LoadSetRef) {
        if !self.load_sets.contains(&reference) {
            self.load_sets.push(reference);
        }
    }

    pub fn add_constraint_set(&mut self, reference: ConstraintSetRef) {
        if !self.constraint_sets.contains(&reference) {
            self.constraint_sets.push(reference);
        }
    }

    pub fn replace_constraint_set(&mut self, from: ConstraintSetRef, to: ConstraintSetRef) {
        for reference in &mut self.constraint_sets {
            if *reference == from {
                *reference = to;
            }
        }
    }

    pub fn contains_constraint_set(&self, reference: ConstraintSetRef) -> bool {
        self.constraint_sets.contains(&reference)
    }

    pub fn load_sets(&self) -> &[LoadSetRef] {
        &self.load_sets
    }

    pub fn constraint_sets(&self) -> &[ConstraintSetRef] {
        &self.constraint_sets
    }

    pub fn add_assertion(&mut self, assertion: Id) {
        if !self.assertions.contains(&assertion) {
            self.assertions.push(assertion);
        }
    }

    pub fn remove_assertion(&mut self, assertion: Id) {
        self.assertions.retain(|a| *a != assertion);
    }

    pub fn assertions(&self) -> &[Id] {
        &self.assertions
    }
}

/// The closed analysis family.
#[derive(Debug, Clone, PartialEq)]
pub enum Analysis {
    LinearMecaStat {
        base: AnalysisBase,
    },
    NonLinearMecaStat {
        base: AnalysisBase,
        strategy: Id,
        /// Ramped continuation from an earlier subcase.
        previous: Option<Id>,
    },
    LinearModal {
        base: AnalysisBase,
        frequency_band: Id,
    },
    LinearDynaModalFreq {
        base: AnalysisBase,
        frequency_band: Id,
        modal_damping: Id,
        excitation_frequencies: Id,
        residual_vector: bool,
    },
    LinearDynaDirectFreq {
        base: AnalysisBase,
        excitation_frequencies: Id,
    },
}

impl Analysis {
    pub fn base(&self) -> &AnalysisBase {
        match self {
            Analysis::LinearMecaStat { base }
            | Analysis::NonLinearMecaStat { base, .. }
            | Analysis::LinearModal { base, .. }
            | Analysis::LinearDynaModalFreq { base, .. }
            | Analysis::LinearDynaDirectFreq { base, .. } => base,
        }
    }

    pub fn base_mut(&mut self) -> &mut AnalysisBase {
        match self {
            Analysis::LinearMecaStat { base }
            | Analysis::NonLinearMecaStat { base, .. }
            | Analysis::LinearModal { base, .. }
            | Analysis::LinearDynaModalFreq { base, .. }
            | Analysis::LinearDynaDirectFreq { base, .. } => base,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Analysis::LinearMecaStat { .. } => "linear-meca-stat",
            Analysis::NonLinearMecaStat { .. } => "nonlinear-meca-stat",
            Analysis::LinearModal { .. } => "linear-modal",
            Analysis::LinearDynaModalFreq { .. } => "linear-dyna-modal-freq",
            Analysis::LinearDynaDirectFreq { .. } => "linear-dyna-direct-freq",
        }
    }

    pub fn is_modal(&self) -> bool {
        matches!(
            self,
            Analysis::LinearModal { .. } | Analysis::LinearDynaModalFreq { .. }
        )
    }

    pub fn is_static(&self) -> bool {
        matches!(
            self,
            Analysis::LinearMecaStat { .. } | Analysis::NonLinearMecaStat { .. }
        )
    }
}

impl Identified for Analysis {
    fn id(&self) -> Id {
        self.base().id
    }

    fn original_id(&self) -> Option<Id> {
        self.base().original_id
    }
}

/// Eigenmode search band (EIGR/EIGRL-like).
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyBand {
    pub id: Id,
    pub original_id: Option<Id>,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub num_max: Option<i32>,
    pub norm: String,
}

impl Identified for FrequencyBand {
    fn id(&self) -> Id {
        self.id
    }

    fn original_id(&self) -> Option<Id> {
        self.original_id
    }
}

/// Explicit excitation frequency list (FREQ1/SET-like).
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyValues {
    pub id: Id,
    pub original_id: Option<Id>,
    pub values: Vec<f64>,
}

impl FrequencyValues {
    /// Expand an arithmetic `start, start+step, ...` specification.
    pub fn from_step(id: Id, original_id: Option<Id>, start: f64, step: f64, count: usize) -> Self {
        FrequencyValues {
            id,
            original_id,
            values: (0..count).map(|i| start + step * i as f64).collect(),
        }
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.values
    }
}

impl Identified for FrequencyValues {
    fn id(&self) -> Id {
        self.id
    }

    fn original_id(&self) -> Option<Id> {
        self.original_id
    }
}

/// Modal damping given by a damping-vs-frequency table (TABDMP1-like).
#[derive(Debug, Clone, PartialEq)]
pub struct ModalDamping {
    pub id: Id,
    pub original_id: Option<Id>,
    pub function_table: Id,
}

impl Identified for ModalDamping {
    fn id(&self) -> Id {
        self.id
    }

    fn original_id(&self) -> Option<Id> {
        self.original_id
    }
}

/// Increment strategy of a nonlinear static analysis (NLPARM-like).
#[derive(Debug, Clone, PartialEq)]
pub struct NonLinearStrategy {
    pub id: Id,
    pub original_id: Option<Id>,
    pub number_of_increments: i32,
    pub max_iterations: i32,
}

impl Identified for NonLinearStrategy {
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
    use crate::constraints::ConstraintSetType;
    use crate::loadings::LoadSetType;

    #[test]
    fn set_references_stay_ordered_and_unique() {
        let mut base = AnalysisBase::new(1, Some(1), "Analysis_1");
        let spc = ConstraintSetRef::new(ConstraintSetType::Spc, 3);
        let mpc = ConstraintSetRef::new(ConstraintSetType::Mpc, 4);
        base.add_constraint_set(spc);
        base.add_constraint_set(mpc);
        base.add_constraint_set(spc);
        assert_eq!(base.constraint_sets(), &[spc, mpc]);

        let load = LoadSetRef::new(LoadSetType::Load, 10);
        base.add_load_set(load);
        base.add_load_set(load);
        assert_eq!(base.load_sets(), &[load]);
    }

    #[test]
    fn replace_constraint_set_swaps_in_place() {
        let mut base = AnalysisBase::new(1, None, "a");
        let original = ConstraintSetRef::new(ConstraintSetType::Spc, 3);
        let clone = ConstraintSetRef::new(ConstraintSetType::Spc, -7);
        base.add_constraint_set(original);
        base.replace_constraint_set(original, clone);
        assert!(base.contains_constraint_set(clone));
        assert!(!base.contains_constraint_set(original));
    }

    #[test]
    fn frequency_values_expand() {
        let values = FrequencyValues::from_step(1, Some(8), 20.0, 10.0, 3);
        assert_eq!(values.frequencies(), &[20.0, 30.0, 40.0]);
    }
}
