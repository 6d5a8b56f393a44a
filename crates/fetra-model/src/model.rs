//! The intermediate model: sole owner of every entity, keeper of the global
//! invariants, and host of the `finish()` normalisation pipeline.

use std::collections::HashMap;

use thiserror::Error;

use crate::analysis::{
    Analysis, AnalysisBase, FrequencyBand, FrequencyValues, ModalDamping, NonLinearStrategy,
};
use crate::cells::CellType;
use crate::configuration::{ModelConfiguration, Rbe2TranslationMode};
use crate::constraints::{
    BoundarySurface, Constraint, ConstraintBase, ConstraintSet, ConstraintSetRef,
    ConstraintSetType,
};
use crate::coordinates::{CoordinateSystem, CoordinateSystemKind, GLOBAL_COORDINATE_SYSTEM_ID};
use crate::dofs::{DOF, DOFCoefs, DOFS};
use crate::elements::{ElementSet, ElementSetBase};
use crate::geometry::{VectorialValue, is_equal};
use crate::identifiers::{AutoIdSource, Collection, Id, Identified};
use crate::loadings::{LoadSet, LoadSetRef, Loading};
use crate::materials::{CellContainer, Material, MaterialAssignment, Nature};
use crate::mesh::{Mesh, MeshError};
use crate::objectives::Assertion;
use crate::values::Value;

pub type ModelResult<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    /// A `validate()` check failed; fatal regardless of translation mode.
    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error(transparent)]
    Mesh(#[from] MeshError),
}

/// Deck id of the common constraint set; it never collides with user sets
/// because its type tag is distinct.
const COMMON_SET_ID: Id = 0;

/// User-facing tag of an entity: its deck id when it has one, else the
/// magnitude of its synthesised id.
fn entity_tag<T: Identified>(entity: &T) -> Id {
    entity.original_id().unwrap_or_else(|| entity.id().abs())
}

/// A typed FE simulation: mesh, physics, analyses and assertions.
///
/// All entities live in insertion-ordered collections; other entities refer
/// to them by stable reference (type tag + id), resolved here in O(1).
#[derive(Debug)]
pub struct Model {
    pub name: String,
    pub title: String,
    pub description: String,
    /// Dialect the model was read from, echoed into output headers.
    pub input_solver: String,
    pub configuration: ModelConfiguration,
    /// Set when a MESH_AT_LEAST translation degraded the model.
    pub only_mesh: bool,
    pub mesh: Mesh,
    coordinate_systems: Collection<CoordinateSystem>,
    materials: Collection<Material>,
    material_assignments: Vec<MaterialAssignment>,
    element_sets: Collection<ElementSet>,
    values: Collection<Value>,
    loadings: Collection<Loading>,
    load_sets: Collection<LoadSet>,
    constraints: Collection<Constraint>,
    constraint_sets: Collection<ConstraintSet>,
    surfaces: Collection<BoundarySurface>,
    analyses: Collection<Analysis>,
    assertions: Collection<Assertion>,
    frequency_bands: Collection<FrequencyBand>,
    frequency_values: Collection<FrequencyValues>,
    modal_dampings: Collection<ModalDamping>,
    strategies: Collection<NonLinearStrategy>,
    loadset_members: HashMap<LoadSetRef, Vec<Id>>,
    cset_members: HashMap<ConstraintSetRef, Vec<Id>>,
    loadset_ids: HashMap<LoadSetRef, Id>,
    cset_ids: HashMap<ConstraintSetRef, Id>,
    common_set: ConstraintSetRef,
    auto_ids: AutoIdSource,
    finished: bool,
}

impl Model {
    pub fn new(name: &str, input_solver: &str, configuration: ModelConfiguration) -> Self {
        let mut model = Model {
            name: name.to_string(),
            title: String::new(),
            description: String::new(),
            input_solver: input_solver.to_string(),
            configuration,
            only_mesh: false,
            mesh: Mesh::new(name),
            coordinate_systems: Collection::new(),
            materials: Collection::new(),
            material_assignments: Vec::new(),
            element_sets: Collection::new(),
            values: Collection::new(),
            loadings: Collection::new(),
            load_sets: Collection::new(),
            constraints: Collection::new(),
            constraint_sets: Collection::new(),
            surfaces: Collection::new(),
            analyses: Collection::new(),
            assertions: Collection::new(),
            frequency_bands: Collection::new(),
            frequency_values: Collection::new(),
            modal_dampings: Collection::new(),
            strategies: Collection::new(),
            loadset_members: HashMap::new(),
            cset_members: HashMap::new(),
            loadset_ids: HashMap::new(),
            cset_ids: HashMap::new(),
            common_set: ConstraintSetRef::new(ConstraintSetType::Common, COMMON_SET_ID),
            auto_ids: AutoIdSource::default(),
            finished: false,
        };
        model
            .coordinate_systems
            .add(CoordinateSystem::global());
        // The common set exists from the start with a well-known handle.
        let common = model.common_set;
        model.get_or_create_constraint_set(common);
        model
    }

    /// Draw a fresh synthesised id.
    pub fn next_auto_id(&mut self) -> Id {
        self.auto_ids.next_id()
    }

    // ----- coordinate systems -----

    pub fn add_coordinate_system(&mut self, cs: CoordinateSystem) -> Id {
        self.coordinate_systems.add(cs)
    }

    pub fn find_coordinate_system(&self, original_id: Id) -> Option<&CoordinateSystem> {
        if original_id == GLOBAL_COORDINATE_SYSTEM_ID {
            return self.coordinate_systems.find(GLOBAL_COORDINATE_SYSTEM_ID);
        }
        self.coordinate_systems.find_by_original(original_id)
    }

    pub fn coordinate_systems(&self) -> &Collection<CoordinateSystem> {
        &self.coordinate_systems
    }

    // ----- materials -----

    pub fn add_material(&mut self, material: Material) -> Id {
        self.materials.add(material)
    }

    pub fn find_material(&self, id: Id) -> Option<&Material> {
        self.materials.find(id)
    }

    pub fn find_material_by_original(&self, original_id: Id) -> Option<&Material> {
        self.materials.find_by_original(original_id)
    }

    pub fn find_material_by_original_mut(&mut self, original_id: Id) -> Option<&mut Material> {
        self.materials.find_by_original_mut(original_id)
    }

    pub fn materials(&self) -> &Collection<Material> {
        &self.materials
    }

    /// Internal id of the material with this deck id, creating an empty
    /// placeholder when the MAT card has not been seen yet.
    pub fn get_or_create_material(&mut self, original_id: Id) -> Id {
        if let Some(material) = self.materials.find_by_original(original_id) {
            return material.id;
        }
        let id = self.next_auto_id();
        self.materials
            .add(Material::new(id, Some(original_id), None))
    }

    pub fn assign_material(&mut self, material: Id, container: CellContainer) {
        self.material_assignments.push(MaterialAssignment {
            material,
            container,
        });
    }

    pub fn material_assignments(&self) -> &[MaterialAssignment] {
        &self.material_assignments
    }

    // ----- element sets -----

    pub fn add_element_set(&mut self, element_set: ElementSet) -> Id {
        self.element_sets.add(element_set)
    }

    pub fn find_element_set(&self, id: Id) -> Option<&ElementSet> {
        self.element_sets.find(id)
    }

    pub fn find_element_set_by_original(&self, original_id: Id) -> Option<&ElementSet> {
        self.element_sets.find_by_original(original_id)
    }

    pub fn find_element_set_by_original_mut(
        &mut self,
        original_id: Id,
    ) -> Option<&mut ElementSet> {
        self.element_sets.find_by_original_mut(original_id)
    }

    pub fn element_sets(&self) -> &Collection<ElementSet> {
        &self.element_sets
    }

    pub fn element_sets_mut(&mut self) -> &mut Collection<ElementSet> {
        &mut self.element_sets
    }

    // ----- values -----

    pub fn add_value(&mut self, value: Value) -> Id {
        self.values.add(value)
    }

    pub fn find_value_by_original(&self, original_id: Id) -> Option<&Value> {
        self.values.find_by_original(original_id)
    }

    pub fn find_value(&self, id: Id) -> Option<&Value> {
        self.values.find(id)
    }

    pub fn values(&self) -> &Collection<Value> {
        &self.values
    }

    // ----- load sets and loadings -----

    /// Register a load set, merging with any placeholder created earlier by
    /// an analysis or loading referring to it.
    pub fn add_load_set(&mut self, load_set: LoadSet) -> Id {
        let reference = load_set.reference();
        if let Some(&existing) = self.loadset_ids.get(&reference) {
            if let Some(slot) = self.load_sets.find_mut(existing) {
                slot.embedded_loadsets = load_set.embedded_loadsets;
                return existing;
            }
        }
        let id = load_set.id;
        self.loadset_ids.insert(reference, id);
        self.loadset_members.entry(reference).or_default();
        self.load_sets.add(load_set)
    }

    pub fn get_or_create_load_set(&mut self, reference: LoadSetRef) -> Id {
        if let Some(&id) = self.loadset_ids.get(&reference) {
            return id;
        }
        let id = self.next_auto_id();
        let set = LoadSet::new(id, Some(reference.id), reference.set_type);
        self.loadset_ids.insert(reference, id);
        self.loadset_members.entry(reference).or_default();
        self.load_sets.add(set)
    }

    pub fn find_load_set(&self, reference: LoadSetRef) -> Option<&LoadSet> {
        self.loadset_ids
            .get(&reference)
            .and_then(|id| self.load_sets.find(*id))
    }

    pub fn load_sets(&self) -> &Collection<LoadSet> {
        &self.load_sets
    }

    /// Add a loading and place it into a load set, creating the set on demand.
    pub fn add_loading_into_loadset(&mut self, loading: Loading, reference: LoadSetRef) -> Id {
        self.get_or_create_load_set(reference);
        let id = self.loadings.add(loading);
        let members = self.loadset_members.entry(reference).or_default();
        if !members.contains(&id) {
            members.push(id);
        }
        id
    }

    pub fn get_loadings_by_loadset(&self, reference: LoadSetRef) -> Vec<&Loading> {
        match self.loadset_members.get(&reference) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.loadings.find(*id))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn loadings(&self) -> &Collection<Loading> {
        &self.loadings
    }

    fn remove_loading(&mut self, id: Id) {
        self.loadings.remove(id);
        for members in self.loadset_members.values_mut() {
            members.retain(|m| *m != id);
        }
    }

    // ----- constraint sets and constraints -----

    /// Register a constraint set, merging with any placeholder.
    pub fn add_constraint_set(&mut self, constraint_set: ConstraintSet) -> Id {
        let reference = constraint_set.reference();
        if let Some(&existing) = self.cset_ids.get(&reference) {
            return existing;
        }
        let id = constraint_set.id;
        self.cset_ids.insert(reference, id);
        self.cset_members.entry(reference).or_default();
        self.constraint_sets.add(constraint_set)
    }

    pub fn get_or_create_constraint_set(&mut self, reference: ConstraintSetRef) -> Id {
        if let Some(&id) = self.cset_ids.get(&reference) {
            return id;
        }
        let id = self.next_auto_id();
        let set = ConstraintSet::new(id, Some(reference.id), reference.set_type);
        self.cset_ids.insert(reference, id);
        self.cset_members.entry(reference).or_default();
        self.constraint_sets.add(set)
    }

    pub fn find_constraint_set(&self, reference: ConstraintSetRef) -> Option<&ConstraintSet> {
        self.cset_ids
            .get(&reference)
            .and_then(|id| self.constraint_sets.find(*id))
    }

    pub fn constraint_sets(&self) -> &Collection<ConstraintSet> {
        &self.constraint_sets
    }

    pub fn add_constraint(&mut self, constraint: Constraint) -> Id {
        self.constraints.add(constraint)
    }

    pub fn find_constraint(&self, id: Id) -> Option<&Constraint> {
        self.constraints.find(id)
    }

    pub fn constraints(&self) -> &Collection<Constraint> {
        &self.constraints
    }

    pub fn add_constraint_into_constraint_set(
        &mut self,
        constraint: Id,
        reference: ConstraintSetRef,
    ) {
        self.get_or_create_constraint_set(reference);
        let members = self.cset_members.entry(reference).or_default();
        if !members.contains(&constraint) {
            members.push(constraint);
        }
    }

    /// The model-wide implicit constraint set applying to every analysis.
    pub fn common_constraint_set(&self) -> ConstraintSetRef {
        self.common_set
    }

    pub fn add_common_constraint(&mut self, constraint: Id) {
        let common = self.common_set;
        self.add_constraint_into_constraint_set(constraint, common);
    }

    pub fn get_constraints_by_constraint_set(
        &self,
        reference: ConstraintSetRef,
    ) -> Vec<&Constraint> {
        match self.cset_members.get(&reference) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.constraints.find(*id))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Every constraint set containing the given constraint, in set
    /// declaration order.
    pub fn get_constraint_sets_by_constraint(&self, constraint: Id) -> Vec<ConstraintSetRef> {
        self.constraint_sets
            .iter()
            .map(ConstraintSet::reference)
            .filter(|reference| {
                self.cset_members
                    .get(reference)
                    .map(|members| members.contains(&constraint))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// The constraint sets active for an analysis: its own selections plus
    /// the common set.
    pub fn active_constraint_sets(&self, analysis: &Analysis) -> Vec<ConstraintSetRef> {
        let mut sets: Vec<ConstraintSetRef> = analysis.base().constraint_sets().to_vec();
        if !sets.contains(&self.common_set) {
            sets.push(self.common_set);
        }
        sets
    }

    fn remove_constraint(&mut self, id: Id) {
        self.constraints.remove(id);
        for members in self.cset_members.values_mut() {
            members.retain(|m| *m != id);
        }
    }

    // ----- boundary surfaces -----

    pub fn add_boundary_surface(&mut self, surface: BoundarySurface) -> Id {
        self.surfaces.add(surface)
    }

    pub fn find_boundary_surface_by_original(&self, original_id: Id) -> Option<&BoundarySurface> {
        self.surfaces.find_by_original(original_id)
    }

    pub fn boundary_surfaces(&self) -> &Collection<BoundarySurface> {
        &self.surfaces
    }

    // ----- analyses, assertions, auxiliaries -----

    pub fn add_analysis(&mut self, analysis: Analysis) -> Id {
        self.analyses.add(analysis)
    }

    pub fn analyses(&self) -> &Collection<Analysis> {
        &self.analyses
    }

    pub fn analyses_mut(&mut self) -> &mut Collection<Analysis> {
        &mut self.analyses
    }

    pub fn find_analysis_by_original(&self, original_id: Id) -> Option<&Analysis> {
        self.analyses.find_by_original(original_id)
    }

    pub fn add_assertion(&mut self, assertion: Assertion) -> Id {
        self.assertions.add(assertion)
    }

    pub fn find_assertion(&self, id: Id) -> Option<&Assertion> {
        self.assertions.find(id)
    }

    pub fn assertions(&self) -> &Collection<Assertion> {
        &self.assertions
    }

    pub fn add_frequency_band(&mut self, band: FrequencyBand) -> Id {
        self.frequency_bands.add(band)
    }

    pub fn find_frequency_band_by_original(&self, original_id: Id) -> Option<&FrequencyBand> {
        self.frequency_bands.find_by_original(original_id)
    }

    pub fn find_frequency_band(&self, id: Id) -> Option<&FrequencyBand> {
        self.frequency_bands.find(id)
    }

    pub fn add_frequency_values(&mut self, values: FrequencyValues) -> Id {
        self.frequency_values.add(values)
    }

    pub fn find_frequency_values_by_original(&self, original_id: Id) -> Option<&FrequencyValues> {
        self.frequency_values.find_by_original(original_id)
    }

    pub fn find_frequency_values(&self, id: Id) -> Option<&FrequencyValues> {
        self.frequency_values.find(id)
    }

    pub fn add_modal_damping(&mut self, damping: ModalDamping) -> Id {
        self.modal_dampings.add(damping)
    }

    pub fn find_modal_damping_by_original(&self, original_id: Id) -> Option<&ModalDamping> {
        self.modal_dampings.find_by_original(original_id)
    }

    pub fn find_modal_damping(&self, id: Id) -> Option<&ModalDamping> {
        self.modal_dampings.find(id)
    }

    pub fn add_strategy(&mut self, strategy: NonLinearStrategy) -> Id {
        self.strategies.add(strategy)
    }

    pub fn find_strategy_by_original(&self, original_id: Id) -> Option<&NonLinearStrategy> {
        self.strategies.find_by_original(original_id)
    }

    pub fn find_strategy(&self, id: Id) -> Option<&NonLinearStrategy> {
        self.strategies.find(id)
    }

    /// Narrow an SPC for one analysis after an SPCD override.
    ///
    /// The analysis gets a clone of every constraint set containing the SPC,
    /// in which the SPC no longer constrains `dofs` at `node`; other analyses
    /// keep seeing the original sets untouched.
    pub fn remove_spc_node_dofs(
        &mut self,
        analysis: Id,
        spc: Id,
        node: Id,
        dofs: DOFS,
    ) -> ModelResult<()> {
        let original = self
            .constraints
            .find(spc)
            .cloned()
            .ok_or_else(|| ModelError::Invariant(format!("unknown constraint {spc}")))?;
        let (nodes, spc_dofs, values, functions) = match original {
            Constraint::Spc {
                nodes,
                dofs,
                values,
                functions,
                ..
            } => (nodes, dofs, values, functions),
            _ => {
                return Err(ModelError::Invariant(format!(
                    "constraint {spc} is not an SPC"
                )));
            }
        };

        let containing = self.get_constraint_sets_by_constraint(spc);
        let analysis_sets: Vec<ConstraintSetRef> = {
            let a = self
                .analyses
                .find(analysis)
                .ok_or_else(|| ModelError::Invariant(format!("unknown analysis {analysis}")))?;
            self.active_constraint_sets(a)
        };

        for set_ref in containing {
            if !analysis_sets.contains(&set_ref) {
                continue;
            }
            // Clone the set without the original SPC.
            let clone_id = self.next_auto_id();
            let clone_ref = ConstraintSetRef::new(set_ref.set_type, clone_id);
            self.add_constraint_set(ConstraintSet::new(clone_id, None, set_ref.set_type));
            let members: Vec<Id> = self
                .cset_members
                .get(&set_ref)
                .cloned()
                .unwrap_or_default();
            for member in members {
                if member != spc {
                    self.add_constraint_into_constraint_set(member, clone_ref);
                    continue;
                }
                // The narrowed SPC: same nodes except `node`, plus `node`
                // with the overridden DOFs removed.
                let other_nodes: Vec<Id> = nodes.iter().copied().filter(|n| *n != node).collect();
                if !other_nodes.is_empty() {
                    let id = self.next_auto_id();
                    let untouched = Constraint::Spc {
                        base: ConstraintBase::new(id, None),
                        nodes: other_nodes,
                        dofs: spc_dofs,
                        values,
                        functions: functions.clone(),
                    };
                    let untouched_id = self.add_constraint(untouched);
                    self.add_constraint_into_constraint_set(untouched_id, clone_ref);
                }
                let remaining = spc_dofs - dofs;
                if !remaining.is_empty() {
                    let id = self.next_auto_id();
                    let narrowed = Constraint::Spc {
                        base: ConstraintBase::new(id, None),
                        nodes: vec![node],
                        dofs: remaining,
                        values,
                        functions: functions.clone(),
                    };
                    let narrowed_id = self.add_constraint(narrowed);
                    self.add_constraint_into_constraint_set(narrowed_id, clone_ref);
                }
            }
            if set_ref == self.common_set {
                // The common set applies implicitly; the analysis now opts
                // into the clone explicitly instead.
                if let Some(a) = self.analyses.find_mut(analysis) {
                    a.base_mut().add_constraint_set(clone_ref);
                }
                continue;
            }
            if let Some(a) = self.analyses.find_mut(analysis) {
                a.base_mut().replace_constraint_set(set_ref, clone_ref);
            }
        }
        Ok(())
    }

    /// DOFs materialised at each node by the real elements connected to it.
    pub fn materialized_node_dofs(&self) -> HashMap<Id, DOFS> {
        let mut map: HashMap<Id, DOFS> = HashMap::new();
        for element_set in &self.element_sets {
            let dofs = if element_set.carries_rotations() {
                DOFS::ALL_DOFS
            } else {
                DOFS::TRANSLATIONS
            };
            if let Some(entries) = element_set.matrix_entries() {
                for entry in entries {
                    let d1 = map.entry(entry.node1).or_insert(DOFS::NONE);
                    *d1 = *d1 + entry.dof1;
                    let d2 = map.entry(entry.node2).or_insert(DOFS::NONE);
                    *d2 = *d2 + entry.dof2;
                }
                continue;
            }
            let Some(group_name) = element_set.cell_group() else {
                continue;
            };
            let Some(group) = self.mesh.find_cell_group(group_name) else {
                continue;
            };
            for cell_id in group.cell_ids() {
                if let Some(cell) = self.mesh.find_cell(*cell_id) {
                    for node_id in &cell.node_ids {
                        let entry = map.entry(*node_id).or_insert(DOFS::NONE);
                        *entry = *entry + dofs;
                    }
                }
            }
        }
        map
    }
}

// ---------------------------------------------------------------------------
// The finish() normalisation pipeline
// ---------------------------------------------------------------------------

impl Model {
    /// Run the target-selected normalisation passes, in a fixed order.
    ///
    /// Deterministic (insertion-ordered iteration, descending synthesised
    /// ids) and idempotent: a second call is a no-op.
    pub fn finish(&mut self) -> ModelResult<()> {
        if self.finished {
            return Ok(());
        }

        self.resolve_references_and_defaults()?;
        if self.configuration.auto_detect_analysis {
            self.auto_detect_analysis();
        }
        if self.configuration.split_direct_matrices {
            self.split_direct_matrices();
        }
        if self.configuration.make_cells_from_direct_matrices {
            self.make_cells_from_direct_matrices()?;
        }
        if self.configuration.replace_rigid_segments {
            self.replace_rigid_segments()?;
        }
        if self.configuration.make_cells_from_rbe {
            self.make_cells_from_rbe3()?;
        }
        if self.configuration.make_cells_from_lmpc {
            self.make_cells_from_lmpc()?;
        }
        if self.configuration.make_cells_from_surface_slide {
            self.make_cells_from_surface_slide()?;
        }
        if self.configuration.replace_combined_load_sets {
            self.replace_combined_load_sets();
        }
        if self.configuration.emulate_additional_mass {
            self.emulate_additional_mass()?;
        }
        if self.configuration.emulate_local_displacement {
            self.emulate_local_displacement()?;
        }
        if self.configuration.virtual_discrets {
            self.add_virtual_discrets()?;
        }
        if self.configuration.add_virtual_material {
            self.add_virtual_material();
        }
        if self.configuration.create_skin {
            self.create_skin()?;
        }
        if self.configuration.make_boundary_cells {
            self.make_boundary_cells()?;
        }
        if self.configuration.remove_ineffectives {
            self.remove_ineffectives();
        }
        if self.configuration.remove_redundant_spcs {
            self.remove_redundant_spcs();
        }
        if self.configuration.remove_constrained_imposed {
            self.remove_constrained_imposed();
        }
        if self.configuration.split_elements_by_dofs {
            self.split_elements_by_dofs();
        }
        if self.configuration.remove_ineffectives {
            self.remove_ineffective_assertions();
        }

        self.finished = true;
        Ok(())
    }

    /// Pass 1: every reference must resolve, orientation systems get their
    /// bases, and locally-written node positions are globalized.
    fn resolve_references_and_defaults(&mut self) -> ModelResult<()> {
        // Materialise two-node orientation bases from node positions.
        let mut resolved_bases: Vec<(Id, crate::coordinates::Basis)> = Vec::new();
        for cs in self.coordinate_systems.iter() {
            if let CoordinateSystemKind::TwoNodesOrientation { node1, node2 } = cs.kind {
                let n1 = self.mesh.find_node(node1).ok_or_else(|| {
                    ModelError::Invariant(format!(
                        "coordinate system {} references unknown node {node1}",
                        cs.id
                    ))
                })?;
                let n2 = self.mesh.find_node(node2).ok_or_else(|| {
                    ModelError::Invariant(format!(
                        "coordinate system {} references unknown node {node2}",
                        cs.id
                    ))
                })?;
                let ex = n2.position().subtract(&n1.position());
                if ex.is_zero() {
                    return Err(ModelError::Invariant(format!(
                        "coordinate system {} has coincident nodes",
                        cs.id
                    )));
                }
                let ex = ex.normalized();
                // Any stable perpendicular completes the frame.
                let helper = if ex.cross(&VectorialValue::Z).is_zero() {
                    VectorialValue::X
                } else {
                    VectorialValue::Z
                };
                let ey = helper.cross(&ex).normalized();
                let ez = ex.cross(&ey);
                resolved_bases.push((
                    cs.id,
                    crate::coordinates::Basis {
                        origin: n1.position(),
                        ex,
                        ey,
                        ez,
                    },
                ));
            }
        }
        for (id, basis) in resolved_bases {
            if let Some(cs) = self.coordinate_systems.find_mut(id) {
                cs.set_basis(basis);
            }
        }

        // Globalize node positions written in a local frame.
        let mut updates: Vec<(Id, f64, f64, f64)> = Vec::new();
        for node in self.mesh.nodes() {
            if node.position_cs == GLOBAL_COORDINATE_SYSTEM_ID {
                continue;
            }
            let cs = self.find_coordinate_system(node.position_cs).ok_or_else(|| {
                ModelError::Invariant(format!(
                    "node {} references unknown position system {}",
                    node.id, node.position_cs
                ))
            })?;
            let global = cs.position_to_global(&node.position());
            updates.push((node.id, global.x(), global.y(), global.z()));
        }
        for (id, x, y, z) in updates {
            self.mesh.update_node_coords(id, x, y, z)?;
        }

        // Displacement systems must exist even if kept local for now.
        for node in self.mesh.nodes() {
            if node.displacement_cs != GLOBAL_COORDINATE_SYSTEM_ID
                && self.find_coordinate_system(node.displacement_cs).is_none()
            {
                return Err(ModelError::Invariant(format!(
                    "node {} references unknown displacement system {}",
                    node.id, node.displacement_cs
                )));
            }
        }
        Ok(())
    }

    /// Pass 2: a deck without analyses gets a default static one selecting
    /// every declared set.
    fn auto_detect_analysis(&mut self) {
        if !self.analyses.is_empty() {
            return;
        }
        let id = self.next_auto_id();
        let mut base = AnalysisBase::new(id, None, "Analysis_auto");
        for load_set in self.load_sets.iter() {
            base.add_load_set(load_set.reference());
        }
        let common = self.common_set;
        for constraint_set in self.constraint_sets.iter() {
            let reference = constraint_set.reference();
            if reference != common {
                base.add_constraint_set(reference);
            }
        }
        log::debug!("no analysis declared, synthesising a default static one");
        self.analyses.add(Analysis::LinearMecaStat { base });
    }

    /// Pass 3a: break direct matrices above the configured size.
    fn split_direct_matrices(&mut self) {
        let size = self.configuration.size_direct_matrices.max(1);
        let oversized: Vec<Id> = self
            .element_sets
            .iter()
            .filter(|set| {
                set.matrix_entries()
                    .map(|entries| entries.len() > size)
                    .unwrap_or(false)
            })
            .map(|set| set.id())
            .collect();
        for set_id in oversized {
            let Some(set) = self.element_sets.find(set_id).cloned() else {
                continue;
            };
            let entries = set.matrix_entries().unwrap_or(&[]).to_vec();
            let chunks: Vec<Vec<crate::elements::MatrixEntry>> =
                entries.chunks(size).map(|c| c.to_vec()).collect();
            // First chunk replaces the original in place.
            if let Some(slot) = self.element_sets.find_mut(set_id) {
                match slot {
                    ElementSet::StiffnessMatrix { entries, .. }
                    | ElementSet::MassMatrix { entries, .. }
                    | ElementSet::DampingMatrix { entries, .. } => {
                        *entries = chunks.first().cloned().unwrap_or_default();
                    }
                    _ => {}
                }
            }
            for chunk in chunks.into_iter().skip(1) {
                let id = self.next_auto_id();
                let base = ElementSetBase::new(id, None);
                let split = match set {
                    ElementSet::StiffnessMatrix { .. } => {
                        ElementSet::StiffnessMatrix { base, entries: chunk }
                    }
                    ElementSet::MassMatrix { .. } => {
                        ElementSet::MassMatrix { base, entries: chunk }
                    }
                    _ => ElementSet::DampingMatrix { base, entries: chunk },
                };
                self.element_sets.add(split);
            }
        }
    }

    /// Pass 3b: one cell per matrix node pair, so targets without direct
    /// matrix input see ordinary (special) elements.
    fn make_cells_from_direct_matrices(&mut self) -> ModelResult<()> {
        let matrix_ids: Vec<Id> = self
            .element_sets
            .iter()
            .filter(|set| set.is_matrix() && set.cell_group().is_none())
            .map(|set| set.id())
            .collect();
        for set_id in matrix_ids {
            let entries = match self.element_sets.find(set_id).and_then(|s| s.matrix_entries()) {
                Some(entries) => entries.to_vec(),
                None => continue,
            };
            let group_name = format!("DIRMAT_{}", set_id.abs());
            let mut pairs: Vec<(Id, Id)> = Vec::new();
            for entry in &entries {
                let pair = if entry.node1 <= entry.node2 {
                    (entry.node1, entry.node2)
                } else {
                    (entry.node2, entry.node1)
                };
                if !pairs.contains(&pair) {
                    pairs.push(pair);
                }
            }
            let mut cell_ids = Vec::new();
            for (n1, n2) in pairs {
                let position = if n1 == n2 {
                    self.mesh.add_cell(None, CellType::Point1, vec![n1], None)?
                } else {
                    self.mesh.add_cell(None, CellType::Seg2, vec![n1, n2], None)?
                };
                cell_ids.push(self.mesh.cells()[position].id);
            }
            let group = self.mesh.find_or_create_cell_group(&group_name);
            for cell_id in cell_ids {
                group.add_cell_id(cell_id);
            }
            if let Some(slot) = self.element_sets.find_mut(set_id) {
                slot.base_mut().cell_group = Some(group_name);
            }
        }
        Ok(())
    }

    fn rigid_material(&mut self, lagrangian: bool, rigidity: Option<f64>) -> Id {
        let wanted = Nature::Rigid {
            rigidity,
            lagrangian,
        };
        if let Some(existing) = self.materials.iter().find(|m| {
            m.natures()
                .iter()
                .any(|n| *n == wanted)
        }) {
            return existing.id;
        }
        let id = self.next_auto_id();
        let mut material = Material::new(id, None, Some("RIGID".to_string()));
        material.add_nature(wanted);
        self.materials.add(material)
    }

    /// Pass 4: rigid and quasi-rigid constraints become segment cells with a
    /// rigid material (Lagrangian or penalty form).
    fn replace_rigid_segments(&mut self) -> ModelResult<()> {
        let rigid_ids: Vec<Id> = self
            .constraints
            .iter()
            .filter(|c| matches!(c, Constraint::Rigid { .. } | Constraint::QuasiRigid { .. }))
            .map(|c| c.id())
            .collect();
        if rigid_ids.is_empty() {
            return Ok(());
        }
        let penalty = matches!(
            self.configuration.rbe2_translation_mode,
            Rbe2TranslationMode::Penalty
        );
        let rigidity = self.configuration.rbe2_rigidity;
        let material =
            self.rigid_material(!penalty, if penalty { Some(rigidity) } else { None });

        for constraint_id in rigid_ids {
            let Some(constraint) = self.constraints.find(constraint_id).cloned() else {
                continue;
            };
            let (master, slaves) = match &constraint {
                Constraint::Rigid { master, slaves, .. } => (Some(*master), slaves.clone()),
                Constraint::QuasiRigid { master, nodes, .. } => (*master, nodes.clone()),
                _ => continue,
            };
            let Some(master) = master.or_else(|| slaves.first().copied()) else {
                continue;
            };
            let group_name = format!("RIGID_{}", entity_tag(&constraint));
            let mut cell_ids = Vec::new();
            for slave in slaves.iter().filter(|s| **s != master) {
                let position = self
                    .mesh
                    .add_cell(None, CellType::Seg2, vec![master, *slave], None)?;
                cell_ids.push(self.mesh.cells()[position].id);
                if !penalty {
                    // A Lagrange node per slave carries the multipliers.
                    let slave_node = self.mesh.find_node(*slave).ok_or_else(|| {
                        ModelError::Invariant(format!(
                            "rigid constraint {constraint_id} references unknown node {slave}"
                        ))
                    })?;
                    let (x, y, z) = (slave_node.x, slave_node.y, slave_node.z);
                    self.mesh.add_node_global(None, x, y, z)?;
                    let lagrange_id = self.mesh.nodes().last().expect("just added").id;
                    self.mesh
                        .find_or_create_node_group(&format!("LAGR_{}", entity_tag(&constraint)))
                        .add_node_id(lagrange_id);
                }
            }
            let group = self.mesh.find_or_create_cell_group(&group_name);
            for cell_id in &cell_ids {
                group.add_cell_id(*cell_id);
            }
            let mut stiffness = DOFCoefs::default();
            if penalty {
                for dof in DOF::ALL {
                    stiffness.set(dof, rigidity);
                }
            }
            let id = self.next_auto_id();
            let mut base = ElementSetBase::new(id, None);
            base.material = Some(material);
            base.cell_group = Some(group_name);
            self.element_sets
                .add(ElementSet::DiscreteSegment { base, stiffness });
            self.remove_constraint(constraint_id);
        }
        Ok(())
    }

    /// Pass 5: RBE3 interpolations become one cell per slave participation,
    /// with a material encoding DOFs and coefficient.
    fn make_cells_from_rbe3(&mut self) -> ModelResult<()> {
        let rbe3_ids: Vec<Id> = self
            .constraints
            .iter()
            .filter(|c| matches!(c, Constraint::Rbe3 { .. }))
            .map(|c| c.id())
            .collect();
        for constraint_id in rbe3_ids {
            let Some(constraint) = self.constraints.find(constraint_id).cloned() else {
                continue;
            };
            let Constraint::Rbe3 {
                master,
                master_dofs,
                slaves,
                ..
            } = constraint.clone()
            else {
                continue;
            };
            let group_name = format!("RBE3_{}", entity_tag(&constraint));
            // One material per distinct (dofs, coefficient) participation.
            let mut signatures: Vec<(DOFS, f64)> = Vec::new();
            for slave in &slaves {
                let signature = (slave.dofs, slave.coefficient);
                if !signatures.iter().any(|s| s.0 == signature.0 && is_equal(s.1, signature.1)) {
                    signatures.push(signature);
                }
            }
            for (slave_dofs, coefficient) in signatures {
                let material_id = self.next_auto_id();
                let mut material = Material::new(material_id, None, Some("RBE3".to_string()));
                material.add_nature(Nature::Interpolation {
                    master_dofs,
                    slave_dofs,
                    coefficient,
                });
                self.materials.add(material);

                let sub_group = format!(
                    "{group_name}_{}",
                    slave_dofs.nastran_code()
                );
                let mut cell_ids = Vec::new();
                for slave in slaves
                    .iter()
                    .filter(|s| s.dofs == slave_dofs && is_equal(s.coefficient, coefficient))
                {
                    let position =
                        self.mesh
                            .add_cell(None, CellType::Seg2, vec![master, slave.node], None)?;
                    cell_ids.push(self.mesh.cells()[position].id);
                }
                let group = self.mesh.find_or_create_cell_group(&sub_group);
                for cell_id in cell_ids {
                    group.add_cell_id(cell_id);
                }
                let id = self.next_auto_id();
                let mut base = ElementSetBase::new(id, None);
                base.material = Some(material_id);
                base.cell_group = Some(sub_group);
                self.element_sets.add(ElementSet::DiscreteSegment {
                    base,
                    stiffness: DOFCoefs::default(),
                });
            }
            self.remove_constraint(constraint_id);
        }
        Ok(())
    }

    /// Pass 6a: LMPCs become point cells for targets without a native MPC
    /// card; the writer renders the coefficients from the constraint copy
    /// kept on the element set's material.
    fn make_cells_from_lmpc(&mut self) -> ModelResult<()> {
        let lmpc_ids: Vec<Id> = self
            .constraints
            .iter()
            .filter(|c| matches!(c, Constraint::Lmpc { .. }))
            .map(|c| c.id())
            .collect();
        for constraint_id in lmpc_ids {
            let Some(constraint) = self.constraints.find(constraint_id).cloned() else {
                continue;
            };
            let Constraint::Lmpc { terms, .. } = constraint.clone() else {
                continue;
            };
            let group_name = format!("LMPC_{}", entity_tag(&constraint));
            let mut cell_ids = Vec::new();
            for (node, _) in &terms {
                let position = self.mesh.add_cell(None, CellType::Point1, vec![*node], None)?;
                cell_ids.push(self.mesh.cells()[position].id);
            }
            let group = self.mesh.find_or_create_cell_group(&group_name);
            for cell_id in cell_ids {
                group.add_cell_id(cell_id);
            }
            let id = self.next_auto_id();
            let mut base = ElementSetBase::new(id, None);
            base.cell_group = Some(group_name);
            self.element_sets.add(ElementSet::DiscretePoint {
                base,
                stiffness: DOFCoefs::default(),
            });
            self.remove_constraint(constraint_id);
        }
        Ok(())
    }

    /// Pass 6b: gap/surface-slide contact becomes segment cells.
    fn make_cells_from_surface_slide(&mut self) -> ModelResult<()> {
        let gap_ids: Vec<Id> = self
            .constraints
            .iter()
            .filter(|c| matches!(c, Constraint::Gap { .. }))
            .map(|c| c.id())
            .collect();
        for constraint_id in gap_ids {
            let Some(constraint) = self.constraints.find(constraint_id).cloned() else {
                continue;
            };
            let Constraint::Gap { participations, .. } = constraint.clone() else {
                continue;
            };
            let group_name = format!("GAP_{}", entity_tag(&constraint));
            let mut cell_ids = Vec::new();
            for participation in &participations {
                let position = self.mesh.add_cell(
                    None,
                    CellType::Seg2,
                    vec![participation.node1, participation.node2],
                    None,
                )?;
                cell_ids.push(self.mesh.cells()[position].id);
            }
            let group = self.mesh.find_or_create_cell_group(&group_name);
            for cell_id in cell_ids {
                group.add_cell_id(cell_id);
            }
            let id = self.next_auto_id();
            let mut base = ElementSetBase::new(id, None);
            base.cell_group = Some(group_name);
            self.element_sets.add(ElementSet::DiscreteSegment {
                base,
                stiffness: DOFCoefs::default(),
            });
            self.remove_constraint(constraint_id);
        }

        // Sliding contact: materialise both boundary surfaces as face-cell
        // groups, then drop the constraint for targets without native
        // surface contact.
        let slide_ids: Vec<Id> = self
            .constraints
            .iter()
            .filter(|c| matches!(c, Constraint::SurfaceSlide { .. }))
            .map(|c| c.id())
            .collect();
        for constraint_id in slide_ids {
            let Some(Constraint::SurfaceSlide {
                master_surface,
                slave_surface,
                ..
            }) = self.constraints.find(constraint_id).cloned()
            else {
                continue;
            };
            for surface_id in [master_surface, slave_surface] {
                self.materialize_boundary_surface(surface_id)?;
            }
            self.remove_constraint(constraint_id);
        }
        Ok(())
    }

    /// Turn a SURF-style boundary surface into a cell group of face cells.
    fn materialize_boundary_surface(&mut self, original_id: Id) -> ModelResult<()> {
        let Some(surface) = self.surfaces.find_by_original(original_id).cloned() else {
            log::warn!("sliding contact references unknown surface {original_id}");
            return Ok(());
        };
        let group_name = format!("SURF_{original_id}");
        if self.mesh.find_cell_group(&group_name).is_some() {
            return Ok(());
        }
        let mut cell_ids = Vec::new();
        for face in &surface.faces {
            match (face.node1, face.node2) {
                (Some(n1), Some(n2)) => {
                    let face_nodes = self.mesh.faceids_from_two_nodes(face.cell, n1, n2)?;
                    let corners = if face_nodes.len() <= 4 {
                        face_nodes.len()
                    } else {
                        face_nodes.len() / 2
                    };
                    let id = match self
                        .mesh
                        .find_surface_cell_with_corners(&face_nodes[..corners])
                    {
                        Some(existing) => existing,
                        None => {
                            let volume_type = self
                                .mesh
                                .find_cell(face.cell)
                                .map(|c| c.cell_type)
                                .ok_or(MeshError::CellNotFound(face.cell))?;
                            let face_type =
                                volume_type.face_type(corners).ok_or_else(|| {
                                    ModelError::Invariant(format!(
                                        "cell {} has no {corners}-corner face",
                                        face.cell
                                    ))
                                })?;
                            let position =
                                self.mesh.add_cell(None, face_type, face_nodes, None)?;
                            self.mesh.cells()[position].id
                        }
                    };
                    cell_ids.push(id);
                }
                // Shell faces are the cells themselves.
                _ => cell_ids.push(face.cell),
            }
        }
        let group = self.mesh.find_or_create_cell_group(&group_name);
        for cell_id in cell_ids {
            group.add_cell_id(cell_id);
        }
        Ok(())
    }

    /// Pass 7: flatten linear combinations of load sets into concrete scaled
    /// loadings.
    fn replace_combined_load_sets(&mut self) {
        // Inner combinations first; bounded in case of reference cycles.
        for _ in 0..16 {
            let ready: Vec<LoadSetRef> = self
                .load_sets
                .iter()
                .filter(|set| !set.embedded_loadsets.is_empty())
                .filter(|set| {
                    set.embedded_loadsets.iter().all(|(reference, _)| {
                        self.find_load_set(*reference)
                            .map(|inner| inner.embedded_loadsets.is_empty())
                            .unwrap_or(true)
                    })
                })
                .map(LoadSet::reference)
                .collect();
            if ready.is_empty() {
                break;
            }
            for outer_ref in ready {
                let embedded = match self.find_load_set(outer_ref) {
                    Some(set) => set.embedded_loadsets.clone(),
                    None => continue,
                };
                for (inner_ref, factor) in embedded {
                    let loading_ids: Vec<Id> = self
                        .loadset_members
                        .get(&inner_ref)
                        .cloned()
                        .unwrap_or_default();
                    for loading_id in loading_ids {
                        let Some(loading) = self.loadings.find(loading_id).cloned() else {
                            continue;
                        };
                        let new_id = self.next_auto_id();
                        let scaled = loading.scaled(factor, new_id);
                        self.add_loading_into_loadset(scaled, outer_ref);
                    }
                }
                if let Some(&internal) = self.loadset_ids.get(&outer_ref) {
                    if let Some(set) = self.load_sets.find_mut(internal) {
                        set.embedded_loadsets.clear();
                    }
                }
            }
        }
    }

    /// Pass 8a: distributed non-structural mass becomes nodal masses.
    fn emulate_additional_mass(&mut self) -> ModelResult<()> {
        let shells: Vec<(Id, String, f64)> = self
            .element_sets
            .iter()
            .filter_map(|set| match set {
                ElementSet::Shell {
                    base,
                    nonstructural_mass,
                    ..
                } if *nonstructural_mass > 0.0 => base
                    .cell_group
                    .clone()
                    .map(|group| (base.id, group, *nonstructural_mass)),
                _ => None,
            })
            .collect();
        for (set_id, group_name, nsm) in shells {
            let Some(group) = self.mesh.find_cell_group(&group_name) else {
                continue;
            };
            // Spread the distributed mass over the group's nodes.
            let mut node_ids: Vec<Id> = Vec::new();
            for cell_id in group.cell_ids() {
                if let Some(cell) = self.mesh.find_cell(*cell_id) {
                    for node_id in &cell.node_ids {
                        if !node_ids.contains(node_id) {
                            node_ids.push(*node_id);
                        }
                    }
                }
            }
            if node_ids.is_empty() {
                continue;
            }
            let mass_group_name = format!("NSM_{}", set_id.abs());
            let mut cell_ids = Vec::new();
            for node_id in &node_ids {
                let position = self.mesh.add_cell(None, CellType::Point1, vec![*node_id], None)?;
                cell_ids.push(self.mesh.cells()[position].id);
            }
            let mass_group = self.mesh.find_or_create_cell_group(&mass_group_name);
            for cell_id in cell_ids {
                mass_group.add_cell_id(cell_id);
            }
            let id = self.next_auto_id();
            let mut base = ElementSetBase::new(id, None);
            base.cell_group = Some(mass_group_name);
            self.element_sets.add(ElementSet::NodalMass {
                base,
                mass: nsm / node_ids.len() as f64,
                ixx: 0.0,
                iyy: 0.0,
                izz: 0.0,
            });
            log::debug!(
                "shell set {set_id}: non-structural mass {nsm} spread over {} nodes",
                node_ids.len()
            );
        }
        Ok(())
    }

    /// Pass 8b: SPCs on nodes with a local displacement frame become LMPCs
    /// written in global axes.
    fn emulate_local_displacement(&mut self) -> ModelResult<()> {
        let local_nodes: Vec<(Id, Id)> = self
            .mesh
            .nodes()
            .iter()
            .filter(|n| n.displacement_cs != GLOBAL_COORDINATE_SYSTEM_ID)
            .map(|n| (n.id, n.displacement_cs))
            .collect();
        if local_nodes.is_empty() {
            return Ok(());
        }
        for (node_id, cs_id) in local_nodes {
            let (position, axes) = {
                let node = self.mesh.find_node(node_id).expect("filtered above");
                let mut cs = self
                    .find_coordinate_system(cs_id)
                    .ok_or_else(|| {
                        ModelError::Invariant(format!(
                            "node {node_id} references unknown displacement system {cs_id}"
                        ))
                    })?
                    .clone();
                cs.update_local_base(&node.position());
                (node.position(), [cs.basis().ex, cs.basis().ey, cs.basis().ez])
            };
            let _ = position;
            let spc_ids: Vec<Id> = self
                .constraints
                .iter()
                .filter(|c| matches!(c, Constraint::Spc { nodes, .. } if nodes.contains(&node_id)))
                .map(|c| c.id())
                .collect();
            for spc_id in spc_ids {
                let Some(Constraint::Spc {
                    nodes,
                    dofs,
                    values,
                    functions,
                    ..
                }) = self.constraints.find(spc_id).cloned()
                else {
                    continue;
                };
                let containing = self.get_constraint_sets_by_constraint(spc_id);
                // Each locally-constrained DOF becomes one LMPC row.
                for dof in dofs.iter() {
                    let axis = axes[dof.position() % 3];
                    let mut coefs = DOFCoefs::default();
                    let offset = if dof.is_rotation() { 3 } else { 0 };
                    coefs.set(DOF::ALL[offset], axis.x());
                    coefs.set(DOF::ALL[offset + 1], axis.y());
                    coefs.set(DOF::ALL[offset + 2], axis.z());
                    let id = self.next_auto_id();
                    let lmpc = Constraint::Lmpc {
                        base: ConstraintBase::new(id, None),
                        imposed: values.get(dof),
                        terms: vec![(node_id, coefs)],
                    };
                    let lmpc_id = self.add_constraint(lmpc);
                    for reference in &containing {
                        self.add_constraint_into_constraint_set(lmpc_id, *reference);
                    }
                }
                // Narrow or drop the original SPC.
                let other_nodes: Vec<Id> =
                    nodes.iter().copied().filter(|n| *n != node_id).collect();
                if other_nodes.is_empty() {
                    self.remove_constraint(spc_id);
                } else if let Some(Constraint::Spc { nodes, .. }) =
                    self.constraints.find_mut(spc_id)
                {
                    *nodes = other_nodes;
                }
                let _ = (values, functions);
            }
        }
        Ok(())
    }

    /// Pass 8c: zero-sized discretes host DOFs demanded by loads or
    /// constraints but not materialised by any connected element.
    fn add_virtual_discrets(&mut self) -> ModelResult<()> {
        let materialized = self.materialized_node_dofs();
        let mut floating: Vec<Id> = Vec::new();
        let mut demand: Vec<(Id, DOFS)> = Vec::new();
        for loading in self.loadings.iter() {
            if let Loading::NodalForce { node, moment, .. } = loading {
                if !moment.is_zero() {
                    demand.push((*node, DOFS::ROTATIONS));
                }
            }
        }
        for constraint in self.constraints.iter() {
            for node in constraint.node_ids() {
                let dofs = constraint.dofs_for_node(node);
                if dofs.contains_any_of(DOFS::ROTATIONS) {
                    demand.push((node, dofs.intersection(DOFS::ROTATIONS)));
                }
            }
        }
        for (node, wanted) in demand {
            let have = materialized.get(&node).copied().unwrap_or(DOFS::NONE);
            if !(wanted - have).is_empty() && !floating.contains(&node) {
                floating.push(node);
            }
        }
        if floating.is_empty() {
            return Ok(());
        }
        let group_name = "VIRTUAL_DISCRETS".to_string();
        if self.mesh.find_cell_group(&group_name).is_some() {
            // Already synthesised by an earlier run.
            return Ok(());
        }
        let mut cell_ids = Vec::new();
        for node in &floating {
            let position = self.mesh.add_cell(None, CellType::Point1, vec![*node], None)?;
            cell_ids.push(self.mesh.cells()[position].id);
        }
        let group = self.mesh.find_or_create_cell_group(&group_name);
        for cell_id in cell_ids {
            group.add_cell_id(cell_id);
        }
        let id = self.next_auto_id();
        let mut base = ElementSetBase::new(id, None);
        base.cell_group = Some(group_name);
        self.element_sets.add(ElementSet::DiscretePoint {
            base,
            stiffness: DOFCoefs::default(),
        });
        log::debug!("synthesised virtual discretes on {} nodes", floating.len());
        Ok(())
    }

    /// Pass 9: massless element sets share one virtual material.
    fn add_virtual_material(&mut self) {
        let needing: Vec<Id> = self
            .element_sets
            .iter()
            .filter(|set| {
                set.material().is_none()
                    && !set.is_matrix()
                    && !matches!(set, ElementSet::NodalMass { .. })
            })
            .map(|set| set.id())
            .collect();
        if needing.is_empty() {
            return;
        }
        let material_id = match self
            .materials
            .iter()
            .find(|m| m.name.as_deref() == Some("VIRTUAL"))
        {
            Some(material) => material.id,
            None => {
                let id = self.next_auto_id();
                let mut material = Material::new(id, None, Some("VIRTUAL".to_string()));
                material.add_nature(Nature::Elastic {
                    e: 1.0,
                    nu: 0.0,
                    g: None,
                    rho: 0.0,
                    alpha: 0.0,
                    t_ref: 0.0,
                    ge: 0.0,
                });
                self.materials.add(material)
            }
        };
        for set_id in needing {
            if let Some(set) = self.element_sets.find_mut(set_id) {
                set.base_mut().material = Some(material_id);
            }
        }
    }

    /// Pass 10a: extract boundary faces and register them as skin cells.
    fn create_skin(&mut self) -> ModelResult<()> {
        let skin = self.mesh.build_skin();
        if skin.is_empty() || !self.configuration.add_skin_to_model {
            return Ok(());
        }
        if self.mesh.find_cell_group("SKIN").is_some() {
            return Ok(());
        }
        let mut created = Vec::new();
        for face in &skin {
            if self
                .mesh
                .find_surface_cell_with_corners(
                    &face.node_ids[..face.cell_type.num_corners()],
                )
                .is_some()
            {
                continue;
            }
            let position =
                self.mesh
                    .add_cell(None, face.cell_type, face.node_ids.clone(), None)?;
            created.push(self.mesh.cells()[position].id);
        }
        let group = self.mesh.find_or_create_cell_group("SKIN");
        for cell_id in created {
            group.add_cell_id(cell_id);
        }
        Ok(())
    }

    /// Pass 10b: face loads designated by two nodes get a concrete surface
    /// cell to act on.
    fn make_boundary_cells(&mut self) -> ModelResult<()> {
        let pending: Vec<Id> = self
            .loadings
            .iter()
            .filter(|l| matches!(l, Loading::PressionFaceTwoNodes { .. }))
            .map(|l| l.id())
            .collect();
        for loading_id in pending {
            let Some(Loading::PressionFaceTwoNodes {
                base,
                cell,
                node1,
                node2,
                pression,
            }) = self.loadings.find(loading_id).cloned()
            else {
                continue;
            };
            let face_nodes = self
                .mesh
                .faceids_from_two_nodes(cell, node1, node2)
                .map_err(ModelError::Mesh)?;
            let corners = if face_nodes.len() <= 4 {
                face_nodes.len()
            } else {
                face_nodes.len() / 2
            };
            let surface_id = match self
                .mesh
                .find_surface_cell_with_corners(&face_nodes[..corners])
            {
                Some(existing) => existing,
                None => {
                    let volume_type = self
                        .mesh
                        .find_cell(cell)
                        .map(|c| c.cell_type)
                        .ok_or(MeshError::CellNotFound(cell))?;
                    let face_type = volume_type.face_type(corners).ok_or_else(|| {
                        ModelError::Invariant(format!(
                            "cell {cell} has no {corners}-corner face type"
                        ))
                    })?;
                    let position = self.mesh.add_cell(None, face_type, face_nodes, None)?;
                    let id = self.mesh.cells()[position].id;
                    self.mesh
                        .find_or_create_cell_group("SKIN")
                        .add_cell_id(id);
                    id
                }
            };
            // Same id, now a pressure on a concrete face cell.
            self.loadings.add(Loading::NormalPressionFace {
                base,
                cells: CellContainer::from_cells(vec![surface_id]),
                pression,
            });
        }
        Ok(())
    }

    /// Pass 11a: drop loadings and constraints with no observable effect.
    fn remove_ineffectives(&mut self) {
        let dead_loadings: Vec<Id> = self
            .loadings
            .iter()
            .filter(|l| l.is_ineffective())
            .map(|l| l.id())
            .collect();
        for id in dead_loadings {
            log::debug!("removing ineffective loading {id}");
            self.remove_loading(id);
        }
        let dead_constraints: Vec<Id> = self
            .constraints
            .iter()
            .filter(|c| c.is_ineffective())
            .map(|c| c.id())
            .collect();
        for id in dead_constraints {
            log::debug!("removing ineffective constraint {id}");
            self.remove_constraint(id);
        }
    }

    /// Pass 11b: drop SPC terms duplicated inside the same constraint set.
    fn remove_redundant_spcs(&mut self) {
        let set_refs: Vec<ConstraintSetRef> = self
            .constraint_sets
            .iter()
            .map(ConstraintSet::reference)
            .collect();
        for reference in set_refs {
            let members: Vec<Id> = self
                .cset_members
                .get(&reference)
                .cloned()
                .unwrap_or_default();
            let mut seen: Vec<(Id, DOF, f64)> = Vec::new();
            for member in members {
                let Some(Constraint::Spc { nodes, dofs, values, .. }) =
                    self.constraints.find(member).cloned()
                else {
                    continue;
                };
                let mut fully_redundant = true;
                for node in &nodes {
                    for dof in dofs.iter() {
                        let value = values.get(dof);
                        let key_known = seen
                            .iter()
                            .any(|(n, d, v)| *n == *node && *d == dof && is_equal(*v, value));
                        if key_known {
                            continue;
                        }
                        fully_redundant = false;
                        seen.push((*node, dof, value));
                    }
                }
                if fully_redundant && !nodes.is_empty() && !dofs.is_empty() {
                    log::debug!("removing redundant SPC {member} from {reference:?}");
                    if let Some(ids) = self.cset_members.get_mut(&reference) {
                        ids.retain(|m| *m != member);
                    }
                }
            }
        }
    }

    /// Pass 11c: drop SPCD entries fully subsumed by an SPC of the same
    /// analysis.
    fn remove_constrained_imposed(&mut self) {
        let analysis_ids = self.analyses.ids();
        for analysis_id in analysis_ids {
            let Some(analysis) = self.analyses.find(analysis_id) else {
                continue;
            };
            let sets = self.active_constraint_sets(analysis);
            let mut pinned: Vec<(Id, DOF, f64)> = Vec::new();
            for reference in sets.iter().filter(|r| r.set_type != ConstraintSetType::Spcd) {
                for constraint in self.get_constraints_by_constraint_set(*reference) {
                    if let Constraint::Spc { nodes, dofs, values, .. } = constraint {
                        for node in nodes {
                            for dof in dofs.iter() {
                                pinned.push((*node, dof, values.get(dof)));
                            }
                        }
                    }
                }
            }
            let mut to_remove: Vec<(ConstraintSetRef, Id)> = Vec::new();
            for reference in sets.iter().filter(|r| r.set_type == ConstraintSetType::Spcd) {
                for constraint in self.get_constraints_by_constraint_set(*reference) {
                    if let Constraint::Spc { nodes, dofs, values, .. } = constraint {
                        let subsumed = nodes.iter().all(|node| {
                            dofs.iter().all(|dof| {
                                pinned.iter().any(|(n, d, v)| {
                                    *n == *node && *d == dof && is_equal(*v, values.get(dof))
                                })
                            })
                        });
                        if subsumed {
                            to_remove.push((*reference, constraint.id()));
                        }
                    }
                }
            }
            for (reference, constraint_id) in to_remove {
                log::debug!("dropping subsumed SPCD constraint {constraint_id}");
                if let Some(ids) = self.cset_members.get_mut(&reference) {
                    ids.retain(|m| *m != constraint_id);
                }
            }
        }
    }

    /// Pass 12: partition element sets whose cells span heterogeneous node
    /// DOF signatures.
    fn split_elements_by_dofs(&mut self) {
        // Signatures come from the structural sets only; the discrete sets
        // being split must not see their own contribution.
        let mut signatures_by_node: HashMap<Id, DOFS> = HashMap::new();
        for element_set in &self.element_sets {
            if element_set.is_discrete() || element_set.is_matrix() {
                continue;
            }
            let dofs = if element_set.carries_rotations() {
                DOFS::ALL_DOFS
            } else {
                DOFS::TRANSLATIONS
            };
            let Some(group) = element_set
                .cell_group()
                .and_then(|name| self.mesh.find_cell_group(name))
            else {
                continue;
            };
            for cell_id in group.cell_ids() {
                if let Some(cell) = self.mesh.find_cell(*cell_id) {
                    for node_id in &cell.node_ids {
                        let entry = signatures_by_node.entry(*node_id).or_insert(DOFS::NONE);
                        *entry = *entry + dofs;
                    }
                }
            }
        }
        let candidate_ids: Vec<Id> = self
            .element_sets
            .iter()
            .filter(|set| set.is_discrete() && set.cell_group().is_some())
            .map(|set| set.id())
            .collect();
        for set_id in candidate_ids {
            let Some(set) = self.element_sets.find(set_id).cloned() else {
                continue;
            };
            let group_name = set.cell_group().expect("filtered above").to_string();
            let Some(group) = self.mesh.find_cell_group(&group_name) else {
                continue;
            };
            // Signature of a cell: union of its nodes' materialised DOFs.
            let mut partitions: Vec<(DOFS, Vec<Id>)> = Vec::new();
            for cell_id in group.cell_ids() {
                let Some(mesh_cell) = self.mesh.find_cell(*cell_id) else {
                    continue;
                };
                let mut signature = DOFS::NONE;
                for node_id in &mesh_cell.node_ids {
                    signature = signature
                        + signatures_by_node
                            .get(node_id)
                            .copied()
                            .unwrap_or(DOFS::NONE);
                }
                match partitions.iter_mut().find(|(s, _)| *s == signature) {
                    Some((_, ids)) => ids.push(*cell_id),
                    None => partitions.push((signature, vec![*cell_id])),
                }
            }
            if partitions.len() <= 1 {
                continue;
            }
            log::debug!(
                "splitting element set {set_id} into {} DOF partitions",
                partitions.len()
            );
            for (signature, cell_ids) in &partitions {
                let sub_name = format!("{}_D{}", group_name, signature.nastran_code());
                let sub_group = self.mesh.find_or_create_cell_group(&sub_name);
                for cell_id in cell_ids {
                    sub_group.add_cell_id(*cell_id);
                }
                let id = self.next_auto_id();
                let mut clone = set.clone();
                clone.base_mut().id = id;
                clone.base_mut().original_id = None;
                clone.base_mut().cell_group = Some(sub_name);
                self.element_sets.add(clone);
            }
            self.element_sets.remove(set_id);
        }
    }

    /// Pass 13: drop assertions reading a DOF their node no longer has.
    fn remove_ineffective_assertions(&mut self) {
        let node_dofs = self.materialized_node_dofs();
        let dead: Vec<Id> = self
            .assertions
            .iter()
            .filter(|assertion| match assertion.node_dof() {
                Some((node, dof)) => match self.mesh.find_node(node) {
                    Some(_) => !node_dofs
                        .get(&node)
                        .copied()
                        .unwrap_or(DOFS::NONE)
                        .contains(dof),
                    None => true,
                },
                None => false,
            })
            .map(|assertion| assertion.id())
            .collect();
        for id in dead {
            log::debug!("removing ineffective assertion {id}");
            self.assertions.remove(id);
            for analysis in self.analyses.iter_mut() {
                analysis.base_mut().remove_assertion(id);
            }
        }
    }

    /// Check every reference and invariant. Failure is fatal in strict mode
    /// and a warning otherwise.
    pub fn validate(&self) -> ModelResult<()> {
        for cell in self.mesh.cells() {
            for node_id in &cell.node_ids {
                if self.mesh.find_node(*node_id).is_none() {
                    return Err(ModelError::Invariant(format!(
                        "cell {} references unknown node {node_id}",
                        cell.id
                    )));
                }
            }
        }
        for element_set in self.element_sets.iter() {
            if let Some(group_name) = element_set.cell_group() {
                let group = self.mesh.find_cell_group(group_name).ok_or_else(|| {
                    ModelError::Invariant(format!(
                        "element set {} references unknown cell group '{group_name}'",
                        element_set.id()
                    ))
                })?;
                if let Some(dimension) = element_set.compatible_dimension() {
                    for cell_id in group.cell_ids() {
                        let cell = self.mesh.find_cell(*cell_id).ok_or_else(|| {
                            ModelError::Invariant(format!(
                                "group '{group_name}' references unknown cell {cell_id}"
                            ))
                        })?;
                        if cell.cell_type.dimension() != dimension {
                            return Err(ModelError::Invariant(format!(
                                "element set {} expects dimension-{dimension} cells, \
                                 cell {cell_id} is {:?}",
                                element_set.id(),
                                cell.cell_type
                            )));
                        }
                    }
                }
            }
            if let Some(material) = element_set.material() {
                if self.materials.find(material).is_none() {
                    return Err(ModelError::Invariant(format!(
                        "element set {} references unknown material {material}",
                        element_set.id()
                    )));
                }
            }
        }
        for analysis in self.analyses.iter() {
            for reference in analysis.base().load_sets() {
                if !self.loadset_ids.contains_key(reference) {
                    return Err(ModelError::Invariant(format!(
                        "analysis {} references unknown load set {reference:?}",
                        analysis.id()
                    )));
                }
            }
            for reference in analysis.base().constraint_sets() {
                if !self.cset_ids.contains_key(reference) {
                    return Err(ModelError::Invariant(format!(
                        "analysis {} references unknown constraint set {reference:?}",
                        analysis.id()
                    )));
                }
            }
            for assertion_id in analysis.base().assertions() {
                if self.assertions.find(*assertion_id).is_none() {
                    return Err(ModelError::Invariant(format!(
                        "analysis {} references unknown assertion {assertion_id}",
                        analysis.id()
                    )));
                }
            }
        }
        for assertion in self.assertions.iter() {
            if let Some((node, _)) = assertion.node_dof() {
                if self.mesh.find_node(node).is_none() {
                    return Err(ModelError::Invariant(format!(
                        "assertion {} references unknown node {node}",
                        assertion.id()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::SolverName;
    use crate::loadings::{LoadSetType, LoadingBase, nodal_force};

    fn aster_model() -> Model {
        Model::new(
            "test",
            "nastran",
            ModelConfiguration::for_target(SolverName::CodeAster),
        )
    }

    fn seg2_chain(model: &mut Model, count: usize) {
        for i in 0..count {
            model
                .mesh
                .add_node_global(Some(i as Id + 1), i as f64, 0.0, 0.0)
                .expect("node insert");
        }
        for i in 0..count - 1 {
            model
                .mesh
                .add_cell(
                    Some(i as Id + 1),
                    CellType::Seg2,
                    vec![i as Id + 1, i as Id + 2],
                    None,
                )
                .expect("cell insert");
        }
        let names: Vec<Id> = (1..count as Id).collect();
        let group = model.mesh.find_or_create_cell_group("BEAMS");
        for id in names {
            group.add_cell_id(id);
        }
        let set_id = model.next_auto_id();
        let mut base = ElementSetBase::new(set_id, Some(1));
        base.cell_group = Some("BEAMS".to_string());
        model.add_element_set(ElementSet::GenericSectionBeam {
            base,
            area: 1.0,
            iy: 1.0,
            iz: 1.0,
            torsional_constant: 1.0,
        });
    }

    #[test]
    fn spc_set_survives_finish_for_aster() {
        let mut model = aster_model();
        seg2_chain(&mut model, 5);
        let spc_ref = ConstraintSetRef::new(ConstraintSetType::Spc, 10);
        let id = model.next_auto_id();
        let spc = Constraint::Spc {
            base: ConstraintBase::new(id, Some(10)),
            nodes: vec![1, 5],
            dofs: DOFS::ALL_DOFS,
            values: DOFCoefs::default(),
            functions: Vec::new(),
        };
        let spc_id = model.add_constraint(spc);
        model.add_constraint_into_constraint_set(spc_id, spc_ref);

        model.finish().expect("finish");
        model.validate().expect("valid model");

        let constraints = model.get_constraints_by_constraint_set(spc_ref);
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].dofs_for_node(1), DOFS::ALL_DOFS);
        assert_eq!(constraints[0].dofs_for_node(5), DOFS::ALL_DOFS);
    }

    #[test]
    fn combined_load_sets_flatten_into_scaled_loadings() {
        let mut model = aster_model();
        seg2_chain(&mut model, 3);
        let set1 = LoadSetRef::new(LoadSetType::Load, 1);
        let set3 = LoadSetRef::new(LoadSetType::Load, 3);
        let combined_ref = LoadSetRef::new(LoadSetType::Load, 10);

        let id = model.next_auto_id();
        model.add_loading_into_loadset(
            nodal_force(id, None, 1, VectorialValue::new(1.0, 0.0, 0.0), VectorialValue::zero()),
            set1,
        );
        let id = model.next_auto_id();
        model.add_loading_into_loadset(
            nodal_force(id, None, 2, VectorialValue::new(0.0, 2.0, 0.0), VectorialValue::zero()),
            set3,
        );

        let combined_id = model.next_auto_id();
        let mut combined = LoadSet::new(combined_id, Some(10), LoadSetType::Load);
        combined.embedded_loadsets = vec![(set1, 5.0), (set3, 7.0)];
        model.add_load_set(combined);

        model.finish().expect("finish");

        let set = model.find_load_set(combined_ref).expect("combined set");
        assert!(set.embedded_loadsets.is_empty());
        let loadings = model.get_loadings_by_loadset(combined_ref);
        assert_eq!(loadings.len(), 2);
        match loadings[0] {
            Loading::NodalForce { force, .. } => {
                assert!(force.iseq(&VectorialValue::new(5.0, 0.0, 0.0)));
            }
            other => panic!("unexpected loading {other:?}"),
        }
        match loadings[1] {
            Loading::NodalForce { force, .. } => {
                assert!(force.iseq(&VectorialValue::new(0.0, 14.0, 0.0)));
            }
            other => panic!("unexpected loading {other:?}"),
        }
    }

    #[test]
    fn spcd_override_narrows_spc_for_one_analysis() {
        let mut model = aster_model();
        seg2_chain(&mut model, 3);

        let spc_ref = ConstraintSetRef::new(ConstraintSetType::Spc, 5);
        let id = model.next_auto_id();
        let spc_id = model.add_constraint(Constraint::Spc {
            base: ConstraintBase::new(id, Some(5)),
            nodes: vec![1],
            dofs: DOFS::from(DOF::DX) + DOF::DY,
            values: DOFCoefs::default(),
            functions: Vec::new(),
        });
        model.add_constraint_into_constraint_set(spc_id, spc_ref);

        let analysis_id = model.next_auto_id();
        let mut base = AnalysisBase::new(analysis_id, Some(1), "Analysis_1");
        base.add_constraint_set(spc_ref);
        let analysis_id = model.add_analysis(Analysis::LinearMecaStat { base });

        model
            .remove_spc_node_dofs(analysis_id, spc_id, 1, DOFS::from(DOF::DX))
            .expect("narrowing succeeds");

        let analysis = model.analyses().find(analysis_id).expect("analysis");
        assert!(!analysis.base().contains_constraint_set(spc_ref));
        let clone_ref = analysis.base().constraint_sets()[0];
        let narrowed = model.get_constraints_by_constraint_set(clone_ref);
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].dofs_for_node(1), DOFS::from(DOF::DY));

        // The original set keeps the full SPC for every other analysis.
        let original = model.get_constraints_by_constraint_set(spc_ref);
        assert_eq!(original.len(), 1);
        assert_eq!(original[0].dofs_for_node(1), DOFS::from(DOF::DX) + DOF::DY);
    }

    fn hexa_model(configuration: ModelConfiguration) -> Model {
        let mut model = Model::new("hexa", "nastran", configuration);
        let coords = [
            (50, 0.0, 0.0, 0.0),
            (51, 1.0, 0.0, 0.0),
            (52, 1.0, 1.0, 0.0),
            (53, 0.0, 1.0, 0.0),
            (54, 0.0, 0.0, 1.0),
            (55, 1.0, 0.0, 1.0),
            (56, 1.0, 1.0, 1.0),
            (57, 0.0, 1.0, 1.0),
        ];
        for (id, x, y, z) in coords {
            model.mesh.add_node_global(Some(id), x, y, z).expect("node");
        }
        model
            .mesh
            .add_cell(Some(1), CellType::Hexa8, vec![50, 51, 52, 53, 54, 55, 56, 57], None)
            .expect("hexa");
        let group = model.mesh.find_or_create_cell_group("SOLID");
        group.add_cell_id(1);
        let set_id = model.next_auto_id();
        let mut base = ElementSetBase::new(set_id, Some(1));
        base.cell_group = Some("SOLID".to_string());
        model.add_element_set(ElementSet::Continuum { base });
        model
    }

    #[test]
    fn pression_face_two_nodes_becomes_skin_quad() {
        let mut model = hexa_model(ModelConfiguration::for_target(SolverName::CodeAster));
        let load_ref = LoadSetRef::new(LoadSetType::Load, 2);
        let id = model.next_auto_id();
        model.add_loading_into_loadset(
            Loading::PressionFaceTwoNodes {
                base: LoadingBase::new(id, None),
                cell: 1,
                node1: 50,
                node2: 52,
                pression: 1000.0,
            },
            load_ref,
        );

        model.finish().expect("finish");
        model.validate().expect("valid");

        let loadings = model.get_loadings_by_loadset(load_ref);
        assert_eq!(loadings.len(), 1);
        let cells = match loadings[0] {
            Loading::NormalPressionFace { cells, .. } => cells,
            other => panic!("loading was not rewritten: {other:?}"),
        };
        assert_eq!(cells.cell_ids().len(), 1);
        let face_cell = model
            .mesh
            .find_cell(cells.cell_ids()[0])
            .expect("face cell exists");
        assert_eq!(face_cell.cell_type, CellType::Quad4);
        assert_eq!(face_cell.node_ids, vec![50, 51, 52, 53]);
        let skin = model.mesh.find_cell_group("SKIN").expect("skin group");
        assert!(skin.cell_ids().contains(&face_cell.id));
    }

    #[test]
    fn rbe2_penalty_cellification_creates_rigid_segments() {
        let mut configuration = ModelConfiguration::for_target(SolverName::Systus);
        configuration.rbe2_translation_mode = Rbe2TranslationMode::Penalty;
        configuration.rbe2_rigidity = 1e7;
        let mut model = Model::new("rbe2", "nastran", configuration);
        for (id, x) in [(100, 0.0), (101, 1.0), (102, 2.0)] {
            model.mesh.add_node_global(Some(id), x, 0.0, 0.0).expect("node");
        }
        let id = model.next_auto_id();
        let rigid_id = model.add_constraint(Constraint::Rigid {
            base: ConstraintBase::new(id, Some(1)),
            master: 100,
            slaves: vec![101, 102],
        });
        model.add_common_constraint(rigid_id);
        let node_count_before = model.mesh.count_nodes();

        model.finish().expect("finish");

        assert!(model.find_constraint(rigid_id).is_none());
        let group = model
            .mesh
            .find_cell_group("RIGID_1")
            .expect("rigid cell group");
        assert_eq!(group.cell_ids().len(), 2);
        for cell_id in group.cell_ids() {
            let cell = model.mesh.find_cell(*cell_id).expect("cell");
            assert_eq!(cell.cell_type, CellType::Seg2);
            assert_eq!(cell.node_ids[0], 100);
        }
        // Penalty form: no Lagrange nodes.
        assert_eq!(model.mesh.count_nodes(), node_count_before);
        let rigid_set = model
            .element_sets()
            .iter()
            .find(|s| s.cell_group() == Some("RIGID_1"))
            .expect("rigid element set");
        let material = model
            .find_material(rigid_set.material().expect("material bound"))
            .expect("material");
        assert!(material.natures().iter().any(|n| matches!(
            n,
            Nature::Rigid { rigidity: Some(r), lagrangian: false } if *r == 1e7
        )));
    }

    #[test]
    fn finish_is_idempotent() {
        let mut model = hexa_model(ModelConfiguration::for_target(SolverName::CodeAster));
        model.finish().expect("first finish");
        let cells_after_first = model.mesh.count_cells();
        let sets_after_first = model.element_sets().len();
        model.finish().expect("second finish");
        assert_eq!(model.mesh.count_cells(), cells_after_first);
        assert_eq!(model.element_sets().len(), sets_after_first);
    }

    #[test]
    fn auto_detect_analysis_synthesises_a_static_default() {
        let mut model = hexa_model(ModelConfiguration::for_target(SolverName::CodeAster));
        let load_ref = LoadSetRef::new(LoadSetType::Load, 1);
        let id = model.next_auto_id();
        model.add_loading_into_loadset(
            nodal_force(id, None, 52, VectorialValue::Z, VectorialValue::zero()),
            load_ref,
        );
        model.finish().expect("finish");
        assert_eq!(model.analyses().len(), 1);
        let analysis = model.analyses().iter().next().expect("analysis");
        assert!(matches!(analysis, Analysis::LinearMecaStat { .. }));
        assert!(analysis.base().load_sets().contains(&load_ref));
    }

    #[test]
    fn ineffective_assertions_are_dropped() {
        let mut model = hexa_model(ModelConfiguration::for_target(SolverName::CodeAster));
        // RX on a solid-only node is never materialised.
        let dead_id = model.auto_ids.next_id();
        let dead = model.add_assertion(Assertion::NodalDisplacement {
            id: dead_id,
            node: 50,
            dof: DOF::RX,
            value: 0.1,
            tolerance: 0.02,
            load_step: None,
        });
        let live_id = model.auto_ids.next_id();
        let live = model.add_assertion(Assertion::NodalDisplacement {
            id: live_id,
            node: 50,
            dof: DOF::DZ,
            value: 0.1,
            tolerance: 0.02,
            load_step: None,
        });
        model.finish().expect("finish");
        assert!(model.find_assertion(dead).is_none());
        assert!(model.find_assertion(live).is_some());
    }

    #[test]
    fn validate_rejects_dangling_cell_nodes() {
        let mut model = aster_model();
        model.mesh.add_node_global(Some(1), 0.0, 0.0, 0.0).expect("node");
        model
            .mesh
            .add_cell(Some(1), CellType::Seg2, vec![1, 99], None)
            .expect("cell referencing missing node is inserted");
        let err = model.validate().expect_err("validation must fail");
        assert!(matches!(err, ModelError::Invariant(_)));
    }
}
