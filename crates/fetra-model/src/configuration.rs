//! Translation configuration: target solvers, translation modes and the
//! per-target `finish()` pass selection.

use std::path::PathBuf;

pub use fetra_deck::ErrorPolicy as TranslationMode;

/// Supported target (and source) solver families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolverName {
    CodeAster,
    Nastran,
    Systus,
}

impl SolverName {
    pub fn label(self) -> &'static str {
        match self {
            SolverName::CodeAster => "aster",
            SolverName::Nastran => "nastran",
            SolverName::Systus => "systus",
        }
    }

    pub fn from_label(label: &str) -> Option<SolverName> {
        match label.to_ascii_lowercase().as_str() {
            "aster" | "code_aster" | "code-aster" => Some(SolverName::CodeAster),
            "nastran" | "optistruct" => Some(SolverName::Nastran),
            "systus" => Some(SolverName::Systus),
            _ => None,
        }
    }
}

/// How rigid elements are rendered for targets without a native rigid card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rbe2TranslationMode {
    /// A Lagrange node per slave enforces the link exactly.
    Lagrangian,
    /// A large penalty stiffness approximates the link.
    Penalty,
}

/// The `finish()` pass selection. Each flag toggles exactly one pass; the
/// per-target defaults live in the constant tables below.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfiguration {
    pub virtual_discrets: bool,
    pub create_skin: bool,
    pub add_skin_to_model: bool,
    pub emulate_local_displacement: bool,
    pub emulate_additional_mass: bool,
    pub replace_combined_load_sets: bool,
    pub remove_ineffectives: bool,
    pub replace_direct_matrices: bool,
    pub split_direct_matrices: bool,
    pub make_cells_from_direct_matrices: bool,
    pub make_cells_from_lmpc: bool,
    pub make_cells_from_rbe: bool,
    pub make_cells_from_surface_slide: bool,
    pub split_elements_by_dofs: bool,
    pub auto_detect_analysis: bool,
    pub remove_constrained_imposed: bool,
    pub replace_rigid_segments: bool,
    pub add_virtual_material: bool,
    pub make_boundary_cells: bool,
    pub remove_redundant_spcs: bool,
    /// Matrices above this many entries are split when splitting is enabled.
    pub size_direct_matrices: usize,
    pub rbe2_translation_mode: Rbe2TranslationMode,
    /// Penalty stiffness of cellified rigid links.
    pub rbe2_rigidity: f64,
}

impl Default for ModelConfiguration {
    fn default() -> Self {
        ModelConfiguration {
            virtual_discrets: false,
            create_skin: false,
            add_skin_to_model: false,
            emulate_local_displacement: false,
            emulate_additional_mass: false,
            replace_combined_load_sets: false,
            remove_ineffectives: false,
            replace_direct_matrices: false,
            split_direct_matrices: false,
            make_cells_from_direct_matrices: false,
            make_cells_from_lmpc: false,
            make_cells_from_rbe: false,
            make_cells_from_surface_slide: false,
            split_elements_by_dofs: false,
            auto_detect_analysis: true,
            remove_constrained_imposed: false,
            replace_rigid_segments: false,
            add_virtual_material: false,
            make_boundary_cells: false,
            remove_redundant_spcs: false,
            size_direct_matrices: 1000,
            rbe2_translation_mode: Rbe2TranslationMode::Lagrangian,
            rbe2_rigidity: 0.0,
        }
    }
}

impl ModelConfiguration {
    /// Pass selection appropriate for a target solver.
    pub fn for_target(target: SolverName) -> Self {
        match target {
            // Aster keeps LMPC/RBE/rigid constraints native and works on an
            // exchanged mesh, so it wants skins and cleanups but no
            // cellification.
            SolverName::CodeAster => ModelConfiguration {
                virtual_discrets: true,
                create_skin: true,
                add_skin_to_model: true,
                emulate_local_displacement: true,
                emulate_additional_mass: true,
                replace_combined_load_sets: true,
                remove_ineffectives: true,
                replace_direct_matrices: true,
                add_virtual_material: true,
                make_boundary_cells: true,
                remove_redundant_spcs: true,
                ..Default::default()
            },
            // Systus has no native MPC/RBE/matrix cards: everything becomes
            // cells, split by DOF signature.
            SolverName::Systus => ModelConfiguration {
                virtual_discrets: true,
                create_skin: true,
                add_skin_to_model: true,
                emulate_additional_mass: true,
                replace_combined_load_sets: true,
                remove_ineffectives: true,
                split_direct_matrices: true,
                make_cells_from_direct_matrices: true,
                make_cells_from_lmpc: true,
                make_cells_from_rbe: true,
                make_cells_from_surface_slide: true,
                split_elements_by_dofs: true,
                remove_constrained_imposed: true,
                replace_rigid_segments: true,
                add_virtual_material: true,
                make_boundary_cells: true,
                remove_redundant_spcs: true,
                ..Default::default()
            },
            // Nastran-to-Nastran is close to the identity.
            SolverName::Nastran => ModelConfiguration {
                remove_ineffectives: true,
                ..Default::default()
            },
        }
    }
}

/// Everything the command line decides, passed through the whole pipeline.
#[derive(Debug, Clone)]
pub struct ConfigurationParameters {
    pub input_file: String,
    pub output_solver: SolverName,
    pub solver_version: String,
    pub output_path: PathBuf,
    pub translation_mode: TranslationMode,
    /// Reference result file used to inject assertions.
    pub result_file: Option<PathBuf>,
    pub test_tolerance: f64,
    pub run_solver: bool,
    pub solver_server: String,
    pub solver_command: String,
    pub rbe2_translation_mode: Rbe2TranslationMode,
    pub rbe2_rigidity: f64,
    /// Refuse to overwrite existing outputs unless set.
    pub allow_overwrite: bool,
}

impl ConfigurationParameters {
    pub fn new(input_file: &str, output_solver: SolverName) -> Self {
        ConfigurationParameters {
            input_file: input_file.to_string(),
            output_solver,
            solver_version: String::new(),
            output_path: PathBuf::from("."),
            translation_mode: TranslationMode::BestEffort,
            result_file: None,
            test_tolerance: 0.02,
            run_solver: false,
            solver_server: String::new(),
            solver_command: String::new(),
            rbe2_translation_mode: Rbe2TranslationMode::Lagrangian,
            rbe2_rigidity: 0.0,
            allow_overwrite: true,
        }
    }

    /// The `finish()` configuration for the chosen target, with the RBE2
    /// rendering options folded in.
    pub fn model_configuration(&self) -> ModelConfiguration {
        ModelConfiguration {
            rbe2_translation_mode: self.rbe2_translation_mode,
            rbe2_rigidity: self.rbe2_rigidity,
            ..ModelConfiguration::for_target(self.output_solver)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aster_preserves_native_constraints() {
        let config = ModelConfiguration::for_target(SolverName::CodeAster);
        assert!(config.create_skin);
        assert!(!config.make_cells_from_lmpc);
        assert!(!config.make_cells_from_rbe);
        assert!(!config.replace_rigid_segments);
    }

    #[test]
    fn systus_cellifies_constraints() {
        let config = ModelConfiguration::for_target(SolverName::Systus);
        assert!(config.make_cells_from_lmpc);
        assert!(config.make_cells_from_rbe);
        assert!(config.replace_rigid_segments);
        assert!(config.split_elements_by_dofs);
    }

    #[test]
    fn solver_labels_round_trip() {
        for solver in [SolverName::CodeAster, SolverName::Nastran, SolverName::Systus] {
            assert_eq!(SolverName::from_label(solver.label()), Some(solver));
        }
        assert_eq!(SolverName::from_label("OPTISTRUCT"), Some(SolverName::Nastran));
        assert_eq!(SolverName::from_label("abaqus"), None);
    }

    #[test]
    fn parameters_carry_rbe2_options_into_model_configuration() {
        let mut parameters = ConfigurationParameters::new("deck.bdf", SolverName::Systus);
        parameters.rbe2_translation_mode = Rbe2TranslationMode::Penalty;
        parameters.rbe2_rigidity = 1e7;
        let config = parameters.model_configuration();
        assert_eq!(config.rbe2_translation_mode, Rbe2TranslationMode::Penalty);
        assert_eq!(config.rbe2_rigidity, 1e7);
        assert!(config.make_cells_from_rbe);
    }
}
