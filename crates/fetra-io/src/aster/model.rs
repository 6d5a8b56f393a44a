//! Target-side view of the intermediate model for Code_Aster output:
//! file naming, solver sizing heuristics and keyword tables.

use std::path::PathBuf;

use fetra_model::dofs::DOF;
use fetra_model::elements::ElementSet;
use fetra_model::model::Model;
use fetra_model::values::Interpolation;
use fetra_model::ConfigurationParameters;

/// Couples the model with the configuration for the Aster writer.
pub struct AsterModel<'a> {
    pub model: &'a Model,
    pub configuration: &'a ConfigurationParameters,
    pub phenomene: &'static str,
}

impl<'a> AsterModel<'a> {
    pub fn new(model: &'a Model, configuration: &'a ConfigurationParameters) -> Self {
        AsterModel {
            model,
            configuration,
            phenomene: "MECANIQUE",
        }
    }

    pub fn stem(&self) -> String {
        let name = if self.model.name.is_empty() {
            "code_aster"
        } else {
            &self.model.name
        };
        match name.rfind('.') {
            Some(period) => name[..period].to_string(),
            None => name.to_string(),
        }
    }

    pub fn output_file(&self, extension: &str) -> PathBuf {
        self.configuration
            .output_path
            .join(format!("{}{}", self.stem(), extension))
    }

    pub fn aster_version(&self) -> String {
        if self.configuration.solver_version.is_empty() {
            "STABLE".to_string()
        } else {
            self.configuration.solver_version.clone()
        }
    }

    /// Memory request in MB, sized on the mesh and clamped.
    pub fn memjeveux(&self) -> f64 {
        let mem = 2048.0 * self.model.mesh.count_nodes() as f64 / 300_000.0;
        mem.max(128.0).min(12_000.0)
    }

    /// Time limit in seconds, sized on the mesh and the analysis count.
    pub fn tpmax(&self) -> f64 {
        let time = 3600.0 * self.model.mesh.count_nodes() as f64 / 300_000.0;
        time.max(360.0) * self.model.analyses().len().max(1) as f64
    }

    /// MODELISATION keyword of AFFE_MODELE for an element set.
    pub fn modelisation(&self, element_set: &ElementSet) -> &'static str {
        match element_set {
            ElementSet::Continuum { .. } => "'3D'",
            ElementSet::Shell { .. } | ElementSet::Composite { .. } => "'DKT'",
            s if s.is_beam() => "'POU_D_T'",
            ElementSet::DiscretePoint { .. } | ElementSet::NodalMass { .. } => "'DIS_TR'",
            ElementSet::DiscreteSegment { .. } | ElementSet::StructuralSegment { .. } => {
                "'DIS_TR'"
            }
            _ => "'DIS_TR'",
        }
    }

    pub fn dof_name(dof: DOF) -> &'static str {
        match dof {
            DOF::DX => "DX",
            DOF::DY => "DY",
            DOF::DZ => "DZ",
            DOF::RX => "DRX",
            DOF::RY => "DRY",
            DOF::RZ => "DRZ",
        }
    }

    pub fn interpolation_keyword(interpolation: Interpolation) -> &'static str {
        match interpolation {
            Interpolation::Linear => "'LIN'",
            Interpolation::Logarithmic => "'LOG'",
            Interpolation::Constant => "''",
            Interpolation::None => "'NON'",
        }
    }

    pub fn prolongation_keyword(interpolation: Interpolation) -> &'static str {
        match interpolation {
            Interpolation::Linear => "'LINEAIRE'",
            Interpolation::Logarithmic => "''",
            Interpolation::Constant => "'CONSTANT'",
            Interpolation::None => "'EXCLU'",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetra_model::{ModelConfiguration, SolverName};

    #[test]
    fn sizing_heuristics_are_clamped() {
        let model = Model::new(
            "tiny.bdf",
            "nastran",
            ModelConfiguration::for_target(SolverName::CodeAster),
        );
        let configuration = ConfigurationParameters::new("tiny.bdf", SolverName::CodeAster);
        let aster = AsterModel::new(&model, &configuration);
        assert_eq!(aster.memjeveux(), 128.0);
        assert_eq!(aster.tpmax(), 360.0);
        assert_eq!(aster.stem(), "tiny");
        assert_eq!(aster.aster_version(), "STABLE");
    }
}
