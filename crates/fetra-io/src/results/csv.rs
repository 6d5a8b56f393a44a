//! CSV reference-result reader.
//!
//! The header row names columns from a closed set (`RESULTAT`, `NOEUD`,
//! `NUME_ORDRE`, `INST`, the six DOF labels; anything else is unused). One
//! assertion is emitted per recognised DOF column per row, attached to the
//! analysis whose id is the integer suffix of the `RESULTAT` value.

use std::fs;

use fetra_model::dofs::DOF;
use fetra_model::identifiers::Id;
use fetra_model::model::Model;
use fetra_model::objectives::Assertion;
use fetra_model::{ConfigurationParameters, Identified};

use crate::error::{IoError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Unused,
    ResultName,
    Node,
    NumOrd,
    Time,
    Dof(DOF),
}

fn classify(header: &str) -> Column {
    match header.trim() {
        "RESULTAT" => Column::ResultName,
        "NOEUD" => Column::Node,
        "NUME_ORDRE" => Column::NumOrd,
        "INST" => Column::Time,
        "DX" => Column::Dof(DOF::DX),
        "DY" => Column::Dof(DOF::DY),
        "DZ" => Column::Dof(DOF::DZ),
        "DRX" => Column::Dof(DOF::RX),
        "DRY" => Column::Dof(DOF::RY),
        "DRZ" => Column::Dof(DOF::RZ),
        _ => Column::Unused,
    }
}

#[derive(Debug, Default)]
pub struct CsvResultReader;

impl CsvResultReader {
    pub fn new() -> Self {
        CsvResultReader
    }

    pub fn add_assertions(
        &mut self,
        configuration: &ConfigurationParameters,
        model: &mut Model,
    ) -> Result<()> {
        let Some(path) = configuration.result_file.clone() else {
            return Ok(());
        };
        if !path.exists() {
            return Err(IoError::FileNotFound(path.display().to_string()));
        }
        let raw = fs::read_to_string(&path)?;
        let mut columns: Option<Vec<Column>> = None;
        for line in raw.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match &columns {
                None => {
                    columns = Some(trimmed.split(',').map(classify).collect());
                }
                Some(layout) => {
                    self.read_row(configuration, model, layout, trimmed);
                }
            }
        }
        Ok(())
    }

    fn read_row(
        &self,
        configuration: &ConfigurationParameters,
        model: &mut Model,
        layout: &[Column],
        line: &str,
    ) {
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        if cells.len() != layout.len() {
            return;
        }
        let mut analysis_original: Option<Id> = None;
        let mut node: Option<Id> = None;
        let mut time = 0.0;
        for (column, cell) in layout.iter().zip(&cells) {
            match column {
                Column::ResultName => {
                    let Some(suffix) = cell.strip_prefix("RESU") else {
                        log::warn!("cannot parse result name {cell}");
                        return;
                    };
                    analysis_original = suffix.parse().ok();
                }
                Column::Node => {
                    // Mesh-exchange node names carry an `N` prefix.
                    let digits = cell.trim_start_matches(|c: char| !c.is_ascii_digit());
                    node = digits.parse().ok();
                }
                Column::Time => {
                    time = cell.parse().unwrap_or(0.0);
                }
                Column::NumOrd | Column::Unused | Column::Dof(_) => {}
            }
        }
        let Some(node) = node else {
            return;
        };
        let analysis_id = match analysis_original {
            Some(original) => match model.find_analysis_by_original(original) {
                Some(analysis) => Some(analysis.id()),
                None => {
                    log::warn!("could not find analysis {original} for CSV record");
                    None
                }
            },
            None => None,
        };
        for (column, cell) in layout.iter().zip(&cells) {
            let Column::Dof(dof) = column else {
                continue;
            };
            let Ok(value) = cell.parse::<f64>() else {
                continue;
            };
            let id = model.next_auto_id();
            let assertion = model.add_assertion(Assertion::NodalDisplacement {
                id,
                node,
                dof: *dof,
                value,
                tolerance: configuration.test_tolerance,
                load_step: if time != 0.0 { Some(time) } else { None },
            });
            if let Some(analysis_id) = analysis_id {
                if let Some(analysis) = model.analyses_mut().find_mut(analysis_id) {
                    analysis.base_mut().add_assertion(assertion);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetra_model::analysis::{Analysis, AnalysisBase};
    use fetra_model::{ModelConfiguration, SolverName};

    #[test]
    fn rows_yield_one_assertion_per_dof_column() {
        let mut model = Model::new(
            "static.bdf",
            "nastran",
            ModelConfiguration::for_target(SolverName::CodeAster),
        );
        model.mesh.add_node_global(Some(12), 0.0, 0.0, 0.0).expect("node");
        let analysis_id = model.next_auto_id();
        model.add_analysis(Analysis::LinearMecaStat {
            base: AnalysisBase::new(analysis_id, Some(2), "Analysis_2"),
        });

        let dir = std::env::temp_dir().join(format!(
            "fetra_csv_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock is sane")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("ref.csv");
        std::fs::write(
            &path,
            "# reference displacements\nRESULTAT,NOEUD,NUME_ORDRE,INST,DX,DZ\nRESU2,N12,1,0.0,1.5e-3,-2.0e-4\n",
        )
        .expect("write csv");

        let mut configuration = ConfigurationParameters::new("static.bdf", SolverName::CodeAster);
        configuration.result_file = Some(path);
        CsvResultReader::new()
            .add_assertions(&configuration, &mut model)
            .expect("back-read succeeds");

        let analysis = model.analyses().iter().next().expect("analysis");
        assert_eq!(analysis.base().assertions().len(), 2);
        let second = model
            .find_assertion(analysis.base().assertions()[1])
            .expect("assertion");
        match second {
            Assertion::NodalDisplacement { node, dof, value, .. } => {
                assert_eq!(*node, 12);
                assert_eq!(*dof, DOF::DZ);
                assert_eq!(*value, -2.0e-4);
            }
            other => panic!("unexpected assertion {other:?}"),
        }
    }
}
