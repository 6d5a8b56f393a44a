//! Card-based (`.f06`) reference-result reader.
//!
//! Sections recognised: DISPLACEMENT VECTOR, REAL EIGENVALUES and COMPLEX
//! DISPLACEMENT VECTOR. The subcase id is tracked across sections; LOAD STEP
//! and FREQUENCY are captured from section headers. Each record yields one
//! assertion attached to the matching analysis.

use std::fs;

use fetra_model::coordinates::GLOBAL_COORDINATE_SYSTEM_ID;
use fetra_model::dofs::DOF;
use fetra_model::geometry::VectorialValue;
use fetra_model::identifiers::Id;
use fetra_model::model::Model;
use fetra_model::objectives::Assertion;
use fetra_model::{ConfigurationParameters, Identified};

use crate::error::{IoError, Result};

const DISPLACEMENT_HEADER: &str = "D I S P L A C E M E N T   V E C T O R";
const EIGENVALUE_HEADER: &str = "R E A L   E I G E N V A L U E S";
const COMPLEX_HEADER: &str = "C O M P L E X   D I S P L A C E M E N T   V E C T O R";

/// Values below this are flushed to exact zero before asserting.
const ZERO_FLUSH: f64 = 1e-12;

#[derive(Debug, Default)]
pub struct F06Parser;

impl F06Parser {
    pub fn new() -> Self {
        F06Parser
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
        let lines: Vec<&str> = raw.lines().collect();

        let mut subcase: Option<Id> = None;
        let mut load_step: Option<f64> = None;
        let mut frequency: Option<f64> = None;
        let mut cursor = 0usize;
        while cursor < lines.len() {
            let line = lines[cursor].trim();
            cursor += 1;
            if let Some(found) = parse_subcase(line) {
                subcase = Some(found);
                load_step = None;
            }
            if let Some(position) = line.find("LOAD STEP = ") {
                load_step = line[position + 12..].trim().parse::<f64>().ok();
            }
            if let Some(position) = line.find("FREQUENCY = ") {
                frequency = line[position + 12..].trim().parse::<f64>().ok();
            }
            match line {
                DISPLACEMENT_HEADER => {
                    let (next, assertions) =
                        self.read_displacements(model, configuration, &lines, cursor, load_step);
                    cursor = next.0;
                    attach(model, subcase, assertions);
                    if let Some(found) = next.1 {
                        subcase = Some(found);
                        load_step = None;
                    }
                }
                EIGENVALUE_HEADER => {
                    let (next, assertions) =
                        self.read_eigenvalues(model, configuration, &lines, cursor);
                    cursor = next;
                    attach(model, subcase, assertions);
                }
                COMPLEX_HEADER => {
                    let (next, assertions) = self.read_complex_displacements(
                        model,
                        configuration,
                        &lines,
                        cursor,
                        frequency.unwrap_or(0.0),
                    );
                    cursor = next.0;
                    attach(model, subcase, assertions);
                    if let Some(found) = next.1 {
                        subcase = Some(found);
                        load_step = None;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns (next cursor, subcase consumed while detecting section end).
    fn read_displacements(
        &self,
        model: &mut Model,
        configuration: &ConfigurationParameters,
        lines: &[&str],
        mut cursor: usize,
        load_step: Option<f64>,
    ) -> ((usize, Option<Id>), Vec<Assertion>) {
        let mut assertions = Vec::new();
        // Column header line.
        cursor += 1;
        let mut consumed_subcase = None;
        while cursor < lines.len() {
            let raw = lines[cursor];
            let line = raw.trim();
            cursor += 1;
            if line.is_empty() {
                continue;
            }
            if line.contains("DIAGNOSTIC TOOLS") {
                continue;
            }
            if let Some(found) = parse_subcase(line) {
                consumed_subcase = Some(found);
                break;
            }
            if !raw.starts_with(' ') {
                break;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != 8 {
                break;
            }
            let Ok(node_id) = tokens[0].parse::<Id>() else {
                break;
            };
            if tokens[1] != "G" {
                continue;
            }
            let mut values = [0.0; 6];
            let mut bad = false;
            for (slot, token) in values.iter_mut().zip(&tokens[2..8]) {
                match token.parse::<f64>() {
                    Ok(value) => *slot = value,
                    Err(_) => bad = true,
                }
            }
            if bad {
                break;
            }
            let (translation, rotation) =
                globalized(model, node_id, values);
            let all = [
                translation.x(),
                translation.y(),
                translation.z(),
                rotation.x(),
                rotation.y(),
                rotation.z(),
            ];
            for (position, value) in all.iter().enumerate() {
                let value = if value.abs() < ZERO_FLUSH { 0.0 } else { *value };
                let id = model.next_auto_id();
                assertions.push(Assertion::NodalDisplacement {
                    id,
                    node: node_id,
                    dof: DOF::find_by_position(position).expect("position in range"),
                    value,
                    tolerance: configuration.test_tolerance,
                    load_step,
                });
            }
        }
        ((cursor, consumed_subcase), assertions)
    }

    fn read_eigenvalues(
        &self,
        model: &mut Model,
        configuration: &ConfigurationParameters,
        lines: &[&str],
        mut cursor: usize,
    ) -> (usize, Vec<Assertion>) {
        let mut assertions = Vec::new();
        // Find the column banner; residual-vector and dynamic-mode echoes
        // are not reference results.
        while cursor < lines.len() {
            let line = lines[cursor];
            cursor += 1;
            if line.contains("AFTER AUGMENTATION OF RESIDUAL VECTORS")
                || line.contains("ACTUAL MODES USED IN THE DYNAMIC ANALYSIS")
            {
                return (cursor, assertions);
            }
            if line.contains("ORDER") {
                break;
            }
        }
        while cursor < lines.len() {
            let tokens: Vec<&str> = lines[cursor].split_whitespace().collect();
            if tokens.len() != 7 {
                break;
            }
            cursor += 1;
            let (Ok(number), Ok(value)) = (tokens[0].parse::<i32>(), tokens[4].parse::<f64>())
            else {
                break;
            };
            let value = if value.abs() < ZERO_FLUSH { 0.0 } else { value };
            let id = model.next_auto_id();
            assertions.push(Assertion::Frequency {
                id,
                number,
                value,
                tolerance: configuration.test_tolerance,
            });
        }
        (cursor, assertions)
    }

    fn read_complex_displacements(
        &self,
        model: &mut Model,
        configuration: &ConfigurationParameters,
        lines: &[&str],
        mut cursor: usize,
        frequency: f64,
    ) -> ((usize, Option<Id>), Vec<Assertion>) {
        let mut assertions = Vec::new();
        let mut consumed_subcase = None;
        while cursor < lines.len() {
            let line = lines[cursor];
            cursor += 1;
            if line.contains("POINT ID.") {
                break;
            }
        }
        while cursor + 1 < lines.len() {
            if let Some(found) = parse_subcase(lines[cursor].trim()) {
                consumed_subcase = Some(found);
                cursor += 1;
                break;
            }
            let real_tokens: Vec<&str> = lines[cursor].split_whitespace().collect();
            if real_tokens.len() != 9 {
                break;
            }
            let imag_tokens: Vec<&str> = lines[cursor + 1].split_whitespace().collect();
            cursor += 2;
            if imag_tokens.len() != 6 {
                break;
            }
            let Ok(node_id) = real_tokens[1].parse::<Id>() else {
                break;
            };
            for position in 0..6 {
                let Ok(mut real) = real_tokens[3 + position].parse::<f64>() else {
                    continue;
                };
                let Ok(mut imaginary) = imag_tokens[position].parse::<f64>() else {
                    continue;
                };
                if real.abs() < ZERO_FLUSH {
                    real = 0.0;
                }
                if imaginary.abs() < ZERO_FLUSH {
                    imaginary = 0.0;
                }
                let id = model.next_auto_id();
                assertions.push(Assertion::NodalComplexDisplacement {
                    id,
                    node: node_id,
                    dof: DOF::find_by_position(position).expect("position in range"),
                    real,
                    imaginary,
                    frequency,
                    tolerance: configuration.test_tolerance,
                });
            }
        }
        ((cursor, consumed_subcase), assertions)
    }
}

/// Result vectors are written in the node's displacement frame; express them
/// globally before asserting.
fn globalized(model: &Model, node_id: Id, values: [f64; 6]) -> (VectorialValue, VectorialValue) {
    let translation = VectorialValue::new(values[0], values[1], values[2]);
    let rotation = VectorialValue::new(values[3], values[4], values[5]);
    let Some(node) = model.mesh.find_node(node_id) else {
        return (translation, rotation);
    };
    if node.displacement_cs == GLOBAL_COORDINATE_SYSTEM_ID {
        return (translation, rotation);
    }
    match model.find_coordinate_system(node.displacement_cs) {
        Some(cs) => {
            let mut cs = cs.clone();
            cs.update_local_base(&node.position());
            (
                cs.vector_to_global(&translation),
                cs.vector_to_global(&rotation),
            )
        }
        None => (translation, rotation),
    }
}

fn parse_subcase(line: &str) -> Option<Id> {
    let position = line.find("SUBCASE")?;
    let tail = line[position + 7..].trim();
    if tail.is_empty() || !tail.chars().all(|c| c.is_ascii_digit() || c == ' ') {
        return None;
    }
    tail.split_whitespace().next()?.parse().ok()
}

/// Attach to the subcase's analysis; the first analysis when none was named.
fn attach(model: &mut Model, subcase: Option<Id>, assertions: Vec<Assertion>) {
    let analysis_id = match subcase {
        Some(subcase) => match model.find_analysis_by_original(subcase) {
            Some(analysis) => Some(analysis.id()),
            // A lone analysis still gets the records: solvers print SUBCASE 1
            // even for decks that never declared one.
            None if model.analyses().len() == 1 => {
                model.analyses().iter().next().map(Identified::id)
            }
            None => {
                log::warn!("could not find subcase {subcase} in model, dropping its records");
                None
            }
        },
        None => model.analyses().iter().next().map(Identified::id),
    };
    for assertion in assertions {
        let Some(analysis_id) = analysis_id else {
            continue;
        };
        let assertion_id = model.add_assertion(assertion);
        if let Some(analysis) = model.analyses_mut().find_mut(analysis_id) {
            analysis.base_mut().add_assertion(assertion_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetra_model::analysis::{Analysis, AnalysisBase, FrequencyBand};
    use fetra_model::{ModelConfiguration, SolverName};
    use std::path::PathBuf;

    fn modal_model() -> Model {
        let mut model = Model::new(
            "modal.bdf",
            "nastran",
            ModelConfiguration::for_target(SolverName::CodeAster),
        );
        model.mesh.add_node_global(Some(1), 0.0, 0.0, 0.0).expect("node");
        let band_id = model.next_auto_id();
        model.add_frequency_band(FrequencyBand {
            id: band_id,
            original_id: Some(20),
            lower: None,
            upper: None,
            num_max: Some(5),
            norm: "MASS".to_string(),
        });
        let analysis_id = model.next_auto_id();
        let base = AnalysisBase::new(analysis_id, Some(1), "Analysis_1");
        model.add_analysis(Analysis::LinearModal {
            base,
            frequency_band: 20,
        });
        model
    }

    fn write_result(contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "fetra_f06_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock is sane")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("ref.f06");
        std::fs::write(&path, contents).expect("write result file");
        path
    }

    #[test]
    fn eigenvalue_section_yields_frequency_assertions() {
        let mut model = modal_model();
        let f06 = "\
                                   SUBCASE 1
                              R E A L   E I G E N V A L U E S
   MODE    EXTRACTION      EIGENVALUE            RADIANS             CYCLES            GENERALIZED         GENERALIZED
    NO.       ORDER                                                                       MASS              STIFFNESS
         1         1       8.882644E+05        9.424778E+02        1.500000E+02        1.000000E+00        8.882644E+05
         2         2       3.553058E+06        1.884956E+03        3.000000E+02        1.000000E+00        3.553058E+06
";
        let path = write_result(f06);
        let mut configuration = ConfigurationParameters::new("modal.bdf", SolverName::CodeAster);
        configuration.result_file = Some(path);
        F06Parser::new()
            .add_assertions(&configuration, &mut model)
            .expect("back-read succeeds");

        let analysis = model.analyses().iter().next().expect("analysis");
        assert_eq!(analysis.base().assertions().len(), 2);
        let first = model
            .find_assertion(analysis.base().assertions()[0])
            .expect("assertion resolves");
        match first {
            Assertion::Frequency { number, value, tolerance, .. } => {
                assert_eq!(*number, 1);
                assert_eq!(*value, 150.0);
                assert_eq!(*tolerance, 0.02);
            }
            other => panic!("unexpected assertion {other:?}"),
        }
    }

    #[test]
    fn displacement_section_attaches_six_dofs_per_node() {
        let mut model = modal_model();
        let f06 = "\
                                   SUBCASE 1
      LOAD STEP =  1.00000E+00
                             D I S P L A C E M E N T   V E C T O R
     POINT ID.   TYPE          T1             T2             T3             R1             R2             R3
             1      G      1.000000E-03   0.0            0.0            0.0            0.0            2.000000E-13
";
        let path = write_result(f06);
        let mut configuration = ConfigurationParameters::new("modal.bdf", SolverName::CodeAster);
        configuration.result_file = Some(path);
        F06Parser::new()
            .add_assertions(&configuration, &mut model)
            .expect("back-read succeeds");

        let analysis = model.analyses().iter().next().expect("analysis");
        assert_eq!(analysis.base().assertions().len(), 6);
        let dx = model
            .find_assertion(analysis.base().assertions()[0])
            .expect("assertion");
        match dx {
            Assertion::NodalDisplacement { value, load_step, .. } => {
                assert_eq!(*value, 1.0e-3);
                assert_eq!(*load_step, Some(1.0));
            }
            other => panic!("unexpected assertion {other:?}"),
        }
        // The near-zero RZ value is flushed to exactly zero.
        let rz = model
            .find_assertion(analysis.base().assertions()[5])
            .expect("assertion");
        match rz {
            Assertion::NodalDisplacement { value, .. } => assert_eq!(*value, 0.0),
            other => panic!("unexpected assertion {other:?}"),
        }
    }
}
