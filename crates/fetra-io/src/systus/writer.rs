//! Systus writer.
//!
//! The most transformational target: the model arrives here already
//! cellified (matrices, rigid links, MPCs and contact became elements) and
//! split by DOF signature. Emission is one `_SC<i>_DATA1.ASC` mesh file and
//! one `_SC<i>.DAT` script per analysis, plus a `_ALL.DAT` master.
//!
//! Part ids are derived from the trailing integer of each cell group name;
//! groups without a usable suffix draw from a descending counter that skips
//! user-taken ids.

use std::collections::HashMap;
use std::path::PathBuf;

use fetra_model::analysis::Analysis;
use fetra_model::constraints::Constraint;
use fetra_model::dofs::DOFS;
use fetra_model::identifiers::Id;
use fetra_model::loadings::Loading;
use fetra_model::model::Model;
use fetra_model::objectives::Assertion;
use fetra_model::ConfigurationParameters;

use crate::error::{IoError, Result};
use crate::nastran::writer::write_atomic;

/// First auto part id; the counter decreases from here.
const AUTO_PART_ID_START: Id = 999_999;

#[derive(Debug, Default)]
pub struct SystusWriter;

impl SystusWriter {
    pub fn new() -> Self {
        SystusWriter
    }

    /// Write the study; returns the `_ALL.DAT` master file.
    pub fn write(&self, model: &Model, configuration: &ConfigurationParameters) -> Result<PathBuf> {
        let stem = stem_of(model);
        let all_path = configuration.output_path.join(format!("{stem}_ALL.DAT"));
        if all_path.exists() && !configuration.allow_overwrite {
            return Err(IoError::WouldOverwrite(all_path.display().to_string()));
        }

        let part_ids = derive_part_ids(model);
        let mut master = String::new();
        master.push_str(&format!("# {} translated from {}\n", stem, model.input_solver));

        let analyses: Vec<&Analysis> = model.analyses().iter().collect();
        for (index, analysis) in analyses.into_iter().enumerate() {
            let subcase = index + 1;
            let asc_name = format!("{stem}_SC{subcase}_DATA1.ASC");
            let dat_name = format!("{stem}_SC{subcase}.DAT");

            let mut asc = String::new();
            self.write_asc(model, analysis, &part_ids, &mut asc);
            write_atomic(&configuration.output_path.join(&asc_name), &asc)?;

            let mut dat = String::new();
            self.write_dat(model, analysis, subcase, &asc_name, &mut dat);
            write_atomic(&configuration.output_path.join(&dat_name), &dat)?;

            master.push_str(&format!("INPUT \"{dat_name}\"\n"));
        }
        write_atomic(&all_path, &master)?;
        Ok(all_path)
    }

    fn write_asc(
        &self,
        model: &Model,
        analysis: &Analysis,
        part_ids: &HashMap<String, Id>,
        out: &mut String,
    ) {
        let option = systus_option(model);
        let dof_count = if option == 3 { 6 } else { 3 };
        let max_nodes = model
            .mesh
            .cells()
            .iter()
            .map(|c| c.node_ids.len())
            .max()
            .unwrap_or(0);

        out.push_str("1VSD 0 121126 133214 121126 133214 \n");
        out.push_str(&format!("{}\n", truncate(&model.name, 20)));
        out.push_str(&format!(
            " 100000 {option} {} {} {} 0 0\n",
            model.mesh.count_nodes(),
            model.mesh.count_cells(),
            model.load_sets().len()
        ));
        out.push_str(&format!(" {dof_count} {} 0 0\n", dof_count * max_nodes));

        out.push_str("BEGIN_INFORMATIONS\n");
        out.push_str(&format!("{}\n", truncate(&model.name, 80)));
        out.push_str(&format!(
            " {option} 0 0 1 0 0 0 0 0 0 0 1 0 0 0 0 0 0 0 0\n"
        ));
        out.push_str("END_INFORMATIONS\n");

        // Node records: constraint code, then coordinates.
        let constraint_codes = self.constraint_codes(model, analysis);
        out.push_str(&format!("BEGIN_NODES {} 3\n", model.mesh.count_nodes()));
        for node in model.mesh.nodes() {
            let iconst = constraint_codes.get(&node.id).copied().unwrap_or(0);
            out.push_str(&format!(
                "{} {iconst} 0 0 0 0 {:e} {:e} {:e}\n",
                node.id, node.x, node.y, node.z
            ));
        }
        out.push_str("END_NODES\n");

        out.push_str(&format!("BEGIN_ELEMENTS {}\n", model.mesh.count_cells()));
        for cell in model.mesh.cells() {
            let part = model
                .mesh
                .cell_groups()
                .iter()
                .find(|g| g.cell_ids().contains(&cell.id))
                .and_then(|g| part_ids.get(&g.name))
                .copied()
                .unwrap_or(0);
            let code = 1000 * cell.cell_type.dimension() as Id + cell.node_ids.len() as Id;
            out.push_str(&format!("{} {code} {part} 0 0", cell.id));
            for node_id in &cell.node_ids {
                out.push_str(&format!(" {node_id}"));
            }
            out.push('\n');
        }
        out.push_str("END_ELEMENTS\n");

        let groups: Vec<_> = model
            .mesh
            .cell_groups()
            .iter()
            .filter(|g| !g.is_empty())
            .collect();
        out.push_str(&format!("BEGIN_GROUPS {}\n", groups.len()));
        for (index, group) in groups.iter().enumerate() {
            let part = part_ids.get(&group.name).copied().unwrap_or(0);
            out.push_str(&format!(
                "{} {} 2 0 \"PART_ID {part}\" \"\" \"{}\"",
                index + 1,
                group.name,
                group.comment
            ));
            for cell_id in group.cell_ids() {
                out.push_str(&format!(" {cell_id}"));
            }
            out.push('\n');
        }
        out.push_str("END_GROUPS\n");

        for section in [
            "MEDIA",
            "RELEASES",
            "TABLES",
            "DAMPINGS",
            "RELATIONS",
            "PULSATIONS",
            "SECTIONS",
            "COMPOSITES",
            "AFFECTATIONS",
        ] {
            out.push_str(&format!("BEGIN_{section} 0\n"));
            out.push_str(&format!("END_{section}\n"));
        }
    }

    /// Packed per-node constraint code from the SPCs active in this analysis.
    fn constraint_codes(&self, model: &Model, analysis: &Analysis) -> HashMap<Id, i32> {
        let mut codes: HashMap<Id, DOFS> = HashMap::new();
        for reference in model.active_constraint_sets(analysis) {
            for constraint in model.get_constraints_by_constraint_set(reference) {
                if let Constraint::Spc { nodes, dofs, .. } = constraint {
                    for node in nodes {
                        let entry = codes.entry(*node).or_insert(DOFS::NONE);
                        *entry = *entry + *dofs;
                    }
                }
            }
        }
        codes
            .into_iter()
            .map(|(node, dofs)| (node, dofs.nastran_code()))
            .collect()
    }

    fn write_dat(
        &self,
        model: &Model,
        analysis: &Analysis,
        subcase: usize,
        asc_name: &str,
        out: &mut String,
    ) {
        out.push_str(&format!("# SUBCASE {subcase}: {}\n", analysis.base().label));
        out.push_str(&format!("SEARCH DATA 1 ASCII \"{asc_name}\"\n"));
        out.push('\n');
        match analysis {
            Analysis::LinearMecaStat { .. } => {
                out.push_str("# RUN A STATIC ANALYSIS AND SAVE THE RESULTS.\n");
                out.push_str("SOLVE METHOD OPTI\n");
                out.push_str(&format!("SAVE DATA RESU {subcase}\n"));
            }
            Analysis::NonLinearMecaStat { strategy, .. } => {
                let increments = model
                    .find_strategy_by_original(*strategy)
                    .map(|s| s.number_of_increments)
                    .unwrap_or(10);
                out.push_str("# NONLINEAR STATIC ANALYSIS\n");
                out.push_str("TRANSIENT NON-LINEAR STATIC\n");
                out.push_str(&format!("BEHAVIOUR PLASTIC\nSTEP {increments}\n"));
                out.push_str("METHOD OPTIMIZED\nRETURN\n");
                out.push_str(&format!("SAVE DATA RESU {subcase}\n"));
            }
            Analysis::LinearModal { frequency_band, .. } => {
                let band = model.find_frequency_band_by_original(*frequency_band);
                let modes = band.and_then(|b| b.num_max).unwrap_or(10);
                out.push_str("# COMPUTE EIGENMODES\n");
                out.push_str("DYNAMIC\n");
                out.push_str("MODE SUBSPACE BLOCK 3\n");
                out.push_str(&format!(
                    "VECTOR {modes} STURM ITER 40 PRECISION 1*-6 FORCE\n"
                ));
                out.push_str("METHOD OPTIMIZED\nRETURN\n");
            }
            Analysis::LinearDynaModalFreq {
                frequency_band,
                excitation_frequencies,
                ..
            } => {
                let band = model.find_frequency_band_by_original(*frequency_band);
                let modes = band.and_then(|b| b.num_max).unwrap_or(10);
                out.push_str("# MODAL HARMONIC ANALYSIS\n");
                out.push_str("DYNAMIC\n");
                out.push_str("MODE SUBSPACE BLOCK 3\n");
                out.push_str(&format!(
                    "VECTOR {modes} STURM ITER 40 PRECISION 1*-6 FORCE\n"
                ));
                out.push_str("METHOD OPTIMIZED\nRETURN\n\n");
                out.push_str("CLOSE STIFFNESS MASS\n");
                out.push_str("DYNAMIC\n");
                out.push_str("HARMONIC RESPONSE VELOCITY ACCELERATION REACTION\n");
                self.write_frequency_block(model, *excitation_frequencies, out);
                out.push_str("METHOD OPTIMIZED COMPLEX\nRETURN\n");
            }
            Analysis::LinearDynaDirectFreq {
                excitation_frequencies,
                ..
            } => {
                out.push_str("# SOLVER FILE FOR HARMONIC ANALYSIS WITH DIRECT METHOD\n");
                out.push_str("CLOSE STIFFNESS MASS\n");
                out.push_str("DYNAMIC\n");
                out.push_str("HARMONIC RESPONSE VELOCITY ACCELERATION REACTION\n");
                self.write_frequency_block(model, *excitation_frequencies, out);
                out.push_str("METHOD OPTIMIZED COMPLEX\nRETURN\n");
            }
        }
        out.push('\n');
        self.write_loads_comment(model, analysis, out);
        self.write_assertion_comments(model, analysis, out);
    }

    fn write_frequency_block(&self, model: &Model, excitation: Id, out: &mut String) {
        let Some(values) = model.find_frequency_values_by_original(excitation) else {
            out.push_str("# FREQUENCY LIST MISSING\n");
            return;
        };
        let frequencies = values.frequencies();
        out.push_str("FREQUENCY ");
        match (frequencies.first(), frequencies.last()) {
            (Some(first), Some(last)) if frequencies.len() > 1 => {
                let step = (last - first) / (frequencies.len() - 1) as f64;
                out.push_str(&format!("INITIAL {:e}\n", first - step));
                out.push_str(&format!(" {last:e} STEP {step:e}\n"));
            }
            (Some(only), _) => {
                out.push_str(&format!("LIST {only:e}\n"));
            }
            _ => out.push('\n'),
        }
    }

    fn write_loads_comment(&self, model: &Model, analysis: &Analysis, out: &mut String) {
        for reference in analysis.base().load_sets() {
            for loading in model.get_loadings_by_loadset(*reference) {
                if let Loading::NodalForce { node, force, moment, .. } = loading {
                    out.push_str(&format!(
                        "# LOAD NODE {node} F=({:e},{:e},{:e}) M=({:e},{:e},{:e})\n",
                        force.x(),
                        force.y(),
                        force.z(),
                        moment.x(),
                        moment.y(),
                        moment.z()
                    ));
                }
            }
        }
    }

    fn write_assertion_comments(&self, model: &Model, analysis: &Analysis, out: &mut String) {
        for assertion_id in analysis.base().assertions() {
            match model.find_assertion(*assertion_id) {
                Some(Assertion::NodalDisplacement { node, dof, value, tolerance, .. }) => {
                    out.push_str(&format!(
                        "# CHECK DISPLACEMENT NODE {node} {dof} = {value:e} TOL {tolerance:e}\n"
                    ));
                }
                Some(Assertion::Frequency { number, value, tolerance, .. }) => {
                    out.push_str(&format!(
                        "# CHECK MODE {number} FREQ = {value:e} TOL {tolerance:e}\n"
                    ));
                }
                Some(Assertion::NodalComplexDisplacement {
                    node,
                    dof,
                    real,
                    imaginary,
                    frequency,
                    tolerance,
                    ..
                }) => {
                    out.push_str(&format!(
                        "# CHECK COMPLEX DISPLACEMENT NODE {node} {dof} AT {frequency:e} = {real:e}+{imaginary:e}j TOL {tolerance:e}\n"
                    ));
                }
                None => {}
            }
        }
    }
}

fn stem_of(model: &Model) -> String {
    let name = if model.name.is_empty() {
        "systus"
    } else {
        &model.name
    };
    match name.rfind('.') {
        Some(period) => name[..period].to_string(),
        None => name.to_string(),
    }
}

fn truncate(name: &str, max: usize) -> &str {
    &name[..name.len().min(max)]
}

/// Systus "option" 3 means shell/beam models with 6 DOFs per node.
fn systus_option(model: &Model) -> i32 {
    let has_rotations = model
        .element_sets()
        .iter()
        .any(|s| s.carries_rotations());
    if has_rotations { 3 } else { 4 }
}

/// Part ids from trailing integer suffixes of group names, falling back to a
/// descending counter that avoids user-supplied ids.
pub(crate) fn derive_part_ids(model: &Model) -> HashMap<String, Id> {
    let mut taken: Vec<Id> = Vec::new();
    let mut ids: HashMap<String, Id> = HashMap::new();
    for group in model.mesh.cell_groups() {
        if let Some(id) = trailing_integer(&group.name) {
            if id > 0 && !taken.contains(&id) {
                taken.push(id);
                ids.insert(group.name.clone(), id);
            }
        }
    }
    let mut next = AUTO_PART_ID_START;
    for group in model.mesh.cell_groups() {
        if ids.contains_key(&group.name) {
            continue;
        }
        while taken.contains(&next) {
            next -= 1;
        }
        taken.push(next);
        ids.insert(group.name.clone(), next);
        next -= 1;
    }
    ids
}

fn trailing_integer(name: &str) -> Option<Id> {
    let digits: String = name
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetra_model::cells::CellType;
    use fetra_model::{ModelConfiguration, SolverName};

    #[test]
    fn part_ids_use_suffix_then_descending_counter() {
        let mut model = Model::new(
            "m",
            "nastran",
            ModelConfiguration::for_target(SolverName::Systus),
        );
        model.mesh.add_node_global(Some(1), 0.0, 0.0, 0.0).expect("node");
        model.mesh.add_node_global(Some(2), 1.0, 0.0, 0.0).expect("node");
        model
            .mesh
            .add_cell(Some(1), CellType::Seg2, vec![1, 2], None)
            .expect("cell");
        model.mesh.find_or_create_cell_group("PROP_7").add_cell_id(1);
        model.mesh.find_or_create_cell_group("SKIN").add_cell_id(1);
        model.mesh.find_or_create_cell_group("PROP_7B").add_cell_id(1);

        let ids = derive_part_ids(&model);
        assert_eq!(ids["PROP_7"], 7);
        assert_eq!(ids["SKIN"], AUTO_PART_ID_START);
        assert_eq!(ids["PROP_7B"], AUTO_PART_ID_START - 1);
    }

    #[test]
    fn trailing_integer_parses_suffix_only() {
        assert_eq!(trailing_integer("PROP_42"), Some(42));
        assert_eq!(trailing_integer("SKIN"), None);
        assert_eq!(trailing_integer("A1B2"), Some(2));
    }
}
