//! Fixed-column Nastran writer.
//!
//! [`Line`] builds one logical card: fields are rendered at the regime's
//! width (8 columns, or 16 when the keyword carries a `*` suffix) and reals
//! take the densest representation that fits, falling back to the glued
//! exponent form (`1.23+7`) when the exponent letter does not fit.

use std::fmt::{Display, Formatter};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use fetra_model::analysis::Analysis;
use fetra_model::cells::CellType;
use fetra_model::constraints::{Constraint, ConstraintSetType};
use fetra_model::dofs::DOFS;
use fetra_model::elements::ElementSet;
use fetra_model::geometry::VectorialValue;
use fetra_model::identifiers::Id;
use fetra_model::loadings::{LoadSetType, Loading};
use fetra_model::materials::Nature;
use fetra_model::model::Model;
use fetra_model::{ConfigurationParameters, Identified, TranslationMode};

use super::geometry::node_permutation;
use crate::error::{IoError, Result};

/// One logical card under construction.
#[derive(Debug, Clone)]
pub struct Line {
    keyword: String,
    fields: Vec<String>,
    field_length: usize,
    fields_per_line: usize,
}

impl Line {
    pub fn new(keyword: &str) -> Self {
        let large = keyword.ends_with('*');
        Line {
            keyword: keyword.to_string(),
            fields: Vec::new(),
            field_length: if large { 16 } else { 8 },
            fields_per_line: if large { 4 } else { 8 },
        }
    }

    pub fn add_blank(&mut self) -> &mut Self {
        self.fields.push(" ".repeat(self.field_length));
        self
    }

    pub fn add_str(&mut self, value: &str) -> &mut Self {
        self.fields
            .push(format!("{value:>width$}", width = self.field_length));
        self
    }

    pub fn add_int(&mut self, value: Id) -> &mut Self {
        self.add_str(&value.to_string())
    }

    /// Blank for `None`, the id otherwise.
    pub fn add_opt_int(&mut self, value: Option<Id>) -> &mut Self {
        match value {
            Some(v) => self.add_int(v),
            None => self.add_blank(),
        }
    }

    pub fn add_double(&mut self, value: f64) -> &mut Self {
        let rendered = format_field_double(value, self.field_length);
        self.add_str(&rendered)
    }

    pub fn add_doubles(&mut self, values: &[f64]) -> &mut Self {
        for value in values {
            self.add_double(*value);
        }
        self
    }

    pub fn add_ints(&mut self, values: &[Id]) -> &mut Self {
        for value in values {
            self.add_int(*value);
        }
        self
    }

    pub fn add_dofs(&mut self, dofs: DOFS) -> &mut Self {
        self.add_int(dofs.nastran_code())
    }

    pub fn add_vector(&mut self, vector: &VectorialValue) -> &mut Self {
        self.add_double(vector.x())
            .add_double(vector.y())
            .add_double(vector.z())
    }
}

impl Display for Line {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let large = self.field_length == 16;
        let tag = if large { "*A" } else { "+A" };
        write!(f, "{:<8}", self.keyword)?;
        for (index, field) in self.fields.iter().enumerate() {
            if index > 0 && index % self.fields_per_line == 0 {
                writeln!(f, "{tag}")?;
                write!(f, "{tag:<8}")?;
            }
            write!(f, "{field}")?;
        }
        writeln!(f)
    }
}

/// Densest rendering of a real that fits `width` columns.
pub fn format_field_double(value: f64, width: usize) -> String {
    let plain = format!("{value}");
    let plain = if plain.contains('.') || plain.contains('e') || plain.contains("inf")
        || plain.contains("NaN")
    {
        plain
    } else {
        // Nastran requires a decimal point on real fields.
        format!("{plain}.")
    };
    if plain.len() <= width {
        return plain;
    }
    let precision = width.saturating_sub(5).min(8);
    let scientific = format!("{value:.precision$e}");
    if scientific.len() <= width {
        return scientific;
    }
    // Glued exponent: drop the letter, keep the sign.
    let compact = scientific.replace("e-", "-").replace('e', "+");
    if compact.len() <= width {
        return compact;
    }
    // Sacrifice mantissa digits until it fits.
    for precision in (0..=6).rev() {
        let candidate = format!("{value:.precision$e}")
            .replace("e-", "-")
            .replace('e', "+");
        if candidate.len() <= width {
            return candidate;
        }
    }
    plain
}

/// Serialises the intermediate model back into a Nastran-family deck.
#[derive(Debug, Default)]
pub struct NastranWriter;

impl NastranWriter {
    pub fn new() -> Self {
        NastranWriter
    }

    /// Write `<stem>.dat` under the output directory; returns its path.
    pub fn write(&self, model: &Model, configuration: &ConfigurationParameters) -> Result<PathBuf> {
        let stem = model_stem(model);
        let path = configuration.output_path.join(format!("{stem}.dat"));
        if path.exists() && !configuration.allow_overwrite {
            return Err(IoError::WouldOverwrite(path.display().to_string()));
        }

        let mut out = String::new();
        self.write_executive(model, &mut out);
        out.push_str("BEGIN BULK\n");
        self.write_mesh(model, &mut out);
        self.write_properties(model, &mut out);
        self.write_materials(model, &mut out);
        self.write_constraints(model, &mut out);
        self.write_loads(model, &mut out);
        self.write_analysis_aux(model, &mut out);
        out.push_str("ENDDATA\n");

        // Partially supported conversions degrade to $WARN comments; strict
        // mode refuses them instead.
        if configuration.translation_mode == TranslationMode::Strict {
            if let Some(line) = out.lines().find(|l| l.starts_with("$WARN")) {
                return Err(IoError::Writing {
                    entity: line.trim_start_matches("$WARN ").to_string(),
                    target: "nastran".to_string(),
                    message: "unsupported entity in strict mode".to_string(),
                });
            }
        }

        write_atomic(&path, &out)?;
        Ok(path)
    }

    fn write_executive(&self, model: &Model, out: &mut String) {
        out.push_str(&format!("$ translated from {}\n", model.input_solver));
        let sol = match model.analyses().iter().next() {
            Some(Analysis::LinearMecaStat { .. }) | None => "101",
            Some(Analysis::LinearModal { .. }) => "103",
            Some(Analysis::NonLinearMecaStat { .. }) => "106",
            Some(Analysis::LinearDynaModalFreq { .. }) => "111",
            Some(Analysis::LinearDynaDirectFreq { .. }) => "108",
        };
        out.push_str(&format!("SOL {sol}\n"));
        out.push_str("CEND\n");
        if !model.title.is_empty() {
            out.push_str(&format!("TITLE = {}\n", model.title));
        }
        for analysis in model.analyses() {
            let base = analysis.base();
            out.push_str(&format!(
                "SUBCASE {}\n",
                base.original_id.unwrap_or_else(|| base.id.abs())
            ));
            out.push_str(&format!("  LABEL = {}\n", base.label));
            for reference in base.constraint_sets() {
                if reference.id <= 0 {
                    continue;
                }
                match reference.set_type {
                    ConstraintSetType::Spc | ConstraintSetType::Spcd => {
                        out.push_str(&format!("  SPC = {}\n", reference.id));
                    }
                    ConstraintSetType::Mpc => {
                        out.push_str(&format!("  MPC = {}\n", reference.id));
                    }
                    _ => {}
                }
            }
            for reference in base.load_sets() {
                match reference.set_type {
                    LoadSetType::Load => {
                        out.push_str(&format!("  LOAD = {}\n", reference.id));
                    }
                    LoadSetType::Dload => {
                        out.push_str(&format!("  DLOAD = {}\n", reference.id));
                    }
                    LoadSetType::ExciteId => {}
                }
            }
            match analysis {
                Analysis::LinearModal { frequency_band, .. }
                | Analysis::LinearDynaModalFreq { frequency_band, .. } => {
                    out.push_str(&format!("  METHOD = {frequency_band}\n"));
                }
                _ => {}
            }
            if let Analysis::LinearDynaModalFreq {
                modal_damping,
                excitation_frequencies,
                ..
            } = analysis
            {
                out.push_str(&format!("  SDAMPING = {modal_damping}\n"));
                out.push_str(&format!("  FREQ = {excitation_frequencies}\n"));
            }
            if let Analysis::LinearDynaDirectFreq {
                excitation_frequencies,
                ..
            } = analysis
            {
                out.push_str(&format!("  FREQ = {excitation_frequencies}\n"));
            }
            if let Analysis::NonLinearMecaStat { strategy, .. } = analysis {
                out.push_str(&format!("  NLPARM = {strategy}\n"));
            }
        }
    }

    fn write_mesh(&self, model: &Model, out: &mut String) {
        for node in model.mesh.nodes() {
            let mut line = Line::new("GRID");
            line.add_int(node.id);
            if node.position_cs != 0 {
                line.add_int(node.position_cs);
            } else {
                line.add_blank();
            }
            line.add_double(node.x).add_double(node.y).add_double(node.z);
            if node.displacement_cs != 0 {
                line.add_int(node.displacement_cs);
            }
            out.push_str(&line.to_string());
        }
        for element_set in model.element_sets() {
            if element_set.is_matrix() {
                continue;
            }
            let Some(group) = element_set
                .cell_group()
                .and_then(|name| model.mesh.find_cell_group(name))
            else {
                continue;
            };
            let pid = element_set
                .original_id()
                .unwrap_or_else(|| element_set.id().abs());
            for cell_id in group.cell_ids() {
                let Some(cell) = model.mesh.find_cell(*cell_id) else {
                    continue;
                };
                let Some(keyword) = cell_keyword(element_set, cell.cell_type) else {
                    out.push_str(&format!(
                        "$WARN no card for {} cell {}\n",
                        element_set.kind_label(),
                        cell.id
                    ));
                    continue;
                };
                let mut line = Line::new(keyword);
                line.add_int(cell.id).add_int(pid);
                line.add_ints(&denormalized_nodes(cell.cell_type, &cell.node_ids));
                out.push_str(&line.to_string());
            }
        }
    }

    fn write_properties(&self, model: &Model, out: &mut String) {
        for element_set in model.element_sets() {
            let pid = element_set
                .original_id()
                .unwrap_or_else(|| element_set.id().abs());
            let mid = element_set
                .material()
                .and_then(|m| model.find_material(m))
                .map(|m| m.original_id.unwrap_or_else(|| m.id.abs()));
            match element_set {
                ElementSet::Shell {
                    thickness,
                    nonstructural_mass,
                    ..
                } => {
                    let mut line = Line::new("PSHELL");
                    line.add_int(pid)
                        .add_opt_int(mid)
                        .add_double(*thickness)
                        .add_opt_int(mid)
                        .add_blank()
                        .add_opt_int(mid)
                        .add_blank()
                        .add_double(*nonstructural_mass);
                    out.push_str(&line.to_string());
                }
                ElementSet::Continuum { .. } => {
                    let mut line = Line::new("PSOLID");
                    line.add_int(pid).add_opt_int(mid);
                    out.push_str(&line.to_string());
                }
                ElementSet::GenericSectionBeam {
                    area,
                    iy,
                    iz,
                    torsional_constant,
                    ..
                } => {
                    let mut line = Line::new("PBAR");
                    line.add_int(pid)
                        .add_opt_int(mid)
                        .add_double(*area)
                        .add_double(*iy)
                        .add_double(*iz)
                        .add_double(*torsional_constant);
                    out.push_str(&line.to_string());
                }
                ElementSet::CircularSectionBeam { radius, .. } => {
                    let mut line = Line::new("PBARL");
                    line.add_int(pid)
                        .add_opt_int(mid)
                        .add_blank()
                        .add_str("ROD")
                        .add_double(*radius);
                    out.push_str(&line.to_string());
                }
                ElementSet::RectangularSectionBeam { width, height, .. } => {
                    let mut line = Line::new("PBARL");
                    line.add_int(pid)
                        .add_opt_int(mid)
                        .add_blank()
                        .add_str("BAR")
                        .add_double(*width)
                        .add_double(*height);
                    out.push_str(&line.to_string());
                }
                ElementSet::StructuralSegment { stiffness, damping, .. } => {
                    let mut line = Line::new("PBUSH");
                    line.add_int(pid).add_str("K");
                    for dof in fetra_model::DOF::ALL {
                        line.add_double(stiffness.get(dof));
                    }
                    line.add_str("B");
                    for dof in fetra_model::DOF::ALL {
                        line.add_double(damping.get(dof));
                    }
                    out.push_str(&line.to_string());
                }
                _ => {}
            }
        }
    }

    fn write_materials(&self, model: &Model, out: &mut String) {
        for material in model.materials() {
            let mid = material.original_id.unwrap_or_else(|| material.id.abs());
            for nature in material.natures() {
                if let Nature::Elastic {
                    e,
                    nu,
                    g,
                    rho,
                    alpha,
                    t_ref,
                    ge,
                } = nature
                {
                    let mut line = Line::new("MAT1");
                    line.add_int(mid).add_double(*e);
                    match g {
                        Some(g) => line.add_double(*g),
                        None => line.add_blank(),
                    };
                    line.add_double(*nu)
                        .add_double(*rho)
                        .add_double(*alpha)
                        .add_double(*t_ref)
                        .add_double(*ge);
                    out.push_str(&line.to_string());
                }
            }
        }
    }

    fn write_constraints(&self, model: &Model, out: &mut String) {
        for constraint_set in model.constraint_sets() {
            let reference = constraint_set.reference();
            let sid = if reference.id > 0 { reference.id } else { 1 };
            for constraint in model.get_constraints_by_constraint_set(reference) {
                match constraint {
                    Constraint::Spc { nodes, dofs, values, .. } => {
                        let zero_valued = nodes
                            .iter()
                            .all(|_| dofs.iter().all(|d| values.get(d) == 0.0));
                        if zero_valued {
                            let mut line = Line::new("SPC1");
                            line.add_int(sid).add_dofs(*dofs).add_ints(nodes);
                            out.push_str(&line.to_string());
                        } else {
                            for node in nodes {
                                for dof in dofs.iter() {
                                    let mut line = Line::new("SPC");
                                    line.add_int(sid)
                                        .add_int(*node)
                                        .add_int(dof.position() as Id + 1)
                                        .add_double(values.get(dof));
                                    out.push_str(&line.to_string());
                                }
                            }
                        }
                    }
                    Constraint::Rigid { master, slaves, .. } => {
                        let mut line = Line::new("RBE2");
                        line.add_int(eid_of(constraint))
                            .add_int(*master)
                            .add_dofs(DOFS::ALL_DOFS)
                            .add_ints(slaves);
                        out.push_str(&line.to_string());
                    }
                    Constraint::QuasiRigid { dofs, master, nodes, .. } => {
                        let mut line = Line::new("RBE2");
                        line.add_int(eid_of(constraint));
                        if let Some(master) = master {
                            line.add_int(*master);
                        }
                        line.add_dofs(*dofs).add_ints(nodes);
                        out.push_str(&line.to_string());
                    }
                    Constraint::Rbe3 { master, master_dofs, slaves, .. } => {
                        let mut line = Line::new("RBE3");
                        line.add_int(eid_of(constraint))
                            .add_blank()
                            .add_int(*master)
                            .add_dofs(*master_dofs);
                        for slave in slaves {
                            line.add_double(slave.coefficient)
                                .add_dofs(slave.dofs)
                                .add_int(slave.node);
                        }
                        out.push_str(&line.to_string());
                    }
                    Constraint::Lmpc { terms, .. } => {
                        let mut line = Line::new("MPC");
                        line.add_int(sid);
                        for (node, coefs) in terms {
                            for dof in coefs.dofs().iter() {
                                line.add_int(*node)
                                    .add_int(dof.position() as Id + 1)
                                    .add_double(coefs.get(dof));
                            }
                        }
                        out.push_str(&line.to_string());
                    }
                    Constraint::Gap { .. } | Constraint::SurfaceSlide { .. } => {
                        out.push_str(&format!(
                            "$WARN contact constraint {} has no Nastran card here\n",
                            constraint.id()
                        ));
                    }
                }
            }
        }
    }

    fn write_loads(&self, model: &Model, out: &mut String) {
        for load_set in model.load_sets() {
            let reference = load_set.reference();
            let sid = if reference.id > 0 { reference.id } else { 1 };
            if !load_set.embedded_loadsets.is_empty() {
                let mut line = Line::new("LOAD");
                line.add_int(sid).add_double(1.0);
                for (inner, factor) in &load_set.embedded_loadsets {
                    line.add_double(*factor).add_int(inner.id);
                }
                out.push_str(&line.to_string());
            }
            for loading in model.get_loadings_by_loadset(reference) {
                match loading {
                    Loading::NodalForce { node, force, moment, cs, .. } => {
                        if !force.is_zero() {
                            let mut line = Line::new("FORCE");
                            line.add_int(sid).add_int(*node).add_int(*cs).add_double(1.0);
                            line.add_vector(force);
                            out.push_str(&line.to_string());
                        }
                        if !moment.is_zero() {
                            let mut line = Line::new("MOMENT");
                            line.add_int(sid).add_int(*node).add_int(*cs).add_double(1.0);
                            line.add_vector(moment);
                            out.push_str(&line.to_string());
                        }
                    }
                    Loading::Gravity { acceleration, direction, .. } => {
                        let mut line = Line::new("GRAV");
                        line.add_int(sid)
                            .add_int(0)
                            .add_double(*acceleration)
                            .add_vector(direction);
                        out.push_str(&line.to_string());
                    }
                    Loading::Rotation { speed, center, axis, .. } => {
                        let mut line = Line::new("RFORCE");
                        line.add_int(sid)
                            .add_int(*center)
                            .add_int(0)
                            .add_double(*speed)
                            .add_vector(axis);
                        out.push_str(&line.to_string());
                    }
                    Loading::NormalPressionFace { cells, pression, .. } => {
                        for cell in cells.cell_ids() {
                            let mut line = Line::new("PLOAD4");
                            line.add_int(sid).add_int(*cell).add_double(*pression);
                            out.push_str(&line.to_string());
                        }
                    }
                    Loading::PressionFaceTwoNodes {
                        cell,
                        node1,
                        node2,
                        pression,
                        ..
                    } => {
                        let mut line = Line::new("PLOAD4");
                        line.add_int(sid)
                            .add_int(*cell)
                            .add_double(*pression)
                            .add_blank()
                            .add_blank()
                            .add_blank()
                            .add_int(*node1)
                            .add_int(*node2);
                        out.push_str(&line.to_string());
                    }
                    other => {
                        out.push_str(&format!(
                            "$WARN loading {} ({}) is not written\n",
                            other.id(),
                            other.kind_label()
                        ));
                    }
                }
            }
        }
    }

    fn write_analysis_aux(&self, model: &Model, out: &mut String) {
        for analysis in model.analyses() {
            match analysis {
                Analysis::LinearModal { frequency_band, .. }
                | Analysis::LinearDynaModalFreq { frequency_band, .. } => {
                    if let Some(band) = model.find_frequency_band_by_original(*frequency_band) {
                        let mut line = Line::new("EIGRL");
                        line.add_int(*frequency_band);
                        match band.lower {
                            Some(v) => line.add_double(v),
                            None => line.add_blank(),
                        };
                        match band.upper {
                            Some(v) => line.add_double(v),
                            None => line.add_blank(),
                        };
                        line.add_opt_int(band.num_max);
                        out.push_str(&line.to_string());
                    }
                }
                Analysis::NonLinearMecaStat { strategy, .. } => {
                    if let Some(strategy) = model.find_strategy_by_original(*strategy) {
                        let mut line = Line::new("NLPARM");
                        line.add_int(strategy.original_id.unwrap_or(1))
                            .add_int(strategy.number_of_increments)
                            .add_blank()
                            .add_str("AUTO")
                            .add_int(5)
                            .add_int(strategy.max_iterations);
                        out.push_str(&line.to_string());
                    }
                }
                _ => {}
            }
        }
    }
}

fn model_stem(model: &Model) -> String {
    let name = if model.name.is_empty() {
        "nastran"
    } else {
        &model.name
    };
    match name.rfind('.') {
        Some(period) => name[..period].to_string(),
        None => name.to_string(),
    }
}

fn eid_of(constraint: &Constraint) -> Id {
    constraint
        .original_id()
        .unwrap_or_else(|| constraint.id().abs())
}

/// Internal node order back to Nastran field order.
fn denormalized_nodes(cell_type: CellType, internal: &[Id]) -> Vec<Id> {
    match node_permutation(cell_type) {
        Some(permutation) => {
            let mut nastran = vec![0; internal.len()];
            for (position, &field_index) in permutation.iter().enumerate() {
                nastran[field_index] = internal[position];
            }
            nastran
        }
        None => internal.to_vec(),
    }
}

fn cell_keyword(element_set: &ElementSet, cell_type: CellType) -> Option<&'static str> {
    if element_set.is_beam() {
        return Some("CBAR");
    }
    match cell_type {
        CellType::Tri3 => Some("CTRIA3"),
        CellType::Tri6 => Some("CTRIA6"),
        CellType::Quad4 => Some("CQUAD4"),
        CellType::Quad8 => Some("CQUAD8"),
        CellType::Tetra4 | CellType::Tetra10 => Some("CTETRA"),
        CellType::Pyra5 | CellType::Pyra13 => Some("CPYRAM"),
        CellType::Penta6 | CellType::Penta15 => Some("CPENTA"),
        CellType::Hexa8 | CellType::Hexa20 => Some("CHEXA"),
        _ => None,
    }
}

pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_field_reals_fit_eight_columns() {
        assert_eq!(format_field_double(1.0, 8), "1.");
        assert_eq!(format_field_double(0.25, 8), "0.25");
        let wide = format_field_double(123456789.5, 8);
        assert!(wide.len() <= 8, "got '{wide}'");
        let tiny = format_field_double(-1.234567890123e-30, 8);
        assert!(tiny.len() <= 8, "got '{tiny}'");
        assert!(
            !tiny.contains('e'),
            "compact form must glue the exponent: '{tiny}'"
        );
    }

    #[test]
    fn line_wraps_with_matching_tags() {
        let mut line = Line::new("RBE2");
        line.add_int(1).add_int(100).add_dofs(DOFS::ALL_DOFS);
        for slave in 101..=110 {
            line.add_int(slave);
        }
        let rendered = line.to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines.len() > 1);
        assert!(lines[0].ends_with("+A"));
        assert!(lines[1].starts_with("+A"));
    }

    #[test]
    fn large_field_lines_use_star_tags() {
        let mut line = Line::new("GRID*");
        line.add_int(1)
            .add_blank()
            .add_double(1.5)
            .add_double(2.5)
            .add_double(3.5);
        let rendered = line.to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("*A"));
        assert!(lines[1].starts_with("*A"));
    }

    #[test]
    fn denormalization_inverts_the_parser_permutation() {
        let nastran: Vec<Id> = (1..=8).collect();
        let permutation = node_permutation(CellType::Hexa8).expect("table exists");
        let internal: Vec<Id> = permutation.iter().map(|&i| nastran[i]).collect();
        assert_eq!(denormalized_nodes(CellType::Hexa8, &internal), nastran);
    }
}
