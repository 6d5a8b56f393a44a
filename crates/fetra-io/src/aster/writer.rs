//! Code_Aster writer: emits `<stem>.export`, the exchanged mesh and the
//! `.comm` command file, in DEBUT..FIN order.

use std::collections::HashMap;
use std::path::PathBuf;

use fetra_model::analysis::Analysis;
use fetra_model::constraints::{Constraint, ConstraintSetRef};
use fetra_model::dofs::DOF;
use fetra_model::elements::ElementSet;
use fetra_model::identifiers::Id;
use fetra_model::loadings::Loading;
use fetra_model::materials::Nature;
use fetra_model::model::Model;
use fetra_model::objectives::Assertion;
use fetra_model::values::Value;
use fetra_model::{ConfigurationParameters, Identified, TranslationMode};

use super::model::AsterModel;
use crate::error::{IoError, Result};
use crate::nastran::writer::write_atomic;

/// Writes a model, already normalised for Aster, as a runnable study.
#[derive(Debug, Default)]
pub struct AsterWriter {
    value_names: HashMap<Id, String>,
}

impl AsterWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the `.export` path, the file the runner hands to `as_run`.
    pub fn write(
        &mut self,
        model: &Model,
        configuration: &ConfigurationParameters,
    ) -> Result<PathBuf> {
        let aster = AsterModel::new(model, configuration);
        let export_path = aster.output_file(".export");
        if export_path.exists() && !configuration.allow_overwrite {
            return Err(IoError::WouldOverwrite(export_path.display().to_string()));
        }

        let med_path = aster.output_file(".med");
        model.mesh.write_med(&med_path)?;

        let comm_path = aster.output_file(".comm");
        let mut comm = String::new();
        self.write_comm(&aster, &mut comm);
        // Partially supported conversions degrade to #WARN comments; strict
        // mode refuses them instead.
        if configuration.translation_mode == TranslationMode::Strict {
            if let Some(line) = comm.lines().find(|l| l.starts_with("#WARN")) {
                return Err(IoError::Writing {
                    entity: line.trim_start_matches("#WARN ").to_string(),
                    target: "aster".to_string(),
                    message: "unsupported entity in strict mode".to_string(),
                });
            }
        }
        write_atomic(&comm_path, &comm)?;

        let mut export = String::new();
        self.write_export(&aster, &mut export);
        write_atomic(&export_path, &export)?;
        Ok(export_path)
    }

    fn write_export(&self, aster: &AsterModel<'_>, out: &mut String) {
        let stem = aster.stem();
        out.push_str("P actions make_etude\n");
        out.push_str(&format!("P version {}\n", aster.aster_version()));
        out.push_str("P nbproc 1\n");
        out.push_str(&format!("A memjeveux {:.1}\n", aster.memjeveux()));
        out.push_str(&format!("A tpmax {:.1}\n", aster.tpmax()));
        out.push_str(&format!(
            "F comm {} D 1\n",
            aster.output_file(".comm").display()
        ));
        out.push_str(&format!(
            "F mail {} D 20\n",
            aster.output_file(".med").display()
        ));
        out.push_str(&format!(
            "F mess {} R 6\n",
            aster.output_file(".mess").display()
        ));
        out.push_str(&format!(
            "F resu {} R 8\n",
            aster.output_file(".resu").display()
        ));
        out.push_str(&format!(
            "F rmed {} R 80\n",
            aster.output_file(".rmed").display()
        ));
        out.push_str(&format!(
            "R repe {} R 0\n",
            aster
                .configuration
                .output_path
                .join(format!("{stem}_repe_out"))
                .display()
        ));
    }

    fn write_comm(&mut self, aster: &AsterModel<'_>, out: &mut String) {
        out.push_str(&format!(
            "#fetra translation of {}\n",
            aster.model.name
        ));
        out.push_str(&format!("#Aster version {}\n", aster.aster_version()));
        out.push_str("DEBUT(PAR_LOT='NON')\n\n");

        self.write_lire_maillage(out);
        self.write_affe_modele(aster, out);
        self.write_values(aster, out);
        self.write_materials(aster, out);
        self.write_cara_elem(aster, out);
        self.write_char_meca(aster, out);
        self.write_defi_contact(aster, out);
        self.write_analyses(aster, out);
        self.write_impr_resu(aster, out);
        out.push_str("FIN()\n");
    }

    fn write_lire_maillage(&self, out: &mut String) {
        out.push_str("MAIL=LIRE_MAILLAGE(FORMAT='ASTER',VERI_MAIL=_F(VERIF='NON',),);\n\n");
    }

    fn write_affe_modele(&self, aster: &AsterModel<'_>, out: &mut String) {
        out.push_str("MODMECA=AFFE_MODELE(MAILLAGE=MAIL,\n");
        out.push_str("                    AFFE=(\n");
        for element_set in aster.model.element_sets() {
            match element_set.cell_group() {
                Some(group) => {
                    out.push_str(&format!("                          _F(GROUP_MA='{group}',\n"));
                    out.push_str(&format!(
                        "                             PHENOMENE='{}',\n",
                        aster.phenomene
                    ));
                    out.push_str(&format!(
                        "                             MODELISATION={},),\n",
                        aster.modelisation(element_set)
                    ));
                }
                None => {
                    out.push_str(&format!(
                        "#Skipping element set {} because no assignment\n",
                        element_set.id()
                    ));
                }
            }
        }
        out.push_str("                          ),\n");
        out.push_str("                    );\n\n");
    }

    fn write_values(&mut self, aster: &AsterModel<'_>, out: &mut String) {
        for (index, value) in aster.model.values().iter().enumerate() {
            let concept = format!("FCT{}", index + 1);
            match value {
                Value::FunctionTable {
                    points,
                    interpolation,
                    left_prolongation,
                    right_prolongation,
                    ..
                } => {
                    out.push_str(&format!("{concept}=DEFI_FONCTION(NOM_PARA='FREQ',\n"));
                    out.push_str("                  VALE=(\n");
                    for (x, y) in points {
                        out.push_str(&format!("                        {x:e},{y:e},\n"));
                    }
                    out.push_str("                        ),\n");
                    out.push_str(&format!(
                        "                  INTERPOL={},\n",
                        AsterModel::interpolation_keyword(*interpolation)
                    ));
                    out.push_str(&format!(
                        "                  PROL_GAUCHE={},\n",
                        AsterModel::prolongation_keyword(*left_prolongation)
                    ));
                    out.push_str(&format!(
                        "                  PROL_DROITE={},);\n\n",
                        AsterModel::prolongation_keyword(*right_prolongation)
                    ));
                    self.value_names.insert(value.id(), concept);
                }
                Value::StepRange { start, step, count, .. } => {
                    out.push_str(&format!("{concept}=DEFI_LIST_REEL(DEBUT={start:e},\n"));
                    out.push_str(&format!(
                        "                  INTERVALLE=_F(JUSQU_A={:e},NOMBRE={count},),);\n\n",
                        start + step * (*count as f64)
                    ));
                    self.value_names.insert(value.id(), concept);
                }
                Value::SpreadRange { start, end, count, .. } => {
                    out.push_str(&format!("{concept}=DEFI_LIST_REEL(DEBUT={start:e},\n"));
                    out.push_str(&format!(
                        "                  INTERVALLE=_F(JUSQU_A={end:e},NOMBRE={count},),);\n\n"
                    ));
                    self.value_names.insert(value.id(), concept);
                }
                Value::DynaPhase { .. } => {
                    // Rendered inline as PHAS_DEG on the excitation.
                }
            }
        }
    }

    fn write_materials(&self, aster: &AsterModel<'_>, out: &mut String) {
        for (index, material) in aster.model.materials().iter().enumerate() {
            let concept = material_concept(index);
            out.push_str(&format!("{concept}=DEFI_MATERIAU(\n"));
            for nature in material.natures() {
                match nature {
                    Nature::Elastic { e, nu, rho, alpha, .. } => {
                        out.push_str(&format!(
                            "                 ELAS=_F(E={e:e},NU={nu:e},RHO={rho:e},ALPHA={alpha:e},),\n"
                        ));
                    }
                    Nature::BilinearElastic {
                        elastic_limit,
                        secondary_slope,
                        ..
                    } => {
                        out.push_str(&format!(
                            "                 ECRO_LINE=_F(SY={elastic_limit:e},D_SIGM_EPSI={secondary_slope:e},),\n"
                        ));
                    }
                    Nature::NonLinearElastic { table } => {
                        let concept = aster
                            .model
                            .values()
                            .iter()
                            .position(|v| v.original_id() == Some(*table))
                            .map(|position| format!("FCT{}", position + 1))
                            .unwrap_or_else(|| "FCT1".to_string());
                        out.push_str(&format!(
                            "                 TRACTION=_F(SIGM={concept},),\n"
                        ));
                    }
                    Nature::Rigid { .. } | Nature::Interpolation { .. } => {
                        // Synthetic natures never reach the Aster writer;
                        // the matching passes stay disabled for this target.
                    }
                }
            }
            out.push_str("                 );\n\n");
        }

        out.push_str("CHMAT=AFFE_MATERIAU(MAILLAGE=MAIL,\n");
        out.push_str("                    AFFE=(\n");
        for assignment in aster.model.material_assignments() {
            let Some(position) = aster
                .model
                .materials()
                .iter()
                .position(|m| m.id == assignment.material)
            else {
                continue;
            };
            for group in assignment.container.group_names() {
                out.push_str(&format!(
                    "                          _F(GROUP_MA='{group}',MATER={},),\n",
                    material_concept(position)
                ));
            }
        }
        out.push_str("                          ),\n");
        out.push_str("                    );\n\n");
    }

    fn write_cara_elem(&self, aster: &AsterModel<'_>, out: &mut String) {
        let needs_cara = aster.model.element_sets().iter().any(|s| {
            s.is_beam() || s.is_shell() || s.is_discrete()
        });
        if !needs_cara {
            return;
        }
        out.push_str("CARELEM=AFFE_CARA_ELEM(MODELE=MODMECA,\n");
        for element_set in aster.model.element_sets() {
            let Some(group) = element_set.cell_group() else {
                continue;
            };
            match element_set {
                ElementSet::Shell { thickness, .. } => {
                    out.push_str(&format!(
                        "                       COQUE=_F(GROUP_MA='{group}',EPAIS={thickness:e},),\n"
                    ));
                }
                ElementSet::CircularSectionBeam { radius, .. } => {
                    out.push_str(&format!(
                        "                       POUTRE=_F(GROUP_MA='{group}',SECTION='CERCLE',CARA='R',VALE={radius:e},),\n"
                    ));
                }
                ElementSet::RectangularSectionBeam { width, height, .. } => {
                    out.push_str(&format!(
                        "                       POUTRE=_F(GROUP_MA='{group}',SECTION='RECTANGLE',CARA=('HY','HZ',),VALE=({width:e},{height:e},),),\n"
                    ));
                }
                ElementSet::GenericSectionBeam {
                    area,
                    iy,
                    iz,
                    torsional_constant,
                    ..
                } => {
                    out.push_str(&format!(
                        "                       POUTRE=_F(GROUP_MA='{group}',SECTION='GENERALE',CARA=('A','IY','IZ','JX',),VALE=({area:e},{iy:e},{iz:e},{torsional_constant:e},),),\n"
                    ));
                }
                ElementSet::DiscretePoint { stiffness, .. } => {
                    out.push_str(&format!(
                        "                       DISCRET=_F(GROUP_MA='{group}',CARA='K_TR_D_N',VALE=({},),),\n",
                        dof_values(stiffness)
                    ));
                }
                ElementSet::DiscreteSegment { stiffness, .. }
                | ElementSet::StructuralSegment { stiffness, .. } => {
                    out.push_str(&format!(
                        "                       DISCRET=_F(GROUP_MA='{group}',CARA='K_TR_D_L',VALE=({},),),\n",
                        dof_values(stiffness)
                    ));
                }
                ElementSet::NodalMass { mass, ixx, iyy, izz, .. } => {
                    out.push_str(&format!(
                        "                       DISCRET=_F(GROUP_MA='{group}',CARA='M_TR_D_N',VALE=({mass:e},{ixx:e},{iyy:e},{izz:e},0.0,0.0,0.0,0.0,0.0,0.0,),),\n"
                    ));
                }
                _ => {}
            }
        }
        out.push_str("                       );\n\n");
    }

    /// One AFFE_CHAR_MECA per constraint set and per load set.
    fn write_char_meca(&self, aster: &AsterModel<'_>, out: &mut String) {
        for (index, constraint_set) in aster.model.constraint_sets().iter().enumerate() {
            let reference = constraint_set.reference();
            let constraints = aster.model.get_constraints_by_constraint_set(reference);
            if constraints.is_empty() {
                continue;
            }
            out.push_str(&format!("BL{}=AFFE_CHAR_MECA(MODELE=MODMECA,\n", index + 1));
            self.write_spcs(aster, &constraints, out);
            self.write_liaison_solide(aster, &constraints, out);
            self.write_rbe3(&constraints, out);
            self.write_lmpc(&constraints, out);
            out.push_str("                   );\n\n");
        }

        for (index, load_set) in aster.model.load_sets().iter().enumerate() {
            let loadings = aster.model.get_loadings_by_loadset(load_set.reference());
            if loadings.is_empty() {
                continue;
            }
            out.push_str(&format!("CHME{}=AFFE_CHAR_MECA(MODELE=MODMECA,\n", index + 1));
            for loading in &loadings {
                match loading {
                    Loading::NodalForce { node, force, moment, .. } => {
                        out.push_str(&format!(
                            "                   FORCE_NODALE=_F(NOEUD='N{node}',"
                        ));
                        for (name, value) in [
                            ("FX", force.x()),
                            ("FY", force.y()),
                            ("FZ", force.z()),
                            ("MX", moment.x()),
                            ("MY", moment.y()),
                            ("MZ", moment.z()),
                        ] {
                            if value != 0.0 {
                                out.push_str(&format!("{name}={value:e},"));
                            }
                        }
                        out.push_str("),\n");
                    }
                    Loading::Gravity { acceleration, direction, .. } => {
                        let unit = direction.normalized();
                        out.push_str(&format!(
                            "                   PESANTEUR=_F(GRAVITE={:e},DIRECTION=({:e},{:e},{:e},),),\n",
                            acceleration * direction.norm(),
                            unit.x(),
                            unit.y(),
                            unit.z()
                        ));
                    }
                    Loading::Rotation { speed, axis, .. } => {
                        out.push_str(&format!(
                            "                   ROTATION=_F(VITESSE={speed:e},AXE=({:e},{:e},{:e},),),\n",
                            axis.x(),
                            axis.y(),
                            axis.z()
                        ));
                    }
                    Loading::NormalPressionFace { cells, pression, .. } => {
                        for group in cells.group_names() {
                            out.push_str(&format!(
                                "                   PRES_REP=_F(GROUP_MA='{group}',PRES={pression:e},),\n"
                            ));
                        }
                        for cell in cells.cell_ids() {
                            out.push_str(&format!(
                                "                   PRES_REP=_F(MAILLE='M{cell}',PRES={pression:e},),\n"
                            ));
                        }
                    }
                    Loading::ForceSurface { cells, force, .. } => {
                        for group in cells.group_names() {
                            out.push_str(&format!(
                                "                   FORCE_FACE=_F(GROUP_MA='{group}',FX={:e},FY={:e},FZ={:e},),\n",
                                force.x(),
                                force.y(),
                                force.z()
                            ));
                        }
                    }
                    other => {
                        out.push_str(&format!(
                            "#WARN loading {} ({}) is not written for this target\n",
                            other.id(),
                            other.kind_label()
                        ));
                    }
                }
            }
            out.push_str("                   );\n\n");
        }
    }

    fn write_spcs(&self, _aster: &AsterModel<'_>, constraints: &[&Constraint], out: &mut String) {
        let spcs: Vec<&&Constraint> = constraints
            .iter()
            .filter(|c| matches!(c, Constraint::Spc { .. }))
            .collect();
        if spcs.is_empty() {
            return;
        }
        out.push_str("                   DDL_IMPO=(\n");
        for constraint in spcs {
            if let Constraint::Spc { nodes, dofs, values, .. } = constraint {
                out.push_str("                             _F(NOEUD=(");
                for node in nodes {
                    out.push_str(&format!("'N{node}', "));
                }
                out.push_str("),");
                for dof in dofs.iter() {
                    out.push_str(&format!(
                        "{}={:e}, ",
                        AsterModel::dof_name(dof),
                        values.get(dof)
                    ));
                }
                out.push_str("),\n");
            }
        }
        out.push_str("                             ),\n");
    }

    fn write_liaison_solide(
        &self,
        _aster: &AsterModel<'_>,
        constraints: &[&Constraint],
        out: &mut String,
    ) {
        let rigids: Vec<&&Constraint> = constraints
            .iter()
            .filter(|c| {
                matches!(c, Constraint::Rigid { .. })
                    || matches!(
                        c,
                        Constraint::QuasiRigid { dofs, .. } if *dofs == fetra_model::DOFS::ALL_DOFS
                    )
            })
            .collect();
        if rigids.is_empty() {
            return;
        }
        out.push_str("                   LIAISON_SOLIDE=(\n");
        for constraint in rigids {
            out.push_str("                                   _F(NOEUD=(");
            for node in constraint.node_ids() {
                out.push_str(&format!("'N{node}',"));
            }
            out.push_str("),),\n");
        }
        out.push_str("                                   ),\n");
    }

    fn write_rbe3(&self, constraints: &[&Constraint], out: &mut String) {
        let rbe3s: Vec<&&Constraint> = constraints
            .iter()
            .filter(|c| matches!(c, Constraint::Rbe3 { .. }))
            .collect();
        if rbe3s.is_empty() {
            return;
        }
        out.push_str("                   LIAISON_RBE3=(\n");
        for constraint in rbe3s {
            if let Constraint::Rbe3 { master, master_dofs, slaves, .. } = constraint {
                out.push_str(&format!(
                    "                                 _F(NOEUD_MAIT='N{master}',DDL_MAIT=("
                ));
                for dof in master_dofs.iter() {
                    out.push_str(&format!("'{}',", AsterModel::dof_name(dof)));
                }
                out.push_str("),\n");
                out.push_str("                                    NOEUD_ESCL=(");
                for slave in slaves {
                    out.push_str(&format!("'N{}',", slave.node));
                }
                out.push_str("),\n");
                out.push_str("                                    DDL_ESCL=(");
                for slave in slaves {
                    let joined: Vec<&str> = slave
                        .dofs
                        .iter()
                        .map(AsterModel::dof_name)
                        .collect();
                    out.push_str(&format!("'{}',", joined.join("-")));
                }
                out.push_str("),\n");
                out.push_str("                                    COEF_ESCL=(");
                for slave in slaves {
                    out.push_str(&format!("{:e},", slave.coefficient));
                }
                out.push_str("),),\n");
            }
        }
        out.push_str("                                 ),\n");
    }

    fn write_lmpc(&self, constraints: &[&Constraint], out: &mut String) {
        let lmpcs: Vec<&&Constraint> = constraints
            .iter()
            .filter(|c| matches!(c, Constraint::Lmpc { .. }))
            .collect();
        if lmpcs.is_empty() {
            return;
        }
        out.push_str("                   LIAISON_DDL=(\n");
        for constraint in lmpcs {
            if let Constraint::Lmpc { imposed, terms, .. } = constraint {
                out.push_str("                                _F(NOEUD=(");
                for (node, coefs) in terms {
                    for _ in coefs.dofs().iter() {
                        out.push_str(&format!("'N{node}',"));
                    }
                }
                out.push_str("),\n");
                out.push_str("                                   DDL=(");
                for (_, coefs) in terms {
                    for dof in coefs.dofs().iter() {
                        out.push_str(&format!("'{}',", AsterModel::dof_name(dof)));
                    }
                }
                out.push_str("),\n");
                out.push_str("                                   COEF_MULT=(");
                for (_, coefs) in terms {
                    for dof in coefs.dofs().iter() {
                        out.push_str(&format!("{:e},", coefs.get(dof)));
                    }
                }
                out.push_str("),\n");
                out.push_str(&format!(
                    "                                   COEF_IMPO={imposed:e},),\n"
                ));
            }
        }
        out.push_str("                                ),\n");
    }

    fn write_defi_contact(&self, aster: &AsterModel<'_>, out: &mut String) {
        let gaps: Vec<&Constraint> = aster
            .model
            .constraints()
            .iter()
            .filter(|c| matches!(c, Constraint::Gap { .. }))
            .collect();
        if gaps.is_empty() {
            return;
        }
        out.push_str("CONT=DEFI_CONTACT(MODELE=MODMECA,\n");
        out.push_str("                  FORMULATION='DISCRETE',\n");
        out.push_str("                  ZONE=(\n");
        for gap in gaps {
            if let Constraint::Gap { initial_opening, participations, .. } = gap {
                for participation in participations {
                    out.push_str(&format!(
                        "                        _F(NOEUD_MAIT='N{}',NOEUD_ESCL='N{}',DIST_MAIT={initial_opening:e},),\n",
                        participation.node1, participation.node2
                    ));
                }
            }
        }
        out.push_str("                        ),\n");
        out.push_str("                  );\n\n");
    }

    fn write_analyses(&self, aster: &AsterModel<'_>, out: &mut String) {
        for (index, analysis) in aster.model.analyses().iter().enumerate() {
            let result = format!("RESU{}", index + 1);
            out.push_str(&format!("# {}\n", analysis.base().label));
            let excit = self.excit_block(aster, analysis);
            match analysis {
                Analysis::LinearMecaStat { .. } => {
                    out.push_str(&format!("{result}=MECA_STATIQUE(MODELE=MODMECA,\n"));
                    out.push_str("              CHAM_MATER=CHMAT,\n");
                    if self.has_cara(aster) {
                        out.push_str("              CARA_ELEM=CARELEM,\n");
                    }
                    out.push_str(&excit);
                    out.push_str("              );\n\n");
                }
                Analysis::NonLinearMecaStat { strategy, .. } => {
                    let increments = aster
                        .model
                        .find_strategy_by_original(*strategy)
                        .map(|s| s.number_of_increments)
                        .unwrap_or(10);
                    out.push_str(&format!(
                        "LINST{}=DEFI_LIST_REEL(DEBUT=0.0,INTERVALLE=_F(JUSQU_A=1.0,NOMBRE={increments},),);\n",
                        index + 1
                    ));
                    out.push_str(&format!("{result}=STAT_NON_LINE(MODELE=MODMECA,\n"));
                    out.push_str("              CHAM_MATER=CHMAT,\n");
                    if self.has_cara(aster) {
                        out.push_str("              CARA_ELEM=CARELEM,\n");
                    }
                    out.push_str(&excit);
                    out.push_str("              COMPORTEMENT=_F(RELATION='VMIS_ISOT_LINE',),\n");
                    out.push_str(&format!(
                        "              INCREMENT=_F(LIST_INST=LINST{},),\n",
                        index + 1
                    ));
                    out.push_str("              );\n\n");
                }
                Analysis::LinearModal { frequency_band, .. } => {
                    let band = aster.model.find_frequency_band_by_original(*frequency_band);
                    self.write_assemblage(aster, analysis, index, out);
                    out.push_str(&format!("{result}=CALC_MODES(MATR_RIGI=RIGI{},\n", index + 1));
                    out.push_str(&format!("              MATR_MASS=MASS{},\n", index + 1));
                    match band {
                        Some(band) if band.lower.is_some() && band.upper.is_some() => {
                            out.push_str("              OPTION='BANDE',\n");
                            out.push_str(&format!(
                                "              CALC_FREQ=_F(FREQ=({:e},{:e},),),\n",
                                band.lower.unwrap_or(0.0),
                                band.upper.unwrap_or(0.0)
                            ));
                        }
                        Some(band) => {
                            out.push_str("              OPTION='PLUS_PETITE',\n");
                            out.push_str(&format!(
                                "              CALC_FREQ=_F(NMAX_FREQ={},),\n",
                                band.num_max.unwrap_or(10)
                            ));
                        }
                        None => {
                            out.push_str("              OPTION='PLUS_PETITE',\n");
                            out.push_str("              CALC_FREQ=_F(NMAX_FREQ=10,),\n");
                        }
                    }
                    out.push_str("              );\n\n");
                }
                Analysis::LinearDynaModalFreq {
                    excitation_frequencies,
                    ..
                }
                | Analysis::LinearDynaDirectFreq {
                    excitation_frequencies,
                    ..
                } => {
                    let frequencies = aster
                        .model
                        .find_frequency_values_by_original(*excitation_frequencies)
                        .map(|v| v.frequencies().to_vec())
                        .unwrap_or_default();
                    let base = if matches!(analysis, Analysis::LinearDynaModalFreq { .. }) {
                        "BASE_CALCUL='GENE',"
                    } else {
                        "BASE_CALCUL='PHYS',"
                    };
                    self.write_assemblage(aster, analysis, index, out);
                    out.push_str(&format!(
                        "{result}=DYNA_VIBRA(TYPE_CALCUL='HARM',{base}\n"
                    ));
                    out.push_str(&format!(
                        "              MATR_RIGI=RIGI{0},MATR_MASS=MASS{0},\n",
                        index + 1
                    ));
                    out.push_str("              FREQ=(");
                    for frequency in frequencies {
                        out.push_str(&format!("{frequency:e},"));
                    }
                    out.push_str("),\n");
                    out.push_str(&excit);
                    out.push_str("              );\n\n");
                }
            }
            self.write_assertions(aster, analysis, &result, out);
        }
    }

    /// Assembled stiffness/mass matrices feeding the eigen and harmonic
    /// solvers.
    fn write_assemblage(
        &self,
        aster: &AsterModel<'_>,
        analysis: &Analysis,
        index: usize,
        out: &mut String,
    ) {
        out.push_str("ASSEMBLAGE(MODELE=MODMECA,\n");
        out.push_str("           CHAM_MATER=CHMAT,\n");
        if self.has_cara(aster) {
            out.push_str("           CARA_ELEM=CARELEM,\n");
        }
        let sets = aster.model.active_constraint_sets(analysis);
        let mut charges = Vec::new();
        for (position, constraint_set) in aster.model.constraint_sets().iter().enumerate() {
            let reference = constraint_set.reference();
            if sets.contains(&reference)
                && !aster
                    .model
                    .get_constraints_by_constraint_set(reference)
                    .is_empty()
            {
                charges.push(format!("BL{}", position + 1));
            }
        }
        if !charges.is_empty() {
            out.push_str(&format!("           CHARGE=({},),\n", charges.join(",")));
        }
        out.push_str(&format!("           NUME_DDL=CO('NUMDL{}'),\n", index + 1));
        out.push_str("           MATR_ASSE=(\n");
        out.push_str(&format!(
            "                      _F(MATRICE=CO('RIGI{}'),OPTION='RIGI_MECA',),\n",
            index + 1
        ));
        out.push_str(&format!(
            "                      _F(MATRICE=CO('MASS{}'),OPTION='MASS_MECA',),\n",
            index + 1
        ));
        out.push_str("                      ),\n");
        out.push_str("           );\n\n");
    }

    fn has_cara(&self, aster: &AsterModel<'_>) -> bool {
        aster
            .model
            .element_sets()
            .iter()
            .any(|s| s.is_beam() || s.is_shell() || s.is_discrete())
    }

    fn excit_block(&self, aster: &AsterModel<'_>, analysis: &Analysis) -> String {
        let mut excit = String::from("              EXCIT=(\n");
        let sets: Vec<ConstraintSetRef> = aster.model.active_constraint_sets(analysis);
        for (index, constraint_set) in aster.model.constraint_sets().iter().enumerate() {
            let reference = constraint_set.reference();
            if !sets.contains(&reference) {
                continue;
            }
            if aster
                .model
                .get_constraints_by_constraint_set(reference)
                .is_empty()
            {
                continue;
            }
            excit.push_str(&format!(
                "                     _F(CHARGE=BL{},),\n",
                index + 1
            ));
        }
        for (index, load_set) in aster.model.load_sets().iter().enumerate() {
            let reference = load_set.reference();
            if !analysis.base().load_sets().contains(&reference) {
                continue;
            }
            if aster.model.get_loadings_by_loadset(reference).is_empty() {
                continue;
            }
            excit.push_str(&format!(
                "                     _F(CHARGE=CHME{},),\n",
                index + 1
            ));
        }
        excit.push_str("                     ),\n");
        excit
    }

    /// TEST_RESU blocks comparing computed results against the injected
    /// reference values.
    fn write_assertions(
        &self,
        aster: &AsterModel<'_>,
        analysis: &Analysis,
        result: &str,
        out: &mut String,
    ) {
        let assertions: Vec<&Assertion> = analysis
            .base()
            .assertions()
            .iter()
            .filter_map(|id| aster.model.find_assertion(*id))
            .collect();
        if assertions.is_empty() {
            return;
        }
        out.push_str("TEST_RESU(RESU=(\n");
        for assertion in assertions {
            match assertion {
                Assertion::NodalDisplacement {
                    node,
                    dof,
                    value,
                    tolerance,
                    ..
                } => {
                    out.push_str(&format!(
                        "                _F(RESULTAT={result},NOM_CHAM='DEPL',NOEUD='N{node}',NOM_CMP='{}',VALE_CALC={value:e},VALE_REFE={value:e},REFERENCE='SOURCE_EXTERNE',PRECISION={tolerance:e},),\n",
                        AsterModel::dof_name(*dof)
                    ));
                }
                Assertion::NodalComplexDisplacement {
                    node,
                    dof,
                    real,
                    imaginary,
                    frequency,
                    tolerance,
                    ..
                } => {
                    out.push_str(&format!(
                        "                _F(RESULTAT={result},NOM_CHAM='DEPL',NOEUD='N{node}',NOM_CMP='{}',FREQ={frequency:e},VALE_CALC_C={real:e}+{imaginary:e}j,REFERENCE='SOURCE_EXTERNE',PRECISION={tolerance:e},),\n",
                        AsterModel::dof_name(*dof)
                    ));
                }
                Assertion::Frequency {
                    number,
                    value,
                    tolerance,
                    ..
                } => {
                    out.push_str(&format!(
                        "                _F(RESULTAT={result},PARA='FREQ',NUME_ORDRE={number},VALE_CALC={value:e},VALE_REFE={value:e},REFERENCE='SOURCE_EXTERNE',PRECISION={tolerance:e},),\n"
                    ));
                }
            }
        }
        out.push_str("                ),\n");
        out.push_str("          );\n\n");
    }

    fn write_impr_resu(&self, aster: &AsterModel<'_>, out: &mut String) {
        for index in 1..=aster.model.analyses().len() {
            out.push_str(&format!(
                "IMPR_RESU(FORMAT='RESULTAT',RESU=_F(RESULTAT=RESU{index},),);\n"
            ));
        }
        out.push('\n');
    }
}

fn material_concept(index: usize) -> String {
    format!("MA{}", index + 1)
}

fn dof_values(coefs: &fetra_model::DOFCoefs) -> String {
    DOF::ALL
        .iter()
        .map(|dof| format!("{:e}", coefs.get(*dof)))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetra_model::analysis::AnalysisBase;
    use fetra_model::cells::CellType;
    use fetra_model::constraints::{ConstraintBase, ConstraintSetType};
    use fetra_model::dofs::{DOFCoefs, DOFS};
    use fetra_model::elements::ElementSetBase;
    use fetra_model::materials::Material;
    use fetra_model::{ModelConfiguration, SolverName};

    fn pinned_beam_model() -> Model {
        let mut model = Model::new(
            "beam.bdf",
            "nastran",
            ModelConfiguration::for_target(SolverName::CodeAster),
        );
        for (id, x) in [(1, 0.0), (2, 1.0)] {
            model.mesh.add_node_global(Some(id), x, 0.0, 0.0).expect("node");
        }
        model
            .mesh
            .add_cell(Some(1), CellType::Seg2, vec![1, 2], None)
            .expect("cell");
        model.mesh.find_or_create_cell_group("PROP_7").add_cell_id(1);
        let material_id = model.get_or_create_material(100);
        let _ = model
            .find_material_by_original_mut(100)
            .map(|m: &mut Material| {
                m.add_nature(Nature::Elastic {
                    e: 210e9,
                    nu: 0.3,
                    g: None,
                    rho: 7800.0,
                    alpha: 0.0,
                    t_ref: 20.0,
                    ge: 0.0,
                })
            });
        let set_id = model.next_auto_id();
        let mut base = ElementSetBase::new(set_id, Some(7));
        base.cell_group = Some("PROP_7".to_string());
        base.material = Some(material_id);
        model.add_element_set(ElementSet::GenericSectionBeam {
            base,
            area: 1.0,
            iy: 1.0,
            iz: 1.0,
            torsional_constant: 1.0,
        });

        let spc_ref = ConstraintSetRef::new(ConstraintSetType::Spc, 10);
        let constraint_id = model.next_auto_id();
        let constraint = model.add_constraint(Constraint::Spc {
            base: ConstraintBase::new(constraint_id, Some(10)),
            nodes: vec![1, 2],
            dofs: DOFS::ALL_DOFS,
            values: DOFCoefs::default(),
            functions: Vec::new(),
        });
        model.add_constraint_into_constraint_set(constraint, spc_ref);

        let analysis_id = model.next_auto_id();
        let mut analysis_base = AnalysisBase::new(analysis_id, Some(1), "Analysis_1");
        analysis_base.add_constraint_set(spc_ref);
        model.add_analysis(Analysis::LinearMecaStat { base: analysis_base });
        model
    }

    #[test]
    fn comm_pins_all_six_dofs_in_ddl_impo() {
        let model = pinned_beam_model();
        let configuration = ConfigurationParameters::new("beam.bdf", SolverName::CodeAster);
        let aster = AsterModel::new(&model, &configuration);
        let mut writer = AsterWriter::new();
        let mut comm = String::new();
        writer.write_comm(&aster, &mut comm);

        assert!(comm.contains("DEBUT(PAR_LOT='NON')"));
        assert!(comm.contains("LIRE_MAILLAGE(FORMAT='ASTER'"));
        assert!(comm.contains("DDL_IMPO=("));
        for dof_name in ["DX=", "DY=", "DZ=", "DRX=", "DRY=", "DRZ="] {
            assert!(comm.contains(dof_name), "missing {dof_name}");
        }
        assert!(comm.contains("MECA_STATIQUE"));
        assert!(comm.contains("_F(CHARGE=BL"));
        assert!(comm.ends_with("FIN()\n"));
    }

    #[test]
    fn frequency_assertion_becomes_test_resu() {
        let mut model = pinned_beam_model();
        let assertion_id = model.next_auto_id();
        let assertion = model.add_assertion(Assertion::Frequency {
            id: assertion_id,
            number: 1,
            value: 150.0,
            tolerance: 0.02,
        });
        let analysis_id = model.analyses().ids()[0];
        model
            .analyses_mut()
            .find_mut(analysis_id)
            .expect("analysis")
            .base_mut()
            .add_assertion(assertion);

        let configuration = ConfigurationParameters::new("beam.bdf", SolverName::CodeAster);
        let aster = AsterModel::new(&model, &configuration);
        let mut writer = AsterWriter::new();
        let mut comm = String::new();
        writer.write_comm(&aster, &mut comm);
        assert!(comm.contains("TEST_RESU"));
        assert!(comm.contains("PARA='FREQ'"));
        assert!(comm.contains("NUME_ORDRE=1"));
        assert!(comm.contains("1.5e2"));
    }
}
