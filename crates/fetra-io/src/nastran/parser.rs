//! Nastran bulk-deck parser.
//!
//! Two phases: the free-form executive section accumulates a `KEY = VALUE`
//! context and turns `SUBCASE` blocks into analyses; the bulk section
//! dispatches each card keyword to a dedicated handler populating the model.
//! Malformed commands raise the skip sentinel consumed here, per the
//! translation mode.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use fetra_deck::{IncludeStack, ParseFailure, SymbolType, Tokenizer, resolve_include_path};

use super::geometry::VolumeKind;
use fetra_model::analysis::{
    Analysis, AnalysisBase, FrequencyBand, FrequencyValues, ModalDamping, NonLinearStrategy,
};
use fetra_model::constraints::{
    Constraint, ConstraintBase, ConstraintSetRef, ConstraintSetType, GapParticipation, Rbe3Slave,
};
use fetra_model::dofs::{DOF, DOFCoefs, DOFS};
use fetra_model::elements::{ElementSet, ElementSetBase, MatrixEntry};
use fetra_model::geometry::VectorialValue;
use fetra_model::identifiers::Id;
use fetra_model::loadings::{LoadSetRef, LoadSetType, LoadSet, Loading, LoadingBase};
use fetra_model::materials::{CellContainer, HardeningRule, Nature, YieldFunction};
use fetra_model::model::Model;
use fetra_model::values::{Interpolation, ParaName, Value};
use fetra_model::{ConfigurationParameters, Identified};

use crate::error::{IoError, Result};

type FieldResult<T> = std::result::Result<T, ParseFailure>;

/// Bulk keywords recognised but deliberately not translated.
const IGNORED_KEYWORDS: &[&str] = &[
    "ACCEL", "ACCEL1", "CBARAO", "CVISC", "DCONSTR", "DESVAR", "DOPTPRM", "DRESP1", "DVPREL1",
    "ECHOOFF", "ECHOON", "MDLPRM", "PLOTEL", "SUPORT", "SUPORT1", "TEMPD",
];

/// GRDSET defaults applied to blank GRID fields.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct GrdSet {
    pub cp: Id,
    pub cd: Id,
    pub ps: i32,
}

/// Parser state that lives across cards.
#[derive(Debug, Default)]
pub struct NastranParser {
    pub(crate) grdset: GrdSet,
    /// SPCADD combinations, applied once the whole bulk is read.
    spcadd_pending: Vec<(Id, Vec<Id>)>,
    /// PGAP initial openings by property id.
    gap_openings: HashMap<Id, f64>,
    /// CGAP node pairs by property id, in deck order.
    gap_pairs: Vec<(Id, Id, Id)>,
    /// Direct matrices declared by K2GG/M2GG/B2GG, by deck name.
    direct_matrices: HashMap<String, Id>,
    /// DMIG terms buffered until the end of the bulk section.
    dmig_buffer: Vec<(Id, Vec<MatrixEntry>)>,
    /// Optistruct dialect extension (CONTACT/SET/SURF, DESOPT default).
    pub(crate) optistruct: bool,
    mesh_only: bool,
}

impl NastranParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a model from a Nastran-family deck.
    pub fn parse(&mut self, configuration: &ConfigurationParameters) -> Result<Model> {
        let path = PathBuf::from(&configuration.input_file);
        if !path.exists() {
            return Err(IoError::FileNotFound(path.display().to_string()));
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("deck")
            .to_string();
        let mut model = Model::new(&name, "nastran", configuration.model_configuration());
        let mut tok = Tokenizer::from_file(&path, configuration.translation_mode)?;

        let mut context = BTreeMap::new();
        self.parse_executive_section(&mut tok, &mut model, &mut context)?;

        tok.bulk_section();
        let base_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let mut includes = IncludeStack::new();
        includes.push(&path).expect("first file cannot cycle");
        self.parse_bulk_section(&mut tok, &mut model, &base_dir, &mut includes)?;
        includes.pop();

        self.flush_direct_matrices(&mut model);
        self.apply_spcadd(&mut model);
        self.apply_gaps(&mut model);
        if self.mesh_only {
            model.only_mesh = true;
        }
        Ok(model)
    }

    // ------------------------------------------------------------------
    // Executive section
    // ------------------------------------------------------------------

    fn parse_executive_section(
        &mut self,
        tok: &mut Tokenizer,
        model: &mut Model,
        context: &mut BTreeMap<String, String>,
    ) -> Result<()> {
        let mut subcase_found = false;
        let mut pending_keyword: Option<String> = None;
        loop {
            let keyword = match pending_keyword.take() {
                Some(k) => k,
                None => {
                    if tok.next_symbol_type() == SymbolType::Eof {
                        break;
                    }
                    tok.next_keyword().map_err(IoError::from)?
                }
            };
            if keyword.starts_with("BEGIN") {
                if !subcase_found {
                    self.add_analysis(tok, model, context, None);
                }
                return Ok(());
            }
            match keyword.as_str() {
                "CEND" => {}
                "SUBCASE" => {
                    subcase_found = true;
                    pending_keyword = self.parse_subcase(tok, model, context)?;
                }
                "TITLE" => {
                    model.title = remaining_fields(tok);
                }
                "SUBTITLE" => {
                    model.description = remaining_fields(tok);
                }
                "K2GG" | "M2GG" | "B2GG" => {
                    let name = match tok.next_string() {
                        Ok(name) => name,
                        Err(failure) => {
                            self.recover(tok, model, failure)?;
                            continue;
                        }
                    };
                    let id = model.next_auto_id();
                    let base = ElementSetBase::new(id, None);
                    let matrix = match keyword.as_str() {
                        "K2GG" => ElementSet::StiffnessMatrix { base, entries: vec![] },
                        "M2GG" => ElementSet::MassMatrix { base, entries: vec![] },
                        _ => ElementSet::DampingMatrix { base, entries: vec![] },
                    };
                    let internal = model.add_element_set(matrix);
                    self.direct_matrices.insert(name, internal);
                }
                _ => {
                    context.insert(keyword, remaining_fields(tok));
                }
            }
        }
        Ok(())
    }

    /// Parse one SUBCASE block; returns the keyword that ended it.
    fn parse_subcase(
        &mut self,
        tok: &mut Tokenizer,
        model: &mut Model,
        base_context: &BTreeMap<String, String>,
    ) -> Result<Option<String>> {
        let subcase_id = tok.next_int_or(0).map_err(IoError::from)?;
        tok.skip_card();
        let mut context = base_context.clone();
        loop {
            if tok.next_symbol_type() == SymbolType::Eof {
                self.add_analysis(tok, model, &context, Some(subcase_id));
                return Ok(None);
            }
            let keyword = tok.next_keyword().map_err(IoError::from)?;
            if keyword == "SUBCASE" || keyword.starts_with("BEGIN") {
                self.add_analysis(tok, model, &context, Some(subcase_id));
                return Ok(Some(keyword));
            }
            context.insert(keyword, remaining_fields(tok));
        }
    }

    /// Create the analysis selected by the executive context.
    ///
    /// A failure here skips the analysis in tolerant modes.
    fn add_analysis(
        &mut self,
        tok: &mut Tokenizer,
        model: &mut Model,
        context: &BTreeMap<String, String>,
        original_id: Option<Id>,
    ) {
        if let Err(failure) = self.try_add_analysis(tok, model, context, original_id) {
            match failure {
                ParseFailure::Skip { mesh_only } => {
                    if mesh_only {
                        self.mesh_only = true;
                    }
                }
                ParseFailure::Fatal(err) => {
                    // Executive analysis selection is structural; in strict
                    // mode the whole translation stops later on validate().
                    log::error!("{err}");
                }
            }
        }
    }

    pub(crate) fn default_analysis(&self) -> &'static str {
        if self.optistruct { "200" } else { "101" }
    }

    fn try_add_analysis(
        &mut self,
        tok: &mut Tokenizer,
        model: &mut Model,
        context: &BTreeMap<String, String>,
        original_id: Option<Id>,
    ) -> FieldResult<()> {
        let mut sol = context
            .get("SOL")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| self.default_analysis().to_string());
        if sol == "200" || sol == "DESOPT" {
            sol = match context.get("ANALYSIS").map(|s| s.trim()) {
                Some("STATICS") | Some("") | None => "101".to_string(),
                Some("MODES") => "103".to_string(),
                Some("NLSTATIC") => "106".to_string(),
                Some("MFREQ") => "111".to_string(),
                Some("DFREQ") => "108".to_string(),
                Some(other) => {
                    return Err(
                        tok.handle_parsing_error(format!("ANALYSIS {other} not implemented"))
                    );
                }
            };
        }

        let id = model.next_auto_id();
        let label = context
            .get("LABEL")
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| format!("Analysis_{}", original_id.unwrap_or(id)));
        let mut base = AnalysisBase::new(id, original_id, &label);

        // Any context entry selecting a set attaches it, creating missing
        // sets with the referenced id.
        for (key, value) in context {
            let Ok(set_id) = value.trim().parse::<Id>() else {
                continue;
            };
            if set_id <= 0 {
                continue;
            }
            if key.starts_with("SPC") && !key.starts_with("SPCFORCES") {
                let reference = ConstraintSetRef::new(ConstraintSetType::Spc, set_id);
                model.get_or_create_constraint_set(reference);
                base.add_constraint_set(reference);
            } else if key.starts_with("MPC") && !key.starts_with("MPCFORCES") {
                let reference = ConstraintSetRef::new(ConstraintSetType::Mpc, set_id);
                model.get_or_create_constraint_set(reference);
                base.add_constraint_set(reference);
            } else if key.starts_with("LOAD") {
                let reference = LoadSetRef::new(LoadSetType::Load, set_id);
                model.get_or_create_load_set(reference);
                base.add_load_set(reference);
            } else if key.starts_with("DLOAD") {
                let reference = LoadSetRef::new(LoadSetType::Dload, set_id);
                model.get_or_create_load_set(reference);
                base.add_load_set(reference);
            }
        }

        let context_id = |needle: &str| -> Option<Id> {
            context
                .iter()
                .find(|(key, _)| key.starts_with(needle))
                .and_then(|(_, value)| value.trim().parse::<Id>().ok())
        };

        let analysis = match sol.as_str() {
            "101" | "SESTATIC" => Analysis::LinearMecaStat { base },
            "103" | "SEMODES" => {
                let band = context_id("METHOD").ok_or_else(|| {
                    tok.handle_parsing_error("METHOD not found for linear modal analysis")
                })?;
                Analysis::LinearModal {
                    base,
                    frequency_band: band,
                }
            }
            "106" | "NLSTATIC" => {
                let strategy = context_id("NLPARM").ok_or_else(|| {
                    tok.handle_parsing_error("NLPARM not found for nonlinear analysis")
                })?;
                // Subcases chain: loads ramp from the previous solution.
                let previous = model.analyses().iter().last().map(Identified::id);
                Analysis::NonLinearMecaStat {
                    base,
                    strategy,
                    previous,
                }
            }
            "111" | "SEMFREQ" => {
                let band = context_id("METHOD").ok_or_else(|| {
                    tok.handle_parsing_error("METHOD not found for modal frequency analysis")
                })?;
                let damping = context_id("SDAMPING").ok_or_else(|| {
                    tok.handle_parsing_error("SDAMPING not found for modal frequency analysis")
                })?;
                let frequencies = context_id("FREQ").ok_or_else(|| {
                    tok.handle_parsing_error("FREQ not found for modal frequency analysis")
                })?;
                let residual_vector = context
                    .get("RESVEC")
                    .map(|v| v.trim() == "YES")
                    .unwrap_or(false);
                Analysis::LinearDynaModalFreq {
                    base,
                    frequency_band: band,
                    modal_damping: damping,
                    excitation_frequencies: frequencies,
                    residual_vector,
                }
            }
            "108" | "SEDFREQ" => {
                let frequencies = context_id("FREQ").ok_or_else(|| {
                    tok.handle_parsing_error("FREQ not found for direct frequency analysis")
                })?;
                Analysis::LinearDynaDirectFreq {
                    base,
                    excitation_frequencies: frequencies,
                }
            }
            other => {
                return Err(tok.handle_parsing_error(format!("SOL {other} not implemented")));
            }
        };
        model.add_analysis(analysis);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bulk section
    // ------------------------------------------------------------------

    pub(crate) fn parse_bulk_section(
        &mut self,
        tok: &mut Tokenizer,
        model: &mut Model,
        base_dir: &Path,
        includes: &mut IncludeStack,
    ) -> Result<()> {
        loop {
            if tok.next_symbol_type() == SymbolType::Eof {
                return Ok(());
            }
            let keyword = tok.next_keyword().map_err(IoError::from)?;
            tok.set_current_keyword(&keyword);
            if keyword == "ENDDATA" {
                return Ok(());
            }
            if keyword.is_empty() {
                tok.skip_card();
                continue;
            }
            if keyword == "INCLUDE" {
                self.parse_include(tok, model, base_dir, includes)?;
                continue;
            }
            let outcome = self.dispatch(&keyword, tok, model);
            match outcome {
                Ok(true) => {
                    if !tok.is_empty_until_next_keyword() {
                        let failure = tok.handle_parsing_error(format!(
                            "unparsed fields left on {keyword} card"
                        ));
                        self.recover(tok, model, failure)?;
                    }
                    tok.skip_card();
                }
                Ok(false) => {
                    // Recognised but ignored.
                    tok.skip_card();
                }
                Err(failure) => {
                    self.recover(tok, model, failure)?;
                    tok.skip_card();
                }
            }
        }
    }

    /// Route a recoverable failure per the translation mode; fatal errors
    /// propagate.
    fn recover(
        &mut self,
        _tok: &mut Tokenizer,
        model: &mut Model,
        failure: ParseFailure,
    ) -> Result<()> {
        match failure {
            ParseFailure::Skip { mesh_only } => {
                if mesh_only {
                    self.mesh_only = true;
                    model.only_mesh = true;
                }
                Ok(())
            }
            ParseFailure::Fatal(err) => Err(IoError::Parse(err)),
        }
    }

    fn parse_include(
        &mut self,
        tok: &mut Tokenizer,
        model: &mut Model,
        base_dir: &Path,
        includes: &mut IncludeStack,
    ) -> Result<()> {
        let raw = tok.next_string().map_err(IoError::from)?;
        tok.skip_card();
        let resolved = resolve_include_path(base_dir, &raw);
        if let Err(cycle) = includes.push(&resolved) {
            return Err(IoError::Parse(fetra_deck::ParseError {
                file: tok.file_name().to_string(),
                line: tok.line_number(),
                keyword: "INCLUDE".to_string(),
                message: cycle,
            }));
        }
        let result = (|| -> Result<()> {
            if !resolved.exists() {
                let failure = tok
                    .handle_parsing_error(format!("missing include {}", resolved.display()));
                return self.recover(tok, model, failure);
            }
            let mut sub = Tokenizer::from_file(&resolved, tok.policy())?;
            sub.bulk_section();
            let sub_dir = resolved
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf();
            self.parse_bulk_section(&mut sub, model, &sub_dir, includes)
        })();
        includes.pop();
        result
    }

    /// Keyword dispatch. `Ok(true)` means the handler consumed the card and
    /// leftovers are suspicious; `Ok(false)` means the card was skipped on
    /// purpose.
    pub(crate) fn dispatch(
        &mut self,
        keyword: &str,
        tok: &mut Tokenizer,
        model: &mut Model,
    ) -> FieldResult<bool> {
        match keyword {
            "GRID" => self.parse_grid(tok, model)?,
            "GRDSET" => self.parse_grdset(tok)?,
            "CORD1R" => self.parse_cord1r(tok, model)?,
            "CORD2R" => self.parse_cord2r(tok, model, false)?,
            "CORD2C" => self.parse_cord2r(tok, model, true)?,
            "CBAR" | "CBEAM" => self.parse_cbar(tok, model)?,
            "CROD" => self.parse_crod(tok, model)?,
            "CTRIA3" | "CTRIAR" => self.parse_shell(tok, model, fetra_model::CellType::Tri3)?,
            "CTRIA6" => self.parse_shell(tok, model, fetra_model::CellType::Tri6)?,
            "CQUAD4" | "CQUADR" => self.parse_shell(tok, model, fetra_model::CellType::Quad4)?,
            "CQUAD8" => self.parse_shell(tok, model, fetra_model::CellType::Quad8)?,
            "CQUAD" => self.parse_cquad(tok, model)?,
            "CTETRA" => self.parse_volume(tok, model, VolumeKind::Tetra)?,
            "CPYRAM" => self.parse_volume(tok, model, VolumeKind::Pyra)?,
            "CPENTA" => self.parse_volume(tok, model, VolumeKind::Penta)?,
            "CHEXA" => self.parse_volume(tok, model, VolumeKind::Hexa)?,
            "CELAS2" => self.parse_celas2(tok, model)?,
            "CELAS4" => {
                tok.handle_parsing_warning("CELAS4 on scalar points is not translated");
                return Ok(false);
            }
            "CMASS2" => self.parse_cmass2(tok, model)?,
            "CONM2" => self.parse_conm2(tok, model)?,
            "CGAP" => self.parse_cgap(tok)?,
            "PGAP" => self.parse_pgap(tok)?,
            "PBAR" => self.parse_pbar(tok, model)?,
            "PBARL" | "PBEAML" => self.parse_pbarl(tok, model)?,
            "PBEAM" => self.parse_pbeam(tok, model)?,
            "PBUSH" => self.parse_pbush(tok, model)?,
            "PROD" => self.parse_prod(tok, model)?,
            "PSHELL" => self.parse_pshell(tok, model)?,
            "PSOLID" | "PLSOLID" => self.parse_psolid(tok, model)?,
            "MAT1" => self.parse_mat1(tok, model)?,
            "MATS1" => self.parse_mats1(tok, model)?,
            "FORCE" => self.parse_force(tok, model, false)?,
            "MOMENT" => self.parse_force(tok, model, true)?,
            "FORCE1" => self.parse_force1(tok, model)?,
            "GRAV" => self.parse_grav(tok, model)?,
            "RFORCE" => self.parse_rforce(tok, model)?,
            "LOAD" => self.parse_load(tok, model, LoadSetType::Load)?,
            "DLOAD" => self.parse_load(tok, model, LoadSetType::Dload)?,
            "DAREA" => self.parse_darea(tok, model)?,
            "RLOAD2" => self.parse_rload2(tok, model)?,
            "DPHASE" => self.parse_dphase(tok, model)?,
            "TABLED1" => self.parse_tabled1(tok, model)?,
            "TABDMP1" => self.parse_tabdmp1(tok, model)?,
            "PLOAD4" => self.parse_pload4(tok, model)?,
            "SPC" => self.parse_spc(tok, model)?,
            "SPC1" => self.parse_spc1(tok, model)?,
            "SPCD" => self.parse_spcd(tok, model)?,
            "SPCADD" => self.parse_spcadd(tok)?,
            "MPC" => self.parse_mpc(tok, model)?,
            "RBE2" => self.parse_rbe2(tok, model)?,
            "RBAR" | "RBAR1" => self.parse_rbar(tok, model, keyword == "RBAR1")?,
            "RBE3" => self.parse_rbe3(tok, model)?,
            "DMIG" => self.parse_dmig(tok)?,
            "EIGR" => self.parse_eigr(tok, model)?,
            "EIGRL" => self.parse_eigrl(tok, model)?,
            "FREQ1" => self.parse_freq1(tok, model)?,
            "NLPARM" => self.parse_nlparm(tok, model)?,
            "PARAM" => self.parse_param(tok, model)?,
            "CONTACT" if self.optistruct => self.parse_contact(tok, model)?,
            "SET" if self.optistruct => self.parse_set(tok, model)?,
            "SURF" if self.optistruct => self.parse_surf(tok, model)?,
            k if IGNORED_KEYWORDS.contains(&k) => {
                log::trace!("keyword {k} ignored");
                return Ok(false);
            }
            other => {
                return Err(tok.handle_parsing_error(format!("unknown keyword {other}")));
            }
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Loads
    // ------------------------------------------------------------------

    fn parse_force(
        &mut self,
        tok: &mut Tokenizer,
        model: &mut Model,
        is_moment: bool,
    ) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let node = tok.next_int()?;
        let cid = tok.next_int_or(0)?;
        let magnitude = tok.next_double()?;
        let n1 = tok.next_double_or(0.0)?;
        let n2 = tok.next_double_or(0.0)?;
        let n3 = tok.next_double_or(0.0)?;
        let vector = VectorialValue::new(magnitude * n1, magnitude * n2, magnitude * n3);
        let id = model.next_auto_id();
        let (force, moment) = if is_moment {
            (VectorialValue::zero(), vector)
        } else {
            (vector, VectorialValue::zero())
        };
        model.add_loading_into_loadset(
            Loading::NodalForce {
                base: LoadingBase::new(id, None),
                node,
                force,
                moment,
                cs: cid,
            },
            LoadSetRef::new(LoadSetType::Load, sid),
        );
        Ok(())
    }

    fn parse_force1(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let node = tok.next_int()?;
        let magnitude = tok.next_double()?;
        let node1 = tok.next_int()?;
        let node2 = tok.next_int()?;
        let id = model.next_auto_id();
        model.add_loading_into_loadset(
            Loading::NodalForceTwoNodes {
                base: LoadingBase::new(id, None),
                node,
                node1,
                node2,
                magnitude,
                is_moment: false,
            },
            LoadSetRef::new(LoadSetType::Load, sid),
        );
        Ok(())
    }

    fn parse_grav(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let cid = tok.next_int_or(0)?;
        if cid != 0 {
            tok.handle_parsing_warning("GRAV in a local frame is applied as global");
        }
        let acceleration = tok.next_double()?;
        let n1 = tok.next_double_or(0.0)?;
        let n2 = tok.next_double_or(0.0)?;
        let n3 = tok.next_double_or(0.0)?;
        let id = model.next_auto_id();
        model.add_loading_into_loadset(
            Loading::Gravity {
                base: LoadingBase::new(id, None),
                acceleration,
                direction: VectorialValue::new(n1, n2, n3),
            },
            LoadSetRef::new(LoadSetType::Load, sid),
        );
        Ok(())
    }

    fn parse_rforce(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let node = tok.next_int()?;
        let cid = tok.next_int_or(0)?;
        if cid != 0 {
            tok.handle_parsing_warning("RFORCE in a local frame is applied as global");
        }
        let speed = tok.next_double()?;
        let r1 = tok.next_double_or(0.0)?;
        let r2 = tok.next_double_or(0.0)?;
        let r3 = tok.next_double_or(0.0)?;
        let id = model.next_auto_id();
        model.add_loading_into_loadset(
            Loading::Rotation {
                base: LoadingBase::new(id, None),
                speed,
                center: node,
                axis: VectorialValue::new(r1, r2, r3),
            },
            LoadSetRef::new(LoadSetType::Load, sid),
        );
        Ok(())
    }

    fn parse_load(
        &mut self,
        tok: &mut Tokenizer,
        model: &mut Model,
        set_type: LoadSetType,
    ) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let id = model.next_auto_id();
        let mut load_set = LoadSet::new(id, Some(sid), set_type);
        let overall = tok.next_double_or(1.0)?;
        while tok.is_next_double() || tok.is_next_int() {
            let scale = tok.next_double_or(1.0)?;
            tok.skip_to_not_empty();
            let inner = tok.next_int()?;
            tok.skip_to_not_empty();
            load_set
                .embedded_loadsets
                .push((LoadSetRef::new(set_type, inner), overall * scale));
        }
        model.add_load_set(load_set);
        Ok(())
    }

    fn parse_darea(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        while tok.is_next_int() {
            let node = tok.next_int()?;
            let component = tok.next_int()?;
            let amplitude = tok.next_double()?;
            let mut force = VectorialValue::zero();
            let mut moment = VectorialValue::zero();
            for dof in DOFS::from_nastran_code(component).iter() {
                let mut f = [0.0; 3];
                f[dof.position() % 3] = amplitude;
                let v = VectorialValue::new(f[0], f[1], f[2]);
                if dof.is_rotation() {
                    moment = moment.add(&v);
                } else {
                    force = force.add(&v);
                }
            }
            let id = model.next_auto_id();
            model.add_loading_into_loadset(
                Loading::NodalForce {
                    base: LoadingBase::new(id, None),
                    node,
                    force,
                    moment,
                    cs: 0,
                },
                LoadSetRef::new(LoadSetType::ExciteId, sid),
            );
        }
        Ok(())
    }

    fn parse_rload2(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let excite_id = tok.next_int()?;
        let _delay = tok.next_int_or(0)?;
        let dphase = tok.next_int_or(0)?;
        let tb = tok.next_int()?;
        let _tp = tok.next_int_or(0)?;
        let id = model.next_auto_id();
        model.add_loading_into_loadset(
            Loading::DynamicExcitation {
                base: LoadingBase::new(id, None),
                dyna_phase: dphase,
                function_table: tb,
                load_set: LoadSetRef::new(LoadSetType::ExciteId, excite_id),
            },
            LoadSetRef::new(LoadSetType::Dload, sid),
        );
        Ok(())
    }

    fn parse_dphase(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let _node = tok.next_int_or(0)?;
        let _component = tok.next_int_or(0)?;
        let delay = tok.next_double_or(0.0)?;
        let id = model.next_auto_id();
        model.add_value(Value::DynaPhase {
            id,
            original_id: Some(sid),
            delay,
        });
        Ok(())
    }

    fn parse_tabled1(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let tid = tok.next_int()?;
        let interpolation = match tok.next_string_or("LINEAR").as_str() {
            "LOG" => Interpolation::Logarithmic,
            _ => Interpolation::Linear,
        };
        tok.skip_to_not_empty();
        let points = self.parse_table_pairs(tok)?;
        let id = model.next_auto_id();
        model.add_value(Value::FunctionTable {
            id,
            original_id: Some(tid),
            points,
            interpolation,
            left_prolongation: Interpolation::None,
            right_prolongation: Interpolation::None,
            para_x: ParaName::Frequency,
            para_y: ParaName::NoParaName,
        });
        Ok(())
    }

    fn parse_tabdmp1(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let tid = tok.next_int()?;
        let _damping_type = tok.next_string_or("G");
        tok.skip_to_not_empty();
        let points = self.parse_table_pairs(tok)?;
        let id = model.next_auto_id();
        let table = model.add_value(Value::FunctionTable {
            id,
            original_id: Some(tid),
            points,
            interpolation: Interpolation::Linear,
            left_prolongation: Interpolation::Constant,
            right_prolongation: Interpolation::Constant,
            para_x: ParaName::Frequency,
            para_y: ParaName::Amortissement,
        });
        let damping_id = model.next_auto_id();
        model.add_modal_damping(ModalDamping {
            id: damping_id,
            original_id: Some(tid),
            function_table: table,
        });
        Ok(())
    }

    fn parse_table_pairs(&mut self, tok: &mut Tokenizer) -> FieldResult<Vec<(f64, f64)>> {
        let mut points = Vec::new();
        loop {
            tok.skip_to_not_empty();
            if tok.is_next_double() {
                let x = tok.next_double()?;
                tok.skip_to_not_empty();
                let y = tok.next_double()?;
                points.push((x, y));
                continue;
            }
            if tok.is_next_empty() {
                break;
            }
            let marker = tok.next_string()?;
            match marker.as_str() {
                "ENDT" => break,
                "SKIP" => {
                    tok.skip_to_not_empty();
                    let _ = tok.next_string()?;
                }
                other => {
                    return Err(
                        tok.handle_parsing_error(format!("unexpected table marker {other}"))
                    );
                }
            }
        }
        Ok(points)
    }

    fn parse_pload4(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let eid = tok.next_int()?;
        let p1 = tok.next_double()?;
        let _p2 = tok.next_double_or(p1)?;
        let _p3 = tok.next_double_or(p1)?;
        let _p4 = tok.next_double_or(p1)?;
        let reference = LoadSetRef::new(LoadSetType::Load, sid);
        let id = model.next_auto_id();
        if tok.is_next_int() {
            let g1 = tok.next_int()?;
            let g34 = tok.next_int()?;
            model.add_loading_into_loadset(
                Loading::PressionFaceTwoNodes {
                    base: LoadingBase::new(id, None),
                    cell: eid,
                    node1: g1,
                    node2: g34,
                    pression: p1,
                },
                reference,
            );
        } else {
            // Pressure straight onto a shell cell.
            model.add_loading_into_loadset(
                Loading::NormalPressionFace {
                    base: LoadingBase::new(id, None),
                    cells: CellContainer::from_cells(vec![eid]),
                    pression: p1,
                },
                reference,
            );
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Constraints
    // ------------------------------------------------------------------

    fn parse_spc(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let reference = ConstraintSetRef::new(ConstraintSetType::Spc, sid);
        while tok.is_next_int() {
            let node = tok.next_int()?;
            let component = tok.next_int()?;
            let value = tok.next_double_or(0.0)?;
            let dofs = DOFS::from_nastran_code(component);
            let mut values = DOFCoefs::default();
            for dof in dofs.iter() {
                values.set(dof, value);
            }
            let id = model.next_auto_id();
            let constraint = model.add_constraint(Constraint::Spc {
                base: ConstraintBase::new(id, None),
                nodes: vec![node],
                dofs,
                values,
                functions: Vec::new(),
            });
            model.add_constraint_into_constraint_set(constraint, reference);
        }
        Ok(())
    }

    fn parse_spc1(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let component = tok.next_int()?;
        let dofs = DOFS::from_nastran_code(component);
        let mut nodes: Vec<Id> = Vec::new();
        loop {
            if tok.is_next_int() {
                nodes.push(tok.next_int()?);
                continue;
            }
            if tok.is_next_empty() {
                break;
            }
            let word = tok.next_string()?;
            if word == "THRU" {
                let last = *nodes.last().ok_or_else(|| {
                    tok.handle_parsing_error("THRU without a starting node id")
                })?;
                let end = tok.next_int()?;
                for node in (last + 1)..=end {
                    nodes.push(node);
                }
            } else {
                return Err(tok.handle_parsing_error(format!("unexpected SPC1 field {word}")));
            }
        }
        let id = model.next_auto_id();
        let constraint = model.add_constraint(Constraint::Spc {
            base: ConstraintBase::new(id, None),
            nodes,
            dofs,
            values: DOFCoefs::default(),
            functions: Vec::new(),
        });
        model.add_constraint_into_constraint_set(
            constraint,
            ConstraintSetRef::new(ConstraintSetType::Spc, sid),
        );
        Ok(())
    }

    fn parse_spcadd(&mut self, tok: &mut Tokenizer) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let mut parts = Vec::new();
        while tok.is_next_int() {
            parts.push(tok.next_int()?);
        }
        self.spcadd_pending.push((sid, parts));
        Ok(())
    }

    fn apply_spcadd(&mut self, model: &mut Model) {
        let pending = std::mem::take(&mut self.spcadd_pending);
        for (sid, parts) in pending {
            let target = ConstraintSetRef::new(ConstraintSetType::Spc, sid);
            model.get_or_create_constraint_set(target);
            for part in parts {
                let source = ConstraintSetRef::new(ConstraintSetType::Spc, part);
                let members: Vec<Id> = model
                    .get_constraints_by_constraint_set(source)
                    .iter()
                    .map(|c| c.id())
                    .collect();
                for member in members {
                    model.add_constraint_into_constraint_set(member, target);
                }
            }
        }
    }

    fn parse_spcd(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let mut entries = Vec::new();
        while tok.is_next_int() {
            let node = tok.next_int()?;
            let component = tok.next_int()?;
            let value = tok.next_double()?;
            entries.push((node, DOFS::from_nastran_code(component), value));
        }
        let reference = ConstraintSetRef::new(ConstraintSetType::Spcd, sid);
        model.get_or_create_constraint_set(reference);
        for (node, dofs, value) in &entries {
            let mut values = DOFCoefs::default();
            for dof in dofs.iter() {
                values.set(dof, *value);
            }
            let id = model.next_auto_id();
            let constraint = model.add_constraint(Constraint::Spc {
                base: ConstraintBase::new(id, None),
                nodes: vec![*node],
                dofs: *dofs,
                values,
                functions: Vec::new(),
            });
            model.add_constraint_into_constraint_set(constraint, reference);
        }

        // In static sequences the SPCD set id is selected by the LOAD
        // command; attach the set to those analyses.
        let selecting: Vec<Id> = model
            .analyses()
            .iter()
            .filter(|a| matches!(a, Analysis::LinearMecaStat { .. }))
            .filter(|a| !a.base().contains_constraint_set(reference))
            .filter(|a| {
                a.base()
                    .load_sets()
                    .iter()
                    .any(|ls| ls.set_type == LoadSetType::Load && ls.id == sid)
            })
            .map(Identified::id)
            .collect();
        for analysis_id in &selecting {
            if let Some(analysis) = model.analyses_mut().find_mut(*analysis_id) {
                analysis.base_mut().add_constraint_set(reference);
            }
        }

        // SPCD values override SPC values: narrow the overridden SPCs per
        // selecting analysis.
        for analysis_id in selecting {
            let analysis_sets: Vec<ConstraintSetRef> = {
                let Some(analysis) = model.analyses().find(analysis_id) else {
                    continue;
                };
                model.active_constraint_sets(analysis)
            };
            for (node, dofs, _) in &entries {
                let mut overridden: Vec<Id> = Vec::new();
                for set_ref in analysis_sets
                    .iter()
                    .filter(|r| r.set_type == ConstraintSetType::Spc)
                {
                    for constraint in model.get_constraints_by_constraint_set(*set_ref) {
                        if let Constraint::Spc { .. } = constraint {
                            if constraint.dofs_for_node(*node).contains_any_of(*dofs) {
                                overridden.push(constraint.id());
                            }
                        }
                    }
                }
                for spc in overridden {
                    if let Err(err) = model.remove_spc_node_dofs(analysis_id, spc, *node, *dofs) {
                        tok.handle_parsing_warning(format!("SPCD override failed: {err}"));
                    }
                }
            }
        }
        Ok(())
    }

    fn parse_mpc(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let mut terms: Vec<(Id, DOFCoefs)> = Vec::new();
        loop {
            tok.skip_to_not_empty();
            if !tok.is_next_int() {
                break;
            }
            let node = tok.next_int()?;
            let component = tok.next_int()?;
            let coefficient = tok.next_double()?;
            let mut coefs = DOFCoefs::default();
            for dof in DOFS::from_nastran_code(component).iter() {
                coefs.set(dof, coefficient);
            }
            match terms.iter_mut().find(|(n, _)| *n == node) {
                Some((_, existing)) => {
                    for dof in DOF::ALL {
                        if coefs.get(dof) != 0.0 {
                            existing.set(dof, coefs.get(dof));
                        }
                    }
                }
                None => terms.push((node, coefs)),
            }
        }
        let id = model.next_auto_id();
        let constraint = model.add_constraint(Constraint::Lmpc {
            base: ConstraintBase::new(id, None),
            imposed: 0.0,
            terms,
        });
        model.add_constraint_into_constraint_set(
            constraint,
            ConstraintSetRef::new(ConstraintSetType::Mpc, sid),
        );
        Ok(())
    }

    fn parse_rbe2(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let eid = tok.next_int()?;
        let master = tok.next_int()?;
        let component = tok.next_int()?;
        let dofs = DOFS::from_nastran_code(component);
        let mut slaves = Vec::new();
        while tok.is_next_int() {
            slaves.push(tok.next_int()?);
        }
        // A trailing real is the thermal expansion coefficient, ignored.
        if tok.is_next_double() {
            let alpha = tok.next_double()?;
            if alpha != 0.0 {
                tok.handle_parsing_warning("RBE2 thermal expansion is not translated");
            }
        }
        let id = model.next_auto_id();
        let constraint = if dofs == DOFS::ALL_DOFS {
            Constraint::Rigid {
                base: ConstraintBase::new(id, Some(eid)),
                master,
                slaves,
            }
        } else {
            Constraint::QuasiRigid {
                base: ConstraintBase::new(id, Some(eid)),
                dofs,
                master: Some(master),
                nodes: slaves,
            }
        };
        let constraint = model.add_constraint(constraint);
        model.add_common_constraint(constraint);
        Ok(())
    }

    fn parse_rbar(
        &mut self,
        tok: &mut Tokenizer,
        model: &mut Model,
        alternate: bool,
    ) -> FieldResult<()> {
        let eid = tok.next_int()?;
        let ga = tok.next_int()?;
        let gb = tok.next_int()?;
        let dofs = if alternate {
            // RBAR1: GA GB CB
            DOFS::from_nastran_code(tok.next_int_or(123456)?)
        } else {
            // RBAR: CNA then three ignored component fields
            let cna = tok.next_int_or(123456)?;
            let _cnb = tok.next_int_or(0)?;
            let _cma = tok.next_int_or(0)?;
            let _cmb = tok.next_int_or(0)?;
            DOFS::from_nastran_code(cna)
        };
        let id = model.next_auto_id();
        let constraint = model.add_constraint(Constraint::QuasiRigid {
            base: ConstraintBase::new(id, Some(eid)),
            dofs,
            master: Some(ga),
            nodes: vec![gb],
        });
        model.add_common_constraint(constraint);
        Ok(())
    }

    fn parse_rbe3(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let eid = tok.next_int()?;
        tok.skip_to_not_empty();
        let master = tok.next_int()?;
        let master_component = tok.next_int()?;
        let master_dofs = DOFS::from_nastran_code(master_component);
        let mut slaves = Vec::new();
        loop {
            tok.skip_to_not_empty();
            if !tok.is_next_double() {
                break;
            }
            let coefficient = tok.next_double()?;
            let component = tok.next_int()?;
            let dofs = DOFS::from_nastran_code(component);
            while tok.is_next_int() {
                slaves.push(Rbe3Slave {
                    node: tok.next_int()?,
                    dofs,
                    coefficient,
                });
            }
        }
        let id = model.next_auto_id();
        let constraint = model.add_constraint(Constraint::Rbe3 {
            base: ConstraintBase::new(id, Some(eid)),
            master,
            master_dofs,
            slaves,
        });
        model.add_common_constraint(constraint);
        Ok(())
    }

    fn parse_cgap(&mut self, tok: &mut Tokenizer) -> FieldResult<()> {
        let _eid = tok.next_int()?;
        let pid = tok.next_int()?;
        let ga = tok.next_int()?;
        let gb = tok.next_int()?;
        tok.skip_card();
        self.gap_pairs.push((pid, ga, gb));
        Ok(())
    }

    fn parse_pgap(&mut self, tok: &mut Tokenizer) -> FieldResult<()> {
        let pid = tok.next_int()?;
        let u0 = tok.next_double_or(0.0)?;
        tok.skip_card();
        self.gap_openings.insert(pid, u0);
        Ok(())
    }

    fn apply_gaps(&mut self, model: &mut Model) {
        let pairs = std::mem::take(&mut self.gap_pairs);
        let mut by_property: Vec<(Id, Vec<GapParticipation>)> = Vec::new();
        for (pid, ga, gb) in pairs {
            let participation = GapParticipation {
                node1: ga,
                node2: gb,
                direction: VectorialValue::zero(),
            };
            match by_property.iter_mut().find(|(p, _)| *p == pid) {
                Some((_, list)) => list.push(participation),
                None => by_property.push((pid, vec![participation])),
            }
        }
        for (pid, participations) in by_property {
            let initial_opening = self.gap_openings.get(&pid).copied().unwrap_or(0.0);
            let id = model.next_auto_id();
            let constraint = model.add_constraint(Constraint::Gap {
                base: ConstraintBase::new(id, Some(pid)),
                initial_opening,
                participations,
            });
            model.add_common_constraint(constraint);
        }
    }

    // ------------------------------------------------------------------
    // Materials and properties
    // ------------------------------------------------------------------

    fn parse_mat1(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let mid = tok.next_int()?;
        let e = tok.next_double_or(0.0)?;
        let has_g = tok.is_next_double();
        let g = tok.next_double_or(0.0)?;
        let has_nu = tok.is_next_double();
        let mut nu = tok.next_double_or(0.0)?;
        let rho = tok.next_double_or(0.0)?;
        let alpha = tok.next_double_or(0.0)?;
        let t_ref = tok.next_double_or(0.0)?;
        let ge = tok.next_double_or(0.0)?;
        if !has_nu && has_g && g != 0.0 {
            nu = e / (2.0 * g) - 1.0;
        }
        model.get_or_create_material(mid);
        let material = model
            .find_material_by_original_mut(mid)
            .expect("just created");
        material.add_nature(Nature::Elastic {
            e,
            nu,
            g: if has_g { Some(g) } else { None },
            rho,
            alpha,
            t_ref,
            ge,
        });
        Ok(())
    }

    fn parse_mats1(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let mid = tok.next_int()?;
        let tid = tok.next_int_or(0)?;
        let behaviour = tok.next_string()?;
        let h = tok.next_double_or(0.0)?;
        let yf = tok.next_int_or(1)?;
        let hr = tok.next_int_or(1)?;
        let limit1 = tok.next_double_or(0.0)?;
        model.get_or_create_material(mid);
        let nature = match behaviour.as_str() {
            "NLELAST" => {
                if tid == 0 {
                    return Err(tok.handle_parsing_error("MATS1 NLELAST requires a table"));
                }
                Nature::NonLinearElastic { table: tid }
            }
            "PLASTIC" => Nature::BilinearElastic {
                elastic_limit: limit1,
                secondary_slope: h,
                hardening: match hr {
                    2 => HardeningRule::Kinematic,
                    3 => HardeningRule::Combined,
                    _ => HardeningRule::Isotropic,
                },
                yield_function: match yf {
                    2 => YieldFunction::Tresca,
                    _ => YieldFunction::VonMises,
                },
            },
            other => {
                return Err(
                    tok.handle_parsing_error(format!("MATS1 behaviour {other} not implemented"))
                );
            }
        };
        let material = model
            .find_material_by_original_mut(mid)
            .expect("just created");
        material.add_nature(nature);
        Ok(())
    }

    /// Property cards share this tail: bind material and cell group, record
    /// the material assignment.
    fn register_property(
        &mut self,
        model: &mut Model,
        pid: Id,
        mid: Option<Id>,
        element_set: ElementSet,
    ) {
        let group_name = property_group_name(pid);
        model.mesh.find_or_create_cell_group(&group_name);
        let mut element_set = element_set;
        element_set.base_mut().cell_group = Some(group_name.clone());
        if let Some(mid) = mid {
            let material = model.get_or_create_material(mid);
            element_set.base_mut().material = Some(material);
            model.assign_material(material, CellContainer::from_group(&group_name));
        }
        model.add_element_set(element_set);
    }

    fn parse_pbar(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let pid = tok.next_int()?;
        let mid = tok.next_int()?;
        let area = tok.next_double_or(0.0)?;
        let i1 = tok.next_double_or(0.0)?;
        let i2 = tok.next_double_or(0.0)?;
        let j = tok.next_double_or(0.0)?;
        let nsm = tok.next_double_or(0.0)?;
        if nsm != 0.0 {
            tok.handle_parsing_warning("PBAR non-structural mass is not translated");
        }
        tok.skip_card();
        let id = model.next_auto_id();
        self.register_property(
            model,
            pid,
            Some(mid),
            ElementSet::GenericSectionBeam {
                base: ElementSetBase::new(id, Some(pid)),
                area,
                iy: i1,
                iz: i2,
                torsional_constant: j,
            },
        );
        Ok(())
    }

    fn parse_pbarl(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let pid = tok.next_int()?;
        let mid = tok.next_int()?;
        let _group = tok.next_string_or("MSCBML0");
        let section = tok.next_string()?;
        tok.skip_to_not_empty();
        let id = model.next_auto_id();
        let element_set = match section.as_str() {
            "ROD" => {
                let radius = tok.next_double()?;
                ElementSet::CircularSectionBeam {
                    base: ElementSetBase::new(id, Some(pid)),
                    radius,
                }
            }
            "BAR" => {
                let width = tok.next_double()?;
                let height = tok.next_double()?;
                ElementSet::RectangularSectionBeam {
                    base: ElementSetBase::new(id, Some(pid)),
                    width,
                    height,
                }
            }
            "I" => {
                let height = tok.next_double()?;
                let flange_width = tok.next_double()?;
                let _flange_width2 = tok.next_double_or(0.0)?;
                let web_thickness = tok.next_double()?;
                let flange_thickness = tok.next_double()?;
                ElementSet::ISectionBeam {
                    base: ElementSetBase::new(id, Some(pid)),
                    height,
                    flange_width,
                    flange_thickness,
                    web_thickness,
                }
            }
            other => {
                return Err(
                    tok.handle_parsing_error(format!("beam section {other} not implemented"))
                );
            }
        };
        tok.skip_card();
        self.register_property(model, pid, Some(mid), element_set);
        Ok(())
    }

    fn parse_pbeam(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let pid = tok.next_int()?;
        let mid = tok.next_int()?;
        let area = tok.next_double_or(0.0)?;
        let i1 = tok.next_double_or(0.0)?;
        let i2 = tok.next_double_or(0.0)?;
        let _i12 = tok.next_double_or(0.0)?;
        let j = tok.next_double_or(0.0)?;
        tok.skip_card();
        let id = model.next_auto_id();
        self.register_property(
            model,
            pid,
            Some(mid),
            ElementSet::GenericSectionBeam {
                base: ElementSetBase::new(id, Some(pid)),
                area,
                iy: i1,
                iz: i2,
                torsional_constant: j,
            },
        );
        Ok(())
    }

    fn parse_pbush(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let pid = tok.next_int()?;
        let mut stiffness = DOFCoefs::default();
        let mut damping = DOFCoefs::default();
        while !tok.is_empty_until_next_keyword() {
            tok.skip_to_not_empty();
            let flag = tok.next_string()?;
            match flag.as_str() {
                "K" => {
                    for dof in DOF::ALL {
                        stiffness.set(dof, tok.next_double_or(0.0)?);
                    }
                }
                "B" => {
                    for dof in DOF::ALL {
                        damping.set(dof, tok.next_double_or(0.0)?);
                    }
                }
                "GE" | "RCV" => {
                    tok.handle_parsing_warning(format!("PBUSH {flag} row is not translated"));
                    tok.skip_card();
                }
                other => {
                    return Err(tok.handle_parsing_error(format!("unexpected PBUSH row {other}")));
                }
            }
        }
        let id = model.next_auto_id();
        self.register_property(
            model,
            pid,
            None,
            ElementSet::StructuralSegment {
                base: ElementSetBase::new(id, Some(pid)),
                stiffness,
                damping,
            },
        );
        Ok(())
    }

    fn parse_prod(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let pid = tok.next_int()?;
        let mid = tok.next_int()?;
        let area = tok.next_double_or(0.0)?;
        let j = tok.next_double_or(0.0)?;
        tok.skip_card();
        let id = model.next_auto_id();
        self.register_property(
            model,
            pid,
            Some(mid),
            ElementSet::GenericSectionBeam {
                base: ElementSetBase::new(id, Some(pid)),
                area,
                iy: 0.0,
                iz: 0.0,
                torsional_constant: j,
            },
        );
        Ok(())
    }

    fn parse_pshell(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let pid = tok.next_int()?;
        let mid = tok.next_int()?;
        let thickness = tok.next_double_or(0.0)?;
        let mid2 = tok.next_int_or(mid)?;
        let _bending_ratio = tok.next_double_or(1.0)?;
        let mid3 = tok.next_int_or(0)?;
        let _shear_ratio = tok.next_double_or(0.833333)?;
        let nsm = tok.next_double_or(0.0)?;
        if mid2 != mid || (mid3 != 0 && mid3 != mid) {
            tok.handle_parsing_warning("PSHELL with distinct bending/shear materials");
        }
        tok.skip_card();
        let id = model.next_auto_id();
        self.register_property(
            model,
            pid,
            Some(mid),
            ElementSet::Shell {
                base: ElementSetBase::new(id, Some(pid)),
                thickness,
                nonstructural_mass: nsm,
            },
        );
        Ok(())
    }

    fn parse_psolid(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let pid = tok.next_int()?;
        let mid = tok.next_int()?;
        tok.skip_card();
        let id = model.next_auto_id();
        self.register_property(
            model,
            pid,
            Some(mid),
            ElementSet::Continuum {
                base: ElementSetBase::new(id, Some(pid)),
            },
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Scalar elements and direct matrices
    // ------------------------------------------------------------------

    fn parse_celas2(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let eid = tok.next_int()?;
        let k = tok.next_double()?;
        let g1 = tok.next_int()?;
        let c1 = tok.next_int()?;
        let g2 = tok.next_int()?;
        let c2 = tok.next_int()?;
        let dof1 = scalar_dof(tok, c1)?;
        let dof2 = scalar_dof(tok, c2)?;
        let id = model.next_auto_id();
        model.add_element_set(ElementSet::StiffnessMatrix {
            base: ElementSetBase::new(id, Some(eid)),
            entries: vec![MatrixEntry {
                node1: g1,
                dof1,
                node2: g2,
                dof2,
                value: k,
            }],
        });
        Ok(())
    }

    fn parse_cmass2(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let eid = tok.next_int()?;
        let mass = tok.next_double()?;
        let g1 = tok.next_int()?;
        let c1 = tok.next_int()?;
        let g2 = tok.next_int_or(g1)?;
        let c2 = tok.next_int_or(c1)?;
        let dof1 = scalar_dof(tok, c1)?;
        let dof2 = scalar_dof(tok, c2)?;
        let id = model.next_auto_id();
        model.add_element_set(ElementSet::MassMatrix {
            base: ElementSetBase::new(id, Some(eid)),
            entries: vec![MatrixEntry {
                node1: g1,
                dof1,
                node2: g2,
                dof2,
                value: mass,
            }],
        });
        Ok(())
    }

    fn parse_conm2(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let eid = tok.next_int()?;
        let node = tok.next_int()?;
        let cid = tok.next_int_or(0)?;
        let mass = tok.next_double()?;
        let x1 = tok.next_double_or(0.0)?;
        let x2 = tok.next_double_or(0.0)?;
        let x3 = tok.next_double_or(0.0)?;
        if cid != 0 || x1 != 0.0 || x2 != 0.0 || x3 != 0.0 {
            tok.handle_parsing_warning("CONM2 offset is not translated");
        }
        tok.skip_to_not_empty();
        let i11 = tok.next_double_or(0.0)?;
        let _i21 = tok.next_double_or(0.0)?;
        let i22 = tok.next_double_or(0.0)?;
        let _i31 = tok.next_double_or(0.0)?;
        let _i32 = tok.next_double_or(0.0)?;
        let i33 = tok.next_double_or(0.0)?;
        tok.skip_card();

        let group_name = format!("CONM2_{eid}");
        let position = self
            .add_point_cell(model, node)
            .map_err(|e| tok.handle_parsing_error(e))?;
        let cell_id = model.mesh.cells()[position].id;
        model
            .mesh
            .find_or_create_cell_group(&group_name)
            .add_cell_id(cell_id);
        let id = model.next_auto_id();
        let mut base = ElementSetBase::new(id, Some(eid));
        base.cell_group = Some(group_name);
        model.add_element_set(ElementSet::NodalMass {
            base,
            mass,
            ixx: i11,
            iyy: i22,
            izz: i33,
        });
        Ok(())
    }

    fn add_point_cell(
        &mut self,
        model: &mut Model,
        node: Id,
    ) -> std::result::Result<usize, String> {
        model
            .mesh
            .add_cell(None, fetra_model::CellType::Point1, vec![node], None)
            .map_err(|e| e.to_string())
    }

    fn parse_dmig(&mut self, tok: &mut Tokenizer) -> FieldResult<()> {
        let name = tok.next_string()?;
        let header_flag = tok.next_int_or(-1)?;
        if header_flag == 0 {
            // Header card: form, type and size fields are not needed.
            tok.skip_card();
            return Ok(());
        }
        let Some(&matrix_id) = self.direct_matrices.get(&name) else {
            tok.handle_parsing_warning(format!(
                "DMIG {name} is not selected by K2GG/M2GG/B2GG"
            ));
            tok.skip_card();
            return Ok(());
        };
        let gj = header_flag;
        let cj = tok.next_int()?;
        let dof_j = scalar_dof(tok, cj)?;
        let mut entries = Vec::new();
        loop {
            tok.skip_to_not_empty();
            if !tok.is_next_int() {
                break;
            }
            let g1 = tok.next_int()?;
            let c1 = tok.next_int()?;
            let value = tok.next_double()?;
            entries.push(MatrixEntry {
                node1: gj,
                dof1: dof_j,
                node2: g1,
                dof2: scalar_dof(tok, c1)?,
                value,
            });
        }
        self.pending_matrix_entries(matrix_id, entries);
        Ok(())
    }

    fn pending_matrix_entries(&mut self, matrix_id: Id, new_entries: Vec<MatrixEntry>) {
        // Stored immediately; the model keeps matrices by internal id.
        self.dmig_buffer.push((matrix_id, new_entries));
    }

    // ------------------------------------------------------------------
    // Analysis auxiliaries
    // ------------------------------------------------------------------

    fn parse_eigr(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let method = tok.next_string_or("LAN");
        if method != "LAN" && method != "AHOU" && method != "MGIV" {
            tok.handle_parsing_warning(format!("EIGR method {method} treated as LAN"));
        }
        let f1 = tok.next_double_or(0.0)?;
        let has_f2 = tok.is_next_double();
        let f2 = tok.next_double_or(0.0)?;
        let _ne = tok.next_int_or(0)?;
        let nd = tok.next_int_or(0)?;
        tok.skip_card();
        let id = model.next_auto_id();
        model.add_frequency_band(FrequencyBand {
            id,
            original_id: Some(sid),
            lower: if f1 > 0.0 { Some(f1) } else { None },
            upper: if has_f2 { Some(f2) } else { None },
            num_max: if nd > 0 { Some(nd) } else { None },
            norm: "MASS".to_string(),
        });
        Ok(())
    }

    fn parse_eigrl(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let has_v1 = tok.is_next_double();
        let v1 = tok.next_double_or(0.0)?;
        let has_v2 = tok.is_next_double();
        let v2 = tok.next_double_or(0.0)?;
        let nd = tok.next_int_or(0)?;
        let _msglvl = tok.next_int_or(0)?;
        let _maxset = tok.next_int_or(0)?;
        let _shfscl = tok.next_double_or(0.0)?;
        let norm = tok.next_string_or("MASS");
        tok.skip_card();
        let id = model.next_auto_id();
        model.add_frequency_band(FrequencyBand {
            id,
            original_id: Some(sid),
            lower: if has_v1 { Some(v1) } else { None },
            upper: if has_v2 { Some(v2) } else { None },
            num_max: if nd > 0 { Some(nd) } else { None },
            norm,
        });
        Ok(())
    }

    fn parse_freq1(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let f1 = tok.next_double()?;
        let df = tok.next_double()?;
        let ndf = tok.next_int_or(1)?;
        let id = model.next_auto_id();
        model.add_frequency_values(FrequencyValues::from_step(
            id,
            Some(sid),
            f1,
            df,
            ndf as usize + 1,
        ));
        Ok(())
    }

    fn parse_nlparm(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let ninc = tok.next_int_or(10)?;
        let _dt = tok.next_double_or(0.0)?;
        let _kmethod = tok.next_string_or("AUTO");
        let _kstep = tok.next_int_or(5)?;
        let maxiter = tok.next_int_or(25)?;
        tok.skip_card();
        let id = model.next_auto_id();
        model.add_strategy(NonLinearStrategy {
            id,
            original_id: Some(sid),
            number_of_increments: ninc,
            max_iterations: maxiter,
        });
        Ok(())
    }

    fn parse_param(&mut self, tok: &mut Tokenizer, _model: &mut Model) -> FieldResult<()> {
        let name = tok.next_string()?.to_ascii_uppercase();
        match name.as_str() {
            // Understood and deliberately without effect on the model.
            "AUTOSPC" | "COUPMASS" | "GRDPNT" | "K6ROT" | "NOCOMPS" | "PATVER" | "POST"
            | "PRGPST" | "PRTMAXIM" => {
                log::trace!("PARAM {name} ignored");
                tok.skip_card();
            }
            "WTMASS" => {
                let factor = tok.next_double_or(1.0)?;
                if factor != 1.0 {
                    tok.handle_parsing_warning(format!(
                        "PARAM WTMASS {factor} is not applied to masses"
                    ));
                }
            }
            "LGDISP" => {
                let flag = tok.next_int_or(-1)?;
                if flag == 1 {
                    log::debug!("PARAM LGDISP 1: large displacements requested");
                }
            }
            other => {
                tok.handle_parsing_warning(format!("PARAM {other} ignored"));
                tok.skip_card();
            }
        }
        Ok(())
    }
}

/// Buffered DMIG entries, flushed at end of bulk.
impl NastranParser {
    pub(crate) fn flush_direct_matrices(&mut self, model: &mut Model) {
        let buffered = std::mem::take(&mut self.dmig_buffer);
        for (matrix_id, new_entries) in buffered {
            if let Some(set) = model.element_sets_mut().find_mut(matrix_id) {
                match set {
                    ElementSet::StiffnessMatrix { entries, .. }
                    | ElementSet::MassMatrix { entries, .. }
                    | ElementSet::DampingMatrix { entries, .. } => {
                        entries.extend(new_entries);
                    }
                    _ => {}
                }
            }
        }
    }
}

/// The cell group every cell with this property id lands in.
pub(crate) fn property_group_name(pid: Id) -> String {
    format!("PROP_{pid}")
}

/// Scalar connection component: 0 is accepted as DX for grounded springs.
fn scalar_dof(tok: &Tokenizer, component: i32) -> FieldResult<DOF> {
    match component {
        0 => Ok(DOF::DX),
        1..=6 => Ok(DOF::ALL[(component - 1) as usize]),
        other => Err(tok.handle_parsing_error(format!("invalid component {other}"))),
    }
}

fn remaining_fields(tok: &mut Tokenizer) -> String {
    let mut parts = Vec::new();
    while tok.remaining_fields() > 0 {
        let field = tok.next_string_or("");
        if !field.is_empty() {
            parts.push(field);
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetra_model::SolverName;
    use fetra_model::loadings::Loading;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn write_deck(contents: &str) -> PathBuf {
        let pid = std::process::id();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be valid")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("fetra_nastran_{pid}_{nanos}"));
        fs::create_dir_all(&dir).expect("create temp directory");
        let path = dir.join("deck.bdf");
        fs::write(&path, contents).expect("write deck");
        path
    }

    fn parse_deck(contents: &str) -> Model {
        let path = write_deck(contents);
        let configuration = ConfigurationParameters::new(
            path.to_str().expect("utf8 path"),
            SolverName::CodeAster,
        );
        let mut parser = NastranParser::new();
        parser.parse(&configuration).expect("parse succeeds")
    }

    #[test]
    fn spc1_chain_round_trip() {
        let model = parse_deck(
            "\
SOL 101
CEND
SPC = 10
BEGIN BULK
GRID,1,,0.0,0.0,0.0
GRID,2,,1.0,0.0,0.0
GRID,3,,2.0,0.0,0.0
GRID,4,,3.0,0.0,0.0
GRID,5,,4.0,0.0,0.0
CROD,1,7,1,2
CROD,2,7,2,3
CROD,3,7,3,4
CROD,4,7,4,5
PROD,7,100,1.0
MAT1,100,210000.0,,0.3
SPC1,10,123456,1,5
ENDDATA
",
        );
        assert_eq!(model.mesh.count_nodes(), 5);
        assert_eq!(model.mesh.count_cells(), 4);
        let reference = ConstraintSetRef::new(ConstraintSetType::Spc, 10);
        let constraints = model.get_constraints_by_constraint_set(reference);
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].dofs_for_node(1), DOFS::ALL_DOFS);
        assert_eq!(constraints[0].dofs_for_node(5), DOFS::ALL_DOFS);
        assert_eq!(constraints[0].dofs_for_node(3), DOFS::NONE);
        let analysis = model.analyses().iter().next().expect("one analysis");
        assert!(analysis.base().contains_constraint_set(reference));
    }

    #[test]
    fn combined_load_records_embedded_sets() {
        let model = parse_deck(
            "\
SOL 101
CEND
LOAD = 10
BEGIN BULK
GRID,1,,0.0,0.0,0.0
GRID,2,,1.0,0.0,0.0
FORCE,1,1,,2.0,1.0,0.0,0.0
FORCE,3,2,,3.0,0.0,1.0,0.0
LOAD,10,1.0,5.0,1,7.0,3
ENDDATA
",
        );
        let combined = model
            .find_load_set(LoadSetRef::new(LoadSetType::Load, 10))
            .expect("combined set");
        assert_eq!(
            combined.embedded_loadsets,
            vec![
                (LoadSetRef::new(LoadSetType::Load, 1), 5.0),
                (LoadSetRef::new(LoadSetType::Load, 3), 7.0),
            ]
        );
        let inner = model.get_loadings_by_loadset(LoadSetRef::new(LoadSetType::Load, 1));
        assert_eq!(inner.len(), 1);
        match inner[0] {
            Loading::NodalForce { force, .. } => {
                assert!(force.iseq(&fetra_model::VectorialValue::new(2.0, 0.0, 0.0)));
            }
            other => panic!("unexpected loading {other:?}"),
        }
    }

    #[test]
    fn spcd_overrides_spc_for_selecting_analysis() {
        let model = parse_deck(
            "\
SOL 101
CEND
SUBCASE 1
  SPC = 5
  LOAD = 7
BEGIN BULK
GRID,1,,0.0,0.0,0.0
GRID,2,,1.0,0.0,0.0
SPC,5,1,1,0.0
SPCD,7,1,1,0.01
ENDDATA
",
        );
        let analysis = model.analyses().iter().next().expect("subcase analysis");
        let spcd_ref = ConstraintSetRef::new(ConstraintSetType::Spcd, 7);
        assert!(analysis.base().contains_constraint_set(spcd_ref));
        // The SPCD set carries the imposed displacement.
        let imposed = model.get_constraints_by_constraint_set(spcd_ref);
        assert_eq!(imposed.len(), 1);
        match imposed[0] {
            Constraint::Spc { values, dofs, .. } => {
                assert_eq!(*dofs, DOFS::from(DOF::DX));
                assert_eq!(values.get(DOF::DX), 0.01);
            }
            other => panic!("unexpected constraint {other:?}"),
        }
        // The analysis no longer selects the original SPC set directly; its
        // clone has DX removed for node 1, leaving nothing.
        let original_ref = ConstraintSetRef::new(ConstraintSetType::Spc, 5);
        assert!(!analysis.base().contains_constraint_set(original_ref));
        let clone_ref = analysis
            .base()
            .constraint_sets()
            .iter()
            .copied()
            .find(|r| r.set_type == ConstraintSetType::Spc)
            .expect("cloned SPC set");
        assert!(model.get_constraints_by_constraint_set(clone_ref).is_empty());
        // Other analyses would still see the original SPC untouched.
        let original = model.get_constraints_by_constraint_set(original_ref);
        assert_eq!(original.len(), 1);
        assert_eq!(original[0].dofs_for_node(1), DOFS::from(DOF::DX));
    }

    #[test]
    fn modal_subcase_binds_frequency_band() {
        let model = parse_deck(
            "\
SOL 103
CEND
METHOD = 20
BEGIN BULK
GRID,1,,0.0,0.0,0.0
EIGRL,20,,,10
ENDDATA
",
        );
        let analysis = model.analyses().iter().next().expect("modal analysis");
        match analysis {
            Analysis::LinearModal { frequency_band, .. } => {
                let band = model
                    .find_frequency_band_by_original(*frequency_band)
                    .expect("band resolves");
                assert_eq!(band.num_max, Some(10));
            }
            other => panic!("unexpected analysis {other:?}"),
        }
    }

    #[test]
    fn includes_are_expanded_and_cycles_fail() {
        let pid = std::process::id();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be valid")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("fetra_include_{pid}_{nanos}"));
        fs::create_dir_all(&dir).expect("temp dir");
        let root = dir.join("root.bdf");
        let mesh = dir.join("mesh.bdf");
        fs::write(
            &root,
            "SOL 101\nCEND\nBEGIN BULK\nINCLUDE 'mesh.bdf'\nENDDATA\n",
        )
        .expect("write root");
        fs::write(&mesh, "GRID,1,,0.0,0.0,0.0\nGRID,2,,1.0,0.0,0.0\n").expect("write include");

        let configuration = ConfigurationParameters::new(
            root.to_str().expect("utf8"),
            SolverName::CodeAster,
        );
        let model = NastranParser::new()
            .parse(&configuration)
            .expect("include parses");
        assert_eq!(model.mesh.count_nodes(), 2);

        fs::write(&root, "SOL 101\nCEND\nBEGIN BULK\nINCLUDE 'loop.bdf'\n").expect("rewrite");
        fs::write(dir.join("loop.bdf"), "INCLUDE 'root.bdf'\n").expect("write loop");
        let err = NastranParser::new()
            .parse(&configuration)
            .expect_err("cycle must fail");
        assert!(err.to_string().contains("include cycle"), "got: {err}");
    }

    #[test]
    fn grid_permanent_spc_lands_in_common_set() {
        let model = parse_deck(
            "\
SOL 101
CEND
BEGIN BULK
GRID,1,,0.0,0.0,0.0,,456
ENDDATA
",
        );
        let common = model.common_constraint_set();
        let constraints = model.get_constraints_by_constraint_set(common);
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].dofs_for_node(1), DOFS::ROTATIONS);
    }
}
