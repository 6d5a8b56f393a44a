//! Optistruct dialect: the Nastran grammar plus contact cards.
//!
//! Optistruct decks default to the optimisation solution sequence (SOL 200
//! semantics, `ANALYSIS=` selects the physics) and add CONTACT/SET/SURF.

use fetra_deck::{ParseFailure, Tokenizer};
use fetra_model::constraints::{BoundarySurface, Constraint, ConstraintBase, SurfaceFace};
use fetra_model::model::Model;
use fetra_model::{ConfigurationParameters, FrequencyValues};

use crate::error::Result;
use crate::nastran::parser::NastranParser;

type FieldResult<T> = std::result::Result<T, ParseFailure>;

/// Parser for the Optistruct dialect.
#[derive(Debug, Default)]
pub struct OptistructParser {
    inner: NastranParser,
}

impl OptistructParser {
    pub fn new() -> Self {
        let mut inner = NastranParser::new();
        inner.optistruct = true;
        OptistructParser { inner }
    }

    pub fn parse(&mut self, configuration: &ConfigurationParameters) -> Result<Model> {
        self.inner.parse(configuration)
    }
}

impl NastranParser {
    /// CONTACT: sliding interface between a slave and a master surface.
    pub(crate) fn parse_contact(
        &mut self,
        tok: &mut Tokenizer,
        model: &mut Model,
    ) -> FieldResult<()> {
        let ctid = tok.next_int()?;
        let contact_type = tok.next_string_or("SLIDE");
        if contact_type != "SLIDE" && contact_type != "STICK" {
            tok.handle_parsing_warning(format!(
                "CONTACT type {contact_type} treated as SLIDE"
            ));
        }
        let ssid = tok.next_int()?;
        let msid = tok.next_int()?;
        tok.skip_card();
        let id = model.next_auto_id();
        let constraint = model.add_constraint(Constraint::SurfaceSlide {
            base: ConstraintBase::new(id, Some(ctid)),
            master_surface: msid,
            slave_surface: ssid,
        });
        model.add_common_constraint(constraint);
        Ok(())
    }

    /// SET: named node/element lists, or an explicit frequency list.
    pub(crate) fn parse_set(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        let set_type = tok.next_string()?;
        let subtype = tok.next_string_or("LIST");
        if subtype != "LIST" {
            return Err(
                tok.handle_parsing_error(format!("unsupported SET subtype {subtype}"))
            );
        }
        tok.skip_to_not_empty();
        let name = format!("SET_{sid}");
        match set_type.as_str() {
            "GRID" => {
                let group = model.mesh.find_or_create_node_group(&name);
                loop {
                    tok.skip_to_not_empty();
                    if !tok.is_next_int() {
                        break;
                    }
                    group.add_node_id(tok.next_int()?);
                }
            }
            "ELEM" => {
                let group = model.mesh.find_or_create_cell_group(&name);
                loop {
                    tok.skip_to_not_empty();
                    if !tok.is_next_int() {
                        break;
                    }
                    group.add_cell_id(tok.next_int()?);
                }
            }
            "FREQ" => {
                let mut values = Vec::new();
                loop {
                    tok.skip_to_not_empty();
                    if !tok.is_next_double() {
                        break;
                    }
                    values.push(tok.next_double()?);
                }
                let id = model.next_auto_id();
                model.add_frequency_values(FrequencyValues {
                    id,
                    original_id: Some(sid),
                    values,
                });
            }
            other => {
                return Err(tok.handle_parsing_error(format!("unsupported SET type {other}")));
            }
        }
        Ok(())
    }

    /// SURF: element faces designated by their cell and two corner nodes.
    pub(crate) fn parse_surf(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let sid = tok.next_int()?;
        if !tok.is_next_int() && !tok.is_next_empty() {
            // Some decks carry a stray ELFACE marker.
            let _ = tok.next_string()?;
        }
        let mut faces = Vec::new();
        while !tok.is_empty_until_next_keyword() {
            tok.skip_to_not_empty();
            let cell = tok.next_int()?;
            let ga1 = tok.next_int_or(0)?;
            let ga2 = tok.next_int_or(0)?;
            let swap_normal = tok.next_int_or(0)? == 1;
            faces.push(SurfaceFace {
                cell,
                node1: if ga1 != 0 { Some(ga1) } else { None },
                node2: if ga2 != 0 { Some(ga2) } else { None },
                swap_normal,
            });
        }
        let id = model.next_auto_id();
        model.add_boundary_surface(BoundarySurface {
            id,
            original_id: Some(sid),
            faces,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetra_model::SolverName;
    use std::fs;

    fn write_deck(contents: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "fetra_optistruct_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock is sane")
                .as_nanos()
        ));
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("deck.fem");
        fs::write(&path, contents).expect("write deck");
        path
    }

    #[test]
    fn contact_surf_and_set_build_sliding_contact() {
        let deck = "\
ANALYSIS STATICS
BEGIN BULK
GRID,1,,0.0,0.0,0.0
GRID,2,,1.0,0.0,0.0
GRID,3,,1.0,1.0,0.0
GRID,4,,0.0,1.0,0.0
PSHELL,10,100,0.1
CQUAD4,20,10,1,2,3,4
MAT1,100,210000.0,,0.3
SET,5,GRID,LIST,1,2
SURF,6,20
CONTACT,7,SLIDE,6,6
ENDDATA
";
        let path = write_deck(deck);
        let configuration = ConfigurationParameters::new(
            path.to_str().expect("utf8 path"),
            SolverName::CodeAster,
        );
        let mut parser = OptistructParser::new();
        let model = parser.parse(&configuration).expect("parse succeeds");

        assert!(model.mesh.find_node_group("SET_5").is_some());
        assert!(model.find_boundary_surface_by_original(6).is_some());
        let slide = model
            .constraints()
            .iter()
            .find(|c| matches!(c, Constraint::SurfaceSlide { .. }))
            .expect("sliding contact parsed");
        match slide {
            Constraint::SurfaceSlide {
                master_surface,
                slave_surface,
                ..
            } => {
                assert_eq!(*master_surface, 6);
                assert_eq!(*slave_surface, 6);
            }
            _ => unreachable!(),
        }
        // DESOPT default with ANALYSIS=STATICS maps to a linear static run.
        assert_eq!(model.analyses().len(), 1);
    }
}
