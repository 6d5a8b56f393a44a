//! Geometry cards of the Nastran dialect: nodes, coordinate systems and
//! cells.
//!
//! Nastran's node ordering differs from the internal (MED-like) convention;
//! each cell type carries a permutation table mapping internal position `i`
//! to the Nastran field index.

use fetra_deck::Tokenizer;
use fetra_model::cells::CellType;
use fetra_model::constraints::{Constraint, ConstraintBase};
use fetra_model::coordinates::{Basis, CoordinateSystem, CoordinateSystemKind};
use fetra_model::dofs::{DOFCoefs, DOFS};
use fetra_model::geometry::VectorialValue;
use fetra_model::identifiers::Id;
use fetra_model::model::Model;

use super::parser::{NastranParser, property_group_name};
use fetra_deck::ParseFailure;

type FieldResult<T> = std::result::Result<T, ParseFailure>;

/// Volume cell families with a linear and a quadratic arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VolumeKind {
    Tetra,
    Pyra,
    Penta,
    Hexa,
}

impl VolumeKind {
    fn cell_type(self, node_count: usize) -> Option<CellType> {
        match (self, node_count) {
            (VolumeKind::Tetra, 4) => Some(CellType::Tetra4),
            (VolumeKind::Tetra, 10) => Some(CellType::Tetra10),
            (VolumeKind::Pyra, 5) => Some(CellType::Pyra5),
            (VolumeKind::Pyra, 13) => Some(CellType::Pyra13),
            (VolumeKind::Penta, 6) => Some(CellType::Penta6),
            (VolumeKind::Penta, 15) => Some(CellType::Penta15),
            (VolumeKind::Hexa, 8) => Some(CellType::Hexa8),
            (VolumeKind::Hexa, 20) => Some(CellType::Hexa20),
            _ => None,
        }
    }
}

/// Internal position -> Nastran field index, identity when absent.
pub(crate) fn node_permutation(cell_type: CellType) -> Option<&'static [usize]> {
    match cell_type {
        CellType::Tri3 => Some(&[0, 2, 1]),
        CellType::Tri6 => Some(&[0, 2, 1, 5, 4, 3]),
        CellType::Quad4 => Some(&[0, 3, 2, 1]),
        CellType::Quad8 => Some(&[0, 3, 2, 1, 7, 6, 5, 4]),
        CellType::Quad9 => Some(&[0, 3, 2, 1, 7, 6, 5, 4, 8]),
        CellType::Tetra4 => Some(&[0, 2, 1, 3]),
        CellType::Tetra10 => Some(&[0, 2, 1, 3, 6, 5, 4, 7, 9, 8]),
        CellType::Pyra5 => Some(&[0, 3, 2, 1, 4]),
        CellType::Pyra13 => Some(&[0, 3, 2, 1, 4, 8, 7, 6, 5, 9, 12, 11, 10]),
        CellType::Penta6 => Some(&[0, 2, 1, 3, 5, 4]),
        CellType::Penta15 => Some(&[0, 2, 1, 3, 5, 4, 8, 7, 6, 14, 13, 12, 9, 11, 10]),
        CellType::Hexa8 => Some(&[0, 3, 2, 1, 4, 7, 6, 5]),
        CellType::Hexa20 => Some(&[
            0, 3, 2, 1, 4, 7, 6, 5, 11, 10, 9, 8, 19, 18, 17, 16, 12, 15, 14, 13,
        ]),
        _ => None,
    }
}

fn permute(cell_type: CellType, nastran_nodes: &[Id]) -> Vec<Id> {
    match node_permutation(cell_type) {
        Some(permutation) => permutation.iter().map(|&i| nastran_nodes[i]).collect(),
        None => nastran_nodes.to_vec(),
    }
}

impl NastranParser {
    pub(crate) fn parse_grid(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let id = tok.next_int()?;
        let cp = tok.next_int_or(self.grdset.cp)?;
        let x = tok.next_double_or(0.0)?;
        let y = tok.next_double_or(0.0)?;
        let z = tok.next_double_or(0.0)?;
        let cd = tok.next_int_or(self.grdset.cd)?;
        let ps = tok.next_int_or(self.grdset.ps)?;
        let _seid = tok.next_int_or(0)?;
        if let Err(err) = model.mesh.add_node(Some(id), x, y, z, cp, cd) {
            return Err(tok.handle_parsing_error(err.to_string()));
        }
        if ps != 0 {
            // Permanent single-point constraint: applies to every analysis.
            let dofs = DOFS::from_nastran_code(ps);
            let constraint_id = model.next_auto_id();
            let constraint = model.add_constraint(Constraint::Spc {
                base: ConstraintBase::new(constraint_id, None),
                nodes: vec![id],
                dofs,
                values: DOFCoefs::default(),
                functions: Vec::new(),
            });
            model.add_common_constraint(constraint);
        }
        Ok(())
    }

    pub(crate) fn parse_grdset(&mut self, tok: &mut Tokenizer) -> FieldResult<()> {
        let _blank = tok.next_string_or("");
        let cp = tok.next_int_or(0)?;
        let _x1 = tok.next_string_or("");
        let _x2 = tok.next_string_or("");
        let _x3 = tok.next_string_or("");
        let cd = tok.next_int_or(0)?;
        let ps = tok.next_int_or(0)?;
        self.grdset = super::parser::GrdSet { cp, cd, ps };
        tok.skip_card();
        Ok(())
    }

    pub(crate) fn parse_cord1r(
        &mut self,
        tok: &mut Tokenizer,
        model: &mut Model,
    ) -> FieldResult<()> {
        let cid = tok.next_int()?;
        let g1 = tok.next_int()?;
        let g2 = tok.next_int()?;
        let g3 = tok.next_int()?;
        let point = |node: Id| -> FieldResult<VectorialValue> {
            model
                .mesh
                .find_node(node)
                .map(|n| n.position())
                .ok_or_else(|| {
                    tok.handle_parsing_error(format!("CORD1R references unknown node {node}"))
                })
        };
        let origin = point(g1)?;
        let z_point = point(g2)?;
        let xz_point = point(g3)?;
        let basis = Basis::from_points(origin, z_point, xz_point)
            .ok_or_else(|| tok.handle_parsing_error("degenerate CORD1R definition"))?;
        let id = model.next_auto_id();
        model.add_coordinate_system(CoordinateSystem::new(
            id,
            Some(cid),
            CoordinateSystemKind::Cartesian,
            basis,
        ));
        Ok(())
    }

    pub(crate) fn parse_cord2r(
        &mut self,
        tok: &mut Tokenizer,
        model: &mut Model,
        cylindrical: bool,
    ) -> FieldResult<()> {
        let cid = tok.next_int()?;
        let rid = tok.next_int_or(0)?;
        if rid != 0 {
            tok.handle_parsing_warning("coordinate system chaining (RID) treated as global");
        }
        let mut p = [0.0; 9];
        for slot in &mut p {
            *slot = tok.next_double_or(0.0)?;
        }
        let basis = Basis::from_points(
            VectorialValue::new(p[0], p[1], p[2]),
            VectorialValue::new(p[3], p[4], p[5]),
            VectorialValue::new(p[6], p[7], p[8]),
        )
        .ok_or_else(|| tok.handle_parsing_error("degenerate coordinate system definition"))?;
        let kind = if cylindrical {
            CoordinateSystemKind::Cylindrical
        } else {
            CoordinateSystemKind::Cartesian
        };
        let id = model.next_auto_id();
        model.add_coordinate_system(CoordinateSystem::new(id, Some(cid), kind, basis));
        Ok(())
    }

    /// Beam orientation: either an explicit vector or a reference node G0.
    fn parse_orientation(
        &mut self,
        tok: &mut Tokenizer,
        model: &mut Model,
        ga: Id,
    ) -> FieldResult<Option<Id>> {
        if tok.is_next_empty() {
            return Ok(None);
        }
        let kind = if tok.is_next_int() {
            let g0 = tok.next_int()?;
            CoordinateSystemKind::TwoNodesOrientation { node1: ga, node2: g0 }
        } else {
            let x1 = tok.next_double()?;
            let x2 = tok.next_double_or(0.0)?;
            let x3 = tok.next_double_or(0.0)?;
            CoordinateSystemKind::VectorOrientation {
                direction: VectorialValue::new(x1, x2, x3),
            }
        };
        let id = model.next_auto_id();
        model.add_coordinate_system(CoordinateSystem::new(id, None, kind, Basis::global()));
        Ok(Some(id))
    }

    pub(crate) fn parse_cbar(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let eid = tok.next_int()?;
        let pid = tok.next_int()?;
        let ga = tok.next_int()?;
        let gb = tok.next_int()?;
        let orientation = self.parse_orientation(tok, model, ga)?;
        tok.skip_card();
        self.add_cell_with_property(tok, model, eid, pid, CellType::Seg2, vec![ga, gb], orientation)
    }

    pub(crate) fn parse_crod(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let eid = tok.next_int()?;
        let pid = tok.next_int()?;
        let g1 = tok.next_int()?;
        let g2 = tok.next_int()?;
        self.add_cell_with_property(tok, model, eid, pid, CellType::Seg2, vec![g1, g2], None)
    }

    pub(crate) fn parse_shell(
        &mut self,
        tok: &mut Tokenizer,
        model: &mut Model,
        cell_type: CellType,
    ) -> FieldResult<()> {
        let eid = tok.next_int()?;
        let pid = tok.next_int()?;
        let mut nodes = Vec::with_capacity(cell_type.num_nodes());
        for _ in 0..cell_type.num_nodes() {
            nodes.push(tok.next_int()?);
        }
        if tok.is_next_double() {
            let theta = tok.next_double()?;
            if theta != 0.0 {
                tok.handle_parsing_warning("shell material orientation angle is not translated");
            }
        }
        tok.skip_card();
        self.add_cell_with_property(tok, model, eid, pid, cell_type, permute(cell_type, &nodes), None)
    }

    /// CQUAD picks its arity from the node count (4, 8 or 9).
    pub(crate) fn parse_cquad(&mut self, tok: &mut Tokenizer, model: &mut Model) -> FieldResult<()> {
        let eid = tok.next_int()?;
        let pid = tok.next_int()?;
        let mut nodes = Vec::new();
        while tok.is_next_int() {
            nodes.push(tok.next_int()?);
        }
        let cell_type = match nodes.len() {
            4 => CellType::Quad4,
            8 => CellType::Quad8,
            9 => CellType::Quad9,
            n => {
                return Err(tok.handle_parsing_error(format!("CQUAD with {n} nodes")));
            }
        };
        self.add_cell_with_property(tok, model, eid, pid, cell_type, permute(cell_type, &nodes), None)
    }

    pub(crate) fn parse_volume(
        &mut self,
        tok: &mut Tokenizer,
        model: &mut Model,
        kind: VolumeKind,
    ) -> FieldResult<()> {
        let eid = tok.next_int()?;
        let pid = tok.next_int()?;
        let mut nodes = Vec::new();
        loop {
            tok.skip_to_not_empty();
            if !tok.is_next_int() {
                break;
            }
            nodes.push(tok.next_int()?);
        }
        let cell_type = kind.cell_type(nodes.len()).ok_or_else(|| {
            tok.handle_parsing_error(format!("{kind:?} cell with {} nodes", nodes.len()))
        })?;
        self.add_cell_with_property(tok, model, eid, pid, cell_type, permute(cell_type, &nodes), None)
    }

    fn add_cell_with_property(
        &mut self,
        tok: &Tokenizer,
        model: &mut Model,
        eid: Id,
        pid: Id,
        cell_type: CellType,
        node_ids: Vec<Id>,
        orientation: Option<Id>,
    ) -> FieldResult<()> {
        if let Err(err) = model
            .mesh
            .add_cell(Some(eid), cell_type, node_ids, orientation)
        {
            return Err(tok.handle_parsing_error(err.to_string()));
        }
        model
            .mesh
            .find_or_create_cell_group(&property_group_name(pid))
            .add_cell_id(eid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permutations_are_bijections() {
        for cell_type in CellType::ALL {
            if let Some(permutation) = node_permutation(cell_type) {
                assert_eq!(permutation.len(), cell_type.num_nodes(), "{cell_type:?}");
                let mut seen = vec![false; permutation.len()];
                for &index in permutation {
                    assert!(!seen[index], "{cell_type:?} repeats index {index}");
                    seen[index] = true;
                }
            }
        }
    }

    #[test]
    fn hexa8_reversal_keeps_corner_sets() {
        let nastran: Vec<Id> = (1..=8).collect();
        let internal = permute(CellType::Hexa8, &nastran);
        assert_eq!(internal, vec![1, 4, 3, 2, 5, 8, 7, 6]);
        let mut sorted = internal.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, nastran);
    }
}
