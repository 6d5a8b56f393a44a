//! Mesh store: nodes, cells, groups and the topological queries built on the
//! cell catalog.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write as _;
use std::path::Path;

use thiserror::Error;

use crate::cells::CellType;
use crate::coordinates::GLOBAL_COORDINATE_SYSTEM_ID;
use crate::geometry::VectorialValue;
use crate::identifiers::Id;

/// Sentinel for synthesised mesh entity ids; the counters decrease from here
/// so they stay clear of user ids, which grow upward.
pub const AUTO_MESH_ID_START: Id = 999_999_999;

pub type MeshResult<T> = std::result::Result<T, MeshError>;

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("node {0} already defined")]
    DuplicateNode(Id),

    #[error("cell {0} already defined")]
    DuplicateCell(Id),

    #[error("cell {cell}: {cell_type:?} takes {expected} nodes, got {got}")]
    Arity {
        cell: Id,
        cell_type: CellType,
        expected: usize,
        got: usize,
    },

    #[error("unknown node {0}")]
    NodeNotFound(Id),

    #[error("unknown cell {0}")]
    CellNotFound(Id),

    #[error("group '{0}' already exists")]
    DuplicateGroup(String),

    #[error("group '{0}' not found")]
    GroupNotFound(String),

    #[error("topology error: {0}")]
    Topology(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A mesh node. Position is immutable after insert.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: Id,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Frame the coordinates are written in.
    pub position_cs: Id,
    /// Frame nodal unknowns and loads are expressed in.
    pub displacement_cs: Id,
}

impl Node {
    pub fn position(&self) -> VectorialValue {
        VectorialValue::new(self.x, self.y, self.z)
    }
}

/// A mesh cell: a typed, ordered list of node ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub id: Id,
    pub cell_type: CellType,
    pub node_ids: Vec<Id>,
    /// Optional orientation frame (beam local axes).
    pub orientation_cs: Option<Id>,
}

impl Cell {
    pub fn corner_node_ids(&self) -> &[Id] {
        &self.node_ids[..self.cell_type.num_corners()]
    }

    /// Ordered node ids of face `face_num` per the catalog.
    pub fn face_node_ids(&self, face_num: usize) -> Option<Vec<Id>> {
        self.cell_type
            .faces()
            .get(face_num)
            .map(|face| face.iter().map(|&i| self.node_ids[i]).collect())
    }
}

/// A named, ordered, duplicate-free set of node ids.
#[derive(Debug, Clone)]
pub struct NodeGroup {
    pub id: Id,
    pub name: String,
    pub comment: String,
    node_ids: Vec<Id>,
    seen: HashSet<Id>,
}

impl NodeGroup {
    fn new(id: Id, name: &str, comment: &str) -> Self {
        NodeGroup {
            id,
            name: name.to_string(),
            comment: comment.to_string(),
            node_ids: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn add_node_id(&mut self, node_id: Id) {
        if self.seen.insert(node_id) {
            self.node_ids.push(node_id);
        }
    }

    pub fn node_ids(&self) -> &[Id] {
        &self.node_ids
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }
}

/// A named, ordered, duplicate-free set of cell ids.
#[derive(Debug, Clone)]
pub struct CellGroup {
    pub id: Id,
    pub name: String,
    pub comment: String,
    cell_ids: Vec<Id>,
    seen: HashSet<Id>,
}

impl CellGroup {
    fn new(id: Id, name: &str, comment: &str) -> Self {
        CellGroup {
            id,
            name: name.to_string(),
            comment: comment.to_string(),
            cell_ids: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn add_cell_id(&mut self, cell_id: Id) {
        if self.seen.insert(cell_id) {
            self.cell_ids.push(cell_id);
        }
    }

    pub fn cell_ids(&self) -> &[Id] {
        &self.cell_ids
    }

    pub fn is_empty(&self) -> bool {
        self.cell_ids.is_empty()
    }
}

/// A boundary face of a volume cell, as produced by skin extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct SkinFace {
    pub cell_type: CellType,
    pub node_ids: Vec<Id>,
    pub volume_cell: Id,
    pub face_num: usize,
}

/// The mesh: sole owner of nodes, cells and groups.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub name: String,
    nodes: Vec<Node>,
    node_index: HashMap<Id, usize>,
    cells: Vec<Cell>,
    cell_index: HashMap<Id, usize>,
    node_groups: Vec<NodeGroup>,
    cell_groups: Vec<CellGroup>,
    next_auto_node_id: Option<Id>,
    next_auto_cell_id: Option<Id>,
    next_group_id: Option<Id>,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Mesh {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Insert a node; `id: None` draws a synthesised id. Returns its position.
    pub fn add_node(
        &mut self,
        id: Option<Id>,
        x: f64,
        y: f64,
        z: f64,
        position_cs: Id,
        displacement_cs: Id,
    ) -> MeshResult<usize> {
        let id = id.unwrap_or_else(|| self.next_auto_node_id());
        if self.node_index.contains_key(&id) {
            return Err(MeshError::DuplicateNode(id));
        }
        let position = self.nodes.len();
        self.node_index.insert(id, position);
        self.nodes.push(Node {
            id,
            x,
            y,
            z,
            position_cs,
            displacement_cs,
        });
        Ok(position)
    }

    /// Shorthand for a node in the global frame.
    pub fn add_node_global(&mut self, id: Option<Id>, x: f64, y: f64, z: f64) -> MeshResult<usize> {
        self.add_node(
            id,
            x,
            y,
            z,
            GLOBAL_COORDINATE_SYSTEM_ID,
            GLOBAL_COORDINATE_SYSTEM_ID,
        )
    }

    /// Insert a cell; catalog arity is enforced here. Node existence is a
    /// `validate()`-time invariant because decks declare cells and nodes in
    /// any order. Returns the cell's position.
    pub fn add_cell(
        &mut self,
        id: Option<Id>,
        cell_type: CellType,
        node_ids: Vec<Id>,
        orientation_cs: Option<Id>,
    ) -> MeshResult<usize> {
        let id = id.unwrap_or_else(|| self.next_auto_cell_id());
        if self.cell_index.contains_key(&id) {
            return Err(MeshError::DuplicateCell(id));
        }
        if node_ids.len() != cell_type.num_nodes() {
            return Err(MeshError::Arity {
                cell: id,
                cell_type,
                expected: cell_type.num_nodes(),
                got: node_ids.len(),
            });
        }
        let position = self.cells.len();
        self.cell_index.insert(id, position);
        self.cells.push(Cell {
            id,
            cell_type,
            node_ids,
            orientation_cs,
        });
        Ok(position)
    }

    pub fn find_node(&self, id: Id) -> Option<&Node> {
        self.node_index.get(&id).map(|&pos| &self.nodes[pos])
    }

    pub fn find_node_position(&self, id: Id) -> Option<usize> {
        self.node_index.get(&id).copied()
    }

    pub fn node_at(&self, position: usize) -> Option<&Node> {
        self.nodes.get(position)
    }

    pub fn find_cell(&self, id: Id) -> Option<&Cell> {
        self.cell_index.get(&id).map(|&pos| &self.cells[pos])
    }

    pub fn find_cell_mut(&mut self, id: Id) -> Option<&mut Cell> {
        match self.cell_index.get(&id) {
            Some(&pos) => Some(&mut self.cells[pos]),
            None => None,
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn count_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn count_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn create_cell_group(
        &mut self,
        name: &str,
        original_id: Option<Id>,
        comment: &str,
    ) -> MeshResult<&mut CellGroup> {
        if self.cell_groups.iter().any(|g| g.name == name) {
            return Err(MeshError::DuplicateGroup(name.to_string()));
        }
        let id = original_id.unwrap_or_else(|| self.next_group_id());
        self.cell_groups.push(CellGroup::new(id, name, comment));
        Ok(self.cell_groups.last_mut().expect("just pushed"))
    }

    pub fn find_or_create_cell_group(&mut self, name: &str) -> &mut CellGroup {
        if let Some(pos) = self.cell_groups.iter().position(|g| g.name == name) {
            return &mut self.cell_groups[pos];
        }
        let id = self.next_group_id();
        self.cell_groups.push(CellGroup::new(id, name, ""));
        self.cell_groups.last_mut().expect("just pushed")
    }

    pub fn find_or_create_node_group(&mut self, name: &str) -> &mut NodeGroup {
        if let Some(pos) = self.node_groups.iter().position(|g| g.name == name) {
            return &mut self.node_groups[pos];
        }
        let id = self.next_group_id();
        self.node_groups.push(NodeGroup::new(id, name, ""));
        self.node_groups.last_mut().expect("just pushed")
    }

    pub fn find_cell_group(&self, name: &str) -> Option<&CellGroup> {
        self.cell_groups.iter().find(|g| g.name == name)
    }

    pub fn find_node_group(&self, name: &str) -> Option<&NodeGroup> {
        self.node_groups.iter().find(|g| g.name == name)
    }

    pub fn find_cell_group_by_id(&self, id: Id) -> Option<&CellGroup> {
        self.cell_groups.iter().find(|g| g.id == id)
    }

    pub fn find_node_group_by_id(&self, id: Id) -> Option<&NodeGroup> {
        self.node_groups.iter().find(|g| g.id == id)
    }

    pub fn cell_groups(&self) -> &[CellGroup] {
        &self.cell_groups
    }

    pub fn node_groups(&self) -> &[NodeGroup] {
        &self.node_groups
    }

    /// Ordered node list of the face of `cell_id` containing the segment
    /// `(n1, n2)`.
    ///
    /// Faces are scanned in catalog order. A pair lying on a shared edge is
    /// ambiguous (two faces contain it); a pair spanning a face diagonal is
    /// unique.
    pub fn faceids_from_two_nodes(&self, cell_id: Id, n1: Id, n2: Id) -> MeshResult<Vec<Id>> {
        let cell = self
            .find_cell(cell_id)
            .ok_or(MeshError::CellNotFound(cell_id))?;
        let mut candidates: Vec<(usize, Vec<Id>)> = Vec::new();
        for (face_num, face) in cell.cell_type.faces().iter().enumerate() {
            let ids: Vec<Id> = face.iter().map(|&i| cell.node_ids[i]).collect();
            if ids.contains(&n1) && ids.contains(&n2) {
                candidates.push((face_num, ids));
            }
        }
        match candidates.len() {
            0 => Err(MeshError::Topology(format!(
                "no face of cell {cell_id} contains nodes {n1} and {n2}"
            ))),
            1 => Ok(candidates.remove(0).1),
            _ => {
                // Prefer the face where the pair sits on a diagonal; an edge
                // pair stays ambiguous.
                let corner_count = |ids: &[Id]| if ids.len() <= 4 { ids.len() } else { ids.len() / 2 };
                let diagonal: Vec<&(usize, Vec<Id>)> = candidates
                    .iter()
                    .filter(|(_, ids)| {
                        let corners = corner_count(ids);
                        let p1 = ids[..corners].iter().position(|&n| n == n1);
                        let p2 = ids[..corners].iter().position(|&n| n == n2);
                        match (p1, p2) {
                            (Some(a), Some(b)) => {
                                (a + 1) % corners != b && (b + 1) % corners != a
                            }
                            _ => false,
                        }
                    })
                    .collect();
                if diagonal.len() == 1 {
                    Ok(diagonal[0].1.clone())
                } else {
                    Err(MeshError::Topology(format!(
                        "nodes {n1} and {n2} are on {} faces of cell {cell_id}",
                        candidates.len()
                    )))
                }
            }
        }
    }

    /// The volume cell and face number a skin cell lies on.
    ///
    /// The skin cell must match, up to rotation and reflection, exactly one
    /// face of exactly one volume cell.
    pub fn volcell_and_facenum_from_skincell(&self, skin_cell_id: Id) -> MeshResult<(Id, usize)> {
        let skin = self
            .find_cell(skin_cell_id)
            .ok_or(MeshError::CellNotFound(skin_cell_id))?;
        if skin.cell_type.dimension() != 2 {
            return Err(MeshError::Topology(format!(
                "cell {skin_cell_id} is not a surface cell"
            )));
        }
        let skin_corners: HashSet<Id> = skin.corner_node_ids().iter().copied().collect();
        let mut matches = Vec::new();
        for cell in &self.cells {
            if cell.cell_type.dimension() != 3 {
                continue;
            }
            for (face_num, face) in cell.cell_type.faces().iter().enumerate() {
                let corners = if face.len() <= 4 { face.len() } else { face.len() / 2 };
                let face_corners: HashSet<Id> =
                    face[..corners].iter().map(|&i| cell.node_ids[i]).collect();
                if face_corners == skin_corners {
                    matches.push((cell.id, face_num));
                }
            }
        }
        match matches.len() {
            1 => Ok(matches[0]),
            0 => Err(MeshError::Topology(format!(
                "skin cell {skin_cell_id} matches no volume cell face"
            ))),
            n => Err(MeshError::Topology(format!(
                "skin cell {skin_cell_id} matches {n} volume cell faces"
            ))),
        }
    }

    /// Boundary faces of the volume cells: faces whose corner set occurs on
    /// exactly one volume cell.
    pub fn build_skin(&self) -> Vec<SkinFace> {
        let mut occurrences: HashMap<Vec<Id>, usize> = HashMap::new();
        for cell in &self.cells {
            if cell.cell_type.dimension() != 3 {
                continue;
            }
            for face in cell.cell_type.faces() {
                let corners = if face.len() <= 4 { face.len() } else { face.len() / 2 };
                let mut key: Vec<Id> = face[..corners].iter().map(|&i| cell.node_ids[i]).collect();
                key.sort_unstable();
                *occurrences.entry(key).or_insert(0) += 1;
            }
        }

        let mut skin = Vec::new();
        for cell in &self.cells {
            if cell.cell_type.dimension() != 3 {
                continue;
            }
            for (face_num, face) in cell.cell_type.faces().iter().enumerate() {
                let corners = if face.len() <= 4 { face.len() } else { face.len() / 2 };
                let mut key: Vec<Id> = face[..corners].iter().map(|&i| cell.node_ids[i]).collect();
                key.sort_unstable();
                if occurrences.get(&key) == Some(&1) {
                    let node_ids: Vec<Id> = face.iter().map(|&i| cell.node_ids[i]).collect();
                    if let Some(cell_type) = cell.cell_type.face_type(corners) {
                        skin.push(SkinFace {
                            cell_type,
                            node_ids,
                            volume_cell: cell.id,
                            face_num,
                        });
                    }
                }
            }
        }
        skin
    }

    /// Write the mesh-exchange file read back by the Aster-family writer.
    ///
    /// The container is the ASCII mail format; nodes are `N<id>`, cells
    /// `M<id>`, groups carry their deck names.
    pub fn write_med(&self, path: &Path) -> MeshResult<()> {
        let mut out = String::new();
        out.push_str("TITRE\n");
        out.push_str(&format!("{}\n", if self.name.is_empty() { "mesh" } else { &self.name }));
        out.push_str("FINSF\n");

        out.push_str("COOR_3D\n");
        for node in &self.nodes {
            out.push_str(&format!(
                "N{} {:.10e} {:.10e} {:.10e}\n",
                node.id, node.x, node.y, node.z
            ));
        }
        out.push_str("FINSF\n");

        for cell_type in CellType::ALL {
            let cells: Vec<&Cell> = self
                .cells
                .iter()
                .filter(|c| c.cell_type == cell_type)
                .collect();
            if cells.is_empty() {
                continue;
            }
            out.push_str(&format!("{}\n", mail_keyword(cell_type)));
            for cell in cells {
                out.push_str(&format!("M{}", cell.id));
                for node_id in &cell.node_ids {
                    out.push_str(&format!(" N{node_id}"));
                }
                out.push('\n');
            }
            out.push_str("FINSF\n");
        }

        for group in &self.cell_groups {
            if group.is_empty() {
                continue;
            }
            out.push_str("GROUP_MA\n");
            out.push_str(&format!("{}\n", group.name));
            for cell_id in group.cell_ids() {
                out.push_str(&format!("M{cell_id}\n"));
            }
            out.push_str("FINSF\n");
        }

        for group in &self.node_groups {
            if group.is_empty() {
                continue;
            }
            out.push_str("GROUP_NO\n");
            out.push_str(&format!("{}\n", group.name));
            for node_id in group.node_ids() {
                out.push_str(&format!("N{node_id}\n"));
            }
            out.push_str("FINSF\n");
        }

        out.push_str("FIN\n");

        // Atomic write: temp file in the target directory, then rename.
        let tmp = path.with_extension("mail.tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(out.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Rewrite a node's coordinates, used when normalisation globalizes
    /// positions written in a local frame.
    pub(crate) fn update_node_coords(&mut self, id: Id, x: f64, y: f64, z: f64) -> MeshResult<()> {
        let pos = self
            .find_node_position(id)
            .ok_or(MeshError::NodeNotFound(id))?;
        let node = &mut self.nodes[pos];
        node.x = x;
        node.y = y;
        node.z = z;
        node.position_cs = GLOBAL_COORDINATE_SYSTEM_ID;
        Ok(())
    }

    /// An existing surface cell with exactly these corner nodes, if any.
    pub fn find_surface_cell_with_corners(&self, corners: &[Id]) -> Option<Id> {
        let mut wanted: Vec<Id> = corners.to_vec();
        wanted.sort_unstable();
        self.cells
            .iter()
            .filter(|c| c.cell_type.dimension() == 2)
            .find(|c| {
                let mut have: Vec<Id> = c.corner_node_ids().to_vec();
                have.sort_unstable();
                have == wanted
            })
            .map(|c| c.id)
    }

    fn next_auto_node_id(&mut self) -> Id {
        let id = self.next_auto_node_id.unwrap_or(AUTO_MESH_ID_START);
        self.next_auto_node_id = Some(id - 1);
        id
    }

    fn next_auto_cell_id(&mut self) -> Id {
        let id = self.next_auto_cell_id.unwrap_or(AUTO_MESH_ID_START);
        self.next_auto_cell_id = Some(id - 1);
        id
    }

    fn next_group_id(&mut self) -> Id {
        let id = self.next_group_id.unwrap_or(AUTO_MESH_ID_START);
        self.next_group_id = Some(id - 1);
        id
    }
}

fn mail_keyword(cell_type: CellType) -> &'static str {
    match cell_type {
        CellType::Point1 => "POI1",
        CellType::Seg2 => "SEG2",
        CellType::Seg3 => "SEG3",
        CellType::Tri3 => "TRIA3",
        CellType::Tri6 => "TRIA6",
        CellType::Quad4 => "QUAD4",
        CellType::Quad8 => "QUAD8",
        CellType::Quad9 => "QUAD9",
        CellType::Tetra4 => "TETRA4",
        CellType::Tetra10 => "TETRA10",
        CellType::Pyra5 => "PYRAM5",
        CellType::Pyra13 => "PYRAM13",
        CellType::Penta6 => "PENTA6",
        CellType::Penta15 => "PENTA15",
        CellType::Hexa8 => "HEXA8",
        CellType::Hexa20 => "HEXA20",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_hexa() -> Mesh {
        let mut mesh = Mesh::new("hexa");
        let coords = [
            (50, 0.0, 0.0, 0.0),
            (51, 1.0, 0.0, 0.0),
            (52, 1.0, 1.0, 0.0),
            (53, 0.0, 1.0, 0.0),
            (54, 0.0, 0.0, 1.0),
            (55, 1.0, 0.0, 1.0),
            (56, 1.0, 1.0, 1.0),
            (57, 0.0, 1.0, 1.0),
        ];
        for (id, x, y, z) in coords {
            mesh.add_node_global(Some(id), x, y, z).expect("node insert");
        }
        mesh.add_cell(
            Some(1),
            CellType::Hexa8,
            vec![50, 51, 52, 53, 54, 55, 56, 57],
            None,
        )
        .expect("cell insert");
        mesh
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let mut mesh = Mesh::new("m");
        mesh.add_node_global(Some(1), 0.0, 0.0, 0.0).expect("first");
        assert!(matches!(
            mesh.add_node_global(Some(1), 1.0, 0.0, 0.0),
            Err(MeshError::DuplicateNode(1))
        ));
    }

    #[test]
    fn arity_is_enforced_at_insert() {
        let mut mesh = Mesh::new("m");
        let err = mesh
            .add_cell(Some(1), CellType::Quad4, vec![1, 2, 3], None)
            .expect_err("three nodes cannot make a quad");
        assert!(matches!(err, MeshError::Arity { expected: 4, got: 3, .. }));
    }

    #[test]
    fn diagonal_pair_selects_unique_face() {
        let mesh = unit_hexa();
        let face = mesh
            .faceids_from_two_nodes(1, 50, 52)
            .expect("bottom face via diagonal");
        assert_eq!(face, vec![50, 51, 52, 53]);
    }

    #[test]
    fn edge_pair_is_ambiguous() {
        let mesh = unit_hexa();
        let err = mesh
            .faceids_from_two_nodes(1, 50, 51)
            .expect_err("edge pair lies on two faces");
        assert!(matches!(err, MeshError::Topology(_)));
    }

    #[test]
    fn skin_of_single_hexa_is_six_quads() {
        let mesh = unit_hexa();
        let skin = mesh.build_skin();
        assert_eq!(skin.len(), 6);
        assert!(skin.iter().all(|f| f.cell_type == CellType::Quad4));
        assert!(skin.iter().all(|f| f.volume_cell == 1));
    }

    #[test]
    fn skin_cell_maps_back_to_volume_face() {
        let mut mesh = unit_hexa();
        mesh.add_cell(None, CellType::Quad4, vec![50, 51, 52, 53], None)
            .expect("skin quad insert");
        let skin_id = mesh.cells().last().expect("exists").id;
        let (vol, face_num) = mesh
            .volcell_and_facenum_from_skincell(skin_id)
            .expect("unique match");
        assert_eq!(vol, 1);
        assert_eq!(face_num, 0);
    }

    #[test]
    fn shared_face_is_not_skin() {
        let mut mesh = Mesh::new("two-hexas");
        for (id, x, y, z) in [
            (1, 0.0, 0.0, 0.0),
            (2, 1.0, 0.0, 0.0),
            (3, 1.0, 1.0, 0.0),
            (4, 0.0, 1.0, 0.0),
            (5, 0.0, 0.0, 1.0),
            (6, 1.0, 0.0, 1.0),
            (7, 1.0, 1.0, 1.0),
            (8, 0.0, 1.0, 1.0),
            (9, 0.0, 0.0, 2.0),
            (10, 1.0, 0.0, 2.0),
            (11, 1.0, 1.0, 2.0),
            (12, 0.0, 1.0, 2.0),
        ] {
            mesh.add_node_global(Some(id), x, y, z).expect("node");
        }
        mesh.add_cell(Some(1), CellType::Hexa8, vec![1, 2, 3, 4, 5, 6, 7, 8], None)
            .expect("lower");
        mesh.add_cell(Some(2), CellType::Hexa8, vec![5, 6, 7, 8, 9, 10, 11, 12], None)
            .expect("upper");
        let skin = mesh.build_skin();
        // 12 faces total, the shared one appears twice and is dropped.
        assert_eq!(skin.len(), 10);
        assert!(!skin.iter().any(|f| {
            let mut corners = f.node_ids.clone();
            corners.sort_unstable();
            corners == vec![5, 6, 7, 8]
        }));
    }

    #[test]
    fn synthesised_ids_descend_from_sentinel() {
        let mut mesh = Mesh::new("m");
        mesh.add_node_global(None, 0.0, 0.0, 0.0).expect("auto node");
        mesh.add_node_global(None, 1.0, 0.0, 0.0).expect("auto node");
        let ids: Vec<Id> = mesh.nodes().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![AUTO_MESH_ID_START, AUTO_MESH_ID_START - 1]);
    }

    #[test]
    fn groups_deduplicate_and_preserve_order() {
        let mut mesh = unit_hexa();
        let group = mesh.find_or_create_node_group("LOADED");
        group.add_node_id(52);
        group.add_node_id(50);
        group.add_node_id(52);
        assert_eq!(group.node_ids(), &[52, 50]);
        assert!(mesh.find_node_group("LOADED").is_some());
        assert!(mesh.find_node_group("MISSING").is_none());
    }

    #[test]
    fn write_med_emits_mail_sections() {
        let mut mesh = unit_hexa();
        let group = mesh.find_or_create_cell_group("VOLUME");
        group.add_cell_id(1);
        let dir = std::env::temp_dir().join(format!(
            "fetra_mesh_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock is sane")
                .as_nanos()
        ));
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("hexa.med");
        mesh.write_med(&path).expect("write mesh exchange file");
        let contents = fs::read_to_string(&path).expect("read back");
        assert!(contents.starts_with("TITRE\n"));
        assert!(contents.contains("COOR_3D"));
        assert!(contents.contains("HEXA8"));
        assert!(contents.contains("GROUP_MA"));
        assert!(contents.contains("VOLUME"));
        assert!(contents.ends_with("FIN\n"));
    }
}
