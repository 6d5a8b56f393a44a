//! The closed cell-type catalog.
//!
//! Every component that reasons about faces, edges or skins goes through this
//! table: it encodes, per cell type, the node count, the topological
//! dimension, and the ordered face/edge enumerations in the internal (MED-like)
//! node numbering convention.

use serde::{Deserialize, Serialize};

/// Cell type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellType {
    /// Single-node point cell
    Point1,
    /// 2-node segment
    Seg2,
    /// 3-node segment
    Seg3,
    /// 3-node triangle
    Tri3,
    /// 6-node triangle
    Tri6,
    /// 4-node quadrangle
    Quad4,
    /// 8-node quadrangle
    Quad8,
    /// 9-node quadrangle
    Quad9,
    /// 4-node tetrahedron
    Tetra4,
    /// 10-node tetrahedron
    Tetra10,
    /// 5-node pyramid
    Pyra5,
    /// 13-node pyramid
    Pyra13,
    /// 6-node pentahedron (wedge)
    Penta6,
    /// 15-node pentahedron
    Penta15,
    /// 8-node hexahedron
    Hexa8,
    /// 20-node hexahedron
    Hexa20,
}

// Face tables: ordered node indices per face, outward normals consistent
// within each cell type. Quadratic faces list corners then midsides.
const TETRA4_FACES: &[&[usize]] = &[&[0, 2, 1], &[0, 3, 2], &[0, 1, 3], &[1, 2, 3]];
const TETRA10_FACES: &[&[usize]] = &[
    &[0, 2, 1, 6, 5, 4],
    &[0, 3, 2, 7, 9, 6],
    &[0, 1, 3, 4, 8, 7],
    &[1, 2, 3, 5, 9, 8],
];
const PYRA5_FACES: &[&[usize]] = &[
    &[0, 3, 2, 1],
    &[0, 1, 4],
    &[1, 2, 4],
    &[2, 3, 4],
    &[3, 0, 4],
];
const PYRA13_FACES: &[&[usize]] = &[
    &[0, 3, 2, 1, 8, 7, 6, 5],
    &[0, 1, 4, 5, 10, 9],
    &[1, 2, 4, 6, 11, 10],
    &[2, 3, 4, 7, 12, 11],
    &[3, 0, 4, 8, 9, 12],
];
const PENTA6_FACES: &[&[usize]] = &[
    &[0, 2, 1],
    &[3, 4, 5],
    &[0, 1, 4, 3],
    &[1, 2, 5, 4],
    &[2, 0, 3, 5],
];
const PENTA15_FACES: &[&[usize]] = &[
    &[0, 2, 1, 8, 7, 6],
    &[3, 4, 5, 9, 10, 11],
    &[0, 1, 4, 3, 6, 13, 9, 12],
    &[1, 2, 5, 4, 7, 14, 10, 13],
    &[2, 0, 3, 5, 8, 12, 11, 14],
];
const HEXA8_FACES: &[&[usize]] = &[
    &[0, 1, 2, 3],
    &[4, 7, 6, 5],
    &[0, 4, 5, 1],
    &[1, 5, 6, 2],
    &[2, 6, 7, 3],
    &[3, 7, 4, 0],
];
const HEXA20_FACES: &[&[usize]] = &[
    &[0, 1, 2, 3, 8, 9, 10, 11],
    &[4, 7, 6, 5, 15, 14, 13, 12],
    &[0, 4, 5, 1, 16, 12, 17, 8],
    &[1, 5, 6, 2, 17, 13, 18, 9],
    &[2, 6, 7, 3, 18, 14, 19, 10],
    &[3, 7, 4, 0, 19, 15, 16, 11],
];
const TRI3_FACE: &[&[usize]] = &[&[0, 1, 2]];
const TRI6_FACE: &[&[usize]] = &[&[0, 1, 2, 3, 4, 5]];
const QUAD4_FACE: &[&[usize]] = &[&[0, 1, 2, 3]];
const QUAD8_FACE: &[&[usize]] = &[&[0, 1, 2, 3, 4, 5, 6, 7]];
const QUAD9_FACE: &[&[usize]] = &[&[0, 1, 2, 3, 4, 5, 6, 7, 8]];

const SEG2_EDGES: &[[usize; 2]] = &[[0, 1]];
const TRI3_EDGES: &[[usize; 2]] = &[[0, 1], [1, 2], [2, 0]];
const QUAD4_EDGES: &[[usize; 2]] = &[[0, 1], [1, 2], [2, 3], [3, 0]];
const TETRA4_EDGES: &[[usize; 2]] = &[[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];
const PYRA5_EDGES: &[[usize; 2]] = &[
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [0, 4],
    [1, 4],
    [2, 4],
    [3, 4],
];
const PENTA6_EDGES: &[[usize; 2]] = &[
    [0, 1],
    [1, 2],
    [2, 0],
    [3, 4],
    [4, 5],
    [5, 3],
    [0, 3],
    [1, 4],
    [2, 5],
];
const HEXA8_EDGES: &[[usize; 2]] = &[
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

impl CellType {
    pub const ALL: [CellType; 16] = [
        CellType::Point1,
        CellType::Seg2,
        CellType::Seg3,
        CellType::Tri3,
        CellType::Tri6,
        CellType::Quad4,
        CellType::Quad8,
        CellType::Quad9,
        CellType::Tetra4,
        CellType::Tetra10,
        CellType::Pyra5,
        CellType::Pyra13,
        CellType::Penta6,
        CellType::Penta15,
        CellType::Hexa8,
        CellType::Hexa20,
    ];

    /// Number of nodes for this cell type.
    pub fn num_nodes(self) -> usize {
        match self {
            CellType::Point1 => 1,
            CellType::Seg2 => 2,
            CellType::Seg3 => 3,
            CellType::Tri3 => 3,
            CellType::Tri6 => 6,
            CellType::Quad4 => 4,
            CellType::Quad8 => 8,
            CellType::Quad9 => 9,
            CellType::Tetra4 => 4,
            CellType::Tetra10 => 10,
            CellType::Pyra5 => 5,
            CellType::Pyra13 => 13,
            CellType::Penta6 => 6,
            CellType::Penta15 => 15,
            CellType::Hexa8 => 8,
            CellType::Hexa20 => 20,
        }
    }

    /// Number of corner nodes (quadratic midsides excluded).
    pub fn num_corners(self) -> usize {
        match self {
            CellType::Point1 => 1,
            CellType::Seg2 | CellType::Seg3 => 2,
            CellType::Tri3 | CellType::Tri6 => 3,
            CellType::Quad4 | CellType::Quad8 | CellType::Quad9 => 4,
            CellType::Tetra4 | CellType::Tetra10 => 4,
            CellType::Pyra5 | CellType::Pyra13 => 5,
            CellType::Penta6 | CellType::Penta15 => 6,
            CellType::Hexa8 | CellType::Hexa20 => 8,
        }
    }

    /// Topological dimension: 0 for points, 1 for segments, 2 for faces, 3 for volumes.
    pub fn dimension(self) -> u8 {
        match self {
            CellType::Point1 => 0,
            CellType::Seg2 | CellType::Seg3 => 1,
            CellType::Tri3
            | CellType::Tri6
            | CellType::Quad4
            | CellType::Quad8
            | CellType::Quad9 => 2,
            _ => 3,
        }
    }

    pub fn is_quadratic(self) -> bool {
        matches!(
            self,
            CellType::Seg3
                | CellType::Tri6
                | CellType::Quad8
                | CellType::Quad9
                | CellType::Tetra10
                | CellType::Pyra13
                | CellType::Penta15
                | CellType::Hexa20
        )
    }

    /// Ordered node indices per face. For 2D cells the single "face" is the
    /// cell itself; 0D/1D cells have none.
    pub fn faces(self) -> &'static [&'static [usize]] {
        match self {
            CellType::Point1 | CellType::Seg2 | CellType::Seg3 => &[],
            CellType::Tri3 => TRI3_FACE,
            CellType::Tri6 => TRI6_FACE,
            CellType::Quad4 => QUAD4_FACE,
            CellType::Quad8 => QUAD8_FACE,
            CellType::Quad9 => QUAD9_FACE,
            CellType::Tetra4 => TETRA4_FACES,
            CellType::Tetra10 => TETRA10_FACES,
            CellType::Pyra5 => PYRA5_FACES,
            CellType::Pyra13 => PYRA13_FACES,
            CellType::Penta6 => PENTA6_FACES,
            CellType::Penta15 => PENTA15_FACES,
            CellType::Hexa8 => HEXA8_FACES,
            CellType::Hexa20 => HEXA20_FACES,
        }
    }

    /// Corner-to-corner edge enumeration (shared by the quadratic variant).
    pub fn edges(self) -> &'static [[usize; 2]] {
        match self {
            CellType::Point1 => &[],
            CellType::Seg2 | CellType::Seg3 => SEG2_EDGES,
            CellType::Tri3 | CellType::Tri6 => TRI3_EDGES,
            CellType::Quad4 | CellType::Quad8 | CellType::Quad9 => QUAD4_EDGES,
            CellType::Tetra4 | CellType::Tetra10 => TETRA4_EDGES,
            CellType::Pyra5 | CellType::Pyra13 => PYRA5_EDGES,
            CellType::Penta6 | CellType::Penta15 => PENTA6_EDGES,
            CellType::Hexa8 | CellType::Hexa20 => HEXA8_EDGES,
        }
    }

    /// Cell type of a face with `corner_count` corners on this (volume) cell.
    pub fn face_type(self, corner_count: usize) -> Option<CellType> {
        let quadratic = self.is_quadratic();
        match (corner_count, quadratic) {
            (3, false) => Some(CellType::Tri3),
            (3, true) => Some(CellType::Tri6),
            (4, false) => Some(CellType::Quad4),
            (4, true) => Some(CellType::Quad8),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CellType::Point1 => "POINT1",
            CellType::Seg2 => "SEG2",
            CellType::Seg3 => "SEG3",
            CellType::Tri3 => "TRI3",
            CellType::Tri6 => "TRI6",
            CellType::Quad4 => "QUAD4",
            CellType::Quad8 => "QUAD8",
            CellType::Quad9 => "QUAD9",
            CellType::Tetra4 => "TETRA4",
            CellType::Tetra10 => "TETRA10",
            CellType::Pyra5 => "PYRA5",
            CellType::Pyra13 => "PYRA13",
            CellType::Penta6 => "PENTA6",
            CellType::Penta15 => "PENTA15",
            CellType::Hexa8 => "HEXA8",
            CellType::Hexa20 => "HEXA20",
        }
    }

    pub fn from_label(label: &str) -> Option<CellType> {
        CellType::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_indices_stay_in_arity() {
        for cell_type in CellType::ALL {
            for face in cell_type.faces() {
                for index in *face {
                    assert!(
                        *index < cell_type.num_nodes(),
                        "{:?} face index {} out of range",
                        cell_type,
                        index
                    );
                }
            }
        }
    }

    #[test]
    fn edge_indices_stay_in_corner_range() {
        for cell_type in CellType::ALL {
            for [a, b] in cell_type.edges() {
                assert!(*a < cell_type.num_corners());
                assert!(*b < cell_type.num_corners());
            }
        }
    }

    #[test]
    fn hexa8_has_six_quad_faces() {
        let faces = CellType::Hexa8.faces();
        assert_eq!(faces.len(), 6);
        assert!(faces.iter().all(|f| f.len() == 4));
        assert_eq!(CellType::Hexa8.face_type(4), Some(CellType::Quad4));
    }

    #[test]
    fn quadratic_faces_carry_midsides() {
        let faces = CellType::Hexa20.faces();
        assert!(faces.iter().all(|f| f.len() == 8));
        assert_eq!(CellType::Hexa20.face_type(4), Some(CellType::Quad8));
        assert_eq!(CellType::Tetra10.face_type(3), Some(CellType::Tri6));
    }

    #[test]
    fn labels_round_trip() {
        for cell_type in CellType::ALL {
            assert_eq!(CellType::from_label(cell_type.label()), Some(cell_type));
        }
        assert_eq!(CellType::from_label("hexa8"), Some(CellType::Hexa8));
        assert_eq!(CellType::from_label("NOPE"), None);
    }
}
