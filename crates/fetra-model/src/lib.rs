//! Language-neutral intermediate model of a finite-element simulation.
//!
//! This crate owns everything between the dialect parsers and the dialect
//! writers:
//! - geometry primitives, the DOF vocabulary and the cell-type catalog
//! - the mesh store with its topological queries (faces, skins)
//! - the intermediate model itself: materials, element sets, values,
//!   loadings, constraints, analyses and assertions, all referentially
//!   consistent and insertion-ordered
//! - the target-driven `finish()` normalisation pipeline and `validate()`
//! - the translation configuration tables

pub mod analysis;
pub mod cells;
pub mod configuration;
pub mod constraints;
pub mod coordinates;
pub mod dofs;
pub mod elements;
pub mod geometry;
pub mod identifiers;
pub mod loadings;
pub mod materials;
pub mod mesh;
pub mod model;
pub mod objectives;
pub mod values;

pub use analysis::{
    Analysis, AnalysisBase, FrequencyBand, FrequencyValues, ModalDamping, NonLinearStrategy,
};
pub use cells::CellType;
pub use configuration::{
    ConfigurationParameters, ModelConfiguration, Rbe2TranslationMode, SolverName, TranslationMode,
};
pub use constraints::{
    BoundarySurface, Constraint, ConstraintBase, ConstraintSet, ConstraintSetRef,
    ConstraintSetType, GapParticipation, Rbe3Slave, SurfaceFace,
};
pub use coordinates::{Basis, CoordinateSystem, CoordinateSystemKind, GLOBAL_COORDINATE_SYSTEM_ID};
pub use dofs::{DOF, DOFCoefs, DOFS};
pub use elements::{ElementSet, ElementSetBase, MatrixEntry};
pub use geometry::{VectorialValue, is_equal, is_zero};
pub use identifiers::{AUTO_ID_START, Collection, Id, Identified};
pub use loadings::{LoadSet, LoadSetRef, LoadSetType, Loading, LoadingBase};
pub use materials::{CellContainer, HardeningRule, Material, MaterialAssignment, Nature, YieldFunction};
pub use mesh::{Cell, CellGroup, Mesh, MeshError, Node, NodeGroup, SkinFace};
pub use model::{Model, ModelError, ModelResult};
pub use objectives::Assertion;
pub use values::{Interpolation, ParaName, Value};
