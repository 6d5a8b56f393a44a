//! Code_Aster-family dialect: `.export`/`.comm` writer over an exchanged
//! mesh.

pub mod model;
pub mod writer;

pub use model::AsterModel;
pub use writer::AsterWriter;
