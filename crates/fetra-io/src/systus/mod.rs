//! Systus-family dialect: `_DATA1.ASC` mesh/property files and `.DAT`
//! analysis scripts.

pub mod writer;

pub use writer::SystusWriter;
