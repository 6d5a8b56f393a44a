//! Nastran-family dialect: bulk-deck parser and fixed-column writer.

pub mod geometry;
pub mod parser;
pub mod writer;

pub use parser::NastranParser;
pub use writer::{Line, NastranWriter};
