//! Dialect I/O for the deck translator.
//!
//! This crate provides:
//! - **Nastran/Optistruct parsers** feeding the intermediate model
//! - **Aster/Systus/Nastran writers** consuming the model after its
//!   target-specialised `finish()`
//! - **F06/CSV result back-readers** injecting assertions between `finish()`
//!   and writing
//! - the shared error taxonomy

pub mod aster;
pub mod error;
pub mod nastran;
pub mod optistruct;
pub mod results;
pub mod systus;

use std::path::PathBuf;

use fetra_model::model::Model;
use fetra_model::{ConfigurationParameters, SolverName, TranslationMode};

pub use aster::{AsterModel, AsterWriter};
pub use error::{IoError, Result};
pub use nastran::{Line, NastranParser, NastranWriter};
pub use optistruct::OptistructParser;
pub use results::{CsvResultReader, F06Parser};
pub use systus::SystusWriter;

/// Input dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Nastran,
    Optistruct,
}

impl InputFormat {
    pub fn from_label(label: &str) -> Option<InputFormat> {
        match label.to_ascii_lowercase().as_str() {
            "nastran" => Some(InputFormat::Nastran),
            "optistruct" => Some(InputFormat::Optistruct),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InputFormat::Nastran => "nastran",
            InputFormat::Optistruct => "optistruct",
        }
    }
}

/// Parse the configured input deck into a model.
pub fn parse(configuration: &ConfigurationParameters, format: InputFormat) -> Result<Model> {
    match format {
        InputFormat::Nastran => NastranParser::new().parse(configuration),
        InputFormat::Optistruct => OptistructParser::new().parse(configuration),
    }
}

/// Full translation: parse, inject reference assertions, normalise for the
/// target, validate and write. Returns the primary runnable file.
pub fn translate(
    configuration: &ConfigurationParameters,
    format: InputFormat,
) -> Result<PathBuf> {
    let mut model = parse(configuration, format)?;
    results::add_assertions(configuration, &mut model)?;
    model.finish()?;
    if let Err(err) = model.validate() {
        // An unsound model never leaves the pipeline silently.
        if configuration.translation_mode == TranslationMode::Strict {
            return Err(err.into());
        }
        log::warn!("{err}");
    }
    write(&model, configuration)
}

/// Write an already-normalised model for the configured target.
pub fn write(model: &Model, configuration: &ConfigurationParameters) -> Result<PathBuf> {
    match configuration.output_solver {
        SolverName::CodeAster => AsterWriter::new().write(model, configuration),
        SolverName::Systus => SystusWriter::new().write(model, configuration),
        SolverName::Nastran => NastranWriter::new().write(model, configuration),
    }
}
