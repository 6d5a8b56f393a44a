//! Reference-result back-readers: they parse solver output files and inject
//! assertions into the analyses of an already-parsed model.

pub mod csv;
pub mod f06;

pub use csv::CsvResultReader;
pub use f06::F06Parser;

use fetra_model::model::Model;
use fetra_model::ConfigurationParameters;

use crate::error::Result;

/// Dispatch on the reference file's extension: `.f06` is card-based, the
/// rest is treated as CSV.
pub fn add_assertions(configuration: &ConfigurationParameters, model: &mut Model) -> Result<()> {
    let Some(path) = configuration.result_file.clone() else {
        return Ok(());
    };
    let is_f06 = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("f06"))
        .unwrap_or(false);
    if is_f06 {
        F06Parser::new().add_assertions(configuration, model)
    } else {
        CsvResultReader::new().add_assertions(configuration, model)
    }
}
