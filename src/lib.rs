use crate::error::Result;
use crate::loader::parser::{CompositionScenario, parse_composition_file};

pub mod api;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

/// Initializes logging and loads a composition file.
pub fn load_composition(file_path: &str) -> Result<CompositionScenario> {
    logger::init();
    log::info!("Loading composition from '{}'.", file_path);

    let scenario = parse_composition_file(file_path)?;
    log::info!("Composition '{}' loaded with {} components.", scenario.description.name, scenario.description.components.len());

    Ok(scenario)
}
