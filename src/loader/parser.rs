use serde::de::DeserializeOwned;
use std::fs;

use crate::api::composition_dto::CompositionFileDto;
use crate::domain::composition::component::CompositeDescription;
use crate::domain::orchestration::coordinator::CompositionRequest;
use crate::domain::simulator::provisioner_simulator::SimulatorSettings;
use crate::error::{Error, Result};

/// Parses a JSON file into a given type `T`.
///
/// Errors are converted into `crate::error::Error` variants:
/// - `Error::IoError` if the file cannot be read.
/// - `Error::DeserializationError` if the JSON is malformed.
pub fn parse_json_file<T: DeserializeOwned>(file_path: &str) -> Result<T> {
    let data = fs::read_to_string(file_path).map_err(Error::IoError)?;

    let parsed_data: T = serde_json::from_str(&data).map_err(Error::DeserializationError)?;

    Ok(parsed_data)
}

/// Everything a composition file describes.
#[derive(Debug, Clone)]
pub struct CompositionScenario {
    pub description: CompositeDescription,
    pub request: CompositionRequest,
    pub simulator: SimulatorSettings,
}

impl From<CompositionFileDto> for CompositionScenario {
    fn from(dto: CompositionFileDto) -> Self {
        let description = CompositeDescription::from(dto.composite);
        let request = dto.request.into_request(description.link.clone());
        Self { description, request, simulator: dto.simulator.into() }
    }
}

pub fn parse_composition_str(json: &str) -> Result<CompositionScenario> {
    let dto: CompositionFileDto = serde_json::from_str(json).map_err(Error::DeserializationError)?;
    Ok(dto.into())
}

pub fn parse_composition_file(file_path: &str) -> Result<CompositionScenario> {
    let dto = parse_json_file::<CompositionFileDto>(file_path)?;
    log::info!("Composition file '{}' parsed: {} components.", file_path, dto.composite.components.len());
    Ok(dto.into())
}
