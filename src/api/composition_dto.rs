use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::composition::component::{ComponentDescription, CompositeDescription};
use crate::domain::orchestration::coordinator::CompositionRequest;
use crate::domain::simulator::provisioner_simulator::SimulatorSettings;
use crate::domain::utils::id::{DescriptionLink, TrackerLink};

/// Root of a composition file: the composite to provision, the request and the simulated infrastructure.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CompositionFileDto {
    pub composite: CompositeDescriptionDto,
    #[serde(default)]
    pub request: CompositionRequestDto,
    #[serde(default)]
    pub simulator: SimulatorDto,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CompositeDescriptionDto {
    pub name: String,
    pub link: Option<String>,
    #[serde(default)]
    pub tenant_links: Vec<String>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
    pub components: Vec<ComponentDescriptionDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptionDto {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub description_link: Option<String>,
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompositionRequestDto {
    #[serde(default)]
    pub tenant_links: Vec<String>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
    pub tracker_link: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorDto {
    #[serde(default)]
    pub delay_ms: u64,
    /// Component names whose allocation fails.
    #[serde(default)]
    pub fail_allocation: Vec<String>,
    #[serde(default)]
    pub fail_provisioning: Vec<String>,
    /// Resource type names whose removal fails.
    #[serde(default)]
    pub fail_removal: Vec<String>,
}

impl From<ComponentDescriptionDto> for ComponentDescription {
    fn from(dto: ComponentDescriptionDto) -> Self {
        let description_link = dto
            .description_link
            .unwrap_or_else(|| format!("/resources/{}-descriptions/{}", dto.resource_type.to_ascii_lowercase(), dto.name));
        ComponentDescription {
            name: dto.name,
            resource_type: dto.resource_type,
            description_link: DescriptionLink::new(description_link),
            bindings: dto.bindings,
            depends_on: dto.depends_on,
            links: dto.links,
            networks: dto.networks,
            volumes: dto.volumes,
            custom_properties: dto.custom_properties,
        }
    }
}

impl From<CompositeDescriptionDto> for CompositeDescription {
    fn from(dto: CompositeDescriptionDto) -> Self {
        let link = dto.link.unwrap_or_else(|| format!("/resources/composite-descriptions/{}", dto.name));
        CompositeDescription {
            link: DescriptionLink::new(link),
            name: dto.name,
            tenant_links: dto.tenant_links,
            custom_properties: dto.custom_properties,
            components: dto.components.into_iter().map(ComponentDescription::from).collect(),
        }
    }
}

impl CompositionRequestDto {
    pub fn into_request(self, description_link: DescriptionLink) -> CompositionRequest {
        CompositionRequest {
            description_link,
            tenant_links: self.tenant_links,
            custom_properties: self.custom_properties,
            tracker_link: self.tracker_link.map(TrackerLink::new),
        }
    }
}

impl From<SimulatorDto> for SimulatorSettings {
    fn from(dto: SimulatorDto) -> Self {
        SimulatorSettings {
            delay: Duration::from_millis(dto.delay_ms),
            fail_allocation: dto.fail_allocation.into_iter().collect::<HashSet<_>>(),
            fail_provisioning: dto.fail_provisioning.into_iter().collect(),
            fail_removal: dto.fail_removal.into_iter().map(|t| t.to_ascii_lowercase()).collect(),
        }
    }
}
