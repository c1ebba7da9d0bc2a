use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Kinds of resources a composition can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    Container,
    LoadBalancer,
    Compute,
    Network,
    ComputeNetwork,
    Volume,
    Closure,
}

/// Order in which grouped removal batches are chained.
/// A batch of type `REMOVAL_ORDER[i + 1]` starts only after the batch of `REMOVAL_ORDER[i]` completed.
pub const REMOVAL_ORDER: &[ResourceType] = &[
    ResourceType::Container,
    ResourceType::LoadBalancer,
    ResourceType::Compute,
    ResourceType::Network,
    ResourceType::ComputeNetwork,
    ResourceType::Volume,
    ResourceType::Closure,
];

impl ResourceType {
    pub fn name(&self) -> &'static str {
        match self {
            ResourceType::Container => "container",
            ResourceType::LoadBalancer => "load-balancer",
            ResourceType::Compute => "compute",
            ResourceType::Network => "network",
            ResourceType::ComputeNetwork => "compute-network",
            ResourceType::Volume => "volume",
            ResourceType::Closure => "closure",
        }
    }

    /// Types a composition node task can provision directly.
    pub fn is_provisionable(&self) -> bool {
        !matches!(self, ResourceType::LoadBalancer)
    }

    /// Position in `REMOVAL_ORDER`.
    pub fn removal_priority(&self) -> usize {
        REMOVAL_ORDER.iter().position(|t| t == self).unwrap_or(REMOVAL_ORDER.len())
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "container" => Ok(ResourceType::Container),
            "load-balancer" => Ok(ResourceType::LoadBalancer),
            "compute" => Ok(ResourceType::Compute),
            "network" => Ok(ResourceType::Network),
            "compute-network" => Ok(ResourceType::ComputeNetwork),
            "volume" => Ok(ResourceType::Volume),
            "closure" => Ok(ResourceType::Closure),
            _ => Err(Error::UnsupportedResourceType(s.to_string())),
        }
    }
}
