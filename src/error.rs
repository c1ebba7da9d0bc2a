use thiserror::Error;

use crate::domain::utils::id::TaskAddress;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse composition JSON: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Components with duplicate name [{name}] detected for resources [{first}] and [{second}].")]
    DuplicateName { name: String, first: String, second: String },

    #[error("Dependency on name: [{dependency}] can't be resolved in component: [{component}].")]
    UnresolvedDependency { dependency: String, component: String },

    #[error("Cyclic dependency detected{0}.")]
    CyclicDependency(CycleDetection),

    #[error("Provisioning of [{component}] failed: {reason}")]
    ProvisionerFailure { component: String, reason: String },

    #[error("Unsupported resource type [{0}].")]
    UnsupportedResourceType(String),

    #[error("Unknown order of removal for resource types: {0:?}")]
    UnknownRemovalOrder(Vec<String>),

    #[error("Failure notifying task [{target}]: {reason}")]
    NotificationDeliveryFailure { target: TaskAddress, reason: String },

    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    #[error("Invalid composition request: {0}")]
    InvalidRequest(String),
}

/// Where in the graph construction a cycle surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDetection {
    /// No node without dependencies exists.
    NoEntryNode,
    /// A node was released a second time while the queue was drained.
    DuringProcessing,
    /// Nodes were left over after the queue drained.
    AfterProcessing,
}

impl std::fmt::Display for CycleDetection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleDetection::NoEntryNode => Ok(()),
            CycleDetection::DuringProcessing => write!(f, " during processing"),
            CycleDetection::AfterProcessing => write!(f, " after processing"),
        }
    }
}

impl Error {
    pub fn is_cyclic_dependency(&self) -> bool {
        matches!(self, Error::CyclicDependency(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
