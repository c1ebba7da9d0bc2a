pub mod collaborators;
pub mod composition;
pub mod orchestration;
pub mod resource_type;
pub mod simulator;
pub mod utils;
