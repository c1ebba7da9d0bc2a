pub mod callback;
pub mod context;
pub mod coordinator;
pub mod directory;
pub mod node_task;
pub mod removal;
pub mod service;
pub mod stage;
