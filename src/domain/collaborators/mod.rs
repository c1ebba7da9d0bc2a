pub mod provisioner;
pub mod stores;
