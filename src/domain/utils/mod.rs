pub mod id;
pub mod progress_log;
