pub mod config_manager;
pub mod types;

pub use config_manager::*;
pub use types::*;
