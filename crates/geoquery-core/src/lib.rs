pub mod config_manager;
pub mod error;
pub mod retry;
pub mod types;

pub use config_manager::*;
pub use error::*;
pub use retry::*;
pub use types::*;
