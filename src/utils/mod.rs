//! Utility modules

pub mod memory_catalog;
pub mod memory_storage;
pub mod retry;
pub mod telemetry;
pub mod validation;

pub use memory_catalog::*;
pub use memory_storage::*;
pub use retry::*;
pub use telemetry::*;
pub use validation::*;
