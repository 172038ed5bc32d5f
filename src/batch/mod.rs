pub mod aggregation;
pub mod orchestrator;
pub mod types;

pub use aggregation::*;
pub use orchestrator::*;
pub use types::*;
