pub mod clock;
pub mod orchestrator;
pub mod strategies;

pub use orchestrator::{error_policy, reconcile, Context, ReconcileError};
