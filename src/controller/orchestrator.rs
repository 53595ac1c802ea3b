pub mod autoscaler;
pub mod readiness;
pub mod reconcile;
pub mod requeue;
pub mod revisions;
pub mod scale;
pub mod store;

// Flat re-exports so callers use `controller::orchestrator::*`
pub use autoscaler::*;
pub use readiness::*;
pub use reconcile::*;
pub use requeue::*;
pub use revisions::*;
pub use scale::*;
pub use store::*;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Tests can use unwrap/expect for brevity
#[path = "orchestrator_test.rs"]
mod tests;
