//! Progressive rollout controller
//!
//! Moves traffic and capacity from one revision to the next in stages.
//! Each stage is declared on a `RolloutOrchestrator`; the controller writes
//! per-revision `StagePodAutoscaler` bounds and reports progress back through
//! status conditions.

pub mod config;
pub mod controller;
pub mod crd;
pub mod server;
