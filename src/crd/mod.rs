//! Custom resources managed by the controller
//!
//! - `RolloutOrchestrator`: one per service, describes the staged rollout
//! - `StagePodAutoscaler`: one per revision, carries the stage replica bounds

pub mod autoscaler;
pub mod conditions;
pub mod orchestrator;

/// Label carrying the revision name on pods and StagePodAutoscalers
pub const REVISION_LABEL_KEY: &str = "serving.knative.dev/revision";

/// Label carrying the owning service name
pub const SERVICE_LABEL_KEY: &str = "serving.knative.dev/service";

pub use autoscaler::{StagePodAutoscaler, StagePodAutoscalerSpec, StagePodAutoscalerStatus};
pub use orchestrator::{
    Direction, RolloutMode, RolloutOrchestrator, RolloutOrchestratorSpec,
    RolloutOrchestratorStatus, StageTarget, TargetRevision, TrafficTarget,
};
