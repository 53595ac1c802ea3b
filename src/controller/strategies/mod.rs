//! Rollout steps and the two rollout modes built from them
//!
//! A stage moves capacity between two revisions in two steps:
//! - `ScaleUpStep`: grow the revision gaining traffic
//! - `ScaleDownStep`: shrink the revision losing traffic, reaping stuck pods
//!
//! Normal mode runs them up then down. Maintenance mode runs them down then
//! up, for clusters that cannot hold both revisions at once.

pub mod scale_down;
pub mod scale_up;

use crate::controller::orchestrator::{Context, Requeue, RevisionPair, StoreError};
use crate::crd::{RolloutMode, RolloutOrchestrator, RolloutOrchestratorStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use thiserror::Error;
use tracing::{debug, info};

pub use scale_down::ScaleDownStep;
pub use scale_up::ScaleUpStep;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Object store error: {0}")]
    Store(#[from] StoreError),
}

/// One phase of a stage
///
/// All methods must be safe to repeat: a reconcile can stop after any of
/// them and start over from the first step next time.
#[async_trait]
pub trait RolloutStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Write the StagePodAutoscaler bounds this step wants
    async fn execute(
        &self,
        ro: &RolloutOrchestrator,
        pair: &RevisionPair<'_>,
        ctx: &Context,
    ) -> Result<(), StrategyError>;

    /// Whether the observed scale satisfies this step
    ///
    /// Not being ready is `Ok(false)`. A step waiting on a known deadline asks
    /// for a later reconcile through `requeue`.
    async fn verify(
        &self,
        ro: &RolloutOrchestrator,
        pair: &RevisionPair<'_>,
        ctx: &Context,
        requeue: &Requeue,
    ) -> Result<bool, StrategyError>;

    /// Record success of this step on the orchestrator status
    fn modify_status(&self, status: &mut RolloutOrchestratorStatus, now: DateTime<Utc>);
}

/// Ordered steps for one rollout mode
pub struct Rollout {
    mode: RolloutMode,
    steps: Vec<Box<dyn RolloutStep>>,
}

impl Rollout {
    pub fn name(&self) -> &'static str {
        self.mode.as_str()
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run the steps in order; true once every step is satisfied
    ///
    /// The first step always writes its bounds. Later steps only run while
    /// the stage is in progress, and the first unsatisfied step stops the run.
    pub async fn reconcile(
        &self,
        ro: &mut RolloutOrchestrator,
        pair: &RevisionPair<'_>,
        ctx: &Context,
        requeue: &Requeue,
    ) -> Result<bool, StrategyError> {
        let name = ro.name_any();

        for (index, step) in self.steps.iter().enumerate() {
            if ro.is_stage_in_progress() || index == 0 {
                step.execute(ro, pair, ctx).await?;
            }

            if ro.is_stage_in_progress() {
                if !step.verify(ro, pair, ctx, requeue).await? {
                    debug!(orchestrator = %name, step = step.name(), "Step not ready yet");
                    return Ok(false);
                }
                info!(orchestrator = %name, step = step.name(), mode = self.name(), "Step ready");
                step.modify_status(ro.status_mut(), ctx.clock.now());
            }
        }

        Ok(true)
    }
}

/// Steps for a rollout mode
///
/// Steps hold no state, so building them per reconcile is cheap.
pub fn select_strategy(mode: RolloutMode) -> Rollout {
    let steps: Vec<Box<dyn RolloutStep>> = match mode {
        RolloutMode::Normal => vec![Box::new(ScaleUpStep), Box::new(ScaleDownStep)],
        RolloutMode::Maintenance => vec![Box::new(ScaleDownStep), Box::new(ScaleUpStep)],
    };
    Rollout { mode, steps }
}
