use super::requeue::Requeue;
use super::revisions::{last_stage_complete, remove_non_traffic_rev, retrieve_revs_up_down, MissingRevisionPair};
use super::store::{
    AutoscalerStore, KubeAutoscalerStore, KubeOrchestratorStore, KubePodStore, OrchestratorStore,
    PodStore, StoreError,
};
use crate::config::ControllerConfig;
use crate::controller::clock::{Clock, SystemClock};
use crate::controller::strategies::{select_strategy, StrategyError};
use crate::crd::RolloutOrchestrator;
use crate::server::SharedMetrics;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Object store error: {0}")]
    Store(#[from] StoreError),

    #[error("RolloutOrchestrator missing namespace")]
    MissingNamespace,

    #[error("Invalid stage target: {0}")]
    RevisionPair(#[from] MissingRevisionPair),

    #[error("Reconcile did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Rollout step failed: {0}")]
    Strategy(#[from] StrategyError),
}

pub struct Context {
    pub autoscalers: Arc<dyn AutoscalerStore>,
    pub pods: Arc<dyn PodStore>,
    pub orchestrators: Arc<dyn OrchestratorStore>,
    pub clock: Arc<dyn Clock>,
    pub config: ControllerConfig,
    /// When Some, records reconcile counts, durations and stage progress
    pub metrics: Option<SharedMetrics>,
}

impl Context {
    /// Context backed by the API server
    pub fn new(client: kube::Client, config: ControllerConfig, metrics: Option<SharedMetrics>) -> Self {
        Context {
            autoscalers: Arc::new(KubeAutoscalerStore::new(client.clone())),
            pods: Arc::new(KubePodStore::new(client.clone())),
            orchestrators: Arc::new(KubeOrchestratorStore::new(client)),
            clock: Arc::new(SystemClock),
            config,
            metrics,
        }
    }

    /// Context over arbitrary stores, with default config and no metrics
    pub fn with_stores(
        autoscalers: Arc<dyn AutoscalerStore>,
        pods: Arc<dyn PodStore>,
        orchestrators: Arc<dyn OrchestratorStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Context {
            autoscalers,
            pods,
            orchestrators,
            clock,
            config: ControllerConfig::default(),
            metrics: None,
        }
    }
}

/// Reconcile a RolloutOrchestrator
///
/// Drives the current stage (`spec.stageTargetRevisions`) forward by writing
/// StagePodAutoscaler bounds and reading back the observed scale, then
/// records the progress in the status conditions. "Not ready yet" is not an
/// error: the orchestrator is re-triggered when its StagePodAutoscalers
/// change, or after the delay a step asked for.
///
/// The status is written only when it changed and only when the whole
/// reconcile succeeded, so a failure leaves the last committed status alone.
///
/// # Returns
/// * `Ok(Action)` - `requeue` with the shortest requested delay, else `await_change`
/// * `Err(ReconcileError)` - store failure, missing revision pair, or timeout
pub async fn reconcile(
    ro: Arc<RolloutOrchestrator>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start_time = Instant::now();
    let timeout = ctx.config.reconcile_timeout;

    let result = match tokio::time::timeout(timeout, reconcile_orchestrator(&ro, &ctx)).await {
        Ok(result) => result,
        Err(_) => Err(ReconcileError::Timeout(timeout)),
    };

    if let Some(ref metrics) = ctx.metrics {
        let duration_secs = start_time.elapsed().as_secs_f64();
        let mode = ro.spec.rollout_mode.as_str();
        match result {
            Ok(_) => metrics.record_reconciliation_success(mode, duration_secs),
            Err(_) => metrics.record_reconciliation_error(mode, duration_secs),
        }
    }

    result
}

async fn reconcile_orchestrator(
    ro: &RolloutOrchestrator,
    ctx: &Context,
) -> Result<Action, ReconcileError> {
    let namespace = ro.namespace().ok_or(ReconcileError::MissingNamespace)?;
    let name = ro.name_any();

    debug!(orchestrator = %name, namespace = %namespace, "Reconciling RolloutOrchestrator");

    let mut desired = ro.clone();
    let status = desired.status_mut();
    status.initialize_conditions(ctx.clock.now());
    status.observed_generation = ro.metadata.generation;

    let requeue = Requeue::new();
    let achieved = reconcile_stage(&mut desired, ctx, &requeue).await?;

    if ro.status != desired.status {
        if let Some(status) = &desired.status {
            info!(
                orchestrator = %name,
                namespace = %namespace,
                stage_ready = desired.is_stage_ready(),
                ready = desired.is_ready(),
                "Updating RolloutOrchestrator status"
            );
            if let Err(e) = ctx
                .orchestrators
                .patch_status(&namespace, &name, ro.resource_version().as_deref(), status)
                .await
            {
                error!(error = %e, orchestrator = %name, "Failed to update status");
                return Err(e.into());
            }
        }
    }

    // Counted once the completed stage is committed, so a failed write and its retry count once
    if let (Some(achieved), Some(metrics)) = (achieved, ctx.metrics.as_ref()) {
        metrics.record_stage_completed(&namespace, achieved.last_stage);
    }

    Ok(match requeue.shortest() {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    })
}

/// A stage that this reconcile marked as achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageAchieved {
    /// The achieved stage matches the final targets
    pub last_stage: bool,
}

/// Advance the current stage of `ro` in place
///
/// Only the status of `ro` is modified. Returns `Some` when the current stage
/// was achieved by this call.
pub async fn reconcile_stage(
    ro: &mut RolloutOrchestrator,
    ctx: &Context,
    requeue: &Requeue,
) -> Result<Option<StageAchieved>, ReconcileError> {
    if ro.stage_target_revisions().is_empty() {
        debug!(orchestrator = %ro.name_any(), "No active stage");
        return Ok(None);
    }

    let name = ro.name_any();
    let namespace = ro.namespace().unwrap_or_default();
    let stage_targets = ro.stage_target_revisions().to_vec();
    let pair = retrieve_revs_up_down(&stage_targets).inspect_err(|e| {
        warn!(orchestrator = %name, error = %e, "Stage target has no revision pair");
    })?;

    let rollout = select_strategy(ro.spec.rollout_mode);
    if !rollout.reconcile(ro, &pair, ctx, requeue).await? {
        return Ok(None);
    }

    let now = ctx.clock.now();

    if ro.is_stage_in_progress() {
        let stage_cleaned = remove_non_traffic_rev(&stage_targets);
        let final_targets = ro.spec.target_revisions.clone();
        let status = ro.status_mut();
        status.set_stage_revision_status(stage_cleaned);
        status.mark_stage_revision_ready(now);

        let last_stage = last_stage_complete(&status.stage_revision_status, &final_targets);
        if last_stage {
            status.mark_last_stage_revision_complete(now);
        } else {
            status.mark_last_stage_revision_incomplete(now);
        }

        info!(
            orchestrator = %name,
            namespace = %namespace,
            up = pair.up.revision_name(),
            down = pair.down.revision_name(),
            last_stage = last_stage,
            "Stage achieved"
        );
        return Ok(Some(StageAchieved { last_stage }));
    }

    let achieved = ro
        .status
        .as_ref()
        .map(|s| s.stage_revision_status.as_slice())
        .unwrap_or_default();
    if ro.is_stage_ready() && ro.is_in_progress() && !last_stage_complete(achieved, &stage_targets) {
        info!(orchestrator = %name, namespace = %namespace, "Launching next stage");
        ro.status_mut().launch_new_stage(now);
    }

    Ok(None)
}

/// Log the failure and retry after the configured backoff
pub fn error_policy(ro: Arc<RolloutOrchestrator>, error: &ReconcileError, ctx: Arc<Context>) -> Action {
    warn!(
        orchestrator = %ro.name_any(),
        namespace = ?ro.namespace(),
        "Reconcile error (will retry): {}",
        error
    );
    Action::requeue(ctx.config.error_requeue)
}
