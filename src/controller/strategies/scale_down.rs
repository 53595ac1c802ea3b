//! Scale-down step and the terminating-pod reaper
//!
//! Pods of the revision losing traffic can linger in Terminating long after
//! the autoscaler stopped counting them. The stage cannot complete while they
//! exist, so once their deletion deadline passes they are force-deleted. In
//! maintenance mode's first stage the revision gaining traffic is pinned at
//! zero and cannot start until the old pods are gone, so they are
//! force-deleted right away.

use super::{RolloutStep, StrategyError};
use crate::controller::orchestrator::{
    create_or_update_spa, create_pinned_stage_pod_autoscaler, is_stage_scale_down_ready,
    update_spa_for_rev_down, Context, Requeue, RevisionPair,
};
use crate::crd::{RolloutMode, RolloutOrchestrator, RolloutOrchestratorStatus, StagePodAutoscaler};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shrinks the revision losing traffic
pub struct ScaleDownStep;

#[async_trait]
impl RolloutStep for ScaleDownStep {
    fn name(&self) -> &'static str {
        "scale-down"
    }

    async fn execute(
        &self,
        ro: &RolloutOrchestrator,
        pair: &RevisionPair<'_>,
        ctx: &Context,
    ) -> Result<(), StrategyError> {
        let namespace = ro.namespace().unwrap_or_default();

        // Maintenance mode gets here before the new revision has a
        // StagePodAutoscaler; hold it at zero until the old one shrinks.
        if ctx
            .autoscalers
            .get(&namespace, pair.up.revision_name())
            .await?
            .is_none()
        {
            let spa = create_pinned_stage_pod_autoscaler(ro, pair.up);
            info!(
                orchestrator = %ro.name_any(),
                revision = pair.up.revision_name(),
                "Creating StagePodAutoscaler pinned at zero"
            );
            ctx.autoscalers.create(&spa).await?;
        }

        create_or_update_spa(
            ctx.autoscalers.as_ref(),
            ro,
            pair.down,
            true,
            update_spa_for_rev_down,
        )
        .await?;
        Ok(())
    }

    async fn verify(
        &self,
        ro: &RolloutOrchestrator,
        pair: &RevisionPair<'_>,
        ctx: &Context,
        requeue: &Requeue,
    ) -> Result<bool, StrategyError> {
        let spa = create_or_update_spa(
            ctx.autoscalers.as_ref(),
            ro,
            pair.down,
            true,
            update_spa_for_rev_down,
        )
        .await?;

        if is_scaled_down(&spa, pair) {
            return Ok(true);
        }

        debug!(
            orchestrator = %ro.name_any(),
            revision = pair.down.revision_name(),
            desired = ?spa.desired_scale(),
            actual = ?spa.actual_scale(),
            terminating = ?spa.replicas_terminating(),
            "Revision still scaling down"
        );
        reap_terminating_pods(ro, pair, ctx, requeue).await?;
        Ok(false)
    }

    fn modify_status(&self, status: &mut RolloutOrchestratorStatus, now: DateTime<Utc>) {
        status.mark_stage_revision_scale_down_ready(now);
    }
}

/// Under the stage ceiling with no pod left terminating
fn is_scaled_down(spa: &StagePodAutoscaler, pair: &RevisionPair<'_>) -> bool {
    spa.replicas_terminating() == Some(0) && is_stage_scale_down_ready(spa, pair.down)
}

/// Deletion timestamp of a pod, if it is terminating
///
/// The API server records it with second precision.
pub fn deletion_timestamp(pod: &Pod) -> Option<DateTime<Utc>> {
    let time = pod.metadata.deletion_timestamp.as_ref()?;
    DateTime::from_timestamp(time.0.timestamp(), 0)
}

/// Force-delete or schedule a re-check for each terminating pod of the
/// revision losing traffic
///
/// A missing StagePodAutoscaler for the revision gaining traffic, or a
/// failed pod listing, means "try again later" rather than an error. A
/// failed force delete is an error.
pub async fn reap_terminating_pods(
    ro: &RolloutOrchestrator,
    pair: &RevisionPair<'_>,
    ctx: &Context,
    requeue: &Requeue,
) -> Result<(), StrategyError> {
    let namespace = ro.namespace().unwrap_or_default();
    let name = ro.name_any();

    let up_spa = match ctx.autoscalers.get(&namespace, pair.up.revision_name()).await {
        Ok(Some(spa)) => spa,
        Ok(None) => {
            debug!(orchestrator = %name, revision = pair.up.revision_name(), "No StagePodAutoscaler for revision scaling up yet");
            return Ok(());
        }
        Err(e) => {
            warn!(orchestrator = %name, error = %e, "Failed to read StagePodAutoscaler, retrying later");
            return Ok(());
        }
    };

    let pods = match ctx
        .pods
        .list_revision_pods(&namespace, pair.down.revision_name())
        .await
    {
        Ok(pods) => pods,
        Err(e) => {
            warn!(orchestrator = %name, revision = pair.down.revision_name(), error = %e, "Failed to list pods, retrying later");
            return Ok(());
        }
    };

    let maintenance_first_stage =
        ro.spec.rollout_mode == RolloutMode::Maintenance && up_spa.is_pinned_to_zero();

    for pod in &pods {
        let Some(deleted_at) = deletion_timestamp(pod) else {
            continue;
        };
        let pod_name = pod.name_any();

        if ctx.clock.has_passed(deleted_at) || maintenance_first_stage {
            info!(
                orchestrator = %name,
                pod = %pod_name,
                deletion_timestamp = %deleted_at.to_rfc3339(),
                maintenance_first_stage = maintenance_first_stage,
                "Force deleting terminating pod"
            );
            ctx.pods.force_delete(&namespace, &pod_name).await?;
            if let Some(ref metrics) = ctx.metrics {
                metrics.record_pod_force_deleted(&namespace);
            }
        } else if let Some(grace) = pod.metadata.deletion_grace_period_seconds {
            let delay = Duration::from_secs(u64::try_from(grace).unwrap_or(0));
            debug!(orchestrator = %name, pod = %pod_name, delay_secs = delay.as_secs(), "Re-checking terminating pod later");
            requeue.enqueue_after(delay);
        }
    }

    Ok(())
}
