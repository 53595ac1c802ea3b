use super::{RolloutStep, StrategyError};
use crate::controller::orchestrator::{
    create_or_update_spa, is_stage_scale_up_ready, update_spa_for_rev_down, update_spa_for_rev_up,
    Context, Requeue, RevisionPair,
};
use crate::crd::{RolloutOrchestrator, RolloutOrchestratorStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use tracing::debug;

/// Grows the revision gaining traffic
pub struct ScaleUpStep;

#[async_trait]
impl RolloutStep for ScaleUpStep {
    fn name(&self) -> &'static str {
        "scale-up"
    }

    async fn execute(
        &self,
        ro: &RolloutOrchestrator,
        pair: &RevisionPair<'_>,
        ctx: &Context,
    ) -> Result<(), StrategyError> {
        create_or_update_spa(
            ctx.autoscalers.as_ref(),
            ro,
            pair.up,
            true,
            update_spa_for_rev_up,
        )
        .await?;
        Ok(())
    }

    async fn verify(
        &self,
        ro: &RolloutOrchestrator,
        pair: &RevisionPair<'_>,
        ctx: &Context,
        _requeue: &Requeue,
    ) -> Result<bool, StrategyError> {
        let namespace = ro.namespace().unwrap_or_default();
        let spa = ctx
            .autoscalers
            .get(&namespace, pair.up.revision_name())
            .await?;

        let ready = spa
            .as_ref()
            .is_some_and(|spa| spa.is_stage_scale_in_ready() && is_stage_scale_up_ready(spa, pair.up));

        if !ready {
            debug!(
                orchestrator = %ro.name_any(),
                revision = pair.up.revision_name(),
                desired = ?spa.as_ref().and_then(|s| s.desired_scale()),
                actual = ?spa.as_ref().and_then(|s| s.actual_scale()),
                "Revision still scaling up"
            );
            // Keep the old revision's bounds in place until the new one is ready
            create_or_update_spa(
                ctx.autoscalers.as_ref(),
                ro,
                pair.down,
                false,
                update_spa_for_rev_down,
            )
            .await?;
        }

        Ok(ready)
    }

    fn modify_status(&self, status: &mut RolloutOrchestratorStatus, now: DateTime<Utc>) {
        status.mark_stage_revision_scale_up_ready(now);
    }
}
