//! Building and writing StagePodAutoscalers for the revisions in a stage

use super::scale::UpdateSpaFn;
use super::store::{AutoscalerStore, StoreError};
use crate::crd::{
    RolloutOrchestrator, StagePodAutoscaler, StagePodAutoscalerSpec, TargetRevision,
    REVISION_LABEL_KEY, SERVICE_LABEL_KEY,
};
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, info};

fn owned_metadata(ro: &RolloutOrchestrator, revision: &str, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(revision.to_string()),
        namespace: ro.namespace(),
        labels: Some(labels),
        owner_references: ro.controller_owner_ref(&()).map(|owner| vec![owner]),
        ..Default::default()
    }
}

/// A StagePodAutoscaler for `revision` carrying its final bounds
///
/// Named after the revision and controlled by the orchestrator, so it is
/// garbage collected with it.
pub fn create_base_stage_pod_autoscaler(
    ro: &RolloutOrchestrator,
    revision: &TargetRevision,
) -> StagePodAutoscaler {
    let name = revision.revision_name();
    let labels = BTreeMap::from([(REVISION_LABEL_KEY.to_string(), name.to_string())]);

    StagePodAutoscaler {
        metadata: owned_metadata(ro, name, labels),
        spec: StagePodAutoscalerSpec {
            stage_min_scale: revision.min_scale,
            stage_max_scale: revision.max_scale,
        },
        status: None,
    }
}

/// A StagePodAutoscaler pinning a new revision at zero replicas
///
/// Used in maintenance mode, where the revision losing traffic shrinks before
/// the new one is allowed to start.
pub fn create_pinned_stage_pod_autoscaler(
    ro: &RolloutOrchestrator,
    revision: &TargetRevision,
) -> StagePodAutoscaler {
    let name = revision.revision_name();
    let labels = BTreeMap::from([
        (REVISION_LABEL_KEY.to_string(), name.to_string()),
        (SERVICE_LABEL_KEY.to_string(), ro.name_any()),
    ]);

    StagePodAutoscaler {
        metadata: owned_metadata(ro, name, labels),
        spec: StagePodAutoscalerSpec {
            stage_min_scale: Some(0),
            stage_max_scale: Some(0),
        },
        status: None,
    }
}

/// Write the stage bounds for `revision`, creating its StagePodAutoscaler if needed
///
/// An existing object is always replaced with `update` applied, so repeated
/// calls converge on the same spec.
pub async fn create_or_update_spa(
    store: &dyn AutoscalerStore,
    ro: &RolloutOrchestrator,
    revision: &TargetRevision,
    scale_up_ready: bool,
    update: UpdateSpaFn,
) -> Result<StagePodAutoscaler, StoreError> {
    let namespace = ro.namespace().unwrap_or_default();
    let name = revision.revision_name();

    match store.get(&namespace, name).await? {
        Some(existing) => {
            let updated = update(existing, revision, scale_up_ready);
            debug!(
                revision = name,
                stage_min_scale = ?updated.spec.stage_min_scale,
                stage_max_scale = ?updated.spec.stage_max_scale,
                "Updating StagePodAutoscaler"
            );
            store.replace(&updated).await
        }
        None => {
            let spa = update(
                create_base_stage_pod_autoscaler(ro, revision),
                revision,
                scale_up_ready,
            );
            info!(
                revision = name,
                namespace = %namespace,
                stage_min_scale = ?spa.spec.stage_min_scale,
                stage_max_scale = ?spa.spec.stage_max_scale,
                "Creating StagePodAutoscaler"
            );
            store.create(&spa).await
        }
    }
}
