//! Readiness of the two revisions in a stage, judged from the observed
//! scale the autoscaler reports on the StagePodAutoscaler status

use crate::crd::{StagePodAutoscaler, TargetRevision};

/// The revision gaining traffic has reached its stage floor
///
/// With `targetReplicas` unset the revision is taking all traffic, so it must
/// have settled (desired == actual) inside its final bounds. Otherwise it is
/// ready when both counts reached the target, or when desired has settled
/// at or above the final floor.
pub fn is_stage_scale_up_ready(spa: &StagePodAutoscaler, revision: &TargetRevision) -> bool {
    let (Some(desired), Some(actual)) = (spa.desired_scale(), spa.actual_scale()) else {
        return false;
    };
    let min = revision.min_scale_or_default();

    let Some(target) = revision.target_replicas else {
        let max = revision.max_scale_or_default();
        return desired == actual && (min..=max).contains(&actual);
    };

    let reached_target = desired >= target && actual >= target;
    let settled_above_floor = desired >= min && desired == actual;
    reached_target || settled_above_floor
}

/// The revision losing traffic has dropped under its stage ceiling
pub fn is_stage_scale_down_ready(spa: &StagePodAutoscaler, revision: &TargetRevision) -> bool {
    let (Some(desired), Some(actual)) = (spa.desired_scale(), spa.actual_scale()) else {
        return false;
    };
    let ceiling = revision
        .target_replicas
        .unwrap_or_else(|| revision.max_scale_or_default());
    desired <= ceiling && actual <= ceiling
}
