//! Stage scale bounds for the revisions moving in a stage
//!
//! The revision gaining traffic keeps its final ceiling and may run below
//! its final floor while it only holds part of the traffic. The revision
//! losing traffic is ratcheted down towards `targetReplicas`, but only once
//! the revision gaining traffic has been confirmed ready.

use crate::crd::{StagePodAutoscaler, StagePodAutoscalerSpec, TargetRevision};

/// The (min, max) pair written to a StagePodAutoscaler spec
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageBounds {
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl StageBounds {
    /// The revision's final bounds as declared on the service
    pub fn final_of(revision: &TargetRevision) -> Self {
        Self {
            min: revision.min_scale,
            max: revision.max_scale,
        }
    }
}

impl From<&StagePodAutoscalerSpec> for StageBounds {
    fn from(spec: &StagePodAutoscalerSpec) -> Self {
        Self {
            min: spec.stage_min_scale,
            max: spec.stage_max_scale,
        }
    }
}

/// Bounds for a revision that is scaling up
pub fn compute_scale_up_bounds(revision: &TargetRevision) -> StageBounds {
    let max = revision.max_scale;

    let Some(target) = revision.target_replicas else {
        return StageBounds::final_of(revision);
    };

    // Below the final floor while only part of the traffic is routed here
    let partial_traffic = revision.percent().is_some_and(|p| p < 100);
    if target < revision.min_scale_or_default() && partial_traffic {
        StageBounds {
            min: Some(target),
            max,
        }
    } else {
        StageBounds {
            min: revision.min_scale,
            max,
        }
    }
}

/// Bounds for a revision that is scaling down
///
/// Returns `current` untouched until the revision scaling up is ready.
pub fn compute_scale_down_bounds(
    current: StageBounds,
    revision: &TargetRevision,
    scale_up_ready: bool,
) -> StageBounds {
    if !scale_up_ready {
        return current;
    }

    let Some(target) = revision.target_replicas else {
        return StageBounds::final_of(revision);
    };

    if target >= revision.max_scale_or_default() {
        return StageBounds::final_of(revision);
    }

    let min = if target < revision.min_scale_or_default() {
        Some(target)
    } else {
        revision.min_scale
    };

    StageBounds {
        min,
        max: Some(target),
    }
}

fn apply(mut spa: StagePodAutoscaler, bounds: StageBounds) -> StagePodAutoscaler {
    spa.spec.stage_min_scale = bounds.min;
    spa.spec.stage_max_scale = bounds.max;
    spa
}

/// Signature shared by the two spec writers, so create-or-update can take either
pub type UpdateSpaFn = fn(StagePodAutoscaler, &TargetRevision, bool) -> StagePodAutoscaler;

/// Write the scale-up bounds into `spa`; the readiness flag is ignored
pub fn update_spa_for_rev_up(
    spa: StagePodAutoscaler,
    revision: &TargetRevision,
    _scale_up_ready: bool,
) -> StagePodAutoscaler {
    apply(spa, compute_scale_up_bounds(revision))
}

/// Write the scale-down bounds into `spa`
pub fn update_spa_for_rev_down(
    spa: StagePodAutoscaler,
    revision: &TargetRevision,
    scale_up_ready: bool,
) -> StagePodAutoscaler {
    let current = StageBounds::from(&spa.spec);
    let bounds = compute_scale_down_bounds(current, revision, scale_up_ready);
    apply(spa, bounds)
}
