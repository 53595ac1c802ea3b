#![allow(clippy::unwrap_used)] // Tests can use unwrap for brevity
#![allow(clippy::expect_used)] // Tests can use expect for better error messages

use super::*;
use crate::crd::autoscaler::StagePodAutoscaler;
use chrono::TimeZone;
use kube::CustomResourceExt;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).single().unwrap()
}

#[test]
fn test_orchestrator_deserialize_from_yaml() {
    let yaml = r#"
apiVersion: serving.rollout.dev/v1
kind: RolloutOrchestrator
metadata:
  name: checkout
  namespace: shop
spec:
  rolloutMode: maintenance
  initialRevisions:
  - revisionName: checkout-00001
    percent: 100
    minScale: 10
    maxScale: 20
  targetRevisions:
  - revisionName: checkout-00002
    latestRevision: true
    percent: 100
    minScale: 10
    maxScale: 20
  stageTargetRevisions:
  - revisionName: checkout-00001
    percent: 80
    targetReplicas: 8
    minScale: 10
    maxScale: 20
    direction: down
  - revisionName: checkout-00002
    latestRevision: true
    percent: 20
    targetReplicas: 2
    minScale: 10
    maxScale: 20
    direction: up
  targetFinishTime: "2026-10-01T12:30:00Z"
"#;

    let ro: RolloutOrchestrator =
        serde_yaml::from_str(yaml).expect("Failed to deserialize RolloutOrchestrator");

    assert_eq!(ro.metadata.name.as_deref(), Some("checkout"));
    assert_eq!(ro.spec.rollout_mode, RolloutMode::Maintenance);
    assert_eq!(ro.spec.initial_revisions.len(), 1);
    assert_eq!(ro.spec.target_revisions[0].revision_name(), "checkout-00002");
    assert_eq!(
        ro.spec.target_revisions[0].traffic.latest_revision,
        Some(true)
    );

    let stage = ro.stage_target_revisions();
    assert_eq!(stage.len(), 2);
    assert!(stage[0].is_rev_scaling_down());
    assert!(stage[1].is_rev_scaling_up());
    assert_eq!(stage[1].target_replicas, Some(2));
    assert_eq!(
        ro.spec.stage_target.target_finish_time.as_deref(),
        Some("2026-10-01T12:30:00Z")
    );
}

#[test]
fn test_rollout_mode_defaults_to_normal() {
    let yaml = r#"
apiVersion: serving.rollout.dev/v1
kind: RolloutOrchestrator
metadata:
  name: checkout
spec:
  targetRevisions: []
"#;
    let ro: RolloutOrchestrator = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(ro.spec.rollout_mode, RolloutMode::Normal);
    assert!(ro.stage_target_revisions().is_empty());
}

#[test]
fn test_target_revision_serializes_flat() {
    let rev = TargetRevision {
        traffic: TrafficTarget {
            revision_name: "rev-1".to_string(),
            percent: Some(50),
            ..Default::default()
        },
        target_replicas: Some(3),
        direction: Some(Direction::Up),
        ..Default::default()
    };

    let json = serde_json::to_value(&rev).unwrap();
    assert_eq!(json["revisionName"], "rev-1");
    assert_eq!(json["percent"], 50);
    assert_eq!(json["targetReplicas"], 3);
    assert_eq!(json["direction"], "up");
    assert!(json.get("maxScale").is_none());
}

#[test]
fn test_empty_stage_revision_status_is_serialized() {
    let status = RolloutOrchestratorStatus::default();

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["stageRevisionStatus"], serde_json::json!([]));
}

#[test]
fn test_scale_defaults_applied_at_point_of_use() {
    let rev = TargetRevision::default();
    assert_eq!(rev.min_scale, None);
    assert_eq!(rev.max_scale, None);
    assert_eq!(rev.min_scale_or_default(), 0);
    assert_eq!(rev.max_scale_or_default(), i32::MAX);
}

#[test]
fn test_direction_predicates_without_direction() {
    let rev = TargetRevision::default();
    assert!(!rev.is_rev_scaling_up());
    assert!(!rev.is_rev_scaling_down());
}

#[test]
fn test_fresh_orchestrator_is_in_progress() {
    let ro = RolloutOrchestrator::new("checkout", RolloutOrchestratorSpec::default());
    assert!(ro.is_stage_in_progress());
    assert!(ro.is_in_progress());
    assert!(!ro.is_stage_ready());
    assert!(!ro.is_ready());
}

#[test]
fn test_stage_lifecycle_through_last_stage() {
    let mut ro = RolloutOrchestrator::new("checkout", RolloutOrchestratorSpec::default());
    let status = ro.status_mut();
    status.initialize_conditions(now());
    status.mark_stage_revision_scale_up_ready(now());
    status.mark_stage_revision_scale_down_ready(now());
    status.mark_stage_revision_ready(now());
    status.mark_last_stage_revision_incomplete(now());

    assert!(ro.is_stage_ready());
    assert!(!ro.is_stage_in_progress());
    assert!(ro.is_in_progress());

    ro.status_mut().launch_new_stage(now());
    assert!(ro.is_stage_in_progress());
    let status = ro.status.as_ref().unwrap();
    assert_eq!(
        status.condition(crate::crd::conditions::CONDITION_SCALE_UP_READY),
        ConditionStatus::Unknown
    );

    let status = ro.status_mut();
    status.mark_stage_revision_ready(now());
    status.mark_last_stage_revision_complete(now());
    assert!(ro.is_ready());
    assert!(!ro.is_in_progress());
}

#[test]
fn test_crds_have_expected_names() {
    let ro_crd = RolloutOrchestrator::crd();
    assert_eq!(
        ro_crd.metadata.name.as_deref(),
        Some("rolloutorchestrators.serving.rollout.dev")
    );

    let spa_crd = StagePodAutoscaler::crd();
    assert_eq!(
        spa_crd.metadata.name.as_deref(),
        Some("stagepodautoscalers.serving.rollout.dev")
    );
}

#[test]
fn test_spa_scale_in_ready_requires_both_counts() {
    use crate::crd::autoscaler::{StagePodAutoscalerSpec, StagePodAutoscalerStatus};

    let mut spa = StagePodAutoscaler::new("rev-1", StagePodAutoscalerSpec::default());
    assert!(!spa.is_stage_scale_in_ready());

    spa.status = Some(StagePodAutoscalerStatus {
        desired_scale: Some(3),
        ..Default::default()
    });
    assert!(!spa.is_stage_scale_in_ready());

    spa.status = Some(StagePodAutoscalerStatus {
        desired_scale: Some(3),
        actual_scale: Some(1),
        ..Default::default()
    });
    assert!(spa.is_stage_scale_in_ready());
}
