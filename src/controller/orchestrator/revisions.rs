//! Helpers over lists of target revisions
//!
//! These are pure and shared by the reconciler and by whatever builds the
//! RolloutOrchestrator for a service.

use crate::crd::{
    RolloutOrchestrator, RolloutOrchestratorSpec, TargetRevision, TrafficTarget,
    SERVICE_LABEL_KEY,
};
use kube::api::ObjectMeta;
use kube::Resource;
use std::collections::BTreeMap;
use thiserror::Error;

pub const MIN_SCALE_ANNOTATION_KEY: &str = "autoscaling.knative.dev/min-scale";
pub const MAX_SCALE_ANNOTATION_KEY: &str = "autoscaling.knative.dev/max-scale";

/// The two revisions moving in the current stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevisionPair<'a> {
    pub up: &'a TargetRevision,
    pub down: &'a TargetRevision,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unable to find the revision to scale up or down in the target revisions {revisions:?}")]
pub struct MissingRevisionPair {
    pub revisions: Vec<String>,
}

/// Pick the revision scaling up and the one scaling down
///
/// When several revisions carry the same direction the last one wins.
pub fn retrieve_revs_up_down(
    revisions: &[TargetRevision],
) -> Result<RevisionPair<'_>, MissingRevisionPair> {
    let up = revisions.iter().rev().find(|r| r.is_rev_scaling_up());
    let down = revisions.iter().rev().find(|r| r.is_rev_scaling_down());

    match (up, down) {
        (Some(up), Some(down)) => Ok(RevisionPair { up, down }),
        _ => Err(MissingRevisionPair {
            revisions: revisions
                .iter()
                .map(|r| r.revision_name().to_string())
                .collect(),
        }),
    }
}

/// Drop revisions that carry no traffic (percent unset or zero)
pub fn remove_non_traffic_rev(revisions: &[TargetRevision]) -> Vec<TargetRevision> {
    revisions
        .iter()
        .filter(|r| r.percent().is_some_and(|p| p != 0))
        .cloned()
        .collect()
}

/// The achieved stage matches the final targets
///
/// Either the two lists are equal, or the final target is a single revision
/// at 100% that the achieved stage already routes 100% to.
pub fn last_stage_complete(
    stage_revision_status: &[TargetRevision],
    final_target_revisions: &[TargetRevision],
) -> bool {
    stage_revision_status == final_target_revisions
        || single_full_revision_reached(stage_revision_status, final_target_revisions)
}

fn single_full_revision_reached(current: &[TargetRevision], targets: &[TargetRevision]) -> bool {
    let Some(first) = targets.first() else {
        return false;
    };
    if first.percent() != Some(100) {
        return false;
    }
    current
        .iter()
        .any(|r| r.percent() == Some(100) && r.revision_name() == first.revision_name())
}

/// Merge duplicate revision entries from a route's traffic list
///
/// Percents are summed per revision name. Revisions not marked latest come
/// first ordered by name, then the latest revision.
pub fn consolidate_traffic(traffic: Vec<TrafficTarget>) -> Vec<TrafficTarget> {
    let mut merged: BTreeMap<String, TrafficTarget> = BTreeMap::new();

    for entry in traffic {
        match merged.get_mut(&entry.revision_name) {
            Some(existing) => {
                if entry.percent.is_some() || existing.percent.is_some() {
                    existing.percent =
                        Some(existing.percent.unwrap_or(0) + entry.percent.unwrap_or(0));
                }
                if entry.latest_revision == Some(true) {
                    existing.latest_revision = Some(true);
                }
                if existing.tag.is_none() {
                    existing.tag = entry.tag;
                }
            }
            None => {
                merged.insert(entry.revision_name.clone(), entry);
            }
        }
    }

    let (latest, mut result): (Vec<_>, Vec<_>) = merged
        .into_values()
        .partition(|t| t.latest_revision == Some(true));
    result.extend(latest);
    result
}

/// Parse an integer scale annotation; missing or malformed values are None
pub fn read_scale_annotation(annotations: &BTreeMap<String, String>, key: &str) -> Option<i32> {
    annotations.get(key).and_then(|v| v.trim().parse::<i32>().ok())
}

/// Build the RolloutOrchestrator for a service
///
/// Named and namespaced after the service, labelled with the service name and
/// controlled by it. Returns None when the service has no name or uid yet.
pub fn new_rollout_orchestrator<K>(
    service: &K,
    initial_revisions: Vec<TargetRevision>,
    target_revisions: Vec<TargetRevision>,
) -> Option<RolloutOrchestrator>
where
    K: Resource<DynamicType = ()>,
{
    let owner = service.controller_owner_ref(&())?;
    let name = service.meta().name.clone()?;

    let labels = BTreeMap::from([(SERVICE_LABEL_KEY.to_string(), name.clone())]);

    Some(RolloutOrchestrator {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: service.meta().namespace.clone(),
            labels: Some(labels),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: RolloutOrchestratorSpec {
            initial_revisions,
            target_revisions,
            ..Default::default()
        },
        status: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::Direction;
    use k8s_openapi::api::core::v1::Service;

    fn rev(name: &str, percent: Option<i64>, direction: Option<Direction>) -> TargetRevision {
        TargetRevision {
            traffic: TrafficTarget {
                revision_name: name.to_string(),
                percent,
                ..Default::default()
            },
            direction,
            ..Default::default()
        }
    }

    fn traffic(name: &str, percent: i64, latest: bool) -> TrafficTarget {
        TrafficTarget {
            revision_name: name.to_string(),
            percent: Some(percent),
            latest_revision: Some(latest),
            tag: None,
        }
    }

    #[test]
    fn test_retrieve_revs_up_down() {
        let revisions = vec![
            rev("rev-1", Some(80), Some(Direction::Down)),
            rev("rev-2", Some(20), Some(Direction::Up)),
        ];
        let pair = retrieve_revs_up_down(&revisions).unwrap();
        assert_eq!(pair.up.revision_name(), "rev-2");
        assert_eq!(pair.down.revision_name(), "rev-1");
    }

    #[test]
    fn test_retrieve_revs_last_match_wins() {
        let revisions = vec![
            rev("rev-1", Some(50), Some(Direction::Down)),
            rev("rev-2", Some(20), Some(Direction::Down)),
            rev("rev-3", Some(30), Some(Direction::Up)),
        ];
        let pair = retrieve_revs_up_down(&revisions).unwrap();
        assert_eq!(pair.down.revision_name(), "rev-2");
    }

    #[test]
    fn test_retrieve_revs_missing_direction_is_error() {
        let revisions = vec![
            rev("rev-1", Some(100), Some(Direction::Up)),
            rev("rev-2", Some(0), None),
        ];
        let err = retrieve_revs_up_down(&revisions).unwrap_err();
        assert_eq!(err.revisions, vec!["rev-1", "rev-2"]);
        assert!(err.to_string().contains("unable to find the revision"));

        assert!(retrieve_revs_up_down(&[]).is_err());
    }

    #[test]
    fn test_remove_non_traffic_rev() {
        let revisions = vec![
            rev("rev-1", Some(0), Some(Direction::Down)),
            rev("rev-2", None, None),
            rev("rev-3", Some(100), Some(Direction::Up)),
        ];
        let cleaned = remove_non_traffic_rev(&revisions);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].revision_name(), "rev-3");
    }

    #[test]
    fn test_last_stage_complete_on_equal_lists() {
        let targets = vec![rev("rev-2", Some(100), None)];
        assert!(last_stage_complete(&targets, &targets));
        assert!(last_stage_complete(&[], &[]));
    }

    #[test]
    fn test_last_stage_complete_on_single_full_revision() {
        let targets = vec![rev("rev-2", Some(100), None)];
        let status = vec![rev("rev-2", Some(100), Some(Direction::Up))];
        assert!(last_stage_complete(&status, &targets));
    }

    #[test]
    fn test_last_stage_incomplete() {
        let targets = vec![rev("rev-2", Some(100), None)];
        let status = vec![
            rev("rev-1", Some(60), Some(Direction::Down)),
            rev("rev-2", Some(40), Some(Direction::Up)),
        ];
        assert!(!last_stage_complete(&status, &targets));

        let split_targets = vec![rev("rev-1", Some(50), None), rev("rev-2", Some(50), None)];
        assert!(!last_stage_complete(&status, &split_targets));
        assert!(!last_stage_complete(&status, &[]));
    }

    #[test]
    fn test_consolidate_traffic_merges_duplicates() {
        let input = vec![
            traffic("rev-0003", 10, true),
            traffic("rev-0001", 40, false),
            traffic("rev-0001", 30, false),
            traffic("rev-0003", 10, false),
            traffic("rev-0002", 10, false),
        ];
        let expected = vec![
            traffic("rev-0001", 70, false),
            traffic("rev-0002", 10, false),
            traffic("rev-0003", 20, true),
        ];
        assert_eq!(consolidate_traffic(input), expected);
    }

    #[test]
    fn test_consolidate_traffic_latest_flag_on_later_entry() {
        let input = vec![
            traffic("predictor-00001", 50, false),
            traffic("predictor-00002", 25, false),
            traffic("predictor-00002", 25, true),
        ];
        let expected = vec![
            traffic("predictor-00001", 50, false),
            traffic("predictor-00002", 50, true),
        ];
        assert_eq!(consolidate_traffic(input), expected);
    }

    #[test]
    fn test_consolidate_traffic_orders_without_duplicates() {
        let input = vec![
            traffic("rev-0003", 10, true),
            traffic("rev-0001", 70, false),
            traffic("rev-0002", 20, false),
        ];
        let names: Vec<_> = consolidate_traffic(input)
            .into_iter()
            .map(|t| t.revision_name)
            .collect();
        assert_eq!(names, vec!["rev-0001", "rev-0002", "rev-0003"]);
    }

    #[test]
    fn test_consolidate_traffic_empty() {
        assert!(consolidate_traffic(vec![]).is_empty());
    }

    #[test]
    fn test_read_scale_annotation() {
        let annotations: BTreeMap<String, String> = [
            (MIN_SCALE_ANNOTATION_KEY.to_string(), "10".to_string()),
            (MAX_SCALE_ANNOTATION_KEY.to_string(), "12-invalid".to_string()),
        ]
        .into_iter()
        .collect();

        assert_eq!(read_scale_annotation(&annotations, MIN_SCALE_ANNOTATION_KEY), Some(10));
        assert_eq!(read_scale_annotation(&annotations, MAX_SCALE_ANNOTATION_KEY), None);
        assert_eq!(read_scale_annotation(&BTreeMap::new(), MIN_SCALE_ANNOTATION_KEY), None);
    }

    #[test]
    fn test_new_rollout_orchestrator_owned_by_service() {
        let service = Service {
            metadata: ObjectMeta {
                name: Some("checkout".to_string()),
                namespace: Some("shop".to_string()),
                uid: Some("1234".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let targets = vec![rev("checkout-00002", Some(100), None)];

        let ro = new_rollout_orchestrator(&service, vec![], targets.clone()).unwrap();

        assert_eq!(ro.metadata.name.as_deref(), Some("checkout"));
        assert_eq!(ro.metadata.namespace.as_deref(), Some("shop"));
        assert_eq!(
            ro.metadata
                .labels
                .as_ref()
                .and_then(|l| l.get(SERVICE_LABEL_KEY))
                .map(String::as_str),
            Some("checkout")
        );
        let owner = &ro.metadata.owner_references.as_ref().unwrap()[0];
        assert_eq!(owner.uid, "1234");
        assert_eq!(owner.kind, "Service");
        assert_eq!(owner.controller, Some(true));
        assert_eq!(ro.spec.target_revisions, targets);
        assert!(ro.stage_target_revisions().is_empty());
    }

    #[test]
    fn test_new_rollout_orchestrator_requires_uid() {
        let service = Service {
            metadata: ObjectMeta {
                name: Some("checkout".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(new_rollout_orchestrator(&service, vec![], vec![]).is_none());
    }
}
