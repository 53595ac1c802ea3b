use super::conditions::{
    condition_status, Condition, ConditionManager, ConditionStatus, CONDITION_LAST_STAGE_READY,
    CONDITION_READY, CONDITION_SCALE_DOWN_READY, CONDITION_SCALE_UP_READY, CONDITION_STAGE_READY,
    REASON_LAST_STAGE_INCOMPLETE, REASON_STAGE_IN_PROGRESS,
};
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// RolloutOrchestrator drives the staged migration of traffic and capacity
/// from the revisions in `initialRevisions` to those in `targetRevisions`
///
/// One exists per managed service. The current stage is described by
/// `stageTargetRevisions`; the last stage actually achieved is recorded in
/// `status.stageRevisionStatus`.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "serving.rollout.dev",
    version = "v1",
    kind = "RolloutOrchestrator",
    shortname = "ro",
    namespaced,
    status = "RolloutOrchestratorStatus",
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Mode", "type":"string", "jsonPath":".spec.rolloutMode"}"#,
    printcolumn = r#"{"name":"StageReady", "type":"string", "jsonPath":".status.conditions[?(@.type==\"StageReady\")].status"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct RolloutOrchestratorSpec {
    /// Final desired revisions, summing to 100% of the traffic
    #[serde(rename = "targetRevisions", default)]
    pub target_revisions: Vec<TargetRevision>,

    /// Revisions serving traffic before the rollout began (empty on first rollout)
    #[serde(rename = "initialRevisions", default)]
    pub initial_revisions: Vec<TargetRevision>,

    #[serde(flatten)]
    pub stage_target: StageTarget,

    #[serde(rename = "rolloutMode", default)]
    pub rollout_mode: RolloutMode,
}

/// The target of the stage currently in flight
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct StageTarget {
    /// Revisions for the current stage; empty when no stage is active
    #[serde(
        rename = "stageTargetRevisions",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub stage_target_revisions: Vec<TargetRevision>,

    /// Deadline hint for the current stage (RFC3339)
    #[serde(rename = "targetFinishTime", skip_serializing_if = "Option::is_none")]
    pub target_finish_time: Option<String>,
}

/// Ordering of the scale-up and scale-down phases within a stage
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RolloutMode {
    /// Grow the new revision first, then shrink the old one
    #[default]
    Normal,
    /// Shrink the old revision first, for clusters without spare capacity
    Maintenance,
}

impl RolloutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RolloutMode::Normal => "normal",
            RolloutMode::Maintenance => "maintenance",
        }
    }
}

/// Traffic share assigned to one revision
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct TrafficTarget {
    #[serde(rename = "revisionName", default)]
    pub revision_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<i64>,

    #[serde(rename = "latestRevision", skip_serializing_if = "Option::is_none")]
    pub latest_revision: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Direction a revision is moving in during the current stage
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// A revision with its traffic share and the replica sizing for a stage
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct TargetRevision {
    #[serde(flatten)]
    pub traffic: TrafficTarget,

    /// Replica estimate for this stage; None sizes by min/max alone
    #[serde(rename = "targetReplicas", skip_serializing_if = "Option::is_none")]
    pub target_replicas: Option<i32>,

    /// Final minimum scale from the service; None means zero
    #[serde(rename = "minScale", skip_serializing_if = "Option::is_none")]
    pub min_scale: Option<i32>,

    /// Final maximum scale from the service; None means unbounded
    #[serde(rename = "maxScale", skip_serializing_if = "Option::is_none")]
    pub max_scale: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

impl TargetRevision {
    pub fn revision_name(&self) -> &str {
        &self.traffic.revision_name
    }

    pub fn percent(&self) -> Option<i64> {
        self.traffic.percent
    }

    pub fn is_rev_scaling_up(&self) -> bool {
        self.direction == Some(Direction::Up)
    }

    pub fn is_rev_scaling_down(&self) -> bool {
        self.direction == Some(Direction::Down)
    }

    /// Final minimum scale with the unset case read as zero
    pub fn min_scale_or_default(&self) -> i32 {
        self.min_scale.unwrap_or(0)
    }

    /// Final maximum scale with the unset case read as unbounded
    pub fn max_scale_or_default(&self) -> i32 {
        self.max_scale.unwrap_or(i32::MAX)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct RolloutOrchestratorStatus {
    /// The last stage that was fully achieved (revisions with non-zero traffic)
    ///
    /// Always serialized: a merge patch has to be able to clear it.
    #[serde(rename = "stageRevisionStatus", default)]
    pub stage_revision_status: Vec<TargetRevision>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(rename = "observedGeneration", skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl RolloutOrchestratorStatus {
    fn manager(&mut self, now: DateTime<Utc>) -> ConditionManager<'_> {
        ConditionManager::new(&mut self.conditions, now)
    }

    pub fn initialize_conditions(&mut self, now: DateTime<Utc>) {
        self.manager(now).initialize();
    }

    pub fn set_stage_revision_status(&mut self, revisions: Vec<TargetRevision>) {
        self.stage_revision_status = revisions;
    }

    pub fn mark_stage_revision_scale_up_ready(&mut self, now: DateTime<Utc>) {
        self.manager(now).mark_true(CONDITION_SCALE_UP_READY);
    }

    pub fn mark_stage_revision_scale_down_ready(&mut self, now: DateTime<Utc>) {
        self.manager(now).mark_true(CONDITION_SCALE_DOWN_READY);
    }

    pub fn mark_stage_revision_ready(&mut self, now: DateTime<Utc>) {
        self.manager(now).mark_true(CONDITION_STAGE_READY);
    }

    pub fn mark_last_stage_revision_complete(&mut self, now: DateTime<Utc>) {
        self.manager(now).mark_true(CONDITION_LAST_STAGE_READY);
    }

    pub fn mark_last_stage_revision_incomplete(&mut self, now: DateTime<Utc>) {
        self.manager(now).mark_unknown(
            CONDITION_LAST_STAGE_READY,
            REASON_LAST_STAGE_INCOMPLETE,
            "Waiting for the next stage of the rollout",
        );
    }

    /// Reopen the per-stage conditions so the next stage is treated as in progress.
    pub fn launch_new_stage(&mut self, now: DateTime<Utc>) {
        let mut manager = self.manager(now);
        manager.mark_unknown(
            CONDITION_STAGE_READY,
            REASON_STAGE_IN_PROGRESS,
            "Rolling out the next stage",
        );
        manager.mark_unknown(
            CONDITION_SCALE_UP_READY,
            REASON_STAGE_IN_PROGRESS,
            "Scaling up the revision gaining traffic",
        );
        manager.mark_unknown(
            CONDITION_SCALE_DOWN_READY,
            REASON_STAGE_IN_PROGRESS,
            "Scaling down the revision losing traffic",
        );
    }

    pub fn condition(&self, type_: &str) -> ConditionStatus {
        condition_status(&self.conditions, type_)
    }
}

impl RolloutOrchestrator {
    fn condition(&self, type_: &str) -> ConditionStatus {
        self.status
            .as_ref()
            .map(|s| s.condition(type_))
            .unwrap_or(ConditionStatus::Unknown)
    }

    /// The current stage has not been achieved yet
    pub fn is_stage_in_progress(&self) -> bool {
        self.condition(CONDITION_STAGE_READY) == ConditionStatus::Unknown
    }

    pub fn is_stage_ready(&self) -> bool {
        self.condition(CONDITION_STAGE_READY) == ConditionStatus::True
    }

    /// The rollout as a whole has not reached its final targets
    pub fn is_in_progress(&self) -> bool {
        self.condition(CONDITION_READY) == ConditionStatus::Unknown
    }

    pub fn is_ready(&self) -> bool {
        self.condition(CONDITION_READY) == ConditionStatus::True
    }

    pub fn stage_target_revisions(&self) -> &[TargetRevision] {
        &self.spec.stage_target.stage_target_revisions
    }

    /// Mutable status, created empty if the object has none yet
    pub fn status_mut(&mut self) -> &mut RolloutOrchestratorStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
