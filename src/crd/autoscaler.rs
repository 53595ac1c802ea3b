use super::conditions::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// StagePodAutoscaler carries the replica bounds the autoscaler must honor
/// for one revision during the current rollout stage
///
/// Named after the revision it bounds and owned by the RolloutOrchestrator
/// that created it. The spec is written by this controller; the status is
/// written by the autoscaler and is read-only here.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[kube(
    group = "serving.rollout.dev",
    version = "v1",
    kind = "StagePodAutoscaler",
    shortname = "spa",
    namespaced,
    status = "StagePodAutoscalerStatus",
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name":"StageMin", "type":"integer", "jsonPath":".spec.stageMinScale"}"#,
    printcolumn = r#"{"name":"StageMax", "type":"integer", "jsonPath":".spec.stageMaxScale"}"#,
    printcolumn = r#"{"name":"Desired", "type":"integer", "jsonPath":".status.desiredScale"}"#,
    printcolumn = r#"{"name":"Actual", "type":"integer", "jsonPath":".status.actualScale"}"#,
    printcolumn = r#"{"name":"Terminating", "type":"integer", "jsonPath":".status.replicasTerminating"}"#
)]
pub struct StagePodAutoscalerSpec {
    #[serde(rename = "stageMinScale", skip_serializing_if = "Option::is_none")]
    pub stage_min_scale: Option<i32>,

    #[serde(rename = "stageMaxScale", skip_serializing_if = "Option::is_none")]
    pub stage_max_scale: Option<i32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct StagePodAutoscalerStatus {
    /// Replica count the autoscaler wants
    #[serde(rename = "desiredScale", skip_serializing_if = "Option::is_none")]
    pub desired_scale: Option<i32>,

    /// Replica count currently running
    #[serde(rename = "actualScale", skip_serializing_if = "Option::is_none")]
    pub actual_scale: Option<i32>,

    /// Pods of this revision still terminating
    #[serde(rename = "replicasTerminating", skip_serializing_if = "Option::is_none")]
    pub replicas_terminating: Option<i32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl StagePodAutoscaler {
    fn observed(&self) -> (Option<i32>, Option<i32>) {
        match &self.status {
            Some(status) => (status.desired_scale, status.actual_scale),
            None => (None, None),
        }
    }

    /// Both the desired and the actual scale have been reported
    pub fn is_stage_scale_in_ready(&self) -> bool {
        matches!(self.observed(), (Some(_), Some(_)))
    }

    pub fn desired_scale(&self) -> Option<i32> {
        self.observed().0
    }

    pub fn actual_scale(&self) -> Option<i32> {
        self.observed().1
    }

    pub fn replicas_terminating(&self) -> Option<i32> {
        self.status.as_ref().and_then(|s| s.replicas_terminating)
    }

    /// Both stage bounds are pinned to zero (maintenance mode's first stage)
    pub fn is_pinned_to_zero(&self) -> bool {
        self.spec.stage_min_scale == Some(0) && self.spec.stage_max_scale == Some(0)
    }
}
