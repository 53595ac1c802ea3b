//! Status conditions for RolloutOrchestrator
//!
//! A "living" condition set: `Ready` is never written directly, it is derived
//! from its dependents (`StageReady` and `LastStageReady`) every time one of
//! them changes.
//!
//! | Type                          | Meaning                                         |
//! |-------------------------------|-------------------------------------------------|
//! | `Ready`                       | The final target revisions have been reached    |
//! | `StageReady`                  | The current stage has been achieved             |
//! | `LastStageReady`              | The achieved stage is the final one             |
//! | `StageRevisionScaleUpReady`   | The revision gaining traffic has scaled up      |
//! | `StageRevisionScaleDownReady` | The revision losing traffic has scaled down     |

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_STAGE_READY: &str = "StageReady";
pub const CONDITION_LAST_STAGE_READY: &str = "LastStageReady";
pub const CONDITION_SCALE_UP_READY: &str = "StageRevisionScaleUpReady";
pub const CONDITION_SCALE_DOWN_READY: &str = "StageRevisionScaleDownReady";

/// Conditions that `Ready` is derived from.
const READY_DEPENDENTS: [&str; 2] = [CONDITION_STAGE_READY, CONDITION_LAST_STAGE_READY];

/// Every condition the orchestrator manages, initialized to Unknown.
const MANAGED_CONDITIONS: [&str; 5] = [
    CONDITION_READY,
    CONDITION_STAGE_READY,
    CONDITION_LAST_STAGE_READY,
    CONDITION_SCALE_UP_READY,
    CONDITION_SCALE_DOWN_READY,
];

pub const REASON_STAGE_IN_PROGRESS: &str = "StageInProgress";
pub const REASON_LAST_STAGE_INCOMPLETE: &str = "LastStageIncomplete";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: ConditionStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// RFC3339 timestamp of the last status change
    #[serde(rename = "lastTransitionTime", skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Read and write access to a list of conditions
///
/// Writers only touch `lastTransitionTime` when the status value flips, so
/// re-marking a condition with the same value leaves the list byte-identical.
#[derive(Debug)]
pub struct ConditionManager<'a> {
    conditions: &'a mut Vec<Condition>,
    now: DateTime<Utc>,
}

impl<'a> ConditionManager<'a> {
    pub fn new(conditions: &'a mut Vec<Condition>, now: DateTime<Utc>) -> Self {
        Self { conditions, now }
    }

    /// Add every managed condition that is still missing, as Unknown.
    pub fn initialize(&mut self) {
        for type_ in MANAGED_CONDITIONS {
            if get_condition(self.conditions.as_slice(), type_).is_none() {
                self.set(type_, ConditionStatus::Unknown, None, None);
            }
        }
    }

    pub fn mark_true(&mut self, type_: &str) {
        self.set(type_, ConditionStatus::True, None, None);
        self.recompute_ready();
    }

    pub fn mark_unknown(&mut self, type_: &str, reason: &str, message: &str) {
        self.set(
            type_,
            ConditionStatus::Unknown,
            Some(reason.to_string()),
            Some(message.to_string()),
        );
        self.recompute_ready();
    }

    pub fn mark_false(&mut self, type_: &str, reason: &str, message: &str) {
        self.set(
            type_,
            ConditionStatus::False,
            Some(reason.to_string()),
            Some(message.to_string()),
        );
        self.recompute_ready();
    }

    fn set(
        &mut self,
        type_: &str,
        status: ConditionStatus,
        reason: Option<String>,
        message: Option<String>,
    ) {
        match self.conditions.iter_mut().find(|c| c.type_ == type_) {
            Some(existing) => {
                if existing.status != status {
                    existing.last_transition_time = Some(self.now.to_rfc3339());
                }
                existing.status = status;
                existing.reason = reason;
                existing.message = message;
            }
            None => self.conditions.push(Condition {
                type_: type_.to_string(),
                status,
                reason,
                message,
                last_transition_time: Some(self.now.to_rfc3339()),
            }),
        }
    }

    fn recompute_ready(&mut self) {
        let dependents: Vec<(ConditionStatus, Option<String>, Option<String>)> = READY_DEPENDENTS
            .iter()
            .map(|type_| match get_condition(self.conditions.as_slice(), type_) {
                Some(c) => (c.status, c.reason.clone(), c.message.clone()),
                None => (ConditionStatus::Unknown, None, None),
            })
            .collect();

        if let Some((_, reason, message)) = dependents
            .iter()
            .find(|(status, _, _)| *status == ConditionStatus::False)
        {
            let (reason, message) = (reason.clone(), message.clone());
            self.set(CONDITION_READY, ConditionStatus::False, reason, message);
        } else if dependents
            .iter()
            .all(|(status, _, _)| *status == ConditionStatus::True)
        {
            self.set(CONDITION_READY, ConditionStatus::True, None, None);
        } else {
            self.set(CONDITION_READY, ConditionStatus::Unknown, None, None);
        }
    }
}

pub fn get_condition<'c>(conditions: &'c [Condition], type_: &str) -> Option<&'c Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Status of a condition; a missing condition reads as Unknown.
pub fn condition_status(conditions: &[Condition], type_: &str) -> ConditionStatus {
    get_condition(conditions, type_)
        .map(|c| c.status)
        .unwrap_or(ConditionStatus::Unknown)
}
