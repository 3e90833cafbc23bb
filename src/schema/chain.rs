use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A choice gate: the chain only moves past this stage when the player's
/// consequence matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerNext {
    pub choice: String,
}

/// One template-backed step of a chain.
///
/// `day` is measured from the chain's start; `delay` is measured from the
/// previous stage's day. When both are absent the stage is due with its
/// predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_next: Option<TriggerNext>,
}

/// An ordered sequence of stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub stages: Vec<Stage>,
}

impl ChainDefinition {
    /// Day offsets (from chain start) at which each stage falls due.
    pub fn stage_days(&self) -> Vec<u32> {
        let mut days = Vec::with_capacity(self.stages.len());
        let mut previous = 0u32;
        for stage in &self.stages {
            let day = match (stage.day, stage.delay) {
                (Some(day), _) => day,
                (None, Some(delay)) => previous.saturating_add(delay),
                (None, None) => previous,
            };
            days.push(day);
            previous = day;
        }
        days
    }
}

/// Progress of one running chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInstance {
    pub id: String,
    pub definition: ChainDefinition,
    pub stage: usize,
    pub start_day: u32,
    pub completed_stages: BTreeSet<usize>,
}

impl ChainInstance {
    pub fn is_finished(&self) -> bool {
        self.stage >= self.definition.stages.len()
    }
}

/// A stage that fired and should be turned into an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTrigger {
    pub instance_id: String,
    pub chain_id: String,
    pub stage_index: usize,
    pub template: String,
    pub day: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_days_mix_absolute_and_delay() {
        let chain: ChainDefinition = serde_json::from_str(
            r#"{
                "id": "plague",
                "stages": [
                    { "template": "rumor" },
                    { "template": "outbreak", "delay": 3 },
                    { "template": "quarantine", "day": 10 },
                    { "template": "aftermath", "delay": 2 }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(chain.stage_days(), vec![0, 3, 10, 12]);
    }

    #[test]
    fn trigger_next_is_camel_case() {
        let stage: Stage = serde_json::from_str(
            r#"{ "template": "duel", "triggerNext": { "choice": "accept" } }"#,
        )
        .unwrap();
        assert_eq!(stage.trigger_next.unwrap().choice, "accept");
    }
}
