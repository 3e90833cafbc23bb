use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::context::{AnalyzedContext, DifficultyTier};

/// A player-facing choice with concrete numeric effects.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventChoice {
    pub text: String,
    #[serde(default)]
    pub effect: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consequence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<serde_json::Value>,
}

/// One generated unit of narrative content. Never mutated after it is
/// returned; rule application works on copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    pub narrative: String,
    pub choices: Vec<EventChoice>,
    #[serde(rename = "type")]
    pub kind: String,
    pub difficulty: DifficultyTier,
    pub urgency: String,
    pub theme: String,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub context: AnalyzedContext,
}

/// Formats an event id from a generation sequence number.
pub fn generate_event_id(sequence: u64) -> String {
    format!("evt_{:06}", sequence)
}

impl Event {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
