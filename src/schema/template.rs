use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::condition::ConditionNode;
use super::context::DifficultyTier;

/// An effect value: a fixed number or an inclusive `[min, max]` range that
/// is drawn per generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EffectValue {
    Fixed(f64),
    Range([f64; 2]),
}

/// A choice as authored in a template.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Choice {
    pub text: String,
    #[serde(default)]
    pub effect: BTreeMap<String, EffectValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consequence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<serde_json::Value>,
}

/// `extends` names one parent or several (merged left to right).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Parents {
    One(String),
    Many(Vec<String>),
}

impl Parents {
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::One(id) => vec![id.as_str()],
            Self::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }
}

/// How a composed template is merged into the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    Append,
    Prepend,
    Replace,
    Merge,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        Self::Append
    }
}

/// A conditionally merged template reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionEntry {
    pub template: String,
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
}

/// Keep or drop the choice at `choice_index` depending on its conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalChoice {
    pub choice_index: usize,
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
    #[serde(default = "default_show_when")]
    pub show_when: bool,
}

fn default_show_when() -> bool {
    true
}

/// Which text a dynamic field rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicTarget {
    Title,
    Narrative,
    ChoiceText,
}

/// Condition-dependent substitution of a text field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicField {
    pub field: DynamicTarget,
    /// Required for `choice_text`; indexes the post-merge choice list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_index: Option<usize>,
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
    pub value_if_true: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_if_false: Option<String>,
}

/// The declarative blueprint an event is instantiated from.
///
/// Scalar fields are optional so that children and fragments can leave
/// them to a parent; a resolved template always has a title, narrative and
/// at least one choice.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Template {
    /// Filled from the library key when omitted.
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<DifficultyTier>,
    /// Explicit challenge rating; derived from `difficulty` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<f64>,
    /// Base selection weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,
    /// Fragments are only reachable through composition.
    #[serde(default, rename = "abstract", skip_serializing_if = "is_false")]
    pub is_abstract: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditional_choices: Vec<ConditionalChoice>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dynamic_fields: Vec<DynamicField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<Parents>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixins: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub composition: Vec<CompositionEntry>,
    /// Collections (`choices`, `tags`) this template replaces rather than
    /// concatenates onto its parent's.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replace: Vec<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Template {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// True when the template references no other template.
    pub fn is_flat(&self) -> bool {
        self.extends.is_none() && self.mixins.is_empty() && self.composition.is_empty()
    }

    /// Names of the required fields this template is missing.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title.as_deref().map_or(true, str::is_empty) {
            missing.push("title");
        }
        if self.narrative.as_deref().map_or(true, str::is_empty) {
            missing.push("narrative");
        }
        if self.choices.is_empty() {
            missing.push("choices");
        }
        missing
    }

    /// Every template id this one references.
    pub fn references(&self) -> Vec<&str> {
        let mut refs = self.extends.as_ref().map(Parents::ids).unwrap_or_default();
        refs.extend(self.mixins.iter().map(String::as_str));
        refs.extend(self.composition.iter().map(|c| c.template.as_str()));
        refs
    }
}
