use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::context::DifficultyTier;
use super::event::EventChoice;

/// A node in a condition tree.
///
/// Serialized as a JSON object tagged by `type`: the combinators `and`,
/// `or` (with `conditions`) and `not` (with `condition`), or any other
/// `type` as a leaf predicate whose remaining fields are its parameters.
/// Leaf kinds are not closed: interpreters dispatch them through a
/// handler registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawNode", into = "RawNode")]
pub enum ConditionNode {
    And(Vec<ConditionNode>),
    Or(Vec<ConditionNode>),
    Not(Box<ConditionNode>),
    Leaf(Predicate),
}

/// A leaf predicate: a kind plus free-form parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub kind: String,
    pub params: Params,
}

/// Parameters of a leaf predicate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(pub Map<String, Value>);

impl Params {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// First string found under any of `keys`.
    pub fn text_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.text(k))
    }

    /// First number found under any of `keys`.
    pub fn number_any(&self, keys: &[&str]) -> Option<f64> {
        keys.iter().find_map(|k| self.number(k))
    }
}

impl ConditionNode {
    /// Build a leaf from a kind and a JSON object of parameters.
    pub fn leaf(kind: &str, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::Leaf(Predicate {
            kind: kind.to_string(),
            params: Params(params),
        })
    }

    pub fn and(nodes: Vec<ConditionNode>) -> Self {
        Self::And(nodes)
    }

    pub fn or(nodes: Vec<ConditionNode>) -> Self {
        Self::Or(nodes)
    }

    pub fn not(node: ConditionNode) -> Self {
        Self::Not(Box::new(node))
    }
}

#[derive(Serialize, Deserialize)]
struct RawNode {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    conditions: Vec<ConditionNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition: Option<Box<ConditionNode>>,
    #[serde(flatten)]
    params: Map<String, Value>,
}

impl From<RawNode> for ConditionNode {
    fn from(raw: RawNode) -> Self {
        match raw.kind.as_str() {
            "and" => Self::And(raw.conditions),
            "or" => Self::Or(raw.conditions),
            // `not` accepts either a single `condition` or a list, which is
            // negated as a conjunction.
            "not" => match raw.condition {
                Some(inner) => Self::Not(inner),
                None => Self::Not(Box::new(Self::And(raw.conditions))),
            },
            _ => {
                let mut params = raw.params;
                if !raw.conditions.is_empty() {
                    if let Ok(v) = serde_json::to_value(&raw.conditions) {
                        params.insert("conditions".to_string(), v);
                    }
                }
                Self::Leaf(Predicate {
                    kind: raw.kind,
                    params: Params(params),
                })
            }
        }
    }
}

impl From<ConditionNode> for RawNode {
    fn from(node: ConditionNode) -> Self {
        match node {
            ConditionNode::And(conditions) => RawNode {
                kind: "and".to_string(),
                conditions,
                condition: None,
                params: Map::new(),
            },
            ConditionNode::Or(conditions) => RawNode {
                kind: "or".to_string(),
                conditions,
                condition: None,
                params: Map::new(),
            },
            ConditionNode::Not(inner) => RawNode {
                kind: "not".to_string(),
                conditions: Vec::new(),
                condition: Some(inner),
                params: Map::new(),
            },
            ConditionNode::Leaf(predicate) => RawNode {
                kind: predicate.kind,
                conditions: Vec::new(),
                condition: None,
                params: predicate.params.0,
            },
        }
    }
}

/// A condition → effect pair applied to generated events.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Rule {
    /// All conditions must hold (implicit conjunction).
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
    #[serde(default)]
    pub effects: EffectSpec,
    /// Stored for callers that pre-sort; application order is registration
    /// order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

/// The mutation DSL applied by rules.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modify_choices: Option<ChoiceModifier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_choices: Vec<EventChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modify_title: Option<TextModifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modify_narrative: Option<TextModifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_difficulty: Option<DifficultyTier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_tags: Vec<String>,
}

/// Numeric adjustments to every choice's effect map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChoiceModifier {
    /// Only applied to keys already present on a choice.
    #[serde(default)]
    pub multiply: BTreeMap<String, f64>,
    /// May introduce keys.
    #[serde(default)]
    pub add: BTreeMap<String, f64>,
    /// Overwrites (or introduces) keys after `multiply` and `add`.
    #[serde(default)]
    pub set: BTreeMap<String, f64>,
}

/// Title/narrative rewrite: `replace`, then `append`, then `prepend`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextModifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<Replacement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepend: Option<String>,
}

/// Literal or regex substitution of every match of `from` with `to`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Replacement {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub regex: bool,
}
