//! Prerequisite trees gating which events may appear.
//!
//! Dependencies share the condition tree shape (`and`/`or`/`not` over
//! leaves) but their leaves test progress rather than the context:
//! completed events, player stats, relationships and inventory.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::core::relationships::RelationshipNetwork;
use crate::schema::condition::{ConditionNode, Params};
use crate::schema::context::Context;

/// What dependency leaves are checked against.
#[derive(Debug, Clone, Default)]
pub struct GameState<'a> {
    pub completed_events: BTreeSet<String>,
    /// Stats and inventory, read the same way as a generation context.
    pub player: Context,
    pub relationships: Option<&'a RelationshipNetwork>,
}

impl<'a> GameState<'a> {
    pub fn new(player: Context) -> Self {
        Self {
            player,
            ..Self::default()
        }
    }

    pub fn with_completed<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.completed_events.extend(events.into_iter().map(Into::into));
        self
    }

    pub fn with_relationships(mut self, network: &'a RelationshipNetwork) -> Self {
        self.relationships = Some(network);
        self
    }
}

/// Evaluate a dependency tree. Pure; unknown leaf kinds are false.
pub fn check(node: &ConditionNode, state: &GameState) -> bool {
    match node {
        ConditionNode::And(children) => children.iter().all(|c| check(c, state)),
        ConditionNode::Or(children) => children.iter().any(|c| check(c, state)),
        ConditionNode::Not(inner) => !check(inner, state),
        ConditionNode::Leaf(predicate) => {
            let p = &predicate.params;
            match predicate.kind.as_str() {
                "event_completed" => p
                    .text_any(&["event", "event_id", "id"])
                    .is_some_and(|id| state.completed_events.contains(id)),
                "stat_requirement" => p
                    .text("stat")
                    .and_then(|stat| state.player.stat(stat))
                    .is_some_and(|value| within(value, p)),
                "relationship_requirement" => {
                    let Some(to) = p.text_any(&["to", "target", "npc"]) else {
                        return false;
                    };
                    let from = p.text("from").unwrap_or("player");
                    // An edge that was never recorded fails rather than reading as 0.
                    state
                        .relationships
                        .and_then(|network| network.relationship(from, to))
                        .is_some_and(|rel| within(f64::from(rel.strength), p))
                }
                "item_requirement" => p
                    .text("item")
                    .is_some_and(|item| state.player.has_item(item)),
                other => {
                    tracing::warn!(kind = other, "unknown dependency type, evaluating to false");
                    false
                }
            }
        }
    }
}

fn within(value: f64, params: &Params) -> bool {
    let min = params.number("min").unwrap_or(f64::NEG_INFINITY);
    let max = params.number("max").unwrap_or(f64::INFINITY);
    value >= min && value <= max
}

/// Registered prerequisites, keyed by the event (template) id they gate.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependencies: BTreeMap<String, ConditionNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_dependency(&mut self, event_id: &str, node: ConditionNode) {
        self.dependencies.insert(event_id.to_string(), node);
    }

    /// Register from the JSON tree form.
    pub fn register_dependency_json(&mut self, event_id: &str, node: Value) -> Result<(), serde_json::Error> {
        let node: ConditionNode = serde_json::from_value(node)?;
        self.register_dependency(event_id, node);
        Ok(())
    }

    pub fn dependency(&self, event_id: &str) -> Option<&ConditionNode> {
        self.dependencies.get(event_id)
    }

    /// Events without a registered dependency are always available.
    pub fn is_available(&self, event_id: &str, state: &GameState) -> bool {
        self.dependencies
            .get(event_id)
            .map_or(true, |node| check(node, state))
    }

    /// Ids of every registered event whose prerequisites hold.
    pub fn available_events(&self, state: &GameState) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|(_, node)| check(node, state))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: Value) -> ConditionNode {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn completion_and_stats() {
        let dep = node(json!({
            "type": "and",
            "conditions": [
                { "type": "event_completed", "event": "prologue" },
                { "type": "stat_requirement", "stat": "level", "min": 5, "max": 10 }
            ]
        }));
        let state = GameState::new(Context::new().with("level", 5)).with_completed(["prologue"]);
        assert!(check(&dep, &state));

        let too_high = GameState::new(Context::new().with("level", 11)).with_completed(["prologue"]);
        assert!(!check(&dep, &too_high));

        let not_done = GameState::new(Context::new().with("level", 7));
        assert!(!check(&dep, &not_done));
    }

    #[test]
    fn relationships_and_items() {
        let mut network = RelationshipNetwork::new();
        network.update_relationship("player", "elder", 40, "helped");

        let dep = node(json!({
            "type": "or",
            "conditions": [
                { "type": "relationship_requirement", "to": "elder", "min": 30 },
                { "type": "item_requirement", "item": "seal" }
            ]
        }));

        let state = GameState::new(Context::new()).with_relationships(&network);
        assert!(check(&dep, &state));

        // No network: the relationship branch fails, the item branch decides.
        let with_seal = GameState::new(Context::new().with("inventory", json!(["seal"])));
        assert!(check(&dep, &with_seal));
        assert!(!check(&dep, &GameState::default()));
    }

    #[test]
    fn unknown_relationship_targets_fail() {
        let mut network = RelationshipNetwork::new();
        network.update_relationship("player", "elder", -5, "snubbed");
        let at_most_ten = |to: &str| node(json!({ "type": "relationship_requirement", "to": to, "max": 10 }));

        assert!(!check(&at_most_ten("nobody_known"), &GameState::default()));
        let state = GameState::default().with_relationships(&network);
        assert!(!check(&at_most_ten("nobody_known"), &state));
        assert!(check(&at_most_ten("elder"), &state));

        let reversed = node(json!({ "type": "relationship_requirement", "from": "elder", "to": "player", "max": 10 }));
        assert!(!check(&reversed, &state));
    }

    #[test]
    fn not_and_unknown_kinds() {
        let dep = node(json!({ "type": "not", "condition": { "type": "event_completed", "event": "war" } }));
        assert!(check(&dep, &GameState::default()));
        assert!(!check(&dep, &GameState::default().with_completed(["war"])));

        let unknown = node(json!({ "type": "moon_phase", "phase": "full" }));
        assert!(!check(&unknown, &GameState::default()));
    }

    #[test]
    fn registry_availability() {
        let mut graph = DependencyGraph::new();
        graph
            .register_dependency_json("sequel", json!({ "type": "event_completed", "event": "opening" }))
            .unwrap();
        graph
            .register_dependency_json("finale", json!({ "type": "event_completed", "event": "sequel" }))
            .unwrap();

        let state = GameState::default().with_completed(["opening"]);
        assert!(graph.is_available("unregistered", &state));
        assert!(graph.is_available("sequel", &state));
        assert!(!graph.is_available("finale", &state));
        assert_eq!(graph.available_events(&state), vec!["sequel"]);
    }
}
