//! Directed, weighted relationship graph between entities.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::schema::relationship::{
    status_label, Edge, NetworkEntity, Relationship, RelationshipChange, MAX_STRENGTH, MIN_STRENGTH,
};

/// The persistent part of a network: entities and edges. This is what a
/// snapshot carries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RelationshipGraph {
    #[serde(default)]
    pub entities: BTreeMap<String, NetworkEntity>,
    /// `from -> to -> relationship`.
    #[serde(default)]
    pub edges: BTreeMap<String, BTreeMap<String, Relationship>>,
}

/// A named, fixed relationship change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRule {
    pub delta: i32,
    pub reason: String,
}

/// Result of [`RelationshipNetwork::get_network`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkView {
    pub nodes: Vec<String>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone)]
pub struct RelationshipNetwork {
    graph: RelationshipGraph,
    rules: BTreeMap<String, RelationshipRule>,
    /// Timestamp stamped onto new history entries.
    clock: u64,
}

impl Default for RelationshipNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationshipNetwork {
    /// An empty network with the built-in rules `save_life`,
    /// `betray_trust` and `help_combat`.
    pub fn new() -> Self {
        let mut network = Self {
            graph: RelationshipGraph::default(),
            rules: BTreeMap::new(),
            clock: 0,
        };
        network.register_relationship_rule("save_life", 25, "Saved their life");
        network.register_relationship_rule("betray_trust", -30, "Betrayed their trust");
        network.register_relationship_rule("help_combat", 15, "Helped in combat");
        network
    }

    pub fn set_clock(&mut self, timestamp: u64) {
        self.clock = timestamp;
    }

    pub fn add_entity(&mut self, id: &str, name: &str, kind: &str) {
        self.graph.entities.insert(
            id.to_string(),
            NetworkEntity {
                id: id.to_string(),
                name: name.to_string(),
                kind: kind.to_string(),
            },
        );
    }

    pub fn entity(&self, id: &str) -> Option<&NetworkEntity> {
        self.graph.entities.get(id)
    }

    /// Add `delta` to the `from -> to` edge, clamped to the strength
    /// bounds. The change is always logged. Returns the new strength.
    pub fn update_relationship(&mut self, from: &str, to: &str, delta: i32, reason: &str) -> i32 {
        let relationship = self
            .graph
            .edges
            .entry(from.to_string())
            .or_default()
            .entry(to.to_string())
            .or_default();
        relationship.strength = relationship
            .strength
            .saturating_add(delta)
            .clamp(MIN_STRENGTH, MAX_STRENGTH);
        relationship.history.push(RelationshipChange {
            timestamp: self.clock,
            delta,
            reason: reason.to_string(),
        });
        relationship.strength
    }

    /// Update both directions with the same delta.
    pub fn update_relationship_mutual(&mut self, a: &str, b: &str, delta: i32, reason: &str) -> (i32, i32) {
        let forward = self.update_relationship(a, b, delta, reason);
        let backward = self.update_relationship(b, a, delta, reason);
        (forward, backward)
    }

    /// Strength of the `from -> to` edge; 0 when there is none.
    pub fn get_relationship(&self, from: &str, to: &str) -> i32 {
        self.relationship(from, to).map_or(0, |r| r.strength)
    }

    /// The edge with its history.
    pub fn relationship(&self, from: &str, to: &str) -> Option<&Relationship> {
        self.graph.edges.get(from).and_then(|targets| targets.get(to))
    }

    pub fn relationship_status(&self, from: &str, to: &str) -> &'static str {
        status_label(self.get_relationship(from, to))
    }

    /// Breadth-first walk from `root` up to `depth` hops, collecting every
    /// visited node and the outgoing edges of nodes closer than `depth`.
    pub fn get_network(&self, root: &str, depth: usize) -> NetworkView {
        let mut view = NetworkView::default();
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();

        visited.insert(root.to_string());
        queue.push_back((root.to_string(), 0usize));

        while let Some((node, distance)) = queue.pop_front() {
            view.nodes.push(node.clone());
            if distance >= depth {
                continue;
            }
            let Some(targets) = self.graph.edges.get(&node) else {
                continue;
            };
            for (target, relationship) in targets {
                view.edges.push(Edge {
                    from: node.clone(),
                    to: target.clone(),
                    strength: relationship.strength,
                });
                if visited.insert(target.clone()) {
                    queue.push_back((target.clone(), distance + 1));
                }
            }
        }
        view
    }

    pub fn register_relationship_rule(&mut self, name: &str, delta: i32, reason: &str) {
        self.rules.insert(
            name.to_string(),
            RelationshipRule {
                delta,
                reason: reason.to_string(),
            },
        );
    }

    /// Apply a named rule to `from -> to`. Unknown rules change nothing.
    pub fn apply_relationship_rule(&mut self, rule: &str, from: &str, to: &str) -> Option<i32> {
        let Some(RelationshipRule { delta, reason }) = self.rules.get(rule).cloned() else {
            tracing::warn!(rule, "unknown relationship rule");
            return None;
        };
        Some(self.update_relationship(from, to, delta, &reason))
    }

    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }

    /// Replace entities and edges; registered rules are kept.
    pub fn restore(&mut self, graph: RelationshipGraph) {
        self.graph = graph;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_clamp_and_log() {
        let mut net = RelationshipNetwork::new();
        net.set_clock(7);
        assert_eq!(net.update_relationship("player", "mira", 80, "gift"), 80);
        assert_eq!(net.update_relationship("player", "mira", 80, "rescue"), 100);
        assert_eq!(net.update_relationship("player", "mira", -250, "betrayal"), -100);

        let rel = net.relationship("player", "mira").unwrap();
        assert_eq!(rel.history.len(), 3);
        assert_eq!(rel.history[0].timestamp, 7);
        assert_eq!(rel.history[2].delta, -250);
    }

    #[test]
    fn edges_are_directed() {
        let mut net = RelationshipNetwork::new();
        net.update_relationship("a", "b", 30, "favor");
        assert_eq!(net.get_relationship("a", "b"), 30);
        assert_eq!(net.get_relationship("b", "a"), 0);

        net.update_relationship_mutual("a", "c", 10, "shared meal");
        assert_eq!(net.get_relationship("a", "c"), 10);
        assert_eq!(net.get_relationship("c", "a"), 10);
    }

    #[test]
    fn unknown_ids_are_neutral() {
        let net = RelationshipNetwork::new();
        assert_eq!(net.get_relationship("nobody", "else"), 0);
        assert_eq!(net.relationship_status("nobody", "else"), "neutral");
        assert_eq!(net.get_network("nobody", 3).nodes, vec!["nobody"]);
    }

    #[test]
    fn builtin_and_custom_rules() {
        let mut net = RelationshipNetwork::new();
        assert_eq!(net.apply_relationship_rule("save_life", "p", "n"), Some(25));
        assert_eq!(net.apply_relationship_rule("betray_trust", "p", "n"), Some(-5));
        assert_eq!(net.apply_relationship_rule("help_combat", "p", "n"), Some(10));
        assert_eq!(net.apply_relationship_rule("no_such_rule", "p", "n"), None);

        net.register_relationship_rule("gift", 5, "Gave a gift");
        assert_eq!(net.apply_relationship_rule("gift", "p", "n"), Some(15));
        let rel = net.relationship("p", "n").unwrap();
        assert_eq!(rel.history.last().unwrap().reason, "Gave a gift");
    }

    #[test]
    fn network_respects_depth() {
        let mut net = RelationshipNetwork::new();
        net.update_relationship("a", "b", 10, "x");
        net.update_relationship("b", "c", 20, "x");
        net.update_relationship("c", "d", 30, "x");
        net.update_relationship("b", "a", 5, "x");

        let one = net.get_network("a", 1);
        assert_eq!(one.nodes, vec!["a", "b"]);
        assert_eq!(one.edges.len(), 1);

        let two = net.get_network("a", 2);
        assert_eq!(two.nodes, vec!["a", "b", "c"]);
        // a->b, b->a, b->c
        assert_eq!(two.edges.len(), 3);

        let zero = net.get_network("a", 0);
        assert_eq!(zero.nodes, vec!["a"]);
        assert!(zero.edges.is_empty());
    }

    #[test]
    fn restore_keeps_rules() {
        let mut net = RelationshipNetwork::new();
        net.add_entity("mira", "Mira", "npc");
        net.update_relationship("player", "mira", 40, "help");
        let saved = net.graph().clone();

        let mut fresh = RelationshipNetwork::new();
        fresh.restore(saved);
        assert_eq!(fresh.get_relationship("player", "mira"), 40);
        assert_eq!(fresh.entity("mira").unwrap().name, "Mira");
        assert_eq!(fresh.apply_relationship_rule("save_life", "player", "mira"), Some(65));
    }
}
