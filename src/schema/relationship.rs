use serde::{Deserialize, Serialize};

/// Lower bound of a relationship strength.
pub const MIN_STRENGTH: i32 = -100;
/// Upper bound of a relationship strength.
pub const MAX_STRENGTH: i32 = 100;

/// Anything that can hold a relationship: an NPC, a faction, the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEntity {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// One recorded change to a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipChange {
    pub timestamp: u64,
    pub delta: i32,
    pub reason: String,
}

/// A directed, weighted edge with its full change log.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Relationship {
    pub strength: i32,
    #[serde(default)]
    pub history: Vec<RelationshipChange>,
}

/// An edge as returned by network queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub strength: i32,
}

/// Coarse label for a strength value.
pub fn status_label(strength: i32) -> &'static str {
    match strength {
        s if s <= -60 => "enemy",
        s if s <= -20 => "rival",
        s if s < 20 => "neutral",
        s if s < 60 => "friend",
        _ => "ally",
    }
}
