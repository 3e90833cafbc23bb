//! Engine configuration.
//!
//! Every section has defaults, so a RON file only needs the values it
//! changes.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::chains::Season;
use crate::schema::context::DifficultyTier;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialization error: {0}")]
    RonSer(#[from] ron::Error),
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for the engine's random source.
    pub seed: u64,
    pub synthesizer: SynthesizerConfig,
    pub selection: SelectionConfig,
    pub difficulty: DifficultyScaling,
    pub calendar: CalendarConfig,
}

impl EngineConfig {
    /// Loads configuration from a RON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parses configuration from a RON string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(content)?)
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }
}

/// Text synthesizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesizerConfig {
    /// Tokens per Markov window
    pub state_size: usize,
    pub narrative_min_words: usize,
    pub narrative_max_words: usize,
    pub title_min_words: usize,
    pub title_max_words: usize,
    /// Walk attempts before falling back to stitched sentences
    pub max_tries: usize,
    /// Hard cap on derived titles
    pub title_max_chars: usize,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            state_size: 2,
            narrative_min_words: 8,
            narrative_max_words: 40,
            title_min_words: 2,
            title_max_words: 6,
            max_tries: 100,
            title_max_chars: 60,
        }
    }
}

/// Context-modifier thresholds and boosts used by template weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Weight for templates that set none
    pub base_weight: f64,
    /// Boost when the career appears in a template tag (or vice versa)
    pub career_boost: f64,
    pub young_age: f64,
    pub young_tags: Vec<String>,
    pub old_age: f64,
    pub old_tags: Vec<String>,
    pub age_boost: f64,
    pub wealth_threshold: f64,
    pub wealth_tags: Vec<String>,
    pub wealth_boost: f64,
    pub influence_threshold: f64,
    pub influence_tags: Vec<String>,
    pub influence_boost: f64,
    /// A skill at or above this level boosts templates tagged with its name
    pub skill_threshold: f64,
    pub skill_boost: f64,
    pub relationship_threshold: usize,
    pub relationship_tags: Vec<String>,
    pub relationship_boost: f64,
    /// Boost when the season appears in a template tag
    pub season_boost: f64,
    /// power_level / divisor = power ratio compared to challenge ratings
    pub power_ratio_divisor: f64,
    pub challenge_easy: f64,
    pub challenge_normal: f64,
    pub challenge_hard: f64,
    pub challenge_legendary: f64,
    pub too_easy_factor: f64,
    pub sweet_spot_factor: f64,
    pub too_hard_factor: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        let tags = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            base_weight: 1.0,
            career_boost: 2.0,
            young_age: 25.0,
            young_tags: tags(&["adventure", "romance", "exploration"]),
            old_age: 50.0,
            old_tags: tags(&["legacy", "political", "family"]),
            age_boost: 1.3,
            wealth_threshold: 5000.0,
            wealth_tags: tags(&["economic", "trade", "luxury"]),
            wealth_boost: 1.4,
            influence_threshold: 50.0,
            influence_tags: tags(&["political", "court", "intrigue"]),
            influence_boost: 1.5,
            skill_threshold: 70.0,
            skill_boost: 1.5,
            relationship_threshold: 5,
            relationship_tags: tags(&["social", "romance", "family"]),
            relationship_boost: 1.3,
            season_boost: 1.5,
            power_ratio_divisor: 50.0,
            challenge_easy: 2.0,
            challenge_normal: 4.0,
            challenge_hard: 7.0,
            challenge_legendary: 10.0,
            too_easy_factor: 0.5,
            sweet_spot_factor: 1.5,
            too_hard_factor: 0.3,
        }
    }
}

impl SelectionConfig {
    /// Implicit challenge rating for a tier.
    pub fn challenge_for(&self, tier: DifficultyTier) -> f64 {
        match tier {
            DifficultyTier::Easy => self.challenge_easy,
            DifficultyTier::Normal => self.challenge_normal,
            DifficultyTier::Hard => self.challenge_hard,
            DifficultyTier::Legendary => self.challenge_legendary,
        }
    }
}

/// Reward/penalty multipliers for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierMultipliers {
    pub reward: f64,
    pub penalty: f64,
}

/// Tier-wide effect scaling and the key classification it relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyScaling {
    pub easy: TierMultipliers,
    pub normal: TierMultipliers,
    pub hard: TierMultipliers,
    pub legendary: TierMultipliers,
    /// Substrings marking reward-like effect keys
    pub reward_keys: Vec<String>,
    /// Substrings marking penalty-like effect keys
    pub penalty_keys: Vec<String>,
}

impl Default for DifficultyScaling {
    fn default() -> Self {
        Self {
            easy: TierMultipliers { reward: 1.5, penalty: 0.7 },
            normal: TierMultipliers { reward: 1.0, penalty: 1.0 },
            hard: TierMultipliers { reward: 0.8, penalty: 1.3 },
            legendary: TierMultipliers { reward: 0.6, penalty: 1.6 },
            reward_keys: ["gold", "reputation", "knowledge", "karma", "influence", "wealth"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            penalty_keys: ["health", "stress"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DifficultyScaling {
    pub fn for_tier(&self, tier: DifficultyTier) -> TierMultipliers {
        match tier {
            DifficultyTier::Easy => self.easy,
            DifficultyTier::Normal => self.normal,
            DifficultyTier::Hard => self.hard,
            DifficultyTier::Legendary => self.legendary,
        }
    }
}

/// Calendar settings for the day-stepped time system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub days_per_season: u32,
    pub start_season: Season,
    pub start_year: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            days_per_season: 30,
            start_season: Season::Spring,
            start_year: 1,
        }
    }
}
