//! Weighted template selection from context and difficulty.

use rand::rngs::StdRng;
use rand::Rng;
use serde_json::Value;

use crate::core::config::SelectionConfig;
use crate::schema::context::AnalyzedContext;
use crate::schema::template::Template;

/// Assigns, normalizes and samples per-template selection weights.
#[derive(Debug, Clone, Default)]
pub struct WeightedSelector {
    config: SelectionConfig,
}

impl WeightedSelector {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    /// Normalized `(template id, probability)` pairs, in input order.
    pub fn compute_weights(&self, templates: &[&Template], ctx: &AnalyzedContext) -> Vec<(String, f64)> {
        let raw: Vec<(String, f64)> = templates
            .iter()
            .map(|t| {
                let base = t.weight.unwrap_or(self.config.base_weight).max(0.0);
                let weight = base * self.context_modifier(t, ctx) * self.difficulty_modifier(t, ctx);
                (t.id.clone(), weight)
            })
            .collect();

        let total: f64 = raw.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            let uniform = if raw.is_empty() { 0.0 } else { 1.0 / raw.len() as f64 };
            return raw.into_iter().map(|(id, _)| (id, uniform)).collect();
        }
        raw.into_iter().map(|(id, w)| (id, w / total)).collect()
    }

    /// Multiplicative boosts from the context.
    pub fn context_modifier(&self, template: &Template, ctx: &AnalyzedContext) -> f64 {
        let c = &self.config;
        let tags: Vec<String> = template
            .tags
            .iter()
            .chain(template.kind.iter())
            .map(|t| t.to_lowercase())
            .collect();
        let tagged_any = |wanted: &[String]| wanted.iter().any(|w| tags.iter().any(|t| t == w));
        let mut modifier = 1.0;

        if let Some(career) = ctx.text("career").map(str::to_lowercase) {
            if !career.is_empty() && tags.iter().any(|t| t.contains(&career) || career.contains(t.as_str())) {
                modifier *= c.career_boost;
            }
        }

        let age = ctx.number("age");
        if (age < c.young_age && tagged_any(&c.young_tags)) || (age >= c.old_age && tagged_any(&c.old_tags)) {
            modifier *= c.age_boost;
        }
        if ctx.number("wealth") >= c.wealth_threshold && tagged_any(&c.wealth_tags) {
            modifier *= c.wealth_boost;
        }
        if ctx.number("influence") >= c.influence_threshold && tagged_any(&c.influence_tags) {
            modifier *= c.influence_boost;
        }

        if let Some(Value::Object(skills)) = ctx.raw.get("skills") {
            let skilled = skills.iter().any(|(name, level)| {
                level.as_f64().is_some_and(|l| l >= c.skill_threshold) && tags.contains(&name.to_lowercase())
            });
            if skilled {
                modifier *= c.skill_boost;
            }
        }

        if ctx.raw.relationship_count() >= c.relationship_threshold && tagged_any(&c.relationship_tags) {
            modifier *= c.relationship_boost;
        }

        if let Some(season) = ctx.text("season").map(str::to_lowercase) {
            if tags.contains(&season) {
                modifier *= c.season_boost;
            }
        }

        modifier
    }

    /// The template's challenge rating: explicit, from its tier, or the
    /// normal-tier default.
    pub fn challenge_rating(&self, template: &Template) -> f64 {
        template.challenge.unwrap_or_else(|| {
            self.config
                .challenge_for(template.difficulty.unwrap_or_default())
        })
    }

    /// Too-easy templates are halved, those a little above the player's
    /// power are boosted, and far-too-hard ones are cut.
    pub fn difficulty_modifier(&self, template: &Template, ctx: &AnalyzedContext) -> f64 {
        let c = &self.config;
        let power_ratio = ctx.power_level / c.power_ratio_divisor;
        let rating = self.challenge_rating(template);

        if rating < power_ratio + 2.0 {
            c.too_easy_factor
        } else if rating <= power_ratio + 5.0 {
            c.sweet_spot_factor
        } else if rating > power_ratio + 6.0 {
            c.too_hard_factor
        } else {
            1.0
        }
    }

    /// Cumulative-weight draw. Returns `None` only for an empty list.
    pub fn select(&self, weights: &[(String, f64)], rng: &mut StdRng) -> Option<String> {
        if weights.is_empty() {
            return None;
        }
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Some(weights[rng.gen_range(0..weights.len())].0.clone());
        }
        let r = rng.gen::<f64>() * total;
        let mut cumulative = 0.0;
        for (id, w) in weights {
            cumulative += w;
            if r < cumulative {
                return Some(id.clone());
            }
        }
        weights.last().map(|(id, _)| id.clone())
    }
}
