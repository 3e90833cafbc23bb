//! Effect resolution: ranges to integers, contextual and tier scaling.
//!
//! Resolved effects are `f64` so authored fractional scalars survive.
//! Whole-number effects stay whole through every multiplier.

use rand::rngs::StdRng;
use rand::Rng;
use std::collections::BTreeMap;

use crate::core::config::DifficultyScaling;
use crate::schema::context::{AnalyzedContext, DifficultyTier};
use crate::schema::event::EventChoice;
use crate::schema::template::{Choice, EffectValue};

/// How an effect key responds to scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectClass {
    Reward,
    Penalty,
    Neutral,
}

/// Multiply an effect value, rounding only when it started out whole.
pub fn scale_value(value: f64, factor: f64) -> f64 {
    let scaled = value * factor;
    if value.fract() == 0.0 {
        scaled.round()
    } else {
        scaled
    }
}

/// Materializes authored effects into concrete numbers.
#[derive(Debug, Clone, Default)]
pub struct EffectResolver {
    scaling: DifficultyScaling,
}

impl EffectResolver {
    pub fn new(scaling: DifficultyScaling) -> Self {
        Self { scaling }
    }

    /// Classify a key by substring match. Reward wins over penalty.
    pub fn classify(&self, key: &str) -> EffectClass {
        let key = key.to_lowercase();
        if self.scaling.reward_keys.iter().any(|k| key.contains(k.as_str())) {
            EffectClass::Reward
        } else if self.scaling.penalty_keys.iter().any(|k| key.contains(k.as_str())) {
            EffectClass::Penalty
        } else {
            EffectClass::Neutral
        }
    }

    /// Contextual multiplier for range effects.
    ///
    /// Wealth-like rewards grow with wealth, standing-like rewards with
    /// influence, stress and happiness slightly with age. Penalties are
    /// left alone.
    pub fn context_multiplier(&self, key: &str, ctx: &AnalyzedContext) -> f64 {
        let key = key.to_lowercase();
        if key.contains("gold") || key.contains("wealth") {
            1.0 + (ctx.number("wealth") / 1000.0).clamp(0.0, 10.0) * 0.05
        } else if key.contains("reputation") || key.contains("influence") {
            1.0 + (ctx.number("influence") / 100.0).clamp(0.0, 1.0) * 0.5
        } else if key.contains("stress") || key.contains("happiness") {
            1.0 + ((ctx.number("age") - 30.0).max(0.0) / 100.0).min(0.5)
        } else {
            1.0
        }
    }

    /// Resolve one effect map. Ranges are scaled by the context multiplier
    /// (bounds swapped if inverted) and drawn uniformly; scalars pass
    /// through.
    pub fn resolve(
        &self,
        effect: &BTreeMap<String, EffectValue>,
        ctx: &AnalyzedContext,
        rng: &mut StdRng,
    ) -> BTreeMap<String, f64> {
        effect
            .iter()
            .map(|(key, value)| {
                let resolved = match *value {
                    EffectValue::Fixed(v) => v,
                    EffectValue::Range([min, max]) => {
                        let m = self.context_multiplier(key, ctx);
                        let mut lo = (min * m).round() as i64;
                        let mut hi = (max * m).round() as i64;
                        if lo > hi {
                            std::mem::swap(&mut lo, &mut hi);
                        }
                        rng.gen_range(lo..=hi) as f64
                    }
                };
                (key.clone(), resolved)
            })
            .collect()
    }

    /// Apply the tier's reward/penalty multipliers.
    pub fn scale_effects_for_difficulty(
        &self,
        effect: &BTreeMap<String, f64>,
        tier: DifficultyTier,
    ) -> BTreeMap<String, f64> {
        let multipliers = self.scaling.for_tier(tier);
        effect
            .iter()
            .map(|(key, &value)| {
                let factor = match self.classify(key) {
                    EffectClass::Reward => multipliers.reward,
                    EffectClass::Penalty => multipliers.penalty,
                    EffectClass::Neutral => 1.0,
                };
                (key.clone(), scale_value(value, factor))
            })
            .collect()
    }

    /// Resolve and scale a template choice into an event choice.
    pub fn resolve_choice(
        &self,
        choice: &Choice,
        ctx: &AnalyzedContext,
        rng: &mut StdRng,
    ) -> EventChoice {
        let resolved = self.resolve(&choice.effect, ctx, rng);
        EventChoice {
            text: choice.text.clone(),
            effect: self.scale_effects_for_difficulty(&resolved, ctx.difficulty_tier),
            consequence: choice.consequence.clone(),
            requirements: choice.requirements.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analyzer::analyze_context;
    use crate::schema::context::Context;
    use rand::SeedableRng;

    fn resolver() -> EffectResolver {
        EffectResolver::new(DifficultyScaling::default())
    }

    #[test]
    fn classification_by_substring() {
        let r = resolver();
        assert_eq!(r.classify("gold"), EffectClass::Reward);
        assert_eq!(r.classify("bonus_reputation"), EffectClass::Reward);
        assert_eq!(r.classify("health"), EffectClass::Penalty);
        assert_eq!(r.classify("Stress"), EffectClass::Penalty);
        assert_eq!(r.classify("morale"), EffectClass::Neutral);
    }

    #[test]
    fn scalars_pass_through() {
        let ctx = analyze_context(&Context::new().with("wealth", 9000));
        let mut rng = StdRng::seed_from_u64(1);
        let effect = BTreeMap::from([
            ("gold".to_string(), EffectValue::Fixed(25.0)),
            ("morale".to_string(), EffectValue::Fixed(2.5)),
        ]);
        let resolved = resolver().resolve(&effect, &ctx, &mut rng);
        assert_eq!(resolved["gold"], 25.0);
        assert_eq!(resolved["morale"], 2.5);
    }

    #[test]
    fn fractional_scalars_survive_the_whole_choice() {
        let ctx = analyze_context(&Context::new().with("wealth", 9000));
        let mut rng = StdRng::seed_from_u64(2);
        let choice = Choice {
            text: "Rest".to_string(),
            effect: BTreeMap::from([
                ("morale".to_string(), EffectValue::Fixed(2.5)),
                ("health".to_string(), EffectValue::Fixed(1.25)),
            ]),
            ..Default::default()
        };
        let resolved = resolver().resolve_choice(&choice, &ctx, &mut rng);
        assert_eq!(resolved.effect["morale"], 2.5);
        let factor = DifficultyScaling::default().for_tier(ctx.difficulty_tier).penalty;
        assert_eq!(resolved.effect["health"], 1.25 * factor);
    }

    #[test]
    fn ranges_stay_within_scaled_bounds() {
        let ctx = analyze_context(&Context::new().with("wealth", 4000));
        let r = resolver();
        let m = r.context_multiplier("gold", &ctx);
        assert!((m - 1.2).abs() < 1e-9);

        let effect = BTreeMap::from([("gold".to_string(), EffectValue::Range([10.0, 50.0]))]);
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let v = r.resolve(&effect, &ctx, &mut rng)["gold"];
            assert!((12.0..=60.0).contains(&v), "out of range: {}", v);
            assert_eq!(v.fract(), 0.0);
        }
    }

    #[test]
    fn inverted_ranges_are_swapped() {
        let ctx = analyze_context(&Context::new());
        let effect = BTreeMap::from([("health".to_string(), EffectValue::Range([-5.0, -20.0]))]);
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let v = resolver().resolve(&effect, &ctx, &mut rng)["health"];
            assert!((-20.0..=-5.0).contains(&v));
        }
    }

    #[test]
    fn tier_scaling() {
        let r = resolver();
        let effect = BTreeMap::from([
            ("gold".to_string(), 100.0),
            ("health".to_string(), -10.0),
            ("morale".to_string(), 3.0),
        ]);

        let easy = r.scale_effects_for_difficulty(&effect, DifficultyTier::Easy);
        assert_eq!(easy["gold"], 150.0);
        assert_eq!(easy["health"], -7.0);
        assert_eq!(easy["morale"], 3.0);

        let legendary = r.scale_effects_for_difficulty(&effect, DifficultyTier::Legendary);
        assert_eq!(legendary["gold"], 60.0);
        assert_eq!(legendary["health"], -16.0);

        let normal = r.scale_effects_for_difficulty(&effect, DifficultyTier::Normal);
        assert_eq!(normal, effect);
    }
}
