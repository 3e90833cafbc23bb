//! Context analysis: defaults and derived metrics.

use serde_json::{json, Value};

use crate::schema::context::{AnalyzedContext, Context, DifficultyTier};

/// Defaults for every recognized context field.
fn defaults() -> [(&'static str, Value); 13] {
    [
        ("age", json!(25)),
        ("wealth", json!(0)),
        ("influence", json!(0)),
        ("reputation", json!(0)),
        ("stress", json!(0)),
        ("health", json!(100)),
        ("happiness", json!(50)),
        ("karma", json!(0)),
        ("career", json!("commoner")),
        ("location", json!("village")),
        ("season", json!("spring")),
        ("skills", json!({})),
        ("relationships", json!([])),
    ]
}

/// Fill defaults and compute the derived metrics.
pub fn analyze_context(raw: &Context) -> AnalyzedContext {
    let mut filled = raw.clone();
    for (key, value) in defaults() {
        if !filled.contains(key) {
            filled.set(key, value);
        }
    }

    let social_standing = social_standing(&filled);
    let power_level = power_level(&filled);
    let life_experience = life_experience(&filled);

    AnalyzedContext {
        raw: filled,
        social_standing,
        power_level,
        life_experience,
        difficulty_tier: DifficultyTier::from_power(power_level),
    }
}

fn num(ctx: &Context, key: &str) -> f64 {
    ctx.number(key).unwrap_or(0.0)
}

/// `0.4·influence + 0.3·reputation + 0.3·(wealth/100)`, +20 for nobles,
/// clamped to `[0, 100]`.
pub fn social_standing(ctx: &Context) -> f64 {
    let mut standing =
        0.4 * num(ctx, "influence") + 0.3 * num(ctx, "reputation") + 0.3 * (num(ctx, "wealth") / 100.0);
    let noble = ctx
        .text("career")
        .is_some_and(|c| c.to_lowercase().contains("noble"));
    if noble {
        standing += 20.0;
    }
    standing.clamp(0.0, 100.0)
}

pub fn power_level(ctx: &Context) -> f64 {
    0.3 * num(ctx, "influence")
        + 0.2 * (num(ctx, "wealth") / 100.0)
        + 0.2 * (ctx.skills_total() / 10.0)
        + 0.1 * (5.0 * ctx.relationship_count() as f64)
        + 0.2 * (100.0 - num(ctx, "stress"))
}

pub fn life_experience(ctx: &Context) -> f64 {
    2.0 * (num(ctx, "age") - 18.0).max(0.0)
        + ctx.skills_total() / 10.0
        + 5.0 * ctx.relationship_count() as f64
}
