//! Rule interpreter: condition trees and the event mutation DSL.

use rand::rngs::StdRng;
use rand::Rng;
use rustc_hash::FxHashMap;

use crate::core::effects::scale_value;
use crate::schema::condition::{ConditionNode, EffectSpec, Params, Replacement, Rule, TextModifier};
use crate::schema::context::AnalyzedContext;
use crate::schema::event::Event;

/// A leaf predicate handler.
pub type PredicateFn = Box<dyn Fn(&AnalyzedContext, &Params, &mut StdRng) -> bool + Send + Sync>;

/// Evaluates condition trees through a registry of leaf handlers and
/// applies effect specs to events.
pub struct RuleInterpreter {
    predicates: FxHashMap<String, PredicateFn>,
}

impl Default for RuleInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuleInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&String> = self.predicates.keys().collect();
        kinds.sort();
        f.debug_struct("RuleInterpreter")
            .field("predicates", &kinds)
            .finish()
    }
}

impl RuleInterpreter {
    /// An interpreter with the built-in predicates registered.
    pub fn new() -> Self {
        let mut interpreter = Self {
            predicates: FxHashMap::default(),
        };
        interpreter.register_builtins();
        interpreter
    }

    /// Register (or replace) the handler for a leaf kind.
    pub fn register_predicate<F>(&mut self, kind: &str, predicate: F)
    where
        F: Fn(&AnalyzedContext, &Params, &mut StdRng) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(kind.to_string(), Box::new(predicate));
    }

    pub fn knows(&self, kind: &str) -> bool {
        self.predicates.contains_key(kind)
    }

    fn register_builtins(&mut self) {
        self.register_predicate("stat_greater_than", |ctx, p, _| {
            compare_stat(ctx, p, |stat, value| stat > value)
        });
        self.register_predicate("stat_less_than", |ctx, p, _| {
            compare_stat(ctx, p, |stat, value| stat < value)
        });
        self.register_predicate("stat_equals", |ctx, p, _| {
            compare_stat(ctx, p, |stat, value| (stat - value).abs() < f64::EPSILON)
        });
        self.register_predicate("stat_between", |ctx, p, _| {
            let Some(stat) = p.text("stat").and_then(|s| ctx.stat(s)) else {
                return false;
            };
            let min = p.number("min").unwrap_or(f64::NEG_INFINITY);
            let max = p.number("max").unwrap_or(f64::INFINITY);
            stat >= min && stat <= max
        });
        self.register_predicate("has_item", |ctx, p, _| {
            p.text("item").is_some_and(|item| ctx.raw.has_item(item))
        });
        self.register_predicate("location_is", |ctx, p, _| {
            text_matches(ctx.text("location"), p.text_any(&["location", "value"]))
        });
        self.register_predicate("season_is", |ctx, p, _| {
            text_matches(ctx.text("season"), p.text_any(&["season", "value"]))
        });
        self.register_predicate("career_is", |ctx, p, _| {
            text_matches(ctx.text("career"), p.text_any(&["career", "value"]))
        });
        self.register_predicate("career_contains", |ctx, p, _| {
            match (ctx.text("career"), p.text_any(&["career", "value"])) {
                (Some(career), Some(needle)) => {
                    career.to_lowercase().contains(&needle.to_lowercase())
                }
                _ => false,
            }
        });
        self.register_predicate("difficulty_is", |ctx, p, _| {
            text_matches(Some(ctx.difficulty_tier.name()), p.text_any(&["difficulty", "value"]))
        });
        self.register_predicate("relationship_status", |ctx, p, _| {
            let Some(target) = p.text_any(&["target", "npc", "id", "with"]) else {
                return false;
            };
            let relationships = ctx.raw.relationships();
            let Some(rel) = relationships.iter().find(|r| r.id == target) else {
                return false;
            };
            if let Some(status) = p.text_any(&["status", "type"]) {
                let kind = rel
                    .kind
                    .clone()
                    .unwrap_or_else(|| crate::schema::relationship::status_label(rel.strength as i32).to_string());
                if !kind.eq_ignore_ascii_case(status) {
                    return false;
                }
            }
            let min = p.number_any(&["min_strength", "min"]).unwrap_or(f64::NEG_INFINITY);
            let max = p.number_any(&["max_strength", "max"]).unwrap_or(f64::INFINITY);
            rel.strength >= min && rel.strength <= max
        });
        self.register_predicate("relationship_count_at_least", |ctx, p, _| {
            let needed = p.number_any(&["count", "value"]).unwrap_or(1.0);
            ctx.raw.relationship_count() as f64 >= needed
        });
        self.register_predicate("random_chance", |_, p, rng| {
            let chance = p.number_any(&["chance", "probability", "value"]).unwrap_or(0.0);
            rng.gen::<f64>() < chance
        });
    }

    /// Evaluate a condition tree. Unknown leaf kinds are false.
    pub fn evaluate(&self, node: &ConditionNode, ctx: &AnalyzedContext, rng: &mut StdRng) -> bool {
        match node {
            ConditionNode::And(children) => children.iter().all(|c| self.evaluate(c, ctx, rng)),
            ConditionNode::Or(children) => children.iter().any(|c| self.evaluate(c, ctx, rng)),
            ConditionNode::Not(inner) => !self.evaluate(inner, ctx, rng),
            ConditionNode::Leaf(predicate) => match self.predicates.get(&predicate.kind) {
                Some(handler) => handler(ctx, &predicate.params, rng),
                None => {
                    tracing::warn!(kind = %predicate.kind, "unknown condition type, evaluating to false");
                    false
                }
            },
        }
    }

    /// All conditions hold. An empty list holds.
    pub fn evaluate_all(
        &self,
        conditions: &[ConditionNode],
        ctx: &AnalyzedContext,
        rng: &mut StdRng,
    ) -> bool {
        conditions.iter().all(|c| self.evaluate(c, ctx, rng))
    }

    /// Apply an effect spec to a copy of `event`.
    ///
    /// Order: choice `multiply`, `add`, `set`; `addChoices`; title and
    /// narrative rewrites; `setDifficulty`; `addTags`.
    pub fn apply_effects(&self, event: &Event, effects: &EffectSpec, _ctx: &AnalyzedContext) -> Event {
        let mut out = event.clone();

        if let Some(modifier) = &effects.modify_choices {
            for choice in &mut out.choices {
                for (key, factor) in &modifier.multiply {
                    if let Some(value) = choice.effect.get_mut(key) {
                        *value = scale_value(*value, *factor);
                    }
                }
                for (key, amount) in &modifier.add {
                    *choice.effect.entry(key.clone()).or_insert(0.0) += amount;
                }
                for (key, value) in &modifier.set {
                    choice.effect.insert(key.clone(), *value);
                }
            }
        }

        out.choices.extend(effects.add_choices.iter().cloned());

        if let Some(modifier) = &effects.modify_title {
            out.title = modify_text(&out.title, modifier);
        }
        if let Some(modifier) = &effects.modify_narrative {
            out.narrative = modify_text(&out.narrative, modifier);
        }

        if let Some(tier) = effects.set_difficulty {
            out.difficulty = tier;
        }

        out.tags.extend(effects.add_tags.iter().cloned());
        out
    }

    /// Run every rule, in the given order, whose conditions hold.
    pub fn apply_rules<'a, I>(&self, event: Event, rules: I, ctx: &AnalyzedContext, rng: &mut StdRng) -> Event
    where
        I: IntoIterator<Item = &'a Rule>,
    {
        let mut current = event;
        for rule in rules {
            if self.evaluate_all(&rule.conditions, ctx, rng) {
                current = self.apply_effects(&current, &rule.effects, ctx);
            }
        }
        current
    }
}

fn compare_stat(ctx: &AnalyzedContext, params: &Params, cmp: impl Fn(f64, f64) -> bool) -> bool {
    let (Some(stat), Some(value)) = (
        params.text("stat").and_then(|s| ctx.stat(s)),
        params.number("value"),
    ) else {
        return false;
    };
    cmp(stat, value)
}

fn text_matches(actual: Option<&str>, expected: Option<&str>) -> bool {
    matches!((actual, expected), (Some(a), Some(e)) if a.eq_ignore_ascii_case(e))
}

fn modify_text(text: &str, modifier: &TextModifier) -> String {
    let mut out = match &modifier.replace {
        Some(replacement) => replace_text(text, replacement),
        None => text.to_string(),
    };
    if let Some(suffix) = &modifier.append {
        out.push_str(suffix);
    }
    if let Some(prefix) = &modifier.prepend {
        out.insert_str(0, prefix);
    }
    out
}

fn replace_text(text: &str, replacement: &Replacement) -> String {
    if !replacement.regex {
        return text.replace(&replacement.from, &replacement.to);
    }
    match regex_lite::Regex::new(&replacement.from) {
        Ok(re) => re.replace_all(text, replacement.to.as_str()).into_owned(),
        Err(e) => {
            tracing::warn!(pattern = %replacement.from, error = %e, "invalid replacement pattern, text left unchanged");
            text.to_string()
        }
    }
}
