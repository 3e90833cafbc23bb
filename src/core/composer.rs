//! Template composition: inheritance, mixins, conditional composition,
//! conditional choices and dynamic fields.
//!
//! Resolution walks `extends` parents first (merged left to right, the
//! child overriding scalars and appending to collections), then appends
//! mixin collections, then merges composition entries whose conditions
//! hold, highest priority first. The flattened result then has its
//! conditional choices and dynamic fields applied against the context.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::core::analyzer::analyze_context;
use crate::core::library::{TemplateFilter, TemplateStore};
use crate::core::rules::RuleInterpreter;
use crate::schema::context::{AnalyzedContext, Context};
use crate::schema::template::{Choice, DynamicTarget, MergeStrategy, Template};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositionError {
    #[error("template not found: {0}")]
    NotFound(String),
    #[error("template cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    #[error("template '{id}' resolves without required fields: {fields:?}")]
    Malformed { id: String, fields: Vec<&'static str> },
}

/// Resolves template ids into flattened, concrete templates.
pub struct TemplateComposer<'a> {
    store: &'a dyn TemplateStore,
    interpreter: &'a RuleInterpreter,
}

impl<'a> TemplateComposer<'a> {
    pub fn new(store: &'a dyn TemplateStore, interpreter: &'a RuleInterpreter) -> Self {
        Self { store, interpreter }
    }

    /// Resolve `id` into one concrete template.
    pub fn resolve(
        &self,
        id: &str,
        ctx: &AnalyzedContext,
        rng: &mut StdRng,
    ) -> Result<Template, CompositionError> {
        let mut path = Vec::new();
        let merged = self.build(id, ctx, rng, &mut path)?;

        let fields = merged.missing_fields();
        if !fields.is_empty() {
            return Err(CompositionError::Malformed {
                id: id.to_string(),
                fields,
            });
        }

        Ok(self.finalize(merged, ctx, rng))
    }

    fn build(
        &self,
        id: &str,
        ctx: &AnalyzedContext,
        rng: &mut StdRng,
        path: &mut Vec<String>,
    ) -> Result<Template, CompositionError> {
        if path.iter().any(|p| p == id) {
            let mut cycle = path.clone();
            cycle.push(id.to_string());
            return Err(CompositionError::Cycle(cycle));
        }
        let template = self
            .store
            .get(id)
            .ok_or_else(|| CompositionError::NotFound(id.to_string()))?;
        path.push(id.to_string());

        let mut result = match &template.extends {
            Some(parents) => {
                let mut base: Option<Template> = None;
                for parent_id in parents.ids() {
                    let parent = self.build(parent_id, ctx, rng, path)?;
                    base = Some(match base {
                        None => parent,
                        Some(acc) => overlay(acc, &parent),
                    });
                }
                match base {
                    Some(base) => overlay(base, template),
                    None => template.clone(),
                }
            }
            None => template.clone(),
        };

        for mixin_id in &template.mixins {
            let mixin = self.build(mixin_id, ctx, rng, path)?;
            result.choices.extend(mixin.choices);
            result.tags.extend(mixin.tags);
        }

        let mut entries = template.composition.clone();
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        for entry in &entries {
            if self.interpreter.evaluate_all(&entry.conditions, ctx, rng) {
                let part = self.build(&entry.template, ctx, rng, path)?;
                result = merge_part(result, part, entry.merge_strategy);
            }
        }

        path.pop();
        result.id = id.to_string();
        Ok(result)
    }

    fn finalize(&self, mut template: Template, ctx: &AnalyzedContext, rng: &mut StdRng) -> Template {
        // Choices keep their post-merge index so dynamic fields can find
        // them after conditional removal.
        let choices: Vec<(usize, Choice)> = std::mem::take(&mut template.choices)
            .into_iter()
            .enumerate()
            .collect();

        let mut hidden = BTreeSet::new();
        for entry in &template.conditional_choices {
            if entry.choice_index >= choices.len() {
                tracing::warn!(
                    template = %template.id,
                    index = entry.choice_index,
                    "conditional choice index out of range"
                );
                continue;
            }
            let passed = self.interpreter.evaluate_all(&entry.conditions, ctx, rng);
            if passed != entry.show_when {
                hidden.insert(entry.choice_index);
            }
        }
        let mut choices: Vec<(usize, Choice)> = choices
            .into_iter()
            .filter(|(i, _)| !hidden.contains(i))
            .collect();

        for field in &template.dynamic_fields {
            let passed = self.interpreter.evaluate_all(&field.conditions, ctx, rng);
            let value = if passed {
                Some(field.value_if_true.clone())
            } else {
                field.value_if_false.clone()
            };
            let Some(value) = value else { continue };
            match field.field {
                DynamicTarget::Title => template.title = Some(value),
                DynamicTarget::Narrative => template.narrative = Some(value),
                DynamicTarget::ChoiceText => {
                    let Some(idx) = field.choice_index else { continue };
                    if let Some((_, choice)) = choices.iter_mut().find(|(i, _)| *i == idx) {
                        choice.text = value;
                    }
                }
            }
        }

        template.choices = choices.into_iter().map(|(_, c)| c).collect();
        template.conditional_choices.clear();
        template.dynamic_fields.clear();
        template.extends = None;
        template.mixins.clear();
        template.composition.clear();
        template.replace.clear();
        template
    }
}

/// Lay `child` over `base`: child scalars win, collections concatenate
/// unless the child lists them in `replace`.
fn overlay(base: Template, child: &Template) -> Template {
    let replaces = |field: &str| child.replace.iter().any(|r| r == field);
    let mut out = base;

    out.id = child.id.clone();
    if child.title.is_some() {
        out.title = child.title.clone();
    }
    if child.narrative.is_some() {
        out.narrative = child.narrative.clone();
    }
    if child.difficulty.is_some() {
        out.difficulty = child.difficulty;
    }
    if child.challenge.is_some() {
        out.challenge = child.challenge;
    }
    if child.weight.is_some() {
        out.weight = child.weight;
    }
    if child.kind.is_some() {
        out.kind = child.kind.clone();
    }
    if child.theme.is_some() {
        out.theme = child.theme.clone();
    }
    if child.urgency.is_some() {
        out.urgency = child.urgency.clone();
    }
    out.is_abstract = child.is_abstract;

    if replaces("choices") {
        out.choices = child.choices.clone();
    } else {
        out.choices.extend(child.choices.iter().cloned());
    }
    if replaces("tags") {
        out.tags = child.tags.clone();
    } else {
        out.tags.extend(child.tags.iter().cloned());
    }
    out.conditions.extend(child.conditions.iter().cloned());
    out.conditional_choices
        .extend(child.conditional_choices.iter().cloned());
    out.dynamic_fields.extend(child.dynamic_fields.iter().cloned());

    // The child's own references are handled by the caller.
    out.extends = None;
    out.mixins.clear();
    out.composition.clear();
    out.replace.clear();
    out
}

fn join_text(first: Option<String>, second: Option<String>) -> Option<String> {
    match (first, second) {
        (Some(a), Some(b)) => Some(format!("{} {}", a, b)),
        (a, b) => a.or(b),
    }
}

fn merge_part(mut result: Template, part: Template, strategy: MergeStrategy) -> Template {
    match strategy {
        MergeStrategy::Append => {
            result.narrative = join_text(result.narrative, part.narrative);
            result.choices.extend(part.choices);
            result.tags.extend(part.tags);
        }
        MergeStrategy::Prepend => {
            result.narrative = join_text(part.narrative, result.narrative);
            let mut choices = part.choices;
            choices.append(&mut result.choices);
            result.choices = choices;
            let mut tags = part.tags;
            tags.append(&mut result.tags);
            result.tags = tags;
        }
        MergeStrategy::Replace => {
            if part.title.is_some() {
                result.title = part.title;
            }
            if part.narrative.is_some() {
                result.narrative = part.narrative;
            }
            if part.difficulty.is_some() {
                result.difficulty = part.difficulty;
            }
            if part.kind.is_some() {
                result.kind = part.kind;
            }
            if part.theme.is_some() {
                result.theme = part.theme;
            }
            if !part.choices.is_empty() {
                result.choices = part.choices;
            }
            if !part.tags.is_empty() {
                result.tags = part.tags;
            }
        }
        MergeStrategy::Merge => {
            result.title = result.title.or(part.title);
            result.narrative = result.narrative.or(part.narrative);
            result.difficulty = result.difficulty.or(part.difficulty);
            result.kind = result.kind.or(part.kind);
            result.theme = result.theme.or(part.theme);
            result.urgency = result.urgency.or(part.urgency);
            result.choices.extend(part.choices);
            for tag in part.tags {
                if !result.tags.contains(&tag) {
                    result.tags.push(tag);
                }
            }
        }
    }
    result
}

/// A problem found by [`lint_library`].
#[derive(Debug, Clone, PartialEq)]
pub struct LintIssue {
    pub template: String,
    pub message: String,
}

/// Static checks over a whole store: dangling references, reference
/// cycles, and selectable templates that fail to resolve under a default
/// context.
pub fn lint_library(store: &dyn TemplateStore, interpreter: &RuleInterpreter) -> Vec<LintIssue> {
    let mut issues = Vec::new();
    let all = store.query(&TemplateFilter {
        include_abstract: true,
        ..TemplateFilter::default()
    });

    for template in &all {
        for reference in template.references() {
            if store.get(reference).is_none() {
                issues.push(LintIssue {
                    template: template.id.clone(),
                    message: format!("references missing template '{}'", reference),
                });
            }
        }
        if let Some(cycle) = find_cycle(store, &template.id, &mut Vec::new()) {
            issues.push(LintIssue {
                template: template.id.clone(),
                message: format!("reference cycle: {}", cycle.join(" -> ")),
            });
        }
    }

    let ctx = analyze_context(&Context::new());
    let composer = TemplateComposer::new(store, interpreter);
    for template in all.iter().filter(|t| !t.is_abstract) {
        let mut rng = StdRng::seed_from_u64(0);
        match composer.resolve(&template.id, &ctx, &mut rng) {
            Ok(_) | Err(CompositionError::NotFound(_)) | Err(CompositionError::Cycle(_)) => {}
            Err(e) => issues.push(LintIssue {
                template: template.id.clone(),
                message: e.to_string(),
            }),
        }
    }
    issues
}

fn find_cycle(store: &dyn TemplateStore, id: &str, path: &mut Vec<String>) -> Option<Vec<String>> {
    if path.iter().any(|p| p == id) {
        let mut cycle = path.clone();
        cycle.push(id.to_string());
        return Some(cycle);
    }
    let template = store.get(id)?;
    path.push(id.to_string());
    for reference in template.references() {
        if let Some(cycle) = find_cycle(store, reference, path) {
            return Some(cycle);
        }
    }
    path.pop();
    None
}
