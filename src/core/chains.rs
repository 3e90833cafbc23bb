//! Calendar and multi-stage event chains.
//!
//! A chain instance walks its stages in order. A stage fires once its day
//! (counted from the instance's start) has been reached; a stage with a
//! `triggerNext` gate then holds the instance until the player makes the
//! matching choice. `completed_stages` is checked before every emission so
//! a stage can never fire twice for the same instance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::config::CalendarConfig;
use crate::schema::chain::{ChainDefinition, ChainInstance, StageTrigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Default for Season {
    fn default() -> Self {
        Self::Spring
    }
}

impl Season {
    pub fn next(self) -> Self {
        match self {
            Self::Spring => Self::Summer,
            Self::Summer => Self::Autumn,
            Self::Autumn => Self::Winter,
            Self::Winter => Self::Spring,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Spring => "spring",
            Self::Summer => "summer",
            Self::Autumn => "autumn",
            Self::Winter => "winter",
        }
    }
}

fn default_days_per_season() -> u32 {
    CalendarConfig::default().days_per_season
}

/// In-game calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSystem {
    pub current_day: u32,
    pub current_season: Season,
    pub game_year: u32,
    #[serde(skip, default = "default_days_per_season")]
    pub days_per_season: u32,
}

impl Default for TimeSystem {
    fn default() -> Self {
        Self::new(&CalendarConfig::default())
    }
}

impl TimeSystem {
    pub fn new(config: &CalendarConfig) -> Self {
        Self {
            current_day: 0,
            current_season: config.start_season,
            game_year: config.start_year,
            days_per_season: config.days_per_season,
        }
    }

    /// Move one day forward, rotating the season every
    /// `days_per_season` days. Leaving winter starts a new year.
    pub fn advance_day(&mut self) {
        self.current_day += 1;
        if self.days_per_season > 0 && self.current_day % self.days_per_season == 0 {
            self.current_season = self.current_season.next();
            if self.current_season == Season::Spring {
                self.game_year += 1;
            }
        }
    }
}

/// Registered chain definitions plus running and finished instances.
#[derive(Debug, Clone, Default)]
pub struct ChainScheduler {
    definitions: BTreeMap<String, ChainDefinition>,
    active: Vec<ChainInstance>,
    completed: Vec<ChainInstance>,
    next_instance: u64,
    time: TimeSystem,
}

impl ChainScheduler {
    pub fn new(calendar: &CalendarConfig) -> Self {
        Self {
            time: TimeSystem::new(calendar),
            ..Self::default()
        }
    }

    pub fn time(&self) -> &TimeSystem {
        &self.time
    }

    pub fn register_chain(&mut self, id: &str, mut definition: ChainDefinition) {
        definition.id = id.to_string();
        self.definitions.insert(id.to_string(), definition);
    }

    pub fn definition(&self, id: &str) -> Option<&ChainDefinition> {
        self.definitions.get(id)
    }

    /// Start a new instance of `chain_id` today. Returns the instance id
    /// and any stages already due, or `None` for an unknown chain.
    pub fn start_chain(&mut self, chain_id: &str) -> Option<(String, Vec<StageTrigger>)> {
        let definition = self.definitions.get(chain_id)?.clone();
        self.next_instance += 1;
        let instance_id = format!("{}#{}", chain_id, self.next_instance);

        let mut instance = ChainInstance {
            id: instance_id.clone(),
            definition,
            stage: 0,
            start_day: self.time.current_day,
            completed_stages: Default::default(),
        };
        let mut triggers = Vec::new();
        fire_due_stages(&mut instance, self.time.current_day, &mut triggers);
        tracing::debug!(chain = chain_id, instance = %instance_id, fired = triggers.len(), "chain started");

        if instance.is_finished() {
            self.completed.push(instance);
        } else {
            self.active.push(instance);
        }
        Some((instance_id, triggers))
    }

    /// Resolve a choice gate. The instance moves on only when the current
    /// stage has fired and `consequence` matches its gate; stages that are
    /// then due fire immediately. `None` for an unknown instance.
    pub fn make_choice(&mut self, instance_id: &str, consequence: &str) -> Option<Vec<StageTrigger>> {
        let index = self.active.iter().position(|i| i.id == instance_id)?;
        let today = self.time.current_day;
        let instance = &mut self.active[index];

        let mut triggers = Vec::new();
        let gate = instance
            .definition
            .stages
            .get(instance.stage)
            .and_then(|s| s.trigger_next.as_ref());
        let open = match gate {
            Some(gate) => gate.choice == consequence && instance.completed_stages.contains(&instance.stage),
            None => false,
        };
        if open {
            instance.stage += 1;
            fire_due_stages(instance, today, &mut triggers);
        }

        if instance.is_finished() {
            let done = self.active.remove(index);
            self.completed.push(done);
        }
        Some(triggers)
    }

    /// Advance the calendar one day and fire every stage that is now due,
    /// across all active instances, ordered by scheduled day.
    pub fn advance_day(&mut self) -> Vec<StageTrigger> {
        self.time.advance_day();
        let today = self.time.current_day;

        let mut triggers = Vec::new();
        for instance in &mut self.active {
            fire_due_stages(instance, today, &mut triggers);
        }

        let (finished, running): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.active).into_iter().partition(|i| i.is_finished());
        self.active = running;
        self.completed.extend(finished);

        triggers.sort_by_key(|t| t.day);
        triggers
    }

    pub fn advance_days(&mut self, days: u32) -> Vec<StageTrigger> {
        let mut triggers = Vec::new();
        for _ in 0..days {
            triggers.extend(self.advance_day());
        }
        triggers
    }

    pub fn active_chains(&self) -> &[ChainInstance] {
        &self.active
    }

    pub fn completed_chains(&self) -> &[ChainInstance] {
        &self.completed
    }

    /// Replace the calendar and in-flight instances, dropping chains
    /// completed before the restore. The calendar keeps its configured
    /// season length.
    pub fn restore(&mut self, mut time: TimeSystem, active: Vec<ChainInstance>) {
        time.days_per_season = self.time.days_per_season;
        self.time = time;
        let highest = active
            .iter()
            .filter_map(|i| i.id.rsplit('#').next()?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        self.next_instance = self.next_instance.max(highest);
        self.active = active;
        self.completed.clear();
    }
}

fn fire_due_stages(instance: &mut ChainInstance, today: u32, triggers: &mut Vec<StageTrigger>) {
    let days = instance.definition.stage_days();
    while !instance.is_finished() {
        let index = instance.stage;
        let due = instance.start_day.saturating_add(days[index]);
        if today < due {
            break;
        }
        let stage = &instance.definition.stages[index];
        if instance.completed_stages.insert(index) {
            tracing::debug!(instance = %instance.id, stage = index, template = %stage.template, "chain stage fired");
            triggers.push(StageTrigger {
                instance_id: instance.id.clone(),
                chain_id: instance.definition.id.clone(),
                stage_index: index,
                template: stage.template.clone(),
                day: due,
            });
        }
        if stage.trigger_next.is_some() {
            break;
        }
        instance.stage += 1;
    }
}
