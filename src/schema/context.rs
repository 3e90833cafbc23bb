use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Caller-supplied facts about the current situation.
///
/// The engine does not prescribe a schema: any JSON object is accepted.
/// Fields the analyzer recognizes (age, wealth, influence, reputation,
/// career, skills, relationships, location, season, ...) get defaults
/// when missing; everything else is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(pub Map<String, Value>);

/// One relationship entry as it appears inside a context.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextRelationship {
    pub id: String,
    pub kind: Option<String>,
    pub strength: f64,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a context from a JSON object string.
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    /// Builder-style setter.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Top-level numeric field.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Top-level string field.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Look up a numeric stat by name.
    ///
    /// Checks, in order: a top-level number, `skills.<name>`,
    /// `stats.<name>`, then a dotted path such as `skills.combat`.
    pub fn stat(&self, name: &str) -> Option<f64> {
        if let Some(n) = self.number(name) {
            return Some(n);
        }
        for section in ["skills", "stats"] {
            if let Some(n) = self
                .0
                .get(section)
                .and_then(|s| s.get(name))
                .and_then(Value::as_f64)
            {
                return Some(n);
            }
        }
        self.path(name).and_then(Value::as_f64)
    }

    /// Resolve a dotted path (`a.b.c`) against the context.
    pub fn path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Inventory membership. Accepts `inventory` as an array of names or
    /// an object whose keys are item names (with positive counts).
    pub fn has_item(&self, item: &str) -> bool {
        match self.0.get("inventory") {
            Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(item)),
            Some(Value::Object(map)) => match map.get(item) {
                Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0) > 0.0,
                Some(Value::Bool(b)) => *b,
                Some(Value::Null) | None => false,
                Some(_) => true,
            },
            _ => false,
        }
    }

    /// Sum of every numeric value under `skills`.
    pub fn skills_total(&self) -> f64 {
        match self.0.get("skills") {
            Some(Value::Object(map)) => map.values().filter_map(Value::as_f64).sum(),
            _ => 0.0,
        }
    }

    /// Relationship entries, from either an array of objects
    /// (`[{ "id": "mira", "type": "friend", "strength": 40 }]`) or an object
    /// keyed by id whose values are a strength or an entry object.
    pub fn relationships(&self) -> Vec<ContextRelationship> {
        match self.0.get("relationships") {
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(map) => relationship_from_map(
                        map.get("id")
                            .or_else(|| map.get("name"))
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| i.to_string()),
                        map,
                    ),
                    Value::String(name) => ContextRelationship {
                        id: name.clone(),
                        kind: None,
                        strength: 0.0,
                    },
                    _ => ContextRelationship {
                        id: i.to_string(),
                        kind: None,
                        strength: 0.0,
                    },
                })
                .collect(),
            Some(Value::Object(entries)) => entries
                .iter()
                .map(|(id, entry)| match entry {
                    Value::Object(map) => relationship_from_map(id.clone(), map),
                    other => ContextRelationship {
                        id: id.clone(),
                        kind: None,
                        strength: other.as_f64().unwrap_or(0.0),
                    },
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn relationship_count(&self) -> usize {
        match self.0.get("relationships") {
            Some(Value::Array(items)) => items.len(),
            Some(Value::Object(map)) => map.len(),
            _ => 0,
        }
    }
}

fn relationship_from_map(id: String, map: &Map<String, Value>) -> ContextRelationship {
    ContextRelationship {
        id,
        kind: map
            .get("type")
            .or_else(|| map.get("status"))
            .or_else(|| map.get("relationship"))
            .and_then(Value::as_str)
            .map(str::to_string),
        strength: map.get("strength").and_then(Value::as_f64).unwrap_or(0.0),
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Four-bucket difficulty derived from power level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyTier {
    Easy,
    Normal,
    Hard,
    Legendary,
}

impl Default for DifficultyTier {
    fn default() -> Self {
        Self::Normal
    }
}

impl DifficultyTier {
    /// Step function over power level. No hysteresis.
    pub fn from_power(power_level: f64) -> Self {
        if power_level <= 50.0 {
            Self::Easy
        } else if power_level <= 150.0 {
            Self::Normal
        } else if power_level <= 300.0 {
            Self::Hard
        } else {
            Self::Legendary
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Normal => "normal",
            Self::Hard => "hard",
            Self::Legendary => "legendary",
        }
    }

    /// Urgency label used when a template does not set one.
    pub fn urgency(&self) -> &'static str {
        match self {
            Self::Easy => "low",
            Self::Normal => "normal",
            Self::Hard => "high",
            Self::Legendary => "critical",
        }
    }
}

/// Immutable snapshot of a context plus derived metrics.
///
/// Rebuilt on every generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedContext {
    pub raw: Context,
    pub social_standing: f64,
    pub power_level: f64,
    pub life_experience: f64,
    pub difficulty_tier: DifficultyTier,
}

impl AnalyzedContext {
    /// Like [`Context::stat`], but also answers the derived metrics by name.
    pub fn stat(&self, name: &str) -> Option<f64> {
        match name {
            "power_level" => Some(self.power_level),
            "social_standing" => Some(self.social_standing),
            "life_experience" => Some(self.life_experience),
            _ => self.raw.stat(name),
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match key {
            "difficulty_tier" => Some(self.difficulty_tier.name()),
            _ => self.raw.text(key),
        }
    }

    pub fn number(&self, key: &str) -> f64 {
        self.stat(key).unwrap_or(0.0)
    }

    /// Render a field for text interpolation.
    pub fn display(&self, key: &str) -> Option<String> {
        if let Some(text) = self.text(key) {
            return Some(text.to_string());
        }
        match self.raw.path(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => self.stat(key).map(|n| format!("{}", n.round())),
        }
    }
}
