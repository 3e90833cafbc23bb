//! Template storage: the source the engine reads templates from.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::schema::template::Template;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("template '{id}' is missing required fields: {fields:?}")]
    MissingFields { id: String, fields: Vec<&'static str> },
    #[error("template has an empty id")]
    EmptyId,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Filter for [`TemplateStore::query`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateFilter {
    pub tag: Option<String>,
    pub kind: Option<String>,
    /// Include fragments marked `abstract`.
    pub include_abstract: bool,
}

impl TemplateFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn tagged(tag: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, template: &Template) -> bool {
        if template.is_abstract && !self.include_abstract {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !template.has_tag(tag) {
                return false;
            }
        }
        if let Some(kind) = &self.kind {
            if template.kind.as_deref() != Some(kind.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Anything that can hand templates to the engine.
///
/// `query` must return templates in a stable order so selection stays
/// reproducible under a fixed seed.
pub trait TemplateStore {
    fn get(&self, id: &str) -> Option<&Template>;
    fn put(&mut self, template: Template) -> Result<(), LibraryError>;
    fn query(&self, filter: &TemplateFilter) -> Vec<&Template>;
}

/// Reject templates that cannot stand on their own.
///
/// Templates that extend another, and abstract fragments, are checked
/// after composition instead.
pub fn validate(template: &Template) -> Result<(), LibraryError> {
    if template.id.is_empty() {
        return Err(LibraryError::EmptyId);
    }
    if template.extends.is_some() || template.is_abstract {
        return Ok(());
    }
    let fields = template.missing_fields();
    if !fields.is_empty() {
        return Err(LibraryError::MissingFields {
            id: template.id.clone(),
            fields,
        });
    }
    Ok(())
}

/// In-memory template store ordered by id.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: BTreeMap<String, Template>,
}

/// Accepted library file shapes: `{ "id": {...} }` or `[{ "id": ..., ... }]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum LibraryFile {
    Keyed(BTreeMap<String, Template>),
    Listed(Vec<Template>),
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a library from JSON. The whole file is rejected if any
    /// template is malformed.
    pub fn from_json(input: &str) -> Result<Self, LibraryError> {
        let templates = match serde_json::from_str::<LibraryFile>(input)? {
            LibraryFile::Keyed(map) => map
                .into_iter()
                .map(|(key, mut t)| {
                    if t.id.is_empty() {
                        t.id = key;
                    }
                    t
                })
                .collect::<Vec<_>>(),
            LibraryFile::Listed(list) => list,
        };

        let mut library = Self::new();
        for template in templates {
            library.put(template)?;
        }
        Ok(library)
    }

    pub fn load_json(path: &Path) -> Result<Self, LibraryError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Merge another library into this one. Templates from `other`
    /// override templates with the same id.
    pub fn merge(&mut self, other: TemplateLibrary) {
        self.templates.extend(other.templates);
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }
}

impl TemplateStore for TemplateLibrary {
    fn get(&self, id: &str) -> Option<&Template> {
        self.templates.get(id)
    }

    fn put(&mut self, template: Template) -> Result<(), LibraryError> {
        validate(&template)?;
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    fn query(&self, filter: &TemplateFilter) -> Vec<&Template> {
        self.templates.values().filter(|t| filter.matches(t)).collect()
    }
}
