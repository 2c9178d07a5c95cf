//! Declarative attribute parsing
//!
//! An element declares its behaviors in one attribute, either as JSON:
//!
//! ```html
//! <nav data-elemental='[{"name":"menuAim","options":{"delay":300}}]'></nav>
//! ```
//!
//! or as whitespace-separated names:
//!
//! ```html
//! <nav data-elemental="menuAim stickyHeader"></nav>
//! ```
//!
//! Parsing splits every entry into an immutable [`Declaration`] and the
//! mutable [`DeclarationState`] the lifecycle manager writes back (`processed`
//! and `id`). Serialization joins them again as compact JSON with a stable
//! key order: `name`, `options`, `isActiveOn`, unknown keys, `processed`, `id`.

use serde_json::{Map, Value};

use crate::elemental::Options;
use crate::error::DeclarationError;

const NAME: &str = "name";
const OPTIONS: &str = "options";
const IS_ACTIVE_ON: &str = "isActiveOn";
const PROCESSED: &str = "processed";
const ID: &str = "id";

/// Configuration of one declared behavior
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    /// Options passed to the factory
    pub options: Option<Value>,
    /// Viewports the behavior is restricted to
    pub is_active_on: Option<Value>,
    /// Keys this crate does not interpret, kept for round-tripping
    pub extra: Options,
}

/// Lifecycle state persisted next to a declaration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarationState {
    pub processed: Option<bool>,
    pub id: Option<String>,
}

impl DeclarationState {
    pub fn is_processed(&self) -> bool {
        self.processed == Some(true)
    }
}

impl Declaration {
    /// Declaration with only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: None,
            is_active_on: None,
            extra: Options::new(),
        }
    }

    /// Whether the behavior should run behind a responsive controller
    pub fn is_responsive(&self) -> bool {
        !matches!(self.is_active_on, None | Some(Value::Null))
    }

    fn from_entry(entry: Value) -> Result<(Self, DeclarationState), DeclarationError> {
        let mut map = match entry {
            Value::String(name) => return Ok((Self::named(name), DeclarationState::default())),
            Value::Object(map) => map,
            other => {
                return Err(DeclarationError::Invalid(format!(
                    "expected an object or a name, got {}",
                    other
                )))
            }
        };

        let name = match map.shift_remove(NAME) {
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(DeclarationError::Invalid(format!(
                    "name must be a string, got {}",
                    other
                )))
            }
            None => return Err(DeclarationError::Invalid("missing name".to_string())),
        };

        let processed = match map.shift_remove(PROCESSED) {
            None | Some(Value::Null) => None,
            Some(Value::Bool(processed)) => Some(processed),
            Some(other) => {
                return Err(DeclarationError::Invalid(format!(
                    "processed of '{}' must be a boolean, got {}",
                    name, other
                )))
            }
        };

        let id = match map.shift_remove(ID) {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id),
            Some(Value::Number(id)) => Some(id.to_string()),
            Some(other) => {
                return Err(DeclarationError::Invalid(format!(
                    "id of '{}' must be a string, got {}",
                    name, other
                )))
            }
        };

        let options = map.shift_remove(OPTIONS);
        let is_active_on = map.shift_remove(IS_ACTIVE_ON);

        Ok((
            Self {
                name,
                options,
                is_active_on,
                extra: map,
            },
            DeclarationState { processed, id },
        ))
    }

    /// JSON form of the declaration combined with its state
    pub fn to_json(&self, state: &DeclarationState) -> Value {
        let mut map = Map::new();
        map.insert(NAME.to_string(), Value::String(self.name.clone()));
        if let Some(options) = &self.options {
            map.insert(OPTIONS.to_string(), options.clone());
        }
        if let Some(is_active_on) = &self.is_active_on {
            map.insert(IS_ACTIVE_ON.to_string(), is_active_on.clone());
        }
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        if let Some(processed) = state.processed {
            map.insert(PROCESSED.to_string(), Value::Bool(processed));
        }
        if let Some(id) = &state.id {
            map.insert(ID.to_string(), Value::String(id.clone()));
        }
        Value::Object(map)
    }
}

/// Whether attribute content should be read as JSON
fn looks_like_json(content: &str) -> bool {
    content.contains(&['[', ']', '{', '}'][..])
}

/// Parse the content of a declaration attribute
pub fn parse_declarations(
    content: &str,
) -> Result<Vec<(Declaration, DeclarationState)>, DeclarationError> {
    if !looks_like_json(content) {
        return Ok(content
            .split_whitespace()
            .map(|name| (Declaration::named(name), DeclarationState::default()))
            .collect());
    }

    let entries = match serde_json::from_str::<Value>(content)? {
        Value::Array(entries) => entries,
        object @ Value::Object(_) => vec![object],
        other => {
            return Err(DeclarationError::Invalid(format!(
                "expected an array or an object, got {}",
                other
            )))
        }
    };
    entries.into_iter().map(Declaration::from_entry).collect()
}

/// Serialize declarations back into attribute content
pub fn serialize_declarations(entries: &[(Declaration, DeclarationState)]) -> String {
    Value::Array(
        entries
            .iter()
            .map(|(declaration, state)| declaration.to_json(state))
            .collect(),
    )
    .to_string()
}
