use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::preference::{is_unspecified_text, PreferenceField};

/// A raw value proposed for one field, as extracted from the user's reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProposedValue {
    Purposes(Vec<String>),
    Text(String),
    Unspecified,
}

impl ProposedValue {
    fn normalized(self, field: PreferenceField) -> Option<Self> {
        match self {
            Self::Purposes(items) => {
                let trimmed = items
                    .into_iter()
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect::<Vec<_>>();
                if trimmed.is_empty() {
                    return None;
                }
                if trimmed.iter().all(|item| is_unspecified_text(item)) {
                    return Some(Self::Unspecified);
                }
                let concrete = trimmed
                    .into_iter()
                    .filter(|item| !is_unspecified_text(item))
                    .collect::<Vec<_>>();
                if field == PreferenceField::Purpose {
                    Some(Self::Purposes(concrete))
                } else {
                    Some(Self::Text(concrete.join(", ")))
                }
            }
            Self::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else if is_unspecified_text(trimmed) {
                    Some(Self::Unspecified)
                } else if field == PreferenceField::Purpose {
                    Some(Self::Purposes(vec![trimmed.to_string()]))
                } else {
                    Some(Self::Text(trimmed.to_string()))
                }
            }
            Self::Unspecified => Some(Self::Unspecified),
        }
    }
}

/// Sparse mapping of field to proposed value; the only input the updater accepts.
///
/// Unknown keys never reach the record: boundary constructors collect them in
/// `ignored_keys` so callers can log them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreferenceUpdate {
    entries: BTreeMap<PreferenceField, ProposedValue>,
    ignored_keys: Vec<String>,
}

impl PreferenceUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: PreferenceField, value: ProposedValue) -> Self {
        self.insert(field, value);
        self
    }

    pub fn with_text(self, field: PreferenceField, text: impl Into<String>) -> Self {
        self.with(field, ProposedValue::Text(text.into()))
    }

    pub fn with_purposes<I, S>(self, purposes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let purposes = purposes.into_iter().map(Into::into).collect();
        self.with(PreferenceField::Purpose, ProposedValue::Purposes(purposes))
    }

    pub fn with_unspecified(self, field: PreferenceField) -> Self {
        self.with(field, ProposedValue::Unspecified)
    }

    /// Inserts a proposal; empty values are dropped so they never resolve a field.
    pub fn insert(&mut self, field: PreferenceField, value: ProposedValue) {
        if let Some(value) = value.normalized(field) {
            self.entries.insert(field, value);
        }
    }

    /// Builds an update from a loosely keyed map such as `{"ram": "16GB"}`.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, ProposedValue)>,
        K: AsRef<str>,
    {
        let mut update = Self::new();
        for (key, value) in pairs {
            match PreferenceField::from_key(key.as_ref()) {
                Some(field) => update.insert(field, value),
                None => update.ignored_keys.push(key.as_ref().to_string()),
            }
        }
        update
    }

    /// Reads the structured output of the language collaborator.
    ///
    /// Strings, numbers and string arrays are accepted; nulls mean "not mentioned".
    pub fn from_json(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::new();
        };

        let mut update = Self::new();
        for (key, raw) in object {
            let Some(field) = PreferenceField::from_key(key) else {
                update.ignored_keys.push(key.clone());
                continue;
            };
            let proposed = match raw {
                Value::Null => continue,
                Value::String(text) => ProposedValue::Text(text.clone()),
                Value::Number(number) => ProposedValue::Text(number.to_string()),
                Value::Array(items) => ProposedValue::Purposes(
                    items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
                ),
                Value::Bool(_) | Value::Object(_) => {
                    update.ignored_keys.push(key.clone());
                    continue;
                }
            };
            update.insert(field, proposed);
        }
        update
    }

    pub fn get(&self, field: PreferenceField) -> Option<&ProposedValue> {
        self.entries.get(&field)
    }

    pub fn contains(&self, field: PreferenceField) -> bool {
        self.entries.contains_key(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = PreferenceField> + '_ {
        self.entries.keys().copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (PreferenceField, &ProposedValue)> + '_ {
        self.entries.iter().map(|(field, value)| (*field, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ignored_keys(&self) -> &[String] {
        &self.ignored_keys
    }

    pub fn remove(&mut self, field: PreferenceField) -> Option<ProposedValue> {
        self.entries.remove(&field)
    }

    /// Same update restricted to concrete values.
    pub fn concrete_only(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(_, value)| **value != ProposedValue::Unspecified)
                .map(|(field, value)| (*field, value.clone()))
                .collect(),
            ignored_keys: self.ignored_keys.clone(),
        }
    }
}
