use std::collections::BTreeSet;
use std::fmt;

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::price::PriceRange;

pub const UNSPECIFIED: &str = "unspecified";

const FALLBACK_QUERY: &str = "laptop recommendations";
const QUERY_SUFFIX: &str = "best laptop recommendations";

/// The seven laptop requirements tracked for a session, in asking order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceField {
    Purpose,
    Processor,
    Ram,
    Storage,
    Graphics,
    Display,
    PriceRange,
}

impl PreferenceField {
    pub const ALL: [PreferenceField; 7] = [
        PreferenceField::Purpose,
        PreferenceField::Processor,
        PreferenceField::Ram,
        PreferenceField::Storage,
        PreferenceField::Graphics,
        PreferenceField::Display,
        PreferenceField::PriceRange,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Purpose => "purpose",
            Self::Processor => "processor",
            Self::Ram => "ram",
            Self::Storage => "storage",
            Self::Graphics => "graphics",
            Self::Display => "display",
            Self::PriceRange => "price_range",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Purpose => "Purpose",
            Self::Processor => "Processor",
            Self::Ram => "RAM",
            Self::Storage => "Storage",
            Self::Graphics => "Graphics",
            Self::Display => "Display",
            Self::PriceRange => "Price Range",
        }
    }

    /// Resolves a boundary key (JSON field name or loose label) to a field.
    pub fn from_key(key: &str) -> Option<Self> {
        let normalized = key.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "purpose" | "purposes" => Some(Self::Purpose),
            "processor" | "cpu" => Some(Self::Processor),
            "ram" | "memory" => Some(Self::Ram),
            "storage" => Some(Self::Storage),
            "graphics" | "gpu" => Some(Self::Graphics),
            "display" | "screen" => Some(Self::Display),
            "price_range" | "pricerange" | "price" | "budget" => Some(Self::PriceRange),
            _ => None,
        }
    }

    /// Concrete options offered when a question has to be repeated.
    pub fn examples(self) -> &'static [&'static str] {
        match self {
            Self::Purpose => &["video editing", "coding", "gaming", "study", "office work"],
            Self::Processor => {
                &["Intel Core i5", "Intel Core i7", "AMD Ryzen 5", "AMD Ryzen 7", "Apple M3"]
            }
            Self::Ram => &["8GB", "16GB", "32GB"],
            Self::Storage => &["256GB SSD", "512GB SSD", "1TB SSD", "1TB SSD + 1TB HDD"],
            Self::Graphics => {
                &["Integrated graphics", "NVIDIA RTX 4050", "NVIDIA RTX 4060", "AMD Radeon RX"]
            }
            Self::Display => &["15.6\" IPS Full HD", "14\" OLED", "16\" QHD 165Hz", "13\" LED"],
            Self::PriceRange => {
                &["Under Rs 40000", "Rs 40000 - Rs 45000", "Rs 45000 - Rs 50000", "Above Rs 50000"]
            }
        }
    }
}

impl fmt::Display for PreferenceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    #[default]
    NotAsked,
    AskedOnce,
    AskedWithExamples,
    Specified,
    Unspecified,
}

impl FieldStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Specified | Self::Unspecified)
    }

    pub fn is_awaiting_answer(self) -> bool {
        matches!(self, Self::AskedOnce | Self::AskedWithExamples)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Purposes(BTreeSet<String>),
    Text(String),
    Budget(PriceRange),
    Unspecified,
}

impl FieldValue {
    pub fn is_unspecified(&self) -> bool {
        matches!(self, Self::Unspecified)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Purposes(purposes) => purposes.is_empty(),
            Self::Text(text) => text.trim().is_empty(),
            Self::Budget(_) | Self::Unspecified => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn purposes(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Purposes(purposes) => Some(purposes),
            _ => None,
        }
    }

    pub fn budget(&self) -> Option<&PriceRange> {
        match self {
            Self::Budget(range) => Some(range),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Purposes(purposes) => {
                let joined = purposes.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
                f.write_str(&joined)
            }
            Self::Text(text) => f.write_str(text),
            Self::Budget(range) => write!(f, "{range}"),
            Self::Unspecified => f.write_str(UNSPECIFIED),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Purposes(purposes) => purposes.serialize(serializer),
            Self::Text(text) => serializer.serialize_str(text),
            Self::Budget(range) => range.serialize(serializer),
            Self::Unspecified => serializer.serialize_str(UNSPECIFIED),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFieldValue {
    List(Vec<String>),
    Range(PriceRange),
    Text(String),
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = match RawFieldValue::deserialize(deserializer)? {
            RawFieldValue::List(items) => {
                let purposes = items
                    .iter()
                    .map(|item| item.trim().to_lowercase())
                    .filter(|item| !item.is_empty() && item != UNSPECIFIED)
                    .collect::<BTreeSet<_>>();
                if purposes.is_empty() {
                    FieldValue::Unspecified
                } else {
                    FieldValue::Purposes(purposes)
                }
            }
            RawFieldValue::Range(range) => FieldValue::Budget(range),
            RawFieldValue::Text(text) if is_unspecified_text(&text) => FieldValue::Unspecified,
            RawFieldValue::Text(text) => FieldValue::Text(text),
        };
        Ok(value)
    }
}

pub(crate) fn is_unspecified_text(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(UNSPECIFIED)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceSlot {
    #[serde(default)]
    pub value: Option<FieldValue>,
    #[serde(default)]
    pub status: FieldStatus,
}

impl PreferenceSlot {
    fn check(&self, field: PreferenceField) -> Result<(), String> {
        match (self.status, &self.value) {
            (FieldStatus::Specified, Some(value)) if !value.is_empty() && !value.is_unspecified() => {
                Ok(())
            }
            (FieldStatus::Specified, _) => {
                Err(format!("`{}` is specified but carries no value", field.key()))
            }
            (FieldStatus::Unspecified, Some(FieldValue::Unspecified)) => Ok(()),
            (FieldStatus::Unspecified, _) => {
                Err(format!("`{}` is unspecified but carries a value", field.key()))
            }
            (_, None) => Ok(()),
            (_, Some(_)) => {
                Err(format!("`{}` carries a value before it was resolved", field.key()))
            }
        }
    }
}

/// One session's laptop requirements: exactly seven slots in fixed order.
///
/// Values are threaded through the updater and controller by value; a
/// RecommendationSet keeps its own copy, so later edits never leak backwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreferenceRecord {
    slots: [PreferenceSlot; 7],
}

impl PreferenceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, field: PreferenceField) -> &PreferenceSlot {
        &self.slots[field.index()]
    }

    pub fn status(&self, field: PreferenceField) -> FieldStatus {
        self.slot(field).status
    }

    pub fn value(&self, field: PreferenceField) -> Option<&FieldValue> {
        self.slot(field).value.as_ref()
    }

    /// Value of a field only when it resolved to something usable.
    pub fn specified_value(&self, field: PreferenceField) -> Option<&FieldValue> {
        let slot = self.slot(field);
        if slot.status != FieldStatus::Specified {
            return None;
        }
        slot.value.as_ref().filter(|value| !value.is_unspecified() && !value.is_empty())
    }

    pub fn specified_text(&self, field: PreferenceField) -> Option<String> {
        self.specified_value(field).map(ToString::to_string)
    }

    pub fn budget(&self) -> Option<&PriceRange> {
        self.specified_value(PreferenceField::PriceRange).and_then(FieldValue::budget)
    }

    pub fn purposes(&self) -> Vec<String> {
        match self.specified_value(PreferenceField::Purpose) {
            Some(FieldValue::Purposes(purposes)) => purposes.iter().cloned().collect(),
            Some(other) => vec![other.to_string()],
            None => Vec::new(),
        }
    }

    pub fn missing_fields(&self) -> Vec<PreferenceField> {
        PreferenceField::ALL
            .into_iter()
            .filter(|field| !self.status(*field).is_terminal())
            .collect()
    }

    pub fn unspecified_fields(&self) -> Vec<PreferenceField> {
        PreferenceField::ALL
            .into_iter()
            .filter(|field| self.status(*field) == FieldStatus::Unspecified)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Field currently waiting on the user, if a question is outstanding.
    pub fn awaiting_field(&self) -> Option<PreferenceField> {
        PreferenceField::ALL.into_iter().find(|field| self.status(*field).is_awaiting_answer())
    }

    /// Deterministic search query; depends only on the final field values.
    ///
    /// Parsed budgets appear in normalised form ("INR 40000-45000"), not as typed.
    pub fn search_text(&self) -> String {
        let mut parts = Vec::new();

        for field in PreferenceField::ALL {
            let Some(value) = self.specified_value(field) else {
                continue;
            };
            match value {
                FieldValue::Purposes(purposes) => {
                    parts.extend(purposes.iter().map(|purpose| format!("{purpose} laptop")));
                }
                other => parts.push(query_phrase(field, &other.to_string())),
            }
        }

        if parts.is_empty() {
            return FALLBACK_QUERY.to_string();
        }
        format!("{} {QUERY_SUFFIX}", parts.join(" "))
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Pretty `preferences_json` shape handed to the search collaborator.
    pub fn preferences_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub(crate) fn slot_mut(&mut self, field: PreferenceField) -> &mut PreferenceSlot {
        &mut self.slots[field.index()]
    }

    pub(crate) fn set_status(&mut self, field: PreferenceField, status: FieldStatus) {
        let slot = self.slot_mut(field);
        slot.status = status;
        if status == FieldStatus::Unspecified {
            slot.value = Some(FieldValue::Unspecified);
        }
    }
}

fn query_phrase(field: PreferenceField, value: &str) -> String {
    let value = value.trim();
    match field {
        PreferenceField::Purpose => format!("{value} laptop"),
        PreferenceField::Processor => format!("with {value} processor"),
        PreferenceField::Ram => format!("{value} RAM"),
        PreferenceField::Storage => format!("{value} storage"),
        PreferenceField::Graphics => format!("{value} graphics"),
        PreferenceField::Display => format!("{value} display"),
        PreferenceField::PriceRange => format!("within budget {value}"),
    }
}

impl Serialize for PreferenceRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(PreferenceField::ALL.len()))?;
        for field in PreferenceField::ALL {
            map.serialize_entry(field.key(), self.slot(field))?;
        }
        map.end()
    }
}

// Unknown keys are dropped by serde's default struct handling.
#[derive(Deserialize)]
struct RawPreferenceRecord {
    #[serde(default)]
    purpose: PreferenceSlot,
    #[serde(default)]
    processor: PreferenceSlot,
    #[serde(default)]
    ram: PreferenceSlot,
    #[serde(default)]
    storage: PreferenceSlot,
    #[serde(default)]
    graphics: PreferenceSlot,
    #[serde(default)]
    display: PreferenceSlot,
    #[serde(default)]
    price_range: PreferenceSlot,
}

impl<'de> Deserialize<'de> for PreferenceRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawPreferenceRecord::deserialize(deserializer)?;
        let record = PreferenceRecord {
            slots: [
                raw.purpose,
                raw.processor,
                raw.ram,
                raw.storage,
                raw.graphics,
                raw.display,
                raw.price_range,
            ],
        };

        for field in PreferenceField::ALL {
            record.slot(field).check(field).map_err(D::Error::custom)?;
        }
        Ok(record)
    }
}
