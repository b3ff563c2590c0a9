use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One listing as returned by the search collaborator, before any parsing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "text_blob")]
    pub specs: String,
    #[serde(default, deserialize_with = "text_blob")]
    pub price: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub pros: Vec<String>,
    #[serde(default)]
    pub cons: Vec<String>,
}

impl RawListing {
    pub fn new(
        title: impl Into<String>,
        specs: impl Into<String>,
        price: impl Into<String>,
    ) -> Self {
        Self { title: title.into(), specs: specs.into(), price: price.into(), ..Self::default() }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_pros<I, S>(mut self, pros: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pros = pros.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cons<I, S>(mut self, cons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cons = cons.into_iter().map(Into::into).collect();
        self
    }
}

// Search providers disagree on whether specs and prices are strings, numbers or objects.
fn text_blob<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(flatten_value(&value))
}

fn flatten_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Array(items) => {
            items.iter().map(flatten_value).filter(|item| !item.is_empty()).collect::<Vec<_>>().join(", ")
        }
        Value::Object(entries) => entries
            .iter()
            .map(|(key, value)| format!("{key}: {}", flatten_value(value)))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GroundingError {
    #[error("search collaborator unreachable after {attempts} attempt(s): {reason}")]
    Unavailable { attempts: u32, reason: String },
    #[error("search collaborator returned a malformed response: {0}")]
    MalformedResponse(String),
}

/// The only way the core reaches the outside world for listings.
#[async_trait]
pub trait SearchGrounding: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<RawListing>, GroundingError>;
}

#[async_trait]
impl<T> SearchGrounding for std::sync::Arc<T>
where
    T: SearchGrounding + ?Sized,
{
    async fn search(&self, query: &str) -> Result<Vec<RawListing>, GroundingError> {
        (**self).search(query).await
    }
}

/// Deterministic grounding that replays queued responses, then repeats a fallback.
///
/// Used by offline runs and tests; every query is recorded.
#[derive(Debug, Default)]
pub struct ScriptedSearchGrounding {
    queued: Mutex<VecDeque<Result<Vec<RawListing>, GroundingError>>>,
    fallback: Vec<RawListing>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedSearchGrounding {
    pub fn new(fallback: Vec<RawListing>) -> Self {
        Self { fallback, ..Self::default() }
    }

    pub fn with_response(self, response: Result<Vec<RawListing>, GroundingError>) -> Self {
        match self.queued.lock() {
            Ok(mut queued) => queued.push_back(response),
            Err(poisoned) => poisoned.into_inner().push_back(response),
        }
        self
    }

    pub fn queries(&self) -> Vec<String> {
        match self.queries.lock() {
            Ok(queries) => queries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl SearchGrounding for ScriptedSearchGrounding {
    async fn search(&self, query: &str) -> Result<Vec<RawListing>, GroundingError> {
        match self.queries.lock() {
            Ok(mut queries) => queries.push(query.to_string()),
            Err(poisoned) => poisoned.into_inner().push(query.to_string()),
        }
        let next = match self.queued.lock() {
            Ok(mut queued) => queued.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{RawListing, ScriptedSearchGrounding, SearchGrounding};

    #[test]
    fn raw_listings_accept_numeric_prices_and_structured_specs() {
        let listing: RawListing = serde_json::from_value(json!({
            "title": "Acer Nitro V",
            "specs": {"cpu": "Intel Core i5-13420H", "ram": "16GB"},
            "price": 62990,
            "unexpected": true
        }))
        .expect("listing");

        assert_eq!(listing.price, "62990");
        assert_eq!(listing.specs, "cpu: Intel Core i5-13420H, ram: 16GB");
        assert!(listing.link.is_none());
        assert!(listing.pros.is_empty());
    }

    #[tokio::test]
    async fn scripted_grounding_replays_then_falls_back() {
        let grounding = ScriptedSearchGrounding::new(vec![RawListing::new("Fallback", "", "1")])
            .with_response(Ok(Vec::new()));

        assert!(grounding.search("first").await.expect("queued").is_empty());
        assert_eq!(grounding.search("second").await.expect("fallback").len(), 1);
        assert_eq!(grounding.queries(), vec!["first".to_string(), "second".to_string()]);
    }
}
