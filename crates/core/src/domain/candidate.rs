use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::preference::PreferenceRecord;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId(pub String);

impl CandidateId {
    /// Listing key derived from the model title, stable across spacing and casing.
    pub fn from_title(title: &str) -> Self {
        let key = title
            .to_lowercase()
            .split(|character: char| !character.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        Self(key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecommendationSetId(pub String);

impl RecommendationSetId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateAttribute {
    Cpu,
    Ram,
    Gpu,
    Storage,
    Display,
    Price,
}

impl CandidateAttribute {
    pub const ALL: [CandidateAttribute; 6] = [
        CandidateAttribute::Cpu,
        CandidateAttribute::Ram,
        CandidateAttribute::Gpu,
        CandidateAttribute::Storage,
        CandidateAttribute::Display,
        CandidateAttribute::Price,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Cpu => "Processor",
            Self::Ram => "RAM",
            Self::Gpu => "Graphics",
            Self::Storage => "Storage",
            Self::Display => "Display",
            Self::Price => "Price",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSpecs {
    pub cpu: Option<String>,
    pub ram: Option<String>,
    pub gpu: Option<String>,
    pub storage: Option<String>,
    pub display: Option<String>,
}

impl CandidateSpecs {
    /// At least one of CPU, RAM, GPU or storage was recognised.
    pub fn has_core_spec(&self) -> bool {
        self.cpu.is_some() || self.ram.is_some() || self.gpu.is_some() || self.storage.is_some()
    }
}

/// Immutable snapshot of one grounded laptop listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Candidate {
    id: CandidateId,
    set_id: RecommendationSetId,
    title: String,
    specs: CandidateSpecs,
    price: Decimal,
    price_text: String,
    link: Option<String>,
    pros: Vec<String>,
    cons: Vec<String>,
}

impl Candidate {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: CandidateId,
        set_id: RecommendationSetId,
        title: String,
        specs: CandidateSpecs,
        price: Decimal,
        price_text: String,
        link: Option<String>,
        pros: Vec<String>,
        cons: Vec<String>,
    ) -> Self {
        Self { id, set_id, title, specs, price, price_text, link, pros, cons }
    }

    pub fn id(&self) -> &CandidateId {
        &self.id
    }

    pub fn set_id(&self) -> &RecommendationSetId {
        &self.set_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn specs(&self) -> &CandidateSpecs {
        &self.specs
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn price_text(&self) -> &str {
        &self.price_text
    }

    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    pub fn pros(&self) -> &[String] {
        &self.pros
    }

    pub fn cons(&self) -> &[String] {
        &self.cons
    }

    pub fn attribute(&self, attribute: CandidateAttribute) -> Option<String> {
        match attribute {
            CandidateAttribute::Cpu => self.specs.cpu.clone(),
            CandidateAttribute::Ram => self.specs.ram.clone(),
            CandidateAttribute::Gpu => self.specs.gpu.clone(),
            CandidateAttribute::Storage => self.specs.storage.clone(),
            CandidateAttribute::Display => self.specs.display.clone(),
            CandidateAttribute::Price => Some(self.price_text.clone()),
        }
    }
}

/// Ordered candidates together with the preferences that produced them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecommendationSet {
    id: RecommendationSetId,
    preferences: PreferenceRecord,
    search_text: String,
    candidates: Vec<Candidate>,
    created_at: DateTime<Utc>,
}

impl RecommendationSet {
    pub(crate) fn new(
        id: RecommendationSetId,
        preferences: PreferenceRecord,
        search_text: String,
        candidates: Vec<Candidate>,
    ) -> Self {
        Self { id, preferences, search_text, candidates, created_at: Utc::now() }
    }

    pub fn id(&self) -> &RecommendationSetId {
        &self.id
    }

    pub fn preferences(&self) -> &PreferenceRecord {
        &self.preferences
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn contains(&self, candidate: &Candidate) -> bool {
        candidate.set_id == self.id && self.candidates.iter().any(|own| own.id == candidate.id)
    }

    pub fn candidate(&self, id: &CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|candidate| &candidate.id == id)
    }

    /// One-based position as shown to the user.
    pub fn candidate_at(&self, position: usize) -> Option<&Candidate> {
        position.checked_sub(1).and_then(|index| self.candidates.get(index))
    }
}

#[cfg(test)]
mod tests {
    use super::CandidateId;

    #[test]
    fn candidate_ids_normalise_titles() {
        assert_eq!(
            CandidateId::from_title("  ASUS TUF Gaming F15 (2024) "),
            CandidateId("asus-tuf-gaming-f15-2024".to_string())
        );
        assert_eq!(
            CandidateId::from_title("asus tuf gaming f15 2024"),
            CandidateId::from_title("ASUS  TUF-Gaming F15 2024")
        );
    }
}
