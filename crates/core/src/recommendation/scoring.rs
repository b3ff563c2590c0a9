//! Match scoring of candidates against a PreferenceRecord

use std::cmp::Ordering;

use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::domain::candidate::Candidate;
use crate::domain::preference::{FieldValue, PreferenceField, PreferenceRecord};
use crate::recommendation::parse::capacity_gb;

const STOPWORDS: [&str; 12] =
    ["with", "and", "or", "any", "the", "a", "processor", "cpu", "graphics", "gpu", "display", "laptop"];
const INTEGRATED_HINTS: [&str; 5] = ["integrated", "iris", "uhd", "radeon graphics", "apple"];
const DEDICATED_HINTS: [&str; 6] = ["dedicated", "rtx", "gtx", "geforce", "nvidia", "radeon rx"];

/// Per-field weights for the proximity component
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchWeights {
    pub purpose: f64,
    pub processor: f64,
    pub ram: f64,
    pub storage: f64,
    pub graphics: f64,
    pub display: f64,
    pub price: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            purpose: 0.20,
            processor: 0.15,
            ram: 0.15,
            storage: 0.10,
            graphics: 0.15,
            display: 0.05,
            price: 0.20,
        }
    }
}

impl MatchWeights {
    fn weight(&self, field: PreferenceField) -> f64 {
        match field {
            PreferenceField::Purpose => self.purpose,
            PreferenceField::Processor => self.processor,
            PreferenceField::Ram => self.ram,
            PreferenceField::Storage => self.storage,
            PreferenceField::Graphics => self.graphics,
            PreferenceField::Display => self.display,
            PreferenceField::PriceRange => self.price,
        }
    }
}

/// How well one candidate fits the specified fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchScore {
    /// Specified fields the candidate satisfies outright.
    pub exact_matches: usize,
    /// Weighted closeness over all specified fields, 0.0..=1.0.
    pub proximity: f64,
    pub matched_fields: Vec<PreferenceField>,
}

impl MatchScore {
    /// Exact matches first, then proximity.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .exact_matches
            .cmp(&self.exact_matches)
            .then_with(|| other.proximity.partial_cmp(&self.proximity).unwrap_or(Ordering::Equal))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FieldFit {
    exact: bool,
    proximity: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MatchScorer {
    weights: MatchWeights,
}

impl MatchScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: MatchWeights) -> Self {
        Self { weights }
    }

    pub fn score(&self, record: &PreferenceRecord, candidate: &Candidate) -> MatchScore {
        let mut exact_matches = 0;
        let mut matched_fields = Vec::new();
        let mut weighted = 0.0;
        let mut total_weight = 0.0;

        for field in PreferenceField::ALL {
            let Some(value) = record.specified_value(field) else {
                continue;
            };
            let Some(fit) = field_fit(field, value, candidate) else {
                continue;
            };

            let weight = self.weights.weight(field);
            weighted += fit.proximity * weight;
            total_weight += weight;
            if fit.exact {
                exact_matches += 1;
                matched_fields.push(field);
            }
        }

        let proximity = if total_weight == 0.0 { 0.0 } else { (weighted / total_weight).min(1.0) };
        MatchScore { exact_matches, proximity, matched_fields }
    }
}

fn field_fit(field: PreferenceField, value: &FieldValue, candidate: &Candidate) -> Option<FieldFit> {
    let specs = candidate.specs();
    match field {
        PreferenceField::Purpose => {
            let haystack = candidate_text(candidate);
            let purposes = value.purposes()?;
            let hits =
                purposes.iter().filter(|purpose| purpose_matches(purpose, &haystack)).count();
            let proximity = hits as f64 / purposes.len().max(1) as f64;
            Some(FieldFit { exact: hits > 0, proximity })
        }
        PreferenceField::Processor => {
            Some(token_fit(&value.to_string(), specs.cpu.as_deref().unwrap_or_default()))
        }
        PreferenceField::Ram => capacity_fit(&value.to_string(), specs.ram.as_deref()),
        PreferenceField::Storage => capacity_fit(&value.to_string(), specs.storage.as_deref()),
        PreferenceField::Graphics => Some(graphics_fit(&value.to_string(), specs.gpu.as_deref())),
        PreferenceField::Display => {
            Some(token_fit(&value.to_string(), specs.display.as_deref().unwrap_or_default()))
        }
        PreferenceField::PriceRange => {
            let range = value.budget()?;
            let price = candidate.price();
            let exact = range.contains(price, rust_decimal::Decimal::ZERO);
            let proximity = match range.midpoint().and_then(|mid| mid.to_f64()) {
                Some(mid) if mid > 0.0 => {
                    let distance = (price.to_f64().unwrap_or(mid) - mid).abs() / mid;
                    (1.0 - distance).clamp(0.0, 1.0)
                }
                _ => 0.0,
            };
            Some(FieldFit { exact, proximity: if exact { proximity.max(0.5) } else { proximity } })
        }
    }
}

fn candidate_text(candidate: &Candidate) -> String {
    let specs = candidate.specs();
    let mut parts = vec![candidate.title().to_string()];
    parts.extend(
        [&specs.cpu, &specs.gpu, &specs.display, &specs.ram, &specs.storage]
            .into_iter()
            .flatten()
            .cloned(),
    );
    parts.extend(candidate.pros().iter().cloned());
    parts.join(" ").to_lowercase()
}

fn purpose_matches(purpose: &str, haystack: &str) -> bool {
    if haystack.contains(purpose) {
        return true;
    }
    let hints: &[&str] = match purpose {
        "gaming" => &["rtx", "gtx", "144hz", "165hz", "gamer"],
        "video editing" | "editing" | "content creation" => &["oled", "creator", "rtx", "color"],
        "coding" | "programming" | "development" => &["16gb", "32gb", "developer", "keyboard"],
        "study" | "office work" | "office" | "school" => &["lightweight", "battery", "thin", "portable"],
        _ => &[],
    };
    hints.iter().any(|hint| haystack.contains(hint))
}

fn significant_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|character: char| !character.is_ascii_alphanumeric() && character != '.')
        .map(|token| token.trim_matches('.'))
        .filter(|token| !token.is_empty() && !STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}

fn token_fit(wanted: &str, offered: &str) -> FieldFit {
    let wanted = significant_tokens(wanted);
    if wanted.is_empty() {
        return FieldFit { exact: false, proximity: 0.0 };
    }
    let offered = significant_tokens(offered);
    let hits = wanted
        .iter()
        .filter(|token| offered.iter().any(|candidate| candidate.starts_with(token.as_str())))
        .count();
    FieldFit { exact: hits == wanted.len(), proximity: hits as f64 / wanted.len() as f64 }
}

fn capacity_fit(wanted: &str, offered: Option<&str>) -> Option<FieldFit> {
    let wanted_gb = capacity_gb(wanted);
    let offered_text = offered.unwrap_or_default();
    let Some(wanted_gb) = wanted_gb else {
        return Some(token_fit(wanted, offered_text));
    };
    let Some(offered_gb) = capacity_gb(offered_text) else {
        return Some(FieldFit { exact: false, proximity: 0.0 });
    };

    let ratio = wanted_gb.min(offered_gb) / wanted_gb.max(offered_gb);
    Some(FieldFit { exact: offered_gb >= wanted_gb, proximity: ratio })
}

fn graphics_fit(wanted: &str, offered: Option<&str>) -> FieldFit {
    let wanted_lower = wanted.to_lowercase();
    let offered_lower = offered.unwrap_or_default().to_lowercase();
    let offered_dedicated = DEDICATED_HINTS.iter().any(|hint| offered_lower.contains(hint));

    if INTEGRATED_HINTS.iter().any(|hint| wanted_lower.contains(hint)) && !wanted_lower.contains("rtx") {
        let integrated = offered.is_none() || !offered_dedicated;
        return FieldFit { exact: integrated, proximity: if integrated { 1.0 } else { 0.3 } };
    }
    if wanted_lower.contains("dedicated") {
        return FieldFit { exact: offered_dedicated, proximity: if offered_dedicated { 1.0 } else { 0.0 } };
    }

    let fit = token_fit(wanted, &offered_lower);
    if !fit.exact && offered_dedicated && DEDICATED_HINTS.iter().any(|hint| wanted_lower.contains(hint)) {
        return FieldFit { exact: false, proximity: fit.proximity.max(0.5) };
    }
    fit
}

#[cfg(test)]
mod tests {
    use super::MatchScorer;
    use crate::domain::candidate::{Candidate, RecommendationSetId};
    use crate::domain::preference::{PreferenceField, PreferenceRecord};
    use crate::preferences::{PreferenceUpdate, PreferenceUpdater};
    use crate::recommendation::grounding::RawListing;
    use crate::recommendation::parse::build_candidates;

    fn candidate(title: &str, specs: &str, price: &str) -> Candidate {
        build_candidates(&[RawListing::new(title, specs, price)], &RecommendationSetId("set".into()))
            .pop()
            .expect("candidate")
    }

    fn record(update: PreferenceUpdate) -> PreferenceRecord {
        PreferenceUpdater::new().apply(PreferenceRecord::new(), &update).record
    }

    #[test]
    fn exact_matches_count_each_satisfied_field() {
        let preferences = record(
            PreferenceUpdate::new()
                .with_purposes(["gaming"])
                .with_text(PreferenceField::Processor, "i5")
                .with_text(PreferenceField::Ram, "16GB")
                .with_text(PreferenceField::Graphics, "RTX 4050")
                .with_text(PreferenceField::PriceRange, "50000-70000"),
        );
        let strong = candidate(
            "MSI Thin GF63",
            "Intel Core i5-12450H, 16GB RAM, 512GB SSD, NVIDIA RTX 4050",
            "Rs 62,990",
        );
        let weak = candidate("Generic Book", "Intel Celeron N4500, 4GB RAM, 128GB eMMC", "Rs 21,990");

        let scorer = MatchScorer::new();
        let strong_score = scorer.score(&preferences, &strong);
        let weak_score = scorer.score(&preferences, &weak);

        assert_eq!(strong_score.exact_matches, 5);
        assert_eq!(
            strong_score.matched_fields,
            vec![
                PreferenceField::Purpose,
                PreferenceField::Processor,
                PreferenceField::Ram,
                PreferenceField::Graphics,
                PreferenceField::PriceRange
            ]
        );
        assert_eq!(weak_score.exact_matches, 0);
        assert!(strong_score.proximity > weak_score.proximity);
        assert!(strong_score.rank_cmp(&weak_score).is_lt());
    }

    #[test]
    fn larger_capacities_satisfy_and_closer_ones_score_higher() {
        let preferences = record(PreferenceUpdate::new().with_text(PreferenceField::Storage, "512GB SSD"));
        let scorer = MatchScorer::new();

        let terabyte = scorer.score(&preferences, &candidate("A", "1TB SSD", "50000"));
        let small = scorer.score(&preferences, &candidate("B", "256GB SSD", "50000"));
        let tiny = scorer.score(&preferences, &candidate("C", "128GB SSD", "50000"));

        assert_eq!(terabyte.exact_matches, 1);
        assert_eq!(small.exact_matches, 0);
        assert!(small.proximity > tiny.proximity);
    }

    #[test]
    fn integrated_graphics_preference_rejects_discrete_cards() {
        let preferences =
            record(PreferenceUpdate::new().with_text(PreferenceField::Graphics, "integrated graphics"));
        let scorer = MatchScorer::new();

        let ultrabook = scorer.score(&preferences, &candidate("Zen", "Intel Iris Xe Graphics, 16GB RAM", "60000"));
        let gamer = scorer.score(&preferences, &candidate("Tuf", "RTX 3050, 16GB RAM", "60000"));

        assert_eq!(ultrabook.exact_matches, 1);
        assert_eq!(gamer.exact_matches, 0);
        assert_eq!(scorer.score(&preferences, &candidate("Bare", "8GB RAM", "1")).exact_matches, 1);
    }

    #[test]
    fn unspecified_fields_do_not_contribute() {
        let preferences = record(PreferenceUpdate::new().with_unspecified(PreferenceField::Ram));
        let score = MatchScorer::new().score(&preferences, &candidate("Any", "8GB RAM", "30000"));

        assert_eq!(score.exact_matches, 0);
        assert_eq!(score.proximity, 0.0);
        assert!(score.matched_fields.is_empty());
    }
}
