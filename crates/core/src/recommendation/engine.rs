use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RecommendationConfig;
use crate::domain::candidate::{Candidate, RecommendationSet, RecommendationSetId};
use crate::domain::preference::{FieldStatus, PreferenceField, PreferenceRecord};
use crate::recommendation::grounding::{GroundingError, SearchGrounding};
use crate::recommendation::parse::build_candidates;
use crate::recommendation::scoring::{MatchScore, MatchScorer};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecommendationPolicy {
    /// Percentage each PriceRange bound is widened by before filtering.
    pub price_tolerance_pct: Decimal,
    pub min_results: usize,
    pub max_results: usize,
}

impl Default for RecommendationPolicy {
    fn default() -> Self {
        Self { price_tolerance_pct: Decimal::ZERO, min_results: 3, max_results: 5 }
    }
}

impl From<&RecommendationConfig> for RecommendationPolicy {
    fn from(config: &RecommendationConfig) -> Self {
        Self {
            price_tolerance_pct: config.price_tolerance_pct,
            min_results: config.min_results,
            max_results: config.max_results,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RecommendationError {
    #[error("search grounding unavailable: {0}")]
    GroundingUnavailable(#[from] GroundingError),
    #[error(
        "no candidates survived filtering ({raw_results} raw, {viable} viable); suggest relaxing {suggested_relaxation:?}"
    )]
    NoResultsFound { suggested_relaxation: PreferenceField, raw_results: usize, viable: usize },
}

/// Sole caller of the search collaborator.
pub struct RecommendationEngine<G> {
    grounding: G,
    policy: RecommendationPolicy,
    scorer: MatchScorer,
}

impl<G> RecommendationEngine<G>
where
    G: SearchGrounding,
{
    pub fn new(grounding: G, policy: RecommendationPolicy) -> Self {
        Self { grounding, policy, scorer: MatchScorer::new() }
    }

    pub fn with_scorer(mut self, scorer: MatchScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn policy(&self) -> &RecommendationPolicy {
        &self.policy
    }

    pub fn scorer(&self) -> &MatchScorer {
        &self.scorer
    }

    pub fn grounding(&self) -> &G {
        &self.grounding
    }

    /// Query, parse, filter, rank and truncate. Never touches `record`.
    pub async fn recommend(
        &self,
        record: &PreferenceRecord,
    ) -> Result<RecommendationSet, RecommendationError> {
        let search_text = record.search_text();
        let listings = match self.grounding.search(&search_text).await {
            Ok(listings) => listings,
            Err(error) => {
                warn!(
                    event_name = "recommendation.search.failed",
                    error = %error,
                    "search grounding failed"
                );
                return Err(RecommendationError::GroundingUnavailable(error));
            }
        };

        let set_id = RecommendationSetId::generate();
        let parsed = build_candidates(&listings, &set_id);
        let viable =
            parsed.into_iter().filter(|candidate| candidate.specs().has_core_spec()).collect::<Vec<_>>();
        let viable_count = viable.len();

        let in_budget = match record.budget() {
            Some(range) => viable
                .into_iter()
                .filter(|candidate| range.contains(candidate.price(), self.policy.price_tolerance_pct))
                .collect::<Vec<_>>(),
            None => viable,
        };

        debug!(
            event_name = "recommendation.candidates.filtered",
            raw_results = listings.len(),
            viable = viable_count,
            in_budget = in_budget.len(),
            "candidate filters applied"
        );

        if in_budget.is_empty() {
            let suggested_relaxation = suggest_relaxation(record, viable_count > 0);
            info!(
                event_name = "recommendation.search.empty",
                search_text = %search_text,
                suggested_relaxation = ?suggested_relaxation,
                "no candidates survived filtering"
            );
            return Err(RecommendationError::NoResultsFound {
                suggested_relaxation,
                raw_results: listings.len(),
                viable: viable_count,
            });
        }

        let ranked = self.rank(record, in_budget);
        let candidates = truncate(ranked, self.policy.min_results, self.policy.max_results);

        info!(
            event_name = "recommendation.set.created",
            set_id = %set_id.0,
            candidates = candidates.len(),
            search_text = %search_text,
            "recommendation set created"
        );

        Ok(RecommendationSet::new(set_id, record.clone(), search_text, candidates))
    }

    fn rank(
        &self,
        record: &PreferenceRecord,
        candidates: Vec<Candidate>,
    ) -> Vec<(Candidate, MatchScore)> {
        let mut scored = candidates
            .into_iter()
            .enumerate()
            .map(|(position, candidate)| {
                let score = self.scorer.score(record, &candidate);
                (position, candidate, score)
            })
            .collect::<Vec<_>>();

        scored.sort_by(|(left_pos, left, left_score), (right_pos, right, right_score)| {
            left_score
                .rank_cmp(right_score)
                .then_with(|| left.price().cmp(&right.price()))
                .then_with(|| left_pos.cmp(right_pos))
        });

        scored.into_iter().map(|(_, candidate, score)| (candidate, score)).collect()
    }
}

/// Keeps at least `min` (when available) and extends up to `max` while candidates
/// tie the last guaranteed one on exact matches.
fn truncate(ranked: Vec<(Candidate, MatchScore)>, min: usize, max: usize) -> Vec<Candidate> {
    let min = min.max(1);
    let max = max.max(min);
    if ranked.len() <= min {
        return ranked.into_iter().map(|(candidate, _)| candidate).collect();
    }

    let threshold = ranked[min - 1].1.exact_matches;
    let keep = ranked
        .iter()
        .enumerate()
        .take_while(|(index, (_, score))| *index < min || score.exact_matches == threshold)
        .count()
        .min(max);

    ranked.into_iter().take(keep).map(|(candidate, _)| candidate).collect()
}

fn suggest_relaxation(record: &PreferenceRecord, price_filtered: bool) -> PreferenceField {
    if price_filtered || record.status(PreferenceField::PriceRange) == FieldStatus::Specified {
        return PreferenceField::PriceRange;
    }
    PreferenceField::ALL
        .into_iter()
        .rev()
        .find(|field| {
            *field != PreferenceField::Purpose && record.specified_value(*field).is_some()
        })
        .unwrap_or(PreferenceField::Purpose)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{RecommendationEngine, RecommendationError, RecommendationPolicy};
    use crate::domain::preference::{PreferenceField, PreferenceRecord};
    use crate::preferences::{PreferenceUpdate, PreferenceUpdater};
    use crate::recommendation::grounding::{GroundingError, RawListing, ScriptedSearchGrounding};

    fn record(update: PreferenceUpdate) -> PreferenceRecord {
        PreferenceUpdater::new().apply(PreferenceRecord::new(), &update).record
    }

    fn gaming_record() -> PreferenceRecord {
        record(
            PreferenceUpdate::new()
                .with_purposes(["gaming"])
                .with_text(PreferenceField::Ram, "16GB")
                .with_text(PreferenceField::PriceRange, "40000-60000"),
        )
    }

    fn listing(title: &str, specs: &str, price: &str) -> RawListing {
        RawListing::new(title, specs, price).with_link(format!("https://shop.test/{title}"))
    }

    #[tokio::test]
    async fn recommend_filters_ranks_and_binds_the_record() {
        let grounding = ScriptedSearchGrounding::new(vec![
            listing("Budget Book", "Intel Celeron, 4GB RAM, 128GB eMMC", "Rs 24,990"),
            listing("Nitro Lite", "Ryzen 5 7535HS, 16GB RAM, RTX 2050", "Rs 52,990"),
            listing("No Specs Laptop", "great battery life", "Rs 45,000"),
            listing("Victus 15", "i5-12450H, 16GB RAM, RTX 3050", "Rs 58,990"),
            listing("Flagship Pro", "i9-14900HX, 32GB RAM, RTX 4090", "Rs 2,99,990"),
            listing("Ideapad Slim", "Ryzen 5 7530U, 8GB RAM, 512GB SSD", "Rs 44,990"),
        ]);
        let engine = RecommendationEngine::new(grounding, RecommendationPolicy::default());
        let preferences = gaming_record();

        let set = engine.recommend(&preferences).await.expect("recommendations");

        let titles = set.candidates().iter().map(|candidate| candidate.title()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["Nitro Lite", "Victus 15", "Ideapad Slim"]);
        assert_eq!(set.preferences(), &preferences);
        assert_eq!(set.search_text(), preferences.search_text());
        assert!(set.candidates().iter().all(|candidate| set.contains(candidate)));
        assert_eq!(engine.grounding().queries(), vec![preferences.search_text()]);
    }

    #[tokio::test]
    async fn ties_extend_the_set_up_to_five() {
        let listings = (1..=7)
            .map(|index| listing(&format!("Gamer {index}"), "RTX 4050, 16GB RAM", &format!("{}", 50_000 + index)))
            .collect::<Vec<_>>();
        let engine =
            RecommendationEngine::new(ScriptedSearchGrounding::new(listings), RecommendationPolicy::default());

        let set = engine.recommend(&gaming_record()).await.expect("recommendations");

        assert_eq!(set.len(), 5);
        assert_eq!(set.candidates()[0].title(), "Gamer 1");
    }

    #[tokio::test]
    async fn fewer_than_three_survivors_are_returned_as_a_partial_set() {
        let engine = RecommendationEngine::new(
            ScriptedSearchGrounding::new(vec![listing("Only One", "16GB RAM, RTX 3050", "55000")]),
            RecommendationPolicy::default(),
        );

        let set = engine.recommend(&gaming_record()).await.expect("partial set");
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn scenario_c_zero_survivors_is_no_results_found_with_a_relaxation_hint() {
        let engine = RecommendationEngine::new(
            ScriptedSearchGrounding::new(vec![
                listing("Too Pricey", "i7, 16GB RAM, RTX 4070", "Rs 1,45,000"),
                listing("Unpriced", "i5, 16GB RAM", "call for price"),
            ]),
            RecommendationPolicy::default(),
        );

        let error = engine.recommend(&gaming_record()).await.expect_err("nothing in budget");
        assert_eq!(
            error,
            RecommendationError::NoResultsFound {
                suggested_relaxation: PreferenceField::PriceRange,
                raw_results: 2,
                viable: 1,
            }
        );
    }

    #[tokio::test]
    async fn tolerance_band_admits_near_misses() {
        let grounding = ScriptedSearchGrounding::new(vec![listing("Near Miss", "16GB RAM", "62000")]);
        let policy = RecommendationPolicy { price_tolerance_pct: Decimal::from(5), ..RecommendationPolicy::default() };
        let engine = RecommendationEngine::new(grounding, policy);

        let set = engine.recommend(&gaming_record()).await.expect("within tolerance");
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn grounding_failures_surface_as_unavailable() {
        let grounding = ScriptedSearchGrounding::default().with_response(Err(GroundingError::Unavailable {
            attempts: 3,
            reason: "connection refused".to_string(),
        }));
        let engine = RecommendationEngine::new(grounding, RecommendationPolicy::default());

        let error = engine.recommend(&gaming_record()).await.expect_err("unavailable");
        assert!(matches!(error, RecommendationError::GroundingUnavailable(_)));
    }

    #[tokio::test]
    async fn empty_search_without_budget_suggests_the_most_specific_field() {
        let engine = RecommendationEngine::new(
            ScriptedSearchGrounding::new(Vec::new()),
            RecommendationPolicy::default(),
        );
        let preferences = record(
            PreferenceUpdate::new()
                .with_purposes(["study"])
                .with_text(PreferenceField::Graphics, "RTX 4090")
                .with_unspecified(PreferenceField::PriceRange),
        );

        let error = engine.recommend(&preferences).await.expect_err("no results");
        assert!(matches!(
            error,
            RecommendationError::NoResultsFound { suggested_relaxation: PreferenceField::Graphics, .. }
        ));
    }
}
