use thiserror::Error;
use tracing::info;

use crate::domain::candidate::RecommendationSet;
use crate::domain::preference::{PreferenceField, PreferenceRecord};
use crate::preferences::{PreferenceUpdate, PreferenceUpdater};
use crate::recommendation::{RecommendationEngine, RecommendationError, SearchGrounding};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RefinementError {
    #[error("refinement patch targets no recognised field (ignored keys: {ignored_keys:?})")]
    EmptyPatch { ignored_keys: Vec<String> },
    /// The patch was applied but the new search failed; `record` is the patched state.
    #[error("refined preferences could not be recommended: {source}")]
    Recommendation { record: PreferenceRecord, source: RecommendationError },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Refinement {
    pub record: PreferenceRecord,
    pub changed_fields: Vec<PreferenceField>,
    pub recommendations: RecommendationSet,
}

/// Applies a targeted patch and asks for a brand-new recommendation set.
pub struct RefinementHandler<'e, G> {
    engine: &'e RecommendationEngine<G>,
    updater: PreferenceUpdater,
}

impl<'e, G> RefinementHandler<'e, G>
where
    G: SearchGrounding,
{
    pub fn new(engine: &'e RecommendationEngine<G>) -> Self {
        Self { engine, updater: PreferenceUpdater::new() }
    }

    pub async fn modify(
        &self,
        record: PreferenceRecord,
        patch: &PreferenceUpdate,
    ) -> Result<Refinement, RefinementError> {
        if patch.concrete_only().is_empty() {
            return Err(RefinementError::EmptyPatch { ignored_keys: patch.ignored_keys().to_vec() });
        }

        let outcome = self.updater.apply_override(record, patch);
        info!(
            event_name = "refinement.patch.applied",
            changed_fields = ?outcome.changed_fields,
            search_text = %outcome.search_text,
            "refinement patch applied"
        );

        match self.engine.recommend(&outcome.record).await {
            Ok(recommendations) => Ok(Refinement {
                record: outcome.record,
                changed_fields: outcome.changed_fields,
                recommendations,
            }),
            Err(source) => Err(RefinementError::Recommendation { record: outcome.record, source }),
        }
    }
}
