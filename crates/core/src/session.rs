use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink, NoopAuditSink};
use crate::comparison::{CandidateRef, ComparisonEngine, ComparisonError, ComparisonResult};
use crate::domain::candidate::RecommendationSet;
use crate::domain::preference::{PreferenceField, PreferenceRecord};
use crate::domain::session::SessionId;
use crate::elicitation::{AnswerSignal, ElicitationController, ElicitationError, ElicitationStep};
use crate::preferences::{PreferenceUpdate, PreferenceUpdater};
use crate::recommendation::{RecommendationEngine, RecommendationError, SearchGrounding};
use crate::refinement::{RefinementError, RefinementHandler};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no recommendation set exists yet")]
    NoRecommendations,
    #[error("preferences are still missing {missing:?}")]
    IncompletePreferences { missing: Vec<PreferenceField> },
    #[error("recommendation request {ticket} was superseded by request {latest}")]
    StaleRecommendation { ticket: u64, latest: u64 },
    #[error(transparent)]
    Elicitation(#[from] ElicitationError),
    #[error(transparent)]
    Recommendation(#[from] RecommendationError),
    #[error(transparent)]
    Comparison(#[from] ComparisonError),
    #[error(transparent)]
    Refinement(#[from] RefinementError),
}

/// Identifies one recommendation request; only the newest ticket may store a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestTicket {
    generation: u64,
}

impl RequestTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// One user's conversation state: the record, the current set, and request ordering.
///
/// Turns are serialised through `&mut self`; nothing here is shared across sessions.
pub struct Session<G> {
    id: SessionId,
    record: PreferenceRecord,
    latest: Option<RecommendationSet>,
    generation: u64,
    controller: ElicitationController,
    engine: RecommendationEngine<G>,
    comparison: ComparisonEngine,
    audit_sink: Arc<dyn AuditSink>,
    correlation_id: String,
}

impl<G> Session<G>
where
    G: SearchGrounding,
{
    pub fn new(engine: RecommendationEngine<G>) -> Self {
        let id = SessionId::generate();
        Self {
            correlation_id: id.0.clone(),
            id,
            record: PreferenceRecord::new(),
            latest: None,
            generation: 0,
            controller: ElicitationController::default(),
            comparison: ComparisonEngine::new(engine.scorer().clone()),
            engine,
            audit_sink: Arc::new(NoopAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = sink;
        self
    }

    /// Correlation id stamped on logs and audit events for the next turns.
    pub fn set_correlation_id(&mut self, correlation_id: impl Into<String>) {
        self.correlation_id = correlation_id.into();
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn record(&self) -> &PreferenceRecord {
        &self.record
    }

    pub fn latest(&self) -> Option<&RecommendationSet> {
        self.latest.as_ref()
    }

    pub fn engine(&self) -> &RecommendationEngine<G> {
        &self.engine
    }

    pub fn start(&mut self) -> Result<ElicitationStep, SessionError> {
        let audit = self.audit_context("elicitation");
        let step =
            self.controller.start_with_audit(self.record.clone(), self.audit_sink.as_ref(), &audit)?;
        self.record = step.record.clone();
        Ok(step)
    }

    pub fn answer(&mut self, signal: AnswerSignal) -> Result<ElicitationStep, SessionError> {
        let audit = self.audit_context("elicitation");
        let step = self.controller.handle_with_audit(
            self.record.clone(),
            signal,
            self.audit_sink.as_ref(),
            &audit,
        )?;
        self.record = step.record.clone();
        Ok(step)
    }

    /// Opens a new request; any earlier ticket becomes stale.
    pub fn prepare_recommendation(&mut self) -> Result<(RequestTicket, PreferenceRecord), SessionError> {
        let missing = self.record.missing_fields();
        if !missing.is_empty() {
            return Err(SessionError::IncompletePreferences { missing });
        }
        self.generation += 1;
        Ok((RequestTicket { generation: self.generation }, self.record.clone()))
    }

    /// Stores a result for `ticket` unless a newer request has been opened since.
    pub fn accept(
        &mut self,
        ticket: RequestTicket,
        result: Result<RecommendationSet, RecommendationError>,
    ) -> Result<&RecommendationSet, SessionError> {
        if ticket.generation != self.generation {
            warn!(
                event_name = "recommendation.result.stale_discarded",
                session_id = %self.id,
                correlation_id = %self.correlation_id,
                ticket = ticket.generation,
                latest = self.generation,
                "discarding superseded recommendation result"
            );
            self.audit_sink.emit(
                self.audit_context("recommendation")
                    .event("recommendation.stale_discarded", AuditCategory::Recommendation, AuditOutcome::Rejected)
                    .with_metadata("ticket", ticket.generation.to_string())
                    .with_metadata("latest", self.generation.to_string()),
            );
            return Err(SessionError::StaleRecommendation {
                ticket: ticket.generation,
                latest: self.generation,
            });
        }

        match result {
            Ok(set) => {
                self.emit_set("recommendation.set_created", AuditCategory::Recommendation, &set);
                Ok(self.latest.insert(set))
            }
            Err(error) => {
                self.emit_failure("recommendation.failed", AuditCategory::Recommendation, &error.to_string());
                Err(error.into())
            }
        }
    }

    /// Hands the completed record to the recommendation engine.
    pub async fn recommend(&mut self) -> Result<&RecommendationSet, SessionError> {
        let (ticket, record) = self.prepare_recommendation()?;
        let result = self.engine.recommend(&record).await;
        self.accept(ticket, result)
    }

    pub fn compare(
        &self,
        first: &CandidateRef,
        second: &CandidateRef,
    ) -> Result<ComparisonResult, SessionError> {
        let latest = self.latest.as_ref().ok_or(SessionError::NoRecommendations)?;
        let result = self.comparison.compare_refs(latest, first, second);
        match &result {
            Ok(comparison) => self.audit_sink.emit(
                self.audit_context("comparison")
                    .event("comparison.completed", AuditCategory::Comparison, AuditOutcome::Success)
                    .with_metadata("first", comparison.first.id().0.clone())
                    .with_metadata("second", comparison.second.id().0.clone()),
            ),
            Err(error) => self.emit_failure("comparison.rejected", AuditCategory::Comparison, &error.to_string()),
        }
        result.map_err(SessionError::from)
    }

    /// Patches the record and replaces the current set wholesale.
    ///
    /// When the new search fails the patched record is kept and the previous
    /// set stays available.
    pub async fn refine(&mut self, patch: &PreferenceUpdate) -> Result<&RecommendationSet, SessionError> {
        if self.latest.is_none() {
            return Err(SessionError::NoRecommendations);
        }
        self.generation += 1;
        let ticket = RequestTicket { generation: self.generation };

        let result = RefinementHandler::new(&self.engine).modify(self.record.clone(), patch).await;
        match result {
            Ok(refinement) => {
                info!(
                    event_name = "refinement.set.replaced",
                    session_id = %self.id,
                    correlation_id = %self.correlation_id,
                    changed_fields = ?refinement.changed_fields,
                    "recommendation set replaced after refinement"
                );
                self.record = refinement.record;
                self.accept(ticket, Ok(refinement.recommendations))
            }
            Err(RefinementError::Recommendation { record, source }) => {
                self.record = record.clone();
                self.emit_failure("refinement.search_failed", AuditCategory::Refinement, &source.to_string());
                Err(SessionError::Refinement(RefinementError::Recommendation { record, source }))
            }
            Err(error) => {
                self.emit_failure("refinement.rejected", AuditCategory::Refinement, &error.to_string());
                Err(error.into())
            }
        }
    }

    /// Loosens a completed record after a failed search and tries again.
    ///
    /// Unlike `refine`, no current set is required; the patched record is kept
    /// even when the retry fails.
    pub async fn relax(&mut self, patch: &PreferenceUpdate) -> Result<&RecommendationSet, SessionError> {
        let missing = self.record.missing_fields();
        if !missing.is_empty() {
            return Err(SessionError::IncompletePreferences { missing });
        }
        if patch.concrete_only().is_empty() {
            return Err(RefinementError::EmptyPatch { ignored_keys: patch.ignored_keys().to_vec() }.into());
        }

        let outcome = PreferenceUpdater::new().apply_override(self.record.clone(), patch);
        info!(
            event_name = "recommendation.preferences.relaxed",
            session_id = %self.id,
            correlation_id = %self.correlation_id,
            changed_fields = ?outcome.changed_fields,
            "preferences relaxed before retrying search"
        );
        self.record = outcome.record;
        self.recommend().await
    }

    fn audit_context(&self, actor: &str) -> AuditContext {
        AuditContext::new(Some(self.id.clone()), self.correlation_id.clone(), actor)
    }

    fn emit_set(&self, event_type: &str, category: AuditCategory, set: &RecommendationSet) {
        self.audit_sink.emit(
            self.audit_context("recommendation")
                .event(event_type, category, AuditOutcome::Success)
                .with_metadata("set_id", set.id().0.clone())
                .with_metadata("candidates", set.len().to_string())
                .with_metadata("search_text", set.search_text()),
        );
    }

    fn emit_failure(&self, event_type: &str, category: AuditCategory, error: &str) {
        self.audit_sink.emit(
            self.audit_context("session")
                .event(event_type, category, AuditOutcome::Failed)
                .with_metadata("error", error),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Session, SessionError};
    use crate::audit::InMemoryAuditSink;
    use crate::comparison::CandidateRef;
    use crate::domain::preference::{FieldStatus, PreferenceField};
    use crate::elicitation::AnswerSignal;
    use crate::preferences::PreferenceUpdate;
    use crate::recommendation::{
        GroundingError, RawListing, RecommendationEngine, RecommendationError, RecommendationPolicy,
        ScriptedSearchGrounding,
    };

    fn listings() -> Vec<RawListing> {
        vec![
            RawListing::new("TUF A15", "Ryzen 7 7435HS, 16GB RAM, 512GB SSD, RTX 4050", "Rs 58,990"),
            RawListing::new("LOQ 15", "i5-12450HX, 16GB RAM, 512GB SSD, RTX 3050", "Rs 54,990"),
            RawListing::new("Victus 16", "Ryzen 5 7640HS, 16GB RAM, 1TB SSD, RTX 4060", "Rs 69,990"),
            RawListing::new("Nitro V", "i5-13420H, 8GB RAM, 512GB SSD, RTX 2050", "Rs 47,990"),
        ]
    }

    fn session(grounding: ScriptedSearchGrounding) -> Session<ScriptedSearchGrounding> {
        Session::new(RecommendationEngine::new(grounding, RecommendationPolicy::default()))
    }

    fn answer(field: PreferenceField, value: &str) -> AnswerSignal {
        AnswerSignal::Answered(PreferenceUpdate::new().with_text(field, value))
    }

    async fn complete_scenario_a(session: &mut Session<ScriptedSearchGrounding>) {
        session.start().expect("start");
        let turns = [
            AnswerSignal::Answered(PreferenceUpdate::new().with_purposes(["gaming"])),
            AnswerSignal::Unclear,
            AnswerSignal::Unclear,
            answer(PreferenceField::Ram, "16GB"),
            AnswerSignal::Unclear,
            AnswerSignal::Absent,
            answer(PreferenceField::Graphics, "RTX"),
            AnswerSignal::Absent,
            AnswerSignal::Unclear,
        ];
        for turn in turns {
            let step = session.answer(turn).expect("turn");
            assert!(!step.is_complete());
            assert!(matches!(
                session.recommend().await,
                Err(SessionError::IncompletePreferences { .. })
            ));
        }
        let step = session.answer(answer(PreferenceField::PriceRange, "40000-60000")).expect("last turn");
        assert!(step.is_complete());
    }

    #[tokio::test]
    async fn scenario_a_invokes_the_engine_exactly_once_after_hand_off() {
        let mut session = session(ScriptedSearchGrounding::new(listings()));
        complete_scenario_a(&mut session).await;
        assert!(session.engine().grounding().queries().is_empty());

        let set = session.recommend().await.expect("recommendations");
        assert_eq!(set.len(), 3);

        assert_eq!(
            session.engine().grounding().queries(),
            vec!["gaming laptop 16GB RAM RTX graphics within budget 40000-60000 best laptop recommendations"
                .to_string()]
        );
    }

    #[tokio::test]
    async fn stale_results_are_discarded_in_favour_of_the_latest_request() {
        let mut session = session(ScriptedSearchGrounding::new(listings()));
        complete_scenario_a(&mut session).await;

        let (older, record) = session.prepare_recommendation().expect("first request");
        let (newer, _) = session.prepare_recommendation().expect("second request");
        let stale = session.engine().recommend(&record).await;
        let fresh = session.engine().recommend(&record).await;

        let error = session.accept(older, stale).expect_err("superseded");
        assert_eq!(error, SessionError::StaleRecommendation { ticket: 1, latest: 2 });
        assert!(session.latest().is_none());

        let fresh_id = fresh.as_ref().expect("fresh set").id().clone();
        let stored = session.accept(newer, fresh).expect("latest request wins");
        assert_eq!(stored.id(), &fresh_id);
    }

    #[tokio::test]
    async fn compare_and_refine_require_a_recommendation_set() {
        let mut session = session(ScriptedSearchGrounding::new(listings()));

        assert_eq!(
            session.compare(&CandidateRef::Position(1), &CandidateRef::Position(2)).expect_err("no set"),
            SessionError::NoRecommendations
        );
        assert_eq!(
            session
                .refine(&PreferenceUpdate::new().with_text(PreferenceField::Ram, "32GB"))
                .await
                .expect_err("no set"),
            SessionError::NoRecommendations
        );
    }

    #[tokio::test]
    async fn refinement_replaces_the_set_and_old_candidates_become_unknown() {
        let sink = InMemoryAuditSink::default();
        let mut session =
            session(ScriptedSearchGrounding::new(listings())).with_audit_sink(Arc::new(sink.clone()));
        complete_scenario_a(&mut session).await;
        let first_set = session.recommend().await.expect("first set").clone();

        let refined = session
            .refine(&PreferenceUpdate::new().with_text(PreferenceField::PriceRange, "50000-70000"))
            .await
            .expect("refined")
            .clone();

        assert_ne!(refined.id(), first_set.id());
        assert_eq!(session.record().status(PreferenceField::PriceRange), FieldStatus::Specified);
        assert_eq!(refined.preferences(), session.record());

        let old = first_set.candidate_at(1).expect("old candidate");
        let error = crate::comparison::ComparisonEngine::default()
            .compare(session.latest().expect("latest"), old, refined.candidate_at(1).expect("new"))
            .expect_err("old set");
        assert!(matches!(error, crate::comparison::ComparisonError::UnknownCandidate { .. }));

        let comparison = session
            .compare(&CandidateRef::Position(1), &CandidateRef::Position(2))
            .expect("comparison");
        assert!(!comparison.verdict.is_empty());

        let event_types = sink.event_types();
        assert_eq!(
            event_types.iter().filter(|event| *event == "recommendation.set_created").count(),
            2
        );
        assert!(event_types.iter().any(|event| event == "comparison.completed"));
        assert!(event_types.iter().any(|event| event == "elicitation.completed"));
    }

    #[tokio::test]
    async fn search_failures_leave_state_consistent() {
        let grounding = ScriptedSearchGrounding::new(listings())
            .with_response(Err(GroundingError::Unavailable { attempts: 3, reason: "timeout".into() }));
        let mut session = session(grounding);
        complete_scenario_a(&mut session).await;
        let before = session.record().clone();

        let error = session.recommend().await.expect_err("grounding down");
        assert!(matches!(
            error,
            SessionError::Recommendation(RecommendationError::GroundingUnavailable(_))
        ));
        assert_eq!(session.record(), &before);
        assert!(session.latest().is_none());

        session.recommend().await.expect("retry succeeds");
        let previous_id = session.latest().expect("set").id().clone();

        let error = session
            .refine(&PreferenceUpdate::new().with_text(PreferenceField::PriceRange, "under 10000"))
            .await
            .expect_err("nothing that cheap");
        assert!(matches!(error, SessionError::Refinement(_)));
        assert_eq!(
            session.record().budget().and_then(|range| range.max),
            Some(rust_decimal::Decimal::from(10_000))
        );
        assert_eq!(session.latest().expect("previous set kept").id(), &previous_id);
    }

    #[tokio::test]
    async fn relaxing_after_no_results_retries_with_the_patched_record() {
        let grounding = ScriptedSearchGrounding::new(listings()).with_response(Ok(vec![RawListing::new(
            "Zephyrus G16",
            "i9-13900H, 32GB RAM, RTX 4080",
            "Rs 2,49,990",
        )]));
        let mut session = session(grounding);
        complete_scenario_a(&mut session).await;

        let error = session.recommend().await.expect_err("over budget");
        assert!(matches!(
            error,
            SessionError::Recommendation(RecommendationError::NoResultsFound {
                suggested_relaxation: PreferenceField::PriceRange,
                ..
            })
        ));

        assert!(matches!(
            session.relax(&PreferenceUpdate::new().with_unspecified(PreferenceField::Ram)).await,
            Err(SessionError::Refinement(_))
        ));

        let set = session
            .relax(&PreferenceUpdate::new().with_text(PreferenceField::PriceRange, "40000-75000"))
            .await
            .expect("relaxed search");
        assert!(!set.is_empty());
        assert_eq!(
            session.record().budget().and_then(|range| range.max),
            Some(rust_decimal::Decimal::from(75_000))
        );
        assert_eq!(session.engine().grounding().queries().len(), 2);
    }
}
