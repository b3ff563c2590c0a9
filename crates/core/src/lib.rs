pub mod audit;
pub mod comparison;
pub mod config;
pub mod domain;
pub mod elicitation;
pub mod errors;
pub mod preferences;
pub mod recommendation;
pub mod refinement;
pub mod session;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, NoopAuditSink};
pub use comparison::{
    AttributeDiff, CandidateRef, ComparisonEngine, ComparisonError, ComparisonResult,
    ComparisonSide,
};
pub use domain::candidate::{
    Candidate, CandidateAttribute, CandidateId, CandidateSpecs, RecommendationSet,
    RecommendationSetId,
};
pub use domain::preference::{FieldStatus, FieldValue, PreferenceField, PreferenceRecord};
pub use domain::price::PriceRange;
pub use domain::session::SessionId;
pub use elicitation::{
    AnswerSignal, ElicitationController, ElicitationDirective, ElicitationError, ElicitationStep,
    FieldPrompt,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use preferences::{PreferenceUpdate, PreferenceUpdater, ProposedValue, UpdateOutcome};
pub use recommendation::{
    GroundingError, RawListing, RecommendationEngine, RecommendationError, RecommendationPolicy,
    ScriptedSearchGrounding, SearchGrounding,
};
pub use refinement::{Refinement, RefinementError, RefinementHandler};
pub use session::{RequestTicket, Session, SessionError};
