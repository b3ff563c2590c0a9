use thiserror::Error;

use crate::comparison::ComparisonError;
use crate::domain::preference::PreferenceField;
use crate::elicitation::ElicitationError;
use crate::recommendation::RecommendationError;
use crate::refinement::RefinementError;
use crate::session::SessionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Elicitation(#[from] ElicitationError),
    #[error(transparent)]
    Comparison(#[from] ComparisonError),
    #[error("refinement patch targets no recognised field")]
    EmptyPatch,
    #[error("recommendation request {ticket} was superseded by request {latest}")]
    StaleRecommendation { ticket: u64, latest: u64 },
    #[error("no recommendation set exists yet")]
    NoRecommendations,
    #[error("preferences are still missing {0:?}")]
    IncompletePreferences(Vec<PreferenceField>),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("search grounding unavailable: {0}")]
    GroundingUnavailable(String),
    #[error("no results found; suggested relaxation: {suggested_relaxation:?}")]
    NoResultsFound { suggested_relaxation: PreferenceField },
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("no results: relax {field:?}")]
    NoResults { field: PreferenceField, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again.".to_owned()
            }
            Self::ServiceUnavailable { .. } => {
                "Search is temporarily unavailable. Please retry shortly.".to_owned()
            }
            Self::NoResults { field, .. } => format!(
                "I couldn't find laptops that match all of your requirements. \
                 Could you relax your {} preference?",
                field.label().to_lowercase()
            ),
            Self::Internal { .. } => "An unexpected internal error occurred.".to_owned(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::NoResults { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::NoResults { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<RecommendationError> for ApplicationError {
    fn from(value: RecommendationError) -> Self {
        match value {
            RecommendationError::GroundingUnavailable(error) => {
                Self::GroundingUnavailable(error.to_string())
            }
            RecommendationError::NoResultsFound { suggested_relaxation, .. } => {
                Self::NoResultsFound { suggested_relaxation }
            }
        }
    }
}

impl From<SessionError> for ApplicationError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::NoRecommendations => DomainError::NoRecommendations.into(),
            SessionError::IncompletePreferences { missing } => {
                DomainError::IncompletePreferences(missing).into()
            }
            SessionError::StaleRecommendation { ticket, latest } => {
                DomainError::StaleRecommendation { ticket, latest }.into()
            }
            SessionError::Elicitation(error) => DomainError::Elicitation(error).into(),
            SessionError::Comparison(error) => DomainError::Comparison(error).into(),
            SessionError::Recommendation(error) => error.into(),
            SessionError::Refinement(RefinementError::EmptyPatch { .. }) => {
                DomainError::EmptyPatch.into()
            }
            SessionError::Refinement(RefinementError::Recommendation { source, .. }) => {
                source.into()
            }
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(
                DomainError::NoRecommendations | DomainError::IncompletePreferences(_),
            ) => Self::BadRequest {
                message: "session is not ready for this request".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Domain(error) => {
                Self::Internal { message: error.to_string(), correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::GroundingUnavailable(message)
            | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::NoResultsFound { suggested_relaxation } => Self::NoResults {
                field: suggested_relaxation,
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
