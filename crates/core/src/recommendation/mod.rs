//! Grounded recommendation: query the search collaborator, parse listings into
//! candidates, filter, rank and truncate to a bounded set.

pub mod engine;
pub mod grounding;
pub mod parse;
pub mod scoring;

pub use engine::{RecommendationEngine, RecommendationError, RecommendationPolicy};
pub use grounding::{GroundingError, RawListing, ScriptedSearchGrounding, SearchGrounding};
pub use parse::{build_candidates, parse_specs};
pub use scoring::{MatchScore, MatchScorer, MatchWeights};
