use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::domain::candidate::{Candidate, CandidateAttribute, CandidateId, RecommendationSet};
use crate::recommendation::parse::capacity_gb;
use crate::recommendation::scoring::{MatchScore, MatchScorer};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ComparisonError {
    #[error("candidate `{candidate}` is not part of the latest recommendation set")]
    UnknownCandidate { candidate: String },
    #[error("candidate `{candidate}` cannot be compared with itself")]
    SameCandidate { candidate: String },
}

/// How the user pointed at a candidate: by list position or by name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum CandidateRef {
    Position(usize),
    Title(String),
}

impl CandidateRef {
    pub fn resolve<'a>(&self, set: &'a RecommendationSet) -> Option<&'a Candidate> {
        match self {
            Self::Position(position) => set.candidate_at(*position),
            Self::Title(title) => {
                let wanted = CandidateId::from_title(title);
                set.candidate(&wanted).or_else(|| {
                    let mut partial = set
                        .candidates()
                        .iter()
                        .filter(|candidate| !wanted.0.is_empty() && candidate.id().0.contains(&wanted.0));
                    match (partial.next(), partial.next()) {
                        (Some(only), None) => Some(only),
                        _ => None,
                    }
                })
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Position(position) => format!("#{position}"),
            Self::Title(title) => title.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ComparisonSide {
    First,
    Second,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttributeDiff {
    pub attribute: CandidateAttribute,
    pub first: Option<String>,
    pub second: Option<String>,
    /// Only set for measurable attributes (RAM, storage, price).
    pub advantage: Option<ComparisonSide>,
}

impl AttributeDiff {
    pub fn differs(&self) -> bool {
        self.first != self.second
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub first: Candidate,
    pub second: Candidate,
    pub diffs: Vec<AttributeDiff>,
    pub preferred: ComparisonSide,
    pub first_score: MatchScore,
    pub second_score: MatchScore,
    pub verdict: String,
}

impl ComparisonResult {
    pub fn preferred_candidate(&self) -> &Candidate {
        match self.preferred {
            ComparisonSide::First => &self.first,
            ComparisonSide::Second => &self.second,
        }
    }
}

/// Read-only, field-by-field comparison within the latest recommendation set.
#[derive(Clone, Debug, Default)]
pub struct ComparisonEngine {
    scorer: MatchScorer,
}

impl ComparisonEngine {
    pub fn new(scorer: MatchScorer) -> Self {
        Self { scorer }
    }

    pub fn compare(
        &self,
        latest: &RecommendationSet,
        first: &Candidate,
        second: &Candidate,
    ) -> Result<ComparisonResult, ComparisonError> {
        for candidate in [first, second] {
            if !latest.contains(candidate) {
                return Err(ComparisonError::UnknownCandidate { candidate: candidate.id().0.clone() });
            }
        }
        if first.id() == second.id() {
            return Err(ComparisonError::SameCandidate { candidate: first.id().0.clone() });
        }

        let preferences = latest.preferences();
        let first_score = self.scorer.score(preferences, first);
        let second_score = self.scorer.score(preferences, second);

        let preferred = if first_score
            .rank_cmp(&second_score)
            .then_with(|| first.price().cmp(&second.price()))
            .is_gt()
        {
            ComparisonSide::Second
        } else {
            ComparisonSide::First
        };

        let diffs = CandidateAttribute::ALL
            .into_iter()
            .map(|attribute| AttributeDiff {
                attribute,
                first: first.attribute(attribute),
                second: second.attribute(attribute),
                advantage: advantage(attribute, first, second),
            })
            .collect::<Vec<_>>();

        let verdict = verdict(
            &preferences.purposes(),
            (first, &first_score),
            (second, &second_score),
            preferred,
        );

        debug!(
            event_name = "comparison.result.built",
            first = %first.id().0,
            second = %second.id().0,
            preferred = ?preferred,
            "comparison built"
        );

        Ok(ComparisonResult {
            first: first.clone(),
            second: second.clone(),
            diffs,
            preferred,
            first_score,
            second_score,
            verdict,
        })
    }

    pub fn compare_refs(
        &self,
        latest: &RecommendationSet,
        first: &CandidateRef,
        second: &CandidateRef,
    ) -> Result<ComparisonResult, ComparisonError> {
        let first = first
            .resolve(latest)
            .ok_or_else(|| ComparisonError::UnknownCandidate { candidate: first.describe() })?;
        let second = second
            .resolve(latest)
            .ok_or_else(|| ComparisonError::UnknownCandidate { candidate: second.describe() })?;
        self.compare(latest, first, second)
    }
}

fn advantage(
    attribute: CandidateAttribute,
    first: &Candidate,
    second: &Candidate,
) -> Option<ComparisonSide> {
    let larger = |left: Option<f64>, right: Option<f64>| match (left, right) {
        (Some(left), Some(right)) if left > right => Some(ComparisonSide::First),
        (Some(left), Some(right)) if right > left => Some(ComparisonSide::Second),
        _ => None,
    };

    match attribute {
        CandidateAttribute::Ram => larger(
            first.specs().ram.as_deref().and_then(capacity_gb),
            second.specs().ram.as_deref().and_then(capacity_gb),
        ),
        CandidateAttribute::Storage => larger(
            first.specs().storage.as_deref().and_then(capacity_gb),
            second.specs().storage.as_deref().and_then(capacity_gb),
        ),
        CandidateAttribute::Price => match first.price().cmp(&second.price()) {
            std::cmp::Ordering::Less => Some(ComparisonSide::First),
            std::cmp::Ordering::Greater => Some(ComparisonSide::Second),
            std::cmp::Ordering::Equal => None,
        },
        CandidateAttribute::Cpu | CandidateAttribute::Gpu | CandidateAttribute::Display => None,
    }
}

fn verdict(
    purposes: &[String],
    first: (&Candidate, &MatchScore),
    second: (&Candidate, &MatchScore),
    preferred: ComparisonSide,
) -> String {
    let ((winner, winner_score), (other, other_score)) = match preferred {
        ComparisonSide::First => (first, second),
        ComparisonSide::Second => (second, first),
    };
    let context = if purposes.is_empty() {
        "your requirements".to_string()
    } else {
        format!("your {} needs", purposes.join(" and "))
    };

    if winner_score.exact_matches > other_score.exact_matches {
        format!(
            "{} is the better fit for {context}, meeting {} of your stated preferences versus {} for the {}.",
            winner.title(),
            winner_score.exact_matches,
            other_score.exact_matches,
            other.title()
        )
    } else if (winner_score.proximity - other_score.proximity).abs() > 0.01 {
        format!(
            "{} and the {} meet the same number of your stated preferences, but the {} comes closer overall for {context}.",
            winner.title(),
            other.title(),
            winner.title()
        )
    } else {
        format!(
            "{} and the {} fit {context} about equally, so the {} wins on price at {}.",
            winner.title(),
            other.title(),
            winner.title(),
            winner.price_text()
        )
    }
}
