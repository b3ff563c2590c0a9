use lapwise_core::comparison::{CandidateRef, ComparisonResult, ComparisonSide};
use lapwise_core::domain::candidate::{CandidateAttribute, RecommendationSet};
use lapwise_core::domain::preference::{FieldStatus, PreferenceField, PreferenceRecord};
use lapwise_core::elicitation::FieldPrompt;
use lapwise_core::errors::InterfaceError;
use lapwise_core::recommendation::scoring::MatchScorer;
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

const TEMPLATES: [(&str, &str); 7] = [
    ("greeting.txt", include_str!("../../../templates/chat/greeting.txt")),
    ("question.txt", include_str!("../../../templates/chat/question.txt")),
    ("summary.txt", include_str!("../../../templates/chat/summary.txt")),
    ("recommendations.txt", include_str!("../../../templates/chat/recommendations.txt")),
    ("comparison.txt", include_str!("../../../templates/chat/comparison.txt")),
    ("error.txt", include_str!("../../../templates/chat/error.txt")),
    ("help.txt", include_str!("../../../templates/chat/help.txt")),
];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to register chat template `{name}`: {source}")]
    Template { name: &'static str, source: tera::Error },
    #[error("failed to render chat template `{name}`: {source}")]
    Render { name: &'static str, source: tera::Error },
}

#[derive(Serialize)]
struct SummaryLine {
    label: &'static str,
    value: String,
}

#[derive(Serialize)]
struct SpecLine {
    label: &'static str,
    value: String,
}

#[derive(Serialize)]
struct CandidateView {
    position: usize,
    title: String,
    price: String,
    specs: Vec<SpecLine>,
    why: Vec<String>,
    link: Option<String>,
}

#[derive(Serialize)]
struct DiffView {
    label: &'static str,
    first: String,
    second: String,
    advantage: Option<String>,
}

/// Turns core decisions into the text shown to the user.
pub struct ResponseRenderer {
    tera: Tera,
    scorer: MatchScorer,
}

impl ResponseRenderer {
    pub fn new(scorer: MatchScorer) -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        for (name, body) in TEMPLATES {
            tera.add_raw_template(name, body)
                .map_err(|source| RenderError::Template { name, source })?;
        }
        Ok(Self { tera, scorer })
    }

    pub fn greeting(&self, prompt: &FieldPrompt) -> Result<String, RenderError> {
        let mut context = Context::new();
        context.insert("question", &self.question(prompt)?);
        self.render("greeting.txt", &context)
    }

    pub fn question(&self, prompt: &FieldPrompt) -> Result<String, RenderError> {
        let mut context = Context::new();
        context.insert("question", question_text(prompt.field));
        context.insert("reask", reask_text(prompt.field));
        let examples: &[String] = if prompt.with_examples { &prompt.examples } else { &[] };
        context.insert("examples", examples);
        self.render("question.txt", &context)
    }

    /// Hand-off confirmation, naming the fields left unspecified.
    pub fn summary(&self, record: &PreferenceRecord) -> Result<String, RenderError> {
        let fields = PreferenceField::ALL
            .into_iter()
            .filter(|field| record.status(*field) == FieldStatus::Specified)
            .filter_map(|field| {
                record.value(field).map(|value| SummaryLine { label: field.label(), value: value.to_string() })
            })
            .collect::<Vec<_>>();
        let unspecified = record
            .unspecified_fields()
            .into_iter()
            .map(|field| field.label())
            .collect::<Vec<_>>();

        let mut context = Context::new();
        context.insert("fields", &fields);
        context.insert("unspecified", &unspecified);
        self.render("summary.txt", &context)
    }

    pub fn recommendations(&self, set: &RecommendationSet) -> Result<String, RenderError> {
        let candidates = set
            .candidates()
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                let score = self.scorer.score(set.preferences(), candidate);
                CandidateView {
                    position: index + 1,
                    title: candidate.title().to_string(),
                    price: candidate.price_text().to_string(),
                    specs: CandidateAttribute::ALL
                        .into_iter()
                        .filter(|attribute| *attribute != CandidateAttribute::Price)
                        .map(|attribute| SpecLine {
                            label: attribute.label(),
                            value: candidate.attribute(attribute).unwrap_or_else(|| "not listed".to_string()),
                        })
                        .collect(),
                    why: score
                        .matched_fields
                        .iter()
                        .map(|field| match field {
                            PreferenceField::Ram => field.label().to_string(),
                            _ => field.label().to_lowercase(),
                        })
                        .collect(),
                    link: candidate.link().map(str::to_string),
                }
            })
            .collect::<Vec<_>>();

        let mut context = Context::new();
        context.insert("candidates", &candidates);
        self.render("recommendations.txt", &context)
    }

    pub fn comparison(&self, result: &ComparisonResult) -> Result<String, RenderError> {
        let side_title = |side: ComparisonSide| match side {
            ComparisonSide::First => result.first.title().to_string(),
            ComparisonSide::Second => result.second.title().to_string(),
        };
        let diffs = result
            .diffs
            .iter()
            .map(|diff| DiffView {
                label: diff.attribute.label(),
                first: diff.first.clone().unwrap_or_else(|| "not listed".to_string()),
                second: diff.second.clone().unwrap_or_else(|| "not listed".to_string()),
                advantage: diff.advantage.map(side_title),
            })
            .collect::<Vec<_>>();

        let mut context = Context::new();
        context.insert("first", result.first.title());
        context.insert("second", result.second.title());
        context.insert("diffs", &diffs);
        context.insert("verdict", &result.verdict);
        self.render("comparison.txt", &context)
    }

    pub fn error(&self, error: &InterfaceError) -> Result<String, RenderError> {
        let hint = match error {
            InterfaceError::NoResults { field, .. } => Some(format!(
                "For example, say \"change {} to ...\" and I'll search again.",
                field.label().to_lowercase()
            )),
            _ => None,
        };

        let mut context = Context::new();
        context.insert("message", &error.user_message());
        context.insert("hint", &hint);
        self.render("error.txt", &context)
    }

    /// Reply for a reference that does not resolve inside the current list.
    pub fn unknown_candidate(&self, reference: &CandidateRef, set: &RecommendationSet) -> String {
        let pointed_at = match reference {
            CandidateRef::Position(position) => format!("#{position}"),
            CandidateRef::Title(title) => format!("\"{title}\""),
        };
        format!(
            "I couldn't find {pointed_at} in the current list. Pick a number from 1 to {} or use the model name.",
            set.len()
        )
    }

    pub fn help(&self, set: Option<&RecommendationSet>, pending: Option<&FieldPrompt>) -> Result<String, RenderError> {
        let mode = match (set, pending) {
            (Some(_), _) => "compare",
            (None, None) => "relax",
            (None, Some(_)) => "elicit",
        };
        let question = match pending {
            Some(prompt) => self.question(prompt)?,
            None => String::new(),
        };

        let mut context = Context::new();
        context.insert("mode", mode);
        context.insert("last_position", &set.map_or(2, |set| set.len().max(2)));
        context.insert("question", &question);
        self.render("help.txt", &context)
    }

    fn render(&self, name: &'static str, context: &Context) -> Result<String, RenderError> {
        self.tera
            .render(name, context)
            .map(|text| text.trim_end().to_string())
            .map_err(|source| RenderError::Render { name, source })
    }
}

fn question_text(field: PreferenceField) -> &'static str {
    match field {
        PreferenceField::Purpose => "What will you mainly use the laptop for? You can name more than one.",
        PreferenceField::Processor => "Do you have a processor in mind, like Intel Core i5/i7 or AMD Ryzen?",
        PreferenceField::Ram => "How much RAM would you like?",
        PreferenceField::Storage => "How much storage do you need?",
        PreferenceField::Graphics => "Do you need a dedicated graphics card, or are integrated graphics fine?",
        PreferenceField::Display => "What kind of display do you prefer (size, panel type, resolution)?",
        PreferenceField::PriceRange => "What's your budget?",
    }
}

fn reask_text(field: PreferenceField) -> &'static str {
    match field {
        PreferenceField::Purpose => "Could you tell me what you'll use the laptop for?",
        PreferenceField::Processor => "Could you specify a processor?",
        PreferenceField::Ram => "Could you specify how much RAM you need?",
        PreferenceField::Storage => "Could you specify the storage you need?",
        PreferenceField::Graphics => "Could you specify the graphics you need?",
        PreferenceField::Display => "Could you specify the display you'd like?",
        PreferenceField::PriceRange => "Could you specify your budget?",
    }
}
