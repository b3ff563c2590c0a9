use serde::{Deserialize, Serialize};

use crate::domain::preference::{FieldStatus, PreferenceField, PreferenceRecord};
use crate::preferences::PreferenceUpdate;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldEvent {
    Ask,
    ClearAnswer,
    UnclearAnswer,
    AbsentAnswer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTransition {
    pub field: PreferenceField,
    pub from: FieldStatus,
    pub to: FieldStatus,
    pub event: FieldEvent,
}

/// Structured reading of one user turn, produced outside the core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnswerSignal {
    /// Values extracted from the reply; may cover fields other than the one asked.
    Answered(PreferenceUpdate),
    /// The reply was about the asked field but could not be understood.
    Unclear,
    /// Nothing usable came back (silence, topic switch).
    Absent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldPrompt {
    pub field: PreferenceField,
    pub with_examples: bool,
    pub examples: Vec<String>,
}

impl FieldPrompt {
    pub fn plain(field: PreferenceField) -> Self {
        Self { field, with_examples: false, examples: Vec::new() }
    }

    pub fn with_examples(field: PreferenceField) -> Self {
        Self {
            field,
            with_examples: true,
            examples: field.examples().iter().map(|example| (*example).to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ElicitationDirective {
    Ask(FieldPrompt),
    /// Every field is resolved; hand the record to the recommendation engine.
    Complete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElicitationStep {
    pub record: PreferenceRecord,
    pub directive: ElicitationDirective,
    pub transitions: Vec<FieldTransition>,
    pub search_text: String,
    pub missing_fields: Vec<PreferenceField>,
}

impl ElicitationStep {
    pub fn is_complete(&self) -> bool {
        matches!(self.directive, ElicitationDirective::Complete)
    }

    pub fn prompt(&self) -> Option<&FieldPrompt> {
        match &self.directive {
            ElicitationDirective::Ask(prompt) => Some(prompt),
            ElicitationDirective::Complete => None,
        }
    }
}
