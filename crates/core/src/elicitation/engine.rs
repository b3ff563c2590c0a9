use thiserror::Error;
use tracing::debug;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::preference::{FieldStatus, PreferenceField, PreferenceRecord};
use crate::elicitation::states::{
    AnswerSignal, ElicitationDirective, ElicitationStep, FieldEvent, FieldPrompt, FieldTransition,
};
use crate::preferences::{PreferenceUpdater, ProposedValue};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ElicitationError {
    #[error("invalid transition for {field:?} from {status:?} using event {event:?}")]
    InvalidTransition { field: PreferenceField, status: FieldStatus, event: FieldEvent },
}

/// Per-field question state machine.
///
/// A clear answer may also land on a field that was never asked, when the user
/// volunteers it ahead of time.
pub fn transition(
    field: PreferenceField,
    current: FieldStatus,
    event: FieldEvent,
) -> Result<FieldTransition, ElicitationError> {
    use FieldEvent::{AbsentAnswer, Ask, ClearAnswer, UnclearAnswer};
    use FieldStatus::{AskedOnce, AskedWithExamples, NotAsked, Specified, Unspecified};

    let to = match (current, event) {
        (NotAsked, Ask) => AskedOnce,
        (NotAsked | AskedOnce | AskedWithExamples, ClearAnswer) => Specified,
        (AskedOnce, UnclearAnswer | AbsentAnswer) => AskedWithExamples,
        (AskedWithExamples, UnclearAnswer | AbsentAnswer) => Unspecified,
        _ => return Err(ElicitationError::InvalidTransition { field, status: current, event }),
    };

    Ok(FieldTransition { field, from: current, to, event })
}

/// Decides what to ask next. Depends only on the PreferenceUpdater.
#[derive(Clone, Copy, Debug, Default)]
pub struct ElicitationController {
    updater: PreferenceUpdater,
}

impl ElicitationController {
    pub fn new(updater: PreferenceUpdater) -> Self {
        Self { updater }
    }

    /// First directive for a record; re-issues the outstanding question if one exists.
    pub fn start(&self, record: PreferenceRecord) -> Result<ElicitationStep, ElicitationError> {
        self.advance(record, Vec::new())
    }

    pub fn handle(
        &self,
        record: PreferenceRecord,
        signal: AnswerSignal,
    ) -> Result<ElicitationStep, ElicitationError> {
        let pending = record.awaiting_field();
        let mut record = record;
        let mut transitions = Vec::new();

        let pending_event = match signal {
            AnswerSignal::Answered(update) => {
                let pending_proposal = pending.and_then(|field| update.get(field));
                let pending_event = match pending_proposal {
                    Some(ProposedValue::Purposes(_) | ProposedValue::Text(_)) => None,
                    Some(ProposedValue::Unspecified) => Some(FieldEvent::UnclearAnswer),
                    None => Some(FieldEvent::AbsentAnswer),
                };

                // Only the state machine gives a field up.
                let before = record.clone();
                let outcome = self.updater.apply(record, &update.concrete_only());
                record = outcome.record;
                for field in outcome.changed_fields {
                    let from = before.status(field);
                    if from != record.status(field) {
                        transitions.push(transition(field, from, FieldEvent::ClearAnswer)?);
                    }
                }
                pending_event
            }
            AnswerSignal::Unclear => Some(FieldEvent::UnclearAnswer),
            AnswerSignal::Absent => Some(FieldEvent::AbsentAnswer),
        };

        if let (Some(field), Some(event)) = (pending, pending_event) {
            let applied = transition(field, record.status(field), event)?;
            record.set_status(field, applied.to);
            transitions.push(applied);
        }

        self.advance(record, transitions)
    }

    pub fn start_with_audit<S>(
        &self,
        record: PreferenceRecord,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<ElicitationStep, ElicitationError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.start(record);
        emit_step(&result, sink, audit);
        result
    }

    pub fn handle_with_audit<S>(
        &self,
        record: PreferenceRecord,
        signal: AnswerSignal,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<ElicitationStep, ElicitationError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.handle(record, signal);
        emit_step(&result, sink, audit);
        result
    }

    fn advance(
        &self,
        record: PreferenceRecord,
        transitions: Vec<FieldTransition>,
    ) -> Result<ElicitationStep, ElicitationError> {
        let mut record = record;
        let mut transitions = transitions;

        let directive = match record.missing_fields().first().copied() {
            None => ElicitationDirective::Complete,
            Some(field) => match record.status(field) {
                FieldStatus::NotAsked => {
                    let asked = transition(field, FieldStatus::NotAsked, FieldEvent::Ask)?;
                    record.set_status(field, asked.to);
                    transitions.push(asked);
                    ElicitationDirective::Ask(FieldPrompt::plain(field))
                }
                FieldStatus::AskedWithExamples => {
                    ElicitationDirective::Ask(FieldPrompt::with_examples(field))
                }
                _ => ElicitationDirective::Ask(FieldPrompt::plain(field)),
            },
        };

        let search_text = record.search_text();
        let missing_fields = record.missing_fields();

        debug!(
            event_name = "elicitation.turn.handled",
            transitions = transitions.len(),
            missing_fields = ?missing_fields,
            directive = ?directive,
            "elicitation turn handled"
        );

        Ok(ElicitationStep { record, directive, transitions, search_text, missing_fields })
    }
}

fn emit_step<S>(result: &Result<ElicitationStep, ElicitationError>, sink: &S, audit: &AuditContext)
where
    S: AuditSink + ?Sized,
{
    match result {
        Ok(step) => {
            for applied in &step.transitions {
                sink.emit(
                    audit
                        .event(
                            "elicitation.field_transition",
                            AuditCategory::Elicitation,
                            AuditOutcome::Success,
                        )
                        .with_metadata("field", applied.field.key())
                        .with_metadata("from", format!("{:?}", applied.from))
                        .with_metadata("to", format!("{:?}", applied.to))
                        .with_metadata("event", format!("{:?}", applied.event)),
                );
            }
            if step.is_complete() {
                sink.emit(
                    audit
                        .event(
                            "elicitation.completed",
                            AuditCategory::Elicitation,
                            AuditOutcome::Success,
                        )
                        .with_metadata("search_text", step.search_text.clone())
                        .with_metadata(
                            "unspecified_fields",
                            step.record
                                .unspecified_fields()
                                .iter()
                                .map(|field| field.key())
                                .collect::<Vec<_>>()
                                .join(","),
                        ),
                );
            }
        }
        Err(error) => {
            sink.emit(
                audit
                    .event(
                        "elicitation.transition_rejected",
                        AuditCategory::Elicitation,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::preference::{FieldStatus, PreferenceField, PreferenceRecord};
    use crate::elicitation::engine::{transition, ElicitationController, ElicitationError};
    use crate::elicitation::states::{
        AnswerSignal, ElicitationDirective, ElicitationStep, FieldEvent, FieldPrompt,
    };
    use crate::preferences::PreferenceUpdate;

    fn answer(field: PreferenceField, value: &str) -> AnswerSignal {
        AnswerSignal::Answered(PreferenceUpdate::new().with_text(field, value))
    }

    fn asked(step: &ElicitationStep) -> Option<(PreferenceField, bool)> {
        step.prompt().map(|prompt| (prompt.field, prompt.with_examples))
    }

    #[test]
    fn transition_table_accepts_the_documented_moves() {
        use FieldEvent::*;
        use FieldStatus::*;

        let field = PreferenceField::Ram;
        let cases = [
            (NotAsked, Ask, AskedOnce),
            (NotAsked, ClearAnswer, Specified),
            (AskedOnce, ClearAnswer, Specified),
            (AskedOnce, UnclearAnswer, AskedWithExamples),
            (AskedOnce, AbsentAnswer, AskedWithExamples),
            (AskedWithExamples, ClearAnswer, Specified),
            (AskedWithExamples, UnclearAnswer, Unspecified),
            (AskedWithExamples, AbsentAnswer, Unspecified),
        ];

        for (from, event, to) in cases {
            let applied = transition(field, from, event).expect("documented transition");
            assert_eq!(applied.to, to, "{from:?} + {event:?}");
        }
    }

    #[test]
    fn terminal_states_and_double_asks_are_rejected() {
        for (status, event) in [
            (FieldStatus::Unspecified, FieldEvent::Ask),
            (FieldStatus::Unspecified, FieldEvent::ClearAnswer),
            (FieldStatus::Specified, FieldEvent::UnclearAnswer),
            (FieldStatus::AskedOnce, FieldEvent::Ask),
            (FieldStatus::NotAsked, FieldEvent::UnclearAnswer),
        ] {
            let error = transition(PreferenceField::Display, status, event)
                .expect_err("transition must be rejected");
            assert_eq!(
                error,
                ElicitationError::InvalidTransition { field: PreferenceField::Display, status, event }
            );
        }
    }

    #[test]
    fn scenario_a_reaches_hand_off_after_exactly_the_scripted_turns() {
        let controller = ElicitationController::default();
        let turns = [
            AnswerSignal::Answered(PreferenceUpdate::new().with_purposes(["gaming"])),
            AnswerSignal::Unclear,
            AnswerSignal::Unclear,
            answer(PreferenceField::Ram, "16GB"),
            AnswerSignal::Absent,
            answer(PreferenceField::Storage, "unspecified"),
            answer(PreferenceField::Graphics, "RTX"),
            AnswerSignal::Unclear,
            AnswerSignal::Unclear,
            answer(PreferenceField::PriceRange, "40000-60000"),
        ];
        let expected_prompts = [
            Some((PreferenceField::Processor, false)),
            Some((PreferenceField::Processor, true)),
            Some((PreferenceField::Ram, false)),
            Some((PreferenceField::Storage, false)),
            Some((PreferenceField::Storage, true)),
            Some((PreferenceField::Graphics, false)),
            Some((PreferenceField::Display, false)),
            Some((PreferenceField::Display, true)),
            Some((PreferenceField::PriceRange, false)),
            None,
        ];

        let mut step = controller.start(PreferenceRecord::new()).expect("start");
        assert_eq!(asked(&step), Some((PreferenceField::Purpose, false)));

        for (turn, expected) in turns.into_iter().zip(expected_prompts) {
            assert!(!step.is_complete());
            step = controller.handle(step.record, turn).expect("turn");
            assert_eq!(asked(&step), expected);
            assert_eq!(step.missing_fields.is_empty(), expected.is_none());
        }

        assert!(step.is_complete());
        assert_eq!(
            step.record.unspecified_fields(),
            vec![PreferenceField::Processor, PreferenceField::Storage, PreferenceField::Display]
        );
        assert_eq!(
            step.search_text,
            "gaming laptop 16GB RAM RTX graphics within budget 40000-60000 best laptop recommendations"
        );
    }

    #[test]
    fn two_unusable_answers_always_give_up_and_never_reask() {
        let controller = ElicitationController::default();

        for target in PreferenceField::ALL {
            let preceding = PreferenceField::ALL
                .into_iter()
                .take_while(|field| *field != target)
                .fold(PreferenceUpdate::new(), |update, field| {
                    update.with_text(field, format!("{} choice", field.key()))
                });

            let mut step = controller.start(PreferenceRecord::new()).expect("start");
            if !preceding.is_empty() {
                step = controller.handle(step.record, AnswerSignal::Answered(preceding)).expect("volunteer");
            }
            assert_eq!(asked(&step), Some((target, false)));

            step = controller.handle(step.record, AnswerSignal::Unclear).expect("first miss");
            assert_eq!(asked(&step), Some((target, true)));
            step = controller.handle(step.record, AnswerSignal::Absent).expect("second miss");
            assert_eq!(step.record.status(target), FieldStatus::Unspecified);

            while !step.is_complete() {
                assert_ne!(step.prompt().map(|prompt| prompt.field), Some(target));
                step = controller.handle(step.record, AnswerSignal::Unclear).expect("drain");
                assert_eq!(step.record.status(target), FieldStatus::Unspecified);
            }
        }
    }

    #[test]
    fn volunteered_fields_are_skipped_and_only_one_new_field_is_asked() {
        let controller = ElicitationController::default();
        let step = controller.start(PreferenceRecord::new()).expect("start");

        let step = controller
            .handle(
                step.record,
                AnswerSignal::Answered(
                    PreferenceUpdate::new()
                        .with_purposes(["coding"])
                        .with_text(PreferenceField::Ram, "32GB")
                        .with_text(PreferenceField::Display, "14\" OLED")
                        .with_unspecified(PreferenceField::Storage),
                ),
            )
            .expect("multi-field answer");

        assert_eq!(
            step.directive,
            ElicitationDirective::Ask(FieldPrompt::plain(PreferenceField::Processor))
        );
        assert_eq!(step.record.status(PreferenceField::Ram), FieldStatus::Specified);
        assert_eq!(step.record.status(PreferenceField::Display), FieldStatus::Specified);
        assert_eq!(step.record.status(PreferenceField::Storage), FieldStatus::NotAsked);
        assert_eq!(
            step.missing_fields,
            vec![
                PreferenceField::Processor,
                PreferenceField::Storage,
                PreferenceField::Graphics,
                PreferenceField::PriceRange
            ]
        );
        let newly_asked = PreferenceField::ALL
            .into_iter()
            .filter(|field| step.record.status(*field) == FieldStatus::AskedOnce)
            .count();
        assert_eq!(newly_asked, 1);
        assert_eq!(step.transitions.len(), 4);
    }

    #[test]
    fn answering_a_different_field_counts_as_absent_for_the_pending_one() {
        let controller = ElicitationController::default();
        let step = controller.start(PreferenceRecord::new()).expect("start");

        let step = controller.handle(step.record, answer(PreferenceField::Ram, "8GB")).expect("turn");

        assert_eq!(asked(&step), Some((PreferenceField::Purpose, true)));
        assert_eq!(step.record.status(PreferenceField::Ram), FieldStatus::Specified);
        assert_eq!(
            step.prompt().map(|prompt| prompt.examples.is_empty()),
            Some(false)
        );
    }

    #[test]
    fn audited_turns_emit_one_event_per_field_transition() {
        let controller = ElicitationController::default();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(None, "req-1", "elicitation");

        let step = controller.start_with_audit(PreferenceRecord::new(), &sink, &audit).expect("start");
        controller
            .handle_with_audit(
                step.record,
                AnswerSignal::Answered(PreferenceUpdate::new().with_purposes(["study"])),
                &sink,
                &audit,
            )
            .expect("answer");

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|event| event.event_type == "elicitation.field_transition"));
        assert_eq!(events[1].metadata.get("field").map(String::as_str), Some("purpose"));
        assert_eq!(events[1].metadata.get("to").map(String::as_str), Some("Specified"));
        assert_eq!(events[2].metadata.get("field").map(String::as_str), Some("processor"));
    }
}
