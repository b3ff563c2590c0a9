use std::collections::BTreeSet;

use tracing::debug;

use crate::domain::preference::{
    FieldStatus, FieldValue, PreferenceField, PreferenceRecord, PreferenceSlot,
};
use crate::domain::price::PriceRange;
use crate::preferences::update::{PreferenceUpdate, ProposedValue};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub record: PreferenceRecord,
    pub search_text: String,
    pub missing_fields: Vec<PreferenceField>,
    pub changed_fields: Vec<PreferenceField>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MergeMode {
    /// Purpose is additive and a give-up stays final.
    Elicitation,
    /// Every patched field is replaced and forced to Specified.
    Override,
}

/// Pure merge of partial updates into a PreferenceRecord.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreferenceUpdater;

impl PreferenceUpdater {
    pub fn new() -> Self {
        Self
    }

    /// Full merge used while eliciting: Purpose accumulates, other fields are
    /// last-write-wins, and Unspecified fields are left alone.
    pub fn apply(&self, record: PreferenceRecord, update: &PreferenceUpdate) -> UpdateOutcome {
        self.merge(record, update, MergeMode::Elicitation)
    }

    /// Targeted patch used by refinement: values replace, statuses become Specified.
    pub fn apply_override(
        &self,
        record: PreferenceRecord,
        update: &PreferenceUpdate,
    ) -> UpdateOutcome {
        self.merge(record, &update.concrete_only(), MergeMode::Override)
    }

    fn merge(
        &self,
        record: PreferenceRecord,
        update: &PreferenceUpdate,
        mode: MergeMode,
    ) -> UpdateOutcome {
        if !update.ignored_keys().is_empty() {
            debug!(
                event_name = "preferences.update.ignored_keys",
                ignored_keys = ?update.ignored_keys(),
                "ignoring unknown preference keys"
            );
        }

        let before = record.clone();
        let mut record = record;

        for (field, proposed) in update.entries() {
            let slot = record.slot_mut(field);
            merge_slot(field, slot, proposed, mode);
        }

        let changed_fields = PreferenceField::ALL
            .into_iter()
            .filter(|field| before.slot(*field) != record.slot(*field))
            .collect::<Vec<_>>();

        let search_text = record.search_text();
        let missing_fields = record.missing_fields();

        debug!(
            event_name = "preferences.update.applied",
            changed_fields = ?changed_fields,
            missing_fields = ?missing_fields,
            "preference update merged"
        );

        UpdateOutcome { record, search_text, missing_fields, changed_fields }
    }
}

fn merge_slot(
    field: PreferenceField,
    slot: &mut PreferenceSlot,
    proposed: &ProposedValue,
    mode: MergeMode,
) {
    if mode == MergeMode::Elicitation && slot.status == FieldStatus::Unspecified {
        return;
    }

    match proposed {
        ProposedValue::Unspecified => {
            let holds_purposes = field == PreferenceField::Purpose
                && slot.status == FieldStatus::Specified
                && mode == MergeMode::Elicitation;
            if !holds_purposes {
                slot.value = Some(FieldValue::Unspecified);
                slot.status = FieldStatus::Unspecified;
            }
        }
        ProposedValue::Purposes(items) => {
            let incoming = items
                .iter()
                .map(|item| item.trim().to_lowercase())
                .filter(|item| !item.is_empty())
                .collect::<BTreeSet<_>>();
            let merged = match (&slot.value, mode) {
                (Some(FieldValue::Purposes(existing)), MergeMode::Elicitation) => {
                    existing.union(&incoming).cloned().collect()
                }
                _ => incoming,
            };
            if merged.is_empty() {
                return;
            }
            slot.value = Some(FieldValue::Purposes(merged));
            slot.status = FieldStatus::Specified;
        }
        ProposedValue::Text(text) => {
            let value = if field == PreferenceField::PriceRange {
                PriceRange::parse(text)
                    .map(FieldValue::Budget)
                    .unwrap_or_else(|| FieldValue::Text(text.clone()))
            } else {
                FieldValue::Text(text.clone())
            };
            slot.value = Some(value);
            slot.status = FieldStatus::Specified;
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::PreferenceUpdater;
    use crate::domain::preference::{FieldStatus, FieldValue, PreferenceField, PreferenceRecord};
    use crate::preferences::PreferenceUpdate;

    fn apply_all(updates: &[PreferenceUpdate]) -> PreferenceRecord {
        let updater = PreferenceUpdater::new();
        updates
            .iter()
            .fold(PreferenceRecord::new(), |record, update| updater.apply(record, update).record)
    }

    #[test]
    fn purpose_is_additive_and_other_fields_are_last_write_wins() {
        let record = apply_all(&[
            PreferenceUpdate::new().with_purposes(["Gaming"]).with_text(PreferenceField::Ram, "8GB"),
            PreferenceUpdate::new().with_purposes(["coding"]).with_text(PreferenceField::Ram, "16GB"),
        ]);

        let purposes = record.value(PreferenceField::Purpose).and_then(FieldValue::purposes);
        assert_eq!(
            purposes.map(|set| set.iter().cloned().collect::<Vec<_>>()),
            Some(vec!["coding".to_string(), "gaming".to_string()])
        );
        assert_eq!(record.specified_text(PreferenceField::Ram).as_deref(), Some("16GB"));
        assert_eq!(record.status(PreferenceField::Purpose), FieldStatus::Specified);
    }

    #[test]
    fn search_text_depends_only_on_final_state() {
        let one_shot = apply_all(&[PreferenceUpdate::new()
            .with_purposes(["study", "gaming"])
            .with_text(PreferenceField::Storage, "512GB SSD")
            .with_text(PreferenceField::PriceRange, "40000-60000")]);

        let incremental = apply_all(&[
            PreferenceUpdate::new().with_text(PreferenceField::PriceRange, "Rs 10000"),
            PreferenceUpdate::new().with_purposes(["gaming"]),
            PreferenceUpdate::new().with_text(PreferenceField::Storage, "512GB SSD"),
            PreferenceUpdate::new().with_purposes(["study", "gaming"]),
            PreferenceUpdate::new().with_text(PreferenceField::PriceRange, "40000 - 60000"),
        ]);

        assert_eq!(one_shot, incremental);
        assert_eq!(one_shot.search_text(), incremental.search_text());
        assert_eq!(
            one_shot.search_text(),
            "gaming laptop study laptop 512GB SSD storage within budget 40000-60000 best laptop recommendations"
        );
    }

    #[test]
    fn fields_absent_from_the_update_keep_their_state() {
        let updater = PreferenceUpdater::new();
        let first = updater
            .apply(PreferenceRecord::new(), &PreferenceUpdate::new().with_text(PreferenceField::Display, "OLED"))
            .record;
        let outcome = updater.apply(first.clone(), &PreferenceUpdate::new());

        assert_eq!(outcome.record, first);
        assert!(outcome.changed_fields.is_empty());
        assert_eq!(outcome.missing_fields.len(), 6);
    }

    #[test]
    fn price_ranges_are_structured_when_parseable() {
        let record = apply_all(&[PreferenceUpdate::new()
            .with_text(PreferenceField::PriceRange, "under 1 lakh")]);
        let budget = record.budget().expect("parsed budget");
        assert_eq!(budget.max, Some(Decimal::from(100_000)));

        let opaque = apply_all(&[PreferenceUpdate::new()
            .with_text(PreferenceField::PriceRange, "whatever is reasonable")]);
        assert_eq!(
            opaque.value(PreferenceField::PriceRange),
            Some(&FieldValue::Text("whatever is reasonable".to_string()))
        );
        assert_eq!(opaque.status(PreferenceField::PriceRange), FieldStatus::Specified);
    }

    #[test]
    fn elicitation_merge_never_reopens_a_given_up_field() {
        let updater = PreferenceUpdater::new();
        let record = updater
            .apply(PreferenceRecord::new(), &PreferenceUpdate::new().with_unspecified(PreferenceField::Storage))
            .record;
        let outcome =
            updater.apply(record, &PreferenceUpdate::new().with_text(PreferenceField::Storage, "1TB"));

        assert_eq!(outcome.record.status(PreferenceField::Storage), FieldStatus::Unspecified);
        assert_eq!(outcome.record.value(PreferenceField::Storage), Some(&FieldValue::Unspecified));
        assert!(outcome.changed_fields.is_empty());
    }

    #[test]
    fn override_replaces_purpose_and_revives_unspecified_fields() {
        let updater = PreferenceUpdater::new();
        let record = updater
            .apply(
                PreferenceRecord::new(),
                &PreferenceUpdate::new()
                    .with_purposes(["gaming", "coding"])
                    .with_unspecified(PreferenceField::PriceRange),
            )
            .record;

        let outcome = updater.apply_override(
            record,
            &PreferenceUpdate::new()
                .with_purposes(["video editing"])
                .with_text(PreferenceField::PriceRange, "50000-70000"),
        );

        assert_eq!(outcome.record.purposes(), vec!["video editing".to_string()]);
        assert_eq!(outcome.record.status(PreferenceField::PriceRange), FieldStatus::Specified);
        assert_eq!(
            outcome.changed_fields,
            vec![PreferenceField::Purpose, PreferenceField::PriceRange]
        );
    }

    #[test]
    fn oversized_budget_is_kept_as_opaque_text() {
        let budget = "7922816251426433759354395033 lakh";
        let outcome = PreferenceUpdater::new().apply(
            PreferenceRecord::new(),
            &PreferenceUpdate::new().with_text(PreferenceField::PriceRange, budget),
        );

        assert_eq!(
            outcome.record.value(PreferenceField::PriceRange),
            Some(&FieldValue::Text(budget.to_string()))
        );
        assert_eq!(outcome.record.status(PreferenceField::PriceRange), FieldStatus::Specified);
    }
}
