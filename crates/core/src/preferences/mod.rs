//! Merging of partial preference updates into a session's PreferenceRecord.

mod update;
mod updater;

pub use update::{PreferenceUpdate, ProposedValue};
pub use updater::{PreferenceUpdater, UpdateOutcome};
