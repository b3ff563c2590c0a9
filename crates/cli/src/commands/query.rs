use clap::Args;
use lapwise_core::domain::preference::{PreferenceField, PreferenceRecord};
use lapwise_core::preferences::{PreferenceUpdate, PreferenceUpdater};
use serde::Serialize;
use serde_json::Value;

use super::CommandResult;

#[derive(Debug, Clone, Default, Args)]
pub struct QueryArgs {
    #[arg(long = "purpose", help = "Intended use; repeat for several purposes")]
    pub purposes: Vec<String>,
    #[arg(long)]
    pub processor: Option<String>,
    #[arg(long)]
    pub ram: Option<String>,
    #[arg(long)]
    pub storage: Option<String>,
    #[arg(long)]
    pub graphics: Option<String>,
    #[arg(long)]
    pub display: Option<String>,
    #[arg(long = "price-range")]
    pub price_range: Option<String>,
}

impl QueryArgs {
    fn to_update(&self) -> PreferenceUpdate {
        let mut update = PreferenceUpdate::new();
        if !self.purposes.is_empty() {
            update = update.with_purposes(self.purposes.iter().cloned());
        }
        let texts = [
            (PreferenceField::Processor, &self.processor),
            (PreferenceField::Ram, &self.ram),
            (PreferenceField::Storage, &self.storage),
            (PreferenceField::Graphics, &self.graphics),
            (PreferenceField::Display, &self.display),
            (PreferenceField::PriceRange, &self.price_range),
        ];
        for (field, value) in texts {
            if let Some(value) = value {
                update = update.with_text(field, value.clone());
            }
        }
        update
    }
}

#[derive(Debug, Serialize)]
struct QueryOutput {
    preferences_json: Value,
    search_text: String,
    missing_fields: Vec<&'static str>,
}

/// Offline preview of what a search for these preferences would look like.
pub fn run(args: &QueryArgs) -> CommandResult {
    let outcome = PreferenceUpdater::new().apply(PreferenceRecord::new(), &args.to_update());

    let output = QueryOutput {
        preferences_json: outcome.record.to_json_value(),
        search_text: outcome.search_text,
        missing_fields: outcome.missing_fields.iter().map(|field| field.key()).collect(),
    };
    CommandResult::data("query", &output)
}
