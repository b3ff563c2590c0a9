use std::collections::BTreeSet;

use async_trait::async_trait;
use lapwise_core::comparison::CandidateRef;
use lapwise_core::domain::preference::PreferenceField;
use lapwise_core::domain::price::PriceRange;
use lapwise_core::elicitation::AnswerSignal;
use lapwise_core::preferences::{PreferenceUpdate, ProposedValue};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::llm::LlmClient;

/// Where the conversation is when a message arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversationStage {
    Eliciting { pending: Option<PreferenceField> },
    Recommended,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserIntent {
    Answer(AnswerSignal),
    Compare(CandidateRef, CandidateRef),
    Modify(PreferenceUpdate),
    Unrecognized,
}

#[async_trait]
pub trait AnswerInterpreter: Send + Sync {
    async fn interpret(&self, text: &str, stage: ConversationStage) -> UserIntent;
}

const UNSURE_PHRASES: [&str; 17] = [
    "not sure",
    "unsure",
    "don't know",
    "dont know",
    "do not know",
    "no idea",
    "no clue",
    "idk",
    "no preference",
    "doesn't matter",
    "does not matter",
    "don't care",
    "dont care",
    "whatever",
    "anything is fine",
    "any is fine",
    "skip",
];

const PURPOSE_KEYWORDS: [(&str, &str); 27] = [
    ("video editing", "video editing"),
    ("photo editing", "photo editing"),
    ("graphic design", "graphic design"),
    ("music production", "music production"),
    ("content creation", "content creation"),
    ("data science", "data science"),
    ("machine learning", "data science"),
    ("office work", "office work"),
    ("gaming", "gaming"),
    ("games", "gaming"),
    ("game", "gaming"),
    ("coding", "coding"),
    ("programming", "coding"),
    ("development", "coding"),
    ("study", "study"),
    ("studies", "study"),
    ("studying", "study"),
    ("school", "study"),
    ("college", "study"),
    ("university", "study"),
    ("student", "study"),
    ("office", "office work"),
    ("work", "office work"),
    ("business", "office work"),
    ("browsing", "browsing"),
    ("streaming", "browsing"),
    ("design", "graphic design"),
];

const BUDGET_MARKERS: [&str; 16] = [
    "budget", "under", "below", "within", "upto", "up", "around", "about", "between", "above",
    "over", "max", "maximum", "price", "rs", "inr",
];

const BUDGET_CONNECTORS: [&str; 17] = [
    "to", "and", "-", "of", "is", "than", "less", "more", "at", "least", "most", "rs", "inr",
    "lakh", "lakhs", "k", "thousand",
];

/// Deterministic, offline reading of a user message.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordAnswerInterpreter;

impl KeywordAnswerInterpreter {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str, stage: ConversationStage) -> UserIntent {
        let normalized = normalize_text(text);
        match stage {
            ConversationStage::Recommended => {
                if normalized.is_empty() {
                    return UserIntent::Unrecognized;
                }
                if let Some((first, second)) = extract_compare(&normalized) {
                    return UserIntent::Compare(first, second);
                }
                let update = self.extract(text, None);
                if update.concrete_only().is_empty() {
                    UserIntent::Unrecognized
                } else {
                    UserIntent::Modify(update)
                }
            }
            ConversationStage::Eliciting { pending } => {
                if normalized.is_empty() {
                    return UserIntent::Answer(AnswerSignal::Absent);
                }
                let update = self.extract(text, pending);
                if !update.is_empty() {
                    return UserIntent::Answer(AnswerSignal::Answered(update));
                }
                if is_unsure(&normalized) {
                    debug!(event_name = "conversation.answer.unsure", "user is unsure");
                }
                UserIntent::Answer(AnswerSignal::Unclear)
            }
        }
    }

    /// Pulls every recognisable preference out of free text.
    ///
    /// `pending` lets bare replies ("50k", "intel") count for the asked field.
    pub fn extract(&self, text: &str, pending: Option<PreferenceField>) -> PreferenceUpdate {
        let normalized = normalize_text(text);
        let tokens = tokenize(&normalized);
        let mut update = PreferenceUpdate::new();

        let purposes = extract_purposes(&tokens);
        if !purposes.is_empty() {
            update.insert(PreferenceField::Purpose, ProposedValue::Purposes(purposes));
        }

        let capacities = extract_capacities(&tokens);
        if let Some(ram) = &capacities.ram {
            update.insert(PreferenceField::Ram, ProposedValue::Text(ram.clone()));
        }
        if !capacities.storage.is_empty() {
            update.insert(
                PreferenceField::Storage,
                ProposedValue::Text(capacities.storage.join(" + ")),
            );
        }

        if let Some(processor) = extract_processor(&tokens, pending == Some(PreferenceField::Processor)) {
            update.insert(PreferenceField::Processor, ProposedValue::Text(processor));
        }
        if let Some(graphics) = extract_graphics(&tokens) {
            update.insert(PreferenceField::Graphics, ProposedValue::Text(graphics));
        }
        if let Some(display) = extract_display(&tokens) {
            update.insert(PreferenceField::Display, ProposedValue::Text(display));
        }

        let budget = extract_budget(&tokens).or_else(|| {
            let bare_reply = pending == Some(PreferenceField::PriceRange)
                && capacities.ram.is_none()
                && capacities.storage.is_empty();
            bare_reply.then(|| normalized.clone()).filter(|text| is_plausible_budget(text))
        });
        if let Some(budget) = budget {
            update.insert(PreferenceField::PriceRange, ProposedValue::Text(budget));
        }

        update
    }
}

#[async_trait]
impl AnswerInterpreter for KeywordAnswerInterpreter {
    async fn interpret(&self, text: &str, stage: ConversationStage) -> UserIntent {
        self.classify(text, stage)
    }
}

/// Asks the language collaborator for a structured reading, falling back to
/// keyword rules whenever its output cannot be used.
pub struct LlmAnswerInterpreter<C> {
    client: C,
    fallback: KeywordAnswerInterpreter,
}

impl<C> LlmAnswerInterpreter<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client, fallback: KeywordAnswerInterpreter::new() }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<C> AnswerInterpreter for LlmAnswerInterpreter<C>
where
    C: LlmClient,
{
    async fn interpret(&self, text: &str, stage: ConversationStage) -> UserIntent {
        if text.trim().is_empty() {
            return self.fallback.classify(text, stage);
        }

        let prompt = extraction_prompt(text, stage);
        let completion = match self.client.complete(&prompt).await {
            Ok(completion) => completion,
            Err(error) => {
                warn!(
                    event_name = "conversation.llm.failed",
                    error = %error,
                    "llm interpretation failed; using keyword rules"
                );
                return self.fallback.classify(text, stage);
            }
        };

        match parse_extraction(&completion, stage) {
            Some(intent) => intent,
            None => {
                warn!(
                    event_name = "conversation.llm.malformed",
                    completion_chars = completion.len(),
                    "llm returned unusable output; using keyword rules"
                );
                self.fallback.classify(text, stage)
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    intent: String,
    #[serde(default)]
    fields: Value,
    #[serde(default)]
    unclear: bool,
    #[serde(default)]
    compare: Vec<Value>,
}

fn extraction_prompt(text: &str, stage: ConversationStage) -> String {
    let situation = match stage {
        ConversationStage::Eliciting { pending: Some(field) } => {
            format!("The assistant just asked the shopper about: {} (`{}`).", field.label(), field.key())
        }
        ConversationStage::Eliciting { pending: None } => {
            "The assistant is collecting laptop preferences.".to_string()
        }
        ConversationStage::Recommended => {
            "The assistant has already shown a numbered list of recommended laptops.".to_string()
        }
    };
    let keys = PreferenceField::ALL.iter().map(|field| field.key()).collect::<Vec<_>>().join(", ");

    format!(
        "You translate one chat message from a laptop shopper into JSON. Do not answer the shopper.\n\
         {situation}\n\
         Return exactly one JSON object with these keys:\n\
         - \"intent\": one of \"answer\", \"compare\", \"modify\", \"unrecognized\"\n\
         - \"fields\": object using only these keys: {keys}; \"purpose\" is a list of strings, \
         every other value is a short string; use \"unspecified\" only if the shopper explicitly \
         has no preference; omit fields that were not mentioned\n\
         - \"unclear\": true if the message is about the asked field but gives no usable value\n\
         - \"compare\": two items (list numbers or model names) when the shopper wants a comparison\n\
         Message: {text:?}"
    )
}

fn parse_extraction(completion: &str, stage: ConversationStage) -> Option<UserIntent> {
    let start = completion.find('{')?;
    let end = completion.rfind('}')?;
    if end < start {
        return None;
    }
    let response = serde_json::from_str::<ExtractionResponse>(&completion[start..=end]).ok()?;

    let update = PreferenceUpdate::from_json(&response.fields);
    if !update.ignored_keys().is_empty() {
        debug!(
            event_name = "conversation.fields.ignored",
            ignored_keys = ?update.ignored_keys(),
            "ignoring unknown preference keys from llm"
        );
    }

    let intent = match response.intent.trim().to_ascii_lowercase().as_str() {
        "compare" => {
            let refs = response.compare.iter().filter_map(candidate_ref).collect::<Vec<_>>();
            match refs.as_slice() {
                [first, second] => UserIntent::Compare(first.clone(), second.clone()),
                _ => UserIntent::Unrecognized,
            }
        }
        "modify" if update.concrete_only().is_empty() => UserIntent::Unrecognized,
        "modify" => UserIntent::Modify(update),
        "answer" if response.unclear && update.is_empty() => UserIntent::Answer(AnswerSignal::Unclear),
        "answer" if update.is_empty() => UserIntent::Answer(AnswerSignal::Absent),
        "answer" => UserIntent::Answer(AnswerSignal::Answered(update)),
        "unrecognized" => UserIntent::Unrecognized,
        _ => return None,
    };

    // Stage decides what an intent can mean; the model only labels it.
    Some(match (stage, intent) {
        (ConversationStage::Eliciting { .. }, UserIntent::Modify(update)) => {
            UserIntent::Answer(AnswerSignal::Answered(update))
        }
        (ConversationStage::Eliciting { .. }, UserIntent::Unrecognized) => {
            UserIntent::Answer(AnswerSignal::Absent)
        }
        (ConversationStage::Recommended, UserIntent::Answer(AnswerSignal::Answered(update))) => {
            UserIntent::Modify(update)
        }
        (_, intent) => intent,
    })
}

fn candidate_ref(value: &Value) -> Option<CandidateRef> {
    match value {
        Value::Number(number) => number.as_u64().map(|position| CandidateRef::Position(position as usize)),
        Value::String(text) => parse_candidate_ref(text),
        _ => None,
    }
}

fn parse_candidate_ref(text: &str) -> Option<CandidateRef> {
    let mut words = text
        .trim()
        .trim_matches(|character: char| matches!(character, '?' | '.' | '!' | ','))
        .split_whitespace()
        .map(|word| word.trim_start_matches('#'))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>();
    while let Some(first) = words.first() {
        if matches!(*first, "the" | "number" | "no" | "no." | "option" | "model" | "laptop") {
            words.remove(0);
        } else {
            break;
        }
    }
    if words.is_empty() {
        return None;
    }

    let joined = words.join(" ");
    match joined.parse::<usize>() {
        Ok(position) => Some(CandidateRef::Position(position)),
        Err(_) => Some(CandidateRef::Title(joined)),
    }
}

fn extract_compare(normalized: &str) -> Option<(CandidateRef, CandidateRef)> {
    let subject = if let Some(index) = normalized.find("compare ") {
        &normalized[index + "compare ".len()..]
    } else if let Some(index) = normalized.find("difference between ") {
        &normalized[index + "difference between ".len()..]
    } else if normalized.contains(" vs") || normalized.contains(" versus ") {
        normalized
    } else {
        return None;
    };

    for separator in [" and ", " vs. ", " vs ", " versus ", " with ", " & ", " to "] {
        if let Some((first, second)) = subject.split_once(separator) {
            let first = parse_candidate_ref(first)?;
            let second = parse_candidate_ref(second)?;
            return Some((first, second));
        }
    }
    None
}

fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase().replace(['–', '—'], "-").replace('’', "'")
}

fn tokenize(normalized: &str) -> Vec<String> {
    normalized
        .split(|character: char| {
            character.is_whitespace() || matches!(character, ';' | '/' | '(' | ')' | '+' | '!' | '?' | '|')
        })
        .map(|token| token.trim_matches(|character: char| matches!(character, ',' | ':')))
        .map(|token| token.trim_end_matches('.'))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_unsure(normalized: &str) -> bool {
    UNSURE_PHRASES.iter().any(|phrase| normalized.contains(phrase))
}

fn extract_purposes(tokens: &[String]) -> Vec<String> {
    let padded = format!(" {} ", tokens.join(" "));
    let mut consumed = padded.clone();
    let mut purposes = BTreeSet::new();

    for (keyword, purpose) in PURPOSE_KEYWORDS {
        let needle = format!(" {keyword} ");
        if consumed.contains(&needle) {
            purposes.insert(purpose.to_string());
            // Multi-word phrases win over their parts ("video editing" is not also "editing").
            consumed = consumed.replace(&needle, "  ");
        }
    }

    purposes.into_iter().collect()
}

#[derive(Debug, Default)]
struct Capacities {
    ram: Option<String>,
    storage: Vec<String>,
}

fn capacity_token(tokens: &[String], index: usize) -> Option<(f64, String, usize)> {
    let token = tokens[index].as_str();
    let split_unit = |token: &str| -> Option<(f64, &'static str)> {
        for (suffix, unit) in [("gb", "GB"), ("tb", "TB")] {
            if let Some(number) = token.strip_suffix(suffix) {
                return number.parse::<f64>().ok().map(|value| (value, unit));
            }
        }
        None
    };

    if let Some((value, unit)) = split_unit(token) {
        return Some((value, unit.to_string(), 1));
    }
    let value = token.parse::<f64>().ok()?;
    let unit = match tokens.get(index + 1).map(String::as_str) {
        Some("gb") => "GB",
        Some("tb") => "TB",
        _ => return None,
    };
    Some((value, unit.to_string(), 2))
}

fn format_capacity(value: f64, unit: &str) -> String {
    if value.fract() == 0.0 {
        format!("{}{unit}", value as u64)
    } else {
        format!("{value}{unit}")
    }
}

fn extract_capacities(tokens: &[String]) -> Capacities {
    let mut capacities = Capacities::default();
    let mut index = 0;

    while index < tokens.len() {
        let Some((value, unit, consumed)) = capacity_token(tokens, index) else {
            index += 1;
            continue;
        };
        let label = format_capacity(value, &unit);
        let previous = index.checked_sub(1).and_then(|previous| tokens.get(previous)).map(String::as_str);
        let following = tokens
            .iter()
            .skip(index + consumed)
            .take(2)
            .map(String::as_str)
            .collect::<Vec<_>>();
        index += consumed;

        let is_vram = matches!(previous, Some("rtx" | "gtx" | "vram"))
            || following.iter().any(|token| matches!(*token, "vram" | "gddr6" | "gddr5"));
        if is_vram {
            continue;
        }

        let storage_kind = following
            .iter()
            .find_map(|token| match *token {
                "ssd" => Some("SSD"),
                "hdd" => Some("HDD"),
                "nvme" => Some("NVMe SSD"),
                "emmc" => Some("eMMC"),
                "storage" => Some(""),
                _ => None,
            });
        let is_ram = following
            .iter()
            .chain(previous.iter())
            .any(|token| matches!(*token, "ram" | "memory" | "ddr4" | "ddr5" | "lpddr5"));

        if let Some(kind) = storage_kind {
            let label = if kind.is_empty() { label } else { format!("{label} {kind}") };
            capacities.storage.push(label);
        } else if is_ram {
            capacities.ram.get_or_insert(label);
        } else if unit == "TB" || value >= 128.0 {
            capacities.storage.push(label);
        } else {
            capacities.ram.get_or_insert(label);
        }
    }

    capacities
}

fn extract_processor(tokens: &[String], bare_brand_allowed: bool) -> Option<String> {
    for (index, token) in tokens.iter().enumerate() {
        let next = tokens.get(index + 1).map(String::as_str);
        let previous = index.checked_sub(1).and_then(|previous| tokens.get(previous)).map(String::as_str);

        if let Some(tier) = intel_tier(token) {
            return Some(format!("Intel Core {tier}"));
        }
        match token.as_str() {
            "ryzen" => {
                return Some(match next.filter(|next| next.chars().all(|c| c.is_ascii_digit())) {
                    Some(series) => format!("AMD Ryzen {series}"),
                    None => "AMD Ryzen".to_string(),
                });
            }
            "ultra" if matches!(previous, Some("core" | "intel")) => {
                if let Some(series) = next.filter(|next| matches!(*next, "5" | "7" | "9")) {
                    return Some(format!("Intel Core Ultra {series}"));
                }
            }
            "m1" | "m2" | "m3" | "m4" => {
                let variant = match next {
                    Some("pro") => " Pro",
                    Some("max") => " Max",
                    _ => "",
                };
                return Some(format!("Apple {}{variant}", token.to_uppercase()));
            }
            "snapdragon" => return Some("Qualcomm Snapdragon".to_string()),
            _ => {}
        }
    }

    if bare_brand_allowed {
        for token in tokens {
            match token.as_str() {
                "intel" => return Some("Intel".to_string()),
                "amd" => return Some("AMD".to_string()),
                "apple" => return Some("Apple Silicon".to_string()),
                _ => {}
            }
        }
    }
    None
}

fn intel_tier(token: &str) -> Option<&str> {
    let tier = token.get(..2)?;
    let is_tier = matches!(tier, "i3" | "i5" | "i7" | "i9");
    let rest = &token[2..];
    (is_tier && (rest.is_empty() || rest.starts_with('-'))).then_some(tier)
}

fn extract_graphics(tokens: &[String]) -> Option<String> {
    for (index, token) in tokens.iter().enumerate() {
        let next = tokens.get(index + 1).map(String::as_str);
        let model_number = next.filter(|next| next.chars().all(|c| c.is_ascii_digit()));

        for (prefix, brand) in [("rtx", "NVIDIA RTX"), ("gtx", "NVIDIA GTX")] {
            if let Some(rest) = token.strip_prefix(prefix) {
                if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
                    return Some(format!("{brand} {rest}"));
                }
                if rest.is_empty() {
                    return Some(match model_number {
                        Some(model) => format!("{brand} {model}"),
                        None => brand.to_string(),
                    });
                }
            }
        }

        match token.as_str() {
            "rx" if model_number.is_some() => {
                return model_number.map(|model| format!("AMD Radeon RX {model}"));
            }
            "radeon" if next != Some("rx") => return Some("AMD Radeon".to_string()),
            "integrated" | "igpu" | "iris" => return Some("Integrated graphics".to_string()),
            "dedicated" | "discrete" => return Some("Dedicated graphics".to_string()),
            "nvidia" if !matches!(next, Some("rtx" | "gtx")) => return Some("NVIDIA".to_string()),
            _ => {}
        }
    }
    None
}

fn display_size(tokens: &[String], index: usize) -> Option<String> {
    let token = tokens[index].as_str();
    let next = tokens.get(index + 1).map(String::as_str);

    let (number, marked) = if let Some(number) = token.strip_suffix('"') {
        (number, true)
    } else if let Some(number) = token.strip_suffix("-inch").or_else(|| token.strip_suffix("inch")) {
        (number, true)
    } else {
        (token, matches!(next, Some("inch" | "inches" | "in" | "\"")))
    };
    if !marked {
        return None;
    }
    let size = number.parse::<f64>().ok()?;
    (10.0..=18.5).contains(&size).then(|| format!("{number}\""))
}

fn extract_display(tokens: &[String]) -> Option<String> {
    let mut parts = Vec::new();
    let push = |part: String, parts: &mut Vec<String>| {
        if !parts.contains(&part) {
            parts.push(part);
        }
    };

    for (index, token) in tokens.iter().enumerate() {
        if let Some(size) = display_size(tokens, index) {
            push(size, &mut parts);
            continue;
        }
        let next = tokens.get(index + 1).map(String::as_str);
        let part = match token.as_str() {
            "oled" => Some("OLED".to_string()),
            "amoled" => Some("AMOLED".to_string()),
            "ips" => Some("IPS".to_string()),
            "led" => Some("LED".to_string()),
            "qled" => Some("QLED".to_string()),
            "retina" => Some("Retina".to_string()),
            "touchscreen" | "touch" if next != Some("id") => Some("Touchscreen".to_string()),
            "fhd" | "1080p" => Some("Full HD".to_string()),
            "full" if next == Some("hd") => Some("Full HD".to_string()),
            "qhd" | "1440p" | "2k" => Some("QHD".to_string()),
            "uhd" | "4k" => Some("4K".to_string()),
            other => other
                .strip_suffix("hz")
                .filter(|rate| !rate.is_empty() && rate.chars().all(|c| c.is_ascii_digit()))
                .map(|rate| format!("{rate}Hz")),
        };
        if let Some(part) = part {
            push(part, &mut parts);
        }
    }

    (!parts.is_empty()).then(|| parts.join(" "))
}

fn amount_like(token: &str) -> bool {
    let stripped = token
        .trim_start_matches(['₹', '$'])
        .trim_start_matches("rs.")
        .trim_start_matches("rs")
        .trim_start_matches("inr");
    let Some(first) = stripped.chars().next() else {
        return false;
    };
    if !first.is_ascii_digit() {
        return false;
    }
    let body = stripped
        .trim_end_matches("lakhs")
        .trim_end_matches("lakh")
        .trim_end_matches('k');
    body.chars().all(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
}

fn is_budget_marker(token: &str) -> bool {
    BUDGET_MARKERS.contains(&token) || token.starts_with(['₹', '$'])
}

fn extract_budget(tokens: &[String]) -> Option<String> {
    let mut start = 0;
    while let Some(offset) = tokens[start..].iter().position(|token| is_budget_marker(token)) {
        let marker = start + offset;
        let mut captured = Vec::new();
        let mut seen_amount = false;

        for token in &tokens[marker..] {
            let token = token.as_str();
            if amount_like(token) {
                seen_amount = true;
                captured.push(token);
            } else if is_budget_marker(token) || BUDGET_CONNECTORS.contains(&token) {
                captured.push(token);
            } else {
                break;
            }
        }

        if seen_amount {
            while captured.last().is_some_and(|token| !amount_like(token) && !token.starts_with("lakh") && *token != "k") {
                captured.pop();
            }
            let text = captured.join(" ");
            if is_plausible_budget(&text) {
                return Some(text);
            }
        }
        start = marker + 1;
    }
    None
}

fn is_plausible_budget(text: &str) -> bool {
    PriceRange::parse(text)
        .and_then(|range| range.max.or(range.min))
        .is_some_and(|amount| amount >= Decimal::ONE_HUNDRED)
}

#[cfg(test)]
mod tests {
    use lapwise_core::comparison::CandidateRef;
    use lapwise_core::domain::preference::PreferenceField;
    use lapwise_core::elicitation::AnswerSignal;
    use lapwise_core::preferences::ProposedValue;

    use super::{
        AnswerInterpreter, ConversationStage, KeywordAnswerInterpreter, LlmAnswerInterpreter,
        UserIntent,
    };
    use crate::llm::ScriptedLlmClient;

    fn text(value: &str) -> ProposedValue {
        ProposedValue::Text(value.to_string())
    }

    fn eliciting(pending: PreferenceField) -> ConversationStage {
        ConversationStage::Eliciting { pending: Some(pending) }
    }

    #[test]
    fn extracts_every_field_from_a_rich_request() {
        let update = KeywordAnswerInterpreter::new().extract(
            "I need a gaming laptop with an i7, 16GB RAM, 1TB SSD, RTX 4060 and a 15.6 inch 144Hz display under Rs 1,20,000",
            None,
        );

        assert_eq!(
            update.get(PreferenceField::Purpose),
            Some(&ProposedValue::Purposes(vec!["gaming".to_string()]))
        );
        assert_eq!(update.get(PreferenceField::Processor), Some(&text("Intel Core i7")));
        assert_eq!(update.get(PreferenceField::Ram), Some(&text("16GB")));
        assert_eq!(update.get(PreferenceField::Storage), Some(&text("1TB SSD")));
        assert_eq!(update.get(PreferenceField::Graphics), Some(&text("NVIDIA RTX 4060")));
        assert_eq!(update.get(PreferenceField::Display), Some(&text("15.6\" 144Hz")));
        assert_eq!(update.get(PreferenceField::PriceRange), Some(&text("under rs 1,20,000")));
    }

    #[test]
    fn multiple_purposes_are_collected_once() {
        let update = KeywordAnswerInterpreter::new()
            .extract("mostly video editing and programming, some games too", None);

        assert_eq!(
            update.get(PreferenceField::Purpose),
            Some(&ProposedValue::Purposes(vec![
                "coding".to_string(),
                "gaming".to_string(),
                "video editing".to_string(),
            ]))
        );
    }

    #[test]
    fn bare_replies_count_for_the_pending_field() {
        let interpreter = KeywordAnswerInterpreter::new();

        let budget = interpreter.extract("40000-60000", Some(PreferenceField::PriceRange));
        assert_eq!(budget.get(PreferenceField::PriceRange), Some(&text("40000-60000")));

        let storage = interpreter.extract("512gb", Some(PreferenceField::Storage));
        assert_eq!(storage.get(PreferenceField::Storage), Some(&text("512GB")));
        assert!(!storage.contains(PreferenceField::PriceRange));

        let brand = interpreter.extract("intel please", Some(PreferenceField::Processor));
        assert_eq!(brand.get(PreferenceField::Processor), Some(&text("Intel")));
        assert!(interpreter.extract("intel please", None).is_empty());
    }

    #[test]
    fn unsure_and_empty_replies_map_to_signals() {
        let interpreter = KeywordAnswerInterpreter::new();

        assert_eq!(
            interpreter.classify("hmm, I'm not sure", eliciting(PreferenceField::Display)),
            UserIntent::Answer(AnswerSignal::Unclear)
        );
        assert_eq!(
            interpreter.classify("   ", eliciting(PreferenceField::Display)),
            UserIntent::Answer(AnswerSignal::Absent)
        );
    }

    #[test]
    fn recommended_stage_understands_compare_and_modify() {
        let interpreter = KeywordAnswerInterpreter::new();
        let stage = ConversationStage::Recommended;

        assert_eq!(
            interpreter.classify("Compare 1 and #3", stage),
            UserIntent::Compare(CandidateRef::Position(1), CandidateRef::Position(3))
        );
        assert_eq!(
            interpreter.classify("compare the legion 5i vs aspire 7?", stage),
            UserIntent::Compare(
                CandidateRef::Title("legion 5i".to_string()),
                CandidateRef::Title("aspire 7".to_string())
            )
        );

        let UserIntent::Modify(update) = interpreter.classify("change my budget to 50000-70000", stage)
        else {
            panic!("expected a modification");
        };
        assert_eq!(update.get(PreferenceField::PriceRange), Some(&text("budget to 50000-70000")));

        assert_eq!(interpreter.classify("thanks!", stage), UserIntent::Unrecognized);
    }

    #[test]
    fn budget_markers_do_not_swallow_capacities() {
        let update = KeywordAnswerInterpreter::new().extract("around 16gb ram, budget of 55k max", None);

        assert_eq!(update.get(PreferenceField::Ram), Some(&text("16GB")));
        assert_eq!(update.get(PreferenceField::PriceRange), Some(&text("budget of 55k")));
    }

    #[tokio::test]
    async fn llm_output_becomes_an_answer_and_unknown_keys_are_dropped() {
        let client = ScriptedLlmClient::new([
            r#"Sure! {"intent": "answer", "fields": {"ram": "32GB", "battery": "long"}, "unclear": false}"#,
        ]);
        let interpreter = LlmAnswerInterpreter::new(client);

        let intent = interpreter.interpret("32 gigs please", eliciting(PreferenceField::Ram)).await;

        let UserIntent::Answer(AnswerSignal::Answered(update)) = intent else {
            panic!("expected an answer");
        };
        assert_eq!(update.get(PreferenceField::Ram), Some(&text("32GB")));
        assert_eq!(update.len(), 1);
        assert_eq!(update.ignored_keys(), ["battery".to_string()]);
        assert!(interpreter.client().prompts()[0].contains("RAM (`ram`)"));
    }

    #[tokio::test]
    async fn llm_compare_and_unclear_signals_are_understood() {
        let client = ScriptedLlmClient::new([
            r#"{"intent": "compare", "compare": [2, "Legion 5i"]}"#,
            r#"{"intent": "answer", "fields": {}, "unclear": true}"#,
        ]);
        let interpreter = LlmAnswerInterpreter::new(client);

        assert_eq!(
            interpreter.interpret("how does 2 stack up against the legion", ConversationStage::Recommended).await,
            UserIntent::Compare(CandidateRef::Position(2), CandidateRef::Title("Legion 5i".to_string()))
        );
        assert_eq!(
            interpreter.interpret("something nice", eliciting(PreferenceField::Display)).await,
            UserIntent::Answer(AnswerSignal::Unclear)
        );
    }

    #[tokio::test]
    async fn malformed_or_failed_llm_output_falls_back_to_keywords() {
        let client = ScriptedLlmClient::new(["I think they want 16GB"]).with_failure("timeout");
        let interpreter = LlmAnswerInterpreter::new(client);

        for _ in 0..2 {
            let intent = interpreter.interpret("16gb ram", eliciting(PreferenceField::Ram)).await;
            let UserIntent::Answer(AnswerSignal::Answered(update)) = intent else {
                panic!("expected keyword fallback to answer");
            };
            assert_eq!(update.get(PreferenceField::Ram), Some(&text("16GB")));
        }
    }
}
