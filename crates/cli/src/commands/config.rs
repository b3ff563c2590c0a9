use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use lapwise_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct ConfigLine {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn line(key: &'static str, value: String, env_keys: &'static [&'static str]) -> ConfigLine {
    ConfigLine { key, value, env_keys }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in effective_lines(&config) {
        let source = field_source(
            entry.key,
            entry.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", entry.key, entry.value));
    }

    lines.join("\n")
}

fn effective_lines(config: &AppConfig) -> Vec<ConfigLine> {
    vec![
        line("search.endpoint", config.search.endpoint.clone(), &["LAPWISE_SEARCH_ENDPOINT"]),
        line("search.api_key", redact_secret(config.search.api_key.as_ref()), &["LAPWISE_SEARCH_API_KEY"]),
        line(
            "search.timeout_secs",
            config.search.timeout_secs.to_string(),
            &["LAPWISE_SEARCH_TIMEOUT_SECS"],
        ),
        line(
            "search.max_retries",
            config.search.max_retries.to_string(),
            &["LAPWISE_SEARCH_MAX_RETRIES"],
        ),
        line(
            "search.retry_base_delay_ms",
            config.search.retry_base_delay_ms.to_string(),
            &["LAPWISE_SEARCH_RETRY_BASE_DELAY_MS"],
        ),
        line(
            "search.retry_max_delay_ms",
            config.search.retry_max_delay_ms.to_string(),
            &["LAPWISE_SEARCH_RETRY_MAX_DELAY_MS"],
        ),
        line("llm.provider", format!("{:?}", config.llm.provider), &["LAPWISE_LLM_PROVIDER"]),
        line("llm.model", config.llm.model.clone(), &["LAPWISE_LLM_MODEL"]),
        line(
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["LAPWISE_LLM_BASE_URL"],
        ),
        line("llm.api_key", redact_secret(config.llm.api_key.as_ref()), &["LAPWISE_LLM_API_KEY"]),
        line("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["LAPWISE_LLM_TIMEOUT_SECS"]),
        line(
            "recommendation.price_tolerance_pct",
            config.recommendation.price_tolerance_pct.to_string(),
            &["LAPWISE_RECOMMENDATION_PRICE_TOLERANCE_PCT"],
        ),
        line(
            "recommendation.min_results",
            config.recommendation.min_results.to_string(),
            &["LAPWISE_RECOMMENDATION_MIN_RESULTS"],
        ),
        line(
            "recommendation.max_results",
            config.recommendation.max_results.to_string(),
            &["LAPWISE_RECOMMENDATION_MAX_RESULTS"],
        ),
        line(
            "logging.level",
            config.logging.level.clone(),
            &["LAPWISE_LOGGING_LEVEL", "LAPWISE_LOG_LEVEL"],
        ),
        line(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["LAPWISE_LOGGING_FORMAT", "LAPWISE_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["lapwise.toml", "config/lapwise.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) if prefix.len() <= 4 => format!("{prefix}-***"),
        _ => "<redacted>".to_string(),
    }
}
