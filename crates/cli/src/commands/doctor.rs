use lapwise_agent::llm::HttpLlmClient;
use lapwise_agent::render::ResponseRenderer;
use lapwise_agent::search::HttpSearchGrounding;
use lapwise_core::config::{AppConfig, LoadOptions};
use lapwise_core::recommendation::MatchScorer;
use serde::Serialize;

use super::{escape_json, CommandResult, EXIT_CONFIG, EXIT_OK, EXIT_RUNTIME};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn from_result(name: &'static str, result: Result<String, String>) -> Self {
        match result {
            Ok(details) => Self { name, status: CheckStatus::Pass, details },
            Err(details) => Self { name, status: CheckStatus::Fail, details },
        }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = exit_code(&report);

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn exit_code(report: &DoctorReport) -> u8 {
    let config_failed = report
        .checks
        .iter()
        .any(|check| check.name == "config_validation" && check.status == CheckStatus::Fail);
    if config_failed {
        EXIT_CONFIG
    } else if report.overall_status == CheckStatus::Fail {
        EXIT_RUNTIME
    } else {
        EXIT_OK
    }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_search_client(&config));
            checks.push(check_llm_client(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck::skipped("search_client"));
            checks.push(DoctorCheck::skipped("llm_client"));
        }
    }
    checks.push(check_templates());

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_search_client(config: &AppConfig) -> DoctorCheck {
    let result = HttpSearchGrounding::from_config(&config.search, config.recommendation.max_results)
        .map(|_| {
            format!(
                "client ready for `{}` ({} retries, {}s timeout)",
                config.search.endpoint, config.search.max_retries, config.search.timeout_secs
            )
        })
        .map_err(|error| format!("failed to build search client: {error}"));
    DoctorCheck::from_result("search_client", result)
}

fn check_llm_client(config: &AppConfig) -> DoctorCheck {
    let result = HttpLlmClient::from_config(&config.llm)
        .map(|_| format!("{:?} client ready for model `{}`", config.llm.provider, config.llm.model))
        .map_err(|error| format!("failed to build llm client: {error}"));
    DoctorCheck::from_result("llm_client", result)
}

fn check_templates() -> DoctorCheck {
    let result = ResponseRenderer::new(MatchScorer::new())
        .map(|_| "chat templates registered".to_string())
        .map_err(|error| error.to_string());
    DoctorCheck::from_result("chat_templates", result)
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
