use anyhow::Result;
use clap::ValueEnum;
use lapwise_agent::conversation::{AnswerInterpreter, KeywordAnswerInterpreter, LlmAnswerInterpreter};
use lapwise_agent::llm::HttpLlmClient;
use lapwise_agent::runtime::AgentRuntime;
use lapwise_agent::search::HttpSearchGrounding;
use lapwise_core::config::{AppConfig, LoadOptions};
use lapwise_core::recommendation::{RecommendationEngine, RecommendationPolicy, SearchGrounding};
use lapwise_core::session::Session;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;

use super::{CommandResult, EXIT_CONFIG, EXIT_RUNTIME};

const EXIT_WORDS: [&str; 4] = ["quit", "exit", "bye", "/q"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum InterpreterKind {
    /// Offline keyword rules
    #[default]
    Keyword,
    /// Configured LLM with keyword fallback
    Llm,
}

pub fn run(interpreter: InterpreterKind) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("chat", "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };
    crate::init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            )
        }
    };

    match runtime.block_on(run_session(&config, interpreter)) {
        Ok(turns) => CommandResult::success("chat", format!("session ended after {turns} turns")),
        Err(error) => CommandResult::failure("chat", "runtime", format!("{error:#}"), EXIT_RUNTIME),
    }
}

async fn run_session(config: &AppConfig, interpreter: InterpreterKind) -> Result<usize> {
    let grounding =
        HttpSearchGrounding::from_config(&config.search, config.recommendation.max_results)?;
    let engine = RecommendationEngine::new(grounding, RecommendationPolicy::from(&config.recommendation));
    let session = Session::new(engine);
    info!(
        event_name = "system.chat.started",
        session_id = %session.id(),
        interpreter = ?interpreter,
        search_endpoint = %config.search.endpoint,
        "chat session started"
    );

    let input = BufReader::new(tokio::io::stdin());
    let output = tokio::io::stdout();
    match interpreter {
        InterpreterKind::Keyword => {
            converse(AgentRuntime::new(session, KeywordAnswerInterpreter::new())?, input, output).await
        }
        InterpreterKind::Llm => {
            let client = HttpLlmClient::from_config(&config.llm)?;
            converse(AgentRuntime::new(session, LlmAnswerInterpreter::new(client))?, input, output).await
        }
    }
}

/// Drives one session over line-oriented input until EOF or an exit word.
///
/// Returns the number of user turns handled.
pub async fn converse<G, I, R, W>(mut runtime: AgentRuntime<G, I>, input: R, mut output: W) -> Result<usize>
where
    G: SearchGrounding,
    I: AnswerInterpreter,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_reply(&mut output, &runtime.greet()?).await?;

    let mut lines = input.lines();
    let mut turns = 0;
    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if EXIT_WORDS.contains(&message.to_ascii_lowercase().as_str()) {
            break;
        }
        let reply = runtime.handle_message(message).await?;
        turns += 1;
        write_reply(&mut output, &reply).await?;
    }

    info!(
        event_name = "system.chat.ended",
        session_id = %runtime.session().id(),
        turns,
        "chat session ended"
    );
    Ok(turns)
}

async fn write_reply<W>(output: &mut W, reply: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(reply.as_bytes()).await?;
    output.write_all(b"\n> ").await?;
    output.flush().await
}
