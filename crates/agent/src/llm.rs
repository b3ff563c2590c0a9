use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lapwise_core::config::{LlmConfig, LlmProvider};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Talks to an OpenAI-compatible chat endpoint or a local Ollama server.
pub struct HttpLlmClient {
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    http_client: Client,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base_url = match (config.provider, config.base_url.as_deref()) {
            (_, Some(url)) if !url.trim().is_empty() => url.trim().trim_end_matches('/').to_string(),
            (LlmProvider::OpenAi, _) => "https://api.openai.com".to_string(),
            (LlmProvider::Ollama, _) => return Err(anyhow!("ollama requires llm.base_url")),
        };

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build LLM http client")?;

        Ok(Self {
            provider: config.provider,
            base_url,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            http_client,
        })
    }

    fn api_url(&self) -> String {
        match self.provider {
            LlmProvider::OpenAi => format!("{}/v1/chat/completions", self.base_url),
            LlmProvider::Ollama => format!("{}/api/generate", self.base_url),
        }
    }

    async fn complete_openai(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: 0.0,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let mut builder = self.http_client.post(self.api_url()).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }
        let response = builder.send().await.context("failed to send chat completion request")?;

        let status = response.status();
        let body = response.text().await.context("failed to read chat completion response")?;
        if !status.is_success() {
            return Err(anyhow!("chat completion failed with status {status}: {body}"));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).context("failed to parse chat completion response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("chat completion returned no choices"))
    }

    async fn complete_ollama(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest { model: &self.model, prompt, stream: false, format: "json" };

        let response = self
            .http_client
            .post(self.api_url())
            .json(&request)
            .send()
            .await
            .context("failed to send ollama generate request")?;

        let status = response.status();
        let body = response.text().await.context("failed to read ollama response")?;
        if !status.is_success() {
            return Err(anyhow!("ollama generate failed with status {status}: {body}"));
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).context("failed to parse ollama response")?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(
            event_name = "llm.completion.requested",
            provider = ?self.provider,
            model = %self.model,
            prompt_chars = prompt.len(),
            "requesting completion"
        );
        match self.provider {
            LlmProvider::OpenAi => self.complete_openai(prompt).await,
            LlmProvider::Ollama => self.complete_ollama(prompt).await,
        }
    }
}

/// Replays canned completions in order; used for offline runs and tests.
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|text| Ok(text.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_failure(self, message: impl Into<String>) -> Self {
        match self.responses.lock() {
            Ok(mut guard) => guard.push_back(Err(message.into())),
            Err(poisoned) => poisoned.into_inner().push_back(Err(message.into())),
        }
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        match self.prompts.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self.prompts.lock() {
            Ok(mut guard) => guard.push(prompt.to_string()),
            Err(poisoned) => poisoned.into_inner().push(prompt.to_string()),
        }
        let next = match self.responses.lock() {
            Ok(mut guard) => guard.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted llm has no responses left")),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[cfg(test)]
mod tests {
    use lapwise_core::config::{LlmConfig, LlmProvider};

    use super::{HttpLlmClient, LlmClient, ScriptedLlmClient};

    fn config(provider: LlmProvider, base_url: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: None,
            base_url: base_url.map(str::to_string),
            model: "test-model".to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn endpoints_follow_the_provider() {
        let openai = HttpLlmClient::from_config(&config(LlmProvider::OpenAi, None)).expect("openai");
        assert_eq!(openai.api_url(), "https://api.openai.com/v1/chat/completions");

        let ollama = HttpLlmClient::from_config(&config(LlmProvider::Ollama, Some("http://localhost:11434/")))
            .expect("ollama");
        assert_eq!(ollama.api_url(), "http://localhost:11434/api/generate");

        assert!(HttpLlmClient::from_config(&config(LlmProvider::Ollama, None)).is_err());
    }

    #[tokio::test]
    async fn scripted_client_replays_in_order_and_records_prompts() {
        let client = ScriptedLlmClient::new(["{\"intent\":\"answer\"}"]).with_failure("offline");

        assert_eq!(client.complete("first").await.expect("canned"), "{\"intent\":\"answer\"}");
        assert!(client.complete("second").await.is_err());
        assert!(client.complete("third").await.is_err());
        assert_eq!(client.prompts(), vec!["first", "second", "third"]);
    }
}
