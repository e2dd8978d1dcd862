
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use super::{ChatMessage, ChatModel, ChatRequest, Embedder, ModelTurn, ToolDefinition};
use crate::config::ProviderConfig;
use crate::config::settings::mask_key;

const API_VERSION: &str = "v1beta";
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Blocking client for the Gemini REST API
#[derive(Clone)]
pub struct GeminiClient {
    base_url: Url,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &mask_key(&self.api_key))
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("batch_size", &self.batch_size)
            .field("retry_attempts", &self.retry_attempts)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part {
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionDeclaration<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool<'a> {
    function_declarations: Vec<FunctionDeclaration<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    function_call: Option<FunctionCall>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest {
    model: String,
    content: Content,
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Deserialize)]
struct EmbedValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbedValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbedValues>,
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self> {
        let base_url = config
            .base_url()
            .context("Failed to parse provider base URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key,
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            batch_size: config.batch_size.max(1),
            agent,
            retry_attempts: config.retry_attempts.max(1),
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base delay of the exponential backoff between retries
    #[inline]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn model_url(&self, model: &str, method: &str) -> Result<Url> {
        self.base_url
            .join(&format!("/{}/models/{}:{}", API_VERSION, model, method))
            .with_context(|| format!("Failed to build URL for {}:{}", model, method))
    }

    fn post_json<T: Serialize>(&self, url: &Url, body: &T) -> Result<String> {
        let request_json = serde_json::to_string(body).context("Failed to serialize request")?;

        self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .header("x-goog-api-key", &self.api_key)
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = format!("models/{}", self.embedding_model);
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: model.clone(),
                    content: Content {
                        role: None,
                        parts: vec![Part::Text(text.clone())],
                    },
                    task_type: "RETRIEVAL_DOCUMENT",
                })
                .collect(),
        };

        let url = self.model_url(&self.embedding_model, "batchEmbedContents")?;
        let response_text = self
            .post_json(&url, &request)
            .context("Failed to generate batch embeddings")?;

        let response: BatchEmbedResponse = serde_json::from_str(&response_text)
            .context("Failed to parse batch embedding response")?;

        if response.embeddings.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            ));
        }

        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 || *status == 429 {
                                warn!(
                                    "Provider returned status {}, attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay = self.retry_delay * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

impl Embedder for GeminiClient {
    #[inline]
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            let embeddings = self
                .embed_batch(batch)
                .with_context(|| format!("Failed to process batch of {} texts", batch.len()))?;
            results.extend(embeddings);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    #[inline]
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating query embedding (length: {})", text.len());

        let request = EmbedRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content {
                role: None,
                parts: vec![Part::Text(text.to_string())],
            },
            task_type: "RETRIEVAL_QUERY",
        };

        let url = self.model_url(&self.embedding_model, "embedContent")?;
        let response_text = self
            .post_json(&url, &request)
            .context("Failed to generate query embedding")?;

        let response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        Ok(response.embedding.values)
    }
}

impl ChatModel for GeminiClient {
    #[inline]
    fn generate(&self, request: &ChatRequest) -> Result<ModelTurn> {
        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text(request.system.clone())],
            },
            contents: request.messages.iter().map(to_content).collect(),
            tools: to_tools(&request.tools),
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        };

        debug!(
            "Requesting completion from {} with {} messages",
            self.chat_model,
            body.contents.len()
        );

        let url = self.model_url(&self.chat_model, "generateContent")?;
        let response_text = self
            .post_json(&url, &body)
            .context("Failed to generate chat completion")?;

        let response: GenerateResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        parse_turn(response)
    }
}

fn to_content(message: &ChatMessage) -> Content {
    match message {
        ChatMessage::User(text) => Content {
            role: Some("user"),
            parts: vec![Part::Text(text.clone())],
        },
        ChatMessage::Assistant(text) => Content {
            role: Some("model"),
            parts: vec![Part::Text(text.clone())],
        },
        ChatMessage::ToolCall { name, args } => Content {
            role: Some("model"),
            parts: vec![Part::FunctionCall(FunctionCall {
                name: name.clone(),
                args: args.clone(),
            })],
        },
        ChatMessage::ToolResult { name, content } => Content {
            role: Some("user"),
            parts: vec![Part::FunctionResponse(FunctionResponse {
                name: name.clone(),
                response: serde_json::json!({ "content": content }),
            })],
        },
    }
}

fn to_tools(tools: &[ToolDefinition]) -> Vec<Tool<'_>> {
    if tools.is_empty() {
        return Vec::new();
    }

    vec![Tool {
        function_declarations: tools
            .iter()
            .map(|tool| FunctionDeclaration {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.parameters,
            })
            .collect(),
    }]
}

fn parse_turn(response: GenerateResponse) -> Result<ModelTurn> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(anyhow::anyhow!("Model returned no answer: {}", reason));
    };

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    let mut text = String::new();
    for part in parts.into_iter().filter(|p| !p.thought) {
        if let Some(call) = part.function_call {
            return Ok(ModelTurn::ToolCall {
                name: call.name,
                args: call.args,
            });
        }
        if let Some(fragment) = part.text {
            text.push_str(&fragment);
        }
    }

    if text.trim().is_empty() {
        return Err(anyhow::anyhow!(
            "Malformed model output: no text or function call (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        ));
    }

    Ok(ModelTurn::Text(text))
}
