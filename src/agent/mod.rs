// Retrieval-augmented agent module
// Bounded tool-calling loop, the chatbot that owns the conversation memory,
// and the service wrapper that degrades to a fixed responder when unconfigured

pub mod prompt;
pub mod tools;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::memory::ConversationMemory;
use crate::provider::{ChatMessage, ChatModel, ChatRequest, ModelTurn};
pub use tools::{RetrievalTool, Tool};

pub const DEFAULT_MAX_ITERATIONS: usize = 15;
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Runs one question through the model, executing tool calls until a final answer
pub struct AgentExecutor {
    model: Arc<dyn ChatModel>,
    tools: Vec<Arc<dyn Tool>>,
    system_prompt: String,
    temperature: f32,
    max_iterations: usize,
}

impl fmt::Debug for AgentExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentExecutor")
            .field("tools", &self.tool_names())
            .field("temperature", &self.temperature)
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}

impl AgentExecutor {
    #[inline]
    pub fn new(model: Arc<dyn ChatModel>, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            model,
            tools,
            system_prompt: prompt::SYSTEM_PROMPT.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    #[inline]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    #[inline]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Upper bound on model calls per question. At least one call is always made.
    #[inline]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    #[inline]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    #[inline]
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    /// Answer `question` with `history` as prior context.
    ///
    /// Tool failures and unknown tool names are reported back to the model as
    /// observations. Only model errors are returned as `Err`.
    #[inline]
    pub async fn run(&self, question: &str, history: Vec<ChatMessage>) -> Result<String> {
        let mut request = ChatRequest {
            system: self.system_prompt.clone(),
            messages: history,
            tools: self.tools.iter().map(|tool| tool.definition()).collect(),
            temperature: self.temperature,
        };
        request.messages.push(ChatMessage::User(question.to_string()));

        for step in 1..=self.max_iterations {
            debug!("Reasoning step {}/{}", step, self.max_iterations);

            let turn = self
                .model
                .generate(&request)
                .with_context(|| format!("Model call failed at step {}", step))?;

            match turn {
                ModelTurn::Text(answer) => {
                    info!("Final answer after {} step(s)", step);
                    return Ok(answer);
                }
                ModelTurn::ToolCall { name, args } => {
                    let observation = self.execute_tool(&name, &args).await;
                    request.messages.push(ChatMessage::ToolCall {
                        name: name.clone(),
                        args,
                    });
                    request.messages.push(ChatMessage::ToolResult {
                        name,
                        content: observation,
                    });
                }
            }
        }

        warn!(
            "Agent reached {} iterations without a final answer",
            self.max_iterations
        );
        Ok(prompt::ITERATION_LIMIT_ANSWER.to_string())
    }

    async fn execute_tool(&self, name: &str, args: &serde_json::Value) -> String {
        let Some(tool) = self.tools.iter().find(|tool| tool.name() == name) else {
            warn!("Model requested unknown tool `{}`", name);
            return format!(
                "{} is not a valid tool, try one of [{}].",
                name,
                self.tool_names().join(", ")
            );
        };

        info!("Executing tool `{}`", name);
        match tool.call(args).await {
            Ok(output) => {
                debug!("Tool `{}` returned {} characters", name, output.len());
                output
            }
            Err(e) => {
                warn!("Tool `{}` failed: {:#}", name, e);
                format!("Tool `{}` failed: {:#}", name, e)
            }
        }
    }
}

/// Question answering over a knowledge base with a sliding conversation window.
///
/// `ask` takes `&mut self`; concurrent callers must serialize access.
#[derive(Debug)]
pub struct Chatbot {
    executor: Option<AgentExecutor>,
    memory: ConversationMemory,
}

impl Chatbot {
    #[inline]
    pub fn new(memory: ConversationMemory) -> Self {
        Self {
            executor: None,
            memory,
        }
    }

    #[inline]
    pub fn set_agent_executor(&mut self, executor: AgentExecutor) {
        self.executor = Some(executor);
    }

    #[inline]
    pub fn with_agent_executor(mut self, executor: AgentExecutor) -> Self {
        self.set_agent_executor(executor);
        self
    }

    #[inline]
    pub fn has_agent_executor(&self) -> bool {
        self.executor.is_some()
    }

    #[inline]
    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    #[inline]
    pub fn memory_mut(&mut self) -> &mut ConversationMemory {
        &mut self.memory
    }

    /// Always returns a string. Failures become an apology, a missing executor a fixed sentinel.
    #[inline]
    pub async fn ask(&mut self, question: &str) -> String {
        let Some(executor) = &self.executor else {
            return prompt::NOT_INITIALIZED.to_string();
        };

        match executor.run(question, self.memory.messages()).await {
            Ok(answer) => {
                self.memory.record(question, &answer);
                answer
            }
            Err(e) => {
                error!("Failed to answer question: {:#}", e);
                prompt::apology(&format!("{:#}", e))
            }
        }
    }
}

/// Why the service cannot answer questions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    MissingApiKey,
    InitializationFailed(String),
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(
                f,
                "AI service is currently unavailable. Please add GEMINI_API_KEY or GOOGLE_API_KEY to your .env file."
            ),
            Self::InitializationFailed(message) => write!(
                f,
                "I'm sorry, but the chatbot initialization failed: {}. Please check the backend logs.",
                message
            ),
        }
    }
}

/// The chatbot when it could be constructed, otherwise a fixed responder
#[derive(Debug)]
pub enum ChatService {
    Ready(Chatbot),
    Unavailable(UnavailableReason),
}

impl ChatService {
    #[inline]
    pub async fn ask(&mut self, question: &str) -> String {
        match self {
            Self::Ready(chatbot) => chatbot.ask(question).await,
            Self::Unavailable(reason) => reason.to_string(),
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    #[inline]
    pub fn agent_executor_ready(&self) -> bool {
        match self {
            Self::Ready(chatbot) => chatbot.has_agent_executor(),
            Self::Unavailable(_) => false,
        }
    }
}
