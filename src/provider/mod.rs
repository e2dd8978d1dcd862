// Hosted model provider module
// Embedding and chat abstractions plus the Gemini REST client

pub mod gemini;

use anyhow::Result;
use serde_json::Value;

pub use gemini::GeminiClient;

/// Produces embedding vectors for documents and queries
pub trait Embedder: Send + Sync {
    /// Embed texts that will be stored in the index
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a search query
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// A language model that can either answer or request a tool call
pub trait ChatModel: Send + Sync {
    fn generate(&self, request: &ChatRequest) -> Result<ModelTurn>;
}

/// One entry of the message history sent to the model
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    User(String),
    Assistant(String),
    ToolCall { name: String, args: Value },
    ToolResult { name: String, content: String },
}

/// A function the model may call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: f32,
}

/// What the model decided to do next
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    Text(String),
    ToolCall { name: String, args: Value },
}
